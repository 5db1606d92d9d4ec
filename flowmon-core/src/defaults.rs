use std::time::Duration;

/// Default maximum per-hop delay
///
/// A tracked packet older than this that is still pending for some
/// destination of its group is declared lost for that destination by
/// the lost packet sweep.
///
/// ```
/// # use mcast_flowmon_core::defaults::*;
/// # use std::time::Duration;
/// assert_eq!(DEFAULT_MAX_PER_HOP_DELAY, Duration::from_secs(10));
/// ```
pub const DEFAULT_MAX_PER_HOP_DELAY: Duration = Duration::from_secs(10);

/// Default interval between two periodic lost packet sweeps
///
/// See [`MonitorConfig::set_sweep_interval`] for more details.
///
/// [`MonitorConfig::set_sweep_interval`]: crate::MonitorConfig::set_sweep_interval
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(1);
