use crate::{
    SimTime,
    defaults::{DEFAULT_MAX_PER_HOP_DELAY, DEFAULT_SWEEP_INTERVAL},
    time::{DurationParseError, parse_duration},
};
use std::time::Duration;
use thiserror::Error;

/// Configuration of a [`MulticastFlowMonitor`].
///
/// | Setting | Default |
/// |---------|---------|
/// | Max per-hop delay | 10s ([`DEFAULT_MAX_PER_HOP_DELAY`]) |
/// | Sweep interval | 1s ([`DEFAULT_SWEEP_INTERVAL`]) |
///
/// ```
/// # use mcast_flowmon_core::MonitorConfig;
/// # use std::time::Duration;
/// let config = MonitorConfig::default()
///     .set_max_per_hop_delay(Duration::from_secs(2))
///     .set_sweep_interval_str("500ms")
///     .unwrap();
/// assert!(config.validate().is_ok());
/// ```
///
/// [`MulticastFlowMonitor`]: crate::MulticastFlowMonitor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorConfig {
    max_per_hop_delay: Duration,
    sweep_interval: Duration,
}

/// Errors reported synchronously to whoever configures the monitor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("max per-hop delay must be greater than zero")]
    ZeroMaxPerHopDelay,
    #[error("sweep interval must be greater than zero")]
    ZeroSweepInterval,
    #[error("stop ({stop}) would happen before start ({start})")]
    StopBeforeStart { start: SimTime, stop: SimTime },
    #[error("monitor is already stopped, monitoring cannot be restarted")]
    AlreadyStopped,
    #[error("invalid duration: {0}")]
    Duration(#[from] DurationParseError),
}

impl MonitorConfig {
    pub const fn new() -> Self {
        Self {
            max_per_hop_delay: DEFAULT_MAX_PER_HOP_DELAY,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }

    /// Maximum age of a tracked packet before its pending destinations
    /// are declared lost.
    pub fn set_max_per_hop_delay(mut self, delay: Duration) -> Self {
        self.max_per_hop_delay = delay;
        self
    }

    pub fn set_max_per_hop_delay_str(self, delay: &str) -> Result<Self, ConfigError> {
        Ok(self.set_max_per_hop_delay(parse_duration(delay)?))
    }

    /// Interval between two periodic lost packet sweeps while the
    /// monitor is running.
    ///
    /// A shorter interval reclaims tracked packets sooner at the cost of
    /// more sweeps.
    pub fn set_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn set_sweep_interval_str(self, interval: &str) -> Result<Self, ConfigError> {
        Ok(self.set_sweep_interval(parse_duration(interval)?))
    }

    #[inline]
    pub fn max_per_hop_delay(&self) -> Duration {
        self.max_per_hop_delay
    }

    #[inline]
    pub fn sweep_interval(&self) -> Duration {
        self.sweep_interval
    }

    /// Check the configuration is usable.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::ZeroMaxPerHopDelay`] if the threshold is zero.
    /// - [`ConfigError::ZeroSweepInterval`] if the sweep interval is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_per_hop_delay.is_zero() {
            return Err(ConfigError::ZeroMaxPerHopDelay);
        }
        if self.sweep_interval.is_zero() {
            return Err(ConfigError::ZeroSweepInterval);
        }
        Ok(())
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self::new()
    }
}
