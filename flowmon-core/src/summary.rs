use crate::{MulticastFlowStats, NodeId, stats::DestinationStats};
use serde::Serialize;
use std::time::Duration;

/// Figures derived from a [`DestinationStats`], for reporting.
///
/// Values that need samples that do not exist yet are `None`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DestinationSummary {
    pub destination: NodeId,
    /// `delay_sum / rx_packets`
    pub mean_delay: Option<Duration>,
    /// `jitter_sum / (rx_packets - 1)`
    pub mean_jitter: Option<Duration>,
    /// `lost / (received + lost)`
    pub loss_ratio: Option<f64>,
    pub packets_dropped: u64,
    pub bytes_dropped: u64,
    /// received bits per second between the first and the last reception
    pub rx_throughput_bps: Option<f64>,
}

impl DestinationSummary {
    pub fn new(destination: NodeId, stats: &DestinationStats) -> Self {
        let mean_delay = divide(stats.delay_sum, stats.rx_packets);
        let mean_jitter = divide(stats.jitter_sum, stats.rx_packets.saturating_sub(1));

        let accounted = stats.rx_packets + stats.lost_packets;
        let loss_ratio = (accounted > 0).then(|| stats.lost_packets as f64 / accounted as f64);

        let rx_throughput_bps = match (stats.time_first_rx_packet, stats.time_last_rx_packet) {
            (Some(first), Some(last)) if last > first => {
                let window = last.duration_since(first).as_secs_f64();
                Some(stats.rx_bytes as f64 * 8.0 / window)
            }
            _ => None,
        };

        Self {
            destination,
            mean_delay,
            mean_jitter,
            loss_ratio,
            packets_dropped: stats.packets_dropped_total(),
            bytes_dropped: stats.bytes_dropped_total(),
            rx_throughput_bps,
        }
    }
}

fn divide(sum: Duration, count: u64) -> Option<Duration> {
    if count == 0 {
        return None;
    }
    let nanos = sum.as_nanos() / u128::from(count);
    Some(Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX)))
}

impl MulticastFlowStats {
    /// Summary for one destination, `None` if it is not in the group.
    pub fn summary(&self, destination: NodeId) -> Option<DestinationSummary> {
        self.destination(destination)
            .map(|stats| DestinationSummary::new(destination, stats))
    }

    /// Summaries of every destination of the group.
    pub fn summaries(&self) -> Vec<DestinationSummary> {
        self.destinations
            .iter()
            .map(|(node, stats)| DestinationSummary::new(*node, stats))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SimTime;

    #[test]
    fn empty_destination() {
        let summary = DestinationSummary::new(NodeId::new(1), &DestinationStats::default());

        assert_eq!(summary.mean_delay, None);
        assert_eq!(summary.mean_jitter, None);
        assert_eq!(summary.loss_ratio, None);
        assert_eq!(summary.rx_throughput_bps, None);
    }

    #[test]
    fn single_delivery_has_no_jitter() {
        let mut stats = DestinationStats::default();
        stats.record_delivery(SimTime::from_secs(1), Duration::from_millis(20), 500);

        let summary = DestinationSummary::new(NodeId::new(1), &stats);
        assert_eq!(summary.mean_delay, Some(Duration::from_millis(20)));
        assert_eq!(summary.mean_jitter, None);
        assert_eq!(summary.loss_ratio, Some(0.0));
        assert_eq!(summary.rx_throughput_bps, None);
    }

    #[test]
    fn means_and_ratios() {
        let mut stats = DestinationStats::default();
        stats.record_delivery(SimTime::from_secs(1), Duration::from_millis(10), 1_000);
        stats.record_delivery(SimTime::from_secs(2), Duration::from_millis(30), 1_000);
        stats.record_delivery(SimTime::from_secs(3), Duration::from_millis(20), 1_000);
        stats.lost_packets = 1;

        let summary = DestinationSummary::new(NodeId::new(1), &stats);
        assert_eq!(summary.mean_delay, Some(Duration::from_millis(20)));
        // |30 - 10| + |20 - 30| over 2 samples
        assert_eq!(summary.mean_jitter, Some(Duration::from_millis(15)));
        assert_eq!(summary.loss_ratio, Some(0.25));
        // 3000 bytes over 2 seconds
        assert_eq!(summary.rx_throughput_bps, Some(12_000.0));
    }
}
