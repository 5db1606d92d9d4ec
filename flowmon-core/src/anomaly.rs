use serde::Serialize;
use std::fmt;

/// A report that broke one of the reporting protocol's preconditions.
///
/// Anomalies never fail the reporting probe. They are counted in
/// [`Anomalies`] and logged, and the offending report leaves the
/// statistics untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum AnomalyKind {
    /// first transmission reported twice for the same packet
    DuplicateFirstTx,
    /// the packet was never transmitted on its flow, or a relay forwarded
    /// or dropped a packet already resolved for its whole group
    UnknownPacket,
    /// the flow was never transmitted
    UnknownFlow,
    /// the node is not part of the flow's delivery group
    NonMemberDestination,
    /// the packet was already delivered to this destination
    DuplicateRx,
    /// the packet was already dropped or declared lost for this destination
    RxAfterResolved,
    /// the drop was already reported for this destination
    DuplicateDrop,
    /// the packet was already delivered or declared lost for this destination
    DropAfterResolved,
    /// the drop reason code is not below [`DROP_REASON_CODES`](crate::DROP_REASON_CODES)
    InvalidReasonCode,
}

impl AnomalyKind {
    pub const ALL: [Self; 9] = [
        Self::DuplicateFirstTx,
        Self::UnknownPacket,
        Self::UnknownFlow,
        Self::NonMemberDestination,
        Self::DuplicateRx,
        Self::RxAfterResolved,
        Self::DuplicateDrop,
        Self::DropAfterResolved,
        Self::InvalidReasonCode,
    ];

    const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::DuplicateFirstTx => "duplicate first transmission",
            Self::UnknownPacket => "unknown packet",
            Self::UnknownFlow => "unknown flow",
            Self::NonMemberDestination => "destination not in group",
            Self::DuplicateRx => "duplicate receive",
            Self::RxAfterResolved => "receive after drop or loss",
            Self::DuplicateDrop => "duplicate drop",
            Self::DropAfterResolved => "drop after delivery or loss",
            Self::InvalidReasonCode => "drop reason code out of range",
        };
        f.write_str(s)
    }
}

/// Counters of every anomaly and of the reports ignored because the
/// monitor was not running.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Anomalies {
    counts: [u64; AnomalyKind::ALL.len()],
    ignored_while_idle: u64,
    ignored_after_stop: u64,
}

impl Anomalies {
    pub fn count(&self, kind: AnomalyKind) -> u64 {
        self.counts[kind.index()]
    }

    /// all anomalies together
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// reports received before monitoring started
    pub fn ignored_while_idle(&self) -> u64 {
        self.ignored_while_idle
    }

    /// reports received after monitoring stopped
    pub fn ignored_after_stop(&self) -> u64 {
        self.ignored_after_stop
    }

    /// non-zero counters, in [`AnomalyKind`] order
    pub fn iter(&self) -> impl Iterator<Item = (AnomalyKind, u64)> + '_ {
        AnomalyKind::ALL
            .into_iter()
            .map(|kind| (kind, self.count(kind)))
            .filter(|(_, count)| *count > 0)
    }

    pub(crate) fn record(&mut self, kind: AnomalyKind) {
        self.counts[kind.index()] += 1;
    }

    pub(crate) fn record_ignored_while_idle(&mut self) {
        self.ignored_while_idle += 1;
    }

    pub(crate) fn record_ignored_after_stop(&mut self) {
        self.ignored_after_stop += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_per_kind() {
        let mut anomalies = Anomalies::default();
        anomalies.record(AnomalyKind::DuplicateRx);
        anomalies.record(AnomalyKind::DuplicateRx);
        anomalies.record(AnomalyKind::UnknownPacket);

        assert_eq!(anomalies.count(AnomalyKind::DuplicateRx), 2);
        assert_eq!(anomalies.count(AnomalyKind::UnknownPacket), 1);
        assert_eq!(anomalies.count(AnomalyKind::DuplicateDrop), 0);
        assert_eq!(anomalies.total(), 3);
        assert_eq!(
            anomalies.iter().collect::<Vec<_>>(),
            vec![
                (AnomalyKind::UnknownPacket, 1),
                (AnomalyKind::DuplicateRx, 2)
            ]
        );
    }

    #[test]
    fn ignored_reports_are_not_anomalies() {
        let mut anomalies = Anomalies::default();
        anomalies.record_ignored_while_idle();
        anomalies.record_ignored_after_stop();

        assert_eq!(anomalies.total(), 0);
        assert_eq!(anomalies.ignored_while_idle(), 1);
        assert_eq!(anomalies.ignored_after_stop(), 1);
    }

    #[test]
    fn display() {
        assert_eq!(AnomalyKind::DuplicateRx.to_string(), "duplicate receive");
    }
}
