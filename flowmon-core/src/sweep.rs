use crate::{SimTime, stats::FlowStatsContainer, tracked::TrackedPacketTable};
use serde::Serialize;
use std::time::Duration;

/// Outcome of one lost packet sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// tracked packets looked at
    pub examined: usize,
    /// `(packet, destination)` pairs declared lost
    pub declared_lost: u64,
    /// tracked packets removed from the table
    pub pruned: usize,
    /// tracked packets still in the table
    pub remaining: usize,
}

/// Which pending destinations a sweep declares lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LossPolicy {
    /// only for packets first seen more than this long ago
    OlderThan(Duration),
    /// for every tracked packet, whatever its age
    All,
}

impl LossPolicy {
    fn is_expired(self, age: Duration) -> bool {
        match self {
            Self::OlderThan(threshold) => age > threshold,
            Self::All => true,
        }
    }
}

/// Declare expired pending destinations lost and prune the resolved
/// packets.
pub(crate) fn sweep(
    table: &mut TrackedPacketTable,
    stats: &mut FlowStatsContainer,
    now: SimTime,
    policy: LossPolicy,
) -> SweepReport {
    let mut report = SweepReport::default();

    table.retain(|(flow, packet), tracked| {
        report.examined += 1;

        // stats are created with the first packet of the flow
        let Some(flow_stats) = stats.get_mut(flow) else {
            report.pruned += 1;
            return false;
        };

        if policy.is_expired(now.duration_since(tracked.first_seen())) {
            report.declared_lost += flow_stats.declare_lost(*packet);
        }

        // the resolutions stay in the flow ledger once pruned
        if flow_stats.is_resolved(*packet) {
            report.pruned += 1;
            false
        } else {
            true
        }
    });

    report.remaining = table.len();
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FlowId, MulticastFlowStats, NodeId, PacketId, Resolution};

    const FLOW: FlowId = FlowId::new(7);
    const A: NodeId = NodeId::new(1);
    const B: NodeId = NodeId::new(2);

    fn setup() -> (TrackedPacketTable, FlowStatsContainer) {
        let mut table = TrackedPacketTable::new();
        let mut flow = MulticastFlowStats::new(SimTime::ZERO, [A, B]);
        flow.record_tx(PacketId::new(1), SimTime::ZERO, 100);
        table.insert(FLOW, PacketId::new(1), SimTime::ZERO);
        (table, [(FLOW, flow)].into_iter().collect())
    }

    #[test]
    fn young_packets_are_left_alone() {
        let (mut table, mut stats) = setup();

        let report = sweep(
            &mut table,
            &mut stats,
            SimTime::from_secs(10),
            LossPolicy::OlderThan(Duration::from_secs(10)),
        );

        // age == threshold is not expired
        assert_eq!(report.declared_lost, 0);
        assert_eq!(report.remaining, 1);
        assert_eq!(stats[&FLOW].lost_packets_total(), 0);
    }

    #[test]
    fn expired_pending_destinations_are_lost() {
        let (mut table, mut stats) = setup();
        stats
            .get_mut(&FLOW)
            .unwrap()
            .record_delivery(PacketId::new(1), A, SimTime::ZERO, Duration::ZERO, 100)
            .unwrap();

        let report = sweep(
            &mut table,
            &mut stats,
            SimTime::from_secs(11),
            LossPolicy::OlderThan(Duration::from_secs(10)),
        );

        assert_eq!(
            report,
            SweepReport {
                examined: 1,
                declared_lost: 1,
                pruned: 1,
                remaining: 0
            }
        );
        assert_eq!(stats[&FLOW].destinations[&A].lost_packets, 0);
        assert_eq!(stats[&FLOW].destinations[&B].lost_packets, 1);

        // pruned, but the flow still knows how it ended
        assert_eq!(
            stats[&FLOW].resolution(PacketId::new(1), B),
            Some(Resolution::Lost)
        );
    }

    #[test]
    fn resolved_packets_are_pruned_without_loss() {
        let (mut table, mut stats) = setup();
        let flow = stats.get_mut(&FLOW).unwrap();
        flow.record_delivery(PacketId::new(1), A, SimTime::ZERO, Duration::ZERO, 100)
            .unwrap();
        flow.record_drop(PacketId::new(1), B, 0, 100).unwrap();

        let report = sweep(
            &mut table,
            &mut stats,
            SimTime::from_secs(1),
            LossPolicy::OlderThan(Duration::from_secs(10)),
        );

        assert_eq!(report.pruned, 1);
        assert_eq!(report.declared_lost, 0);
        assert!(table.is_empty());
    }

    #[test]
    fn all_policy_ignores_age() {
        let (mut table, mut stats) = setup();

        let report = sweep(&mut table, &mut stats, SimTime::ZERO, LossPolicy::All);

        assert_eq!(report.declared_lost, 2);
        assert!(table.is_empty());
    }
}
