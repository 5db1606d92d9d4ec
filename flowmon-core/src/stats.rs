//! Per-flow, per-destination statistics.
//!
//! [`MulticastFlowStats`] accumulates everything the monitor learned
//! about one flow. Obtain the whole container via
//! [`MulticastFlowMonitor::flow_stats`](crate::MulticastFlowMonitor::flow_stats).
//! Values are authoritative once the monitor has stopped and the final
//! sweep has run.

use crate::{FlowId, NodeId, PacketId, SimTime};
use serde::Serialize;
use std::{
    collections::{BTreeMap, BTreeSet, btree_map},
    time::Duration,
};

/// All the flows seen by a monitor, ordered by [`FlowId`].
pub type FlowStatsContainer = BTreeMap<FlowId, MulticastFlowStats>;

/// Drop reason codes are in `0..DROP_REASON_CODES`. Reports with a code
/// outside that range are refused, the counters are indexed by code.
pub const DROP_REASON_CODES: u32 = 256;

/// Terminal state of a packet for one destination of its group.
///
/// A packet reaches exactly one of these per destination, and never
/// changes it afterward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Resolution {
    Delivered,
    Dropped,
    Lost,
}

/// Statistics of a flow as observed by one destination of its group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DestinationStats {
    /// Time the first packet of the flow was received by this destination.
    pub time_first_rx_packet: Option<SimTime>,
    /// Time the last packet of the flow was received by this destination.
    pub time_last_rx_packet: Option<SimTime>,
    /// Sum of the end-to-end delays of every received packet.
    pub delay_sum: Duration,
    /// Sum of the jitter of every received packet but the first.
    ///
    /// The jitter of a packet is the absolute delay variation relative to
    /// the previous packet received by this destination (RFC 3393 IPDV).
    pub jitter_sum: Duration,
    /// Delay of the last received packet, used for the next jitter sample.
    pub last_delay: Option<Duration>,
    /// Bytes received.
    pub rx_bytes: u64,
    /// Packets received.
    pub rx_packets: u64,
    /// Packets declared lost by the sweep.
    pub lost_packets: u64,
    /// Duplicate copies discarded on the way to this destination.
    pub dups_dropped: u64,
    /// Packets explicitly dropped, indexed by drop reason code.
    pub packets_dropped: Vec<u64>,
    /// Bytes explicitly dropped, indexed by drop reason code.
    pub bytes_dropped: Vec<u64>,
}

/// Statistics of one multicast flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MulticastFlowStats {
    /// Time the first packet of the flow was transmitted.
    pub time_first_tx_packet: SimTime,
    /// Time the last packet of the flow was transmitted.
    pub time_last_tx_packet: SimTime,
    /// Bytes transmitted by the source.
    pub tx_bytes: u64,
    /// Packets transmitted by the source.
    pub tx_packets: u64,
    /// Number of forwarding events, summed over every packet of the flow.
    pub times_forwarded: u64,
    /// The multicast delivery group, as known when the flow started.
    pub group_node_ids: BTreeSet<NodeId>,
    /// Per destination statistics. Has exactly one entry per member of
    /// [`group_node_ids`](Self::group_node_ids).
    pub destinations: BTreeMap<NodeId, DestinationStats>,
    /// Packets dropped at relay nodes outside the group, indexed by reason
    /// code. Such a drop cannot be attributed to a single destination.
    pub transit_packets_dropped: Vec<u64>,
    /// Bytes dropped at relay nodes outside the group, indexed by reason
    /// code.
    pub transit_bytes_dropped: Vec<u64>,

    /// Every packet ever sent on this flow with its per destination
    /// resolutions. Outlives the tracked packet table entries so a packet
    /// is counted at most once per destination whatever the sweep pruned.
    #[serde(skip)]
    ledger: BTreeMap<PacketId, BTreeMap<NodeId, Resolution>>,
}

/// Add `by` to the counter at `reason`, growing the vector as needed.
/// `reason` is below [`DROP_REASON_CODES`], the monitor refuses the others.
pub(crate) fn add_at(counters: &mut Vec<u64>, reason: u32, by: u64) {
    let index = reason as usize;
    if counters.len() <= index {
        counters.resize(index + 1, 0);
    }
    counters[index] = counters[index].saturating_add(by);
}

impl DestinationStats {
    pub(crate) fn record_delivery(&mut self, now: SimTime, delay: Duration, bytes: u64) {
        self.delay_sum += delay;
        if let Some(last_delay) = self.last_delay {
            self.jitter_sum += delay.abs_diff(last_delay);
        }
        self.last_delay = Some(delay);

        self.rx_packets += 1;
        self.rx_bytes += bytes;

        self.time_first_rx_packet.get_or_insert(now);
        self.time_last_rx_packet = Some(now);
    }

    pub(crate) fn record_drop(&mut self, reason: u32, bytes: u64) {
        add_at(&mut self.packets_dropped, reason, 1);
        add_at(&mut self.bytes_dropped, reason, bytes);
    }

    /// packets explicitly dropped, all reasons together
    pub fn packets_dropped_total(&self) -> u64 {
        self.packets_dropped.iter().sum()
    }

    /// bytes explicitly dropped, all reasons together
    pub fn bytes_dropped_total(&self) -> u64 {
        self.bytes_dropped.iter().sum()
    }
}

impl MulticastFlowStats {
    pub(crate) fn new<I>(now: SimTime, group: I) -> Self
    where
        I: IntoIterator<Item = NodeId>,
    {
        let group_node_ids: BTreeSet<NodeId> = group.into_iter().collect();
        let destinations = group_node_ids
            .iter()
            .map(|node| (*node, DestinationStats::default()))
            .collect();

        Self {
            time_first_tx_packet: now,
            time_last_tx_packet: now,
            tx_bytes: 0,
            tx_packets: 0,
            times_forwarded: 0,
            group_node_ids,
            destinations,
            transit_packets_dropped: Vec::new(),
            transit_bytes_dropped: Vec::new(),
            ledger: BTreeMap::new(),
        }
    }

    #[inline]
    pub fn is_member(&self, node: NodeId) -> bool {
        self.group_node_ids.contains(&node)
    }

    pub fn destination(&self, node: NodeId) -> Option<&DestinationStats> {
        self.destinations.get(&node)
    }

    pub(crate) fn destination_mut(&mut self, node: NodeId) -> Option<&mut DestinationStats> {
        self.destinations.get_mut(&node)
    }

    /// Account the first transmission of `packet`. Returns `false`, and
    /// changes nothing, if this packet was already sent on the flow.
    pub(crate) fn record_tx(&mut self, packet: PacketId, now: SimTime, bytes: u64) -> bool {
        match self.ledger.entry(packet) {
            btree_map::Entry::Occupied(_) => return false,
            btree_map::Entry::Vacant(entry) => {
                entry.insert(BTreeMap::new());
            }
        }

        self.tx_packets += 1;
        self.tx_bytes += bytes;
        self.time_last_tx_packet = now;
        true
    }

    /// `true` if `packet` was sent on this flow
    pub fn was_sent(&self, packet: PacketId) -> bool {
        self.ledger.contains_key(&packet)
    }

    /// Terminal state of `packet` for `destination`, if it reached one.
    pub fn resolution(&self, packet: PacketId, destination: NodeId) -> Option<Resolution> {
        self.ledger.get(&packet)?.get(&destination).copied()
    }

    /// `true` once `packet` reached a terminal state for every member of
    /// the group. A packet never sent on the flow is not resolved.
    pub fn is_resolved(&self, packet: PacketId) -> bool {
        self.ledger.get(&packet).is_some_and(|resolutions| {
            self.group_node_ids
                .iter()
                .all(|node| resolutions.contains_key(node))
        })
    }

    /// Set the terminal state of a sent packet for a member destination.
    /// Returns the existing resolution, untouched, if there was one.
    fn resolve(
        &mut self,
        packet: PacketId,
        destination: NodeId,
        resolution: Resolution,
    ) -> Result<(), Option<Resolution>> {
        if !self.is_member(destination) {
            return Err(None);
        }
        let resolutions = self.ledger.get_mut(&packet).ok_or(None)?;
        match resolutions.entry(destination) {
            btree_map::Entry::Occupied(entry) => Err(Some(*entry.get())),
            btree_map::Entry::Vacant(entry) => {
                entry.insert(resolution);
                Ok(())
            }
        }
    }

    /// Account a delivery of `packet` at `destination`.
    ///
    /// On error nothing changed: `None` if the packet was never sent or
    /// `destination` is not a member, the earlier resolution otherwise.
    pub(crate) fn record_delivery(
        &mut self,
        packet: PacketId,
        destination: NodeId,
        now: SimTime,
        delay: Duration,
        bytes: u64,
    ) -> Result<(), Option<Resolution>> {
        self.resolve(packet, destination, Resolution::Delivered)?;
        if let Some(stats) = self.destinations.get_mut(&destination) {
            stats.record_delivery(now, delay, bytes);
        }
        Ok(())
    }

    /// Account an explicit drop of `packet` on its way to `destination`.
    /// Errors as [`record_delivery`](Self::record_delivery).
    pub(crate) fn record_drop(
        &mut self,
        packet: PacketId,
        destination: NodeId,
        reason: u32,
        bytes: u64,
    ) -> Result<(), Option<Resolution>> {
        self.resolve(packet, destination, Resolution::Dropped)?;
        if let Some(stats) = self.destinations.get_mut(&destination) {
            stats.record_drop(reason, bytes);
        }
        Ok(())
    }

    /// Declare `packet` lost for every destination still pending. Returns
    /// how many destinations were declared.
    pub(crate) fn declare_lost(&mut self, packet: PacketId) -> u64 {
        let Some(resolutions) = self.ledger.get_mut(&packet) else {
            return 0;
        };

        let mut declared = 0;
        for (node, destination) in self.destinations.iter_mut() {
            if let btree_map::Entry::Vacant(entry) = resolutions.entry(*node) {
                entry.insert(Resolution::Lost);
                destination.lost_packets += 1;
                declared += 1;
            }
        }
        declared
    }

    pub(crate) fn record_transit_drop(&mut self, reason: u32, bytes: u64) {
        add_at(&mut self.transit_packets_dropped, reason, 1);
        add_at(&mut self.transit_bytes_dropped, reason, bytes);
    }

    /// received packets summed over every destination
    pub fn rx_packets_total(&self) -> u64 {
        self.destinations.values().map(|d| d.rx_packets).sum()
    }

    /// lost packets summed over every destination
    pub fn lost_packets_total(&self) -> u64 {
        self.destinations.values().map(|d| d.lost_packets).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: NodeId = NodeId::new(1);
    const B: NodeId = NodeId::new(2);

    #[test]
    fn new_flow_has_one_entry_per_member() {
        let stats = MulticastFlowStats::new(SimTime::ZERO, [B, A, B]);

        assert_eq!(stats.group_node_ids.len(), 2);
        assert_eq!(stats.destinations.len(), 2);
        assert!(stats.is_member(A));
        assert!(stats.destination(NodeId::new(3)).is_none());
    }

    #[test]
    fn jitter_starts_at_second_delivery() {
        let mut dest = DestinationStats::default();

        dest.record_delivery(SimTime::from_secs(1), Duration::from_millis(10), 100);
        assert_eq!(dest.jitter_sum, Duration::ZERO);

        dest.record_delivery(SimTime::from_secs(2), Duration::from_millis(4), 100);
        dest.record_delivery(SimTime::from_secs(3), Duration::from_millis(7), 100);

        assert_eq!(dest.delay_sum, Duration::from_millis(21));
        assert_eq!(dest.jitter_sum, Duration::from_millis(6 + 3));
        assert_eq!(dest.rx_packets, 3);
        assert_eq!(dest.rx_bytes, 300);
        assert_eq!(dest.time_first_rx_packet, Some(SimTime::from_secs(1)));
        assert_eq!(dest.time_last_rx_packet, Some(SimTime::from_secs(3)));
    }

    #[test]
    fn drop_counters_grow_with_reason() {
        let mut dest = DestinationStats::default();
        dest.record_drop(3, 40);
        dest.record_drop(0, 60);
        dest.record_drop(3, 40);

        assert_eq!(dest.packets_dropped, vec![1, 0, 0, 2]);
        assert_eq!(dest.bytes_dropped, vec![60, 0, 0, 80]);
        assert_eq!(dest.packets_dropped_total(), 3);
        assert_eq!(dest.bytes_dropped_total(), 140);
    }

    #[test]
    fn tx_once_per_packet() {
        let mut stats = MulticastFlowStats::new(SimTime::ZERO, [A]);

        assert!(stats.record_tx(PacketId::new(1), SimTime::ZERO, 100));
        assert!(!stats.record_tx(PacketId::new(1), SimTime::from_secs(1), 100));

        assert_eq!(stats.tx_packets, 1);
        assert_eq!(stats.tx_bytes, 100);
        assert_eq!(stats.time_last_tx_packet, SimTime::ZERO);
    }

    #[test]
    fn resolution_is_terminal() {
        let mut stats = MulticastFlowStats::new(SimTime::ZERO, [A, B]);
        let packet = PacketId::new(1);
        stats.record_tx(packet, SimTime::ZERO, 100);

        let delay = Duration::from_millis(1);
        assert_eq!(
            stats.record_delivery(packet, A, SimTime::ZERO, delay, 100),
            Ok(())
        );
        assert_eq!(
            stats.record_drop(packet, A, 0, 100),
            Err(Some(Resolution::Delivered))
        );
        assert_eq!(stats.declare_lost(packet), 1);
        assert_eq!(stats.declare_lost(packet), 0);

        assert_eq!(stats.resolution(packet, A), Some(Resolution::Delivered));
        assert_eq!(stats.resolution(packet, B), Some(Resolution::Lost));
        assert_eq!(stats.destinations[&A].packets_dropped_total(), 0);
        assert_eq!(stats.lost_packets_total(), 1);
    }

    #[test]
    fn unsent_packets_and_non_members_are_refused() {
        let mut stats = MulticastFlowStats::new(SimTime::ZERO, [A]);
        stats.record_tx(PacketId::new(1), SimTime::ZERO, 100);

        assert_eq!(stats.record_drop(PacketId::new(2), A, 0, 100), Err(None));
        assert_eq!(stats.record_drop(PacketId::new(1), B, 0, 100), Err(None));
        assert_eq!(stats.declare_lost(PacketId::new(2)), 0);
        assert!(!stats.was_sent(PacketId::new(2)));
        assert_eq!(stats.destinations[&A].packets_dropped_total(), 0);
    }

    #[test]
    fn resolved_for_group() {
        let mut stats = MulticastFlowStats::new(SimTime::ZERO, [A, B]);
        let packet = PacketId::new(1);

        assert!(!stats.is_resolved(packet));
        stats.record_tx(packet, SimTime::ZERO, 100);
        assert!(!stats.is_resolved(packet));
        stats.record_drop(packet, A, 1, 100).unwrap();
        assert!(!stats.is_resolved(packet));
        stats.record_drop(packet, B, 1, 100).unwrap();
        assert!(stats.is_resolved(packet));

        // an empty group has nothing to wait for
        let mut empty = MulticastFlowStats::new(SimTime::ZERO, std::iter::empty());
        empty.record_tx(packet, SimTime::ZERO, 100);
        assert!(empty.is_resolved(packet));
    }
}
