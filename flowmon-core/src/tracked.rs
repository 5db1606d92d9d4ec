use crate::{FlowId, NodeId, PacketId, SimTime};
use std::collections::{BTreeMap, btree_map};

/// Working-set record of a packet still in flight for at least one
/// destination. Its resolutions live in the flow statistics, see
/// [`MulticastFlowStats::resolution`](crate::MulticastFlowStats::resolution).
#[derive(Debug, Clone)]
pub struct TrackedPacket {
    first_seen: SimTime,

    /// last receive or drop observed, per destination
    last_seen: BTreeMap<NodeId, SimTime>,

    times_forwarded: u32,
}

impl TrackedPacket {
    pub(crate) fn new(first_seen: SimTime) -> Self {
        Self {
            first_seen,
            last_seen: BTreeMap::new(),
            times_forwarded: 0,
        }
    }

    /// simulated time of the first transmission
    #[inline]
    pub fn first_seen(&self) -> SimTime {
        self.first_seen
    }

    /// time this packet was last seen received or dropped on its way to
    /// `destination`
    pub fn last_seen(&self, destination: NodeId) -> Option<SimTime> {
        self.last_seen.get(&destination).copied()
    }

    #[inline]
    pub fn times_forwarded(&self) -> u32 {
        self.times_forwarded
    }

    pub(crate) fn touch(&mut self, destination: NodeId, now: SimTime) {
        self.last_seen.insert(destination, now);
    }

    pub(crate) fn record_forwarding(&mut self) {
        self.times_forwarded = self.times_forwarded.saturating_add(1);
    }
}

/// All the packets being tracked, keyed by `(FlowId, PacketId)`.
///
/// Entries are created on first transmission and only removed by the
/// lost packet sweep, see [`MulticastFlowMonitor::check_for_lost_packets`].
///
/// [`MulticastFlowMonitor::check_for_lost_packets`]: crate::MulticastFlowMonitor::check_for_lost_packets
#[derive(Debug, Clone, Default)]
pub struct TrackedPacketTable {
    packets: BTreeMap<(FlowId, PacketId), TrackedPacket>,
}

impl TrackedPacketTable {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.packets.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    pub fn get(&self, flow: FlowId, packet: PacketId) -> Option<&TrackedPacket> {
        self.packets.get(&(flow, packet))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&(FlowId, PacketId), &TrackedPacket)> {
        self.packets.iter()
    }

    pub(crate) fn get_mut(&mut self, flow: FlowId, packet: PacketId) -> Option<&mut TrackedPacket> {
        self.packets.get_mut(&(flow, packet))
    }

    /// Start tracking a packet. Returns `false`, leaving the existing
    /// entry alone, if the packet is already tracked.
    pub(crate) fn insert(&mut self, flow: FlowId, packet: PacketId, first_seen: SimTime) -> bool {
        match self.packets.entry((flow, packet)) {
            btree_map::Entry::Occupied(_) => false,
            btree_map::Entry::Vacant(entry) => {
                entry.insert(TrackedPacket::new(first_seen));
                true
            }
        }
    }

    pub(crate) fn retain<F>(&mut self, f: F)
    where
        F: FnMut(&(FlowId, PacketId), &mut TrackedPacket) -> bool,
    {
        self.packets.retain(f)
    }
}
