use crate::{
    classifier::{Ipv4Header, MulticastFlowClassifier},
    helper::AddressGroups,
};
use mcast_flowmon_core::{
    FlowId, MulticastFlowMonitor, NodeId, PacketId, ProbeId, ProbeInfo, ProbeKind, Scheduler,
};
use serde::Serialize;
use std::fmt;
use thiserror::Error;
use tracing::trace;

/// Carried by a packet from its first transmission onward so the probes
/// downstream know which tracked packet they are looking at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MulticastFlowTag {
    pub flow: FlowId,
    pub packet: PacketId,
}

/// An IPv4 packet as seen by the probes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv4Packet {
    pub header: Ipv4Header,
    pub payload_size: u32,
    pub tag: Option<MulticastFlowTag>,
}

impl Ipv4Packet {
    pub fn new(header: Ipv4Header, payload_size: u32) -> Self {
        Self {
            header,
            payload_size,
            tag: None,
        }
    }

    /// size on the wire, header included
    pub fn size(&self) -> u32 {
        self.payload_size.saturating_add(Ipv4Header::SIZE)
    }
}

/// Why the IPv4 layer dropped a packet. The discriminant is the reason
/// code reported to the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u32)]
pub enum Ipv4DropReason {
    NoRoute = 0,
    TtlExpire = 1,
    BadChecksum = 2,
    Queue = 3,
    QueueDisc = 4,
    InterfaceDown = 5,
    RouteError = 6,
    FragmentTimeout = 7,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unknown IPv4 drop reason code {0}")]
pub struct UnknownDropReason(pub u32);

impl Ipv4DropReason {
    pub const ALL: [Self; 8] = [
        Self::NoRoute,
        Self::TtlExpire,
        Self::BadChecksum,
        Self::Queue,
        Self::QueueDisc,
        Self::InterfaceDown,
        Self::RouteError,
        Self::FragmentTimeout,
    ];

    #[inline]
    pub const fn code(self) -> u32 {
        self as u32
    }
}

impl TryFrom<u32> for Ipv4DropReason {
    type Error = UnknownDropReason;

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        Self::ALL
            .get(code as usize)
            .copied()
            .ok_or(UnknownDropReason(code))
    }
}

impl fmt::Display for Ipv4DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NoRoute => "no route",
            Self::TtlExpire => "ttl expired",
            Self::BadChecksum => "bad checksum",
            Self::Queue => "queue full",
            Self::QueueDisc => "queue disc",
            Self::InterfaceDown => "interface down",
            Self::RouteError => "route error",
            Self::FragmentTimeout => "fragment timeout",
        };
        f.write_str(s)
    }
}

/// A probe attached to the IPv4 layer of one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4MulticastFlowProbe {
    id: ProbeId,
    node: NodeId,
}

impl Ipv4MulticastFlowProbe {
    pub(crate) fn register<S: Scheduler>(
        monitor: &mut MulticastFlowMonitor<S>,
        node: NodeId,
    ) -> Self {
        let id = monitor.add_probe(ProbeInfo {
            node,
            kind: ProbeKind::Ipv4,
        });
        Self { id, node }
    }

    #[inline]
    pub fn id(&self) -> ProbeId {
        self.id
    }

    #[inline]
    pub fn node(&self) -> NodeId {
        self.node
    }
}

/// The hooks of an [`Ipv4MulticastFlowProbe`], borrowed from the
/// [`MulticastFlowMonitorHelper`] for the time of one callback.
///
/// [`MulticastFlowMonitorHelper`]: crate::MulticastFlowMonitorHelper
pub struct ProbeHandle<'a, S, C> {
    pub(crate) probe: Ipv4MulticastFlowProbe,
    pub(crate) monitor: &'a mut MulticastFlowMonitor<S>,
    pub(crate) classifier: &'a mut C,
    pub(crate) groups: &'a AddressGroups,
}

impl<S, C> ProbeHandle<'_, S, C>
where
    S: Scheduler,
    C: MulticastFlowClassifier,
{
    pub fn probe(&self) -> Ipv4MulticastFlowProbe {
        self.probe
    }

    /// The node's IPv4 layer sends `packet` out.
    ///
    /// An untagged multicast packet is a first transmission: it is
    /// classified, tagged and reported with the members of its destination
    /// group, this node excluded. A tagged packet is being relayed.
    pub fn send_outgoing(&mut self, packet: &mut Ipv4Packet) {
        if packet.tag.is_some() {
            self.forward(packet);
            return;
        }
        let Some((flow, id)) = self.classifier.classify(&packet.header) else {
            trace!(node = %self.probe.node, "not multicast, ignored");
            return;
        };
        packet.tag = Some(MulticastFlowTag { flow, packet: id });

        let node = self.probe.node;
        let groups = self.groups;
        let group = groups
            .members(packet.header.destination)
            .filter(|member| *member != node);
        self.monitor
            .report_first_tx(self.probe.id, flow, id, packet.size(), node, group);
    }

    /// The node relays `packet` toward other nodes.
    pub fn forward(&mut self, packet: &Ipv4Packet) {
        if let Some(tag) = self.tag(packet) {
            self.monitor.report_forwarding(
                self.probe.id,
                tag.flow,
                tag.packet,
                packet.size(),
                self.probe.node,
            );
        }
    }

    /// `packet` reached the transport layer of this node.
    pub fn local_deliver(&mut self, packet: &Ipv4Packet) {
        if let Some(tag) = self.tag(packet) {
            self.monitor.report_rx(
                self.probe.id,
                tag.flow,
                tag.packet,
                packet.size(),
                self.probe.node,
            );
        }
    }

    /// The IPv4 layer of this node dropped `packet`.
    pub fn drop(&mut self, packet: &Ipv4Packet, reason: Ipv4DropReason) {
        if let Some(tag) = self.tag(packet) {
            self.monitor.report_drop(
                self.probe.id,
                tag.flow,
                tag.packet,
                packet.size(),
                reason.code(),
                self.probe.node,
            );
        }
    }

    /// A second copy of `packet` reached this node and was discarded.
    pub fn duplicate_drop(&mut self, packet: &Ipv4Packet) {
        if let Some(tag) = self.tag(packet) {
            self.monitor.report_dup_drop(
                self.probe.id,
                tag.flow,
                tag.packet,
                packet.size(),
                self.probe.node,
            );
        }
    }

    fn tag(&self, packet: &Ipv4Packet) -> Option<MulticastFlowTag> {
        if packet.tag.is_none() {
            trace!(node = %self.probe.node, "untagged packet, ignored");
        }
        packet.tag
    }
}
