use mcast_flowmon_core::{FlowId, PacketId};
use serde::Serialize;
use std::{collections::HashMap, fmt, net::Ipv4Addr};

/// Header fields of an IPv4 packet the probes and the classifier look at.
///
/// `source_port` and `destination_port` are the transport ports, zero for
/// protocols that have none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ipv4Header {
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
    pub protocol: u8,
    pub source_port: u16,
    pub destination_port: u16,
}

impl Ipv4Header {
    /// size of an IPv4 header without options
    pub const SIZE: u32 = 20;

    pub fn five_tuple(&self) -> FiveTuple {
        FiveTuple {
            source: self.source,
            destination: self.destination,
            protocol: self.protocol,
            source_port: self.source_port,
            destination_port: self.destination_port,
        }
    }
}

/// The fields identifying a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct FiveTuple {
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
    pub protocol: u8,
    pub source_port: u16,
    pub destination_port: u16,
}

impl fmt::Display for FiveTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} -> {}:{} ({})",
            self.source, self.source_port, self.destination, self.destination_port, self.protocol
        )
    }
}

/// Maps packet headers to `(FlowId, PacketId)` pairs.
pub trait MulticastFlowClassifier {
    /// Classify the packet about to be transmitted for the first time.
    ///
    /// Returns `None` for packets that are not multicast traffic. Every
    /// call for a multicast packet numbers a new packet of its flow.
    fn classify(&mut self, header: &Ipv4Header) -> Option<(FlowId, PacketId)>;

    /// the five tuple a flow was created for
    fn find_flow(&self, flow: FlowId) -> Option<FiveTuple>;
}

/// Classifies IPv4 multicast traffic by [`FiveTuple`].
///
/// Flow identifiers are handed out in order of first appearance,
/// starting at 1. Packets are numbered per flow, starting at 0.
#[derive(Debug, Default)]
pub struct Ipv4MulticastFlowClassifier {
    flows: HashMap<FiveTuple, (FlowId, PacketId)>,
    tuples: Vec<FiveTuple>,
}

impl Ipv4MulticastFlowClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// number of flows seen so far
    pub fn len(&self) -> usize {
        self.tuples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }
}

impl MulticastFlowClassifier for Ipv4MulticastFlowClassifier {
    fn classify(&mut self, header: &Ipv4Header) -> Option<(FlowId, PacketId)> {
        if !header.destination.is_multicast() {
            return None;
        }

        let tuple = header.five_tuple();
        let next_flow = FlowId::new(self.tuples.len() as u32 + 1);
        let (flow, next_packet) = self.flows.entry(tuple).or_insert_with(|| {
            self.tuples.push(tuple);
            (next_flow, PacketId::new(0))
        });

        let packet = *next_packet;
        *next_packet = packet.next();
        Some((*flow, packet))
    }

    fn find_flow(&self, flow: FlowId) -> Option<FiveTuple> {
        let index = (flow.into_u32() as usize).checked_sub(1)?;
        self.tuples.get(index).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(destination: [u8; 4], source_port: u16) -> Ipv4Header {
        Ipv4Header {
            source: Ipv4Addr::new(10, 0, 0, 1),
            destination: Ipv4Addr::from(destination),
            protocol: 17,
            source_port,
            destination_port: 9,
        }
    }

    #[test]
    fn unicast_is_not_classified() {
        let mut classifier = Ipv4MulticastFlowClassifier::new();
        assert!(classifier.classify(&header([10, 0, 0, 2], 1000)).is_none());
        assert!(classifier.is_empty());
    }

    #[test]
    fn packets_numbered_per_flow() {
        let mut classifier = Ipv4MulticastFlowClassifier::new();
        let a = header([225, 1, 2, 3], 1000);
        let b = header([225, 1, 2, 3], 1001);

        assert_eq!(classifier.classify(&a), Some((FlowId::new(1), PacketId::new(0))));
        assert_eq!(classifier.classify(&a), Some((FlowId::new(1), PacketId::new(1))));
        assert_eq!(classifier.classify(&b), Some((FlowId::new(2), PacketId::new(0))));
        assert_eq!(classifier.classify(&a), Some((FlowId::new(1), PacketId::new(2))));

        assert_eq!(classifier.len(), 2);
        assert_eq!(classifier.find_flow(FlowId::new(2)), Some(b.five_tuple()));
        assert_eq!(classifier.find_flow(FlowId::new(0)), None);
        assert_eq!(classifier.find_flow(FlowId::new(3)), None);
    }
}
