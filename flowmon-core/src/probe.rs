use crate::{FlowId, NodeId, ProbeId, stats::add_at};
use serde::Serialize;
use std::{collections::BTreeMap, time::Duration};

/// The traffic layer a probe observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ProbeKind {
    Ipv4,
}

/// Description of a probe, given at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ProbeInfo {
    /// the node the probe is attached to
    pub node: NodeId,
    pub kind: ProbeKind,
}

/// What a probe reported about one flow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProbeFlowStats {
    /// Packets of the flow that went past this probe.
    pub packets: u64,
    /// Bytes of the flow that went past this probe.
    pub bytes: u64,
    /// Sum, over those packets, of the time elapsed since the packet was
    /// first transmitted.
    pub delay_from_first_probe_sum: Duration,
    /// Packets dropped at this probe, indexed by reason code.
    pub packets_dropped: Vec<u64>,
    /// Bytes dropped at this probe, indexed by reason code.
    pub bytes_dropped: Vec<u64>,
}

/// A registered probe and its per-flow statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeRecord {
    pub id: ProbeId,
    pub info: ProbeInfo,
    pub flows: BTreeMap<FlowId, ProbeFlowStats>,
}

impl ProbeRecord {
    pub(crate) fn new(id: ProbeId, info: ProbeInfo) -> Self {
        Self {
            id,
            info,
            flows: BTreeMap::new(),
        }
    }

    pub(crate) fn add_packet(&mut self, flow: FlowId, bytes: u64, delay_from_first_probe: Duration) {
        let stats = self.flows.entry(flow).or_default();
        stats.packets += 1;
        stats.bytes += bytes;
        stats.delay_from_first_probe_sum += delay_from_first_probe;
    }

    pub(crate) fn add_drop(&mut self, flow: FlowId, bytes: u64, reason: u32) {
        let stats = self.flows.entry(flow).or_default();
        add_at(&mut stats.packets_dropped, reason, 1);
        add_at(&mut stats.bytes_dropped, reason, bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_flow_accounting() {
        let info = ProbeInfo {
            node: NodeId::new(3),
            kind: ProbeKind::Ipv4,
        };
        let mut record = ProbeRecord::new(ProbeId::new(0), info);
        let flow = FlowId::new(1);

        record.add_packet(flow, 100, Duration::ZERO);
        record.add_packet(flow, 100, Duration::from_millis(5));
        record.add_drop(flow, 100, 2);

        let stats = &record.flows[&flow];
        assert_eq!(stats.packets, 2);
        assert_eq!(stats.bytes, 200);
        assert_eq!(stats.delay_from_first_probe_sum, Duration::from_millis(5));
        assert_eq!(stats.packets_dropped, vec![0, 0, 1]);
    }
}
