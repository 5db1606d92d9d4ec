/*!
# Multicast flow monitor

IPv4 glue for [`mcast_flowmon_core`]: a five-tuple flow classifier,
the probes hooked on the IPv4 layer of each node, a helper installing
them, and JSON/CSV export of the collected statistics.

```
use mcast_flowmon::{AddressGroups, Ipv4Header, Ipv4Packet, MulticastFlowMonitorHelper};
use mcast_flowmon_core::{ManualScheduler, MonitorConfig, NodeId};
use std::net::Ipv4Addr;

let group = Ipv4Addr::new(225, 1, 2, 4);
let (source, sink) = (NodeId::new(0), NodeId::new(1));
let groups: AddressGroups = [(group, [sink])].into_iter().collect();

let mut helper =
    MulticastFlowMonitorHelper::new(MonitorConfig::default(), ManualScheduler::new(), groups)?;
helper.install_all([source, sink]);
helper.monitor_mut().start_right_now()?;

let header = Ipv4Header {
    source: Ipv4Addr::new(10, 0, 0, 1),
    destination: group,
    protocol: 17,
    source_port: 5000,
    destination_port: 9,
};
let mut packet = Ipv4Packet::new(header, 80);
if let Some(mut probe) = helper.probe(source) {
    probe.send_outgoing(&mut packet);
}
if let Some(mut probe) = helper.probe(sink) {
    probe.local_deliver(&packet);
}

let stats = helper.monitor().flow_stats();
assert_eq!(stats.values().next().map(|s| s.rx_packets_total()), Some(1));
# Ok::<(), anyhow::Error>(())
```
*/

mod classifier;
pub mod export;
mod helper;
mod probe;

// convenient re-export of `mcast_flowmon_core` objects
pub use mcast_flowmon_core::{
    FlowId, ManualScheduler, MonitorConfig, MulticastFlowMonitor, MulticastFlowStats, NodeId,
    PacketId, SimTime,
};

pub use self::{
    classifier::{FiveTuple, Ipv4Header, Ipv4MulticastFlowClassifier, MulticastFlowClassifier},
    export::{ExportError, Snapshot},
    helper::{AddressGroups, MulticastFlowMonitorHelper},
    probe::{
        Ipv4DropReason, Ipv4MulticastFlowProbe, Ipv4Packet, MulticastFlowTag, ProbeHandle,
        UnknownDropReason,
    },
};
