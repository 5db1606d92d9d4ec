//! Random multicast traffic over lossy links, with a deterministic seed.

use mcast_flowmon::{
    AddressGroups, Ipv4DropReason, Ipv4Header, Ipv4Packet, MulticastFlowMonitorHelper, NodeId,
};
use mcast_flowmon_core::{ManualScheduler, MonitorConfig};
use rand_chacha::ChaChaRng;
use rand_core::{Rng, SeedableRng as _};
use std::{collections::BTreeMap, net::Ipv4Addr, time::Duration};

const SINKS: u32 = 8;
const PACKETS: u32 = 500;

struct Expected {
    delivered: u64,
    dropped: u64,
    vanished: u64,
}

fn run(seed: u64) {
    let mut rng = ChaChaRng::seed_from_u64(seed);
    let group = Ipv4Addr::new(225, 0, 0, 7);
    let sinks: Vec<NodeId> = (1..=SINKS).map(NodeId::new).collect();
    let groups: AddressGroups = [(group, sinks.clone())].into_iter().collect();

    let config = MonitorConfig::default()
        .set_max_per_hop_delay(Duration::from_millis(200))
        .set_sweep_interval(Duration::from_millis(50));
    let mut helper =
        MulticastFlowMonitorHelper::new(config, ManualScheduler::new(), groups).unwrap();
    helper.install(NodeId::new(0));
    helper.install_all(sinks.iter().copied());
    helper.monitor_mut().start_right_now().unwrap();

    let mut expected: BTreeMap<NodeId, Expected> = sinks
        .iter()
        .map(|sink| {
            (
                *sink,
                Expected {
                    delivered: 0,
                    dropped: 0,
                    vanished: 0,
                },
            )
        })
        .collect();

    for _ in 0..PACKETS {
        let mut packet = Ipv4Packet::new(
            Ipv4Header {
                source: Ipv4Addr::new(10, 0, 0, 1),
                destination: group,
                protocol: 17,
                source_port: 4000,
                destination_port: 9,
            },
            (rng.next_u64() % 1_400) as u32,
        );
        helper
            .probe(NodeId::new(0))
            .unwrap()
            .send_outgoing(&mut packet);

        for sink in &sinks {
            let delay = Duration::from_micros(rng.next_u64() % 20_000);
            helper.monitor_mut().advance(delay / 8);

            let mut probe = helper.probe(*sink).unwrap();
            let entry = expected.get_mut(sink).unwrap();
            match rng.next_u64() % 10 {
                0 => {
                    probe.drop(&packet, Ipv4DropReason::TtlExpire);
                    entry.dropped += 1;
                }
                1 => entry.vanished += 1,
                2 => {
                    // a duplicate copy arrives as well
                    probe.local_deliver(&packet);
                    probe.duplicate_drop(&packet);
                    entry.delivered += 1;
                }
                _ => {
                    probe.local_deliver(&packet);
                    entry.delivered += 1;
                }
            }
        }
    }

    helper.monitor_mut().stop_right_now();
    helper.monitor_mut().drain();

    let monitor = helper.monitor();
    assert!(monitor.tracked_packets().is_empty());
    assert_eq!(monitor.anomalies().total(), 0);

    let stats = monitor.flow_stats().values().next().unwrap();
    assert_eq!(stats.tx_packets, u64::from(PACKETS));
    for (sink, expected) in expected {
        let destination = &stats.destinations[&sink];
        assert_eq!(destination.rx_packets, expected.delivered, "seed {seed} sink {sink}");
        assert_eq!(
            destination.packets_dropped_total(),
            expected.dropped,
            "seed {seed} sink {sink}"
        );
        assert_eq!(destination.lost_packets, expected.vanished, "seed {seed} sink {sink}");
    }
}

#[test]
fn random_traffic() {
    for seed in [0, 1, 42, 99] {
        run(seed);
    }
}
