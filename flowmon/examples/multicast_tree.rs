//! Multicast over a two level tree with random losses.
//!
//! A source sends to every sink through a single relay. Each hop may
//! drop the packet, some packets vanish without any drop being reported.
//!
//! Run with:
//!   RUST_LOG=debug cargo run --example multicast_tree -p mcast-flowmon -- --sinks 6

use anyhow::{Context as _, Result};
use clap::Parser;
use mcast_flowmon::{
    AddressGroups, Ipv4DropReason, Ipv4Header, Ipv4Packet, ManualScheduler, MonitorConfig,
    MulticastFlowMonitorHelper, NodeId,
};
use rand_chacha::ChaChaRng;
use rand_core::{Rng, SeedableRng as _};
use std::{net::Ipv4Addr, path::PathBuf, time::Duration};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
struct Command {
    #[arg(long, default_value = "4")]
    sinks: u32,

    #[arg(long, default_value = "1000")]
    packets: u32,

    /// interval between two packets of the source, in milliseconds
    #[arg(long, default_value = "10")]
    every: u64,

    /// chance, in percent, for a hop to drop a packet
    #[arg(long, default_value = "2")]
    loss: u64,

    #[arg(long, default_value = "0")]
    seed: u64,

    #[arg(long, default_value = "500ms")]
    max_per_hop_delay: String,

    #[arg(long)]
    json: Option<PathBuf>,

    #[arg(long)]
    csv: Option<PathBuf>,
}

const SOURCE: NodeId = NodeId::new(0);
const RELAY: NodeId = NodeId::new(1);
const GROUP: Ipv4Addr = Ipv4Addr::new(225, 1, 2, 4);
const LATENCY: Duration = Duration::from_millis(3);

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cmd = Command::parse();
    let mut rng = ChaChaRng::seed_from_u64(cmd.seed);

    let config = MonitorConfig::default()
        .set_max_per_hop_delay_str(&cmd.max_per_hop_delay)
        .context("Invalid --max-per-hop-delay")?;

    let sinks: Vec<NodeId> = (0..cmd.sinks).map(|i| NodeId::new(i + 2)).collect();
    let groups: AddressGroups = [(GROUP, sinks.clone())].into_iter().collect();

    let mut helper = MulticastFlowMonitorHelper::new(config, ManualScheduler::new(), groups)?;
    helper.install_all([SOURCE, RELAY]);
    helper.install_all(sinks.iter().copied());

    let every = Duration::from_millis(cmd.every);
    let duration = every * cmd.packets;
    helper.monitor_mut().start(every)?;
    helper.monitor_mut().stop(duration + every)?;

    let header = Ipv4Header {
        source: Ipv4Addr::new(10, 1, 1, 1),
        destination: GROUP,
        protocol: 17,
        source_port: 49153,
        destination_port: 9,
    };
    let lossy = |rng: &mut ChaChaRng| rng.next_u64() % 100 < cmd.loss;

    for _ in 0..cmd.packets {
        helper.monitor_mut().advance(every);

        let mut packet = Ipv4Packet::new(header, 1_000);
        if let Some(mut probe) = helper.probe(SOURCE) {
            probe.send_outgoing(&mut packet);
        }

        helper.monitor_mut().advance(LATENCY);
        if lossy(&mut rng) {
            if let Some(mut probe) = helper.probe(RELAY) {
                probe.drop(&packet, Ipv4DropReason::Queue);
            }
            continue;
        }
        if let Some(mut probe) = helper.probe(RELAY) {
            probe.forward(&packet);
        }

        for sink in &sinks {
            let Some(mut probe) = helper.probe(*sink) else {
                continue;
            };
            match rng.next_u64() % 100 {
                n if n < cmd.loss => probe.drop(&packet, Ipv4DropReason::TtlExpire),
                // gone without a trace, the sweep will find out
                n if n < 2 * cmd.loss => {}
                _ => probe.local_deliver(&packet),
            }
        }
    }

    helper.monitor_mut().advance(every * 2);
    let report = helper.monitor_mut().drain();
    println!(
        "{} packets still tracked at the end, {} declared lost by the final drain",
        report.examined, report.declared_lost
    );

    for (flow, stats) in helper.monitor().flow_stats() {
        println!(
            "flow {flow}: {} packets sent, {} bytes",
            stats.tx_packets, stats.tx_bytes
        );
        for summary in stats.summaries() {
            let destination = &stats.destinations[&summary.destination];
            println!(
                "  node {:>3}: rx {:>5} lost {:>4} dropped {:>4} delay {:>10?} loss {:>6.2}%",
                summary.destination,
                destination.rx_packets,
                destination.lost_packets,
                summary.packets_dropped,
                summary.mean_delay.unwrap_or_default(),
                summary.loss_ratio.unwrap_or_default() * 100.0,
            );
        }
    }

    let anomalies = helper.monitor().anomalies();
    for (kind, count) in anomalies.iter() {
        println!("anomaly {kind}: {count}");
    }

    if let Some(path) = cmd.json {
        helper.serialize_to_json_file(&path)?;
        println!("statistics written to {}", path.display());
    }
    if let Some(path) = cmd.csv {
        helper.serialize_to_csv_file(&path)?;
        println!("statistics written to {}", path.display());
    }

    Ok(())
}
