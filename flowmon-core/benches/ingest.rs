use criterion::{
    BenchmarkGroup, Criterion, Throughput, black_box, criterion_group, criterion_main,
    measurement::WallTime,
};
use mcast_flowmon_core::{
    FlowId, ManualScheduler, MonitorConfig, MulticastFlowMonitor, NodeId, PacketId, ProbeId,
    ProbeInfo, ProbeKind,
};
use std::time::Duration;

const PACKET_SIZE: u32 = 1_000;

fn monitor() -> (MulticastFlowMonitor<ManualScheduler>, ProbeId) {
    let config = MonitorConfig::default().set_sweep_interval(Duration::from_secs(3_600));
    let mut monitor = MulticastFlowMonitor::new(config, ManualScheduler::new()).unwrap();
    let probe = monitor.add_probe(ProbeInfo {
        node: NodeId::new(0),
        kind: ProbeKind::Ipv4,
    });
    monitor.start_right_now().unwrap();
    (monitor, probe)
}

const BURST: u32 = 1_000;

/// Each iteration starts from an empty monitor, so the tracked packets
/// and flow ledger sizes do not depend on how many iterations ran.
fn deliver(c: &mut Criterion) {
    let flow = FlowId::new(1);
    let group = [NodeId::new(1), NodeId::new(2), NodeId::new(3)];

    let mut bench = c.benchmark_group("deliver");
    bench.throughput(Throughput::Elements(u64::from(BURST)));
    bench.bench_function("3 destinations", |b| {
        b.iter_batched(
            monitor,
            |(mut monitor, probe)| {
                for id in 0..BURST {
                    let packet = PacketId::new(id);
                    monitor.report_first_tx(
                        probe,
                        flow,
                        packet,
                        PACKET_SIZE,
                        NodeId::new(0),
                        group,
                    );
                    for node in group {
                        monitor.report_rx(probe, flow, black_box(packet), PACKET_SIZE, node);
                    }
                }
                monitor.check_for_lost_packets();
                monitor
            },
            criterion::BatchSize::SmallInput,
        )
    });
    bench.finish();
}

fn bench_sweep_size(group: &mut BenchmarkGroup<'_, WallTime>, size: u32) {
    let destinations: Vec<_> = (1..=8).map(NodeId::new).collect();

    group.throughput(Throughput::Elements(u64::from(size)));
    group.bench_function(format!("{size} packets"), |b| {
        b.iter_batched(
            || {
                let (mut monitor, probe) = monitor();
                // half of the packets only reach the first destination
                for id in 0..size {
                    let packet = PacketId::new(id);
                    monitor.report_first_tx(
                        probe,
                        FlowId::new(id % 16),
                        packet,
                        PACKET_SIZE,
                        NodeId::new(0),
                        destinations.iter().copied(),
                    );
                    if id % 2 == 0 {
                        monitor.report_rx(
                            probe,
                            FlowId::new(id % 16),
                            packet,
                            PACKET_SIZE,
                            destinations[0],
                        );
                    }
                }
                monitor
            },
            |mut monitor| monitor.drain(),
            criterion::BatchSize::LargeInput,
        )
    });
}

fn sweep(c: &mut Criterion) {
    let mut group = c.benchmark_group("drain");

    for size in [1_000, 10_000, 100_000] {
        bench_sweep_size(&mut group, size);
    }

    group.finish();
}

criterion_group!(benches, deliver, sweep);
criterion_main!(benches);
