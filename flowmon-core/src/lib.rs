//! Statistics and lifecycle engine of a multicast flow monitor.
//!
//! Probes attached to the nodes of a simulated network report what they
//! see of each packet: its first transmission, relaying, delivery,
//! drops and discarded duplicates. The [`MulticastFlowMonitor`] turns
//! those reports into per-flow, per-destination statistics (delay,
//! jitter, loss, drops) and declares lost the packets that never made it
//! to some member of their group.
//!
//! The engine knows nothing about the network stack. Packets are
//! identified by a [`FlowId`] and a [`PacketId`] given by the caller, and
//! time comes from a [`Scheduler`].

pub mod defaults;
pub mod stats;

mod anomaly;
mod config;
mod id;
mod monitor;
mod probe;
mod scheduler;
mod summary;
mod sweep;
mod time;
mod tracked;

pub use self::{
    anomaly::{Anomalies, AnomalyKind},
    config::{ConfigError, MonitorConfig},
    id::{FlowId, NodeId, PacketId, ProbeId},
    monitor::{MonitorState, MulticastFlowMonitor},
    probe::{ProbeFlowStats, ProbeInfo, ProbeKind, ProbeRecord},
    scheduler::{EventId, ManualScheduler, MonitorEvent, Scheduler},
    stats::{
        DROP_REASON_CODES, DestinationStats, FlowStatsContainer, MulticastFlowStats, Resolution,
    },
    summary::DestinationSummary,
    sweep::SweepReport,
    time::{DurationParseError, SimTime, parse_duration},
    tracked::{TrackedPacket, TrackedPacketTable},
};
