//! Export of the monitor's statistics, as JSON or as CSV.

use crate::classifier::{FiveTuple, MulticastFlowClassifier};
use mcast_flowmon_core::{
    DestinationSummary, FlowId, MonitorState, MulticastFlowMonitor, MulticastFlowStats,
    ProbeRecord, Scheduler, SimTime,
};
use serde::Serialize;
use std::{collections::BTreeMap, io::Write, time::Duration};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("I/O error")]
    Io(#[from] std::io::Error),
    #[error("JSON serialization error")]
    Json(#[from] serde_json::Error),
}

/// Everything the monitor knows at one point in simulated time.
#[derive(Debug, Serialize)]
pub struct Snapshot<'a> {
    pub now: SimTime,
    pub state: MonitorState,
    /// packets not resolved for every destination yet
    pub tracked_packets: usize,
    pub flows: Vec<FlowReport<'a>>,
    pub probes: &'a [ProbeRecord],
    pub anomalies: AnomalyReport,
}

#[derive(Debug, Serialize)]
pub struct FlowReport<'a> {
    pub flow: FlowId,
    /// `None` if the classifier does not know the flow
    pub five_tuple: Option<FiveTuple>,
    pub stats: &'a MulticastFlowStats,
    pub summaries: Vec<DestinationSummary>,
}

#[derive(Debug, Default, Serialize)]
pub struct AnomalyReport {
    /// non-zero anomaly counters, by anomaly description
    pub counts: BTreeMap<String, u64>,
    pub ignored_while_idle: u64,
    pub ignored_after_stop: u64,
}

impl<'a> Snapshot<'a> {
    pub fn new<S, C>(monitor: &'a MulticastFlowMonitor<S>, classifier: &C) -> Self
    where
        S: Scheduler,
        C: MulticastFlowClassifier,
    {
        let flows = monitor
            .flow_stats()
            .iter()
            .map(|(flow, stats)| FlowReport {
                flow: *flow,
                five_tuple: classifier.find_flow(*flow),
                stats,
                summaries: stats.summaries(),
            })
            .collect();

        let anomalies = monitor.anomalies();
        let anomalies = AnomalyReport {
            counts: anomalies
                .iter()
                .map(|(kind, count)| (kind.to_string(), count))
                .collect(),
            ignored_while_idle: anomalies.ignored_while_idle(),
            ignored_after_stop: anomalies.ignored_after_stop(),
        };

        Self {
            now: monitor.now(),
            state: monitor.state(),
            tracked_packets: monitor.tracked_packets().len(),
            flows,
            probes: monitor.probes(),
            anomalies,
        }
    }
}

pub fn write_json<W: Write>(snapshot: &Snapshot<'_>, writer: W) -> Result<(), ExportError> {
    serde_json::to_writer_pretty(writer, snapshot)?;
    Ok(())
}

pub fn to_json_string(snapshot: &Snapshot<'_>) -> Result<String, ExportError> {
    Ok(serde_json::to_string_pretty(snapshot)?)
}

pub const CSV_HEADER: &str = "flow,source,group,destination,tx_packets,tx_bytes,rx_packets,rx_bytes,mean_delay_ms,mean_jitter_ms,packets_dropped,bytes_dropped,dups_dropped,lost_packets";

/// One line per flow and per destination of its group, the lost packets
/// in the last column.
pub fn write_csv<W: Write>(snapshot: &Snapshot<'_>, mut writer: W) -> Result<(), ExportError> {
    writeln!(writer, "{CSV_HEADER}")?;

    for report in &snapshot.flows {
        let (source, group) = report
            .five_tuple
            .map(|tuple| (tuple.source.to_string(), tuple.destination.to_string()))
            .unwrap_or_default();

        for summary in &report.summaries {
            let Some(destination) = report.stats.destination(summary.destination) else {
                continue;
            };
            writeln!(
                writer,
                "{},{},{},{},{},{},{},{},{},{},{},{},{},{}",
                report.flow,
                source,
                group,
                summary.destination,
                report.stats.tx_packets,
                report.stats.tx_bytes,
                destination.rx_packets,
                destination.rx_bytes,
                millis(summary.mean_delay),
                millis(summary.mean_jitter),
                summary.packets_dropped,
                summary.bytes_dropped,
                destination.dups_dropped,
                destination.lost_packets,
            )?;
        }
    }

    writer.flush()?;
    Ok(())
}

fn millis(duration: Option<Duration>) -> String {
    duration
        .map(|d| format!("{:.3}", d.as_secs_f64() * 1_000.0))
        .unwrap_or_default()
}
