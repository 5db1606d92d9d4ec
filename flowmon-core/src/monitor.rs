use crate::{
    ConfigError, FlowId, ManualScheduler, MonitorConfig, MonitorEvent, MulticastFlowStats, NodeId,
    PacketId, ProbeId, Scheduler, SimTime,
    anomaly::{Anomalies, AnomalyKind},
    probe::{ProbeInfo, ProbeRecord},
    scheduler::EventId,
    stats::{DROP_REASON_CODES, FlowStatsContainer, Resolution},
    sweep::{LossPolicy, SweepReport, sweep},
    tracked::TrackedPacketTable,
};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Monitoring window of a [`MulticastFlowMonitor`].
///
/// ```text
/// Idle ──start──► Running ──stop──► Stopped
///   └─────────────stop──────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MonitorState {
    /// reports are ignored until monitoring starts
    Idle,
    Running,
    /// terminal, reports are ignored but statistics stay available
    Stopped,
}

/// Collects end-to-end statistics of multicast flows.
///
/// Probes placed at the send, forward, receive and drop points of the
/// simulated network report what they observe through the `report_*`
/// methods. The monitor keeps one [`TrackedPacket`] per packet in flight
/// and reconstructs, per flow and per destination of the flow's
/// multicast group, the delay, jitter, loss, drops and duplicates.
///
/// Packets still pending for some destination after
/// [`MonitorConfig::max_per_hop_delay`] are declared lost by the lost
/// packet sweep, which runs periodically while monitoring and once more
/// when monitoring stops.
///
/// # Example
///
/// ```
/// use mcast_flowmon_core::{
///     FlowId, ManualScheduler, MonitorConfig, MulticastFlowMonitor, NodeId, PacketId, ProbeInfo,
///     ProbeKind, SimTime,
/// };
///
/// let mut monitor = MulticastFlowMonitor::new(MonitorConfig::default(), ManualScheduler::new())?;
/// let probe = monitor.add_probe(ProbeInfo { node: NodeId::new(0), kind: ProbeKind::Ipv4 });
/// monitor.start_right_now()?;
///
/// let (flow, packet) = (FlowId::new(1), PacketId::new(1));
/// let (a, b) = (NodeId::new(1), NodeId::new(2));
/// monitor.report_first_tx(probe, flow, packet, 100, NodeId::new(0), [a, b]);
///
/// monitor.advance_to(SimTime::from_millis(1));
/// monitor.report_rx(probe, flow, packet, 100, a);
///
/// monitor.stop_right_now();
/// monitor.drain();
///
/// let stats = &monitor.flow_stats()[&flow];
/// assert_eq!(stats.destinations[&a].rx_packets, 1);
/// assert_eq!(stats.destinations[&b].lost_packets, 1);
/// # Ok::<(), mcast_flowmon_core::ConfigError>(())
/// ```
///
/// [`TrackedPacket`]: crate::TrackedPacket
pub struct MulticastFlowMonitor<S> {
    config: MonitorConfig,

    scheduler: S,

    state: MonitorState,

    tracked: TrackedPacketTable,

    flow_stats: FlowStatsContainer,

    /// indexed by [`ProbeId`]
    probes: Vec<ProbeRecord>,

    anomalies: Anomalies,

    start_event: Option<(EventId, SimTime)>,
    stop_event: Option<(EventId, SimTime)>,
    sweep_event: Option<EventId>,
}

impl<S> MulticastFlowMonitor<S>
where
    S: Scheduler,
{
    /// Create an idle monitor.
    ///
    /// # Errors
    ///
    /// Fails if `config` does not pass [`MonitorConfig::validate`].
    pub fn new(config: MonitorConfig, scheduler: S) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            config,
            scheduler,
            state: MonitorState::Idle,
            tracked: TrackedPacketTable::new(),
            flow_stats: FlowStatsContainer::new(),
            probes: Vec::new(),
            anomalies: Anomalies::default(),
            start_event: None,
            stop_event: None,
            sweep_event: None,
        })
    }

    #[inline]
    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    #[inline]
    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    /// Mutable access to the scheduler, for drivers that pop the due
    /// events themselves and hand them to [`Self::handle_event`].
    #[inline]
    pub fn scheduler_mut(&mut self) -> &mut S {
        &mut self.scheduler
    }

    #[inline]
    pub fn now(&self) -> SimTime {
        self.scheduler.now()
    }

    #[inline]
    pub fn state(&self) -> MonitorState {
        self.state
    }

    /// Start monitoring `delay` from now.
    ///
    /// Replaces any previously scheduled start.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::AlreadyStopped`] if monitoring already stopped.
    /// - [`ConfigError::StopBeforeStart`] if a stop is scheduled at or
    ///   before the requested start.
    pub fn start(&mut self, delay: Duration) -> Result<(), ConfigError> {
        if self.state == MonitorState::Stopped {
            return Err(ConfigError::AlreadyStopped);
        }
        let start = self.now() + delay;
        if let Some((_, stop)) = self.stop_event {
            if stop <= start {
                return Err(ConfigError::StopBeforeStart { start, stop });
            }
        }

        if let Some((id, _)) = self.start_event.take() {
            self.scheduler.cancel(id);
        }
        let id = self.scheduler.schedule_after(delay, MonitorEvent::Start);
        self.start_event = Some((id, start));
        debug!(%start, "monitoring start scheduled");
        Ok(())
    }

    /// Stop monitoring `delay` from now.
    ///
    /// Replaces any previously scheduled stop.
    ///
    /// # Errors
    ///
    /// [`ConfigError::StopBeforeStart`] if a start is scheduled at or
    /// after the requested stop.
    pub fn stop(&mut self, delay: Duration) -> Result<(), ConfigError> {
        let stop = self.now() + delay;
        if let Some((_, start)) = self.start_event {
            if stop <= start {
                return Err(ConfigError::StopBeforeStart { start, stop });
            }
        }

        if let Some((id, _)) = self.stop_event.take() {
            self.scheduler.cancel(id);
        }
        if self.state == MonitorState::Stopped {
            return Ok(());
        }
        let id = self.scheduler.schedule_after(delay, MonitorEvent::Stop);
        self.stop_event = Some((id, stop));
        debug!(%stop, "monitoring stop scheduled");
        Ok(())
    }

    /// Begin monitoring right now.
    ///
    /// Cancels a scheduled start. Does nothing if already running.
    ///
    /// # Errors
    ///
    /// [`ConfigError::AlreadyStopped`] if monitoring already stopped.
    pub fn start_right_now(&mut self) -> Result<(), ConfigError> {
        if let Some((id, _)) = self.start_event.take() {
            self.scheduler.cancel(id);
        }
        match self.state {
            MonitorState::Stopped => Err(ConfigError::AlreadyStopped),
            MonitorState::Running => Ok(()),
            MonitorState::Idle => {
                self.enter_running();
                Ok(())
            }
        }
    }

    /// End monitoring right now.
    ///
    /// Runs a last sweep with the configured threshold, cancels the
    /// periodic sweep and any scheduled start or stop. Packets younger
    /// than the threshold stay tracked; use
    /// [`Self::check_for_lost_packets`] later on, or [`Self::drain`], to
    /// resolve them.
    pub fn stop_right_now(&mut self) {
        for (id, _) in [self.start_event.take(), self.stop_event.take()]
            .into_iter()
            .flatten()
        {
            self.scheduler.cancel(id);
        }
        self.enter_stopped();
    }

    /// Entry point for the events previously handed to the scheduler.
    pub fn handle_event(&mut self, event: MonitorEvent) {
        match event {
            MonitorEvent::Start => {
                self.start_event = None;
                match self.state {
                    MonitorState::Idle => self.enter_running(),
                    MonitorState::Running => {}
                    MonitorState::Stopped => warn!("start event after monitoring stopped, ignored"),
                }
            }
            MonitorEvent::Stop => {
                self.stop_event = None;
                self.enter_stopped();
            }
            MonitorEvent::PeriodicSweep => {
                self.sweep_event = None;
                if self.state == MonitorState::Running {
                    self.check_for_lost_packets();
                    self.schedule_sweep();
                }
            }
        }
    }

    fn enter_running(&mut self) {
        self.state = MonitorState::Running;
        self.schedule_sweep();
        debug!(now = %self.now(), "monitoring started");
    }

    fn enter_stopped(&mut self) {
        match self.state {
            MonitorState::Stopped => return,
            MonitorState::Running => {
                self.check_for_lost_packets();
            }
            MonitorState::Idle => {}
        }
        if let Some(id) = self.sweep_event.take() {
            self.scheduler.cancel(id);
        }
        self.state = MonitorState::Stopped;
        debug!(
            now = %self.now(),
            tracked = self.tracked.len(),
            "monitoring stopped"
        );
    }

    fn schedule_sweep(&mut self) {
        if let Some(id) = self.sweep_event.take() {
            self.scheduler.cancel(id);
        }
        let id = self
            .scheduler
            .schedule_after(self.config.sweep_interval(), MonitorEvent::PeriodicSweep);
        self.sweep_event = Some(id);
    }

    /// Register a probe reporting to this monitor.
    pub fn add_probe(&mut self, info: ProbeInfo) -> ProbeId {
        let id = probe_id(self.probes.len());
        if u32::try_from(self.probes.len()).is_err() {
            warn!(node = %info.node, "probe identifiers exhausted, sharing the last one");
        }
        self.probes.push(ProbeRecord::new(id, info));
        debug!(probe = %id, node = %info.node, "probe registered");
        id
    }

    /// every registered probe, in registration order
    pub fn probes(&self) -> &[ProbeRecord] {
        &self.probes
    }

    /// Report a packet entering the network at its source.
    ///
    /// The first packet of a flow defines the flow's delivery `group`;
    /// the group given with later packets is not looked at.
    pub fn report_first_tx<G>(
        &mut self,
        probe: ProbeId,
        flow: FlowId,
        packet: PacketId,
        packet_size: u32,
        tx_node: NodeId,
        group: G,
    ) where
        G: IntoIterator<Item = NodeId>,
    {
        if !self.accepting() {
            return;
        }
        let now = self.now();
        let bytes = u64::from(packet_size);

        // the flow ledger remembers the packet even once it is pruned
        let stats = self
            .flow_stats
            .entry(flow)
            .or_insert_with(|| MulticastFlowStats::new(now, group));
        if !stats.record_tx(packet, now, bytes) {
            self.anomaly(AnomalyKind::DuplicateFirstTx, probe, flow, packet, tx_node);
            return;
        }

        self.tracked.insert(flow, packet, now);
        self.probe_packet(probe, flow, bytes, Duration::ZERO);

        trace!(%probe, %flow, %packet, %tx_node, packet_size, "first tx");
    }

    /// Report a packet relayed by an intermediate node.
    pub fn report_forwarding(
        &mut self,
        probe: ProbeId,
        flow: FlowId,
        packet: PacketId,
        packet_size: u32,
        node: NodeId,
    ) {
        if !self.accepting() {
            return;
        }
        match self.apply_forwarding(flow, packet) {
            Ok(delay) => {
                self.probe_packet(probe, flow, u64::from(packet_size), delay);
                trace!(%probe, %flow, %packet, %node, "forwarding");
            }
            Err(kind) => self.anomaly(kind, probe, flow, packet, node),
        }
    }

    /// Report a packet delivered to `node`, a destination of its flow.
    pub fn report_rx(
        &mut self,
        probe: ProbeId,
        flow: FlowId,
        packet: PacketId,
        packet_size: u32,
        node: NodeId,
    ) {
        if !self.accepting() {
            return;
        }
        let bytes = u64::from(packet_size);
        match self.apply_rx(flow, packet, bytes, node) {
            Ok(delay) => {
                self.probe_packet(probe, flow, bytes, delay);
                trace!(%probe, %flow, %packet, %node, ?delay, "rx");
            }
            Err(kind) => self.anomaly(kind, probe, flow, packet, node),
        }
    }

    /// Report a packet dropped at `node` for the reason `reason_code`.
    ///
    /// A drop at a destination of the flow resolves the packet for that
    /// destination. A drop at a relay outside the group is only counted
    /// in the flow's transit drops; the destinations behind it will be
    /// resolved by the sweep. `reason_code` must be below
    /// [`DROP_REASON_CODES`].
    pub fn report_drop(
        &mut self,
        probe: ProbeId,
        flow: FlowId,
        packet: PacketId,
        packet_size: u32,
        reason_code: u32,
        node: NodeId,
    ) {
        if !self.accepting() {
            return;
        }
        let bytes = u64::from(packet_size);
        match self.apply_drop(flow, packet, bytes, reason_code, node) {
            Ok(()) => {
                if let Some(record) = self.probe_record(probe) {
                    record.add_drop(flow, bytes, reason_code);
                }
                trace!(%probe, %flow, %packet, %node, reason_code, "drop");
            }
            Err(kind) => self.anomaly(kind, probe, flow, packet, node),
        }
    }

    /// Report a duplicate copy of a packet discarded at `node`.
    ///
    /// Duplicates are an artifact of multicast replication, they have no
    /// effect on delay, jitter or loss.
    pub fn report_dup_drop(
        &mut self,
        probe: ProbeId,
        flow: FlowId,
        packet: PacketId,
        packet_size: u32,
        node: NodeId,
    ) {
        if !self.accepting() {
            return;
        }
        let destination = self
            .flow_stats
            .get_mut(&flow)
            .ok_or(AnomalyKind::UnknownFlow)
            .and_then(|stats| {
                stats
                    .destination_mut(node)
                    .ok_or(AnomalyKind::NonMemberDestination)
            });
        match destination {
            Ok(destination) => {
                destination.dups_dropped += 1;
                trace!(%probe, %flow, %packet, %node, packet_size, "duplicate dropped");
            }
            Err(kind) => self.anomaly(kind, probe, flow, packet, node),
        }
    }

    fn apply_forwarding(&mut self, flow: FlowId, packet: PacketId) -> Result<Duration, AnomalyKind> {
        let now = self.now();
        let stats = self
            .flow_stats
            .get_mut(&flow)
            .ok_or(AnomalyKind::UnknownPacket)?;
        if stats.is_resolved(packet) {
            // nothing left to forward it to, pruned or not
            return Err(AnomalyKind::UnknownPacket);
        }
        let tracked = self
            .tracked
            .get_mut(flow, packet)
            .ok_or(AnomalyKind::UnknownPacket)?;

        tracked.record_forwarding();
        stats.times_forwarded += 1;
        Ok(now.duration_since(tracked.first_seen()))
    }

    fn apply_rx(
        &mut self,
        flow: FlowId,
        packet: PacketId,
        bytes: u64,
        node: NodeId,
    ) -> Result<Duration, AnomalyKind> {
        let now = self.now();
        let stats = self
            .flow_stats
            .get_mut(&flow)
            .filter(|stats| stats.was_sent(packet))
            .ok_or(AnomalyKind::UnknownPacket)?;
        if !stats.is_member(node) {
            return Err(AnomalyKind::NonMemberDestination);
        }
        // a pruned packet is resolved for every member, never untracked
        // while still pending
        if let Some(previous) = stats.resolution(packet, node) {
            return Err(rx_refused(Some(previous)));
        }
        let tracked = self
            .tracked
            .get_mut(flow, packet)
            .ok_or(AnomalyKind::UnknownPacket)?;

        let delay = now.duration_since(tracked.first_seen());
        stats
            .record_delivery(packet, node, now, delay, bytes)
            .map_err(rx_refused)?;
        tracked.touch(node, now);
        Ok(delay)
    }

    fn apply_drop(
        &mut self,
        flow: FlowId,
        packet: PacketId,
        bytes: u64,
        reason_code: u32,
        node: NodeId,
    ) -> Result<(), AnomalyKind> {
        if reason_code >= DROP_REASON_CODES {
            return Err(AnomalyKind::InvalidReasonCode);
        }
        let now = self.now();
        let stats = self
            .flow_stats
            .get_mut(&flow)
            .filter(|stats| stats.was_sent(packet))
            .ok_or(AnomalyKind::UnknownPacket)?;

        if !stats.is_member(node) {
            if stats.is_resolved(packet) {
                return Err(AnomalyKind::UnknownPacket);
            }
            stats.record_transit_drop(reason_code, bytes);
            return Ok(());
        }

        stats
            .record_drop(packet, node, reason_code, bytes)
            .map_err(drop_refused)?;
        if let Some(tracked) = self.tracked.get_mut(flow, packet) {
            tracked.touch(node, now);
        }
        Ok(())
    }

    fn accepting(&mut self) -> bool {
        match self.state {
            MonitorState::Running => true,
            MonitorState::Idle => {
                self.anomalies.record_ignored_while_idle();
                trace!("report ignored, monitoring not started");
                false
            }
            MonitorState::Stopped => {
                self.anomalies.record_ignored_after_stop();
                trace!("report ignored, monitoring stopped");
                false
            }
        }
    }

    fn anomaly(
        &mut self,
        kind: AnomalyKind,
        probe: ProbeId,
        flow: FlowId,
        packet: PacketId,
        node: NodeId,
    ) {
        self.anomalies.record(kind);
        warn!(%kind, %probe, %flow, %packet, %node, "report ignored");
    }

    fn probe_record(&mut self, probe: ProbeId) -> Option<&mut ProbeRecord> {
        let record = self.probes.get_mut(probe.into_u32() as usize);
        if record.is_none() {
            debug!(%probe, "report from an unregistered probe");
        }
        record
    }

    fn probe_packet(&mut self, probe: ProbeId, flow: FlowId, bytes: u64, delay: Duration) {
        if let Some(record) = self.probe_record(probe) {
            record.add_packet(flow, bytes, delay);
        }
    }

    /// Run the lost packet sweep with the configured maximum per-hop
    /// delay.
    pub fn check_for_lost_packets(&mut self) -> SweepReport {
        self.check_for_lost_packets_with(self.config.max_per_hop_delay())
    }

    /// Run the lost packet sweep, declaring lost the destinations still
    /// pending for packets first seen more than `max_delay` ago.
    ///
    /// Fully resolved packets are removed from the tracked packet table.
    pub fn check_for_lost_packets_with(&mut self, max_delay: Duration) -> SweepReport {
        self.run_sweep(LossPolicy::OlderThan(max_delay))
    }

    /// Declare every destination still pending lost, whatever the age of
    /// the packet, and empty the tracked packet table.
    ///
    /// This is the authoritative accounting once the simulation is over.
    pub fn drain(&mut self) -> SweepReport {
        self.run_sweep(LossPolicy::All)
    }

    fn run_sweep(&mut self, policy: LossPolicy) -> SweepReport {
        let now = self.now();
        let report = sweep(&mut self.tracked, &mut self.flow_stats, now, policy);
        debug!(%now, ?policy, ?report, "lost packet sweep");
        report
    }

    /// Statistics of every flow seen so far.
    ///
    /// Not final while monitoring is running: run a sweep (or wait for the
    /// monitor to stop) so possibly lost packets are accounted for.
    pub fn flow_stats(&self) -> &FlowStatsContainer {
        &self.flow_stats
    }

    pub fn tracked_packets(&self) -> &TrackedPacketTable {
        &self.tracked
    }

    pub fn anomalies(&self) -> &Anomalies {
        &self.anomalies
    }
}

/// Identifier of the probe registered at `index`, saturating at the
/// last representable one.
fn probe_id(index: usize) -> ProbeId {
    ProbeId::new(u32::try_from(index).unwrap_or(u32::MAX))
}

fn rx_refused(previous: Option<Resolution>) -> AnomalyKind {
    match previous {
        None => AnomalyKind::UnknownPacket,
        Some(Resolution::Delivered) => AnomalyKind::DuplicateRx,
        Some(Resolution::Dropped | Resolution::Lost) => AnomalyKind::RxAfterResolved,
    }
}

fn drop_refused(previous: Option<Resolution>) -> AnomalyKind {
    match previous {
        None => AnomalyKind::UnknownPacket,
        Some(Resolution::Dropped) => AnomalyKind::DuplicateDrop,
        Some(Resolution::Delivered | Resolution::Lost) => AnomalyKind::DropAfterResolved,
    }
}

impl MulticastFlowMonitor<ManualScheduler> {
    /// Move simulated time to `time`, delivering every event due on the
    /// way at its own due time.
    pub fn advance_to(&mut self, time: SimTime) {
        while let Some(event) = self.scheduler.pop_due(time) {
            self.handle_event(event);
        }
        self.scheduler.set_now(time);
    }

    /// Move simulated time forward by `duration`, see [`Self::advance_to`].
    pub fn advance(&mut self, duration: Duration) {
        let time = self.now() + duration;
        self.advance_to(time);
    }
}
