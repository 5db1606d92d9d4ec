use crate::{
    classifier::{Ipv4MulticastFlowClassifier, MulticastFlowClassifier},
    export::{self, Snapshot},
    probe::{Ipv4MulticastFlowProbe, ProbeHandle},
};
use anyhow::{Context as _, Result};
use mcast_flowmon_core::{MonitorConfig, MulticastFlowMonitor, NodeId, Scheduler};
use std::{
    collections::{BTreeMap, BTreeSet},
    fs::File,
    io::BufWriter,
    net::Ipv4Addr,
    path::Path,
};
use tracing::debug;

/// The nodes subscribed to each multicast group address.
///
/// ```
/// # use mcast_flowmon::AddressGroups;
/// # use mcast_flowmon_core::NodeId;
/// # use std::net::Ipv4Addr;
/// let group = Ipv4Addr::new(225, 1, 2, 4);
/// let groups: AddressGroups = [(group, vec![NodeId::new(1), NodeId::new(2)])]
///     .into_iter()
///     .collect();
/// assert_eq!(groups.members(group).count(), 2);
/// assert_eq!(groups.members(Ipv4Addr::new(225, 0, 0, 1)).count(), 0);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressGroups {
    groups: BTreeMap<Ipv4Addr, BTreeSet<NodeId>>,
}

impl AddressGroups {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `members` to `address`, in addition to the nodes already
    /// subscribed.
    pub fn insert<I>(&mut self, address: Ipv4Addr, members: I) -> &mut Self
    where
        I: IntoIterator<Item = NodeId>,
    {
        self.groups.entry(address).or_default().extend(members);
        self
    }

    /// nodes subscribed to `address`, none if the address is unknown
    pub fn members(&self, address: Ipv4Addr) -> impl Iterator<Item = NodeId> + '_ {
        self.groups.get(&address).into_iter().flatten().copied()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

impl<I> FromIterator<(Ipv4Addr, I)> for AddressGroups
where
    I: IntoIterator<Item = NodeId>,
{
    fn from_iter<T: IntoIterator<Item = (Ipv4Addr, I)>>(iter: T) -> Self {
        let mut groups = Self::new();
        for (address, members) in iter {
            groups.insert(address, members);
        }
        groups
    }
}

/// Builds a [`MulticastFlowMonitor`] and installs IPv4 multicast probes
/// on the nodes of a simulation.
///
/// The helper owns the monitor, the classifier and the probes. The
/// simulation borrows a probe's hooks with [`Self::probe`] each time the
/// IPv4 layer of a node sends, relays, delivers or drops a packet.
pub struct MulticastFlowMonitorHelper<S, C = Ipv4MulticastFlowClassifier> {
    monitor: MulticastFlowMonitor<S>,
    classifier: C,
    groups: AddressGroups,
    probes: BTreeMap<NodeId, Ipv4MulticastFlowProbe>,
}

impl<S> MulticastFlowMonitorHelper<S>
where
    S: Scheduler,
{
    pub fn new(config: MonitorConfig, scheduler: S, groups: AddressGroups) -> Result<Self> {
        Self::with_classifier(config, scheduler, groups, Ipv4MulticastFlowClassifier::new())
    }
}

impl<S, C> MulticastFlowMonitorHelper<S, C>
where
    S: Scheduler,
    C: MulticastFlowClassifier,
{
    pub fn with_classifier(
        config: MonitorConfig,
        scheduler: S,
        groups: AddressGroups,
        classifier: C,
    ) -> Result<Self> {
        let monitor = MulticastFlowMonitor::new(config, scheduler)
            .context("Failed to create the multicast flow monitor")?;

        Ok(Self {
            monitor,
            classifier,
            groups,
            probes: BTreeMap::new(),
        })
    }

    /// Install a probe on `node`. Installing twice on the same node keeps
    /// the first probe.
    pub fn install(&mut self, node: NodeId) -> Ipv4MulticastFlowProbe {
        *self.probes.entry(node).or_insert_with(|| {
            let probe = Ipv4MulticastFlowProbe::register(&mut self.monitor, node);
            debug!(%node, probe = %probe.id(), "probe installed");
            probe
        })
    }

    pub fn install_all<I>(&mut self, nodes: I)
    where
        I: IntoIterator<Item = NodeId>,
    {
        for node in nodes {
            self.install(node);
        }
    }

    /// The hooks of the probe installed on `node`, if any.
    pub fn probe(&mut self, node: NodeId) -> Option<ProbeHandle<'_, S, C>> {
        let probe = *self.probes.get(&node)?;
        Some(ProbeHandle {
            probe,
            monitor: &mut self.monitor,
            classifier: &mut self.classifier,
            groups: &self.groups,
        })
    }

    pub fn installed(&self) -> impl Iterator<Item = Ipv4MulticastFlowProbe> + '_ {
        self.probes.values().copied()
    }

    pub fn monitor(&self) -> &MulticastFlowMonitor<S> {
        &self.monitor
    }

    pub fn monitor_mut(&mut self) -> &mut MulticastFlowMonitor<S> {
        &mut self.monitor
    }

    pub fn classifier(&self) -> &C {
        &self.classifier
    }

    pub fn groups(&self) -> &AddressGroups {
        &self.groups
    }

    pub fn snapshot(&self) -> Snapshot<'_> {
        Snapshot::new(&self.monitor, &self.classifier)
    }

    pub fn serialize_to_json_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        export::write_json(&self.snapshot(), BufWriter::new(file))
            .with_context(|| format!("Failed to write statistics to {}", path.display()))
    }

    pub fn serialize_to_csv_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        export::write_csv(&self.snapshot(), BufWriter::new(file))
            .with_context(|| format!("Failed to write statistics to {}", path.display()))
    }
}
