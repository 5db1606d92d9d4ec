use crate::SimTime;
use core::cmp::Reverse;
use std::{
    collections::{BinaryHeap, HashSet},
    time::Duration,
};

/// Events the [`MulticastFlowMonitor`] asks its scheduler to deliver
/// back to it later, through [`MulticastFlowMonitor::handle_event`].
///
/// [`MulticastFlowMonitor`]: crate::MulticastFlowMonitor
/// [`MulticastFlowMonitor::handle_event`]: crate::MulticastFlowMonitor::handle_event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MonitorEvent {
    Start,
    Stop,
    PeriodicSweep,
}

/// Handle on a scheduled [`MonitorEvent`], used to cancel it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId(u64);

impl EventId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

/// The source of simulated time and of delayed callbacks.
///
/// The monitor never reads a wall clock. Whatever drives the simulation
/// implements this trait and calls
/// [`MulticastFlowMonitor::handle_event`] when a scheduled event is due.
/// Calls into the monitor must never overlap, which `&mut` access
/// guarantees.
///
/// [`MulticastFlowMonitor::handle_event`]: crate::MulticastFlowMonitor::handle_event
pub trait Scheduler {
    /// current simulated time
    fn now(&self) -> SimTime;

    /// deliver `event` once `delay` has elapsed from [`Scheduler::now`]
    fn schedule_after(&mut self, delay: Duration, event: MonitorEvent) -> EventId;

    /// cancel a scheduled event. Cancelling an event that already fired
    /// or was already cancelled does nothing.
    fn cancel(&mut self, id: EventId);
}

/// A [`Scheduler`] driven by hand.
///
/// Events are kept ordered by due time (and by scheduling order for
/// equal due times). The owner moves the clock forward and pops the due
/// events, see [`MulticastFlowMonitor::advance_to`].
///
/// ```
/// # use mcast_flowmon_core::{ManualScheduler, MonitorEvent, Scheduler, SimTime};
/// # use std::time::Duration;
/// let mut scheduler = ManualScheduler::new();
/// scheduler.schedule_after(Duration::from_secs(2), MonitorEvent::Stop);
/// scheduler.schedule_after(Duration::from_secs(1), MonitorEvent::Start);
///
/// let until = SimTime::from_secs(5);
/// assert_eq!(scheduler.pop_due(until), Some(MonitorEvent::Start));
/// assert_eq!(scheduler.now(), SimTime::from_secs(1));
/// assert_eq!(scheduler.pop_due(until), Some(MonitorEvent::Stop));
/// assert_eq!(scheduler.pop_due(until), None);
/// ```
///
/// [`MulticastFlowMonitor::advance_to`]: crate::MulticastFlowMonitor::advance_to
#[derive(Debug, Default)]
pub struct ManualScheduler {
    now: SimTime,
    next_id: u64,
    queue: BinaryHeap<Reverse<Scheduled>>,
    cancelled: HashSet<EventId>,
}

#[derive(Debug)]
struct Scheduled {
    due: SimTime,
    id: EventId,
    event: MonitorEvent,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        (self.due, self.id) == (other.due, other.id)
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.due, self.id).cmp(&(other.due, other.id))
    }
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// number of events still waiting to be delivered (cancelled events
    /// excluded)
    pub fn pending(&self) -> usize {
        self.queue
            .iter()
            .filter(|Reverse(s)| !self.cancelled.contains(&s.id))
            .count()
    }

    /// due time of the next live event
    pub fn next_due(&self) -> Option<SimTime> {
        self.queue
            .iter()
            .filter(|Reverse(s)| !self.cancelled.contains(&s.id))
            .map(|Reverse(s)| s.due)
            .min()
    }

    /// Pop the next event due at or before `until`.
    ///
    /// The clock is moved to the event's due time (it never goes back).
    pub fn pop_due(&mut self, until: SimTime) -> Option<MonitorEvent> {
        loop {
            let due = self.queue.peek().map(|Reverse(s)| s.due)?;
            if due > until {
                return None;
            }
            let Reverse(scheduled) = self.queue.pop()?;
            if self.cancelled.remove(&scheduled.id) {
                continue;
            }
            self.now = self.now.max(scheduled.due);
            return Some(scheduled.event);
        }
    }

    /// Move the clock to `time`. Moving backward is ignored.
    pub fn set_now(&mut self, time: SimTime) {
        self.now = self.now.max(time);
    }
}

impl Scheduler for ManualScheduler {
    #[inline]
    fn now(&self) -> SimTime {
        self.now
    }

    fn schedule_after(&mut self, delay: Duration, event: MonitorEvent) -> EventId {
        let id = EventId(self.next_id);
        self.next_id += 1;
        self.queue.push(Reverse(Scheduled {
            due: self.now + delay,
            id,
            event,
        }));
        id
    }

    fn cancel(&mut self, id: EventId) {
        if self.queue.iter().any(|Reverse(s)| s.id == id) {
            self.cancelled.insert(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty() {
        let mut scheduler = ManualScheduler::new();

        assert_eq!(scheduler.now(), SimTime::ZERO);
        assert_eq!(scheduler.pending(), 0);
        assert!(scheduler.next_due().is_none());
        assert!(scheduler.pop_due(SimTime::from_secs(100)).is_none());
    }

    #[test]
    fn not_due_yet() {
        let mut scheduler = ManualScheduler::new();
        scheduler.schedule_after(Duration::from_secs(2), MonitorEvent::PeriodicSweep);

        assert!(scheduler.pop_due(SimTime::from_secs(1)).is_none());
        assert_eq!(scheduler.now(), SimTime::ZERO);
        assert_eq!(scheduler.next_due(), Some(SimTime::from_secs(2)));
    }

    #[test]
    fn same_due_time_keeps_scheduling_order() {
        let mut scheduler = ManualScheduler::new();
        scheduler.schedule_after(Duration::from_secs(1), MonitorEvent::Start);
        scheduler.schedule_after(Duration::from_secs(1), MonitorEvent::PeriodicSweep);
        scheduler.schedule_after(Duration::from_secs(1), MonitorEvent::Stop);

        let until = SimTime::from_secs(1);
        assert_eq!(scheduler.pop_due(until), Some(MonitorEvent::Start));
        assert_eq!(scheduler.pop_due(until), Some(MonitorEvent::PeriodicSweep));
        assert_eq!(scheduler.pop_due(until), Some(MonitorEvent::Stop));
    }

    #[test]
    fn cancelled_events_are_skipped() {
        let mut scheduler = ManualScheduler::new();
        let start = scheduler.schedule_after(Duration::from_secs(1), MonitorEvent::Start);
        scheduler.schedule_after(Duration::from_secs(3), MonitorEvent::Stop);
        scheduler.cancel(start);

        assert_eq!(scheduler.pending(), 1);
        assert_eq!(
            scheduler.pop_due(SimTime::from_secs(10)),
            Some(MonitorEvent::Stop)
        );
        assert_eq!(scheduler.now(), SimTime::from_secs(3));
    }

    #[test]
    fn cancel_after_fire_is_noop() {
        let mut scheduler = ManualScheduler::new();
        let id = scheduler.schedule_after(Duration::ZERO, MonitorEvent::Start);
        assert_eq!(scheduler.pop_due(SimTime::ZERO), Some(MonitorEvent::Start));

        scheduler.cancel(id);
        assert!(scheduler.cancelled.is_empty());
    }

    #[test]
    fn clock_never_goes_back() {
        let mut scheduler = ManualScheduler::new();
        scheduler.set_now(SimTime::from_secs(5));
        scheduler.set_now(SimTime::from_secs(2));
        assert_eq!(scheduler.now(), SimTime::from_secs(5));
    }
}
