//! Stream-ordered completion signals.
//!
//! An [`Event`] marks a point in a stream's command sequence. Recording an
//! event on a stream appends a marker; the event completes when the stream's
//! worker reaches that marker. Other streams (or the host) can wait on it.
//!
//! ## Generations
//!
//! An event may be recorded more than once, possibly on different streams.
//! Each record bumps a generation counter on the host, and waits capture the
//! generation current at the time they are issued. Generations complete
//! independently, so a wait observes exactly the record that preceded it,
//! never a later one that happened to finish first.
//!
//! ## States
//!
//! | State | Meaning |
//! |---|---|
//! | `Unrecorded` | Never recorded; waiting on it returns immediately |
//! | `Pending` | Latest record not yet reached by its stream |
//! | `Ready` | Latest record reached, stream healthy |
//! | `Errored` | Latest record reached on a faulted stream |

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::engine::error::DeviceError;
use crate::engine::types::{next_event_id, EventID};

/// Snapshot of an event's progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventState {
    /// The event was never recorded.
    Unrecorded,

    /// The latest record has not been reached yet.
    Pending,

    /// The latest record completed successfully.
    Ready,

    /// The latest record completed on a faulted stream.
    Errored(DeviceError),
}

#[derive(Debug, Default)]
struct Progress {
    recorded: u64,
    /// Every generation up to and including this one has completed.
    settled: u64,
    /// Completed generations above `settled`.
    ahead: BTreeSet<u64>,
    faults: BTreeMap<u64, DeviceError>,
}

impl Progress {
    fn is_done(&self, generation: u64) -> bool {
        generation <= self.settled || self.ahead.contains(&generation)
    }

    fn settle(&mut self, generation: u64) {
        self.ahead.insert(generation);
        while self.ahead.remove(&(self.settled + 1)) {
            self.settled += 1;
        }
    }

    fn outcome(&self, generation: u64) -> Result<(), DeviceError> {
        match self.faults.get(&generation) {
            Some(fault) => Err(fault.clone()),
            None => Ok(()),
        }
    }
}

#[derive(Debug)]
struct EventInner {
    id: EventID,
    progress: Mutex<Progress>,
    reached: Condvar,
}

/// A completion signal recorded on a stream.
///
/// Cloning an `Event` yields another handle to the same signal.
#[derive(Debug, Clone)]
pub struct Event {
    inner: Arc<EventInner>,
}

impl Default for Event {
    fn default() -> Self {
        Self::new()
    }
}

impl Event {
    /// Creates an unrecorded event.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(EventInner {
                id: next_event_id(),
                progress: Mutex::new(Progress::default()),
                reached: Condvar::new(),
            }),
        }
    }

    /// Diagnostic identifier.
    #[inline]
    pub fn id(&self) -> EventID {
        self.inner.id
    }

    /// Returns `true` if both handles refer to the same event.
    #[inline]
    pub fn same_as(&self, other: &Event) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Current state of the latest record.
    pub fn query(&self) -> EventState {
        let progress = self.inner.progress.lock();
        let latest = progress.recorded;
        if latest == 0 {
            EventState::Unrecorded
        } else if !progress.is_done(latest) {
            EventState::Pending
        } else {
            match progress.outcome(latest) {
                Err(fault) => EventState::Errored(fault),
                Ok(()) => EventState::Ready,
            }
        }
    }

    /// Returns `true` once the event has been recorded at least once.
    #[inline]
    pub fn is_recorded(&self) -> bool {
        self.inner.progress.lock().recorded > 0
    }

    /// Returns `true` if the latest record has completed.
    #[inline]
    pub fn is_complete(&self) -> bool {
        let progress = self.inner.progress.lock();
        progress.is_done(progress.recorded)
    }

    /// Blocks the calling thread until the latest record completes.
    ///
    /// Returns the stored device error if the recording stream was faulted.
    /// An unrecorded event returns `Ok(())` immediately.
    pub fn wait(&self) -> Result<(), DeviceError> {
        let generation = self.generation();
        self.wait_for(generation)
    }

    /// Generation a wait issued now would observe.
    #[inline]
    pub(crate) fn generation(&self) -> u64 {
        self.inner.progress.lock().recorded
    }

    /// Starts a new record and returns its generation.
    pub(crate) fn begin_record(&self) -> u64 {
        let mut progress = self.inner.progress.lock();
        progress.recorded += 1;
        progress.recorded
    }

    /// Completes `generation` with `outcome`, waking every waiter.
    ///
    /// Generations may complete in any order. Completing one twice keeps the
    /// first outcome.
    pub(crate) fn complete(&self, generation: u64, outcome: Result<(), DeviceError>) {
        let mut progress = self.inner.progress.lock();
        if progress.is_done(generation) {
            return;
        }
        if let Err(fault) = outcome {
            progress.faults.insert(generation, fault);
        }
        progress.settle(generation);
        drop(progress);
        self.inner.reached.notify_all();
    }

    /// Blocks until `generation` itself has completed. Later generations
    /// completing first do not release the wait.
    pub(crate) fn wait_for(&self, generation: u64) -> Result<(), DeviceError> {
        let mut progress = self.inner.progress.lock();
        while !progress.is_done(generation) {
            self.inner.reached.wait(&mut progress);
        }
        progress.outcome(generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::error::RuntimeStatus;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn unrecorded_event_does_not_block() {
        let event = Event::new();
        assert_eq!(event.query(), EventState::Unrecorded);
        assert!(event.wait().is_ok());
    }

    #[test]
    fn wait_blocks_until_completion() {
        let event = Event::new();
        let generation = event.begin_record();
        assert_eq!(event.query(), EventState::Pending);

        let signaller = event.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            signaller.complete(generation, Ok(()));
        });

        assert!(event.wait().is_ok());
        assert_eq!(event.query(), EventState::Ready);
        handle.join().unwrap();
    }

    #[test]
    fn errors_are_delivered_to_waiters() {
        let event = Event::new();
        let generation = event.begin_record();
        let fault = DeviceError::new(RuntimeStatus::KernelPanicked, 4, "boom");
        event.complete(generation, Err(fault.clone()));

        assert_eq!(event.wait(), Err(fault.clone()));
        assert_eq!(event.query(), EventState::Errored(fault));
    }

    #[test]
    fn stale_completion_does_not_overwrite_newer_generation() {
        let event = Event::new();
        let first = event.begin_record();
        let second = event.begin_record();

        event.complete(second, Ok(()));
        event.complete(
            first,
            Err(DeviceError::new(RuntimeStatus::KernelPanicked, 1, "late")),
        );

        assert_eq!(event.query(), EventState::Ready);
    }

    #[test]
    fn later_generation_does_not_release_an_earlier_wait() {
        let event = Event::new();
        let first = event.begin_record();
        let second = event.begin_record();

        let (reached, observed) = mpsc::channel();
        let waiter = event.clone();
        let handle = thread::spawn(move || {
            let outcome = waiter.wait_for(first);
            reached.send(outcome).unwrap();
        });

        event.complete(second, Ok(()));
        assert!(observed.recv_timeout(Duration::from_millis(50)).is_err());
        assert_eq!(event.query(), EventState::Ready);

        let fault = DeviceError::new(RuntimeStatus::KernelPanicked, 2, "slow stream");
        event.complete(first, Err(fault.clone()));
        assert_eq!(observed.recv().unwrap(), Err(fault));
        assert_eq!(event.query(), EventState::Ready);
        handle.join().unwrap();
    }
}
