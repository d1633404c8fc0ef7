//! # Futures and Promises
//!
//! A dispatch produces a [`Future`]/[`Promise`] pair:
//!
//! * the **future** is returned to the caller. It is bound to the stream the
//!   work runs on, owns every dependency token supplied at dispatch time, and
//!   becomes ready when the stream reaches the promise's completion record;
//! * the **promise** stays with the dispatch. Fulfilling it appends the
//!   completion record after the launched work.
//!
//! [`depend_on`] builds the pair. It is pure bookkeeping: it picks the stream,
//! queues the dependency waits on it and ties the tokens to the future. No
//! work is launched here.
//!
//! ## Stream acquisition
//!
//! 1. The first [`Dependency::Stream`] is reused as a **borrowed** stream.
//! 2. Otherwise the first future that owns its stream hands that stream on;
//!    program order on the shared stream replaces an event wait.
//! 3. Otherwise a fresh **owned** stream is allocated.
//!
//! ## Release
//!
//! Tokens attached to a future stay alive at least until it is ready. A
//! pending future that is dropped hands its tokens to its stream, which drops
//! them only after the work ahead of them has run.

use tracing::debug;

use crate::engine::dependency::Dependency;
use crate::engine::error::{AllocationError, DeviceError, RuntimeStatus};
use crate::engine::event::Event;
use crate::engine::stream::{Stream, StreamFactory};
use crate::engine::types::DEFAULT_STREAM_ID;

/// Whether a future's stream was allocated for it or supplied by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ownership {
    /// Allocated by the dispatch; released with the last future using it.
    Owned,

    /// Supplied by the caller, who remains responsible for it.
    Borrowed,
}

struct FutureState {
    stream: Stream,
    ownership: Ownership,
    done: Event,
    keep_alive: Vec<Dependency>,
}

/// Completion handle of an asynchronous dispatch.
///
/// A default-constructed future, or one left behind by [`Future::take`], has
/// no state. Such a future is rejected as a dependency and reports
/// [`RuntimeStatus::NoState`] when waited on.
#[derive(Default)]
pub struct Future {
    state: Option<FutureState>,
}

impl Future {
    /// Returns `true` if the future has shared state.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.state.is_some()
    }

    /// Returns `true` once the work behind this future has finished,
    /// successfully or not.
    pub fn is_ready(&self) -> bool {
        self.state.as_ref().is_some_and(|state| state.done.is_complete())
    }

    /// Stream the work was launched on.
    pub fn stream(&self) -> Option<&Stream> {
        self.state.as_ref().map(|state| &state.stream)
    }

    /// Ownership of [`Future::stream`].
    pub fn ownership(&self) -> Option<Ownership> {
        self.state.as_ref().map(|state| state.ownership)
    }

    /// Completion event of this future.
    pub fn completion(&self) -> Option<&Event> {
        self.state.as_ref().map(|state| &state.done)
    }

    /// Dependency tokens kept alive by this future, in dispatch order.
    pub fn dependencies(&self) -> &[Dependency] {
        match &self.state {
            Some(state) => &state.keep_alive,
            None => &[],
        }
    }

    /// Moves the state out, leaving an empty future behind.
    pub fn take(&mut self) -> Future {
        Future { state: self.state.take() }
    }

    /// Blocks until the work has finished and releases the dependencies.
    ///
    /// Returns the device error recorded for this work or for anything it
    /// depended on.
    pub fn wait(mut self) -> Result<(), DeviceError> {
        let state = self.state.take().ok_or_else(|| {
            DeviceError::new(RuntimeStatus::NoState, DEFAULT_STREAM_ID, "wait on empty future")
        })?;
        let outcome = state.done.wait();
        dismantle(state);
        outcome
    }
}

impl Drop for Future {
    fn drop(&mut self) {
        if let Some(state) = self.state.take() {
            dismantle(state);
        }
    }
}

/// Releases a future's state without recursing through its antecedents.
///
/// A chain of dependent dispatches nests each future inside the next one's
/// tokens, so a plain drop would recurse once per link. Completed futures
/// are unpacked onto a work list instead; a pending one hands its tokens to
/// its stream, which drops them after the queued work.
fn dismantle(state: FutureState) {
    let mut pending = vec![state];

    while let Some(FutureState { stream, done, keep_alive, .. }) = pending.pop() {
        if !done.is_complete() {
            stream.release(keep_alive);
            continue;
        }
        for dependency in keep_alive {
            if let Dependency::Future(mut future) = dependency {
                if let Some(inner) = future.state.take() {
                    pending.push(inner);
                }
            }
        }
    }
}

impl std::fmt::Debug for Future {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.state {
            Some(state) => f
                .debug_struct("Future")
                .field("stream", &state.stream.id())
                .field("ownership", &state.ownership)
                .field("state", &state.done.query())
                .field("dependencies", &state.keep_alive.len())
                .finish(),
            None => f.write_str("Future(<empty>)"),
        }
    }
}

/// Producer half of a dispatch's completion handle.
///
/// Dropping an unfulfilled promise completes its future with
/// [`RuntimeStatus::BrokenPromise`].
#[derive(Debug)]
pub struct Promise {
    stream: Stream,
    done: Event,
    generation: u64,
    fulfilled: bool,
}

impl Promise {
    /// Stream the completion will be recorded on.
    #[inline]
    pub fn stream(&self) -> &Stream {
        &self.stream
    }

    /// Appends the completion record after everything queued so far.
    pub fn fulfil(mut self) -> Result<(), DeviceError> {
        self.fulfilled = true;
        self.stream.record_generation(&self.done, self.generation)
    }
}

impl Drop for Promise {
    fn drop(&mut self) {
        if !self.fulfilled {
            self.done.complete(
                self.generation,
                Err(DeviceError::new(
                    RuntimeStatus::BrokenPromise,
                    self.stream.id(),
                    "promise dropped before fulfilment",
                )),
            );
        }
    }
}

/// Builds a future/promise pair that depends on `dependencies`.
///
/// Picks or allocates the stream, queues a wait on it for every dependency it
/// is not already ordered after, and attaches all tokens to the future. On
/// failure nothing is returned and any stream allocated here is released.
///
/// The waits land on the chosen stream together or not at all. A failed build
/// may leave a marker recorded on another dependency stream; it completes
/// without anyone waiting on it.
pub fn depend_on(
    factory: &StreamFactory,
    dependencies: Vec<Dependency>,
) -> Result<(Future, Promise), AllocationError> {
    let (stream, ownership, donor) = acquire_stream(factory, &dependencies)?;

    let mut waits = Vec::with_capacity(dependencies.len());
    for (position, dependency) in dependencies.iter().enumerate() {
        if donor == Some(position) {
            continue;
        }
        waits.extend(wait_target(&stream, dependency)?);
    }
    stream
        .wait_events(&waits)
        .map_err(|_| AllocationError::StreamUnavailable { stream: stream.id() })?;

    let done = Event::new();
    let generation = done.begin_record();

    debug!(
        stream = stream.id(),
        ?ownership,
        dependencies = dependencies.len(),
        event = done.id(),
        "future built"
    );

    let promise = Promise {
        stream: stream.clone(),
        done: done.clone(),
        generation,
        fulfilled: false,
    };
    let future = Future {
        state: Some(FutureState { stream, ownership, done, keep_alive: dependencies }),
    };

    Ok((future, promise))
}

fn acquire_stream(
    factory: &StreamFactory,
    dependencies: &[Dependency],
) -> Result<(Stream, Ownership, Option<usize>), AllocationError> {
    let borrowed = dependencies.iter().enumerate().find_map(|(position, dependency)| {
        match dependency {
            Dependency::Stream(stream) => Some((position, stream)),
            _ => None,
        }
    });
    if let Some((position, stream)) = borrowed {
        return Ok((stream.clone(), Ownership::Borrowed, Some(position)));
    }

    let inherited = dependencies.iter().enumerate().find_map(|(position, dependency)| {
        match dependency {
            Dependency::Future(future) if future.ownership() == Some(Ownership::Owned) => {
                future.stream().map(|stream| (position, stream))
            }
            _ => None,
        }
    });
    if let Some((position, stream)) = inherited {
        return Ok((stream.clone(), Ownership::Owned, Some(position)));
    }

    Ok((factory.allocate()?, Ownership::Owned, None))
}

/// Event `stream` has to wait on for `dependency`, if any.
///
/// A stream dependency gets a fresh marker recorded at its current end. Work
/// already ordered on `stream` needs no wait.
fn wait_target(stream: &Stream, dependency: &Dependency) -> Result<Option<Event>, AllocationError> {
    match dependency {
        Dependency::Stream(other) if !other.same_as(stream) => {
            let marker = Event::new();
            other
                .record(&marker)
                .map_err(|_| AllocationError::StreamUnavailable { stream: other.id() })?;
            Ok(Some(marker))
        }
        Dependency::Future(future) => match (future.stream(), future.completion()) {
            (Some(other), Some(done)) if !other.same_as(stream) => Ok(Some(done.clone())),
            _ => Ok(None),
        },
        Dependency::Event(event) => Ok(Some(event.clone())),
        Dependency::Stream(_) => Ok(None),
    }
}
