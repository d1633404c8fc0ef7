//! # For-each Dispatch
//!
//! The scheduler-facing entry point: runs an element operation over a range
//! asynchronously and returns a [`Future`] for its completion.
//!
//! ## Execution flow
//!
//! For each dispatch, on the calling thread and without waiting on any
//! stream:
//!
//! 1. Compute the element count from the cursor range.
//! 2. Extract the dependencies from the execution context. A closed context
//!    stream is rejected here like any closed stream dependency.
//! 3. Resolve the stream: a caller-chosen stream joins the dependency set.
//! 4. Build the future/promise pair (stream acquisition, dependency waits).
//! 5. Wrap the operation in a [`ForEachKernel`] and launch it.
//! 6. Fulfil the promise and hand the future back.
//!
//! Any failure in steps 2–5 short-circuits the rest; a failure before step 5
//! never reaches the launcher.
//!
//! ## Zero-sized ranges
//!
//! The launcher is still invoked with a count of zero. It queues an empty
//! kernel, so the future becomes ready exactly when its dependencies are
//! satisfied and the element operation is never called.

use std::sync::OnceLock;

use tracing::{debug, warn};

use crate::engine::config::DeviceConfig;
use crate::engine::cursor::Cursor;
use crate::engine::dependency::Dependency;
use crate::engine::error::{AllocationError, DependencyError, DispatchResult, LaunchError};
use crate::engine::future::{depend_on, Future};
use crate::engine::kernel::ForEachKernel;
use crate::engine::launch::{Launcher, ParallelFor};
use crate::engine::policy::ExecutionContext;
use crate::engine::stream::{Stream, StreamFactory};
use crate::engine::types::{ElementCount, FOR_EACH_LAUNCH};
use crate::profiler::{self, Arg};

/// Folds the caller's stream into the dependency set.
///
/// If `stream` is not the process-wide default stream (by identity), it is
/// prepended as a borrowed stream dependency. Otherwise `dependencies` is
/// returned unchanged.
pub fn resolve_stream(stream: &Stream, mut dependencies: Vec<Dependency>) -> Vec<Dependency> {
    if !stream.is_default() {
        dependencies.insert(0, Dependency::Stream(stream.clone()));
    }
    dependencies
}

/// Dispatches for-each work through a launch primitive.
pub struct Dispatcher<L = ParallelFor> {
    launcher: L,
    streams: StreamFactory,
}

static GLOBAL: OnceLock<Result<Dispatcher, AllocationError>> = OnceLock::new();

impl Dispatcher<ParallelFor> {
    /// Dispatcher backed by a rayon pool sized from `config`.
    pub fn new(config: &DeviceConfig) -> Result<Self, AllocationError> {
        Ok(Self::with_launcher(ParallelFor::new(config)?, config))
    }

    /// Lazily initialized process-wide dispatcher, configured from the
    /// environment. Initialization errors are cached and returned on every
    /// call.
    pub fn global() -> Result<&'static Self, AllocationError> {
        GLOBAL
            .get_or_init(|| Dispatcher::new(&DeviceConfig::from_env()))
            .as_ref()
            .map_err(Clone::clone)
    }
}

impl<L: Launcher> Dispatcher<L> {
    /// Dispatcher using `launcher`, with streams named after `config`.
    pub fn with_launcher(launcher: L, config: &DeviceConfig) -> Self {
        Self {
            launcher,
            streams: StreamFactory::from_config(config),
        }
    }

    /// The launch primitive.
    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    /// Runs `op` on every element of `[first, last)`.
    ///
    /// # Panics
    /// If `last` precedes `first` or the cursors address different sequences.
    pub fn for_each<P, C, F>(&self, policy: P, first: C, last: C, op: F) -> DispatchResult<Future>
    where
        P: ExecutionContext,
        C: Cursor,
        F: Fn(&mut C::Value) + Send + Sync + 'static,
    {
        let distance = first.distance(&last);
        assert!(distance >= 0, "for_each over a reversed range ({distance} elements)");
        self.for_each_n(policy, first, distance as ElementCount, op)
    }

    /// Runs `op` on the `count` elements starting at `first`.
    ///
    /// # Panics
    /// If `first` addresses fewer than `count` elements.
    pub fn for_each_n<P, C, F>(&self, policy: P, first: C, count: ElementCount, op: F) -> DispatchResult<Future>
    where
        P: ExecutionContext,
        C: Cursor,
        F: Fn(&mut C::Value) + Send + Sync + 'static,
    {
        if let Some(remaining) = first.remaining() {
            assert!(count <= remaining, "for_each_n over {count} elements, only {remaining} addressable");
        }

        let _span = profiler::span("dispatch::for_each").arg("count", Arg::U64(count as u64));

        let requested = policy.stream().clone();
        let dependencies = policy.extract_dependencies()?;
        if requested.is_closed() && !requested.is_default() {
            return Err(DependencyError::ClosedContextStream { stream: requested.id() }.into());
        }
        let dependencies = resolve_stream(&requested, dependencies);
        let (future, promise) = depend_on(&self.streams, dependencies)?;

        let stream = promise.stream().clone();
        let kernel = ForEachKernel::new(first, op);

        if let Err(status) = self.launcher.launch(count, kernel, &stream) {
            warn!(stream = stream.id(), %status, code = status.code(), "for_each launch rejected");
            drop(promise);
            drop(future);
            return Err(LaunchError { operation: FOR_EACH_LAUNCH, status }.into());
        }

        promise
            .fulfil()
            .map_err(|e| LaunchError { operation: FOR_EACH_LAUNCH, status: e.status })?;

        debug!(
            stream = stream.id(),
            ownership = ?future.ownership(),
            count,
            dependencies = future.dependencies().len(),
            "for_each dispatched"
        );

        Ok(future)
    }
}

/// Runs `op` on every element of `[first, last)` using [`Dispatcher::global`].
pub fn for_each<P, C, F>(policy: P, first: C, last: C, op: F) -> DispatchResult<Future>
where
    P: ExecutionContext,
    C: Cursor,
    F: Fn(&mut C::Value) + Send + Sync + 'static,
{
    Dispatcher::global()?.for_each(policy, first, last, op)
}

/// Runs `op` on `count` elements from `first` using [`Dispatcher::global`].
pub fn for_each_n<P, C, F>(policy: P, first: C, count: ElementCount, op: F) -> DispatchResult<Future>
where
    P: ExecutionContext,
    C: Cursor,
    F: Fn(&mut C::Value) + Send + Sync + 'static,
{
    Dispatcher::global()?.for_each_n(policy, first, count, op)
}
