//! Error types for dispatch setup and device-side execution.
//!
//! Failures fall into two groups:
//!
//! * **Setup failures** are detected synchronously on the calling thread while
//!   a dispatch is being prepared. They are returned from
//!   [`Dispatcher::for_each`](crate::Dispatcher::for_each) as a
//!   [`DispatchError`] and no future is produced:
//!   - [`DependencyError`]: an antecedent handle was invalid at extraction,
//!   - [`AllocationError`]: a stream or worker pool could not be built,
//!   - [`LaunchError`]: the launch primitive rejected the launch.
//!
//! * **Device failures** happen after a future was handed out (a panicking
//!   element operation, a faulted dependency). They are stored in the
//!   completion event as a [`DeviceError`] and surface from
//!   [`Future::wait`](crate::Future::wait).
//!
//! Nothing in this crate retries. Retry policy is a caller concern.
//!
//! ## Display vs. Debug
//! * `Display` is short, lower-case and suitable for logs.
//! * `Debug` (derived) retains full structure for diagnostics.

use std::sync::Arc;

use thiserror::Error;

use crate::engine::types::{
    EventID, StreamID, DEPEND_ON, EXTRACT_DEPENDENCIES,
};

/// Result alias for dispatch entry points.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Runtime status codes reported by streams and launch primitives.
///
/// The numeric value returned by [`RuntimeStatus::code`] is stable and is
/// what boundary errors report for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum RuntimeStatus {
    /// Launch parameters were rejected (e.g. zero-sized worker pool).
    #[error("invalid launch configuration")]
    InvalidConfiguration,

    /// The target stream no longer accepts work.
    #[error("stream is closed")]
    StreamClosed,

    /// The launch primitive could not obtain execution resources.
    #[error("launch out of resources")]
    LaunchOutOfResources,

    /// An element operation panicked while the kernel ran.
    #[error("kernel panicked")]
    KernelPanicked,

    /// The producing side of a future was dropped without completing it.
    #[error("broken promise")]
    BrokenPromise,

    /// A future with no shared state was waited on.
    #[error("future has no state")]
    NoState,
}

impl RuntimeStatus {
    /// Numeric status code.
    #[inline]
    pub fn code(self) -> i32 {
        match self {
            RuntimeStatus::InvalidConfiguration => 1,
            RuntimeStatus::StreamClosed => 2,
            RuntimeStatus::LaunchOutOfResources => 3,
            RuntimeStatus::KernelPanicked => 4,
            RuntimeStatus::BrokenPromise => 5,
            RuntimeStatus::NoState => 6,
        }
    }
}

/// A failure recorded on a stream and delivered through a future.
///
/// Device errors are cheap to clone; the same error is handed to every
/// future whose completion depends on the faulted work.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{status} on stream {stream}: {detail}")]
pub struct DeviceError {
    /// Status code describing the failure.
    pub status: RuntimeStatus,

    /// Stream on which the failure was first observed.
    pub stream: StreamID,

    /// Free-form diagnostic (e.g. a panic message).
    pub detail: Arc<str>,
}

impl DeviceError {
    pub(crate) fn new(status: RuntimeStatus, stream: StreamID, detail: impl Into<Arc<str>>) -> Self {
        Self { status, stream, detail: detail.into() }
    }
}

/// Returned when an antecedent handle is invalid at extraction time.
///
/// `position` is the index of the offending dependency in the execution
/// context's dependency list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DependencyError {
    /// A future without shared state (default-constructed or taken from).
    #[error("dependency {position} is an empty future")]
    EmptyFuture {
        /// Position in the dependency list.
        position: usize,
    },

    /// A stream that was closed by its owner.
    #[error("dependency {position} refers to closed stream {stream}")]
    ClosedStream {
        /// Position in the dependency list.
        position: usize,

        /// The closed stream.
        stream: StreamID,
    },

    /// The execution context names a stream that was closed by its owner.
    #[error("execution stream {stream} is closed")]
    ClosedContextStream {
        /// The closed stream.
        stream: StreamID,
    },

    /// An event that was never recorded on any stream.
    #[error("dependency {position} refers to unrecorded event {event}")]
    UnrecordedEvent {
        /// Position in the dependency list.
        position: usize,

        /// The unrecorded event.
        event: EventID,
    },
}

/// Returned when a stream or worker pool could not be constructed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocationError {
    /// The OS refused to start a stream worker thread.
    #[error("failed to spawn worker for stream {stream}: {reason}")]
    StreamSpawn {
        /// Stream whose worker failed to start.
        stream: StreamID,

        /// OS error message.
        reason: String,
    },

    /// The device worker pool could not be built.
    #[error("failed to build device worker pool: {reason}")]
    WorkerPool {
        /// Pool builder error message.
        reason: String,
    },

    /// A borrowed stream refused the dependency waits of a new future.
    #[error("stream {stream} is unavailable")]
    StreamUnavailable {
        /// The refusing stream.
        stream: StreamID,
    },
}

/// Returned when the launch primitive rejects a launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{operation}: {status} (code {})", .status.code())]
pub struct LaunchError {
    /// Fixed string naming the failed operation.
    pub operation: &'static str,

    /// Status reported by the launch primitive.
    pub status: RuntimeStatus,
}

/// Coarse classification of a [`DispatchError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See [`DependencyError`].
    Dependency,
    /// See [`AllocationError`].
    Allocation,
    /// See [`LaunchError`].
    Launch,
}

/// Aggregate error returned by dispatch entry points.
///
/// `From<T>` conversions allow `?` from every setup stage.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// Dependency extraction failed.
    #[error(transparent)]
    Dependency(#[from] DependencyError),

    /// Future or stream construction failed.
    #[error(transparent)]
    Allocation(#[from] AllocationError),

    /// The launch primitive rejected the launch.
    #[error(transparent)]
    Launch(#[from] LaunchError),
}

impl DispatchError {
    /// Kind of failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DispatchError::Dependency(_) => ErrorKind::Dependency,
            DispatchError::Allocation(_) => ErrorKind::Allocation,
            DispatchError::Launch(_) => ErrorKind::Launch,
        }
    }

    /// Name of the operation that failed.
    pub fn operation(&self) -> &'static str {
        match self {
            DispatchError::Dependency(_) => EXTRACT_DEPENDENCIES,
            DispatchError::Allocation(_) => DEPEND_ON,
            DispatchError::Launch(e) => e.operation,
        }
    }

    /// Runtime status code, when the failure came from the runtime.
    pub fn status(&self) -> Option<RuntimeStatus> {
        match self {
            DispatchError::Launch(e) => Some(e.status),
            DispatchError::Allocation(AllocationError::StreamUnavailable { .. }) => {
                Some(RuntimeStatus::StreamClosed)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::FOR_EACH_LAUNCH;

    #[test]
    fn launch_error_reports_operation_and_code() {
        let err = DispatchError::from(LaunchError {
            operation: FOR_EACH_LAUNCH,
            status: RuntimeStatus::LaunchOutOfResources,
        });

        assert_eq!(err.kind(), ErrorKind::Launch);
        assert_eq!(err.operation(), "after for_each launch");
        assert_eq!(err.status().map(RuntimeStatus::code), Some(3));
        assert_eq!(
            err.to_string(),
            "after for_each launch: launch out of resources (code 3)"
        );
    }

    #[test]
    fn dependency_errors_have_no_status() {
        let err = DispatchError::from(DependencyError::EmptyFuture { position: 2 });
        assert_eq!(err.kind(), ErrorKind::Dependency);
        assert_eq!(err.status(), None);
        assert_eq!(err.to_string(), "dependency 2 is an empty future");
    }

    #[test]
    fn device_error_display_names_the_stream() {
        let err = DeviceError::new(RuntimeStatus::KernelPanicked, 7, "boom");
        assert_eq!(err.to_string(), "kernel panicked on stream 7: boom");
    }
}
