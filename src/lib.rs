//! # Stream Dispatch
//!
//! Asynchronous index-parallel `for_each` over ordered compute streams.
//!
//! A dispatch schedules a per-element operation over `[first, last)` onto a
//! stream and immediately returns a [`Future`]. The calling thread never
//! waits on the device: dependency waits, the kernel launch and the
//! completion signal are all appended to the stream's command queue and
//! executed there in submission order.
//!
//! ## Design Goals
//! - Explicit dependency threading between asynchronous operations
//! - Stream reuse where the caller supplies one, owned streams otherwise
//! - Completion handles that keep every antecedent resource alive
//! - Setup failures reported synchronously, device failures through the future
//!
//! ## Quick start
//! ```no_run
//! use stream_dispatch::prelude::*;
//!
//! let data = DeviceVec::from_host(vec![10, 20, 30]);
//! let future = stream_dispatch::for_each(
//!     Policy::new(),
//!     data.begin(),
//!     data.end(),
//!     |x: &mut i32| *x *= 2,
//! )?;
//! future.wait()?;
//! assert_eq!(data.to_host(), vec![20, 40, 60]);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! This crate builds as both:
//! - `rlib` (for Rust usage & integration tests)
//! - `cdylib` (for FFI / DLL usage)

#![forbid(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![deny(dead_code)]

pub mod engine;

/// Feature-gated Chrome-trace profiler.
pub mod profiling;

pub use profiling::profiler;

// ─────────────────────────────────────────────────────────────────────────────
// Re-exports (Public API)
// ─────────────────────────────────────────────────────────────────────────────

pub use engine::config::DeviceConfig;

pub use engine::stream::{
    Stream,
    StreamFactory,
    WeakStream,
};

pub use engine::event::{
    Event,
    EventState,
};

pub use engine::dependency::{
    Dependency,
    DependencyKind,
};

pub use engine::future::{
    depend_on,
    Future,
    Ownership,
    Promise,
};

pub use engine::policy::{
    device,
    ExecutionContext,
    Policy,
};

pub use engine::cursor::{
    Counting,
    Cursor,
};

pub use engine::memory::{
    DevicePtr,
    DeviceVec,
};

pub use engine::kernel::{
    ForEachKernel,
    Kernel,
};

pub use engine::launch::{
    Launcher,
    ParallelFor,
    Sequential,
};

pub use engine::dispatch::{
    for_each,
    for_each_n,
    resolve_stream,
    Dispatcher,
};

pub use engine::error::{
    AllocationError,
    DependencyError,
    DeviceError,
    DispatchError,
    DispatchResult,
    ErrorKind,
    LaunchError,
    RuntimeStatus,
};

pub use engine::types::{
    EventID,
    StreamID,
    DEFAULT_STREAM_ID,
};

// ─────────────────────────────────────────────────────────────────────────────
// Prelude
// ─────────────────────────────────────────────────────────────────────────────

/// Commonly used dispatch types.
///
/// Import with:
/// ```rust
/// use stream_dispatch::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        Counting,
        Cursor,
        Dependency,
        DeviceVec,
        Dispatcher,
        DispatchError,
        Event,
        ExecutionContext,
        Future,
        Policy,
        Stream,
    };
}
