//! Launch primitives.
//!
//! A [`Launcher`] schedules `count` parallel units of a [`Kernel`] on a
//! stream. How the units are partitioned is entirely the launcher's
//! business; the dispatch layer only relies on the contract below.
//!
//! Two variants are provided:
//!
//! * [`ParallelFor`]: splits the index range over a rayon pool that plays
//!   the role of the device's execution units,
//! * [`Sequential`]: runs every index in order on the stream's own thread.
//!
//! Both submit exactly one kernel command per launch, including when
//! `count == 0`, so a zero-sized launch still occupies its place in the
//! stream's program order.

use std::sync::Arc;

use rayon::prelude::*;
use rayon::ThreadPool;

use crate::engine::config::DeviceConfig;
use crate::engine::error::{AllocationError, RuntimeStatus};
use crate::engine::kernel::Kernel;
use crate::engine::stream::Stream;

/// Capability to place index-parallel work on a stream.
///
/// Implementations must apply each index in `0..count` exactly once, while
/// holding the lease returned by [`Kernel::acquire`], and must not block the
/// calling thread on the work itself.
pub trait Launcher: Send + Sync {
    /// Schedules `kernel` over `0..count` on `stream`.
    fn launch<K: Kernel>(&self, count: usize, kernel: K, stream: &Stream) -> Result<(), RuntimeStatus>;
}

/// Launcher that fans indices out over a rayon thread pool.
#[derive(Clone)]
pub struct ParallelFor {
    pool: Arc<ThreadPool>,
    min_grain: usize,
}

impl ParallelFor {
    /// Builds the worker pool described by `config`.
    pub fn new(config: &DeviceConfig) -> Result<Self, AllocationError> {
        let prefix = config.thread_name_prefix.clone();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.worker_threads.unwrap_or(0))
            .thread_name(move |i| format!("{prefix}-worker-{i}"))
            .build()
            .map_err(|e| AllocationError::WorkerPool { reason: e.to_string() })?;

        Ok(Self {
            pool: Arc::new(pool),
            min_grain: config.effective_grain(),
        })
    }

    /// Number of worker threads in the pool.
    pub fn worker_threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}

impl Launcher for ParallelFor {
    fn launch<K: Kernel>(&self, count: usize, kernel: K, stream: &Stream) -> Result<(), RuntimeStatus> {
        let pool = Arc::clone(&self.pool);
        let grain = self.min_grain;

        stream.submit(kernel.name(), move || {
            let _lease = kernel.acquire();
            pool.install(|| {
                (0..count)
                    .into_par_iter()
                    .with_min_len(grain)
                    // SAFETY: the range yields each index once and the lease is live.
                    .for_each(|index| unsafe { kernel.apply(index) });
            });
        })
    }
}

impl std::fmt::Debug for ParallelFor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParallelFor")
            .field("worker_threads", &self.worker_threads())
            .field("min_grain", &self.min_grain)
            .finish()
    }
}

/// Launcher that applies indices in order on the stream thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sequential;

impl Launcher for Sequential {
    fn launch<K: Kernel>(&self, count: usize, kernel: K, stream: &Stream) -> Result<(), RuntimeStatus> {
        stream.submit(kernel.name(), move || {
            let _lease = kernel.acquire();
            for index in 0..count {
                // SAFETY: each index is applied once, under the lease.
                unsafe { kernel.apply(index) };
            }
        })
    }
}
