//! Index-addressable kernels.
//!
//! A [`Kernel`] is what a launch primitive actually runs: something that can
//! be applied to each index in `0..count`. [`ForEachKernel`] adapts a cursor
//! and a per-element operation into one.

use crate::engine::cursor::Cursor;

/// Work that can be applied independently to each index of a launch.
pub trait Kernel: Send + Sync + 'static {
    /// Access grant held while the kernel executes.
    type Lease;

    /// Label used for logs and profiling spans.
    fn name(&self) -> &'static str {
        "kernel"
    }

    /// Acquires whatever the kernel needs for one execution.
    fn acquire(&self) -> Self::Lease;

    /// Runs the kernel for one index.
    ///
    /// # Safety
    /// A lease from [`Kernel::acquire`] must be live, `index` must be below the
    /// launch count, and each index may be applied at most once per launch.
    unsafe fn apply(&self, index: usize);
}

/// Applies an element operation to the element `index` positions past `first`.
///
/// Owns both the cursor and the operation for its whole lifetime.
pub struct ForEachKernel<C, F> {
    first: C,
    op: F,
}

impl<C, F> ForEachKernel<C, F>
where
    C: Cursor,
    F: Fn(&mut C::Value) + Send + Sync + 'static,
{
    /// Wraps `op` to run over elements starting at `first`.
    pub fn new(first: C, op: F) -> Self {
        Self { first, op }
    }
}

impl<C, F> Kernel for ForEachKernel<C, F>
where
    C: Cursor,
    F: Fn(&mut C::Value) + Send + Sync + 'static,
{
    type Lease = C::Lease;

    fn name(&self) -> &'static str {
        "for_each"
    }

    fn acquire(&self) -> C::Lease {
        self.first.acquire()
    }

    unsafe fn apply(&self, index: usize) {
        // SAFETY: forwarded from the caller's contract.
        unsafe { self.first.apply(index, &self.op) }
    }
}
