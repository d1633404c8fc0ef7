//! # Device Memory
//!
//! [`DeviceVec`] is a fixed-length element buffer that kernels mutate in
//! place and the host copies out. [`DevicePtr`] is a [`Cursor`] into it.
//!
//! ## Access discipline
//!
//! Each buffer carries an [`AccessTracker`]:
//! * a kernel holds the **write** borrow for its whole execution,
//! * [`DeviceVec::to_host`] holds a **read** borrow while copying.
//!
//! Work ordered by streams never contends. Kernels on unordered streams that
//! touch the same buffer serialize instead of racing, and a host copy never
//! observes a half-written buffer. Ordering between them is still only what
//! the streams and dependencies establish.

use std::cell::UnsafeCell;
use std::sync::Arc;

use crate::engine::borrow::AccessTracker;
use crate::engine::cursor::Cursor;

struct Buffer<T> {
    cells: Box<[UnsafeCell<T>]>,
    access: AccessTracker,
}

// SAFETY: element access is mediated by `access`; kernels touch each cell from
// at most one thread at a time under the write borrow.
unsafe impl<T: Send> Send for Buffer<T> {}
// SAFETY: shared host reads hand out `&T` on several threads, hence `T: Sync`.
unsafe impl<T: Send + Sync> Sync for Buffer<T> {}

struct ReadBorrow<'a>(&'a AccessTracker);

impl Drop for ReadBorrow<'_> {
    fn drop(&mut self) {
        self.0.release_read();
    }
}

/// A device-resident, fixed-length buffer.
///
/// Cloning shares the same storage.
pub struct DeviceVec<T> {
    buffer: Arc<Buffer<T>>,
}

impl<T> Clone for DeviceVec<T> {
    fn clone(&self) -> Self {
        Self { buffer: Arc::clone(&self.buffer) }
    }
}

impl<T: Send + Sync + 'static> DeviceVec<T> {
    /// Moves host data into a new device buffer.
    pub fn from_host(data: impl Into<Vec<T>>) -> Self {
        let cells: Box<[UnsafeCell<T>]> = data.into().into_iter().map(UnsafeCell::new).collect();
        Self {
            buffer: Arc::new(Buffer { cells, access: AccessTracker::new() }),
        }
    }

    /// Number of elements.
    #[inline]
    pub fn len(&self) -> usize {
        self.buffer.cells.len()
    }

    /// Returns `true` if the buffer holds no elements.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buffer.cells.is_empty()
    }

    /// Cursor at the first element.
    pub fn begin(&self) -> DevicePtr<T> {
        self.at(0)
    }

    /// Cursor one past the last element.
    pub fn end(&self) -> DevicePtr<T> {
        self.at(self.len())
    }

    /// Cursor at `offset`.
    ///
    /// # Panics
    /// If `offset > len()`.
    pub fn at(&self, offset: usize) -> DevicePtr<T> {
        assert!(offset <= self.len(), "offset {offset} past end of buffer of length {}", self.len());
        DevicePtr { buffer: Arc::clone(&self.buffer), offset }
    }

    /// Copies the buffer to the host.
    ///
    /// Waits while a kernel is writing the buffer. It does not wait for
    /// kernels that have not started; wait on their futures first.
    pub fn to_host(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.buffer.access.acquire_read();
        self.copy_out()
    }

    /// Copies the buffer to the host, or returns `None` if a kernel is
    /// writing it right now.
    pub fn try_to_host(&self) -> Option<Vec<T>>
    where
        T: Clone,
    {
        if !self.buffer.access.try_acquire_read() {
            return None;
        }
        Some(self.copy_out())
    }

    /// Caller holds a read borrow; it is released on return or unwind.
    fn copy_out(&self) -> Vec<T>
    where
        T: Clone,
    {
        let _borrow = ReadBorrow(&self.buffer.access);
        self.buffer
            .cells
            .iter()
            // SAFETY: the read borrow excludes kernels writing this buffer.
            .map(|cell| unsafe { (*cell.get()).clone() })
            .collect()
    }
}

impl<T: Send + Sync + 'static> From<Vec<T>> for DeviceVec<T> {
    fn from(data: Vec<T>) -> Self {
        Self::from_host(data)
    }
}

impl<T> std::fmt::Debug for DeviceVec<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceVec").field("len", &self.buffer.cells.len()).finish()
    }
}

/// Cursor into a [`DeviceVec`].
pub struct DevicePtr<T> {
    buffer: Arc<Buffer<T>>,
    offset: usize,
}

impl<T> Clone for DevicePtr<T> {
    fn clone(&self) -> Self {
        Self { buffer: Arc::clone(&self.buffer), offset: self.offset }
    }
}

impl<T> DevicePtr<T> {
    /// Element offset from the start of the buffer.
    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Cursor `n` elements further on.
    ///
    /// # Panics
    /// If the result would lie past the end of the buffer.
    pub fn add(&self, n: usize) -> Self {
        let offset = self.offset + n;
        assert!(offset <= self.buffer.cells.len(), "cursor advanced past end of buffer");
        Self { buffer: Arc::clone(&self.buffer), offset }
    }
}

impl<T> std::fmt::Debug for DevicePtr<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DevicePtr").field("offset", &self.offset).finish()
    }
}

/// Write borrow of a buffer, held by a running kernel.
pub struct WriteLease<T> {
    buffer: Arc<Buffer<T>>,
}

impl<T> Drop for WriteLease<T> {
    fn drop(&mut self) {
        self.buffer.access.release_write();
    }
}

impl<T: Send + Sync + 'static> Cursor for DevicePtr<T> {
    type Value = T;
    type Lease = WriteLease<T>;

    fn acquire(&self) -> WriteLease<T> {
        self.buffer.access.acquire_write();
        WriteLease { buffer: Arc::clone(&self.buffer) }
    }

    unsafe fn apply<F>(&self, index: usize, op: &F)
    where
        F: Fn(&mut T),
    {
        let cell = &self.buffer.cells[self.offset + index];
        // SAFETY: the caller holds the write lease and visits `index` once, so
        // this is the only live reference to the cell.
        let value = unsafe { &mut *cell.get() };
        op(value);
    }

    fn distance(&self, last: &Self) -> isize {
        assert!(
            Arc::ptr_eq(&self.buffer, &last.buffer),
            "cursors address different buffers"
        );
        last.offset as isize - self.offset as isize
    }

    fn remaining(&self) -> Option<usize> {
        Some(self.buffer.cells.len() - self.offset)
    }
}
