//! Random-access element cursors.
//!
//! A [`Cursor`] is the indexing abstraction a dispatch iterates with: it
//! names the first element of a range and resolves the i-th element relative
//! to it. Whatever the element storage looks like, the element operation
//! always receives a plain `&mut Value`.
//!
//! Cursors are moved into the kernel and outlive the dispatch call, so they
//! own (or share ownership of) whatever they address.

/// Random-access position in a sequence of elements.
pub trait Cursor: Send + Sync + 'static {
    /// Element type handed to the element operation.
    type Value;

    /// Access grant held for the whole execution of a kernel.
    type Lease;

    /// Acquires exclusive element access for one kernel execution.
    fn acquire(&self) -> Self::Lease;

    /// Invokes `op` on the element `index` positions past this cursor.
    ///
    /// # Safety
    /// A lease from [`Cursor::acquire`] must be live, and no `index` may be
    /// applied more than once concurrently.
    unsafe fn apply<F>(&self, index: usize, op: &F)
    where
        F: Fn(&mut Self::Value);

    /// Signed number of elements from `self` to `last`.
    ///
    /// # Panics
    /// If `last` does not address the same sequence.
    fn distance(&self, last: &Self) -> isize;

    /// Number of addressable elements from this cursor on, if bounded.
    fn remaining(&self) -> Option<usize> {
        None
    }
}

/// Cursor over the integers `start, start + 1, ...`.
///
/// The element operation receives a scratch copy of the index value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Counting {
    start: usize,
}

impl Counting {
    /// Cursor positioned at `start`.
    pub fn new(start: usize) -> Self {
        Self { start }
    }

    /// Current value.
    #[inline]
    pub fn value(&self) -> usize {
        self.start
    }
}

impl Cursor for Counting {
    type Value = usize;
    type Lease = ();

    fn acquire(&self) {}

    unsafe fn apply<F>(&self, index: usize, op: &F)
    where
        F: Fn(&mut usize),
    {
        let mut value = self.start + index;
        op(&mut value);
    }

    fn distance(&self, last: &Self) -> isize {
        last.start as isize - self.start as isize
    }
}
