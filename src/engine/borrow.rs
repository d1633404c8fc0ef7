//! # Buffer Access Tracking
//!
//! Runtime read/write borrow tracking for device buffers.
//!
//! ## Purpose
//!
//! Kernels on unordered streams may touch the same buffer. Real hardware
//! would race; here the tracker enforces Rust-like borrowing rules at runtime
//! instead:
//!
//! - Any number of host readers may copy a buffer out concurrently.
//! - Only one kernel may write a buffer at a time.
//! - No reader may observe a buffer while a kernel writes it.
//!
//! This is achieved without OS locks by an atomic state machine.
//!
//! ## State Encoding
//!
//! | State | Meaning |
//! |------:|--------|
//! | `0` | Unlocked |
//! | `1` | Write-locked (one kernel) |
//! | `>= 2` | Read-locked (`state - 1` active readers) |
//!
//! ## Synchronization Strategy
//!
//! - Acquire/release atomics; contended acquisition spins, yielding to the
//!   OS scheduler every 1024 attempts.
//! - Kernels never wait while holding a write borrow, so waiting is bounded
//!   by the running kernel.

use std::sync::atomic::{AtomicUsize, Ordering};

const UNLOCKED: usize = 0;
const WRITER: usize = 1;
const FIRST_READER: usize = 2;

/// Tracks the borrow state of one buffer.
#[derive(Debug, Default)]
pub struct AccessTracker {
    state: AtomicUsize,
}

impl AccessTracker {
    /// Creates an unlocked tracker.
    pub fn new() -> Self {
        Self { state: AtomicUsize::new(UNLOCKED) }
    }

    /// Attempts a shared (read) borrow without waiting.
    pub fn try_acquire_read(&self) -> bool {
        let current = self.state.load(Ordering::Acquire);
        if current == WRITER {
            return false;
        }
        let next = if current == UNLOCKED { FIRST_READER } else { current + 1 };
        self.state
            .compare_exchange(current, next, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
    }

    /// Acquires a shared (read) borrow, spinning while a writer is active.
    ///
    /// - `0 → 2` : first reader
    /// - `N → N+1` : additional reader
    pub fn acquire_read(&self) {
        let mut spins = 0u32;
        while !self.try_acquire_read() {
            backoff(&mut spins);
        }
    }

    /// Releases a shared borrow. Must match an `acquire_read`.
    pub fn release_read(&self) {
        let previous = self.state.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous >= FIRST_READER);
        if previous == FIRST_READER {
            self.state.store(UNLOCKED, Ordering::Release);
        }
    }

    /// Attempts an exclusive (write) borrow without waiting.
    pub fn try_acquire_write(&self) -> bool {
        self.state
            .compare_exchange(UNLOCKED, WRITER, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
    }

    /// Acquires an exclusive (write) borrow, spinning until unlocked.
    ///
    /// - `0 → 1`
    pub fn acquire_write(&self) {
        let mut spins = 0u32;
        while !self.try_acquire_write() {
            backoff(&mut spins);
        }
    }

    /// Releases an exclusive borrow. Must match an `acquire_write`.
    pub fn release_write(&self) {
        let previous = self.state.swap(UNLOCKED, Ordering::AcqRel);
        debug_assert!(previous == WRITER);
    }

    /// Returns `true` while a writer holds the buffer.
    pub fn is_write_locked(&self) -> bool {
        self.state.load(Ordering::Acquire) == WRITER
    }
}

#[inline]
fn backoff(spins: &mut u32) {
    *spins = spins.wrapping_add(1);
    if *spins % 1024 == 0 {
        std::thread::yield_now();
    } else {
        std::hint::spin_loop();
    }
}
