//! Core identifiers and constants shared by the dispatch engine.
//!
//! Streams and events are identified by small, copyable numeric IDs. IDs
//! are allocated from process-wide monotonically increasing counters and are
//! never reused, so an ID observed in a log line or an error always names
//! exactly one resource.
//!
//! Identity of a stream handle is decided by its allocation, not by its ID
//! (see [`crate::Stream::same_as`]); the ID exists for diagnostics.

use std::sync::atomic::{AtomicU64, Ordering};

/// Identifier for a stream.
pub type StreamID = u64;
/// Identifier for an event.
pub type EventID = u64;
/// Number of logical elements covered by one dispatch.
pub type ElementCount = usize;

/// ID reserved for the process-wide default stream.
pub const DEFAULT_STREAM_ID: StreamID = 0;

/// Operation name attached to launch failures of `for_each`.
pub const FOR_EACH_LAUNCH: &str = "after for_each launch";

/// Operation name attached to dependency extraction failures.
pub const EXTRACT_DEPENDENCIES: &str = "extract dependencies";

/// Operation name attached to future/stream construction failures.
pub const DEPEND_ON: &str = "depend_on";

static NEXT_STREAM_ID: AtomicU64 = AtomicU64::new(DEFAULT_STREAM_ID + 1);
static NEXT_EVENT_ID: AtomicU64 = AtomicU64::new(1);

/// Allocates a fresh, never-reused stream ID.
#[inline]
pub(crate) fn next_stream_id() -> StreamID {
    NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed)
}

/// Allocates a fresh, never-reused event ID.
#[inline]
pub(crate) fn next_event_id() -> EventID {
    NEXT_EVENT_ID.fetch_add(1, Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_ids_skip_the_default_id() {
        let a = next_stream_id();
        let b = next_stream_id();
        assert_ne!(a, DEFAULT_STREAM_ID);
        assert!(b > a);
    }
}
