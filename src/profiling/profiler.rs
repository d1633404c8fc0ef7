//! Chrome Trace span recorder.
//!
//! Feature-gated with `--features profiling`.
//!
//! Usage:
//!   stream_dispatch::profiler::init("profile/dispatch.json");
//!   {
//!     let _g = stream_dispatch::profiler::span("bench::chain");
//!     // dispatch work, wait on futures...
//!   }
//!   stream_dispatch::profiler::shutdown()?;

use std::borrow::Cow;
use std::path::Path;

#[cfg(feature = "profiling")]
mod enabled {
    use std::fs::File;
    use std::io::{BufWriter, Write};
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::OnceLock;
    use std::time::Instant;

    use parking_lot::Mutex;
    use serde_json::{json, Map, Value};

    use super::*;

    const PID: u32 = 1;
    const CATEGORY: &str = "dispatch";

    struct Recorder {
        origin: Instant,
        path: PathBuf,
        recording: AtomicBool,
        events: Mutex<Vec<Value>>,
    }

    static RECORDER: OnceLock<Recorder> = OnceLock::new();
    static NEXT_TID: AtomicU64 = AtomicU64::new(1);

    thread_local! {
        static TID: u64 = NEXT_TID.fetch_add(1, Ordering::Relaxed);
    }

    impl Recorder {
        fn active() -> Option<&'static Recorder> {
            RECORDER
                .get()
                .filter(|r| r.recording.load(Ordering::Acquire))
        }

        fn now_us(&self) -> u64 {
            self.origin.elapsed().as_micros() as u64
        }

        fn push(&self, event: Value) {
            if self.recording.load(Ordering::Acquire) {
                self.events.lock().push(event);
            }
        }
    }

    fn tid() -> u64 {
        TID.with(|t| *t)
    }

    impl super::Arg {
        fn into_json(self) -> Value {
            match self {
                super::Arg::Str(s) => Value::String(s),
                super::Arg::U64(v) => json!(v),
                super::Arg::Bool(v) => Value::Bool(v),
            }
        }
    }

    /// Starts recording; spans are written to `path` on [`shutdown`].
    ///
    /// Only the first call has any effect.
    pub fn init<P: AsRef<Path>>(path: P) {
        let _ = RECORDER.set(Recorder {
            origin: Instant::now(),
            path: path.as_ref().to_path_buf(),
            recording: AtomicBool::new(true),
            events: Mutex::new(Vec::new()),
        });
    }

    /// Stops recording and writes the trace file.
    pub fn shutdown() -> std::io::Result<()> {
        let Some(recorder) = RECORDER.get() else {
            return Ok(());
        };
        recorder.recording.store(false, Ordering::Release);
        let events = std::mem::take(&mut *recorder.events.lock());

        if let Some(parent) = recorder.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = BufWriter::new(File::create(&recorder.path)?);
        serde_json::to_writer(&mut out, &json!({ "traceEvents": events }))?;
        out.flush()
    }

    /// Labels the calling thread in the trace viewer.
    pub fn thread_name(name: impl Into<String>) {
        if let Some(recorder) = Recorder::active() {
            recorder.push(json!({
                "name": "thread_name",
                "ph": "M",
                "ts": recorder.now_us(),
                "pid": PID,
                "tid": tid(),
                "args": { "name": name.into() },
            }));
        }
    }

    /// Opens a span that closes when the guard drops.
    pub fn span(name: impl Into<super::SpanName>) -> SpanGuard {
        match Recorder::active() {
            Some(recorder) => SpanGuard {
                open: Some(OpenSpan {
                    recorder,
                    name: name.into().0,
                    started: recorder.now_us(),
                    tid: tid(),
                    args: Map::new(),
                }),
            },
            None => SpanGuard { open: None },
        }
    }

    struct OpenSpan {
        recorder: &'static Recorder,
        name: Cow<'static, str>,
        started: u64,
        tid: u64,
        args: Map<String, Value>,
    }

    /// Records a complete (`ph: "X"`) event when dropped.
    pub struct SpanGuard {
        open: Option<OpenSpan>,
    }

    impl SpanGuard {
        /// Attaches an argument to the span.
        #[inline]
        pub fn arg(mut self, key: impl Into<String>, value: super::Arg) -> Self {
            if let Some(open) = self.open.as_mut() {
                open.args.insert(key.into(), value.into_json());
            }
            self
        }
    }

    impl Drop for SpanGuard {
        fn drop(&mut self) {
            let Some(open) = self.open.take() else {
                return;
            };
            let elapsed = open.recorder.now_us().saturating_sub(open.started);
            let mut event = json!({
                "name": open.name,
                "cat": CATEGORY,
                "ph": "X",
                "ts": open.started,
                "dur": elapsed,
                "pid": PID,
                "tid": open.tid,
            });
            if !open.args.is_empty() {
                event["args"] = Value::Object(open.args);
            }
            open.recorder.push(event);
        }
    }
}

#[cfg(not(feature = "profiling"))]
mod disabled {
    use super::*;

    /// Starts recording (no-op).
    #[inline]
    pub fn init<P: AsRef<Path>>(_path: P) {}

    /// Writes the trace file (no-op).
    #[inline]
    pub fn shutdown() -> std::io::Result<()> {
        Ok(())
    }

    /// Labels the calling thread (no-op).
    #[inline]
    pub fn thread_name(_name: impl Into<String>) {}

    /// Opens a span (no-op).
    #[inline]
    pub fn span(_name: impl Into<super::SpanName>) -> SpanGuard {
        SpanGuard
    }

    /// No-op span guard.
    pub struct SpanGuard;

    impl SpanGuard {
        /// Attaches an argument (no-op).
        #[inline]
        pub fn arg(self, _key: impl Into<String>, _value: super::Arg) -> Self {
            self
        }
    }
}

/// A span name; accepts `&'static str`, `String`, or `Cow<'static, str>`.
pub struct SpanName(pub Cow<'static, str>);

impl From<&'static str> for SpanName {
    fn from(s: &'static str) -> Self {
        SpanName(Cow::Borrowed(s))
    }
}

impl From<String> for SpanName {
    fn from(s: String) -> Self {
        SpanName(Cow::Owned(s))
    }
}

impl From<Cow<'static, str>> for SpanName {
    fn from(s: Cow<'static, str>) -> Self {
        SpanName(s)
    }
}

/// Span argument, serialized into the event's `args` object.
pub enum Arg {
    /// UTF-8 string value.
    Str(String),

    /// Unsigned integer value (ids, counts).
    U64(u64),

    /// Boolean value.
    Bool(bool),
}

#[cfg(feature = "profiling")]
pub use enabled::{init, shutdown, span, thread_name, SpanGuard};

#[cfg(not(feature = "profiling"))]
pub use disabled::{init, shutdown, span, thread_name, SpanGuard};
