//! # Streams
//!
//! A [`Stream`] is an ordered command queue drained by its own worker
//! thread. Everything appended to a stream executes in submission order:
//!
//! * **kernels**: index-parallel work handed over by a launch primitive,
//! * **waits**: block the stream until another stream's event completes,
//! * **records**: complete an event once all earlier commands have run,
//! * **releases**: drop resources whose lifetime must outlive earlier work.
//!
//! Cross-stream ordering exists only through waits on events.
//!
//! ## Lifetime
//!
//! `Stream` is a shared handle. When the last handle is dropped the worker
//! finishes every command already queued and then exits, so work that was
//! launched and abandoned still runs to completion and everything it
//! captured stays alive until it has.
//!
//! [`Stream::close`] is the owner's explicit release: a closed stream refuses
//! new work, drains what it has, and is rejected as a dependency.
//!
//! ## Faults
//!
//! If a kernel panics, or a wait observes a faulted event, the stream becomes
//! faulted. Faults are sticky: later kernels on that stream are skipped and
//! every later record completes with the stored [`DeviceError`].
//!
//! ## Default stream
//!
//! [`Stream::default_stream`] is the process-wide implicit stream. Its worker
//! is started on first use and lives for the rest of the process.

use std::any::Any;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, OnceLock, Weak};
use std::thread;

use parking_lot::{Condvar, Mutex};
use tracing::{trace, warn};

use crate::engine::config::DeviceConfig;
use crate::engine::dependency::Dependency;
use crate::engine::error::{AllocationError, DeviceError, RuntimeStatus};
use crate::engine::event::Event;
use crate::engine::types::{next_stream_id, StreamID, DEFAULT_STREAM_ID};
use crate::profiler::{self, Arg};

/// A unit of work queued on a stream.
enum Command {
    Kernel {
        label: &'static str,
        body: Box<dyn FnOnce() + Send>,
    },
    Wait {
        event: Event,
        generation: u64,
    },
    Record {
        event: Event,
        generation: u64,
    },
    Release(Vec<Dependency>),
}

impl Command {
    fn label(&self) -> &'static str {
        match self {
            Command::Kernel { label, .. } => label,
            Command::Wait { .. } => "wait",
            Command::Record { .. } => "record",
            Command::Release(_) => "release",
        }
    }
}

#[derive(Default)]
struct Queue {
    commands: VecDeque<Command>,
    worker_started: bool,
    closed: bool,
    shutdown: bool,
}

struct Shared {
    id: StreamID,
    name: String,
    stack_size: Option<usize>,
    queue: Mutex<Queue>,
    available: Condvar,
    fault: Mutex<Option<DeviceError>>,
}

impl Shared {
    /// Starts the worker if it is not running yet. Caller holds the queue lock.
    fn start_worker(self: &Arc<Self>, queue: &mut Queue) -> Result<(), AllocationError> {
        if queue.worker_started {
            return Ok(());
        }

        let mut builder = thread::Builder::new().name(self.name.clone());
        if let Some(size) = self.stack_size {
            builder = builder.stack_size(size);
        }

        let shared = Arc::clone(self);
        builder
            .spawn(move || {
                profiler::thread_name(shared.name.clone());
                shared.run();
            })
            .map_err(|e| AllocationError::StreamSpawn {
                stream: self.id,
                reason: e.to_string(),
            })?;

        queue.worker_started = true;
        Ok(())
    }

    fn push(self: &Arc<Self>, command: Command, allow_closed: bool) -> Result<(), RuntimeStatus> {
        self.push_all(std::iter::once(command), allow_closed)
    }

    /// Appends `commands` contiguously, or none of them.
    fn push_all<I>(self: &Arc<Self>, commands: I, allow_closed: bool) -> Result<(), RuntimeStatus>
    where
        I: IntoIterator<Item = Command>,
    {
        let mut queue = self.queue.lock();

        if queue.closed && !allow_closed {
            return Err(RuntimeStatus::StreamClosed);
        }

        if let Err(e) = self.start_worker(&mut queue) {
            warn!(stream = self.id, error = %e, "stream worker unavailable");
            return Err(RuntimeStatus::LaunchOutOfResources);
        }

        for command in commands {
            trace!(stream = self.id, command = command.label(), depth = queue.commands.len(), "enqueue");
            queue.commands.push_back(command);
        }
        drop(queue);

        self.available.notify_one();
        Ok(())
    }

    fn run(&self) {
        loop {
            let command = {
                let mut queue = self.queue.lock();
                loop {
                    if let Some(command) = queue.commands.pop_front() {
                        break command;
                    }
                    if queue.shutdown {
                        trace!(stream = self.id, "worker exiting");
                        return;
                    }
                    self.available.wait(&mut queue);
                }
            };

            self.execute(command);
        }
    }

    fn execute(&self, command: Command) {
        match command {
            Command::Kernel { label, body } => {
                if self.fault.lock().is_some() {
                    trace!(stream = self.id, kernel = label, "skipping kernel on faulted stream");
                    return;
                }

                let _span = profiler::span(label).arg("stream", Arg::U64(self.id));

                if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(body)) {
                    let detail = panic_message(payload.as_ref());
                    warn!(stream = self.id, kernel = label, %detail, "kernel panicked");
                    self.set_fault(DeviceError::new(RuntimeStatus::KernelPanicked, self.id, detail));
                }
            }

            Command::Wait { event, generation } => {
                if let Err(fault) = event.wait_for(generation) {
                    warn!(stream = self.id, event = event.id(), error = %fault, "waited on faulted event");
                    self.set_fault(fault);
                }
            }

            Command::Record { event, generation } => {
                let outcome = match self.fault.lock().clone() {
                    Some(fault) => Err(fault),
                    None => Ok(()),
                };
                event.complete(generation, outcome);
            }

            Command::Release(resources) => {
                trace!(stream = self.id, count = resources.len(), "releasing deferred resources");
                drop(resources);
            }
        }
    }

    fn set_fault(&self, fault: DeviceError) {
        let mut slot = self.fault.lock();
        if slot.is_none() {
            *slot = Some(fault);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

struct StreamInner {
    shared: Arc<Shared>,
}

impl Drop for StreamInner {
    fn drop(&mut self) {
        let mut queue = self.shared.queue.lock();
        queue.shutdown = true;
        drop(queue);
        self.shared.available.notify_all();
    }
}

/// Handle to an ordered command queue.
///
/// Clones share the same queue. Identity (not ID) decides whether two handles
/// name the same stream; see [`Stream::same_as`].
#[derive(Clone)]
pub struct Stream {
    inner: Arc<StreamInner>,
}

/// Non-owning reference to a stream, used to observe its release.
#[derive(Clone)]
pub struct WeakStream {
    inner: Weak<StreamInner>,
}

impl WeakStream {
    /// Upgrades to a strong handle if any strong handle still exists.
    pub fn upgrade(&self) -> Option<Stream> {
        self.inner.upgrade().map(|inner| Stream { inner })
    }
}

static DEFAULT_STREAM: OnceLock<Stream> = OnceLock::new();

impl Stream {
    fn build(id: StreamID, name: String, stack_size: Option<usize>) -> Self {
        let shared = Arc::new(Shared {
            id,
            name,
            stack_size,
            queue: Mutex::new(Queue::default()),
            available: Condvar::new(),
            fault: Mutex::new(None),
        });
        Self { inner: Arc::new(StreamInner { shared }) }
    }

    fn spawn(id: StreamID, name: String, stack_size: Option<usize>) -> Result<Self, AllocationError> {
        let stream = Self::build(id, name, stack_size);
        {
            let shared = &stream.inner.shared;
            let mut queue = shared.queue.lock();
            shared.start_worker(&mut queue)?;
        }
        Ok(stream)
    }

    /// Creates a caller-owned stream with the default configuration.
    pub fn new() -> Result<Self, AllocationError> {
        Self::with_config(&DeviceConfig::default())
    }

    /// Creates a caller-owned stream named after `config`.
    pub fn with_config(config: &DeviceConfig) -> Result<Self, AllocationError> {
        StreamFactory::from_config(config).allocate()
    }

    /// The process-wide default stream.
    pub fn default_stream() -> &'static Stream {
        DEFAULT_STREAM.get_or_init(|| {
            let prefix = DeviceConfig::default().thread_name_prefix;
            Self::build(DEFAULT_STREAM_ID, format!("{prefix}-stream-default"), None)
        })
    }

    /// Diagnostic identifier.
    #[inline]
    pub fn id(&self) -> StreamID {
        self.inner.shared.id
    }

    /// Worker thread name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.inner.shared.name
    }

    /// Returns `true` if both handles refer to the same stream.
    #[inline]
    pub fn same_as(&self, other: &Stream) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Returns `true` if this handle is the process-wide default stream.
    #[inline]
    pub fn is_default(&self) -> bool {
        self.same_as(Self::default_stream())
    }

    /// Returns `true` once [`Stream::close`] was called.
    pub fn is_closed(&self) -> bool {
        self.inner.shared.queue.lock().closed
    }

    /// Stops accepting new work. Queued work still runs.
    pub fn close(&self) {
        let mut queue = self.inner.shared.queue.lock();
        if !queue.closed {
            trace!(stream = self.id(), pending = queue.commands.len(), "closing stream");
            queue.closed = true;
        }
    }

    /// The sticky fault of this stream, if any.
    pub fn fault(&self) -> Option<DeviceError> {
        self.inner.shared.fault.lock().clone()
    }

    /// Creates a weak reference to this stream.
    pub fn downgrade(&self) -> WeakStream {
        WeakStream { inner: Arc::downgrade(&self.inner) }
    }

    /// Appends a kernel body to the stream.
    ///
    /// This is the hook launch primitives use to place work on a stream.
    pub fn submit<F>(&self, label: &'static str, body: F) -> Result<(), RuntimeStatus>
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.shared.push(
            Command::Kernel { label, body: Box::new(body) },
            false,
        )
    }

    /// Records `event` at the current end of the stream.
    pub fn record(&self, event: &Event) -> Result<(), DeviceError> {
        let generation = event.begin_record();
        self.record_generation(event, generation)
    }

    /// Queues completion of an already-begun record of `event`.
    pub(crate) fn record_generation(&self, event: &Event, generation: u64) -> Result<(), DeviceError> {
        let command = Command::Record { event: event.clone(), generation };

        self.inner.shared.push(command, false).map_err(|status| {
            let error = DeviceError::new(status, self.id(), "record rejected");
            event.complete(generation, Err(error.clone()));
            error
        })
    }

    /// Makes all later work on this stream wait for `event`'s latest record.
    pub fn wait_event(&self, event: &Event) -> Result<(), DeviceError> {
        let command = Command::Wait { event: event.clone(), generation: event.generation() };
        self.inner
            .shared
            .push(command, false)
            .map_err(|status| DeviceError::new(status, self.id(), "wait rejected"))
    }

    /// Makes later work wait for every event in `events`.
    ///
    /// The waits are queued together: if the stream refuses them, none is
    /// queued.
    pub(crate) fn wait_events(&self, events: &[Event]) -> Result<(), DeviceError> {
        if events.is_empty() {
            return Ok(());
        }
        let commands = events.iter().map(|event| Command::Wait {
            event: event.clone(),
            generation: event.generation(),
        });
        self.inner
            .shared
            .push_all(commands, false)
            .map_err(|status| DeviceError::new(status, self.id(), "wait rejected"))
    }

    /// Blocks the calling thread until all work queued so far has run.
    pub fn synchronize(&self) -> Result<(), DeviceError> {
        let event = Event::new();
        self.record(&event)?;
        event.wait()
    }

    /// Hands `resources` to the stream, dropping them after all queued work.
    ///
    /// Accepted even on a closed stream. If the worker cannot run, the
    /// resources are dropped immediately.
    pub(crate) fn release(&self, resources: Vec<Dependency>) {
        if resources.is_empty() {
            return;
        }
        if let Err(status) = self.inner.shared.push(Command::Release(resources), true) {
            warn!(stream = self.id(), %status, "deferred release rejected");
        }
    }
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("id", &self.id())
            .field("name", &self.name())
            .finish()
    }
}

/// Allocates owned streams with consistent naming.
#[derive(Debug, Clone)]
pub struct StreamFactory {
    thread_name_prefix: String,
    stack_size: Option<usize>,
}

impl Default for StreamFactory {
    fn default() -> Self {
        Self::from_config(&DeviceConfig::default())
    }
}

impl StreamFactory {
    /// Factory naming threads after `config`.
    pub fn from_config(config: &DeviceConfig) -> Self {
        Self {
            thread_name_prefix: config.thread_name_prefix.clone(),
            stack_size: config.stream_stack_size,
        }
    }

    /// Allocates a new stream and starts its worker.
    pub fn allocate(&self) -> Result<Stream, AllocationError> {
        let id = next_stream_id();
        let name = format!("{}-stream-{}", self.thread_name_prefix, id);
        Stream::spawn(id, name, self.stack_size)
    }
}
