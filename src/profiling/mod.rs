/// Chrome Trace profiler for dispatch and stream execution.
///
/// When the `profiling` feature is enabled, every dispatch and every kernel
/// executed on a stream worker is recorded as a span, and the trace is
/// written as **Chrome Trace Event JSON** that opens in:
///
/// - `chrome://tracing`
/// - <https://ui.perfetto.dev>
///
/// ```bash
/// cargo bench --features profiling
/// ```
///
/// Without the feature, every call compiles to a no-op.
///
/// ## Usage
///
/// ```no_run
/// use stream_dispatch::profiler;
///
/// profiler::init("profile/dispatch.json");
///
/// {
///     let _g = profiler::span("app::frame");
///     // dispatch and wait
/// }
///
/// profiler::shutdown()?;
/// # Ok::<(), std::io::Error>(())
/// ```
///
/// ## What is recorded
///
/// - `dispatch::for_each` on the calling thread, with the element count
/// - the kernel name on the stream worker thread, with the stream id
/// - one thread-name metadata event per stream worker
pub mod profiler;
