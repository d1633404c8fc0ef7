#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;

use stream_dispatch::engine::error::RuntimeStatus;
use stream_dispatch::engine::kernel::Kernel;
use stream_dispatch::engine::launch::{Launcher, Sequential};
use stream_dispatch::engine::stream::Stream;
use stream_dispatch::{DeviceConfig, Dispatcher};

/// Launcher that counts invocations and can be told to reject every launch.
#[derive(Default)]
pub struct CountingLauncher {
    launches: AtomicUsize,
    reject_with: Option<RuntimeStatus>,
}

impl CountingLauncher {
    pub fn rejecting(status: RuntimeStatus) -> Self {
        Self { launches: AtomicUsize::new(0), reject_with: Some(status) }
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

impl Launcher for CountingLauncher {
    fn launch<K: Kernel>(&self, count: usize, kernel: K, stream: &Stream) -> Result<(), RuntimeStatus> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        match self.reject_with {
            Some(status) => Err(status),
            None => Sequential.launch(count, kernel, stream),
        }
    }
}

pub fn counting_dispatcher() -> Dispatcher<CountingLauncher> {
    Dispatcher::with_launcher(CountingLauncher::default(), &DeviceConfig::default())
}

/// Blocks a stream until the returned sender is used or dropped.
pub fn block(stream: &Stream) -> mpsc::Sender<()> {
    let (open, gate) = mpsc::channel::<()>();
    stream
        .submit("gate", move || {
            let _ = gate.recv();
        })
        .unwrap();
    open
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
