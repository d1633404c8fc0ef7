use criterion::*;
use std::hint::black_box;

use stream_dispatch::prelude::*;
use stream_dispatch::{profiler, DeviceConfig};

const CHAIN_LENGTH: usize = 64;
const ELEMENTS: usize = 10_000;

/// Dispatches `CHAIN_LENGTH` dependent steps and waits on the last one.
fn run_chain(dispatcher: &Dispatcher, data: &DeviceVec<u64>, first: Policy) {
    let mut previous = dispatcher
        .for_each(first, data.begin(), data.end(), |x: &mut u64| *x += 1)
        .unwrap();

    for _ in 1..CHAIN_LENGTH {
        previous = dispatcher
            .for_each(Policy::new().after(previous), data.begin(), data.end(), |x: &mut u64| *x += 1)
            .unwrap();
    }

    previous.wait().unwrap();
}

fn chain_benchmark(c: &mut Criterion) {
    profiler::init("profile/chain.json");

    let dispatcher = Dispatcher::new(&DeviceConfig::from_env()).unwrap();
    let data = DeviceVec::from_host(vec![0u64; ELEMENTS]);
    let stream = Stream::new().unwrap();

    let mut group = c.benchmark_group("chain");
    group.throughput(Throughput::Elements((CHAIN_LENGTH * ELEMENTS) as u64));

    group.bench_function("owned_stream", |b| {
        b.iter(|| run_chain(&dispatcher, &data, Policy::new()));
    });

    group.bench_function("borrowed_stream", |b| {
        b.iter(|| run_chain(&dispatcher, &data, Policy::new().on(&stream)));
    });

    group.bench_function("cross_stream_events", |b| {
        let other = Stream::new().unwrap();
        b.iter(|| {
            let marker = Event::new();
            other.record(&marker).unwrap();
            run_chain(&dispatcher, &data, Policy::new().on(&stream).after(&marker));
        });
    });

    group.finish();

    black_box(data.to_host());
    profiler::shutdown().unwrap();
}

criterion_group!(benches, chain_benchmark);
criterion_main!(benches);
