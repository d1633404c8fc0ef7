use criterion::*;
use std::hint::black_box;

use stream_dispatch::prelude::*;
use stream_dispatch::{DeviceConfig, Sequential};

const ELEMENTS_SMALL: usize = 1_000;
const ELEMENTS_LARGE: usize = 1_000_000;

fn for_each_benchmark(c: &mut Criterion) {
    let parallel = Dispatcher::new(&DeviceConfig::from_env()).unwrap();
    let sequential = Dispatcher::with_launcher(Sequential, &DeviceConfig::default());

    let mut group = c.benchmark_group("for_each");

    for &n in &[ELEMENTS_SMALL, ELEMENTS_LARGE] {
        let data = DeviceVec::from_host(vec![1.0f32; n]);
        group.throughput(Throughput::Elements(n as u64));

        group.bench_with_input(BenchmarkId::new("parallel_scale", n), &data, |b, data| {
            b.iter(|| {
                parallel
                    .for_each(Policy::new(), data.begin(), data.end(), |x: &mut f32| *x *= 1.0001)
                    .unwrap()
                    .wait()
                    .unwrap();
            });
        });

        group.bench_with_input(BenchmarkId::new("sequential_scale", n), &data, |b, data| {
            b.iter(|| {
                sequential
                    .for_each(Policy::new(), data.begin(), data.end(), |x: &mut f32| *x *= 1.0001)
                    .unwrap()
                    .wait()
                    .unwrap();
            });
        });

        black_box(data.to_host());
    }

    group.bench_function("empty_dispatch", |b| {
        let stream = Stream::new().unwrap();
        b.iter(|| {
            parallel
                .for_each_n(Policy::new().on(&stream), Counting::new(0), 0, |_: &mut usize| {})
                .unwrap()
                .wait()
                .unwrap();
        });
    });

    group.finish();
}

criterion_group!(benches, for_each_benchmark);
criterion_main!(benches);
