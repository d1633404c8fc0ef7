use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use proptest::prelude::*;

use stream_dispatch::prelude::*;
use stream_dispatch::{for_each, for_each_n, DeviceConfig, RuntimeStatus, Sequential};

mod common;
use common::*;

const CHAIN_LINKS: usize = 100_000;

#[test]
fn doubles_every_element() {
    init_tracing();

    let data = DeviceVec::from_host(vec![10, 20, 30]);
    let future = for_each(Policy::new(), data.begin(), data.end(), |x: &mut i32| *x *= 2).unwrap();

    future.wait().unwrap();
    assert_eq!(data.to_host(), vec![20, 40, 60]);
}

#[test]
fn subrange_leaves_the_rest_untouched() {
    let data = DeviceVec::from_host(vec![1u64, 2, 3, 4, 5]);
    for_each(Policy::new(), data.at(1), data.at(4), |x: &mut u64| *x += 100)
        .unwrap()
        .wait()
        .unwrap();

    assert_eq!(data.to_host(), vec![1, 102, 103, 104, 5]);
}

#[test]
fn empty_range_completes_without_calling_op() {
    let dispatcher = counting_dispatcher();
    let calls = Arc::new(AtomicUsize::new(0));
    let data = DeviceVec::from_host(vec![7u8; 4]);

    let seen = Arc::clone(&calls);
    let future = dispatcher
        .for_each(Policy::new(), data.at(2), data.at(2), move |_: &mut u8| {
            seen.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    future.wait().unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(dispatcher.launcher().launches(), 1);
    assert_eq!(data.to_host(), vec![7u8; 4]);
}

#[test]
fn empty_range_still_waits_for_its_dependencies() {
    let dispatcher = counting_dispatcher();
    let stream = Stream::new().unwrap();
    let gate = block(&stream);

    let upstream = dispatcher
        .for_each_n(Policy::new().on(&stream), Counting::new(0), 8, |_: &mut usize| {})
        .unwrap();
    let empty = dispatcher
        .for_each_n(Policy::new().after(upstream), Counting::new(0), 0, |_: &mut usize| {})
        .unwrap();

    assert!(!empty.is_ready());
    drop(gate);
    empty.wait().unwrap();
}

#[test]
fn chained_dispatch_observes_the_first_one() {
    let stream = Stream::new().unwrap();
    let gate = block(&stream);
    let data = DeviceVec::from_host(vec![1i64, 2, 3, 4]);

    let first = for_each(Policy::new().on(&stream), data.begin(), data.end(), |x: &mut i64| *x += 1).unwrap();
    let second = for_each(Policy::new().after(first), data.begin(), data.end(), |x: &mut i64| *x *= 10).unwrap();

    assert!(!second.is_ready());
    assert!(!second.stream().unwrap().same_as(&stream));

    drop(gate);
    second.wait().unwrap();
    assert_eq!(data.to_host(), vec![20, 30, 40, 50]);
}

#[test]
fn chain_on_an_owned_stream_reuses_it() {
    let data = DeviceVec::from_host(vec![3u32; 16]);

    let first = for_each(Policy::new(), data.begin(), data.end(), |x: &mut u32| *x *= 3).unwrap();
    let owned = first.stream().unwrap().clone();
    let second = for_each(Policy::new().after(first), data.begin(), data.end(), |x: &mut u32| *x -= 1).unwrap();

    assert!(second.stream().unwrap().same_as(&owned));
    second.wait().unwrap();
    assert_eq!(data.to_host(), vec![8u32; 16]);
}

#[test]
fn panicking_op_faults_the_future_and_its_dependents() {
    init_tracing();

    let data = DeviceVec::from_host(vec![1, 2, 3]);
    let failing = for_each(Policy::new(), data.begin(), data.end(), |x: &mut i32| {
        if *x == 2 {
            panic!("element two");
        }
    })
    .unwrap();
    let done = failing.completion().unwrap().clone();
    let dependent = for_each(Policy::new().after(done), data.begin(), data.end(), |x: &mut i32| *x = 0).unwrap();

    let err = failing.wait().unwrap_err();
    assert_eq!(err.status, RuntimeStatus::KernelPanicked);
    assert!(err.detail.contains("element two"));

    let err = dependent.wait().unwrap_err();
    assert_eq!(err.status, RuntimeStatus::KernelPanicked);
    assert_eq!(data.to_host(), vec![1, 2, 3]);
}

#[test]
fn long_dependent_chain_waits_without_recursing() {
    let dispatcher = Dispatcher::with_launcher(Sequential, &DeviceConfig::default());
    let hits = Arc::new(AtomicUsize::new(0));

    let mut previous = Future::default();
    for link in 0..CHAIN_LINKS {
        let counter = Arc::clone(&hits);
        let policy = if link == 0 { Policy::new() } else { Policy::new().after(previous) };
        previous = dispatcher
            .for_each_n(policy, Counting::new(0), 1, move |_: &mut usize| {
                counter.fetch_add(1, Ordering::Relaxed);
            })
            .unwrap();
    }

    previous.wait().unwrap();
    assert_eq!(hits.load(Ordering::Relaxed), CHAIN_LINKS);
}

#[test]
fn abandoned_long_chain_is_released_on_its_stream() {
    let dispatcher = Dispatcher::with_launcher(Sequential, &DeviceConfig::default());
    let gated = Stream::new().unwrap();
    let gate = block(&gated);

    let mut previous = dispatcher
        .for_each_n(Policy::new().on(&gated), Counting::new(0), 1, |_: &mut usize| {})
        .unwrap();
    for _ in 1..CHAIN_LINKS {
        previous = dispatcher
            .for_each_n(Policy::new().after(previous), Counting::new(0), 1, |_: &mut usize| {})
            .unwrap();
    }
    let owned = previous.stream().unwrap().clone();
    let last = previous.completion().unwrap().clone();

    drop(previous);
    drop(gate);

    assert!(last.wait().is_ok());
    owned.synchronize().unwrap();
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn every_index_is_visited_exactly_once(n in 0usize..5000, start in 0usize..64) {
        let visits: Arc<Vec<AtomicUsize>> = Arc::new((0..start + n).map(|_| AtomicUsize::new(0)).collect());

        let counter = Arc::clone(&visits);
        for_each_n(Policy::new(), Counting::new(start), n, move |i: &mut usize| {
            counter[*i].fetch_add(1, Ordering::Relaxed);
        })
        .unwrap()
        .wait()
        .unwrap();

        for (i, visit) in visits.iter().enumerate() {
            let expected = usize::from(i >= start);
            prop_assert_eq!(visit.load(Ordering::Relaxed), expected, "index {}", i);
        }
    }

    #[test]
    fn every_element_is_written_exactly_once(values in proptest::collection::vec(any::<u16>(), 0..2000)) {
        let data = DeviceVec::from_host(values.iter().map(|&v| u32::from(v)).collect::<Vec<_>>());

        for_each(Policy::new(), data.begin(), data.end(), |x: &mut u32| *x += 1)
            .unwrap()
            .wait()
            .unwrap();

        let expected: Vec<u32> = values.iter().map(|&v| u32::from(v) + 1).collect();
        prop_assert_eq!(data.to_host(), expected);
    }
}
