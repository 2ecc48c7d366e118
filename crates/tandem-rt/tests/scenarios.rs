// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! End-to-end batches on a virtual clock.
//! Each test drives `stream` / `concurrently` through a real executor and
//! checks ordering, failure capture and how often the caller was resumed.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::rc::Rc;
use std::time::Duration;

use futures::StreamExt;
use tandem_rt::{
    boxed, concurrently, from_fn, stream, BoxOperation, ClockMode, Continuation, Executor,
    ExecutorConfig, Failure, Handle, InvariantViolation, Outcome, RuntimeError,
};

fn virtual_executor() -> Executor {
    Executor::with_config(
        ExecutorConfig::default()
            .with_clock(ClockMode::Virtual)
            .with_name("scenarios"),
    )
}

/// Resolve to `value` after `millis` of executor time.
fn delayed<E: 'static>(handle: &Handle, millis: u64, value: &'static str) -> BoxOperation<&'static str, E> {
    let handle = handle.clone();
    boxed(move || async move {
        handle.sleep(Duration::from_millis(millis)).await;
        Ok(value)
    })
}

#[test]
fn stream_yields_earlier_finisher_first() {
    let exec = virtual_executor();
    let h = exec.handle();
    let ops = vec![(1, delayed::<()>(&h, 300, "A")), (2, delayed(&h, 100, "B"))];
    let items: Vec<_> = exec.block_on(stream(&h, ops).collect()).unwrap();
    assert_eq!(items, vec![(2, Outcome::Ok("B")), (1, Outcome::Ok("A"))]);
}

#[test]
fn concurrently_keeps_key_order() {
    let exec = virtual_executor();
    let h = exec.handle();
    let ops = vec![(1, delayed::<()>(&h, 300, "A")), (2, delayed(&h, 100, "B"))];
    let results = exec.block_on(concurrently(&h, ops)).unwrap();
    let entries: Vec<_> = results.into_iter().collect();
    assert_eq!(entries, vec![(1, Outcome::Ok("A")), (2, Outcome::Ok("B"))]);
    // The batch takes as long as its slowest member.
    assert_eq!(h.elapsed(), Duration::from_millis(300));
}

#[test]
fn concurrently_captures_failure_without_violation() {
    let exec = virtual_executor();
    let ops: Vec<(u32, BoxOperation<&'static str, String>)> = vec![
        (1, boxed(from_fn(|| Ok("X")))),
        (2, boxed(from_fn(|| Err("boom".to_string())))),
    ];
    let results = exec.block_on(concurrently(&exec, ops)).unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[&1], Outcome::Ok("X"));
    match &results[&2] {
        Outcome::Err(failure) => assert_eq!(failure.to_string(), "boom"),
        other => panic!("expected failure, got {:?}", other),
    }
}

#[test]
fn stream_matches_direct_invocation() {
    let exec = virtual_executor();
    let h = exec.handle();
    let ops = (0..20u64).map(|i| {
        let h = h.clone();
        (i, move || async move {
            // Finish in an order unrelated to the keys.
            h.sleep(Duration::from_millis((i * 7) % 11)).await;
            if i % 5 == 0 {
                Err(i)
            } else {
                Ok(i * i)
            }
        })
    });
    let items: Vec<_> = exec.block_on(stream(&h, ops).collect()).unwrap();
    assert_eq!(items.len(), 20);

    let keys: HashSet<_> = items.iter().map(|(k, _)| *k).collect();
    assert_eq!(keys.len(), 20);
    for (k, outcome) in items {
        let expected = if k % 5 == 0 {
            Outcome::Err(Failure::Error(k))
        } else {
            Outcome::Ok(k * k)
        };
        assert_eq!(outcome, expected);
    }
}

#[test]
fn failure_isolation() {
    let exec = virtual_executor();
    let h = exec.handle();
    let calls = Rc::new(Cell::new(0));
    let ops = (0..6).map(|i| {
        let calls = calls.clone();
        (
            i,
            from_fn(move || {
                calls.set(calls.get() + 1);
                if i == 3 {
                    panic!("operation {} exploded", i);
                }
                Ok::<_, ()>(i)
            }),
        )
    });
    let results = exec.block_on(concurrently(&h, ops)).unwrap();
    // Run once each, never retried.
    assert_eq!(calls.get(), 6);
    for (k, outcome) in &results {
        if *k == 3 {
            assert_eq!(
                outcome,
                &Outcome::Err(Failure::Panic("operation 3 exploded".into()))
            );
        } else {
            assert_eq!(outcome, &Outcome::Ok(*k));
        }
    }
}

#[derive(Debug, PartialEq)]
struct DiskFull {
    bytes: u64,
}

#[test]
fn panic_payloads_survive_capture() {
    let exec = virtual_executor();
    let ops: Vec<(u8, BoxOperation<(), ()>)> = vec![
        (1, boxed(from_fn(|| -> Result<(), ()> {
            std::panic::panic_any(DiskFull { bytes: 42 })
        }))),
        (2, boxed(from_fn(|| -> Result<(), ()> { std::panic::panic_any(7u32) }))),
    ];
    let mut results = exec.block_on(concurrently(&exec, ops)).unwrap();

    let Some(Outcome::Err(Failure::Panic(disk))) = results.shift_remove(&1) else {
        panic!("expected a caught panic for 1");
    };
    assert_eq!(disk.downcast_ref::<DiskFull>(), Some(&DiskFull { bytes: 42 }));

    let Some(Outcome::Err(Failure::Panic(code))) = results.shift_remove(&2) else {
        panic!("expected a caught panic for 2");
    };
    let raw = code.into_panic();
    assert_eq!(raw.downcast_ref::<u32>(), Some(&7));
}

#[test]
fn empty_batches_never_park() {
    let exec = virtual_executor();
    let none = || Vec::<(char, BoxOperation<(), ()>)>::new();

    let h = exec.handle();
    let (streamed, collected) = exec
        .block_on(async move {
            let streamed = stream(&h, none()).count().await;
            let collected = concurrently(&h, none()).await;
            (streamed, collected)
        })
        .unwrap();
    assert_eq!(streamed, 0);
    assert!(collected.is_empty());
    assert_eq!(exec.stats().root_polls, 1);
}

#[test]
fn collector_resumes_its_caller_once() {
    for n in [1usize, 2, 17] {
        let exec = virtual_executor();
        let h = exec.handle();
        let op_handle = h.clone();
        let ops = (0..n).map(move |i| {
            let h = op_handle.clone();
            (i, move || async move {
                h.sleep(Duration::from_millis(10 * (n - i) as u64)).await;
                Ok::<_, ()>(i)
            })
        });
        let results = exec
            .block_on(async move { concurrently(&h, ops).await })
            .unwrap();
        assert_eq!(results.len(), n);
        assert_eq!(exec.stats().root_polls, 2, "batch of {}", n);
    }
}

#[test]
fn two_batches_share_one_executor() {
    let exec = virtual_executor();
    let h = exec.handle();
    let first = vec![("a", delayed::<()>(&h, 200, "first-a")), ("b", delayed(&h, 400, "first-b"))];
    let second = vec![("a", delayed::<()>(&h, 100, "second-a")), ("b", delayed(&h, 300, "second-b"))];

    let (one, two) = exec
        .block_on(futures::future::join(
            concurrently(&h, first),
            concurrently(&h, second),
        ))
        .unwrap();
    assert_eq!(one["a"], Outcome::Ok("first-a"));
    assert_eq!(two["a"], Outcome::Ok("second-a"));
    assert_eq!(one["b"], Outcome::Ok("first-b"));
    assert_eq!(two["b"], Outcome::Ok("second-b"));
}

#[test]
fn abandoned_stream_stays_quiet() {
    let exec = virtual_executor();
    let h = exec.handle();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let ops = vec![
        ("fast", delayed::<()>(&h, 100, "fast")),
        ("slow", delayed(&h, 500, "slow")),
        ("slower", delayed(&h, 900, "slower")),
    ];
    let s = seen.clone();
    exec.block_on(async move {
        let mut completions = stream(&h, ops);
        while let Some((key, outcome)) = completions.next().await {
            s.borrow_mut().push(key);
            if outcome.is_ok() {
                break;
            }
        }
    })
    .unwrap();
    exec.run().unwrap();
    assert_eq!(*seen.borrow(), vec!["fast"]);
    assert_eq!(exec.handle().pending_tasks(), 0);
}

#[test]
fn suspended_caller_stalls_without_work() {
    let exec = virtual_executor();
    let never: Continuation<u8> = Continuation::new();
    let err = exec.block_on(never.suspend()).unwrap_err();
    assert!(matches!(err, RuntimeError::Stalled { .. }));
}

#[test]
fn separate_continuations_get_their_own_values() {
    let exec = virtual_executor();
    let h = exec.handle();
    let first = Continuation::new();
    let second = Continuation::new();
    {
        let first = first.clone();
        h.delay(Duration::from_millis(500), move || {
            let _ = first.resume("first");
        });
    }
    {
        let second = second.clone();
        h.delay(Duration::from_millis(100), move || {
            let _ = second.resume("second");
        });
    }
    let got = exec
        .block_on(async { (first.suspend().await, second.suspend().await) })
        .unwrap();
    assert_eq!(got, ("first", "second"));
}

#[test]
fn invariant_violations_escape_the_executor() {
    let exec = virtual_executor();
    let h = exec.handle();
    h.defer(|| {
        std::panic::panic_any(InvariantViolation {
            message: "synthetic".into(),
        });
    });
    let caught = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| exec.run())).unwrap_err();
    assert!(caught.downcast_ref::<InvariantViolation>().is_some());
}
