// Copyright (c) 2025 Qorix GmbH
//
// This program and the accompanying materials are made available under the
// terms of the Apache License, Version 2.0 which is available at
// https://www.apache.org/licenses/LICENSE-2.0.
//
// SPDX-License-Identifier: Apache-2.0

use qor_dispatch::dispatch_errors;
use qor_dispatch::prelude::*;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

fn environment() -> (Environment, Arc<MemorySink>) {
    let errors = Arc::new(MemorySink::new());
    let queue = ActionQueueBuilder::new()
        .with_name("Test")
        .with_error_sink(errors.clone())
        .build()
        .unwrap();
    let env = Environment::builder(Arc::new(DefaultExecutor::with_queue(queue)))
        .with_config(EnvironmentConfig::default().with_quiet_timeout(Duration::from_secs(5)))
        .with_on_thread_sink(Arc::new(MemorySink::new()))
        .with_off_thread_sink(Arc::new(MemorySink::new()))
        .build();
    (env, errors)
}

#[test]
fn fifo_across_threads() {
    let (env, _) = environment();
    let counter = Arc::new(AtomicUsize::new(0));
    let misordered = Arc::new(AtomicBool::new(false));
    let submitted = Arc::new(Mutex::new(0usize));

    // submissions are numbered under a lock, so the expected ordinal is the submission order
    let threads: Vec<_> = (0..4)
        .map(|_| {
            let env = env.clone();
            let counter = counter.clone();
            let misordered = misordered.clone();
            let submitted = submitted.clone();
            std::thread::spawn(move || {
                for _ in 0..25 {
                    let mut next = submitted.lock().unwrap();
                    let ordinal = *next;
                    let counter = counter.clone();
                    let misordered = misordered.clone();
                    let action = ClosureAction::quiet(move |_| {
                        if counter.fetch_add(1, Ordering::AcqRel) != ordinal {
                            misordered.store(true, Ordering::Release);
                        }
                        Ok(())
                    });
                    env.executor().execute_detached(&env, false, action.shared()).unwrap();
                    *next += 1;
                }
            })
        })
        .collect();

    for thread in threads {
        thread.join().unwrap();
    }

    assert_eq!(env.wait_quiet(), Ok(()));
    assert_eq!(counter.load(Ordering::Acquire), 100);
    assert_eq!(misordered.load(Ordering::Acquire), false);
}

#[test]
fn blocking_call_sees_completed_body() {
    let (env, _) = environment();
    let value = Arc::new(Mutex::new(None));
    let value_clone = value.clone();

    let action = ClosureAction::new("store value", move |_| {
        std::thread::sleep(Duration::from_millis(30));
        *value_clone.lock().unwrap() = Some("written");
        Ok(())
    });

    assert_eq!(env.executor().execute(&env, false, action.shared()), Ok(()));
    assert_eq!(*value.lock().unwrap(), Some("written"));
}

#[test]
fn timeout_within_slack() {
    let (env, _) = environment();
    let action = ClosureAction::new("oversleeping", |state| {
        let until = Instant::now() + Duration::from_secs(1);
        while Instant::now() < until && !state.is_interrupted() {
            std::thread::sleep(Duration::from_millis(5));
        }
        Ok(())
    })
    .with_allowed_time(Duration::from_millis(100))
    .shared();

    let start = Instant::now();
    let err = env.executor().execute(&env, false, action.clone()).unwrap_err();
    let elapsed = start.elapsed();

    assert_eq!(err.code(), dispatch_errors::ACTION_TIMEOUT);
    assert_eq!(err.text().contains("oversleeping"), true);
    assert_eq!(elapsed >= Duration::from_millis(100), true);
    assert_eq!(elapsed < Duration::from_millis(250), true);
    assert_eq!(action.state().is_interrupted(), true);
}

#[test]
fn nested_dispatch_does_not_deadlock() {
    let (env, _) = environment();
    let depth = Arc::new(AtomicUsize::new(0));

    let env_clone = env.clone();
    let depth_clone = depth.clone();
    let outer = ClosureAction::new("outer", move |_| {
        let depth = depth_clone.clone();
        let inner = ClosureAction::new("inner", move |_| {
            depth.fetch_add(1, Ordering::AcqRel);
            Ok(())
        });
        env_clone.executor().execute(&env_clone, true, inner.shared())
    })
    .with_allowed_time(Duration::from_millis(500));

    let start = Instant::now();
    assert_eq!(env.executor().execute(&env, true, outer.shared()), Ok(()));
    assert_eq!(start.elapsed() < Duration::from_millis(500), true);
    assert_eq!(depth.load(Ordering::Acquire), 1);

    // no second record was enqueued
    assert_eq!(env.executor().is_quiet(), true);
}

#[test]
fn failure_propagation_and_logging() {
    let (env, errors) = environment();
    let failing = || {
        ClosureAction::new("fetch record", |_| {
            Err(Error::const_new(qor_core::core_errors::USER + 7, "record missing"))
        })
        .shared()
    };

    // Good: the blocked caller sees the failure with its cause
    let err = env.executor().execute(&env, false, failing()).unwrap_err();
    assert_eq!(err.code(), dispatch_errors::ACTION_FAILED);
    assert_eq!(err.text().contains("fetch record"), true);
    assert_eq!(err.root_cause().code(), qor_core::core_errors::USER + 7);
    errors.clear();

    // Good: the fire-and-forget submitter gets no failure, the log does
    assert_eq!(env.executor().execute_detached(&env, false, failing()), Ok(()));
    assert_eq!(env.wait_quiet(), Ok(()));
    assert_eq!(errors.contains("Action `fetch record` failed"), true);
}

#[test]
fn quiescence() {
    let (env, _) = environment();
    let release = Arc::new(AtomicBool::new(false));
    let release_clone = release.clone();

    let long_running = ClosureAction::quiet(move |_| {
        while !release_clone.load(Ordering::Acquire) {
            std::thread::sleep(Duration::from_millis(1));
        }
        Ok(())
    });
    env.executor()
        .execute_detached(&env, true, long_running.shared())
        .unwrap();
    assert_eq!(env.executor().is_quiet(), false);

    let err = env.executor().wait_quiet(Duration::from_millis(30)).unwrap_err();
    assert_eq!(err.code(), dispatch_errors::WAIT_QUIET_TIMEOUT);

    release.store(true, Ordering::Release);
    let start = Instant::now();
    assert_eq!(env.wait_quiet(), Ok(()));
    assert_eq!(start.elapsed() < Duration::from_millis(500), true);
    assert_eq!(env.executor().is_quiet(), true);
}

#[test]
fn scenario_a_b_c() {
    let (env, _) = environment();
    let names = Arc::new(Mutex::new(Vec::new()));

    for name in ["A", "B", "C"] {
        let names = names.clone();
        let env_clone = env.clone();

        // sequenced from this thread: each submitter is joined before the next starts
        std::thread::spawn(move || {
            let action = ClosureAction::new(name, move |_| {
                names.lock().unwrap().push(name);
                Ok(())
            });
            env_clone.executor().execute(&env_clone, false, action.shared())
        })
        .join()
        .unwrap()
        .unwrap();
    }

    assert_eq!(*names.lock().unwrap(), vec!["A", "B", "C"]);
}

#[test]
fn event_loop_executor() {
    let (handle, thread) = EventLoop::spawn("Display").unwrap();
    let executor = Arc::new(LoopExecutor::new(handle.clone()).unwrap());
    let env = Environment::builder(executor.clone()).build();

    // dispatched actions run on the loop, the others on the internal queue
    let on_loop = GetAction::new("on loop", |_| {
        Ok(std::thread::current().name().map(str::to_string))
    })
    .dispatch(&env)
    .unwrap();
    assert_eq!(on_loop, Some("Display".to_string()));

    let handle_clone = handle.clone();
    let off_loop = Arc::new(GetAction::new("off loop", move |_| Ok(handle_clone.is_loop_thread())));
    assert_eq!(env.executor().execute(&env, false, off_loop.clone()), Ok(()));
    assert_eq!(off_loop.take_result(), Ok(Some(false)));

    // future actions dispatch onto the loop as well
    let future = FutureAction::call(&env, "compute on loop", || Ok(21 * 2)).unwrap();
    assert_eq!(future.get_timeout(Duration::from_secs(1)), Ok(42));

    assert_eq!(env.wait_quiet(), Ok(()));
    handle.shutdown();
    assert_eq!(thread.join().unwrap(), Ok(()));
    assert_eq!(executor.shutdown(), Ok(()));
}

#[test]
fn stop_abandons_pending_actions() {
    let executor = Arc::new(DefaultExecutor::new().unwrap());
    let env = Environment::builder(executor.clone()).build();
    let ran = Arc::new(AtomicUsize::new(0));

    let gate = Arc::new(AtomicBool::new(false));
    let gate_clone = gate.clone();
    let blocker = ClosureAction::quiet(move |_| {
        while !gate_clone.load(Ordering::Acquire) {
            std::thread::sleep(Duration::from_millis(1));
        }
        Ok(())
    });
    executor.execute_detached(&env, false, blocker.shared()).unwrap();

    for _ in 0..3 {
        let ran = ran.clone();
        let action = ClosureAction::quiet(move |_| {
            ran.fetch_add(1, Ordering::AcqRel);
            Ok(())
        });
        executor.execute_detached(&env, false, action.shared()).unwrap();
    }

    // wait for the blocker to be taken, then stop behind it
    while !executor.queue().is_executing() {
        std::thread::yield_now();
    }
    executor.queue().stop();
    gate.store(true, Ordering::Release);

    assert_eq!(executor.queue().join(), Ok(()));
    assert_eq!(ran.load(Ordering::Acquire), 0);
    assert_eq!(executor.is_quiet(), true);

    // Wrong: submit to a stopped executor
    let err = executor
        .execute(&env, false, ClosureAction::quiet(|_| Ok(())).shared())
        .unwrap_err();
    assert_eq!(err.code(), dispatch_errors::QUEUE_STOPPED);
}
