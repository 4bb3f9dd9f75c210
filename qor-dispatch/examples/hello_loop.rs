// Copyright (c) 2025 Qorix GmbH
//
// This program and the accompanying materials are made available under the
// terms of the Apache License, Version 2.0 which is available at
// https://www.apache.org/licenses/LICENSE-2.0.
//
// SPDX-License-Identifier: Apache-2.0

use logging_tracing::prelude::*;
use qor_dispatch::prelude::*;
use std::sync::Arc;
use std::time::Duration;

/// The main thread runs the event loop, a worker dispatches onto it
fn main() {
    let mut logging = TracingLibraryBuilder::new().enable_logging(true).build();
    logging.init_log_trace().unwrap();

    let (handle, runner) = EventLoop::channel("Main");
    let executor = Arc::new(LoopExecutor::new(handle.clone()).unwrap());
    let env = Environment::builder(executor).build();

    let worker = std::thread::spawn(move || {
        for i in 0..5 {
            let tick = ClosureAction::new(format!("tick {}", i), move |_| {
                info!("Tick {} on the main thread", i);
                Ok(())
            });
            env.executor().execute(&env, true, tick.shared()).unwrap();
            std::thread::sleep(Duration::from_millis(100));
        }

        // Future actions hand their value back to the worker
        let future = FutureAction::call(&env, "sum", || Ok((1..=10).sum::<u32>())).unwrap();
        info!("Sum is {}", future.get().unwrap());

        env.executor().execute_detached(&env, true, ClosureAction::quiet(|_| Ok(())).shared()).unwrap();
        handle.shutdown();
    });

    // Service the loop until the worker asks for shutdown
    runner.run().unwrap();
    worker.join().unwrap();
}
