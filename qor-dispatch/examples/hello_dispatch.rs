// Copyright (c) 2025 Qorix GmbH
//
// This program and the accompanying materials are made available under the
// terms of the Apache License, Version 2.0 which is available at
// https://www.apache.org/licenses/LICENSE-2.0.
//
// SPDX-License-Identifier: Apache-2.0

use logging_tracing::prelude::*;
use qor_dispatch::prelude::*;
use std::time::Duration;

/// A Hello World dispatch
fn main() {
    // Log to stdout, the dispatch log shows up as info events
    let mut logging = TracingLibraryBuilder::new()
        .global_log_level(Level::DEBUG)
        .enable_logging(true)
        .build();
    logging.init_log_trace().unwrap();
    let _span = logging.create_span().entered();

    // The environment holds the executor, its queue runs on thread `Hello_Consumer`
    let config = EnvironmentConfig::default()
        .with_queue_name("Hello")
        .with_action_timeout(Duration::from_secs(2));
    let env = Environment::with_default_executor(config).unwrap();

    // Hello the world from the owning thread
    let hello = ClosureAction::new("say hello", |_| {
        info!("Hello World from {:?}!", std::thread::current().name());
        Ok(())
    });
    env.executor().execute(&env, true, hello.shared()).unwrap();

    // Fire and forget: the failure only reaches the log
    let broken = ClosureAction::new("break things", |_| {
        Err(Error::const_new(qor_core::core_errors::USER, "broken on purpose"))
    });
    env.executor().execute_detached(&env, false, broken.shared()).unwrap();

    // Fetch a value
    let count = GetAction::new("count things", |_| Ok(3)).dispatch(&env).unwrap();
    info!("Counted {} things", count);

    // Wait for the queue to drain
    env.wait_quiet().unwrap();
}
