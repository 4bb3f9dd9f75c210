// Copyright (c) 2025 Qorix GmbH
//
// This program and the accompanying materials are made available under the
// terms of the Apache License, Version 2.0 which is available at
// https://www.apache.org/licenses/LICENSE-2.0.
//
// SPDX-License-Identifier: Apache-2.0

//! Dispatch runs actions on the thread that owns a single threaded subsystem
//!
//! # Overview
//!
//! Callers on any thread build an `Action` and hand it to the `ActionExecutor` of their
//! `Environment`. In dispatch mode the action is marshaled onto the owning thread, otherwise
//! it runs on the executor's internal `ActionQueue`. Blocking executions are bounded by the
//! allowed time of the action; calls issued on the owning thread run inline.
//!
//! # Examples
//!
//! ```rust
//! use qor_dispatch::prelude::*;
//!
//! fn main() {
//!     // The environment carries the executor and its settings
//!     let env = Environment::with_default_executor(EnvironmentConfig::default()).unwrap();
//!
//!     // Run an action on the owning thread and wait for it
//!     let hello = ClosureAction::new("hello", |_| {
//!         println!("Hello World!");
//!         Ok(())
//!     });
//!     env.executor().execute(&env, true, hello.shared()).unwrap();
//!
//!     // Fetch a value from the owning thread
//!     let answer = GetAction::new("answer", |_| Ok(42)).dispatch(&env).unwrap();
//!     assert_eq!(answer, 42);
//!
//!     // Wait until nothing is pending anymore
//!     env.wait_quiet().unwrap();
//! }
//! ```
//!
//! Further examples can be found in the examples directory of the crate.

pub mod prelude {
    pub use crate::base::*;

    pub use crate::actions::*;
    pub use crate::environment::*;
    pub use crate::event_loop::{EventLoop, LoopExecutor, LoopHandle, LoopRunner};
    pub use crate::executor::*;
    pub use crate::queue::*;
    pub use crate::sink::*;

    pub use qor_core::prelude::Error;
}

pub mod dispatch_errors;

/// Base module of the dispatch stack
mod base;
pub use base::*;

/// Actions: the units of work
mod actions;
pub use actions::*;

/// The single consumer action queue
mod queue;
pub use queue::*;

/// Executors routing actions to their thread
mod executor;
pub use executor::*;

/// The event loop reference owning thread
pub mod event_loop;

/// The environment handed to action issuers
mod environment;
pub use environment::*;

/// Dispatch log destinations
mod sink;
pub use sink::*;
