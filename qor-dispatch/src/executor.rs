// Copyright (c) 2025 Qorix GmbH
//
// This program and the accompanying materials are made available under the
// terms of the Apache License, Version 2.0 which is available at
// https://www.apache.org/licenses/LICENSE-2.0.
//
// SPDX-License-Identifier: Apache-2.0

use crate::actions::{label, Action};
use crate::environment::Environment;
use crate::queue::{ActionQueue, ActionQueueBuilder};
use crate::{base::*, dispatch_errors};
use logging_tracing::prelude::*;
use qor_core::prelude::*;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

//
// Executor contract
//

/// An ActionExecutor runs actions for one owning subsystem.
///
/// With `dispatch` set the action is marshaled onto the owning thread. Otherwise it runs
/// inline when the caller is already in an action, or on the internal queue.
pub trait ActionExecutor: Send + Sync {
    /// Execute the action and block until it completed, timed out or failed.
    fn execute(&self, env: &Environment, dispatch: bool, action: Arc<dyn Action>) -> DispatchResult<()>;

    /// Submit the action with the same routing as `execute` but never block.
    ///
    /// Failures of the action are not reported to the caller. The result only reports
    /// failures of the submission itself.
    fn execute_detached(&self, env: &Environment, dispatch: bool, action: Arc<dyn Action>) -> DispatchResult<()>;

    /// Check if the current thread is the internal queue's consumer or the owning thread.
    fn is_in_action(&self) -> bool;

    /// Check if no action is pending or executing.
    fn is_quiet(&self) -> bool;

    /// Poll until the executor is quiet, at most for the given time.
    fn wait_quiet(&self, timeout: Duration) -> DispatchResult<()> {
        const POLL_PERIOD: Duration = Duration::from_millis(10);

        let deadline = Instant::now() + timeout;
        loop {
            if self.is_quiet() {
                return Ok(());
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(Error::new(
                    dispatch_errors::WAIT_QUIET_TIMEOUT,
                    format!("Executor not quiet after {:?}", timeout),
                ));
            }
            std::thread::sleep(POLL_PERIOD.min(deadline - now));
        }
    }
}

/// The owning thread of a subsystem, as seen by `DispatchExecutor`.
///
/// Implementations marshal actions onto the thread with the primitives of the subsystem.
pub trait OwningThread: Send + Sync {
    /// Run the action on the owning thread and block until it completed.
    fn execute_queue(&self, action: Arc<dyn Action>) -> DispatchResult<()>;

    /// Submit the action to the owning thread without waiting.
    fn execute_queue_detached(&self, action: Arc<dyn Action>) -> DispatchResult<()>;

    /// Check if the current thread is the owning thread.
    fn is_on_queue(&self) -> bool;

    /// Check if the owning thread has no actions pending or executing.
    fn is_quiet(&self) -> bool;
}

//
// Dispatch executor
//

/// Executor logic shared by all owning threads: routing, reentrancy detection, timeout
/// injection and logging.
pub struct DispatchExecutor<O: OwningThread> {
    owner: O,

    /// The internal queue for non-dispatched actions
    queue: Arc<ActionQueue>,

    /// Detached worker threads still running
    detached_workers: Arc<AtomicUsize>,
}

impl<O: OwningThread> DispatchExecutor<O> {
    /// Create an executor for the given owning thread and internal queue.
    pub fn with_owner(owner: O, queue: Arc<ActionQueue>) -> Self {
        Self {
            owner,
            queue,
            detached_workers: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn owner(&self) -> &O {
        &self.owner
    }

    /// Get the internal queue
    pub fn queue(&self) -> &Arc<ActionQueue> {
        &self.queue
    }

    /// Stop the internal queue and wait for its consumer to exit.
    pub fn shutdown(&self) -> DispatchResult<()> {
        debug!(queue = %self.queue.name(), "Shutting down executor");
        self.queue.stop();
        self.queue.join()
    }

    /// Inject the default allowed time and write the description to the dispatch log.
    fn prepare(&self, env: &Environment, dispatch: bool, action: &dyn Action) {
        let allowed_time = action
            .state()
            .inject_allowed_time(env.config().action_timeout());

        let description = action.description();
        if !description.is_empty() && !is_running_action() {
            if self.owner.is_on_queue() {
                env.on_thread_sink().log(&description);
            } else {
                env.off_thread_sink().log(&description);
            }
        }

        trace!(
            queue = %self.queue.name(),
            dispatch = dispatch,
            ?allowed_time,
            "Executing action `{}`",
            label(action)
        );
    }

    /// Run the action on a disposable thread, counted until it exits.
    fn spawn_worker(&self, action: Arc<dyn Action>) -> DispatchResult<()> {
        // count before the spawn, so the executor is never quiet while the worker starts
        self.detached_workers.fetch_add(1, Ordering::AcqRel);
        let workers = self.detached_workers.clone();
        let reporter = self.queue.failure_reporter();

        std::thread::Builder::new()
            .name(format!("{}_Detached", self.queue.name()))
            .spawn(move || {
                // reported like a failed fire-and-forget action of the queue
                if let Err(err) = action.execute() {
                    reporter.report(&*action, &err);
                }
                workers.fetch_sub(1, Ordering::AcqRel);
            })
            .map(|_| ())
            .map_err(|_| {
                self.detached_workers.fetch_sub(1, Ordering::AcqRel);
                Error::const_new(
                    dispatch_errors::THREAD_SPAWN_ERROR,
                    "Failed to spawn detached worker thread",
                )
            })
    }
}

impl<O: OwningThread> ActionExecutor for DispatchExecutor<O> {
    fn execute(&self, env: &Environment, dispatch: bool, action: Arc<dyn Action>) -> DispatchResult<()> {
        self.prepare(env, dispatch, &*action);

        if dispatch {
            if self.owner.is_on_queue() {
                // already on the owning thread: waiting on it would never return
                action.execute()
            } else {
                self.owner.execute_queue(action)
            }
        } else if self.is_in_action() {
            action.execute()
        } else {
            self.queue.invoke_and_wait(action)
        }
    }

    fn execute_detached(&self, env: &Environment, dispatch: bool, action: Arc<dyn Action>) -> DispatchResult<()> {
        self.prepare(env, dispatch, &*action);

        if dispatch {
            self.owner.execute_queue_detached(action)
        } else if self.is_in_action() {
            self.spawn_worker(action)
        } else {
            self.queue.invoke(action)
        }
    }

    fn is_in_action(&self) -> bool {
        self.queue.is_consumer_thread() || self.owner.is_on_queue()
    }

    fn is_quiet(&self) -> bool {
        self.queue.actions_in_queue() == 0
            && self.owner.is_quiet()
            && self.detached_workers.load(Ordering::Acquire) == 0
    }
}

//
// Default executor
//

/// The internal queue's consumer thread acting as the owning thread
pub struct QueueOwner {
    queue: Arc<ActionQueue>,
}

impl OwningThread for QueueOwner {
    fn execute_queue(&self, action: Arc<dyn Action>) -> DispatchResult<()> {
        self.queue.invoke_and_wait(action)
    }

    fn execute_queue_detached(&self, action: Arc<dyn Action>) -> DispatchResult<()> {
        self.queue.invoke(action)
    }

    fn is_on_queue(&self) -> bool {
        self.queue.is_consumer_thread()
    }

    fn is_quiet(&self) -> bool {
        self.queue.actions_in_queue() == 0
    }
}

/// Executor whose owning thread is the consumer of its internal queue.
///
/// ```rust
/// use qor_dispatch::prelude::*;
/// use std::sync::Arc;
///
/// let executor = Arc::new(DefaultExecutor::new().unwrap());
/// let env = Environment::builder(executor.clone()).build();
///
/// let action = ClosureAction::new("refresh", |_| Ok(()));
/// executor.execute(&env, true, action.shared()).unwrap();
/// executor.shutdown().unwrap();
/// ```
pub type DefaultExecutor = DispatchExecutor<QueueOwner>;

impl DispatchExecutor<QueueOwner> {
    /// Create the executor with a queue of default name
    pub fn new() -> DispatchResult<Self> {
        Ok(Self::with_queue(ActionQueueBuilder::new().build()?))
    }

    /// Create the executor around the given queue
    pub fn with_queue(queue: ActionQueue) -> Self {
        let queue = Arc::new(queue);
        Self::with_owner(QueueOwner { queue: queue.clone() }, queue)
    }
}
