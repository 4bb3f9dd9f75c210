// Copyright (c) 2025 Qorix GmbH
//
// This program and the accompanying materials are made available under the
// terms of the Apache License, Version 2.0 which is available at
// https://www.apache.org/licenses/LICENSE-2.0.
//
// SPDX-License-Identifier: Apache-2.0

use crate::actions::{label, Action};
use crate::sink::{LogSink, TracingSink};
use crate::{base::*, dispatch_errors};
use logging_tracing::prelude::*;
use qor_core::prelude::*;

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, OnceLock, PoisonError};
use std::thread::{JoinHandle, ThreadId};
use std::time::Instant;

/// Hook receiving failures of actions nobody waits for
type FailureHook = Box<dyn Fn(&dyn Action, &Error) + Send + Sync + 'static>;

/// The ActionQueueBuilder configures an ActionQueue
pub struct ActionQueueBuilder {
    /// Name of the queue, also used for the consumer thread
    name: String,

    /// Sink receiving failures of executed actions
    error_sink: Arc<dyn LogSink>,

    /// Optional hook for failures of fire-and-forget actions
    failure_hook: Option<FailureHook>,
}

impl ActionQueueBuilder {
    pub const DEFAULT_NAME: &'static str = "Dispatch";

    /// Create a new builder with default values.
    pub fn new() -> ActionQueueBuilder {
        ActionQueueBuilder {
            name: Self::DEFAULT_NAME.to_string(),
            error_sink: Arc::new(TracingSink::errors()),
            failure_hook: None,
        }
    }

    /// Set the name of the queue.
    pub fn with_name(mut self, name: impl Into<String>) -> ActionQueueBuilder {
        self.name = name.into();
        self
    }

    /// Set the sink that receives failures of executed actions.
    pub fn with_error_sink(mut self, sink: Arc<dyn LogSink>) -> ActionQueueBuilder {
        self.error_sink = sink;
        self
    }

    /// Set a hook that is called with every failed action that was submitted by `invoke`.
    ///
    /// The hook runs on the consumer thread after the failure was logged. Submitters of
    /// fire-and-forget actions still receive no failure signal.
    pub fn with_failure_hook(
        mut self,
        hook: impl Fn(&dyn Action, &Error) + Send + Sync + 'static,
    ) -> ActionQueueBuilder {
        self.failure_hook = Some(Box::new(hook));
        self
    }

    /// Build the queue and start its consumer thread.
    pub fn build(self) -> DispatchResult<ActionQueue> {
        ActionQueue::new(self.name, self.error_sink, self.failure_hook)
    }
}

impl Default for ActionQueueBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Progress of a record through the queue
#[derive(Debug, Clone, Copy, PartialEq)]
enum RecordProgress {
    /// Enqueued, waiting for the consumer
    NotStarted,

    /// Taken by the consumer and executing
    Started,

    /// Executed, with or without failure
    Completed,

    /// Dropped from the queue as it stopped before the record ran
    Abandoned,
}

/// An entry of the queue: one action and its progress
struct ActionRecord {
    action: Arc<dyn Action>,

    /// A caller blocks on this record
    waited: bool,

    /// The progress together with lock and signal
    progress: (Mutex<RecordProgress>, Condvar),
}

impl ActionRecord {
    fn new(action: Arc<dyn Action>, waited: bool) -> Self {
        Self {
            action,
            waited,
            progress: (Mutex::new(RecordProgress::NotStarted), Condvar::new()),
        }
    }

    /// Update the progress and wake the waiting caller
    fn transition_to(&self, to: RecordProgress) {
        let (lock, signal) = &self.progress;
        let mut progress = lock.lock().unwrap_or_else(PoisonError::into_inner);
        *progress = to;
        signal.notify_all();
    }
}

/// Clears the current slot and completes the record when dropped, also during unwinding
struct RecordCompletion<'a> {
    queue: &'a QueueInner,
    record: &'a ActionRecord,
}

impl Drop for RecordCompletion<'_> {
    fn drop(&mut self) {
        // leave the current slot before the waiter wakes up
        let mut state = self.queue.state.0.lock().unwrap_or_else(PoisonError::into_inner);
        state.current = None;
        drop(state);

        self.record.transition_to(RecordProgress::Completed);
    }
}

/// Records guarded by the queue mutex
#[derive(Default)]
struct QueueState {
    /// Records in submission order
    pending: VecDeque<Arc<ActionRecord>>,

    /// The record the consumer is executing
    current: Option<Arc<ActionRecord>>,
}

/// The inner queue, shared between the producers and the consumer thread.
struct QueueInner {
    name: String,

    /// The records, locked with signalling condition
    state: (Mutex<QueueState>, Condvar),

    /// A signal to stop the consumer
    stop_signal: AtomicBool,

    /// The consumer thread, fixed for the lifetime of the queue
    consumer: OnceLock<ThreadId>,

    error_sink: Arc<dyn LogSink>,
    failure_hook: Option<FailureHook>,
}

impl QueueInner {
    /// Push a new record and signal the consumer.
    fn push(&self, action: Arc<dyn Action>, waited: bool) -> DispatchResult<Arc<ActionRecord>> {
        let (state, notifier) = &self.state;

        // acquire the lock
        let mut state = state.lock().map_err(lock_error)?;

        // a stopped queue takes nothing new
        if self.stop_signal.load(Ordering::Acquire) {
            return Err(Error::new(
                dispatch_errors::QUEUE_STOPPED,
                format!("Queue `{}` is stopped", self.name),
            ));
        }

        action.state().submit();
        let record = Arc::new(ActionRecord::new(action, waited));
        state.pending.push_back(record.clone());

        // we hold the lock: notify the consumer
        notifier.notify_one();
        Ok(record)
    }

    /// Pop the head record or wait for one.
    ///
    /// Returns None once the stop signal is set. The popped record is marked started
    /// and becomes the current record while the lock is still held, so the queue never
    /// appears empty while an action is in transit.
    fn pop_record_or_wait(&self) -> Option<Arc<ActionRecord>> {
        let (state, notifier) = &self.state;

        // acquire the lock
        let mut state = state.lock().ok()?;

        loop {
            // stop signal is checked on every iteration boundary
            if self.stop_signal.load(Ordering::Acquire) {
                return None;
            }

            if let Some(record) = state.pending.pop_front() {
                record.transition_to(RecordProgress::Started);
                state.current = Some(record.clone());
                return Some(record);
            }

            // queue is empty: wait for a signal
            state = notifier.wait(state).ok()?;
        }
    }

    /// Execute a record on the consumer thread. Failures never leave this function.
    fn execute_record(&self, record: &ActionRecord) {
        let _completion = RecordCompletion { queue: self, record };

        let action = &record.action;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            trace!(queue = %self.name, action = %label(&**action), "Executing action");

            if let Err(err) = action.execute() {
                self.report_failure(&**action, &err, record.waited);
            }
        }));

        // e.g. a panicking description, the body itself is contained by `execute`
        if let Err(payload) = outcome {
            error!(queue = %self.name, "Executing an action panicked: {}", panic_message(&*payload));
        }
    }

    /// Log a failure to `tracing` and the error sink, and pass it to the failure hook
    /// unless a caller waits for it. Panics of sink or hook are contained.
    fn report_failure(&self, action: &dyn Action, err: &Error, waited: bool) {
        let report = panic::catch_unwind(AssertUnwindSafe(|| {
            let line = format!("Action `{}` failed: {}", label(action), err);
            error!(queue = %self.name, "{}", line);
            self.error_sink.log(&line);

            if !waited {
                if let Some(hook) = &self.failure_hook {
                    hook(action, err);
                }
            }
        }));

        if let Err(payload) = report {
            error!(
                queue = %self.name,
                "Reporting a failed action panicked: {}",
                panic_message(&*payload)
            );
        }
    }

    /// Mark all pending records abandoned, their waiters receive `QUEUE_STOPPED`.
    fn abandon_pending(&self) {
        let abandoned: Vec<_> = match self.state.0.lock() {
            Ok(mut state) => state.pending.drain(..).collect(),
            Err(poisoned) => poisoned.into_inner().pending.drain(..).collect(),
        };

        if !abandoned.is_empty() {
            debug!(queue = %self.name, "Abandoning {} pending actions", abandoned.len());
        }
        for record in abandoned {
            record.transition_to(RecordProgress::Abandoned);
        }
    }

    /// The thread procedure of the consumer.
    fn run(self: Arc<Self>) {
        debug!(queue = %self.name, "Consumer thread running");

        while let Some(record) = self.pop_record_or_wait() {
            self.execute_record(&record);
        }

        self.abandon_pending();
        debug!(queue = %self.name, "Consumer thread exiting");
    }
}

/// Reports failures of actions that ran off the queue, e.g. on detached workers, the same
/// way the consumer reports its own.
pub(crate) struct FailureReporter(Arc<QueueInner>);

impl FailureReporter {
    pub(crate) fn report(&self, action: &dyn Action, err: &Error) {
        self.0.report_failure(action, err, false);
    }
}

/// An ActionQueue runs actions on one dedicated consumer thread in submission order.
///
/// Producers on any thread either submit and return (`invoke`) or submit and block until
/// the action completed (`invoke_and_wait`). The consumer survives failing actions; failures
/// surface to blocked callers and are logged otherwise.
///
/// ```rust
/// use qor_dispatch::prelude::*;
/// use std::sync::Arc;
///
/// let queue = ActionQueueBuilder::new().with_name("Worker").build().unwrap();
///
/// let action = ClosureAction::new("say hello", |_| {
///     println!("Hello World!");
///     Ok(())
/// });
/// queue.invoke_and_wait(Arc::new(action)).unwrap();
///
/// queue.stop();
/// queue.join().unwrap();
/// ```
pub struct ActionQueue {
    inner: Arc<QueueInner>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl ActionQueue {
    fn new(
        name: String,
        error_sink: Arc<dyn LogSink>,
        failure_hook: Option<FailureHook>,
    ) -> DispatchResult<ActionQueue> {
        let inner = Arc::new(QueueInner {
            name,
            state: (Mutex::new(QueueState::default()), Condvar::new()),
            stop_signal: AtomicBool::new(false),
            consumer: OnceLock::new(),
            error_sink,
            failure_hook,
        });

        // spawn the consumer utilizing a builder (for naming)
        let inner_clone = inner.clone();
        let thread = std::thread::Builder::new()
            .name(format!("{}_Consumer", inner.name))
            .spawn(move || inner_clone.run())
            .map_err(|_| {
                Error::const_new(
                    dispatch_errors::THREAD_SPAWN_ERROR,
                    "Failed to spawn consumer thread",
                )
            })?;

        // nothing can be enqueued before we return, so the id is known before any action runs
        let _ = inner.consumer.set(thread.thread().id());

        Ok(ActionQueue {
            inner,
            thread: Mutex::new(Some(thread)),
        })
    }

    /// Get the name of the queue
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Check if the current thread is the consumer thread of this queue.
    pub fn is_consumer_thread(&self) -> bool {
        self.inner.consumer.get() == Some(&std::thread::current().id())
    }

    pub(crate) fn failure_reporter(&self) -> FailureReporter {
        FailureReporter(self.inner.clone())
    }

    /// Check if the stop signal is set
    pub fn is_stopped(&self) -> bool {
        self.inner.stop_signal.load(Ordering::Acquire)
    }

    /// Number of actions pending or executing.
    pub fn actions_in_queue(&self) -> usize {
        let state = self.inner.state.0.lock().unwrap_or_else(PoisonError::into_inner);
        state.pending.len() + usize::from(state.current.is_some())
    }

    /// Check if the consumer is executing an action right now.
    pub fn is_executing(&self) -> bool {
        let state = self.inner.state.0.lock().unwrap_or_else(PoisonError::into_inner);
        state.current.is_some()
    }

    /// Submit an action and return immediately.
    ///
    /// Failures of the action are only logged, and passed to the failure hook if set.
    pub fn invoke(&self, action: Arc<dyn Action>) -> DispatchResult<()> {
        self.inner.push(action, false).map(|_| ())
    }

    /// Submit an action and block until it completed.
    ///
    /// The wait has two phases: the caller waits without bound until the consumer took
    /// the action, then for at most the allowed time of the action until it completed.
    ///
    /// - `ACTION_TIMEOUT` if the allowed time elapsed. The action is interrupted but may
    ///   still be running on the consumer.
    /// - `ACTION_FAILED` if the action failed; the captured failure is attached as cause.
    /// - `QUEUE_STOPPED` if the queue stopped before the action ran.
    /// - `REENTRANT_WAIT` if called on the consumer thread, which would wait on itself.
    pub fn invoke_and_wait(&self, action: Arc<dyn Action>) -> DispatchResult<()> {
        if self.is_consumer_thread() {
            return Err(Error::new(
                dispatch_errors::REENTRANT_WAIT,
                format!(
                    "Action `{}` cannot wait on the consumer of queue `{}` from the consumer itself",
                    label(&*action),
                    self.inner.name
                ),
            ));
        }

        let record = self.inner.push(action.clone(), true)?;
        let (progress_lock, signal) = &record.progress;
        let mut progress = progress_lock.lock().map_err(lock_error)?;

        // phase one: wait until the consumer took the record
        while *progress == RecordProgress::NotStarted {
            progress = signal.wait(progress).map_err(lock_error)?;
        }

        if *progress == RecordProgress::Abandoned {
            return Err(Error::new(
                dispatch_errors::QUEUE_STOPPED,
                format!(
                    "Queue `{}` stopped before action `{}` ran",
                    self.inner.name,
                    label(&*action)
                ),
            ));
        }

        // phase two: wait for completion within the allowed time
        let allowed_time = action.state().allowed_time();
        let deadline = Instant::now() + allowed_time;
        while *progress != RecordProgress::Completed {
            let now = Instant::now();
            if now >= deadline {
                drop(progress);
                action.interrupt();
                return Err(Error::new(
                    dispatch_errors::ACTION_TIMEOUT,
                    format!("Action `{}` timed out after {:?}", label(&*action), allowed_time),
                ));
            }

            let (guard, _) = signal
                .wait_timeout(progress, deadline - now)
                .map_err(lock_error)?;
            progress = guard;
        }
        drop(progress);

        match action.state().failure() {
            Some(cause) => Err(Error::new(
                dispatch_errors::ACTION_FAILED,
                format!("Action `{}` failed", label(&*action)),
            )
            .caused_by(cause)),
            None => Ok(()),
        }
    }

    /// Send the stop signal to the consumer.
    ///
    /// The consumer finishes the action it is executing, then exits. Actions still pending
    /// are abandoned.
    pub fn stop(&self) {
        self.inner.stop_signal.store(true, Ordering::Release);

        // the consumer waits in `pop_record_or_wait` only, notify under the lock so the signal is not lost
        let (state, notifier) = &self.inner.state;
        let _ = state.lock().map(|_| notifier.notify_all());
    }

    /// Wait for the consumer thread to exit. Requires a stop signal to return.
    pub fn join(&self) -> DispatchResult<()> {
        if self.is_consumer_thread() {
            return Err(Error::const_new(
                dispatch_errors::REENTRANT_WAIT,
                "The consumer thread cannot join itself",
            ));
        }

        let thread = self.thread.lock().map_err(lock_error)?.take();
        match thread {
            Some(thread) => thread.join().map_err(|_| {
                Error::const_new(
                    dispatch_errors::THREAD_JOIN_ERROR,
                    "Consumer thread failed to join",
                )
            }),
            None => Ok(()),
        }
    }
}

impl Drop for ActionQueue {
    fn drop(&mut self) {
        self.stop();
        if !self.is_consumer_thread() {
            let _ = self.join();
        }
    }
}
