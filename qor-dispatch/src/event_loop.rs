// Copyright (c) 2025 Qorix GmbH
//
// This program and the accompanying materials are made available under the
// terms of the Apache License, Version 2.0 which is available at
// https://www.apache.org/licenses/LICENSE-2.0.
//
// SPDX-License-Identifier: Apache-2.0

//! A minimal event loop serving as owning thread.
//!
//! The loop drains a channel of actions on whatever thread calls `LoopRunner::run`.
//! Any number of `LoopHandle` clones submit actions to it, synchronously with
//! `sync_exec` or asynchronously with `async_exec`.

use crate::actions::{label, Action};
use crate::executor::{DispatchExecutor, OwningThread};
use crate::queue::{ActionQueue, ActionQueueBuilder};
use crate::{base::*, dispatch_errors};
use logging_tracing::prelude::*;
use qor_core::prelude::*;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, SyncSender};
use std::sync::{Arc, OnceLock};
use std::thread::{JoinHandle, ThreadId};

/// Messages processed by the loop
enum LoopMessage {
    /// Execute the action; the result goes back on the reply channel if there is one
    Run(Arc<dyn Action>, Option<SyncSender<DispatchResult<()>>>, PendingToken),

    /// Leave the loop
    Shutdown,
}

/// Counts a message as pending until the message is taken or dropped.
///
/// Messages left in the channel when the loop exits are dropped with the receiver, so the
/// count returns to zero however a message ends.
struct PendingToken(Arc<LoopShared>);

impl PendingToken {
    fn new(shared: &Arc<LoopShared>) -> Self {
        shared.pending.fetch_add(1, Ordering::AcqRel);
        PendingToken(shared.clone())
    }
}

impl Drop for PendingToken {
    fn drop(&mut self) {
        self.0.pending.fetch_sub(1, Ordering::AcqRel);
    }
}

/// State shared between the handles and the runner
struct LoopShared {
    name: String,

    /// The thread servicing the loop, set once it runs
    thread: OnceLock<ThreadId>,

    /// Messages sent but not yet taken by the loop
    pending: AtomicUsize,

    /// The loop is executing an action
    busy: AtomicBool,

    stopped: AtomicBool,
}

impl LoopShared {
    fn stopped_error(&self) -> Error {
        Error::new(
            dispatch_errors::LOOP_STOPPED,
            format!("Event loop `{}` is stopped", self.name),
        )
    }
}

/// Entry points to create event loops
pub struct EventLoop;

impl EventLoop {
    /// Create the handle and the runner of a new loop. Nothing runs until `LoopRunner::run`.
    pub fn channel(name: impl Into<String>) -> (LoopHandle, LoopRunner) {
        let (sender, receiver) = mpsc::channel();
        let shared = Arc::new(LoopShared {
            name: name.into(),
            thread: OnceLock::new(),
            pending: AtomicUsize::new(0),
            busy: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        });

        (
            LoopHandle {
                sender,
                shared: shared.clone(),
            },
            LoopRunner { receiver, shared },
        )
    }

    /// Create a new loop running on a dedicated thread named after the loop.
    pub fn spawn(name: impl Into<String>) -> DispatchResult<(LoopHandle, JoinHandle<DispatchResult<()>>)> {
        let (handle, runner) = Self::channel(name);

        let thread = std::thread::Builder::new()
            .name(handle.name().to_string())
            .spawn(move || runner.run())
            .map_err(|_| {
                Error::const_new(
                    dispatch_errors::THREAD_SPAWN_ERROR,
                    "Failed to spawn event loop thread",
                )
            })?;

        // known before the first submission
        let _ = handle.shared.thread.set(thread.thread().id());
        Ok((handle, thread))
    }
}

/// Services the loop on the calling thread
pub struct LoopRunner {
    receiver: Receiver<LoopMessage>,
    shared: Arc<LoopShared>,
}

impl LoopRunner {
    /// Run the loop until a handle requests shutdown or all handles are gone.
    ///
    /// Actions still queued when the loop exits are dropped; their synchronous callers
    /// receive `LOOP_STOPPED`.
    pub fn run(self) -> DispatchResult<()> {
        let current = std::thread::current().id();
        if *self.shared.thread.get_or_init(|| current) != current {
            return Err(Error::new(
                dispatch_errors::REENTRANT_WAIT,
                format!("Event loop `{}` is bound to another thread", self.shared.name),
            ));
        }

        debug!(event_loop = %self.shared.name, "Event loop running");

        while let Ok(message) = self.receiver.recv() {
            match message {
                LoopMessage::Run(action, reply, token) => {
                    self.shared.busy.store(true, Ordering::Release);
                    drop(token);

                    let result = action.execute();
                    if let Err(err) = &result {
                        if reply.is_none() {
                            error!(event_loop = %self.shared.name, "Action `{}` failed: {}", label(&*action), err);
                        }
                    }

                    // the caller may have given up waiting
                    if let Some(reply) = reply {
                        let _ = reply.send(result);
                    }
                    self.shared.busy.store(false, Ordering::Release);
                }
                LoopMessage::Shutdown => break,
            }
        }

        self.shared.stopped.store(true, Ordering::Release);
        while let Ok(message) = self.receiver.try_recv() {
            if let LoopMessage::Run(action, _, _) = message {
                debug!(event_loop = %self.shared.name, "Dropping action `{}`", label(&*action));
            }
        }

        debug!(event_loop = %self.shared.name, "Event loop exiting");
        Ok(())
    }
}

/// Submits actions to an event loop
#[derive(Clone)]
pub struct LoopHandle {
    sender: Sender<LoopMessage>,
    shared: Arc<LoopShared>,
}

impl LoopHandle {
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Check if the current thread services the loop.
    pub fn is_loop_thread(&self) -> bool {
        self.shared.thread.get() == Some(&std::thread::current().id())
    }

    /// Check if no action is queued or executing.
    pub fn is_idle(&self) -> bool {
        self.shared.pending.load(Ordering::Acquire) == 0 && !self.shared.busy.load(Ordering::Acquire)
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.stopped.load(Ordering::Acquire)
    }

    fn send(&self, action: Arc<dyn Action>, reply: Option<SyncSender<DispatchResult<()>>>) -> DispatchResult<()> {
        if self.is_stopped() {
            return Err(self.shared.stopped_error());
        }

        action.state().submit();
        let token = PendingToken::new(&self.shared);

        // a rejected message is handed back and dropped here, releasing its token
        self.sender
            .send(LoopMessage::Run(action, reply, token))
            .map_err(|_| self.shared.stopped_error())
    }

    /// Run the action on the loop and block until it completed, at most for its allowed time.
    ///
    /// On the loop thread itself the action runs inline.
    pub fn sync_exec(&self, action: Arc<dyn Action>) -> DispatchResult<()> {
        if self.is_loop_thread() {
            return action.execute();
        }

        let (reply, result) = mpsc::sync_channel(1);
        self.send(action.clone(), Some(reply))?;

        let allowed_time = action.state().allowed_time();
        match result.recv_timeout(allowed_time) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                action.interrupt();
                Err(Error::new(
                    dispatch_errors::ACTION_TIMEOUT,
                    format!("Action `{}` timed out after {:?}", label(&*action), allowed_time),
                ))
            }
            Err(RecvTimeoutError::Disconnected) => Err(self.shared.stopped_error()),
        }
    }

    /// Queue the action on the loop and return immediately.
    pub fn async_exec(&self, action: Arc<dyn Action>) -> DispatchResult<()> {
        self.send(action, None)
    }

    /// Ask the loop to exit once the actions queued before this call ran.
    pub fn shutdown(&self) {
        let _ = self.sender.send(LoopMessage::Shutdown);
    }
}

/// An event loop acting as the owning thread of an executor
pub struct LoopOwner {
    handle: LoopHandle,
}

impl OwningThread for LoopOwner {
    fn execute_queue(&self, action: Arc<dyn Action>) -> DispatchResult<()> {
        self.handle.sync_exec(action)
    }

    fn execute_queue_detached(&self, action: Arc<dyn Action>) -> DispatchResult<()> {
        self.handle.async_exec(action)
    }

    fn is_on_queue(&self) -> bool {
        self.handle.is_loop_thread()
    }

    fn is_quiet(&self) -> bool {
        self.handle.is_idle()
    }
}

/// Executor marshaling onto an event loop
pub type LoopExecutor = DispatchExecutor<LoopOwner>;

impl DispatchExecutor<LoopOwner> {
    /// Create the executor for the loop behind the handle, with an internal queue of default name.
    pub fn new(handle: LoopHandle) -> DispatchResult<Self> {
        Ok(Self::with_queue(handle, ActionQueueBuilder::new().build()?))
    }

    pub fn with_queue(handle: LoopHandle, queue: ActionQueue) -> Self {
        Self::with_owner(LoopOwner { handle }, Arc::new(queue))
    }

    /// Get the handle of the loop
    pub fn handle(&self) -> &LoopHandle {
        &self.owner().handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::ClosureAction;
    use std::sync::Mutex;
    use std::time::Duration;

    #[test]
    fn test_sync_exec_runs_on_loop_thread() {
        let (handle, thread) = EventLoop::spawn("Loop").unwrap();
        assert_eq!(handle.is_loop_thread(), false);

        let handle_clone = handle.clone();
        let action = ClosureAction::quiet(move |_| {
            assert_eq!(handle_clone.is_loop_thread(), true);
            assert_eq!(std::thread::current().name(), Some("Loop"));

            // nested synchronous execution runs inline
            handle_clone.sync_exec(ClosureAction::quiet(|_| Ok(())).shared())
        });
        assert_eq!(handle.sync_exec(action.shared()), Ok(()));

        handle.shutdown();
        assert_eq!(thread.join().unwrap(), Ok(()));
        assert_eq!(handle.is_stopped(), true);

        // Wrong: submit after shutdown
        let err = handle.async_exec(ClosureAction::quiet(|_| Ok(())).shared()).unwrap_err();
        assert_eq!(err.code(), dispatch_errors::LOOP_STOPPED);
    }

    #[test]
    fn test_runner_on_caller_thread() {
        let (handle, runner) = EventLoop::channel("Caller");
        let seen = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let seen = seen.clone();
            handle
                .async_exec(
                    ClosureAction::quiet(move |_| {
                        seen.lock().unwrap().push(i);
                        Ok(())
                    })
                    .shared(),
                )
                .unwrap();
        }
        assert_eq!(handle.is_idle(), false);
        handle.shutdown();

        // drains everything queued before the shutdown on this thread
        assert_eq!(runner.run(), Ok(()));
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
        assert_eq!(handle.is_idle(), true);
        assert_eq!(handle.is_loop_thread(), true);
    }

    #[test]
    fn test_sync_exec_failure_and_timeout() {
        let (handle, thread) = EventLoop::spawn("Failing").unwrap();

        let failing = ClosureAction::new("broken", |_| {
            Err(Error::const_new(qor_core::core_errors::USER, "loop failure"))
        });
        let err = handle.sync_exec(failing.shared()).unwrap_err();
        assert_eq!(err.code(), dispatch_errors::ACTION_FAILED);
        assert_eq!(err.root_cause().text(), "loop failure");

        let slow = ClosureAction::new("slow", |state| {
            while !state.is_interrupted() && state.elapsed() < Duration::from_secs(2) {
                std::thread::sleep(Duration::from_millis(5));
            }
            Ok(())
        })
        .with_allowed_time(Duration::from_millis(50))
        .shared();
        let err = handle.sync_exec(slow.clone()).unwrap_err();
        assert_eq!(err.code(), dispatch_errors::ACTION_TIMEOUT);
        assert_eq!(slow.state().is_interrupted(), true);

        handle.shutdown();
        assert_eq!(thread.join().unwrap(), Ok(()));
    }

    #[test]
    fn test_timed_out_while_queued_runs_interrupted() {
        let (handle, thread) = EventLoop::spawn("Busy").unwrap();

        // hold the loop until released
        let gate = Arc::new(AtomicBool::new(false));
        let gate_clone = gate.clone();
        let blocker = ClosureAction::quiet(move |_| {
            while !gate_clone.load(Ordering::Acquire) {
                std::thread::sleep(Duration::from_millis(1));
            }
            Ok(())
        });
        handle.async_exec(blocker.shared()).unwrap();

        let saw_interrupt = Arc::new(AtomicBool::new(false));
        let saw_interrupt_clone = saw_interrupt.clone();
        let queued = ClosureAction::new("queued", move |state| {
            saw_interrupt_clone.store(state.is_interrupted(), Ordering::Release);
            Ok(())
        })
        .with_allowed_time(Duration::from_millis(50))
        .shared();

        let err = handle.sync_exec(queued.clone()).unwrap_err();
        assert_eq!(err.code(), dispatch_errors::ACTION_TIMEOUT);

        gate.store(true, Ordering::Release);
        handle.shutdown();
        assert_eq!(thread.join().unwrap(), Ok(()));

        // the body ran after the waiter gave up and saw its interruption
        assert_eq!(queued.state().started_at().is_some(), true);
        assert_eq!(saw_interrupt.load(Ordering::Acquire), true);
    }

    #[test]
    fn test_dropped_messages_leave_loop_idle() {
        let (handle, runner) = EventLoop::channel("Never");
        handle.async_exec(ClosureAction::quiet(|_| Ok(())).shared()).unwrap();
        handle.async_exec(ClosureAction::quiet(|_| Ok(())).shared()).unwrap();
        assert_eq!(handle.is_idle(), false);

        // the loop never runs: its queued messages go away with the runner
        drop(runner);
        assert_eq!(handle.is_idle(), true);

        // Wrong: submit to a loop without runner
        let err = handle.async_exec(ClosureAction::quiet(|_| Ok(())).shared()).unwrap_err();
        assert_eq!(err.code(), dispatch_errors::LOOP_STOPPED);
        assert_eq!(handle.is_idle(), true);
    }
}
