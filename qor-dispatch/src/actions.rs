// Copyright (c) 2025 Qorix GmbH
//
// This program and the accompanying materials are made available under the
// terms of the Apache License, Version 2.0 which is available at
// https://www.apache.org/licenses/LICENSE-2.0.
//
// SPDX-License-Identifier: Apache-2.0

use crate::{base::*, dispatch_errors};
use qor_core::prelude::*;

use std::fmt::{Debug, Display};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

mod closure;
pub use closure::*;

mod get;
pub use get::*;

mod future;
pub use future::*;

//
// Action state
//

/// Mutable bookkeeping of an action, shared by every execution of it.
#[derive(Debug)]
struct ActionStateInner {
    /// Timepoint the last execution began
    started_at: Option<Instant>,

    /// Timepoint the last execution ended
    ended_at: Option<Instant>,

    /// Budget for a single execution
    allowed_time: Duration,

    /// The budget was set by the action itself and is not replaced by executor defaults
    pinned: bool,

    /// Failure captured by the last execution
    failure: Option<Error>,
}

/// The ActionState holds timing, interruption and failure of an action.
///
/// Every `Action` owns one state. The executors read and update it around each
/// execution; the action body may poll it to honor interruption.
#[derive(Debug)]
pub struct ActionState {
    interrupted: AtomicBool,

    /// Submitted to a queue or loop and not yet begun: the interruption of the
    /// submission carries over into the execution
    submitted: AtomicBool,

    inner: Mutex<ActionStateInner>,
}

impl Default for ActionState {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionState {
    /// The allowed time of an action unless configured otherwise
    pub const DEFAULT_ALLOWED_TIME: Duration = Duration::from_secs(30);

    /// Create a new state with the default allowed time
    pub const fn new() -> Self {
        Self {
            interrupted: AtomicBool::new(false),
            submitted: AtomicBool::new(false),
            inner: Mutex::new(ActionStateInner {
                started_at: None,
                ended_at: None,
                allowed_time: Self::DEFAULT_ALLOWED_TIME,
                pinned: false,
                failure: None,
            }),
        }
    }

    /// Create a new state with a pinned allowed time
    pub fn with_allowed_time(allowed_time: Duration) -> Self {
        let state = Self::new();
        state.pin_allowed_time(allowed_time);
        state
    }

    #[inline(always)]
    fn inner(&self) -> MutexGuard<'_, ActionStateInner> {
        // no code panics while holding this lock, a poisoned guard still has consistent data
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get the allowed time of a single execution
    pub fn allowed_time(&self) -> Duration {
        self.inner().allowed_time
    }

    /// Set the allowed time and protect it from executor defaults
    pub fn pin_allowed_time(&self, allowed_time: Duration) {
        let mut inner = self.inner();
        inner.allowed_time = allowed_time;
        inner.pinned = true;
    }

    /// Set the allowed time unless the action pinned its own.
    /// Returns the allowed time in effect.
    pub fn inject_allowed_time(&self, allowed_time: Duration) -> Duration {
        let mut inner = self.inner();
        if !inner.pinned {
            inner.allowed_time = allowed_time;
        }
        inner.allowed_time
    }

    /// Timepoint the last execution began
    pub fn started_at(&self) -> Option<Instant> {
        self.inner().started_at
    }

    /// Timepoint the last execution ended
    pub fn ended_at(&self) -> Option<Instant> {
        self.inner().ended_at
    }

    /// Time spent in the current or last execution
    pub fn elapsed(&self) -> Duration {
        let inner = self.inner();
        match (inner.started_at, inner.ended_at) {
            (Some(start), Some(end)) if end >= start => end - start,
            (Some(start), _) => start.elapsed(),
            _ => Duration::ZERO,
        }
    }

    /// Check if the running execution may continue.
    ///
    /// This is the cooperative cancellation point: long running bodies poll it and
    /// return early once it turns `false`.
    pub fn within_allowed_time(&self) -> bool {
        if self.is_interrupted() {
            return false;
        }
        let inner = self.inner();
        match inner.started_at {
            Some(start) => start.elapsed() < inner.allowed_time,
            None => true,
        }
    }

    /// Request the action to stop. Nothing is cancelled preemptively.
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::Release);
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::Acquire)
    }

    /// Get the failure captured by the last execution
    pub fn failure(&self) -> Option<Error> {
        self.inner().failure.clone()
    }

    pub fn failed(&self) -> bool {
        self.inner().failure.is_some()
    }

    /// Mark the action as handed to a thread that executes it later.
    ///
    /// Clears a stale interruption. An interruption raised from now on, e.g. by a waiter
    /// that timed out while the action was still queued, is seen by the execution.
    pub(crate) fn submit(&self) {
        self.interrupted.store(false, Ordering::Release);
        self.submitted.store(true, Ordering::Release);
    }

    /// Reset for a new execution and record its start
    fn begin(&self) {
        // a direct execution starts uninterrupted, a submitted one keeps its interruption
        if !self.submitted.swap(false, Ordering::AcqRel) {
            self.interrupted.store(false, Ordering::Release);
        }
        let mut inner = self.inner();
        inner.started_at = Some(Instant::now());
        inner.ended_at = None;
        inner.failure = None;
    }

    /// Record the end of an execution together with its failure
    fn finish(&self, failure: Option<Error>) {
        let mut inner = self.inner();
        inner.ended_at = Some(Instant::now());
        inner.failure = failure;
    }
}

//
// Actions
//

/// An Action is a self-contained unit of work that executors run on a specific thread.
///
/// Implementors provide the body in `run` and the state in `state`; `execute` wraps the
/// body with timing, panic capture and failure bookkeeping. Parameters of the work are
/// captured by the action value itself.
///
/// An action may be executed again after it completed, but the same instance must not be
/// submitted concurrently.
pub trait Action: Send + Sync {
    /// Get the state of the action
    fn state(&self) -> &ActionState;

    /// The body of the action
    fn run(&self) -> DispatchResult<()>;

    /// Human readable description used for logging.
    /// An empty description keeps the action out of the dispatch log.
    fn description(&self) -> String {
        String::new()
    }

    /// Execute the body on the current thread.
    ///
    /// Errors and panics of the body are captured on the action and returned as
    /// `ACTION_FAILED` with the original error as cause. The end time is recorded in
    /// every case.
    fn execute(&self) -> DispatchResult<()> {
        let state = self.state();
        state.begin();

        let outcome = {
            let _depth = ActionDepthGuard::enter();
            panic::catch_unwind(AssertUnwindSafe(|| self.run()))
        };

        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(err),
            Err(payload) => Some(Error::new(
                dispatch_errors::ACTION_PANICKED,
                format!("Action panicked: {}", panic_message(&*payload)),
            )),
        };

        state.finish(failure.clone());

        match failure {
            None => Ok(()),
            Some(cause) => Err(Error::new(
                dispatch_errors::ACTION_FAILED,
                format!("Action `{}` failed", label(self)),
            )
            .caused_by(cause)),
        }
    }

    /// Check if the last execution failed
    fn failed(&self) -> bool {
        self.state().failed()
    }

    /// Request the action to stop, see `ActionState::interrupt`
    fn interrupt(&self) {
        self.state().interrupt()
    }

    /// Check if the running execution may continue, see `ActionState::within_allowed_time`
    fn within_allowed_time(&self) -> bool {
        self.state().within_allowed_time()
    }
}

/// Description of an action for messages, never empty
pub(crate) fn label<A: Action + ?Sized>(action: &A) -> String {
    let description = action.description();
    if description.is_empty() {
        "<anonymous>".to_string()
    } else {
        description
    }
}

impl Display for dyn Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

impl Debug for dyn Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Action({})", label(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A hand written action, the way collaborators implement the trait
    struct CountDown {
        state: ActionState,
        from: u32,
    }

    impl Action for CountDown {
        fn state(&self) -> &ActionState {
            &self.state
        }

        fn run(&self) -> DispatchResult<()> {
            if self.from == 0 {
                return Err(Error::const_new(qor_core::core_errors::USER + 1, "nothing to count"));
            }
            std::thread::sleep(Duration::from_millis(5));
            Ok(())
        }

        fn description(&self) -> String {
            format!("count down from {}", self.from)
        }
    }

    #[test]
    fn test_execute_records_timing() {
        let action = CountDown {
            state: ActionState::new(),
            from: 3,
        };

        assert_eq!(action.state().started_at(), None);
        assert_eq!(action.execute(), Ok(()));
        assert_eq!(action.failed(), false);

        let start = action.state().started_at().unwrap();
        let end = action.state().ended_at().unwrap();
        assert_eq!(end >= start, true);
        assert_eq!(action.state().elapsed() >= Duration::from_millis(5), true);
    }

    #[test]
    fn test_execute_captures_error() {
        let action = CountDown {
            state: ActionState::new(),
            from: 0,
        };

        let err = action.execute().unwrap_err();
        assert_eq!(err.code(), dispatch_errors::ACTION_FAILED);
        assert_eq!(err.text(), "Action `count down from 0` failed");
        assert_eq!(err.root_cause().text(), "nothing to count");

        // captured on the action as well, end time recorded despite the failure
        assert_eq!(action.failed(), true);
        assert_eq!(action.state().failure().unwrap().text(), "nothing to count");
        assert_eq!(action.state().ended_at().is_some(), true);
    }

    #[test]
    fn test_execute_captures_panic() {
        let action = ClosureAction::quiet(|_| panic!("boom"));

        let err = action.execute().unwrap_err();
        assert_eq!(err.code(), dispatch_errors::ACTION_FAILED);
        assert_eq!(err.text(), "Action `<anonymous>` failed");
        assert_eq!(err.root_cause().code(), dispatch_errors::ACTION_PANICKED);
        assert_eq!(err.root_cause().text(), "Action panicked: boom");
        assert_eq!(action.state().ended_at().is_some(), true);
        assert_eq!(is_running_action(), false);
    }

    #[test]
    fn test_reexecution_resets_state() {
        let fail = std::sync::atomic::AtomicBool::new(true);
        let action = ClosureAction::new("flaky", move |_| {
            if fail.swap(false, Ordering::Relaxed) {
                Err(Error::const_new(qor_core::core_errors::USER, "first run fails"))
            } else {
                Ok(())
            }
        });

        assert_eq!(action.execute().is_err(), true);
        assert_eq!(action.failed(), true);

        action.interrupt();
        assert_eq!(action.state().is_interrupted(), true);

        // second run clears failure and interruption
        assert_eq!(action.execute(), Ok(()));
        assert_eq!(action.failed(), false);
        assert_eq!(action.state().is_interrupted(), false);
    }

    #[test]
    fn test_interrupt_before_begin_survives_submission() {
        let state = ActionState::new();
        state.interrupt();

        // Good: submission clears a stale interruption
        state.submit();
        assert_eq!(state.is_interrupted(), false);

        // Good: interrupted while queued, the execution sees it
        state.interrupt();
        state.begin();
        assert_eq!(state.is_interrupted(), true);
        assert_eq!(state.within_allowed_time(), false);

        // a later direct execution starts clean again
        state.begin();
        assert_eq!(state.is_interrupted(), false);
    }

    #[test]
    fn test_allowed_time() {
        let state = ActionState::new();
        assert_eq!(state.allowed_time(), ActionState::DEFAULT_ALLOWED_TIME);
        assert_eq!(state.inject_allowed_time(Duration::from_millis(10)), Duration::from_millis(10));

        // pinned budgets survive injection
        let state = ActionState::with_allowed_time(Duration::from_millis(50));
        assert_eq!(state.inject_allowed_time(Duration::from_secs(1)), Duration::from_millis(50));

        // nothing started yet: always within time
        assert_eq!(state.within_allowed_time(), true);
        state.begin();
        assert_eq!(state.within_allowed_time(), true);
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(state.within_allowed_time(), false);

        state.begin();
        state.interrupt();
        assert_eq!(state.within_allowed_time(), false);
    }

    #[test]
    fn test_display() {
        let action: Box<dyn Action> = Box::new(ClosureAction::new("press button", |_| Ok(())));
        assert_eq!(format!("{}", action), "press button");
        assert_eq!(format!("{:?}", action), "Action(press button)");

        let quiet: Box<dyn Action> = Box::new(ClosureAction::quiet(|_| Ok(())));
        assert_eq!(format!("{}", quiet), "");
        assert_eq!(format!("{:?}", quiet), "Action(<anonymous>)");
    }
}
