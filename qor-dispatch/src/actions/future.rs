// Copyright (c) 2025 Qorix GmbH
//
// This program and the accompanying materials are made available under the
// terms of the Apache License, Version 2.0 which is available at
// https://www.apache.org/licenses/LICENSE-2.0.
//
// SPDX-License-Identifier: Apache-2.0

use crate::actions::{label, Action, ActionState};
use crate::environment::Environment;
use crate::{base::*, dispatch_errors};
use qor_core::prelude::*;

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// Deferred computation of a `FutureAction`
type Computation<T> = Box<dyn FnOnce() -> DispatchResult<T> + Send + 'static>;

/// An action around a deferred computation with a blocking getter.
///
/// The action dispatches itself onto the owning thread when it is created. The computation
/// runs at most once; its outcome, value or failure, is kept for `get`.
pub struct FutureAction<T>
where
    T: Clone + Send + 'static,
{
    description: String,
    state: ActionState,

    /// The computation, taken by the first execution
    computation: Mutex<Option<Computation<T>>>,

    /// The outcome of the computation together with lock and signal
    outcome: (Mutex<Option<DispatchResult<T>>>, Condvar),
}

impl<T> FutureAction<T>
where
    T: Clone + Send + 'static,
{
    /// The poll period of a getter that waits on an interruptible computation
    const POLL_PERIOD: Duration = Duration::from_millis(100);

    fn new(description: String, computation: Computation<T>) -> Self {
        Self {
            description,
            state: ActionState::new(),
            computation: Mutex::new(Some(computation)),
            outcome: (Mutex::new(None), Condvar::new()),
        }
    }

    /// Create the action around a callable and dispatch it on the owning thread.
    ///
    /// # Example
    ///
    /// ```rust
    /// use qor_dispatch::prelude::*;
    ///
    /// let env = Environment::with_default_executor(EnvironmentConfig::default()).unwrap();
    /// let future = FutureAction::call(&env, "count items", || Ok(3usize)).unwrap();
    /// assert_eq!(future.get().unwrap(), 3);
    /// ```
    pub fn call(
        env: &Environment,
        description: impl Into<String>,
        callable: impl FnOnce() -> DispatchResult<T> + Send + 'static,
    ) -> DispatchResult<Arc<Self>> {
        let action = Arc::new(Self::new(description.into(), Box::new(callable)));
        env.executor().execute(env, true, action.clone())?;
        Ok(action)
    }

    /// Create the action around a side-effecting procedure that yields the given value on
    /// completion and dispatch it on the owning thread.
    pub fn procedure(
        env: &Environment,
        description: impl Into<String>,
        procedure: impl FnOnce() + Send + 'static,
        value: T,
    ) -> DispatchResult<Arc<Self>> {
        Self::call(env, description, move || {
            procedure();
            Ok(value)
        })
    }

    /// Check if the computation has an outcome
    pub fn is_done(&self) -> bool {
        self.outcome.0.lock().map(|outcome| outcome.is_some()).unwrap_or(false)
    }

    /// Wait for the outcome of the computation and return its value.
    ///
    /// - `FUTURE_INTERRUPTED` if the action was interrupted before the computation completed.
    /// - `FUTURE_FAILED` if the computation failed; the failure is attached as cause.
    pub fn get(&self) -> DispatchResult<T> {
        self.wait_outcome(None)
    }

    /// Like `get` but gives up with `FUTURE_TIMEOUT` after the given time.
    pub fn get_timeout(&self, timeout: Duration) -> DispatchResult<T> {
        self.wait_outcome(Some(Instant::now() + timeout))
    }

    fn wait_outcome(&self, deadline: Option<Instant>) -> DispatchResult<T> {
        let (outcome_lock, notifier) = &self.outcome;
        let mut outcome = outcome_lock.lock().map_err(lock_error)?;

        loop {
            match &*outcome {
                Some(Ok(value)) => return Ok(value.clone()),
                Some(Err(cause)) => {
                    return Err(Error::new(
                        dispatch_errors::FUTURE_FAILED,
                        format!("Future `{}` failed", label(self)),
                    )
                    .caused_by(cause.clone()))
                }
                None => {}
            }

            if self.state.is_interrupted() {
                return Err(Error::new(
                    dispatch_errors::FUTURE_INTERRUPTED,
                    format!("Future `{}` was interrupted", label(self)),
                ));
            }

            let mut period = Self::POLL_PERIOD;
            if let Some(deadline) = deadline {
                let now = Instant::now();
                if now >= deadline {
                    return Err(Error::new(
                        dispatch_errors::FUTURE_TIMEOUT,
                        format!("Future `{}` did not complete in time", label(self)),
                    ));
                }
                period = period.min(deadline - now);
            }

            let (guard, _) = notifier.wait_timeout(outcome, period).map_err(lock_error)?;
            outcome = guard;
        }
    }
}

impl<T> Action for FutureAction<T>
where
    T: Clone + Send + 'static,
{
    fn state(&self) -> &ActionState {
        &self.state
    }

    /// Runs the computation once. Its failure belongs to the future and is reported by `get`.
    fn run(&self) -> DispatchResult<()> {
        let computation = self.computation.lock().map_err(lock_error)?.take();

        if let Some(computation) = computation {
            let result = panic::catch_unwind(AssertUnwindSafe(computation)).unwrap_or_else(|payload| {
                Err(Error::new(
                    dispatch_errors::ACTION_PANICKED,
                    format!("Computation panicked: {}", panic_message(&*payload)),
                ))
            });

            let (outcome_lock, notifier) = &self.outcome;
            *outcome_lock.lock().map_err(lock_error)? = Some(result);
            notifier.notify_all();
        }
        Ok(())
    }

    fn description(&self) -> String {
        self.description.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::EnvironmentConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn environment() -> Environment {
        Environment::with_default_executor(EnvironmentConfig::default()).unwrap()
    }

    #[test]
    fn test_call() {
        let env = environment();
        let future = FutureAction::call(&env, "compute", || Ok(6 * 7)).unwrap();

        // dispatch blocked until the computation ran
        assert_eq!(future.is_done(), true);
        assert_eq!(future.get(), Ok(42));
        assert_eq!(future.get(), Ok(42));
        assert_eq!(future.get_timeout(Duration::from_millis(1)), Ok(42));
    }

    #[test]
    fn test_procedure_runs_once() {
        let env = environment();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        let future = FutureAction::procedure(
            &env,
            "",
            move || {
                calls_clone.fetch_add(1, Ordering::Relaxed);
            },
            "done",
        )
        .unwrap();
        assert_eq!(future.get(), Ok("done"));

        // executing again does not repeat the computation
        assert_eq!(future.execute(), Ok(()));
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_failed_computation() {
        let env = environment();
        let future: Arc<FutureAction<u32>> = FutureAction::call(&env, "broken", || {
            Err(Error::const_new(qor_core::core_errors::USER, "division by zero"))
        })
        .unwrap();

        let err = future.get().unwrap_err();
        assert_eq!(err.code(), dispatch_errors::FUTURE_FAILED);
        assert_eq!(err.root_cause().text(), "division by zero");

        let future: Arc<FutureAction<u32>> = FutureAction::call(&env, "panicking", || panic!("bad state")).unwrap();
        let err = future.get().unwrap_err();
        assert_eq!(err.cause().map(|e| e.code()), Some(dispatch_errors::ACTION_PANICKED));
    }

    #[test]
    fn test_pending_future() {
        // not dispatched: nothing ran yet
        let future = FutureAction::<u8>::new("pending".to_string(), Box::new(|| Ok::<u8, Error>(1)));
        assert_eq!(future.is_done(), false);

        let err = future.get_timeout(Duration::from_millis(20)).unwrap_err();
        assert_eq!(err.code(), dispatch_errors::FUTURE_TIMEOUT);

        future.interrupt();
        let err = future.get().unwrap_err();
        assert_eq!(err.code(), dispatch_errors::FUTURE_INTERRUPTED);
    }
}
