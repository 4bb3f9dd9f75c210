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

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Fetch body of a `GetAction`
type GetBody<T> = Box<dyn Fn(&ActionState) -> DispatchResult<T> + Send + Sync + 'static>;

/// An action that fetches a single value.
///
/// The result slot is filled and the action marked finished when the body completes
/// successfully. The value is read after the dispatch returned.
pub struct GetAction<T>
where
    T: Send + 'static,
{
    description: String,
    state: ActionState,
    body: GetBody<T>,
    result: Mutex<Option<T>>,
    finished: AtomicBool,
}

impl<T> GetAction<T>
where
    T: Send + 'static,
{
    /// Create a new fetch action that is logged with the given description
    pub fn new(
        description: impl Into<String>,
        body: impl Fn(&ActionState) -> DispatchResult<T> + Send + Sync + 'static,
    ) -> Self {
        Self {
            description: description.into(),
            state: ActionState::new(),
            body: Box::new(body),
            result: Mutex::new(None),
            finished: AtomicBool::new(false),
        }
    }

    /// Create a new fetch action without description
    pub fn quiet(body: impl Fn(&ActionState) -> DispatchResult<T> + Send + Sync + 'static) -> Self {
        Self::new(String::new(), body)
    }

    /// Check if the body completed and stored its value
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Take the stored value out of the result slot
    pub fn take_result(&self) -> DispatchResult<Option<T>> {
        let mut result = self.result.lock().map_err(lock_error)?;
        Ok(result.take())
    }

    /// Run the fetch on the owning thread of the environment's executor and return the value.
    ///
    /// # Example
    ///
    /// ```rust
    /// use qor_dispatch::prelude::*;
    ///
    /// let env = Environment::with_default_executor(EnvironmentConfig::default()).unwrap();
    ///
    /// let title = GetAction::new("read title", |_| Ok(String::from("Main Window")))
    ///     .dispatch(&env)
    ///     .unwrap();
    /// assert_eq!(title, "Main Window");
    /// ```
    pub fn dispatch(self, env: &Environment) -> DispatchResult<T> {
        let action = Arc::new(self);
        env.executor().execute(env, true, action.clone())?;

        action.take_result()?.ok_or_else(|| {
            Error::new(
                dispatch_errors::ACTION_NO_RESULT,
                format!("Action `{}` completed without a result", label(&*action)),
            )
        })
    }
}

impl<T> Action for GetAction<T>
where
    T: Send + 'static,
{
    fn state(&self) -> &ActionState {
        &self.state
    }

    fn run(&self) -> DispatchResult<()> {
        self.finished.store(false, Ordering::Release);
        let value = (self.body)(&self.state)?;

        *self.result.lock().map_err(lock_error)? = Some(value);
        self.finished.store(true, Ordering::Release);
        Ok(())
    }

    fn description(&self) -> String {
        self.description.clone()
    }
}
