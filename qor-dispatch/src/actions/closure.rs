// Copyright (c) 2025 Qorix GmbH
//
// This program and the accompanying materials are made available under the
// terms of the Apache License, Version 2.0 which is available at
// https://www.apache.org/licenses/LICENSE-2.0.
//
// SPDX-License-Identifier: Apache-2.0

use crate::actions::{Action, ActionState};
use crate::base::*;

use std::sync::Arc;
use std::time::Duration;

/// An action built from a closure.
///
/// The closure receives the action state so it can poll `within_allowed_time()`.
///
/// ```rust
/// use qor_dispatch::prelude::*;
///
/// let action = ClosureAction::new("say hello", |_state| {
///     println!("Hello World!");
///     Ok(())
/// });
/// assert_eq!(action.execute(), Ok(()));
/// ```
pub struct ClosureAction<F>
where
    F: Fn(&ActionState) -> DispatchResult<()> + Send + Sync,
{
    description: String,
    state: ActionState,
    body: F,
}

impl<F> ClosureAction<F>
where
    F: Fn(&ActionState) -> DispatchResult<()> + Send + Sync,
{
    /// Create a new action that is logged with the given description
    pub fn new(description: impl Into<String>, body: F) -> Self {
        Self {
            description: description.into(),
            state: ActionState::new(),
            body,
        }
    }

    /// Create a new action without description. It never shows up in the dispatch log.
    pub fn quiet(body: F) -> Self {
        Self::new(String::new(), body)
    }

    /// Pin the allowed time of the action
    pub fn with_allowed_time(self, allowed_time: Duration) -> Self {
        self.state.pin_allowed_time(allowed_time);
        self
    }

    /// Wrap the action for submission to an executor
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

impl<F> Action for ClosureAction<F>
where
    F: Fn(&ActionState) -> DispatchResult<()> + Send + Sync,
{
    fn state(&self) -> &ActionState {
        &self.state
    }

    fn run(&self) -> DispatchResult<()> {
        (self.body)(&self.state)
    }

    fn description(&self) -> String {
        self.description.clone()
    }
}
