// Copyright (c) 2025 Qorix GmbH
//
// This program and the accompanying materials are made available under the
// terms of the Apache License, Version 2.0 which is available at
// https://www.apache.org/licenses/LICENSE-2.0.
//
// SPDX-License-Identifier: Apache-2.0

use qor_core::prelude::*;

use std::any::Any;
use std::cell::Cell;

/// Dispatch module result type
pub type DispatchResult<T> = std::result::Result<T, Error>;

/// Map a poisoned lock into the core lock error
#[inline(always)]
pub(crate) fn lock_error<G>(_: std::sync::PoisonError<G>) -> Error {
    Error::from_code(qor_core::core_errors::LOCK_ERROR)
}

/// Extract the message of a caught panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

thread_local! {
    /// Number of action bodies currently running on this thread (nested dispatch counts twice)
    static ACTION_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Check if the current thread is inside the body of an action.
pub fn is_running_action() -> bool {
    ACTION_DEPTH.with(|depth| depth.get() > 0)
}

/// Marks the current thread as running an action body until dropped
pub(crate) struct ActionDepthGuard;

impl ActionDepthGuard {
    pub(crate) fn enter() -> Self {
        ACTION_DEPTH.with(|depth| depth.set(depth.get() + 1));
        ActionDepthGuard
    }
}

impl Drop for ActionDepthGuard {
    fn drop(&mut self) {
        ACTION_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}
