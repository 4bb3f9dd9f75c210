// Copyright (c) 2025 Qorix GmbH
//
// This program and the accompanying materials are made available under the
// terms of the Apache License, Version 2.0 which is available at
// https://www.apache.org/licenses/LICENSE-2.0.
//
// SPDX-License-Identifier: Apache-2.0
use qor_core::core_errors::DISPATCH;
use qor_core::ErrorCode;

/// The body of an action returned an error
pub const ACTION_FAILED: ErrorCode = DISPATCH + 1;

/// The body of an action panicked
pub const ACTION_PANICKED: ErrorCode = DISPATCH + 2;

/// A blocking wait exceeded the allowed time of the action
pub const ACTION_TIMEOUT: ErrorCode = DISPATCH + 3;

/// The action completed but did not reveal a result
pub const ACTION_NO_RESULT: ErrorCode = DISPATCH + 4;

/// A blocking wait was requested from the thread that would have to serve it
pub const REENTRANT_WAIT: ErrorCode = DISPATCH + 100;

/// The action queue is stopped and does not accept or run actions
pub const QUEUE_STOPPED: ErrorCode = DISPATCH + 101;

/// The event loop is stopped and does not accept or run actions
pub const LOOP_STOPPED: ErrorCode = DISPATCH + 102;

/// Dispatch thread failed to spawn
pub const THREAD_SPAWN_ERROR: ErrorCode = DISPATCH + 200;

/// A dispatch thread faulted on joining operation
pub const THREAD_JOIN_ERROR: ErrorCode = DISPATCH + 201;

/// The executor did not become quiet in time
pub const WAIT_QUIET_TIMEOUT: ErrorCode = DISPATCH + 300;

/// The future was interrupted before it produced a value
pub const FUTURE_INTERRUPTED: ErrorCode = DISPATCH + 400;

/// The deferred computation of a future failed
pub const FUTURE_FAILED: ErrorCode = DISPATCH + 401;

/// The future did not complete within the requested time
pub const FUTURE_TIMEOUT: ErrorCode = DISPATCH + 402;
