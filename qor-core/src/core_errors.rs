// Copyright (c) 2025 Qorix GmbH
//
// This program and the accompanying materials are made available under the
// terms of the Apache License, Version 2.0 which is available at
// https://www.apache.org/licenses/LICENSE-2.0.
//
// SPDX-License-Identifier: Apache-2.0

use super::ErrorCode;

#[allow(dead_code)]
pub const OK: ErrorCode = 0x00000000;

pub const CORE: ErrorCode = 0x10000000;
pub const DISPATCH: ErrorCode = 0x10300000;

#[allow(dead_code)] // User Applications are outside this lib
pub const USER: ErrorCode = 0x80000000;

/// Function is not implemented yet
pub const NOT_IMPLEMENTED: ErrorCode = CORE + 1;

/// A required lock could not be acquired.
pub const LOCK_ERROR: ErrorCode = CORE + 1100;

/// Error during parsing of a string or stream.
pub const PARSE_ERROR: ErrorCode = CORE + 2000;

/// A configuration value is missing or has the wrong type.
pub const INVALID_CONFIG: ErrorCode = CORE + 2100;
