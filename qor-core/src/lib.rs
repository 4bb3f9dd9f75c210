// Copyright (c) 2025 Qorix GmbH
//
// This program and the accompanying materials are made available under the
// terms of the Apache License, Version 2.0 which is available at
// https://www.apache.org/licenses/LICENSE-2.0.
//
// SPDX-License-Identifier: Apache-2.0

use std::fmt::Display;
use std::sync::Arc;

pub mod config;

/// The core preample publicly re-exports the most common symbols
pub mod prelude {
    pub use super::{CoreResult, Error, ErrorCode};
    pub use crate::config::Config;
}

/// Error code
/// The qor system error codes are structures error codes:
///
/// | Byte 7  | Byte 6 | Byte 5     | Byte 4   | Bytes 3..0   |
/// | ------- | ------ | ---------- | -------- | ------------ |
/// | Library | Module | Sub-module | Reserved | Error Number |
///
/// ### Library
///
/// | value | description |
/// | -- | -- |
/// | 0x00 xxxxxx xxxxxxxx | General error codes |
/// | 0x10 xxxxxx xxxxxxxx | Foundation libraries |
/// | 0x80 xxxxxx xxxxxxxx | User library |
///
/// ### Foundation library modules
///
/// | value | description |
/// | -- | -- |
/// | 0x10 00 xx xxxxxxxx | Core |
/// | 0x10 30 xx xxxxxxxx | Dispatch |
///
pub type ErrorCode = u64;

pub mod core_errors;

/// Helper for storing static and dynamic error texts
#[derive(Debug, Clone, PartialEq)]
enum ErrorText {
    None,
    Static(&'static str),
    Dynamic(String),
}

impl Display for ErrorText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::None => "n/a",
                Self::Static(str) => str,
                Self::Dynamic(str) => str.as_str(),
            }
        )
    }
}

/// Base class for errors
///
/// An error carries its code, a text and optionally the error that caused it.
/// Errors are cheap to clone: the cause is shared, so a failure captured on one
/// thread can be handed to any number of waiting threads.
#[derive(Debug, Clone, PartialEq)]
pub struct Error {
    code: ErrorCode,
    text: ErrorText,
    source: Option<Arc<Error>>,
}

impl Error {
    #[allow(dead_code)] // provision for new function results
    pub const FUNCTION_NOT_IMPLEMENTED: Self =
        Self::const_new(core_errors::NOT_IMPLEMENTED, "Function not implemented.");

    /// Create a new error code from a dynamic string
    pub fn new(code: ErrorCode, text: String) -> Self {
        Error {
            code,
            text: ErrorText::Dynamic(text),
            source: None,
        }
    }

    /// Create a new error code from a `&'static str`
    pub const fn const_new(code: ErrorCode, text: &'static str) -> Self {
        Error {
            code,
            text: ErrorText::Static(text),
            source: None,
        }
    }

    /// Create a new error code without an error text
    pub const fn from_code(code: ErrorCode) -> Self {
        Error {
            code,
            text: ErrorText::None,
            source: None,
        }
    }

    /// Attach the error that caused this one
    pub fn caused_by(mut self, cause: impl Into<Arc<Error>>) -> Self {
        self.source = Some(cause.into());
        self
    }

    /// Get the code of an error
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Get the error text
    pub fn text(&self) -> &str {
        match &self.text {
            ErrorText::None => "",
            ErrorText::Static(s) => s,
            ErrorText::Dynamic(s) => s.as_str(),
        }
    }

    /// Get the direct cause of the error, if any
    pub fn cause(&self) -> Option<&Error> {
        self.source.as_deref()
    }

    /// Walk the cause chain down to the innermost error
    pub fn root_cause(&self) -> &Error {
        let mut current = self;
        while let Some(next) = current.cause() {
            current = next;
        }
        current
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}: {}", self.code(), self.text)?;
        if let Some(cause) = &self.source {
            write!(f, " (caused by {})", cause)?;
        }
        Ok(())
    }
}

impl From<ErrorCode> for Error {
    fn from(code: ErrorCode) -> Self {
        Self::from_code(code)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

pub type CoreResult<T> = std::result::Result<T, Error>;
