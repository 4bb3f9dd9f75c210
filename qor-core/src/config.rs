// Copyright (c) 2025 Qorix GmbH
//
// This program and the accompanying materials are made available under the
// terms of the Apache License, Version 2.0 which is available at
// https://www.apache.org/licenses/LICENSE-2.0.
//
// SPDX-License-Identifier: Apache-2.0
use crate::{core_errors, CoreResult, Error};

use std::collections::HashMap;

pub use tinyjson::JsonValue;

/// Configuration structure
///
/// A thin typed view on a JSON document. Values are addressed by dotted paths
/// (`"executor.timeout_ms"`). Missing keys read as `None`, keys of the wrong
/// type are an `INVALID_CONFIG` error.
#[derive(Debug, Clone)]
pub struct Config {
    value: JsonValue,
}

impl Default for Config {
    fn default() -> Self {
        Config::new()
    }
}

impl Config {
    pub fn new() -> Config {
        Config {
            value: JsonValue::Null,
        }
    }

    /// Parse a configuration from JSON text
    pub fn parse(text: &str) -> CoreResult<Config> {
        text.parse::<JsonValue>()
            .map(Config::from)
            .map_err(|e| Error::new(core_errors::PARSE_ERROR, format!("Invalid configuration: {}", e)))
    }

    pub fn get(&self) -> &JsonValue {
        &self.value
    }

    /// Look up the value at the given dotted path
    pub fn lookup(&self, path: &str) -> Option<&JsonValue> {
        let mut current = &self.value;
        for key in path.split('.') {
            current = current.get::<HashMap<String, JsonValue>>()?.get(key)?;
        }
        Some(current)
    }

    /// Read an unsigned integer. Fractional or negative numbers are rejected.
    pub fn get_u64(&self, path: &str) -> CoreResult<Option<u64>> {
        match self.lookup(path) {
            None | Some(JsonValue::Null) => Ok(None),
            Some(JsonValue::Number(n)) if *n >= 0.0 && n.fract() == 0.0 && *n <= u64::MAX as f64 => {
                Ok(Some(*n as u64))
            }
            Some(_) => Err(Self::invalid(path, "an unsigned integer")),
        }
    }

    pub fn get_str(&self, path: &str) -> CoreResult<Option<&str>> {
        match self.lookup(path) {
            None | Some(JsonValue::Null) => Ok(None),
            Some(JsonValue::String(s)) => Ok(Some(s.as_str())),
            Some(_) => Err(Self::invalid(path, "a string")),
        }
    }

    pub fn get_bool(&self, path: &str) -> CoreResult<Option<bool>> {
        match self.lookup(path) {
            None | Some(JsonValue::Null) => Ok(None),
            Some(JsonValue::Boolean(b)) => Ok(Some(*b)),
            Some(_) => Err(Self::invalid(path, "a boolean")),
        }
    }

    fn invalid(path: &str, expected: &str) -> Error {
        Error::new(
            core_errors::INVALID_CONFIG,
            format!("Configuration key `{}` must be {}", path, expected),
        )
    }
}

impl From<JsonValue> for Config {
    fn from(value: JsonValue) -> Self {
        Config { value }
    }
}
