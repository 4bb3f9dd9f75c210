// Copyright (c) 2025 Qorix GmbH
//
// This program and the accompanying materials are made available under the
// terms of the Apache License, Version 2.0 which is available at
// https://www.apache.org/licenses/LICENSE-2.0.
//
// SPDX-License-Identifier: Apache-2.0

use logging_tracing::prelude::*;

use std::sync::{Mutex, PoisonError};

/// A destination for dispatch log lines
pub trait LogSink: Send + Sync {
    /// Write a single line
    fn log(&self, line: &str);
}

/// Forwards log lines to `tracing` as events of the given channel
#[derive(Debug, Clone, Copy)]
pub struct TracingSink {
    channel: &'static str,
    level: Level,
}

impl TracingSink {
    /// Channel of actions logged while on the owning thread
    pub const ON_THREAD: &'static str = "on_thread";

    /// Channel of actions logged while off the owning thread
    pub const OFF_THREAD: &'static str = "off_thread";

    /// Channel of failures in the action queue
    pub const ERRORS: &'static str = "errors";

    pub const fn new(channel: &'static str, level: Level) -> Self {
        Self { channel, level }
    }

    pub const fn on_thread() -> Self {
        Self::new(Self::ON_THREAD, Level::INFO)
    }

    pub const fn off_thread() -> Self {
        Self::new(Self::OFF_THREAD, Level::INFO)
    }

    pub const fn errors() -> Self {
        Self::new(Self::ERRORS, Level::ERROR)
    }

    pub fn channel(&self) -> &'static str {
        self.channel
    }
}

impl LogSink for TracingSink {
    fn log(&self, line: &str) {
        // the level of a tracing event must be known at compile time
        if self.level == Level::ERROR {
            error!(channel = self.channel, "{}", line);
        } else if self.level == Level::WARN {
            warn!(channel = self.channel, "{}", line);
        } else if self.level == Level::INFO {
            info!(channel = self.channel, "{}", line);
        } else if self.level == Level::DEBUG {
            debug!(channel = self.channel, "{}", line);
        } else {
            trace!(channel = self.channel, "{}", line);
        }
    }
}

/// Keeps log lines in memory, e.g. to inspect them in tests
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the lines logged so far
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Check if any line contains the given text
    pub fn contains(&self, text: &str) -> bool {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|line| line.contains(text))
    }

    pub fn clear(&self) {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

impl LogSink for MemorySink {
    fn log(&self, line: &str) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line.to_string());
    }
}
