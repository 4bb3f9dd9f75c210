// Copyright (c) 2025 Qorix GmbH
//
// This program and the accompanying materials are made available under the
// terms of the Apache License, Version 2.0 which is available at
// https://www.apache.org/licenses/LICENSE-2.0.
//
// SPDX-License-Identifier: Apache-2.0
//

pub mod prelude;

use std::fs::File;
use std::path::PathBuf;
use tracing::level_filters::LevelFilter;
use tracing::{span, Level, Span};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format;
use tracing_subscriber::prelude::*;
use tracing_subscriber::Layer;
use tracing_subscriber::{fmt, EnvFilter};

/// Errors raised while installing the subscriber
#[derive(Debug)]
pub enum TracingInitError {
    /// The log file could not be created
    LogFile(std::io::Error),

    /// Another global subscriber is already installed
    AlreadyInstalled,
}

impl std::fmt::Display for TracingInitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LogFile(e) => write!(f, "cannot create log file: {}", e),
            Self::AlreadyInstalled => write!(f, "a global tracing subscriber is already installed"),
        }
    }
}

impl std::error::Error for TracingInitError {}

pub struct TracingLibrary {
    log_level: Level,
    enable_logging: bool,
    env_filter: bool,
    log_file: Option<PathBuf>,

    file_guard: Option<WorkerGuard>,
}

pub struct TracingLibraryBuilder {
    log_level: Level,
    enable_logging: bool,
    env_filter: bool,
    log_file: Option<PathBuf>,
}

impl Default for TracingLibraryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TracingLibraryBuilder {
    pub fn new() -> Self {
        Self {
            log_level: Level::INFO,
            enable_logging: false,
            env_filter: false,
            log_file: None,
        }
    }

    pub fn global_log_level(mut self, level: Level) -> Self {
        self.log_level = level;
        self
    }

    ///
    /// Enables logging to stdout
    ///
    pub fn enable_logging(mut self, enable: bool) -> Self {
        self.enable_logging = enable;
        self
    }

    ///
    /// Lets `RUST_LOG` override the global level
    ///
    pub fn with_env_filter(mut self, enable: bool) -> Self {
        self.env_filter = enable;
        self
    }

    ///
    /// Additionally writes all events to the given file through a non-blocking writer
    ///
    pub fn log_to_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self
    }

    pub fn build(self) -> TracingLibrary {
        TracingLibrary {
            log_level: self.log_level,
            enable_logging: self.enable_logging,
            env_filter: self.env_filter,
            log_file: self.log_file,
            file_guard: None,
        }
    }
}

type BoxedLayer = Box<dyn Layer<tracing_subscriber::Registry> + Send + Sync>;

impl TracingLibrary {
    /// Install the global subscriber.
    ///
    /// The library must be kept alive as long as file logging is wanted; dropping it flushes
    /// and closes the non-blocking file writer.
    pub fn init_log_trace(&mut self) -> Result<(), TracingInitError> {
        let mut layers: Vec<BoxedLayer> = Vec::new();

        if self.enable_logging {
            let stdout_layer = fmt::layer()
                .with_writer(std::io::stdout)
                .event_format(format::Format::default().with_thread_ids(true).with_thread_names(true))
                .with_filter(self.filter());
            layers.push(stdout_layer.boxed());
        }

        if let Some(path) = &self.log_file {
            let file = File::create(path).map_err(TracingInitError::LogFile)?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            self.file_guard = Some(guard);

            let file_layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .event_format(format::Format::default().with_thread_ids(true).with_thread_names(true))
                .with_filter(self.filter());
            layers.push(file_layer.boxed());
        }

        if layers.is_empty() {
            return Ok(());
        }

        tracing::subscriber::set_global_default(tracing_subscriber::Registry::default().with(layers))
            .map_err(|_| TracingInitError::AlreadyInstalled)
    }

    fn filter(&self) -> EnvFilter {
        let default = LevelFilter::from_level(self.log_level);
        if self.env_filter {
            EnvFilter::builder()
                .with_default_directive(default.into())
                .from_env_lossy()
        } else {
            EnvFilter::default().add_directive(default.into())
        }
    }

    /// Creates the root span of the process.
    /// The span name is fixed as `span!` needs it at compile time.
    pub fn create_span(&self) -> Span {
        span!(Level::TRACE, "Initial Span")
    }
}
