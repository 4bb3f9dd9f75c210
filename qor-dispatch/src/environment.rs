// Copyright (c) 2025 Qorix GmbH
//
// This program and the accompanying materials are made available under the
// terms of the Apache License, Version 2.0 which is available at
// https://www.apache.org/licenses/LICENSE-2.0.
//
// SPDX-License-Identifier: Apache-2.0

use crate::base::*;
use crate::executor::{ActionExecutor, DefaultExecutor};
use crate::queue::ActionQueueBuilder;
use crate::sink::{LogSink, TracingSink};
use qor_core::prelude::*;

use std::sync::Arc;
use std::time::Duration;

/// Settings of a dispatch environment
#[derive(Debug, Clone, PartialEq)]
pub struct EnvironmentConfig {
    action_timeout: Duration,
    quiet_timeout: Duration,
    queue_name: String,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            action_timeout: Self::DEFAULT_ACTION_TIMEOUT,
            quiet_timeout: Self::DEFAULT_QUIET_TIMEOUT,
            queue_name: ActionQueueBuilder::DEFAULT_NAME.to_string(),
        }
    }
}

impl EnvironmentConfig {
    pub const DEFAULT_ACTION_TIMEOUT: Duration = Duration::from_secs(30);
    pub const DEFAULT_QUIET_TIMEOUT: Duration = Duration::from_secs(30);

    /// Key of the default allowed time of actions, in milliseconds
    pub const KEY_ACTION_TIMEOUT: &'static str = "action_timeout_ms";

    /// Key of the timeout of `Environment::wait_quiet`, in milliseconds
    pub const KEY_QUIET_TIMEOUT: &'static str = "quiet_timeout_ms";

    /// Key of the name of the internal queue
    pub const KEY_QUEUE_NAME: &'static str = "queue_name";

    /// Read the settings from a configuration. Missing keys keep their defaults.
    pub fn from_config(config: &Config) -> DispatchResult<Self> {
        let mut result = Self::default();

        if let Some(ms) = config.get_u64(Self::KEY_ACTION_TIMEOUT)? {
            result.action_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = config.get_u64(Self::KEY_QUIET_TIMEOUT)? {
            result.quiet_timeout = Duration::from_millis(ms);
        }
        if let Some(name) = config.get_str(Self::KEY_QUEUE_NAME)? {
            result.queue_name = name.to_string();
        }

        Ok(result)
    }

    /// Parse the settings from JSON text
    pub fn from_json(text: &str) -> DispatchResult<Self> {
        Self::from_config(&Config::parse(text)?)
    }

    pub fn with_action_timeout(mut self, timeout: Duration) -> Self {
        self.action_timeout = timeout;
        self
    }

    pub fn with_quiet_timeout(mut self, timeout: Duration) -> Self {
        self.quiet_timeout = timeout;
        self
    }

    pub fn with_queue_name(mut self, name: impl Into<String>) -> Self {
        self.queue_name = name.into();
        self
    }

    /// The allowed time injected into actions that did not pin their own
    pub fn action_timeout(&self) -> Duration {
        self.action_timeout
    }

    pub fn quiet_timeout(&self) -> Duration {
        self.quiet_timeout
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }
}

/// The Environment hands the executor, the dispatch log and the settings to the code
/// that issues actions.
#[derive(Clone)]
pub struct Environment {
    config: EnvironmentConfig,
    executor: Arc<dyn ActionExecutor>,
    on_thread_sink: Arc<dyn LogSink>,
    off_thread_sink: Arc<dyn LogSink>,
}

impl Environment {
    /// Start building an environment around the given executor
    pub fn builder(executor: Arc<dyn ActionExecutor>) -> EnvironmentBuilder {
        EnvironmentBuilder::new(executor)
    }

    /// Create an environment with a `DefaultExecutor` whose queue is named per configuration.
    pub fn with_default_executor(config: EnvironmentConfig) -> DispatchResult<Self> {
        let queue = ActionQueueBuilder::new()
            .with_name(config.queue_name())
            .build()?;
        let executor = Arc::new(DefaultExecutor::with_queue(queue));

        Ok(Self::builder(executor).with_config(config).build())
    }

    pub fn executor(&self) -> &Arc<dyn ActionExecutor> {
        &self.executor
    }

    pub fn config(&self) -> &EnvironmentConfig {
        &self.config
    }

    /// Sink for descriptions of actions issued on the owning thread
    pub fn on_thread_sink(&self) -> &dyn LogSink {
        &*self.on_thread_sink
    }

    /// Sink for descriptions of actions issued off the owning thread
    pub fn off_thread_sink(&self) -> &dyn LogSink {
        &*self.off_thread_sink
    }

    /// Wait until the executor is quiet, at most for the configured quiet timeout.
    pub fn wait_quiet(&self) -> DispatchResult<()> {
        self.executor.wait_quiet(self.config.quiet_timeout())
    }
}

/// Builder of an `Environment`. Sinks default to `TracingSink` channels.
pub struct EnvironmentBuilder {
    config: EnvironmentConfig,
    executor: Arc<dyn ActionExecutor>,
    on_thread_sink: Arc<dyn LogSink>,
    off_thread_sink: Arc<dyn LogSink>,
}

impl EnvironmentBuilder {
    pub fn new(executor: Arc<dyn ActionExecutor>) -> Self {
        Self {
            config: EnvironmentConfig::default(),
            executor,
            on_thread_sink: Arc::new(TracingSink::on_thread()),
            off_thread_sink: Arc::new(TracingSink::off_thread()),
        }
    }

    pub fn with_config(mut self, config: EnvironmentConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_on_thread_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.on_thread_sink = sink;
        self
    }

    pub fn with_off_thread_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.off_thread_sink = sink;
        self
    }

    pub fn build(self) -> Environment {
        Environment {
            config: self.config,
            executor: self.executor,
            on_thread_sink: self.on_thread_sink,
            off_thread_sink: self.off_thread_sink,
        }
    }
}
