// Copyright (c) 2025 Qorix GmbH
//
// This program and the accompanying materials are made available under the
// terms of the Apache License, Version 2.0 which is available at
// https://www.apache.org/licenses/LICENSE-2.0.
//
// SPDX-License-Identifier: Apache-2.0
//

pub use crate::{TracingInitError, TracingLibrary, TracingLibraryBuilder};
pub use tracing::debug;
pub use tracing::error;
pub use tracing::info;
pub use tracing::span;
pub use tracing::trace;
pub use tracing::warn;
pub use tracing::Level;
