// Copyright (c) 2026 PrismQ Contributors
// Licensed and distributed under either of
//   * MIT license (license terms in the root directory or at http://opensource.org/licenses/MIT).
//   * Apache v2 license (license terms in the root directory or at http://www.apache.org/licenses/LICENSE-2.0).
// at your option. This file may not be copied, modified, or distributed except according to those terms.

use thiserror::Error;

/// Errors produced while registering handlers or resolving retry policies.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("task type already registered: {0}")]
    DuplicateHandler(String),

    #[error("no handler registered for task type: {0}")]
    UnregisteredType(String),

    #[error("duplicate task type in handler manifest: {0}")]
    DuplicateManifestEntry(String),

    #[error("unsupported handler manifest extension: {0}")]
    UnsupportedManifestFormat(String),

    #[error("failed to read handler manifest: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse handler manifest as json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to parse handler manifest as yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("failed to parse handler manifest as toml: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid capability pattern: {0}")]
    InvalidPattern(String),

    #[error("handler manifest declares type {0} with no matching compiled-in handler")]
    ManifestHandlerMismatch(String),
}
