/*
 *  Copyright 2025-2026 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Error types for the folio queue core.
//!
//! Errors are grouped by the layer that produces them:
//! - [`DatabaseError`]: pool construction, backend detection and migrations
//! - [`ValidationError`]: data access failures inside the DAL
//! - [`SubmissionError`]: creation invariants rejected before anything is written
//! - [`ResolutionError`] / [`RenderError`] / [`GenerationError`]: per-job failures,
//!   always converted into a `FAILED` request row by the executor
//! - [`ConfigError`] and [`RunnerError`]: process wiring

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while building or migrating a [`crate::Database`].
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error(
        "Unable to detect database backend from URL '{0}'. \
         Expected postgres://, postgresql://, sqlite://, or a file path."
    )]
    UnsupportedUrl(String),

    #[error("Invalid PostgreSQL URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Failed to build {backend} connection pool: {message}")]
    PoolBuild {
        backend: &'static str,
        message: String,
    },

    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Requested a {requested} connection from a {actual} database")]
    BackendMismatch {
        requested: &'static str,
        actual: &'static str,
    },

    #[error("Migration failed: {0}")]
    Migration(String),
}

/// Errors raised by the data access layer.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Connection pool error: {0}")]
    ConnectionPool(String),

    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("Corrupt {column} value in database: {message}")]
    CorruptRow {
        column: &'static str,
        message: String,
    },

    #[error("Invalid JSON payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl From<DatabaseError> for ValidationError {
    fn from(err: DatabaseError) -> Self {
        ValidationError::ConnectionPool(err.to_string())
    }
}

impl From<uuid::Error> for ValidationError {
    fn from(err: uuid::Error) -> Self {
        ValidationError::CorruptRow {
            column: "uuid",
            message: err.to_string(),
        }
    }
}

impl From<chrono::ParseError> for ValidationError {
    fn from(err: chrono::ParseError) -> Self {
        ValidationError::CorruptRow {
            column: "timestamp",
            message: err.to_string(),
        }
    }
}

/// Creation invariants checked before a request or batch is persisted.
#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("Request {index}: exactly one of version_id or environment_id must be set")]
    AmbiguousTarget { index: usize },

    #[error("A batch must contain at least one request")]
    EmptyBatch,

    #[error("Duplicate correlation id '{correlation_id}' within batch")]
    DuplicateCorrelationId { correlation_id: String },

    #[error("Request {index} targets tenant '{actual}' but the batch belongs to '{expected}'")]
    TenantMismatch {
        index: usize,
        expected: String,
        actual: String,
    },

    #[error(transparent)]
    Store(#[from] ValidationError),
}

/// Failures resolving the template version a request targets.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("Tenant not found: {0}")]
    TenantNotFound(String),

    #[error("Template '{template_id}' not found for tenant '{tenant_id}'")]
    TemplateNotFound {
        tenant_id: String,
        template_id: String,
    },

    #[error("Variant '{variant_id}' not found for template '{template_id}'")]
    VariantNotFound {
        template_id: String,
        variant_id: String,
    },

    #[error("Version '{0}' not found")]
    VersionNotFound(String),

    #[error("Environment '{0}' not found")]
    EnvironmentNotFound(String),

    #[error("Environment '{environment_id}' has no active version of template '{template_id}'")]
    NoActiveVersion {
        environment_id: String,
        template_id: String,
    },

    #[error("Request has no usable version or environment target")]
    InvalidTarget,

    #[error("Resolution failed: {0}")]
    Other(String),
}

/// Failure reported by the rendering collaborator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Rendering failed: {0}")]
pub struct RenderError(pub String);

/// Everything that can fail while executing one generation request.
///
/// None of these abort the poller; the executor records them on the request row.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("Document size {size} bytes exceeds maximum of {max} bytes")]
    DocumentTooLarge { size: usize, max: usize },

    #[error("Invalid request payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),

    #[error("Worker panicked: {0}")]
    Panicked(String),

    #[error(transparent)]
    Store(#[from] ValidationError),
}

/// Errors loading or validating queue configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse TOML configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Errors starting or stopping a [`crate::GenerationRunner`].
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Database URL is required")]
    MissingDatabaseUrl,

    #[error("Missing collaborator: {0}")]
    MissingCollaborator(&'static str),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Background service failed: {0}")]
    Background(String),
}

/// Maximum number of characters persisted in a request's `error_message`.
pub const MAX_ERROR_MESSAGE_LENGTH: usize = 1000;

/// Truncates an error message to [`MAX_ERROR_MESSAGE_LENGTH`] characters,
/// respecting char boundaries.
pub fn truncate_error_message(message: &str) -> String {
    match message.char_indices().nth(MAX_ERROR_MESSAGE_LENGTH) {
        Some((byte_index, _)) => message[..byte_index].to_string(),
        None => message.to_string(),
    }
}
