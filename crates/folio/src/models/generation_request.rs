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

//! Generation Request Model
//!
//! A generation request is the unit of work claimed and executed by the queue.
//! These are API-level types; backend-specific row structs live in the DAL.

use crate::database::universal_types::{UniversalTimestamp, UniversalUuid};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a generation request.
///
/// Valid transitions:
/// - `Pending -> InProgress` (claim)
/// - `InProgress -> Completed | Failed` (executor)
/// - `Pending | InProgress -> Cancelled` (external request)
/// - `InProgress -> Pending` (stale recovery)
///
/// Terminal states are sticky.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl RequestStatus {
    pub const ALL: [RequestStatus; 5] = [
        RequestStatus::Pending,
        RequestStatus::InProgress,
        RequestStatus::Completed,
        RequestStatus::Failed,
        RequestStatus::Cancelled,
    ];

    /// Returns the value stored in the `status` column.
    pub const fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "PENDING",
            RequestStatus::InProgress => "IN_PROGRESS",
            RequestStatus::Completed => "COMPLETED",
            RequestStatus::Failed => "FAILED",
            RequestStatus::Cancelled => "CANCELLED",
        }
    }

    /// Parses a `status` column value.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(RequestStatus::Pending),
            "IN_PROGRESS" => Some(RequestStatus::InProgress),
            "COMPLETED" => Some(RequestStatus::Completed),
            "FAILED" => Some(RequestStatus::Failed),
            "CANCELLED" => Some(RequestStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestStatus::Completed | RequestStatus::Failed | RequestStatus::Cancelled
        )
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which template version a request renders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TemplateTarget {
    /// An explicit, pinned version.
    Version(String),
    /// Whatever version is active in the environment when the job executes.
    Environment(String),
}

impl TemplateTarget {
    /// Builds a target from the two nullable columns. Exactly one must be set.
    pub fn from_columns(
        version_id: Option<String>,
        environment_id: Option<String>,
    ) -> Option<Self> {
        match (version_id, environment_id) {
            (Some(version), None) => Some(TemplateTarget::Version(version)),
            (None, Some(environment)) => Some(TemplateTarget::Environment(environment)),
            _ => None,
        }
    }

    /// Splits the target back into `(version_id, environment_id)` columns.
    pub fn into_columns(self) -> (Option<String>, Option<String>) {
        match self {
            TemplateTarget::Version(version) => (Some(version), None),
            TemplateTarget::Environment(environment) => (None, Some(environment)),
        }
    }
}

/// A persisted generation request (domain type).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub id: UniversalUuid,
    /// Batch this request belongs to, if submitted as part of one
    pub batch_id: Option<UniversalUuid>,
    pub tenant_id: String,
    pub template_id: String,
    pub variant_id: String,
    pub target: TemplateTarget,
    /// Structured input handed to the renderer
    pub data: serde_json::Value,
    pub filename: Option<String>,
    /// Client-supplied identifier for cross-system tracing
    pub correlation_id: Option<String>,
    /// Set once the request completes
    pub document_id: Option<UniversalUuid>,
    pub status: RequestStatus,
    /// Instance currently holding the claim
    pub claimed_by: Option<String>,
    pub claimed_at: Option<UniversalTimestamp>,
    pub error_message: Option<String>,
    pub created_at: UniversalTimestamp,
    pub started_at: Option<UniversalTimestamp>,
    pub completed_at: Option<UniversalTimestamp>,
    /// Retention horizon; terminal rows past this are purged
    pub expires_at: Option<UniversalTimestamp>,
}

impl GenerationRequest {
    /// Filename for the rendered document, generated when the client gave none.
    pub fn output_filename(&self) -> String {
        match &self.filename {
            Some(name) if !name.trim().is_empty() => name.clone(),
            _ => format!("{}-{}.pdf", self.template_id, self.id),
        }
    }
}

/// Input for creating a generation request (domain type).
///
/// `version_id` and `environment_id` are kept as raw optional fields so that
/// callers can be told precisely which creation rule they broke.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewGenerationRequest {
    pub tenant_id: String,
    pub template_id: String,
    pub variant_id: String,
    pub version_id: Option<String>,
    pub environment_id: Option<String>,
    pub data: serde_json::Value,
    pub filename: Option<String>,
    pub correlation_id: Option<String>,
}

impl NewGenerationRequest {
    /// Request pinned to an explicit template version.
    pub fn for_version(
        tenant_id: impl Into<String>,
        template_id: impl Into<String>,
        variant_id: impl Into<String>,
        version_id: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            template_id: template_id.into(),
            variant_id: variant_id.into(),
            version_id: Some(version_id.into()),
            environment_id: None,
            data,
            filename: None,
            correlation_id: None,
        }
    }

    /// Request resolved through an environment's active version.
    pub fn for_environment(
        tenant_id: impl Into<String>,
        template_id: impl Into<String>,
        variant_id: impl Into<String>,
        environment_id: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            template_id: template_id.into(),
            variant_id: variant_id.into(),
            version_id: None,
            environment_id: Some(environment_id.into()),
            data,
            filename: None,
            correlation_id: None,
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// The target this request names, or `None` if both or neither are set.
    pub fn target(&self) -> Option<TemplateTarget> {
        TemplateTarget::from_columns(self.version_id.clone(), self.environment_id.clone())
    }
}

/// Request counts per status, for admin reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestStatusCounts {
    pub pending: i64,
    pub in_progress: i64,
    pub completed: i64,
    pub failed: i64,
    pub cancelled: i64,
}

impl RequestStatusCounts {
    pub fn add(&mut self, status: RequestStatus, count: i64) {
        match status {
            RequestStatus::Pending => self.pending += count,
            RequestStatus::InProgress => self.in_progress += count,
            RequestStatus::Completed => self.completed += count,
            RequestStatus::Failed => self.failed += count,
            RequestStatus::Cancelled => self.cancelled += count,
        }
    }

    pub fn get(&self, status: RequestStatus) -> i64 {
        match status {
            RequestStatus::Pending => self.pending,
            RequestStatus::InProgress => self.in_progress,
            RequestStatus::Completed => self.completed,
            RequestStatus::Failed => self.failed,
            RequestStatus::Cancelled => self.cancelled,
        }
    }

    pub fn total(&self) -> i64 {
        self.pending + self.in_progress + self.completed + self.failed + self.cancelled
    }
}

/// Rows removed by a retention pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeResult {
    pub requests: usize,
    pub documents: usize,
    /// Finished batches left with no member requests
    pub batches: usize,
}
