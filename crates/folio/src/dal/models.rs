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

//! Backend-specific row models.
//!
//! PostgreSQL rows use native `Uuid` and `NaiveDateTime` (UTC) columns.
//! SQLite rows store UUIDs as 16-byte BLOBs and timestamps as fixed-width
//! RFC 3339 text. Both are converted to domain types at the DAL boundary;
//! conversions from SQLite are fallible since BLOB and TEXT columns are
//! not type-checked by the database.

use crate::database::schema::{postgres as pg, sqlite as lite};
use crate::database::universal_types::{UniversalTimestamp, UniversalUuid};
use crate::error::ValidationError;
use crate::models::{
    Document, GenerationBatch, GenerationRequest, RequestStatus, TemplateTarget,
};
use chrono::NaiveDateTime;
use diesel::prelude::*;
use uuid::Uuid;

fn parse_status(value: &str) -> Result<RequestStatus, ValidationError> {
    RequestStatus::from_str(value).ok_or_else(|| ValidationError::CorruptRow {
        column: "status",
        message: format!("unknown status '{}'", value),
    })
}

fn parse_target(
    version_id: Option<String>,
    environment_id: Option<String>,
) -> Result<TemplateTarget, ValidationError> {
    TemplateTarget::from_columns(version_id, environment_id).ok_or(ValidationError::CorruptRow {
        column: "version_id",
        message: "exactly one of version_id or environment_id must be set".to_string(),
    })
}

fn sqlite_ts(value: &str) -> Result<UniversalTimestamp, ValidationError> {
    Ok(UniversalTimestamp::from_sqlite_text(value)?)
}

fn sqlite_ts_opt(value: Option<String>) -> Result<Option<UniversalTimestamp>, ValidationError> {
    value.as_deref().map(sqlite_ts).transpose()
}

fn sqlite_uuid(value: &[u8]) -> Result<UniversalUuid, ValidationError> {
    Ok(UniversalUuid::from_blob(value)?)
}

fn sqlite_uuid_opt(value: Option<Vec<u8>>) -> Result<Option<UniversalUuid>, ValidationError> {
    value.as_deref().map(sqlite_uuid).transpose()
}

// ============================================================================
// Generation Request Models
// ============================================================================

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = pg::generation_requests)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct PgGenerationRequest {
    pub id: Uuid,
    pub batch_id: Option<Uuid>,
    pub tenant_id: String,
    pub template_id: String,
    pub variant_id: String,
    pub version_id: Option<String>,
    pub environment_id: Option<String>,
    pub data: String,
    pub filename: Option<String>,
    pub correlation_id: Option<String>,
    pub document_id: Option<Uuid>,
    pub status: String,
    pub claimed_by: Option<String>,
    pub claimed_at: Option<NaiveDateTime>,
    pub error_message: Option<String>,
    pub created_at: NaiveDateTime,
    pub started_at: Option<NaiveDateTime>,
    pub completed_at: Option<NaiveDateTime>,
    pub expires_at: Option<NaiveDateTime>,
}

impl From<&GenerationRequest> for PgGenerationRequest {
    fn from(request: &GenerationRequest) -> Self {
        let (version_id, environment_id) = request.target.clone().into_columns();
        Self {
            id: request.id.as_uuid(),
            batch_id: request.batch_id.map(|b| b.as_uuid()),
            tenant_id: request.tenant_id.clone(),
            template_id: request.template_id.clone(),
            variant_id: request.variant_id.clone(),
            version_id,
            environment_id,
            data: request.data.to_string(),
            filename: request.filename.clone(),
            correlation_id: request.correlation_id.clone(),
            document_id: request.document_id.map(|d| d.as_uuid()),
            status: request.status.as_str().to_string(),
            claimed_by: request.claimed_by.clone(),
            claimed_at: request.claimed_at.map(|t| t.to_naive()),
            error_message: request.error_message.clone(),
            created_at: request.created_at.to_naive(),
            started_at: request.started_at.map(|t| t.to_naive()),
            completed_at: request.completed_at.map(|t| t.to_naive()),
            expires_at: request.expires_at.map(|t| t.to_naive()),
        }
    }
}

impl TryFrom<PgGenerationRequest> for GenerationRequest {
    type Error = ValidationError;

    fn try_from(row: PgGenerationRequest) -> Result<Self, Self::Error> {
        Ok(GenerationRequest {
            id: UniversalUuid(row.id),
            batch_id: row.batch_id.map(UniversalUuid),
            tenant_id: row.tenant_id,
            template_id: row.template_id,
            variant_id: row.variant_id,
            target: parse_target(row.version_id, row.environment_id)?,
            data: serde_json::from_str(&row.data)?,
            filename: row.filename,
            correlation_id: row.correlation_id,
            document_id: row.document_id.map(UniversalUuid),
            status: parse_status(&row.status)?,
            claimed_by: row.claimed_by,
            claimed_at: row.claimed_at.map(UniversalTimestamp::from_naive),
            error_message: row.error_message,
            created_at: UniversalTimestamp::from_naive(row.created_at),
            started_at: row.started_at.map(UniversalTimestamp::from_naive),
            completed_at: row.completed_at.map(UniversalTimestamp::from_naive),
            expires_at: row.expires_at.map(UniversalTimestamp::from_naive),
        })
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = lite::generation_requests)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SqliteGenerationRequest {
    pub id: Vec<u8>,
    pub batch_id: Option<Vec<u8>>,
    pub tenant_id: String,
    pub template_id: String,
    pub variant_id: String,
    pub version_id: Option<String>,
    pub environment_id: Option<String>,
    pub data: String,
    pub filename: Option<String>,
    pub correlation_id: Option<String>,
    pub document_id: Option<Vec<u8>>,
    pub status: String,
    pub claimed_by: Option<String>,
    pub claimed_at: Option<String>,
    pub error_message: Option<String>,
    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub expires_at: Option<String>,
}

impl From<&GenerationRequest> for SqliteGenerationRequest {
    fn from(request: &GenerationRequest) -> Self {
        let (version_id, environment_id) = request.target.clone().into_columns();
        Self {
            id: request.id.to_blob(),
            batch_id: request.batch_id.map(|b| b.to_blob()),
            tenant_id: request.tenant_id.clone(),
            template_id: request.template_id.clone(),
            variant_id: request.variant_id.clone(),
            version_id,
            environment_id,
            data: request.data.to_string(),
            filename: request.filename.clone(),
            correlation_id: request.correlation_id.clone(),
            document_id: request.document_id.map(|d| d.to_blob()),
            status: request.status.as_str().to_string(),
            claimed_by: request.claimed_by.clone(),
            claimed_at: request.claimed_at.map(|t| t.to_sqlite_text()),
            error_message: request.error_message.clone(),
            created_at: request.created_at.to_sqlite_text(),
            started_at: request.started_at.map(|t| t.to_sqlite_text()),
            completed_at: request.completed_at.map(|t| t.to_sqlite_text()),
            expires_at: request.expires_at.map(|t| t.to_sqlite_text()),
        }
    }
}

impl TryFrom<SqliteGenerationRequest> for GenerationRequest {
    type Error = ValidationError;

    fn try_from(row: SqliteGenerationRequest) -> Result<Self, Self::Error> {
        Ok(GenerationRequest {
            id: sqlite_uuid(&row.id)?,
            batch_id: sqlite_uuid_opt(row.batch_id)?,
            tenant_id: row.tenant_id,
            template_id: row.template_id,
            variant_id: row.variant_id,
            target: parse_target(row.version_id, row.environment_id)?,
            data: serde_json::from_str(&row.data)?,
            filename: row.filename,
            correlation_id: row.correlation_id,
            document_id: sqlite_uuid_opt(row.document_id)?,
            status: parse_status(&row.status)?,
            claimed_by: row.claimed_by,
            claimed_at: sqlite_ts_opt(row.claimed_at)?,
            error_message: row.error_message,
            created_at: sqlite_ts(&row.created_at)?,
            started_at: sqlite_ts_opt(row.started_at)?,
            completed_at: sqlite_ts_opt(row.completed_at)?,
            expires_at: sqlite_ts_opt(row.expires_at)?,
        })
    }
}

// ============================================================================
// Generation Batch Models
// ============================================================================

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = pg::generation_batches)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct PgGenerationBatch {
    pub id: Uuid,
    pub tenant_id: String,
    pub total_count: i32,
    pub completed_count: i32,
    pub failed_count: i32,
    pub created_at: NaiveDateTime,
    pub completed_at: Option<NaiveDateTime>,
}

impl From<PgGenerationBatch> for GenerationBatch {
    fn from(row: PgGenerationBatch) -> Self {
        GenerationBatch {
            id: UniversalUuid(row.id),
            tenant_id: row.tenant_id,
            total_count: row.total_count,
            completed_count: row.completed_count,
            failed_count: row.failed_count,
            created_at: UniversalTimestamp::from_naive(row.created_at),
            completed_at: row.completed_at.map(UniversalTimestamp::from_naive),
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = lite::generation_batches)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SqliteGenerationBatch {
    pub id: Vec<u8>,
    pub tenant_id: String,
    pub total_count: i32,
    pub completed_count: i32,
    pub failed_count: i32,
    pub created_at: String,
    pub completed_at: Option<String>,
}

impl TryFrom<SqliteGenerationBatch> for GenerationBatch {
    type Error = ValidationError;

    fn try_from(row: SqliteGenerationBatch) -> Result<Self, Self::Error> {
        Ok(GenerationBatch {
            id: sqlite_uuid(&row.id)?,
            tenant_id: row.tenant_id,
            total_count: row.total_count,
            completed_count: row.completed_count,
            failed_count: row.failed_count,
            created_at: sqlite_ts(&row.created_at)?,
            completed_at: sqlite_ts_opt(row.completed_at)?,
        })
    }
}

// ============================================================================
// Document Models
// ============================================================================

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = pg::generated_documents)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct PgDocument {
    pub id: Uuid,
    pub request_id: Uuid,
    pub tenant_id: String,
    pub filename: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub content: Vec<u8>,
    pub correlation_id: Option<String>,
    pub created_at: NaiveDateTime,
    pub expires_at: Option<NaiveDateTime>,
}

impl From<&Document> for PgDocument {
    fn from(doc: &Document) -> Self {
        Self {
            id: doc.id.as_uuid(),
            request_id: doc.request_id.as_uuid(),
            tenant_id: doc.tenant_id.clone(),
            filename: doc.filename.clone(),
            content_type: doc.content_type.clone(),
            size_bytes: doc.size_bytes,
            content: doc.content.clone(),
            correlation_id: doc.correlation_id.clone(),
            created_at: doc.created_at.to_naive(),
            expires_at: doc.expires_at.map(|t| t.to_naive()),
        }
    }
}

impl From<PgDocument> for Document {
    fn from(row: PgDocument) -> Self {
        Document {
            id: UniversalUuid(row.id),
            request_id: UniversalUuid(row.request_id),
            tenant_id: row.tenant_id,
            filename: row.filename,
            content_type: row.content_type,
            size_bytes: row.size_bytes,
            content: row.content,
            correlation_id: row.correlation_id,
            created_at: UniversalTimestamp::from_naive(row.created_at),
            expires_at: row.expires_at.map(UniversalTimestamp::from_naive),
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = lite::generated_documents)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SqliteDocument {
    pub id: Vec<u8>,
    pub request_id: Vec<u8>,
    pub tenant_id: String,
    pub filename: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub content: Vec<u8>,
    pub correlation_id: Option<String>,
    pub created_at: String,
    pub expires_at: Option<String>,
}

impl From<&Document> for SqliteDocument {
    fn from(doc: &Document) -> Self {
        Self {
            id: doc.id.to_blob(),
            request_id: doc.request_id.to_blob(),
            tenant_id: doc.tenant_id.clone(),
            filename: doc.filename.clone(),
            content_type: doc.content_type.clone(),
            size_bytes: doc.size_bytes,
            content: doc.content.clone(),
            correlation_id: doc.correlation_id.clone(),
            created_at: doc.created_at.to_sqlite_text(),
            expires_at: doc.expires_at.map(|t| t.to_sqlite_text()),
        }
    }
}

impl TryFrom<SqliteDocument> for Document {
    type Error = ValidationError;

    fn try_from(row: SqliteDocument) -> Result<Self, Self::Error> {
        Ok(Document {
            id: sqlite_uuid(&row.id)?,
            request_id: sqlite_uuid(&row.request_id)?,
            tenant_id: row.tenant_id,
            filename: row.filename,
            content_type: row.content_type,
            size_bytes: row.size_bytes,
            content: row.content,
            correlation_id: row.correlation_id,
            created_at: sqlite_ts(&row.created_at)?,
            expires_at: sqlite_ts_opt(row.expires_at)?,
        })
    }
}

/// Converts a list of rows, failing on the first corrupt one.
pub(crate) fn convert_all<R, T>(rows: Vec<R>) -> Result<Vec<T>, ValidationError>
where
    T: TryFrom<R, Error = ValidationError>,
{
    rows.into_iter().map(T::try_from).collect()
}
