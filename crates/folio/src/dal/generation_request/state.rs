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

//! Terminal state transitions.
//!
//! Completion and failure only apply to a row that is still IN_PROGRESS and
//! still claimed by the caller. A row that was cancelled, recovered by the
//! stale reaper, or already finalized is left untouched and the call reports
//! that nothing happened. Terminal states are therefore sticky.

use super::GenerationRequestDAL;
use crate::dal::models::{PgDocument, SqliteDocument};
use crate::database::schema::{postgres as pg, sqlite as lite};
use crate::database::universal_types::{UniversalTimestamp, UniversalUuid};
use crate::error::{truncate_error_message, ValidationError};
use crate::models::{Document, NewDocument, RequestStatus};
use diesel::prelude::*;

const PENDING: &str = RequestStatus::Pending.as_str();
const IN_PROGRESS: &str = RequestStatus::InProgress.as_str();
const COMPLETED: &str = RequestStatus::Completed.as_str();
const FAILED: &str = RequestStatus::Failed.as_str();
const CANCELLED: &str = RequestStatus::Cancelled.as_str();

impl<'a> GenerationRequestDAL<'a> {
    /// Persists the rendered document and marks the request COMPLETED in one
    /// transaction.
    ///
    /// Returns `None` without writing anything if the request is no longer
    /// IN_PROGRESS under `instance_id`.
    pub async fn complete_with_document(
        &self,
        id: UniversalUuid,
        instance_id: &str,
        new_document: NewDocument,
    ) -> Result<Option<Document>, ValidationError> {
        let document = Document {
            id: UniversalUuid::new_v4(),
            request_id: id,
            tenant_id: new_document.tenant_id.clone(),
            filename: new_document.filename.clone(),
            content_type: new_document.content_type.clone(),
            size_bytes: new_document.size_bytes(),
            content: new_document.content,
            correlation_id: new_document.correlation_id,
            created_at: UniversalTimestamp::now(),
            expires_at: new_document.expires_at,
        };

        let applied = crate::dispatch_backend!(
            self.dal.backend(),
            self.complete_postgres(&document, instance_id.to_string())
                .await?,
            self.complete_sqlite(&document, instance_id.to_string())
                .await?
        );

        Ok(applied.then_some(document))
    }

    async fn complete_postgres(
        &self,
        document: &Document,
        instance_id: String,
    ) -> Result<bool, ValidationError> {
        use diesel::connection::Connection;
        use pg::generation_requests::dsl;

        let conn = self.dal.database.get_postgres_connection().await?;
        let row = PgDocument::from(document);
        let request_id = document.request_id.as_uuid();
        let filename = document.filename.clone();
        let now = document.created_at.to_naive();

        let applied = conn
            .interact(move |conn| {
                conn.transaction::<_, diesel::result::Error, _>(|conn| {
                    let updated = diesel::update(
                        dsl::generation_requests
                            .filter(dsl::id.eq(request_id))
                            .filter(dsl::status.eq(IN_PROGRESS))
                            .filter(dsl::claimed_by.eq(instance_id.as_str())),
                    )
                    .set((
                        dsl::status.eq(COMPLETED),
                        dsl::document_id.eq(Some(row.id)),
                        dsl::filename.eq(Some(filename.as_str())),
                        dsl::completed_at.eq(Some(now)),
                        dsl::error_message.eq(None::<String>),
                    ))
                    .execute(conn)?;

                    if updated == 0 {
                        return Ok(false);
                    }

                    diesel::insert_into(pg::generated_documents::table)
                        .values(&row)
                        .execute(conn)?;
                    Ok(true)
                })
            })
            .await
            .map_err(|e| ValidationError::ConnectionPool(e.to_string()))??;

        Ok(applied)
    }

    async fn complete_sqlite(
        &self,
        document: &Document,
        instance_id: String,
    ) -> Result<bool, ValidationError> {
        use lite::generation_requests::dsl;

        let conn = self.dal.database.get_sqlite_connection().await?;
        let row = SqliteDocument::from(document);
        let request_id = document.request_id.to_blob();
        let filename = document.filename.clone();
        let now = document.created_at.to_sqlite_text();

        let applied = conn
            .interact(move |conn| {
                conn.immediate_transaction::<_, diesel::result::Error, _>(|conn| {
                    let updated = diesel::update(
                        dsl::generation_requests
                            .filter(dsl::id.eq(request_id.clone()))
                            .filter(dsl::status.eq(IN_PROGRESS))
                            .filter(dsl::claimed_by.eq(instance_id.as_str())),
                    )
                    .set((
                        dsl::status.eq(COMPLETED),
                        dsl::document_id.eq(Some(row.id.clone())),
                        dsl::filename.eq(Some(filename.as_str())),
                        dsl::completed_at.eq(Some(now.as_str())),
                        dsl::error_message.eq(None::<String>),
                    ))
                    .execute(conn)?;

                    if updated == 0 {
                        return Ok(false);
                    }

                    diesel::insert_into(lite::generated_documents::table)
                        .values(&row)
                        .execute(conn)?;
                    Ok(true)
                })
            })
            .await
            .map_err(|e| ValidationError::ConnectionPool(e.to_string()))??;

        Ok(applied)
    }

    /// Marks an owned IN_PROGRESS request FAILED with a truncated message.
    ///
    /// Returns whether the transition applied.
    pub async fn mark_failed(
        &self,
        id: UniversalUuid,
        instance_id: &str,
        message: &str,
    ) -> Result<bool, ValidationError> {
        let message = truncate_error_message(message);
        let instance_id = instance_id.to_string();
        let now = UniversalTimestamp::now();

        let updated = crate::dispatch_backend!(
            self.dal.backend(),
            {
                use pg::generation_requests::dsl;
                let conn = self.dal.database.get_postgres_connection().await?;
                conn.interact(move |conn| {
                    diesel::update(
                        dsl::generation_requests
                            .filter(dsl::id.eq(id.as_uuid()))
                            .filter(dsl::status.eq(IN_PROGRESS))
                            .filter(dsl::claimed_by.eq(instance_id.as_str())),
                    )
                    .set((
                        dsl::status.eq(FAILED),
                        dsl::error_message.eq(Some(message.as_str())),
                        dsl::completed_at.eq(Some(now.to_naive())),
                    ))
                    .execute(conn)
                })
                .await
                .map_err(|e| ValidationError::ConnectionPool(e.to_string()))??
            },
            {
                use lite::generation_requests::dsl;
                let conn = self.dal.database.get_sqlite_connection().await?;
                conn.interact(move |conn| {
                    diesel::update(
                        dsl::generation_requests
                            .filter(dsl::id.eq(id.to_blob()))
                            .filter(dsl::status.eq(IN_PROGRESS))
                            .filter(dsl::claimed_by.eq(instance_id.as_str())),
                    )
                    .set((
                        dsl::status.eq(FAILED),
                        dsl::error_message.eq(Some(message.as_str())),
                        dsl::completed_at.eq(Some(now.to_sqlite_text())),
                    ))
                    .execute(conn)
                })
                .await
                .map_err(|e| ValidationError::ConnectionPool(e.to_string()))??
            }
        );

        Ok(updated > 0)
    }

    /// Cancels a PENDING or IN_PROGRESS request. Returns whether it applied.
    ///
    /// An in-flight execution is not interrupted, but its completion will no
    /// longer match and is discarded.
    pub async fn cancel(&self, id: UniversalUuid) -> Result<bool, ValidationError> {
        let now = UniversalTimestamp::now();
        let cancellable = vec![PENDING, IN_PROGRESS];

        let updated = crate::dispatch_backend!(
            self.dal.backend(),
            {
                use pg::generation_requests::dsl;
                let conn = self.dal.database.get_postgres_connection().await?;
                conn.interact(move |conn| {
                    diesel::update(
                        dsl::generation_requests
                            .filter(dsl::id.eq(id.as_uuid()))
                            .filter(dsl::status.eq_any(cancellable)),
                    )
                    .set((
                        dsl::status.eq(CANCELLED),
                        dsl::completed_at.eq(Some(now.to_naive())),
                    ))
                    .execute(conn)
                })
                .await
                .map_err(|e| ValidationError::ConnectionPool(e.to_string()))??
            },
            {
                use lite::generation_requests::dsl;
                let conn = self.dal.database.get_sqlite_connection().await?;
                conn.interact(move |conn| {
                    diesel::update(
                        dsl::generation_requests
                            .filter(dsl::id.eq(id.to_blob()))
                            .filter(dsl::status.eq_any(cancellable)),
                    )
                    .set((
                        dsl::status.eq(CANCELLED),
                        dsl::completed_at.eq(Some(now.to_sqlite_text())),
                    ))
                    .execute(conn)
                })
                .await
                .map_err(|e| ValidationError::ConnectionPool(e.to_string()))??
            }
        );

        Ok(updated > 0)
    }
}
