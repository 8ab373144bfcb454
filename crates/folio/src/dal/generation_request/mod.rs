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

//! Generation request data access.
//!
//! Claiming lives in [`claiming`], terminal state transitions in [`state`].
//! This module covers creation, lookups, reporting and retention.

mod claiming;
mod state;

use std::collections::HashSet;

use super::models::{convert_all, PgGenerationRequest, SqliteGenerationRequest};
use super::DAL;
use crate::database::schema::{postgres as pg, sqlite as lite};
use crate::database::universal_types::{UniversalTimestamp, UniversalUuid};
use crate::error::ValidationError;
use crate::models::{
    GenerationRequest, NewGenerationRequest, PurgeResult, RequestStatus, RequestStatusCounts,
};
use diesel::prelude::*;
use uuid::Uuid;

pub(crate) fn terminal_statuses() -> Vec<&'static str> {
    RequestStatus::ALL
        .iter()
        .filter(|s| s.is_terminal())
        .map(|s| s.as_str())
        .collect()
}

/// Builds the domain row for a freshly submitted request.
pub(crate) fn build_pending(
    new: NewGenerationRequest,
    batch_id: Option<UniversalUuid>,
    created_at: UniversalTimestamp,
    expires_at: Option<UniversalTimestamp>,
) -> Result<GenerationRequest, ValidationError> {
    let target = new.target().ok_or_else(|| {
        ValidationError::InvalidRequest(
            "exactly one of version_id or environment_id must be set".to_string(),
        )
    })?;

    Ok(GenerationRequest {
        id: UniversalUuid::new_v4(),
        batch_id,
        tenant_id: new.tenant_id,
        template_id: new.template_id,
        variant_id: new.variant_id,
        target,
        data: new.data,
        filename: new.filename,
        correlation_id: new.correlation_id,
        document_id: None,
        status: RequestStatus::Pending,
        claimed_by: None,
        claimed_at: None,
        error_message: None,
        created_at,
        started_at: None,
        completed_at: None,
        expires_at,
    })
}

/// Data access for generation requests.
#[derive(Clone)]
pub struct GenerationRequestDAL<'a> {
    dal: &'a DAL,
}

impl<'a> GenerationRequestDAL<'a> {
    pub fn new(dal: &'a DAL) -> Self {
        Self { dal }
    }

    /// Inserts a PENDING request.
    pub async fn create(
        &self,
        new_request: NewGenerationRequest,
        batch_id: Option<UniversalUuid>,
        expires_at: Option<UniversalTimestamp>,
    ) -> Result<GenerationRequest, ValidationError> {
        let request = build_pending(new_request, batch_id, UniversalTimestamp::now(), expires_at)?;
        crate::dispatch_backend!(
            self.dal.backend(),
            self.insert_postgres(request).await,
            self.insert_sqlite(request).await
        )
    }

    async fn insert_postgres(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationRequest, ValidationError> {
        let conn = self.dal.database.get_postgres_connection().await?;
        let row = PgGenerationRequest::from(&request);

        conn.interact(move |conn| {
            diesel::insert_into(pg::generation_requests::table)
                .values(&row)
                .execute(conn)
        })
        .await
        .map_err(|e| ValidationError::ConnectionPool(e.to_string()))??;

        Ok(request)
    }

    async fn insert_sqlite(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationRequest, ValidationError> {
        let conn = self.dal.database.get_sqlite_connection().await?;
        let row = SqliteGenerationRequest::from(&request);

        conn.interact(move |conn| {
            diesel::insert_into(lite::generation_requests::table)
                .values(&row)
                .execute(conn)
        })
        .await
        .map_err(|e| ValidationError::ConnectionPool(e.to_string()))??;

        Ok(request)
    }

    pub async fn get_by_id(
        &self,
        id: UniversalUuid,
    ) -> Result<Option<GenerationRequest>, ValidationError> {
        crate::dispatch_backend!(
            self.dal.backend(),
            self.get_by_id_postgres(id).await,
            self.get_by_id_sqlite(id).await
        )
    }

    async fn get_by_id_postgres(
        &self,
        id: UniversalUuid,
    ) -> Result<Option<GenerationRequest>, ValidationError> {
        let conn = self.dal.database.get_postgres_connection().await?;
        let row: Option<PgGenerationRequest> = conn
            .interact(move |conn| {
                pg::generation_requests::table
                    .find(id.as_uuid())
                    .first(conn)
                    .optional()
            })
            .await
            .map_err(|e| ValidationError::ConnectionPool(e.to_string()))??;

        row.map(GenerationRequest::try_from).transpose()
    }

    async fn get_by_id_sqlite(
        &self,
        id: UniversalUuid,
    ) -> Result<Option<GenerationRequest>, ValidationError> {
        let conn = self.dal.database.get_sqlite_connection().await?;
        let row: Option<SqliteGenerationRequest> = conn
            .interact(move |conn| {
                lite::generation_requests::table
                    .find(id.to_blob())
                    .first(conn)
                    .optional()
            })
            .await
            .map_err(|e| ValidationError::ConnectionPool(e.to_string()))??;

        row.map(GenerationRequest::try_from).transpose()
    }

    /// Lists the members of a batch in creation order.
    pub async fn list_by_batch(
        &self,
        batch_id: UniversalUuid,
    ) -> Result<Vec<GenerationRequest>, ValidationError> {
        crate::dispatch_backend!(
            self.dal.backend(),
            self.list_by_batch_postgres(batch_id).await,
            self.list_by_batch_sqlite(batch_id).await
        )
    }

    async fn list_by_batch_postgres(
        &self,
        batch_id: UniversalUuid,
    ) -> Result<Vec<GenerationRequest>, ValidationError> {
        let conn = self.dal.database.get_postgres_connection().await?;
        let rows: Vec<PgGenerationRequest> = conn
            .interact(move |conn| {
                pg::generation_requests::table
                    .filter(pg::generation_requests::batch_id.eq(batch_id.as_uuid()))
                    .order(pg::generation_requests::created_at.asc())
                    .load(conn)
            })
            .await
            .map_err(|e| ValidationError::ConnectionPool(e.to_string()))??;

        convert_all(rows)
    }

    async fn list_by_batch_sqlite(
        &self,
        batch_id: UniversalUuid,
    ) -> Result<Vec<GenerationRequest>, ValidationError> {
        let conn = self.dal.database.get_sqlite_connection().await?;
        let rows: Vec<SqliteGenerationRequest> = conn
            .interact(move |conn| {
                lite::generation_requests::table
                    .filter(lite::generation_requests::batch_id.eq(batch_id.to_blob()))
                    .order(lite::generation_requests::created_at.asc())
                    .load(conn)
            })
            .await
            .map_err(|e| ValidationError::ConnectionPool(e.to_string()))??;

        convert_all(rows)
    }

    /// Request counts grouped by status.
    pub async fn count_by_status(&self) -> Result<RequestStatusCounts, ValidationError> {
        let grouped: Vec<(String, i64)> = crate::dispatch_backend!(
            self.dal.backend(),
            {
                let conn = self.dal.database.get_postgres_connection().await?;
                conn.interact(|conn| {
                    pg::generation_requests::table
                        .group_by(pg::generation_requests::status)
                        .select((
                            pg::generation_requests::status,
                            diesel::dsl::count_star(),
                        ))
                        .load::<(String, i64)>(conn)
                })
                .await
                .map_err(|e| ValidationError::ConnectionPool(e.to_string()))??
            },
            {
                let conn = self.dal.database.get_sqlite_connection().await?;
                conn.interact(|conn| {
                    lite::generation_requests::table
                        .group_by(lite::generation_requests::status)
                        .select((
                            lite::generation_requests::status,
                            diesel::dsl::count_star(),
                        ))
                        .load::<(String, i64)>(conn)
                })
                .await
                .map_err(|e| ValidationError::ConnectionPool(e.to_string()))??
            }
        );

        let mut counts = RequestStatusCounts::default();
        for (status, count) in grouped {
            let status = RequestStatus::from_str(&status).ok_or_else(|| {
                ValidationError::CorruptRow {
                    column: "status",
                    message: format!("unknown status '{}'", status),
                }
            })?;
            counts.add(status, count);
        }
        Ok(counts)
    }

    /// Number of terminal requests whose retention horizon is before `now`.
    pub async fn count_expired(&self, now: UniversalTimestamp) -> Result<i64, ValidationError> {
        crate::dispatch_backend!(
            self.dal.backend(),
            {
                let conn = self.dal.database.get_postgres_connection().await?;
                let cutoff = now.to_naive();
                Ok(conn
                    .interact(move |conn| {
                        pg::generation_requests::table
                            .filter(pg::generation_requests::status.eq_any(terminal_statuses()))
                            .filter(pg::generation_requests::expires_at.lt(cutoff))
                            .count()
                            .get_result::<i64>(conn)
                    })
                    .await
                    .map_err(|e| ValidationError::ConnectionPool(e.to_string()))??)
            },
            {
                let conn = self.dal.database.get_sqlite_connection().await?;
                let cutoff = now.to_sqlite_text();
                Ok(conn
                    .interact(move |conn| {
                        lite::generation_requests::table
                            .filter(lite::generation_requests::status.eq_any(terminal_statuses()))
                            .filter(lite::generation_requests::expires_at.lt(cutoff))
                            .count()
                            .get_result::<i64>(conn)
                    })
                    .await
                    .map_err(|e| ValidationError::ConnectionPool(e.to_string()))??)
            }
        )
    }

    /// Deletes terminal requests past their retention horizon, their documents,
    /// and any finished batch left without members. One transaction.
    pub async fn purge_expired(
        &self,
        now: UniversalTimestamp,
    ) -> Result<PurgeResult, ValidationError> {
        crate::dispatch_backend!(
            self.dal.backend(),
            self.purge_expired_postgres(now).await,
            self.purge_expired_sqlite(now).await
        )
    }

    async fn purge_expired_postgres(
        &self,
        now: UniversalTimestamp,
    ) -> Result<PurgeResult, ValidationError> {
        use diesel::connection::Connection;
        use pg::{generated_documents, generation_batches, generation_requests};

        let conn = self.dal.database.get_postgres_connection().await?;
        let cutoff = now.to_naive();

        let result = conn
            .interact(move |conn| {
                conn.transaction::<_, diesel::result::Error, _>(|conn| {
                    let expired: Vec<Uuid> = generation_requests::table
                        .filter(generation_requests::status.eq_any(terminal_statuses()))
                        .filter(generation_requests::expires_at.lt(cutoff))
                        .select(generation_requests::id)
                        .load(conn)?;

                    if expired.is_empty() {
                        return Ok(PurgeResult::default());
                    }

                    let documents = diesel::delete(
                        generated_documents::table
                            .filter(generated_documents::request_id.eq_any(expired.clone())),
                    )
                    .execute(conn)?;
                    let requests = diesel::delete(
                        generation_requests::table.filter(generation_requests::id.eq_any(expired.clone())),
                    )
                    .execute(conn)?;

                    let finished: Vec<Uuid> = generation_batches::table
                        .filter(generation_batches::completed_at.is_not_null())
                        .select(generation_batches::id)
                        .load(conn)?;
                    let live: HashSet<Uuid> = generation_requests::table
                        .filter(generation_requests::batch_id.eq_any(finished.clone()))
                        .select(generation_requests::batch_id)
                        .load::<Option<Uuid>>(conn)?
                        .into_iter()
                        .flatten()
                        .collect();
                    let empty: Vec<Uuid> =
                        finished.into_iter().filter(|id| !live.contains(id)).collect();
                    let batches = diesel::delete(
                        generation_batches::table.filter(generation_batches::id.eq_any(empty)),
                    )
                    .execute(conn)?;

                    Ok(PurgeResult {
                        requests,
                        documents,
                        batches,
                    })
                })
            })
            .await
            .map_err(|e| ValidationError::ConnectionPool(e.to_string()))??;

        Ok(result)
    }

    async fn purge_expired_sqlite(
        &self,
        now: UniversalTimestamp,
    ) -> Result<PurgeResult, ValidationError> {
        use diesel::connection::Connection;
        use lite::{generated_documents, generation_batches, generation_requests};

        let conn = self.dal.database.get_sqlite_connection().await?;
        let cutoff = now.to_sqlite_text();

        let result = conn
            .interact(move |conn| {
                conn.transaction::<_, diesel::result::Error, _>(|conn| {
                    let expired: Vec<Vec<u8>> = generation_requests::table
                        .filter(generation_requests::status.eq_any(terminal_statuses()))
                        .filter(generation_requests::expires_at.lt(cutoff))
                        .select(generation_requests::id)
                        .load(conn)?;

                    if expired.is_empty() {
                        return Ok(PurgeResult::default());
                    }

                    let documents = diesel::delete(
                        generated_documents::table
                            .filter(generated_documents::request_id.eq_any(expired.clone())),
                    )
                    .execute(conn)?;
                    let requests = diesel::delete(
                        generation_requests::table.filter(generation_requests::id.eq_any(expired.clone())),
                    )
                    .execute(conn)?;

                    let finished: Vec<Vec<u8>> = generation_batches::table
                        .filter(generation_batches::completed_at.is_not_null())
                        .select(generation_batches::id)
                        .load(conn)?;
                    let live: HashSet<Vec<u8>> = generation_requests::table
                        .filter(generation_requests::batch_id.eq_any(finished.clone()))
                        .select(generation_requests::batch_id)
                        .load::<Option<Vec<u8>>>(conn)?
                        .into_iter()
                        .flatten()
                        .collect();
                    let empty: Vec<Vec<u8>> =
                        finished.into_iter().filter(|id| !live.contains(id)).collect();
                    let batches = diesel::delete(
                        generation_batches::table.filter(generation_batches::id.eq_any(empty)),
                    )
                    .execute(conn)?;

                    Ok(PurgeResult {
                        requests,
                        documents,
                        batches,
                    })
                })
            })
            .await
            .map_err(|e| ValidationError::ConnectionPool(e.to_string()))??;

        Ok(result)
    }
}
