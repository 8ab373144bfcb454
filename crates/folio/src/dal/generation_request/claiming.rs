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

//! Atomic claiming and stale-claim recovery.
//!
//! PostgreSQL claims lock candidate rows with `FOR UPDATE SKIP LOCKED`, so
//! concurrent claimers on different instances never block on, or receive,
//! each other's rows. SQLite has no row locks; claims run in an `IMMEDIATE`
//! transaction which takes the write lock up front and serializes claimers.

use super::GenerationRequestDAL;
use crate::dal::models::{convert_all, PgGenerationRequest, SqliteGenerationRequest};
use crate::database::schema::{postgres as pg, sqlite as lite};
use crate::database::universal_types::{UniversalTimestamp, UniversalUuid};
use crate::error::ValidationError;
use crate::models::{GenerationRequest, RequestStatus};
use diesel::prelude::*;
use uuid::Uuid;

const PENDING: &str = RequestStatus::Pending.as_str();
const IN_PROGRESS: &str = RequestStatus::InProgress.as_str();

impl<'a> GenerationRequestDAL<'a> {
    /// Claims up to `batch_size` PENDING requests, oldest first, for `instance_id`.
    ///
    /// Claimed rows move to IN_PROGRESS with `claimed_by`, `claimed_at` and
    /// `started_at` set, and are returned in creation order. Returns fewer rows
    /// (possibly none) when fewer are available.
    pub async fn claim(
        &self,
        batch_size: usize,
        instance_id: &str,
    ) -> Result<Vec<GenerationRequest>, ValidationError> {
        if batch_size == 0 {
            return Ok(Vec::new());
        }
        crate::dispatch_backend!(
            self.dal.backend(),
            self.claim_postgres(batch_size, instance_id.to_string())
                .await,
            self.claim_sqlite(batch_size, instance_id.to_string()).await
        )
    }

    async fn claim_postgres(
        &self,
        batch_size: usize,
        instance_id: String,
    ) -> Result<Vec<GenerationRequest>, ValidationError> {
        use diesel::connection::Connection;
        use diesel::sql_types::{BigInt, Text, Timestamp};

        #[derive(Debug, QueryableByName)]
        #[diesel(check_for_backend(diesel::pg::Pg))]
        struct ClaimedId {
            #[diesel(sql_type = diesel::sql_types::Uuid)]
            id: Uuid,
        }

        let conn = self.dal.database.get_postgres_connection().await?;
        let limit = batch_size as i64;

        let rows: Vec<PgGenerationRequest> = conn
            .interact(move |conn| {
                conn.transaction::<_, diesel::result::Error, _>(|conn| {
                    let now = UniversalTimestamp::now().to_naive();

                    let claimed: Vec<ClaimedId> = diesel::sql_query(
                        r#"
                        UPDATE generation_requests
                        SET status = 'IN_PROGRESS', claimed_by = $1, claimed_at = $2, started_at = $2
                        WHERE id IN (
                            SELECT id FROM generation_requests
                            WHERE status = 'PENDING'
                            ORDER BY created_at ASC
                            LIMIT $3
                            FOR UPDATE SKIP LOCKED
                        )
                        RETURNING id
                        "#,
                    )
                    .bind::<Text, _>(instance_id.clone())
                    .bind::<Timestamp, _>(now)
                    .bind::<BigInt, _>(limit)
                    .load(conn)?;

                    if claimed.is_empty() {
                        return Ok(Vec::new());
                    }

                    let ids: Vec<Uuid> = claimed.into_iter().map(|c| c.id).collect();
                    pg::generation_requests::table
                        .filter(pg::generation_requests::id.eq_any(ids.clone()))
                        .order(pg::generation_requests::created_at.asc())
                        .load(conn)
                })
            })
            .await
            .map_err(|e| ValidationError::ConnectionPool(e.to_string()))??;

        convert_all(rows)
    }

    async fn claim_sqlite(
        &self,
        batch_size: usize,
        instance_id: String,
    ) -> Result<Vec<GenerationRequest>, ValidationError> {
        use lite::generation_requests::dsl;

        let conn = self.dal.database.get_sqlite_connection().await?;
        let limit = batch_size as i64;

        let rows: Vec<SqliteGenerationRequest> = conn
            .interact(move |conn| {
                conn.immediate_transaction::<_, diesel::result::Error, _>(|conn| {
                    let now = UniversalTimestamp::now().to_sqlite_text();

                    let ids: Vec<Vec<u8>> = dsl::generation_requests
                        .filter(dsl::status.eq(PENDING))
                        .order(dsl::created_at.asc())
                        .limit(limit)
                        .select(dsl::id)
                        .load(conn)?;

                    if ids.is_empty() {
                        return Ok(Vec::new());
                    }

                    diesel::update(
                        dsl::generation_requests
                            .filter(dsl::id.eq_any(ids.clone()))
                            .filter(dsl::status.eq(PENDING)),
                    )
                    .set((
                        dsl::status.eq(IN_PROGRESS),
                        dsl::claimed_by.eq(Some(instance_id.as_str())),
                        dsl::claimed_at.eq(Some(now.as_str())),
                        dsl::started_at.eq(Some(now.as_str())),
                    ))
                    .execute(conn)?;

                    dsl::generation_requests
                        .filter(dsl::id.eq_any(ids.clone()))
                        .filter(dsl::claimed_by.eq(instance_id.as_str()))
                        .filter(dsl::status.eq(IN_PROGRESS))
                        .order(dsl::created_at.asc())
                        .load(conn)
                })
            })
            .await
            .map_err(|e| ValidationError::ConnectionPool(e.to_string()))??;

        convert_all(rows)
    }

    /// Claims one specific request if it is still PENDING.
    ///
    /// Returns `None` when the row does not exist or is in any other state.
    pub async fn claim_by_id(
        &self,
        id: UniversalUuid,
        instance_id: &str,
    ) -> Result<Option<GenerationRequest>, ValidationError> {
        crate::dispatch_backend!(
            self.dal.backend(),
            self.claim_by_id_postgres(id, instance_id.to_string())
                .await,
            self.claim_by_id_sqlite(id, instance_id.to_string()).await
        )
    }

    async fn claim_by_id_postgres(
        &self,
        id: UniversalUuid,
        instance_id: String,
    ) -> Result<Option<GenerationRequest>, ValidationError> {
        use pg::generation_requests::dsl;

        let conn = self.dal.database.get_postgres_connection().await?;
        let row: Option<PgGenerationRequest> = conn
            .interact(move |conn| {
                let now = UniversalTimestamp::now().to_naive();
                diesel::update(
                    dsl::generation_requests
                        .filter(dsl::id.eq(id.as_uuid()))
                        .filter(dsl::status.eq(PENDING)),
                )
                .set((
                    dsl::status.eq(IN_PROGRESS),
                    dsl::claimed_by.eq(Some(instance_id)),
                    dsl::claimed_at.eq(Some(now)),
                    dsl::started_at.eq(Some(now)),
                ))
                .get_result(conn)
                .optional()
            })
            .await
            .map_err(|e| ValidationError::ConnectionPool(e.to_string()))??;

        row.map(GenerationRequest::try_from).transpose()
    }

    async fn claim_by_id_sqlite(
        &self,
        id: UniversalUuid,
        instance_id: String,
    ) -> Result<Option<GenerationRequest>, ValidationError> {
        use lite::generation_requests::dsl;

        let conn = self.dal.database.get_sqlite_connection().await?;
        let row: Option<SqliteGenerationRequest> = conn
            .interact(move |conn| {
                conn.immediate_transaction::<_, diesel::result::Error, _>(|conn| {
                    let now = UniversalTimestamp::now().to_sqlite_text();
                    let updated = diesel::update(
                        dsl::generation_requests
                            .filter(dsl::id.eq(id.to_blob()))
                            .filter(dsl::status.eq(PENDING)),
                    )
                    .set((
                        dsl::status.eq(IN_PROGRESS),
                        dsl::claimed_by.eq(Some(instance_id.as_str())),
                        dsl::claimed_at.eq(Some(now.as_str())),
                        dsl::started_at.eq(Some(now.as_str())),
                    ))
                    .execute(conn)?;

                    if updated == 0 {
                        return Ok(None);
                    }
                    dsl::generation_requests
                        .find(id.to_blob())
                        .first(conn)
                        .optional()
                })
            })
            .await
            .map_err(|e| ValidationError::ConnectionPool(e.to_string()))??;

        row.map(GenerationRequest::try_from).transpose()
    }

    /// Resets IN_PROGRESS requests claimed before `cutoff` back to PENDING,
    /// clearing claim fields. Returns the IDs that were reset.
    pub async fn reset_stale(
        &self,
        cutoff: UniversalTimestamp,
    ) -> Result<Vec<UniversalUuid>, ValidationError> {
        crate::dispatch_backend!(
            self.dal.backend(),
            self.reset_stale_postgres(cutoff).await,
            self.reset_stale_sqlite(cutoff).await
        )
    }

    async fn reset_stale_postgres(
        &self,
        cutoff: UniversalTimestamp,
    ) -> Result<Vec<UniversalUuid>, ValidationError> {
        use diesel::connection::Connection;
        use pg::generation_requests::dsl;

        let conn = self.dal.database.get_postgres_connection().await?;
        let cutoff = cutoff.to_naive();

        let ids: Vec<Uuid> = conn
            .interact(move |conn| {
                conn.transaction::<_, diesel::result::Error, _>(|conn| {
                    diesel::update(
                        dsl::generation_requests
                            .filter(dsl::status.eq(IN_PROGRESS))
                            .filter(dsl::claimed_at.lt(cutoff)),
                    )
                    .set((
                        dsl::status.eq(PENDING),
                        dsl::claimed_by.eq(None::<String>),
                        dsl::claimed_at.eq(None::<chrono::NaiveDateTime>),
                        dsl::started_at.eq(None::<chrono::NaiveDateTime>),
                    ))
                    .returning(dsl::id)
                    .get_results(conn)
                })
            })
            .await
            .map_err(|e| ValidationError::ConnectionPool(e.to_string()))??;

        Ok(ids.into_iter().map(UniversalUuid).collect())
    }

    async fn reset_stale_sqlite(
        &self,
        cutoff: UniversalTimestamp,
    ) -> Result<Vec<UniversalUuid>, ValidationError> {
        use lite::generation_requests::dsl;

        let conn = self.dal.database.get_sqlite_connection().await?;
        let cutoff = cutoff.to_sqlite_text();

        let ids: Vec<Vec<u8>> = conn
            .interact(move |conn| {
                conn.immediate_transaction::<_, diesel::result::Error, _>(|conn| {
                    let ids: Vec<Vec<u8>> = dsl::generation_requests
                        .filter(dsl::status.eq(IN_PROGRESS))
                        .filter(dsl::claimed_at.lt(cutoff.as_str()))
                        .select(dsl::id)
                        .load(conn)?;

                    if ids.is_empty() {
                        return Ok(ids);
                    }

                    diesel::update(
                        dsl::generation_requests
                            .filter(dsl::id.eq_any(ids.clone()))
                            .filter(dsl::status.eq(IN_PROGRESS)),
                    )
                    .set((
                        dsl::status.eq(PENDING),
                        dsl::claimed_by.eq(None::<String>),
                        dsl::claimed_at.eq(None::<String>),
                        dsl::started_at.eq(None::<String>),
                    ))
                    .execute(conn)?;

                    Ok(ids)
                })
            })
            .await
            .map_err(|e| ValidationError::ConnectionPool(e.to_string()))??;

        ids.iter()
            .map(|blob| UniversalUuid::from_blob(blob).map_err(ValidationError::from))
            .collect()
    }
}
