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

//! Generation batch data access.
//!
//! Batch counters are derived from member rows. `recompute` is the only
//! writer after creation and runs as one transaction with the batch row
//! locked, so concurrently finishing members cannot overwrite each other's
//! counts.

use super::generation_request::build_pending;
use super::models::{
    PgGenerationBatch, PgGenerationRequest, SqliteGenerationBatch, SqliteGenerationRequest,
};
use super::DAL;
use crate::database::schema::{postgres as pg, sqlite as lite};
use crate::database::universal_types::{UniversalTimestamp, UniversalUuid};
use crate::error::ValidationError;
use crate::models::{GenerationBatch, GenerationRequest, NewGenerationRequest, RequestStatus};
use diesel::prelude::*;

/// Member tallies used to derive batch counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct MemberTally {
    completed: i32,
    failed: i32,
    terminal: i32,
}

impl MemberTally {
    fn from_statuses(statuses: &[String]) -> Self {
        let mut tally = MemberTally::default();
        for status in statuses.iter().filter_map(|s| RequestStatus::from_str(s)) {
            match status {
                RequestStatus::Completed => tally.completed += 1,
                RequestStatus::Failed => tally.failed += 1,
                _ => {}
            }
            if status.is_terminal() {
                tally.terminal += 1;
            }
        }
        tally
    }
}

#[derive(Clone)]
pub struct GenerationBatchDAL<'a> {
    dal: &'a DAL,
}

impl<'a> GenerationBatchDAL<'a> {
    pub fn new(dal: &'a DAL) -> Self {
        Self { dal }
    }

    /// Inserts a batch and all of its member requests in one transaction.
    pub async fn create_with_requests(
        &self,
        tenant_id: &str,
        requests: Vec<NewGenerationRequest>,
        expires_at: Option<UniversalTimestamp>,
    ) -> Result<(GenerationBatch, Vec<GenerationRequest>), ValidationError> {
        let batch = GenerationBatch {
            id: UniversalUuid::new_v4(),
            tenant_id: tenant_id.to_string(),
            total_count: requests.len() as i32,
            completed_count: 0,
            failed_count: 0,
            created_at: UniversalTimestamp::now(),
            completed_at: None,
        };
        // Members are stamped one microsecond apart so claims follow submission order.
        let base = batch.created_at.into_inner();
        let members = requests
            .into_iter()
            .enumerate()
            .map(|(i, new)| {
                let created_at = UniversalTimestamp(base + chrono::Duration::microseconds(i as i64));
                build_pending(new, Some(batch.id), created_at, expires_at)
            })
            .collect::<Result<Vec<_>, _>>()?;

        crate::dispatch_backend!(
            self.dal.backend(),
            self.insert_postgres(&batch, &members).await?,
            self.insert_sqlite(&batch, &members).await?
        );

        Ok((batch, members))
    }

    async fn insert_postgres(
        &self,
        batch: &GenerationBatch,
        members: &[GenerationRequest],
    ) -> Result<(), ValidationError> {
        use diesel::connection::Connection;

        let conn = self.dal.database.get_postgres_connection().await?;
        let batch_row = PgGenerationBatch {
            id: batch.id.as_uuid(),
            tenant_id: batch.tenant_id.clone(),
            total_count: batch.total_count,
            completed_count: 0,
            failed_count: 0,
            created_at: batch.created_at.to_naive(),
            completed_at: None,
        };
        let member_rows: Vec<PgGenerationRequest> =
            members.iter().map(PgGenerationRequest::from).collect();

        conn.interact(move |conn| {
            conn.transaction::<_, diesel::result::Error, _>(|conn| {
                diesel::insert_into(pg::generation_batches::table)
                    .values(&batch_row)
                    .execute(conn)?;
                diesel::insert_into(pg::generation_requests::table)
                    .values(&member_rows)
                    .execute(conn)?;
                Ok(())
            })
        })
        .await
        .map_err(|e| ValidationError::ConnectionPool(e.to_string()))??;

        Ok(())
    }

    async fn insert_sqlite(
        &self,
        batch: &GenerationBatch,
        members: &[GenerationRequest],
    ) -> Result<(), ValidationError> {
        let conn = self.dal.database.get_sqlite_connection().await?;
        let batch_row = SqliteGenerationBatch {
            id: batch.id.to_blob(),
            tenant_id: batch.tenant_id.clone(),
            total_count: batch.total_count,
            completed_count: 0,
            failed_count: 0,
            created_at: batch.created_at.to_sqlite_text(),
            completed_at: None,
        };
        let member_rows: Vec<SqliteGenerationRequest> =
            members.iter().map(SqliteGenerationRequest::from).collect();

        conn.interact(move |conn| {
            conn.immediate_transaction::<_, diesel::result::Error, _>(|conn| {
                diesel::insert_into(lite::generation_batches::table)
                    .values(&batch_row)
                    .execute(conn)?;
                for row in &member_rows {
                    diesel::insert_into(lite::generation_requests::table)
                        .values(row)
                        .execute(conn)?;
                }
                Ok(())
            })
        })
        .await
        .map_err(|e| ValidationError::ConnectionPool(e.to_string()))??;

        Ok(())
    }

    pub async fn get_by_id(
        &self,
        id: UniversalUuid,
    ) -> Result<Option<GenerationBatch>, ValidationError> {
        crate::dispatch_backend!(
            self.dal.backend(),
            {
                let conn = self.dal.database.get_postgres_connection().await?;
                let row: Option<PgGenerationBatch> = conn
                    .interact(move |conn| {
                        pg::generation_batches::table
                            .find(id.as_uuid())
                            .first(conn)
                            .optional()
                    })
                    .await
                    .map_err(|e| ValidationError::ConnectionPool(e.to_string()))??;
                Ok(row.map(GenerationBatch::from))
            },
            {
                let conn = self.dal.database.get_sqlite_connection().await?;
                let row: Option<SqliteGenerationBatch> = conn
                    .interact(move |conn| {
                        lite::generation_batches::table
                            .find(id.to_blob())
                            .first(conn)
                            .optional()
                    })
                    .await
                    .map_err(|e| ValidationError::ConnectionPool(e.to_string()))??;
                row.map(GenerationBatch::try_from).transpose()
            }
        )
    }

    /// Recounts completed and failed members and stamps `completed_at` once
    /// every member is terminal. An existing `completed_at` is never moved.
    ///
    /// Returns the updated batch, or `None` if it does not exist.
    pub async fn recompute(
        &self,
        id: UniversalUuid,
    ) -> Result<Option<GenerationBatch>, ValidationError> {
        crate::dispatch_backend!(
            self.dal.backend(),
            self.recompute_postgres(id).await,
            self.recompute_sqlite(id).await
        )
    }

    async fn recompute_postgres(
        &self,
        id: UniversalUuid,
    ) -> Result<Option<GenerationBatch>, ValidationError> {
        use diesel::connection::Connection;
        use pg::{generation_batches, generation_requests};

        let conn = self.dal.database.get_postgres_connection().await?;
        let batch_id = id.as_uuid();

        let row: Option<PgGenerationBatch> = conn
            .interact(move |conn| {
                conn.transaction::<_, diesel::result::Error, _>(|conn| {
                    let batch: Option<PgGenerationBatch> = generation_batches::table
                        .find(batch_id)
                        .for_update()
                        .first(conn)
                        .optional()?;
                    let Some(batch) = batch else {
                        return Ok(None);
                    };

                    let statuses: Vec<String> = generation_requests::table
                        .filter(generation_requests::batch_id.eq(batch_id))
                        .select(generation_requests::status)
                        .load(conn)?;
                    let tally = MemberTally::from_statuses(&statuses);

                    let completed_at = batch.completed_at.or_else(|| {
                        (tally.terminal >= batch.total_count)
                            .then(|| UniversalTimestamp::now().to_naive())
                    });

                    diesel::update(generation_batches::table.find(batch_id))
                        .set((
                            generation_batches::completed_count.eq(tally.completed),
                            generation_batches::failed_count.eq(tally.failed),
                            generation_batches::completed_at.eq(completed_at),
                        ))
                        .get_result(conn)
                        .map(Some)
                })
            })
            .await
            .map_err(|e| ValidationError::ConnectionPool(e.to_string()))??;

        Ok(row.map(GenerationBatch::from))
    }

    async fn recompute_sqlite(
        &self,
        id: UniversalUuid,
    ) -> Result<Option<GenerationBatch>, ValidationError> {
        use lite::{generation_batches, generation_requests};

        let conn = self.dal.database.get_sqlite_connection().await?;
        let batch_id = id.to_blob();

        let row: Option<SqliteGenerationBatch> = conn
            .interact(move |conn| {
                conn.immediate_transaction::<_, diesel::result::Error, _>(|conn| {
                    let batch: Option<SqliteGenerationBatch> = generation_batches::table
                        .find(batch_id.clone())
                        .first(conn)
                        .optional()?;
                    let Some(batch) = batch else {
                        return Ok(None);
                    };

                    let statuses: Vec<String> = generation_requests::table
                        .filter(generation_requests::batch_id.eq(batch_id.clone()))
                        .select(generation_requests::status)
                        .load(conn)?;
                    let tally = MemberTally::from_statuses(&statuses);

                    let completed_at = batch.completed_at.clone().or_else(|| {
                        (tally.terminal >= batch.total_count)
                            .then(|| UniversalTimestamp::now().to_sqlite_text())
                    });

                    diesel::update(generation_batches::table.find(batch_id.clone()))
                        .set((
                            generation_batches::completed_count.eq(tally.completed),
                            generation_batches::failed_count.eq(tally.failed),
                            generation_batches::completed_at.eq(completed_at),
                        ))
                        .execute(conn)?;

                    generation_batches::table
                        .find(batch_id.clone())
                        .first(conn)
                        .optional()
                })
            })
            .await
            .map_err(|e| ValidationError::ConnectionPool(e.to_string()))??;

        row.map(GenerationBatch::try_from).transpose()
    }

    /// Member requests in creation order.
    pub async fn members(
        &self,
        id: UniversalUuid,
    ) -> Result<Vec<GenerationRequest>, ValidationError> {
        self.dal.generation_request().list_by_batch(id).await
    }
}
