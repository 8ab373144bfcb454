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

//! Generated document lookups.
//!
//! Documents are written only by
//! [`GenerationRequestDAL::complete_with_document`](super::GenerationRequestDAL::complete_with_document),
//! in the same transaction that completes their request.

use super::models::{PgDocument, SqliteDocument};
use super::DAL;
use crate::database::schema::{postgres as pg, sqlite as lite};
use crate::database::universal_types::UniversalUuid;
use crate::error::ValidationError;
use crate::models::Document;
use diesel::prelude::*;

#[derive(Clone)]
pub struct DocumentDAL<'a> {
    dal: &'a DAL,
}

impl<'a> DocumentDAL<'a> {
    pub fn new(dal: &'a DAL) -> Self {
        Self { dal }
    }

    pub async fn get_by_id(&self, id: UniversalUuid) -> Result<Option<Document>, ValidationError> {
        crate::dispatch_backend!(
            self.dal.backend(),
            {
                let conn = self.dal.database.get_postgres_connection().await?;
                let row: Option<PgDocument> = conn
                    .interact(move |conn| {
                        pg::generated_documents::table
                            .find(id.as_uuid())
                            .first(conn)
                            .optional()
                    })
                    .await
                    .map_err(|e| ValidationError::ConnectionPool(e.to_string()))??;
                Ok(row.map(Document::from))
            },
            {
                let conn = self.dal.database.get_sqlite_connection().await?;
                let row: Option<SqliteDocument> = conn
                    .interact(move |conn| {
                        lite::generated_documents::table
                            .find(id.to_blob())
                            .first(conn)
                            .optional()
                    })
                    .await
                    .map_err(|e| ValidationError::ConnectionPool(e.to_string()))??;
                row.map(Document::try_from).transpose()
            }
        )
    }

    /// Documents produced for a request. At most one exists per request.
    pub async fn list_by_request(
        &self,
        request_id: UniversalUuid,
    ) -> Result<Vec<Document>, ValidationError> {
        crate::dispatch_backend!(
            self.dal.backend(),
            {
                let conn = self.dal.database.get_postgres_connection().await?;
                let rows: Vec<PgDocument> = conn
                    .interact(move |conn| {
                        pg::generated_documents::table
                            .filter(pg::generated_documents::request_id.eq(request_id.as_uuid()))
                            .load(conn)
                    })
                    .await
                    .map_err(|e| ValidationError::ConnectionPool(e.to_string()))??;
                Ok(rows.into_iter().map(Document::from).collect())
            },
            {
                let conn = self.dal.database.get_sqlite_connection().await?;
                let rows: Vec<SqliteDocument> = conn
                    .interact(move |conn| {
                        lite::generated_documents::table
                            .filter(lite::generated_documents::request_id.eq(request_id.to_blob()))
                            .load(conn)
                    })
                    .await
                    .map_err(|e| ValidationError::ConnectionPool(e.to_string()))??;
                super::models::convert_all(rows)
            }
        )
    }
}
