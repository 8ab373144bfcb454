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

//! Data Access Layer with runtime backend selection.
//!
//! Every operation has a PostgreSQL and a SQLite implementation; the public
//! method dispatches on the backend detected when the [`Database`] was built.
//!
//! ```rust,ignore
//! let dal = DAL::new(database);
//! let claimed = dal.generation_request().claim(5, "node-a").await?;
//! ```

/// Routes a call to the implementation for the active backend.
#[doc(hidden)]
#[macro_export]
macro_rules! dispatch_backend {
    ($backend:expr, $pg:expr, $sqlite:expr) => {
        match $backend {
            $crate::database::BackendType::Postgres => $pg,
            $crate::database::BackendType::Sqlite => $sqlite,
        }
    };
}

pub mod document;
pub mod generation_batch;
pub mod generation_request;
pub mod models;

pub use document::DocumentDAL;
pub use generation_batch::GenerationBatchDAL;
pub use generation_request::GenerationRequestDAL;

use crate::database::{BackendType, Database};

/// Entry point for all queue persistence.
#[derive(Clone, Debug)]
pub struct DAL {
    pub database: Database,
}

impl DAL {
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    pub fn backend(&self) -> BackendType {
        self.database.backend()
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn generation_request(&self) -> GenerationRequestDAL<'_> {
        GenerationRequestDAL::new(self)
    }

    pub fn generation_batch(&self) -> GenerationBatchDAL<'_> {
        GenerationBatchDAL::new(self)
    }

    pub fn document(&self) -> DocumentDAL<'_> {
        DocumentDAL::new(self)
    }
}
