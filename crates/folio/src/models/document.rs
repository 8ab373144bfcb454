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

//! Rendered document model.

use crate::database::universal_types::{UniversalTimestamp, UniversalUuid};
use serde::{Deserialize, Serialize};

/// Content type of every document this queue produces.
pub const PDF_CONTENT_TYPE: &str = "application/pdf";

/// A rendered artifact. Created once per completed request, immutable after.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: UniversalUuid,
    pub request_id: UniversalUuid,
    pub tenant_id: String,
    pub filename: String,
    pub content_type: String,
    pub size_bytes: i64,
    #[serde(skip)]
    pub content: Vec<u8>,
    pub correlation_id: Option<String>,
    pub created_at: UniversalTimestamp,
    pub expires_at: Option<UniversalTimestamp>,
}

#[derive(Debug, Clone)]
pub struct NewDocument {
    pub tenant_id: String,
    pub filename: String,
    pub content_type: String,
    pub content: Vec<u8>,
    pub correlation_id: Option<String>,
    pub expires_at: Option<UniversalTimestamp>,
}

impl NewDocument {
    pub fn size_bytes(&self) -> i64 {
        self.content.len() as i64
    }
}
