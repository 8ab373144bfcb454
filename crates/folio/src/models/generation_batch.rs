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

//! Generation batch model.
//!
//! A batch groups related requests. Its counters are derived from the member
//! rows by the executor and never set directly.

use crate::database::universal_types::{UniversalTimestamp, UniversalUuid};
use serde::{Deserialize, Serialize};

/// Derived aggregate status of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchStatus {
    /// At least one member has not reached a terminal state
    InProgress,
    /// Every member is terminal and at least one did not fail
    Completed,
    /// Every member failed
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationBatch {
    pub id: UniversalUuid,
    pub tenant_id: String,
    pub total_count: i32,
    pub completed_count: i32,
    pub failed_count: i32,
    pub created_at: UniversalTimestamp,
    /// Set once, when every member request is terminal
    pub completed_at: Option<UniversalTimestamp>,
}

impl GenerationBatch {
    pub fn status(&self) -> BatchStatus {
        if self.completed_at.is_none() {
            BatchStatus::InProgress
        } else if self.total_count > 0 && self.failed_count == self.total_count {
            BatchStatus::Failed
        } else {
            BatchStatus::Completed
        }
    }
}
