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

//! Domain models shared by the DAL, the executor and the submission service.

pub mod document;
pub mod generation_batch;
pub mod generation_request;

pub use document::{Document, NewDocument, PDF_CONTENT_TYPE};
pub use generation_batch::{BatchStatus, GenerationBatch};
pub use generation_request::{
    GenerationRequest, NewGenerationRequest, PurgeResult, RequestStatus, RequestStatusCounts,
    TemplateTarget,
};
