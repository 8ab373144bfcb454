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

//! Request submission and job-created notification.
//!
//! [`GenerationService`] validates creation invariants, persists requests and
//! then notifies every registered [`JobCreatedHook`]. Two hooks are provided:
//! - [`PollerWakeHook`] asks the local poller for an immediate drain
//! - [`InlineExecutionHook`] claims and executes each new request before
//!   `submit` returns, for tests and single-process tooling

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tracing::{debug, error, info, warn};

use crate::dal::DAL;
use crate::database::universal_types::{UniversalTimestamp, UniversalUuid};
use crate::error::{GenerationError, SubmissionError, ValidationError};
use crate::executor::DocumentGenerationExecutor;
use crate::models::{GenerationBatch, GenerationRequest, NewGenerationRequest};
use crate::poller::{panic_message, DrainHandle};

/// Notified after new requests are committed.
#[async_trait]
pub trait JobCreatedHook: Send + Sync {
    async fn on_jobs_created(&self, requests: &[GenerationRequest]);
}

/// Wakes the local poller so new work is claimed without waiting for a tick.
pub struct PollerWakeHook {
    drain: DrainHandle,
}

impl PollerWakeHook {
    pub fn new(drain: DrainHandle) -> Self {
        Self { drain }
    }
}

#[async_trait]
impl JobCreatedHook for PollerWakeHook {
    async fn on_jobs_created(&self, _requests: &[GenerationRequest]) {
        self.drain.request_drain();
    }
}

/// Executes new requests inline instead of waiting for the poller.
///
/// Each request is claimed by ID first, so a poller running alongside can
/// never execute the same row.
pub struct InlineExecutionHook {
    dal: DAL,
    executor: Arc<DocumentGenerationExecutor>,
}

impl InlineExecutionHook {
    pub fn new(dal: DAL, executor: Arc<DocumentGenerationExecutor>) -> Self {
        Self { dal, executor }
    }
}

#[async_trait]
impl JobCreatedHook for InlineExecutionHook {
    async fn on_jobs_created(&self, requests: &[GenerationRequest]) {
        for request in requests {
            let claimed = self
                .dal
                .generation_request()
                .claim_by_id(request.id, self.executor.instance_id())
                .await;
            match claimed {
                Ok(Some(claimed)) => {
                    let result = AssertUnwindSafe(self.executor.execute(&claimed))
                        .catch_unwind()
                        .await;
                    let outcome = match result {
                        Ok(outcome) => outcome,
                        Err(panic) => {
                            let message = panic_message(panic.as_ref());
                            error!(request_id = %claimed.id, panic = %message, "Inline execution panicked");
                            self.executor
                                .fail(&claimed, GenerationError::Panicked(message))
                                .await
                        }
                    };
                    debug!(request_id = %claimed.id, ?outcome, "Inline execution finished");
                }
                Ok(None) => debug!(request_id = %request.id, "Request already claimed elsewhere"),
                Err(e) => warn!(request_id = %request.id, error = %e, "Inline claim failed"),
            }
        }
    }
}

/// Entry point for creating and cancelling generation requests.
#[derive(Clone)]
pub struct GenerationService {
    dal: DAL,
    retention_days: u32,
    hooks: Vec<Arc<dyn JobCreatedHook>>,
}

impl GenerationService {
    /// `retention_days` of zero disables expiry.
    pub fn new(dal: DAL, retention_days: u32) -> Self {
        Self {
            dal,
            retention_days,
            hooks: Vec::new(),
        }
    }

    pub fn with_hook(mut self, hook: Arc<dyn JobCreatedHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn dal(&self) -> &DAL {
        &self.dal
    }

    fn expires_at(&self) -> Option<UniversalTimestamp> {
        if self.retention_days == 0 {
            return None;
        }
        let now = UniversalTimestamp::now().into_inner();
        Some(UniversalTimestamp(
            now + chrono::Duration::days(i64::from(self.retention_days)),
        ))
    }

    /// Submits a single request.
    pub async fn submit(
        &self,
        request: NewGenerationRequest,
    ) -> Result<GenerationRequest, SubmissionError> {
        if request.target().is_none() {
            return Err(SubmissionError::AmbiguousTarget { index: 0 });
        }

        let created = self
            .dal
            .generation_request()
            .create(request, None, self.expires_at())
            .await?;
        info!(request_id = %created.id, tenant_id = %created.tenant_id, "Generation request submitted");

        self.notify(std::slice::from_ref(&created)).await;
        Ok(created)
    }

    /// Submits a batch of requests for one tenant in a single transaction.
    pub async fn submit_batch(
        &self,
        tenant_id: &str,
        requests: Vec<NewGenerationRequest>,
    ) -> Result<(GenerationBatch, Vec<GenerationRequest>), SubmissionError> {
        validate_batch(tenant_id, &requests)?;

        let (batch, members) = self
            .dal
            .generation_batch()
            .create_with_requests(tenant_id, requests, self.expires_at())
            .await?;
        info!(
            batch_id = %batch.id,
            tenant_id = %tenant_id,
            total = batch.total_count,
            "Generation batch submitted"
        );

        self.notify(&members).await;
        Ok((batch, members))
    }

    /// Cancels a PENDING or IN_PROGRESS request and updates its batch.
    ///
    /// Returns `false` if the request does not exist or is already terminal.
    pub async fn cancel(&self, id: UniversalUuid) -> Result<bool, ValidationError> {
        if !self.dal.generation_request().cancel(id).await? {
            return Ok(false);
        }
        info!(request_id = %id, "Generation request cancelled");

        if let Some(batch_id) = self
            .dal
            .generation_request()
            .get_by_id(id)
            .await?
            .and_then(|r| r.batch_id)
        {
            self.dal.generation_batch().recompute(batch_id).await?;
        }
        Ok(true)
    }

    async fn notify(&self, requests: &[GenerationRequest]) {
        for hook in &self.hooks {
            hook.on_jobs_created(requests).await;
        }
    }
}

fn validate_batch(tenant_id: &str, requests: &[NewGenerationRequest]) -> Result<(), SubmissionError> {
    if requests.is_empty() {
        return Err(SubmissionError::EmptyBatch);
    }

    let mut seen = HashSet::new();
    for (index, request) in requests.iter().enumerate() {
        if request.target().is_none() {
            return Err(SubmissionError::AmbiguousTarget { index });
        }
        if request.tenant_id != tenant_id {
            return Err(SubmissionError::TenantMismatch {
                index,
                expected: tenant_id.to_string(),
                actual: request.tenant_id.clone(),
            });
        }
        if let Some(correlation_id) = &request.correlation_id {
            if !seen.insert(correlation_id.as_str()) {
                return Err(SubmissionError::DuplicateCorrelationId {
                    correlation_id: correlation_id.clone(),
                });
            }
        }
    }
    Ok(())
}
