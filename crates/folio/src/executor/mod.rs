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

//! Document generation executor.
//!
//! Executes one claimed request end to end:
//! 1. re-read the row and skip it if it is no longer ours to run
//! 2. resolve the template version (explicit or environment-active)
//! 3. look up the template theme and the tenant fallback theme
//! 4. render into memory and enforce the size limit
//! 5. persist the document and complete the request in one transaction
//! 6. on any failure, mark the request FAILED with a truncated message
//! 7. recompute the owning batch, if any
//!
//! [`DocumentGenerationExecutor::execute`] never returns an error. Every
//! outcome is written to the store and reported as an [`ExecutionOutcome`].

pub mod collaborators;

pub use collaborators::{
    DocumentRenderer, RenderInput, TemplateModel, Theme, ThemeProvider, VersionResolver,
};

use std::sync::Arc;

use metrics::counter;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::dal::DAL;
use crate::database::universal_types::UniversalUuid;
use crate::error::{GenerationError, ValidationError};
use crate::models::{Document, GenerationRequest, NewDocument, RequestStatus, PDF_CONTENT_TYPE};

/// Why a request was not executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The row already reached a terminal state (including cancellation)
    Terminal(RequestStatus),
    /// The row is no longer IN_PROGRESS under this instance, e.g. it was
    /// recovered as stale and claimed elsewhere
    NotOwned,
    /// The row no longer exists
    NotFound,
}

/// Result of executing one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Completed { document_id: UniversalUuid },
    Failed { message: String },
    Skipped { reason: SkipReason },
}

/// Executes generation requests claimed by one instance.
#[derive(Clone)]
pub struct DocumentGenerationExecutor {
    dal: DAL,
    instance_id: String,
    resolver: Arc<dyn VersionResolver>,
    themes: Arc<dyn ThemeProvider>,
    renderer: Arc<dyn DocumentRenderer>,
    max_document_size: usize,
}

impl DocumentGenerationExecutor {
    pub fn new(
        dal: DAL,
        instance_id: impl Into<String>,
        resolver: Arc<dyn VersionResolver>,
        themes: Arc<dyn ThemeProvider>,
        renderer: Arc<dyn DocumentRenderer>,
        max_document_size: usize,
    ) -> Self {
        Self {
            dal,
            instance_id: instance_id.into(),
            resolver,
            themes,
            renderer,
            max_document_size,
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn max_document_size(&self) -> usize {
        self.max_document_size
    }

    /// Executes a claimed request and records its terminal state.
    pub async fn execute(&self, request: &GenerationRequest) -> ExecutionOutcome {
        let span = info_span!(
            "generate_document",
            request_id = %request.id,
            batch_id = ?request.batch_id.map(|b| b.to_string()),
            instance_id = %self.instance_id,
        );

        async move {
            match self.check_still_owned(request).await {
                Ok(None) => {}
                Ok(Some(reason)) => {
                    debug!(?reason, "Skipping request");
                    counter!("folio_jobs_skipped_total").increment(1);
                    return ExecutionOutcome::Skipped { reason };
                }
                Err(e) => return self.fail(request, GenerationError::Store(e)).await,
            }

            let outcome = match self.generate(request).await {
                Ok(Some(document)) => {
                    info!(document_id = %document.id, size = document.size_bytes, "Document generated");
                    counter!("folio_jobs_completed_total").increment(1);
                    ExecutionOutcome::Completed {
                        document_id: document.id,
                    }
                }
                Ok(None) => {
                    warn!("Request changed state during rendering; result discarded");
                    counter!("folio_jobs_skipped_total").increment(1);
                    return ExecutionOutcome::Skipped {
                        reason: SkipReason::NotOwned,
                    };
                }
                Err(e) => return self.fail(request, e).await,
            };

            self.update_batch(request).await;
            outcome
        }
        .instrument(span)
        .await
    }

    /// Marks a claimed request FAILED and updates its batch.
    ///
    /// Used for failures inside the pipeline and by the poller when a worker
    /// panics. A row that is no longer owned is left alone.
    pub async fn fail(&self, request: &GenerationRequest, err: GenerationError) -> ExecutionOutcome {
        let message = err.to_string();
        warn!(request_id = %request.id, error = %message, "Document generation failed");

        match self
            .dal
            .generation_request()
            .mark_failed(request.id, &self.instance_id, &message)
            .await
        {
            Ok(true) => {
                counter!("folio_jobs_failed_total").increment(1);
                self.update_batch(request).await;
                ExecutionOutcome::Failed { message }
            }
            Ok(false) => {
                debug!(request_id = %request.id, "Failure not recorded: request no longer owned");
                counter!("folio_jobs_skipped_total").increment(1);
                ExecutionOutcome::Skipped {
                    reason: SkipReason::NotOwned,
                }
            }
            Err(store_err) => {
                // The stale reaper will return the row to PENDING.
                error!(request_id = %request.id, error = %store_err, "Unable to record failure");
                counter!("folio_jobs_failed_total").increment(1);
                ExecutionOutcome::Failed { message }
            }
        }
    }

    async fn check_still_owned(
        &self,
        request: &GenerationRequest,
    ) -> Result<Option<SkipReason>, ValidationError> {
        let current = self.dal.generation_request().get_by_id(request.id).await?;
        Ok(match current {
            None => Some(SkipReason::NotFound),
            Some(row) if row.status.is_terminal() => Some(SkipReason::Terminal(row.status)),
            Some(row)
                if row.status != RequestStatus::InProgress
                    || row.claimed_by.as_deref() != Some(self.instance_id.as_str()) =>
            {
                Some(SkipReason::NotOwned)
            }
            Some(_) => None,
        })
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<Option<Document>, GenerationError> {
        let model = self
            .resolver
            .resolve(
                &request.tenant_id,
                &request.template_id,
                &request.variant_id,
                &request.target,
            )
            .await?;
        debug!(version_id = %model.version_id, "Resolved template version");

        let theme = self.themes.template_theme(&model).await?;
        let fallback_theme = self.themes.tenant_fallback_theme(&request.tenant_id).await?;

        let content = self
            .renderer
            .render(RenderInput {
                model: &model,
                data: &request.data,
                theme: theme.as_ref(),
                fallback_theme: fallback_theme.as_ref(),
            })
            .await?;

        check_document_size(content.len(), self.max_document_size)?;

        let document = NewDocument {
            tenant_id: request.tenant_id.clone(),
            filename: request.output_filename(),
            content_type: PDF_CONTENT_TYPE.to_string(),
            content,
            correlation_id: request.correlation_id.clone(),
            expires_at: request.expires_at,
        };

        Ok(self
            .dal
            .generation_request()
            .complete_with_document(request.id, &self.instance_id, document)
            .await?)
    }

    async fn update_batch(&self, request: &GenerationRequest) {
        let Some(batch_id) = request.batch_id else {
            return;
        };
        match self.dal.generation_batch().recompute(batch_id).await {
            Ok(Some(batch)) if batch.completed_at.is_some() => {
                info!(
                    batch_id = %batch.id,
                    completed = batch.completed_count,
                    failed = batch.failed_count,
                    status = ?batch.status(),
                    "Batch finished"
                );
            }
            Ok(_) => {}
            Err(e) => error!(batch_id = %batch_id, error = %e, "Failed to recompute batch"),
        }
    }
}

fn check_document_size(size: usize, max: usize) -> Result<(), GenerationError> {
    if size > max {
        return Err(GenerationError::DocumentTooLarge { size, max });
    }
    Ok(())
}
