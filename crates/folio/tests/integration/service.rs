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

//! Submission validation and job-created hooks.

use std::sync::Arc;
use std::time::Duration;

use folio::service::{InlineExecutionHook, PollerWakeHook};
use folio::{
    AdaptiveBatchSizer, BatchSizerConfig, GenerationService, JobPoller, NewGenerationRequest,
    PollerConfig, RequestStatus, SubmissionError,
};
use serde_json::json;
use serial_test::serial;
use tokio::sync::broadcast;

use crate::fixtures::{new_request, FakeRenderer, TestFixture};

#[tokio::test]
#[serial]
async fn test_submit_rejects_ambiguous_target() {
    let fixture = TestFixture::new().await;
    let service = GenerationService::new(fixture.dal(), 30);

    let mut both = new_request("invoice");
    both.environment_id = Some("production".to_string());
    assert!(matches!(
        service.submit(both).await,
        Err(SubmissionError::AmbiguousTarget { index: 0 })
    ));

    let mut neither = new_request("invoice");
    neither.version_id = None;
    assert!(matches!(
        service.submit(neither).await,
        Err(SubmissionError::AmbiguousTarget { .. })
    ));

    let counts = fixture.dal().generation_request().count_by_status().await.unwrap();
    assert_eq!(counts.total(), 0);
}

#[tokio::test]
#[serial]
async fn test_submit_sets_expiry_from_retention() {
    let fixture = TestFixture::new().await;
    let dal = fixture.dal();

    let kept = GenerationService::new(dal.clone(), 30)
        .submit(new_request("invoice"))
        .await
        .unwrap();
    assert_eq!(kept.status, RequestStatus::Pending);
    let expires = kept.expires_at.expect("expiry should be set").into_inner();
    let days = (expires - kept.created_at.into_inner()).num_days();
    assert!((29..=30).contains(&days));

    let forever = GenerationService::new(dal.clone(), 0)
        .submit(new_request("invoice"))
        .await
        .unwrap();
    assert!(forever.expires_at.is_none());
}

#[tokio::test]
#[serial]
async fn test_submit_batch_validation() {
    let fixture = TestFixture::new().await;
    let service = GenerationService::new(fixture.dal(), 30);

    assert!(matches!(
        service.submit_batch("acme", Vec::new()).await,
        Err(SubmissionError::EmptyBatch)
    ));

    let foreign = NewGenerationRequest::for_version("globex", "invoice", "default", "v1", json!({}));
    assert!(matches!(
        service
            .submit_batch("acme", vec![new_request("a"), foreign])
            .await,
        Err(SubmissionError::TenantMismatch { index: 1, .. })
    ));

    let duplicated = vec![
        new_request("a").with_correlation_id("dup"),
        new_request("b").with_correlation_id("dup"),
    ];
    assert!(matches!(
        service.submit_batch("acme", duplicated).await,
        Err(SubmissionError::DuplicateCorrelationId { .. })
    ));

    let mut ambiguous = new_request("c");
    ambiguous.version_id = None;
    assert!(matches!(
        service
            .submit_batch("acme", vec![new_request("a"), ambiguous])
            .await,
        Err(SubmissionError::AmbiguousTarget { index: 1 })
    ));

    // Nothing from the rejected batches was written.
    let counts = fixture.dal().generation_request().count_by_status().await.unwrap();
    assert_eq!(counts.total(), 0);
}

#[tokio::test]
#[serial]
async fn test_cancel_pending_request() {
    let fixture = TestFixture::new().await;
    let dal = fixture.dal();
    let service = GenerationService::new(dal.clone(), 30);
    let request = service.submit(new_request("invoice")).await.unwrap();

    assert!(service.cancel(request.id).await.unwrap());
    assert!(!service.cancel(request.id).await.unwrap());
    assert!(!service.cancel(folio::UniversalUuid::new_v4()).await.unwrap());

    let row = dal.generation_request().get_by_id(request.id).await.unwrap().unwrap();
    assert_eq!(row.status, RequestStatus::Cancelled);
    assert!(row.completed_at.is_some());
    assert!(dal.generation_request().claim(5, "node-a").await.unwrap().is_empty());
}

#[tokio::test]
#[serial]
async fn test_inline_hook_executes_before_returning() {
    let fixture = TestFixture::new().await;
    let dal = fixture.dal();
    let executor = Arc::new(fixture.executor("inline", FakeRenderer::new()));
    let service = GenerationService::new(dal.clone(), 30)
        .with_hook(Arc::new(InlineExecutionHook::new(dal.clone(), executor)));

    let submitted = service.submit(new_request("invoice")).await.unwrap();
    let row = dal.generation_request().get_by_id(submitted.id).await.unwrap().unwrap();
    assert_eq!(row.status, RequestStatus::Completed);
    assert_eq!(row.claimed_by.as_deref(), Some("inline"));

    let (batch, _) = service
        .submit_batch(
            "acme",
            vec![
                new_request("a"),
                NewGenerationRequest::for_version("acme", "b", "default", "v1", json!({ "panic": true })),
            ],
        )
        .await
        .unwrap();
    let finished = dal.generation_batch().get_by_id(batch.id).await.unwrap().unwrap();
    assert!(finished.completed_at.is_some());
    assert_eq!(finished.completed_count, 1);
    assert_eq!(finished.failed_count, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
async fn test_wake_hook_triggers_drain() {
    let fixture = TestFixture::new().await;
    let dal = fixture.dal();
    let executor = Arc::new(fixture.executor("node-a", FakeRenderer::new()));
    let poller = JobPoller::new(
        dal.clone(),
        executor,
        Arc::new(AdaptiveBatchSizer::new(BatchSizerConfig::default())),
        PollerConfig {
            max_concurrent_jobs: 2,
            poll_interval: Duration::from_secs(3600),
        },
    );
    let service = GenerationService::new(dal.clone(), 30)
        .with_hook(Arc::new(PollerWakeHook::new(poller.drain_handle())));

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let handle = tokio::spawn(poller.run(shutdown_rx));
    // Let the immediate first tick pass so only the hook can trigger a drain.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let submitted = service.submit(new_request("invoice")).await.unwrap();

    let mut status = RequestStatus::Pending;
    for _ in 0..200 {
        status = dal
            .generation_request()
            .get_by_id(submitted.id)
            .await
            .unwrap()
            .unwrap()
            .status;
        if status == RequestStatus::Completed {
            break;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    assert_eq!(status, RequestStatus::Completed);

    shutdown_tx.send(()).unwrap();
    handle.await.unwrap();
}
