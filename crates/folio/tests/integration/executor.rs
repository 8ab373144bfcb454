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

//! Executor pipeline: resolve, render, size check, persist.

use folio::{ExecutionOutcome, NewGenerationRequest, RequestStatus, SkipReason, PDF_CONTENT_TYPE};
use serde_json::json;
use serial_test::serial;

use crate::fixtures::{new_request, FakeRenderer, TestFixture};

async fn claim_one(
    dal: &folio::DAL,
    request: NewGenerationRequest,
    instance: &str,
) -> folio::GenerationRequest {
    let created = dal.generation_request().create(request, None, None).await.unwrap();
    dal.generation_request()
        .claim_by_id(created.id, instance)
        .await
        .unwrap()
        .expect("request should be claimable")
}

#[tokio::test]
#[serial]
async fn test_successful_generation_stores_document() {
    let fixture = TestFixture::new().await;
    let dal = fixture.dal();
    let request = claim_one(
        &dal,
        new_request("invoice").with_correlation_id("order-17"),
        "node-a",
    )
    .await;

    let executor = fixture.executor("node-a", FakeRenderer::new().with_size(2048));
    let outcome = executor.execute(&request).await;
    let ExecutionOutcome::Completed { document_id } = outcome else {
        panic!("expected completion, got {:?}", outcome);
    };

    let row = dal.generation_request().get_by_id(request.id).await.unwrap().unwrap();
    assert_eq!(row.status, RequestStatus::Completed);
    assert_eq!(row.document_id, Some(document_id));
    assert!(row.completed_at.is_some());
    assert!(row.error_message.is_none());

    let document = dal.document().get_by_id(document_id).await.unwrap().unwrap();
    assert_eq!(document.request_id, request.id);
    assert_eq!(document.tenant_id, "acme");
    assert_eq!(document.content_type, PDF_CONTENT_TYPE);
    assert_eq!(document.size_bytes, 2048);
    assert_eq!(document.content.len(), 2048);
    assert!(document.content.starts_with(b"%PDF"));
    assert_eq!(document.correlation_id.as_deref(), Some("order-17"));
    assert_eq!(document.filename, format!("invoice-{}.pdf", request.id));
}

#[tokio::test]
#[serial]
async fn test_custom_filename_and_environment_target() {
    let fixture = TestFixture::new().await;
    let dal = fixture.dal();
    let request = claim_one(
        &dal,
        NewGenerationRequest::for_environment("acme", "letter", "default", "production", json!({}))
            .with_filename("welcome.pdf"),
        "node-a",
    )
    .await;

    let outcome = fixture
        .executor("node-a", FakeRenderer::new())
        .execute(&request)
        .await;
    let ExecutionOutcome::Completed { document_id } = outcome else {
        panic!("expected completion, got {:?}", outcome);
    };
    let document = dal.document().get_by_id(document_id).await.unwrap().unwrap();
    assert_eq!(document.filename, "welcome.pdf");
}

#[tokio::test]
#[serial]
async fn test_render_failure_marks_failed() {
    let fixture = TestFixture::new().await;
    let dal = fixture.dal();
    let request = claim_one(
        &dal,
        NewGenerationRequest::for_version("acme", "invoice", "default", "v1", json!({ "fail": true })),
        "node-a",
    )
    .await;

    let outcome = fixture
        .executor("node-a", FakeRenderer::new())
        .execute(&request)
        .await;
    assert!(matches!(outcome, ExecutionOutcome::Failed { .. }));

    let row = dal.generation_request().get_by_id(request.id).await.unwrap().unwrap();
    assert_eq!(row.status, RequestStatus::Failed);
    assert!(row.error_message.unwrap().contains("layout overflow"));
    assert!(row.completed_at.is_some());
    assert!(row.document_id.is_none());
}

#[tokio::test]
#[serial]
async fn test_resolution_failures_mark_failed() {
    let fixture = TestFixture::new().await;
    let dal = fixture.dal();
    let executor = fixture.executor("node-a", FakeRenderer::new());

    let missing = claim_one(&dal, new_request("missing"), "node-a").await;
    executor.execute(&missing).await;
    let row = dal.generation_request().get_by_id(missing.id).await.unwrap().unwrap();
    assert_eq!(row.status, RequestStatus::Failed);
    assert!(row.error_message.unwrap().contains("Template 'missing' not found"));

    let ghost = claim_one(
        &dal,
        NewGenerationRequest::for_version("ghost", "invoice", "default", "v1", json!({})),
        "node-a",
    )
    .await;
    executor.execute(&ghost).await;
    let row = dal.generation_request().get_by_id(ghost.id).await.unwrap().unwrap();
    assert_eq!(row.status, RequestStatus::Failed);
    assert!(row.error_message.unwrap().contains("Tenant not found"));
}

#[tokio::test]
#[serial]
async fn test_oversized_document_fails() {
    let fixture = TestFixture::new().await;
    let dal = fixture.dal();
    let request = claim_one(&dal, new_request("invoice"), "node-a").await;

    let executor = fixture.executor_with_limit("node-a", FakeRenderer::new().with_size(4096), 1024);
    let outcome = executor.execute(&request).await;
    let ExecutionOutcome::Failed { message } = &outcome else {
        panic!("expected failure, got {:?}", outcome);
    };
    assert!(message.contains("exceeds maximum"));

    let row = dal.generation_request().get_by_id(request.id).await.unwrap().unwrap();
    assert_eq!(row.status, RequestStatus::Failed);
    assert!(dal.document().list_by_request(request.id).await.unwrap().is_empty());
}

#[tokio::test]
#[serial]
async fn test_terminal_request_is_not_executed_again() {
    let fixture = TestFixture::new().await;
    let dal = fixture.dal();
    let request = claim_one(&dal, new_request("invoice"), "node-a").await;
    let executor = fixture.executor("node-a", FakeRenderer::new());

    assert!(matches!(
        executor.execute(&request).await,
        ExecutionOutcome::Completed { .. }
    ));
    let first = dal.generation_request().get_by_id(request.id).await.unwrap().unwrap();

    let second = executor.execute(&request).await;
    assert_eq!(
        second,
        ExecutionOutcome::Skipped {
            reason: SkipReason::Terminal(RequestStatus::Completed)
        }
    );

    let after = dal.generation_request().get_by_id(request.id).await.unwrap().unwrap();
    assert_eq!(after.completed_at, first.completed_at);
    assert_eq!(after.document_id, first.document_id);
    assert_eq!(dal.document().list_by_request(request.id).await.unwrap().len(), 1);

    // A terminal row cannot be failed or cancelled afterwards either.
    assert!(!dal
        .generation_request()
        .mark_failed(request.id, "node-a", "late failure")
        .await
        .unwrap());
    assert!(!dal.generation_request().cancel(request.id).await.unwrap());
}

#[tokio::test]
#[serial]
async fn test_cancelled_request_is_skipped() {
    let fixture = TestFixture::new().await;
    let dal = fixture.dal();
    let request = claim_one(&dal, new_request("invoice"), "node-a").await;

    assert!(dal.generation_request().cancel(request.id).await.unwrap());

    let outcome = fixture
        .executor("node-a", FakeRenderer::new())
        .execute(&request)
        .await;
    assert_eq!(
        outcome,
        ExecutionOutcome::Skipped {
            reason: SkipReason::Terminal(RequestStatus::Cancelled)
        }
    );
    assert!(dal.document().list_by_request(request.id).await.unwrap().is_empty());
}

#[tokio::test]
#[serial]
async fn test_request_owned_elsewhere_is_skipped() {
    let fixture = TestFixture::new().await;
    let dal = fixture.dal();
    let request = claim_one(&dal, new_request("invoice"), "node-a").await;

    let outcome = fixture
        .executor("node-b", FakeRenderer::new())
        .execute(&request)
        .await;
    assert_eq!(
        outcome,
        ExecutionOutcome::Skipped {
            reason: SkipReason::NotOwned
        }
    );

    let row = dal.generation_request().get_by_id(request.id).await.unwrap().unwrap();
    assert_eq!(row.status, RequestStatus::InProgress);
}

#[tokio::test]
#[serial]
async fn test_long_error_messages_are_truncated() {
    let fixture = TestFixture::new().await;
    let dal = fixture.dal();
    let request = claim_one(&dal, new_request("invoice"), "node-a").await;

    let long = "x".repeat(5000);
    assert!(dal
        .generation_request()
        .mark_failed(request.id, "node-a", &long)
        .await
        .unwrap());
    let row = dal.generation_request().get_by_id(request.id).await.unwrap().unwrap();
    assert!(row.error_message.unwrap().chars().count() <= folio::error::MAX_ERROR_MESSAGE_LENGTH);
}
