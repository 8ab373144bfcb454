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

//! Batch aggregation as members reach terminal states.

use folio::{BatchStatus, ExecutionOutcome, GenerationService, NewGenerationRequest, RequestStatus};
use serde_json::json;
use serial_test::serial;

use crate::fixtures::{new_request, FakeRenderer, TestFixture};

fn member(index: usize, fail: bool) -> NewGenerationRequest {
    NewGenerationRequest::for_version(
        "acme",
        "statement",
        "default",
        "v2",
        json!({ "row": index, "fail": fail }),
    )
    .with_correlation_id(format!("row-{}", index))
}

#[tokio::test]
#[serial]
async fn test_batch_counts_and_completes_once() {
    let fixture = TestFixture::new().await;
    let dal = fixture.dal();
    let service = GenerationService::new(dal.clone(), 30);

    let members: Vec<_> = (0..5).map(|i| member(i, i >= 3)).collect();
    let (batch, requests) = service.submit_batch("acme", members).await.unwrap();
    assert_eq!(batch.total_count, 5);
    assert_eq!(batch.status(), BatchStatus::InProgress);
    assert_eq!(requests.len(), 5);
    assert!(requests.iter().all(|r| r.batch_id == Some(batch.id)));

    let claimed = dal.generation_request().claim(5, "node-a").await.unwrap();
    assert_eq!(claimed.len(), 5);
    let executor = fixture.executor("node-a", FakeRenderer::new());

    for (i, request) in claimed.iter().enumerate() {
        let outcome = executor.execute(request).await;
        if request.data["fail"] == json!(true) {
            assert!(matches!(outcome, ExecutionOutcome::Failed { .. }));
        } else {
            assert!(matches!(outcome, ExecutionOutcome::Completed { .. }));
        }

        let current = dal.generation_batch().get_by_id(batch.id).await.unwrap().unwrap();
        if i < 4 {
            assert!(current.completed_at.is_none(), "batch finished early after {} members", i + 1);
        } else {
            assert!(current.completed_at.is_some());
        }
    }

    let finished = dal.generation_batch().get_by_id(batch.id).await.unwrap().unwrap();
    assert_eq!(finished.completed_count, 3);
    assert_eq!(finished.failed_count, 2);
    assert_eq!(finished.status(), BatchStatus::Completed);
    let completed_at = finished.completed_at;

    // Recomputing again never moves completed_at.
    let again = dal.generation_batch().recompute(batch.id).await.unwrap().unwrap();
    assert_eq!(again.completed_at, completed_at);
    assert_eq!(again.completed_count, 3);
    assert_eq!(again.failed_count, 2);
}

#[tokio::test]
#[serial]
async fn test_all_failed_batch_is_failed() {
    let fixture = TestFixture::new().await;
    let dal = fixture.dal();
    let service = GenerationService::new(dal.clone(), 0);

    let (batch, _) = service
        .submit_batch("acme", vec![member(0, true), member(1, true)])
        .await
        .unwrap();
    let executor = fixture.executor("node-a", FakeRenderer::new());
    for request in dal.generation_request().claim(2, "node-a").await.unwrap() {
        executor.execute(&request).await;
    }

    let finished = dal.generation_batch().get_by_id(batch.id).await.unwrap().unwrap();
    assert_eq!(finished.failed_count, 2);
    assert_eq!(finished.status(), BatchStatus::Failed);
}

#[tokio::test]
#[serial]
async fn test_cancelled_member_counts_toward_completion() {
    let fixture = TestFixture::new().await;
    let dal = fixture.dal();
    let service = GenerationService::new(dal.clone(), 30);

    let (batch, requests) = service
        .submit_batch("acme", vec![member(0, false), member(1, false)])
        .await
        .unwrap();

    assert!(service.cancel(requests[1].id).await.unwrap());
    let partial = dal.generation_batch().get_by_id(batch.id).await.unwrap().unwrap();
    assert!(partial.completed_at.is_none());

    let claimed = dal.generation_request().claim(5, "node-a").await.unwrap();
    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].id, requests[0].id);
    fixture
        .executor("node-a", FakeRenderer::new())
        .execute(&claimed[0])
        .await;

    let finished = dal.generation_batch().get_by_id(batch.id).await.unwrap().unwrap();
    assert!(finished.completed_at.is_some());
    assert_eq!(finished.completed_count, 1);
    assert_eq!(finished.failed_count, 0);
    assert_eq!(finished.status(), BatchStatus::Completed);

    let cancelled = dal.generation_request().get_by_id(requests[1].id).await.unwrap().unwrap();
    assert_eq!(cancelled.status, RequestStatus::Cancelled);
}

#[tokio::test]
#[serial]
async fn test_batch_members_listed_in_order() {
    let fixture = TestFixture::new().await;
    let dal = fixture.dal();
    let (batch, requests) = dal
        .generation_batch()
        .create_with_requests("acme", vec![new_request("a"), new_request("b")], None)
        .await
        .unwrap();

    let members = dal.generation_batch().members(batch.id).await.unwrap();
    let ids: Vec<_> = members.iter().map(|r| r.id).collect();
    let expected: Vec<_> = requests.iter().map(|r| r.id).collect();
    assert_eq!(ids, expected);
}

#[tokio::test]
#[serial]
async fn test_batch_members_claimed_in_submission_order() {
    let fixture = TestFixture::new().await;
    let dal = fixture.dal();
    let templates: Vec<_> = (0..6).map(|i| new_request(&format!("page-{}", i))).collect();
    let (_, requests) = dal
        .generation_batch()
        .create_with_requests("acme", templates, None)
        .await
        .unwrap();

    for pair in requests.windows(2) {
        assert!(pair[0].created_at < pair[1].created_at);
    }

    let mut claimed = Vec::new();
    for _ in 0..3 {
        let round = dal.generation_request().claim(2, "node-a").await.unwrap();
        assert_eq!(round.len(), 2);
        claimed.extend(round.into_iter().map(|r| r.id));
    }
    let expected: Vec<_> = requests.iter().map(|r| r.id).collect();
    assert_eq!(claimed, expected);
}
