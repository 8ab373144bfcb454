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

//! Retention purge and status counting.

use folio::{GenerationService, RequestStatus, UniversalTimestamp};
use serial_test::serial;

use crate::fixtures::{new_request, FakeRenderer, TestFixture};

fn days_from_now(days: i64) -> UniversalTimestamp {
    UniversalTimestamp(UniversalTimestamp::now().into_inner() + chrono::Duration::days(days))
}

#[tokio::test]
#[serial]
async fn test_count_by_status() {
    let fixture = TestFixture::new().await;
    let dal = fixture.dal();
    let service = GenerationService::new(dal.clone(), 30);

    for i in 0..5 {
        service.submit(new_request(&format!("doc-{}", i))).await.unwrap();
    }
    let claimed = dal.generation_request().claim(3, "node-a").await.unwrap();
    let executor = fixture.executor("node-a", FakeRenderer::new());
    executor.execute(&claimed[0]).await;
    dal.generation_request()
        .mark_failed(claimed[1].id, "node-a", "boom")
        .await
        .unwrap();
    let pending = dal.generation_request().claim_by_id(claimed[2].id, "x").await.unwrap();
    assert!(pending.is_none());

    let counts = dal.generation_request().count_by_status().await.unwrap();
    assert_eq!(counts.pending, 2);
    assert_eq!(counts.in_progress, 1);
    assert_eq!(counts.completed, 1);
    assert_eq!(counts.failed, 1);
    assert_eq!(counts.cancelled, 0);
    assert_eq!(counts.total(), 5);
    assert_eq!(counts.get(RequestStatus::Pending), 2);
}

#[tokio::test]
#[serial]
async fn test_purge_expired_removes_requests_documents_and_batches() {
    let fixture = TestFixture::new().await;
    let dal = fixture.dal();
    let expiring = GenerationService::new(dal.clone(), 1);
    let permanent = GenerationService::new(dal.clone(), 0);

    let (batch, _) = expiring
        .submit_batch("acme", vec![new_request("a"), new_request("b")])
        .await
        .unwrap();
    let kept = permanent.submit(new_request("kept")).await.unwrap();

    let executor = fixture.executor("node-a", FakeRenderer::new());
    for request in dal.generation_request().claim(10, "node-a").await.unwrap() {
        executor.execute(&request).await;
    }
    assert!(dal
        .generation_batch()
        .get_by_id(batch.id)
        .await
        .unwrap()
        .unwrap()
        .completed_at
        .is_some());

    assert_eq!(dal.generation_request().count_expired(UniversalTimestamp::now()).await.unwrap(), 0);
    let later = days_from_now(2);
    assert_eq!(dal.generation_request().count_expired(later).await.unwrap(), 2);

    let purged = dal.generation_request().purge_expired(later).await.unwrap();
    assert_eq!(purged.requests, 2);
    assert_eq!(purged.documents, 2);
    assert_eq!(purged.batches, 1);

    assert!(dal.generation_batch().get_by_id(batch.id).await.unwrap().is_none());
    let survivor = dal.generation_request().get_by_id(kept.id).await.unwrap().unwrap();
    assert_eq!(survivor.status, RequestStatus::Completed);
    assert_eq!(dal.document().list_by_request(kept.id).await.unwrap().len(), 1);

    let again = dal.generation_request().purge_expired(later).await.unwrap();
    assert_eq!(again, folio::PurgeResult::default());
}
