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

//! Stale claim recovery.

use std::time::Duration;

use folio::{RequestStatus, StaleJobRecovery, UniversalTimestamp};
use serial_test::serial;

use crate::fixtures::{create_pending, FakeRenderer, TestFixture};

fn later(by: Duration) -> UniversalTimestamp {
    UniversalTimestamp(UniversalTimestamp::now().into_inner() + chrono::Duration::from_std(by).unwrap())
}

#[tokio::test]
#[serial]
async fn test_recovery_waits_for_timeout() {
    let fixture = TestFixture::new().await;
    let dal = fixture.dal();
    create_pending(&dal, 2).await;
    let claimed = dal.generation_request().claim(2, "crashed-node").await.unwrap();
    assert_eq!(claimed.len(), 2);

    let recovery = StaleJobRecovery::new(dal.clone(), Duration::from_secs(600), Duration::from_secs(60));

    let early = recovery.recover_at(later(Duration::from_secs(300))).await.unwrap();
    assert!(early.is_empty());

    let recovered = recovery.recover_at(later(Duration::from_secs(601))).await.unwrap();
    assert_eq!(recovered.len(), 2);

    for request in &claimed {
        let row = dal.generation_request().get_by_id(request.id).await.unwrap().unwrap();
        assert_eq!(row.status, RequestStatus::Pending);
        assert!(row.claimed_by.is_none());
        assert!(row.claimed_at.is_none());
        assert!(row.started_at.is_none());
    }

    let reclaimed = dal.generation_request().claim(5, "healthy-node").await.unwrap();
    assert_eq!(reclaimed.len(), 2);
}

#[tokio::test]
#[serial]
async fn test_recovery_leaves_other_states_alone() {
    let fixture = TestFixture::new().await;
    let dal = fixture.dal();
    let created = create_pending(&dal, 3).await;

    // One completes, one stays pending, one is stuck.
    let claimed = dal.generation_request().claim(2, "node-a").await.unwrap();
    let executor = fixture.executor("node-a", FakeRenderer::new());
    executor.execute(&claimed[0]).await;

    let recovery = StaleJobRecovery::new(dal.clone(), Duration::from_secs(60), Duration::from_secs(60));
    let recovered = recovery.recover_at(later(Duration::from_secs(3600))).await.unwrap();
    assert_eq!(recovered, vec![claimed[1].id]);

    let done = dal.generation_request().get_by_id(created[0].id).await.unwrap().unwrap();
    assert_eq!(done.status, RequestStatus::Completed);
    let pending = dal.generation_request().get_by_id(created[2].id).await.unwrap().unwrap();
    assert_eq!(pending.status, RequestStatus::Pending);
}

#[tokio::test]
#[serial]
async fn test_late_completion_after_recovery_is_discarded() {
    let fixture = TestFixture::new().await;
    let dal = fixture.dal();
    create_pending(&dal, 1).await;

    let claimed = dal.generation_request().claim(1, "slow-node").await.unwrap();
    let recovery = StaleJobRecovery::new(dal.clone(), Duration::from_secs(60), Duration::from_secs(60));
    recovery.recover_at(later(Duration::from_secs(120))).await.unwrap();
    let reclaimed = dal.generation_request().claim(1, "fast-node").await.unwrap();
    assert_eq!(reclaimed.len(), 1);

    let slow = fixture.executor("slow-node", FakeRenderer::new());
    let outcome = slow.execute(&claimed[0]).await;
    assert!(matches!(outcome, folio::ExecutionOutcome::Skipped { .. }));

    let row = dal.generation_request().get_by_id(claimed[0].id).await.unwrap().unwrap();
    assert_eq!(row.status, RequestStatus::InProgress);
    assert_eq!(row.claimed_by.as_deref(), Some("fast-node"));
    assert!(dal.document().list_by_request(row.id).await.unwrap().is_empty());
}
