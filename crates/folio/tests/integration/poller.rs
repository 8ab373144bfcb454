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

//! Poller drain behavior against a real database.

use std::sync::Arc;
use std::time::{Duration, Instant};

use folio::{AdaptiveBatchSizer, BatchSizerConfig, JobPoller, PollerConfig, RequestStatus};
use serde_json::json;
use serial_test::serial;
use tokio::sync::broadcast;

use crate::fixtures::{create_pending, FakeRenderer, TestFixture};

async fn wait_for_completion(dal: &folio::DAL, expected_terminal: i64, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    loop {
        let counts = dal.generation_request().count_by_status().await.unwrap();
        if counts.completed + counts.failed >= expected_terminal {
            return;
        }
        assert!(Instant::now() < deadline, "timed out waiting for jobs: {:?}", counts);
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn test_drain_respects_max_concurrency() {
    let fixture = TestFixture::new().await;
    let dal = fixture.dal();
    create_pending(&dal, 10).await;

    let executor = Arc::new(fixture.executor(
        "node-a",
        FakeRenderer::new().with_delay(Duration::from_millis(80)),
    ));
    let sizer = Arc::new(AdaptiveBatchSizer::new(BatchSizerConfig {
        min_batch_size: 5,
        max_batch_size: 10,
        ..BatchSizerConfig::default()
    }));
    let poller = JobPoller::new(
        dal.clone(),
        executor,
        sizer,
        PollerConfig {
            max_concurrent_jobs: 3,
            poll_interval: Duration::from_secs(60),
        },
    );
    let activity = poller.activity();
    let drain = poller.drain_handle();

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let handle = tokio::spawn(poller.run(shutdown_rx));
    drain.request_drain();

    let deadline = Instant::now() + Duration::from_secs(20);
    let mut peak = 0;
    loop {
        peak = peak.max(activity.active_jobs());
        let counts = dal.generation_request().count_by_status().await.unwrap();
        assert!(counts.in_progress <= 3, "too many claimed: {:?}", counts);
        if counts.completed == 10 {
            break;
        }
        assert!(Instant::now() < deadline, "jobs did not finish: {:?}", counts);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(peak <= 3);
    assert!(peak >= 1);

    shutdown_tx.send(()).unwrap();
    handle.await.unwrap();
    assert!(activity.wait_idle(Duration::from_secs(5)).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
async fn test_fast_jobs_grow_batch_size() {
    let fixture = TestFixture::new().await;
    let dal = fixture.dal();
    create_pending(&dal, 12).await;

    let executor = Arc::new(fixture.executor("node-a", FakeRenderer::new()));
    let sizer = Arc::new(AdaptiveBatchSizer::new(BatchSizerConfig::default()));
    let mut poller = JobPoller::new(
        dal.clone(),
        executor,
        Arc::clone(&sizer),
        PollerConfig {
            max_concurrent_jobs: 4,
            poll_interval: Duration::from_secs(60),
        },
    );
    assert_eq!(sizer.current_batch_size(), 1);

    let activity = poller.activity();
    poller.drain().await;
    assert!(activity.wait_idle(Duration::from_secs(10)).await);
    for _ in 0..20 {
        poller.drain().await;
        assert!(activity.wait_idle(Duration::from_secs(10)).await);
    }

    wait_for_completion(&dal, 12, Duration::from_secs(10)).await;
    assert!(sizer.current_batch_size() > 1);
    assert!(sizer.ema_ms().unwrap() < 1000.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
async fn test_worker_panic_marks_request_failed() {
    let fixture = TestFixture::new().await;
    let dal = fixture.dal();
    let request = dal
        .generation_request()
        .create(
            folio::NewGenerationRequest::for_version("acme", "invoice", "default", "v1", json!({ "panic": true })),
            None,
            None,
        )
        .await
        .unwrap();
    create_pending(&dal, 1).await;

    let executor = Arc::new(fixture.executor("node-a", FakeRenderer::new()));
    let sizer = Arc::new(AdaptiveBatchSizer::new(BatchSizerConfig::default()));
    let poller = JobPoller::new(
        dal.clone(),
        executor,
        sizer,
        PollerConfig {
            max_concurrent_jobs: 2,
            poll_interval: Duration::from_millis(50),
        },
    );
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let handle = tokio::spawn(poller.run(shutdown_rx));

    wait_for_completion(&dal, 2, Duration::from_secs(10)).await;

    let row = dal.generation_request().get_by_id(request.id).await.unwrap().unwrap();
    assert_eq!(row.status, RequestStatus::Failed);
    assert!(row.error_message.unwrap().contains("renderer exploded"));

    let counts = dal.generation_request().count_by_status().await.unwrap();
    assert_eq!(counts.completed, 1);

    shutdown_tx.send(()).unwrap();
    handle.await.unwrap();
}
