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

//! Job poller: the per-instance claim/dispatch orchestrator.
//!
//! The poller owns a single drain loop, so claiming is serialized within an
//! instance while job execution fans out to spawned workers. A drain is
//! triggered by:
//! - the fallback scheduler tick (`poll_interval`)
//! - any worker finishing a job
//! - an explicit [`DrainHandle::request_drain`], e.g. after a submission
//!
//! Drain requests travel over a channel of capacity one. Requests made while
//! one is already pending collapse into it, so a burst of completions causes
//! at most one extra drain.
//!
//! ```rust,ignore
//! let poller = JobPoller::new(dal, executor, sizer, PollerConfig::default());
//! let drain = poller.drain_handle();
//! tokio::spawn(poller.run(shutdown_rx));
//! drain.request_drain();
//! ```

pub mod batch_sizer;

pub use batch_sizer::{AdaptiveBatchSizer, BatchSizerConfig, EMA_ALPHA};

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use metrics::{counter, gauge};
use tokio::sync::{broadcast, mpsc, Semaphore};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::dal::DAL;
use crate::error::{GenerationError, ValidationError};
use crate::executor::DocumentGenerationExecutor;
use crate::models::GenerationRequest;

/// Poller tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    /// Upper bound on jobs executing at once on this instance
    pub max_concurrent_jobs: usize,
    /// Fallback interval between drains when nothing else triggers one
    pub poll_interval: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 8,
            poll_interval: Duration::from_millis(5000),
        }
    }
}

/// Cloneable handle used to ask the poller for a drain.
#[derive(Debug, Clone)]
pub struct DrainHandle {
    tx: mpsc::Sender<()>,
}

impl DrainHandle {
    /// Requests a drain. Never blocks; coalesces with any pending request.
    pub fn request_drain(&self) {
        match self.tx.try_send(()) {
            Ok(()) | Err(mpsc::error::TrySendError::Full(())) => {}
            Err(mpsc::error::TrySendError::Closed(())) => {
                debug!("Drain requested after poller stopped");
            }
        }
    }
}

/// Read-only view of the poller's in-flight work.
#[derive(Debug, Clone)]
pub struct PollerActivity {
    active_jobs: Arc<AtomicUsize>,
}

impl PollerActivity {
    pub fn active_jobs(&self) -> usize {
        self.active_jobs.load(Ordering::Acquire)
    }

    /// Waits until no jobs are in flight. Returns `false` on timeout.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.active_jobs() > 0 {
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        true
    }
}

pub struct JobPoller {
    dal: DAL,
    executor: Arc<DocumentGenerationExecutor>,
    sizer: Arc<AdaptiveBatchSizer>,
    config: PollerConfig,
    active_jobs: Arc<AtomicUsize>,
    permits: Arc<Semaphore>,
    drain_tx: mpsc::Sender<()>,
    drain_rx: mpsc::Receiver<()>,
}

impl JobPoller {
    pub fn new(
        dal: DAL,
        executor: Arc<DocumentGenerationExecutor>,
        sizer: Arc<AdaptiveBatchSizer>,
        config: PollerConfig,
    ) -> Self {
        let max = config.max_concurrent_jobs.max(1);
        let (drain_tx, drain_rx) = mpsc::channel(1);
        Self {
            dal,
            executor,
            sizer,
            config: PollerConfig {
                max_concurrent_jobs: max,
                ..config
            },
            active_jobs: Arc::new(AtomicUsize::new(0)),
            permits: Arc::new(Semaphore::new(max)),
            drain_tx,
            drain_rx,
        }
    }

    pub fn drain_handle(&self) -> DrainHandle {
        DrainHandle {
            tx: self.drain_tx.clone(),
        }
    }

    pub fn activity(&self) -> PollerActivity {
        PollerActivity {
            active_jobs: Arc::clone(&self.active_jobs),
        }
    }

    pub fn sizer(&self) -> &Arc<AdaptiveBatchSizer> {
        &self.sizer
    }

    /// Runs the drain loop until a shutdown signal arrives.
    ///
    /// Jobs already dispatched keep running after this returns; use
    /// [`PollerActivity::wait_idle`] to wait for them.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            instance_id = %self.executor.instance_id(),
            max_concurrent_jobs = self.config.max_concurrent_jobs,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "Job poller started"
        );

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Job poller received shutdown signal");
                    break;
                }
                _ = ticker.tick() => {}
                Some(()) = self.drain_rx.recv() => {}
            }
            self.drain().await;
        }
    }

    /// Drains until capacity or work runs out, repeating while further drains
    /// were requested in the meantime.
    pub async fn drain(&mut self) {
        loop {
            while self.drain_rx.try_recv().is_ok() {}

            if let Err(e) = self.drain_once().await {
                warn!(error = %e, "Claim failed; retrying on next poll");
                return;
            }

            if self.drain_rx.try_recv().is_err() {
                return;
            }
        }
    }

    async fn drain_once(&self) -> Result<usize, ValidationError> {
        let max = self.config.max_concurrent_jobs;
        let mut dispatched = 0;

        loop {
            let active = self.active_jobs.load(Ordering::Acquire);
            if active >= max {
                break;
            }
            let claim = self.sizer.current_batch_size().min(max - active);
            if claim == 0 {
                break;
            }

            let requests = self
                .dal
                .generation_request()
                .claim(claim, self.executor.instance_id())
                .await?;
            if requests.is_empty() {
                break;
            }

            debug!(claimed = requests.len(), requested = claim, "Claimed requests");
            counter!("folio_jobs_claimed_total").increment(requests.len() as u64);

            for request in requests {
                self.dispatch(request).await;
                dispatched += 1;
            }
        }

        Ok(dispatched)
    }

    async fn dispatch(&self, request: GenerationRequest) {
        let permit = match Arc::clone(&self.permits).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                error!(request_id = %request.id, "Worker pool closed; leaving request for recovery");
                return;
            }
        };

        let active = self.active_jobs.fetch_add(1, Ordering::AcqRel) + 1;
        gauge!("folio_active_jobs").set(active as f64);

        let executor = Arc::clone(&self.executor);
        let sizer = Arc::clone(&self.sizer);
        let active_jobs = Arc::clone(&self.active_jobs);
        let drain = self.drain_handle();

        tokio::spawn(async move {
            let started = Instant::now();

            let result = AssertUnwindSafe(executor.execute(&request))
                .catch_unwind()
                .await;
            if let Err(panic) = result {
                let message = panic_message(panic.as_ref());
                error!(request_id = %request.id, panic = %message, "Worker panicked");
                executor
                    .fail(&request, GenerationError::Panicked(message))
                    .await;
            }

            sizer.record_completion(started.elapsed());
            drop(permit);
            let remaining = active_jobs.fetch_sub(1, Ordering::AcqRel) - 1;
            gauge!("folio_active_jobs").set(remaining as f64);
            drain.request_drain();
        });
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
