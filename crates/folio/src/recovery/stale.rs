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

//! Stale job recovery.
//!
//! An instance that dies mid-job leaves its rows IN_PROGRESS forever; nothing
//! on that instance will ever finish them. The reaper runs on its own timer
//! on every instance and returns any row claimed longer than `stale_timeout`
//! ago to PENDING, where the next claim picks it up from scratch.
//!
//! The reaper does no cancellation checks and no batch accounting. Both are
//! redone by the executor when the row is claimed again.

use std::time::Duration;

use metrics::counter;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::dal::DAL;
use crate::database::universal_types::{UniversalTimestamp, UniversalUuid};
use crate::error::ValidationError;

#[derive(Clone)]
pub struct StaleJobRecovery {
    dal: DAL,
    stale_timeout: Duration,
    check_interval: Duration,
}

impl StaleJobRecovery {
    pub fn new(dal: DAL, stale_timeout: Duration, check_interval: Duration) -> Self {
        Self {
            dal,
            stale_timeout,
            check_interval,
        }
    }

    pub fn stale_timeout(&self) -> Duration {
        self.stale_timeout
    }

    /// One recovery pass against the current time.
    pub async fn recover(&self) -> Result<Vec<UniversalUuid>, ValidationError> {
        self.recover_at(UniversalTimestamp::now()).await
    }

    /// One recovery pass as if it were `now`: rows claimed strictly before
    /// `now - stale_timeout` are reset.
    pub async fn recover_at(
        &self,
        now: UniversalTimestamp,
    ) -> Result<Vec<UniversalUuid>, ValidationError> {
        let Some(cutoff) = stale_cutoff(now, self.stale_timeout) else {
            return Ok(Vec::new());
        };

        let recovered = self.dal.generation_request().reset_stale(cutoff).await?;
        if recovered.is_empty() {
            debug!(cutoff = %cutoff, "No stale requests found");
        } else {
            counter!("folio_stale_jobs_recovered_total").increment(recovered.len() as u64);
            for id in &recovered {
                info!(request_id = %id, "Recovered stale request");
            }
            warn!(
                count = recovered.len(),
                timeout_secs = self.stale_timeout.as_secs(),
                "Reset stale requests to PENDING"
            );
        }
        Ok(recovered)
    }

    /// Runs recovery at a fixed rate until shutdown.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            timeout_secs = self.stale_timeout.as_secs(),
            interval_secs = self.check_interval.as_secs(),
            "Stale job recovery started"
        );

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Stale job recovery received shutdown signal");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.recover().await {
                        warn!(error = %e, "Stale job recovery pass failed");
                    }
                }
            }
        }
    }
}

/// `now - timeout`, or `None` if the timeout does not fit in a timestamp.
fn stale_cutoff(now: UniversalTimestamp, timeout: Duration) -> Option<UniversalTimestamp> {
    let timeout = chrono::Duration::from_std(timeout).ok()?;
    now.into_inner()
        .checked_sub_signed(timeout)
        .map(UniversalTimestamp)
}
