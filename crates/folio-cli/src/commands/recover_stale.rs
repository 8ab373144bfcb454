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

//! Implementation of the `admin recover-stale` command.
//!
//! Runs a single stale-recovery pass, the same one every runner performs on
//! its `stale_check_interval`.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use folio::dal::DAL;
use folio::{GenerationRunnerConfig, StaleJobRecovery};
use tracing::info;

/// Resolves the effective timeout, preferring the command-line override.
fn effective_timeout(config: &GenerationRunnerConfig, timeout_minutes: Option<u64>) -> Result<Duration> {
    match timeout_minutes {
        Some(0) => Err(anyhow!("--timeout-minutes must be greater than zero")),
        Some(minutes) => Ok(Duration::from_secs(minutes.saturating_mul(60))),
        None => Ok(config.stale_timeout()),
    }
}

pub async fn run(
    database_url: &str,
    config: &GenerationRunnerConfig,
    timeout_minutes: Option<u64>,
) -> Result<()> {
    let timeout = effective_timeout(config, timeout_minutes)?;
    let database = super::connect(database_url, config)?;
    let dal = DAL::new(database);

    let recovery = StaleJobRecovery::new(dal, timeout, config.stale_check_interval());
    let recovered = recovery
        .recover()
        .await
        .context("Failed to recover stale requests")?;

    if recovered.is_empty() {
        info!("No requests stuck IN_PROGRESS for more than {} minute(s)", timeout.as_secs() / 60);
    } else {
        info!("Reset {} stale request(s) to PENDING", recovered.len());
    }
    Ok(())
}
