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

//! Implementation of the `admin purge-expired` command.

use anyhow::{Context, Result};
use folio::dal::DAL;
use folio::{GenerationRunnerConfig, UniversalTimestamp};
use tracing::info;

pub async fn run(database_url: &str, config: &GenerationRunnerConfig, dry_run: bool) -> Result<()> {
    let database = super::connect(database_url, config)?;
    let dal = DAL::new(database);
    let now = UniversalTimestamp::now();

    if dry_run {
        let count = dal
            .generation_request()
            .count_expired(now)
            .await
            .context("Failed to count expired requests")?;

        if count == 0 {
            info!("No expired requests found");
        } else {
            info!("[DRY RUN] Would delete {} expired request(s) and their documents", count);
        }
    } else {
        let purged = dal
            .generation_request()
            .purge_expired(now)
            .await
            .context("Failed to purge expired requests")?;

        if purged.requests == 0 {
            info!("No expired requests found");
        } else {
            info!(
                "Deleted {} request(s), {} document(s) and {} batch(es)",
                purged.requests, purged.documents, purged.batches
            );
        }
    }

    Ok(())
}
