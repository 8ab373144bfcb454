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

//! Implementation of the `admin stats` command.

use anyhow::{Context, Result};
use folio::dal::DAL;
use folio::{GenerationRunnerConfig, RequestStatus, RequestStatusCounts};

fn render(counts: &RequestStatusCounts) -> String {
    let mut out = String::new();
    for status in RequestStatus::ALL {
        out.push_str(&format!("{:<12} {:>10}\n", status.as_str(), counts.get(status)));
    }
    out.push_str(&format!("{:<12} {:>10}\n", "TOTAL", counts.total()));
    out
}

pub async fn run(database_url: &str, config: &GenerationRunnerConfig) -> Result<()> {
    let database = super::connect(database_url, config)?;
    let dal = DAL::new(database);

    let counts = dal
        .generation_request()
        .count_by_status()
        .await
        .context("Failed to count requests")?;

    print!("{}", render(&counts));
    Ok(())
}
