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

//! Adaptive batch sizing.
//!
//! Tracks an exponential moving average of job processing time and nudges
//! the claim batch size by one step per completed job. Fast jobs grow the
//! batch toward `max_batch_size`; slow jobs shrink it toward `min_batch_size`.
//!
//! Only the smoothed average drives the step, never the raw observation, so
//! a single slow outlier among fast jobs moves the average but rarely the
//! batch size. All state is held in atomics so any number of workers can
//! report completions concurrently.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use metrics::gauge;

/// Smoothing factor applied to each new observation.
pub const EMA_ALPHA: f64 = 0.2;

/// Thresholds and bounds for [`AdaptiveBatchSizer`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchSizerConfig {
    pub min_batch_size: usize,
    pub max_batch_size: usize,
    pub fast_threshold: Duration,
    pub slow_threshold: Duration,
}

impl Default for BatchSizerConfig {
    fn default() -> Self {
        Self {
            min_batch_size: 1,
            max_batch_size: 10,
            fast_threshold: Duration::from_millis(1000),
            slow_threshold: Duration::from_millis(5000),
        }
    }
}

#[derive(Debug)]
pub struct AdaptiveBatchSizer {
    config: BatchSizerConfig,
    batch_size: AtomicUsize,
    /// f64 bits of the EMA in milliseconds; NaN until the first observation
    ema_bits: AtomicU64,
}

impl AdaptiveBatchSizer {
    pub fn new(config: BatchSizerConfig) -> Self {
        let min = config.min_batch_size.max(1);
        let config = BatchSizerConfig {
            min_batch_size: min,
            max_batch_size: config.max_batch_size.max(min),
            ..config
        };
        gauge!("folio_batch_size").set(min as f64);
        Self {
            config,
            batch_size: AtomicUsize::new(min),
            ema_bits: AtomicU64::new(f64::NAN.to_bits()),
        }
    }

    pub fn config(&self) -> &BatchSizerConfig {
        &self.config
    }

    /// Number of jobs to claim in the next claim call.
    pub fn current_batch_size(&self) -> usize {
        self.batch_size.load(Ordering::Acquire)
    }

    /// Smoothed processing time in milliseconds, `None` before any completion.
    pub fn ema_ms(&self) -> Option<f64> {
        let ema = f64::from_bits(self.ema_bits.load(Ordering::Acquire));
        (!ema.is_nan()).then_some(ema)
    }

    /// Feeds one job's processing time into the average and adjusts the batch
    /// size by at most one step.
    pub fn record_completion(&self, duration: Duration) {
        let sample = duration.as_secs_f64() * 1000.0;

        let previous = self
            .ema_bits
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                Some(next_ema(f64::from_bits(bits), sample).to_bits())
            })
            .unwrap_or_else(|bits| bits);
        let ema = next_ema(f64::from_bits(previous), sample);

        let fast = self.config.fast_threshold.as_secs_f64() * 1000.0;
        let slow = self.config.slow_threshold.as_secs_f64() * 1000.0;
        let (min, max) = (self.config.min_batch_size, self.config.max_batch_size);

        let step: isize = if ema < fast {
            1
        } else if ema > slow {
            -1
        } else {
            0
        };

        let size = if step == 0 {
            self.current_batch_size()
        } else {
            let previous = self
                .batch_size
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |size| {
                    Some(size.saturating_add_signed(step).clamp(min, max))
                })
                .unwrap_or_else(|size| size);
            previous.saturating_add_signed(step).clamp(min, max)
        };

        gauge!("folio_ema_processing_time_ms").set(ema);
        gauge!("folio_batch_size").set(size as f64);
    }
}

fn next_ema(previous: f64, sample: f64) -> f64 {
    if previous.is_nan() {
        sample
    } else {
        EMA_ALPHA * sample + (1.0 - EMA_ALPHA) * previous
    }
}
