use futures::StreamExt;
use reqwest::{header::CACHE_CONTROL, Client};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use super::cancel::CancelToken;
use super::error::{ProbeError, Result};
use super::{
    cachebust, send_log, sizer, stats, TestUpdate, MIN_CHUNK_BYTES, PROGRESS_INTERVAL, TEST_ROUNDS,
    WARMUP_ROUNDS,
};
use crate::settings::Settings;

const ROUND_TIMEOUT: Duration = Duration::from_secs(120);

pub struct DownloadTest {
    chunk_bytes: u64,
    samples: Vec<f64>,
}

impl DownloadTest {
    pub fn new() -> Self {
        Self {
            // Every run starts from the smallest payload so runs stay
            // comparable with each other.
            chunk_bytes: MIN_CHUNK_BYTES,
            samples: Vec::with_capacity(TEST_ROUNDS),
        }
    }

    /// Warmup plus measured bulk-transfer rounds. The warmup round primes
    /// the connection and congestion window; its throughput is logged but
    /// kept out of the returned sample set. After every round the next
    /// payload size is re-derived from the round's elapsed time.
    pub async fn run(
        &mut self,
        client: &Client,
        settings: &Settings,
        update_tx: &mpsc::Sender<TestUpdate>,
        cancel: &CancelToken,
    ) -> Result<Vec<f64>> {
        let total_rounds = WARMUP_ROUNDS + TEST_ROUNDS;
        send_log(update_tx, "> Measuring download speed...").await;

        for round in 0..total_rounds {
            cancel.check()?;
            let is_warmup = round < WARMUP_ROUNDS;
            let label = if is_warmup {
                "warmup".to_string()
            } else {
                format!("round {}/{}", round - WARMUP_ROUNDS + 1, TEST_ROUNDS)
            };
            send_log(
                update_tx,
                format!("  {}: {:.1} MB", label, self.chunk_bytes as f64 / 1e6),
            )
            .await;

            let (elapsed_ms, mbps) = self
                .run_round(round, total_rounds, client, settings, update_tx, cancel)
                .await?;

            if !is_warmup {
                self.samples.push(mbps);
            }

            // Round boundary: everything up to and including this round is done.
            let progress = overall_progress(round + 1, total_rounds, 0, 1);
            let _ = update_tx
                .send(TestUpdate::DownloadProgress { mbps, progress })
                .await;

            self.chunk_bytes = sizer::next_chunk_size(elapsed_ms, self.chunk_bytes);

            send_log(
                update_tx,
                format!("    -> {:.2} Mbps ({:.1}s)", mbps, elapsed_ms / 1000.0),
            )
            .await;
        }

        send_log(
            update_tx,
            format!("  median: {:.2} Mbps", stats::median(&self.samples)),
        )
        .await;

        Ok(std::mem::take(&mut self.samples))
    }

    /// One request/response cycle: stream the body, counting bytes and
    /// emitting a cumulative rate at most every `PROGRESS_INTERVAL`.
    /// Returns the round's elapsed time (ms) and throughput (Mbps).
    async fn run_round(
        &self,
        round: usize,
        total_rounds: usize,
        client: &Client,
        settings: &Settings,
        update_tx: &mpsc::Sender<TestUpdate>,
        cancel: &CancelToken,
    ) -> Result<(f64, f64)> {
        let url = format!(
            "{}?bytes={}&cachebust={}",
            settings.down_url(),
            self.chunk_bytes,
            cachebust()
        );

        let start = Instant::now();
        let request = client
            .get(&url)
            .header(CACHE_CONTROL, "no-cache")
            .timeout(ROUND_TIMEOUT)
            .send();
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(ProbeError::Cancelled),
            res = request => res?,
        };

        let mut stream = response.bytes_stream();
        let mut received: u64 = 0;
        let mut last_progress = start;

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return Err(ProbeError::Cancelled),
                chunk = stream.next() => chunk,
            };
            let Some(chunk) = next else { break };
            received += chunk?.len() as u64;

            let now = Instant::now();
            if now.duration_since(last_progress) >= PROGRESS_INTERVAL {
                let elapsed_s = now.duration_since(start).as_secs_f64();
                let mbps = (received * 8) as f64 / (elapsed_s * 1e6);
                let progress = overall_progress(round, total_rounds, received, self.chunk_bytes);
                let _ = update_tx
                    .send(TestUpdate::DownloadProgress { mbps, progress })
                    .await;
                last_progress = now;
            }
        }

        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        let mbps = if elapsed_ms > 0.0 {
            (received * 8) as f64 / (elapsed_ms / 1000.0 * 1e6)
        } else {
            0.0
        };
        Ok((elapsed_ms, mbps))
    }
}

impl Default for DownloadTest {
    fn default() -> Self {
        Self::new()
    }
}

/// Fraction of the whole download phase that is done, across rounds.
fn overall_progress(round: usize, total_rounds: usize, bytes_transferred: u64, total_bytes: u64) -> f64 {
    let round_progress = if total_bytes > 0 {
        bytes_transferred as f64 / total_bytes as f64
    } else {
        0.0
    };
    ((round as f64 + round_progress) / total_rounds as f64).min(1.0)
}
