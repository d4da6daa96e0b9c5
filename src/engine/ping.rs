use reqwest::{header::CACHE_CONTROL, Client, StatusCode};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use super::cancel::CancelToken;
use super::error::{ProbeError, Result};
use super::{cachebust, send_log, stats, TestUpdate, PING_COUNT};
use crate::settings::Settings;

const PING_TIMEOUT: Duration = Duration::from_secs(5);

/// Preflight: one cheap request to confirm the endpoint answers before
/// committing to the full test. Anything other than 2xx/204 aborts the
/// run with the underlying error text.
pub async fn check_server(
    client: &Client,
    settings: &Settings,
    update_tx: &mpsc::Sender<TestUpdate>,
    cancel: &CancelToken,
) -> Result<()> {
    send_log(update_tx, "> Checking server...").await;
    cancel.check()?;

    let url = format!("{}?cachebust={}", settings.ping_url(), cachebust());
    let request = client
        .get(&url)
        .header(CACHE_CONTROL, "no-cache")
        .timeout(PING_TIMEOUT)
        .send();

    let response = tokio::select! {
        _ = cancel.cancelled() => return Err(ProbeError::Cancelled),
        res = request => res.map_err(|err| ProbeError::Unreachable(err.to_string()))?,
    };

    let status = response.status();
    if !status.is_success() && status != StatusCode::NO_CONTENT {
        return Err(ProbeError::Unreachable(format!("server returned {status}")));
    }

    send_log(update_tx, "  server OK").await;
    Ok(())
}

pub struct PingTest {
    samples: Vec<f64>,
}

impl PingTest {
    pub fn new() -> Self {
        Self {
            samples: Vec::with_capacity(PING_COUNT),
        }
    }

    /// Sequential round-trip probes, one at a time so each sample measures
    /// a single round trip rather than pipelined requests.
    pub async fn run(
        &mut self,
        client: &Client,
        settings: &Settings,
        update_tx: &mpsc::Sender<TestUpdate>,
        cancel: &CancelToken,
    ) -> Result<Vec<f64>> {
        send_log(update_tx, "> Measuring latency...").await;

        for i in 0..PING_COUNT {
            cancel.check()?;
            let url = format!("{}?cachebust={}", settings.ping_url(), cachebust());

            let start = Instant::now();
            let probe = async {
                let response = client
                    .get(&url)
                    .header(CACHE_CONTROL, "no-cache")
                    .timeout(PING_TIMEOUT)
                    .send()
                    .await?;
                response.bytes().await?;
                Ok::<_, reqwest::Error>(())
            };
            tokio::select! {
                _ = cancel.cancelled() => return Err(ProbeError::Cancelled),
                res = probe => res?,
            }
            let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
            self.samples.push(latency_ms);

            let _ = update_tx
                .send(TestUpdate::PingProgress {
                    index: i + 1,
                    total: PING_COUNT,
                    latency_ms,
                })
                .await;
            send_log(
                update_tx,
                format!("  ping {}/{}: {:.1} ms", i + 1, PING_COUNT, latency_ms),
            )
            .await;
        }

        send_log(
            update_tx,
            format!("  median: {:.1} ms", stats::median(&self.samples)),
        )
        .await;

        Ok(std::mem::take(&mut self.samples))
    }
}

impl Default for PingTest {
    fn default() -> Self {
        Self::new()
    }
}
