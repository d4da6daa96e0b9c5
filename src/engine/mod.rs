//! The measurement engine: preflight, latency sampling, adaptive-size
//! download sampling, and aggregation. Consumers drive a run with
//! [`run_speed_test`] and watch it through the [`TestUpdate`] stream.

pub mod cancel;
pub mod download;
pub mod error;
pub mod ping;
pub mod sizer;
pub mod stats;

use rand::{distributions::Alphanumeric, Rng};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;

use crate::settings::Settings;

pub use cancel::CancelToken;
pub use download::DownloadTest;
pub use error::{ProbeError, Result};
pub use ping::PingTest;

pub const PING_COUNT: usize = 10;

pub const MIN_CHUNK_BYTES: u64 = 5 * 1024 * 1024;
// The edge worker caps a single response at 50 MB; stay under it.
pub const MAX_CHUNK_BYTES: u64 = 48 * 1024 * 1024;

pub const WARMUP_ROUNDS: usize = 1;
pub const TEST_ROUNDS: usize = 3;
pub const TARGET_DURATION_MS: f64 = 4000.0;
pub const PROGRESS_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestPhase {
    Idle,
    Ping,
    Download,
    Complete,
}

/// Summary of one phase, computed once from its full sample set.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseResult {
    pub median: f64,
    pub mean: f64,
    pub peak: f64,
    pub all: Vec<f64>,
}

impl PhaseResult {
    pub fn from_samples(all: Vec<f64>) -> Self {
        Self {
            median: stats::median(&all),
            mean: stats::mean(&all),
            peak: stats::peak(&all),
            all,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpeedTestResult {
    pub ping: PhaseResult,
    pub download: PhaseResult,
}

/// Everything the engine tells the outside world while a run is going.
#[derive(Debug, Clone)]
pub enum TestUpdate {
    Phase(TestPhase),
    Log(String),
    PingProgress {
        index: usize,
        total: usize,
        latency_ms: f64,
    },
    DownloadProgress {
        mbps: f64,
        progress: f64,
    },
    Result(SpeedTestResult),
}

/// Unique per-request query value so no intermediary cache can answer
/// for the edge endpoint.
pub(crate) fn cachebust() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();
    format!("{millis}-{suffix}")
}

pub(crate) async fn send_log(update_tx: &mpsc::Sender<TestUpdate>, line: impl Into<String>) {
    let _ = update_tx.send(TestUpdate::Log(line.into())).await;
}

/// Run the whole test: preflight, ping phase, download phase, aggregate.
/// Phases only ever advance; any failure or cancellation propagates
/// without starting later phases and without a partial result.
pub async fn run_speed_test(
    update_tx: mpsc::Sender<TestUpdate>,
    cancel: CancelToken,
    settings: Settings,
) -> Result<SpeedTestResult> {
    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()?;

    send_log(&update_tx, "").await;
    send_log(&update_tx, "=== edgeprobe ===").await;
    send_log(&update_tx, "").await;

    ping::check_server(&client, &settings, &update_tx, &cancel).await?;
    send_log(&update_tx, "").await;

    let _ = update_tx.send(TestUpdate::Phase(TestPhase::Ping)).await;
    let latencies = PingTest::new()
        .run(&client, &settings, &update_tx, &cancel)
        .await?;
    send_log(&update_tx, "").await;

    let _ = update_tx.send(TestUpdate::Phase(TestPhase::Download)).await;
    let speeds = DownloadTest::new()
        .run(&client, &settings, &update_tx, &cancel)
        .await?;
    send_log(&update_tx, "").await;

    let result = SpeedTestResult {
        ping: PhaseResult::from_samples(latencies),
        download: PhaseResult::from_samples(speeds),
    };

    send_log(&update_tx, "=== Test Complete ===").await;
    let _ = update_tx.send(TestUpdate::Phase(TestPhase::Complete)).await;
    let _ = update_tx.send(TestUpdate::Result(result.clone())).await;

    Ok(result)
}
