use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use edgeprobe::engine::{
    run_speed_test, CancelToken, ProbeError, TestPhase, TestUpdate, MIN_CHUNK_BYTES,
};
use edgeprobe::settings::Settings;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

/// Knobs for the in-process HTTP stub the engine is pointed at.
#[derive(Clone)]
struct StubConfig {
    ping_status: u16,
    /// Delay between 64 KiB body writes; slows a download round enough to
    /// cancel it mid-stream.
    chunk_delay: Option<Duration>,
}

impl StubConfig {
    fn ok() -> Self {
        Self {
            ping_status: 204,
            chunk_delay: None,
        }
    }
}

struct StubServer {
    base_url: String,
    ping_hits: Arc<AtomicUsize>,
    down_hits: Arc<AtomicUsize>,
    down_sizes: Arc<Mutex<Vec<u64>>>,
}

/// Test helper: bind a local listener and answer `/ping` and `/down`
/// with raw HTTP/1.1, counting every request.
async fn spawn_stub(config: StubConfig) -> StubServer {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind stub server");
    let addr = listener.local_addr().expect("stub server addr");

    let ping_hits = Arc::new(AtomicUsize::new(0));
    let down_hits = Arc::new(AtomicUsize::new(0));
    let down_sizes = Arc::new(Mutex::new(Vec::new()));

    let ping = ping_hits.clone();
    let down = down_hits.clone();
    let sizes = down_sizes.clone();
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let config = config.clone();
            let ping = ping.clone();
            let down = down.clone();
            let sizes = sizes.clone();
            tokio::spawn(async move {
                let _ = handle_connection(stream, config, ping, down, sizes).await;
            });
        }
    });

    StubServer {
        base_url: format!("http://{addr}"),
        ping_hits,
        down_hits,
        down_sizes,
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    config: StubConfig,
    ping_hits: Arc<AtomicUsize>,
    down_hits: Arc<AtomicUsize>,
    down_sizes: Arc<Mutex<Vec<u64>>>,
) -> std::io::Result<()> {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        head.extend_from_slice(&buf[..n]);
    }
    let head = String::from_utf8_lossy(&head);
    let path = head.split_whitespace().nth(1).unwrap_or("/").to_string();

    if path.starts_with("/ping") {
        ping_hits.fetch_add(1, Ordering::SeqCst);
        let response = if config.ping_status == 204 {
            "HTTP/1.1 204 No Content\r\nConnection: close\r\n\r\n".to_string()
        } else {
            format!(
                "HTTP/1.1 {} Error\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                config.ping_status
            )
        };
        stream.write_all(response.as_bytes()).await?;
    } else if path.starts_with("/down") {
        down_hits.fetch_add(1, Ordering::SeqCst);
        let bytes = path
            .split("bytes=")
            .nth(1)
            .and_then(|rest| rest.split('&').next())
            .and_then(|n| n.parse::<u64>().ok())
            .unwrap_or(0);
        down_sizes.lock().expect("sizes lock").push(bytes);

        let header = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {bytes}\r\nContent-Type: application/octet-stream\r\nConnection: close\r\n\r\n"
        );
        stream.write_all(header.as_bytes()).await?;

        let chunk = vec![0u8; 64 * 1024];
        let mut remaining = bytes as usize;
        while remaining > 0 {
            let n = remaining.min(chunk.len());
            stream.write_all(&chunk[..n]).await?;
            remaining -= n;
            if let Some(delay) = config.chunk_delay {
                tokio::time::sleep(delay).await;
            }
        }
    } else {
        stream
            .write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
            .await?;
    }

    stream.flush().await?;
    Ok(())
}

#[tokio::test]
async fn full_run_produces_aggregated_result() {
    let server = spawn_stub(StubConfig::ok()).await;
    let settings = Settings::with_base_url(&server.base_url);
    let (tx, mut rx) = mpsc::channel(64);
    let cancel = CancelToken::new();

    let run = tokio::spawn(run_speed_test(tx, cancel, settings));

    let mut events = Vec::new();
    while let Some(update) = rx.recv().await {
        events.push(update);
    }
    let result = run.await.expect("join").expect("run succeeds");

    // 10 latency samples, 3 measured download rounds.
    assert_eq!(result.ping.all.len(), 10);
    assert_eq!(result.download.all.len(), 3);
    let ping_max = result
        .ping
        .all
        .iter()
        .copied()
        .fold(f64::MIN, f64::max);
    assert_eq!(result.ping.peak, ping_max);

    // Warmup round hits the endpoint but is excluded from the sample set.
    assert_eq!(server.down_hits.load(Ordering::SeqCst), 4);
    // One liveness probe plus ten latency probes.
    assert_eq!(server.ping_hits.load(Ordering::SeqCst), 11);

    // First round asks for the minimum payload; a fast round grows the next one.
    let sizes = server.down_sizes.lock().expect("sizes lock").clone();
    assert_eq!(sizes[0], MIN_CHUNK_BYTES);
    assert!(sizes[1] > sizes[0]);

    let ping_indices: Vec<usize> = events
        .iter()
        .filter_map(|u| match u {
            TestUpdate::PingProgress { index, .. } => Some(*index),
            _ => None,
        })
        .collect();
    assert_eq!(ping_indices, (1..=10).collect::<Vec<_>>());

    let phases: Vec<TestPhase> = events
        .iter()
        .filter_map(|u| match u {
            TestUpdate::Phase(p) => Some(*p),
            _ => None,
        })
        .collect();
    assert_eq!(
        phases,
        vec![TestPhase::Ping, TestPhase::Download, TestPhase::Complete]
    );

    let results = events
        .iter()
        .filter(|u| matches!(u, TestUpdate::Result(_)))
        .count();
    assert_eq!(results, 1);

    let last_progress = events
        .iter()
        .rev()
        .find_map(|u| match u {
            TestUpdate::DownloadProgress { progress, .. } => Some(*progress),
            _ => None,
        })
        .expect("download progress events");
    assert!((last_progress - 1.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn failing_liveness_probe_aborts_before_any_phase() {
    let server = spawn_stub(StubConfig {
        ping_status: 500,
        chunk_delay: None,
    })
    .await;
    let settings = Settings::with_base_url(&server.base_url);
    let (tx, mut rx) = mpsc::channel(64);
    let cancel = CancelToken::new();

    let run = tokio::spawn(run_speed_test(tx, cancel, settings));

    let mut events = Vec::new();
    while let Some(update) = rx.recv().await {
        events.push(update);
    }
    let err = run.await.expect("join").expect_err("run must fail");

    assert!(matches!(err, ProbeError::Unreachable(_)));
    assert!(err.to_string().contains("500"));

    // Only the liveness probe went out; no sampler ever ran.
    assert_eq!(server.ping_hits.load(Ordering::SeqCst), 1);
    assert_eq!(server.down_hits.load(Ordering::SeqCst), 0);
    assert!(events
        .iter()
        .all(|u| !matches!(u, TestUpdate::Phase(_) | TestUpdate::Result(_))));
}

#[tokio::test]
async fn pre_fired_token_cancels_before_any_request() {
    let server = spawn_stub(StubConfig::ok()).await;
    let settings = Settings::with_base_url(&server.base_url);
    let (tx, mut rx) = mpsc::channel(64);
    let cancel = CancelToken::new();
    cancel.cancel();

    let run = tokio::spawn(run_speed_test(tx, cancel, settings));

    let mut events = Vec::new();
    while let Some(update) = rx.recv().await {
        events.push(update);
    }
    let err = run.await.expect("join").expect_err("run must fail");

    assert!(matches!(err, ProbeError::Cancelled));
    assert_eq!(server.ping_hits.load(Ordering::SeqCst), 0);
    assert_eq!(server.down_hits.load(Ordering::SeqCst), 0);
    assert!(!events.iter().any(|u| matches!(u, TestUpdate::Result(_))));
}

#[tokio::test]
async fn cancelling_mid_download_round_aborts_without_result() {
    // Dribble the body so the first download round lasts long enough to
    // be cancelled from a progress event.
    let server = spawn_stub(StubConfig {
        ping_status: 204,
        chunk_delay: Some(Duration::from_millis(20)),
    })
    .await;
    let settings = Settings::with_base_url(&server.base_url);
    let (tx, mut rx) = mpsc::channel(64);
    let cancel = CancelToken::new();

    let run = tokio::spawn(run_speed_test(tx, cancel.clone(), settings));

    let mut events = Vec::new();
    let mut saw_download_progress = false;
    while let Some(update) = rx.recv().await {
        if !saw_download_progress && matches!(update, TestUpdate::DownloadProgress { .. }) {
            saw_download_progress = true;
            cancel.cancel();
        }
        events.push(update);
    }
    let err = run.await.expect("join").expect_err("run must fail");

    assert!(saw_download_progress);
    assert!(matches!(err, ProbeError::Cancelled));
    assert!(!events
        .iter()
        .any(|u| matches!(u, TestUpdate::Phase(TestPhase::Complete))));
    assert!(!events.iter().any(|u| matches!(u, TestUpdate::Result(_))));
}
