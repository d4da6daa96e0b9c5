use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use edgeprobe::engine::{CancelToken, SpeedTestResult, TestPhase, TestUpdate};
use std::time::Duration;

const MAX_LOG_LINES: usize = 200;
const MAX_PING_SAMPLES: usize = 100;
const MAX_RATE_SAMPLES: usize = 200;

/// UI-side state. Fed exclusively by [`TestUpdate`]s from the engine task
/// and key presses; never feeds anything back into a running test except
/// the cancel token.
pub struct App {
    pub phase: TestPhase,
    pub running: bool,
    pub result: Option<SpeedTestResult>,
    pub should_quit: bool,

    pub log_lines: Vec<String>,
    pub ping_samples: Vec<f64>,
    pub rate_samples: Vec<f64>,
    pub current_mbps: f64,
    pub download_progress: f64,
    pub ping_index: usize,
    pub ping_total: usize,

    cancel: Option<CancelToken>,
}

impl App {
    pub fn new() -> Self {
        Self {
            phase: TestPhase::Idle,
            running: false,
            result: None,
            should_quit: false,
            log_lines: Vec::new(),
            ping_samples: Vec::new(),
            rate_samples: Vec::new(),
            current_mbps: 0.0,
            download_progress: 0.0,
            ping_index: 0,
            ping_total: 0,
            cancel: None,
        }
    }

    pub fn handle_key_event(&mut self, key: event::KeyEvent) -> Option<AppAction> {
        if key.kind != KeyEventKind::Press {
            return None;
        }

        match key.code {
            KeyCode::Char('q') => {
                self.should_quit = true;
                Some(AppAction::Quit)
            }
            KeyCode::Enter => {
                if !self.running {
                    Some(AppAction::StartTest)
                } else {
                    None
                }
            }
            KeyCode::Esc => {
                if self.running {
                    Some(AppAction::CancelTest)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Clear everything from the previous run before a new one starts.
    pub fn reset_for_new_test(&mut self) {
        self.phase = TestPhase::Idle;
        self.running = true;
        self.result = None;
        self.ping_samples.clear();
        self.rate_samples.clear();
        self.current_mbps = 0.0;
        self.download_progress = 0.0;
        self.ping_index = 0;
        self.ping_total = 0;
    }

    pub fn apply_update(&mut self, update: TestUpdate) {
        match update {
            TestUpdate::Phase(phase) => {
                self.phase = phase;
                if phase == TestPhase::Complete || phase == TestPhase::Idle {
                    self.running = false;
                }
            }
            TestUpdate::Log(line) => self.push_log(line),
            TestUpdate::PingProgress {
                index,
                total,
                latency_ms,
            } => {
                self.ping_index = index;
                self.ping_total = total;
                self.ping_samples.push(latency_ms);
                trim_front(&mut self.ping_samples, MAX_PING_SAMPLES);
            }
            TestUpdate::DownloadProgress { mbps, progress } => {
                self.current_mbps = mbps;
                self.download_progress = progress;
                self.rate_samples.push(mbps);
                trim_front(&mut self.rate_samples, MAX_RATE_SAMPLES);
            }
            TestUpdate::Result(result) => self.result = Some(result),
        }
    }

    fn push_log(&mut self, line: String) {
        self.log_lines.push(line);
        if self.log_lines.len() > MAX_LOG_LINES {
            self.log_lines.remove(0);
        }
    }

    pub fn set_cancel(&mut self, token: CancelToken) {
        self.cancel = Some(token);
    }

    pub fn cancel_test(&mut self) {
        if let Some(token) = self.cancel.take() {
            token.cancel();
        }
        self.running = false;
        self.phase = TestPhase::Idle;
    }
}

fn trim_front(samples: &mut Vec<f64>, max: usize) {
    if samples.len() > max {
        samples.remove(0);
    }
}

#[derive(Debug, Clone, Copy)]
pub enum AppAction {
    Quit,
    StartTest,
    CancelTest,
}

pub fn poll_event(timeout: Duration) -> Result<Option<Event>> {
    if event::poll(timeout)? {
        Ok(Some(event::read()?))
    } else {
        Ok(None)
    }
}
