mod app;
mod ui;

use anyhow::Result;
use app::{poll_event, App, AppAction};
use crossterm::event::Event;
use edgeprobe::engine::{run_speed_test, CancelToken, ProbeError, TestPhase, TestUpdate};
use edgeprobe::settings::Settings;
use ratatui::DefaultTerminal;
use std::time::Duration;
use tokio::sync::mpsc;
use ui::draw_ui;

#[tokio::main]
async fn main() -> Result<()> {
    let mut terminal = ratatui::init();
    terminal.clear()?;

    let result = run_app(&mut terminal).await;

    ratatui::restore();
    result
}

async fn run_app(terminal: &mut DefaultTerminal) -> Result<()> {
    let mut app = App::new();
    let mut test_rx: Option<mpsc::Receiver<TestUpdate>> = None;

    loop {
        terminal.draw(|frame| draw_ui(frame, &app))?;

        // Drain pending engine updates
        if let Some(rx) = test_rx.as_mut() {
            let mut disconnected = false;
            loop {
                match rx.try_recv() {
                    Ok(update) => app.apply_update(update),
                    Err(mpsc::error::TryRecvError::Empty) => break,
                    Err(mpsc::error::TryRecvError::Disconnected) => {
                        disconnected = true;
                        break;
                    }
                }
            }
            if disconnected {
                test_rx = None;
            }
        }

        // Handle input
        if let Some(Event::Key(key)) = poll_event(Duration::from_millis(30))? {
            if let Some(action) = app.handle_key_event(key) {
                match action {
                    AppAction::Quit => break,
                    AppAction::StartTest => {
                        app.reset_for_new_test();

                        let (tx, rx) = mpsc::channel(64);
                        let cancel = CancelToken::new();

                        app.set_cancel(cancel.clone());
                        test_rx = Some(rx);

                        let settings = Settings::from_env();
                        tokio::spawn(async move {
                            if let Err(err) = run_speed_test(tx.clone(), cancel, settings).await {
                                let line = match &err {
                                    ProbeError::Cancelled => "  test cancelled".to_string(),
                                    other => format!("  error: {other}"),
                                };
                                let _ = tx.send(TestUpdate::Log(line)).await;
                                let _ = tx.send(TestUpdate::Phase(TestPhase::Idle)).await;
                            }
                        });
                    }
                    AppAction::CancelTest => {
                        app.cancel_test();
                    }
                }
            }
        }

        if app.should_quit {
            break;
        }
    }

    Ok(())
}
