//! `TutorChat`: terminal chat client for a math tutor backend.
//!
//! Runs against the in-process demo server. Configuration via CLI flags,
//! environment variables, or config file (`~/.config/tutorchat/config.toml`).
//!
//! ```bash
//! cargo run --bin tutorchat
//!
//! # Slow, flaky server to watch the loading and error paths
//! cargo run --bin tutorchat -- --demo-latency-ms 1500 --demo-failure-rate 0.2
//! ```

use std::io;
use std::path::Path;

use clap::Parser;
use crossterm::{
    event::{self, Event, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};
use tokio::sync::{mpsc, watch};
use tracing_appender::non_blocking::WorkerGuard;

use tutorchat::app::{App, Intent};
use tutorchat::chat::{ChatClient, ClientEvent, Snapshot};
use tutorchat::config::{CliArgs, ClientConfig};
use tutorchat::gateway::Gateway;
use tutorchat::gateway::demo::DemoGateway;
use tutorchat::ui::{self, View};

#[tokio::main]
async fn main() -> io::Result<()> {
    let cli = CliArgs::parse();

    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Warning: failed to load config: {e}");
            ClientConfig::default()
        }
    };

    // Logs go to a file: ratatui owns the terminal.
    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());

    tracing::info!("tutorchat starting");

    let gateway = DemoGateway::with_sample_session(config.demo);
    let (client, snapshots, events) = ChatClient::new(gateway, config.chat.clone());

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_app(&mut terminal, client, snapshots, events, &config).await;

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    tracing::info!("tutorchat exiting");
    result
}

/// Initialize file-based logging.
///
/// Returns a [`WorkerGuard`] that must be held until shutdown so buffered
/// log entries are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("tutorchat.log");
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}

/// Main application loop.
async fn run_app<G: Gateway>(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    mut client: ChatClient<G>,
    mut snapshots: watch::Receiver<Snapshot>,
    mut events: mpsc::Receiver<ClientEvent>,
    config: &ClientConfig,
) -> io::Result<()> {
    let mut app = App::new();
    client.refresh_sessions();

    loop {
        // Step 1: Apply whatever the gateway and reveal timers delivered.
        client.drain_completions();
        drain_client_events(&mut events, &mut app);

        // Step 2: Draw the latest snapshot.
        let snapshot = snapshots.borrow_and_update().clone();
        app.sync(&snapshot);
        terminal.draw(|frame| {
            ui::draw(
                frame,
                View {
                    app: &app,
                    snapshot: &snapshot,
                    timestamp_format: &config.timestamp_format,
                },
            );
        })?;

        // Step 3: Poll for terminal input without starving the runtime.
        let poll_timeout = config.poll_timeout;
        let input = tokio::task::block_in_place(|| -> io::Result<Option<Event>> {
            if event::poll(poll_timeout)? {
                Ok(Some(event::read()?))
            } else {
                Ok(None)
            }
        })?;

        if let Some(Event::Key(key)) = input
            && key.kind == KeyEventKind::Press
            && let Some(intent) = app.handle_key_event(key)
        {
            dispatch(&mut client, &mut app, intent);
        }

        if app.should_quit {
            return Ok(());
        }
    }
}

/// Carry out an intent produced by a key press.
fn dispatch<G: Gateway>(client: &mut ChatClient<G>, app: &mut App, intent: Intent) {
    tracing::debug!(?intent, "dispatching intent");
    match intent {
        Intent::Select(id) => {
            if let Err(e) = client.select_session(Some(id)) {
                app.notice = Some(e.to_string());
            }
        }
        Intent::Delete(id) => {
            if let Err(e) = client.delete_session(id) {
                app.notice = Some(e.to_string());
            }
        }
        Intent::Create => client.create_session(),
        Intent::Refresh => client.refresh_sessions(),
        Intent::Send(question) => match client.send_message(&question) {
            Ok(_) => app.clear_input(),
            Err(e) => app.notice = Some(format!("Not sent: {e}")),
        },
        Intent::DismissError => client.dismiss_error(),
    }
}

/// Drain client notifications. The snapshot already carries their effect on
/// conversation state; here they steer the view and get traced.
fn drain_client_events(rx: &mut mpsc::Receiver<ClientEvent>, app: &mut App) {
    while let Ok(event) = rx.try_recv() {
        match event {
            ClientEvent::RevealCompleted { message_id } => {
                tracing::debug!(message_id = %message_id, "answer fully revealed");
            }
            ClientEvent::RevealCancelled { message_id } => {
                tracing::debug!(message_id = %message_id, "answer reveal cancelled");
            }
            ClientEvent::ErrorRaised(error) => {
                tracing::info!(error = %error, "error shown to user");
            }
            ClientEvent::RevealUpdated { .. } => app.follow_reveal(),
        }
    }
}
