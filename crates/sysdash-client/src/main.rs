use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use crossterm::{
    event::{Event, EventStream, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use futures_util::StreamExt;
use ratatui::{backend::CrosstermBackend, Terminal};
use std::fs::OpenOptions;
use std::io;
use std::sync::Mutex;
use std::time::Duration;
use sysdash_client::app::App;
use sysdash_client::config::{load_config, Args, Command, Config};
use sysdash_client::oneshot::{run_oneshot, CONNECT_TIMEOUT};
use sysdash_client::transport::{
    run_transport, TransportConfig, EVENT_QUEUE_CAPACITY, REQUEST_QUEUE_CAPACITY,
};
use sysdash_client::ui;
use sysdash_core::{Handshake, StateStore};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

/// Upper bound on how long the view sleeps without redrawing.
const IDLE_REDRAW: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args).context("invalid configuration")?;
    let command = args.command.clone().unwrap_or(Command::Watch);
    init_logging(&config, command == Command::Watch)?;

    match command {
        Command::Watch => run_watch(config).await,
        Command::Send {
            action,
            linger_secs,
        } => {
            let store = run_oneshot(
                &config,
                Some(action.into_request()),
                Duration::from_secs(linger_secs),
                CONNECT_TIMEOUT,
            )
            .await?;
            for entry in store.responses().entries() {
                println!("{} {}", entry.timestamp.format("%H:%M:%S"), entry.text);
            }
            Ok(())
        }
        Command::Snapshot { linger_secs } => {
            let store = run_oneshot(
                &config,
                None,
                Duration::from_secs(linger_secs),
                CONNECT_TIMEOUT,
            )
            .await?;
            let encoded = serde_json::to_string_pretty(&store.snapshot())
                .context("failed to encode snapshot")?;
            println!("{encoded}");
            Ok(())
        }
    }
}

/// The terminal view owns stdout, so its logs are discarded unless
/// `SYSDASH_LOG_STDOUT` is set or a log file is given. One-shot commands log
/// to stderr.
fn init_logging(config: &Config, tui: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if let Some(path) = &config.log_file {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open log file {}", path.display()))?;
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .try_init();
    } else if config.log_stdout || !tui {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .try_init();
    } else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::sink)
            .try_init();
    }
    Ok(())
}

async fn run_watch(config: Config) -> Result<()> {
    let (event_tx, mut event_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
    let (request_tx, request_rx) = mpsc::channel(REQUEST_QUEUE_CAPACITY);
    let transport_cfg = TransportConfig::from(&config);
    let transport = tokio::spawn(async move {
        run_transport(transport_cfg, event_tx, request_rx).await;
    });

    let store = StateStore::new(config.store, &config.location);
    let mut app = App::new(store, request_tx, config.password.clone())
        .with_handshake(Handshake::new(config.handshake_grace));

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    let mut events = EventStream::new();

    let result = async {
        loop {
            app.on_tick(Utc::now());
            terminal.draw(|frame| ui::render(frame, &app))?;

            let wake = app
                .next_wake()
                .and_then(|deadline| (deadline - Utc::now()).to_std().ok())
                .map_or(IDLE_REDRAW, |until| until.min(IDLE_REDRAW));

            tokio::select! {
                Some(event) = event_rx.recv() => {
                    app.apply_transport_event(event, Utc::now());
                }
                maybe_event = events.next() => {
                    if let Some(Ok(Event::Key(key))) = maybe_event {
                        if matches!(key.kind, KeyEventKind::Press | KeyEventKind::Repeat)
                            && app.handle_key(key)
                        {
                            break;
                        }
                    }
                }
                _ = tokio::time::sleep(wake) => {}
            }
        }
        Ok::<(), anyhow::Error>(())
    }
    .await;

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    drop(app);
    drop(event_rx);
    let _ = transport.await;
    result
}
