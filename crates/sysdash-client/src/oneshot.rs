use crate::config::{Action, Config};
use crate::transport::{
    run_transport, TransportConfig, TransportEvent, EVENT_QUEUE_CAPACITY, REQUEST_QUEUE_CAPACITY,
};
use anyhow::{bail, Context, Result};
use chrono::Utc;
use std::time::Duration;
use sysdash_core::{Handshake, Outcome, Request, StateStore};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{info, warn};

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

impl Action {
    pub fn into_request(self) -> Request {
        match self {
            Action::Start { name } => Request::Start { name },
            Action::Stop { name } => Request::Stop { name },
            Action::Reset { name } => Request::Reset { name },
            Action::Command {
                name,
                command,
                args,
            } => Request::command(&name, &command, &args.join(" ")),
            Action::Gc => Request::Gc,
            Action::Close => Request::Close,
            Action::DeleteResponse { id } => Request::DeleteCachedResponse { id },
        }
    }
}

/// Connects, performs the page handshake, sends `request` (if any), and
/// keeps syncing for `linger` after that. Returns the store as it stood at
/// the end.
///
/// The request follows the subscription, which itself waits for the server
/// (password prompt, page request or first data frame). Both the connection
/// and the handshake must complete within `connect_timeout`.
pub async fn run_oneshot(
    config: &Config,
    request: Option<Request>,
    linger: Duration,
    connect_timeout: Duration,
) -> Result<StateStore> {
    let (event_tx, mut event_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
    let (request_tx, request_rx) = mpsc::channel(REQUEST_QUEUE_CAPACITY);
    let transport = tokio::spawn(run_transport(
        TransportConfig::from(config),
        event_tx,
        request_rx,
    ));
    let mut store = StateStore::new(config.store, &config.location);
    let mut handshake = Handshake::new(config.handshake_grace);

    let opened = tokio::time::timeout(connect_timeout, async {
        while let Some(event) = event_rx.recv().await {
            if event == TransportEvent::Opened {
                return true;
            }
        }
        false
    })
    .await
    .unwrap_or(false);
    if !opened {
        drop(request_tx);
        transport.abort();
        bail!("could not connect to {} within {:?}", config.url, connect_timeout);
    }
    handshake.opened(Utc::now());

    let handshake_deadline = Instant::now() + connect_timeout;
    let mut linger_deadline: Option<Instant> = None;
    let mut pending = request;
    let mut connected = true;
    loop {
        let grace = handshake
            .deadline()
            .map(|at| (at - Utc::now()).to_std().unwrap_or(Duration::ZERO));
        let end = linger_deadline.unwrap_or(handshake_deadline);
        let event = tokio::select! {
            event = event_rx.recv() => match event {
                Some(event) => Some(event),
                None => break,
            },
            _ = tokio::time::sleep(grace.unwrap_or(Duration::ZERO)), if grace.is_some() => {
                if handshake.poll(Utc::now()) {
                    request_tx
                        .send(store.resubscribe_request())
                        .await
                        .context("transport stopped before handshake")?;
                }
                None
            }
            _ = tokio::time::sleep_until(end) => {
                if linger_deadline.is_none() {
                    transport.abort();
                    bail!(
                        "handshake with {} did not complete within {:?}",
                        config.url,
                        connect_timeout
                    );
                }
                break;
            }
        };

        match event {
            Some(TransportEvent::Inbound(msg)) => {
                if handshake.before_inbound(&msg) {
                    request_tx
                        .send(store.resubscribe_request())
                        .await
                        .context("transport stopped before handshake")?;
                }
                match store.apply(msg, Utc::now()) {
                    Outcome::Reply(reply) => {
                        let _ = request_tx.send(reply).await;
                    }
                    Outcome::PasswordRequested => match config.password.clone() {
                        Some(secret) => {
                            let _ = request_tx.send(Request::Password { secret }).await;
                        }
                        None => warn!("oneshot_password_required: set SYSDASH_PASSWORD"),
                    },
                    Outcome::Changed | Outcome::Unchanged => {}
                }
            }
            Some(TransportEvent::Opened) => {
                connected = true;
                store.reset_for_resubscribe();
                handshake.opened(Utc::now());
            }
            Some(TransportEvent::Closed) => {
                connected = false;
                handshake.closed();
                warn!("oneshot_connection_lost");
            }
            None => {}
        }

        if connected && linger_deadline.is_none() && !handshake.is_pending() {
            if let Some(request) = pending.take() {
                info!("oneshot_send: {}", request.topic());
                request_tx
                    .send(request)
                    .await
                    .context("transport stopped before request")?;
            }
            linger_deadline = Some(Instant::now() + linger);
        }
    }

    drop(request_tx);
    drop(event_rx);
    let _ = transport.await;
    Ok(store)
}
