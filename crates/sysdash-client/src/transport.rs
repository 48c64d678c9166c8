use crate::config::Config;
use futures_util::{Sink, SinkExt, StreamExt};
use std::time::Duration;
use sysdash_core::{Codec, InboundMsg, Request, RequestStyle};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, info, warn};
use url::Url;

pub const EVENT_QUEUE_CAPACITY: usize = 256;
pub const REQUEST_QUEUE_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub url: Url,
    pub heartbeat_interval: Duration,
    pub reconnect_delay: Duration,
    pub max_frame_bytes: usize,
    pub codec: Codec,
    pub request_style: RequestStyle,
}

impl From<&Config> for TransportConfig {
    fn from(config: &Config) -> Self {
        Self {
            url: config.url.clone(),
            heartbeat_interval: config.heartbeat_interval,
            reconnect_delay: config.reconnect_delay,
            max_frame_bytes: config.max_frame_bytes,
            codec: config.codec(),
            request_style: config.request_style,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Opened,
    Closed,
    Inbound(InboundMsg),
}

enum SessionEnd {
    Dropped,
    Shutdown,
}

/// Keeps one connection to the dashboard alive until `requests` is closed
/// or nobody listens on `events` anymore.
///
/// Every successful connect emits `Opened`; every loss emits `Closed` and is
/// followed by a fixed `reconnect_delay` before the next attempt. Frames that
/// fail to decode are logged and dropped.
pub async fn run_transport(
    config: TransportConfig,
    events: mpsc::Sender<TransportEvent>,
    mut requests: mpsc::Receiver<Request>,
) {
    loop {
        if events.is_closed() {
            return;
        }
        let (ws, _) = match connect_async(config.url.as_str()).await {
            Ok(value) => value,
            Err(err) => {
                warn!("transport_connect_error: {err}");
                tokio::time::sleep(config.reconnect_delay).await;
                continue;
            }
        };
        info!("transport_open: {}", config.url);
        if events.send(TransportEvent::Opened).await.is_err() {
            return;
        }

        let (mut sink, mut stream) = ws.split();
        let mut heartbeat = tokio::time::interval_at(
            Instant::now() + config.heartbeat_interval,
            config.heartbeat_interval,
        );
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let end = loop {
            tokio::select! {
                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        match config.codec.decode_frame(&text, config.max_frame_bytes) {
                            Ok(msg) => {
                                debug!("transport_inbound: {}", msg.kind());
                                if events.send(TransportEvent::Inbound(msg)).await.is_err() {
                                    break SessionEnd::Shutdown;
                                }
                            }
                            Err(err) => warn!("transport_decode_error: {err}"),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break SessionEnd::Dropped,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        warn!("transport_read_error: {err}");
                        break SessionEnd::Dropped;
                    }
                },
                request = requests.recv() => match request {
                    Some(request) => {
                        if let Err(err) = send_request(&mut sink, &config, &request).await {
                            warn!("transport_send_error: {err}");
                            break SessionEnd::Dropped;
                        }
                    }
                    None => {
                        let _ = sink.send(Message::Close(None)).await;
                        break SessionEnd::Shutdown;
                    }
                },
                _ = heartbeat.tick() => {
                    if let Err(err) = send_request(&mut sink, &config, &Request::Heartbeat).await {
                        warn!("transport_heartbeat_error: {err}");
                        break SessionEnd::Dropped;
                    }
                }
            }
        };

        match end {
            SessionEnd::Shutdown => {
                info!("transport_shutdown");
                return;
            }
            SessionEnd::Dropped => {
                let _ = sink.close().await;
                info!("transport_closed: reconnecting in {:?}", config.reconnect_delay);
                if events.send(TransportEvent::Closed).await.is_err() {
                    return;
                }
                tokio::time::sleep(config.reconnect_delay).await;
            }
        }
    }
}

/// Encodes and writes one request. A request that cannot be encoded is
/// skipped; only socket failures are returned.
async fn send_request<S>(
    sink: &mut S,
    config: &TransportConfig,
    request: &Request,
) -> Result<(), tungstenite::Error>
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    let frame = match request.encode(config.request_style, config.max_frame_bytes) {
        Ok(frame) => frame,
        Err(err) => {
            warn!("transport_encode_error: {}: {err}", request.topic());
            return Ok(());
        }
    };
    debug!("transport_outbound: {}", request.topic());
    sink.send(Message::Text(frame)).await
}
