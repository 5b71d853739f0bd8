use crate::error::AppError;
use crate::feed::types::{
    parse_snapshot_payload, ProsumerSnapshot, StreamConnectionState, StreamStatusSnapshot,
    RECONNECT_DELAY_MS,
};
use futures_util::{Stream, StreamExt};
use parking_lot::RwLock;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_util::sync::CancellationToken;

pub const RECONNECT_DELAY: Duration = Duration::from_millis(RECONNECT_DELAY_MS);
const PARSE_ERROR_LOG_THROTTLE_MS: u64 = 500;
const CONNECT_ERROR_LOG_EVERY: u32 = 100;

/// Source of push connections. One call to `connect` yields one live
/// connection; the stream ending means the connection is gone.
pub trait Transport: Send {
    type Connection: Stream<Item = Result<Message, WsError>> + Unpin + Send;

    fn connect(&mut self) -> impl Future<Output = Result<Self::Connection, AppError>> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connected,
}

enum FrameDirective {
    Continue,
    Disconnect,
}

#[derive(Debug, Default)]
struct ParseErrorThrottle {
    last_reason: Option<String>,
    last_emit: Option<Instant>,
}

impl ParseErrorThrottle {
    fn allow(&mut self, reason: &str) -> bool {
        let now = Instant::now();
        let repeated = self.last_reason.as_deref() == Some(reason)
            && self
                .last_emit
                .map(|instant| {
                    now.duration_since(instant) < Duration::from_millis(PARSE_ERROR_LOG_THROTTLE_MS)
                })
                .unwrap_or(false);
        if repeated {
            return false;
        }

        self.last_reason = Some(reason.to_string());
        self.last_emit = Some(now);
        true
    }
}

/// Keeps exactly one logical subscription alive. Every disconnect, failed
/// connect included, waits `reconnect_delay` and tries again, forever.
pub struct ReconnectingStream<T> {
    transport: T,
    reconnect_delay: Duration,
    link: LinkState,
    status_store: Arc<RwLock<StreamStatusSnapshot>>,
    parse_error_throttle: ParseErrorThrottle,
}

impl<T: Transport> ReconnectingStream<T> {
    pub fn new(transport: T, status_store: Arc<RwLock<StreamStatusSnapshot>>) -> Self {
        Self {
            transport,
            reconnect_delay: RECONNECT_DELAY,
            link: LinkState::Disconnected,
            status_store,
            parse_error_throttle: ParseErrorThrottle::default(),
        }
    }

    pub fn link_state(&self) -> LinkState {
        self.link
    }

    pub fn reconnect_delay(&self) -> Duration {
        self.reconnect_delay
    }

    pub async fn run<F>(mut self, mut on_snapshot: F, cancel_token: CancellationToken)
    where
        F: FnMut(ProsumerSnapshot) + Send,
    {
        let mut reconnect_attempt = 0_u32;

        while !cancel_token.is_cancelled() {
            if reconnect_attempt == 0 {
                self.publish_status(
                    StreamConnectionState::Connecting,
                    reconnect_attempt,
                    Some("opening websocket stream".to_string()),
                );
            }

            let connected = tokio::select! {
                _ = cancel_token.cancelled() => break,
                result = self.transport.connect() => result,
            };

            match connected {
                Ok(mut connection) => {
                    self.link = LinkState::Connected;
                    reconnect_attempt = 0;
                    self.publish_status(
                        StreamConnectionState::Live,
                        reconnect_attempt,
                        Some("websocket connected".to_string()),
                    );

                    loop {
                        let frame = tokio::select! {
                            _ = cancel_token.cancelled() => break,
                            next_frame = connection.next() => next_frame,
                        };

                        let Some(frame_result) = frame else {
                            tracing::info!("websocket stream ended");
                            break;
                        };

                        match frame_result {
                            Ok(message) => match self.handle_message(message, &mut on_snapshot) {
                                FrameDirective::Continue => {}
                                FrameDirective::Disconnect => {
                                    tracing::info!("websocket closed by peer");
                                    break;
                                }
                            },
                            Err(error) => {
                                tracing::warn!(%error, "websocket frame error");
                                break;
                            }
                        }
                    }

                    self.link = LinkState::Disconnected;
                }
                Err(error) => {
                    if reconnect_attempt <= 1 || reconnect_attempt % CONNECT_ERROR_LOG_EVERY == 0 {
                        tracing::warn!(%error, attempt = reconnect_attempt, "websocket connect error");
                    } else {
                        tracing::debug!(%error, attempt = reconnect_attempt, "websocket connect error");
                    }
                }
            }

            if cancel_token.is_cancelled() {
                break;
            }

            reconnect_attempt = reconnect_attempt.saturating_add(1);
            self.publish_status(
                StreamConnectionState::Reconnecting,
                reconnect_attempt,
                Some(format!(
                    "reconnect attempt {reconnect_attempt} in {} ms",
                    self.reconnect_delay.as_millis()
                )),
            );
            tokio::select! {
                _ = cancel_token.cancelled() => break,
                _ = tokio::time::sleep(self.reconnect_delay) => {}
            }
        }

        self.link = LinkState::Disconnected;
        self.publish_status(
            StreamConnectionState::Stopped,
            0,
            Some("stream stopped".to_string()),
        );
    }

    fn handle_message<F>(&mut self, message: Message, on_snapshot: &mut F) -> FrameDirective
    where
        F: FnMut(ProsumerSnapshot),
    {
        let mut payload = match message {
            Message::Text(text_payload) => text_payload.into_bytes(),
            Message::Binary(binary_payload) => binary_payload,
            Message::Close(_) => return FrameDirective::Disconnect,
            _ => return FrameDirective::Continue,
        };

        match parse_snapshot_payload(payload.as_mut_slice()) {
            Ok(snapshot) => {
                self.status_store.write().messages_received += 1;
                on_snapshot(snapshot);
            }
            Err(error) => {
                self.status_store.write().parse_errors += 1;
                let reason = error.to_string();
                if self.parse_error_throttle.allow(&reason) {
                    tracing::warn!(%reason, "discarding malformed snapshot payload");
                }
            }
        }

        FrameDirective::Continue
    }

    fn publish_status(
        &self,
        state: StreamConnectionState,
        reconnect_attempt: u32,
        reason: Option<String>,
    ) {
        let endpoint = {
            let mut writable = self.status_store.write();
            writable.state = state;
            writable.reconnect_attempt = reconnect_attempt;
            writable.reason = reason.clone();
            writable.endpoint.clone()
        };

        match state {
            StreamConnectionState::Reconnecting => {
                tracing::debug!(%endpoint, state = state.as_str(), reason = ?reason, "stream status");
            }
            _ => {
                tracing::info!(%endpoint, state = state.as_str(), reason = ?reason, "stream status");
            }
        }
    }
}
