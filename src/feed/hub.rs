use crate::error::AppError;
use crate::feed::stream::Transport;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::{connect_async_with_config, MaybeTlsStream, WebSocketStream};

pub type HubWsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A full snapshot grows with the prosumer count; stay generous but bounded.
const MAX_MESSAGE_BYTES: usize = 16 << 20;
const MAX_FRAME_BYTES: usize = 4 << 20;

pub struct HubTransport {
    endpoint: String,
}

impl HubTransport {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn ws_config() -> WebSocketConfig {
    WebSocketConfig {
        max_message_size: Some(MAX_MESSAGE_BYTES),
        max_frame_size: Some(MAX_FRAME_BYTES),
        ..Default::default()
    }
}

pub async fn connect_prosumer_stream(endpoint: &str) -> Result<HubWsStream, AppError> {
    let (stream, _) = connect_async_with_config(endpoint, Some(ws_config()), true).await?;
    Ok(stream)
}

impl Transport for HubTransport {
    type Connection = HubWsStream;

    async fn connect(&mut self) -> Result<Self::Connection, AppError> {
        connect_prosumer_stream(&self.endpoint).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_configured_endpoint() {
        let transport = HubTransport::new("ws://127.0.0.1:3000/ws");
        assert_eq!(transport.endpoint(), "ws://127.0.0.1:3000/ws");
    }

    #[test]
    fn bounds_incoming_message_sizes() {
        let config = ws_config();
        assert_eq!(config.max_message_size, Some(MAX_MESSAGE_BYTES));
        assert_eq!(config.max_frame_size, Some(MAX_FRAME_BYTES));
        assert!(MAX_FRAME_BYTES <= MAX_MESSAGE_BYTES);
    }

    #[tokio::test]
    async fn connect_failure_is_an_error_not_a_panic() {
        let mut transport = HubTransport::new("ws://127.0.0.1:1/ws");
        assert!(transport.connect().await.is_err());
    }
}
