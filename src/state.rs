use crate::feed::types::{StreamStatusSnapshot, ViewerConfig};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

pub struct AppState {
    pub started_at: Instant,
    pub config: ViewerConfig,
    pub stream_status: Arc<RwLock<StreamStatusSnapshot>>,
    pub cancellation_token: CancellationToken,
}

impl AppState {
    pub fn new(config: ViewerConfig) -> Self {
        let stream_status = StreamStatusSnapshot::stopped(
            config.endpoint.clone(),
            Some("stream idle".to_string()),
        );

        Self {
            started_at: Instant::now(),
            config,
            stream_status: Arc::new(RwLock::new(stream_status)),
            cancellation_token: CancellationToken::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::types::{RenderMode, StreamConnectionState};

    #[test]
    fn starts_stopped_and_not_cancelled() {
        let state = AppState::new(ViewerConfig {
            endpoint: "ws://hub.local:3000/ws".to_string(),
            render_mode: RenderMode::Headless,
            mock_mode: false,
            log_file: "prosumer-view.log".into(),
        });

        let status = state.stream_status.read();
        assert_eq!(status.state, StreamConnectionState::Stopped);
        assert_eq!(status.endpoint, "ws://hub.local:3000/ws");
        assert_eq!(status.reason.as_deref(), Some("stream idle"));
        assert!(!state.cancellation_token.is_cancelled());
    }
}
