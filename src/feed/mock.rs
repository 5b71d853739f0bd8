use crate::error::AppError;
use crate::feed::stream::Transport;
use crate::feed::types::{ProsumerKind, ProsumerRecord, ProsumerSnapshot};
use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;
use std::time::Duration;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

pub const DEFAULT_MOCK_PROSUMERS: usize = 12;
pub const DEFAULT_MOCK_INTERVAL_MS: u64 = 250;
const CHURN_PERIOD_STEPS: u64 = 24;

/// Deterministic stand-in for the hub: broadcasts a complete snapshot every
/// `interval`, with prosumers dropping out and rejoining over time.
pub struct MockTransport {
    prosumers: usize,
    interval: Duration,
    step: u64,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new(
            DEFAULT_MOCK_PROSUMERS,
            Duration::from_millis(DEFAULT_MOCK_INTERVAL_MS),
        )
    }
}

impl MockTransport {
    pub fn new(prosumers: usize, interval: Duration) -> Self {
        Self {
            prosumers,
            interval,
            step: 0,
        }
    }
}

impl Transport for MockTransport {
    type Connection = BoxStream<'static, Result<Message, WsError>>;

    async fn connect(&mut self) -> Result<Self::Connection, AppError> {
        let prosumers = self.prosumers;
        let interval = self.interval;
        let start_step = self.step;
        // Carry the clock across reconnects so a reconnect does not replay.
        self.step = self.step.saturating_add(1_000);

        let connection = stream::unfold(start_step, move |step| async move {
            tokio::time::sleep(interval).await;
            let snapshot = build_mock_snapshot(prosumers, step);
            let frame = simd_json::serde::to_string(&snapshot.to_wire())
                .map(Message::Text)
                .map_err(|error| {
                    WsError::Io(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        error.to_string(),
                    ))
                });
            Some((frame, step.saturating_add(1)))
        });

        Ok(connection.boxed())
    }
}

pub fn build_mock_snapshot(prosumers: usize, step: u64) -> ProsumerSnapshot {
    (0..prosumers)
        .filter(|&index| is_present(index, step))
        .map(|index| (format!("mock-{index:02}"), mock_record(index, step)))
        .collect()
}

fn is_present(index: usize, step: u64) -> bool {
    let phase = (step / CHURN_PERIOD_STEPS).wrapping_add(index as u64);
    phase % 5 != 0 || index == 0
}

fn mock_record(index: usize, step: u64) -> ProsumerRecord {
    let kind = if index % 2 == 0 {
        ProsumerKind::Producer
    } else {
        ProsumerKind::Consumer
    };
    let base = 40.0 + (index % 4) as f64 * 15.0;
    let wiggle = ((step + index as u64 * 3) % 11) as f64 * 2.5;

    // Golden-ratio spacing keeps the dots spread over the unit square.
    let pos_x = (0.1 + index as f64 * 0.618_034).fract();
    let pos_y = (0.2 + index as f64 * 0.381_966).fract();

    ProsumerRecord {
        kind,
        power: base + wiggle,
        pos_x,
        pos_y,
    }
}
