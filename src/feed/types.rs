use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

pub const DEFAULT_ENDPOINT: &str = "ws://127.0.0.1:3000/ws";
pub const DEFAULT_RENDER_MODE: RenderMode = RenderMode::Terminal;
pub const DEFAULT_MOCK_MODE: bool = false;
pub const RECONNECT_DELAY_MS: u64 = 100;
pub const SAMPLE_INTERVAL_MS: u64 = 1_000;
pub const HISTORY_LEN: usize = 50;
pub const DEFAULT_LOG_FILE: &str = "prosumer-view.log";

pub const ENDPOINT_ENV: &str = "PROSUMER_VIEW_ENDPOINT";
pub const RENDER_MODE_ENV: &str = "PROSUMER_VIEW_RENDER";
pub const MOCK_MODE_ENV: &str = "PROSUMER_VIEW_MOCK";
pub const LOG_FILE_ENV: &str = "PROSUMER_VIEW_LOG_FILE";

pub type EntityId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProsumerKind {
    Producer,
    Consumer,
    /// Unknown `type` code. Still drawn on the map, never aggregated.
    Other(i64),
}

impl ProsumerKind {
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => Self::Producer,
            1 => Self::Consumer,
            other => Self::Other(other),
        }
    }

    pub fn code(self) -> i64 {
        match self {
            Self::Producer => 0,
            Self::Consumer => 1,
            Self::Other(code) => code,
        }
    }
}

/// One entry of the hub broadcast. The hub also sends `id`, `subtype` and
/// `timestamp`; they are skipped on decode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProsumerRecordWire {
    #[serde(rename = "type")]
    pub kind: i64,
    pub power: f64,
    pub pos_x: f64,
    pub pos_y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProsumerRecord {
    pub kind: ProsumerKind,
    pub power: f64,
    pub pos_x: f64,
    pub pos_y: f64,
}

impl From<ProsumerRecordWire> for ProsumerRecord {
    fn from(value: ProsumerRecordWire) -> Self {
        Self {
            kind: ProsumerKind::from_code(value.kind),
            power: value.power,
            pos_x: value.pos_x,
            pos_y: value.pos_y,
        }
    }
}

impl From<&ProsumerRecord> for ProsumerRecordWire {
    fn from(value: &ProsumerRecord) -> Self {
        Self {
            kind: value.kind.code(),
            power: value.power,
            pos_x: value.pos_x,
            pos_y: value.pos_y,
        }
    }
}

/// Complete hub state as of one message. Never a diff.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProsumerSnapshot {
    records: HashMap<EntityId, ProsumerRecord>,
}

impl ProsumerSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(mut self, id: impl Into<EntityId>, record: ProsumerRecord) -> Self {
        self.records.insert(id.into(), record);
        self
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&ProsumerRecord> {
        self.records.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EntityId, &ProsumerRecord)> {
        self.records.iter()
    }

    pub fn records(&self) -> impl Iterator<Item = &ProsumerRecord> {
        self.records.values()
    }

    pub fn to_wire(&self) -> HashMap<EntityId, ProsumerRecordWire> {
        self.records
            .iter()
            .map(|(id, record)| (id.clone(), record.into()))
            .collect()
    }
}

impl FromIterator<(EntityId, ProsumerRecord)> for ProsumerSnapshot {
    fn from_iter<I: IntoIterator<Item = (EntityId, ProsumerRecord)>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}

pub fn parse_snapshot_payload(payload: &mut [u8]) -> Result<ProsumerSnapshot, AppError> {
    let wire: HashMap<EntityId, ProsumerRecordWire> = simd_json::serde::from_slice(payload)?;
    Ok(wire
        .into_iter()
        .map(|(id, record)| (id, record.into()))
        .collect())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    Terminal,
    Events,
    Headless,
}

impl RenderMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Terminal => "terminal",
            Self::Events => "events",
            Self::Headless => "headless",
        }
    }

    pub fn parse(value: &str) -> Result<Self, AppError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "terminal" => Ok(Self::Terminal),
            "events" => Ok(Self::Events),
            "headless" => Ok(Self::Headless),
            other => Err(AppError::InvalidArgument(format!(
                "render mode must be 'terminal', 'events' or 'headless', got '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ViewerArgs {
    pub endpoint: Option<String>,
    pub render_mode: Option<String>,
    pub mock_mode: Option<String>,
    pub log_file: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewerConfig {
    pub endpoint: String,
    pub render_mode: RenderMode,
    pub mock_mode: bool,
    /// Log destination while the terminal owns the screen.
    pub log_file: PathBuf,
}

impl ViewerArgs {
    pub fn from_env() -> Self {
        Self {
            endpoint: read_env(ENDPOINT_ENV),
            render_mode: read_env(RENDER_MODE_ENV),
            mock_mode: read_env(MOCK_MODE_ENV),
            log_file: read_env(LOG_FILE_ENV),
        }
    }

    pub fn normalize(self) -> Result<ViewerConfig, AppError> {
        let endpoint = self
            .endpoint
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string())
            .trim()
            .to_string();

        let host_part = endpoint
            .strip_prefix("ws://")
            .or_else(|| endpoint.strip_prefix("wss://"));
        match host_part {
            Some(rest) if !rest.is_empty() && !rest.starts_with('/') => {}
            _ => {
                return Err(AppError::InvalidArgument(format!(
                    "endpoint must be a ws:// or wss:// url with a host, got '{endpoint}'"
                )));
            }
        }

        let render_mode = match self.render_mode {
            Some(value) => RenderMode::parse(&value)?,
            None => DEFAULT_RENDER_MODE,
        };

        let mock_mode = match self.mock_mode {
            Some(value) => parse_flag(MOCK_MODE_ENV, &value)?,
            None => DEFAULT_MOCK_MODE,
        };

        let log_file = PathBuf::from(
            self.log_file
                .unwrap_or_else(|| DEFAULT_LOG_FILE.to_string())
                .trim(),
        );

        Ok(ViewerConfig {
            endpoint,
            render_mode,
            mock_mode,
            log_file,
        })
    }
}

fn read_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_flag(name: &str, value: &str) -> Result<bool, AppError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(AppError::InvalidArgument(format!(
            "{name} must be a boolean flag, got '{value}'"
        ))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamConnectionState {
    Connecting,
    Live,
    Reconnecting,
    Stopped,
}

impl StreamConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Live => "live",
            Self::Reconnecting => "reconnecting",
            Self::Stopped => "stopped",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamStatusSnapshot {
    pub state: StreamConnectionState,
    pub endpoint: String,
    pub reconnect_attempt: u32,
    pub messages_received: u64,
    pub parse_errors: u64,
    pub reason: Option<String>,
}

impl StreamStatusSnapshot {
    pub fn stopped(endpoint: String, reason: Option<String>) -> Self {
        Self {
            state: StreamConnectionState::Stopped,
            endpoint,
            reconnect_attempt: 0,
            messages_received: 0,
            parse_errors: 0,
            reason,
        }
    }
}
