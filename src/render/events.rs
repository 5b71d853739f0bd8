use crate::error::AppError;
use crate::render::{
    MARKER_CREATE_EVENT, MARKER_DELETE_EVENT, MARKER_POSITION_EVENT, SERIES_UPDATE_EVENT,
};
use crate::view::markers::{MarkerPosition, MarkerSurface};
use crate::view::series::{ChartSink, SeriesData};
use parking_lot::Mutex;
use serde::Serialize;
use std::io::Write;
use std::sync::Arc;

/// Named-event channel to an external display host.
pub trait EventEmitter: Send + Sync {
    fn emit<P: Serialize>(&self, event: &str, payload: P) -> Result<(), AppError>;
}

#[derive(Serialize)]
struct EventEnvelope<'a, P> {
    event: &'a str,
    payload: P,
}

#[derive(Serialize)]
struct MarkerId<'a> {
    id: &'a str,
}

#[derive(Serialize)]
struct MarkerMoved<'a> {
    id: &'a str,
    left: f64,
    top: f64,
}

/// Writes one `{"event":..,"payload":..}` object per line and flushes it.
pub struct JsonLinesEmitter<W> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesEmitter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl<W: Write + Send> EventEmitter for JsonLinesEmitter<W> {
    fn emit<P: Serialize>(&self, event: &str, payload: P) -> Result<(), AppError> {
        let line = simd_json::serde::to_string(&EventEnvelope { event, payload })?;
        let mut writer = self.writer.lock();
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }
}

fn emit_or_warn<E: EventEmitter, P: Serialize>(emitter: &E, event: &str, payload: P) {
    if let Err(error) = emitter.emit(event, payload) {
        tracing::warn!(event, %error, "failed to emit display event");
    }
}

pub struct EventMarker {
    id: String,
}

pub struct EventMarkerSurface<E> {
    emitter: Arc<E>,
}

impl<E: EventEmitter> EventMarkerSurface<E> {
    pub fn new(emitter: Arc<E>) -> Self {
        Self { emitter }
    }
}

impl<E: EventEmitter> MarkerSurface for EventMarkerSurface<E> {
    type Handle = EventMarker;

    fn create_marker(&mut self, id: &str) -> Self::Handle {
        emit_or_warn(self.emitter.as_ref(), MARKER_CREATE_EVENT, MarkerId { id });
        EventMarker { id: id.to_string() }
    }

    fn set_position(&mut self, handle: &mut Self::Handle, position: MarkerPosition) {
        emit_or_warn(
            self.emitter.as_ref(),
            MARKER_POSITION_EVENT,
            MarkerMoved {
                id: &handle.id,
                left: position.left,
                top: position.top,
            },
        );
    }

    fn delete_marker(&mut self, handle: Self::Handle) {
        emit_or_warn(
            self.emitter.as_ref(),
            MARKER_DELETE_EVENT,
            MarkerId { id: &handle.id },
        );
    }
}

pub struct EventChartSink<E> {
    emitter: Arc<E>,
}

impl<E: EventEmitter> EventChartSink<E> {
    pub fn new(emitter: Arc<E>) -> Self {
        Self { emitter }
    }
}

impl<E: EventEmitter> ChartSink for EventChartSink<E> {
    fn update_series(&mut self, series: &[SeriesData]) {
        emit_or_warn(self.emitter.as_ref(), SERIES_UPDATE_EVENT, series);
    }
}
