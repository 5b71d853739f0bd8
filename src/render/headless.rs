use crate::view::markers::{MarkerPosition, MarkerSurface};
use crate::view::series::{ChartSink, SeriesData};
use std::collections::BTreeMap;

/// Marker backend that keeps the would-be map in memory.
#[derive(Debug, Default)]
pub struct HeadlessSurface {
    live: BTreeMap<String, Option<MarkerPosition>>,
    created: u64,
    positioned: u64,
    deleted: u64,
}

#[derive(Debug)]
pub struct HeadlessMarker {
    id: String,
}

impl HeadlessSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position_of(&self, id: &str) -> Option<MarkerPosition> {
        self.live.get(id).copied().flatten()
    }

    pub fn live_ids(&self) -> impl Iterator<Item = &str> {
        self.live.keys().map(String::as_str)
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn created(&self) -> u64 {
        self.created
    }

    pub fn positioned(&self) -> u64 {
        self.positioned
    }

    pub fn deleted(&self) -> u64 {
        self.deleted
    }
}

impl MarkerSurface for HeadlessSurface {
    type Handle = HeadlessMarker;

    fn create_marker(&mut self, id: &str) -> Self::Handle {
        self.live.insert(id.to_string(), None);
        self.created += 1;
        HeadlessMarker { id: id.to_string() }
    }

    fn set_position(&mut self, handle: &mut Self::Handle, position: MarkerPosition) {
        if let Some(slot) = self.live.get_mut(&handle.id) {
            *slot = Some(position);
            self.positioned += 1;
        }
    }

    fn delete_marker(&mut self, handle: Self::Handle) {
        if self.live.remove(&handle.id).is_some() {
            self.deleted += 1;
        }
    }
}

/// Chart backend that keeps only the latest frame and logs the newest sample.
#[derive(Debug, Default)]
pub struct HeadlessChart {
    frames_received: u64,
    last_frame: Vec<SeriesData>,
}

impl HeadlessChart {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames_received(&self) -> u64 {
        self.frames_received
    }

    pub fn last_frame(&self) -> &[SeriesData] {
        &self.last_frame
    }

    /// Newest value of the named series, if it has been drawn.
    pub fn newest_value(&self, name: &str) -> Option<f64> {
        self.last_frame
            .iter()
            .find(|series| series.name == name)
            .and_then(|series| series.data.last())
            .map(|point| point.y)
    }
}

impl ChartSink for HeadlessChart {
    fn update_series(&mut self, series: &[SeriesData]) {
        self.frames_received += 1;
        self.last_frame = series.to_vec();

        for entry in series {
            if let Some(point) = entry.data.last() {
                tracing::debug!(series = entry.name, at_ms = point.x, value = point.y, "chart sample");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::series::{ChartPoint, CONSUMPTION_SERIES, PRODUCTION_SERIES};

    #[test]
    fn tracks_live_markers_and_counts_operations() {
        let mut surface = HeadlessSurface::new();

        let mut first = surface.create_marker("a");
        let second = surface.create_marker("b");
        surface.set_position(&mut first, MarkerPosition::from_normalized(0.5, 0.25));
        surface.delete_marker(second);

        assert_eq!(surface.live_ids().collect::<Vec<_>>(), vec!["a"]);
        assert_eq!(
            surface.position_of("a"),
            Some(MarkerPosition {
                left: 50.0,
                top: 25.0
            })
        );
        assert_eq!(surface.position_of("b"), None);
        assert_eq!(surface.created(), 2);
        assert_eq!(surface.positioned(), 1);
        assert_eq!(surface.deleted(), 1);
    }

    #[test]
    fn keeps_only_latest_frame() {
        let mut chart = HeadlessChart::new();
        let frame = |value: f64| {
            vec![
                SeriesData {
                    name: PRODUCTION_SERIES,
                    data: vec![ChartPoint { x: 0, y: value }],
                },
                SeriesData {
                    name: CONSUMPTION_SERIES,
                    data: vec![ChartPoint { x: 0, y: value / 2.0 }],
                },
            ]
        };

        chart.update_series(&frame(4.0));
        chart.update_series(&frame(8.0));

        assert_eq!(chart.frames_received(), 2);
        assert_eq!(chart.last_frame().len(), 2);
        assert_eq!(chart.newest_value(PRODUCTION_SERIES), Some(8.0));
        assert_eq!(chart.newest_value(CONSUMPTION_SERIES), Some(4.0));
        assert_eq!(chart.newest_value("Unknown"), None);
    }
}
