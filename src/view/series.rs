use crate::view::aggregate::Totals;
use serde::Serialize;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const PRODUCTION_SERIES: &str = "Production";
pub const CONSUMPTION_SERIES: &str = "Consumption";

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Sample {
    pub timestamp_ms: i64,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct ChartPoint {
    pub x: i64,
    pub y: f64,
}

impl From<Sample> for ChartPoint {
    fn from(value: Sample) -> Self {
        Self {
            x: value.timestamp_ms,
            y: value.value,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SeriesData {
    pub name: &'static str,
    pub data: Vec<ChartPoint>,
}

/// Consumer of full-window chart updates. Every call replaces whatever the
/// sink showed before.
pub trait ChartSink {
    fn update_series(&mut self, series: &[SeriesData]);
}

/// Exactly `N` samples in a fixed arena; pushing evicts the oldest.
#[derive(Debug, Clone)]
pub struct RollingWindow<const N: usize> {
    values: [Sample; N],
    oldest: usize,
}

impl<const N: usize> RollingWindow<N> {
    const NON_EMPTY: () = assert!(N > 0, "rolling window needs at least one slot");

    /// Fills every slot, ending at `newest_ms` and spaced `period_ms` apart.
    pub fn filled(value: f64, newest_ms: i64, period_ms: i64) -> Self {
        let () = Self::NON_EMPTY;
        let mut values = [Sample::default(); N];
        for (index, slot) in values.iter_mut().enumerate() {
            let steps_back = (N - 1 - index) as i64;
            *slot = Sample {
                timestamp_ms: newest_ms - steps_back * period_ms,
                value,
            };
        }
        Self { values, oldest: 0 }
    }

    pub fn push(&mut self, sample: Sample) {
        self.values[self.oldest] = sample;
        self.oldest = (self.oldest + 1) % N;
    }

    pub fn newest(&self) -> Sample {
        self.values[(self.oldest + N - 1) % N]
    }

    pub fn oldest(&self) -> Sample {
        self.values[self.oldest]
    }

    pub fn len(&self) -> usize {
        N
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Oldest to newest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Sample> {
        self.values[self.oldest..]
            .iter()
            .chain(self.values[..self.oldest].iter())
    }

    pub fn to_points(&self) -> Vec<ChartPoint> {
        self.iter().copied().map(ChartPoint::from).collect()
    }
}

/// Production and consumption history sampled on a fixed period. Sample
/// timestamps run on a logical clock: each new sample is exactly one period
/// after the previous one.
pub struct RollingSeries<C: ChartSink, const N: usize> {
    production: RollingWindow<N>,
    consumption: RollingWindow<N>,
    period_ms: i64,
    sink: C,
}

impl<C: ChartSink, const N: usize> RollingSeries<C, N> {
    /// Starts as a flat line at `initial`, ending at `now_ms`.
    pub fn new(initial: Totals, now_ms: i64, period: Duration, sink: C) -> Self {
        let period_ms = period.as_millis().min(i64::MAX as u128) as i64;
        Self {
            production: RollingWindow::filled(initial.production, now_ms, period_ms),
            consumption: RollingWindow::filled(initial.consumption, now_ms, period_ms),
            period_ms,
            sink,
        }
    }

    pub fn advance(&mut self, totals: Totals) {
        let timestamp_ms = self.production.newest().timestamp_ms + self.period_ms;
        self.production.push(Sample {
            timestamp_ms,
            value: totals.production,
        });
        self.consumption.push(Sample {
            timestamp_ms,
            value: totals.consumption,
        });
        self.redraw();
    }

    pub fn redraw(&mut self) {
        let frame = self.frame();
        self.sink.update_series(&frame);
    }

    pub fn frame(&self) -> [SeriesData; 2] {
        [
            SeriesData {
                name: PRODUCTION_SERIES,
                data: self.production.to_points(),
            },
            SeriesData {
                name: CONSUMPTION_SERIES,
                data: self.consumption.to_points(),
            },
        ]
    }

    pub fn production(&self) -> &RollingWindow<N> {
        &self.production
    }

    pub fn consumption(&self) -> &RollingWindow<N> {
        &self.consumption
    }

    pub fn sink(&self) -> &C {
        &self.sink
    }
}

pub fn now_unix_ms() -> i64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(duration) => duration.as_millis().min(i64::MAX as u128) as i64,
        Err(_) => 0,
    }
}
