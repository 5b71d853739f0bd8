use crate::feed::types::{ProsumerSnapshot, HISTORY_LEN, SAMPLE_INTERVAL_MS};
use crate::view::aggregate::{aggregate, Totals};
use crate::view::markers::{MarkerSet, MarkerSurface, ReconcileSummary};
use crate::view::series::{ChartSink, RollingSeries};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

pub const SAMPLE_INTERVAL: Duration = Duration::from_millis(SAMPLE_INTERVAL_MS);

/// Owns the map markers, the latest totals and the rolling chart. Snapshots
/// replace the totals; ticks sample whatever totals are current.
pub struct Application<S: MarkerSurface, C: ChartSink> {
    markers: MarkerSet<S>,
    series: RollingSeries<C, HISTORY_LEN>,
    totals: Totals,
}

impl<S: MarkerSurface, C: ChartSink> Application<S, C> {
    pub fn new(surface: S, sink: C, now_ms: i64) -> Self {
        let totals = Totals::default();
        let mut series = RollingSeries::new(totals, now_ms, SAMPLE_INTERVAL, sink);
        series.redraw();

        Self {
            markers: MarkerSet::new(surface),
            series,
            totals,
        }
    }

    pub fn on_snapshot(&mut self, snapshot: &ProsumerSnapshot) -> ReconcileSummary {
        self.totals = aggregate(snapshot);
        let summary = self.markers.reconcile(snapshot);

        tracing::debug!(
            prosumers = snapshot.len(),
            created = summary.created,
            removed = summary.removed,
            production = self.totals.production,
            consumption = self.totals.consumption,
            "snapshot applied"
        );
        summary
    }

    pub fn on_tick(&mut self) {
        tracing::trace!(
            production = self.totals.production,
            consumption = self.totals.consumption,
            "sample tick"
        );
        self.series.advance(self.totals);
    }

    pub fn totals(&self) -> Totals {
        self.totals
    }

    pub fn markers(&self) -> &MarkerSet<S> {
        &self.markers
    }

    pub fn series(&self) -> &RollingSeries<C, HISTORY_LEN> {
        &self.series
    }

    /// Applies snapshots as they arrive and samples once per period until
    /// cancelled. A backlog of snapshots collapses to the newest one, and
    /// the ticker is polled first so a busy feed cannot starve it. Hands the
    /// application back for a final look.
    pub async fn run(
        mut self,
        mut snapshots: UnboundedReceiver<ProsumerSnapshot>,
        cancel_token: CancellationToken,
    ) -> Self {
        let mut ticker = interval_at(Instant::now() + SAMPLE_INTERVAL, SAMPLE_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = cancel_token.cancelled() => break,
                _ = ticker.tick() => self.on_tick(),
                Some(mut snapshot) = snapshots.recv() => {
                    // Every snapshot is complete, so only the newest matters.
                    while let Ok(newer) = snapshots.try_recv() {
                        snapshot = newer;
                    }
                    self.on_snapshot(&snapshot);
                }
            }
        }

        tracing::info!(
            markers = self.markers.len(),
            production = self.totals.production,
            consumption = self.totals.consumption,
            "viewer loop stopped"
        );
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::types::{ProsumerKind, ProsumerRecord};
    use crate::render::headless::{HeadlessChart, HeadlessSurface};
    use crate::view::series::{SeriesData, CONSUMPTION_SERIES, PRODUCTION_SERIES};
    use parking_lot::Mutex;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    #[derive(Clone, Default)]
    struct FrameCounter {
        frames: Arc<Mutex<u64>>,
    }

    impl FrameCounter {
        fn count(&self) -> u64 {
            *self.frames.lock()
        }
    }

    impl ChartSink for FrameCounter {
        fn update_series(&mut self, _series: &[SeriesData]) {
            *self.frames.lock() += 1;
        }
    }

    fn record(kind: ProsumerKind, power: f64) -> ProsumerRecord {
        ProsumerRecord {
            kind,
            power,
            pos_x: 0.5,
            pos_y: 0.5,
        }
    }

    fn producer_snapshot(id: &str, power: f64) -> ProsumerSnapshot {
        ProsumerSnapshot::new().with_record(id, record(ProsumerKind::Producer, power))
    }

    fn headless_app() -> Application<HeadlessSurface, HeadlessChart> {
        Application::new(HeadlessSurface::new(), HeadlessChart::new(), 0)
    }

    #[test]
    fn draws_initial_flat_chart() {
        let app = headless_app();

        assert_eq!(app.series().sink().frames_received(), 1);
        assert_eq!(app.series().sink().newest_value(PRODUCTION_SERIES), Some(0.0));
        assert_eq!(app.totals(), Totals::default());
        assert!(app.markers().is_empty());
    }

    #[test]
    fn snapshot_replaces_totals_and_markers() {
        let mut app = headless_app();
        let snapshot = ProsumerSnapshot::new()
            .with_record("a", record(ProsumerKind::Producer, 5.0))
            .with_record("b", record(ProsumerKind::Consumer, 3.0));

        let summary = app.on_snapshot(&snapshot);

        assert_eq!(summary.created, 2);
        assert_eq!(
            app.totals(),
            Totals {
                production: 5.0,
                consumption: 3.0
            }
        );
        assert_eq!(app.markers().surface().live_count(), 2);

        app.on_snapshot(&ProsumerSnapshot::new());
        assert_eq!(app.totals(), Totals::default());
        assert!(app.markers().is_empty());
        assert_eq!(app.markers().surface().deleted(), 2);
    }

    #[test]
    fn tick_samples_only_latest_snapshot_in_burst() {
        let mut app = headless_app();
        app.on_snapshot(&producer_snapshot("a", 10.0));
        app.on_snapshot(&producer_snapshot("a", 4.0));
        app.on_snapshot(&producer_snapshot("a", 7.0));

        app.on_tick();

        let values: Vec<f64> = app.series().production().iter().map(|sample| sample.value).collect();
        assert_eq!(values.last(), Some(&7.0));
        assert_eq!(values.iter().filter(|value| **value != 0.0).count(), 1);
    }

    #[test]
    fn tick_reuses_stale_totals_without_new_snapshot() {
        let mut app = headless_app();
        app.on_snapshot(&producer_snapshot("a", 6.0));

        app.on_tick();
        app.on_tick();

        let newest_two: Vec<f64> = app
            .series()
            .production()
            .iter()
            .rev()
            .take(2)
            .map(|sample| sample.value)
            .collect();
        assert_eq!(newest_two, vec![6.0, 6.0]);
        assert_eq!(app.series().sink().frames_received(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn run_loop_samples_once_per_period() {
        let (snapshot_tx, snapshot_rx) = mpsc::unbounded_channel();
        let cancel_token = CancellationToken::new();
        let task = tokio::spawn(headless_app().run(snapshot_rx, cancel_token.clone()));

        snapshot_tx
            .send(producer_snapshot("a", 10.0))
            .expect("viewer should be listening");
        snapshot_tx
            .send(producer_snapshot("a", 4.0))
            .expect("viewer should be listening");
        tokio::time::sleep(Duration::from_millis(1_100)).await;

        snapshot_tx
            .send(
                producer_snapshot("a", 8.0)
                    .with_record("b", record(ProsumerKind::Consumer, 2.0)),
            )
            .expect("viewer should be listening");
        tokio::time::sleep(Duration::from_millis(1_000)).await;

        cancel_token.cancel();
        let app = task.await.expect("viewer task should not panic");

        let chart = app.series().sink();
        assert_eq!(chart.frames_received(), 3);
        assert_eq!(chart.newest_value(PRODUCTION_SERIES), Some(8.0));
        assert_eq!(chart.newest_value(CONSUMPTION_SERIES), Some(2.0));
        let production: Vec<f64> = app.series().production().iter().map(|sample| sample.value).collect();
        assert_eq!(production[HISTORY_LEN - 2], 4.0);
        assert_eq!(app.markers().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn keeps_sampling_after_feed_closes() {
        let (snapshot_tx, snapshot_rx) = mpsc::unbounded_channel();
        let cancel_token = CancellationToken::new();
        let task = tokio::spawn(headless_app().run(snapshot_rx, cancel_token.clone()));

        snapshot_tx
            .send(producer_snapshot("a", 3.0))
            .expect("viewer should be listening");
        drop(snapshot_tx);
        tokio::time::sleep(Duration::from_millis(3_500)).await;

        cancel_token.cancel();
        let app = task.await.expect("viewer task should not panic");

        assert_eq!(app.series().sink().frames_received(), 4);
        assert_eq!(app.series().sink().newest_value(PRODUCTION_SERIES), Some(3.0));
    }

    #[tokio::test(start_paused = true)]
    async fn keeps_ticking_while_feed_floods() {
        let (snapshot_tx, snapshot_rx) = mpsc::unbounded_channel();
        let cancel_token = CancellationToken::new();
        let frames = FrameCounter::default();
        let app = Application::new(HeadlessSurface::new(), frames.clone(), 0);
        let viewer = tokio::spawn(app.run(snapshot_rx, cancel_token.clone()));

        let flood_token = cancel_token.clone();
        let flood = tokio::spawn(async move {
            let mut power = 0.0;
            while !flood_token.is_cancelled() {
                for _ in 0..500 {
                    power += 1.0;
                    let _ = snapshot_tx.send(producer_snapshot("a", power));
                }
                tokio::task::yield_now().await;
            }
        });

        // Let the viewer start its ticker at t = 0.
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }

        // The feed never goes idle, so the paused clock is moved by hand.
        for expected in 2..=4 {
            tokio::time::advance(SAMPLE_INTERVAL).await;
            let mut spins = 0;
            while frames.count() < expected && spins < 10_000 {
                tokio::task::yield_now().await;
                spins += 1;
            }
            assert_eq!(frames.count(), expected, "tick starved by snapshot flood");
        }

        cancel_token.cancel();
        flood.await.expect("flood task should not panic");
        let app = viewer.await.expect("viewer task should not panic");
        assert!(app.totals().production > 0.0);
        assert_eq!(app.markers().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn collapses_backlog_to_newest_snapshot() {
        let (snapshot_tx, snapshot_rx) = mpsc::unbounded_channel();
        let cancel_token = CancellationToken::new();

        for power in 1..=1_000 {
            snapshot_tx
                .send(producer_snapshot("a", f64::from(power)))
                .expect("viewer should be listening");
        }
        snapshot_tx
            .send(producer_snapshot("b", 5.0))
            .expect("viewer should be listening");

        let viewer = tokio::spawn(headless_app().run(snapshot_rx, cancel_token.clone()));
        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel_token.cancel();
        let app = viewer.await.expect("viewer task should not panic");

        assert_eq!(app.totals().production, 5.0);
        assert!(app.markers().contains("b"));
        assert!(!app.markers().contains("a"));
        // One reconcile pass: "a" was never created.
        assert_eq!(app.markers().surface().created(), 1);
        assert_eq!(app.markers().surface().deleted(), 0);
    }
}
