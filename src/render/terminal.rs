use crate::error::AppError;
use crate::feed::types::{StreamConnectionState, StreamStatusSnapshot};
use crate::view::markers::{MarkerPosition, MarkerSurface};
use crate::view::series::{ChartSink, SeriesData};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::{cursor, execute};
use parking_lot::{Mutex, RwLock};
use ratatui::backend::{Backend, CrosstermBackend};
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::symbols::Marker;
use ratatui::text::{Line, Span};
use ratatui::widgets::canvas::{Canvas, Points};
use ratatui::widgets::{Axis, Block, Borders, Chart, Dataset, GraphType, Paragraph};
use ratatui::{Frame, Terminal};
use std::io::{self, Stdout};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const QUIT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// What the terminal currently shows: one slot per marker plus the last
/// chart frame. Freed slots are reused.
#[derive(Debug, Default)]
pub struct TerminalScene {
    dots: Vec<Option<MarkerPosition>>,
    free_slots: Vec<usize>,
    placed: Vec<bool>,
    series: Vec<SeriesData>,
}

pub type SharedScene = Arc<Mutex<TerminalScene>>;

impl TerminalScene {
    fn allocate(&mut self) -> usize {
        if let Some(slot) = self.free_slots.pop() {
            self.placed[slot] = true;
            return slot;
        }
        self.dots.push(None);
        self.placed.push(true);
        self.dots.len() - 1
    }

    fn release(&mut self, slot: usize) {
        if self.placed.get(slot).copied().unwrap_or(false) {
            self.dots[slot] = None;
            self.placed[slot] = false;
            self.free_slots.push(slot);
        }
    }

    pub fn marker_count(&self) -> usize {
        self.placed.iter().filter(|placed| **placed).count()
    }

    pub fn slot_capacity(&self) -> usize {
        self.dots.len()
    }

    /// Canvas coordinates with the origin at the bottom left.
    pub fn dot_coords(&self) -> Vec<(f64, f64)> {
        self.dots
            .iter()
            .flatten()
            .map(|position| (position.left, 100.0 - position.top))
            .collect()
    }
}

pub struct TerminalMarker {
    slot: usize,
}

pub struct TerminalSurface {
    scene: SharedScene,
}

impl TerminalSurface {
    pub fn new(scene: SharedScene) -> Self {
        Self { scene }
    }
}

impl MarkerSurface for TerminalSurface {
    type Handle = TerminalMarker;

    fn create_marker(&mut self, _id: &str) -> Self::Handle {
        TerminalMarker {
            slot: self.scene.lock().allocate(),
        }
    }

    fn set_position(&mut self, handle: &mut Self::Handle, position: MarkerPosition) {
        let mut scene = self.scene.lock();
        if let Some(dot) = scene.dots.get_mut(handle.slot) {
            *dot = Some(position);
        }
    }

    fn delete_marker(&mut self, handle: Self::Handle) {
        self.scene.lock().release(handle.slot);
    }
}

struct RawModeSession;

impl RawModeSession {
    fn enter() -> Result<Self, AppError> {
        enable_raw_mode()?;
        if let Err(error) = execute!(io::stdout(), EnterAlternateScreen, cursor::Hide) {
            let _ = disable_raw_mode();
            return Err(error.into());
        }
        Ok(Self)
    }
}

impl Drop for RawModeSession {
    fn drop(&mut self) {
        let _ = execute!(io::stdout(), LeaveAlternateScreen, cursor::Show);
        let _ = disable_raw_mode();
    }
}

/// Chart sink that redraws the whole screen (map, chart and header) on
/// every chart update.
pub struct TerminalChart<B: Backend> {
    terminal: Terminal<B>,
    scene: SharedScene,
    status: Arc<RwLock<StreamStatusSnapshot>>,
    _session: Option<RawModeSession>,
}

impl TerminalChart<CrosstermBackend<Stdout>> {
    pub fn stdout(
        scene: SharedScene,
        status: Arc<RwLock<StreamStatusSnapshot>>,
    ) -> Result<Self, AppError> {
        let session = RawModeSession::enter()?;
        let terminal = Terminal::new(CrosstermBackend::new(io::stdout()))?;
        Ok(Self {
            terminal,
            scene,
            status,
            _session: Some(session),
        })
    }
}

impl<B: Backend> TerminalChart<B> {
    pub fn with_backend(
        backend: B,
        scene: SharedScene,
        status: Arc<RwLock<StreamStatusSnapshot>>,
    ) -> Result<Self, AppError> {
        Ok(Self {
            terminal: Terminal::new(backend)?,
            scene,
            status,
            _session: None,
        })
    }

    pub fn backend(&self) -> &B {
        self.terminal.backend()
    }

    pub fn draw(&mut self) -> Result<(), AppError> {
        let (dots, series, markers) = {
            let scene = self.scene.lock();
            (scene.dot_coords(), scene.series.clone(), scene.marker_count())
        };
        let status = self.status.read().clone();

        self.terminal
            .draw(|frame| render_scene(frame, &dots, &series, markers, &status))?;
        Ok(())
    }
}

impl<B: Backend> ChartSink for TerminalChart<B> {
    fn update_series(&mut self, series: &[SeriesData]) {
        self.scene.lock().series = series.to_vec();
        if let Err(error) = self.draw() {
            tracing::warn!(%error, "terminal redraw failed");
        }
    }
}

fn render_scene(
    frame: &mut Frame,
    dots: &[(f64, f64)],
    series: &[SeriesData],
    markers: usize,
    status: &StreamStatusSnapshot,
) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Percentage(50),
            Constraint::Min(8),
        ])
        .split(frame.area());

    render_header(frame, rows[0], series, markers, status);

    let map = Canvas::default()
        .block(Block::default().title(" Map ").borders(Borders::ALL))
        .marker(Marker::Braille)
        .x_bounds([0.0, 100.0])
        .y_bounds([0.0, 100.0])
        .paint(|ctx| {
            ctx.draw(&Points {
                coords: dots,
                color: Color::Yellow,
            });
        });
    frame.render_widget(map, rows[1]);

    render_chart(frame, rows[2], series);
}

fn newest(series: &[SeriesData], index: usize) -> f64 {
    series
        .get(index)
        .and_then(|entry| entry.data.last())
        .map(|point| point.y)
        .unwrap_or(0.0)
}

fn render_header(
    frame: &mut Frame,
    area: Rect,
    series: &[SeriesData],
    markers: usize,
    status: &StreamStatusSnapshot,
) {
    let link_color = match status.state {
        StreamConnectionState::Live => Color::Green,
        StreamConnectionState::Stopped => Color::Red,
        StreamConnectionState::Connecting | StreamConnectionState::Reconnecting => Color::Yellow,
    };
    let line = Line::from(vec![
        Span::styled("Production ", Style::default().fg(Color::Green)),
        Span::raw(format!("{:.1}  ", newest(series, 0))),
        Span::styled("Consumption ", Style::default().fg(Color::Red)),
        Span::raw(format!("{:.1}  ", newest(series, 1))),
        Span::raw("link "),
        Span::styled(status.state.as_str(), Style::default().fg(link_color)),
        Span::raw(format!(
            "  prosumers {markers}  rx {}  bad {}",
            status.messages_received, status.parse_errors
        )),
    ]);

    let header = Paragraph::new(line).block(
        Block::default()
            .title(Span::styled(
                " Prosumer View ",
                Style::default().add_modifier(Modifier::BOLD),
            ))
            .title_bottom(" q to quit ")
            .borders(Borders::ALL),
    );
    frame.render_widget(header, area);
}

fn render_chart(frame: &mut Frame, area: Rect, series: &[SeriesData]) {
    let newest_x = series
        .iter()
        .filter_map(|entry| entry.data.last())
        .map(|point| point.x)
        .max()
        .unwrap_or(0);

    // Seconds relative to the newest sample, so the right edge is "now".
    let points: Vec<Vec<(f64, f64)>> = series
        .iter()
        .map(|entry| {
            entry
                .data
                .iter()
                .map(|point| ((point.x - newest_x) as f64 / 1_000.0, point.y))
                .collect()
        })
        .collect();

    let min_x = points
        .iter()
        .flatten()
        .map(|(x, _)| *x)
        .fold(0.0_f64, f64::min);
    let max_y = points
        .iter()
        .flatten()
        .map(|(_, y)| *y)
        .fold(1.0_f64, f64::max)
        * 1.1;

    let colors = [Color::Green, Color::Red];
    let datasets: Vec<Dataset> = series
        .iter()
        .zip(points.iter())
        .enumerate()
        .map(|(index, (entry, data))| {
            Dataset::default()
                .name(entry.name)
                .marker(Marker::Braille)
                .graph_type(GraphType::Line)
                .style(Style::default().fg(colors[index % colors.len()]))
                .data(data)
        })
        .collect();

    let chart = Chart::new(datasets)
        .block(Block::default().title(" Power ").borders(Borders::ALL))
        .x_axis(
            Axis::default()
                .title("s")
                .bounds([min_x, 0.0])
                .labels(vec![Span::raw(format!("{min_x:.0}")), Span::raw("now")]),
        )
        .y_axis(
            Axis::default()
                .bounds([0.0, max_y])
                .labels(vec![Span::raw("0"), Span::raw(format!("{max_y:.0}"))]),
        );
    frame.render_widget(chart, area);
}

fn is_quit_key(key: &KeyEvent) -> bool {
    if key.kind != KeyEventKind::Press {
        return false;
    }
    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => true,
        KeyCode::Char('c') => key.modifiers.contains(KeyModifiers::CONTROL),
        _ => false,
    }
}

/// Watches the keyboard on a blocking thread and cancels on a quit key.
/// Raw mode swallows Ctrl-C as a signal, so it is handled here too.
pub fn spawn_quit_listener(cancel_token: CancellationToken) -> JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        while !cancel_token.is_cancelled() {
            match event::poll(QUIT_POLL_INTERVAL) {
                Ok(true) => match event::read() {
                    Ok(Event::Key(key)) if is_quit_key(&key) => {
                        tracing::info!("quit requested from keyboard");
                        cancel_token.cancel();
                    }
                    Ok(_) => {}
                    Err(error) => {
                        tracing::warn!(%error, "keyboard read failed");
                        break;
                    }
                },
                Ok(false) => {}
                Err(error) => {
                    tracing::warn!(%error, "keyboard poll failed");
                    break;
                }
            }
        }
    })
}
