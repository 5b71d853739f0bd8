pub mod app;
pub mod error;
pub mod feed;
pub mod logging;
pub mod render;
mod state;
pub mod view;

use app::Application;
use error::AppError;
use feed::hub::HubTransport;
use feed::mock::MockTransport;
use feed::stream::{ReconnectingStream, Transport};
use feed::types::{ProsumerSnapshot, RenderMode, ViewerArgs};
use logging::{init_tracing, LogTarget};
use render::events::{EventChartSink, EventMarkerSurface, JsonLinesEmitter};
use render::headless::{HeadlessChart, HeadlessSurface};
use render::terminal::{spawn_quit_listener, SharedScene, TerminalChart, TerminalSurface};
use state::AppState;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use view::series::now_unix_ms;

pub fn run() -> Result<(), AppError> {
    let config = ViewerArgs::from_env().normalize()?;
    init_tracing(&LogTarget::for_config(&config))?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(run_viewer(AppState::new(config)))
}

async fn run_viewer(state: AppState) -> Result<(), AppError> {
    tracing::info!(
        endpoint = %state.config.endpoint,
        render = state.config.render_mode.as_str(),
        mock = state.config.mock_mode,
        "starting prosumer viewer"
    );

    let (snapshot_tx, snapshot_rx) = mpsc::unbounded_channel();
    let signal_handle = spawn_signal_listener(state.cancellation_token.clone());
    let stream_handle = if state.config.mock_mode {
        spawn_stream(MockTransport::default(), &state, snapshot_tx)
    } else {
        spawn_stream(
            HubTransport::new(state.config.endpoint.clone()),
            &state,
            snapshot_tx,
        )
    };

    let outcome = match state.config.render_mode {
        RenderMode::Terminal => run_terminal(&state, snapshot_rx).await,
        RenderMode::Events => {
            let emitter = Arc::new(JsonLinesEmitter::new(std::io::stdout()));
            Application::new(
                EventMarkerSurface::new(Arc::clone(&emitter)),
                EventChartSink::new(emitter),
                now_unix_ms(),
            )
            .run(snapshot_rx, state.cancellation_token.clone())
            .await;
            Ok(())
        }
        RenderMode::Headless => {
            Application::new(HeadlessSurface::new(), HeadlessChart::new(), now_unix_ms())
                .run(snapshot_rx, state.cancellation_token.clone())
                .await;
            Ok(())
        }
    };

    state.cancellation_token.cancel();
    let _ = stream_handle.await;
    let _ = signal_handle.await;

    let status = state.stream_status.read().clone();
    tracing::info!(
        state = status.state.as_str(),
        messages = status.messages_received,
        parse_errors = status.parse_errors,
        uptime_secs = state.started_at.elapsed().as_secs(),
        "prosumer viewer stopped"
    );
    outcome
}

async fn run_terminal(
    state: &AppState,
    snapshot_rx: UnboundedReceiver<ProsumerSnapshot>,
) -> Result<(), AppError> {
    let scene = SharedScene::default();
    let chart = TerminalChart::stdout(Arc::clone(&scene), Arc::clone(&state.stream_status))?;
    let quit_handle = spawn_quit_listener(state.cancellation_token.clone());

    let app = Application::new(TerminalSurface::new(scene), chart, now_unix_ms())
        .run(snapshot_rx, state.cancellation_token.clone())
        .await;
    // Leaves the alternate screen before the summary is logged.
    drop(app);

    let _ = quit_handle.await;
    Ok(())
}

fn spawn_stream<T>(
    transport: T,
    state: &AppState,
    snapshot_tx: UnboundedSender<ProsumerSnapshot>,
) -> JoinHandle<()>
where
    T: Transport + 'static,
{
    let stream = ReconnectingStream::new(transport, Arc::clone(&state.stream_status));
    let cancel_token = state.cancellation_token.clone();

    tokio::spawn(stream.run(
        move |snapshot| {
            // The receiver only goes away on shutdown.
            let _ = snapshot_tx.send(snapshot);
        },
        cancel_token,
    ))
}

fn spawn_signal_listener(cancel_token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = cancel_token.cancelled() => {}
            result = tokio::signal::ctrl_c() => match result {
                Ok(()) => {
                    tracing::info!("interrupt received, shutting down");
                    cancel_token.cancel();
                }
                Err(error) => {
                    tracing::warn!(%error, "failed to listen for interrupt");
                    cancel_token.cancelled().await;
                }
            },
        }
    })
}
