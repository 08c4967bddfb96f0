//! HTTP control surface.
//!
//! The server runs on its own thread with its own tokio runtime and never touches the
//! engine. Handlers forward a [`RemoteCmd`] over a channel; the engine loop drains the
//! channel between ticks and answers through a oneshot.

use std::{
    io,
    net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener},
    thread,
    time::Duration,
};

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use serde::Serialize;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, oneshot};
use tower_http::cors::{Any, CorsLayer};

use crate::driver::Driver;
use crate::feedback::FeedbackSink;
use crate::input::{ControlAction, DeviceSample};
use crate::level::LevelDefinition;
use crate::recorder::CompletionSink;
use crate::view::LevelView;

#[derive(Debug)]
pub enum RemoteCmd {
    GetLevel {
        respond: oneshot::Sender<LevelDefinition>,
    },
    GetView {
        respond: oneshot::Sender<LevelView>,
    },
    Control {
        action: ControlAction,
        respond: oneshot::Sender<LevelView>,
    },
    Device {
        sample: Option<DeviceSample>,
        respond: oneshot::Sender<LevelView>,
    },
    Reset {
        respond: oneshot::Sender<LevelView>,
    },
}

#[derive(Clone)]
struct RemoteState {
    tx: mpsc::UnboundedSender<RemoteCmd>,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, String)>;

async fn health() -> &'static str {
    "ok"
}

async fn send_cmd<T>(
    tx: &mpsc::UnboundedSender<RemoteCmd>,
    cmd: RemoteCmd,
    rx: oneshot::Receiver<T>,
) -> Result<T, (StatusCode, String)> {
    tx.send(cmd).map_err(|_| {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            "engine command channel closed".to_string(),
        )
    })?;

    match tokio::time::timeout(Duration::from_secs(2), rx).await {
        Ok(Ok(v)) => Ok(v),
        Ok(Err(_)) => Err((
            StatusCode::SERVICE_UNAVAILABLE,
            "engine did not respond".to_string(),
        )),
        Err(_) => Err((StatusCode::GATEWAY_TIMEOUT, "engine timed out".to_string())),
    }
}

async fn level(State(state): State<RemoteState>) -> ApiResult<LevelDefinition> {
    let (tx, rx) = oneshot::channel();
    let level = send_cmd(&state.tx, RemoteCmd::GetLevel { respond: tx }, rx).await?;
    Ok(Json(level))
}

async fn session_view(State(state): State<RemoteState>) -> ApiResult<LevelView> {
    let (tx, rx) = oneshot::channel();
    let view = send_cmd(&state.tx, RemoteCmd::GetView { respond: tx }, rx).await?;
    Ok(Json(view))
}

async fn session_control(
    State(state): State<RemoteState>,
    Json(action): Json<ControlAction>,
) -> ApiResult<LevelView> {
    let (tx, rx) = oneshot::channel();
    let view = send_cmd(
        &state.tx,
        RemoteCmd::Control {
            action,
            respond: tx,
        },
        rx,
    )
    .await?;
    Ok(Json(view))
}

async fn session_device(
    State(state): State<RemoteState>,
    Json(sample): Json<Option<DeviceSample>>,
) -> ApiResult<LevelView> {
    let (tx, rx) = oneshot::channel();
    let view = send_cmd(
        &state.tx,
        RemoteCmd::Device {
            sample,
            respond: tx,
        },
        rx,
    )
    .await?;
    Ok(Json(view))
}

async fn session_reset(State(state): State<RemoteState>) -> ApiResult<LevelView> {
    let (tx, rx) = oneshot::channel();
    let view = send_cmd(&state.tx, RemoteCmd::Reset { respond: tx }, rx).await?;
    Ok(Json(view))
}

pub fn router(tx: mpsc::UnboundedSender<RemoteCmd>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(health))
        .route("/api/level", get(level))
        .route("/api/session/view", get(session_view))
        .route("/api/session/control", post(session_control))
        .route("/api/session/device", post(session_device))
        .route("/api/session/reset", post(session_reset))
        .with_state(RemoteState { tx })
        .layer(cors)
}

#[derive(Debug, Clone, Serialize)]
pub struct RemoteServerInfo {
    pub addr: SocketAddr,
}

pub struct RemoteServer {
    pub rx: mpsc::UnboundedReceiver<RemoteCmd>,
    shutdown: Option<oneshot::Sender<()>>,
    pub info: RemoteServerInfo,
}

impl RemoteServer {
    pub fn start(port: u16) -> io::Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel::<RemoteCmd>();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port);

        // Bind synchronously so a taken port fails here, not on the server thread.
        let std_listener = TcpListener::bind(addr)?;
        std_listener.set_nonblocking(true)?;
        let info = RemoteServerInfo {
            addr: std_listener.local_addr()?,
        };
        let runtime = tokio::runtime::Runtime::new()?;

        thread::spawn(move || {
            runtime.block_on(async move {
                let listener = match tokio::net::TcpListener::from_std(std_listener) {
                    Ok(listener) => listener,
                    Err(err) => {
                        tracing::error!(%err, "remote api listener setup failed");
                        return;
                    }
                };
                let app = router(tx);
                let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                });
                if let Err(err) = serve.await {
                    tracing::error!(%err, "remote api server error");
                }
            });
        });

        tracing::info!(addr = %info.addr, "remote api listening");
        Ok(Self {
            rx,
            shutdown: Some(shutdown_tx),
            info,
        })
    }

    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for RemoteServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Handles every queued command without blocking. Returns how many were handled.
pub fn drain_remote_commands<F, C>(
    rx: &mut mpsc::UnboundedReceiver<RemoteCmd>,
    driver: &mut Driver<F, C>,
) -> usize
where
    F: FeedbackSink,
    C: CompletionSink,
{
    let mut handled = 0;
    loop {
        let cmd = match rx.try_recv() {
            Ok(cmd) => cmd,
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
        };
        handle_remote_command(driver, cmd);
        handled += 1;
    }
    handled
}

fn handle_remote_command<F, C>(driver: &mut Driver<F, C>, cmd: RemoteCmd)
where
    F: FeedbackSink,
    C: CompletionSink,
{
    match cmd {
        RemoteCmd::GetLevel { respond } => {
            let _ = respond.send(driver.runner().logic().level().clone());
        }
        RemoteCmd::GetView { respond } => {
            let _ = respond.send(driver.view());
        }
        RemoteCmd::Control { action, respond } => {
            driver.control(action);
            let _ = respond.send(driver.view());
        }
        RemoteCmd::Device { sample, respond } => {
            driver.poll_device(sample);
            let _ = respond.send(driver.view());
        }
        RemoteCmd::Reset { respond } => {
            driver.control(ControlAction::Retry);
            let _ = respond.send(driver.view());
        }
    }
}
