use std::fs;
use std::future::{Future, IntoFuture};
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use reposync_core::{Config, LogFormat, MigrateMode, RepositoryRef};
use reposync_forge::{GiteaDestination, GithubSource, MirrorDestination, SourceLister};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{TcpListener, UnixListener, UnixStream};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::error::{io_err, DaemonError};
use crate::intake::EventIntake;
use crate::paths::{run_dir, socket_path, SHUTDOWN_GRACE};
use crate::protocol::{DaemonRequest, DaemonResponse};
use crate::reconciler::Reconciler;
use crate::scheduler::Scheduler;
use crate::shared_ledger::SharedLedger;
use crate::webhook::{self, WebhookState};

/// Everything the control socket needs to answer requests.
struct Services {
    home: PathBuf,
    mode: MigrateMode,
    port: u16,
    reconciler: Arc<Reconciler>,
    scheduler: Option<Arc<Scheduler>>,
    intake: EventIntake,
    started_at_unix: u64,
}

/// Load configuration, start the daemon runtime, and block the current
/// thread until it exits.
pub fn start_blocking(home: &Path) -> Result<(), DaemonError> {
    let config = reposync_core::config::load_at(home)?;
    init_tracing(config.log_format);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(home.to_path_buf(), config))
}

/// Run the daemon against the forges named in `config`.
pub async fn run(home: PathBuf, config: Config) -> Result<(), DaemonError> {
    let timeout = config.request_timeout();
    let source = Arc::new(GithubSource::new(&config.source, timeout)?);
    let destination = Arc::new(GiteaDestination::new(&config, timeout)?);
    serve(home, config, source, destination).await
}

/// Run the daemon with caller-supplied forge clients until a shutdown signal or a
/// `stop` request.
pub async fn serve(
    home: PathBuf,
    config: Config,
    source: Arc<dyn SourceLister>,
    destination: Arc<dyn MirrorDestination>,
) -> Result<(), DaemonError> {
    ensure_runtime_dirs(&home)?;
    let terminate = terminate_signal()?;

    // The socket is the single-instance guard: bind it before the ledger is
    // read or any pass can run.
    let socket = socket_path(&home);
    let socket_listener = bind_control_socket(&socket)?;

    let ledger = SharedLedger::load(config.ledger_path_at(&home));
    let count = ledger.count().await;
    let ledger_path = ledger.path().await;
    tracing::info!(
        count,
        path = %ledger_path.display(),
        "loaded mirrored repositories",
    );

    let mode = config.sync.mode;
    let calls = CancellationToken::new();
    let reconciler = Arc::new(Reconciler::new(source, destination.clone(), ledger.clone()));
    let intake = EventIntake::new(destination, ledger, calls.clone());

    let addr = format!("0.0.0.0:{}", config.server.port);
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err) => {
            remove_socket(&socket);
            return Err(io_err(&addr, err));
        }
    };
    let port = listener
        .local_addr()
        .map(|a| a.port())
        .unwrap_or(config.server.port);
    tracing::info!(%addr, port, %mode, "starting server");

    let scheduler = if mode.polls() {
        let scheduler = Arc::new(Scheduler::new(
            reconciler.clone(),
            config.polling_interval(),
        ));
        if let Err(err) = scheduler.start().await {
            remove_socket(&socket);
            return Err(err);
        }
        Some(scheduler)
    } else {
        None
    };

    let services = Arc::new(Services {
        home: home.clone(),
        mode,
        port,
        reconciler,
        scheduler: scheduler.clone(),
        intake: intake.clone(),
        started_at_unix: unix_seconds_now(),
    });

    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let services = services.clone();
        tokio::spawn(async move {
            let result = socket_server_task(
                socket_listener,
                socket,
                services,
                shutdown.clone(),
                shutdown.subscribe(),
            )
            .await;
            let _ = shutdown.send(());
            result
        })
    };

    let http_handle = {
        let shutdown = shutdown_tx.clone();
        let app = webhook::router(mode, WebhookState::new(intake, config.server.webhook_secret));
        let calls = calls.clone();
        tokio::spawn(async move {
            let result = http_server_task(listener, app, calls, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            let received = tokio::select! {
                _ = shutdown_rx.recv() => return Ok(()),
                signal = tokio::signal::ctrl_c() => signal.map(|()| "ctrl-c"),
                () = terminate => Ok("SIGTERM"),
            };
            match received {
                Ok(signal) => {
                    tracing::info!(signal, "received shutdown signal, shutting down daemon");
                    let _ = shutdown.send(());
                    Ok(())
                }
                Err(err) => Err(DaemonError::Protocol(format!(
                    "signal handler failed: {err}"
                ))),
            }
        })
    };

    let (socket_result, http_result, signal_result) =
        tokio::join!(socket_handle, http_handle, signal_handle);

    // The HTTP server has drained by now; stop polling last.
    if let Some(scheduler) = scheduler {
        scheduler.stop().await;
    }

    handle_join("socket_server", socket_result)?;
    handle_join("http_server", http_result)?;
    handle_join("signal_handler", signal_result)?;
    tracing::info!("daemon stopped");
    Ok(())
}

async fn http_server_task(
    listener: TcpListener,
    app: axum::Router,
    calls: CancellationToken,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let drain = CancellationToken::new();
    let server = {
        let drain = drain.clone();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { drain.cancelled().await })
            .into_future()
    };
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => return result.map_err(|e| io_err("http server", e)),
        _ = shutdown_rx.recv() => {}
    }

    drain.cancel();
    match tokio::time::timeout(SHUTDOWN_GRACE, &mut server).await {
        Ok(result) => result.map_err(|e| io_err("http server", e)),
        Err(_) => {
            tracing::warn!("webhook requests still running after grace period; cancelling remote calls");
            calls.cancel();
            server.await.map_err(|e| io_err("http server", e))
        }
    }
}

/// Installs the SIGTERM handler immediately; the returned future resolves on
/// the first delivery.
#[cfg(unix)]
fn terminate_signal() -> Result<impl Future<Output = ()> + Send, DaemonError> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm =
        signal(SignalKind::terminate()).map_err(|e| io_err("SIGTERM handler", e))?;
    Ok(async move {
        sigterm.recv().await;
    })
}

#[cfg(not(unix))]
fn terminate_signal() -> Result<impl Future<Output = ()> + Send, DaemonError> {
    Ok(std::future::pending())
}

fn bind_control_socket(socket: &Path) -> Result<UnixListener, DaemonError> {
    prepare_socket_for_bind(socket)?;
    let listener = UnixListener::bind(socket).map_err(|e| io_err(socket, e))?;
    if let Err(err) = set_socket_permissions(socket) {
        remove_socket(socket);
        return Err(err);
    }
    Ok(listener)
}

fn remove_socket(socket: &Path) {
    if socket.exists() {
        let _ = fs::remove_file(socket);
    }
}

async fn socket_server_task(
    listener: UnixListener,
    socket: PathBuf,
    services: Arc<Services>,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let services = services.clone();
                let shutdown_tx = shutdown_tx.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_socket_client(stream, services, shutdown_tx).await {
                        tracing::error!(error = %err, "socket client error");
                    }
                });
            }
        }
    }

    remove_socket(&socket);
    Ok(())
}

async fn handle_socket_client(
    stream: UnixStream,
    services: Arc<Services>,
    shutdown_tx: broadcast::Sender<()>,
) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("daemon socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let request: DaemonRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(err) => {
                write_response(
                    &mut writer,
                    &DaemonResponse::error(format!("invalid request JSON: {err}")),
                )
                .await?;
                continue;
            }
        };

        let response = match request.cmd.as_str() {
            "status" => DaemonResponse::ok(build_status_payload(&services).await),
            "sync" => match run_sync(&services).await {
                Ok(summary) => DaemonResponse::ok(summary),
                Err(err) => DaemonResponse::error(err.to_string()),
            },
            "mirror" => mirror_one(&services, request.name, request.clone_url).await,
            "stop" => {
                let _ = shutdown_tx.send(());
                DaemonResponse::ok(json!({ "stopping": true }))
            }
            other => DaemonResponse::error(format!("unknown command '{other}'")),
        };

        write_response(&mut writer, &response).await?;
        if request.cmd == "stop" {
            break;
        }
    }

    Ok(())
}

/// One pass now. Queued through the scheduler loop when polling, so passes
/// never overlap; run directly otherwise.
async fn run_sync(services: &Services) -> Result<Value, DaemonError> {
    let summary = match &services.scheduler {
        Some(scheduler) => scheduler.trigger_now("socket").await?,
        None => {
            services
                .reconciler
                .run_once(&CancellationToken::new(), "socket")
                .await
        }
    };
    Ok(json!(summary))
}

async fn mirror_one(
    services: &Services,
    name: Option<String>,
    clone_url: Option<String>,
) -> DaemonResponse {
    let (Some(name), Some(clone_url)) = (
        name.filter(|n| !n.is_empty()),
        clone_url.filter(|u| !u.is_empty()),
    ) else {
        return DaemonResponse::error("mirror requires a repository name and clone URL");
    };

    let repo = RepositoryRef::new(name, clone_url);
    match services.intake.repository_created(&repo).await {
        Ok(outcome) => DaemonResponse::ok(json!({
            "name": repo.name,
            "outcome": outcome,
        })),
        Err(err) => DaemonResponse::error(err.to_string()),
    }
}

async fn build_status_payload(services: &Services) -> Value {
    let ledger = services.reconciler.ledger();
    let scheduler = match &services.scheduler {
        Some(scheduler) => scheduler.state().await.to_string(),
        None => "disabled".to_string(),
    };
    let last_run = services.reconciler.last_run().await;

    json!({
        "running": true,
        "mode": services.mode,
        "scheduler": scheduler,
        "port": services.port,
        "started_at_unix": services.started_at_unix,
        "mirrored_count": ledger.count().await,
        "ledger_path": ledger.path().await.display().to_string(),
        "last_run": last_run,
        "socket": socket_path(&services.home).display().to_string(),
    })
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::Protocol(format!(
                "daemon socket already in use: {}",
                socket.display()
            )));
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale daemon socket before bind",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

fn ensure_runtime_dirs(home: &Path) -> Result<(), DaemonError> {
    let run = run_dir(home);
    if !run.exists() {
        fs::create_dir_all(&run).map_err(|e| io_err(&run, e))?;
    }
    Ok(())
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &DaemonResponse,
) -> Result<(), DaemonError> {
    let payload = serde_json::to_string(response)?;
    writer
        .write_all(payload.as_bytes())
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("daemon socket flush", e))?;
    Ok(())
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

pub(crate) fn unix_seconds_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Install the global subscriber. `RUST_LOG` overrides the default `info`.
pub fn init_tracing(format: LogFormat) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt().with_env_filter(filter).with_target(false);
    let _ = match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.try_init(),
    };
}

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> Result<(), DaemonError> {
    Ok(())
}
