use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, oneshot, RwLock};
use tokio::time::MissedTickBehavior;

use roster_core::{config, Secrets};
use roster_sync::pipeline::{self, PreparedCycle};
use roster_sync::{report_store, CycleReport, SyncContext};

use crate::error::{io_err, DaemonError};
use crate::lease::CycleLease;
use crate::paths::{logs_dir, run_dir, socket_path};
use crate::protocol::{DaemonRequest, DaemonResponse};

/// What asked for a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Schedule,
    Socket,
}

struct CycleJob {
    dry_run: bool,
    trigger: Trigger,
    respond_to: oneshot::Sender<Result<CycleReport, String>>,
}

/// Daemon-wide bookkeeping reported by `status`. Dry runs never touch it.
#[derive(Debug, Clone, Serialize)]
pub struct DaemonState {
    pub started_at: DateTime<Utc>,
    pub interval_secs: u64,
    pub cycles_run: u64,
    pub cycles_failed: u64,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_report: Option<CycleReport>,
    pub last_error: Option<String>,
}

impl DaemonState {
    pub fn new(interval: Duration, last_report: Option<CycleReport>) -> Self {
        Self {
            started_at: Utc::now(),
            interval_secs: interval.as_secs(),
            cycles_run: 0,
            cycles_failed: 0,
            last_attempt_at: None,
            last_report,
            last_error: None,
        }
    }
}

type SharedState = Arc<RwLock<DaemonState>>;

/// Connect the production adapters and block the current thread on the
/// daemon runtime until it exits.
pub fn start_blocking(home: &Path) -> Result<(), DaemonError> {
    ensure_runtime_dirs(home)?;
    crate::logging::init_daemon_tracing(home);
    let runtime = build_runtime()?;
    runtime.block_on(async {
        let ctx = connect_at(home)?;
        run(ctx, home.to_path_buf()).await
    })
}

/// One cycle outside the daemon (`roster sync`).
pub fn run_once_blocking(home: &Path, dry_run: bool) -> Result<CycleReport, DaemonError> {
    let runtime = build_runtime()?;
    runtime.block_on(async {
        let ctx = connect_at(home)?;
        run_guarded_cycle(&ctx, home, dry_run).await
    })
}

/// Load, snapshot and plan against the live store and sheet; writes nothing.
pub fn prepare_blocking(home: &Path) -> Result<PreparedCycle, DaemonError> {
    let runtime = build_runtime()?;
    runtime.block_on(async {
        let ctx = connect_at(home)?;
        Ok(pipeline::prepare(&ctx).await?)
    })
}

/// Run one cycle, holding the cross-process lease unless `dry_run`.
pub async fn run_guarded_cycle(
    ctx: &SyncContext,
    home: &Path,
    dry_run: bool,
) -> Result<CycleReport, DaemonError> {
    let _lease = if dry_run {
        None
    } else {
        Some(CycleLease::try_acquire(home)?)
    };
    Ok(pipeline::run(ctx, home, dry_run).await?)
}

/// Run the daemon runtime with an already-built context.
pub async fn run(ctx: SyncContext, home: PathBuf) -> Result<(), DaemonError> {
    ensure_runtime_dirs(&home)?;

    let interval = ctx.config.sync_interval();
    let state: SharedState = Arc::new(RwLock::new(DaemonState::new(
        interval,
        load_last_report(&home),
    )));
    tracing::info!(
        interval_secs = interval.as_secs(),
        socket = %socket_path(&home).display(),
        "roster daemon starting"
    );

    let (job_tx, job_rx) = mpsc::channel::<CycleJob>(16);
    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let scheduler_handle = {
        let shutdown = shutdown_tx.clone();
        let shutdown_rx = shutdown.subscribe();
        let job_tx = job_tx.clone();
        tokio::spawn(async move {
            let result = scheduler_task(interval, job_tx, shutdown_rx).await;
            let _ = shutdown.send(());
            result
        })
    };

    let processor_handle = {
        let shutdown = shutdown_tx.clone();
        let shutdown_rx = shutdown.subscribe();
        let home = home.clone();
        let state = state.clone();
        tokio::spawn(async move {
            let result = processor_task(ctx, home, state, job_rx, shutdown_rx).await;
            let _ = shutdown.send(());
            result
        })
    };

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let shutdown_rx = shutdown.subscribe();
        let home = home.clone();
        let state = state.clone();
        tokio::spawn(async move {
            let result =
                socket_server_task(home, state, job_tx, shutdown.clone(), shutdown_rx).await;
            let _ = shutdown.send(());
            result
        })
    };

    let rotation_handle = {
        let shutdown = shutdown_tx.clone();
        let shutdown_rx = shutdown.subscribe();
        let home = home.clone();
        tokio::spawn(async move {
            let result = log_rotation_task(home, shutdown_rx).await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        let mut shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down daemon");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Protocol(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };

    let (scheduler_result, processor_result, socket_result, rotation_result, signal_result) = tokio::join!(
        scheduler_handle,
        processor_handle,
        socket_handle,
        rotation_handle,
        signal_handle
    );

    handle_join("scheduler", scheduler_result)?;
    handle_join("cycle_processor", processor_result)?;
    handle_join("socket_server", socket_result)?;
    handle_join("log_rotation", rotation_result)?;
    handle_join("signal_handler", signal_result)?;
    tracing::info!("roster daemon stopped");
    Ok(())
}

/// First cycle immediately, then one per `period`. A cycle that outlasts the
/// period swallows the missed ticks instead of queueing them.
async fn scheduler_task(
    period: Duration,
    job_tx: mpsc::Sender<CycleJob>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let mut ticker = tokio::time::interval(period.max(Duration::from_secs(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = ticker.tick() => {
                match enqueue_cycle(&job_tx, Trigger::Schedule, false).await {
                    Ok(report) => tracing::debug!(
                        appended = report.appended,
                        updated = report.updated,
                        cleared = report.cleared,
                        "scheduled cycle done",
                    ),
                    Err(DaemonError::ChannelClosed(_)) => break,
                    // Already logged by the processor; the next tick retries.
                    Err(_) => {}
                }
            }
        }
    }
    Ok(())
}

async fn processor_task(
    ctx: SyncContext,
    home: PathBuf,
    state: SharedState,
    mut job_rx: mpsc::Receiver<CycleJob>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            maybe_job = job_rx.recv() => {
                let Some(job) = maybe_job else { break };
                let outcome = process_job(&ctx, &home, &state, job.trigger, job.dry_run).await;
                let _ = job.respond_to.send(outcome.map_err(|err| err.to_string()));
            }
        }
    }
    Ok(())
}

/// Run one job and record its outcome. This is where a failed cycle turns
/// into a log line; the daemon keeps scheduling either way.
async fn process_job(
    ctx: &SyncContext,
    home: &Path,
    state: &SharedState,
    trigger: Trigger,
    dry_run: bool,
) -> Result<CycleReport, DaemonError> {
    let attempted_at = Utc::now();
    let result = run_guarded_cycle(ctx, home, dry_run).await;

    match &result {
        Ok(report) => tracing::info!(
            trigger = ?trigger,
            dry_run,
            appended = report.appended,
            updated = report.updated,
            cleared = report.cleared,
            duration_ms = report.duration_ms,
            "cycle completed",
        ),
        Err(err @ DaemonError::LeaseBusy { .. }) => {
            tracing::warn!(trigger = ?trigger, error = %err, "cycle skipped")
        }
        Err(err) => tracing::error!(trigger = ?trigger, dry_run, error = %err, "cycle failed"),
    }

    if !dry_run {
        let mut guard = state.write().await;
        guard.last_attempt_at = Some(attempted_at);
        match &result {
            Ok(report) => {
                guard.cycles_run += 1;
                guard.last_report = Some(report.clone());
                guard.last_error = None;
            }
            Err(err) => {
                if !matches!(err, DaemonError::LeaseBusy { .. }) {
                    guard.cycles_failed += 1;
                }
                guard.last_error = Some(err.to_string());
            }
        }
    }
    result
}

async fn socket_server_task(
    home: PathBuf,
    state: SharedState,
    job_tx: mpsc::Sender<CycleJob>,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let run = run_dir(&home);
    if !run.exists() {
        fs::create_dir_all(&run).map_err(|e| io_err(&run, e))?;
    }

    let socket = socket_path(&home);
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let home = home.clone();
                let state = state.clone();
                let job_tx = job_tx.clone();
                let shutdown_tx = shutdown_tx.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_socket_client(stream, home, state, job_tx, shutdown_tx).await {
                        tracing::error!(error = %err, "socket client error");
                    }
                });
            }
        }
    }

    if socket.exists() {
        let _ = fs::remove_file(&socket);
    }
    Ok(())
}

async fn handle_socket_client(
    stream: UnixStream,
    home: PathBuf,
    state: SharedState,
    job_tx: mpsc::Sender<CycleJob>,
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
            "status" => DaemonResponse::ok(build_status_payload(&home, &state).await),
            "sync" => {
                let dry_run = request.dry_run.unwrap_or(false);
                match enqueue_cycle(&job_tx, Trigger::Socket, dry_run).await {
                    Ok(report) => DaemonResponse::ok(json!(report)),
                    Err(err) => DaemonResponse::error(err.to_string()),
                }
            }
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

async fn build_status_payload(home: &Path, state: &SharedState) -> Value {
    let state = state.read().await.clone();
    json!({
        "running": true,
        "started_at": state.started_at,
        "interval_secs": state.interval_secs,
        "cycles_run": state.cycles_run,
        "cycles_failed": state.cycles_failed,
        "last_attempt_at": state.last_attempt_at,
        "last_report": state.last_report,
        "last_error": state.last_error,
        "socket": socket_path(home).display().to_string(),
    })
}

async fn enqueue_cycle(
    job_tx: &mpsc::Sender<CycleJob>,
    trigger: Trigger,
    dry_run: bool,
) -> Result<CycleReport, DaemonError> {
    let (tx, rx) = oneshot::channel();
    job_tx
        .send(CycleJob {
            dry_run,
            trigger,
            respond_to: tx,
        })
        .await
        .map_err(|_| DaemonError::ChannelClosed("cycle queue"))?;

    let outcome = rx
        .await
        .map_err(|_| DaemonError::ChannelClosed("cycle response"))?;
    outcome.map_err(DaemonError::Protocol)
}

async fn log_rotation_task(
    home: PathBuf,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let mut interval = tokio::time::interval(Duration::from_secs(5));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval.tick().await;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = interval.tick() => {
                let home = home.clone();
                // rotate_logs logs its own failures
                tokio::task::spawn_blocking(move || crate::log_rotation::rotate_logs(&home))
                    .await
                    .ok();
            }
        }
    }
    Ok(())
}

fn load_last_report(home: &Path) -> Option<CycleReport> {
    match report_store::load_at(home) {
        Ok(report) => report,
        Err(err) => {
            tracing::warn!(error = %err, "ignoring unreadable cycle report");
            None
        }
    }
}

fn connect_at(home: &Path) -> Result<SyncContext, DaemonError> {
    // Secrets first: loading them reads `.env`, which may also carry the
    // config overrides.
    let secrets = Secrets::from_env()?;
    let config = config::load_at(home)?;
    Ok(roster_remote::connect(config, secrets)?)
}

fn build_runtime() -> Result<tokio::runtime::Runtime, DaemonError> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))
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
    for dir in [run_dir(home), logs_dir(home)] {
        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        }
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

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> Result<(), DaemonError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::TimeZone;
    use roster_core::{ClientId, ClientRecord, RosterConfig};
    use roster_sync::memory::{InMemorySheet, StaticRoster};
    use tempfile::TempDir;
    use tokio::time::Instant;

    fn record(id: i64, phone: &str) -> ClientRecord {
        ClientRecord {
            id: ClientId(id),
            full_name: format!("Client {id}"),
            phone: Some(phone.to_string()),
            telegram_id: None,
            registered_at: Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap(),
            document_tags: ["passport".to_string()].into(),
            folder_id: None,
        }
    }

    fn context(roster: Arc<StaticRoster>) -> SyncContext {
        let config = RosterConfig {
            spreadsheet_id: "test".to_string(),
            ..RosterConfig::default()
        };
        SyncContext::new(config, roster, Arc::new(InMemorySheet::new(50)))
    }

    fn state() -> SharedState {
        Arc::new(RwLock::new(DaemonState::new(Duration::from_secs(60), None)))
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn scheduler_runs_immediately_then_every_interval() {
        let period = Duration::from_secs(60);
        let (job_tx, mut job_rx) = mpsc::channel::<CycleJob>(4);
        let (shutdown_tx, _) = broadcast::channel::<()>(4);
        let handle = tokio::spawn(scheduler_task(period, job_tx, shutdown_tx.subscribe()));

        let start = Instant::now();
        let mut seen = Vec::new();
        for _ in 0..3 {
            let job = job_rx.recv().await.expect("job");
            assert!(!job.dry_run);
            assert_eq!(job.trigger, Trigger::Schedule);
            seen.push(start.elapsed());
            // A failed cycle must not stop the schedule.
            let _ = job.respond_to.send(Err("store unavailable".to_string()));
        }
        assert_eq!(seen, vec![Duration::ZERO, period, period * 2]);

        shutdown_tx.send(()).expect("shutdown");
        handle.await.expect("join").expect("scheduler");
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn slow_cycle_skips_missed_ticks() {
        let period = Duration::from_secs(60);
        let (job_tx, mut job_rx) = mpsc::channel::<CycleJob>(4);
        let (shutdown_tx, _) = broadcast::channel::<()>(4);
        let handle = tokio::spawn(scheduler_task(period, job_tx, shutdown_tx.subscribe()));

        let start = Instant::now();
        let first = job_rx.recv().await.expect("first job");
        tokio::time::advance(Duration::from_secs(150)).await;
        let _ = first.respond_to.send(Err("slow".to_string()));

        let second = job_rx.recv().await.expect("second job");
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(150), "second cycle at {elapsed:?}");
        assert!(job_rx.try_recv().is_err(), "missed ticks must not queue extra cycles");
        let _ = second.respond_to.send(Err("done".to_string()));

        shutdown_tx.send(()).expect("shutdown");
        handle.await.expect("join").expect("scheduler");
    }

    #[tokio::test]
    async fn processor_records_success_and_persists_report() {
        let home = TempDir::new().expect("home");
        let roster = Arc::new(StaticRoster::new(vec![
            record(1, "0501234567"),
            record(2, "0671112233"),
        ]));
        let ctx = context(roster);
        let state = state();

        let report = process_job(&ctx, home.path(), &state, Trigger::Socket, false)
            .await
            .expect("cycle");
        assert_eq!(report.appended, 2);
        assert!(!report.dry_run);

        let snapshot = state.read().await.clone();
        assert_eq!(snapshot.cycles_run, 1);
        assert_eq!(snapshot.last_report.as_ref(), Some(&report));
        assert!(snapshot.last_error.is_none());
        assert_eq!(
            report_store::load_at(home.path()).expect("load"),
            Some(report)
        );
    }

    #[tokio::test]
    async fn failed_cycle_is_recorded_and_next_one_heals() {
        let home = TempDir::new().expect("home");
        let roster = Arc::new(StaticRoster::new(vec![record(1, "0501234567")]));
        let ctx = context(roster.clone());
        let state = state();

        roster.fail_with("connection refused");
        let err = process_job(&ctx, home.path(), &state, Trigger::Schedule, false)
            .await
            .unwrap_err();
        assert!(matches!(err, DaemonError::Sync(_)), "got {err}");
        {
            let snapshot = state.read().await;
            assert_eq!(snapshot.cycles_failed, 1);
            assert!(snapshot
                .last_error
                .as_deref()
                .is_some_and(|e| e.contains("connection refused")));
        }

        roster.recover();
        let report = process_job(&ctx, home.path(), &state, Trigger::Schedule, false)
            .await
            .expect("healed");
        assert_eq!(report.appended, 1);
        assert!(state.read().await.last_error.is_none());
    }

    #[tokio::test]
    async fn held_lease_skips_applied_cycle_but_not_dry_run() {
        let home = TempDir::new().expect("home");
        let roster = Arc::new(StaticRoster::new(vec![record(1, "0501234567")]));
        let ctx = context(roster.clone());
        let state = state();

        let _held = CycleLease::try_acquire(home.path()).expect("lease");
        let err = process_job(&ctx, home.path(), &state, Trigger::Schedule, false)
            .await
            .unwrap_err();
        assert!(matches!(err, DaemonError::LeaseBusy { .. }), "got {err}");
        assert_eq!(roster.calls(), 0, "a skipped cycle must not touch the store");
        assert_eq!(state.read().await.cycles_failed, 0);

        let dry = process_job(&ctx, home.path(), &state, Trigger::Socket, true)
            .await
            .expect("dry run");
        assert!(dry.dry_run);
        assert_eq!(dry.appended, 1);
        assert_eq!(dry.requests, 0);
        assert!(state.read().await.last_report.is_none());
    }

    #[tokio::test]
    async fn status_payload_reports_state() {
        let home = TempDir::new().expect("home");
        let state = state();
        state.write().await.last_error = Some("boom".to_string());

        let payload = build_status_payload(home.path(), &state).await;
        assert_eq!(payload["running"], json!(true));
        assert_eq!(payload["interval_secs"], json!(60));
        assert_eq!(payload["last_error"], json!("boom"));
        assert_eq!(payload["last_report"], Value::Null);
        assert!(payload["socket"]
            .as_str()
            .is_some_and(|s| s.ends_with(".roster/daemon.sock")));
    }
}
