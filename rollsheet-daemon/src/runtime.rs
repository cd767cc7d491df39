use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, RwLock};

use rollsheet_core::{registry, BindingId, ListId, MemberId, RosterMember};
use rollsheet_sync::{BindingReport, Change, Outcome, SyncOrchestrator};

use crate::error::{io_err, DaemonError};
use crate::paths::socket_path;
use crate::protocol::{DaemonRequest, DaemonResponse};

/// Per-binding last-event timestamps (Unix seconds), keyed by binding id.
pub type EventTimestamps = HashMap<String, u64>;

/// Outcome counters since the daemon started.
#[derive(Debug, Clone, Default, Serialize)]
struct OutcomeCounts {
    applied: u64,
    unlinked: u64,
    failed: u64,
}

#[derive(Debug, Default)]
struct Activity {
    timestamps: EventTimestamps,
    counts: OutcomeCounts,
}

struct DaemonState {
    home: PathBuf,
    orchestrator: Arc<SyncOrchestrator>,
    activity: RwLock<Activity>,
    started_at_unix: u64,
}

/// Wire form of one [`BindingReport`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindingSummary {
    pub binding: String,
    pub list: String,
    pub mirror: String,
    /// `applied`, `unlinked` or `failed`.
    pub outcome: String,
    /// Set when `outcome` is `applied`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change: Option<Change>,
    pub detail: String,
}

impl From<&BindingReport> for BindingSummary {
    fn from(report: &BindingReport) -> Self {
        Self {
            binding: report.binding.id.to_string(),
            list: report.binding.list.to_string(),
            mirror: report.binding.mirror.to_string(),
            outcome: report.outcome.label().to_string(),
            change: report.outcome.change().cloned(),
            detail: report.outcome.to_string(),
        }
    }
}

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(
    home: &Path,
    orchestrator: Arc<SyncOrchestrator>,
) -> Result<(), DaemonError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(home.to_path_buf(), orchestrator))
}

/// Serve roster events on the daemon socket until `stop` or ctrl-c.
pub async fn run(home: PathBuf, orchestrator: Arc<SyncOrchestrator>) -> Result<(), DaemonError> {
    registry::ensure_root_at(&home)?;

    let state = Arc::new(DaemonState {
        home,
        orchestrator,
        activity: RwLock::new(Activity::default()),
        started_at_unix: unix_seconds_now(),
    });
    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let state = state.clone();
        tokio::spawn(async move {
            let result = socket_server_task(state, shutdown.clone(), shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
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

    let (socket_result, signal_result) = tokio::join!(socket_handle, signal_handle);
    handle_join("socket_server", socket_result)?;
    handle_join("signal_handler", signal_result)?;
    Ok(())
}

async fn socket_server_task(
    state: Arc<DaemonState>,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let socket = socket_path(&state.home);
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;
    tracing::info!(socket = %socket.display(), "daemon listening");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let state = state.clone();
                let shutdown_tx = shutdown_tx.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_socket_client(stream, state, shutdown_tx).await {
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
    state: Arc<DaemonState>,
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

        let request = match serde_json::from_str::<DaemonRequest>(&line) {
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
            "status" => match build_status_payload(&state).await {
                Ok(payload) => DaemonResponse::ok(payload),
                Err(err) => DaemonResponse::error(err.to_string()),
            },
            "stop" => {
                let _ = shutdown_tx.send(());
                DaemonResponse::ok(json!({ "stopping": true }))
            }
            _ => match dispatch(&state, request.clone()).await {
                Ok(summaries) => DaemonResponse::ok(json!(summaries)),
                Err(err) => DaemonResponse::error(err.to_string()),
            },
        };

        write_response(&mut writer, &response).await?;
        if request.cmd == "stop" {
            break;
        }
    }

    Ok(())
}

/// Run one roster event (or resync) through the orchestrator.
async fn dispatch(
    state: &DaemonState,
    request: DaemonRequest,
) -> Result<Vec<BindingSummary>, DaemonError> {
    let orchestrator = &state.orchestrator;
    let reports = match request.cmd.as_str() {
        "member_added" => {
            let (list, member) = (required_list(&request)?, required_member(&request)?);
            orchestrator.member_added(&list, &member).await?
        }
        "member_updated" => {
            let (list, member) = (required_list(&request)?, required_member(&request)?);
            orchestrator.member_updated(&list, &member).await?
        }
        "member_removed" => {
            let list = required_list(&request)?;
            let member = request
                .member_id
                .clone()
                .map(MemberId::from)
                .ok_or_else(|| missing("member_removed", "member_id"))?;
            orchestrator.member_removed(&list, &member).await?
        }
        "member_changed" => {
            let member = required_member(&request)?;
            orchestrator.member_changed(&member).await?
        }
        "resync" => {
            let list = required_list(&request)?;
            let binding = request
                .binding
                .clone()
                .map(BindingId::from)
                .ok_or_else(|| missing("resync", "binding"))?;
            vec![orchestrator.full_resync(&list, &binding).await?]
        }
        other => return Err(DaemonError::BadRequest(format!("unknown command '{other}'"))),
    };

    record_reports(state, &reports).await;
    tracing::info!(
        cmd = %request.cmd,
        bindings = reports.len(),
        failed = reports.iter().filter(|r| r.outcome.is_failure()).count(),
        "event processed",
    );
    Ok(reports.iter().map(BindingSummary::from).collect())
}

fn required_list(request: &DaemonRequest) -> Result<ListId, DaemonError> {
    request
        .list
        .clone()
        .map(ListId::from)
        .ok_or_else(|| missing(&request.cmd, "list"))
}

fn required_member(request: &DaemonRequest) -> Result<RosterMember, DaemonError> {
    request
        .member
        .clone()
        .ok_or_else(|| missing(&request.cmd, "member"))
}

fn missing(cmd: &str, field: &str) -> DaemonError {
    DaemonError::BadRequest(format!("'{cmd}' requires '{field}'"))
}

async fn record_reports(state: &DaemonState, reports: &[BindingReport]) {
    let now = unix_seconds_now();
    let mut activity = state.activity.write().await;
    for report in reports {
        activity.timestamps.insert(report.binding.id.to_string(), now);
        match report.outcome {
            Outcome::Applied(_) => activity.counts.applied += 1,
            Outcome::Unlinked => activity.counts.unlinked += 1,
            Outcome::Failed(_) => activity.counts.failed += 1,
        }
    }
}

async fn build_status_payload(state: &DaemonState) -> Result<Value, DaemonError> {
    let registry = state.orchestrator.registry().clone();
    let bindings = tokio::task::spawn_blocking(move || registry.list_all())
        .await
        .map_err(|err| DaemonError::Protocol(format!("registry task join error: {err}")))??;

    // Snapshot activity (read lock, dropped before JSON assembly).
    let (timestamps, counts) = {
        let activity = state.activity.read().await;
        (activity.timestamps.clone(), activity.counts.clone())
    };

    let bindings: Vec<Value> = bindings
        .iter()
        .map(|binding| {
            json!({
                "id": binding.id.as_str(),
                "list": binding.list.as_str(),
                "mirror": binding.mirror.as_str(),
                "last_event_at_unix": timestamps.get(binding.id.as_str()).copied().unwrap_or(0),
            })
        })
        .collect();

    Ok(json!({
        "running": true,
        "started_at_unix": state.started_at_unix,
        "last_event_at_unix": timestamps.values().copied().max().unwrap_or(0),
        "outcomes": counts,
        "bindings": bindings,
        "socket": socket_path(&state.home).display().to_string(),
    }))
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

fn unix_seconds_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Install the global subscriber: `RUST_LOG` filter (default `info`), JSON
/// lines when `ROLLSHEET_LOG_FORMAT=json`. A second call is a no-op.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("ROLLSHEET_LOG_FORMAT")
        .is_ok_and(|format| format.eq_ignore_ascii_case("json"));
    if json {
        let _ = fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .try_init();
    } else {
        let _ = fmt().with_env_filter(filter).with_target(false).try_init();
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

    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use tempfile::TempDir;

    use rollsheet_core::{
        AccessCriteria, BindingRegistry, CredentialRef, MirrorId, SyncBinding, SyncConfig,
    };
    use rollsheet_sync::{
        CellRange, CreatedSheet, EditKind, RosterError, RosterSource, StructuralEdit, TabularApi,
        TabularError,
    };

    use crate::protocol::{request_event, request_status, request_stop};

    /// Identity columns only; enough to drive adds and removes.
    #[derive(Default)]
    struct Columns(Mutex<HashMap<MirrorId, Vec<String>>>);

    #[async_trait]
    impl TabularApi for Columns {
        async fn read_column(
            &self,
            _owner: &CredentialRef,
            mirror: &MirrorId,
            _column: &str,
        ) -> Result<Vec<String>, TabularError> {
            let columns = self.0.lock().unwrap();
            columns.get(mirror).cloned().ok_or(TabularError::NotFound)
        }

        async fn write_range(
            &self,
            _owner: &CredentialRef,
            mirror: &MirrorId,
            range: CellRange,
            values: Vec<Vec<String>>,
        ) -> Result<(), TabularError> {
            let mut columns = self.0.lock().unwrap();
            let column = columns.get_mut(mirror).ok_or(TabularError::NotFound)?;
            for (offset, row) in values.into_iter().enumerate() {
                let at = range.first_row as usize - 1 + offset;
                if column.len() <= at {
                    column.resize(at + 1, String::new());
                }
                column[at] = row.into_iter().next().unwrap_or_default();
            }
            Ok(())
        }

        async fn apply_structural_edit(
            &self,
            _owner: &CredentialRef,
            mirror: &MirrorId,
            edit: StructuralEdit,
        ) -> Result<(), TabularError> {
            let mut columns = self.0.lock().unwrap();
            let column = columns.get_mut(mirror).ok_or(TabularError::NotFound)?;
            match edit.kind {
                EditKind::InsertRows => column.insert(edit.start as usize, String::new()),
                EditKind::DeleteRows => {
                    column.remove(edit.start as usize);
                }
            }
            Ok(())
        }

        async fn create_sheet(
            &self,
            _owner: &CredentialRef,
            _title: &str,
            _initial_rows: u32,
        ) -> Result<CreatedSheet, TabularError> {
            Err(TabularError::Transport("not supported".into()))
        }
    }

    struct Everyone(Vec<RosterMember>);

    #[async_trait]
    impl RosterSource for Everyone {
        async fn criteria_for(
            &self,
            _binding: &SyncBinding,
        ) -> Result<AccessCriteria, RosterError> {
            Ok(AccessCriteria::everyone())
        }

        async fn find_authorized_members(
            &self,
            _list: &ListId,
            _criteria: &AccessCriteria,
        ) -> Result<Vec<RosterMember>, RosterError> {
            Ok(self.0.clone())
        }

        async fn lists_for_member(&self, _member: &MemberId) -> Result<Vec<ListId>, RosterError> {
            Ok(vec![ListId::from("list-1")])
        }
    }

    fn member(id: &str, name: &str) -> RosterMember {
        RosterMember {
            id: MemberId::from(id),
            name: name.to_string(),
            ..RosterMember::default()
        }
    }

    /// State over a registry binding `list-1` to `present` (header only) and `gone`.
    fn state(home: &Path) -> DaemonState {
        let registry = Arc::new(BindingRegistry::open_at(home));
        for mirror in ["present", "gone"] {
            registry
                .create(
                    ListId::from("list-1"),
                    MirrorId::from(mirror),
                    0,
                    CredentialRef::from("owner"),
                )
                .expect("bind");
        }
        let sheets = Columns::default();
        sheets
            .0
            .lock()
            .unwrap()
            .insert(MirrorId::from("present"), vec!["Id".to_string()]);
        let roster = Everyone(vec![member("2", "Alice")]);
        let orchestrator = SyncOrchestrator::new(
            registry,
            Arc::new(sheets),
            Arc::new(roster),
            &SyncConfig::default(),
        );
        DaemonState {
            home: home.to_path_buf(),
            orchestrator: Arc::new(orchestrator),
            activity: RwLock::new(Activity::default()),
            started_at_unix: 1_000_000,
        }
    }

    fn add_request() -> DaemonRequest {
        DaemonRequest {
            list: Some("list-1".into()),
            member: Some(member("2", "Alice")),
            ..DaemonRequest::new("member_added")
        }
    }

    #[tokio::test]
    async fn dispatch_reports_every_binding() {
        let home = TempDir::new().expect("home");
        let state = state(home.path());

        let mut summaries = dispatch(&state, add_request()).await.expect("dispatch");
        summaries.sort_by(|a, b| a.mirror.cmp(&b.mirror));

        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].mirror, "gone");
        assert_eq!(summaries[0].outcome, "unlinked");
        assert_eq!(summaries[1].mirror, "present");
        assert_eq!(summaries[1].outcome, "applied");
        assert_eq!(summaries[1].detail, "inserted at row 1");
    }

    #[test]
    fn dispatch_rejects_incomplete_requests() {
        let home = TempDir::new().expect("home");
        let state = state(home.path());

        let err = tokio_test::block_on(dispatch(&state, DaemonRequest::new("member_added")))
            .unwrap_err();
        assert_eq!(err.to_string(), "bad request: 'member_added' requires 'list'");

        let request = DaemonRequest {
            list: Some("list-1".into()),
            ..DaemonRequest::new("member_removed")
        };
        let err = tokio_test::block_on(dispatch(&state, request)).unwrap_err();
        assert!(matches!(err, DaemonError::BadRequest(_)));

        let err =
            tokio_test::block_on(dispatch(&state, DaemonRequest::new("reindex"))).unwrap_err();
        assert_eq!(err.to_string(), "bad request: unknown command 'reindex'");
    }

    #[tokio::test]
    async fn status_payload_before_any_event() {
        let home = TempDir::new().expect("home");
        let state = state(home.path());

        let payload = build_status_payload(&state).await.expect("status");
        assert_eq!(payload["running"], json!(true));
        assert_eq!(payload["started_at_unix"], json!(1_000_000u64));
        assert_eq!(payload["last_event_at_unix"], json!(0u64));
        assert_eq!(payload["bindings"].as_array().expect("bindings").len(), 2);
        assert_eq!(payload["outcomes"]["applied"], json!(0u64));
    }

    #[tokio::test]
    async fn status_payload_tracks_events_and_unlinks() {
        let home = TempDir::new().expect("home");
        let state = state(home.path());
        dispatch(&state, add_request()).await.expect("dispatch");

        let payload = build_status_payload(&state).await.expect("status");
        let bindings = payload["bindings"].as_array().expect("bindings");
        assert_eq!(bindings.len(), 1, "unlinked binding is gone");
        assert_eq!(bindings[0]["mirror"], json!("present"));
        assert!(bindings[0]["last_event_at_unix"].as_u64().unwrap() > 0);
        assert_eq!(payload["outcomes"]["applied"], json!(1u64));
        assert_eq!(payload["outcomes"]["unlinked"], json!(1u64));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn socket_round_trip_event_status_and_stop() {
        let home = TempDir::new().expect("home");
        let state = Arc::new(state(home.path()));
        let (shutdown_tx, _) = broadcast::channel::<()>(4);

        let server = {
            let shutdown = shutdown_tx.clone();
            tokio::spawn(socket_server_task(state, shutdown.clone(), shutdown.subscribe()))
        };

        let client_home = home.path().to_path_buf();
        let (status, event) = tokio::task::spawn_blocking(move || {
            let status = request_status(&client_home).expect("status");
            let event = request_event(&client_home, &add_request()).expect("event");
            request_stop(&client_home).expect("stop");
            (status, event)
        })
        .await
        .expect("client");

        assert_eq!(status["running"], json!(true));
        assert_eq!(event.as_array().expect("summaries").len(), 2);

        tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .expect("server exits after stop")
            .expect("join")
            .expect("server result");
        assert!(!socket_path(home.path()).exists());
    }

    #[test]
    fn stale_socket_file_is_replaced() {
        let home = TempDir::new().expect("home");
        let socket = socket_path(home.path());
        fs::create_dir_all(socket.parent().unwrap()).unwrap();
        fs::write(&socket, b"").unwrap();
        prepare_socket_for_bind(&socket).expect("stale socket removed");
        assert!(!socket.exists());
    }

    #[test]
    fn summary_mirrors_report() {
        let home = TempDir::new().expect("home");
        let binding = BindingRegistry::open_at(home.path())
            .create(
                ListId::from("l-1"),
                MirrorId::from("s-1"),
                0,
                CredentialRef::from("o"),
            )
            .expect("bind");
        let report = BindingReport {
            binding,
            outcome: Outcome::Unlinked,
        };
        let summary = BindingSummary::from(&report);
        assert_eq!(summary.outcome, "unlinked");
        assert_eq!(summary.change, None);
        assert_eq!(summary.detail, "mirror deleted; binding unlinked");
        assert_eq!(summary.mirror, "s-1");
        assert_eq!(summary.list, "l-1");

        let applied = BindingReport {
            binding: report.binding.clone(),
            outcome: Outcome::Applied(Change::Inserted { row: 3 }),
        };
        let wire = serde_json::to_value(BindingSummary::from(&applied)).expect("serialize");
        assert_eq!(wire["change"], json!({ "kind": "inserted", "row": 3 }));
        let back: BindingSummary = serde_json::from_value(wire).expect("deserialize");
        assert_eq!(back.change, Some(Change::Inserted { row: 3 }));
    }
}
