//! LSP client driving one checker process over stdio.
//!
//! The process runs in its own process group with piped stdio. A reader task
//! routes responses to waiting requests by id; responses that arrive after
//! their request timed out find no waiter and are dropped.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use super::codec;
use super::definition::{classify_definition, classify_diagnostics, path_to_uri};
use crate::domain::errors::StartupError;
use crate::domain::models::{
    Availability, Checker, RequestKind, RequestOutcome, RequestResult, Sample,
};
use crate::domain::ports::CheckerSession;

const STDERR_TAIL_LINES: usize = 40;

type PendingMap = Arc<std::sync::Mutex<HashMap<u64, oneshot::Sender<Value>>>>;
type SharedWriter = Arc<Mutex<Option<ChildStdin>>>;

fn lock_pending(pending: &PendingMap) -> MutexGuard<'_, HashMap<u64, oneshot::Sender<Value>>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A registered waiter for one response. Dropping it removes the entry, so a
/// call abandoned mid-flight leaves nothing behind in the map.
struct PendingGuard {
    pending: PendingMap,
    id: u64,
}

impl PendingGuard {
    fn register(pending: &PendingMap, id: u64) -> (Self, oneshot::Receiver<Value>) {
        let (tx, rx) = oneshot::channel();
        lock_pending(pending).insert(id, tx);
        let guard = Self {
            pending: Arc::clone(pending),
            id,
        };
        (guard, rx)
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        lock_pending(&self.pending).remove(&self.id);
    }
}

/// JSON-RPC message; `params` is omitted when null.
fn envelope(id: Option<u64>, method: &str, params: Value) -> Value {
    let mut message = json!({"jsonrpc": "2.0", "method": method});
    if let Some(id) = id {
        message["id"] = json!(id);
    }
    if !params.is_null() {
        message["params"] = params;
    }
    message
}

/// Timing knobs for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LspSessionOptions {
    pub startup_timeout: Duration,
    pub request_timeout: Duration,
    pub shutdown_grace: Duration,
    pub didopen_warmup: Duration,
}

impl Default for LspSessionOptions {
    fn default() -> Self {
        Self {
            startup_timeout: Duration::from_secs(120),
            request_timeout: Duration::from_secs(10),
            shutdown_grace: Duration::from_secs(3),
            didopen_warmup: Duration::from_millis(100),
        }
    }
}

/// Failure of a single JSON-RPC call.
#[derive(Debug, Error)]
enum CallError {
    #[error("request timed out")]
    Timeout,

    #[error("server closed the connection")]
    Closed,

    #[error("server error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("transport error: {0}")]
    Transport(String),
}

/// A live LSP session with one checker process.
pub struct LspClient {
    name: String,
    root: PathBuf,
    child: Option<Child>,
    pgid: Option<i32>,
    writer: SharedWriter,
    pending: PendingMap,
    next_id: u64,
    gate: Arc<Mutex<()>>,
    opened: HashSet<PathBuf>,
    reader: Option<JoinHandle<()>>,
    stderr_task: Option<JoinHandle<()>>,
    stderr_tail: Arc<Mutex<VecDeque<String>>>,
    options: LspSessionOptions,
    stopped: bool,
}

impl LspClient {
    /// Spawn the checker and complete the initialize handshake.
    pub async fn start(
        checker: &Checker,
        workspace_root: &Path,
        options: LspSessionOptions,
    ) -> Result<Self, StartupError> {
        if let Availability::NotInstalled(reason) = &checker.availability {
            return Err(StartupError::NotInstalled(reason.clone()));
        }

        let config = &checker.config;
        let root = tokio::fs::canonicalize(workspace_root)
            .await
            .unwrap_or_else(|_| workspace_root.to_path_buf());

        let mut command = Command::new(&config.command);
        command
            .args(&config.args)
            .current_dir(&root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command
            .spawn()
            .map_err(|e| StartupError::from_spawn(&config.command, &e))?;
        let pgid = child.id().and_then(|pid| i32::try_from(pid).ok());

        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            let _ = child.start_kill();
            return Err(StartupError::SpawnFailed(format!(
                "{}: stdio not captured",
                config.command
            )));
        };

        debug!(checker = %checker.key(), pid = ?pgid, root = %root.display(), "checker process spawned");

        let writer: SharedWriter = Arc::new(Mutex::new(Some(stdin)));
        let pending: PendingMap = Arc::default();
        let stderr_tail = Arc::new(Mutex::new(VecDeque::with_capacity(STDERR_TAIL_LINES)));

        let reader = tokio::spawn(read_loop(
            checker.key().to_string(),
            stdout,
            Arc::clone(&pending),
            Arc::clone(&writer),
            config.settings.clone(),
        ));
        let stderr_task = tokio::spawn(drain_stderr(
            checker.key().to_string(),
            stderr,
            Arc::clone(&stderr_tail),
        ));

        let mut client = Self {
            name: checker.key().to_string(),
            root,
            child: Some(child),
            pgid,
            writer,
            pending,
            next_id: 1,
            gate: Arc::new(Mutex::new(())),
            opened: HashSet::new(),
            reader: Some(reader),
            stderr_task: Some(stderr_task),
            stderr_tail,
            options,
            stopped: false,
        };

        match client.initialize(config.settings.clone()).await {
            Ok(()) => Ok(client),
            Err(err) => {
                client.force_kill().await;
                Err(err)
            }
        }
    }

    async fn initialize(&mut self, settings: Option<Value>) -> Result<(), StartupError> {
        let root_uri = path_to_uri(&self.root);
        let folder_name = self
            .root
            .file_name()
            .map_or_else(|| "workspace".to_string(), |n| n.to_string_lossy().into_owned());

        let params = json!({
            "processId": std::process::id(),
            "clientInfo": {"name": "typebench", "version": env!("CARGO_PKG_VERSION")},
            "rootUri": root_uri,
            "rootPath": self.root.to_string_lossy(),
            "workspaceFolders": [{"uri": root_uri, "name": folder_name}],
            "initializationOptions": settings.clone().unwrap_or_else(|| json!({})),
            "capabilities": {
                "textDocument": {
                    "synchronization": {"didSave": false, "dynamicRegistration": false},
                    "definition": {"linkSupport": true, "dynamicRegistration": false},
                    "diagnostic": {"dynamicRegistration": false}
                },
                "workspace": {"configuration": true, "workspaceFolders": true}
            }
        });

        let timeout = self.options.startup_timeout;
        match self.call("initialize", params, timeout).await {
            Ok(_) => {}
            Err(CallError::Timeout) => return Err(StartupError::HandshakeTimeout(timeout)),
            Err(err) => {
                let tail = self.stderr_tail().await;
                let message = if tail.is_empty() {
                    err.to_string()
                } else {
                    format!("{err}; stderr: {tail}")
                };
                return Err(StartupError::HandshakeFailed(message));
            }
        }

        self.notify("initialized", json!({}))
            .await
            .map_err(|e| StartupError::HandshakeFailed(e.to_string()))?;

        if let Some(settings) = settings {
            self.notify(
                "workspace/didChangeConfiguration",
                json!({ "settings": settings }),
            )
            .await
            .map_err(|e| StartupError::HandshakeFailed(e.to_string()))?;
        }

        debug!(checker = %self.name, "initialize handshake complete");
        Ok(())
    }

    async fn send(&self, message: &Value) -> Result<(), CallError> {
        let mut guard = self.writer.lock().await;
        let stdin = guard.as_mut().ok_or(CallError::Closed)?;
        codec::write_message(stdin, message)
            .await
            .map_err(|e| CallError::Transport(e.to_string()))
    }

    async fn notify(&self, method: &str, params: Value) -> Result<(), CallError> {
        self.send(&envelope(None, method, params)).await
    }

    async fn call(
        &mut self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, CallError> {
        let id = self.next_id;
        self.next_id += 1;

        let (_waiter, rx) = PendingGuard::register(&self.pending, id);
        self.send(&envelope(Some(id), method, params)).await?;

        match tokio::time::timeout(timeout, rx).await {
            Err(_) => {
                trace!(checker = %self.name, id, method, "request timed out");
                Err(CallError::Timeout)
            }
            Ok(Err(_)) => Err(CallError::Closed),
            Ok(Ok(response)) => {
                if let Some(error) = response.get("error") {
                    return Err(CallError::Rpc {
                        code: error.get("code").and_then(Value::as_i64).unwrap_or(0),
                        message: error
                            .get("message")
                            .and_then(Value::as_str)
                            .unwrap_or("unknown error")
                            .to_string(),
                    });
                }
                Ok(response.get("result").cloned().unwrap_or(Value::Null))
            }
        }
    }

    async fn ensure_open(&mut self, path: &Path, uri: &str) -> Result<(), String> {
        if self.opened.contains(path) {
            return Ok(());
        }

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
        let text = String::from_utf8_lossy(&bytes);

        self.notify(
            "textDocument/didOpen",
            json!({
                "textDocument": {
                    "uri": uri,
                    "languageId": "python",
                    "version": 1,
                    "text": text
                }
            }),
        )
        .await
        .map_err(|e| e.to_string())?;
        self.opened.insert(path.to_path_buf());

        if !self.options.didopen_warmup.is_zero() {
            tokio::time::sleep(self.options.didopen_warmup).await;
        }
        Ok(())
    }

    async fn stderr_tail(&self) -> String {
        let tail = self.stderr_tail.lock().await;
        tail.iter().cloned().collect::<Vec<_>>().join(" | ")
    }

    fn reader_finished(&self) -> bool {
        self.reader.as_ref().is_none_or(JoinHandle::is_finished)
    }

    fn kill_group(&self) {
        #[cfg(unix)]
        if let Some(pgid) = self.pgid {
            use nix::sys::signal::{killpg, Signal};
            use nix::unistd::Pid;

            if let Err(err) = killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
                trace!(checker = %self.name, pgid, error = %err, "killpg failed");
            }
        }
    }

    fn abort_tasks(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        if let Some(stderr) = self.stderr_task.take() {
            stderr.abort();
        }
    }

    async fn force_kill(&mut self) {
        self.stopped = true;
        self.writer.lock().await.take();
        self.kill_group();
        if let Some(mut child) = self.child.take() {
            if let Err(err) = child.kill().await {
                trace!(checker = %self.name, error = %err, "kill after failed startup");
            }
        }
        self.abort_tasks();
    }

    /// Shut down gracefully: `shutdown`, `exit`, wait the grace period, then
    /// SIGKILL the process group. Idempotent.
    pub async fn shutdown(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        let grace = self.options.shutdown_grace;

        if !self.reader_finished() {
            if let Err(err) = self.call("shutdown", Value::Null, grace).await {
                debug!(checker = %self.name, error = %err, "shutdown request failed");
            }
            if let Err(err) = self.notify("exit", Value::Null).await {
                trace!(checker = %self.name, error = %err, "exit notification failed");
            }
        }
        self.writer.lock().await.take();

        if let Some(child) = self.child.as_mut() {
            match tokio::time::timeout(grace, child.wait()).await {
                Ok(Ok(status)) => debug!(checker = %self.name, ?status, "checker exited"),
                Ok(Err(err)) => warn!(checker = %self.name, error = %err, "error waiting for checker exit"),
                Err(_) => warn!(checker = %self.name, "checker did not exit within grace period, killing"),
            }
        }

        self.kill_group();
        if let Some(mut child) = self.child.take() {
            if matches!(child.try_wait(), Ok(None)) {
                let _ = child.kill().await;
            }
        }
        self.abort_tasks();
    }
}

#[async_trait]
impl CheckerSession for LspClient {
    async fn request(&mut self, sample: &Sample, kind: RequestKind) -> RequestResult {
        let gate = Arc::clone(&self.gate);
        let _inflight = gate.lock().await;

        let path = self.root.join(&sample.file);
        let uri = path_to_uri(&path);
        if let Err(message) = self.ensure_open(&path, &uri).await {
            return RequestResult {
                latency: Duration::ZERO,
                outcome: RequestOutcome::ProtocolError { message },
            };
        }

        let params = match kind {
            RequestKind::Definition => json!({
                "textDocument": {"uri": uri},
                "position": {
                    "line": sample.position.line,
                    "character": sample.position.character
                }
            }),
            RequestKind::Diagnostics => json!({"textDocument": {"uri": uri}}),
        };

        let timeout = self.options.request_timeout;
        let started = Instant::now();
        let result = self.call(kind.method(), params, timeout).await;
        let latency = started.elapsed();

        let outcome = match result {
            Ok(value) => match kind {
                RequestKind::Definition => classify_definition(&value),
                RequestKind::Diagnostics => classify_diagnostics(&value),
            },
            Err(CallError::Timeout) => RequestOutcome::Timeout,
            Err(err) => RequestOutcome::ProtocolError {
                message: err.to_string(),
            },
        };

        trace!(checker = %self.name, sample = %sample, outcome = outcome.class(), ?latency, "request finished");
        RequestResult { latency, outcome }
    }

    async fn stop(&mut self) {
        self.shutdown().await;
    }

    fn pid(&self) -> Option<u32> {
        self.pgid.and_then(|p| u32::try_from(p).ok())
    }
}

impl Drop for LspClient {
    fn drop(&mut self) {
        if self.stopped {
            return;
        }
        self.kill_group();
        if let Some(mut child) = self.child.take() {
            let _ = child.start_kill();
        }
        self.abort_tasks();
    }
}

async fn read_loop(
    name: String,
    stdout: ChildStdout,
    pending: PendingMap,
    writer: SharedWriter,
    settings: Option<Value>,
) {
    let mut reader = BufReader::new(stdout);
    loop {
        match codec::read_message(&mut reader).await {
            Ok(Some(message)) => dispatch(&name, message, &pending, &writer, settings.as_ref()).await,
            Ok(None) => {
                debug!(checker = %name, "checker closed stdout");
                break;
            }
            Err(err) => {
                warn!(checker = %name, error = %err, "failed to read from checker");
                break;
            }
        }
    }
    // Dropping the senders wakes every waiter with `Closed`.
    lock_pending(&pending).clear();
}

async fn dispatch(
    name: &str,
    message: Value,
    pending: &PendingMap,
    writer: &SharedWriter,
    settings: Option<&Value>,
) {
    let method = message.get("method").and_then(Value::as_str);
    let id = message.get("id");

    match (method, id) {
        (Some(method), Some(id)) => {
            let result = server_request_result(method, &message, settings);
            let reply = json!({"jsonrpc": "2.0", "id": id, "result": result});
            let mut guard = writer.lock().await;
            if let Some(stdin) = guard.as_mut() {
                if let Err(err) = codec::write_message(stdin, &reply).await {
                    trace!(checker = %name, method, error = %err, "failed to answer server request");
                }
            }
        }
        (None, Some(id)) => {
            let Some(id) = id.as_u64() else {
                trace!(checker = %name, ?id, "response with non-numeric id");
                return;
            };
            let waiter = lock_pending(pending).remove(&id);
            match waiter {
                Some(waiter) => {
                    let _ = waiter.send(message);
                }
                None => trace!(checker = %name, id, "discarding late response"),
            }
        }
        (Some(method), None) => trace!(checker = %name, method, "notification"),
        (None, None) => trace!(checker = %name, "message without method or id"),
    }
}

fn server_request_result(method: &str, message: &Value, settings: Option<&Value>) -> Value {
    match method {
        "workspace/configuration" => {
            let items = message
                .pointer("/params/items")
                .and_then(Value::as_array)
                .map_or(0, Vec::len);
            let answer = settings.cloned().unwrap_or(Value::Null);
            Value::Array(vec![answer; items])
        }
        _ => Value::Null,
    }
}

async fn drain_stderr(name: String, stderr: ChildStderr, tail: Arc<Mutex<VecDeque<String>>>) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        trace!(checker = %name, "stderr: {line}");
        let mut tail = tail.lock().await;
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }
}
