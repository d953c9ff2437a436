use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::{stream::BoxStream, StreamExt};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::registry::{
    ActiveSessionPolicy, RegisteredSession, RegistrationGuard, SessionRegistry,
};
use super::workspace::DownloadWorkspace;
use crate::domain::{BotError, DownloadTarget, ProgressEvent, SessionState, UserId};
use crate::ui::{render_bar, BarStyle};
use crate::utils::parse_progress_chunk;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadEvent {
    Progress { event: ProgressEvent, bar: String },
    /// The engine outlived the exit ceiling and was killed.
    TimedOut,
    /// Always the last event of a session.
    Closed(SessionReport),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub owner: UserId,
    pub session_id: u64,
    pub state: SessionState,
    pub dest_dir: PathBuf,
    pub last_percent: Option<u8>,
    pub exit_code: Option<i32>,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled,
    NoActiveSession,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub engine_path: PathBuf,
    /// Placed before the standard arguments.
    pub engine_args: Vec<String>,
    pub stop_timeout_secs: u64,
    pub exit_timeout: Duration,
    pub bar_style: BarStyle,
    pub policy: ActiveSessionPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            engine_path: PathBuf::from("/usr/bin/aria2c"),
            engine_args: Vec::new(),
            stop_timeout_secs: 10,
            exit_timeout: Duration::from_secs(300),
            bar_style: BarStyle::Blue,
            policy: ActiveSessionPolicy::Reject,
        }
    }
}

/// Launches and supervises download engine processes, one per owner.
#[derive(Clone)]
pub struct DownloadCoordinator {
    config: Arc<EngineConfig>,
    registry: Arc<SessionRegistry>,
    workspace: DownloadWorkspace,
    next_id: Arc<AtomicU64>,
}

impl DownloadCoordinator {
    pub fn new(
        config: EngineConfig,
        registry: Arc<SessionRegistry>,
        workspace: DownloadWorkspace,
    ) -> Self {
        Self {
            config: Arc::new(config),
            registry,
            workspace,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    #[cfg(test)]
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn workspace(&self) -> &DownloadWorkspace {
        &self.workspace
    }

    pub fn policy(&self) -> ActiveSessionPolicy {
        self.config.policy
    }

    pub fn is_active(&self, owner: UserId) -> bool {
        self.registry.lookup(owner).is_some()
    }

    fn engine_args(&self, dest_dir: &Path, target: &DownloadTarget) -> Vec<OsString> {
        let mut args: Vec<OsString> = self.config.engine_args.iter().map(OsString::from).collect();
        args.push(format!("--bt-stop-timeout={}", self.config.stop_timeout_secs).into());
        args.push("-d".into());
        args.push(dest_dir.as_os_str().to_owned());
        args.push(target.as_arg().to_owned());
        args
    }

    /// Spawns the engine for `target` into a fresh session directory and
    /// registers it under `owner`. Returns as soon as the process is running.
    pub async fn start(
        &self,
        target: DownloadTarget,
        owner: UserId,
    ) -> Result<DownloadSession, BotError> {
        let session_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (cancel_tx, cancel_rx) = watch::channel(false);

        // Claim the registry slot before spawning so a rejected request never
        // launches a process.
        self.registry.register(
            owner,
            RegisteredSession::new(session_id, target.describe(), cancel_tx),
            self.config.policy,
        )?;
        let guard = RegistrationGuard::new(self.registry.clone(), owner, session_id);
        debug!(user_id = owner, session_id, state = ?SessionState::Created, "Session registered");

        let dest_dir = self.workspace.session_dir(owner, session_id).await?;
        let spawned = Command::new(&self.config.engine_path)
            .args(self.engine_args(&dest_dir, &target))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();
        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                self.workspace.discard(&dest_dir).await;
                return Err(BotError::Spawn(format!(
                    "{}: {}",
                    self.config.engine_path.display(),
                    e
                )));
            }
        };

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BotError::Spawn("engine stdout was not captured".to_string()))?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut reader = BufReader::new(stderr);
                let mut line = Vec::new();
                while matches!(reader.read_until(b'\n', &mut line).await, Ok(n) if n > 0) {
                    let text = String::from_utf8_lossy(&line);
                    debug!(user_id = owner, session_id, "engine: {}", text.trim_end());
                    line.clear();
                }
            });
        }

        info!(
            user_id = owner,
            session_id,
            target = %target.describe(),
            dir = %dest_dir.display(),
            "Download session started"
        );

        Ok(DownloadSession {
            live: Box::new(LiveSession {
                owner,
                session_id,
                dest_dir,
                child,
                stdout: BufReader::new(stdout),
                line: Vec::new(),
                cancel: cancel_rx,
                state: SessionState::Running,
                last_percent: None,
                started_at: Instant::now(),
                exit_code: None,
                bar_style: self.config.bar_style,
                exit_timeout: self.config.exit_timeout,
                _guard: guard,
            }),
        })
    }

    /// Kills the owner's running session, if any.
    pub fn cancel(&self, owner: UserId) -> CancelOutcome {
        match self.registry.unregister(owner) {
            Some(entry) => {
                info!(user_id = owner, session_id = entry.session_id, "Cancelling session");
                entry.signal_cancel();
                CancelOutcome::Cancelled
            }
            None => CancelOutcome::NoActiveSession,
        }
    }
}

/// A running engine process. Drive it with [`DownloadSession::events`].
pub struct DownloadSession {
    live: Box<LiveSession>,
}

impl DownloadSession {
    pub fn session_id(&self) -> u64 {
        self.live.session_id
    }

    pub fn dest_dir(&self) -> &Path {
        &self.live.dest_dir
    }

    /// Streams progress until the session is closed. Dropping the stream kills
    /// the process and releases the registry entry.
    pub fn events(self) -> BoxStream<'static, DownloadEvent> {
        futures::stream::unfold(SessionRuntimeState::Streaming(self.live), |state| async move {
            match state {
                SessionRuntimeState::Streaming(mut live) => {
                    let next = live.next_progress().await;
                    match next {
                        Some(event) => Some((event, SessionRuntimeState::Streaming(live))),
                        None if live.state == SessionState::Cancelled => {
                            Some((live.close(), SessionRuntimeState::Finished))
                        }
                        None => Some(live.await_exit().await),
                    }
                }
                SessionRuntimeState::TimedOut(live) => {
                    Some((live.close(), SessionRuntimeState::Finished))
                }
                SessionRuntimeState::Finished => None,
            }
        })
        .boxed()
    }
}

enum SessionRuntimeState {
    Streaming(Box<LiveSession>),
    TimedOut(Box<LiveSession>),
    Finished,
}

struct LiveSession {
    owner: UserId,
    session_id: u64,
    dest_dir: PathBuf,
    child: Child,
    stdout: BufReader<ChildStdout>,
    line: Vec<u8>,
    cancel: watch::Receiver<bool>,
    state: SessionState,
    last_percent: Option<u8>,
    started_at: Instant,
    exit_code: Option<i32>,
    bar_style: BarStyle,
    exit_timeout: Duration,
    _guard: RegistrationGuard,
}

impl LiveSession {
    /// Reads engine output until the next higher percentage. `None` means the
    /// output ended or the session was cancelled.
    async fn next_progress(&mut self) -> Option<DownloadEvent> {
        loop {
            self.line.clear();
            tokio::select! {
                biased;
                _ = self.cancel.changed() => {
                    self.kill(SessionState::Cancelled).await;
                    return None;
                }
                read = self.stdout.read_until(b'\n', &mut self.line) => match read {
                    Ok(0) => return None,
                    Ok(_) => {
                        let Some(raw) = parse_progress_chunk(&self.line) else {
                            continue;
                        };
                        let percent = raw.min(100) as u8;
                        // Never step backwards, e.g. when a magnet's metadata
                        // finishes and the payload restarts at 0%.
                        if self.last_percent.is_some_and(|last| percent <= last) {
                            continue;
                        }
                        self.last_percent = Some(percent);
                        return Some(DownloadEvent::Progress {
                            event: ProgressEvent { percent },
                            bar: render_bar(percent.into(), self.bar_style),
                        });
                    }
                    Err(e) => {
                        warn!(
                            user_id = self.owner,
                            session_id = self.session_id,
                            "Engine output unreadable: {}",
                            e
                        );
                        return None;
                    }
                },
            }
        }
    }

    /// Waits for the engine to exit once its output has ended, bounded by the
    /// exit ceiling.
    async fn await_exit(mut self: Box<Self>) -> (DownloadEvent, SessionRuntimeState) {
        let live = &mut *self;
        tokio::select! {
            biased;
            _ = live.cancel.changed() => {
                live.kill(SessionState::Cancelled).await;
            }
            waited = tokio::time::timeout(live.exit_timeout, live.child.wait()) => match waited {
                Ok(Ok(status)) => {
                    live.exit_code = status.code();
                    live.state = SessionState::Completed;
                }
                Ok(Err(e)) => {
                    warn!(user_id = live.owner, session_id = live.session_id, "Waiting for engine failed: {}", e);
                    live.state = SessionState::Failed;
                }
                Err(_) => {
                    warn!(
                        user_id = live.owner,
                        session_id = live.session_id,
                        timeout_secs = live.exit_timeout.as_secs(),
                        "Engine timed out"
                    );
                    live.kill(SessionState::TimedOut).await;
                    return (DownloadEvent::TimedOut, SessionRuntimeState::TimedOut(self));
                }
            },
        }
        (self.close(), SessionRuntimeState::Finished)
    }

    async fn kill(&mut self, state: SessionState) {
        self.state = state;
        if let Err(e) = self.child.start_kill() {
            debug!(session_id = self.session_id, "Engine already gone: {}", e);
        }
        match self.child.wait().await {
            Ok(status) => self.exit_code = status.code(),
            Err(e) => warn!(session_id = self.session_id, "Reaping engine failed: {}", e),
        }
    }

    /// Consumes the session, releasing its registry entry.
    fn close(mut self: Box<Self>) -> DownloadEvent {
        debug_assert!(self.state.is_terminal());
        let report = SessionReport {
            owner: self.owner,
            session_id: self.session_id,
            state: self.state,
            dest_dir: self.dest_dir.clone(),
            last_percent: self.last_percent,
            exit_code: self.exit_code,
            elapsed: self.started_at.elapsed(),
        };
        info!(
            user_id = report.owner,
            session_id = report.session_id,
            state = ?report.state,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Download session closed"
        );
        self.state = SessionState::Closed;
        drop(self);
        DownloadEvent::Closed(report)
    }
}
