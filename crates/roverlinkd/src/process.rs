//! External processes: one-shot parameter jobs and the long-running
//! managed processes restarted by clear-maps.
//!
//! Every job runs in its own task. The timeout is a separate timer task
//! that cancels the job's token; the job task sees the cancellation,
//! interrupts the child and reports `ProcessOutcome::Timeout`.
//!
//! Children lead their own process group, so an interrupt reaches whatever
//! they started too. A timed-out job reports its exit only after the
//! interrupt, up to `INTERRUPT_GRACE + OUTPUT_DRAIN` past its deadline.

use std::process::Stdio;
use std::time::Duration;

use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use roverlink_core::config::ManagedProcess;
use roverlink_services::{GatewayEvent, JobId, ProcessJob, ProcessLauncher, ProcessOutcome};

/// How long an interrupted child gets to exit before it is killed.
const INTERRUPT_GRACE: Duration = Duration::from_secs(2);

/// How long output is still read once the child has exited. Anything that
/// inherited its pipes cannot hold the job open past this.
const OUTPUT_DRAIN: Duration = Duration::from_secs(1);

pub struct TokioLauncher {
    events: mpsc::UnboundedSender<GatewayEvent>,
    managed: Vec<ManagedProcess>,
    running: Vec<CancellationToken>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl TokioLauncher {
    pub fn new(
        events: mpsc::UnboundedSender<GatewayEvent>,
        managed: Vec<ManagedProcess>,
        shutdown: CancellationToken,
        tracker: TaskTracker,
    ) -> Self {
        Self {
            events,
            managed,
            running: Vec::new(),
            shutdown,
            tracker,
        }
    }

    /// Start every managed process. Called once at startup.
    pub fn start_managed(&mut self) -> Vec<String> {
        let mut names = Vec::with_capacity(self.managed.len());
        for proc in &self.managed {
            let token = self.shutdown.child_token();
            self.tracker.spawn(supervise(proc.clone(), token.clone()));
            self.running.push(token);
            names.push(proc.name.clone());
        }
        names
    }
}

impl ProcessLauncher for TokioLauncher {
    fn launch(&mut self, job: ProcessJob) {
        tracing::debug!(job = job.id, program = %job.program, args = ?job.args, "launching job");
        let events = self.events.clone();
        let cancel = self.shutdown.child_token();
        self.tracker.spawn(async move {
            let id = job.id;
            let (outcome, stdout) = run_job(job, events.clone(), cancel).await;
            let _ = events.send(GatewayEvent::ProcessExited {
                job: id,
                outcome,
                stdout,
            });
        });
    }

    fn restart_managed(&mut self) -> Vec<String> {
        for token in self.running.drain(..) {
            token.cancel();
        }
        self.start_managed()
    }
}

// ── One-shot jobs ─────────────────────────────────────────────────────────────

async fn run_job(
    job: ProcessJob,
    events: mpsc::UnboundedSender<GatewayEvent>,
    cancel: CancellationToken,
) -> (ProcessOutcome, String) {
    let mut child = match Command::new(&job.program)
        .args(&job.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0)
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            tracing::warn!(job = job.id, program = %job.program, error = %e, "spawn failed");
            return (ProcessOutcome::SpawnFailed(e.to_string()), String::new());
        }
    };

    let forward = job.forward_output.then(|| events.clone());
    let drained = CancellationToken::new();
    let stdout = tokio::spawn(collect_lines(
        child.stdout.take(),
        job.id,
        forward.clone(),
        drained.clone(),
    ));
    let stderr = tokio::spawn(collect_lines(
        child.stderr.take(),
        job.id,
        forward,
        drained.clone(),
    ));

    let timer = {
        let cancel = cancel.clone();
        let timeout = job.timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            cancel.cancel();
        })
    };

    let status = tokio::select! {
        status = child.wait() => Some(status),
        _ = cancel.cancelled() => None,
    };
    timer.abort();

    let outcome = match status {
        Some(Ok(s)) if s.success() => ProcessOutcome::Success,
        Some(Ok(s)) => ProcessOutcome::Failed(s.code().unwrap_or(-1)),
        Some(Err(e)) => ProcessOutcome::SpawnFailed(e.to_string()),
        None => {
            tracing::warn!(job = job.id, timeout_secs = job.timeout.as_secs(), "job timed out");
            interrupt(&mut child).await;
            ProcessOutcome::Timeout
        }
    };

    let drain_timer = tokio::spawn(async move {
        tokio::time::sleep(OUTPUT_DRAIN).await;
        drained.cancel();
    });
    let stdout = stdout.await.unwrap_or_default();
    let _ = stderr.await;
    drain_timer.abort();
    (outcome, stdout)
}

/// Read `reader` to the end or until `drained` fires, forwarding each line
/// if asked. Returns everything read.
async fn collect_lines<R>(
    reader: Option<R>,
    job: JobId,
    forward: Option<mpsc::UnboundedSender<GatewayEvent>>,
    drained: CancellationToken,
) -> String
where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return String::new();
    };
    let mut lines = BufReader::new(reader).lines();
    let mut all = String::new();
    loop {
        let next = tokio::select! {
            next = lines.next_line() => next,
            _ = drained.cancelled() => {
                tracing::debug!(job, "output still open after exit, stopped reading");
                break;
            }
        };
        match next {
            Ok(Some(line)) => {
                if let Some(tx) = &forward {
                    let _ = tx.send(GatewayEvent::ProcessOutput {
                        job,
                        text: line.clone(),
                    });
                }
                all.push_str(&line);
                all.push('\n');
            }
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(job, error = %e, "output stream ended");
                break;
            }
        }
    }
    all
}

/// SIGINT to the child's group first, as a terminal would. After the grace
/// period whatever is left of the group is killed.
async fn interrupt(child: &mut Child) {
    let Some(pid) = child.id() else {
        return;
    };
    let group = Pid::from_raw(pid as i32);
    if let Err(e) = killpg(group, Signal::SIGINT) {
        tracing::debug!(pid, error = %e, "SIGINT failed");
    }
    let exited = tokio::time::timeout(INTERRUPT_GRACE, child.wait()).await.is_ok();
    match killpg(group, Signal::SIGKILL) {
        Ok(()) => tracing::debug!(pid, exited, "process group killed"),
        Err(nix::errno::Errno::ESRCH) => {}
        Err(e) => tracing::debug!(pid, error = %e, "SIGKILL failed"),
    }
    if !exited {
        let _ = child.wait().await;
    }
}

// ── Managed processes ─────────────────────────────────────────────────────────

async fn supervise(proc: ManagedProcess, stop: CancellationToken) {
    let mut child = match Command::new(&proc.program)
        .args(&proc.args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .process_group(0)
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            tracing::warn!(name = %proc.name, program = %proc.program, error = %e, "managed process failed to start");
            return;
        }
    };
    tracing::info!(name = %proc.name, pid = ?child.id(), "managed process started");

    tokio::select! {
        status = child.wait() => {
            tracing::warn!(name = %proc.name, ?status, "managed process exited");
        }
        _ = stop.cancelled() => {
            interrupt(&mut child).await;
            tracing::info!(name = %proc.name, "managed process stopped");
        }
    }
}
