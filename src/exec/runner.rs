// src/exec/runner.rs

//! Single job process runner.

use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dag::ScheduledJob;
use crate::errors::LaunchError;
use crate::exec::output::OutputCapture;

/// How long to keep draining output after the process has exited.
const OUTPUT_GRACE: Duration = Duration::from_secs(2);

/// What came back from running a job's process, before evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawResult {
    /// `None` when the process was killed or terminated by a signal.
    pub exit_code: Option<i32>,
    /// Combined stdout and stderr, in the order the process wrote them.
    pub output: String,
    pub elapsed: Duration,
    pub timed_out: bool,
    pub cancelled: bool,
}

/// Run `job`'s command to completion, timeout or cancellation.
///
/// - The command runs under `sh -c` (`cmd /C` on Windows) in its own
///   process group, with stderr folded into stdout by the shell.
/// - When `max_time` elapses or `cancel` fires, the whole process group is
///   killed. After a normal exit the group is killed too, so background
///   processes the command left behind do not outlive the job.
/// - At most `max_output_bytes` of output are held while reading (head and
///   tail); `0` keeps everything.
/// - Only a failure to spawn or wait is an error; everything else is
///   described by the [`RawResult`].
pub async fn run_job(
    job: &ScheduledJob,
    cancel: CancellationToken,
    max_output_bytes: usize,
) -> Result<RawResult, LaunchError> {
    info!(
        job = %job.name,
        cmd = %job.command,
        procs = job.reservation.procs,
        threads = job.reservation.threads_per_proc,
        max_time_s = job.max_time.as_secs_f64(),
        "starting job process"
    );

    let mut cmd = shell_command(&job.command);
    cmd.envs(&job.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);
    if let Some(dir) = &job.working_dir {
        cmd.current_dir(dir);
    }
    #[cfg(unix)]
    cmd.process_group(0);

    let started = Instant::now();
    let mut child = cmd.spawn().map_err(|source| LaunchError::Spawn {
        command: job.command.clone(),
        source,
    })?;
    // `Child::id` is gone once the child has been reaped.
    let pgid = child.id();

    let buffer = Arc::new(Mutex::new(OutputCapture::new(max_output_bytes)));
    let reader = child.stdout.take().map(|mut stdout| {
        let buffer = Arc::clone(&buffer);
        tokio::spawn(async move {
            let mut chunk = [0u8; 8192];
            loop {
                match stdout.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => buffer
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push(&chunk[..n]),
                }
            }
        })
    });

    let deadline = tokio::time::sleep(job.max_time);
    tokio::pin!(deadline);

    let mut timed_out = false;
    let mut cancelled = false;

    let exit_code = tokio::select! {
        status_res = child.wait() => {
            let status = status_res.map_err(LaunchError::Wait)?;
            signal_process_group(pgid, &job.name);
            status.code()
        }

        _ = &mut deadline => {
            warn!(job = %job.name, max_time_s = job.max_time.as_secs_f64(), "job timed out; killing process group");
            timed_out = true;
            kill_process_tree(&mut child, pgid, &job.name).await;
            None
        }

        _ = cancel.cancelled() => {
            info!(job = %job.name, "cancellation requested; killing process group");
            cancelled = true;
            kill_process_tree(&mut child, pgid, &job.name).await;
            None
        }
    };
    let elapsed = started.elapsed();

    if let Some(mut handle) = reader {
        if tokio::time::timeout(OUTPUT_GRACE, &mut handle).await.is_err() {
            debug!(job = %job.name, "output pipe still open after exit; keeping what was read");
            handle.abort();
        }
    }

    let capture = std::mem::take(&mut *buffer.lock().unwrap_or_else(PoisonError::into_inner));
    let output = capture.finish();

    info!(
        job = %job.name,
        exit_code = ?exit_code,
        elapsed_ms = elapsed.as_millis() as u64,
        timed_out,
        cancelled,
        "job process finished"
    );

    Ok(RawResult {
        exit_code,
        output,
        elapsed,
        timed_out,
        cancelled,
    })
}

/// Build a shell command appropriate for the platform, with stderr merged
/// into stdout at the file-descriptor level.
fn shell_command(command: &str) -> Command {
    if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(format!("{command} 2>&1"));
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(format!("exec 2>&1\n{command}"));
        c
    }
}

/// Kill the child's whole process group, then the child itself, and reap it.
async fn kill_process_tree(child: &mut Child, pgid: Option<u32>, name: &str) {
    signal_process_group(pgid, name);

    if let Err(e) = child.kill().await {
        debug!(job = %name, error = %e, "kill after process group signal failed");
    }
}

#[cfg(unix)]
fn signal_process_group(pgid: Option<u32>, name: &str) {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pid) = pgid.and_then(|id| i32::try_from(id).ok()) else {
        return;
    };
    match killpg(Pid::from_raw(pid), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => warn!(job = %name, error = %e, "failed to kill process group"),
    }
}

#[cfg(not(unix))]
fn signal_process_group(_pgid: Option<u32>, _name: &str) {}
