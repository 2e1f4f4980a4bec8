//! Bounded execution of external network tools
//!
//! Every shell-out goes through here so that a missing or hung tool costs a
//! log line and a timeout, never a stuck adapter.

use std::io;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, warn};

/// Default budget for one-shot commands
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// Run a command and return its stdout
///
/// Returns `None` when the tool is missing, exits unsuccessfully or exceeds
/// `timeout`. The child is killed if the timeout fires.
pub async fn run_command(program: &str, args: &[&str], timeout: Duration) -> Option<String> {
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output();

    match tokio::time::timeout(timeout, output).await {
        Ok(Ok(output)) if output.status.success() => {
            Some(String::from_utf8_lossy(&output.stdout).into_owned())
        }
        Ok(Ok(output)) => {
            debug!(
                "{} {:?} exited with {}: {}",
                program,
                args,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
            None
        }
        Ok(Err(e)) if e.kind() == io::ErrorKind::NotFound => {
            debug!("{} is not installed", program);
            None
        }
        Ok(Err(e)) => {
            warn!("Failed to run {}: {}", program, e);
            None
        }
        Err(_) => {
            warn!("{} {:?} timed out after {:?}", program, args, timeout);
            None
        }
    }
}

/// Long-running subprocess read line by line
///
/// The child is killed when the monitor is dropped.
pub struct LineMonitor {
    program: String,
    // Held only so kill_on_drop applies
    _child: Child,
    lines: Lines<BufReader<ChildStdout>>,
}

impl LineMonitor {
    /// Next line of output, or `None` once the process has exited
    pub async fn next_line(&mut self) -> Option<String> {
        match self.lines.next_line().await {
            Ok(line) => line,
            Err(e) => {
                warn!("Reading output of {} failed: {}", self.program, e);
                None
            }
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

/// Spawn a long-running command whose stdout is consumed line by line
pub fn spawn_line_monitor(program: &str, args: &[&str]) -> io::Result<LineMonitor> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| io::Error::other(format!("{} has no stdout", program)))?;

    debug!("Spawned {} {:?}", program, args);
    Ok(LineMonitor {
        program: program.to_string(),
        _child: child,
        lines: BufReader::new(stdout).lines(),
    })
}
