use std::io::Read;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::{ErrorKind, LangError, LangResult};

/// Outcome of an external command that was successfully launched.
/// A non-zero status or a timeout is a probe failure, which callers
/// turn into an ordinary value; only failure to launch is an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CmdOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl CmdOutput {
    pub fn success(&self) -> bool {
        self.status == 0 && !self.timed_out
    }
}

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Runs `argv` to completion or until `timeout` elapses, blocking the
/// interpreter thread. On timeout the child is killed and the result is
/// reported as a failed probe, not an error.
pub fn run_cmd(argv: &[String], timeout: Duration) -> LangResult<CmdOutput> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| LangError::bare(ErrorKind::Io("empty command line".to_string())))?;

    debug!(cmd = %argv.join(" "), "running command");

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|err| {
            LangError::bare(ErrorKind::ExternalTool {
                cmd: program.clone(),
                reason: err.to_string(),
            })
        })?;

    let deadline = Instant::now() + timeout;
    let mut timed_out = false;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status.code().unwrap_or(-1),
            Ok(None) => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    timed_out = true;
                    break -1;
                }
                std::thread::sleep(POLL_INTERVAL);
            }
            Err(err) => {
                return Err(LangError::bare(ErrorKind::ExternalTool {
                    cmd: program.clone(),
                    reason: err.to_string(),
                }));
            }
        }
    };

    // Probe output is small, so draining the pipes after exit cannot
    // block for long; a child stuck on a full pipe hits the timeout
    // above and is killed first.
    let mut stdout = String::new();
    let mut stderr = String::new();
    if let Some(mut pipe) = child.stdout.take() {
        let _ = pipe.read_to_string(&mut stdout);
    }
    if let Some(mut pipe) = child.stderr.take() {
        let _ = pipe.read_to_string(&mut stderr);
    }

    debug!(status, timed_out, "command finished");

    Ok(CmdOutput {
        status,
        stdout,
        stderr,
        timed_out,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn captures_stdout_and_status() {
        let out = run_cmd(&argv(&["sh", "-c", "echo hi"]), DEFAULT_TIMEOUT)
            .expect("launch should succeed");
        assert!(out.success());
        assert_eq!(out.stdout.trim(), "hi");
    }

    #[test]
    fn nonzero_exit_is_not_an_error() {
        let out = run_cmd(&argv(&["sh", "-c", "exit 3"]), DEFAULT_TIMEOUT)
            .expect("launch should succeed");
        assert_eq!(out.status, 3);
        assert!(!out.success());
    }

    #[test]
    fn missing_program_is_an_external_tool_error() {
        let err = run_cmd(&argv(&["definitely-not-a-real-binary"]), DEFAULT_TIMEOUT)
            .expect_err("expected launch failure");
        assert!(matches!(err.kind, ErrorKind::ExternalTool { .. }));
    }

    #[test]
    fn timeout_reports_a_failed_probe() {
        let out = run_cmd(&argv(&["sh", "-c", "sleep 5"]), Duration::from_millis(50))
            .expect("launch should succeed");
        assert!(out.timed_out);
        assert!(!out.success());
    }
}
