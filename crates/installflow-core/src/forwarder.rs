//! Companion process that receives installer webhooks and republishes them on
//! the journal.
//!
//! It prints its listening endpoint as the first line of stdout.

use std::io::{BufRead, BufReader};
use std::os::unix::process::CommandExt;
use std::process::{Child, ChildStdout, Command, Stdio};
use std::time::{Duration, Instant};

use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::EngineError;
use crate::installer::parse_endpoint;

const TERMINATE_GRACE: Duration = Duration::from_millis(600);

pub struct Forwarder {
    program: String,
    child: Child,
    // Held open so the forwarder never writes into a closed pipe.
    stdout: BufReader<ChildStdout>,
    reaped: bool,
}

impl Forwarder {
    /// Spawn the forwarder and block until it reports its endpoint.
    ///
    /// Meant for a worker thread; the read blocks until the first line arrives.
    pub fn start(program: &str) -> Result<(Self, String), EngineError> {
        debug!(program, "starting event forwarder");
        let mut child = Command::new(program)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .process_group(0)
            .spawn()
            .map_err(|source| EngineError::Spawn {
                program: program.to_string(),
                source,
            })?;
        let stdout = child.stdout.take().ok_or_else(|| EngineError::Spawn {
            program: program.to_string(),
            source: std::io::Error::other("stdout was not captured"),
        })?;
        let mut forwarder = Self {
            program: program.to_string(),
            child,
            stdout: BufReader::new(stdout),
            reaped: false,
        };

        let mut line = String::new();
        let read = forwarder
            .stdout
            .read_line(&mut line)
            .map_err(|source| EngineError::Read {
                program: program.to_string(),
                source,
            })?;
        if read == 0 {
            return Err(EngineError::ForwarderEndpoint);
        }
        let endpoint = parse_endpoint(&line)?;
        info!(pid = forwarder.child.id(), %endpoint, "event forwarder started");
        Ok((forwarder, endpoint))
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// SIGTERM the forwarder's process group, escalating to SIGKILL after a grace period.
    pub async fn terminate(mut self) {
        signal_group(self.child.id(), libc::SIGTERM);
        let start = Instant::now();
        while start.elapsed() < TERMINATE_GRACE {
            if let Ok(Some(status)) = self.child.try_wait() {
                debug!(program = %self.program, ?status, "event forwarder exited");
                self.reaped = true;
                return;
            }
            sleep(Duration::from_millis(50)).await;
        }
        warn!(program = %self.program, pid = self.child.id(), "force killing event forwarder");
        self.kill();
    }

    fn kill(&mut self) {
        signal_group(self.child.id(), libc::SIGKILL);
        let _ = self.child.kill();
        let _ = self.child.wait();
        self.reaped = true;
    }
}

impl Drop for Forwarder {
    fn drop(&mut self) {
        if !self.reaped {
            self.kill();
        }
    }
}

fn signal_group(pid: u32, signal: libc::c_int) {
    let Ok(pid) = i32::try_from(pid) else {
        warn!(pid, "pid exceeds i32 range; not signalling");
        return;
    };
    if pid <= 0 {
        return;
    }
    unsafe {
        libc::kill(-pid, signal);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    fn script(dir: &Path, body: &str) -> String {
        let path = dir.join("forwarder");
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod");
        path.display().to_string()
    }

    #[tokio::test]
    async fn reports_endpoint_and_terminates() {
        let dir = tempfile::tempdir().expect("temp dir");
        let program = script(dir.path(), "echo http://127.0.0.1:45123/\nexec sleep 30");
        let (forwarder, endpoint) = Forwarder::start(&program).expect("start");
        assert_eq!(endpoint, "http://127.0.0.1:45123/");
        assert!(forwarder.pid() > 0);
        tokio::time::timeout(Duration::from_secs(5), forwarder.terminate())
            .await
            .expect("terminated in time");
    }

    #[test]
    fn stderr_is_detached_from_the_terminal() {
        let dir = tempfile::tempdir().expect("temp dir");
        let program = script(dir.path(), "echo http://127.0.0.1:45124/\nexec sleep 30");
        let (forwarder, _) = Forwarder::start(&program).expect("start");
        let stderr = fs::read_link(format!("/proc/{}/fd/2", forwarder.pid())).expect("fd 2");
        assert_eq!(stderr, Path::new("/dev/null"));
    }

    #[test]
    fn silent_exit_is_a_missing_endpoint() {
        let dir = tempfile::tempdir().expect("temp dir");
        let program = script(dir.path(), "exit 0");
        let err = Forwarder::start(&program).err().expect("no endpoint");
        assert!(matches!(err, EngineError::ForwarderEndpoint));
    }

    #[test]
    fn garbage_endpoint_is_rejected() {
        let dir = tempfile::tempdir().expect("temp dir");
        let program = script(dir.path(), "echo listening somewhere\nsleep 30");
        let err = Forwarder::start(&program).err().expect("invalid endpoint");
        assert!(matches!(err, EngineError::InvalidEndpoint { .. }));
    }
}
