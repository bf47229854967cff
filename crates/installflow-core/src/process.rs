//! Subprocess execution with output captured to a log file.
//!
//! Everything here blocks; callers run it on the background worker pool.

use std::fs::{self, File};
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};

#[cfg(unix)]
use std::os::unix::process::ExitStatusExt;

use tracing::debug;

use crate::error::EngineError;
use crate::util;

/// A program and its arguments.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new<I, A>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Build from an argv vector; `None` when it is empty.
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self::new(program.clone(), args.iter().cloned()))
    }

    pub fn display(&self) -> String {
        util::command_line(&self.program, &self.args)
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        command
    }
}

/// Run `spec` with stdin closed and stdout+stderr written to `log_path`.
///
/// The log is truncated first. A non-zero exit is returned as a value; only
/// failing to set up or start the process is an error.
pub fn run_logged(spec: &CommandSpec, log_path: &Path) -> Result<i32, EngineError> {
    if let Some(dir) = log_path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(|source| EngineError::LogFile {
            path: log_path.to_path_buf(),
            source,
        })?;
    }
    let log = File::create(log_path).map_err(|source| EngineError::LogFile {
        path: log_path.to_path_buf(),
        source,
    })?;
    let log_err = log.try_clone().map_err(|source| EngineError::LogFile {
        path: log_path.to_path_buf(),
        source,
    })?;

    debug!(command = %spec.display(), log = %log_path.display(), "running");
    let status = spec
        .command()
        .stdin(Stdio::null())
        .stdout(Stdio::from(log))
        .stderr(Stdio::from(log_err))
        .status()
        .map_err(|source| EngineError::Spawn {
            program: spec.program.clone(),
            source,
        })?;
    let code = exit_code(status);
    debug!(command = %spec.display(), code, "completed");
    Ok(code)
}

/// Run `spec` to completion, failing on non-zero exit.
///
/// Output is captured rather than inherited; the terminal belongs to the UI.
pub fn run_checked(spec: &CommandSpec) -> Result<(), EngineError> {
    debug!(command = %spec.display(), "running");
    let output = spec
        .command()
        .stdin(Stdio::null())
        .output()
        .map_err(|source| EngineError::Spawn {
            program: spec.program.clone(),
            source,
        })?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    if !stdout.trim().is_empty() {
        debug!(command = %spec.display(), output = %util::log_snippet(&stdout), "command output");
    }
    match exit_code(output.status) {
        0 => Ok(()),
        code => Err(EngineError::CommandFailed {
            command: spec.display(),
            code,
            stderr: util::log_snippet(&String::from_utf8_lossy(&output.stderr)),
        }),
    }
}

/// Exit code, with signal deaths reported the way a shell does (128 + signal).
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    if let Some(signal) = status.signal() {
        return 128 + signal;
    }
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new("sh", ["-c", script])
    }

    #[test]
    fn captures_both_streams_and_exit_code() {
        let dir = tempfile::tempdir().expect("temp dir");
        let log = dir.path().join("install.log");
        let code = run_logged(&sh("echo out; echo err >&2; exit 5"), &log).expect("run");
        assert_eq!(code, 5);
        let contents = fs::read_to_string(&log).expect("read log");
        assert!(contents.contains("out"));
        assert!(contents.contains("err"));
    }

    #[test]
    fn log_is_truncated_and_parent_created() {
        let dir = tempfile::tempdir().expect("temp dir");
        let log = dir.path().join("nested").join("install.log");
        fs::create_dir_all(log.parent().expect("parent")).expect("mkdir");
        fs::write(&log, "stale output\n").expect("seed log");

        let code = run_logged(&sh("echo fresh"), &log).expect("run");
        assert_eq!(code, 0);
        assert_eq!(fs::read_to_string(&log).expect("read log"), "fresh\n");

        let other = dir.path().join("created").join("post.log");
        run_logged(&sh("true"), &other).expect("run");
        assert!(other.exists());
    }

    #[test]
    fn stdin_is_closed() {
        let dir = tempfile::tempdir().expect("temp dir");
        let log = dir.path().join("stdin.log");
        let code = run_logged(&sh("if read line; then exit 3; else exit 0; fi"), &log)
            .expect("run");
        assert_eq!(code, 0);
    }

    #[test]
    fn signal_deaths_map_to_shell_codes() {
        let dir = tempfile::tempdir().expect("temp dir");
        let log = dir.path().join("signal.log");
        let code = run_logged(&sh("kill -TERM $$"), &log).expect("run");
        assert_eq!(code, 128 + 15);
    }

    #[test]
    fn spawn_failure_is_an_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let log = dir.path().join("missing.log");
        let spec = CommandSpec::new("/nonexistent/installer", Vec::<String>::new());
        let err = run_logged(&spec, &log).expect_err("spawn fails");
        assert!(matches!(err, EngineError::Spawn { .. }));
    }

    #[test]
    fn run_checked_reports_failures() {
        run_checked(&sh("exit 0")).expect("success");
        let err = run_checked(&sh("exit 2")).expect_err("non-zero exit");
        assert!(matches!(err, EngineError::CommandFailed { code: 2, .. }));
    }

    #[test]
    fn run_checked_captures_output() {
        run_checked(&sh("echo chatter; echo noise >&2")).expect("success");
        let err = run_checked(&sh("echo unit not found >&2; exit 1")).expect_err("failure");
        match err {
            EngineError::CommandFailed { code, stderr, .. } => {
                assert_eq!(code, 1);
                assert!(stderr.contains("unit not found"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn from_argv_splits_program() {
        let argv = vec!["/sbin/reboot".to_string()];
        let spec = CommandSpec::from_argv(&argv).expect("non-empty");
        assert_eq!(spec.program, "/sbin/reboot");
        assert!(spec.args.is_empty());
        assert!(CommandSpec::from_argv(&[]).is_none());
    }
}
