//! Non-blocking follower for an installer log file.
//!
//! Spawns `tail -n N -F <log>` and hands back whatever bytes the pipe has when
//! the runtime reports it readable, decoded permissively.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, warn};

use crate::error::EngineError;
use crate::util;

const READ_CHUNK: usize = 16 * 1024;

pub struct TailFollower {
    log_path: PathBuf,
    child: Child,
    stdout: ChildStdout,
    decoder: Utf8Decoder,
    buf: Box<[u8]>,
}

impl TailFollower {
    /// Follow the last `lines` lines of `log_path`, surviving truncation and rotation.
    pub fn start(program: &str, lines: usize, log_path: &Path) -> Result<Self, EngineError> {
        let args = tail_args(lines, log_path);
        debug!(command = %util::command_line(program, &args), "starting log tail");
        let mut child = Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| EngineError::Spawn {
                program: program.to_string(),
                source,
            })?;
        let stdout = child.stdout.take().ok_or_else(|| EngineError::Spawn {
            program: program.to_string(),
            source: std::io::Error::other("stdout was not captured"),
        })?;
        Ok(Self {
            log_path: log_path.to_path_buf(),
            child,
            stdout,
            decoder: Utf8Decoder::default(),
            buf: vec![0u8; READ_CHUNK].into_boxed_slice(),
        })
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Wait until output is available and return it. `None` once the follower exits.
    ///
    /// Cancel safe: bytes are only taken from the pipe by a completed read, and
    /// `buf` holds nothing between calls.
    pub async fn next_chunk(&mut self) -> Option<String> {
        loop {
            match self.stdout.read(&mut self.buf).await {
                Ok(0) => {
                    let rest = self.decoder.finish();
                    return (!rest.is_empty()).then_some(rest);
                }
                Ok(len) => {
                    let text = self.decoder.decode(&self.buf[..len]);
                    if !text.is_empty() {
                        return Some(text);
                    }
                }
                Err(err) => {
                    warn!(?err, log = %self.log_path.display(), "log tail read failed");
                    return None;
                }
            }
        }
    }

    /// Terminate the tail process.
    pub fn stop(mut self) {
        if let Err(err) = self.child.start_kill() {
            debug!(?err, "log tail already exited");
        }
        debug!(log = %self.log_path.display(), "stopped log tail");
    }
}

pub fn tail_args(lines: usize, log_path: &Path) -> Vec<String> {
    vec![
        "-n".to_string(),
        lines.to_string(),
        "-F".to_string(),
        log_path.display().to_string(),
    ]
}

/// Incremental UTF-8 decoder that substitutes U+FFFD for invalid sequences.
///
/// A sequence split across reads is held back until its remaining bytes arrive.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::with_capacity(self.pending.len());
        let mut input = self.pending.as_slice();
        loop {
            match std::str::from_utf8(input) {
                Ok(text) => {
                    out.push_str(text);
                    input = &[];
                    break;
                }
                Err(err) => {
                    let (valid, rest) = input.split_at(err.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    match err.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            input = &rest[len..];
                        }
                        None => {
                            input = rest;
                            break;
                        }
                    }
                }
            }
        }
        let rest = input.to_vec();
        self.pending = rest;
        out
    }

    /// Flush held-back bytes at end of stream.
    pub fn finish(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        rest
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;
    use std::time::Duration;

    #[test]
    fn split_sequences_are_joined() {
        let mut decoder = Utf8Decoder::default();
        let bytes = "héllo".as_bytes();
        assert_eq!(decoder.decode(&bytes[..2]), "h");
        assert_eq!(decoder.decode(&bytes[2..]), "éllo");
    }

    #[test]
    fn invalid_bytes_become_replacement_characters() {
        let mut decoder = Utf8Decoder::default();
        assert_eq!(decoder.decode(b"ok\xffdone\xfe"), "ok\u{fffd}done\u{fffd}");
    }

    #[test]
    fn finish_flushes_truncated_sequence() {
        let mut decoder = Utf8Decoder::default();
        assert_eq!(decoder.decode(&[b'a', 0xe2, 0x82]), "a");
        assert_eq!(decoder.finish(), "\u{fffd}");
        assert_eq!(decoder.finish(), "");
    }

    #[test]
    fn tail_args_follow_by_name() {
        let args = tail_args(1000, Path::new("/var/log/installer/curtin-install.log"));
        assert_eq!(
            args,
            vec!["-n", "1000", "-F", "/var/log/installer/curtin-install.log"]
        );
    }

    #[tokio::test]
    async fn follower_streams_existing_and_appended_output() {
        let dir = tempfile::tempdir().expect("temp dir");
        let log = dir.path().join("install.log");
        fs::write(&log, "first line\n").expect("seed log");

        let mut follower = TailFollower::start("tail", 10, &log).expect("start tail");
        assert_eq!(follower.log_path(), log.as_path());
        let mut seen = String::new();
        while !seen.contains("first line") {
            let chunk = tokio::time::timeout(Duration::from_secs(10), follower.next_chunk())
                .await
                .expect("output within timeout")
                .expect("tail running");
            seen.push_str(&chunk);
        }

        let mut file = fs::OpenOptions::new()
            .append(true)
            .open(&log)
            .expect("open log");
        writeln!(file, "second line").expect("append");
        drop(file);

        while !seen.contains("second line") {
            let chunk = tokio::time::timeout(Duration::from_secs(10), follower.next_chunk())
                .await
                .expect("output within timeout")
                .expect("tail running");
            seen.push_str(&chunk);
        }
        follower.stop();
    }

    #[tokio::test]
    async fn output_larger_than_one_read_arrives_intact() {
        let dir = tempfile::tempdir().expect("temp dir");
        let log = dir.path().join("install.log");
        let line = format!("{}\n", "x".repeat(99));
        let expected = line.repeat(READ_CHUNK / 100 * 3);
        fs::write(&log, &expected).expect("seed log");

        let lines = expected.lines().count();
        let mut follower = TailFollower::start("tail", lines, &log).expect("start tail");
        let mut seen = String::new();
        let mut reads = 0;
        while seen.len() < expected.len() {
            let chunk = tokio::time::timeout(Duration::from_secs(10), follower.next_chunk())
                .await
                .expect("output within timeout")
                .expect("tail running");
            seen.push_str(&chunk);
            reads += 1;
        }
        assert_eq!(seen, expected);
        assert!(reads >= 3);
        follower.stop();
    }

    #[tokio::test]
    async fn start_reports_missing_program() {
        let err = TailFollower::start("/nonexistent/tail", 10, Path::new("/tmp/x.log"))
            .err()
            .expect("spawn fails");
        assert!(matches!(err, EngineError::Spawn { .. }));
    }
}
