//! Structured installer events and the journal feed that delivers them.
//!
//! The forwarder republishes installer progress on the journal tagged with a
//! syslog identifier; the reader follows that feed from its tail and yields one
//! record per entry. Reads only happen when the runtime reports the pipe ready.

use std::process::Stdio;

use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, warn};

use crate::error::EngineError;
use crate::util;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum EventType {
    Start,
    Finish,
    Other(String),
}

impl EventType {
    fn parse(value: &str) -> Self {
        match value {
            "start" => EventType::Start,
            "finish" => EventType::Finish,
            other => EventType::Other(other.to_string()),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EventRecord {
    pub event_type: EventType,
    /// `/`-delimited hierarchical event name.
    pub name: String,
    pub message: String,
}

impl EventRecord {
    pub fn new(event_type: EventType, name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            event_type,
            name: name.into(),
            message: message.into(),
        }
    }

    /// Parse one line of `journalctl --output=json`.
    ///
    /// Entries without an event type or name are not installer events and yield `None`.
    pub fn from_journal_json(line: &str) -> Result<Option<Self>, serde_json::Error> {
        let entry: JournalEntry = serde_json::from_str(line)?;
        let (Some(event_type), Some(name)) = (entry.event_type, entry.name) else {
            return Ok(None);
        };
        Ok(Some(Self {
            event_type: EventType::parse(&event_type.into_text()),
            name: name.into_text(),
            message: entry.message.map(JournalField::into_text).unwrap_or_default(),
        }))
    }
}

#[derive(Deserialize)]
struct JournalEntry {
    #[serde(rename = "CURTIN_EVENT_TYPE", default)]
    event_type: Option<JournalField>,
    #[serde(rename = "CURTIN_NAME", default)]
    name: Option<JournalField>,
    #[serde(rename = "MESSAGE", default)]
    message: Option<JournalField>,
}

/// journalctl emits non-UTF-8 field values as byte arrays.
#[derive(Deserialize)]
#[serde(untagged)]
enum JournalField {
    Text(String),
    Bytes(Vec<u8>),
}

impl JournalField {
    fn into_text(self) -> String {
        match self {
            JournalField::Text(text) => text,
            JournalField::Bytes(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        }
    }
}

/// Live subscription to the journal feed for one syslog identifier.
pub struct EventStreamReader {
    identifier: String,
    child: Child,
    lines: Lines<BufReader<ChildStdout>>,
}

impl EventStreamReader {
    /// Follow new entries for `identifier`, skipping everything already in the journal.
    pub fn subscribe(journal_program: &str, identifier: &str) -> Result<Self, EngineError> {
        let mut command = Command::new(journal_program);
        command.args([
            "--follow".to_string(),
            "--lines=0".to_string(),
            "--output=json".to_string(),
            format!("SYSLOG_IDENTIFIER={identifier}"),
        ]);
        Self::spawn(command, journal_program, identifier)
    }

    fn spawn(mut command: Command, program: &str, identifier: &str) -> Result<Self, EngineError> {
        let mut child = command
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
        debug!(identifier, "subscribed to journal events");
        Ok(Self {
            identifier: identifier.to_string(),
            child,
            lines: BufReader::new(stdout).lines(),
        })
    }

    /// Wait for the next installer record. `None` once the feed has closed.
    ///
    /// Cancel safe: a line is only consumed when it is returned or discarded.
    pub async fn next_record(&mut self) -> Option<EventRecord> {
        loop {
            let line = match self.lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => return None,
                Err(err) => {
                    warn!(identifier = %self.identifier, ?err, "journal feed read failed");
                    return None;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match EventRecord::from_journal_json(&line) {
                Ok(Some(record)) => return Some(record),
                Ok(None) => continue,
                Err(err) => {
                    let snippet = util::log_snippet(&line);
                    warn!(?err, line = %snippet, "skipping malformed journal entry");
                }
            }
        }
    }

    /// Drop the subscription and stop the journal follower.
    pub fn unsubscribe(mut self) {
        if let Err(err) = self.child.start_kill() {
            debug!(?err, "journal follower already exited");
        }
        debug!(identifier = %self.identifier, "unsubscribed from journal events");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_start_record() {
        let line = r#"{"SYSLOG_IDENTIFIER":"curtin_event","CURTIN_EVENT_TYPE":"start","CURTIN_NAME":"cmd-install/stage-partitioning","MESSAGE":"configuring storage"}"#;
        let record = EventRecord::from_journal_json(line)
            .expect("valid json")
            .expect("installer record");
        assert_eq!(record.event_type, EventType::Start);
        assert_eq!(record.name, "cmd-install/stage-partitioning");
        assert_eq!(record.message, "configuring storage");
    }

    #[test]
    fn unknown_event_types_are_kept_as_other() {
        let line = r#"{"CURTIN_EVENT_TYPE":"progress","CURTIN_NAME":"cmd-install","MESSAGE":"50%"}"#;
        let record = EventRecord::from_journal_json(line)
            .expect("valid json")
            .expect("installer record");
        assert_eq!(record.event_type, EventType::Other("progress".to_string()));
    }

    #[test]
    fn byte_array_fields_are_decoded_lossily() {
        let line = r#"{"CURTIN_EVENT_TYPE":"finish","CURTIN_NAME":"cmd-install","MESSAGE":[104,105,255]}"#;
        let record = EventRecord::from_journal_json(line)
            .expect("valid json")
            .expect("installer record");
        assert_eq!(record.message, "hi\u{fffd}");
    }

    #[test]
    fn entries_without_event_fields_are_skipped() {
        let line = r#"{"MESSAGE":"unrelated"}"#;
        assert!(EventRecord::from_journal_json(line)
            .expect("valid json")
            .is_none());
        assert!(EventRecord::from_journal_json("not json").is_err());
    }

    #[tokio::test]
    async fn reader_yields_records_in_feed_order() {
        let mut command = Command::new("sh");
        command.arg("-c").arg(concat!(
            "echo '{\"CURTIN_EVENT_TYPE\":\"start\",\"CURTIN_NAME\":\"a/stage-x\",\"MESSAGE\":\"one\"}';",
            "echo 'garbage';",
            "echo '{\"MESSAGE\":\"noise\"}';",
            "echo '{\"CURTIN_EVENT_TYPE\":\"finish\",\"CURTIN_NAME\":\"a/stage-x\",\"MESSAGE\":\"two\"}'",
        ));
        let mut reader =
            EventStreamReader::spawn(command, "sh", "curtin_event").expect("spawn feed");

        let first = reader.next_record().await.expect("first record");
        assert_eq!(first.message, "one");
        let second = reader.next_record().await.expect("second record");
        assert_eq!(second.event_type, EventType::Finish);
        assert_eq!(second.message, "two");
        assert!(reader.next_record().await.is_none());
        reader.unsubscribe();
    }

    #[tokio::test]
    async fn subscribe_reports_missing_program() {
        let err = EventStreamReader::subscribe("/nonexistent/journalctl", "curtin_event")
            .err()
            .expect("spawn should fail");
        assert!(matches!(err, EngineError::Spawn { .. }));
    }
}
