//! Simulated installer: replays canned installer events against a reporting endpoint.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use clap::Parser;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Reporting endpoint to POST each event to
    endpoint: String,

    /// JSON array of canned installer events
    events: PathBuf,

    /// Delay between events (ms)
    #[arg(long, default_value_t = 150)]
    delay_ms: u64,

    /// Exit status to finish with, to rehearse failures
    #[arg(long, default_value_t = 0)]
    exit_code: u8,
}

/// One installer reporting event, as posted to the webhook.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
struct ReplayEvent {
    event_type: String,
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default = "default_origin")]
    origin: String,
    #[serde(default)]
    timestamp: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result: Option<String>,
}

fn default_origin() -> String {
    "curtin".to_string()
}

impl ReplayEvent {
    /// Copy with the timestamp set to `now`, as a live installer would send it.
    fn stamped(&self, now: DateTime<Utc>) -> Self {
        let mut event = self.clone();
        event.timestamp = Some(now.timestamp_millis() as f64 / 1000.0);
        event
    }

    fn log_line(&self, now: DateTime<Local>) -> String {
        let mut line = format!(
            "{} {}: {}: {}",
            now.format("%Y-%m-%d %H:%M:%S"),
            self.event_type,
            self.name,
            self.description
        );
        if let Some(result) = &self.result {
            line.push_str(&format!(" [{result}]"));
        }
        line
    }
}

fn load_events(path: &Path) -> Result<Vec<ReplayEvent>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("read events from {}", path.display()))?;
    parse_events(&contents).with_context(|| format!("parse events in {}", path.display()))
}

fn parse_events(contents: &str) -> Result<Vec<ReplayEvent>> {
    Ok(serde_json::from_str(contents)?)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    init_tracing();

    let events = load_events(&args.events)?;
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .context("build http client")?;
    let delay = Duration::from_millis(args.delay_ms);

    for (idx, event) in events.iter().enumerate() {
        if idx > 0 {
            tokio::time::sleep(delay).await;
        }
        let event = event.stamped(Utc::now());
        println!("{}", event.log_line(Local::now()));
        match client.post(&args.endpoint).json(&event).send().await {
            Ok(response) => {
                if let Err(err) = response.error_for_status() {
                    warn!(?err, name = %event.name, "endpoint rejected event");
                } else {
                    debug!(name = %event.name, "event delivered");
                }
            }
            Err(err) => warn!(?err, name = %event.name, "failed to deliver event"),
        }
    }

    Ok(ExitCode::from(args.exit_code))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn canned_files_parse() {
        for contents in [
            include_str!("../../../demos/curtin-events-install.json"),
            include_str!("../../../demos/curtin-events-postinstall.json"),
        ] {
            let events = parse_events(contents).expect("canned events");
            assert!(!events.is_empty());
            let starts = events.iter().filter(|e| e.event_type == "start").count();
            let finishes = events.iter().filter(|e| e.event_type == "finish").count();
            assert_eq!(starts, finishes);
        }
    }

    #[test]
    fn missing_fields_take_defaults() {
        let events =
            parse_events(r#"[{"event_type": "start", "name": "cmd-install"}]"#).expect("parse");
        assert_eq!(events[0].origin, "curtin");
        assert_eq!(events[0].description, "");
        assert!(events[0].timestamp.is_none());
    }

    #[test]
    fn stamped_events_carry_the_send_time() {
        let event = ReplayEvent {
            event_type: "finish".to_string(),
            name: "cmd-install/stage-extract".to_string(),
            description: "acquiring and extracting image".to_string(),
            origin: default_origin(),
            timestamp: None,
            result: Some("SUCCESS".to_string()),
        };
        let now = Utc.timestamp_opt(1_700_000_000, 500_000_000).single().expect("time");
        let stamped = event.stamped(now);
        assert_eq!(stamped.timestamp, Some(1_700_000_000.5));

        let body = serde_json::to_value(&stamped).expect("json");
        assert_eq!(body["result"], "SUCCESS");
        assert_eq!(body["origin"], "curtin");

        let local = Local.timestamp_opt(1_700_000_000, 0).single().expect("time");
        let line = event.log_line(local);
        assert!(line.ends_with(
            "finish: cmd-install/stage-extract: acquiring and extracting image [SUCCESS]"
        ));
    }

    #[test]
    fn results_are_omitted_for_start_events() {
        let event = ReplayEvent {
            event_type: "start".to_string(),
            name: "cmd-install".to_string(),
            description: "curtin command install".to_string(),
            origin: default_origin(),
            timestamp: Some(1.0),
            result: None,
        };
        let body = serde_json::to_value(&event).expect("json");
        assert!(body.get("result").is_none());
    }
}
