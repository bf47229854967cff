//! Configuration types and defaults for installflow.
//!
//! Keeps schema definitions in one place for easier auditing.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level configuration loaded from config.toml.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub installer: InstallerConfig,
    pub forwarder: ForwarderConfig,
    pub events: EventsConfig,
    pub tail: TailConfig,
    pub simulation: SimulationConfig,
    pub system: SystemConfig,
    pub handoff: HandoffConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub log_level: Option<String>,
    pub log_file: PathBuf,
    /// Replace the installer and reboot with a scripted replay.
    pub simulate: bool,
    /// Size of the background worker pool.
    pub workers: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: None,
            log_file: PathBuf::from("/var/log/installflow/installflow.log"),
            simulate: false,
            workers: 2,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct InstallerConfig {
    pub program: String,
    /// Arguments placed before the `-c <config>` pairs.
    pub args: Vec<String>,
    /// Arguments placed after the `-c <config>` pairs.
    pub trailing_args: Vec<String>,
    pub install_log: PathBuf,
    pub postinstall_log: PathBuf,
    pub configs: InstallerConfigPaths,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            program: "curtin".to_string(),
            args: vec!["-vvv".to_string(), "--showtrace".to_string()],
            trailing_args: vec!["install".to_string(), "cp:///".to_string()],
            install_log: PathBuf::from("/var/log/installer/curtin-install.log"),
            postinstall_log: PathBuf::from("/var/log/installer/curtin-postinstall.log"),
            configs: InstallerConfigPaths::default(),
        }
    }
}

/// Named installer configuration files, combined per run.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct InstallerConfigPaths {
    pub storage: PathBuf,
    pub network: PathBuf,
    pub reporting: PathBuf,
    pub postinstall: PathBuf,
    pub preserved: PathBuf,
}

impl Default for InstallerConfigPaths {
    fn default() -> Self {
        let dir = PathBuf::from("/tmp/installflow");
        Self {
            storage: dir.join("30_install-storage.yaml"),
            network: dir.join("40_install-network.yaml"),
            reporting: dir.join("50_reporting.yaml"),
            postinstall: dir.join("60_postinstall.yaml"),
            preserved: dir.join("70_preserved.yaml"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ForwarderConfig {
    /// Companion process that republishes installer events on the journal.
    pub program: String,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            program: "curtin-journald-forwarder".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EventsConfig {
    /// SYSLOG_IDENTIFIER the forwarder tags its records with.
    pub identifier: String,
    pub journal_program: String,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            identifier: "curtin_event".to_string(),
            journal_program: "journalctl".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TailConfig {
    pub program: String,
    pub lines: usize,
}

impl Default for TailConfig {
    fn default() -> Self {
        Self {
            program: "tail".to_string(),
            lines: 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub replay_program: String,
    pub install_events: PathBuf,
    pub postinstall_events: PathBuf,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            replay_program: "installflow-replay".to_string(),
            install_events: PathBuf::from("demos/curtin-events-install.json"),
            postinstall_events: PathBuf::from("demos/curtin-events-postinstall.json"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SystemConfig {
    pub reboot_command: Vec<String>,
    /// Run once when the user exits to a shell so the workflow does not start again.
    pub disable_command: Vec<String>,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            reboot_command: vec!["/sbin/reboot".to_string()],
            disable_command: vec![
                "systemctl".to_string(),
                "disable".to_string(),
                "installflow.service".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct HandoffConfig {
    /// Network configuration written by the network screen, copied for the install run.
    pub network_config: Option<PathBuf>,
}
