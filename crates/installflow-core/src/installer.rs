//! Command lines and configuration files for the external installer.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::json;
use url::Url;

use crate::config::{Config, InstallerConfig, SimulationConfig};
use crate::error::EngineError;
use crate::phase::InstallerRun;
use crate::process::CommandSpec;

/// Reporter name the installer uses for the webhook section.
const REPORTER_NAME: &str = "installflow";

/// How each installer run is invoked and where it logs.
#[derive(Clone, Debug)]
pub struct InstallerPlan {
    installer: InstallerConfig,
    simulation: SimulationConfig,
    simulate: bool,
}

impl InstallerPlan {
    pub fn from_config(config: &Config) -> Self {
        Self {
            installer: config.installer.clone(),
            simulation: config.simulation.clone(),
            simulate: config.general.simulate,
        }
    }

    pub fn simulated(&self) -> bool {
        self.simulate
    }

    /// Config files passed to a run, in order.
    pub fn config_files(&self, run: InstallerRun) -> [&Path; 3] {
        let configs = &self.installer.configs;
        match run {
            InstallerRun::Install => [&configs.storage, &configs.network, &configs.reporting],
            InstallerRun::Postinstall => {
                [&configs.postinstall, &configs.preserved, &configs.reporting]
            }
        }
        .map(PathBuf::as_path)
    }

    pub fn command(&self, run: InstallerRun, endpoint: &str) -> CommandSpec {
        if self.simulate {
            let events = match run {
                InstallerRun::Install => &self.simulation.install_events,
                InstallerRun::Postinstall => &self.simulation.postinstall_events,
            };
            return CommandSpec::new(
                self.simulation.replay_program.clone(),
                [endpoint.to_string(), events.display().to_string()],
            );
        }

        let mut args = self.installer.args.clone();
        for path in self.config_files(run) {
            args.push("-c".to_string());
            args.push(path.display().to_string());
        }
        args.extend(self.installer.trailing_args.iter().cloned());
        CommandSpec::new(self.installer.program.clone(), args)
    }

    pub fn log_path(&self, run: InstallerRun) -> &Path {
        match run {
            InstallerRun::Install => &self.installer.install_log,
            InstallerRun::Postinstall => &self.installer.postinstall_log,
        }
    }

    pub fn reporting_config(&self) -> &Path {
        &self.installer.configs.reporting
    }

    pub fn network_config(&self) -> &Path {
        &self.installer.configs.network
    }
}

/// Validate the endpoint line printed by the forwarder.
pub fn parse_endpoint(line: &str) -> Result<String, EngineError> {
    let endpoint = line.trim();
    Url::parse(endpoint).map_err(|err| EngineError::InvalidEndpoint {
        endpoint: endpoint.to_string(),
        reason: err.to_string(),
    })?;
    Ok(endpoint.to_string())
}

/// Point the installer's webhook reporter at `endpoint`.
///
/// Written as JSON, which the installer reads as YAML.
pub fn write_reporting_config(path: &Path, endpoint: &str) -> Result<(), EngineError> {
    let document = json!({
        "reporting": {
            REPORTER_NAME: {
                "type": "webhook",
                "endpoint": endpoint,
            }
        }
    });
    let text = serde_json::to_string_pretty(&document)
        .map_err(|err| write_error(path, std::io::Error::other(err)))?;
    write_file(path, &text)
}

/// Copy the network configuration produced elsewhere into the install run's config.
pub fn copy_network_config(source: &Path, dest: &Path) -> Result<(), EngineError> {
    let text = fs::read_to_string(source).map_err(|err| write_error(dest, err))?;
    write_file(dest, &text)
}

fn write_file(path: &Path, contents: &str) -> Result<(), EngineError> {
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(|err| write_error(path, err))?;
    }
    fs::write(path, contents).map_err(|err| write_error(path, err))
}

fn write_error(path: &Path, source: std::io::Error) -> EngineError {
    EngineError::WriteConfig {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(simulate: bool) -> InstallerPlan {
        let mut config = Config::default();
        config.general.simulate = simulate;
        config.simulation.replay_program = "installflow-replay".to_string();
        InstallerPlan::from_config(&config)
    }

    #[test]
    fn install_command_lists_storage_network_reporting() {
        let command = plan(false).command(InstallerRun::Install, "http://[::1]:9000/");
        assert_eq!(command.program, "curtin");
        assert_eq!(
            command.args,
            vec![
                "-vvv",
                "--showtrace",
                "-c",
                "/tmp/installflow/30_install-storage.yaml",
                "-c",
                "/tmp/installflow/40_install-network.yaml",
                "-c",
                "/tmp/installflow/50_reporting.yaml",
                "install",
                "cp:///",
            ]
        );
    }

    #[test]
    fn postinstall_command_lists_postinstall_preserved_reporting() {
        let plan = plan(false);
        let files = plan.config_files(InstallerRun::Postinstall);
        assert_eq!(
            files,
            [
                Path::new("/tmp/installflow/60_postinstall.yaml"),
                Path::new("/tmp/installflow/70_preserved.yaml"),
                Path::new("/tmp/installflow/50_reporting.yaml"),
            ]
        );
        let command = plan.command(InstallerRun::Postinstall, "http://localhost:1/");
        assert!(command
            .args
            .contains(&"/tmp/installflow/70_preserved.yaml".to_string()));
    }

    #[test]
    fn simulated_runs_replay_canned_events() {
        let command = plan(true).command(InstallerRun::Postinstall, "http://localhost:1/");
        assert_eq!(command.program, "installflow-replay");
        assert_eq!(
            command.args,
            vec!["http://localhost:1/", "demos/curtin-events-postinstall.json"]
        );
    }

    #[test]
    fn endpoint_must_be_a_url() {
        assert_eq!(
            parse_endpoint("http://[::1]:43210/\n").expect("valid"),
            "http://[::1]:43210/"
        );
        let err = parse_endpoint("not a url").expect_err("invalid");
        assert!(matches!(err, EngineError::InvalidEndpoint { .. }));
    }

    #[test]
    fn reporting_config_points_at_endpoint() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("cfg").join("reporting.yaml");
        write_reporting_config(&path, "http://localhost:5000/").expect("write");
        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).expect("read")).expect("json");
        assert_eq!(
            value["reporting"]["installflow"]["endpoint"],
            "http://localhost:5000/"
        );
        assert_eq!(value["reporting"]["installflow"]["type"], "webhook");
    }

    #[test]
    fn network_config_is_copied() {
        let dir = tempfile::tempdir().expect("temp dir");
        let source = dir.path().join("network.yaml");
        let dest = dir.path().join("out").join("40_install-network.yaml");
        fs::write(&source, "network: {version: 2}\n").expect("seed");
        copy_network_config(&source, &dest).expect("copy");
        assert_eq!(
            fs::read_to_string(dest).expect("read"),
            "network: {version: 2}\n"
        );
    }
}
