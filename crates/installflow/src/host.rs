//! The real install host: subprocesses, timers and the journal feed.
//!
//! Everything that blocks goes through the bridge; everything else is polled
//! from [`SystemHost::next_io`] inside the event loop's select.

use std::path::Path;
use std::time::Duration;

use installflow_core::bridge::Bridge;
use installflow_core::events::{EventRecord, EventStreamReader};
use installflow_core::forwarder::Forwarder;
use installflow_core::process::{self, CommandSpec};
use installflow_core::tail::TailFollower;
use installflow_core::{
    installer, Config, EngineError, EventsConfig, InstallHost, InstallerRun, ProgressDisplay,
    SystemConfig, TailConfig,
};
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::Controller;

const SPINNER_PERIOD: Duration = Duration::from_millis(100);

/// Something became ready on one of the host's descriptors or timers.
#[derive(Debug)]
pub enum HostIo {
    SpinnerTick,
    LogTail(String),
    TailClosed,
    Record(EventRecord),
    FeedClosed,
}

pub struct SystemHost {
    bridge: Bridge<Controller>,
    forwarder_program: String,
    events_config: EventsConfig,
    tail_config: TailConfig,
    system: SystemConfig,
    forwarder: Option<Forwarder>,
    events: Option<EventStreamReader>,
    spinner: Option<Interval>,
    tail: Option<TailFollower>,
    exit_requested: bool,
}

impl SystemHost {
    pub fn new(bridge: Bridge<Controller>, config: &Config) -> Self {
        Self {
            bridge,
            forwarder_program: config.forwarder.program.clone(),
            events_config: config.events.clone(),
            tail_config: config.tail.clone(),
            system: config.system.clone(),
            forwarder: None,
            events: None,
            spinner: None,
            tail: None,
            exit_requested: false,
        }
    }

    pub fn exit_requested(&self) -> bool {
        self.exit_requested
    }

    /// Wait for the next spinner tick, log chunk or journal record.
    ///
    /// Cancel safe. Pending forever when nothing is active.
    pub async fn next_io(&mut self) -> HostIo {
        let io = tokio::select! {
            _ = tick(&mut self.spinner) => HostIo::SpinnerTick,
            chunk = next_chunk(&mut self.tail) => match chunk {
                Some(text) => HostIo::LogTail(text),
                None => HostIo::TailClosed,
            },
            record = next_record(&mut self.events) => match record {
                Some(record) => HostIo::Record(record),
                None => HostIo::FeedClosed,
            },
        };
        match io {
            HostIo::TailClosed => {
                debug!("log tail exited");
                self.stop_tail();
            }
            HostIo::FeedClosed => {
                warn!("installer event feed closed");
                self.unsubscribe_events();
            }
            _ => {}
        }
        io
    }

    /// Stop every auxiliary process before the loop exits.
    pub async fn shutdown(&mut self) {
        self.stop_spinner();
        self.stop_tail();
        self.unsubscribe_events();
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.terminate().await;
        }
    }

    /// Run a configured system command on the bridge. An empty command is
    /// reported as done without running anything.
    fn run_system_command<D>(
        &self,
        argv: &[String],
        label: &'static str,
        on_done: D,
    ) -> Result<(), EngineError>
    where
        D: FnOnce(&mut Controller, Result<(), EngineError>) -> Result<(), EngineError>
            + Send
            + 'static,
    {
        let spec = CommandSpec::from_argv(argv);
        match &spec {
            Some(spec) => info!(label, command = %spec.display(), "running system command"),
            None => warn!(label, "no command configured"),
        }
        self.bridge.run_in_background(
            move || match spec {
                Some(spec) => process::run_checked(&spec),
                None => Ok(()),
            },
            on_done,
        )
    }
}

async fn tick(spinner: &mut Option<Interval>) {
    match spinner {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn next_chunk(tail: &mut Option<TailFollower>) -> Option<String> {
    match tail {
        Some(follower) => follower.next_chunk().await,
        None => std::future::pending().await,
    }
}

async fn next_record(events: &mut Option<EventStreamReader>) -> Option<EventRecord> {
    match events {
        Some(reader) => reader.next_record().await,
        None => std::future::pending().await,
    }
}

impl InstallHost for SystemHost {
    fn start_forwarder(&mut self) -> Result<(), EngineError> {
        let program = self.forwarder_program.clone();
        self.bridge.run_in_background(
            move || Forwarder::start(&program),
            |controller: &mut Controller, result| match result {
                Ok((forwarder, endpoint)) => {
                    debug!(pid = forwarder.pid(), "event forwarder handed to host");
                    controller.host_mut().forwarder = Some(forwarder);
                    controller.forwarder_ready(Ok(endpoint))
                }
                Err(err) => controller.forwarder_ready(Err(err)),
            },
        )
    }

    fn stop_forwarder(&mut self) {
        if let Some(forwarder) = self.forwarder.take() {
            tokio::spawn(forwarder.terminate());
        }
    }

    fn subscribe_events(&mut self) -> Result<(), EngineError> {
        self.unsubscribe_events();
        let reader = EventStreamReader::subscribe(
            &self.events_config.journal_program,
            &self.events_config.identifier,
        )?;
        self.events = Some(reader);
        Ok(())
    }

    fn unsubscribe_events(&mut self) {
        if let Some(reader) = self.events.take() {
            reader.unsubscribe();
        }
    }

    fn start_spinner(&mut self) {
        let mut spinner = interval(SPINNER_PERIOD);
        spinner.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.spinner = Some(spinner);
    }

    fn stop_spinner(&mut self) -> bool {
        self.spinner.take().is_some()
    }

    fn write_reporting_config(&mut self, path: &Path, endpoint: &str) -> Result<(), EngineError> {
        installer::write_reporting_config(path, endpoint)
    }

    fn copy_network_config(&mut self, source: &Path, dest: &Path) -> Result<(), EngineError> {
        installer::copy_network_config(source, dest)
    }

    fn launch(
        &mut self,
        run: InstallerRun,
        command: CommandSpec,
        log_path: &Path,
    ) -> Result<(), EngineError> {
        let log_path = log_path.to_path_buf();
        self.bridge.run_in_background(
            move || process::run_logged(&command, &log_path),
            move |controller: &mut Controller, result| controller.run_completed(run, result),
        )
    }

    fn start_tail(&mut self, log_path: &Path) -> Result<(), EngineError> {
        self.stop_tail();
        let follower = TailFollower::start(
            &self.tail_config.program,
            self.tail_config.lines,
            log_path,
        )?;
        self.tail = Some(follower);
        Ok(())
    }

    fn stop_tail(&mut self) {
        if let Some(follower) = self.tail.take() {
            follower.stop();
        }
    }

    fn tail_active(&self) -> bool {
        self.tail.is_some()
    }

    fn reboot(&mut self) -> Result<(), EngineError> {
        self.run_system_command(
            &self.system.reboot_command,
            "reboot",
            |controller: &mut Controller, result| {
                if let Err(err) = result {
                    error!(?err, "reboot failed");
                    controller
                        .display_mut()
                        .set_status(&format!("reboot failed: {err}"), true);
                }
                Ok(())
            },
        )
    }

    fn disable_workflow(&mut self) -> Result<(), EngineError> {
        self.run_system_command(
            &self.system.disable_command,
            "disable",
            |controller: &mut Controller, result| {
                controller.workflow_disable_finished(result);
                Ok(())
            },
        )
    }

    fn request_exit(&mut self) {
        self.exit_requested = true;
    }
}
