//! Install state machine.
//!
//! Every method runs on the event loop thread. Background completions arrive as
//! [`Orchestrator::forwarder_ready`] and [`Orchestrator::run_completed`], queued
//! by the host through the bridge.

use std::path::Path;

use tracing::{debug, error, info, trace, warn};

use crate::error::EngineError;
use crate::events::EventRecord;
use crate::host::{InstallHost, ProgressDisplay};
use crate::installer::InstallerPlan;
use crate::phase::{InstallPhase, InstallerRun, Milestone};
use crate::stage::StageTracker;
use crate::util;

pub const PROGRESS_TITLE: &str = "Installing system";
pub const PROGRESS_EXCERPT: &str = "Please wait for the installation to finish.";
pub const PROGRESS_FOOTER: &str = "Thank you for using installflow!";
pub const STATUS_INSTALL: &str = "Running install step";
pub const STATUS_POSTINSTALL: &str = "Running postinstall step";
pub const INSTALL_DONE_FOOTER: &str = "Install complete.";
pub const COMPLETE_TITLE: &str = "Installation complete!";
pub const COMPLETE_STATUS: &str = "Finished install!";
pub const ERROR_TITLE: &str = "An error occurred during installation";
pub const ERROR_EXCERPT: &str = "Please report this error";
pub const ERROR_FOOTER: &str = "An error has occurred.";
pub const ERROR_STATUS: &str = "An error has occurred";

pub struct Orchestrator<H, D> {
    host: H,
    display: D,
    plan: InstallerPlan,
    phase: InstallPhase,
    history: Vec<InstallPhase>,
    postinstall_config_ready: bool,
    tracker: StageTracker,
    endpoint: Option<String>,
    /// Set once the detailed progress view is up; silences stage updates.
    progress_view: bool,
    workflow_disabled: bool,
    disable_pending: bool,
}

impl<H: InstallHost, D: ProgressDisplay> Orchestrator<H, D> {
    pub fn new(host: H, display: D, plan: InstallerPlan) -> Self {
        Self {
            host,
            display,
            plan,
            phase: InstallPhase::NOT_STARTED,
            history: Vec::new(),
            postinstall_config_ready: false,
            tracker: StageTracker::new(),
            endpoint: None,
            progress_view: false,
            workflow_disabled: false,
            disable_pending: false,
        }
    }

    pub fn phase(&self) -> InstallPhase {
        self.phase
    }

    /// Phases entered so far, oldest first.
    pub fn history(&self) -> &[InstallPhase] {
        &self.history
    }

    pub fn postinstall_config_ready(&self) -> bool {
        self.postinstall_config_ready
    }

    pub fn progress_view_active(&self) -> bool {
        self.progress_view
    }

    pub fn tracker(&self) -> &StageTracker {
        &self.tracker
    }

    pub fn plan(&self) -> &InstallerPlan {
        &self.plan
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn display_mut(&mut self) -> &mut D {
        &mut self.display
    }

    /// Leave `NotStarted`. The install itself launches once the forwarder reports in.
    pub fn begin_install(&mut self) -> Result<(), EngineError> {
        self.set_phase(InstallPhase::RUNNING_INSTALL)?;
        self.host.start_forwarder()
    }

    /// Completion of the forwarder start. A missing endpoint is fatal.
    pub fn forwarder_ready(
        &mut self,
        endpoint: Result<String, EngineError>,
    ) -> Result<(), EngineError> {
        let endpoint = endpoint?;
        info!(%endpoint, "event forwarder listening");
        self.host.subscribe_events()?;
        self.host.start_spinner();
        let reporting = self.plan.reporting_config().to_path_buf();
        self.host.write_reporting_config(&reporting, &endpoint)?;
        self.endpoint = Some(endpoint);
        self.launch(InstallerRun::Install)
    }

    /// Completion of an installer run. Failing to start the installer is fatal;
    /// a non-zero exit moves to the matching error phase.
    pub fn run_completed(
        &mut self,
        run: InstallerRun,
        result: Result<i32, EngineError>,
    ) -> Result<(), EngineError> {
        let code = result?;
        info!(run = run.label(), code, "installer run finished");
        match run {
            InstallerRun::Install => self.install_completed(code),
            InstallerRun::Postinstall => self.postinstall_completed(code),
        }
    }

    fn install_completed(&mut self, code: i32) -> Result<(), EngineError> {
        self.host.stop_spinner();
        self.host.stop_tail();
        if code != 0 {
            self.set_phase(InstallPhase::ERROR_INSTALL)?;
            self.release_event_feed();
            return self.show_error();
        }
        self.display.set_footer(INSTALL_DONE_FOOTER);
        self.set_phase(InstallPhase::DONE_INSTALL)?;
        if self.postinstall_config_ready {
            self.start_postinstall()?;
        } else {
            debug!("install finished before postinstall config arrived");
        }
        Ok(())
    }

    fn postinstall_completed(&mut self, code: i32) -> Result<(), EngineError> {
        self.host.stop_tail();
        if code != 0 {
            self.set_phase(InstallPhase::ERROR_POSTINSTALL)?;
            self.release_event_feed();
            return self.show_error();
        }
        self.set_phase(InstallPhase::DONE_POSTINSTALL)?;
        self.release_event_feed();
        self.display.advance_progress();
        self.display.set_header(COMPLETE_TITLE, "");
        self.display.set_footer("");
        self.display.set_status(COMPLETE_STATUS, false);
        self.display.show_complete(false);
        Ok(())
    }

    /// The postinstall configuration has been written. Starts postinstall when
    /// install already finished; otherwise install completion picks it up.
    pub fn postinstall_config_written(&mut self) -> Result<(), EngineError> {
        if self.postinstall_config_ready {
            debug!("postinstall config written again");
        }
        self.postinstall_config_ready = true;
        if self.phase == InstallPhase::DONE_INSTALL {
            self.start_postinstall()?;
        }
        Ok(())
    }

    pub fn network_config_written(&mut self, source: &Path) -> Result<(), EngineError> {
        let dest = self.plan.network_config().to_path_buf();
        info!(source = %source.display(), dest = %dest.display(), "network config received");
        self.host.copy_network_config(source, &dest)
    }

    pub fn start_postinstall(&mut self) -> Result<(), EngineError> {
        if !self.postinstall_config_ready {
            error!(phase = %self.phase, "postinstall requested without its config");
            return Err(EngineError::PostinstallNotConfigured);
        }
        self.set_phase(InstallPhase::RUNNING_POSTINSTALL)?;
        if self.progress_view {
            self.display.set_status(STATUS_POSTINSTALL, false);
            self.start_tail_follower();
        }
        self.launch(InstallerRun::Postinstall)
    }

    fn launch(&mut self, run: InstallerRun) -> Result<(), EngineError> {
        let command = self
            .plan
            .command(run, self.endpoint.as_deref().unwrap_or_default());
        let log_path = self.plan.log_path(run).to_path_buf();
        info!(
            run = run.label(),
            command = %command.display(),
            log = %log_path.display(),
            "launching installer"
        );
        self.host.launch(run, command, &log_path)
    }

    /// Fold a journal record into the footer state. Ignored once the progress view is up.
    pub fn event_record(&mut self, record: &EventRecord) {
        if self.progress_view {
            return;
        }
        if self.tracker.apply(record) {
            trace!(
                name = %record.name,
                desc = %util::log_snippet(&record.message),
                depth = self.tracker.depth(),
                stage = self.tracker.current_stage(),
                "installer event"
            );
        }
    }

    pub fn spinner_tick(&mut self) {
        let footer = self.tracker.spinner_footer();
        self.display.set_footer(&footer);
    }

    pub fn log_tail(&mut self, text: &str) {
        self.display.add_log_tail(text);
    }

    /// Switch to the detailed progress view. Safe to call repeatedly.
    pub fn show_progress(&mut self) -> Result<(), EngineError> {
        if self.host.stop_spinner() {
            debug!("spinner stopped for progress view");
        }
        self.display.set_header(PROGRESS_TITLE, PROGRESS_EXCERPT);
        self.display.set_footer(PROGRESS_FOOTER);
        self.display.open_progress_view();
        self.progress_view = true;

        let milestone = match self.phase {
            InstallPhase::Failed(_) => return self.show_error(),
            InstallPhase::Progress(milestone) => milestone,
        };
        if milestone == Milestone::DonePostinstall {
            self.display.set_header(COMPLETE_TITLE, "");
            self.display.set_footer("");
            self.display.set_status(COMPLETE_STATUS, false);
            self.display.show_complete(false);
            return Ok(());
        }
        let status = if milestone < Milestone::RunningPostinstall {
            STATUS_INSTALL
        } else {
            STATUS_POSTINSTALL
        };
        self.display.set_status(status, false);
        self.start_tail_follower();
        Ok(())
    }

    fn show_error(&mut self) -> Result<(), EngineError> {
        warn!(phase = %self.phase, "installation failed");
        self.display.set_header(ERROR_TITLE, ERROR_EXCERPT);
        self.display.set_footer(ERROR_FOOTER);
        if !self.progress_view {
            return self.show_progress();
        }
        self.display.set_status(ERROR_STATUS, true);
        self.display.show_complete(true);
        Ok(())
    }

    pub fn show_full_log(&mut self) -> Result<(), EngineError> {
        if !self.progress_view {
            self.show_progress()?;
        }
        self.display.show_log_view(true);
        if !self.host.tail_active() {
            self.start_tail_follower();
        }
        Ok(())
    }

    pub fn close_full_log(&mut self) {
        self.display.show_log_view(false);
    }

    /// Log the tail follower shows for the current phase.
    pub fn tail_log_path(&self) -> &Path {
        self.plan.log_path(self.phase.log_run())
    }

    /// Replace any running follower with one on the current phase's log.
    ///
    /// A follower that cannot start only costs the log view, so it is reported
    /// there instead of aborting the install.
    pub fn start_tail_follower(&mut self) {
        self.host.stop_tail();
        self.display.clear_log_tail();
        let log_path = self.tail_log_path().to_path_buf();
        if let Err(err) = self.host.start_tail(&log_path) {
            warn!(%err, log = %log_path.display(), "log tail unavailable");
            self.display.add_log_tail(&format!("{err}\n"));
        }
    }

    pub fn stop_tail_follower(&mut self) {
        self.host.stop_tail();
    }

    pub fn reboot(&mut self) -> Result<(), EngineError> {
        if self.plan.simulated() {
            info!("simulated run, exiting instead of rebooting");
            self.host.request_exit();
            return Ok(());
        }
        info!("rebooting");
        self.host.reboot()
    }

    /// Exit to a shell. Outside simulation the workflow is disabled first and
    /// the exit is requested from [`Orchestrator::workflow_disable_finished`].
    pub fn quit(&mut self) -> Result<(), EngineError> {
        if self.plan.simulated() || self.workflow_disabled {
            self.host.request_exit();
            return Ok(());
        }
        if self.disable_pending {
            debug!("workflow disable already running");
            return Ok(());
        }
        info!("disabling installer workflow");
        self.disable_pending = true;
        if let Err(err) = self.host.disable_workflow() {
            self.disable_pending = false;
            return Err(err);
        }
        Ok(())
    }

    /// Completion of the disable started by [`Orchestrator::quit`]. A failure
    /// keeps the application up so the user can see it and retry.
    pub fn workflow_disable_finished(&mut self, result: Result<(), EngineError>) {
        self.disable_pending = false;
        match result {
            Ok(()) => {
                info!("installer workflow disabled");
                self.workflow_disabled = true;
                self.host.request_exit();
            }
            Err(err) => {
                error!(?err, "failed to disable installer workflow");
                self.display.set_status(&format!("disable failed: {err}"), true);
            }
        }
    }

    fn release_event_feed(&mut self) {
        self.host.unsubscribe_events();
        self.host.stop_forwarder();
    }

    fn set_phase(&mut self, next: InstallPhase) -> Result<(), EngineError> {
        if !self.phase.permits(next) {
            error!(from = %self.phase, to = %next, "rejected phase transition");
            return Err(EngineError::InvalidTransition {
                from: self.phase,
                to: next,
            });
        }
        info!(from = %self.phase, to = %next, "phase transition");
        self.phase = next;
        self.history.push(next);
        Ok(())
    }
}
