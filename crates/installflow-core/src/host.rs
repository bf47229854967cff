//! Seams between the orchestrator and the outside world.
//!
//! The orchestrator decides *what* happens; an [`InstallHost`] owns processes,
//! timers and the journal subscription, and a [`ProgressDisplay`] renders text.

use std::path::Path;

use crate::error::EngineError;
use crate::phase::InstallerRun;
use crate::process::CommandSpec;

/// Side effects the orchestrator requests. All calls happen on the event loop.
pub trait InstallHost {
    /// Start the event forwarder in the background. The endpoint it reports is
    /// delivered later through `Orchestrator::forwarder_ready`.
    fn start_forwarder(&mut self) -> Result<(), EngineError>;
    fn stop_forwarder(&mut self);

    fn subscribe_events(&mut self) -> Result<(), EngineError>;
    fn unsubscribe_events(&mut self);

    fn start_spinner(&mut self);
    /// Returns true when a spinner was running.
    fn stop_spinner(&mut self) -> bool;

    fn write_reporting_config(&mut self, path: &Path, endpoint: &str) -> Result<(), EngineError>;
    fn copy_network_config(&mut self, source: &Path, dest: &Path) -> Result<(), EngineError>;

    /// Run the installer in the background, logging to `log_path`. The exit code
    /// is delivered later through `Orchestrator::run_completed`.
    fn launch(
        &mut self,
        run: InstallerRun,
        command: CommandSpec,
        log_path: &Path,
    ) -> Result<(), EngineError>;

    fn start_tail(&mut self, log_path: &Path) -> Result<(), EngineError>;
    /// No-op when no follower is active.
    fn stop_tail(&mut self);
    fn tail_active(&self) -> bool;

    fn reboot(&mut self) -> Result<(), EngineError>;
    /// Start the disable command in the background. The result is delivered
    /// later through `Orchestrator::workflow_disable_finished`.
    fn disable_workflow(&mut self) -> Result<(), EngineError>;
    fn request_exit(&mut self);
}

/// Text surfaces the orchestrator writes to.
pub trait ProgressDisplay {
    fn set_header(&mut self, title: &str, excerpt: &str);
    fn set_footer(&mut self, text: &str);

    /// Replace whatever is shown with a fresh progress view.
    fn open_progress_view(&mut self);
    fn set_status(&mut self, status: &str, is_error: bool);
    fn clear_log_tail(&mut self);
    fn add_log_tail(&mut self, text: &str);
    fn show_log_view(&mut self, visible: bool);
    /// Offer the completion actions; `include_exit` adds "exit to shell".
    fn show_complete(&mut self, include_exit: bool);
    fn advance_progress(&mut self);
}
