//! Installation phase model.
//!
//! The success chain is ordered; failures are a separate variant so they never
//! compare against progress.

use std::fmt;

/// Steps along the successful path, in order.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Milestone {
    NotStarted,
    RunningInstall,
    DoneInstall,
    RunningPostinstall,
    DonePostinstall,
}

impl Milestone {
    pub fn next(self) -> Option<Milestone> {
        match self {
            Milestone::NotStarted => Some(Milestone::RunningInstall),
            Milestone::RunningInstall => Some(Milestone::DoneInstall),
            Milestone::DoneInstall => Some(Milestone::RunningPostinstall),
            Milestone::RunningPostinstall => Some(Milestone::DonePostinstall),
            Milestone::DonePostinstall => None,
        }
    }
}

/// The two invocations of the external installer.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum InstallerRun {
    Install,
    Postinstall,
}

impl InstallerRun {
    pub fn label(self) -> &'static str {
        match self {
            InstallerRun::Install => "install",
            InstallerRun::Postinstall => "postinstall",
        }
    }

    /// Milestone held while this run is in flight.
    pub fn running(self) -> Milestone {
        match self {
            InstallerRun::Install => Milestone::RunningInstall,
            InstallerRun::Postinstall => Milestone::RunningPostinstall,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum InstallPhase {
    Progress(Milestone),
    /// Terminal failure of the given run.
    Failed(InstallerRun),
}

impl InstallPhase {
    pub const NOT_STARTED: Self = Self::Progress(Milestone::NotStarted);
    pub const RUNNING_INSTALL: Self = Self::Progress(Milestone::RunningInstall);
    pub const DONE_INSTALL: Self = Self::Progress(Milestone::DoneInstall);
    pub const RUNNING_POSTINSTALL: Self = Self::Progress(Milestone::RunningPostinstall);
    pub const DONE_POSTINSTALL: Self = Self::Progress(Milestone::DonePostinstall);
    pub const ERROR_INSTALL: Self = Self::Failed(InstallerRun::Install);
    pub const ERROR_POSTINSTALL: Self = Self::Failed(InstallerRun::Postinstall);

    /// Whether `next` is a legal successor: one step along the chain, or the
    /// failure of the run currently in flight.
    pub fn permits(self, next: InstallPhase) -> bool {
        match (self, next) {
            (InstallPhase::Progress(from), InstallPhase::Progress(to)) => from.next() == Some(to),
            (InstallPhase::Progress(from), InstallPhase::Failed(run)) => from == run.running(),
            (InstallPhase::Failed(_), _) => false,
        }
    }

    /// Which run's log the tail follower should show in this phase.
    pub fn log_run(self) -> InstallerRun {
        match self {
            InstallPhase::Failed(run) => run,
            InstallPhase::Progress(milestone) if milestone < Milestone::RunningPostinstall => {
                InstallerRun::Install
            }
            InstallPhase::Progress(_) => InstallerRun::Postinstall,
        }
    }
}

impl Default for InstallPhase {
    fn default() -> Self {
        Self::NOT_STARTED
    }
}

impl fmt::Display for InstallPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InstallPhase::Progress(Milestone::NotStarted) => "NotStarted",
            InstallPhase::Progress(Milestone::RunningInstall) => "RunningInstall",
            InstallPhase::Progress(Milestone::DoneInstall) => "DoneInstall",
            InstallPhase::Progress(Milestone::RunningPostinstall) => "RunningPostinstall",
            InstallPhase::Progress(Milestone::DonePostinstall) => "DonePostinstall",
            InstallPhase::Failed(InstallerRun::Install) => "ErrorInstall",
            InstallPhase::Failed(InstallerRun::Postinstall) => "ErrorPostinstall",
        };
        f.write_str(name)
    }
}
