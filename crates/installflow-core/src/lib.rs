//! Install orchestration engine shared by the installflow binaries.

pub mod bridge;
pub mod config;
pub mod error;
pub mod events;
pub mod forwarder;
pub mod host;
pub mod installer;
pub mod orchestrator;
pub mod phase;
pub mod process;
pub mod stage;
pub mod tail;
pub mod util;

pub use config::*;
pub use error::EngineError;
pub use host::{InstallHost, ProgressDisplay};
pub use orchestrator::Orchestrator;
pub use phase::{InstallPhase, InstallerRun, Milestone};
