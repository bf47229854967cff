//! Runtime adjustments for configuration defaults.
//!
//! Resolves helper programs and clamps values that would stall the engine.

use crate::util::resolve_helper;

use super::Config;

impl Config {
    pub(super) fn apply_runtime_defaults(&mut self) {
        // A pool without threads would leave background work queued forever.
        self.general.workers = self.general.workers.max(1);
        self.tail.lines = self.tail.lines.max(1);
        self.forwarder.program = resolve_helper(&self.forwarder.program)
            .display()
            .to_string();
        self.simulation.replay_program = resolve_helper(&self.simulation.replay_program)
            .display()
            .to_string();
    }
}
