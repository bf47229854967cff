//! Reduces the flat start/finish event stream into a "current activity" line.
//!
//! Start events push a label, finish events pop one. The stage comes from the
//! second segment of the event name (`cmd-install/stage-partitioning/...`).

use crate::events::{EventRecord, EventType};

const STAGE_PREFIX: &str = "stage-";
const UNKNOWN_STAGE: &str = "???";
const SPIN_CHARS: [char; 4] = ['-', '\\', '|', '/'];

#[derive(Debug, Default, Clone)]
pub struct StageTracker {
    event_stack: Vec<String>,
    current_stage: String,
    description: String,
    dots: String,
    spin_index: usize,
}

impl StageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one record into the display state. Returns true when it was a start or finish.
    pub fn apply(&mut self, record: &EventRecord) -> bool {
        match record.event_type {
            EventType::Start => {
                self.start(&record.name, &record.message);
                true
            }
            EventType::Finish => {
                self.finish();
                true
            }
            EventType::Other(_) => false,
        }
    }

    fn start(&mut self, name: &str, desc: &str) {
        let stage = stage_of(name);
        self.event_stack.push(desc.to_string());
        if stage == self.current_stage {
            self.description = format!(" {desc}");
        } else {
            self.current_stage = stage;
            self.description.clear();
            self.dots.clear();
        }
    }

    fn finish(&mut self) {
        if self.event_stack.pop().is_none() {
            return;
        }
        // An emptied stack keeps the last description on screen until the next start.
        if let Some(top) = self.event_stack.last() {
            self.description = format!(" {top}");
            if self.dots.is_empty() {
                self.dots.push(' ');
            }
            self.dots.push('.');
        }
    }

    /// Advance the spinner and render the footer line.
    pub fn spinner_footer(&mut self) -> String {
        self.spin_index = (self.spin_index + 1) % SPIN_CHARS.len();
        format!(
            "Install running \"{}\"{}{} {}",
            self.current_stage, self.dots, self.description, SPIN_CHARS[self.spin_index]
        )
    }

    pub fn depth(&self) -> usize {
        self.event_stack.len()
    }

    pub fn event_stack(&self) -> &[String] {
        &self.event_stack
    }

    pub fn current_stage(&self) -> &str {
        &self.current_stage
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn dots(&self) -> &str {
        &self.dots
    }
}

fn stage_of(name: &str) -> String {
    name.split('/')
        .nth(1)
        .and_then(|segment| segment.strip_prefix(STAGE_PREFIX))
        .unwrap_or(UNKNOWN_STAGE)
        .to_string()
}
