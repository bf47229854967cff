//! Display state written by the orchestrator and read by the drawing code.

use std::collections::VecDeque;

use installflow_core::ProgressDisplay;

// Bound log memory usage by trimming old entries.
const MAX_LOG_LINES: usize = 2000;
const PROGRESS_STEPS: u16 = 1;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum View {
    // Header, footer and spinner only.
    Waiting,
    // Status box with the log tail.
    Progress,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Status {
    pub text: String,
    pub is_error: bool,
}

/// Completion actions offered once a run has ended.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Completion {
    pub reboot: bool,
    pub exit_to_shell: bool,
}

pub struct Screen {
    pub title: String,
    pub excerpt: String,
    pub footer: String,
    pub view: View,
    pub status: Option<Status>,
    pub log_view: bool,
    pub completion: Option<Completion>,
    pub progress: u16,
    lines: VecDeque<String>,
    // Text after the last newline; completed by the next chunk.
    partial: String,
}

impl Screen {
    pub fn new() -> Self {
        Self {
            title: String::new(),
            excerpt: String::new(),
            footer: String::new(),
            view: View::Waiting,
            status: None,
            log_view: false,
            completion: None,
            progress: 0,
            lines: VecDeque::new(),
            partial: String::new(),
        }
    }

    /// Log lines in order, including an unterminated trailing line.
    pub fn log_lines(&self) -> impl Iterator<Item = &str> {
        self.lines
            .iter()
            .map(String::as_str)
            .chain((!self.partial.is_empty()).then_some(self.partial.as_str()))
    }

    pub fn log_len(&self) -> usize {
        self.lines.len() + usize::from(!self.partial.is_empty())
    }

    pub fn progress_ratio(&self) -> f64 {
        f64::from(self.progress.min(PROGRESS_STEPS)) / f64::from(PROGRESS_STEPS)
    }

    fn push_line(&mut self, line: String) {
        self.lines.push_back(line);
        while self.lines.len() > MAX_LOG_LINES {
            self.lines.pop_front();
        }
    }
}

impl ProgressDisplay for Screen {
    fn set_header(&mut self, title: &str, excerpt: &str) {
        self.title = title.to_string();
        self.excerpt = excerpt.to_string();
    }

    fn set_footer(&mut self, text: &str) {
        self.footer = text.to_string();
    }

    fn open_progress_view(&mut self) {
        self.view = View::Progress;
        self.status = None;
        self.completion = None;
        self.log_view = false;
    }

    fn set_status(&mut self, status: &str, is_error: bool) {
        self.status = Some(Status {
            text: status.to_string(),
            is_error,
        });
    }

    fn clear_log_tail(&mut self) {
        self.lines.clear();
        self.partial.clear();
    }

    fn add_log_tail(&mut self, text: &str) {
        let mut rest = text;
        while let Some(pos) = rest.find('\n') {
            let mut line = std::mem::take(&mut self.partial);
            line.push_str(rest[..pos].trim_end_matches('\r'));
            self.push_line(line);
            rest = &rest[pos + 1..];
        }
        self.partial.push_str(rest);
    }

    fn show_log_view(&mut self, visible: bool) {
        self.log_view = visible;
    }

    fn show_complete(&mut self, include_exit: bool) {
        self.completion = Some(Completion {
            reboot: true,
            exit_to_shell: include_exit,
        });
    }

    fn advance_progress(&mut self) {
        self.progress = self.progress.saturating_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_are_joined_into_lines() {
        let mut screen = Screen::new();
        screen.add_log_tail("curtin: Installation started.\nstart: cmd-in");
        screen.add_log_tail("stall/stage-partitioning\r\nfinish");
        let lines: Vec<_> = screen.log_lines().collect();
        assert_eq!(
            lines,
            vec![
                "curtin: Installation started.",
                "start: cmd-install/stage-partitioning",
                "finish",
            ]
        );
        assert_eq!(screen.log_len(), 3);
    }

    #[test]
    fn log_is_bounded() {
        let mut screen = Screen::new();
        for idx in 0..(MAX_LOG_LINES + 10) {
            screen.add_log_tail(&format!("line {idx}\n"));
        }
        assert_eq!(screen.log_len(), MAX_LOG_LINES);
        assert_eq!(screen.log_lines().next(), Some("line 10"));
    }

    #[test]
    fn clearing_drops_partial_lines() {
        let mut screen = Screen::new();
        screen.add_log_tail("half a line");
        screen.clear_log_tail();
        screen.add_log_tail("fresh\n");
        assert_eq!(screen.log_lines().collect::<Vec<_>>(), vec!["fresh"]);
    }

    #[test]
    fn reopening_the_view_resets_completion() {
        let mut screen = Screen::new();
        screen.open_progress_view();
        screen.set_status("An error has occurred", true);
        screen.show_complete(true);
        assert_eq!(
            screen.completion,
            Some(Completion {
                reboot: true,
                exit_to_shell: true
            })
        );
        screen.open_progress_view();
        assert!(screen.completion.is_none());
        assert!(screen.status.is_none());
        assert_eq!(screen.view, View::Progress);
    }

    #[test]
    fn progress_ratio_is_clamped() {
        let mut screen = Screen::new();
        assert_eq!(screen.progress_ratio(), 0.0);
        screen.advance_progress();
        screen.advance_progress();
        assert_eq!(screen.progress_ratio(), 1.0);
    }
}
