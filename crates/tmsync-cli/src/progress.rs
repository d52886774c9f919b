//! Progress bars for the concurrent upload phases.

use indicatif::{ProgressBar, ProgressStyle};
use std::io::IsTerminal;

use tmsync_core::{Progress, ProgressReporter};

const TEMPLATE: &str = "{msg:<16} [{bar:40.cyan/blue}] {pos}/{len} ({elapsed})";

/// Shows one bar per phase on stderr, or nothing when stderr is not a terminal.
pub struct BarReporter {
    enabled: bool,
}

impl BarReporter {
    pub fn new() -> Self {
        Self {
            enabled: std::io::stderr().is_terminal(),
        }
    }
}

impl ProgressReporter for BarReporter {
    fn start(&self, label: &str, total: u64) -> Box<dyn Progress> {
        if !self.enabled {
            return Box::new(Bar(ProgressBar::hidden()));
        }
        let bar = ProgressBar::new(total);
        let style = ProgressStyle::with_template(TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        bar.set_style(style);
        bar.set_message(label.to_string());
        Box::new(Bar(bar))
    }
}

struct Bar(ProgressBar);

impl Progress for Bar {
    fn advance(&self, amount: u64) {
        self.0.inc(amount);
    }

    fn finish(&self, message: &str) {
        let label = self.0.message();
        self.0.finish_with_message(format!("{label} {message}"));
    }
}
