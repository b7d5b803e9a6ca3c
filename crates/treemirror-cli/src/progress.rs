//! Progress reporting for long-running CLI operations

use std::time::Duration;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};

/// Spinner shown while a mirror pass runs
pub struct ProgressManager {
    enabled: bool,
    spinner: Option<ProgressBar>,
}

impl ProgressManager {
    /// Create a manager; a disabled one never draws anything
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            spinner: None,
        }
    }

    /// Spinner only on an interactive terminal and without verbose logging
    pub fn for_terminal(verbose: bool) -> Self {
        Self::new(!verbose && console::Term::stderr().is_term())
    }

    pub fn is_active(&self) -> bool {
        self.spinner.is_some()
    }

    /// Start the mirror spinner
    pub fn start_mirror(&mut self, syncs: usize) {
        if !self.enabled {
            return;
        }
        let spinner = ProgressBar::new_spinner();
        if let Ok(template) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            spinner.set_style(template);
        }
        spinner.set_message(format!(
            "Mirroring {} synchronization(s)...",
            style(syncs).cyan()
        ));
        spinner.enable_steady_tick(Duration::from_millis(100));
        self.spinner = Some(spinner);
    }

    /// Stop the spinner, leaving `message` behind
    pub fn finish_mirror(&mut self, message: &str) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_with_message(message.to_string());
        }
    }

    /// Stop the spinner and erase it
    pub fn abandon(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
    }
}

impl Default for ProgressManager {
    fn default() -> Self {
        Self::new(false)
    }
}
