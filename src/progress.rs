//! Progress reporting for long-running phases.

use indicatif::{ProgressBar, ProgressStyle};

/// Receives progress updates between and during pipeline phases.
pub trait Progress {
    fn start_task(&self, name: &str, work: u64);
    fn progress(&self, delta: u64);
    fn finish_task(&self);
}

/// Discards all updates.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn start_task(&self, _name: &str, _work: u64) {}
    fn progress(&self, _delta: u64) {}
    fn finish_task(&self) {}
}

impl Progress for ProgressBar {
    fn start_task(&self, name: &str, work: u64) {
        self.reset();
        self.set_length(work);
        self.set_message(name.to_string());
    }

    fn progress(&self, delta: u64) {
        self.inc(delta);
    }

    fn finish_task(&self) {
        self.finish_with_message("done");
    }
}

/// Progress bar styled like the rest of the tooling.
pub fn progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(0);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] {msg} [{bar:40.cyan/blue}] {pos}/{len}")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}
