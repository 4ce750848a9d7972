use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use super::styling::{bright, bright_yellow, outcome};

/// Progress tracking for multi-phase operations
pub struct PhaseProgress {
    pb: ProgressBar,
    phase: usize,
    total: usize,
}

impl PhaseProgress {
    /// Prints the phases header and starts the first of `total` phases.
    pub fn start(total: usize, running: &str) -> Self {
        eprintln!("{}  {}", bright("⚙️"), bright("Phases").underlined());
        Self::spin(1, total, running)
    }

    /// Finishes the current phase and starts the next one.
    pub fn next(self, done: &str, ok: bool, running: &str) -> Self {
        let (phase, total) = (self.phase, self.total);
        self.finish_phase(done, ok);
        Self::spin(phase + 1, total, running)
    }

    pub fn finish(self, done: &str, ok: bool) {
        self.finish_phase(done, ok);
        eprintln!();
    }

    fn spin(phase: usize, total: usize, running: &str) -> Self {
        let pb =
            create_spinner(bright_yellow(format!("Phase {phase}/{total}: {running}")).to_string());
        Self { pb, phase, total }
    }

    fn finish_phase(self, done: &str, ok: bool) {
        let mark = if ok { "✓" } else { "✗" };
        let message = format!("Phase {}/{}: {done} {mark}", self.phase, self.total);
        self.pb.finish_with_message(outcome(message, ok).to_string());
    }
}

fn create_spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_draw_target(ProgressDrawTarget::stderr());
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("  {msg} {spinner}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message);
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}
