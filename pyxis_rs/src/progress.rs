//! Console feedback: styled status lines and the compile-queue bar.

use std::time::Duration;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};

/// Progress over the work queue.
///
/// Driver messages route through [`BuildProgress::println`] so they print
/// above the bar instead of tearing it. Under `quiet` the bar is hidden
/// and informational lines are dropped; compiler diagnostics still reach
/// stderr through [`BuildProgress::eprintln`].
pub struct BuildProgress {
    bar: ProgressBar,
    quiet: bool,
}

impl BuildProgress {
    pub fn new(total: u64, quiet: bool) -> Self {
        let bar = if quiet || total == 0 {
            ProgressBar::hidden()
        } else {
            let bar = ProgressBar::new(total);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("{bar:24.cyan} {pos}/{len}")
                    .expect("valid template"),
            );
            bar
        };
        Self { bar, quiet }
    }

    /// Informational line; suppressed under quiet.
    pub fn println(&self, message: impl AsRef<str>) {
        if self.quiet {
            return;
        }
        self.bar.suspend(|| println!("{}", message.as_ref()));
    }

    /// Diagnostic line to stderr; never suppressed.
    pub fn eprintln(&self, message: impl AsRef<str>) {
        self.bar.suspend(|| eprintln!("{}", message.as_ref()));
    }

    pub fn inc(&self) {
        self.bar.inc(1);
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

/// Print a success message (green checkmark).
pub fn success(message: &str) {
    println!("{} {}", style("✓").green().bold(), message);
}

/// Print an error message (red) to stderr.
pub fn error(message: &str) {
    eprintln!("{} {}", style("✗").red().bold(), message);
}

/// Format a duration for the end-of-build summary.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    if secs < 1.0 {
        format!("{:.0}ms", secs * 1000.0)
    } else if secs < 60.0 {
        format!("{secs:.2}s")
    } else {
        format!("{:.1}m", secs / 60.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_format_by_magnitude() {
        assert_eq!(format_duration(Duration::from_millis(120)), "120ms");
        assert_eq!(format_duration(Duration::from_millis(2500)), "2.50s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1.5m");
    }
}
