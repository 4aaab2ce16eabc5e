//! Progress indicators for the converge CLI

use indicatif::{ProgressBar, ProgressStyle};

/// Progress bar for a known number of operations
pub fn bar(len: u64, prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{prefix:.bold} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
    );
    pb.set_prefix(prefix.to_string());
    pb
}

/// Hidden bar for quiet mode
pub fn hidden() -> ProgressBar {
    ProgressBar::hidden()
}
