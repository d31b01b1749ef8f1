pub mod clear;
pub mod index;
pub mod read;
pub mod status;
pub mod sync;

use indicatif::{ProgressBar, ProgressStyle};

pub(crate) fn progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
    );
    pb
}
