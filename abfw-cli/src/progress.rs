//! Progress bar styling shared by every binary in this crate.

use indicatif::{ProgressBar, ProgressStyle};

/// Create a progress bar with standard styling, or a hidden one if
/// `enable` is false (used for `--quiet`/non-interactive output).
pub fn create_progress_bar(len: u64, enable: bool) -> ProgressBar {
    if !enable {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
            .expect("progress bar template is valid")
            .progress_chars("█▓▒░ "),
    );
    pb
}
