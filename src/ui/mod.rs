pub mod progress;

#[cfg(test)]
mod progress_tests;

pub use progress::{
    estimate_eta, format_clock, human_bytes, ProgressBar, ProgressEaser, ProgressTracker,
    WriteStats,
};
