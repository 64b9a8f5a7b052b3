//! Streak, heatmap and consistency arithmetic over sets of completed days.
//!
//! Everything here is pure: callers resolve raw logs into days, pass
//! `today` explicitly, and get plain data back.

pub mod day;
pub mod engine;

pub use day::{DATE_FORMAT, Day};
pub use engine::{
    CompletionSet, MAX_WINDOW_DAYS, compute_consistency, compute_heatmap, compute_streaks, percent,
    window_start,
};
