pub mod group;
pub mod personal;

pub use group::{group_stats, group_today};
pub use personal::{
    Period, daily_consistency, habit_stats, streak_overview, time_breakdown, today_minutes,
};
