use serde::{Deserialize, Serialize};

use crate::models::{GroupHabit, LogEntry};
use crate::streaks::Day;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakResult {
    pub current: u32,
    pub longest: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeatmapDay {
    pub date: Day,
    pub satisfied: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HabitStats {
    pub habit_id: i64,
    pub name: String,
    pub streaks: StreakResult,
    pub consistency: u8,
    pub heatmap: Vec<HeatmapDay>,
    pub total_completions: usize,
    pub total_minutes: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HabitStreak {
    pub habit_id: i64,
    pub name: String,
    pub color: String,
    #[serde(flatten)]
    pub streaks: StreakResult,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreakOverview {
    pub habits: Vec<HabitStreak>,
    pub best_current: u32,
    pub best_longest: u32,
}

impl StreakOverview {
    pub fn new(habits: Vec<HabitStreak>) -> Self {
        let best_current = habits.iter().map(|h| h.streaks.current).max().unwrap_or(0);
        let best_longest = habits.iter().map(|h| h.streaks.longest).max().unwrap_or(0);
        Self {
            habits,
            best_current,
            best_longest,
        }
    }
}

/// Share of all active habits completed on one day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyConsistency {
    pub date: Day,
    pub pct: u8,
    pub completed: u32,
    pub total: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedMinutes {
    pub name: String,
    pub minutes: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayMinutes {
    pub date: String,
    pub habits: Vec<NamedMinutes>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimeBreakdown {
    pub by_date: Vec<DayMinutes>,
    pub by_category: Vec<NamedMinutes>,
    pub by_habit: Vec<NamedMinutes>,
    pub total_minutes: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberStats {
    pub user_id: i64,
    pub name: String,
    pub streaks: StreakResult,
    pub consistency: u8,
    pub completed_days: usize,
    pub heatmap: Vec<HeatmapDay>,
}

/// One member's daily values over the last week, oldest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeeklyRow {
    pub name: String,
    pub values: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupStats {
    pub group_id: i64,
    pub window_days: u32,
    pub days: Vec<Day>,
    pub weekly: Vec<WeeklyRow>,
    pub leaderboard: Vec<MemberStats>,
}

/// One member's check-in on a group habit for a day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberCheckin {
    pub user_id: i64,
    pub name: String,
    pub entry: Option<LogEntry>,
    pub satisfied: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HabitCheckins {
    pub habit: GroupHabit,
    pub done: usize,
    pub members: Vec<MemberCheckin>,
}

/// The whole group's progress on every group habit for one day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupToday {
    pub group_id: i64,
    pub date: Day,
    pub habits: Vec<HabitCheckins>,
}
