pub mod group;
pub mod habit;
pub mod stats;
pub mod timer;
pub mod user;

pub use group::{
    Group, GroupDraft, GroupError, GroupHabit, GroupMember, GroupMessage, Role,
};
pub use habit::{Habit, HabitDraft, HabitLog, HabitType, LogEntry, LogUpdate};
pub use stats::{
    DailyConsistency, DayMinutes, GroupStats, GroupToday, HabitCheckins, HabitStats, HabitStreak,
    HeatmapDay, MemberCheckin, MemberStats, NamedMinutes, StreakOverview, StreakResult,
    TimeBreakdown, WeeklyRow,
};
pub use timer::RunningTimer;
pub use user::User;
