use anyhow::anyhow;
use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub const DEFAULT_COLOR: &str = "#6366f1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HabitType {
    Checkbox,
    Timer,
    Count,
}

impl HabitType {
    pub fn as_str(&self) -> &'static str {
        match self {
            HabitType::Checkbox => "checkbox",
            HabitType::Timer => "timer",
            HabitType::Count => "count",
        }
    }
}

impl std::fmt::Display for HabitType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for HabitType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "checkbox" | "check" => Ok(HabitType::Checkbox),
            "timer" | "time" => Ok(HabitType::Timer),
            "count" | "counter" => Ok(HabitType::Count),
            _ => Err(anyhow!("Unknown habit type: {} (use checkbox, timer, count)", s)),
        }
    }
}

fn weekday_code(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "MON",
        Weekday::Tue => "TUE",
        Weekday::Wed => "WED",
        Weekday::Thu => "THU",
        Weekday::Fri => "FRI",
        Weekday::Sat => "SAT",
        Weekday::Sun => "SUN",
    }
}

/// Parse a comma separated list such as `MON,wed,Fri`. Empty means every day.
pub fn parse_schedule(s: &str) -> anyhow::Result<Vec<Weekday>> {
    let mut days = Vec::new();
    for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let day = Weekday::from_str(part).map_err(|_| anyhow!("Unknown weekday: {}", part))?;
        if !days.contains(&day) {
            days.push(day);
        }
    }
    days.sort_by_key(|d| d.num_days_from_monday());
    Ok(days)
}

pub fn format_schedule(days: &[Weekday]) -> String {
    days.iter().map(|d| weekday_code(*d)).collect::<Vec<_>>().join(",")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Habit {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub category: String,
    pub habit_type: HabitType,
    pub color: String,
    pub icon: Option<String>,
    pub target_count: Option<i64>,
    pub schedule_days: Vec<Weekday>,
    pub archived: bool,
}

impl Habit {
    pub fn is_scheduled_on(&self, date: NaiveDate) -> bool {
        self.schedule_days.is_empty() || self.schedule_days.contains(&date.weekday())
    }

    pub fn label(&self) -> String {
        match &self.icon {
            Some(icon) => format!("{} {}", icon, self.name),
            None => self.name.clone(),
        }
    }
}

/// Fields for creating a habit, or the changes to apply when editing one.
#[derive(Debug, Clone, Default)]
pub struct HabitDraft {
    pub name: Option<String>,
    pub category: Option<String>,
    pub habit_type: Option<HabitType>,
    pub color: Option<String>,
    pub icon: Option<String>,
    pub target_count: Option<i64>,
    pub schedule_days: Option<Vec<Weekday>>,
}

/// One day's progress on a habit. Shared by personal and group habit logs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub completed: bool,
    pub duration: Option<i64>,
    pub count: Option<i64>,
    pub note: Option<String>,
}

impl LogEntry {
    /// A day counts towards streaks if it was checked off or had any time logged.
    pub fn is_satisfied(&self) -> bool {
        self.completed || self.duration.unwrap_or(0) > 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HabitLog {
    pub habit_id: i64,
    pub date: String,
    #[serde(flatten)]
    pub entry: LogEntry,
}

/// A change to today's log. `duration` and `count` are deltas.
#[derive(Debug, Clone, Default)]
pub struct LogUpdate {
    pub completed: Option<bool>,
    pub duration: Option<i64>,
    pub count: Option<i64>,
    pub note: Option<String>,
}

/// Largest value a single log may hold, in minutes or reps.
pub const MAX_LOG_VALUE: i64 = 1_000_000;

/// Add `delta` to an optional running total, floored at zero.
fn accumulate(base: Option<i64>, delta: i64, what: &str) -> anyhow::Result<i64> {
    let total = base
        .unwrap_or(0)
        .checked_add(delta)
        .filter(|t| *t <= MAX_LOG_VALUE)
        .ok_or_else(|| anyhow!("{} for one day cannot exceed {}", what, MAX_LOG_VALUE))?;
    Ok(total.max(0))
}

impl LogUpdate {
    /// Merge this update into the existing entry for the day (if any).
    ///
    /// Durations and counts accumulate and never go below zero, and a
    /// count habit with a target is complete exactly when the target is met.
    pub fn apply(
        &self,
        existing: Option<&LogEntry>,
        habit_type: HabitType,
        target: Option<i64>,
    ) -> anyhow::Result<LogEntry> {
        let base = existing.cloned().unwrap_or_default();

        let duration = match self.duration {
            Some(d) => Some(accumulate(base.duration, d, "Minutes")?),
            None => base.duration,
        };
        let count = match self.count {
            Some(c) => Some(accumulate(base.count, c, "Count")?),
            None => base.count,
        };

        let mut completed = self.completed.unwrap_or(base.completed);
        if let (HabitType::Count, Some(n), Some(t)) = (habit_type, count, target) {
            if self.count.is_some() && t > 0 {
                completed = n >= t;
            }
        }

        Ok(LogEntry {
            completed,
            duration,
            count,
            note: self.note.clone().or(base.note),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_parsing_is_case_insensitive_and_ordered() {
        let days = parse_schedule("fri, MON,wed,mon").unwrap();
        assert_eq!(days, vec![Weekday::Mon, Weekday::Wed, Weekday::Fri]);
        assert_eq!(format_schedule(&days), "MON,WED,FRI");
        assert!(parse_schedule("").unwrap().is_empty());
        assert!(parse_schedule("MON,Funday").is_err());
    }

    #[test]
    fn empty_schedule_means_every_day() {
        let mut habit = Habit {
            id: 1,
            user_id: 1,
            name: "Read".into(),
            category: "Learning".into(),
            habit_type: HabitType::Checkbox,
            color: DEFAULT_COLOR.into(),
            icon: None,
            target_count: None,
            schedule_days: vec![],
            archived: false,
        };
        // 2024-01-06 is a Saturday
        let sat = NaiveDate::from_ymd_opt(2024, 1, 6).unwrap();
        assert!(habit.is_scheduled_on(sat));
        habit.schedule_days = vec![Weekday::Mon];
        assert!(!habit.is_scheduled_on(sat));
    }

    #[test]
    fn timer_minutes_accumulate_and_satisfy() {
        let first = LogUpdate { duration: Some(20), ..Default::default() }
            .apply(None, HabitType::Timer, None)
            .unwrap();
        assert_eq!(first.duration, Some(20));
        assert!(!first.completed);
        assert!(first.is_satisfied());

        let second = LogUpdate { duration: Some(15), ..Default::default() }
            .apply(Some(&first), HabitType::Timer, None)
            .unwrap();
        assert_eq!(second.duration, Some(35));
    }

    #[test]
    fn count_habits_complete_when_target_met() {
        let update = |n| LogUpdate { count: Some(n), ..Default::default() };
        let a = update(6).apply(None, HabitType::Count, Some(10)).unwrap();
        assert_eq!(a.count, Some(6));
        assert!(!a.completed);

        let b = update(4).apply(Some(&a), HabitType::Count, Some(10)).unwrap();
        assert_eq!(b.count, Some(10));
        assert!(b.completed);

        // Backing off below the target un-completes the day.
        let c = update(-3).apply(Some(&b), HabitType::Count, Some(10)).unwrap();
        assert_eq!(c.count, Some(7));
        assert!(!c.completed);
    }

    #[test]
    fn counts_never_go_negative() {
        let e = LogUpdate { count: Some(-5), ..Default::default() }
            .apply(None, HabitType::Count, None)
            .unwrap();
        assert_eq!(e.count, Some(0));
    }

    #[test]
    fn minutes_never_go_negative() {
        let e = LogUpdate { duration: Some(-30), ..Default::default() }
            .apply(None, HabitType::Timer, None)
            .unwrap();
        assert_eq!(e.duration, Some(0));
        assert!(!e.is_satisfied());

        let logged = LogEntry { duration: Some(20), ..Default::default() };
        let e = LogUpdate { duration: Some(-45), ..Default::default() }
            .apply(Some(&logged), HabitType::Timer, None)
            .unwrap();
        assert_eq!(e.duration, Some(0));
    }

    #[test]
    fn huge_totals_are_rejected_not_wrapped() {
        let full = LogEntry { count: Some(i64::MAX), ..Default::default() };
        let more = LogUpdate { count: Some(1), ..Default::default() };
        assert!(more.apply(Some(&full), HabitType::Count, None).is_err());

        let at_cap = LogEntry { duration: Some(MAX_LOG_VALUE), ..Default::default() };
        let extra = LogUpdate { duration: Some(1), ..Default::default() };
        assert!(extra.apply(Some(&at_cap), HabitType::Timer, None).is_err());

        let fine = LogUpdate { duration: Some(-1), ..Default::default() }
            .apply(Some(&at_cap), HabitType::Timer, None)
            .unwrap();
        assert_eq!(fine.duration, Some(MAX_LOG_VALUE - 1));
    }

    #[test]
    fn untouched_fields_are_kept() {
        let existing = LogEntry {
            completed: true,
            duration: Some(10),
            count: None,
            note: Some("morning".into()),
        };
        let e = LogUpdate::default()
            .apply(Some(&existing), HabitType::Timer, None)
            .unwrap();
        assert_eq!(e, existing);
    }

    #[test]
    fn habit_type_parsing() {
        assert_eq!("TIMER".parse::<HabitType>().unwrap(), HabitType::Timer);
        assert_eq!("counter".parse::<HabitType>().unwrap(), HabitType::Count);
        assert!("sometimes".parse::<HabitType>().is_err());
    }
}
