use anyhow::{Context, Result, anyhow};
use chrono::{Datelike, Duration, NaiveDate};
use rusqlite::Connection;
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

use crate::db::repository::{HabitRepo, LogRepo, MinutesRow};
use crate::models::{
    DailyConsistency, DayMinutes, Habit, HabitStats, HabitStreak, NamedMinutes, StreakOverview,
    TimeBreakdown,
};
use crate::streaks::{
    CompletionSet, Day, MAX_WINDOW_DAYS, compute_consistency, compute_heatmap, compute_streaks,
    percent, window_start,
};

/// Completion history of one habit, as engine input.
pub fn habit_completions(conn: &Connection, habit_id: i64) -> Result<CompletionSet> {
    let dates = LogRepo::completion_dates(conn, habit_id)?;
    CompletionSet::parse_all(&dates)
        .with_context(|| format!("Reading completion dates of habit {}", habit_id))
}

pub fn habit_stats(
    conn: &Connection,
    habit: &Habit,
    window_days: u32,
    today: Day,
) -> Result<HabitStats> {
    let completions = habit_completions(conn, habit.id)?;
    let (total_completions, total_minutes) = match window_start(window_days, today) {
        Some(start) => {
            let logs = LogRepo::get_range(conn, habit.id, &start.to_string(), &today.to_string())?;
            (
                completions.between(start, today).count(),
                logs.iter().filter_map(|l| l.entry.duration).sum(),
            )
        }
        None => (0, 0),
    };

    Ok(HabitStats {
        habit_id: habit.id,
        name: habit.name.clone(),
        streaks: compute_streaks(&completions, today),
        consistency: compute_consistency(&completions, window_days, today),
        heatmap: compute_heatmap(&completions, window_days, today),
        total_completions,
        total_minutes,
    })
}

pub fn streak_overview(conn: &Connection, user_id: i64, today: Day) -> Result<StreakOverview> {
    let mut habits = Vec::new();
    for habit in HabitRepo::list_active(conn, user_id)? {
        let completions = habit_completions(conn, habit.id)?;
        habits.push(HabitStreak {
            habit_id: habit.id,
            name: habit.name,
            color: habit.color,
            streaks: compute_streaks(&completions, today),
        });
    }
    Ok(StreakOverview::new(habits))
}

/// Per-day share of active habits completed, for every day in the window.
/// Empty when the user has no active habits.
pub fn daily_consistency(
    conn: &Connection,
    user_id: i64,
    window_days: u32,
    today: Day,
) -> Result<Vec<DailyConsistency>> {
    let total = HabitRepo::count_active(conn, user_id)?;
    let Some(start) = window_start(window_days, today) else {
        return Ok(Vec::new());
    };
    if total == 0 {
        return Ok(Vec::new());
    }

    let mut per_day: HashMap<Day, u32> = HashMap::new();
    for (date, n) in LogRepo::satisfied_per_day(conn, user_id, &start.to_string(), &today.to_string())? {
        let day = Day::parse(&date).with_context(|| format!("Bad log date in database: {}", date))?;
        per_day.insert(day, n);
    }

    let mut out = Vec::with_capacity(window_days.min(MAX_WINDOW_DAYS) as usize);
    let mut day = start;
    while day <= today {
        let completed = per_day.get(&day).copied().unwrap_or(0);
        out.push(DailyConsistency {
            date: day,
            pct: percent(completed as u64, total as u64),
            completed,
            total,
        });
        day = day.succ();
    }
    Ok(out)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Daily,
    Weekly,
    Monthly,
    All,
}

impl Period {
    /// First day of the period containing `today`. Weeks start on Monday.
    pub fn start(&self, today: NaiveDate) -> Option<NaiveDate> {
        match self {
            Period::Daily => Some(today),
            Period::Weekly => {
                Some(today - Duration::days(today.weekday().num_days_from_monday() as i64))
            }
            Period::Monthly => today.with_day(1),
            Period::All => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Daily => "daily",
            Period::Weekly => "weekly",
            Period::Monthly => "monthly",
            Period::All => "all",
        }
    }
}

impl FromStr for Period {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "daily" | "day" | "today" => Ok(Period::Daily),
            "weekly" | "week" => Ok(Period::Weekly),
            "monthly" | "month" => Ok(Period::Monthly),
            "all" => Ok(Period::All),
            _ => Err(anyhow!("Unknown period: {} (use daily, weekly, monthly, all)", s)),
        }
    }
}

fn sorted_desc(totals: BTreeMap<String, i64>) -> Vec<NamedMinutes> {
    let mut out: Vec<NamedMinutes> = totals
        .into_iter()
        .map(|(name, minutes)| NamedMinutes { name, minutes })
        .collect();
    out.sort_by(|a, b| b.minutes.cmp(&a.minutes).then_with(|| a.name.cmp(&b.name)));
    out
}

/// Group minute rows by date, habit and category.
pub fn summarize_minutes(rows: &[MinutesRow]) -> TimeBreakdown {
    let mut by_date: Vec<DayMinutes> = Vec::new();
    let mut by_category: BTreeMap<String, i64> = BTreeMap::new();
    let mut by_habit: BTreeMap<String, i64> = BTreeMap::new();

    for row in rows {
        if by_date.last().map(|d| d.date != row.date).unwrap_or(true) {
            by_date.push(DayMinutes {
                date: row.date.clone(),
                habits: Vec::new(),
            });
        }
        if let Some(day) = by_date.last_mut() {
            match day.habits.iter_mut().find(|h| h.name == row.habit) {
                Some(h) => h.minutes += row.minutes,
                None => day.habits.push(NamedMinutes {
                    name: row.habit.clone(),
                    minutes: row.minutes,
                }),
            }
        }
        *by_category.entry(row.category.clone()).or_default() += row.minutes;
        *by_habit.entry(row.habit.clone()).or_default() += row.minutes;
    }

    TimeBreakdown {
        by_date,
        by_category: sorted_desc(by_category),
        by_habit: sorted_desc(by_habit),
        total_minutes: rows.iter().map(|r| r.minutes).sum(),
    }
}

pub fn time_breakdown(
    conn: &Connection,
    user_id: i64,
    period: Period,
    today: Day,
) -> Result<TimeBreakdown> {
    let today_date = today.to_date()?;
    let start = period
        .start(today_date)
        .map(|d| d.format(crate::streaks::DATE_FORMAT).to_string())
        .unwrap_or_else(|| "0000-01-01".to_string());
    let rows = LogRepo::minutes_in_range(conn, user_id, &start, &today.to_string(), true)?;
    Ok(summarize_minutes(&rows))
}

/// Time logged today against active habits, scheduled or not.
pub fn today_minutes(conn: &Connection, user_id: i64, today: Day) -> Result<TimeBreakdown> {
    let day = today.to_string();
    let rows = LogRepo::minutes_in_range(conn, user_id, &day, &day, false)?;
    Ok(summarize_minutes(&rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations::run_migrations;
    use crate::db::repository::UserRepo;
    use crate::models::{HabitDraft, HabitType, LogEntry, StreakResult};

    fn setup() -> (Connection, i64) {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        let me = UserRepo::get_or_create(&conn, "me").unwrap();
        (conn, me.id)
    }

    fn add(conn: &Connection, user: i64, name: &str, category: &str, t: HabitType) -> Habit {
        let draft = HabitDraft {
            name: Some(name.into()),
            category: Some(category.into()),
            habit_type: Some(t),
            ..Default::default()
        };
        HabitRepo::create(conn, user, &draft, "#6366f1").unwrap();
        HabitRepo::find(conn, user, name).unwrap().unwrap()
    }

    fn done(conn: &Connection, h: &Habit, date: &str) {
        let e = LogEntry { completed: true, ..Default::default() };
        LogRepo::upsert(conn, h.id, h.user_id, date, &e).unwrap();
    }

    fn minutes(conn: &Connection, h: &Habit, date: &str, m: i64) {
        let e = LogEntry { duration: Some(m), ..Default::default() };
        LogRepo::upsert(conn, h.id, h.user_id, date, &e).unwrap();
    }

    fn day(s: &str) -> Day {
        Day::parse(s).unwrap()
    }

    #[test]
    fn habit_stats_combine_streaks_heatmap_and_minutes() {
        let (conn, me) = setup();
        let h = add(&conn, me, "Guitar", "Music", HabitType::Timer);
        minutes(&conn, &h, "2024-01-01", 30);
        minutes(&conn, &h, "2024-01-09", 20);
        minutes(&conn, &h, "2024-01-10", 25);

        let stats = habit_stats(&conn, &h, 7, day("2024-01-10")).unwrap();
        assert_eq!(stats.streaks, StreakResult { current: 2, longest: 2 });
        assert_eq!(stats.heatmap.len(), 7);
        assert_eq!(stats.total_completions, 2);
        assert_eq!(stats.total_minutes, 45);
        assert_eq!(stats.consistency, 29);
    }

    #[test]
    fn overview_reduces_best_streaks() {
        let (conn, me) = setup();
        let a = add(&conn, me, "A", "X", HabitType::Checkbox);
        let b = add(&conn, me, "B", "X", HabitType::Checkbox);
        for d in ["2024-01-01", "2024-01-02", "2024-01-03", "2024-01-04"] {
            done(&conn, &a, d);
        }
        done(&conn, &b, "2024-01-09");
        done(&conn, &b, "2024-01-10");

        let o = streak_overview(&conn, me, day("2024-01-10")).unwrap();
        assert_eq!(o.habits.len(), 2);
        assert_eq!(o.best_current, 2);
        assert_eq!(o.best_longest, 4);
    }

    #[test]
    fn daily_consistency_uses_active_habit_count() {
        let (conn, me) = setup();
        let a = add(&conn, me, "A", "X", HabitType::Checkbox);
        let b = add(&conn, me, "B", "X", HabitType::Checkbox);
        let _c = add(&conn, me, "C", "X", HabitType::Checkbox);
        done(&conn, &a, "2024-02-02");
        done(&conn, &b, "2024-02-02");
        done(&conn, &a, "2024-02-03");

        let days = daily_consistency(&conn, me, 3, day("2024-02-03")).unwrap();
        let pcts: Vec<u8> = days.iter().map(|d| d.pct).collect();
        assert_eq!(pcts, vec![0, 67, 33]);
        assert!(days.iter().all(|d| d.total == 3));
    }

    #[test]
    fn daily_consistency_is_empty_without_habits() {
        let (conn, me) = setup();
        assert!(daily_consistency(&conn, me, 30, day("2024-01-01")).unwrap().is_empty());
    }

    #[test]
    fn periods_start_where_expected() {
        // 2024-03-14 is a Thursday
        let today = NaiveDate::from_ymd_opt(2024, 3, 14).unwrap();
        assert_eq!(Period::Weekly.start(today), NaiveDate::from_ymd_opt(2024, 3, 11));
        assert_eq!(Period::Monthly.start(today), NaiveDate::from_ymd_opt(2024, 3, 1));
        assert_eq!(Period::Daily.start(today), Some(today));
        assert_eq!(Period::All.start(today), None);
        assert_eq!("WEEK".parse::<Period>().unwrap(), Period::Weekly);
    }

    #[test]
    fn time_breakdown_groups_and_sorts() {
        let (conn, me) = setup();
        let guitar = add(&conn, me, "Guitar", "Music", HabitType::Timer);
        let piano = add(&conn, me, "Piano", "Music", HabitType::Timer);
        let run = add(&conn, me, "Run", "Health", HabitType::Timer);
        minutes(&conn, &guitar, "2024-03-11", 30);
        minutes(&conn, &run, "2024-03-11", 45);
        minutes(&conn, &piano, "2024-03-12", 20);
        minutes(&conn, &run, "2024-03-01", 60);

        let week = time_breakdown(&conn, me, Period::Weekly, day("2024-03-14")).unwrap();
        assert_eq!(week.total_minutes, 95);
        assert_eq!(week.by_date.len(), 2);
        assert_eq!(week.by_date[0].habits[0].name, "Run");
        assert_eq!(week.by_category[0].name, "Music");
        assert_eq!(week.by_category[0].minutes, 50);
        assert_eq!(week.by_habit[0].name, "Run");

        let all = time_breakdown(&conn, me, Period::All, day("2024-03-14")).unwrap();
        assert_eq!(all.total_minutes, 155);
    }
}
