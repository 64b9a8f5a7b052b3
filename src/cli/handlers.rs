use anyhow::{Result, anyhow};
use chrono::{DateTime, Local, NaiveDate, Utc};
use rusqlite::Connection;
use serde::Serialize;
use std::str::FromStr;

use crate::analytics::{self, Period};
use crate::cli::args::{
    AnalyticsCommands, ConfigCommands, HabitCommands, HabitFields, TimerCommands,
};
use crate::config::AppConfig;
use crate::db::repository::{GroupLogRepo, GroupRepo, HabitRepo, LogRepo, MetaRepo};
use crate::models::habit::{format_schedule, parse_schedule};
use crate::models::timer::minutes_to_log;
use crate::models::{Habit, HabitDraft, HabitType, LogEntry, LogUpdate, RunningTimer, User};
use crate::streaks::Day;
use crate::utils::format::{format_elapsed, format_minutes, heatmap_rows, pad, progress_bar};

// ─── ANSI helpers ────────────────────────────────────────────────────────────

macro_rules! println_colored {
    ($color:expr, $($arg:tt)*) => {{
        print!("{}", $color);
        print!($($arg)*);
        println!("\x1b[0m");
    }};
}
pub(crate) use println_colored;

pub(crate) const GREEN: &str = "\x1b[32m";
pub(crate) const AMBER: &str = "\x1b[33m";
pub(crate) const RED: &str = "\x1b[31m";
pub(crate) const DIM: &str = "\x1b[2m";
pub(crate) const BOLD: &str = "\x1b[1m";
pub(crate) const ACCENT: &str = "\x1b[38;2;99;102;241m";

pub(crate) fn today() -> NaiveDate {
    Local::now().date_naive()
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// The day a log applies to: today, or a past `--date`.
fn log_day(date: Option<&str>) -> Result<Day> {
    let today = Day::from_date(today());
    let Some(s) = date else {
        return Ok(today);
    };
    let day = Day::parse(s)?;
    if day > today {
        return Err(anyhow!("Cannot log a future date ({})", day));
    }
    Ok(day)
}

fn find_habit(conn: &Connection, user: &User, key: &str) -> Result<Habit> {
    HabitRepo::find(conn, user.id, key)?
        .ok_or_else(|| anyhow!("Habit '{}' not found. See `habitual habit list`", key))
}

fn draft_from(name: Option<String>, fields: HabitFields) -> Result<HabitDraft> {
    Ok(HabitDraft {
        name,
        category: fields.category,
        habit_type: fields
            .habit_type
            .as_deref()
            .map(HabitType::from_str)
            .transpose()?,
        color: fields.color,
        icon: fields.icon,
        target_count: fields.target,
        schedule_days: fields.days.as_deref().map(parse_schedule).transpose()?,
    })
}

pub(crate) fn progress_label(habit_type: HabitType, target: Option<i64>, entry: Option<&LogEntry>) -> String {
    let entry = entry.cloned().unwrap_or_default();
    match habit_type {
        HabitType::Checkbox => {
            if entry.completed { "✓".to_string() } else { "○".to_string() }
        }
        HabitType::Timer => match entry.duration {
            Some(m) if m > 0 => format_minutes(m),
            _ => "—".to_string(),
        },
        HabitType::Count => {
            let n = entry.count.unwrap_or(0);
            match target {
                Some(t) => format!("{}/{}", n, t),
                None => n.to_string(),
            }
        }
    }
}

// ─── Habits ──────────────────────────────────────────────────────────────────

pub fn handle_habit(
    conn: &Connection,
    config: &AppConfig,
    user: &User,
    action: HabitCommands,
) -> Result<()> {
    match action {
        HabitCommands::Add { name, fields } => {
            let draft = draft_from(Some(name.clone()), fields)?;
            if draft.habit_type == Some(HabitType::Count) && draft.target_count.is_none() {
                println_colored!(DIM, "  (no --target: this count habit never auto-completes)");
            }
            let id = HabitRepo::create(conn, user.id, &draft, &config.habits.default_color)?;
            println_colored!(GREEN, "  ✓ Added habit #{}: {}", id, name.trim());
        }
        HabitCommands::List => {
            let habits = HabitRepo::list_active(conn, user.id)?;
            println!();
            if habits.is_empty() {
                println_colored!(DIM, "  No habits yet. Add one with `habitual habit add`.");
            }
            for h in &habits {
                let schedule = if h.schedule_days.is_empty() {
                    "daily".to_string()
                } else {
                    format_schedule(&h.schedule_days)
                };
                let target = h
                    .target_count
                    .map(|t| format!(" target {}", t))
                    .unwrap_or_default();
                println!(
                    "  {:>3}  {}  {:<9} {:<12} {}{}",
                    h.id,
                    pad(&h.label(), 24),
                    h.habit_type.as_str(),
                    h.category,
                    schedule,
                    target
                );
            }
            println!();
        }
        HabitCommands::Edit { habit, name, fields } => {
            let h = find_habit(conn, user, &habit)?;
            let draft = draft_from(name, fields)?;
            HabitRepo::update(conn, h.id, &draft)?;
            println_colored!(GREEN, "  ✓ Updated {}", h.name);
        }
        HabitCommands::Archive { habit } => {
            let h = find_habit(conn, user, &habit)?;
            HabitRepo::archive(conn, h.id)?;
            println_colored!(AMBER, "  Archived {} (history kept)", h.name);
        }
    }
    Ok(())
}

// ─── Logging ─────────────────────────────────────────────────────────────────

fn apply_log(
    conn: &Connection,
    user: &User,
    habit_key: &str,
    date: Option<&str>,
    make_update: impl FnOnce(Option<&LogEntry>) -> LogUpdate,
) -> Result<()> {
    let habit = find_habit(conn, user, habit_key)?;
    let day = log_day(date)?.to_string();
    let existing = LogRepo::get(conn, habit.id, &day)?;
    let update = make_update(existing.as_ref());
    let entry = update.apply(existing.as_ref(), habit.habit_type, habit.target_count)?;
    LogRepo::upsert(conn, habit.id, user.id, &day, &entry)?;

    let label = progress_label(habit.habit_type, habit.target_count, Some(&entry));
    if entry.is_satisfied() {
        println_colored!(GREEN, "  ✓ {} — {} ({})", habit.label(), label, day);
    } else {
        println_colored!(AMBER, "  ◑ {} — {} ({})", habit.label(), label, day);
    }
    Ok(())
}

pub fn handle_done(
    conn: &Connection,
    user: &User,
    habit: &str,
    undo: bool,
    date: Option<&str>,
) -> Result<()> {
    apply_log(conn, user, habit, date, |existing| {
        let was_done = existing.map(|e| e.completed).unwrap_or(false);
        LogUpdate {
            completed: Some(!undo && !was_done),
            ..Default::default()
        }
    })
}

pub fn handle_time(
    conn: &Connection,
    user: &User,
    habit: &str,
    minutes: i64,
    date: Option<&str>,
) -> Result<()> {
    apply_log(conn, user, habit, date, |_| LogUpdate {
        duration: Some(minutes),
        ..Default::default()
    })
}

pub fn handle_count(
    conn: &Connection,
    user: &User,
    habit: &str,
    delta: i64,
    date: Option<&str>,
) -> Result<()> {
    apply_log(conn, user, habit, date, |_| LogUpdate {
        count: Some(delta),
        ..Default::default()
    })
}

// ─── Timer ───────────────────────────────────────────────────────────────────

fn timer_key(user: &User) -> String {
    format!("timer:{}", user.id)
}

fn load_timer(conn: &Connection, user: &User) -> Result<Option<RunningTimer>> {
    match MetaRepo::get(conn, &timer_key(user))? {
        Some(json) => Ok(Some(serde_json::from_str(&json)?)),
        None => Ok(None),
    }
}

fn save_timer(conn: &Connection, user: &User, timer: &RunningTimer) -> Result<()> {
    MetaRepo::set(conn, &timer_key(user), &serde_json::to_string(timer)?)
}

fn require_timer(conn: &Connection, user: &User) -> Result<RunningTimer> {
    load_timer(conn, user)?.ok_or_else(|| anyhow!("No timer is running. Start one with `habitual timer start <habit>`"))
}

/// Stop the user's timer and add its minutes to `day`, marking the habit done.
/// Returns `None` when the run was too short to log.
fn finish_timer(
    conn: &Connection,
    user: &User,
    now: DateTime<Utc>,
    day: Day,
) -> Result<Option<(Habit, LogEntry)>> {
    let timer = require_timer(conn, user)?;
    MetaRepo::delete(conn, &timer_key(user))?;
    let Some(minutes) = minutes_to_log(timer.elapsed_secs(now)) else {
        return Ok(None);
    };

    let habit = find_habit(conn, user, &timer.habit_id.to_string())?;
    let day = day.to_string();
    let existing = LogRepo::get(conn, habit.id, &day)?;
    let update = LogUpdate {
        completed: Some(true),
        duration: Some(minutes),
        ..Default::default()
    };
    let entry = update.apply(existing.as_ref(), habit.habit_type, habit.target_count)?;
    LogRepo::upsert(conn, habit.id, user.id, &day, &entry)?;
    Ok(Some((habit, entry)))
}

pub fn handle_timer(conn: &Connection, user: &User, action: TimerCommands) -> Result<()> {
    let now = Utc::now();
    match action {
        TimerCommands::Start { habit } => {
            if let Some(running) = load_timer(conn, user)? {
                return Err(anyhow!(
                    "A timer is already running on habit #{}. Stop or cancel it first",
                    running.habit_id
                ));
            }
            let habit = find_habit(conn, user, &habit)?;
            save_timer(conn, user, &RunningTimer::start(habit.id, now))?;
            log::info!("timer started on habit #{}", habit.id);
            println_colored!(GREEN, "  ▶ Timing {}", habit.label());
        }
        TimerCommands::Pause => {
            let mut timer = require_timer(conn, user)?;
            timer.pause(now)?;
            save_timer(conn, user, &timer)?;
            println_colored!(AMBER, "  ❚❚ Paused at {}", format_elapsed(timer.elapsed_secs(now)));
        }
        TimerCommands::Resume => {
            let mut timer = require_timer(conn, user)?;
            timer.resume(now)?;
            save_timer(conn, user, &timer)?;
            println_colored!(GREEN, "  ▶ Resumed at {}", format_elapsed(timer.elapsed_secs(now)));
        }
        TimerCommands::Status => match load_timer(conn, user)? {
            Some(timer) => {
                let name = HabitRepo::find(conn, user.id, &timer.habit_id.to_string())?
                    .map(|h| h.label())
                    .unwrap_or_else(|| format!("habit #{}", timer.habit_id));
                let state = if timer.is_paused() { "paused" } else { "running" };
                println!("  {}  {}  ({})", name, format_elapsed(timer.elapsed_secs(now)), state);
            }
            None => println_colored!(DIM, "  No timer running."),
        },
        TimerCommands::Stop => match finish_timer(conn, user, now, Day::from_date(today()))? {
            Some((habit, entry)) => {
                let label = progress_label(habit.habit_type, habit.target_count, Some(&entry));
                println_colored!(GREEN, "  ✓ {} — {}", habit.label(), label);
            }
            None => println_colored!(DIM, "  Timer stopped; too short to log."),
        },
        TimerCommands::Cancel => {
            if MetaRepo::delete(conn, &timer_key(user))? {
                println_colored!(AMBER, "  Timer discarded.");
            } else {
                println_colored!(DIM, "  No timer running.");
            }
        }
    }
    Ok(())
}

// ─── Today ───────────────────────────────────────────────────────────────────

pub fn handle_today(conn: &Connection, user: &User) -> Result<()> {
    let date = today();
    let today_str = Day::from_date(date).to_string();

    let scheduled: Vec<Habit> = HabitRepo::list_active(conn, user.id)?
        .into_iter()
        .filter(|h| h.is_scheduled_on(date))
        .collect();

    println!();
    println_colored!(ACCENT, "  Today — {} ({})", date.format("%A"), today_str);
    println!();

    let mut done = 0u32;
    for h in &scheduled {
        let log = LogRepo::get(conn, h.id, &today_str)?;
        let satisfied = log.as_ref().map(|l| l.is_satisfied()).unwrap_or(false);
        if satisfied {
            done += 1;
        }
        let label = progress_label(h.habit_type, h.target_count, log.as_ref());
        let color = if satisfied { GREEN } else { BOLD };
        println_colored!(color, "  {}  {}", pad(&h.label(), 28), label);
    }
    if scheduled.is_empty() {
        println_colored!(DIM, "  Nothing scheduled today.");
    } else {
        println!();
        println!(
            "  {}  {}/{}",
            progress_bar(done, scheduled.len() as u32, 20),
            done,
            scheduled.len()
        );
    }

    let groups = GroupRepo::list_for_user(conn, user.id)?;
    if !groups.is_empty() {
        println!();
        println_colored!(ACCENT, "  Groups");
        for (group, _) in &groups {
            for gh in GroupRepo::habits(conn, group.id)? {
                let log = GroupLogRepo::get(conn, gh.id, user.id, &today_str)?;
                let label = progress_label(gh.habit_type, gh.target_count, log.as_ref());
                let title = format!("{} {} · {}", group.emoji, group.name, gh.name);
                println!("  {}  {}", pad(&title, 28), label);
            }
        }
    }

    let minutes = analytics::today_minutes(conn, user.id, Day::from_date(date))?;
    if minutes.total_minutes > 0 {
        println!();
        println_colored!(ACCENT, "  Time today: {}", format_minutes(minutes.total_minutes));
        for h in &minutes.by_habit {
            println_colored!(DIM, "    {}  {}", pad(&h.name, 26), format_minutes(h.minutes));
        }
    }
    println!();
    Ok(())
}

// ─── Stats ───────────────────────────────────────────────────────────────────

pub fn handle_stats(
    conn: &Connection,
    config: &AppConfig,
    user: &User,
    habit: &str,
    days: Option<u32>,
    json: bool,
) -> Result<()> {
    let h = find_habit(conn, user, habit)?;
    let window = days.unwrap_or(config.analytics.heatmap_days);
    let stats = analytics::habit_stats(conn, &h, window, Day::from_date(today()))?;
    if json {
        return print_json(&stats);
    }

    println!();
    println_colored!(ACCENT, "  {}", h.label());
    println!();
    println_colored!(
        BOLD,
        "  Streak:       {} days current  |  {} days longest",
        stats.streaks.current,
        stats.streaks.longest
    );
    println!(
        "  Consistency:  {}% of the last {} days  {}",
        stats.consistency,
        window,
        progress_bar(stats.consistency as u32, 100, 20)
    );
    println!("  Completions:  {}", stats.total_completions);
    if stats.total_minutes > 0 {
        println!("  Time:         {}", format_minutes(stats.total_minutes));
    }
    println!();
    for row in heatmap_rows(&stats.heatmap, 30) {
        println_colored!(GREEN, "  {}", row);
    }
    println!();
    Ok(())
}

// ─── Analytics ───────────────────────────────────────────────────────────────

pub fn handle_analytics(
    conn: &Connection,
    config: &AppConfig,
    user: &User,
    action: AnalyticsCommands,
) -> Result<()> {
    let today = Day::from_date(today());
    match action {
        AnalyticsCommands::Streaks { json } => {
            let overview = analytics::streak_overview(conn, user.id, today)?;
            if json {
                return print_json(&overview);
            }
            println!();
            println_colored!(
                ACCENT,
                "  Best current streak: {} days  |  best ever: {} days",
                overview.best_current,
                overview.best_longest
            );
            println!();
            for h in &overview.habits {
                println!(
                    "  {}  {:>4} current  {:>4} longest",
                    pad(&h.name, 24),
                    h.streaks.current,
                    h.streaks.longest
                );
            }
            println!();
        }
        AnalyticsCommands::Consistency { days, json } => {
            let window = days.unwrap_or(config.analytics.consistency_days);
            let per_day = analytics::daily_consistency(conn, user.id, window, today)?;
            if json {
                return print_json(&per_day);
            }
            println!();
            if per_day.is_empty() {
                println_colored!(DIM, "  No active habits.");
            }
            for d in &per_day {
                let color = match d.pct {
                    100 => GREEN,
                    0 => DIM,
                    _ => AMBER,
                };
                println_colored!(
                    color,
                    "  {}  {}  {:>3}%  {}/{}",
                    d.date,
                    progress_bar(d.completed, d.total, 10),
                    d.pct,
                    d.completed,
                    d.total
                );
            }
            println!();
        }
        AnalyticsCommands::Time { period, json } => {
            let period = Period::from_str(&period)?;
            let breakdown = analytics::time_breakdown(conn, user.id, period, today)?;
            if json {
                return print_json(&breakdown);
            }
            println!();
            println_colored!(
                ACCENT,
                "  Time ({}): {}",
                period.as_str(),
                format_minutes(breakdown.total_minutes)
            );
            println!();
            for day in &breakdown.by_date {
                let parts: Vec<String> = day
                    .habits
                    .iter()
                    .map(|h| format!("{} {}", h.name, format_minutes(h.minutes)))
                    .collect();
                println!("  {}  {}", day.date, parts.join(", "));
            }
            if !breakdown.by_category.is_empty() {
                println!();
                println_colored!(BOLD, "  By category");
                for c in &breakdown.by_category {
                    println!("    {}  {}", pad(&c.name, 20), format_minutes(c.minutes));
                }
                println_colored!(BOLD, "  By habit");
                for h in &breakdown.by_habit {
                    println!("    {}  {}", pad(&h.name, 20), format_minutes(h.minutes));
                }
            }
            println!();
        }
    }
    Ok(())
}

// ─── Config ──────────────────────────────────────────────────────────────────

pub fn handle_config(config: &mut AppConfig, action: ConfigCommands) -> Result<()> {
    match action {
        ConfigCommands::Show => {
            print!("{}", toml::to_string_pretty(config)?);
        }
        ConfigCommands::Path => {
            println!("config:   {}", AppConfig::config_path()?.display());
            println!("database: {}", AppConfig::db_path()?.display());
        }
        ConfigCommands::User { name } => {
            let name = name.trim();
            if name.is_empty() {
                return Err(anyhow!("Profile name cannot be empty"));
            }
            config.profile.user = name.to_string();
            config.save()?;
            println_colored!(GREEN, "  ✓ Default profile is now {}", name);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_day_rejects_future_and_garbage() {
        assert!(log_day(Some("not-a-day")).is_err());
        let tomorrow = Day::from_date(today()).succ().to_string();
        assert!(log_day(Some(&tomorrow)).is_err());
        assert_eq!(log_day(None).unwrap(), Day::from_date(today()));
        assert_eq!(log_day(Some("2020-02-29")).unwrap().to_string(), "2020-02-29");
    }

    #[test]
    fn progress_labels_by_type() {
        let e = LogEntry { count: Some(7), ..Default::default() };
        assert_eq!(progress_label(HabitType::Count, Some(10), Some(&e)), "7/10");
        assert_eq!(progress_label(HabitType::Count, None, None), "0");
        let t = LogEntry { duration: Some(75), ..Default::default() };
        assert_eq!(progress_label(HabitType::Timer, None, Some(&t)), "1hr 15min");
        assert_eq!(progress_label(HabitType::Checkbox, None, None), "○");
    }

    #[test]
    fn habit_fields_are_validated() {
        let bad = HabitFields {
            habit_type: Some("sometimes".into()),
            ..Default::default()
        };
        assert!(draft_from(None, bad).is_err());
        let ok = HabitFields {
            habit_type: Some("count".into()),
            target: Some(20),
            days: Some("mon,thu".into()),
            ..Default::default()
        };
        let draft = draft_from(Some("Pushups".into()), ok).unwrap();
        assert_eq!(draft.habit_type, Some(HabitType::Count));
        assert_eq!(draft.schedule_days.map(|d| d.len()), Some(2));
    }

    mod timer {
        use super::*;
        use crate::db::migrations::run_migrations;
        use crate::db::repository::UserRepo;
        use chrono::Duration;

        fn setup() -> (Connection, User, i64) {
            let conn = Connection::open_in_memory().unwrap();
            run_migrations(&conn).unwrap();
            let user = UserRepo::get_or_create(&conn, "sam").unwrap();
            let draft = HabitDraft {
                name: Some("Guitar".into()),
                category: Some("Music".into()),
                habit_type: Some(HabitType::Timer),
                ..Default::default()
            };
            let id = HabitRepo::create(&conn, user.id, &draft, "#6366f1").unwrap();
            (conn, user, id)
        }

        #[test]
        fn stopping_adds_minutes_and_clears_the_timer() {
            let (conn, user, habit_id) = setup();
            let day = Day::parse("2024-03-01").unwrap();
            let start = Utc::now();
            save_timer(&conn, &user, &RunningTimer::start(habit_id, start)).unwrap();

            let (_, entry) = finish_timer(&conn, &user, start + Duration::minutes(25), day)
                .unwrap()
                .unwrap();
            assert_eq!(entry.duration, Some(25));
            assert!(entry.completed);
            assert_eq!(LogRepo::get(&conn, habit_id, "2024-03-01").unwrap(), Some(entry));
            assert!(load_timer(&conn, &user).unwrap().is_none());
        }

        #[test]
        fn stopped_minutes_add_to_what_was_logged() {
            let (conn, user, habit_id) = setup();
            let logged = LogEntry { duration: Some(10), ..Default::default() };
            LogRepo::upsert(&conn, habit_id, user.id, "2024-03-01", &logged).unwrap();
            let start = Utc::now();
            save_timer(&conn, &user, &RunningTimer::start(habit_id, start)).unwrap();

            let day = Day::parse("2024-03-01").unwrap();
            let (_, entry) = finish_timer(&conn, &user, start + Duration::minutes(5), day)
                .unwrap()
                .unwrap();
            assert_eq!(entry.duration, Some(15));
        }

        #[test]
        fn very_short_runs_are_discarded() {
            let (conn, user, habit_id) = setup();
            let start = Utc::now();
            save_timer(&conn, &user, &RunningTimer::start(habit_id, start)).unwrap();

            let day = Day::parse("2024-03-01").unwrap();
            let stopped = finish_timer(&conn, &user, start + Duration::seconds(3), day).unwrap();
            assert!(stopped.is_none());
            assert!(LogRepo::get(&conn, habit_id, "2024-03-01").unwrap().is_none());
            assert!(load_timer(&conn, &user).unwrap().is_none());
        }

        #[test]
        fn stop_without_a_timer_is_an_error() {
            let (conn, user, _) = setup();
            let day = Day::parse("2024-03-01").unwrap();
            assert!(finish_timer(&conn, &user, Utc::now(), day).is_err());
        }
    }
}
