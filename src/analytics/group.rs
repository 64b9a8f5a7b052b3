use anyhow::{Context, Result};
use rusqlite::Connection;
use std::collections::HashMap;

use crate::db::repository::{GroupLogRepo, GroupLogRow, GroupRepo};
use crate::models::{
    GroupHabit, GroupStats, GroupToday, HabitCheckins, HabitType, LogEntry, MemberCheckin,
    MemberStats, WeeklyRow,
};
use crate::streaks::{
    CompletionSet, Day, compute_consistency, compute_heatmap, compute_streaks, window_start,
};

const WEEK: u32 = 7;

/// What a log row contributes to the weekly comparison: reps for count
/// habits, minutes for timers, one per completed checkbox.
fn weekly_value(habit_type: Option<HabitType>, row: &GroupLogRow) -> i64 {
    match habit_type {
        Some(HabitType::Count) => row.entry.count.unwrap_or(0),
        Some(HabitType::Timer) => row.entry.duration.unwrap_or(0),
        _ => row.entry.completed as i64,
    }
}

pub fn group_stats(
    conn: &Connection,
    group_id: i64,
    window_days: u32,
    today: Day,
) -> Result<GroupStats> {
    let members = GroupRepo::members(conn, group_id)?;
    let habits: HashMap<i64, HabitType> = GroupRepo::habits(conn, group_id)?
        .into_iter()
        .map(|h: GroupHabit| (h.id, h.habit_type))
        .collect();

    let week_start = window_start(WEEK, today).unwrap_or(today);
    let days: Vec<Day> = (0..WEEK as i32).map(|i| week_start.minus_days(-i)).collect();
    let recent = GroupLogRepo::since(conn, group_id, &week_start.to_string())?;

    let mut weekly = Vec::with_capacity(members.len());
    let mut leaderboard = Vec::with_capacity(members.len());

    for member in &members {
        let dates = GroupLogRepo::completion_dates(conn, group_id, member.user_id)?;
        let completions = CompletionSet::parse_all(&dates).with_context(|| {
            format!("Reading completion dates of {} in group {}", member.user_name, group_id)
        })?;

        let completed_days = window_start(window_days, today)
            .map(|start| completions.between(start, today).count())
            .unwrap_or(0);

        leaderboard.push(MemberStats {
            user_id: member.user_id,
            name: member.user_name.clone(),
            streaks: compute_streaks(&completions, today),
            consistency: compute_consistency(&completions, window_days, today),
            completed_days,
            heatmap: compute_heatmap(&completions, window_days, today),
        });

        let mut values = vec![0i64; days.len()];
        for row in recent.iter().filter(|r| r.user_id == member.user_id) {
            let Ok(day) = Day::parse(&row.date) else {
                log::warn!("skipping group log with bad date '{}'", row.date);
                continue;
            };
            if let Some(slot) = days.iter().position(|d| *d == day) {
                values[slot] += weekly_value(habits.get(&row.habit_id).copied(), row);
            }
        }
        weekly.push(WeeklyRow {
            name: member.user_name.clone(),
            values,
        });
    }

    leaderboard.sort_by(|a, b| {
        b.streaks
            .current
            .cmp(&a.streaks.current)
            .then_with(|| b.consistency.cmp(&a.consistency))
            .then_with(|| a.name.cmp(&b.name))
    });

    Ok(GroupStats {
        group_id,
        window_days,
        days,
        weekly,
        leaderboard,
    })
}

/// Every member's check-in on each group habit for `day`, members in join order.
pub fn group_today(conn: &Connection, group_id: i64, day: Day) -> Result<GroupToday> {
    let members = GroupRepo::members(conn, group_id)?;
    let mut logs: HashMap<(i64, i64), LogEntry> =
        GroupLogRepo::on_date(conn, group_id, &day.to_string())?
            .into_iter()
            .map(|row| ((row.habit_id, row.user_id), row.entry))
            .collect();

    let mut habits = Vec::new();
    for habit in GroupRepo::habits(conn, group_id)? {
        let checkins: Vec<MemberCheckin> = members
            .iter()
            .map(|m| {
                let entry = logs.remove(&(habit.id, m.user_id));
                MemberCheckin {
                    user_id: m.user_id,
                    name: m.user_name.clone(),
                    satisfied: entry.as_ref().map(|e| e.is_satisfied()).unwrap_or(false),
                    entry,
                }
            })
            .collect();
        habits.push(HabitCheckins {
            done: checkins.iter().filter(|c| c.satisfied).count(),
            habit,
            members: checkins,
        });
    }

    Ok(GroupToday {
        group_id,
        date: day,
        habits,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations::run_migrations;
    use crate::db::repository::{NewGroupHabit, UserRepo};
    use crate::models::{GroupDraft, LogEntry, Role, StreakResult};

    struct Fixture {
        conn: Connection,
        group: i64,
        run: i64,
        pushups: i64,
        alice: i64,
        bob: i64,
    }

    fn fixture() -> Fixture {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        let alice = UserRepo::get_or_create(&conn, "alice").unwrap().id;
        let bob = UserRepo::get_or_create(&conn, "bob").unwrap().id;
        let draft = GroupDraft {
            name: Some("Crew".into()),
            ..Default::default()
        };
        let first = NewGroupHabit {
            name: "Run".into(),
            habit_type: HabitType::Timer,
            color: None,
            target_count: None,
        };
        let group = GroupRepo::create(&conn, alice, &draft, "CREW0001", &first, "#6366f1").unwrap();
        GroupRepo::add_member(&conn, group, bob, Role::Member).unwrap();
        let more = NewGroupHabit {
            name: "Pushups".into(),
            habit_type: HabitType::Count,
            color: None,
            target_count: Some(20),
        };
        let pushups = GroupRepo::add_habit(&conn, group, &more, "#6366f1").unwrap();
        let run = GroupRepo::habits(&conn, group).unwrap()[0].id;
        Fixture { conn, group, run, pushups, alice, bob }
    }

    fn log(f: &Fixture, habit: i64, user: i64, date: &str, entry: LogEntry) {
        GroupLogRepo::upsert(&f.conn, habit, user, date, &entry).unwrap();
    }

    #[test]
    fn members_ranked_by_current_streak() {
        let f = fixture();
        let ran = |m| LogEntry { duration: Some(m), ..Default::default() };
        for d in ["2024-04-08", "2024-04-09", "2024-04-10"] {
            log(&f, f.run, f.bob, d, ran(20));
        }
        log(&f, f.run, f.alice, "2024-04-10", ran(30));

        let stats = group_stats(&f.conn, f.group, 30, Day::parse("2024-04-10").unwrap()).unwrap();
        let names: Vec<&str> = stats.leaderboard.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["bob", "alice"]);
        assert_eq!(stats.leaderboard[0].streaks, StreakResult { current: 3, longest: 3 });
        assert_eq!(stats.leaderboard[0].completed_days, 3);
        assert_eq!(stats.leaderboard[0].consistency, 10);
        assert_eq!(stats.leaderboard[0].heatmap.len(), 30);
    }

    #[test]
    fn one_satisfied_habit_counts_the_day_once() {
        let f = fixture();
        let day = "2024-04-10";
        log(&f, f.run, f.alice, day, LogEntry { duration: Some(10), ..Default::default() });
        log(&f, f.pushups, f.alice, day, LogEntry { completed: true, count: Some(25), ..Default::default() });

        let stats = group_stats(&f.conn, f.group, 10, Day::parse(day).unwrap()).unwrap();
        let alice = stats.leaderboard.iter().find(|m| m.user_id == f.alice).unwrap();
        assert_eq!(alice.completed_days, 1);
        assert_eq!(alice.consistency, 10);
    }

    #[test]
    fn weekly_values_depend_on_habit_type() {
        let f = fixture();
        log(&f, f.run, f.alice, "2024-04-09", LogEntry { duration: Some(25), ..Default::default() });
        log(&f, f.pushups, f.alice, "2024-04-09", LogEntry { count: Some(15), ..Default::default() });
        log(&f, f.pushups, f.bob, "2024-04-01", LogEntry { count: Some(50), ..Default::default() });

        let stats = group_stats(&f.conn, f.group, 30, Day::parse("2024-04-10").unwrap()).unwrap();
        assert_eq!(stats.days.len(), 7);
        assert_eq!(stats.days[6].to_string(), "2024-04-10");

        let alice = stats.weekly.iter().find(|w| w.name == "alice").unwrap();
        assert_eq!(alice.values, vec![0, 0, 0, 0, 0, 40, 0]);
        // Bob's log is older than the week.
        let bob = stats.weekly.iter().find(|w| w.name == "bob").unwrap();
        assert!(bob.values.iter().all(|v| *v == 0));
    }

    #[test]
    fn today_board_lists_every_member_per_habit() {
        let f = fixture();
        let day = "2024-04-10";
        log(&f, f.run, f.bob, day, LogEntry { duration: Some(30), ..Default::default() });
        log(&f, f.pushups, f.alice, day, LogEntry { count: Some(12), ..Default::default() });
        log(&f, f.run, f.alice, "2024-04-09", LogEntry { duration: Some(15), ..Default::default() });

        let board = group_today(&f.conn, f.group, Day::parse(day).unwrap()).unwrap();
        assert_eq!(board.habits.len(), 2);

        let run = &board.habits[0];
        assert_eq!(run.habit.id, f.run);
        assert_eq!(run.done, 1);
        let names: Vec<&str> = run.members.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["alice", "bob"]);
        // Yesterday's run does not show up today.
        assert!(run.members[0].entry.is_none());
        assert!(run.members[1].satisfied);

        let pushups = &board.habits[1];
        assert_eq!(pushups.done, 0);
        let alice = &pushups.members[0];
        assert_eq!(alice.entry.as_ref().and_then(|e| e.count), Some(12));
        assert!(!alice.satisfied);
    }
}
