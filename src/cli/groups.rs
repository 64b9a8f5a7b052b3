use anyhow::{Result, anyhow};
use rusqlite::Connection;
use std::str::FromStr;

use crate::analytics;
use crate::cli::args::{ChatCommands, GroupCommands, GroupFields};
use crate::cli::handlers::{
    ACCENT, AMBER, BOLD, DIM, GREEN, RED, print_json, println_colored, progress_label, today,
};
use crate::config::AppConfig;
use crate::db::repository::{GroupLogRepo, GroupRepo, MessageRepo, NewGroupHabit, UserRepo};
use crate::models::group::{
    check_removal, check_role_change, generate_join_code, require_manager, require_owner,
};
use crate::models::{
    Group, GroupDraft, GroupError, GroupHabit, HabitType, LogUpdate, Role, User,
};
use crate::streaks::Day;
use crate::utils::format::{format_minutes, heatmap_rows, pad};

const JOIN_CODE_ATTEMPTS: usize = 5;

/// Resolve one of the user's groups. A group that exists but that the user
/// has not joined is reported as `NotMember`, not as missing.
fn resolve(conn: &Connection, user: &User, key: &str) -> Result<(Group, Role)> {
    if let Some(group) = GroupRepo::find_for_user(conn, user.id, key)? {
        let role = GroupRepo::require_member(conn, group.id, user.id)?;
        return Ok((group, role));
    }
    if let Ok(id) = key.trim().parse::<i64>() {
        if GroupRepo::get(conn, id)?.is_some() {
            return Err(GroupError::NotMember.into());
        }
    }
    Err(anyhow!("Group '{}' not found. See `habitual group list`", key))
}

fn find_group_habit(conn: &Connection, group_id: i64, key: Option<&str>) -> Result<GroupHabit> {
    let habits = GroupRepo::habits(conn, group_id)?;
    let found = match key {
        None => habits.into_iter().next(),
        Some(key) => {
            let key = key.trim();
            let id = key.parse::<i64>().ok();
            habits
                .into_iter()
                .find(|h| Some(h.id) == id || h.name.eq_ignore_ascii_case(key))
        }
    };
    found.ok_or_else(|| anyhow!("No such habit in this group"))
}

fn find_member(conn: &Connection, group_id: i64, name: &str) -> Result<(i64, Role)> {
    let user = UserRepo::find_by_name(conn, name)?
        .ok_or_else(|| anyhow!("No profile named '{}'", name))?;
    let role = GroupRepo::membership(conn, group_id, user.id)?
        .ok_or_else(|| anyhow!("{} is not a member of this group", user.name))?;
    Ok((user.id, role))
}

/// An empty `--end-date` clears it; anything else is stored as `YYYY-MM-DD`.
fn group_draft(name: Option<String>, fields: GroupFields) -> Result<GroupDraft> {
    let end_date = match fields.end_date.as_deref().map(str::trim) {
        Some("") => Some(String::new()),
        Some(end) => Some(Day::parse(end)?.to_string()),
        None => None,
    };
    Ok(GroupDraft {
        name,
        description: fields.description,
        emoji: fields.emoji,
        color: fields.color,
        end_date,
    })
}

fn group_log_update(
    habit_type: HabitType,
    was_done: bool,
    done: bool,
    undo: bool,
    minutes: Option<i64>,
    count: Option<i64>,
) -> LogUpdate {
    let completed = if undo {
        Some(false)
    } else if done {
        Some(true)
    } else if minutes.is_none() && count.is_none() && habit_type == HabitType::Checkbox {
        Some(!was_done)
    } else {
        None
    };
    LogUpdate {
        completed,
        duration: minutes,
        count,
        note: None,
    }
}

pub fn handle_group(
    conn: &Connection,
    config: &AppConfig,
    user: &User,
    action: GroupCommands,
) -> Result<()> {
    match action {
        GroupCommands::Create {
            name,
            habit,
            habit_type,
            target,
            fields,
        } => {
            let draft = group_draft(Some(name), fields)?;
            let first_habit = NewGroupHabit {
                name: habit,
                habit_type: HabitType::from_str(&habit_type)?,
                color: None,
                target_count: target,
            };
            let mut code = generate_join_code();
            for _ in 1..JOIN_CODE_ATTEMPTS {
                if GroupRepo::find_by_join_code(conn, &code)?.is_none() {
                    break;
                }
                log::debug!("join code {} taken, drawing another", code);
                code = generate_join_code();
            }
            let id = GroupRepo::create(
                conn,
                user.id,
                &draft,
                &code,
                &first_habit,
                &config.habits.default_color,
            )?;
            println_colored!(GREEN, "  ✓ Created group #{}", id);
            println_colored!(BOLD, "  Join code: {}", code);
        }

        GroupCommands::Join { code } => {
            let group = GroupRepo::find_by_join_code(conn, &code)?
                .ok_or_else(|| anyhow!("No group with code {}", code.trim().to_uppercase()))?;
            if GroupRepo::membership(conn, group.id, user.id)?.is_some() {
                println_colored!(DIM, "  Already a member of {}", group.name);
                return Ok(());
            }
            GroupRepo::add_member(conn, group.id, user.id, Role::Member)?;
            println_colored!(GREEN, "  ✓ Joined {} {}", group.emoji, group.name);
        }

        GroupCommands::List => {
            let groups = GroupRepo::list_for_user(conn, user.id)?;
            println!();
            if groups.is_empty() {
                println_colored!(DIM, "  No groups yet. Create one or join with a code.");
            }
            for (g, role) in &groups {
                let title = format!("{} {}", g.emoji, g.name);
                println!("  {:>3}  {}  {:<7} {}", g.id, pad(&title, 28), role.as_str(), g.join_code);
            }
            println!();
        }

        GroupCommands::Show { group } => {
            let (g, role) = resolve(conn, user, &group)?;
            println!();
            println_colored!(ACCENT, "  {} {}", g.emoji, g.name);
            if let Some(desc) = &g.description {
                println_colored!(DIM, "  {}", desc);
            }
            if let Some(end) = &g.end_date {
                println!("  Ends {}", end);
            }
            if role.can_manage() {
                println!("  Join code: {}", g.join_code);
            }
            println!();
            println_colored!(BOLD, "  Habits");
            for h in GroupRepo::habits(conn, g.id)? {
                let target = h.target_count.map(|t| format!(" target {}", t)).unwrap_or_default();
                println!("    {:>3}  {}  {}{}", h.id, pad(&h.name, 24), h.habit_type, target);
            }
            println_colored!(BOLD, "  Members");
            for m in GroupRepo::members(conn, g.id)? {
                println!("    {}  {}", pad(&m.user_name, 24), m.role);
            }
            println!();
        }

        GroupCommands::Edit { group, name, fields } => {
            let (g, role) = resolve(conn, user, &group)?;
            require_manager(role)?;
            GroupRepo::update(conn, g.id, &group_draft(name, fields)?)?;
            println_colored!(GREEN, "  ✓ Updated {}", g.name);
        }

        GroupCommands::Delete { group } => {
            let (g, role) = resolve(conn, user, &group)?;
            require_owner(role)?;
            GroupRepo::delete(conn, g.id)?;
            println_colored!(AMBER, "  Deleted {} with its logs and chat", g.name);
        }

        GroupCommands::Leave { group } => {
            let (g, role) = resolve(conn, user, &group)?;
            check_removal(user.id, role, user.id, role)?;
            GroupRepo::remove_member(conn, g.id, user.id)?;
            println_colored!(AMBER, "  Left {}", g.name);
        }

        GroupCommands::Habit {
            group,
            name,
            habit_type,
            target,
            color,
        } => {
            let (g, role) = resolve(conn, user, &group)?;
            require_manager(role)?;
            let habit = NewGroupHabit {
                name,
                habit_type: HabitType::from_str(&habit_type)?,
                color,
                target_count: target,
            };
            let id = GroupRepo::add_habit(conn, g.id, &habit, &g.color)?;
            println_colored!(GREEN, "  ✓ Added habit #{} to {}", id, g.name);
        }

        GroupCommands::Log {
            group,
            habit,
            done,
            undo,
            minutes,
            count,
        } => {
            let (g, _) = resolve(conn, user, &group)?;
            let h = find_group_habit(conn, g.id, habit.as_deref())?;
            let day = Day::from_date(today()).to_string();
            let existing = GroupLogRepo::get(conn, h.id, user.id, &day)?;
            let was_done = existing.as_ref().map(|e| e.completed).unwrap_or(false);
            let update = group_log_update(h.habit_type, was_done, done, undo, minutes, count);
            let entry = update.apply(existing.as_ref(), h.habit_type, h.target_count)?;
            GroupLogRepo::upsert(conn, h.id, user.id, &day, &entry)?;

            let mut detail = Vec::new();
            if let Some(m) = entry.duration.filter(|m| *m > 0) {
                detail.push(format_minutes(m));
            }
            if let Some(c) = entry.count {
                detail.push(match h.target_count {
                    Some(t) => format!("{}/{}", c, t),
                    None => c.to_string(),
                });
            }
            let color = if entry.is_satisfied() { GREEN } else { AMBER };
            let mark = if entry.is_satisfied() { "✓" } else { "○" };
            println_colored!(color, "  {} {} · {}  {}", mark, g.name, h.name, detail.join("  "));
        }

        GroupCommands::Role { group, member, role } => {
            let (g, my_role) = resolve(conn, user, &group)?;
            let (member_id, member_role) = find_member(conn, g.id, &member)?;
            let new_role = check_role_change(my_role, member_role, &role)?;
            GroupRepo::set_role(conn, g.id, member_id, new_role)?;
            println_colored!(GREEN, "  ✓ {} is now {}", member, new_role);
        }

        GroupCommands::Remove { group, member } => {
            let (g, my_role) = resolve(conn, user, &group)?;
            let (member_id, member_role) = find_member(conn, g.id, &member)?;
            check_removal(user.id, my_role, member_id, member_role)?;
            GroupRepo::remove_member(conn, g.id, member_id)?;
            println_colored!(AMBER, "  Removed {} from {}", member, g.name);
        }

        GroupCommands::Today { group, json } => {
            let (g, _) = resolve(conn, user, &group)?;
            let board = analytics::group_today(conn, g.id, Day::from_date(today()))?;
            if json {
                return print_json(&board);
            }

            println!();
            println_colored!(ACCENT, "  {} {} — {}", g.emoji, g.name, board.date);
            for h in &board.habits {
                println!();
                println_colored!(BOLD, "  {}  {}/{} done", pad(&h.habit.name, 24), h.done, h.members.len());
                for m in &h.members {
                    let label = progress_label(h.habit.habit_type, h.habit.target_count, m.entry.as_ref());
                    let (mark, color) = if m.satisfied { ("✓", GREEN) } else { ("○", DIM) };
                    println_colored!(color, "    {} {}  {}", mark, pad(&m.name, 20), label);
                }
            }
            if board.habits.is_empty() {
                println_colored!(DIM, "  No habits in this group yet.");
            }
            println!();
        }

        GroupCommands::Stats { group, days, json } => {
            let (g, _) = resolve(conn, user, &group)?;
            let window = days.unwrap_or(config.analytics.group_days);
            let stats = analytics::group_stats(conn, g.id, window, Day::from_date(today()))?;
            if json {
                return print_json(&stats);
            }

            println!();
            println_colored!(ACCENT, "  {} {} — last {} days", g.emoji, g.name, window);
            println!();
            println_colored!(BOLD, "  Leaderboard");
            for (rank, m) in stats.leaderboard.iter().enumerate() {
                let color = if m.name == user.name { ACCENT } else { "" };
                println_colored!(
                    color,
                    "  {:>2}. {}  {:>3} day streak  best {:>3}  {:>3}%  {} days",
                    rank + 1,
                    pad(&m.name, 16),
                    m.streaks.current,
                    m.streaks.longest,
                    m.consistency,
                    m.completed_days
                );
            }

            println!();
            println_colored!(BOLD, "  This week");
            let header: Vec<String> = stats
                .days
                .iter()
                .filter_map(|d| d.to_date().ok())
                .map(|d| format!("{:>5}", d.format("%a")))
                .collect();
            println_colored!(DIM, "  {}  {}", pad("", 16), header.join(""));
            for row in &stats.weekly {
                let cells: Vec<String> = row.values.iter().map(|v| format!("{:>5}", v)).collect();
                println!("  {}  {}", pad(&row.name, 16), cells.join(""));
            }

            println!();
            for m in &stats.leaderboard {
                println_colored!(DIM, "  {}", m.name);
                for line in heatmap_rows(&m.heatmap, 30) {
                    println_colored!(GREEN, "    {}", line);
                }
            }
            println!();
        }

        GroupCommands::Chat { action } => handle_chat(conn, config, user, action)?,
    }
    Ok(())
}

fn handle_chat(
    conn: &Connection,
    config: &AppConfig,
    user: &User,
    action: ChatCommands,
) -> Result<()> {
    match action {
        ChatCommands::Send { group, text } => {
            let (g, _) = resolve(conn, user, &group)?;
            let id = MessageRepo::send(conn, g.id, user.id, &text)?;
            log::debug!("message {} posted to group {}", id, g.id);
            println_colored!(DIM, "  sent (#{})", id);
        }
        ChatCommands::List { group, after } => {
            let (g, _) = resolve(conn, user, &group)?;
            let page = config.chat.page_size;
            let messages = match after {
                Some(id) => MessageRepo::after(conn, g.id, id, page.saturating_mul(2))?,
                None => MessageRepo::latest(conn, g.id, page)?,
            };
            if messages.is_empty() {
                println_colored!(DIM, "  No messages.");
            }
            for m in &messages {
                let color = if m.user_id == user.id { ACCENT } else { BOLD };
                print!("  {}", DIM);
                print!("#{:<4} {} ", m.id, m.created_at);
                print!("\x1b[0m");
                println_colored!(color, "{}: {}", m.user_name, m.text);
            }
        }
    }
    Ok(())
}

/// Prints a permission failure in red without the anyhow chain.
pub fn report_group_error(err: &anyhow::Error) -> bool {
    match err.downcast_ref::<GroupError>() {
        Some(e) => {
            println_colored!(RED, "  {}", e);
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations::run_migrations;

    fn setup() -> (Connection, User, User, i64) {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        let owner = UserRepo::get_or_create(&conn, "ana").unwrap();
        let other = UserRepo::get_or_create(&conn, "ben").unwrap();
        let draft = GroupDraft {
            name: Some("Runners".into()),
            ..Default::default()
        };
        let habit = NewGroupHabit {
            name: "Run".into(),
            habit_type: HabitType::Checkbox,
            color: None,
            target_count: None,
        };
        let gid = GroupRepo::create(&conn, owner.id, &draft, "ABCD1234", &habit, "#6366f1").unwrap();
        (conn, owner, other, gid)
    }

    #[test]
    fn resolve_distinguishes_missing_from_not_joined() {
        let (conn, owner, other, gid) = setup();
        let (g, role) = resolve(&conn, &owner, "runners").unwrap();
        assert_eq!(g.id, gid);
        assert_eq!(role, Role::Owner);

        let err = resolve(&conn, &other, &gid.to_string()).unwrap_err();
        assert_eq!(err.downcast_ref::<GroupError>(), Some(&GroupError::NotMember));
        assert!(report_group_error(&err));

        let err = resolve(&conn, &other, "9999").unwrap_err();
        assert!(err.downcast_ref::<GroupError>().is_none());
    }

    #[test]
    fn group_habit_lookup_defaults_to_first() {
        let (conn, _, _, gid) = setup();
        assert_eq!(find_group_habit(&conn, gid, None).unwrap().name, "Run");
        assert_eq!(find_group_habit(&conn, gid, Some("RUN")).unwrap().name, "Run");
        assert!(find_group_habit(&conn, gid, Some("Swim")).is_err());
    }

    #[test]
    fn plain_log_toggles_checkbox_only() {
        let u = group_log_update(HabitType::Checkbox, false, false, false, None, None);
        assert_eq!(u.completed, Some(true));
        let u = group_log_update(HabitType::Checkbox, true, false, false, None, None);
        assert_eq!(u.completed, Some(false));
        let u = group_log_update(HabitType::Timer, false, false, false, Some(20), None);
        assert_eq!(u.completed, None);
        assert_eq!(u.duration, Some(20));
        let u = group_log_update(HabitType::Count, true, false, true, None, Some(3));
        assert_eq!(u.completed, Some(false));
    }

    #[test]
    fn members_are_found_by_profile_name() {
        let (conn, owner, other, gid) = setup();
        assert_eq!(find_member(&conn, gid, "ANA").unwrap(), (owner.id, Role::Owner));
        assert!(find_member(&conn, gid, "ben").is_err());
        GroupRepo::add_member(&conn, gid, other.id, Role::Member).unwrap();
        assert_eq!(find_member(&conn, gid, "ben").unwrap(), (other.id, Role::Member));
        assert!(find_member(&conn, gid, "nobody").is_err());
    }

    #[test]
    fn end_dates_must_parse() {
        let bad = GroupFields {
            end_date: Some("soon".into()),
            ..Default::default()
        };
        assert!(group_draft(None, bad).is_err());
        let cleared = GroupFields {
            end_date: Some(String::new()),
            ..Default::default()
        };
        let draft = group_draft(None, cleared).unwrap();
        assert_eq!(draft.end_date.as_deref(), Some(""));

        let stamped = GroupFields {
            end_date: Some("2024-05-01T10:00:00Z".into()),
            ..Default::default()
        };
        let draft = group_draft(None, stamped).unwrap();
        assert_eq!(draft.end_date.as_deref(), Some("2024-05-01"));
        assert!(group_draft(None, GroupFields::default()).unwrap().end_date.is_none());
    }
}
