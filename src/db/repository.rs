use anyhow::{Context, Result, anyhow};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::str::FromStr;

use crate::models::group::GroupError;
use crate::models::habit::{format_schedule, parse_schedule};
use crate::models::{
    Group, GroupDraft, GroupHabit, GroupMember, GroupMessage, Habit, HabitDraft, HabitLog,
    HabitType, LogEntry, Role, User,
};

fn bad_column(idx: usize, e: anyhow::Error) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into())
}

/// A blank value (`''`, or `0` for numbers) clears an optional column;
/// `None` leaves it alone.
const KEEP_OR_CLEAR: &str =
    "CASE WHEN ?{n} IS NULL THEN {col} WHEN ?{n} = {blank} THEN NULL ELSE ?{n} END";

fn keep_or_clear(col: &str, n: usize, blank: &str) -> String {
    KEEP_OR_CLEAR
        .replace("{col}", col)
        .replace("{blank}", blank)
        .replace("{n}", &n.to_string())
}

// ─── Users ───────────────────────────────────────────────────────────────────

pub struct UserRepo;

impl UserRepo {
    pub fn find_by_name(conn: &Connection, name: &str) -> Result<Option<User>> {
        conn.query_row(
            "SELECT id, name FROM users WHERE name = ?1",
            params![name.trim()],
            |row| {
                Ok(User {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            },
        )
        .optional()
        .map_err(anyhow::Error::from)
    }

    /// Local profiles are created on first use.
    pub fn get_or_create(conn: &Connection, name: &str) -> Result<User> {
        let name = name.trim();
        if name.is_empty() {
            return Err(anyhow!("User name cannot be empty"));
        }
        if let Some(user) = Self::find_by_name(conn, name)? {
            return Ok(user);
        }
        conn.execute("INSERT INTO users (name) VALUES (?1)", params![name])?;
        log::info!("created profile '{}'", name);
        Ok(User {
            id: conn.last_insert_rowid(),
            name: name.to_string(),
        })
    }
}

// ─── Habits ──────────────────────────────────────────────────────────────────

const HABIT_COLUMNS: &str =
    "id, user_id, name, category, habit_type, color, icon, target_count, schedule_days, archived";

fn habit_from_row(row: &Row<'_>) -> rusqlite::Result<Habit> {
    let habit_type: String = row.get(4)?;
    let schedule: String = row.get(8)?;
    Ok(Habit {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        category: row.get(3)?,
        habit_type: HabitType::from_str(&habit_type).map_err(|e| bad_column(4, e))?,
        color: row.get(5)?,
        icon: row.get(6)?,
        target_count: row.get(7)?,
        schedule_days: parse_schedule(&schedule).map_err(|e| bad_column(8, e))?,
        archived: row.get::<_, i32>(9)? != 0,
    })
}

pub struct HabitRepo;

impl HabitRepo {
    pub fn create(
        conn: &Connection,
        user_id: i64,
        draft: &HabitDraft,
        default_color: &str,
    ) -> Result<i64> {
        let name = draft.name.as_deref().map(str::trim).unwrap_or_default();
        let category = draft.category.as_deref().map(str::trim).unwrap_or_default();
        if name.is_empty() || category.is_empty() {
            return Err(anyhow!("Name and category are required"));
        }
        let schedule = draft
            .schedule_days
            .as_deref()
            .map(format_schedule)
            .unwrap_or_default();

        conn.execute(
            "INSERT INTO habits
                (user_id, name, category, habit_type, color, icon, target_count, schedule_days)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                user_id,
                name,
                category,
                draft.habit_type.unwrap_or(HabitType::Checkbox).as_str(),
                draft.color.as_deref().unwrap_or(default_color),
                draft.icon,
                draft.target_count.filter(|t| *t > 0),
                schedule,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn list_active(conn: &Connection, user_id: i64) -> Result<Vec<Habit>> {
        let sql = format!(
            "SELECT {HABIT_COLUMNS} FROM habits
             WHERE user_id = ?1 AND archived = 0 ORDER BY created_at, id"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![user_id], habit_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(anyhow::Error::from)
    }

    pub fn count_active(conn: &Connection, user_id: i64) -> Result<u32> {
        conn.query_row(
            "SELECT COUNT(*) FROM habits WHERE user_id = ?1 AND archived = 0",
            params![user_id],
            |row| row.get(0),
        )
        .map_err(anyhow::Error::from)
    }

    /// Look up an active habit by id or (case-insensitive) name.
    pub fn find(conn: &Connection, user_id: i64, key: &str) -> Result<Option<Habit>> {
        let key = key.trim();
        if let Ok(id) = key.parse::<i64>() {
            let sql = format!(
                "SELECT {HABIT_COLUMNS} FROM habits WHERE id = ?1 AND user_id = ?2 AND archived = 0"
            );
            let found = conn
                .query_row(&sql, params![id, user_id], habit_from_row)
                .optional()?;
            if found.is_some() {
                return Ok(found);
            }
        }
        let sql = format!(
            "SELECT {HABIT_COLUMNS} FROM habits
             WHERE name = ?1 COLLATE NOCASE AND user_id = ?2 AND archived = 0
             ORDER BY id LIMIT 1"
        );
        conn.query_row(&sql, params![key, user_id], habit_from_row)
            .optional()
            .map_err(anyhow::Error::from)
    }

    pub fn update(conn: &Connection, habit_id: i64, draft: &HabitDraft) -> Result<()> {
        let schedule = draft.schedule_days.as_deref().map(format_schedule);
        let sql = format!(
            "UPDATE habits SET
                name = COALESCE(NULLIF(?2, ''), name),
                category = COALESCE(NULLIF(?3, ''), category),
                habit_type = COALESCE(?4, habit_type),
                color = COALESCE(?5, color),
                icon = {},
                target_count = {},
                schedule_days = COALESCE(?8, schedule_days)
             WHERE id = ?1",
            keep_or_clear("icon", 6, "''"),
            keep_or_clear("target_count", 7, "0")
        );
        conn.execute(
            &sql,
            params![
                habit_id,
                draft.name.as_deref().map(str::trim),
                draft.category.as_deref().map(str::trim),
                draft.habit_type.map(|t| t.as_str()),
                draft.color,
                draft.icon,
                draft.target_count,
                schedule,
            ],
        )?;
        Ok(())
    }

    /// Soft delete: history stays for analytics but the habit leaves all views.
    pub fn archive(conn: &Connection, habit_id: i64) -> Result<()> {
        conn.execute(
            "UPDATE habits SET archived = 1 WHERE id = ?1",
            params![habit_id],
        )?;
        Ok(())
    }
}

// ─── Habit logs ──────────────────────────────────────────────────────────────

/// Minutes logged against one habit on one day.
#[derive(Debug, Clone)]
pub struct MinutesRow {
    pub date: String,
    pub habit: String,
    pub category: String,
    pub minutes: i64,
}

pub struct LogRepo;

impl LogRepo {
    pub fn get(conn: &Connection, habit_id: i64, date: &str) -> Result<Option<LogEntry>> {
        conn.query_row(
            "SELECT completed, duration, count, note FROM habit_logs
             WHERE habit_id = ?1 AND date = ?2",
            params![habit_id, date],
            |row| {
                Ok(LogEntry {
                    completed: row.get::<_, i32>(0)? != 0,
                    duration: row.get(1)?,
                    count: row.get(2)?,
                    note: row.get(3)?,
                })
            },
        )
        .optional()
        .map_err(anyhow::Error::from)
    }

    pub fn upsert(
        conn: &Connection,
        habit_id: i64,
        user_id: i64,
        date: &str,
        entry: &LogEntry,
    ) -> Result<()> {
        conn.execute(
            "INSERT INTO habit_logs (habit_id, user_id, date, completed, duration, count, note)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(habit_id, date) DO UPDATE SET
                completed = ?4, duration = ?5, count = ?6, note = ?7",
            params![
                habit_id,
                user_id,
                date,
                entry.completed as i32,
                entry.duration,
                entry.count,
                entry.note,
            ],
        )?;
        log::debug!("habit {} logged for {}: {:?}", habit_id, date, entry);
        Ok(())
    }

    pub fn get_range(
        conn: &Connection,
        habit_id: i64,
        start: &str,
        end: &str,
    ) -> Result<Vec<HabitLog>> {
        let mut stmt = conn.prepare(
            "SELECT habit_id, date, completed, duration, count, note FROM habit_logs
             WHERE habit_id = ?1 AND date >= ?2 AND date <= ?3
             ORDER BY date",
        )?;
        let rows = stmt.query_map(params![habit_id, start, end], |row| {
            Ok(HabitLog {
                habit_id: row.get(0)?,
                date: row.get(1)?,
                entry: LogEntry {
                    completed: row.get::<_, i32>(2)? != 0,
                    duration: row.get(3)?,
                    count: row.get(4)?,
                    note: row.get(5)?,
                },
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(anyhow::Error::from)
    }

    /// Every day the habit was satisfied: checked off, or any time logged.
    pub fn completion_dates(conn: &Connection, habit_id: i64) -> Result<Vec<String>> {
        let mut stmt = conn.prepare(
            "SELECT date FROM habit_logs
             WHERE habit_id = ?1 AND (completed = 1 OR COALESCE(duration, 0) > 0)
             ORDER BY date",
        )?;
        let rows = stmt.query_map(params![habit_id], |row| row.get(0))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(anyhow::Error::from)
    }

    /// Number of active habits satisfied on each day of the range.
    pub fn satisfied_per_day(
        conn: &Connection,
        user_id: i64,
        start: &str,
        end: &str,
    ) -> Result<Vec<(String, u32)>> {
        let mut stmt = conn.prepare(
            "SELECT l.date, COUNT(*) FROM habit_logs l
             JOIN habits h ON h.id = l.habit_id
             WHERE l.user_id = ?1 AND h.archived = 0
               AND (l.completed = 1 OR COALESCE(l.duration, 0) > 0)
               AND l.date >= ?2 AND l.date <= ?3
             GROUP BY l.date
             ORDER BY l.date",
        )?;
        let rows = stmt.query_map(params![user_id, start, end], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(anyhow::Error::from)
    }

    pub fn minutes_in_range(
        conn: &Connection,
        user_id: i64,
        start: &str,
        end: &str,
        include_archived: bool,
    ) -> Result<Vec<MinutesRow>> {
        let mut stmt = conn.prepare(
            "SELECT l.date, h.name, h.category, l.duration FROM habit_logs l
             JOIN habits h ON h.id = l.habit_id
             WHERE l.user_id = ?1 AND COALESCE(l.duration, 0) > 0
               AND l.date >= ?2 AND l.date <= ?3
               AND (?4 OR h.archived = 0)
             ORDER BY l.date, l.duration DESC",
        )?;
        let rows = stmt.query_map(params![user_id, start, end, include_archived], |row| {
            Ok(MinutesRow {
                date: row.get(0)?,
                habit: row.get(1)?,
                category: row.get(2)?,
                minutes: row.get(3)?,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(anyhow::Error::from)
    }
}

// ─── Groups ──────────────────────────────────────────────────────────────────

const GROUP_COLUMNS: &str =
    "g.id, g.name, g.description, g.emoji, g.color, g.join_code, g.end_date, g.owner_id";

fn group_from_row(row: &Row<'_>) -> rusqlite::Result<Group> {
    Ok(Group {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        emoji: row.get(3)?,
        color: row.get(4)?,
        join_code: row.get(5)?,
        end_date: row.get(6)?,
        owner_id: row.get(7)?,
    })
}

fn role_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Role> {
    let role: String = row.get(idx)?;
    Role::from_str(&role).map_err(|e| bad_column(idx, e))
}

/// The habit a new group starts out tracking.
#[derive(Debug, Clone)]
pub struct NewGroupHabit {
    pub name: String,
    pub habit_type: HabitType,
    pub color: Option<String>,
    pub target_count: Option<i64>,
}

pub struct GroupRepo;

impl GroupRepo {
    /// Creates the group, its first habit, and the owner's membership.
    pub fn create(
        conn: &Connection,
        owner_id: i64,
        draft: &GroupDraft,
        join_code: &str,
        habit: &NewGroupHabit,
        default_color: &str,
    ) -> Result<i64> {
        let name = draft.name.as_deref().map(str::trim).unwrap_or_default();
        if name.is_empty() {
            return Err(anyhow!("Name is required"));
        }
        if habit.name.trim().is_empty() {
            return Err(anyhow!("Habit name is required"));
        }
        let color = draft.color.as_deref().unwrap_or(default_color);

        let tx = conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO habit_groups (name, description, emoji, color, join_code, end_date, owner_id)
             VALUES (?1, ?2, COALESCE(?3, '🎯'), ?4, ?5, ?6, ?7)",
            params![
                name,
                draft
                    .description
                    .as_deref()
                    .map(str::trim)
                    .filter(|d| !d.is_empty()),
                draft.emoji.as_deref().filter(|e| !e.is_empty()),
                color,
                join_code,
                draft.end_date.as_deref().filter(|d| !d.is_empty()),
                owner_id,
            ],
        )?;
        let group_id = tx.last_insert_rowid();
        tx.execute(
            "INSERT INTO group_members (group_id, user_id, role) VALUES (?1, ?2, 'owner')",
            params![group_id, owner_id],
        )?;
        tx.execute(
            "INSERT INTO group_habits (group_id, name, habit_type, color, target_count)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                group_id,
                habit.name.trim(),
                habit.habit_type.as_str(),
                habit.color.as_deref().unwrap_or(color),
                habit.target_count.filter(|t| *t > 0),
            ],
        )?;
        tx.commit().context("Creating group")?;
        log::info!("group {} created with join code {}", group_id, join_code);
        Ok(group_id)
    }

    pub fn get(conn: &Connection, group_id: i64) -> Result<Option<Group>> {
        let sql = format!("SELECT {GROUP_COLUMNS} FROM habit_groups g WHERE g.id = ?1");
        conn.query_row(&sql, params![group_id], group_from_row)
            .optional()
            .map_err(anyhow::Error::from)
    }

    pub fn find_by_join_code(conn: &Connection, code: &str) -> Result<Option<Group>> {
        let sql = format!("SELECT {GROUP_COLUMNS} FROM habit_groups g WHERE g.join_code = ?1");
        conn.query_row(&sql, params![code.trim().to_uppercase()], group_from_row)
            .optional()
            .map_err(anyhow::Error::from)
    }

    /// Look up one of the user's groups by id or (case-insensitive) name.
    pub fn find_for_user(conn: &Connection, user_id: i64, key: &str) -> Result<Option<Group>> {
        let key = key.trim();
        let by_id = key.parse::<i64>().ok();
        let sql = format!(
            "SELECT {GROUP_COLUMNS} FROM habit_groups g
             JOIN group_members m ON m.group_id = g.id AND m.user_id = ?1
             WHERE g.id = ?2 OR g.name = ?3 COLLATE NOCASE
             ORDER BY g.id = ?2 DESC, g.id LIMIT 1"
        );
        conn.query_row(&sql, params![user_id, by_id, key], group_from_row)
            .optional()
            .map_err(anyhow::Error::from)
    }

    pub fn list_for_user(conn: &Connection, user_id: i64) -> Result<Vec<(Group, Role)>> {
        let sql = format!(
            "SELECT {GROUP_COLUMNS}, m.role FROM habit_groups g
             JOIN group_members m ON m.group_id = g.id
             WHERE m.user_id = ?1
             ORDER BY m.joined_at DESC, g.id DESC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![user_id], |row| {
            Ok((group_from_row(row)?, role_at(row, 8)?))
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(anyhow::Error::from)
    }

    pub fn update(conn: &Connection, group_id: i64, draft: &GroupDraft) -> Result<()> {
        let sql = format!(
            "UPDATE habit_groups SET
                name = COALESCE(NULLIF(?2, ''), name),
                description = {},
                emoji = COALESCE(NULLIF(?4, ''), emoji),
                color = COALESCE(NULLIF(?5, ''), color),
                end_date = {}
             WHERE id = ?1",
            keep_or_clear("description", 3, "''"),
            keep_or_clear("end_date", 6, "''")
        );
        conn.execute(
            &sql,
            params![
                group_id,
                draft.name.as_deref().map(str::trim),
                draft.description.as_deref().map(str::trim),
                draft.emoji,
                draft.color,
                draft.end_date,
            ],
        )?;
        Ok(())
    }

    pub fn delete(conn: &Connection, group_id: i64) -> Result<()> {
        conn.execute("DELETE FROM habit_groups WHERE id = ?1", params![group_id])?;
        log::info!("group {} deleted", group_id);
        Ok(())
    }

    pub fn membership(conn: &Connection, group_id: i64, user_id: i64) -> Result<Option<Role>> {
        conn.query_row(
            "SELECT role FROM group_members WHERE group_id = ?1 AND user_id = ?2",
            params![group_id, user_id],
            |row| role_at(row, 0),
        )
        .optional()
        .map_err(anyhow::Error::from)
    }

    pub fn require_member(conn: &Connection, group_id: i64, user_id: i64) -> Result<Role> {
        Self::membership(conn, group_id, user_id)?.ok_or_else(|| GroupError::NotMember.into())
    }

    pub fn add_member(conn: &Connection, group_id: i64, user_id: i64, role: Role) -> Result<()> {
        conn.execute(
            "INSERT INTO group_members (group_id, user_id, role) VALUES (?1, ?2, ?3)",
            params![group_id, user_id, role.as_str()],
        )?;
        Ok(())
    }

    pub fn members(conn: &Connection, group_id: i64) -> Result<Vec<GroupMember>> {
        let mut stmt = conn.prepare(
            "SELECT m.group_id, m.user_id, u.name, m.role, m.joined_at
             FROM group_members m JOIN users u ON u.id = m.user_id
             WHERE m.group_id = ?1
             ORDER BY m.joined_at, m.rowid",
        )?;
        let rows = stmt.query_map(params![group_id], |row| {
            Ok(GroupMember {
                group_id: row.get(0)?,
                user_id: row.get(1)?,
                user_name: row.get(2)?,
                role: role_at(row, 3)?,
                joined_at: row.get(4)?,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(anyhow::Error::from)
    }

    pub fn set_role(conn: &Connection, group_id: i64, user_id: i64, role: Role) -> Result<()> {
        let changed = conn.execute(
            "UPDATE group_members SET role = ?3 WHERE group_id = ?1 AND user_id = ?2",
            params![group_id, user_id, role.as_str()],
        )?;
        if changed == 0 {
            return Err(anyhow!("That user is not a member of this group"));
        }
        Ok(())
    }

    pub fn remove_member(conn: &Connection, group_id: i64, user_id: i64) -> Result<()> {
        conn.execute(
            "DELETE FROM group_members WHERE group_id = ?1 AND user_id = ?2",
            params![group_id, user_id],
        )?;
        Ok(())
    }

    pub fn add_habit(conn: &Connection, group_id: i64, habit: &NewGroupHabit, default_color: &str) -> Result<i64> {
        if habit.name.trim().is_empty() {
            return Err(anyhow!("Name required"));
        }
        conn.execute(
            "INSERT INTO group_habits (group_id, name, habit_type, color, target_count)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                group_id,
                habit.name.trim(),
                habit.habit_type.as_str(),
                habit.color.as_deref().unwrap_or(default_color),
                habit.target_count.filter(|t| *t > 0),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn habits(conn: &Connection, group_id: i64) -> Result<Vec<GroupHabit>> {
        let mut stmt = conn.prepare(
            "SELECT id, group_id, name, habit_type, color, target_count
             FROM group_habits WHERE group_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![group_id], |row| {
            let habit_type: String = row.get(3)?;
            Ok(GroupHabit {
                id: row.get(0)?,
                group_id: row.get(1)?,
                name: row.get(2)?,
                habit_type: HabitType::from_str(&habit_type).map_err(|e| bad_column(3, e))?,
                color: row.get(4)?,
                target_count: row.get(5)?,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(anyhow::Error::from)
    }
}

// ─── Group habit logs ────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct GroupLogRow {
    pub user_id: i64,
    pub habit_id: i64,
    pub date: String,
    pub entry: LogEntry,
}

fn group_log_from_row(row: &Row<'_>) -> rusqlite::Result<GroupLogRow> {
    Ok(GroupLogRow {
        user_id: row.get(0)?,
        habit_id: row.get(1)?,
        date: row.get(2)?,
        entry: LogEntry {
            completed: row.get::<_, i32>(3)? != 0,
            duration: row.get(4)?,
            count: row.get(5)?,
            note: None,
        },
    })
}

pub struct GroupLogRepo;

impl GroupLogRepo {
    pub fn get(
        conn: &Connection,
        habit_id: i64,
        user_id: i64,
        date: &str,
    ) -> Result<Option<LogEntry>> {
        conn.query_row(
            "SELECT completed, duration, count FROM group_habit_logs
             WHERE habit_id = ?1 AND user_id = ?2 AND date = ?3",
            params![habit_id, user_id, date],
            |row| {
                Ok(LogEntry {
                    completed: row.get::<_, i32>(0)? != 0,
                    duration: row.get(1)?,
                    count: row.get(2)?,
                    note: None,
                })
            },
        )
        .optional()
        .map_err(anyhow::Error::from)
    }

    pub fn upsert(
        conn: &Connection,
        habit_id: i64,
        user_id: i64,
        date: &str,
        entry: &LogEntry,
    ) -> Result<()> {
        conn.execute(
            "INSERT INTO group_habit_logs (habit_id, user_id, date, completed, duration, count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(habit_id, user_id, date) DO UPDATE SET
                completed = ?4, duration = ?5, count = ?6",
            params![
                habit_id,
                user_id,
                date,
                entry.completed as i32,
                entry.duration,
                entry.count,
            ],
        )?;
        Ok(())
    }

    pub fn since(conn: &Connection, group_id: i64, start: &str) -> Result<Vec<GroupLogRow>> {
        let mut stmt = conn.prepare(
            "SELECT l.user_id, l.habit_id, l.date, l.completed, l.duration, l.count
             FROM group_habit_logs l JOIN group_habits h ON h.id = l.habit_id
             WHERE h.group_id = ?1 AND l.date >= ?2
             ORDER BY l.date",
        )?;
        let rows = stmt.query_map(params![group_id, start], group_log_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(anyhow::Error::from)
    }

    /// Every member's logs on the group's habits for one day.
    pub fn on_date(conn: &Connection, group_id: i64, date: &str) -> Result<Vec<GroupLogRow>> {
        let mut stmt = conn.prepare(
            "SELECT l.user_id, l.habit_id, l.date, l.completed, l.duration, l.count
             FROM group_habit_logs l JOIN group_habits h ON h.id = l.habit_id
             WHERE h.group_id = ?1 AND l.date = ?2
             ORDER BY l.habit_id, l.user_id",
        )?;
        let rows = stmt.query_map(params![group_id, date], group_log_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(anyhow::Error::from)
    }

    /// Days on which the member satisfied any of the group's habits.
    pub fn completion_dates(conn: &Connection, group_id: i64, user_id: i64) -> Result<Vec<String>> {
        let mut stmt = conn.prepare(
            "SELECT DISTINCT l.date FROM group_habit_logs l
             JOIN group_habits h ON h.id = l.habit_id
             WHERE h.group_id = ?1 AND l.user_id = ?2
               AND (l.completed = 1 OR COALESCE(l.duration, 0) > 0)
             ORDER BY l.date",
        )?;
        let rows = stmt.query_map(params![group_id, user_id], |row| row.get(0))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(anyhow::Error::from)
    }
}

// ─── Chat ────────────────────────────────────────────────────────────────────

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<GroupMessage> {
    Ok(GroupMessage {
        id: row.get(0)?,
        group_id: row.get(1)?,
        user_id: row.get(2)?,
        user_name: row.get(3)?,
        text: row.get(4)?,
        created_at: row.get(5)?,
    })
}

pub struct MessageRepo;

impl MessageRepo {
    pub fn send(conn: &Connection, group_id: i64, user_id: i64, text: &str) -> Result<i64> {
        let text = text.trim();
        if text.is_empty() {
            return Err(anyhow!("Empty message"));
        }
        conn.execute(
            "INSERT INTO group_messages (group_id, user_id, text) VALUES (?1, ?2, ?3)",
            params![group_id, user_id, text],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// The most recent `limit` messages, oldest first.
    pub fn latest(conn: &Connection, group_id: i64, limit: u32) -> Result<Vec<GroupMessage>> {
        let mut stmt = conn.prepare(
            "SELECT * FROM (
                SELECT m.id, m.group_id, m.user_id, u.name, m.text, m.created_at
                FROM group_messages m JOIN users u ON u.id = m.user_id
                WHERE m.group_id = ?1
                ORDER BY m.id DESC LIMIT ?2
             ) ORDER BY id",
        )?;
        let rows = stmt.query_map(params![group_id, limit], message_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(anyhow::Error::from)
    }

    /// Messages newer than `after_id`, oldest first.
    pub fn after(
        conn: &Connection,
        group_id: i64,
        after_id: i64,
        limit: u32,
    ) -> Result<Vec<GroupMessage>> {
        let mut stmt = conn.prepare(
            "SELECT m.id, m.group_id, m.user_id, u.name, m.text, m.created_at
             FROM group_messages m JOIN users u ON u.id = m.user_id
             WHERE m.group_id = ?1 AND m.id > ?2
             ORDER BY m.id LIMIT ?3",
        )?;
        let rows = stmt.query_map(params![group_id, after_id, limit], message_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(anyhow::Error::from)
    }
}

// ─── App meta ────────────────────────────────────────────────────────────────

/// Small key/value state that outlives one invocation, such as live timers.
pub struct MetaRepo;

impl MetaRepo {
    pub fn get(conn: &Connection, key: &str) -> Result<Option<String>> {
        conn.query_row(
            "SELECT value FROM app_meta WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()
        .map_err(anyhow::Error::from)
    }

    pub fn set(conn: &Connection, key: &str, value: &str) -> Result<()> {
        conn.execute(
            "INSERT INTO app_meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = ?2",
            params![key, value],
        )?;
        Ok(())
    }

    /// Returns whether the key existed.
    pub fn delete(conn: &Connection, key: &str) -> Result<bool> {
        let removed = conn.execute("DELETE FROM app_meta WHERE key = ?1", params![key])?;
        Ok(removed > 0)
    }
}
