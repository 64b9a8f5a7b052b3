use clap::{Args, Parser, Subcommand};

use crate::models::habit::MAX_LOG_VALUE;
use crate::streaks::MAX_WINDOW_DAYS;

const LOG_RANGE: std::ops::RangeInclusive<i64> = -MAX_LOG_VALUE..=MAX_LOG_VALUE;
const TARGET_RANGE: std::ops::RangeInclusive<i64> = 0..=MAX_LOG_VALUE;
const WINDOW_RANGE: std::ops::RangeInclusive<i64> = 1..=MAX_WINDOW_DAYS as i64;

#[derive(Parser, Debug)]
#[command(name = "habitual", version, author, about = "Track daily habits, streaks and group challenges from the terminal")]
pub struct Cli {
    /// Act as this local profile instead of the configured one
    #[arg(long, global = true)]
    pub user: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage your habits
    Habit {
        #[command(subcommand)]
        action: HabitCommands,
    },
    /// Check off a habit for today (toggles)
    Done {
        /// Habit name or id
        habit: String,
        /// Clear the check instead of toggling
        #[arg(long)]
        undo: bool,
        /// Log for another day (YYYY-MM-DD)
        #[arg(long)]
        date: Option<String>,
    },
    /// Add minutes to a habit
    Time {
        /// Habit name or id
        habit: String,
        /// Minutes to add (negative to correct)
        #[arg(allow_hyphen_values = true, value_parser = clap::value_parser!(i64).range(LOG_RANGE))]
        minutes: i64,
        #[arg(long)]
        date: Option<String>,
    },
    /// Add reps to a count habit
    Count {
        /// Habit name or id
        habit: String,
        /// Reps to add (negative to correct)
        #[arg(allow_hyphen_values = true, value_parser = clap::value_parser!(i64).range(LOG_RANGE))]
        delta: i64,
        #[arg(long)]
        date: Option<String>,
    },
    /// Show today's habits and group check-ins
    Today,
    /// Streaks, heatmap and consistency for one habit
    Stats {
        /// Habit name or id
        habit: String,
        /// Window size in days
        #[arg(long, value_parser = clap::value_parser!(u32).range(WINDOW_RANGE))]
        days: Option<u32>,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Live timer that logs its minutes when stopped
    Timer {
        #[command(subcommand)]
        action: TimerCommands,
    },
    /// Analytics across all habits
    Analytics {
        #[command(subcommand)]
        action: AnalyticsCommands,
    },
    /// Shared habits with other people
    Group {
        #[command(subcommand)]
        action: GroupCommands,
    },
    /// Inspect or change settings
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Args, Debug, Default)]
pub struct HabitFields {
    /// Category, e.g. Health or Learning
    #[arg(long)]
    pub category: Option<String>,
    /// Type: checkbox, timer or count
    #[arg(long = "type")]
    pub habit_type: Option<String>,
    /// Daily target for count habits (0 removes it)
    #[arg(long, value_parser = clap::value_parser!(i64).range(TARGET_RANGE))]
    pub target: Option<i64>,
    /// Hex colour
    #[arg(long)]
    pub color: Option<String>,
    /// Icon or emoji shown before the name
    #[arg(long)]
    pub icon: Option<String>,
    /// Scheduled weekdays, e.g. MON,WED,FRI (empty = every day)
    #[arg(long)]
    pub days: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum HabitCommands {
    /// Create a habit
    Add {
        name: String,
        #[command(flatten)]
        fields: HabitFields,
    },
    /// List active habits
    List,
    /// Change a habit
    Edit {
        /// Habit name or id
        habit: String,
        /// New name
        #[arg(long)]
        name: Option<String>,
        #[command(flatten)]
        fields: HabitFields,
    },
    /// Archive a habit (its history is kept)
    Archive {
        /// Habit name or id
        habit: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum AnalyticsCommands {
    /// Current and longest streak of every habit
    Streaks {
        #[arg(long)]
        json: bool,
    },
    /// Share of habits completed on each day
    Consistency {
        #[arg(long, value_parser = clap::value_parser!(u32).range(WINDOW_RANGE))]
        days: Option<u32>,
        #[arg(long)]
        json: bool,
    },
    /// Minutes logged per day, habit and category
    Time {
        /// daily, weekly, monthly or all
        #[arg(long, default_value = "weekly")]
        period: String,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug, Default)]
pub struct GroupFields {
    #[arg(long)]
    pub description: Option<String>,
    #[arg(long)]
    pub emoji: Option<String>,
    #[arg(long)]
    pub color: Option<String>,
    /// Last day of the challenge (YYYY-MM-DD)
    #[arg(long)]
    pub end_date: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum GroupCommands {
    /// Start a group; you become its owner
    Create {
        name: String,
        /// The habit the group tracks
        #[arg(long)]
        habit: String,
        /// Habit type: checkbox, timer or count
        #[arg(long = "type", default_value = "checkbox")]
        habit_type: String,
        #[arg(long, value_parser = clap::value_parser!(i64).range(TARGET_RANGE))]
        target: Option<i64>,
        #[command(flatten)]
        fields: GroupFields,
    },
    /// Join a group with its code
    Join { code: String },
    /// Groups you belong to
    List,
    /// Members and habits of a group
    Show { group: String },
    /// Change group details (owner or admin)
    Edit {
        group: String,
        #[arg(long)]
        name: Option<String>,
        #[command(flatten)]
        fields: GroupFields,
    },
    /// Delete a group (owner only)
    Delete { group: String },
    /// Leave a group
    Leave { group: String },
    /// Add a habit to a group (owner or admin)
    Habit {
        group: String,
        name: String,
        #[arg(long = "type", default_value = "checkbox")]
        habit_type: String,
        #[arg(long, value_parser = clap::value_parser!(i64).range(TARGET_RANGE))]
        target: Option<i64>,
        #[arg(long)]
        color: Option<String>,
    },
    /// Log today's progress on a group habit
    Log {
        group: String,
        /// Group habit name or id (defaults to the first habit)
        #[arg(long)]
        habit: Option<String>,
        #[arg(long, conflicts_with = "undo")]
        done: bool,
        #[arg(long)]
        undo: bool,
        #[arg(long, allow_hyphen_values = true, value_parser = clap::value_parser!(i64).range(LOG_RANGE))]
        minutes: Option<i64>,
        #[arg(long, allow_hyphen_values = true, value_parser = clap::value_parser!(i64).range(LOG_RANGE))]
        count: Option<i64>,
    },
    /// Make a member admin or plain member (owner only)
    Role {
        group: String,
        /// Member's profile name
        member: String,
        /// admin or member
        role: String,
    },
    /// Remove a member (owner or admin)
    Remove { group: String, member: String },
    /// Who has checked in today on each group habit
    Today {
        group: String,
        #[arg(long)]
        json: bool,
    },
    /// Leaderboard, weekly comparison and consistency
    Stats {
        group: String,
        #[arg(long, value_parser = clap::value_parser!(u32).range(WINDOW_RANGE))]
        days: Option<u32>,
        #[arg(long)]
        json: bool,
    },
    /// Group chat
    Chat {
        #[command(subcommand)]
        action: ChatCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum TimerCommands {
    /// Start timing a habit
    Start {
        /// Habit name or id
        habit: String,
    },
    /// Pause the running timer
    Pause,
    /// Resume a paused timer
    Resume,
    /// Stop the timer and log the minutes against today
    Stop,
    /// Show the running timer
    Status,
    /// Throw the timer away without logging
    Cancel,
}

#[derive(Subcommand, Debug)]
pub enum ChatCommands {
    /// Post a message
    Send { group: String, text: String },
    /// Show recent messages, or only those after a message id
    List {
        group: String,
        #[arg(long)]
        after: Option<i64>,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show,
    /// Print config and database locations
    Path,
    /// Set the default profile
    User { name: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_nested_group_commands() {
        let cli = Cli::try_parse_from([
            "habitual", "--user", "sam", "group", "log", "Runners", "--minutes", "25",
        ])
        .unwrap();
        assert_eq!(cli.user.as_deref(), Some("sam"));
        match cli.command {
            Some(Commands::Group {
                action: GroupCommands::Log { group, minutes, done, .. },
            }) => {
                assert_eq!(group, "Runners");
                assert_eq!(minutes, Some(25));
                assert!(!done);
            }
            other => panic!("unexpected parse: {:?}", other),
        }
    }

    #[test]
    fn negative_corrections_are_values() {
        let cli = Cli::try_parse_from(["habitual", "count", "Pushups", "-5"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Count { delta: -5, .. })));
    }

    #[test]
    fn parses_timer_and_group_today() {
        let cli = Cli::try_parse_from(["habitual", "timer", "start", "Guitar"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Timer { action: TimerCommands::Start { ref habit } }) if habit == "Guitar"
        ));

        let cli = Cli::try_parse_from(["habitual", "group", "today", "Runners", "--json"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Group { action: GroupCommands::Today { json: true, .. } })
        ));
    }

    #[test]
    fn out_of_range_numbers_are_rejected() {
        assert!(Cli::try_parse_from(["habitual", "count", "Pushups", "9223372036854775807"]).is_err());
        assert!(Cli::try_parse_from(["habitual", "time", "Guitar", "-2000000"]).is_err());
        assert!(Cli::try_parse_from(["habitual", "stats", "Read", "--days", "4000000000"]).is_err());
        assert!(Cli::try_parse_from(["habitual", "stats", "Read", "--days", "0"]).is_err());
        assert!(
            Cli::try_parse_from(["habitual", "group", "stats", "Runners", "--days", "3651"]).is_err()
        );
        assert!(Cli::try_parse_from(["habitual", "habit", "add", "X", "--target", "-1"]).is_err());

        let cli = Cli::try_parse_from(["habitual", "stats", "Read", "--days", "3650"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Stats { days: Some(3650), .. })));
    }
}
