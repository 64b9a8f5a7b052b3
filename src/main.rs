mod analytics;
mod cli;
mod config;
mod db;
mod models;
mod streaks;
mod utils;

use anyhow::{Context, Result};
use clap::Parser;
use rusqlite::Connection;

use cli::args::{Cli, Commands};
use cli::{groups, handlers};
use config::AppConfig;
use db::migrations::run_migrations;
use db::repository::UserRepo;

fn main() -> Result<()> {
    env_logger::init();

    match run() {
        Ok(()) => Ok(()),
        Err(err) if groups::report_group_error(&err) => std::process::exit(1),
        Err(err) => Err(err),
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let mut config = AppConfig::load().context("Loading config")?;

    AppConfig::ensure_data_dir()?;
    let db_path = AppConfig::db_path()?;
    let conn = Connection::open(&db_path)
        .with_context(|| format!("Opening database at {:?}", db_path))?;

    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    run_migrations(&conn)?;

    // Config commands work without a profile
    if let Some(Commands::Config { action }) = cli.command {
        return handlers::handle_config(&mut config, action);
    }

    let name = cli.user.as_deref().unwrap_or(&config.profile.user);
    let user = UserRepo::get_or_create(&conn, name)?;
    log::debug!("acting as {} (#{})", user.name, user.id);

    match cli.command {
        Some(Commands::Habit { action }) => {
            handlers::handle_habit(&conn, &config, &user, action)?;
        }
        Some(Commands::Done { habit, undo, date }) => {
            handlers::handle_done(&conn, &user, &habit, undo, date.as_deref())?;
        }
        Some(Commands::Time {
            habit,
            minutes,
            date,
        }) => {
            handlers::handle_time(&conn, &user, &habit, minutes, date.as_deref())?;
        }
        Some(Commands::Count { habit, delta, date }) => {
            handlers::handle_count(&conn, &user, &habit, delta, date.as_deref())?;
        }
        Some(Commands::Stats { habit, days, json }) => {
            handlers::handle_stats(&conn, &config, &user, &habit, days, json)?;
        }
        Some(Commands::Timer { action }) => {
            handlers::handle_timer(&conn, &user, action)?;
        }
        Some(Commands::Analytics { action }) => {
            handlers::handle_analytics(&conn, &config, &user, action)?;
        }
        Some(Commands::Group { action }) => {
            groups::handle_group(&conn, &config, &user, action)?;
        }
        Some(Commands::Config { .. }) => unreachable!(),

        // No subcommand → today's overview
        Some(Commands::Today) | None => {
            handlers::handle_today(&conn, &user)?;
        }
    }

    Ok(())
}
