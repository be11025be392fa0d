// FILE: crates/cli/src/main.rs

use anyhow::{Context, Result};
use clap::{Arg, Command};
use fieldsync_config::ConfigManager;
use std::path::PathBuf;
use std::process::ExitCode;

mod commands;

use commands::Session;

fn type_arg() -> Arg {
    Arg::new("type")
        .required(true)
        .value_name("TYPE")
        .help("Entity type (program, location, trial, study, germplasm, cross, observation)")
}

fn id_arg() -> Arg {
    Arg::new("id").required(true).value_name("ID").help("Record ID")
}

fn build_cli() -> Command {
    Command::new("fieldsync")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Offline-first record store that syncs with a remote REST API")
        .arg(
            Arg::new("config-dir")
                .short('c')
                .long("config-dir")
                .value_name("DIR")
                .help("Directory holding config.toml (defaults to the platform config dir)")
                .value_parser(clap::value_parser!(PathBuf))
                .global(true),
        )
        .arg(
            Arg::new("database")
                .short('d')
                .long("database")
                .value_name("PATH")
                .help("Path to the database file (overrides app.database_path)")
                .value_parser(clap::value_parser!(PathBuf))
                .global(true),
        )
        .subcommand(Command::new("init").about("Write a default config and create the database"))
        .subcommand(
            Command::new("create")
                .about("Create a record locally and queue it for sync")
                .arg(type_arg())
                .arg(
                    Arg::new("data")
                        .required(true)
                        .value_name("JSON")
                        .help("Record fields as a JSON object"),
                ),
        )
        .subcommand(
            Command::new("update")
                .about("Merge fields into a record and queue the update")
                .arg(type_arg())
                .arg(id_arg())
                .arg(
                    Arg::new("data")
                        .required(true)
                        .value_name("JSON")
                        .help("Changed fields as a JSON object"),
                ),
        )
        .subcommand(
            Command::new("remove")
                .about("Delete a record locally and queue the delete")
                .arg(type_arg())
                .arg(id_arg()),
        )
        .subcommand(
            Command::new("get")
                .about("Show a record with its sync metadata")
                .arg(type_arg())
                .arg(id_arg()),
        )
        .subcommand(Command::new("list").about("List records of one entity type").arg(type_arg()))
        .subcommand(Command::new("pending").about("List operations waiting to be pushed"))
        .subcommand(Command::new("status").about("Show the sync status"))
        .subcommand(Command::new("stats").about("Show queue, conflict and last-cycle counters"))
        .subcommand(
            Command::new("log")
                .about("Show recent sync log entries")
                .arg(
                    Arg::new("limit")
                        .short('n')
                        .long("limit")
                        .value_name("N")
                        .help("Number of entries to show")
                        .value_parser(clap::value_parser!(i64).range(1..))
                        .default_value("20"),
                ),
        )
        .subcommand(Command::new("sync").about("Push queued operations and pull remote changes"))
        .subcommand(
            Command::new("conflicts").about("List records waiting for a conflict resolution"),
        )
        .subcommand(
            Command::new("resolve")
                .about("Resolve a conflicted record")
                .arg(type_arg())
                .arg(id_arg())
                .arg(
                    Arg::new("resolution")
                        .required(true)
                        .value_name("RESOLUTION")
                        .help("How to settle the conflict")
                        .value_parser(["server-wins", "client-wins", "merge"]),
                ),
        )
        .subcommand(Command::new("watch").about("Sync automatically whenever connectivity returns"))
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if commands::is_critical(&err) {
                log::error!("{:#}", err);
            }
            eprintln!("{}", commands::describe_error(&err));
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let matches = build_cli().get_matches();

    let manager = match matches.get_one::<PathBuf>("config-dir") {
        Some(dir) => ConfigManager::with_directory(dir.clone()),
        None => ConfigManager::new().context("Failed to locate config directory")?,
    };
    let config = manager
        .load_with_env_overrides()
        .with_context(|| format!("Failed to load {}", manager.config_path().display()))?;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.app.log_level.as_str()),
    )
    .init();

    let database_path = matches
        .get_one::<PathBuf>("database")
        .cloned()
        .unwrap_or_else(|| manager.database_path(&config));
    let session = Session {
        config,
        database_path,
    };

    match matches.subcommand() {
        Some(("init", _)) => commands::init(&session, &manager).await,
        Some(("create", sub_matches)) => commands::create_record(&session, sub_matches).await,
        Some(("update", sub_matches)) => commands::update_record(&session, sub_matches).await,
        Some(("remove", sub_matches)) => commands::remove_record(&session, sub_matches).await,
        Some(("get", sub_matches)) => commands::show_record(&session, sub_matches).await,
        Some(("list", sub_matches)) => commands::list_records(&session, sub_matches).await,
        Some(("pending", _)) => commands::list_pending(&session).await,
        Some(("status", _)) => commands::show_status(&session).await,
        Some(("stats", _)) => commands::show_stats(&session).await,
        Some(("log", sub_matches)) => commands::show_log(&session, sub_matches).await,
        Some(("sync", _)) => commands::run_sync(&session).await,
        Some(("conflicts", _)) => commands::list_conflicts(&session).await,
        Some(("resolve", sub_matches)) => commands::resolve_conflict(&session, sub_matches).await,
        Some(("watch", _)) => commands::watch(&session).await,
        _ => {
            build_cli().print_help()?;
            Ok(())
        }
    }
}
