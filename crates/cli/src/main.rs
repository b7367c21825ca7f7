//! Nomen CLI: identifier assignment and migration over a JSON dataset.
//!
//! - `nomen migrate Customer [--dry-run] [--yes]`: rename off-scheme records
//! - `nomen create Customer "Spar Group"`: create a record with a new identifier
//! - `nomen next Customer "Spar Group"`: allocate an identifier only
//!
//! Exit codes: 0 success, 1 fatal error, 2 migration finished with failed records.

mod commands;
mod format;
mod parse;
mod state;

use std::io::{self, BufRead, Write};
use std::process;

use nomen_engine::{MigrationOptions, NamingContext, NomenConfig};
use tracing_subscriber::EnvFilter;

use commands::build_cli;
use format::{format_error, format_identifier, format_summary, OutputMode};
use parse::{matches_to_action, CliAction};
use state::Workspace;

const EXIT_OK: i32 = 0;
const EXIT_FATAL: i32 = 1;
const EXIT_RECORD_FAILURES: i32 = 2;

fn main() {
    init_tracing();

    let matches = build_cli().get_matches();
    let mode = if matches.get_flag("json") {
        OutputMode::Json
    } else {
        OutputMode::Human
    };

    let action = match matches_to_action(&matches) {
        Ok(action) => action,
        Err(e) => {
            eprintln!("(error) {}", e);
            process::exit(EXIT_FATAL);
        }
    };

    if action == CliAction::InitConfig {
        print!("{}", NomenConfig::default_toml());
        return;
    }

    let data = matches.get_one::<String>("data").map(String::as_str);
    let config = matches.get_one::<String>("config").map(String::as_str);
    let mut workspace = match Workspace::open(data, config) {
        Ok(ws) => ws,
        Err(e) => {
            eprintln!("{}", format_error(&e, mode));
            process::exit(EXIT_FATAL);
        }
    };

    process::exit(run(&mut workspace, action, mode));
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(io::stderr)
        .init();
}

fn run(workspace: &mut Workspace, action: CliAction, mode: OutputMode) -> i32 {
    match action {
        CliAction::Migrate {
            entity_type,
            batch_size,
            dry_run,
            yes,
        } => {
            if !dry_run && !yes && !confirm(&entity_type) {
                println!("Migration cancelled.");
                return EXIT_OK;
            }
            let options = MigrationOptions {
                batch_size: batch_size.unwrap_or(workspace.config().batch_size),
                dry_run,
                padding: workspace.config().padding,
                ..MigrationOptions::default()
            };
            let result = workspace.migrate(&entity_type, &options);
            // Committed checkpoints are kept even when the run aborts.
            if !dry_run {
                if let Err(e) = workspace.save() {
                    eprintln!("{}", format_error(&e, mode));
                    return EXIT_FATAL;
                }
            }
            match result {
                Ok(summary) => {
                    println!("{}", format_summary(&summary, mode));
                    if summary.success() {
                        EXIT_OK
                    } else {
                        EXIT_RECORD_FAILURES
                    }
                }
                Err(e) => {
                    eprintln!("{}", format_error(&e, mode));
                    EXIT_FATAL
                }
            }
        }
        CliAction::Create {
            entity_type,
            name,
            group,
        } => {
            let ctx = context(name, group);
            let result = workspace
                .create(&entity_type, &ctx)
                .and_then(|id| workspace.save().map(|()| id));
            print_identifier(result, mode)
        }
        CliAction::Next {
            entity_type,
            name,
            group,
        } => {
            let ctx = context(name, group);
            let result = workspace
                .next(&entity_type, &ctx)
                .and_then(|id| workspace.save().map(|()| id));
            print_identifier(result, mode)
        }
        CliAction::InitConfig => {
            print!("{}", NomenConfig::default_toml());
            EXIT_OK
        }
    }
}

fn context(name: String, group: Option<String>) -> NamingContext {
    let ctx = NamingContext::new(name);
    match group {
        Some(group) => ctx.with_group(group),
        None => ctx,
    }
}

fn print_identifier(result: nomen_core::Result<nomen_core::EntityIdentifier>, mode: OutputMode) -> i32 {
    match result {
        Ok(id) => {
            println!("{}", format_identifier(&id, mode));
            EXIT_OK
        }
        Err(e) => {
            eprintln!("{}", format_error(&e, mode));
            EXIT_FATAL
        }
    }
}

/// Ask for a literal `YES` before a writing migration.
fn confirm(entity_type: &str) -> bool {
    print!(
        "This will rename {entity_type} records and rewrite every reference to them. Type YES to continue: "
    );
    if io::stdout().flush().is_err() {
        return false;
    }
    let mut answer = String::new();
    match io::stdin().lock().read_line(&mut answer) {
        Ok(_) => answer.trim() == "YES",
        Err(_) => false,
    }
}
