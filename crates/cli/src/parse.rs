//! ArgMatches → CliAction conversion.

use clap::ArgMatches;

/// Which command to run, with its arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliAction {
    /// Migrate existing identifiers
    Migrate {
        entity_type: String,
        batch_size: Option<usize>,
        dry_run: bool,
        yes: bool,
    },
    /// Create a record
    Create {
        entity_type: String,
        name: String,
        group: Option<String>,
    },
    /// Allocate the next identifier without creating a record
    Next {
        entity_type: String,
        name: String,
        group: Option<String>,
    },
    /// Print the default config file
    InitConfig,
}

fn required(matches: &ArgMatches, id: &str) -> Result<String, String> {
    matches
        .get_one::<String>(id)
        .cloned()
        .ok_or_else(|| format!("missing required argument <{id}>"))
}

/// Convert parsed arguments into an action.
pub fn matches_to_action(matches: &ArgMatches) -> Result<CliAction, String> {
    match matches.subcommand() {
        Some(("migrate", sub)) => Ok(CliAction::Migrate {
            entity_type: required(sub, "entity-type")?,
            batch_size: sub.get_one::<usize>("batch-size").copied(),
            dry_run: sub.get_flag("dry-run"),
            yes: sub.get_flag("yes"),
        }),
        Some(("create", sub)) => Ok(CliAction::Create {
            entity_type: required(sub, "entity-type")?,
            name: required(sub, "name")?,
            group: sub.get_one::<String>("group").cloned(),
        }),
        Some(("next", sub)) => Ok(CliAction::Next {
            entity_type: required(sub, "entity-type")?,
            name: required(sub, "name")?,
            group: sub.get_one::<String>("group").cloned(),
        }),
        Some(("init-config", _)) => Ok(CliAction::InitConfig),
        Some((other, _)) => Err(format!("unknown command '{other}'")),
        None => Err("no command given".to_string()),
    }
}
