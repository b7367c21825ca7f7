//! Clap command tree definition.

use clap::{value_parser, Arg, ArgAction, Command};

fn entity_type_arg() -> Arg {
    Arg::new("entity-type")
        .required(true)
        .help("Entity type to operate on (e.g. Customer, Supplier)")
}

fn group_arg() -> Arg {
    Arg::new("group")
        .long("group")
        .short('g')
        .help("Owning group (default: the dataset's default group)")
}

/// Build the complete CLI command tree.
pub fn build_cli() -> Command {
    Command::new("nomen")
        .about("Collision-free entity identifiers and identifier migration")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("data")
                .long("data")
                .short('d')
                .help("Dataset file (default: nomen.json)")
                .global(true),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .help("Config file (default: nomen.toml if present)")
                .global(true),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .help("JSON output mode")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .subcommand(build_migrate())
        .subcommand(build_create())
        .subcommand(build_next())
        .subcommand(build_init_config())
}

fn build_migrate() -> Command {
    Command::new("migrate")
        .about("Rename existing records whose identifier does not follow the naming scheme")
        .arg(entity_type_arg())
        .arg(
            Arg::new("batch-size")
                .long("batch-size")
                .short('b')
                .value_parser(value_parser!(usize))
                .help("Records per page and per commit (default: from config)"),
        )
        .arg(
            Arg::new("dry-run")
                .long("dry-run")
                .action(ArgAction::SetTrue)
                .help("Report what would change without writing anything"),
        )
        .arg(
            Arg::new("yes")
                .long("yes")
                .short('y')
                .action(ArgAction::SetTrue)
                .help("Skip the confirmation prompt"),
        )
}

fn build_create() -> Command {
    Command::new("create")
        .about("Create a record with a freshly assigned identifier")
        .arg(entity_type_arg())
        .arg(Arg::new("name").required(true).help("Display name"))
        .arg(group_arg())
}

fn build_next() -> Command {
    Command::new("next")
        .about("Allocate and print the next identifier (consumes a number)")
        .arg(entity_type_arg())
        .arg(Arg::new("name").required(true).help("Display name"))
        .arg(group_arg())
}

fn build_init_config() -> Command {
    Command::new("init-config").about("Print a commented default nomen.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_tree_is_valid() {
        build_cli().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let matches = build_cli()
            .try_get_matches_from(["nomen", "migrate", "Customer", "--data", "x.json", "--dry-run"])
            .unwrap();
        assert_eq!(matches.get_one::<String>("data").map(String::as_str), Some("x.json"));
        let (name, sub) = matches.subcommand().unwrap();
        assert_eq!(name, "migrate");
        assert!(sub.get_flag("dry-run"));
    }

    #[test]
    fn test_batch_size_must_be_numeric() {
        assert!(build_cli()
            .try_get_matches_from(["nomen", "migrate", "Customer", "--batch-size", "many"])
            .is_err());
    }
}
