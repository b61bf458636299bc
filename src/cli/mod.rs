//! Command dispatcher.
//!
//! The tree registered by the command plugins is turned into a clap
//! command, parsed, and the selected leaf is run between the pre-command
//! hook (connect) and the post-command hook (flush the token cache).

pub mod args;
pub mod crud;
pub mod registry;

use crate::context::{Context, Globals};
use crate::error::UsageError;
use crate::paths;
use crate::render::Format;
use anyhow::Result;
use args::Invocation;
use clap::error::ErrorKind;
use clap::{Arg, ArgAction, ArgMatches, Command};
use registry::{Action, CommandTree, Group, Leaf};

/// Long names of the global options.
pub const GLOBAL_LONG_NAMES: [&str; 5] = ["env", "output", "verbose", "key", "colored"];

/// Build the clap command for a tree.
pub fn build_command(tree: &CommandTree) -> Command {
    let root = group_command(&tree.root)
        .version(env!("CARGO_PKG_VERSION"))
        .arg(
            Arg::new("env")
                .short('e')
                .long("env")
                .global(true)
                .default_value(paths::default_env())
                .help("Environment to operate on [env: BEEHIVE_ENV]"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .global(true)
                .value_parser(Format::NAMES)
                .default_value("text")
                .help("Output format"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .global(true)
                .action(ArgAction::Count)
                .help("Verbose output (-v info and cURL lines, -vv debug, -vvv trace)"),
        )
        .arg(
            Arg::new("key")
                .short('k')
                .long("key")
                .global(true)
                .env(paths::ENV_KEY)
                .hide_env_values(true)
                .help("Key used to decrypt secrets in the configuration"),
        )
        .arg(
            Arg::new("colored")
                .long("colored")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Colorize table headers when writing to a terminal"),
        );
    root.name("beehive")
}

fn group_command(group: &Group) -> Command {
    let mut cmd = Command::new(group.name.clone())
        .about(group.help.clone())
        .subcommand_required(true)
        .arg_required_else_help(true);
    for child in &group.groups {
        cmd = cmd.subcommand(group_command(child));
    }
    for leaf in &group.leaves {
        cmd = cmd.subcommand(leaf_command(leaf));
    }
    cmd
}

fn leaf_command(leaf: &Leaf) -> Command {
    let spec = &leaf.spec;
    let mut cmd = Command::new(spec.name)
        .about(spec.help)
        .args(spec.args.iter().map(args::ArgSpec::to_arg));
    if let Some(description) = spec.description {
        cmd = cmd.long_about(description);
    }
    if let Some(example) = spec.example {
        cmd = cmd.after_help(format!("Example:\n  {example}"));
    }
    cmd
}

/// Global options from the matches.
pub fn globals(matches: &ArgMatches) -> Globals {
    Globals {
        env: matches
            .get_one::<String>("env")
            .cloned()
            .unwrap_or_else(paths::default_env),
        format: matches
            .get_one::<String>("output")
            .and_then(|f| f.parse().ok())
            .unwrap_or_default(),
        verbose: matches.get_count("verbose"),
        key: matches.get_one::<String>("key").cloned(),
        colored: matches.get_flag("colored"),
    }
}

/// Walk the matches down to the selected leaf.
pub fn resolve<'a>(tree: &'a CommandTree, matches: &'a ArgMatches) -> Option<(&'a Leaf, &'a ArgMatches)> {
    let mut group = &tree.root;
    let mut current = matches;
    loop {
        let (name, sub) = current.subcommand()?;
        if let Some(leaf) = group.leaves.iter().find(|l| l.spec.name == name) {
            return Some((leaf, sub));
        }
        group = group.groups.iter().find(|g| g.name == name)?;
        current = sub;
    }
}

/// Parse the selected leaf's arguments and run it.
pub fn dispatch(tree: &CommandTree, matches: &ArgMatches, globals: Globals) -> Result<()> {
    let (leaf, sub) =
        resolve(tree, matches).ok_or_else(|| UsageError::Other("no command given".into()))?;
    let inv = Invocation::from_matches(&leaf.path, &leaf.spec.args, sub)?;
    let mut ctx = Context::new(globals)?;
    run_leaf(&mut ctx, leaf, &inv)
}

/// Run a leaf between the pre- and post-command hooks.
///
/// The post-command hook runs whatever the leaf returned; a leaf error wins
/// over a flush error.
pub fn run_leaf(ctx: &mut Context, leaf: &Leaf, inv: &Invocation) -> Result<()> {
    log::debug!("Running '{}' on environment {}", leaf.path, ctx.env);
    if leaf.spec.requires_api {
        ctx.connect()?;
    }
    let result = match &leaf.spec.action {
        Action::Custom(handler) => handler(ctx, inv),
        Action::Crud(crud) => crud::execute(ctx, &leaf.meta, crud, inv),
    };
    let flushed = ctx.flush();
    result?;
    flushed
}

/// Print a clap error and return the exit code.
///
/// An unknown subcommand also prints the help of the deepest group that
/// was matched.
pub fn report_clap_error(cmd: &Command, argv: &[String], err: &clap::Error) -> i32 {
    match err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
            let _ = err.print();
            0
        }
        ErrorKind::InvalidSubcommand => {
            let message = err.to_string();
            let first = message.lines().next().unwrap_or_default();
            crate::ui::error(first.trim_start_matches("error: "));
            eprintln!();
            eprintln!("{}", deepest_help(cmd, argv));
            2
        }
        _ => {
            let _ = err.print();
            2
        }
    }
}

fn deepest_help(cmd: &Command, argv: &[String]) -> String {
    let mut current = cmd.clone();
    for token in argv.iter().skip(1).filter(|t| !t.starts_with('-')) {
        let Some(next) = current.find_subcommand(token).cloned() else {
            continue;
        };
        current = next;
    }
    current.render_help().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands;

    fn argv(line: &str) -> Vec<String> {
        std::iter::once("beehive")
            .chain(line.split_whitespace())
            .map(str::to_string)
            .collect()
    }

    fn parse(line: &str) -> Result<(CommandTree, ArgMatches), clap::Error> {
        let tree = commands::build_tree().unwrap();
        let argv = args::normalise_args(argv(line), &tree.long_names());
        let matches = build_command(&tree).try_get_matches_from(argv)?;
        Ok((tree, matches))
    }

    #[test]
    fn test_command_tree_is_valid() {
        let tree = commands::build_tree().unwrap();
        build_command(&tree).debug_assert();
    }

    #[test]
    fn test_resolve_leaf_and_globals() {
        let (tree, matches) = parse("-e dev -o json auth users get -id U1").unwrap();
        let globals = globals(&matches);
        assert_eq!(globals.env, "dev");
        assert_eq!(globals.format, Format::Json);

        let (leaf, sub) = resolve(&tree, &matches).unwrap();
        assert_eq!(leaf.path, "auth users get");
        let inv = Invocation::from_matches(&leaf.path, &leaf.spec.args, sub).unwrap();
        assert_eq!(inv.get_str("id"), Some("U1"));
        assert_eq!(leaf.meta.subsystem.as_deref(), Some("auth"));
    }

    #[test]
    fn test_globals_after_the_leaf() {
        let (_tree, matches) = parse("resource entities get -size 1 -o yaml -vv").unwrap();
        let globals = globals(&matches);
        assert_eq!(globals.format, Format::Yaml);
        assert_eq!(globals.verbose, 2);
    }

    #[test]
    fn test_unknown_leaf_is_usage_error() {
        let err = parse("auth nope").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);

        let tree = commands::build_tree().unwrap();
        let cmd = build_command(&tree);
        let help = deepest_help(&cmd, &argv("auth nope"));
        assert!(help.contains("users"));
        assert_eq!(report_clap_error(&cmd, &argv("auth nope"), &err), 2);
    }

    #[test]
    fn test_missing_subcommand_and_bad_values() {
        assert!(parse("auth").is_err());
        let err = parse("-o xml auth users get").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidValue);
        let err = parse("resource entities get -size ten").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValueValidation);
    }
}
