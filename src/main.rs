mod cli;
mod commands;
mod context;
mod customize;
mod error;
mod ops;
mod paths;
mod progress;
mod render;
mod ui;

use anyhow::Result;

fn main() {
    let code = match run() {
        Ok(()) => 0,
        Err(e) => {
            ui::error(&format!("{e:#}"));
            if log::log_enabled!(log::Level::Info) {
                if let Some(payload) = error::api_payload(&e) {
                    let text = serde_json::to_string_pretty(payload).unwrap_or_default();
                    eprintln!("{text}");
                }
                eprintln!("{e:?}");
            }
            error::exit_code(&e)
        }
    };
    std::process::exit(code);
}

fn run() -> Result<()> {
    let tree = commands::build_tree()?;
    let argv = cli::args::normalise_args(std::env::args(), &tree.long_names());
    let cmd = cli::build_command(&tree);
    let matches = match cmd.clone().try_get_matches_from(&argv) {
        Ok(matches) => matches,
        Err(e) => std::process::exit(cli::report_clap_error(&cmd, &argv, &e)),
    };
    let globals = cli::globals(&matches);

    // Initialize logging based on verbosity
    let log_level = match globals.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();

    cli::dispatch(&tree, &matches, globals)
}
