use clap::error::ErrorKind;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod auth;
mod cli;
mod console;
mod present;
mod provider;
mod trace;
mod window;

use cli::{Cli, Options};
use console::Console;

fn init_logging() {
    let filter = EnvFilter::try_from_env("GETTOKEN_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn main() {
    init_logging();

    let args: Vec<_> = std::env::args_os().collect();

    let cli = match Cli::try_parse_from(&args) {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = e.print();
            std::process::exit(0);
        }
        Err(e) => {
            let message = cli::options::parse_failure_message(&args, &e);
            Console::stdout().error(&message);
            std::process::exit(1);
        }
    };

    let code = match cli::commands::cmd_run(Options::from(cli)) {
        Ok(code) => code,
        Err(e) => {
            Console::stdout().error(&format!("error: {:#}", e));
            1
        }
    };

    std::process::exit(code);
}
