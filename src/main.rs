use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
use cli::{Cli, execute_command};

fn main() {
    // Logs go to stderr so stdout stays machine-readable.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(err) = execute_command(&cli) {
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }
}
