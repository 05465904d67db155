mod cli;

use anyhow::Result;
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.log_level());

    if let Err(err) = run(&cli) {
        error!(error = %err, "conversion failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let stdout = std::io::stdout();
    let mut stdout = stdout.lock();
    cli::run(cli, &mut stdout)
}

fn init_tracing(default_level: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
