use clap::Parser;
use fleet_bot::cli::{Cli, Commands};
use fleet_bot::cmd;

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Run { .. } => tracing::Level::INFO,
        Commands::Check => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .init();

    let result = match cli.command {
        Commands::Run {
            token,
            rcon_password,
        } => cmd::run::run(&cli.config, &token, rcon_password),
        Commands::Check => cmd::check::run(&cli.config),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
