//! Entry point: parse CLI and dispatch to command handlers.

use clap::Parser;
use commish::{
    cli::{Commands, Commish},
    commands::{
        auth_url::handle_auth_url,
        recap::{handle_recap, RecapParams},
    },
    config::AppConfig,
    error::ErrorKind,
    Result,
};
use tracing_subscriber::EnvFilter;

async fn run(app: Commish, config: AppConfig) -> Result<()> {
    match app.command {
        Commands::Recap(args) => {
            handle_recap(
                RecapParams {
                    provider: args.provider,
                    league_id: args.league_id,
                    swid: args.swid,
                    espn_s2: args.espn_s2,
                    auth_code: args.auth_code,
                    week: args.week,
                    season: args.season,
                    persona: args.persona,
                    intensity: args.intensity,
                    moderate: args.moderate,
                    json_snapshot: args.json_snapshot,
                    verbose: args.verbose,
                },
                config,
            )
            .await
        }
        Commands::AuthUrl => handle_auth_url(&config),
    }
}

/// Run the CLI.
#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("commish=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let app = Commish::parse();
    let config = AppConfig::from_env();

    if let Err(e) = run(app, config).await {
        if e.kind() == ErrorKind::Cancelled {
            eprintln!("\n⚠ {e}");
            std::process::exit(130);
        }
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
