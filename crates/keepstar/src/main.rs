use clap::Parser;
use eyre::Result;

use keepstar::cli::{Cli, Commands};
use keepstar::commands::{
    Command, back::BackCommand, deltas::DeltasCommand, expand::ExpandCommand,
    reconstruct::ReconstructCommand, rollback::RollbackCommand, seed::SeedCommand,
    sessions::SessionsCommand, show::ShowCommand,
};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    keepstar::cli::config::load_env()?;

    // Level configured via RUST_LOG
    keepstar_core::utils::tracing::init_tracing()?;

    let engine = keepstar::open_engine(cli.config.as_deref(), cli.state_db.clone()).await?;

    let command: Box<dyn Command> = match cli.command {
        Commands::Seed { template } => Box::new(SeedCommand {
            engine: engine.clone(),
            template,
        }),
        Commands::Show { session_id } => Box::new(ShowCommand {
            engine: engine.clone(),
            session_id,
        }),
        Commands::Deltas {
            session_id,
            since,
            until,
        } => Box::new(DeltasCommand {
            engine: engine.clone(),
            session_id,
            since,
            until,
        }),
        Commands::Expand {
            session_id,
            kind,
            entity_id,
        } => Box::new(ExpandCommand {
            engine: engine.clone(),
            session_id,
            kind,
            entity_id,
        }),
        Commands::Back { session_id } => Box::new(BackCommand {
            engine: engine.clone(),
            session_id,
        }),
        Commands::Reconstruct { session_id, step } => Box::new(ReconstructCommand {
            engine: engine.clone(),
            session_id,
            step,
        }),
        Commands::Rollback {
            session_id,
            to_step,
        } => Box::new(RollbackCommand {
            engine: engine.clone(),
            session_id,
            to_step,
        }),
        Commands::Sessions => Box::new(SessionsCommand {
            engine: engine.clone(),
        }),
    };

    let result = command.execute().await;
    engine.shutdown().await;
    result
}
