use clap::{Parser, Subcommand, ValueEnum};
use keepstar_core::app::domain::EntityType;
use std::path::PathBuf;

/// Inspect and drive Keepstar session state from the command line.
#[derive(Parser)]
#[command(version, about, long_about = None, author)]
pub struct Cli {
    /// Path to the engine configuration file (defaults to ~/.config/keepstar/engine.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the SQLite state database (overrides the configured store)
    #[arg(long, env = "KEEPSTAR_STATE_DB", global = true)]
    pub state_db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Create a session holding the four-product fixture
    Seed {
        /// Also write a product grid formation
        #[arg(long)]
        template: bool,
    },
    /// Print the materialized state as JSON
    Show {
        session_id: String,
    },
    /// Tabulate the delta log
    Deltas {
        session_id: String,
        /// Only deltas at or after this step
        #[arg(long, conflicts_with = "until")]
        since: Option<u64>,
        /// Only deltas at or before this step
        #[arg(long)]
        until: Option<u64>,
    },
    /// Open the detail view of an entity
    Expand {
        session_id: String,
        #[arg(value_enum)]
        kind: EntityKind,
        entity_id: String,
    },
    /// Return to the previous view
    Back {
        session_id: String,
    },
    /// Print the state replayed up to a step
    Reconstruct {
        session_id: String,
        #[arg(long)]
        step: u64,
    },
    /// Roll the session back to an earlier step
    Rollback {
        session_id: String,
        #[arg(long = "to")]
        to_step: u64,
    },
    /// List sessions
    Sessions,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum EntityKind {
    Product,
    Service,
}

impl From<EntityKind> for EntityType {
    fn from(kind: EntityKind) -> Self {
        match kind {
            EntityKind::Product => EntityType::Product,
            EntityKind::Service => EntityType::Service,
        }
    }
}
