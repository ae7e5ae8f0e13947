use async_trait::async_trait;
use eyre::Result;
use serde::Serialize;
use std::io::Write;

pub mod back;
pub mod deltas;
pub mod expand;
pub mod reconstruct;
pub mod rollback;
pub mod seed;
pub mod sessions;
pub mod show;

#[async_trait]
pub trait Command {
    async fn execute(&self) -> Result<()>;
}

/// Pretty JSON on stdout.
pub(crate) fn write_json(value: &impl Serialize) -> Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(stdout, "{}", serde_json::to_string_pretty(value)?)?;
    Ok(())
}
