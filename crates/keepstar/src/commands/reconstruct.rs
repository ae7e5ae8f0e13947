use async_trait::async_trait;
use eyre::Result;
use keepstar_core::StateEngine;
use keepstar_core::app::domain::SessionId;
use std::sync::Arc;

use super::{Command, write_json};

/// Replays the log up to `step`. Read-only: the session is not modified.
pub struct ReconstructCommand {
    pub engine: Arc<StateEngine>,
    pub session_id: String,
    pub step: u64,
}

#[async_trait]
impl Command for ReconstructCommand {
    async fn execute(&self) -> Result<()> {
        let ctx = self.engine.context();
        let session_id = SessionId::from_string(self.session_id.as_str());
        let reconstruction = self
            .engine
            .reconstruct(&ctx, &session_id, self.step)
            .await?;
        write_json(&reconstruction)
    }
}
