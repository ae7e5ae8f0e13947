use async_trait::async_trait;
use eyre::Result;
use keepstar_core::StateEngine;
use keepstar_core::app::RollbackRequest;
use keepstar_core::app::domain::{DeltaSource, SessionId};
use std::io::Write;
use std::sync::Arc;

use super::Command;

pub const ROLLBACK_ACTOR: &str = "debug_rollback";

pub struct RollbackCommand {
    pub engine: Arc<StateEngine>,
    pub session_id: String,
    pub to_step: u64,
}

#[async_trait]
impl Command for RollbackCommand {
    async fn execute(&self) -> Result<()> {
        let ctx = self.engine.context();
        let session_id = SessionId::from_string(self.session_id.as_str());
        let request = RollbackRequest::to(self.to_step).by(DeltaSource::User, ROLLBACK_ACTOR);
        let response = self.engine.rollback(&ctx, &session_id, request).await?;

        let mut stdout = std::io::stdout();
        writeln!(
            stdout,
            "Rolled back {} steps ({} -> {}), now at step {}",
            response.rolled_back, response.from_step, response.to_step, response.state.step
        )?;
        Ok(())
    }
}
