use async_trait::async_trait;
use eyre::Result;
use keepstar_core::StateEngine;
use keepstar_core::app::domain::SessionId;
use std::sync::Arc;

use super::{Command, write_json};

pub struct ShowCommand {
    pub engine: Arc<StateEngine>,
    pub session_id: String,
}

#[async_trait]
impl Command for ShowCommand {
    async fn execute(&self) -> Result<()> {
        let ctx = self.engine.context();
        let session_id = SessionId::from_string(self.session_id.as_str());
        let state = self.engine.get_state(&ctx, &session_id).await?;
        write_json(&state)
    }
}
