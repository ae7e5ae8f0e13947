use async_trait::async_trait;
use eyre::Result;
use keepstar_core::StateEngine;
use keepstar_core::app::domain::SessionId;
use std::sync::Arc;

use super::{Command, write_json};

pub struct BackCommand {
    pub engine: Arc<StateEngine>,
    pub session_id: String,
}

#[async_trait]
impl Command for BackCommand {
    async fn execute(&self) -> Result<()> {
        let ctx = self.engine.context();
        let session_id = SessionId::from_string(self.session_id.as_str());
        let response = self.engine.back(&ctx, &session_id, None).await?;
        write_json(&response)
    }
}
