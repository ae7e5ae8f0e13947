use async_trait::async_trait;
use eyre::Result;
use keepstar_core::StateEngine;
use keepstar_core::app::domain::{EntityRef, SessionId};
use std::sync::Arc;

use super::{Command, write_json};
use crate::cli::EntityKind;

pub struct ExpandCommand {
    pub engine: Arc<StateEngine>,
    pub session_id: String,
    pub kind: EntityKind,
    pub entity_id: String,
}

#[async_trait]
impl Command for ExpandCommand {
    async fn execute(&self) -> Result<()> {
        let ctx = self.engine.context();
        let session_id = SessionId::from_string(self.session_id.as_str());
        let entity = EntityRef::new(self.kind.into(), self.entity_id.as_str());
        let response = self.engine.expand(&ctx, &session_id, entity, None).await?;
        write_json(&response)
    }
}
