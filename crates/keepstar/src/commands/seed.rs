use async_trait::async_trait;
use eyre::Result;
use keepstar_core::StateEngine;
use keepstar_core::app::domain::{
    ActionType, DeltaAction, DeltaInfo, DeltaSource, DeltaType, LayoutMode, PresetTemplateBuilder,
    SessionId, TemplateBuilder, Trigger,
};
use keepstar_core::test_utils::{SEED_ACTOR, seed_data, seed_delta_info, seed_meta};
use std::io::Write;
use std::sync::Arc;
use tracing::info;

use super::Command;

pub struct SeedCommand {
    pub engine: Arc<StateEngine>,
    pub template: bool,
}

#[async_trait]
impl Command for SeedCommand {
    async fn execute(&self) -> Result<()> {
        let ctx = self.engine.context();
        let session_id = SessionId::new();

        self.engine.create_state(&ctx, &session_id).await?;
        let mut step = self
            .engine
            .update_data(&ctx, &session_id, seed_data(), seed_meta(), seed_delta_info())
            .await?;

        if self.template {
            let template = PresetTemplateBuilder.browse(&seed_data(), LayoutMode::Grid);
            let layout = DeltaInfo::new(
                Trigger::System,
                DeltaSource::System,
                SEED_ACTOR,
                DeltaType::Add,
                DeltaAction::new(ActionType::Layout).with_tool(SEED_ACTOR),
            );
            step = self
                .engine
                .update_template(&ctx, &session_id, template, layout)
                .await?;
        }
        info!(session_id = %session_id, step, "Seeded session");

        let mut stdout = std::io::stdout();
        writeln!(stdout, "{session_id}")?;
        Ok(())
    }
}
