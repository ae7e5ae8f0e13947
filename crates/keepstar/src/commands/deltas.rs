use async_trait::async_trait;
use chrono::Local;
use comfy_table::{Cell, Color, Table};
use eyre::Result;
use keepstar_core::StateEngine;
use keepstar_core::app::domain::{Delta, SessionId};
use std::io::Write;
use std::sync::Arc;

use super::Command;

pub struct DeltasCommand {
    pub engine: Arc<StateEngine>,
    pub session_id: String,
    pub since: Option<u64>,
    pub until: Option<u64>,
}

#[async_trait]
impl Command for DeltasCommand {
    async fn execute(&self) -> Result<()> {
        let ctx = self.engine.context();
        let session_id = SessionId::from_string(self.session_id.as_str());

        let deltas = match (self.since, self.until) {
            (Some(from_step), _) => {
                self.engine
                    .get_deltas_since(&ctx, &session_id, from_step)
                    .await?
            }
            (None, Some(to_step)) => {
                self.engine
                    .get_deltas_until(&ctx, &session_id, to_step)
                    .await?
            }
            (None, None) => self.engine.get_deltas(&ctx, &session_id).await?,
        };

        let mut stdout = std::io::stdout();
        if deltas.is_empty() {
            writeln!(stdout, "No deltas found.")?;
            return Ok(());
        }
        writeln!(stdout, "{}", delta_table(&deltas))?;
        Ok(())
    }
}

fn delta_table(deltas: &[Delta]) -> Table {
    let mut table = Table::new();
    table.set_header(
        [
            "Step", "Type", "Path", "Trigger", "Source", "Actor", "Action", "Count", "Created",
        ]
        .into_iter()
        .map(|h| Cell::new(h).fg(Color::Green)),
    );

    for delta in deltas {
        let action = match &delta.action.tool {
            Some(tool) => format!("{} ({tool})", delta.action.action_type),
            None => delta.action.action_type.to_string(),
        };
        table.add_row(vec![
            Cell::new(delta.step),
            Cell::new(delta.delta_type),
            Cell::new(&delta.path),
            Cell::new(delta.trigger),
            Cell::new(delta.source),
            Cell::new(&delta.actor_id),
            Cell::new(action),
            Cell::new(delta.result.count),
            Cell::new(
                delta
                    .created_at
                    .with_timezone(&Local)
                    .format("%Y-%m-%d %H:%M:%S"),
            ),
        ]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use keepstar_core::app::domain::{
        ActionType, DeltaAction, DeltaInfo, DeltaSource, DeltaType, StateMeta, Trigger,
    };

    #[test]
    fn table_lists_one_row_per_delta() {
        let mut delta = DeltaInfo::new(
            Trigger::System,
            DeltaSource::System,
            "debug_seed",
            DeltaType::Add,
            DeltaAction::new(ActionType::Search).with_tool("debug_seed"),
        )
        .into_delta("data.products", StateMeta::new(4, vec![]));
        delta.step = 1;

        let rendered = delta_table(&[delta]).to_string();
        assert!(rendered.contains("data.products"));
        assert!(rendered.contains("SEARCH (debug_seed)"));
        assert!(rendered.contains("SYSTEM"));
        assert!(rendered.contains("add"));
    }
}
