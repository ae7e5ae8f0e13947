use async_trait::async_trait;
use chrono::Local;
use comfy_table::{Cell, Color, Table};
use eyre::Result;
use keepstar_core::StateEngine;
use std::io::Write;
use std::sync::Arc;

use super::Command;

pub struct SessionsCommand {
    pub engine: Arc<StateEngine>,
}

#[async_trait]
impl Command for SessionsCommand {
    async fn execute(&self) -> Result<()> {
        let ctx = self.engine.context();
        let sessions = self.engine.list_sessions(&ctx).await?;

        let mut stdout = std::io::stdout();
        if sessions.is_empty() {
            writeln!(stdout, "No sessions found.")?;
            return Ok(());
        }

        let mut table = Table::new();
        table.set_header(vec![
            Cell::new("Session").fg(Color::Green),
            Cell::new("Step").fg(Color::Green),
            Cell::new("Created").fg(Color::Green),
            Cell::new("Updated").fg(Color::Green),
        ]);
        for session in sessions {
            table.add_row(vec![
                Cell::new(&session.session_id),
                Cell::new(session.step),
                Cell::new(
                    session
                        .created_at
                        .with_timezone(&Local)
                        .format("%Y-%m-%d %H:%M:%S"),
                ),
                Cell::new(
                    session
                        .updated_at
                        .with_timezone(&Local)
                        .format("%Y-%m-%d %H:%M:%S"),
                ),
            ]);
        }
        writeln!(stdout, "{table}")?;
        Ok(())
    }
}
