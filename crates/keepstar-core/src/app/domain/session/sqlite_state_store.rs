use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::{
    Row, SqliteConnection,
    sqlite::{
        SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
        SqliteSynchronous,
    },
};
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

use super::state_store::{SessionSummary, StateStore, StateStoreError};
use super::zone;
use crate::app::domain::conversation::ConversationMessage;
use crate::app::domain::delta::{Delta, DeltaInfo};
use crate::app::domain::state::{
    SessionState, StateCurrent, StateData, StateMeta, Template, ViewSnapshot, ViewState,
};
use crate::app::domain::types::{SessionId, Step, TurnId};

const STATE_COLUMNS: &str = "id, current_data, current_meta, current_template, view_state, view_stack, \
     conversation_history, step, created_at, updated_at";

const DELTA_COLUMNS: &str = "step, turn_id, delta_trigger, source, actor_id, delta_type, path, \
     delta_action, result, template, view_change, created_at";

pub struct SqliteStateStore {
    pool: SqlitePool,
}

impl SqliteStateStore {
    pub async fn new(path: &Path) -> Result<Self, StateStoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StateStoreError::connection(format!("Failed to create directory: {e}"))
            })?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path.display()))
            .map_err(|e| StateStoreError::connection(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        Self::connect(options).await
    }

    pub async fn new_in_memory() -> Result<Self, StateStoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StateStoreError::connection(format!("Invalid SQLite path: {e}")))?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        Self::connect(options).await
    }

    // A single connection serializes every transaction, which is what gives
    // per-session ordering of step assignment.
    async fn connect(options: SqliteConnectOptions) -> Result<Self, StateStoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| {
                StateStoreError::connection(format!("Failed to connect to SQLite: {e}"))
            })?;

        let store = Self { pool };
        store.run_migrations().await?;

        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StateStoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS session_state (
                session_id TEXT PRIMARY KEY,
                id TEXT NOT NULL,
                current_data TEXT NOT NULL,
                current_meta TEXT NOT NULL,
                current_template TEXT,
                view_state TEXT NOT NULL,
                view_stack TEXT NOT NULL,
                conversation_history TEXT NOT NULL,
                step INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StateStoreError::Migration {
            message: format!("Failed to create state table: {e}"),
        })?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS session_deltas (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                step INTEGER NOT NULL,
                turn_id TEXT,
                delta_trigger TEXT NOT NULL,
                source TEXT NOT NULL,
                actor_id TEXT NOT NULL,
                delta_type TEXT NOT NULL,
                path TEXT NOT NULL,
                delta_action TEXT NOT NULL,
                result TEXT NOT NULL,
                template TEXT,
                view_change TEXT,
                created_at TEXT NOT NULL,
                FOREIGN KEY (session_id) REFERENCES session_state(session_id) ON DELETE CASCADE,
                UNIQUE(session_id, step)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StateStoreError::Migration {
            message: format!("Failed to create deltas table: {e}"),
        })?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_session_deltas_session_step
            ON session_deltas(session_id, step)
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StateStoreError::Migration {
            message: format!("Failed to create index: {e}"),
        })?;

        Ok(())
    }

    async fn begin(&self) -> Result<sqlx::Transaction<'_, sqlx::Sqlite>, StateStoreError> {
        self.pool
            .begin()
            .await
            .map_err(|e| StateStoreError::database(format!("Failed to begin transaction: {e}")))
    }

    /// Load, mutate, append the delta and write back, all in one transaction.
    /// Dropping the returned future before it resolves rolls everything back.
    async fn commit<F>(&self, session_id: &SessionId, mutate: F) -> Result<Step, StateStoreError>
    where
        F: FnOnce(&mut SessionState) -> Delta + Send,
    {
        let mut tx = self.begin().await?;

        let mut state = fetch_state(&mut *tx, session_id)
            .await?
            .ok_or_else(|| StateStoreError::session_not_found(session_id))?;
        let step = next_step(&mut *tx, session_id).await?;

        let mut delta = mutate(&mut state);
        zone::seal(&mut state, &mut delta, step);

        write_state(&mut *tx, &state).await?;
        insert_delta(&mut *tx, session_id, &delta).await?;

        tx.commit()
            .await
            .map_err(|e| StateStoreError::database(format!("Failed to commit: {e}")))?;

        debug!(session_id = %session_id, step, path = %delta.path, delta_type = %delta.delta_type, "Committed zone write");
        Ok(step)
    }

    /// Read-modify-write of the state row without touching the delta log.
    async fn modify<T, F>(&self, session_id: &SessionId, f: F) -> Result<T, StateStoreError>
    where
        F: FnOnce(&mut SessionState) -> T + Send,
        T: Send,
    {
        let mut tx = self.begin().await?;
        let mut state = fetch_state(&mut *tx, session_id)
            .await?
            .ok_or_else(|| StateStoreError::session_not_found(session_id))?;
        let out = f(&mut state);
        write_state(&mut *tx, &state).await?;
        tx.commit()
            .await
            .map_err(|e| StateStoreError::database(format!("Failed to commit: {e}")))?;
        Ok(out)
    }

    async fn query_deltas(
        &self,
        session_id: &SessionId,
        filter: &str,
        bound: Option<Step>,
    ) -> Result<Vec<Delta>, StateStoreError> {
        let sql = format!(
            "SELECT {DELTA_COLUMNS} FROM session_deltas WHERE session_id = ?1 {filter} ORDER BY step ASC"
        );
        let mut query = sqlx::query(&sql).bind(session_id.as_str());
        if let Some(bound) = bound {
            query = query.bind(bound as i64);
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StateStoreError::database(format!("Failed to load deltas: {e}")))?;

        rows.iter().map(delta_from_row).collect()
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T, what: &str) -> Result<String, StateStoreError> {
    serde_json::to_string(value)
        .map_err(|e| StateStoreError::serialization(format!("Failed to serialize {what}: {e}")))
}

fn from_json<T: DeserializeOwned>(text: &str, what: &str) -> Result<T, StateStoreError> {
    serde_json::from_str(text)
        .map_err(|e| StateStoreError::serialization(format!("Invalid {what}: {e}")))
}

fn column<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T, StateStoreError>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(name)
        .map_err(|e| StateStoreError::database(format!("Failed to read column {name}: {e}")))
}

fn parse_enum<T: FromStr>(text: &str, what: &str) -> Result<T, StateStoreError> {
    T::from_str(text).map_err(|_| StateStoreError::serialization(format!("Invalid {what}: {text}")))
}

async fn fetch_state(
    conn: &mut SqliteConnection,
    session_id: &SessionId,
) -> Result<Option<SessionState>, StateStoreError> {
    let sql = format!("SELECT {STATE_COLUMNS} FROM session_state WHERE session_id = ?1");
    let row = sqlx::query(&sql)
        .bind(session_id.as_str())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| StateStoreError::database(format!("Failed to load state: {e}")))?;

    let Some(row) = row else {
        return Ok(None);
    };

    let template: Option<String> = column(&row, "current_template")?;
    let template: Option<Template> = template
        .map(|t| from_json(&t, "template"))
        .transpose()?;
    let view: String = column(&row, "view_state")?;
    let view: ViewState = from_json(&view, "view")
        .map_err(|e| StateStoreError::InvalidView {
            message: e.to_string(),
        })?;
    let step: i64 = column(&row, "step")?;

    Ok(Some(SessionState {
        id: column(&row, "id")?,
        session_id: session_id.clone(),
        current: StateCurrent {
            data: from_json(&column::<String>(&row, "current_data")?, "data")?,
            meta: from_json(&column::<String>(&row, "current_meta")?, "meta")?,
            template,
        },
        view,
        view_stack: from_json(&column::<String>(&row, "view_stack")?, "view stack")?,
        conversation_history: from_json(
            &column::<String>(&row, "conversation_history")?,
            "conversation history",
        )?,
        step: step as Step,
        created_at: column::<DateTime<Utc>>(&row, "created_at")?,
        updated_at: column::<DateTime<Utc>>(&row, "updated_at")?,
    }))
}

async fn write_state(
    conn: &mut SqliteConnection,
    state: &SessionState,
) -> Result<(), StateStoreError> {
    let template = state
        .current
        .template
        .as_ref()
        .map(|t| to_json(t, "template"))
        .transpose()?;

    let result = sqlx::query(
        r#"
        UPDATE session_state
        SET id = ?2, current_data = ?3, current_meta = ?4, current_template = ?5,
            view_state = ?6, view_stack = ?7, conversation_history = ?8, step = ?9,
            updated_at = ?10
        WHERE session_id = ?1
        "#,
    )
    .bind(state.session_id.as_str())
    .bind(&state.id)
    .bind(to_json(&state.current.data, "data")?)
    .bind(to_json(&state.current.meta, "meta")?)
    .bind(template)
    .bind(to_json(&state.view, "view")?)
    .bind(to_json(&state.view_stack, "view stack")?)
    .bind(to_json(&state.conversation_history, "conversation history")?)
    .bind(state.step as i64)
    .bind(state.updated_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| StateStoreError::database(format!("Failed to write state: {e}")))?;

    if result.rows_affected() == 0 {
        return Err(StateStoreError::session_not_found(&state.session_id));
    }
    Ok(())
}

async fn next_step(
    conn: &mut SqliteConnection,
    session_id: &SessionId,
) -> Result<Step, StateStoreError> {
    let next: i64 = sqlx::query_scalar(
        "SELECT COALESCE(MAX(step), 0) + 1 FROM session_deltas WHERE session_id = ?1",
    )
    .bind(session_id.as_str())
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| StateStoreError::database(format!("Failed to get next step: {e}")))?;
    Ok(next as Step)
}

async fn insert_delta(
    conn: &mut SqliteConnection,
    session_id: &SessionId,
    delta: &Delta,
) -> Result<(), StateStoreError> {
    let template = delta
        .template
        .as_ref()
        .map(|t| to_json(t, "template"))
        .transpose()?;
    let view = delta
        .view
        .as_ref()
        .map(|v| to_json(v, "view change"))
        .transpose()?;

    sqlx::query(
        r#"
        INSERT INTO session_deltas
            (session_id, step, turn_id, delta_trigger, source, actor_id, delta_type, path,
             delta_action, result, template, view_change, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
        "#,
    )
    .bind(session_id.as_str())
    .bind(delta.step as i64)
    .bind(delta.turn_id.as_ref().map(|t| t.0.clone()))
    .bind(delta.trigger.to_string())
    .bind(delta.source.to_string())
    .bind(&delta.actor_id)
    .bind(delta.delta_type.to_string())
    .bind(&delta.path)
    .bind(to_json(&delta.action, "action")?)
    .bind(to_json(&delta.result, "result")?)
    .bind(template)
    .bind(view)
    .bind(delta.created_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StateStoreError::write_conflict(session_id, delta.step)
        }
        other => StateStoreError::database(format!("Failed to append delta: {other}")),
    })?;

    Ok(())
}

fn delta_from_row(row: &SqliteRow) -> Result<Delta, StateStoreError> {
    let step: i64 = column(row, "step")?;
    let turn_id: Option<String> = column(row, "turn_id")?;
    let template: Option<String> = column(row, "template")?;
    let view: Option<String> = column(row, "view_change")?;

    Ok(Delta {
        step: step as Step,
        turn_id: turn_id.map(TurnId::from_string),
        trigger: parse_enum(&column::<String>(row, "delta_trigger")?, "trigger")?,
        source: parse_enum(&column::<String>(row, "source")?, "source")?,
        actor_id: column(row, "actor_id")?,
        delta_type: parse_enum(&column::<String>(row, "delta_type")?, "delta type")?,
        path: column(row, "path")?,
        action: from_json(&column::<String>(row, "delta_action")?, "action")?,
        result: from_json(&column::<String>(row, "result")?, "result")?,
        template: template.map(|t| from_json(&t, "template")).transpose()?,
        view: view.map(|v| from_json(&v, "view change")).transpose()?,
        created_at: column::<DateTime<Utc>>(row, "created_at")?,
    })
}

#[async_trait]
impl StateStore for SqliteStateStore {
    async fn create_state(&self, session_id: &SessionId) -> Result<SessionState, StateStoreError> {
        let state = SessionState::new(session_id.clone());

        sqlx::query(
            r#"
            INSERT INTO session_state
                (session_id, id, current_data, current_meta, current_template, view_state,
                 view_stack, conversation_history, step, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, NULL, ?5, ?6, ?7, 0, ?8, ?9)
            "#,
        )
        .bind(session_id.as_str())
        .bind(&state.id)
        .bind(to_json(&state.current.data, "data")?)
        .bind(to_json(&state.current.meta, "meta")?)
        .bind(to_json(&state.view, "view")?)
        .bind(to_json(&state.view_stack, "view stack")?)
        .bind(to_json(&state.conversation_history, "conversation history")?)
        .bind(state.created_at)
        .bind(state.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StateStoreError::already_exists(session_id)
            }
            other => StateStoreError::database(format!("Failed to create state: {other}")),
        })?;

        Ok(state)
    }

    async fn get_state(&self, session_id: &SessionId) -> Result<SessionState, StateStoreError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| StateStoreError::connection(format!("Failed to acquire connection: {e}")))?;
        fetch_state(&mut *conn, session_id)
            .await?
            .ok_or_else(|| StateStoreError::session_not_found(session_id))
    }

    async fn update_state(&self, state: &SessionState) -> Result<(), StateStoreError> {
        let session_id = &state.session_id;
        let mut tx = self.begin().await?;

        if fetch_state(&mut *tx, session_id).await?.is_none() {
            return Err(StateStoreError::session_not_found(session_id));
        }
        let head = next_step(&mut *tx, session_id).await? - 1;
        if state.step != head {
            return Err(StateStoreError::write_conflict(session_id, head));
        }
        write_state(&mut *tx, state).await?;

        tx.commit()
            .await
            .map_err(|e| StateStoreError::database(format!("Failed to commit: {e}")))?;
        Ok(())
    }

    async fn restore_state(
        &self,
        state: &SessionState,
        delta: Delta,
        expected_step: Step,
    ) -> Result<Step, StateStoreError> {
        let session_id = &state.session_id;
        let mut tx = self.begin().await?;

        let current = fetch_state(&mut *tx, session_id)
            .await?
            .ok_or_else(|| StateStoreError::session_not_found(session_id))?;
        if current.step != expected_step {
            return Err(StateStoreError::write_conflict(session_id, current.step));
        }

        let step = next_step(&mut *tx, session_id).await?;
        let mut next = state.clone();
        let mut delta = delta;
        zone::seal(&mut next, &mut delta, step);

        insert_delta(&mut *tx, session_id, &delta).await?;
        write_state(&mut *tx, &next).await?;

        tx.commit()
            .await
            .map_err(|e| StateStoreError::database(format!("Failed to commit: {e}")))?;
        Ok(step)
    }

    async fn delete_state(&self, session_id: &SessionId) -> Result<(), StateStoreError> {
        let mut tx = self.begin().await?;

        sqlx::query("DELETE FROM session_deltas WHERE session_id = ?1")
            .bind(session_id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| StateStoreError::database(format!("Failed to delete deltas: {e}")))?;

        sqlx::query("DELETE FROM session_state WHERE session_id = ?1")
            .bind(session_id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| StateStoreError::database(format!("Failed to delete state: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| StateStoreError::database(format!("Failed to commit: {e}")))?;
        Ok(())
    }

    async fn list_sessions(&self) -> Result<Vec<SessionSummary>, StateStoreError> {
        let rows = sqlx::query(
            "SELECT session_id, step, created_at, updated_at FROM session_state ORDER BY updated_at DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StateStoreError::database(format!("Failed to list sessions: {e}")))?;

        rows.iter()
            .map(|row| {
                let step: i64 = column(row, "step")?;
                Ok(SessionSummary {
                    session_id: SessionId::from_string(column::<String>(row, "session_id")?),
                    step: step as Step,
                    created_at: column(row, "created_at")?,
                    updated_at: column(row, "updated_at")?,
                })
            })
            .collect()
    }

    async fn update_data(
        &self,
        session_id: &SessionId,
        data: StateData,
        meta: StateMeta,
        info: DeltaInfo,
    ) -> Result<Step, StateStoreError> {
        self.commit(session_id, |state| zone::write_data(state, data, meta, info))
            .await
    }

    async fn update_template(
        &self,
        session_id: &SessionId,
        template: Template,
        info: DeltaInfo,
    ) -> Result<Step, StateStoreError> {
        self.commit(session_id, |state| {
            zone::write_template(state, template, info)
        })
        .await
    }

    async fn update_view(
        &self,
        session_id: &SessionId,
        view: ViewState,
        stack: Vec<ViewSnapshot>,
        info: DeltaInfo,
    ) -> Result<Step, StateStoreError> {
        self.commit(session_id, |state| {
            zone::write_view(state, view, stack, info)
        })
        .await
    }

    async fn append_conversation(
        &self,
        session_id: &SessionId,
        messages: Vec<ConversationMessage>,
    ) -> Result<(), StateStoreError> {
        self.modify(session_id, |state| {
            state.conversation_history.extend(messages);
        })
        .await
    }

    async fn add_delta(
        &self,
        session_id: &SessionId,
        delta: Delta,
    ) -> Result<Step, StateStoreError> {
        self.commit(session_id, |_| delta).await
    }

    async fn get_deltas(&self, session_id: &SessionId) -> Result<Vec<Delta>, StateStoreError> {
        self.query_deltas(session_id, "", None).await
    }

    async fn get_deltas_since(
        &self,
        session_id: &SessionId,
        from_step: Step,
    ) -> Result<Vec<Delta>, StateStoreError> {
        self.query_deltas(session_id, "AND step >= ?2", Some(from_step))
            .await
    }

    async fn get_deltas_until(
        &self,
        session_id: &SessionId,
        to_step: Step,
    ) -> Result<Vec<Delta>, StateStoreError> {
        self.query_deltas(session_id, "AND step <= ?2", Some(to_step))
            .await
    }

    async fn push_view(
        &self,
        session_id: &SessionId,
        snapshot: ViewSnapshot,
    ) -> Result<(), StateStoreError> {
        self.modify(session_id, |state| state.view_stack.push(snapshot))
            .await
    }

    async fn pop_view(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<ViewSnapshot>, StateStoreError> {
        self.modify(session_id, |state| state.view_stack.pop()).await
    }

    async fn get_view_stack(
        &self,
        session_id: &SessionId,
    ) -> Result<Vec<ViewSnapshot>, StateStoreError> {
        Ok(self.get_state(session_id).await?.view_stack)
    }
}
