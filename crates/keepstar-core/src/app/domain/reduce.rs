use crate::app::domain::delta::{Delta, DeltaType};
use crate::app::domain::state::SessionState;

/// Apply one committed delta to a replayed state.
///
/// Deltas carry summaries, not rows, so the Data zone and the conversation
/// buffer are never touched here. Meta, Template, View and the stack are.
pub fn apply_delta_to_state(state: &mut SessionState, delta: &Delta) {
    state.step = delta.step;
    state.updated_at = delta.created_at;

    match delta.delta_type {
        DeltaType::Add | DeltaType::Update | DeltaType::Remove => {
            state.current.meta.absorb(&delta.result);
            if let Some(template) = &delta.template {
                state.current.template = Some(template.clone());
            }
        }
        DeltaType::Rollback => {
            state.current.meta = delta.result.clone();
            state.current.template = delta.template.clone();
        }
        DeltaType::Push | DeltaType::Pop => {
            if let Some(template) = &delta.template {
                state.current.template = Some(template.clone());
            }
        }
    }

    if let Some(change) = &delta.view {
        state.view = change.view.clone();
        state.view_stack = change.stack.clone();
    }
}

/// Replay `deltas` in order on top of `base`.
pub fn replay<'a>(mut base: SessionState, deltas: impl IntoIterator<Item = &'a Delta>) -> SessionState {
    for delta in deltas {
        apply_delta_to_state(&mut base, delta);
    }
    base
}
