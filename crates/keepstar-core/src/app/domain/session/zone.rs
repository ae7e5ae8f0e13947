//! Zone mutations shared by every store adapter.
//!
//! Each function mutates a loaded state in place and returns the unsequenced
//! delta describing the change. Adapters run them inside their atomic unit and
//! then call [`seal`] with the step they assigned.

use crate::app::domain::delta::{Delta, DeltaInfo, ViewChange, paths};
use crate::app::domain::state::{
    SessionState, StateData, StateMeta, Template, ViewSnapshot, ViewState,
};
use crate::app::domain::types::Step;

pub(crate) fn data_path(data: &StateData) -> &'static str {
    if data.products.is_empty() && !data.services.is_empty() {
        paths::DATA_SERVICES
    } else {
        paths::DATA_PRODUCTS
    }
}

pub(crate) fn write_data(
    state: &mut SessionState,
    data: StateData,
    meta: StateMeta,
    info: DeltaInfo,
) -> Delta {
    let delta = info.into_delta(data_path(&data), meta.clone());
    state.current.data = data;
    state.current.meta = meta;
    delta
}

pub(crate) fn write_template(state: &mut SessionState, template: Template, info: DeltaInfo) -> Delta {
    let delta = info
        .into_delta(paths::TEMPLATE, state.current.meta.clone())
        .with_template(Some(template.clone()));
    state.current.template = Some(template);
    delta
}

pub(crate) fn write_view(
    state: &mut SessionState,
    view: ViewState,
    stack: Vec<ViewSnapshot>,
    info: DeltaInfo,
) -> Delta {
    let delta = info
        .into_delta(paths::VIEW, state.current.meta.clone())
        .with_view(ViewChange {
            view: view.clone(),
            stack: stack.clone(),
        });
    state.view = view;
    state.view_stack = stack;
    delta
}

/// Stamp the assigned step on both halves of a zone write.
pub(crate) fn seal(state: &mut SessionState, delta: &mut Delta, step: Step) {
    delta.step = step;
    state.step = step;
    state.updated_at = chrono::Utc::now();
}
