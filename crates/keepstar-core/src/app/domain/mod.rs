pub mod conversation;
pub mod delta;
pub mod entity;
pub mod formation;
pub mod reduce;
pub mod session;
pub mod state;
pub mod types;

#[cfg(test)]
mod tests;

pub use conversation::{ConversationMessage, Role, ToolCall, ToolResult};
pub use delta::{
    ActionType, Delta, DeltaAction, DeltaInfo, DeltaSource, DeltaType, Trigger, ViewChange,
};
pub use entity::{EntityView, Product, Service};
pub use formation::{PresetName, PresetTemplateBuilder, TemplateBuilder};
pub use reduce::{apply_delta_to_state, replay};
pub use state::{
    LayoutMode, SessionState, StateCurrent, StateData, StateMeta, Template, ViewMode,
    ViewSnapshot, ViewState,
};
pub use types::{EntityRef, EntityType, SessionId, Step, Timestamp, TurnId};
