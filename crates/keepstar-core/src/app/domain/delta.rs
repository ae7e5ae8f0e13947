//! Delta records: one immutable entry per committed mutation.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::state::{StateMeta, Template, ViewSnapshot, ViewState};
use super::types::{Step, Timestamp, TurnId};

/// Zone paths recorded on deltas.
pub mod paths {
    pub const DATA_PRODUCTS: &str = "data.products";
    pub const DATA_SERVICES: &str = "data.services";
    pub const TEMPLATE: &str = "template";
    pub const VIEW: &str = "view";
    pub const STATE: &str = "state";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Trigger {
    UserQuery,
    WidgetAction,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DeltaSource {
    User,
    Llm,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DeltaType {
    Add,
    Remove,
    Update,
    Push,
    Pop,
    Rollback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    Search,
    Filter,
    Sort,
    Layout,
    Navigate,
    Rollback,
}

/// What caused a change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaAction {
    #[serde(rename = "type")]
    pub action_type: ActionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub params: serde_json::Map<String, serde_json::Value>,
}

impl DeltaAction {
    pub fn new(action_type: ActionType) -> Self {
        Self {
            action_type,
            tool: None,
            params: serde_json::Map::new(),
        }
    }

    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = Some(tool.into());
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

/// View zone and stack as they stand after a view write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewChange {
    pub view: ViewState,
    #[serde(default)]
    pub stack: Vec<ViewSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Delta {
    /// Assigned by the store at commit time. Whatever the caller puts here is ignored.
    pub step: Step,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turn_id: Option<TurnId>,
    pub trigger: Trigger,
    pub source: DeltaSource,
    pub actor_id: String,
    pub delta_type: DeltaType,
    pub path: String,
    pub action: DeltaAction,
    #[serde(default)]
    pub result: StateMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<Template>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view: Option<ViewChange>,
    pub created_at: Timestamp,
}

/// Caller-supplied half of a delta. The store fills in the rest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turn_id: Option<TurnId>,
    pub trigger: Trigger,
    pub source: DeltaSource,
    pub actor_id: String,
    pub delta_type: DeltaType,
    pub action: DeltaAction,
}

impl DeltaInfo {
    pub fn new(
        trigger: Trigger,
        source: DeltaSource,
        actor_id: impl Into<String>,
        delta_type: DeltaType,
        action: DeltaAction,
    ) -> Self {
        Self {
            turn_id: None,
            trigger,
            source,
            actor_id: actor_id.into(),
            delta_type,
            action,
        }
    }

    pub fn with_turn(mut self, turn_id: TurnId) -> Self {
        self.turn_id = Some(turn_id);
        self
    }

    /// Build an unsequenced delta for `path`. Step is left at zero for the store to assign.
    pub fn into_delta(self, path: &str, result: StateMeta) -> Delta {
        Delta {
            step: 0,
            turn_id: self.turn_id,
            trigger: self.trigger,
            source: self.source,
            actor_id: self.actor_id,
            delta_type: self.delta_type,
            path: path.to_string(),
            action: self.action,
            result,
            template: None,
            view: None,
            created_at: chrono::Utc::now(),
        }
    }
}

impl Delta {
    pub fn with_template(mut self, template: Option<Template>) -> Self {
        self.template = template;
        self
    }

    pub fn with_view(mut self, view: ViewChange) -> Self {
        self.view = Some(view);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::str::FromStr;

    #[test]
    fn enums_use_wire_spelling() {
        assert_eq!(serde_json::to_value(Trigger::UserQuery).unwrap(), "USER_QUERY");
        assert_eq!(serde_json::to_value(DeltaSource::Llm).unwrap(), "llm");
        assert_eq!(serde_json::to_value(DeltaType::Rollback).unwrap(), "rollback");
        assert_eq!(ActionType::from_str("NAVIGATE").unwrap(), ActionType::Navigate);
        assert_eq!(Trigger::WidgetAction.to_string(), "WIDGET_ACTION");
    }

    #[test]
    fn rollback_action_carries_params() {
        let action = DeltaAction::new(ActionType::Rollback)
            .with_param("from_step", 5)
            .with_param("to_step", 2);
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(
            json,
            json!({"type": "ROLLBACK", "params": {"from_step": 5, "to_step": 2}})
        );
    }

    #[test]
    fn into_delta_leaves_step_unassigned() {
        let delta = DeltaInfo::new(
            Trigger::UserQuery,
            DeltaSource::Llm,
            "agent1",
            DeltaType::Add,
            DeltaAction::new(ActionType::Search).with_tool("catalog_search"),
        )
        .with_turn(TurnId::from_string("turn-1"))
        .into_delta(paths::DATA_PRODUCTS, StateMeta::new(4, vec!["id".into()]));

        assert_eq!(delta.step, 0);
        assert_eq!(delta.path, "data.products");
        assert_eq!(delta.result.count, 4);
        assert!(delta.template.is_none());
        assert!(delta.view.is_none());
    }
}
