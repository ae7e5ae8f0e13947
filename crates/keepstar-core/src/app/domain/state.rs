use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::{Display, EnumString};

use super::conversation::ConversationMessage;
use super::entity::{EntityView, Product, Service};
use super::types::{EntityRef, EntityType, SessionId, Step, Timestamp};

/// Opaque, key-ordered JSON object describing the rendered UI.
pub type Template = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StateData {
    #[serde(default)]
    pub products: Vec<Product>,
    #[serde(default)]
    pub services: Vec<Service>,
}

impl StateData {
    pub fn with_products(products: Vec<Product>) -> Self {
        Self {
            products,
            services: Vec::new(),
        }
    }

    pub fn with_services(services: Vec<Service>) -> Self {
        Self {
            products: Vec::new(),
            services,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty() && self.services.is_empty()
    }

    pub fn len(&self) -> usize {
        self.products.len() + self.services.len()
    }

    /// Entity kind that dominates the zone. Products win when both are present.
    pub fn primary_kind(&self) -> Option<EntityType> {
        if !self.products.is_empty() {
            Some(EntityType::Product)
        } else if !self.services.is_empty() {
            Some(EntityType::Service)
        } else {
            None
        }
    }

    /// References to every entity in the zone, products first.
    pub fn refs(&self) -> Vec<EntityRef> {
        self.products
            .iter()
            .map(Product::entity_ref)
            .chain(self.services.iter().map(Service::entity_ref))
            .collect()
    }

    pub fn find(&self, entity: &EntityRef) -> Option<EntityView<'_>> {
        match entity.entity_type {
            EntityType::Product => self
                .products
                .iter()
                .find(|p| p.id == entity.id)
                .map(EntityView::Product),
            EntityType::Service => self
                .services
                .iter()
                .find(|s| s.id == entity.id)
                .map(EntityView::Service),
        }
    }
}

/// Summary of the Data zone. Deltas carry this instead of raw rows.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StateMeta {
    #[serde(default)]
    pub count: usize,
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub aliases: BTreeMap<String, String>,
}

impl StateMeta {
    pub fn new(count: usize, fields: Vec<String>) -> Self {
        Self {
            count,
            fields,
            aliases: BTreeMap::new(),
        }
    }

    pub fn with_alias(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.aliases.insert(key.into(), value.into());
        self
    }

    /// Overwrite count and fields, merge aliases.
    pub fn absorb(&mut self, other: &StateMeta) {
        self.count = other.count;
        self.fields = other.fields.clone();
        self.aliases
            .extend(other.aliases.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StateCurrent {
    #[serde(default)]
    pub data: StateData,
    #[serde(default)]
    pub meta: StateMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<Template>,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LayoutMode {
    #[default]
    Grid,
    List,
    Carousel,
}

/// Wire-level view mode, the union of layout modes and `detail`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ViewMode {
    Grid,
    List,
    Carousel,
    Detail,
}

impl From<LayoutMode> for ViewMode {
    fn from(mode: LayoutMode) -> Self {
        match mode {
            LayoutMode::Grid => ViewMode::Grid,
            LayoutMode::List => ViewMode::List,
            LayoutMode::Carousel => ViewMode::Carousel,
        }
    }
}

/// The View zone. `detail` always carries a focus, layouts never do.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawView", into = "RawView")]
pub enum ViewState {
    Browsing(LayoutMode),
    Detail(EntityRef),
}

impl Default for ViewState {
    fn default() -> Self {
        ViewState::Browsing(LayoutMode::Grid)
    }
}

impl ViewState {
    pub fn mode(&self) -> ViewMode {
        match self {
            ViewState::Browsing(layout) => (*layout).into(),
            ViewState::Detail(_) => ViewMode::Detail,
        }
    }

    pub fn focused(&self) -> Option<&EntityRef> {
        match self {
            ViewState::Browsing(_) => None,
            ViewState::Detail(entity) => Some(entity),
        }
    }

    pub fn is_detail(&self) -> bool {
        matches!(self, ViewState::Detail(_))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawView {
    mode: ViewMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    focused: Option<EntityRef>,
}

impl TryFrom<RawView> for ViewState {
    type Error = String;

    fn try_from(raw: RawView) -> Result<Self, Self::Error> {
        match (raw.mode, raw.focused) {
            (ViewMode::Detail, Some(entity)) => Ok(ViewState::Detail(entity)),
            (ViewMode::Detail, None) => Err("detail view requires a focused entity".to_string()),
            (mode, Some(_)) => Err(format!("{mode} view cannot carry a focused entity")),
            (ViewMode::Grid, None) => Ok(ViewState::Browsing(LayoutMode::Grid)),
            (ViewMode::List, None) => Ok(ViewState::Browsing(LayoutMode::List)),
            (ViewMode::Carousel, None) => Ok(ViewState::Browsing(LayoutMode::Carousel)),
        }
    }
}

impl From<ViewState> for RawView {
    fn from(view: ViewState) -> Self {
        RawView {
            mode: view.mode(),
            focused: view.focused().cloned(),
        }
    }
}

/// A prior View zone, captured for restoration by back navigation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewSnapshot {
    #[serde(flatten)]
    pub view: ViewState,
    #[serde(default)]
    pub refs: Vec<EntityRef>,
    pub step: Step,
    pub created_at: Timestamp,
}

impl ViewSnapshot {
    /// Snapshot of the view as it stands in `state`, with refs from its Data zone.
    pub fn capture(state: &SessionState) -> Self {
        Self {
            view: state.view.clone(),
            refs: state.current.data.refs(),
            step: state.step,
            created_at: chrono::Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub id: String,
    pub session_id: SessionId,
    #[serde(default)]
    pub current: StateCurrent,
    #[serde(default)]
    pub view: ViewState,
    #[serde(default)]
    pub view_stack: Vec<ViewSnapshot>,
    #[serde(default)]
    pub conversation_history: Vec<ConversationMessage>,
    pub step: Step,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl SessionState {
    /// Fresh state: empty zones, grid view, empty stack, step 0.
    pub fn new(session_id: SessionId) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            session_id,
            current: StateCurrent::default(),
            view: ViewState::default(),
            view_stack: Vec::new(),
            conversation_history: Vec::new(),
            step: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// The canonical empty state for this session, keeping its identity.
    pub fn empty_like(&self) -> Self {
        Self {
            id: self.id.clone(),
            session_id: self.session_id.clone(),
            current: StateCurrent::default(),
            view: ViewState::default(),
            view_stack: Vec::new(),
            conversation_history: Vec::new(),
            step: 0,
            created_at: self.created_at,
            updated_at: self.created_at,
        }
    }

    pub fn can_go_back(&self) -> bool {
        !self.view_stack.is_empty()
    }
}
