//! Template construction for navigation.
//!
//! Rendering presets live outside the engine. Navigation only needs something
//! that turns the Data zone into a Template value, which is what
//! [`TemplateBuilder`] abstracts.

use serde_json::{Value, json};
use strum::{Display, EnumString};

use super::entity::EntityView;
use super::state::{LayoutMode, StateData, Template, ViewMode};
use super::types::EntityType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum PresetName {
    ProductGrid,
    ProductDetail,
    ServiceCard,
    ServiceDetail,
}

impl PresetName {
    pub fn detail_for(entity_type: EntityType) -> Self {
        match entity_type {
            EntityType::Product => PresetName::ProductDetail,
            EntityType::Service => PresetName::ServiceDetail,
        }
    }
}

pub trait TemplateBuilder: Send + Sync {
    /// Single-widget detail formation for one focused entity.
    fn detail(&self, entity: EntityView<'_>) -> Template;

    /// Collection formation for whatever the Data zone currently holds.
    fn browse(&self, data: &StateData, layout: LayoutMode) -> Template;
}

/// Emits `{formation: {mode, preset, widgets: [{template, entityRef, title}]}}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PresetTemplateBuilder;

impl PresetTemplateBuilder {
    fn formation(mode: ViewMode, preset: Option<PresetName>, widgets: Vec<Value>) -> Template {
        let mut formation = serde_json::Map::new();
        formation.insert("mode".to_string(), json!(mode.to_string()));
        if let Some(preset) = preset {
            formation.insert("preset".to_string(), json!(preset.to_string()));
        }
        formation.insert("widgets".to_string(), Value::Array(widgets));

        let mut template = Template::new();
        template.insert("formation".to_string(), Value::Object(formation));
        template
    }

    fn widget(preset: PresetName, entity: EntityView<'_>) -> Value {
        json!({
            "template": preset.to_string(),
            "entityRef": entity.entity_ref(),
            "title": entity.name(),
        })
    }
}

impl TemplateBuilder for PresetTemplateBuilder {
    fn detail(&self, entity: EntityView<'_>) -> Template {
        let preset = PresetName::detail_for(entity.entity_ref().entity_type);
        Self::formation(
            ViewMode::Detail,
            Some(preset),
            vec![Self::widget(preset, entity)],
        )
    }

    fn browse(&self, data: &StateData, layout: LayoutMode) -> Template {
        let mode = ViewMode::from(layout);
        match data.primary_kind() {
            Some(EntityType::Product) => {
                let preset = PresetName::ProductGrid;
                let widgets = data
                    .products
                    .iter()
                    .map(|p| Self::widget(preset, EntityView::Product(p)))
                    .collect();
                Self::formation(mode, Some(preset), widgets)
            }
            Some(EntityType::Service) => {
                let preset = PresetName::ServiceCard;
                let widgets = data
                    .services
                    .iter()
                    .map(|s| Self::widget(preset, EntityView::Service(s)))
                    .collect();
                Self::formation(mode, Some(preset), widgets)
            }
            None => Self::formation(mode, None, Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::domain::entity::{Product, Service};

    #[test]
    fn detail_formation_has_one_widget() {
        let product = Product {
            id: "prod-1".into(),
            name: "Nike Air Max 90".into(),
            ..Default::default()
        };
        let template = PresetTemplateBuilder.detail(EntityView::Product(&product));
        let formation = &template["formation"];
        assert_eq!(formation["mode"], "detail");
        assert_eq!(formation["preset"], "product_detail");
        assert_eq!(formation["widgets"].as_array().map(Vec::len), Some(1));
        assert_eq!(formation["widgets"][0]["entityRef"]["id"], "prod-1");
    }

    #[test]
    fn browse_prefers_products_over_services() {
        let data = StateData {
            products: vec![Product {
                id: "p".into(),
                ..Default::default()
            }],
            services: vec![Service {
                id: "s".into(),
                ..Default::default()
            }],
        };
        let template = PresetTemplateBuilder.browse(&data, LayoutMode::Grid);
        assert_eq!(template["formation"]["preset"], "product_grid");
        assert_eq!(template["formation"]["widgets"].as_array().map(Vec::len), Some(1));
    }

    #[test]
    fn browse_services_uses_card_preset() {
        let data = StateData::with_services(vec![Service {
            id: "s".into(),
            ..Default::default()
        }]);
        let template = PresetTemplateBuilder.browse(&data, LayoutMode::List);
        assert_eq!(template["formation"]["preset"], "service_card");
        assert_eq!(template["formation"]["mode"], "list");
    }

    #[test]
    fn browse_empty_data_yields_empty_grid() {
        let template = PresetTemplateBuilder.browse(&StateData::default(), LayoutMode::Grid);
        assert_eq!(template["formation"]["mode"], "grid");
        assert!(template["formation"].get("preset").is_none());
        assert_eq!(template["formation"]["widgets"], json!([]));
    }
}
