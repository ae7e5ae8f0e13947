//! Fixtures shared by unit tests, integration tests and the debug CLI.

use crate::app::domain::delta::{
    ActionType, DeltaAction, DeltaInfo, DeltaSource, DeltaType, Trigger,
};
use crate::app::domain::entity::Product;
use crate::app::domain::session::{StateStore, StateStoreError};
use crate::app::domain::state::{StateData, StateMeta};
use crate::app::domain::types::SessionId;

pub const SEED_ACTOR: &str = "debug_seed";

pub const SEED_FIELDS: [&str; 11] = [
    "id",
    "name",
    "price",
    "images",
    "rating",
    "brand",
    "category",
    "description",
    "tags",
    "attributes",
    "stockQuantity",
];

fn product(
    id: &str,
    name: &str,
    price: i64,
    rating: f64,
    stock_quantity: i64,
    brand: &str,
    description: &str,
) -> Product {
    Product {
        id: id.to_string(),
        tenant_id: String::new(),
        name: name.to_string(),
        description: description.to_string(),
        price,
        currency: "$".to_string(),
        images: vec![format!("https://images.keepstar.dev/{id}.jpg")],
        rating,
        stock_quantity,
        brand: brand.to_string(),
        category: "Sneakers".to_string(),
        tags: vec!["sneakers".to_string()],
        attributes: serde_json::Map::new(),
    }
}

/// Four sneakers, `prod-1` through `prod-4`.
pub fn seed_products() -> Vec<Product> {
    vec![
        product(
            "prod-1",
            "Nike Air Max 90",
            12990,
            4.5,
            15,
            "Nike",
            "Iconic runner with visible Air cushioning.",
        ),
        product(
            "prod-2",
            "Nike Air Force 1 '07",
            9990,
            4.8,
            23,
            "Nike",
            "Basketball classic in crisp leather.",
        ),
        product(
            "prod-3",
            "Nike Dunk Low",
            10990,
            4.7,
            8,
            "Nike",
            "Low-top court shoe with a padded collar.",
        ),
        product(
            "prod-4",
            "Nike Air Jordan 1 Retro High OG",
            17990,
            4.9,
            5,
            "Jordan",
            "The original high-top, retro colourway.",
        ),
    ]
}

pub fn seed_data() -> StateData {
    StateData::with_products(seed_products())
}

pub fn seed_meta() -> StateMeta {
    StateMeta::new(4, SEED_FIELDS.iter().map(|f| f.to_string()).collect())
        .with_alias("tenant", "nike")
}

pub fn seed_delta_info() -> DeltaInfo {
    DeltaInfo::new(
        Trigger::System,
        DeltaSource::System,
        SEED_ACTOR,
        DeltaType::Add,
        DeltaAction::new(ActionType::Search).with_tool(SEED_ACTOR),
    )
}

/// Create a fresh session holding the seed products at step 1, grid view.
pub async fn seed_session(store: &dyn StateStore) -> Result<SessionId, StateStoreError> {
    let session_id = SessionId::new();
    store.create_state(&session_id).await?;
    store
        .update_data(&session_id, seed_data(), seed_meta(), seed_delta_info())
        .await?;
    Ok(session_id)
}
