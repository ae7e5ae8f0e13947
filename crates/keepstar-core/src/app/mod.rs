pub mod context;
pub mod domain;
pub mod engine;
pub mod error;
pub mod navigation;
pub mod reconstruct;
pub mod rollback;

pub use context::CallContext;
pub use engine::StateEngine;
pub use error::{StateError, StateResult};
pub use navigation::{BackResponse, ExpandResponse, Navigator};
pub use reconstruct::{Reconstruction, Reconstructor};
pub use rollback::{RollbackEngine, RollbackRequest, RollbackResponse};
