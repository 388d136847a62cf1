//! Database models.

pub mod api_token;
pub mod item;

pub use api_token::{ApiToken, NewApiToken};
pub use item::{Item, ItemKind, NewItem};
