//! Business logic services.

pub mod items;

pub use items::ItemService;
