pub mod dto;
pub mod repo;
pub mod repo_types;

pub use repo::{NotionClient, RecordStore};
pub use repo_types::MealRecord;
