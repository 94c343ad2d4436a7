pub mod dto;
mod parse;
mod prompt;
pub mod services;

pub use dto::NutritionEstimate;
pub use services::{OpenAiAnalyzer, VisionAnalyzer};
