mod image;
pub mod render;
pub mod score;

pub use render::ReportRenderer;
