use serde::{Deserialize, Serialize};

/// Parsed model output. Every numeric field is present and non-negative.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NutritionEstimate {
    pub food_name: String,
    pub calories: u32,
    pub protein_g: f64,
    pub carbs_g: f64,
    pub fat_g: f64,
    /// Always within 0..=100.
    pub score: u8,
    pub insight: String,
    pub tip: String,
    pub food_type: Option<String>,
    pub portion_size: Option<String>,
    pub allergens: Vec<String>,
}

impl Default for NutritionEstimate {
    fn default() -> Self {
        Self {
            food_name: "Unknown".into(),
            calories: 0,
            protein_g: 0.0,
            carbs_g: 0.0,
            fat_g: 0.0,
            score: 0,
            insight: String::new(),
            tip: String::new(),
            food_type: None,
            portion_size: None,
            allergens: Vec::new(),
        }
    }
}

// ---- chat completion wire types ----

#[derive(Debug, Serialize)]
pub struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: Vec<ContentPart>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
pub struct ImageUrl {
    pub url: String,
    pub detail: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
pub struct ChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
}
