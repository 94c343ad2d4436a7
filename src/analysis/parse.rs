//! Tolerant extraction of the nutrition JSON from free-form model text.
//!
//! Fallback order: the whole text as JSON, then the body of each fenced
//! code block, then every balanced `{...}` span from left to right. The
//! first candidate that parses as a JSON object wins.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use super::dto::NutritionEstimate;
use crate::error::AnalysisError;

lazy_static! {
    static ref FENCED_BLOCK: Regex = Regex::new(r"(?s)```[A-Za-z]*[ \t]*\r?\n?(.*?)```").unwrap();
    static ref LEADING_NUMBER: Regex = Regex::new(r"^[+-]?(\d+(\.\d*)?|\.\d+)").unwrap();
}

pub fn parse_estimate(text: &str) -> Result<NutritionEstimate, AnalysisError> {
    let object = extract_json_object(text).ok_or_else(|| {
        AnalysisError::MalformedResponse("no JSON object found in model output".into())
    })?;
    let raw: RawEstimate = serde_json::from_value(Value::Object(object))
        .map_err(|e| AnalysisError::MalformedResponse(e.to_string()))?;
    Ok(raw.into())
}

pub fn extract_json_object(text: &str) -> Option<Map<String, Value>> {
    let text = text.trim();

    if let Some(obj) = as_object(text) {
        return Some(obj);
    }

    for caps in FENCED_BLOCK.captures_iter(text) {
        if let Some(obj) = caps.get(1).and_then(|m| as_object(m.as_str().trim())) {
            return Some(obj);
        }
    }

    let bytes = text.as_bytes();
    for (start, _) in text.match_indices('{') {
        if let Some(end) = balanced_end(bytes, start) {
            if let Some(obj) = as_object(&text[start..=end]) {
                return Some(obj);
            }
        }
    }

    None
}

fn as_object(candidate: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Index of the `}` closing the brace at `start`, skipping braces inside strings.
fn balanced_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawEstimate {
    #[serde(deserialize_with = "lenient_text")]
    food_name: String,
    #[serde(deserialize_with = "lenient_number")]
    estimated_kcal: f64,
    #[serde(deserialize_with = "lenient_number")]
    protein_g: f64,
    #[serde(deserialize_with = "lenient_number")]
    carbs_g: f64,
    #[serde(deserialize_with = "lenient_number")]
    fat_g: f64,
    #[serde(deserialize_with = "lenient_number")]
    food_score: f64,
    #[serde(deserialize_with = "lenient_text")]
    ai_insight: String,
    #[serde(deserialize_with = "lenient_text")]
    healthy_tips: String,
    #[serde(deserialize_with = "lenient_text")]
    food_type: String,
    #[serde(deserialize_with = "lenient_text")]
    portion_size: String,
    #[serde(deserialize_with = "lenient_list")]
    allergens: Vec<String>,
}

impl From<RawEstimate> for NutritionEstimate {
    fn from(r: RawEstimate) -> Self {
        let non_empty = |s: String| if s.is_empty() { None } else { Some(s) };
        Self {
            food_name: if r.food_name.is_empty() {
                NutritionEstimate::default().food_name
            } else {
                r.food_name
            },
            calories: r.estimated_kcal.max(0.0).round().min(u32::MAX as f64) as u32,
            protein_g: r.protein_g.max(0.0),
            carbs_g: r.carbs_g.max(0.0),
            fat_g: r.fat_g.max(0.0),
            score: r.food_score.round().clamp(0.0, 100.0) as u8,
            insight: r.ai_insight,
            tip: r.healthy_tips,
            food_type: non_empty(r.food_type),
            portion_size: non_empty(r.portion_size),
            allergens: r.allergens,
        }
    }
}

/// Accepts numbers, numeric strings with trailing units ("25g", "300 kcal") and null.
fn lenient_number<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match &value {
        Value::Null => Ok(0.0),
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| serde::de::Error::custom(format!("number out of range: {n}"))),
        Value::String(s) if s.trim().is_empty() => Ok(0.0),
        Value::String(s) => LEADING_NUMBER
            .find(s.trim())
            .and_then(|m| m.as_str().parse::<f64>().ok())
            .ok_or_else(|| serde::de::Error::custom(format!("not a number: {s:?}"))),
        other => Err(serde::de::Error::custom(format!(
            "expected a number, got {other}"
        ))),
    }
}

fn lenient_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    })
}

/// A list of strings, or one comma-separated string.
fn lenient_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let items = match Value::deserialize(deserializer)? {
        Value::Array(values) => values
            .into_iter()
            .map(|v| match v {
                Value::String(s) => s,
                other => other.to_string(),
            })
            .collect(),
        Value::String(s) => s.split(',').map(str::to_string).collect(),
        _ => Vec::new(),
    };
    Ok(items
        .into_iter()
        .map(|s: String| s.trim().to_string())
        .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("none"))
        .collect())
}
