use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::analysis::NutritionEstimate;

/// Notion rejects rich text runs longer than this.
const MAX_TEXT_LEN: usize = 2000;

pub const PROP_ANALYSIS_DONE: &str = "AI Analysis Done";
pub const PROP_MEAL_PHOTO: &str = "Meal Photo";

// ---- query ----

#[derive(Debug, Serialize)]
pub struct QueryRequest<'a> {
    pub page_size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_cursor: Option<&'a str>,
}

/// One page of query results. Entries stay raw so each is decoded on its own.
#[derive(Debug, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub results: Vec<serde_json::Value>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Page {
    pub id: String,
    #[serde(default)]
    pub properties: HashMap<String, PropertyValue>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PropertyValue {
    Checkbox {
        #[serde(default)]
        checkbox: bool,
    },
    Files {
        #[serde(default)]
        files: Vec<FileObject>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FileObject {
    File {
        #[serde(default)]
        name: Option<String>,
        file: HostedFile,
    },
    External {
        #[serde(default)]
        name: Option<String>,
        external: ExternalFile,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
pub struct HostedFile {
    pub url: String,
    #[serde(default)]
    pub expiry_time: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ExternalFile {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct DatabaseInfo {
    pub id: String,
    #[serde(default)]
    pub title: Vec<PlainText>,
}

#[derive(Debug, Deserialize)]
pub struct PlainText {
    #[serde(default)]
    pub plain_text: String,
}

// ---- write-back ----

/// Property patch applied in one request; the completion flag travels with the data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PagePatch {
    pub properties: AnalysisProperties,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisProperties {
    #[serde(rename = "Food Name")]
    pub food_name: TitleProperty,
    #[serde(rename = "AI Analysis Done")]
    pub analysis_done: CheckboxProperty,
    #[serde(rename = "KCal Count")]
    pub kcal: NumberProperty,
    #[serde(rename = "Protein (g)")]
    pub protein: NumberProperty,
    #[serde(rename = "Carbs (g)")]
    pub carbs: NumberProperty,
    #[serde(rename = "Fat (g)")]
    pub fat: NumberProperty,
    #[serde(rename = "Food Score")]
    pub score: NumberProperty,
    #[serde(rename = "AI Insight")]
    pub insight: RichTextProperty,
    #[serde(rename = "Healthy Tips")]
    pub tips: RichTextProperty,
    #[serde(rename = "Analysis DateTime")]
    pub analyzed_at: DateProperty,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TitleProperty {
    pub title: Vec<TextRun>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RichTextProperty {
    pub rich_text: Vec<TextRun>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextRun {
    pub text: TextContent,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextContent {
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckboxProperty {
    pub checkbox: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NumberProperty {
    pub number: serde_json::Number,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DateProperty {
    pub date: DateValue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DateValue {
    #[serde(with = "time::serde::rfc3339")]
    pub start: OffsetDateTime,
}

impl PagePatch {
    pub fn from_estimate(estimate: &NutritionEstimate, analyzed_at: OffsetDateTime) -> Self {
        Self {
            properties: AnalysisProperties {
                food_name: TitleProperty {
                    title: vec![TextRun::new(&estimate.food_name)],
                },
                analysis_done: CheckboxProperty { checkbox: true },
                kcal: NumberProperty::int(estimate.calories.into()),
                protein: NumberProperty::grams(estimate.protein_g),
                carbs: NumberProperty::grams(estimate.carbs_g),
                fat: NumberProperty::grams(estimate.fat_g),
                score: NumberProperty::int(estimate.score.into()),
                insight: RichTextProperty::new(&estimate.insight),
                tips: RichTextProperty::new(&estimate.tip),
                analyzed_at: DateProperty {
                    date: DateValue { start: analyzed_at },
                },
            },
        }
    }
}

impl TextRun {
    fn new(content: &str) -> Self {
        Self {
            text: TextContent {
                content: content.chars().take(MAX_TEXT_LEN).collect(),
            },
        }
    }
}

impl RichTextProperty {
    /// Empty text clears the property instead of writing an empty run.
    fn new(content: &str) -> Self {
        let rich_text = if content.is_empty() {
            Vec::new()
        } else {
            vec![TextRun::new(content)]
        };
        Self { rich_text }
    }
}

impl NumberProperty {
    fn int(n: u64) -> Self {
        Self { number: n.into() }
    }

    /// One decimal place; non-finite values cannot occur after parsing but map to zero.
    fn grams(g: f64) -> Self {
        let rounded = (g * 10.0).round() / 10.0;
        Self {
            number: serde_json::Number::from_f64(rounded).unwrap_or_else(|| 0.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn estimate() -> NutritionEstimate {
        NutritionEstimate {
            food_name: "Chicken Biryani".into(),
            calories: 650,
            protein_g: 28.26,
            carbs_g: 80.0,
            fat_g: 22.5,
            score: 55,
            insight: "Rich in carbs.".into(),
            tip: String::new(),
            ..NutritionEstimate::default()
        }
    }

    #[test]
    fn patch_uses_exact_property_names() {
        let patch = PagePatch::from_estimate(&estimate(), datetime!(2026-10-18 09:30:00 UTC));
        let json = serde_json::to_value(&patch).unwrap();
        let props = &json["properties"];

        assert_eq!(props["Food Name"]["title"][0]["text"]["content"], "Chicken Biryani");
        assert_eq!(props["AI Analysis Done"]["checkbox"], true);
        assert_eq!(props["KCal Count"]["number"], 650);
        assert_eq!(props["Protein (g)"]["number"], 28.3);
        assert_eq!(props["Carbs (g)"]["number"], 80.0);
        assert_eq!(props["Fat (g)"]["number"], 22.5);
        assert_eq!(props["Food Score"]["number"], 55);
        assert_eq!(props["AI Insight"]["rich_text"][0]["text"]["content"], "Rich in carbs.");
        assert_eq!(props["Healthy Tips"]["rich_text"], serde_json::json!([]));
        assert_eq!(props["Analysis DateTime"]["date"]["start"], "2026-10-18T09:30:00Z");
    }

    #[test]
    fn same_estimate_produces_same_patch() {
        let at = datetime!(2026-10-18 09:30:00 UTC);
        assert_eq!(
            PagePatch::from_estimate(&estimate(), at),
            PagePatch::from_estimate(&estimate(), at)
        );
    }

    #[test]
    fn long_text_is_truncated() {
        let mut est = estimate();
        est.insight = "x".repeat(MAX_TEXT_LEN + 50);
        let patch = PagePatch::from_estimate(&est, datetime!(2026-10-18 09:30:00 UTC));
        assert_eq!(
            patch.properties.insight.rich_text[0].text.content.len(),
            MAX_TEXT_LEN
        );
    }

    #[test]
    fn page_properties_tolerate_unknown_types() {
        let page: Page = serde_json::from_value(serde_json::json!({
            "id": "p1",
            "properties": {
                "AI Analysis Done": {"id": "a", "type": "checkbox", "checkbox": true},
                "KCal Count": {"id": "b", "type": "number", "number": 12},
                "Meal Photo": {"id": "c", "type": "files", "files": [
                    {"name": "lunch.jpg", "type": "file", "file": {"url": "https://s3/x.jpg", "expiry_time": "2026-10-18T10:00:00.000Z"}}
                ]}
            }
        }))
        .unwrap();
        assert!(matches!(
            page.properties.get(PROP_ANALYSIS_DONE),
            Some(PropertyValue::Checkbox { checkbox: true })
        ));
        assert!(matches!(page.properties.get("KCal Count"), Some(PropertyValue::Other)));
        match page.properties.get(PROP_MEAL_PHOTO) {
            Some(PropertyValue::Files { files }) => {
                assert!(matches!(&files[0], FileObject::File { file, .. } if file.url == "https://s3/x.jpg"))
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
