use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::report::score::{Palette, Rgb, ScoreThresholds};

#[derive(Debug, Clone, Deserialize)]
pub struct NotionConfig {
    pub token: String,
    pub database_id: String,
    pub api_base: String,
    pub api_version: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub api_base: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
    pub max_retries: u32,
    pub image_detail: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    pub max_entries: usize,
    pub image_download_timeout: Duration,
    pub max_image_bytes: u64,
    pub artifacts_dir: PathBuf,
}

/// Daily targets and context used to bias the prompt and fill the report's target column.
#[derive(Debug, Clone, Deserialize)]
pub struct UserProfile {
    pub daily_kcal: u32,
    pub daily_protein_g: f64,
    pub daily_carbs_g: f64,
    pub daily_fat_g: f64,
    pub age: Option<u32>,
    pub location: Option<String>,
    pub gender: Option<String>,
    pub height_cm: Option<f64>,
    pub weight_kg: Option<f64>,
    pub diet_type: Option<String>,
    pub dietary_restrictions: Vec<String>,
    pub health_goal: Option<String>,
    pub activity_level: Option<String>,
}

impl Default for UserProfile {
    fn default() -> Self {
        Self {
            daily_kcal: 2000,
            daily_protein_g: 50.0,
            daily_carbs_g: 250.0,
            daily_fat_g: 65.0,
            age: Some(35),
            location: Some("Mumbai, India".into()),
            gender: None,
            height_cm: None,
            weight_kg: None,
            diet_type: Some("balanced".into()),
            dietary_restrictions: Vec::new(),
            health_goal: Some("maintenance".into()),
            activity_level: Some("moderate".into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum PageSize {
    Letter,
    A4,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportConfig {
    pub fonts_dir: PathBuf,
    pub font_family: String,
    pub page_size: PageSize,
    pub palette: Palette,
    pub thresholds: ScoreThresholds,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            fonts_dir: PathBuf::from("./fonts"),
            font_family: "DejaVuSans".into(),
            page_size: PageSize::Letter,
            palette: Palette::default(),
            thresholds: ScoreThresholds::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct FeatureFlags {
    pub enable_pdf: bool,
    pub enable_allergy_detection: bool,
    pub enable_local_image_storage: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            enable_pdf: true,
            enable_allergy_detection: true,
            enable_local_image_storage: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3ArtifactConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub notion: NotionConfig,
    pub openai: OpenAiConfig,
    pub run: RunConfig,
    pub profile: UserProfile,
    pub report: ReportConfig,
    pub features: FeatureFlags,
    pub s3: Option<S3ArtifactConfig>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup, so tests never touch the process env.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Lookup(lookup);

        let notion = NotionConfig {
            token: env.required("NOTION_TOKEN")?,
            database_id: env.required("NOTION_DATABASE_ID")?,
            api_base: env.string_or("NOTION_API_BASE", "https://api.notion.com"),
            api_version: env.string_or("NOTION_API_VERSION", "2024-04-04"),
            timeout: Duration::from_secs(env.parse_or("NOTION_TIMEOUT_SECS", 30u64)?),
        };

        let openai = OpenAiConfig {
            api_key: env.required("OPENAI_API_KEY")?,
            api_base: env.string_or("OPENAI_API_BASE", "https://api.openai.com"),
            model: env.string_or("OPENAI_MODEL", "gpt-4o-mini"),
            max_tokens: env.parse_or("OPENAI_MAX_TOKENS", 1000u32)?,
            temperature: env.parse_or("OPENAI_TEMPERATURE", 0.3f32)?,
            timeout: Duration::from_secs(env.parse_or("OPENAI_TIMEOUT_SECS", 30u64)?),
            max_retries: env.parse_or("OPENAI_MAX_RETRIES", 2u32)?,
            image_detail: env.string_or("OPENAI_IMAGE_DETAIL", "high"),
        };

        let run = RunConfig {
            max_entries: env.parse_or("MAX_ENTRIES_PER_RUN", 10usize)?,
            image_download_timeout: Duration::from_secs(
                env.parse_or("IMAGE_DOWNLOAD_TIMEOUT_SECS", 10u64)?,
            ),
            max_image_bytes: env.parse_or("MAX_IMAGE_BYTES", 20u64 * 1024 * 1024)?,
            artifacts_dir: PathBuf::from(env.string_or("ARTIFACTS_DIR", "artifacts")),
        };

        let defaults = UserProfile::default();
        let profile = UserProfile {
            daily_kcal: env.parse_or("NUTRITION_DAILY_KCAL", defaults.daily_kcal)?,
            daily_protein_g: env.parse_or("NUTRITION_DAILY_PROTEIN_G", defaults.daily_protein_g)?,
            daily_carbs_g: env.parse_or("NUTRITION_DAILY_CARBS_G", defaults.daily_carbs_g)?,
            daily_fat_g: env.parse_or("NUTRITION_DAILY_FAT_G", defaults.daily_fat_g)?,
            age: env.parse_optional("USER_AGE")?.or(defaults.age),
            location: env.optional("USER_LOCATION").or(defaults.location),
            gender: env.optional("USER_GENDER"),
            height_cm: env.parse_optional("USER_HEIGHT_CM")?,
            weight_kg: env.parse_optional("USER_WEIGHT_KG")?,
            diet_type: env.optional("DIET_TYPE").or(defaults.diet_type),
            dietary_restrictions: env
                .optional("DIETARY_RESTRICTIONS")
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            health_goal: env.optional("HEALTH_GOAL").or(defaults.health_goal),
            activity_level: env.optional("ACTIVITY_LEVEL").or(defaults.activity_level),
        };

        let report = load_report_config(&env)?;

        let feature_defaults = FeatureFlags::default();
        let features = FeatureFlags {
            enable_pdf: env.flag("ENABLE_PDF_GENERATION", feature_defaults.enable_pdf)?,
            enable_allergy_detection: env.flag(
                "ENABLE_ALLERGY_DETECTION",
                feature_defaults.enable_allergy_detection,
            )?,
            enable_local_image_storage: env.flag(
                "ENABLE_LOCAL_IMAGE_STORAGE",
                feature_defaults.enable_local_image_storage,
            )?,
        };

        let s3 = match env.optional("ARTIFACT_S3_BUCKET") {
            Some(bucket) => Some(S3ArtifactConfig {
                endpoint: env.required("ARTIFACT_S3_ENDPOINT")?,
                bucket,
                access_key: env.required("ARTIFACT_S3_ACCESS_KEY")?,
                secret_key: env.required("ARTIFACT_S3_SECRET_KEY")?,
                region: env.string_or("ARTIFACT_S3_REGION", "us-east-1"),
            }),
            None => None,
        };

        Ok(Self {
            notion,
            openai,
            run,
            profile,
            report,
            features,
            s3,
        })
    }
}

fn load_report_config<F>(env: &Lookup<F>) -> Result<ReportConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let defaults = ReportConfig::default();

    let page_size = match env.optional("PDF_PAGE_SIZE") {
        None => defaults.page_size,
        Some(v) => match v.to_ascii_lowercase().as_str() {
            "letter" => PageSize::Letter,
            "a4" => PageSize::A4,
            _ => {
                return Err(ConfigError::Invalid {
                    key: "PDF_PAGE_SIZE",
                    value: v,
                    reason: "expected letter or a4".into(),
                })
            }
        },
    };

    let mut palette = defaults.palette;
    let slots: [(&'static str, &mut Rgb); 10] = [
        ("PDF_COLOR_PRIMARY", &mut palette.primary),
        ("PDF_COLOR_SECONDARY", &mut palette.secondary),
        ("PDF_COLOR_ACCENT_1", &mut palette.accent_1),
        ("PDF_COLOR_ACCENT_2", &mut palette.accent_2),
        ("PDF_COLOR_LIGHT_BG", &mut palette.light_bg),
        ("PDF_COLOR_TEXT_DARK", &mut palette.text_dark),
        ("PDF_COLOR_TEXT_LIGHT", &mut palette.text_light),
        ("PDF_COLOR_SUCCESS", &mut palette.success),
        ("PDF_COLOR_WARNING", &mut palette.warning),
        ("PDF_COLOR_DANGER", &mut palette.danger),
    ];
    for (key, slot) in slots {
        if let Some(v) = env.optional(key) {
            *slot = Rgb::from_hex(&v).ok_or_else(|| ConfigError::Invalid {
                key,
                value: v.clone(),
                reason: "expected #RRGGBB".into(),
            })?;
        }
    }

    let thresholds = ScoreThresholds {
        excellent: env.parse_or("SCORE_THRESHOLD_EXCELLENT", defaults.thresholds.excellent)?,
        good: env.parse_or("SCORE_THRESHOLD_GOOD", defaults.thresholds.good)?,
        fair: env.parse_or("SCORE_THRESHOLD_FAIR", defaults.thresholds.fair)?,
    };
    if !(thresholds.excellent > thresholds.good && thresholds.good > thresholds.fair) {
        return Err(ConfigError::Invalid {
            key: "SCORE_THRESHOLD_EXCELLENT",
            value: format!(
                "{}/{}/{}",
                thresholds.excellent, thresholds.good, thresholds.fair
            ),
            reason: "thresholds must be strictly descending".into(),
        });
    }

    Ok(ReportConfig {
        fonts_dir: PathBuf::from(env.string_or("PDF_FONTS_DIR", "./fonts")),
        font_family: env.string_or("PDF_FONT_FAMILY", "DejaVuSans"),
        page_size,
        palette,
        thresholds,
    })
}

struct Lookup<F>(F);

impl<F> Lookup<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Blank values count as unset.
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, key: &'static str) -> Result<String, ConfigError> {
        let value = self.optional(key).ok_or(ConfigError::Missing(key))?;
        if value.starts_with("YOUR_") && value.ends_with("_HERE") {
            return Err(ConfigError::Placeholder(key));
        }
        Ok(value)
    }

    fn string_or(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    fn parse_optional<T>(&self, key: &'static str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.optional(key) {
            None => Ok(None),
            Some(v) => v.parse::<T>().map(Some).map_err(|e| ConfigError::Invalid {
                key,
                value: v.clone(),
                reason: e.to_string(),
            }),
        }
    }

    fn parse_or<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        Ok(self.parse_optional(key)?.unwrap_or(default))
    }

    fn flag(&self, key: &'static str, default: bool) -> Result<bool, ConfigError> {
        match self.optional(key) {
            None => Ok(default),
            Some(v) => match v.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(ConfigError::Invalid {
                    key,
                    value: v,
                    reason: "expected a boolean".into(),
                }),
            },
        }
    }
}
