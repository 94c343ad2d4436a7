use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tracing::{debug, info, instrument, warn};

use super::dto::{ChatMessage, ChatRequest, ChatResponse, ContentPart, ImageUrl, NutritionEstimate};
use super::parse::parse_estimate;
use super::prompt::build_prompt;
use crate::config::{OpenAiConfig, UserProfile};
use crate::error::AnalysisError;

#[async_trait]
pub trait VisionAnalyzer: Send + Sync {
    async fn analyze(
        &self,
        image: &[u8],
        profile: &UserProfile,
    ) -> Result<NutritionEstimate, AnalysisError>;
}

/// Chat-completions vision client.
#[derive(Clone)]
pub struct OpenAiAnalyzer {
    http: reqwest::Client,
    config: OpenAiConfig,
    allergy_detection: bool,
}

impl OpenAiAnalyzer {
    pub fn new(http: reqwest::Client, config: OpenAiConfig, allergy_detection: bool) -> Self {
        Self {
            http,
            config,
            allergy_detection,
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1/chat/completions",
            self.config.api_base.trim_end_matches('/')
        )
    }

    fn build_request<'a>(&'a self, image: &[u8], profile: &UserProfile) -> ChatRequest<'a> {
        let data_url = format!("data:{};base64,{}", media_type(image), BASE64.encode(image));
        ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user",
                content: vec![
                    ContentPart::Text {
                        text: build_prompt(profile, self.allergy_detection),
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: data_url,
                            detail: self.config.image_detail.clone(),
                        },
                    },
                ],
            }],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        }
    }

    async fn complete_once(&self, body: &ChatRequest<'_>) -> Result<String, AnalysisError> {
        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .timeout(self.config.timeout)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(AnalysisError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let parsed: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| AnalysisError::MalformedResponse(format!("completion body: {e}")))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or(AnalysisError::EmptyResponse)
    }
}

#[async_trait]
impl VisionAnalyzer for OpenAiAnalyzer {
    #[instrument(skip(self, image, profile), fields(model = %self.config.model, image_len = image.len()))]
    async fn analyze(
        &self,
        image: &[u8],
        profile: &UserProfile,
    ) -> Result<NutritionEstimate, AnalysisError> {
        let body = self.build_request(image, profile);

        let mut attempt = 0;
        let content = loop {
            match self.complete_once(&body).await {
                Ok(content) => break content,
                Err(e) if attempt < self.config.max_retries && is_retryable(&e) => {
                    attempt += 1;
                    warn!(error = %e, attempt, "model call failed; retrying");
                }
                Err(e) => return Err(e),
            }
        };
        debug!(response_len = content.len(), "model responded");

        let estimate = parse_estimate(&content)?;
        info!(food_name = %estimate.food_name, kcal = estimate.calories, score = estimate.score, "food analyzed");
        Ok(estimate)
    }
}

fn is_retryable(err: &AnalysisError) -> bool {
    match err {
        AnalysisError::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request(),
        AnalysisError::Status { status, .. } => *status == 429 || *status >= 500,
        AnalysisError::EmptyResponse | AnalysisError::MalformedResponse(_) => false,
    }
}

fn media_type(image: &[u8]) -> &'static str {
    match image::guess_format(image) {
        Ok(image::ImageFormat::Png) => "image/png",
        Ok(image::ImageFormat::WebP) => "image/webp",
        Ok(image::ImageFormat::Gif) => "image/gif",
        _ => "image/jpeg",
    }
}
