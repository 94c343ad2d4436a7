use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use crate::analysis::{OpenAiAnalyzer, VisionAnalyzer};
use crate::config::AppConfig;
use crate::notion::{NotionClient, RecordStore};
use crate::report::ReportRenderer;
use crate::storage::{LocalStorage, S3Storage, StorageClient};

/// Components one run works with, built once from the config.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn RecordStore>,
    pub analyzer: Arc<dyn VisionAnalyzer>,
    pub renderer: Arc<ReportRenderer>,
    pub storage: Arc<dyn StorageClient>,
}

impl AppState {
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let config = Arc::new(config);
        let http = http_client()?;

        let store = Arc::new(NotionClient::new(
            http.clone(),
            config.notion.clone(),
            config.run.image_download_timeout,
        )
        .with_max_download_bytes(config.run.max_image_bytes)) as Arc<dyn RecordStore>;

        let analyzer = Arc::new(OpenAiAnalyzer::new(
            http,
            config.openai.clone(),
            config.features.enable_allergy_detection,
        )) as Arc<dyn VisionAnalyzer>;

        let storage = match &config.s3 {
            Some(s3) => {
                info!(bucket = %s3.bucket, endpoint = %s3.endpoint, "artifacts go to object storage");
                Arc::new(S3Storage::connect(s3).await) as Arc<dyn StorageClient>
            }
            None => {
                info!(dir = %config.run.artifacts_dir.display(), "artifacts go to local directory");
                Arc::new(LocalStorage::new(&config.run.artifacts_dir)) as Arc<dyn StorageClient>
            }
        };

        Ok(Self::from_parts(config, store, analyzer, storage))
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        store: Arc<dyn RecordStore>,
        analyzer: Arc<dyn VisionAnalyzer>,
        storage: Arc<dyn StorageClient>,
    ) -> Self {
        let renderer = Arc::new(ReportRenderer::new(config.report.clone()));
        Self {
            config,
            store,
            analyzer,
            renderer,
            storage,
        }
    }
}

pub fn http_client() -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("foodinsight/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("build http client")
}
