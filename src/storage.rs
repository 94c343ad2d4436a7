use std::path::{Component, Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use aws_config::{defaults, BehaviorVersion};
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::{Builder as S3ConfigBuilder, Region},
    Client,
};
use aws_smithy_types::byte_stream::ByteStream;
use bytes::Bytes;

use crate::config::S3ArtifactConfig;

/// Where rendered reports (and optionally debug photos) end up.
#[async_trait]
pub trait StorageClient: Send + Sync {
    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()>;
}

/// S3-compatible bucket (MinIO in most deployments), addressed path-style.
#[derive(Clone)]
pub struct S3Storage {
    client: Client,
    bucket: String,
}

impl S3Storage {
    pub async fn connect(config: &S3ArtifactConfig) -> Self {
        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "foodinsight-env",
        );
        let shared = defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .load()
            .await;

        let s3_config = S3ConfigBuilder::from(&shared)
            .endpoint_url(&config.endpoint)
            .force_path_style(true)
            .build();

        Self {
            client: Client::from_conf(s3_config),
            bucket: config.bucket.clone(),
        }
    }
}

#[async_trait]
impl StorageClient for S3Storage {
    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()> {
        let len = body.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(body))
            .send()
            .await
            .with_context(|| format!("upload {key} ({len} bytes) to bucket {}", self.bucket))?;
        Ok(())
    }
}

/// Directory on disk, collected by the scheduler as a build artifact.
#[derive(Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> anyhow::Result<PathBuf> {
        let rel = Path::new(key);
        anyhow::ensure!(
            rel.components().all(|c| matches!(c, Component::Normal(_))),
            "invalid object key {key:?}"
        );
        Ok(self.root.join(rel))
    }
}

#[async_trait]
impl StorageClient for LocalStorage {
    async fn put_object(&self, key: &str, body: Bytes, _content_type: &str) -> anyhow::Result<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("create dir {}", parent.display()))?;
        }
        tokio::fs::write(&path, &body)
            .await
            .with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn s3_config(endpoint: String) -> S3ArtifactConfig {
        S3ArtifactConfig {
            endpoint,
            bucket: "meal-reports".into(),
            access_key: "minio".into(),
            secret_key: "minio-secret".into(),
            region: "us-east-1".into(),
        }
    }

    #[tokio::test]
    async fn s3_upload_puts_object_under_bucket_path() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/meal-reports/reports/a.pdf"))
            .and(header("content-type", "application/pdf"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let storage = S3Storage::connect(&s3_config(server.uri())).await;
        storage
            .put_object("reports/a.pdf", Bytes::from_static(b"%PDF-1.3"), "application/pdf")
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        assert!(requests[0].headers.contains_key("authorization"));
    }

    #[tokio::test]
    async fn s3_rejection_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(403).set_body_string(
                "<Error><Code>AccessDenied</Code><Message>denied</Message></Error>",
            ))
            .mount(&server)
            .await;

        let storage = S3Storage::connect(&s3_config(server.uri())).await;
        let err = storage
            .put_object("reports/a.pdf", Bytes::from_static(b"%PDF-1.3"), "application/pdf")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("meal-reports"), "{err:#}");
    }

    #[tokio::test]
    async fn local_storage_writes_nested_keys() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path());

        storage
            .put_object("reports/a.pdf", Bytes::from_static(b"%PDF-1.3"), "application/pdf")
            .await
            .unwrap();

        let written = std::fs::read(dir.path().join("reports/a.pdf")).unwrap();
        assert_eq!(written, b"%PDF-1.3");
    }

    #[tokio::test]
    async fn local_storage_rejects_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path());

        for key in ["../evil.pdf", "/etc/passwd", "a/../../b"] {
            let err = storage
                .put_object(key, Bytes::from_static(b"x"), "application/pdf")
                .await
                .unwrap_err();
            assert!(err.to_string().contains("invalid object key"), "{key}");
        }
    }
}
