//! Meta-aggregation service reached over HTTP
//!
//! Expects `GET {base_url}/meta/{format}` to return an `AggregatedMeta` document.

use crate::{
    error::{AppError, AppResult},
    models::AggregatedMeta,
    services::providers::MetaSource,
};
use reqwest::Client as HttpClient;

#[derive(Clone)]
pub struct HttpMetaSource {
    http_client: HttpClient,
    base_url: String,
}

impl HttpMetaSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http_client: HttpClient::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn meta_url(&self, format: &str) -> String {
        format!("{}/meta/{}", self.base_url, format.to_lowercase())
    }
}

#[async_trait::async_trait]
impl MetaSource for HttpMetaSource {
    #[tracing::instrument(skip(self))]
    async fn get_aggregated_meta(&self, format: &str) -> AppResult<AggregatedMeta> {
        if format.trim().is_empty() {
            return Err(AppError::InvalidInput("Format cannot be empty".to_string()));
        }

        let url = self.meta_url(format);
        let response = self.http_client.get(&url).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalApi(format!(
                "Meta service returned status {}: {}",
                status, body
            )));
        }

        let mut meta: AggregatedMeta = response.json().await?;
        if meta.format.is_empty() {
            meta.format = format.to_string();
        }
        meta.finalize();

        tracing::info!(
            format = %format,
            archetypes = meta.total_archetypes,
            source = self.name(),
            "Fetched aggregated meta"
        );

        Ok(meta)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
