use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::cache::RecordCache;
use crate::config::ClosureConfig;
use crate::error::{GlossError, Result};
use crate::model::{GlossDto, LanguageCode, SituationDto, SituationSummary};

/// Remote fetch-by-ID primitive the closure client runs over.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// One record per call. `NotFound` for unknown IDs, `FetchFailure` for
    /// transport or decoding trouble.
    async fn fetch(&self, id: &str) -> Result<GlossDto>;
}

/// Response envelope of every endpoint.
#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

/// HTTP client for the record, situation and summary endpoints.
pub struct HttpRecordSource {
    client: Client,
    base_url: Url,
    cache: Option<Arc<RecordCache>>,
}

impl HttpRecordSource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| GlossError::Config(format!("invalid base URL {}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(GlossError::Config(format!("{} cannot be a base URL", base_url)));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GlossError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            cache: None,
        })
    }

    /// Build from `[closure]` settings; a capacity of 0 disables the cache.
    pub fn from_config(config: &ClosureConfig) -> Result<Self> {
        let source = Self::new(&config.base_url, Duration::from_secs(config.timeout_secs))?;
        Ok(if config.cache_capacity > 0 {
            source.with_cache(Arc::new(RecordCache::new(config.cache_capacity)))
        } else {
            source
        })
    }

    pub fn with_cache(mut self, cache: Arc<RecordCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Forget cached records so the next fetches go to the server.
    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url, what: &str) -> Result<T> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| GlossError::FetchFailure(format!("GET {}: {}", url, e)))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(GlossError::NotFound(format!("{} not found at {}", what, url)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GlossError::FetchFailure(format!(
                "GET {} returned {}: {}",
                url, status, body
            )));
        }

        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| GlossError::FetchFailure(format!("GET {}: invalid body: {}", url, e)))?;
        Ok(envelope.data)
    }

    /// `GET /situations/{identifier}` with the reader's native languages.
    pub async fn fetch_situation(
        &self,
        identifier: &str,
        natives: &[LanguageCode],
    ) -> Result<SituationDto> {
        let mut url = self.endpoint(&["situations", identifier]);
        if !natives.is_empty() {
            url.query_pairs_mut()
                .append_pair("nativeLanguages", &join_languages(natives));
        }
        self.get_json(url, &format!("Situation {}", identifier)).await
    }

    /// `GET /situations/summary` for one target language.
    pub async fn fetch_summaries(
        &self,
        target: LanguageCode,
        natives: &[LanguageCode],
    ) -> Result<Vec<SituationSummary>> {
        let mut url = self.endpoint(&["situations", "summary"]);
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("targetLanguage", target.as_str());
            if !natives.is_empty() {
                query.append_pair("nativeLanguages", &join_languages(natives));
            }
        }
        self.get_json(url, "Situation summaries").await
    }
}

#[async_trait]
impl RecordSource for HttpRecordSource {
    async fn fetch(&self, id: &str) -> Result<GlossDto> {
        if let Some(hit) = self.cache.as_ref().and_then(|c| c.get(id)) {
            log::debug!("Record cache hit for {}", id);
            return Ok(hit);
        }

        let url = self.endpoint(&["record", id]);
        let record: GlossDto = self.get_json(url, &format!("Gloss {}", id)).await?;
        if let Some(cache) = &self.cache {
            cache.put(record.clone());
        }
        Ok(record)
    }
}

fn join_languages(languages: &[LanguageCode]) -> String {
    languages
        .iter()
        .map(LanguageCode::as_str)
        .collect::<Vec<_>>()
        .join(",")
}
