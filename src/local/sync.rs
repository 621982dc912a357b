use serde::Serialize;

use super::LocalStore;
use crate::closure::{fetch_closure, ClosureOptions, FetchFailure, HttpRecordSource, PartialGraph};
use crate::error::Result;
use crate::model::{LanguageCode, SituationSummary};

/// What one situation download brought in.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub identifier: String,
    /// Glosses merged into the local store.
    pub records: usize,
    pub failures: Vec<FetchFailure>,
    pub truncated: bool,
    pub cancelled: bool,
}

impl SyncReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && !self.truncated && !self.cancelled
    }
}

/// Downloads situations and the closure of their glosses into a [`LocalStore`].
pub struct SyncClient {
    source: HttpRecordSource,
    store: LocalStore,
    options: ClosureOptions,
}

impl SyncClient {
    pub fn new(source: HttpRecordSource, store: LocalStore, options: ClosureOptions) -> Self {
        Self {
            source,
            store,
            options,
        }
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    /// Fetch one situation, complete its gloss closure and store both.
    ///
    /// Records fetched before a failure, the budget running out or a cancel
    /// are still merged; the report says which of those happened. Starts
    /// from an empty record cache, so upstream edits are picked up.
    pub async fn download_situation(
        &self,
        identifier: &str,
        natives: &[LanguageCode],
    ) -> Result<SyncReport> {
        self.source.clear_cache();
        self.download_one(identifier, natives).await
    }

    async fn download_one(&self, identifier: &str, natives: &[LanguageCode]) -> Result<SyncReport> {
        let situation = self.source.fetch_situation(identifier, natives).await?;
        let graph = PartialGraph::from_situation(&situation);
        let outcome = fetch_closure(&graph, &self.source, &self.options).await;

        self.store.upsert_many(&outcome.records).await?;
        self.store.upsert_situation(&situation).await?;

        if !outcome.is_complete() {
            log::warn!(
                "Situation {} downloaded partially: {} failures, truncated={}, cancelled={}",
                identifier,
                outcome.failures.len(),
                outcome.truncated,
                outcome.cancelled
            );
        }
        log::info!(
            "Downloaded situation {} with {} glosses in {} waves",
            identifier,
            outcome.records.len(),
            outcome.waves
        );

        Ok(SyncReport {
            identifier: identifier.to_string(),
            records: outcome.records.len(),
            failures: outcome.failures,
            truncated: outcome.truncated,
            cancelled: outcome.cancelled,
        })
    }

    /// Refresh situation metadata for `target` without touching challenges.
    pub async fn download_summaries(
        &self,
        target: LanguageCode,
        natives: &[LanguageCode],
    ) -> Result<Vec<SituationSummary>> {
        let summaries = self.source.fetch_summaries(target, natives).await?;
        for summary in &summaries {
            self.store.upsert_situation_summary(summary).await?;
        }
        log::info!("Stored {} situation summaries for {}", summaries.len(), target);
        Ok(summaries)
    }

    /// Summaries first, then every listed situation in full. Stops early on cancel.
    ///
    /// Records shared between the listed situations are fetched once per run.
    pub async fn download_all(
        &self,
        target: LanguageCode,
        natives: &[LanguageCode],
    ) -> Result<Vec<SyncReport>> {
        self.source.clear_cache();
        let summaries = self.download_summaries(target, natives).await?;
        let mut reports = Vec::with_capacity(summaries.len());
        for summary in &summaries {
            if self.options.cancel.is_cancelled() {
                log::info!("Sync cancelled after {} situations", reports.len());
                break;
            }
            reports.push(self.download_one(&summary.identifier, natives).await?);
        }
        Ok(reports)
    }
}
