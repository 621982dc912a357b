//! Client-side closure fetch: pull every record transitively referenced by a
//! partial graph from a remote endpoint, wave by wave, until no new IDs
//! turn up.

mod source;

pub use source::{HttpRecordSource, RecordSource};

use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;

use crate::config::ClosureConfig;
use crate::error::Result;
use crate::model::{FlatGloss, GlossDto, GlossId, RelationKind, SituationDto};

/// Glosses as embedded in a downloaded payload, possibly shallow.
#[derive(Debug, Clone, Default)]
pub struct PartialGraph {
    roots: Vec<GlossDto>,
}

impl PartialGraph {
    pub fn new(roots: Vec<GlossDto>) -> Self {
        Self { roots }
    }

    /// Every gloss embedded in the situation's challenges.
    pub fn from_situation(situation: &SituationDto) -> Self {
        Self::new(situation.embedded_glosses().cloned().collect())
    }

    pub fn roots(&self) -> &[GlossDto] {
        &self.roots
    }

    /// Root IDs plus every relation reference found anywhere below them,
    /// in first-seen order.
    pub fn seed_ids(&self) -> Vec<GlossId> {
        let mut frontier = Frontier::default();
        for root in &self.roots {
            frontier.discover_all(root);
        }
        frontier.order
    }
}

/// Knobs for one closure run.
#[derive(Debug, Clone)]
pub struct ClosureOptions {
    /// Hard ceiling on fetch attempts.
    pub max_fetches: usize,
    /// Requests in flight within a wave.
    pub concurrency: usize,
    pub cancel: CancellationToken,
}

impl Default for ClosureOptions {
    fn default() -> Self {
        Self {
            max_fetches: 5000,
            concurrency: 8,
            cancel: CancellationToken::new(),
        }
    }
}

impl From<&ClosureConfig> for ClosureOptions {
    fn from(config: &ClosureConfig) -> Self {
        Self {
            max_fetches: config.max_fetches,
            concurrency: config.concurrency,
            cancel: CancellationToken::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchFailure {
    pub id: GlossId,
    pub reason: String,
}

/// Result of [`fetch_closure`]. Partial results are normal: check
/// `failures`, `truncated` and `cancelled`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ClosureOutcome {
    /// Fetched records in fetch order, one per ID.
    pub records: Vec<FlatGloss>,
    pub failures: Vec<FetchFailure>,
    /// The fetch budget ran out with IDs still pending.
    pub truncated: bool,
    pub cancelled: bool,
    pub waves: usize,
}

impl ClosureOutcome {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && !self.truncated && !self.cancelled
    }

    pub fn record_ids(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.id.as_str()).collect()
    }
}

/// Ordered set of discovered IDs.
#[derive(Default)]
struct Frontier {
    order: Vec<GlossId>,
    seen: HashSet<GlossId>,
}

impl Frontier {
    fn discover(&mut self, id: &str) {
        if !self.seen.contains(id) {
            self.seen.insert(id.to_string());
            self.order.push(id.to_string());
        }
    }

    /// Own ID and every reference, recursing into nested `contains`.
    fn discover_all(&mut self, dto: &GlossDto) {
        self.discover(&dto.id);
        for kind in RelationKind::LATERAL {
            for reference in dto.lateral(kind) {
                self.discover(&reference.id);
            }
        }
        for child in &dto.contains {
            self.discover_all(child);
        }
    }
}

/// Fetch the transitive closure of `graph` from `source`.
///
/// Each wave fetches every discovered-but-unattempted ID, up to
/// `concurrency` at a time; references found in the wave's records are
/// merged only once the wave is done. Failed IDs are logged, reported in
/// the outcome and never retried. Stops at the fixpoint, when
/// `max_fetches` attempts have been spent, or when `cancel` fires, keeping
/// whatever was fetched by then.
pub async fn fetch_closure(
    graph: &PartialGraph,
    source: &dyn RecordSource,
    options: &ClosureOptions,
) -> ClosureOutcome {
    let mut discovered = Frontier::default();
    for root in graph.roots() {
        discovered.discover_all(root);
    }
    let mut attempted: HashSet<GlossId> = HashSet::new();
    let mut outcome = ClosureOutcome::default();
    let concurrency = options.concurrency.max(1);

    loop {
        let pending: Vec<GlossId> = discovered
            .order
            .iter()
            .filter(|id| !attempted.contains(*id))
            .cloned()
            .collect();
        if pending.is_empty() {
            break;
        }

        let budget = options.max_fetches.saturating_sub(attempted.len());
        if budget == 0 {
            log::warn!(
                "Closure fetch stopped after {} fetches with {} IDs still pending",
                attempted.len(),
                pending.len()
            );
            outcome.truncated = true;
            break;
        }

        let wave: Vec<GlossId> = pending.into_iter().take(budget).collect();
        attempted.extend(wave.iter().cloned());
        outcome.waves += 1;
        log::debug!("Closure wave {}: fetching {} records", outcome.waves, wave.len());

        let fetches = stream::iter(wave.iter().map(|id| async move {
            let result: Result<GlossDto> = source.fetch(id).await;
            (id, result)
        }))
        .buffered(concurrency);
        let mut fetches = std::pin::pin!(fetches);

        let mut received = Vec::with_capacity(wave.len());
        let cancelled = loop {
            tokio::select! {
                biased;
                _ = options.cancel.cancelled() => break true,
                next = fetches.next() => match next {
                    Some(item) => received.push(item),
                    None => break false,
                },
            }
        };

        let mut found = Vec::with_capacity(received.len());
        for (id, result) in received {
            match result {
                Ok(record) => {
                    // A source may answer under another ID; keep one record per ID.
                    if record.id != *id && !attempted.insert(record.id.clone()) {
                        log::debug!("Gloss {} arrived again as {}, skipping", record.id, id);
                        continue;
                    }
                    outcome.records.push(FlatGloss::from(&record));
                    found.push(record);
                }
                Err(e) => {
                    log::warn!("Failed to fetch gloss {}: {}", id, e);
                    outcome.failures.push(FetchFailure {
                        id: id.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        if cancelled {
            log::info!(
                "Closure fetch cancelled during wave {} with {} records fetched",
                outcome.waves,
                outcome.records.len()
            );
            outcome.cancelled = true;
            break;
        }

        for record in &found {
            discovered.discover_all(record);
        }
    }

    log::debug!(
        "Closure fetch finished: {} records, {} failures, {} waves",
        outcome.records.len(),
        outcome.failures.len(),
        outcome.waves
    );
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GlossError;
    use crate::model::{GlossRef, LanguageCode};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    fn reference(id: &str) -> GlossRef {
        GlossRef {
            id: id.to_string(),
            language: LanguageCode::Spa,
            content: format!("content {}", id),
        }
    }

    fn stub(id: &str) -> GlossDto {
        GlossDto::stub(&reference(id))
    }

    /// Serves canned records; counts calls per ID.
    #[derive(Default)]
    struct FakeSource {
        records: HashMap<String, GlossDto>,
        calls: Mutex<Vec<String>>,
        cancel_on: Option<(String, CancellationToken)>,
    }

    impl FakeSource {
        fn add(&mut self, record: GlossDto) -> &mut Self {
            self.records.insert(record.id.clone(), record);
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn calls_for(&self, id: &str) -> usize {
            self.calls().iter().filter(|c| *c == id).count()
        }
    }

    #[async_trait]
    impl RecordSource for FakeSource {
        async fn fetch(&self, id: &str) -> Result<GlossDto> {
            self.calls.lock().unwrap().push(id.to_string());
            if let Some((trigger, token)) = &self.cancel_on {
                if trigger == id {
                    token.cancel();
                }
            }
            self.records
                .get(id)
                .cloned()
                .ok_or_else(|| GlossError::NotFound(format!("Gloss {} not found", id)))
        }
    }

    fn with_translation(id: &str, target: &str) -> GlossDto {
        let mut dto = stub(id);
        dto.translations.push(reference(target));
        dto
    }

    #[tokio::test]
    async fn test_cycle_reaches_fixpoint_once_each() {
        let mut source = FakeSource::default();
        source
            .add(with_translation("X", "Z"))
            .add(stub("Y"))
            .add(with_translation("Z", "X"));

        let graph = PartialGraph::new(vec![stub("X"), stub("Y")]);
        let outcome = fetch_closure(&graph, &source, &ClosureOptions::default()).await;

        let mut ids = outcome.record_ids();
        ids.sort();
        assert_eq!(ids, vec!["X", "Y", "Z"]);
        for id in ["X", "Y", "Z"] {
            assert_eq!(source.calls_for(id), 1);
        }
        assert_eq!(outcome.waves, 2);
        assert!(outcome.is_complete());
    }

    #[test]
    fn test_seed_ids_include_nested_references() {
        let mut root = stub("root");
        let mut child = stub("child");
        child.near_synonyms.push(reference("syn"));
        root.contains.push(child);
        root.to_be_differentiated_from.push(reference("other"));

        let graph = PartialGraph::new(vec![root]);
        assert_eq!(graph.seed_ids(), vec!["root", "other", "child", "syn"]);
    }

    #[tokio::test]
    async fn test_failures_are_reported_not_retried() {
        let mut source = FakeSource::default();
        source.add(with_translation("X", "missing")).add(with_translation("Y", "missing"));

        let graph = PartialGraph::new(vec![stub("X"), stub("Y")]);
        let outcome = fetch_closure(&graph, &source, &ClosureOptions::default()).await;

        assert_eq!(outcome.record_ids(), vec!["X", "Y"]);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].id, "missing");
        assert_eq!(source.calls_for("missing"), 1);
        assert!(!outcome.truncated);
        assert!(!outcome.is_complete());
    }

    #[tokio::test]
    async fn test_budget_truncates_long_chain() {
        let mut source = FakeSource::default();
        source
            .add(with_translation("A", "B"))
            .add(with_translation("B", "C"))
            .add(with_translation("C", "D"))
            .add(stub("D"));

        let options = ClosureOptions { max_fetches: 2, ..Default::default() };
        let graph = PartialGraph::new(vec![stub("A")]);
        let outcome = fetch_closure(&graph, &source, &options).await;

        assert_eq!(outcome.record_ids(), vec!["A", "B"]);
        assert!(outcome.truncated);
        assert_eq!(source.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_budget_applies_within_a_wave() {
        let mut source = FakeSource::default();
        for id in ["a", "b", "c"] {
            source.add(stub(id));
        }
        let options = ClosureOptions { max_fetches: 2, ..Default::default() };
        let graph = PartialGraph::new(vec![stub("a"), stub("b"), stub("c")]);
        let outcome = fetch_closure(&graph, &source, &options).await;

        assert_eq!(outcome.records.len(), 2);
        assert!(outcome.truncated);
    }

    #[tokio::test]
    async fn test_cancellation_returns_partial_result() {
        let token = CancellationToken::new();
        let mut source = FakeSource {
            cancel_on: Some(("B".to_string(), token.clone())),
            ..Default::default()
        };
        source
            .add(with_translation("A", "B"))
            .add(with_translation("B", "C"))
            .add(stub("C"));

        let options = ClosureOptions { concurrency: 1, cancel: token, ..Default::default() };
        let graph = PartialGraph::new(vec![stub("A")]);
        let outcome = fetch_closure(&graph, &source, &options).await;

        assert!(outcome.cancelled);
        assert!(outcome.record_ids().contains(&"A"));
        assert_eq!(source.calls_for("C"), 0);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let mut source = FakeSource::default();
        source.add(stub("A"));
        let options = ClosureOptions::default();
        options.cancel.cancel();

        let outcome = fetch_closure(&PartialGraph::new(vec![stub("A")]), &source, &options).await;
        assert!(outcome.cancelled);
        assert!(outcome.records.is_empty());
    }

    #[tokio::test]
    async fn test_records_are_flattened() {
        let mut root = stub("root");
        root.contains.push(stub("child"));
        let mut source = FakeSource::default();
        source.add(root.clone()).add(stub("child"));

        let graph = PartialGraph::new(vec![stub("root")]);
        let outcome = fetch_closure(&graph, &source, &ClosureOptions::default()).await;
        assert_eq!(outcome.records[0].relation_ids.contains, vec!["child".to_string()]);
        assert_eq!(outcome.record_ids(), vec!["root", "child"]);
    }

    #[test]
    fn test_options_from_config() {
        let config = ClosureConfig { max_fetches: 7, concurrency: 3, ..Default::default() };
        let options = ClosureOptions::from(&config);
        assert_eq!(options.max_fetches, 7);
        assert_eq!(options.concurrency, 3);
        assert!(!options.cancel.is_cancelled());
    }
}
