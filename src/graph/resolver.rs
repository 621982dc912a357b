//! Wave-based loading of the containment closure, followed by hydration.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::{GlossGraph, Resolved, ResolvedGloss};
use crate::error::{GlossError, Result};
use crate::model::{GlossId, GlossRecord, HydratedGloss};
use crate::store::RelationStore;

/// Resolves seed IDs into a hydrated [`GlossGraph`].
///
/// `contains` is followed to unbounded depth, one batched store call per
/// level; lateral relations are kept as one-hop references.
#[derive(Clone)]
pub struct GlossResolver {
    store: Arc<dyn RelationStore>,
}

impl GlossResolver {
    pub fn new(store: Arc<dyn RelationStore>) -> Self {
        Self { store }
    }

    /// Resolve every seed that exists; missing seeds are silently omitted.
    pub async fn resolve_by_ids(&self, seeds: &[GlossId]) -> Result<Resolved> {
        let seeds = dedup(seeds);
        if seeds.is_empty() {
            return Ok(Resolved::new(Arc::new(GlossGraph::default()), Vec::new()));
        }

        let table = self.load(&seeds).await?;
        let graph = Arc::new(hydrate(&table, &seeds));
        let found = seeds
            .into_iter()
            .filter(|id| graph.is_hydrated(id))
            .collect();
        Ok(Resolved::new(graph, found))
    }

    /// Resolve one gloss; `NotFound` if it does not exist.
    pub async fn resolve_single(&self, id: &str) -> Result<ResolvedGloss> {
        let resolved = self.resolve_by_ids(&[id.to_string()]).await?;
        let node = resolved
            .get(id)
            .cloned()
            .ok_or_else(|| GlossError::NotFound(format!("Gloss {} not found", id)))?;
        Ok(ResolvedGloss::new(Arc::clone(resolved.graph()), node))
    }

    /// Breadth-first over `contains`: each wave batch-fetches the frontier,
    /// and children not yet requested form the next frontier.
    async fn load(&self, seeds: &[GlossId]) -> Result<HashMap<GlossId, GlossRecord>> {
        let mut table: HashMap<GlossId, GlossRecord> = HashMap::new();
        // Requested IDs double as the visited set, so cycles and dangling
        // children are each asked for once.
        let mut requested: HashSet<GlossId> = HashSet::new();
        let mut frontier: Vec<GlossId> = seeds.to_vec();
        let mut wave = 0usize;

        while !frontier.is_empty() {
            let batch: Vec<GlossId> = frontier
                .drain(..)
                .filter(|id| requested.insert(id.clone()))
                .collect();
            if batch.is_empty() {
                break;
            }
            wave += 1;

            let records = self.store.find_by_ids(&batch).await?;
            log::debug!(
                "Resolution wave {}: requested {}, loaded {}",
                wave,
                batch.len(),
                records.len()
            );

            let mut next = Vec::new();
            for record in records {
                for child in &record.relations.contains {
                    if !requested.contains(&child.id) && !next.contains(&child.id) {
                        next.push(child.id.clone());
                    }
                }
                table.insert(record.id.clone(), record);
            }

            if wave > 1 {
                for id in batch.iter().filter(|id| !table.contains_key(*id)) {
                    log::warn!(
                        "{}",
                        GlossError::DanglingReference(format!("contained gloss {} is missing", id))
                    );
                }
            }

            frontier = next;
        }

        Ok(table)
    }
}

/// Build the identity map for everything reachable from `seeds` in `table`.
///
/// A node is registered in the memo before any of its targets is visited,
/// so mutually-containing glosses resolve to two shared entries instead of
/// recursing forever. Lateral targets are hydrated only when they are part
/// of the loaded table; anything else stays a reference and is followed as
/// a stub.
fn hydrate(table: &HashMap<GlossId, GlossRecord>, seeds: &[GlossId]) -> GlossGraph {
    let mut memo: HashMap<GlossId, HydratedGloss> = HashMap::with_capacity(table.len());
    let mut stack: Vec<&str> = seeds.iter().rev().map(String::as_str).collect();

    while let Some(id) = stack.pop() {
        if memo.contains_key(id) {
            continue;
        }
        let Some(record) = table.get(id) else {
            continue;
        };

        let mut node = HydratedGloss::scalars(record);
        node.relations = record.relations.clone();
        memo.insert(record.id.clone(), node);

        for (_, targets) in record.relations.iter() {
            for target in targets.iter().rev() {
                if !memo.contains_key(&target.id) && table.contains_key(&target.id) {
                    stack.push(&target.id);
                }
            }
        }
    }

    GlossGraph::from_nodes(memo)
}

fn dedup(ids: &[GlossId]) -> Vec<GlossId> {
    let mut seen = HashSet::new();
    ids.iter()
        .filter(|id| seen.insert(id.as_str()))
        .cloned()
        .collect()
}
