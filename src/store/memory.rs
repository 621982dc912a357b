use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use super::RelationStore;
use crate::error::Result;
use crate::model::{GlossId, GlossRecord, GlossRef, LanguageCode, Note, RelationKind, Relations};

/// In-process record store.
///
/// Holds records exactly as given, so it can represent states the SQLite
/// schema forbids (dangling references, self-containment). Every
/// `find_by_ids` call is logged for round-trip assertions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: HashMap<GlossId, GlossRecord>,
    batches: Mutex<Vec<Vec<GlossId>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record: GlossRecord) {
        self.records.insert(record.id.clone(), record);
    }

    /// Add a bare gloss with no relations.
    pub fn gloss(&mut self, id: &str, language: LanguageCode, content: &str) -> &mut Self {
        self.insert(GlossRecord {
            id: id.to_string(),
            language,
            content: content.to_string(),
            is_paraphrased: false,
            transcriptions: Vec::new(),
            notes: Vec::new(),
            relations: Relations::default(),
        });
        self
    }

    pub fn note(&mut self, id: &str, note: Note) -> &mut Self {
        if let Some(record) = self.records.get_mut(id) {
            record.notes.push(note);
        }
        self
    }

    /// Add an edge. The target reference is denormalized from the stored
    /// target when present; otherwise `fallback` describes it.
    pub fn relate(
        &mut self,
        source: &str,
        kind: RelationKind,
        target: &str,
        fallback: Option<(LanguageCode, &str)>,
    ) -> &mut Self {
        let reference = match (self.records.get(target), fallback) {
            (Some(record), _) => Some(record.reference()),
            (None, Some((language, content))) => Some(GlossRef {
                id: target.to_string(),
                language,
                content: content.to_string(),
            }),
            (None, None) => None,
        };
        if let (Some(reference), Some(record)) = (reference, self.records.get_mut(source)) {
            record.relations.get_mut(kind).push(reference);
        }
        self
    }

    /// ID batches requested so far, one entry per round trip.
    pub fn batches(&self) -> Vec<Vec<GlossId>> {
        self.batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl RelationStore for MemoryStore {
    async fn find_by_ids(&self, ids: &[GlossId]) -> Result<Vec<GlossRecord>> {
        self.batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ids.to_vec());
        Ok(ids
            .iter()
            .filter_map(|id| self.records.get(id).cloned())
            .collect())
    }
}
