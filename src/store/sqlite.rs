use async_trait::async_trait;
use rusqlite::Connection;
use std::collections::HashMap;

use super::RelationStore;
use crate::db::Db;
use crate::error::{GlossError, Result};
use crate::model::{GlossId, GlossRecord, GlossRef, LanguageCode, RelationKind};

// Stay well below SQLITE_MAX_VARIABLE_NUMBER on older builds.
const MAX_IDS_PER_QUERY: usize = 500;

/// Reads gloss records out of the server database.
#[derive(Debug, Clone)]
pub struct SqliteGlossStore {
    db: Db,
}

impl SqliteGlossStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &Db {
        &self.db
    }
}

#[async_trait]
impl RelationStore for SqliteGlossStore {
    async fn find_by_ids(&self, ids: &[GlossId]) -> Result<Vec<GlossRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids = ids.to_vec();
        self.db.with_connection(move |conn| read_records(conn, &ids)).await
    }
}

struct RawGloss {
    id: String,
    language: String,
    content: String,
    is_paraphrased: bool,
    transcriptions_json: String,
    notes_json: String,
}

struct RawRelation {
    source_id: String,
    relation_type: String,
    target_id: String,
    target_language: Option<String>,
    target_content: Option<String>,
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(",")
}

/// Load records plus denormalized relation references, in `ids` order.
///
/// Relation rows whose target is gone are dropped with a warning.
pub fn read_records(conn: &Connection, ids: &[GlossId]) -> Result<Vec<GlossRecord>> {
    let mut records: Vec<GlossRecord> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for chunk in ids.chunks(MAX_IDS_PER_QUERY) {
        let query = format!(
            "SELECT id, language, content, is_paraphrased, transcriptions_json, notes_json \
             FROM glosses WHERE id IN ({})",
            placeholders(chunk.len())
        );
        let mut stmt = conn.prepare(&query)?;
        let raws = stmt
            .query_map(rusqlite::params_from_iter(chunk.iter()), |row| {
                Ok(RawGloss {
                    id: row.get(0)?,
                    language: row.get(1)?,
                    content: row.get(2)?,
                    is_paraphrased: row.get(3)?,
                    transcriptions_json: row.get(4)?,
                    notes_json: row.get(5)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;

        for raw in raws {
            if index.contains_key(&raw.id) {
                continue;
            }
            let record = GlossRecord {
                language: raw.language.parse()?,
                content: raw.content,
                is_paraphrased: raw.is_paraphrased,
                transcriptions: serde_json::from_str(&raw.transcriptions_json)?,
                notes: serde_json::from_str(&raw.notes_json)?,
                relations: Default::default(),
                id: raw.id,
            };
            index.insert(record.id.clone(), records.len());
            records.push(record);
        }

        let query = format!(
            "SELECT r.source_id, r.relation_type, r.target_id, g.language, g.content \
             FROM gloss_relations r LEFT JOIN glosses g ON g.id = r.target_id \
             WHERE r.source_id IN ({}) \
             ORDER BY r.source_id, r.relation_type, r.position",
            placeholders(chunk.len())
        );
        let mut stmt = conn.prepare(&query)?;
        let relations = stmt
            .query_map(rusqlite::params_from_iter(chunk.iter()), |row| {
                Ok(RawRelation {
                    source_id: row.get(0)?,
                    relation_type: row.get(1)?,
                    target_id: row.get(2)?,
                    target_language: row.get(3)?,
                    target_content: row.get(4)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;

        for rel in relations {
            let Some(&pos) = index.get(&rel.source_id) else {
                continue;
            };
            let Some(kind) = RelationKind::from_db(&rel.relation_type) else {
                log::warn!(
                    "Ignoring unknown relation type '{}' on gloss {}",
                    rel.relation_type,
                    rel.source_id
                );
                continue;
            };
            let (Some(language), Some(content)) = (rel.target_language, rel.target_content) else {
                log::warn!(
                    "{}",
                    GlossError::DanglingReference(format!(
                        "{} --{}--> {}",
                        rel.source_id,
                        kind.as_str(),
                        rel.target_id
                    ))
                );
                continue;
            };
            let language: LanguageCode = language.parse()?;
            records[pos].relations.get_mut(kind).push(GlossRef {
                id: rel.target_id,
                language,
                content,
            });
        }
    }

    let mut ordered = Vec::with_capacity(records.len());
    let mut slots: Vec<Option<GlossRecord>> = records.into_iter().map(Some).collect();
    for id in ids {
        if let Some(&pos) = index.get(id) {
            if let Some(record) = slots[pos].take() {
                ordered.push(record);
            }
        }
    }
    Ok(ordered)
}
