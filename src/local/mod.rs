//! Client-side store: flat gloss records deduplicated by natural key, plus
//! downloaded situations.
//!
//! A [`LocalStore`] is an ordinary handle over its own SQLite file; callers
//! construct it at startup and pass it to whatever needs it.

mod sync;

pub use sync::{SyncClient, SyncReport};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

use crate::db::{now_timestamp, parse_timestamp, Db};
use crate::error::Result;
use crate::model::{
    ExpressionChallengeWrite, FlatGloss, LanguageCode, LocalGloss, LocalizedString, Relations,
    SituationDto, SituationSummary, UnderstandingChallengeWrite,
};

const GLOSS_COLUMNS: &str = "id, remote_id, language, content, is_paraphrased, \
     transcriptions_json, notes_json, contains_ids, near_synonym_ids, near_homophone_ids, \
     translation_ids, clarifies_usage_ids, to_be_differentiated_from_ids, last_synced_at, \
     updated_at";

const SITUATION_COLUMNS: &str = "identifier, descriptions_json, image_link, target_language, \
     expression_json, understanding_json, last_synced_at, updated_at";

// Most recently synced first when a stale entry still names the same remote ID.
const REMOTE_ID_FILTER: &str = "remote_id = ?1 ORDER BY last_synced_at DESC";

/// A downloaded situation; challenges keep gloss IDs only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalSituation {
    pub identifier: String,
    pub descriptions: Vec<LocalizedString>,
    pub image_link: Option<String>,
    pub target_language: LanguageCode,
    pub challenges_of_expression: Vec<ExpressionChallengeWrite>,
    pub challenges_of_understanding_text: Vec<UnderstandingChallengeWrite>,
    pub last_synced_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LocalSituation {
    /// Challenges downloaded so far; summaries alone carry none.
    pub fn has_challenges(&self) -> bool {
        !self.challenges_of_expression.is_empty()
            || !self.challenges_of_understanding_text.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct LocalStore {
    db: Db,
}

impl LocalStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Open (creating if needed) and migrate the store at `path`.
    pub async fn open(path: impl AsRef<Path>, migrations_dir: &Path) -> Result<Self> {
        let db = Db::new(path);
        db.migrate(migrations_dir).await?;
        Ok(Self::new(db))
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    /// Merge one record by `(language, content)`.
    pub async fn upsert(&self, record: &FlatGloss) -> Result<LocalGloss> {
        let mut stored = self.upsert_many(std::slice::from_ref(record)).await?;
        stored.pop().ok_or_else(|| {
            let message = format!("Gloss {} vanished during upsert", record.id);
            crate::error::GlossError::NotFound(message)
        })
    }

    /// Merge a batch in one transaction; either every record lands or none.
    ///
    /// An existing entry with the same natural key is updated in place and
    /// keeps its local ID. Failing that, an entry tracking the same remote
    /// ID is updated (the natural key changed upstream). Otherwise the record
    /// is inserted under its remote ID, or a fresh local ID when another
    /// entry already owns that one. Later records in the batch win over
    /// earlier ones.
    pub async fn upsert_many(&self, records: &[FlatGloss]) -> Result<Vec<LocalGloss>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let records = records.to_vec();
        self.db
            .with_connection(move |conn| {
                let tx = conn.transaction()?;
                let mut local_ids = Vec::with_capacity(records.len());
                for record in &records {
                    local_ids.push(upsert_record(&tx, record)?);
                }
                let mut stored = Vec::with_capacity(local_ids.len());
                for local_id in &local_ids {
                    if let Some(gloss) = select_gloss(&tx, "id = ?1", local_id)? {
                        stored.push(gloss);
                    }
                }
                tx.commit()?;
                log::debug!("Upserted {} local glosses", records.len());
                Ok(stored)
            })
            .await
    }

    pub async fn get(&self, local_id: &str) -> Result<Option<LocalGloss>> {
        let id = local_id.to_string();
        self.db.with_connection(move |conn| select_gloss(conn, "id = ?1", &id)).await
    }

    pub async fn get_by_remote_id(&self, remote_id: &str) -> Result<Option<LocalGloss>> {
        let id = remote_id.to_string();
        self.db
            .with_connection(move |conn| select_gloss(conn, REMOTE_ID_FILTER, &id))
            .await
    }

    /// Entries whose remote or local ID is in `ids`, in `ids` order; unknown
    /// IDs are skipped. A remote ID match wins over a local one.
    pub async fn get_many(&self, ids: &[String]) -> Result<Vec<LocalGloss>> {
        let ids = ids.to_vec();
        self.db
            .with_connection(move |conn| {
                let mut out = Vec::with_capacity(ids.len());
                for id in &ids {
                    let found = match select_gloss(conn, REMOTE_ID_FILTER, id)? {
                        Some(gloss) => Some(gloss),
                        None => select_gloss(conn, "id = ?1", id)?,
                    };
                    if let Some(gloss) = found {
                        if !out.iter().any(|g: &LocalGloss| g.local_id == gloss.local_id) {
                            out.push(gloss);
                        }
                    }
                }
                Ok(out)
            })
            .await
    }

    pub async fn find_by_natural_key(
        &self,
        language: LanguageCode,
        content: &str,
    ) -> Result<Option<LocalGloss>> {
        let content = content.to_string();
        self.db
            .with_connection(move |conn| {
                let sql = format!(
                    "SELECT {} FROM local_glosses WHERE language = ?1 AND content = ?2",
                    GLOSS_COLUMNS
                );
                let raw = conn
                    .query_row(&sql, params![language.as_str(), content], RawLocalGloss::from_row)
                    .optional()?;
                raw.map(RawLocalGloss::into_gloss).transpose()
            })
            .await
    }

    pub async fn by_language(&self, language: LanguageCode) -> Result<Vec<LocalGloss>> {
        self.db
            .with_connection(move |conn| {
                let sql = format!(
                    "SELECT {} FROM local_glosses WHERE language = ?1 ORDER BY content",
                    GLOSS_COLUMNS
                );
                let mut stmt = conn.prepare(&sql)?;
                let raws = stmt
                    .query_map(params![language.as_str()], RawLocalGloss::from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                raws.into_iter().map(RawLocalGloss::into_gloss).collect()
            })
            .await
    }

    /// Returns whether an entry was removed.
    pub async fn delete(&self, local_id: &str) -> Result<bool> {
        let id = local_id.to_string();
        self.db
            .with_connection(move |conn| {
                Ok(conn.execute("DELETE FROM local_glosses WHERE id = ?1", params![id])? > 0)
            })
            .await
    }

    /// Drop every gloss and situation; returns the number of glosses removed.
    pub async fn clear(&self) -> Result<usize> {
        self.db
            .with_connection(|conn| {
                let tx = conn.transaction()?;
                let removed = tx.execute("DELETE FROM local_glosses", [])?;
                tx.execute("DELETE FROM local_situations", [])?;
                tx.commit()?;
                Ok(removed)
            })
            .await
    }

    pub async fn count(&self) -> Result<usize> {
        self.db
            .with_connection(|conn| {
                let n: i64 =
                    conn.query_row("SELECT COUNT(*) FROM local_glosses", [], |row| row.get(0))?;
                Ok(n as usize)
            })
            .await
    }

    /// Store a full situation, reducing embedded glosses to their IDs.
    pub async fn upsert_situation(&self, situation: &SituationDto) -> Result<LocalSituation> {
        let expression: Vec<ExpressionChallengeWrite> = situation
            .challenges_of_expression
            .iter()
            .map(|c| ExpressionChallengeWrite {
                identifier: c.identifier.clone(),
                prompts: c.prompts.clone(),
                gloss_ids: c.glosses.iter().map(|g| g.id.clone()).collect(),
            })
            .collect();
        let understanding: Vec<UnderstandingChallengeWrite> = situation
            .challenges_of_understanding_text
            .iter()
            .map(|c| UnderstandingChallengeWrite {
                text: c.text.clone(),
                language: c.language,
                gloss_ids: c.glosses.iter().map(|g| g.id.clone()).collect(),
            })
            .collect();

        let identifier = situation.identifier.clone();
        let descriptions = serde_json::to_string(&situation.descriptions)?;
        let image_link = situation.image_link.clone();
        let language = situation.target_language;
        let expression = serde_json::to_string(&expression)?;
        let understanding = serde_json::to_string(&understanding)?;

        self.db
            .with_connection(move |conn| {
                let now = now_timestamp();
                conn.execute(
                    "INSERT INTO local_situations (identifier, descriptions_json, image_link, \
                       target_language, expression_json, understanding_json, last_synced_at, \
                       updated_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7) \
                     ON CONFLICT(identifier) DO UPDATE SET \
                       descriptions_json = excluded.descriptions_json, \
                       image_link = excluded.image_link, \
                       target_language = excluded.target_language, \
                       expression_json = excluded.expression_json, \
                       understanding_json = excluded.understanding_json, \
                       last_synced_at = excluded.last_synced_at, \
                       updated_at = excluded.updated_at",
                    params![
                        identifier,
                        descriptions,
                        image_link,
                        language.as_str(),
                        expression,
                        understanding,
                        now
                    ],
                )?;
                require_situation(conn, &identifier)
            })
            .await
    }

    /// Store summary metadata; challenges already downloaded are kept.
    pub async fn upsert_situation_summary(
        &self,
        summary: &SituationSummary,
    ) -> Result<LocalSituation> {
        let identifier = summary.identifier.clone();
        let descriptions = serde_json::to_string(&summary.descriptions)?;
        let image_link = summary.image_link.clone();
        let language = summary.target_language;

        self.db
            .with_connection(move |conn| {
                let now = now_timestamp();
                conn.execute(
                    "INSERT INTO local_situations (identifier, descriptions_json, image_link, \
                       target_language, last_synced_at, updated_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?5) \
                     ON CONFLICT(identifier) DO UPDATE SET \
                       descriptions_json = excluded.descriptions_json, \
                       image_link = excluded.image_link, \
                       target_language = excluded.target_language, \
                       last_synced_at = excluded.last_synced_at, \
                       updated_at = excluded.updated_at",
                    params![identifier, descriptions, image_link, language.as_str(), now],
                )?;
                require_situation(conn, &identifier)
            })
            .await
    }

    pub async fn get_situation(&self, identifier: &str) -> Result<Option<LocalSituation>> {
        let identifier = identifier.to_string();
        self.db
            .with_connection(move |conn| select_situation(conn, &identifier))
            .await
    }

    pub async fn situations_by_language(
        &self,
        language: LanguageCode,
    ) -> Result<Vec<LocalSituation>> {
        self.db
            .with_connection(move |conn| {
                let sql = format!(
                    "SELECT {} FROM local_situations \
                     WHERE target_language = ?1 ORDER BY identifier",
                    SITUATION_COLUMNS
                );
                let mut stmt = conn.prepare(&sql)?;
                let raws = stmt
                    .query_map(params![language.as_str()], RawLocalSituation::from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                raws.into_iter().map(RawLocalSituation::into_situation).collect()
            })
            .await
    }

    pub async fn delete_situation(&self, identifier: &str) -> Result<bool> {
        let identifier = identifier.to_string();
        self.db
            .with_connection(move |conn| {
                Ok(conn.execute(
                    "DELETE FROM local_situations WHERE identifier = ?1",
                    params![identifier],
                )? > 0)
            })
            .await
    }
}

/// Returns the local ID the record ended up under.
fn upsert_record(conn: &Connection, record: &FlatGloss) -> Result<String> {
    let by_natural_key: Option<String> = conn
        .query_row(
            "SELECT id FROM local_glosses WHERE language = ?1 AND content = ?2",
            params![record.language.as_str(), record.content],
            |row| row.get(0),
        )
        .optional()?;
    let existing = match by_natural_key {
        Some(id) => Some(id),
        None => conn
            .query_row(
                "SELECT id FROM local_glosses WHERE remote_id = ?1 \
                 ORDER BY last_synced_at DESC LIMIT 1",
                params![record.id],
                |row| row.get(0),
            )
            .optional()?,
    };

    let ids = &record.relation_ids;
    let now = now_timestamp();
    let values = (
        serde_json::to_string(&record.transcriptions)?,
        serde_json::to_string(&record.notes)?,
        serde_json::to_string(&ids.contains)?,
        serde_json::to_string(&ids.near_synonyms)?,
        serde_json::to_string(&ids.near_homophones)?,
        serde_json::to_string(&ids.translations)?,
        serde_json::to_string(&ids.clarifies_usage)?,
        serde_json::to_string(&ids.to_be_differentiated_from)?,
    );

    match existing {
        Some(local_id) => {
            conn.execute(
                "UPDATE local_glosses SET remote_id = ?1, language = ?2, content = ?3, \
                   is_paraphrased = ?4, transcriptions_json = ?5, notes_json = ?6, \
                   contains_ids = ?7, near_synonym_ids = ?8, near_homophone_ids = ?9, \
                   translation_ids = ?10, clarifies_usage_ids = ?11, \
                   to_be_differentiated_from_ids = ?12, last_synced_at = ?13, updated_at = ?13 \
                 WHERE id = ?14",
                params![
                    record.id,
                    record.language.as_str(),
                    record.content,
                    record.is_paraphrased,
                    values.0,
                    values.1,
                    values.2,
                    values.3,
                    values.4,
                    values.5,
                    values.6,
                    values.7,
                    now,
                    local_id
                ],
            )?;
            Ok(local_id)
        }
        None => {
            // The remote ID doubles as local ID unless an entry already holds it.
            let taken = conn
                .query_row(
                    "SELECT 1 FROM local_glosses WHERE id = ?1",
                    params![record.id],
                    |_| Ok(()),
                )
                .optional()?
                .is_some();
            let local_id = if taken {
                Uuid::new_v4().to_string()
            } else {
                record.id.clone()
            };
            conn.execute(
                "INSERT INTO local_glosses (id, remote_id, language, content, is_paraphrased, \
                   transcriptions_json, notes_json, contains_ids, near_synonym_ids, \
                   near_homophone_ids, translation_ids, clarifies_usage_ids, \
                   to_be_differentiated_from_ids, last_synced_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?14)",
                params![
                    local_id,
                    record.id,
                    record.language.as_str(),
                    record.content,
                    record.is_paraphrased,
                    values.0,
                    values.1,
                    values.2,
                    values.3,
                    values.4,
                    values.5,
                    values.6,
                    values.7,
                    now
                ],
            )?;
            Ok(local_id)
        }
    }
}

struct RawLocalGloss {
    id: String,
    remote_id: String,
    language: String,
    content: String,
    is_paraphrased: bool,
    transcriptions: String,
    notes: String,
    relations: [String; 6],
    last_synced_at: String,
    updated_at: String,
}

impl RawLocalGloss {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            remote_id: row.get(1)?,
            language: row.get(2)?,
            content: row.get(3)?,
            is_paraphrased: row.get(4)?,
            transcriptions: row.get(5)?,
            notes: row.get(6)?,
            relations: [
                row.get(7)?,
                row.get(8)?,
                row.get(9)?,
                row.get(10)?,
                row.get(11)?,
                row.get(12)?,
            ],
            last_synced_at: row.get(13)?,
            updated_at: row.get(14)?,
        })
    }

    fn into_gloss(self) -> Result<LocalGloss> {
        let [
            contains,
            near_synonyms,
            near_homophones,
            translations,
            clarifies_usage,
            to_be_differentiated_from,
        ] = self.relations;
        Ok(LocalGloss {
            local_id: self.id,
            record: FlatGloss {
                id: self.remote_id,
                language: self.language.parse()?,
                content: self.content,
                is_paraphrased: self.is_paraphrased,
                transcriptions: serde_json::from_str(&self.transcriptions)?,
                notes: serde_json::from_str(&self.notes)?,
                relation_ids: Relations {
                    contains: serde_json::from_str(&contains)?,
                    near_synonyms: serde_json::from_str(&near_synonyms)?,
                    near_homophones: serde_json::from_str(&near_homophones)?,
                    translations: serde_json::from_str(&translations)?,
                    clarifies_usage: serde_json::from_str(&clarifies_usage)?,
                    to_be_differentiated_from: serde_json::from_str(&to_be_differentiated_from)?,
                },
            },
            last_synced_at: parse_timestamp(&self.last_synced_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

/// `filter` is a WHERE clause over one `?1` parameter.
fn select_gloss(conn: &Connection, filter: &str, value: &str) -> Result<Option<LocalGloss>> {
    let sql = format!("SELECT {} FROM local_glosses WHERE {} LIMIT 1", GLOSS_COLUMNS, filter);
    let raw = conn
        .query_row(&sql, params![value], RawLocalGloss::from_row)
        .optional()?;
    raw.map(RawLocalGloss::into_gloss).transpose()
}

struct RawLocalSituation {
    identifier: String,
    descriptions: String,
    image_link: Option<String>,
    target_language: String,
    expression: String,
    understanding: String,
    last_synced_at: String,
    updated_at: String,
}

impl RawLocalSituation {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            identifier: row.get(0)?,
            descriptions: row.get(1)?,
            image_link: row.get(2)?,
            target_language: row.get(3)?,
            expression: row.get(4)?,
            understanding: row.get(5)?,
            last_synced_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }

    fn into_situation(self) -> Result<LocalSituation> {
        Ok(LocalSituation {
            identifier: self.identifier,
            descriptions: serde_json::from_str(&self.descriptions)?,
            image_link: self.image_link,
            target_language: self.target_language.parse()?,
            challenges_of_expression: serde_json::from_str(&self.expression)?,
            challenges_of_understanding_text: serde_json::from_str(&self.understanding)?,
            last_synced_at: parse_timestamp(&self.last_synced_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

fn select_situation(conn: &Connection, identifier: &str) -> Result<Option<LocalSituation>> {
    let sql = format!("SELECT {} FROM local_situations WHERE identifier = ?1", SITUATION_COLUMNS);
    let raw = conn
        .query_row(&sql, params![identifier], RawLocalSituation::from_row)
        .optional()?;
    raw.map(RawLocalSituation::into_situation).transpose()
}

fn require_situation(conn: &Connection, identifier: &str) -> Result<LocalSituation> {
    select_situation(conn, identifier)?.ok_or_else(|| {
        let message = format!("Situation {} vanished during upsert", identifier);
        crate::error::GlossError::NotFound(message)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ChallengeCount, ChallengeOfExpression, GlossDto, GlossRef, Note};
    use crate::test_support::local_store;
    use LanguageCode::{Eng, Spa};

    fn flat(id: &str, language: LanguageCode, content: &str) -> FlatGloss {
        FlatGloss {
            id: id.to_string(),
            language,
            content: content.to_string(),
            is_paraphrased: false,
            transcriptions: Vec::new(),
            notes: Vec::new(),
            relation_ids: Relations::default(),
        }
    }

    fn note(content: &str) -> Note {
        Note {
            note_type: "usage".to_string(),
            content: content.to_string(),
            show_before_solution: false,
        }
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let (store, _temp) = local_store().await;
        let record = flat("r1", Spa, "hola");

        let first = store.upsert(&record).await.unwrap();
        let second = store.upsert(&record).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(first.local_id, second.local_id);
        assert_eq!(second.record, record);
        assert!(second.updated_at >= first.updated_at);
    }

    #[tokio::test]
    async fn test_upsert_many_last_write_wins() {
        let (store, _temp) = local_store().await;
        let original = store.upsert(&flat("r1", Spa, "hola")).await.unwrap();

        let mut a = flat("r1", Spa, "hola");
        a.notes = vec![note("first")];
        let mut a2 = flat("r1", Spa, "hola");
        a2.notes = vec![note("second")];

        let stored = store.upsert_many(&[a, a2]).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(store.count().await.unwrap(), 1);

        let current = store.find_by_natural_key(Spa, "hola").await.unwrap().unwrap();
        assert_eq!(current.local_id, original.local_id);
        assert_eq!(current.record.notes, vec![note("second")]);
    }

    #[tokio::test]
    async fn test_natural_key_match_keeps_local_id_across_remote_ids() {
        let (store, _temp) = local_store().await;
        let first = store.upsert(&flat("server-a", Spa, "hola")).await.unwrap();
        // Server was reseeded: same gloss, new surrogate.
        let second = store.upsert(&flat("server-b", Spa, "hola")).await.unwrap();

        assert_eq!(first.local_id, second.local_id);
        assert_eq!(second.record.id, "server-b");
        assert!(store.get_by_remote_id("server-a").await.unwrap().is_none());
        assert_eq!(store.get_many(&["server-b".to_string()]).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reseeded_remote_id_does_not_clobber_other_gloss() {
        let (store, _temp) = local_store().await;
        store.upsert(&flat("A", Spa, "hola")).await.unwrap();
        // After a reseed "hola" comes back as B, and A now names another gloss.
        store.upsert(&flat("B", Spa, "hola")).await.unwrap();
        let adios = store.upsert(&flat("A", Spa, "adiós")).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 2);
        let hola = store.find_by_natural_key(Spa, "hola").await.unwrap().unwrap();
        assert_eq!(hola.local_id, "A");
        assert_eq!(hola.record.id, "B");
        assert_ne!(adios.local_id, "A");
        assert_eq!(adios.record.id, "A");
        assert_eq!(adios.record.content, "adiós");

        let by_remote = store.get_many(&["A".to_string(), "B".to_string()]).await.unwrap();
        let contents: Vec<_> = by_remote.iter().map(|g| g.record.content.as_str()).collect();
        assert_eq!(contents, vec!["adiós", "hola"]);
        assert_eq!(store.get_by_remote_id("A").await.unwrap().unwrap().local_id, adios.local_id);
    }

    #[tokio::test]
    async fn test_renamed_upstream_updates_in_place() {
        let (store, _temp) = local_store().await;
        let first = store.upsert(&flat("r1", Spa, "ola")).await.unwrap();
        let renamed = store.upsert(&flat("r1", Spa, "hola")).await.unwrap();

        assert_eq!(first.local_id, renamed.local_id);
        assert_eq!(store.count().await.unwrap(), 1);
        assert!(store.find_by_natural_key(Spa, "ola").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_many_is_atomic() {
        let (store, _temp) = local_store().await;
        store
            .db()
            .with_connection(|conn| {
                conn.execute_batch(
                    "CREATE TRIGGER reject_boom BEFORE INSERT ON local_glosses \
                     WHEN NEW.content = 'boom' BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
                )?;
                Ok(())
            })
            .await
            .unwrap();

        let batch = vec![flat("ok", Spa, "hola"), flat("bad", Spa, "boom")];
        assert!(store.upsert_many(&batch).await.is_err());
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_queries_and_delete() {
        let (store, _temp) = local_store().await;
        store
            .upsert_many(&[flat("b", Spa, "bien"), flat("a", Spa, "agua"), flat("e", Eng, "water")])
            .await
            .unwrap();

        let spanish: Vec<_> = store
            .by_language(Spa)
            .await
            .unwrap()
            .into_iter()
            .map(|g| g.record.content)
            .collect();
        assert_eq!(spanish, vec!["agua", "bien"]);

        let many = store
            .get_many(&["e".to_string(), "zzz".to_string(), "a".to_string()])
            .await
            .unwrap();
        assert_eq!(many.iter().map(|g| g.local_id.as_str()).collect::<Vec<_>>(), vec!["e", "a"]);

        assert!(store.delete("a").await.unwrap());
        assert!(!store.delete("a").await.unwrap());
        assert!(store.get("a").await.unwrap().is_none());
        assert_eq!(store.clear().await.unwrap(), 2);
        assert_eq!(store.count().await.unwrap(), 0);
    }

    fn situation() -> SituationDto {
        let gloss = GlossDto::stub(&GlossRef {
            id: "g1".to_string(),
            language: Eng,
            content: "the cat".to_string(),
        });
        SituationDto {
            identifier: "vet".to_string(),
            descriptions: vec![LocalizedString {
                language: Eng,
                content: "At the vet".to_string(),
            }],
            image_link: None,
            target_language: Spa,
            challenges_of_expression: vec![ChallengeOfExpression {
                identifier: "say-cat".to_string(),
                prompts: vec![LocalizedString { language: Eng, content: "Say it".to_string() }],
                glosses: vec![gloss],
            }],
            challenges_of_understanding_text: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_situation_summary_keeps_challenges() {
        let (store, _temp) = local_store().await;
        let stored = store.upsert_situation(&situation()).await.unwrap();
        assert_eq!(stored.challenges_of_expression[0].gloss_ids, vec!["g1".to_string()]);

        let summary = SituationSummary {
            identifier: "vet".to_string(),
            descriptions: vec![LocalizedString {
                language: Eng,
                content: "At the animal doctor".to_string(),
            }],
            image_link: Some("vet.png".to_string()),
            target_language: Spa,
            challenge_count: ChallengeCount { expression: 1, understanding: 0 },
        };
        let updated = store.upsert_situation_summary(&summary).await.unwrap();
        assert!(updated.has_challenges());
        assert_eq!(updated.descriptions[0].content, "At the animal doctor");
        assert_eq!(updated.image_link.as_deref(), Some("vet.png"));

        let fresh = SituationSummary { identifier: "market".to_string(), ..summary };
        assert!(!store.upsert_situation_summary(&fresh).await.unwrap().has_challenges());

        assert_eq!(store.situations_by_language(Spa).await.unwrap().len(), 2);
        assert!(store.situations_by_language(Eng).await.unwrap().is_empty());
        assert!(store.delete_situation("vet").await.unwrap());
        assert!(store.get_situation("vet").await.unwrap().is_none());
    }
}
