use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::db::{now_timestamp, Db};
use crate::error::{GlossError, Result};
use crate::graph::GlossResolver;
use crate::model::{GlossDto, GlossId, GlossUpdate, GlossWrite, LanguageCode, RelationKind};
use crate::store::SqliteGlossStore;

/// CRUD over server-side glosses; reads go through the resolver.
#[derive(Clone)]
pub struct GlossService {
    db: Db,
    resolver: GlossResolver,
}

impl GlossService {
    pub fn new(db: Db) -> Self {
        let resolver = GlossResolver::new(Arc::new(SqliteGlossStore::new(db.clone())));
        Self { db, resolver }
    }

    pub fn resolver(&self) -> &GlossResolver {
        &self.resolver
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    /// Insert a gloss and its relation sets, returning the resolved DTO.
    pub async fn create(&self, write: GlossWrite) -> Result<GlossDto> {
        let content = validated_content(&write.content)?;
        let id = Uuid::new_v4().to_string();

        let new_id = id.clone();
        self.db
            .with_connection(move |conn| {
                let tx = conn.transaction()?;
                for (_, targets) in write.relations.iter() {
                    ensure_glosses_exist(&tx, targets, None)?;
                }

                tx.execute(
                    "INSERT INTO glosses (id, language, content, is_paraphrased, \
                       transcriptions_json, notes_json, updated_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        new_id,
                        write.language.as_str(),
                        content,
                        write.is_paraphrased,
                        serde_json::to_string(&write.transcriptions)?,
                        serde_json::to_string(&write.notes)?,
                        now_timestamp(),
                    ],
                )
                .map_err(|e| natural_key_conflict(e, write.language, &content))?;

                for (kind, targets) in write.relations.iter() {
                    replace_relations(&tx, &new_id, kind, targets)?;
                }
                tx.commit()?;
                Ok(())
            })
            .await?;

        log::debug!("Created gloss {}", id);
        self.find_by_id(&id).await
    }

    /// Partial update. Present relation lists replace the stored sets.
    pub async fn update(&self, id: &str, update: GlossUpdate) -> Result<GlossDto> {
        let content = update.content.as_deref().map(validated_content).transpose()?;

        let gloss_id = id.to_string();
        self.db
            .with_connection(move |conn| {
                let tx = conn.transaction()?;
                let current = tx
                    .query_row(
                        "SELECT language, content, is_paraphrased, transcriptions_json, notes_json \
                         FROM glosses WHERE id = ?1",
                        params![gloss_id],
                        |row| {
                            Ok((
                                row.get::<_, String>(0)?,
                                row.get::<_, String>(1)?,
                                row.get::<_, bool>(2)?,
                                row.get::<_, String>(3)?,
                                row.get::<_, String>(4)?,
                            ))
                        },
                    )
                    .optional()?
                    .ok_or_else(|| GlossError::NotFound(format!("Gloss {} not found", gloss_id)))?;

                let language = match update.language {
                    Some(language) => language,
                    None => current.0.parse()?,
                };
                let content = content.unwrap_or(current.1);
                let is_paraphrased = update.is_paraphrased.unwrap_or(current.2);
                let transcriptions = match &update.transcriptions {
                    Some(t) => serde_json::to_string(t)?,
                    None => current.3,
                };
                let notes = match &update.notes {
                    Some(n) => serde_json::to_string(n)?,
                    None => current.4,
                };

                tx.execute(
                    "UPDATE glosses SET language = ?1, content = ?2, is_paraphrased = ?3, \
                     transcriptions_json = ?4, notes_json = ?5, updated_at = ?6 WHERE id = ?7",
                    params![
                        language.as_str(),
                        content,
                        is_paraphrased,
                        transcriptions,
                        notes,
                        now_timestamp(),
                        gloss_id
                    ],
                )
                .map_err(|e| natural_key_conflict(e, language, &content))?;

                for (kind, targets) in &update.relations {
                    ensure_glosses_exist(&tx, targets, Some(&gloss_id))?;
                    replace_relations(&tx, &gloss_id, *kind, targets)?;
                }
                tx.commit()?;
                Ok(())
            })
            .await?;

        self.find_by_id(id).await
    }

    /// Delete a gloss nothing else references.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let gloss_id = id.to_string();
        self.db
            .with_connection(move |conn| {
                let tx = conn.transaction()?;
                if !gloss_exists(&tx, &gloss_id)? {
                    return Err(GlossError::NotFound(format!("Gloss {} not found", gloss_id)));
                }

                let from_glosses: i64 = tx.query_row(
                    "SELECT COUNT(*) FROM gloss_relations WHERE target_id = ?1 AND source_id != ?1",
                    params![gloss_id],
                    |row| row.get(0),
                )?;
                let from_challenges: i64 = tx.query_row(
                    "SELECT COUNT(*) FROM challenge_glosses WHERE gloss_id = ?1",
                    params![gloss_id],
                    |row| row.get(0),
                )?;
                if from_glosses > 0 || from_challenges > 0 {
                    return Err(GlossError::Conflict(format!(
                        "Gloss {} is referenced by {} gloss relation(s) and {} challenge(s)",
                        gloss_id, from_glosses, from_challenges
                    )));
                }

                // Own edges first, so a self-loop does not trip the RESTRICT on target_id.
                tx.execute("DELETE FROM gloss_relations WHERE source_id = ?1", params![gloss_id])?;
                tx.execute("DELETE FROM glosses WHERE id = ?1", params![gloss_id])
                    .map_err(|e| {
                        let message = format!("Gloss {} is still referenced", gloss_id);
                        GlossError::from_constraint(e, message)
                    })?;
                tx.commit()?;
                Ok(())
            })
            .await?;

        log::debug!("Deleted gloss {}", id);
        Ok(())
    }

    pub async fn find_by_id(&self, id: &str) -> Result<GlossDto> {
        Ok(self.resolver.resolve_single(id).await?.to_dto())
    }

    /// Resolved glosses, most recently updated first.
    ///
    /// Filtering by content requires a language, since only the pair is unique.
    pub async fn list(
        &self,
        language: Option<LanguageCode>,
        content: Option<&str>,
    ) -> Result<Vec<GlossDto>> {
        if content.is_some() && language.is_none() {
            return Err(GlossError::InvalidInput(
                "content filter requires a language".to_string(),
            ));
        }

        let content = content.map(str::to_string);
        let ids: Vec<GlossId> = self
            .db
            .with_connection(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id FROM glosses \
                     WHERE (?1 IS NULL OR language = ?1) AND (?2 IS NULL OR content = ?2) \
                     ORDER BY updated_at DESC, rowid DESC",
                )?;
                let ids = stmt
                    .query_map(params![language.map(|l| l.as_str()), content], |row| row.get(0))?
                    .collect::<std::result::Result<Vec<String>, _>>()?;
                Ok(ids)
            })
            .await?;

        let resolved = self.resolver.resolve_by_ids(&ids).await?;
        Ok(ids.iter().filter_map(|id| resolved.dto(id)).collect())
    }

    /// ID of the gloss with this natural key, if any.
    pub async fn find_id_by_natural_key(
        &self,
        language: LanguageCode,
        content: &str,
    ) -> Result<Option<GlossId>> {
        let content = content.to_string();
        self.db
            .with_connection(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT id FROM glosses WHERE language = ?1 AND content = ?2",
                        params![language.as_str(), content],
                        |row| row.get(0),
                    )
                    .optional()?)
            })
            .await
    }
}

fn validated_content(content: &str) -> Result<String> {
    if content.trim().is_empty() {
        return Err(GlossError::InvalidInput("gloss content must not be empty".to_string()));
    }
    Ok(content.to_string())
}

fn natural_key_conflict(err: rusqlite::Error, language: LanguageCode, content: &str) -> GlossError {
    GlossError::from_constraint(
        err,
        format!(
            "Gloss with language {} and content {} already exists",
            language, content
        ),
    )
}

pub(crate) fn gloss_exists(conn: &Connection, id: &str) -> Result<bool> {
    Ok(conn
        .query_row("SELECT 1 FROM glosses WHERE id = ?1", params![id], |_| Ok(()))
        .optional()?
        .is_some())
}

/// `NotFound` for the first ID that is not a stored gloss. `this` is the
/// gloss being written, which may point at itself.
pub(crate) fn ensure_glosses_exist(
    conn: &Connection,
    ids: &[GlossId],
    this: Option<&str>,
) -> Result<()> {
    for id in ids {
        if Some(id.as_str()) == this {
            continue;
        }
        if !gloss_exists(conn, id)? {
            return Err(GlossError::NotFound(format!("Referenced gloss {} not found", id)));
        }
    }
    Ok(())
}

fn replace_relations(
    tx: &Transaction<'_>,
    source: &str,
    kind: RelationKind,
    targets: &[GlossId],
) -> Result<()> {
    tx.execute(
        "DELETE FROM gloss_relations WHERE source_id = ?1 AND relation_type = ?2",
        params![source, kind.as_str()],
    )?;
    let mut seen = HashSet::new();
    let unique: Vec<&GlossId> = targets.iter().filter(|t| seen.insert(t.as_str())).collect();
    let mut stmt = tx.prepare(
        "INSERT INTO gloss_relations (source_id, relation_type, target_id, position) \
         VALUES (?1, ?2, ?3, ?4)",
    )?;
    for (position, target) in unique.into_iter().enumerate() {
        stmt.execute(params![source, kind.as_str(), target, position as i64])?;
    }
    Ok(())
}
