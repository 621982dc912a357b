use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::collections::{HashMap, HashSet};

use super::gloss::ensure_glosses_exist;
use crate::db::{now_timestamp, Db};
use crate::error::{GlossError, Result};
use crate::graph::{filter_challenge_glosses, select_prompts, GlossResolver};
use crate::model::{
    ChallengeCount, ChallengeDirection, ChallengeOfExpression, ChallengeOfUnderstanding,
    ExpressionChallengeWrite, GlossDto, GlossId, LanguageCode, LocalizedString, SituationDto,
    SituationQuery, SituationSummary, SituationUpdate, SituationWrite,
    UnderstandingChallengeWrite,
};

/// Situations and their challenges, served with resolved and filtered glosses.
#[derive(Clone)]
pub struct SituationService {
    db: Db,
    resolver: GlossResolver,
}

/// A situation row with challenge gloss IDs, before resolution.
struct StoredSituation {
    identifier: String,
    descriptions: Vec<LocalizedString>,
    image_link: Option<String>,
    target_language: LanguageCode,
    expression: Vec<ExpressionChallengeWrite>,
    understanding: Vec<UnderstandingChallengeWrite>,
}

impl StoredSituation {
    fn gloss_ids(&self) -> impl Iterator<Item = &GlossId> + '_ {
        self.expression
            .iter()
            .flat_map(|c| c.gloss_ids.iter())
            .chain(self.understanding.iter().flat_map(|c| c.gloss_ids.iter()))
    }
}

impl SituationService {
    pub fn new(db: Db, resolver: GlossResolver) -> Self {
        Self { db, resolver }
    }

    pub async fn create(&self, write: SituationWrite) -> Result<SituationDto> {
        validate_identifier(&write.identifier)?;
        if write.descriptions.is_empty() {
            return Err(GlossError::InvalidInput(
                "a situation needs at least one description".to_string(),
            ));
        }
        validate_expression(&write.challenges_of_expression)?;
        validate_understanding(&write.challenges_of_understanding_text)?;

        let identifier = write.identifier.clone();
        self.db
            .with_connection(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT INTO situations (identifier, descriptions_json, image_link, \
                       target_language, updated_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        write.identifier,
                        serde_json::to_string(&write.descriptions)?,
                        write.image_link,
                        write.target_language.as_str(),
                        now_timestamp(),
                    ],
                )
                .map_err(|e| {
                    GlossError::from_constraint(
                        e,
                        format!("Situation identifier {} already exists", write.identifier),
                    )
                })?;
                write_expression(&tx, &write.identifier, &write.challenges_of_expression)?;
                let understanding = &write.challenges_of_understanding_text;
                write_understanding(&tx, &write.identifier, understanding)?;
                tx.commit()?;
                Ok(())
            })
            .await?;

        log::debug!("Created situation {}", identifier);
        self.find_by_id(&identifier, &SituationQuery::default()).await
    }

    /// Partial update; a provided challenge collection replaces the stored one.
    pub async fn update(&self, identifier: &str, update: SituationUpdate) -> Result<SituationDto> {
        if let Some(descriptions) = &update.descriptions {
            if descriptions.is_empty() {
                return Err(GlossError::InvalidInput(
                    "a situation needs at least one description".to_string(),
                ));
            }
        }
        if let Some(challenges) = &update.challenges_of_expression {
            validate_expression(challenges)?;
        }
        if let Some(challenges) = &update.challenges_of_understanding_text {
            validate_understanding(challenges)?;
        }

        let id = identifier.to_string();
        self.db
            .with_connection(move |conn| {
                let tx = conn.transaction()?;
                ensure_situation_exists(&tx, &id)?;

                if let Some(descriptions) = &update.descriptions {
                    tx.execute(
                        "UPDATE situations SET descriptions_json = ?1 WHERE identifier = ?2",
                        params![serde_json::to_string(descriptions)?, id],
                    )?;
                }
                if let Some(image_link) = &update.image_link {
                    tx.execute(
                        "UPDATE situations SET image_link = ?1 WHERE identifier = ?2",
                        params![image_link, id],
                    )?;
                }
                if let Some(language) = update.target_language {
                    tx.execute(
                        "UPDATE situations SET target_language = ?1 WHERE identifier = ?2",
                        params![language.as_str(), id],
                    )?;
                }
                if let Some(challenges) = &update.challenges_of_expression {
                    clear_challenges(&tx, &id, ChallengeDirection::Expression)?;
                    write_expression(&tx, &id, challenges)?;
                }
                if let Some(challenges) = &update.challenges_of_understanding_text {
                    clear_challenges(&tx, &id, ChallengeDirection::Understanding)?;
                    write_understanding(&tx, &id, challenges)?;
                }
                tx.execute(
                    "UPDATE situations SET updated_at = ?1 WHERE identifier = ?2",
                    params![now_timestamp(), id],
                )?;
                tx.commit()?;
                Ok(())
            })
            .await?;

        self.find_by_id(identifier, &SituationQuery::default()).await
    }

    /// Delete a situation and its challenges. Glosses are left alone.
    pub async fn delete(&self, identifier: &str) -> Result<()> {
        let id = identifier.to_string();
        self.db
            .with_connection(move |conn| {
                let tx = conn.transaction()?;
                ensure_situation_exists(&tx, &id)?;
                tx.execute("DELETE FROM situations WHERE identifier = ?1", params![id])?;
                tx.commit()?;
                Ok(())
            })
            .await?;
        log::debug!("Deleted situation {}", identifier);
        Ok(())
    }

    pub async fn find_by_id(
        &self,
        identifier: &str,
        query: &SituationQuery,
    ) -> Result<SituationDto> {
        let id = identifier.to_string();
        let stored = self
            .db
            .with_connection(move |conn| load_situations(conn, Some(&id), None))
            .await?
            .pop()
            .ok_or_else(|| GlossError::NotFound(format!("Situation {} not found", identifier)))?;

        let glosses = self.resolve_glosses(std::slice::from_ref(&stored)).await?;
        to_dto(stored, &glosses, &query.native_languages)
    }

    /// Situations matching `query`, most recently updated first, resolved
    /// with a single resolver call.
    pub async fn list(&self, query: &SituationQuery) -> Result<Vec<SituationDto>> {
        let identifier = query.identifier.clone();
        let target = query.target_language;
        let stored = self
            .db
            .with_connection(move |conn| load_situations(conn, identifier.as_deref(), target))
            .await?;

        let glosses = self.resolve_glosses(&stored).await?;
        stored
            .into_iter()
            .map(|s| to_dto(s, &glosses, &query.native_languages))
            .collect()
    }

    pub async fn list_summary(&self, query: &SituationQuery) -> Result<Vec<SituationSummary>> {
        let identifier = query.identifier.clone();
        let target = query.target_language.map(|l| l.as_str());
        self.db
            .with_connection(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT s.identifier, s.descriptions_json, s.image_link, s.target_language, \
                       (SELECT COUNT(*) FROM expression_challenges e \
                          WHERE e.situation_id = s.identifier), \
                       (SELECT COUNT(*) FROM understanding_challenges u \
                          WHERE u.situation_id = s.identifier) \
                     FROM situations s \
                     WHERE (?1 IS NULL OR s.identifier = ?1) \
                       AND (?2 IS NULL OR s.target_language = ?2) \
                     ORDER BY s.updated_at DESC, s.rowid DESC",
                )?;
                let rows = stmt
                    .query_map(params![identifier, target], |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, Option<String>>(2)?,
                            row.get::<_, String>(3)?,
                            (row.get::<_, i64>(4)?, row.get::<_, i64>(5)?),
                        ))
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;

                let mut summaries = Vec::with_capacity(rows.len());
                for (identifier, descriptions, image_link, language, counts) in rows {
                    summaries.push(SituationSummary {
                        identifier,
                        descriptions: serde_json::from_str(&descriptions)?,
                        image_link,
                        target_language: language.parse()?,
                        challenge_count: ChallengeCount {
                            expression: counts.0 as usize,
                            understanding: counts.1 as usize,
                        },
                    });
                }
                Ok(summaries)
            })
            .await
    }

    async fn resolve_glosses(
        &self,
        stored: &[StoredSituation],
    ) -> Result<HashMap<GlossId, GlossDto>> {
        let mut seen = HashSet::new();
        let ids: Vec<GlossId> = stored
            .iter()
            .flat_map(|s| s.gloss_ids())
            .filter(|id| seen.insert(id.as_str()))
            .cloned()
            .collect();
        Ok(self.resolver.resolve_by_ids(&ids).await?.dto_map())
    }
}

fn to_dto(
    stored: StoredSituation,
    glosses: &HashMap<GlossId, GlossDto>,
    natives: &[LanguageCode],
) -> Result<SituationDto> {
    let target = stored.target_language;
    let pick = |ids: &[GlossId]| -> Result<Vec<GlossDto>> {
        ids.iter()
            .map(|id| {
                glosses.get(id).cloned().ok_or_else(|| {
                    GlossError::NotFound(format!("Gloss {} not found while mapping situation", id))
                })
            })
            .collect()
    };

    let mut challenges_of_expression = Vec::with_capacity(stored.expression.len());
    for challenge in &stored.expression {
        let picked = pick(&challenge.gloss_ids)?;
        challenges_of_expression.push(ChallengeOfExpression {
            identifier: challenge.identifier.clone(),
            prompts: select_prompts(&challenge.prompts, natives),
            glosses: filter_challenge_glosses(
                &picked,
                ChallengeDirection::Expression,
                target,
                natives,
            ),
        });
    }

    let mut challenges_of_understanding_text = Vec::with_capacity(stored.understanding.len());
    for challenge in &stored.understanding {
        let picked = pick(&challenge.gloss_ids)?;
        challenges_of_understanding_text.push(ChallengeOfUnderstanding {
            text: challenge.text.clone(),
            language: challenge.language,
            glosses: filter_challenge_glosses(
                &picked,
                ChallengeDirection::Understanding,
                target,
                natives,
            ),
        });
    }

    Ok(SituationDto {
        identifier: stored.identifier,
        descriptions: stored.descriptions,
        image_link: stored.image_link,
        target_language: target,
        challenges_of_expression,
        challenges_of_understanding_text,
    })
}

fn validate_identifier(identifier: &str) -> Result<()> {
    if identifier.trim().is_empty() {
        return Err(GlossError::InvalidInput("situation identifier must not be empty".to_string()));
    }
    Ok(())
}

fn validate_expression(challenges: &[ExpressionChallengeWrite]) -> Result<()> {
    for challenge in challenges {
        if challenge.identifier.trim().is_empty() {
            return Err(GlossError::InvalidInput(
                "challenge identifier must not be empty".to_string(),
            ));
        }
        if !challenge.prompts.iter().any(|p| p.language == LanguageCode::Eng) {
            return Err(GlossError::InvalidInput(format!(
                "challenge {} needs an English prompt",
                challenge.identifier
            )));
        }
    }
    Ok(())
}

fn validate_understanding(challenges: &[UnderstandingChallengeWrite]) -> Result<()> {
    if challenges.iter().any(|c| c.text.trim().is_empty()) {
        return Err(GlossError::InvalidInput("challenge text must not be empty".to_string()));
    }
    Ok(())
}

fn ensure_situation_exists(conn: &Connection, identifier: &str) -> Result<()> {
    conn.query_row(
        "SELECT 1 FROM situations WHERE identifier = ?1",
        params![identifier],
        |_| Ok(()),
    )
    .optional()?
    .ok_or_else(|| GlossError::NotFound(format!("Situation {} not found", identifier)))
}

fn clear_challenges(
    tx: &Transaction<'_>,
    situation: &str,
    direction: ChallengeDirection,
) -> Result<()> {
    let table = match direction {
        ChallengeDirection::Expression => "expression_challenges",
        ChallengeDirection::Understanding => "understanding_challenges",
    };
    tx.execute(
        "DELETE FROM challenge_glosses WHERE situation_id = ?1 AND challenge_kind = ?2",
        params![situation, direction.as_str()],
    )?;
    tx.execute(&format!("DELETE FROM {} WHERE situation_id = ?1", table), params![situation])?;
    Ok(())
}

fn link_glosses(
    tx: &Transaction<'_>,
    situation: &str,
    direction: ChallengeDirection,
    position: usize,
    gloss_ids: &[GlossId],
) -> Result<()> {
    ensure_glosses_exist(tx, gloss_ids, None)?;
    let mut stmt = tx.prepare(
        "INSERT INTO challenge_glosses (situation_id, challenge_kind, challenge_position, \
           gloss_position, gloss_id) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    for (gloss_position, gloss_id) in gloss_ids.iter().enumerate() {
        stmt.execute(params![
            situation,
            direction.as_str(),
            position as i64,
            gloss_position as i64,
            gloss_id
        ])?;
    }
    Ok(())
}

fn write_expression(
    tx: &Transaction<'_>,
    situation: &str,
    challenges: &[ExpressionChallengeWrite],
) -> Result<()> {
    for (position, challenge) in challenges.iter().enumerate() {
        tx.execute(
            "INSERT INTO expression_challenges (situation_id, position, identifier, prompts_json) \
             VALUES (?1, ?2, ?3, ?4)",
            params![
                situation,
                position as i64,
                challenge.identifier,
                serde_json::to_string(&challenge.prompts)?
            ],
        )?;
        let direction = ChallengeDirection::Expression;
        link_glosses(tx, situation, direction, position, &challenge.gloss_ids)?;
    }
    Ok(())
}

fn write_understanding(
    tx: &Transaction<'_>,
    situation: &str,
    challenges: &[UnderstandingChallengeWrite],
) -> Result<()> {
    for (position, challenge) in challenges.iter().enumerate() {
        tx.execute(
            "INSERT INTO understanding_challenges (situation_id, position, text, language) \
             VALUES (?1, ?2, ?3, ?4)",
            params![situation, position as i64, challenge.text, challenge.language.as_str()],
        )?;
        let direction = ChallengeDirection::Understanding;
        link_glosses(tx, situation, direction, position, &challenge.gloss_ids)?;
    }
    Ok(())
}

fn challenge_gloss_ids(
    conn: &Connection,
    situation: &str,
    direction: ChallengeDirection,
) -> Result<HashMap<i64, Vec<GlossId>>> {
    let mut stmt = conn.prepare(
        "SELECT challenge_position, gloss_id FROM challenge_glosses \
         WHERE situation_id = ?1 AND challenge_kind = ?2 \
         ORDER BY challenge_position, gloss_position",
    )?;
    let rows = stmt
        .query_map(params![situation, direction.as_str()], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut out: HashMap<i64, Vec<GlossId>> = HashMap::new();
    for (position, gloss_id) in rows {
        out.entry(position).or_default().push(gloss_id);
    }
    Ok(out)
}

fn load_situations(
    conn: &Connection,
    identifier: Option<&str>,
    target: Option<LanguageCode>,
) -> Result<Vec<StoredSituation>> {
    let mut stmt = conn.prepare(
        "SELECT identifier, descriptions_json, image_link, target_language FROM situations \
         WHERE (?1 IS NULL OR identifier = ?1) AND (?2 IS NULL OR target_language = ?2) \
         ORDER BY updated_at DESC, rowid DESC",
    )?;
    let rows = stmt
        .query_map(params![identifier, target.map(|l| l.as_str())], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut situations = Vec::with_capacity(rows.len());
    for (identifier, descriptions, image_link, language) in rows {
        let mut expression_ids =
            challenge_gloss_ids(conn, &identifier, ChallengeDirection::Expression)?;
        let mut stmt = conn.prepare(
            "SELECT position, identifier, prompts_json FROM expression_challenges \
             WHERE situation_id = ?1 ORDER BY position",
        )?;
        let expression = stmt
            .query_map(params![identifier], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?
            .into_iter()
            .map(|(position, challenge_id, prompts)| -> Result<ExpressionChallengeWrite> {
                Ok(ExpressionChallengeWrite {
                    identifier: challenge_id,
                    prompts: serde_json::from_str(&prompts)?,
                    gloss_ids: expression_ids.remove(&position).unwrap_or_default(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut understanding_ids =
            challenge_gloss_ids(conn, &identifier, ChallengeDirection::Understanding)?;
        let mut stmt = conn.prepare(
            "SELECT position, text, language FROM understanding_challenges \
             WHERE situation_id = ?1 ORDER BY position",
        )?;
        let understanding = stmt
            .query_map(params![identifier], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?
            .into_iter()
            .map(|(position, text, language)| -> Result<UnderstandingChallengeWrite> {
                Ok(UnderstandingChallengeWrite {
                    text,
                    language: language.parse()?,
                    gloss_ids: understanding_ids.remove(&position).unwrap_or_default(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        situations.push(StoredSituation {
            descriptions: serde_json::from_str(&descriptions)?,
            image_link,
            target_language: language.parse()?,
            expression,
            understanding,
            identifier,
        });
    }
    Ok(situations)
}
