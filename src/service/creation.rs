use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};

use super::GlossService;
use crate::error::Result;
use crate::model::{GlossId, GlossWrite, LanguageCode, Note, Relations};

/// Nested gloss payload as produced by content generators.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlossPayload {
    pub content: String,
    #[serde(default)]
    pub is_paraphrased: bool,
    #[serde(default)]
    pub transcriptions: Vec<String>,
    #[serde(default)]
    pub notes: Vec<Note>,
    #[serde(default)]
    pub contains: Vec<GlossPayload>,
    #[serde(default)]
    pub translation_ids: Vec<GlossId>,
    #[serde(default)]
    pub near_synonym_ids: Vec<GlossId>,
    #[serde(default)]
    pub near_homophone_ids: Vec<GlossId>,
    #[serde(default)]
    pub clarifies_usage_ids: Vec<GlossId>,
    #[serde(default)]
    pub to_be_differentiated_from_ids: Vec<GlossId>,
}

impl GlossPayload {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn containing(mut self, children: Vec<GlossPayload>) -> Self {
        self.contains = children;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Duplicate {
    pub content: String,
    pub existing_id: GlossId,
}

/// Creates gloss trees bottom-up, reusing glosses that already exist.
#[derive(Clone)]
pub struct GlossCreationHelper {
    glosses: GlossService,
}

impl GlossCreationHelper {
    pub fn new(glosses: GlossService) -> Self {
        Self { glosses }
    }

    /// Create `payload` and its `contains` children, depth-first.
    ///
    /// A node whose natural key already exists is reused as-is, subtree
    /// included. Returns the ID of the (new or existing) root.
    pub fn create_with_contains<'a>(
        &'a self,
        payload: &'a GlossPayload,
        language: LanguageCode,
    ) -> BoxFuture<'a, Result<GlossId>> {
        async move {
            if let Some(existing) = self.find_existing_id(language, &payload.content).await? {
                log::debug!("Reusing gloss {} for {}:{}", existing, language, payload.content);
                return Ok(existing);
            }

            let mut contains = Vec::with_capacity(payload.contains.len());
            for child in &payload.contains {
                contains.push(self.create_with_contains(child, language).await?);
            }

            let write = GlossWrite {
                language,
                content: payload.content.clone(),
                is_paraphrased: payload.is_paraphrased,
                transcriptions: payload.transcriptions.clone(),
                notes: payload.notes.clone(),
                relations: Relations {
                    contains,
                    near_synonyms: payload.near_synonym_ids.clone(),
                    near_homophones: payload.near_homophone_ids.clone(),
                    translations: payload.translation_ids.clone(),
                    clarifies_usage: payload.clarifies_usage_ids.clone(),
                    to_be_differentiated_from: payload.to_be_differentiated_from_ids.clone(),
                },
            };
            Ok(self.glosses.create(write).await?.id)
        }
        .boxed()
    }

    pub async fn create_many(
        &self,
        payloads: &[GlossPayload],
        language: LanguageCode,
    ) -> Result<Vec<GlossId>> {
        let mut ids = Vec::with_capacity(payloads.len());
        for payload in payloads {
            ids.push(self.create_with_contains(payload, language).await?);
        }
        Ok(ids)
    }

    pub async fn find_existing_id(
        &self,
        language: LanguageCode,
        content: &str,
    ) -> Result<Option<GlossId>> {
        self.glosses.find_id_by_natural_key(language, content).await
    }

    /// Top-level payloads that already exist.
    pub async fn find_duplicates(
        &self,
        payloads: &[GlossPayload],
        language: LanguageCode,
    ) -> Result<Vec<Duplicate>> {
        let mut duplicates = Vec::new();
        for payload in payloads {
            if let Some(existing_id) = self.find_existing_id(language, &payload.content).await? {
                duplicates.push(Duplicate {
                    content: payload.content.clone(),
                    existing_id,
                });
            }
        }
        Ok(duplicates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::server_db;
    use LanguageCode::Spa;

    fn sentence() -> GlossPayload {
        GlossPayload::new("los gatos comen").containing(vec![
            GlossPayload::new("gatos").containing(vec![GlossPayload::new("gato")]),
            GlossPayload::new("comen").containing(vec![GlossPayload::new("comer")]),
        ])
    }

    #[tokio::test]
    async fn test_create_with_contains_builds_tree() {
        let (db, _temp) = server_db().await;
        let service = GlossService::new(db);
        let helper = GlossCreationHelper::new(service.clone());

        let id = helper.create_with_contains(&sentence(), Spa).await.unwrap();
        let root = service.find_by_id(&id).await.unwrap();
        assert_eq!(root.depth(), 3);
        assert_eq!(root.containment_ids().len(), 5);
        assert_eq!(root.contains[0].content, "gatos");
        assert_eq!(root.contains[0].contains[0].content, "gato");
    }

    #[tokio::test]
    async fn test_existing_glosses_are_reused() {
        let (db, _temp) = server_db().await;
        let service = GlossService::new(db);
        let helper = GlossCreationHelper::new(service.clone());

        let gato = helper.create_with_contains(&GlossPayload::new("gato"), Spa).await.unwrap();
        let id = helper.create_with_contains(&sentence(), Spa).await.unwrap();
        let again = helper.create_with_contains(&sentence(), Spa).await.unwrap();
        assert_eq!(id, again);

        let root = service.find_by_id(&id).await.unwrap();
        assert_eq!(root.contains[0].contains[0].id, gato);
        assert_eq!(service.list(Some(Spa), None).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_create_many_and_duplicates() {
        let (db, _temp) = server_db().await;
        let service = GlossService::new(db);
        let helper = GlossCreationHelper::new(service);

        let payloads = vec![GlossPayload::new("uno"), GlossPayload::new("dos")];
        assert!(helper.find_duplicates(&payloads, Spa).await.unwrap().is_empty());

        let ids = helper.create_many(&payloads[..1], Spa).await.unwrap();
        let duplicates = helper.find_duplicates(&payloads, Spa).await.unwrap();
        let expected = Duplicate {
            content: "uno".to_string(),
            existing_id: ids[0].clone(),
        };
        assert_eq!(duplicates, vec![expected]);

        assert_eq!(helper.find_existing_id(Spa, "uno").await.unwrap(), Some(ids[0].clone()));
    }
}
