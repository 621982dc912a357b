use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use super::{GlossId, LanguageCode, Note};

/// The six edge kinds between glosses.
///
/// `Contains` is recursive decomposition; the other five are lateral and
/// are only ever followed one hop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RelationKind {
    Contains,
    NearSynonyms,
    NearHomophones,
    Translations,
    ClarifiesUsage,
    ToBeDifferentiatedFrom,
}

impl RelationKind {
    pub const ALL: [RelationKind; 6] = [
        RelationKind::Contains,
        RelationKind::NearSynonyms,
        RelationKind::NearHomophones,
        RelationKind::Translations,
        RelationKind::ClarifiesUsage,
        RelationKind::ToBeDifferentiatedFrom,
    ];

    pub const LATERAL: [RelationKind; 5] = [
        RelationKind::NearSynonyms,
        RelationKind::NearHomophones,
        RelationKind::Translations,
        RelationKind::ClarifiesUsage,
        RelationKind::ToBeDifferentiatedFrom,
    ];

    /// Value stored in `gloss_relations.relation_type`.
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationKind::Contains => "contains",
            RelationKind::NearSynonyms => "near_synonyms",
            RelationKind::NearHomophones => "near_homophones",
            RelationKind::Translations => "translations",
            RelationKind::ClarifiesUsage => "clarifies_usage",
            RelationKind::ToBeDifferentiatedFrom => "to_be_differentiated_from",
        }
    }

    pub fn from_db(value: &str) -> Option<RelationKind> {
        RelationKind::ALL.into_iter().find(|kind| kind.as_str() == value)
    }

    pub fn is_lateral(&self) -> bool {
        !matches!(self, RelationKind::Contains)
    }
}

/// One list per relation kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relations<T> {
    #[serde(default = "Vec::new")]
    pub contains: Vec<T>,
    #[serde(default = "Vec::new")]
    pub near_synonyms: Vec<T>,
    #[serde(default = "Vec::new")]
    pub near_homophones: Vec<T>,
    #[serde(default = "Vec::new")]
    pub translations: Vec<T>,
    #[serde(default = "Vec::new")]
    pub clarifies_usage: Vec<T>,
    #[serde(default = "Vec::new")]
    pub to_be_differentiated_from: Vec<T>,
}

impl<T> Default for Relations<T> {
    fn default() -> Self {
        Self {
            contains: Vec::new(),
            near_synonyms: Vec::new(),
            near_homophones: Vec::new(),
            translations: Vec::new(),
            clarifies_usage: Vec::new(),
            to_be_differentiated_from: Vec::new(),
        }
    }
}

impl<T> Relations<T> {
    pub fn get(&self, kind: RelationKind) -> &[T] {
        match kind {
            RelationKind::Contains => &self.contains,
            RelationKind::NearSynonyms => &self.near_synonyms,
            RelationKind::NearHomophones => &self.near_homophones,
            RelationKind::Translations => &self.translations,
            RelationKind::ClarifiesUsage => &self.clarifies_usage,
            RelationKind::ToBeDifferentiatedFrom => &self.to_be_differentiated_from,
        }
    }

    pub fn get_mut(&mut self, kind: RelationKind) -> &mut Vec<T> {
        match kind {
            RelationKind::Contains => &mut self.contains,
            RelationKind::NearSynonyms => &mut self.near_synonyms,
            RelationKind::NearHomophones => &mut self.near_homophones,
            RelationKind::Translations => &mut self.translations,
            RelationKind::ClarifiesUsage => &mut self.clarifies_usage,
            RelationKind::ToBeDifferentiatedFrom => &mut self.to_be_differentiated_from,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (RelationKind, &[T])> + '_ {
        RelationKind::ALL.into_iter().map(move |kind| (kind, self.get(kind)))
    }

    pub fn map<U>(&self, mut f: impl FnMut(&T) -> U) -> Relations<U> {
        let mut out = Relations::default();
        for (kind, items) in self.iter() {
            *out.get_mut(kind) = items.iter().map(&mut f).collect();
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.iter().all(|(_, items)| items.is_empty())
    }
}

/// Minimal denormalized reference to a gloss.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GlossRef {
    pub id: GlossId,
    pub language: LanguageCode,
    pub content: String,
}

/// A gloss as returned by a [`RelationStore`](crate::store::RelationStore):
/// scalars plus one hop of references per relation kind.
#[derive(Debug, Clone, PartialEq)]
pub struct GlossRecord {
    pub id: GlossId,
    pub language: LanguageCode,
    pub content: String,
    pub is_paraphrased: bool,
    pub transcriptions: Vec<String>,
    pub notes: Vec<Note>,
    pub relations: Relations<GlossRef>,
}

impl GlossRecord {
    pub fn reference(&self) -> GlossRef {
        GlossRef {
            id: self.id.clone(),
            language: self.language,
            content: self.content.clone(),
        }
    }
}

/// A node of a resolved [`GlossGraph`](crate::graph::GlossGraph).
///
/// Relation entries are references; whether the target is fully built is a
/// property of the graph holding this node, not of the node itself.
#[derive(Debug, Clone, PartialEq)]
pub struct HydratedGloss {
    pub id: GlossId,
    pub language: LanguageCode,
    pub content: String,
    pub is_paraphrased: bool,
    pub transcriptions: Vec<String>,
    pub notes: Vec<Note>,
    pub relations: Relations<GlossRef>,
}

impl HydratedGloss {
    /// Scalar fields of `record` with every relation list empty.
    pub fn scalars(record: &GlossRecord) -> Self {
        Self {
            id: record.id.clone(),
            language: record.language,
            content: record.content.clone(),
            is_paraphrased: record.is_paraphrased,
            transcriptions: record.transcriptions.clone(),
            notes: record.notes.clone(),
            relations: Relations::default(),
        }
    }

    /// Node for a target that was never loaded: identity only.
    pub fn stub(reference: &GlossRef) -> Self {
        Self {
            id: reference.id.clone(),
            language: reference.language,
            content: reference.content.clone(),
            is_paraphrased: false,
            transcriptions: Vec::new(),
            notes: Vec::new(),
            relations: Relations::default(),
        }
    }

    pub fn reference(&self) -> GlossRef {
        GlossRef {
            id: self.id.clone(),
            language: self.language,
            content: self.content.clone(),
        }
    }
}

/// Wire representation of a gloss.
///
/// `contains` nests full DTOs; lateral kinds carry minimal references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlossDto {
    pub id: GlossId,
    pub language: LanguageCode,
    pub content: String,
    #[serde(default)]
    pub is_paraphrased: bool,
    #[serde(default)]
    pub transcriptions: Vec<String>,
    #[serde(default)]
    pub notes: Vec<Note>,
    #[serde(default)]
    pub contains: Vec<GlossDto>,
    #[serde(default)]
    pub near_synonyms: Vec<GlossRef>,
    #[serde(default)]
    pub near_homophones: Vec<GlossRef>,
    #[serde(default)]
    pub translations: Vec<GlossRef>,
    #[serde(default)]
    pub clarifies_usage: Vec<GlossRef>,
    #[serde(default)]
    pub to_be_differentiated_from: Vec<GlossRef>,
}

impl GlossDto {
    /// Scalars of `node`, all relation lists empty.
    pub fn from_scalars(node: &HydratedGloss) -> Self {
        Self {
            id: node.id.clone(),
            language: node.language,
            content: node.content.clone(),
            is_paraphrased: node.is_paraphrased,
            transcriptions: node.transcriptions.clone(),
            notes: node.notes.clone(),
            contains: Vec::new(),
            near_synonyms: Vec::new(),
            near_homophones: Vec::new(),
            translations: Vec::new(),
            clarifies_usage: Vec::new(),
            to_be_differentiated_from: Vec::new(),
        }
    }

    pub fn stub(reference: &GlossRef) -> Self {
        Self::from_scalars(&HydratedGloss::stub(reference))
    }

    pub fn reference(&self) -> GlossRef {
        GlossRef {
            id: self.id.clone(),
            language: self.language,
            content: self.content.clone(),
        }
    }

    /// Lateral references of `kind`; empty for `Contains`.
    pub fn lateral(&self, kind: RelationKind) -> &[GlossRef] {
        match kind {
            RelationKind::Contains => &[],
            RelationKind::NearSynonyms => &self.near_synonyms,
            RelationKind::NearHomophones => &self.near_homophones,
            RelationKind::Translations => &self.translations,
            RelationKind::ClarifiesUsage => &self.clarifies_usage,
            RelationKind::ToBeDifferentiatedFrom => &self.to_be_differentiated_from,
        }
    }

    pub fn lateral_mut(&mut self, kind: RelationKind) -> Option<&mut Vec<GlossRef>> {
        match kind {
            RelationKind::Contains => None,
            RelationKind::NearSynonyms => Some(&mut self.near_synonyms),
            RelationKind::NearHomophones => Some(&mut self.near_homophones),
            RelationKind::Translations => Some(&mut self.translations),
            RelationKind::ClarifiesUsage => Some(&mut self.clarifies_usage),
            RelationKind::ToBeDifferentiatedFrom => Some(&mut self.to_be_differentiated_from),
        }
    }

    /// IDs of the direct targets of `kind`.
    pub fn relation_ids(&self, kind: RelationKind) -> Vec<&str> {
        match kind {
            RelationKind::Contains => self.contains.iter().map(|c| c.id.as_str()).collect(),
            lateral => self.lateral(lateral).iter().map(|r| r.id.as_str()).collect(),
        }
    }

    /// Own ID plus every relation ID found anywhere in this (possibly
    /// nested) DTO.
    pub fn collect_ids(&self, out: &mut HashSet<GlossId>) {
        out.insert(self.id.clone());
        for kind in RelationKind::LATERAL {
            out.extend(self.lateral(kind).iter().map(|r| r.id.clone()));
        }
        for child in &self.contains {
            child.collect_ids(out);
        }
    }

    /// Levels of the containment tree rooted here (a leaf is 1).
    pub fn depth(&self) -> usize {
        1 + self.contains.iter().map(GlossDto::depth).max().unwrap_or(0)
    }

    /// Distinct IDs in the containment tree rooted here, this node included.
    pub fn containment_ids(&self) -> HashSet<GlossId> {
        let mut out = HashSet::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            if out.insert(node.id.clone()) {
                stack.extend(node.contains.iter());
            }
        }
        out
    }
}

/// Fully scalar gloss: relations reduced to ID arrays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatGloss {
    pub id: GlossId,
    pub language: LanguageCode,
    pub content: String,
    pub is_paraphrased: bool,
    pub transcriptions: Vec<String>,
    pub notes: Vec<Note>,
    pub relation_ids: Relations<GlossId>,
}

impl From<&GlossDto> for FlatGloss {
    fn from(dto: &GlossDto) -> Self {
        let mut relation_ids = Relations::default();
        for kind in RelationKind::ALL {
            *relation_ids.get_mut(kind) = dto
                .relation_ids(kind)
                .into_iter()
                .map(str::to_string)
                .collect();
        }
        Self {
            id: dto.id.clone(),
            language: dto.language,
            content: dto.content.clone(),
            is_paraphrased: dto.is_paraphrased,
            transcriptions: dto.transcriptions.clone(),
            notes: dto.notes.clone(),
            relation_ids,
        }
    }
}

/// A gloss row of the local store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalGloss {
    /// Local surrogate key; stable across re-downloads of the same natural key.
    pub local_id: String,
    #[serde(flatten)]
    pub record: FlatGloss,
    pub last_synced_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Payload for creating a gloss.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlossWrite {
    pub language: LanguageCode,
    pub content: String,
    #[serde(default)]
    pub is_paraphrased: bool,
    #[serde(default)]
    pub transcriptions: Vec<String>,
    #[serde(default)]
    pub notes: Vec<Note>,
    #[serde(default)]
    pub relations: Relations<GlossId>,
}

impl GlossWrite {
    pub fn new(language: LanguageCode, content: impl Into<String>) -> Self {
        Self {
            language,
            content: content.into(),
            is_paraphrased: false,
            transcriptions: Vec::new(),
            notes: Vec::new(),
            relations: Relations::default(),
        }
    }

    pub fn with(mut self, kind: RelationKind, ids: &[impl AsRef<str>]) -> Self {
        *self.relations.get_mut(kind) = ids.iter().map(|id| id.as_ref().to_string()).collect();
        self
    }
}

/// Partial update; a present relation list replaces the stored set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlossUpdate {
    pub language: Option<LanguageCode>,
    pub content: Option<String>,
    pub is_paraphrased: Option<bool>,
    pub transcriptions: Option<Vec<String>>,
    pub notes: Option<Vec<Note>>,
    #[serde(default)]
    pub relations: HashMap<RelationKind, Vec<GlossId>>,
}
