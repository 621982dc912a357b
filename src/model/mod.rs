//! Domain types shared by the store, resolver, services and sync client.

mod gloss;
mod situation;

pub use gloss::{
    FlatGloss, GlossDto, GlossRecord, GlossRef, GlossUpdate, GlossWrite, HydratedGloss,
    LocalGloss, RelationKind, Relations,
};
pub use situation::{
    ChallengeCount, ChallengeDirection, ChallengeOfExpression, ChallengeOfUnderstanding,
    ExpressionChallengeWrite, SituationDto, SituationQuery, SituationSummary, SituationUpdate,
    SituationWrite, UnderstandingChallengeWrite,
};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::GlossError;

/// Surrogate identifier of a gloss.
pub type GlossId = String;

/// ISO 639-3 codes of the supported languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LanguageCode {
    Deu,
    Arz,
    Arb,
    Apc,
    Cmn,
    Fra,
    Spa,
    Uzb,
    Eng,
}

impl LanguageCode {
    pub const ALL: [LanguageCode; 9] = [
        LanguageCode::Deu,
        LanguageCode::Arz,
        LanguageCode::Arb,
        LanguageCode::Apc,
        LanguageCode::Cmn,
        LanguageCode::Fra,
        LanguageCode::Spa,
        LanguageCode::Uzb,
        LanguageCode::Eng,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LanguageCode::Deu => "deu",
            LanguageCode::Arz => "arz",
            LanguageCode::Arb => "arb",
            LanguageCode::Apc => "apc",
            LanguageCode::Cmn => "cmn",
            LanguageCode::Fra => "fra",
            LanguageCode::Spa => "spa",
            LanguageCode::Uzb => "uzb",
            LanguageCode::Eng => "eng",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            LanguageCode::Deu => "German",
            LanguageCode::Arz => "Egyptian Arabic",
            LanguageCode::Arb => "Standard Arabic",
            LanguageCode::Apc => "Levantine Arabic",
            LanguageCode::Cmn => "Mandarin Chinese",
            LanguageCode::Fra => "French",
            LanguageCode::Spa => "Spanish",
            LanguageCode::Uzb => "Uzbek",
            LanguageCode::Eng => "English",
        }
    }

    /// Parse a comma-separated list such as `"eng,deu"`; blanks are skipped.
    pub fn parse_list(value: &str) -> Result<Vec<LanguageCode>, GlossError> {
        value
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(LanguageCode::from_str)
            .collect()
    }
}

impl fmt::Display for LanguageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LanguageCode {
    type Err = GlossError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LanguageCode::ALL
            .into_iter()
            .find(|code| code.as_str() == s)
            .ok_or_else(|| GlossError::InvalidInput(format!("unknown language code: {}", s)))
    }
}

/// A string tagged with its language (descriptions, prompts).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalizedString {
    pub language: LanguageCode,
    pub content: String,
}

/// Free-form annotation attached to a gloss.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub note_type: String,
    pub content: String,
    #[serde(default)]
    pub show_before_solution: bool,
}
