use serde::{Deserialize, Serialize};

use super::{GlossDto, GlossId, LanguageCode, LocalizedString};

/// Which way a challenge asks the learner to go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChallengeDirection {
    /// Produce target-language output from native-language glosses.
    Expression,
    /// Comprehend a target-language utterance.
    Understanding,
}

impl ChallengeDirection {
    /// Value stored in `challenge_glosses.challenge_kind`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChallengeDirection::Expression => "expression",
            ChallengeDirection::Understanding => "understanding",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeOfExpression {
    pub identifier: String,
    pub prompts: Vec<LocalizedString>,
    pub glosses: Vec<GlossDto>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeOfUnderstanding {
    pub text: String,
    pub language: LanguageCode,
    pub glosses: Vec<GlossDto>,
}

/// A situation with its challenges' glosses resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SituationDto {
    pub identifier: String,
    pub descriptions: Vec<LocalizedString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_link: Option<String>,
    pub target_language: LanguageCode,
    #[serde(default)]
    pub challenges_of_expression: Vec<ChallengeOfExpression>,
    #[serde(default)]
    pub challenges_of_understanding_text: Vec<ChallengeOfUnderstanding>,
}

impl SituationDto {
    /// Every gloss embedded in any challenge, in challenge order.
    pub fn embedded_glosses(&self) -> impl Iterator<Item = &GlossDto> + '_ {
        self.challenges_of_expression
            .iter()
            .flat_map(|c| c.glosses.iter())
            .chain(
                self.challenges_of_understanding_text
                    .iter()
                    .flat_map(|c| c.glosses.iter()),
            )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpressionChallengeWrite {
    pub identifier: String,
    #[serde(default)]
    pub prompts: Vec<LocalizedString>,
    #[serde(default)]
    pub gloss_ids: Vec<GlossId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnderstandingChallengeWrite {
    pub text: String,
    pub language: LanguageCode,
    #[serde(default)]
    pub gloss_ids: Vec<GlossId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SituationWrite {
    pub identifier: String,
    #[serde(default)]
    pub descriptions: Vec<LocalizedString>,
    #[serde(default)]
    pub image_link: Option<String>,
    pub target_language: LanguageCode,
    #[serde(default)]
    pub challenges_of_expression: Vec<ExpressionChallengeWrite>,
    #[serde(default)]
    pub challenges_of_understanding_text: Vec<UnderstandingChallengeWrite>,
}

/// Partial update; a present challenge list replaces the stored one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SituationUpdate {
    pub descriptions: Option<Vec<LocalizedString>>,
    pub image_link: Option<String>,
    pub target_language: Option<LanguageCode>,
    pub challenges_of_expression: Option<Vec<ExpressionChallengeWrite>>,
    pub challenges_of_understanding_text: Option<Vec<UnderstandingChallengeWrite>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SituationQuery {
    pub identifier: Option<String>,
    pub target_language: Option<LanguageCode>,
    /// Learner's native languages in preference order; empty means unknown.
    pub native_languages: Vec<LanguageCode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeCount {
    pub expression: usize,
    pub understanding: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SituationSummary {
    pub identifier: String,
    pub descriptions: Vec<LocalizedString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_link: Option<String>,
    pub target_language: LanguageCode,
    pub challenge_count: ChallengeCount,
}
