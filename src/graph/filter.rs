//! Language projection of challenge glosses.

use crate::model::{ChallengeDirection, GlossDto, LanguageCode, LocalizedString};

/// Which languages one side of a challenge admits. `None` admits everything.
type Side<'a> = Option<&'a [LanguageCode]>;

fn admits(side: Side<'_>, language: LanguageCode) -> bool {
    side.map_or(true, |langs| langs.contains(&language))
}

/// Project challenge glosses onto a target/native language pair.
///
/// The source side is the native languages for expression and the target
/// language for understanding; the opposite side is the other one. The
/// top-level list and every (nested) `contains` list are pruned to the
/// source side, `translations` to the opposite side. An empty `natives`
/// disables pruning toward the native side.
///
/// Works on copies; `glosses` is left untouched.
pub fn filter_challenge_glosses(
    glosses: &[GlossDto],
    direction: ChallengeDirection,
    target: LanguageCode,
    natives: &[LanguageCode],
) -> Vec<GlossDto> {
    let target_side = std::slice::from_ref(&target);
    let native_side = if natives.is_empty() { None } else { Some(natives) };

    let (source, opposite) = match direction {
        ChallengeDirection::Expression => (native_side, Some(target_side)),
        ChallengeDirection::Understanding => (Some(target_side), native_side),
    };

    glosses
        .iter()
        .filter(|gloss| admits(source, gloss.language))
        .map(|gloss| project(gloss, source, opposite))
        .collect()
}

fn project(gloss: &GlossDto, source: Side<'_>, opposite: Side<'_>) -> GlossDto {
    let mut out = gloss.clone();
    out.contains = gloss
        .contains
        .iter()
        .filter(|child| admits(source, child.language))
        .map(|child| project(child, source, opposite))
        .collect();
    out.translations.retain(|t| admits(opposite, t.language));
    out
}

/// Reduce localized prompts to the reader's language.
///
/// First match in `natives` preference order, then English, then the
/// first prompt. With no native languages given, everything is kept.
pub fn select_prompts(
    prompts: &[LocalizedString],
    natives: &[LanguageCode],
) -> Vec<LocalizedString> {
    if natives.is_empty() {
        return prompts.to_vec();
    }
    natives
        .iter()
        .find_map(|lang| prompts.iter().find(|p| p.language == *lang))
        .or_else(|| prompts.iter().find(|p| p.language == LanguageCode::Eng))
        .or_else(|| prompts.first())
        .cloned()
        .into_iter()
        .collect()
}
