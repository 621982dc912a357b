//! Server-side services over the SQLite store.

mod creation;
mod gloss;
mod situation;

pub use creation::{Duplicate, GlossCreationHelper, GlossPayload};
pub use gloss::GlossService;
pub use situation::SituationService;
