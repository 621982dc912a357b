//! Relation store adapters: batch fetch of gloss records by ID.
//!
//! The resolver only ever talks to a [`RelationStore`]; the SQLite adapter
//! backs the server and [`MemoryStore`] backs tests and fixtures.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::{read_records, SqliteGlossStore};

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{GlossId, GlossRecord, Relations};

#[async_trait]
pub trait RelationStore: Send + Sync {
    /// Fetch every record whose ID is in `ids` in one round trip.
    ///
    /// IDs that do not exist are absent from the result; this is not an error.
    async fn find_by_ids(&self, ids: &[GlossId]) -> Result<Vec<GlossRecord>>;

    /// Direct relation ID sets of one record, `None` if it does not exist.
    async fn relation_ids(&self, id: &str) -> Result<Option<Relations<GlossId>>> {
        let records = self.find_by_ids(&[id.to_string()]).await?;
        Ok(records
            .into_iter()
            .find(|r| r.id == id)
            .map(|r| r.relations.map(|target| target.id.clone())))
    }
}
