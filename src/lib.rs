pub mod config;
pub mod error;
pub mod db;
pub mod model;
pub mod store;
pub mod graph;
pub mod service;
pub mod cache;
pub mod closure;
pub mod local;
pub mod http;

pub use config::Config;
pub use error::{GlossError, Result};
pub use graph::{GlossResolver, Resolved, ResolvedGloss};
pub use closure::{fetch_closure, ClosureOptions, ClosureOutcome, PartialGraph};
pub use local::{LocalStore, SyncClient};

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::PathBuf;
    use tempfile::TempDir;

    use crate::db::Db;
    use crate::local::LocalStore;

    fn migrations(kind: &str) -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("migrations").join(kind)
    }

    async fn migrated(kind: &str, file: &str) -> (Db, TempDir) {
        let temp = TempDir::new().unwrap();
        let db = Db::new(temp.path().join(file));
        db.migrate(&migrations(kind)).await.unwrap();
        (db, temp)
    }

    /// Fresh server-side database with every migration applied.
    pub async fn server_db() -> (Db, TempDir) {
        migrated("server", "server.db").await
    }

    pub async fn local_db() -> (Db, TempDir) {
        migrated("local", "local.db").await
    }

    pub async fn local_store() -> (LocalStore, TempDir) {
        let (db, temp) = local_db().await;
        (LocalStore::new(db), temp)
    }
}
