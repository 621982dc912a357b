use anyhow::Result;
use glossgraph::db::{migrate, Db};
use glossgraph::error::GlossError;
use glossgraph::http::{self, AppState};
use glossgraph::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;

    // RUST_LOG wins over the configured level
    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("RUST_LOG", &config.glossgraph.log_level),
    )
    .init();

    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("verify");

    match command {
        "serve" => run_http_server(config).await?,
        _ => run_schema_verification(config).await?,
    }

    Ok(())
}

async fn open_server_db(config: &Config) -> Result<Db> {
    let db = Db::new(config.db_path());
    db.migrate(&config.server_migrations()).await?;
    log::info!("Database initialized at {}", config.db_path().display());
    Ok(db)
}

async fn run_http_server(config: Config) -> Result<()> {
    log::info!("Starting Glossgraph HTTP server v{}", env!("CARGO_PKG_VERSION"));
    let db = open_server_db(&config).await?;
    http::serve(&config.http_server, AppState::new(db)).await?;
    Ok(())
}

async fn run_schema_verification(config: Config) -> Result<()> {
    log::info!("Starting Glossgraph v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Server database: {}", config.db_path().display());
    log::info!("Local database: {}", config.local_db_path().display());
    log::info!("Remote endpoint: {}", config.closure.base_url);

    let db = open_server_db(&config).await?;
    verify_database_schema(&db).await?;
    Ok(())
}

/// Check that the server schema, pragmas and integrity are as expected.
async fn verify_database_schema(db: &Db) -> Result<()> {
    db.with_connection(|conn| {
        let mut stmt =
            conn.prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")?;
        let tables: Vec<String> = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;

        let expected_tables = [
            "challenge_glosses",
            "expression_challenges",
            "gloss_relations",
            "glosses",
            "schema_migrations",
            "situations",
            "understanding_challenges",
        ];
        let missing: Vec<&str> = expected_tables
            .iter()
            .copied()
            .filter(|table| !tables.iter().any(|t| t == table))
            .collect();
        for table in &missing {
            log::error!("Missing table: {}", table);
        }
        if !missing.is_empty() {
            return Err(GlossError::Config("Not all required tables exist".to_string()));
        }

        let applied = migrate::get_applied_migrations(conn)?;
        log::debug!("{} migrations applied", applied.len());

        let journal_mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
        if journal_mode.to_uppercase() != "WAL" {
            return Err(GlossError::Config(format!("Journal mode is not WAL: {}", journal_mode)));
        }

        let foreign_keys: i32 = conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0))?;
        if foreign_keys != 1 {
            return Err(GlossError::Config("Foreign keys not enabled".to_string()));
        }

        let integrity: String = conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        if integrity != "ok" {
            return Err(GlossError::Config(format!(
                "Database integrity check failed: {}",
                integrity
            )));
        }
        log::info!("Database integrity: OK");

        Ok(())
    })
    .await?;

    log::info!("Database schema verification complete");
    Ok(())
}
