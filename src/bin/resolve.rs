use anyhow::Result;
use clap::Parser;
use glossgraph::db::Db;
use glossgraph::model::LanguageCode;
use glossgraph::service::GlossService;
use glossgraph::Config;

#[derive(Parser, Debug)]
#[command(name = "resolve")]
#[command(about = "Resolve glosses from the server database and print them as JSON")]
struct Args {
    /// Gloss IDs to resolve
    ids: Vec<String>,

    /// Look a gloss up by natural key instead (needs --content)
    #[arg(short, long)]
    language: Option<LanguageCode>,

    #[arg(short, long, requires = "language")]
    content: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().filter_or("RUST_LOG", "warn")).init();

    let args = Args::parse();
    let config = Config::load()?;

    let db = Db::new(config.db_path());
    db.migrate(&config.server_migrations()).await?;
    let glosses = GlossService::new(db);

    let mut ids = args.ids;
    if let (Some(language), Some(content)) = (args.language, args.content.as_deref()) {
        match glosses.find_id_by_natural_key(language, content).await? {
            Some(id) => ids.push(id),
            None => anyhow::bail!("No gloss {}:{}", language, content),
        }
    }
    if ids.is_empty() {
        anyhow::bail!("Usage: resolve <id>... | resolve --language <code> --content <text>");
    }

    let resolved = glosses.resolver().resolve_by_ids(&ids).await?;
    for id in &ids {
        if !resolved.contains_key(id) {
            log::warn!("Gloss {} not found", id);
        }
    }
    let dtos: Vec<_> = resolved.ids().iter().filter_map(|id| resolved.dto(id)).collect();
    println!("{}", serde_json::to_string_pretty(&dtos)?);

    log::info!("Resolved {} glosses ({} nodes loaded)", dtos.len(), resolved.graph().len());
    Ok(())
}
