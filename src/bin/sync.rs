use anyhow::Result;
use clap::Parser;
use glossgraph::closure::{ClosureOptions, HttpRecordSource};
use glossgraph::local::{LocalStore, SyncClient};
use glossgraph::model::LanguageCode;
use glossgraph::Config;

#[derive(Parser, Debug)]
#[command(name = "sync")]
#[command(about = "Download situations and their gloss closure into the local store")]
struct Args {
    /// Situations to download; with none given, every situation of --target
    identifiers: Vec<String>,

    /// Target language for the summary listing
    #[arg(short, long, default_value = "spa")]
    target: LanguageCode,

    /// Native languages in preference order, comma-separated
    #[arg(short, long, default_value = "eng")]
    natives: String,

    /// Override closure.base_url
    #[arg(long)]
    base_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().filter_or("RUST_LOG", "info")).init();

    let args = Args::parse();
    let mut config = Config::load()?;
    if let Some(base_url) = args.base_url {
        config.closure.base_url = base_url;
    }
    let natives = LanguageCode::parse_list(&args.natives)?;

    let store = LocalStore::open(config.local_db_path(), &config.local_migrations()).await?;
    let source = HttpRecordSource::from_config(&config.closure)?;
    let options = ClosureOptions::from(&config.closure);

    // Ctrl-C cancels the fetch; records already received are still stored.
    let cancel = options.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted, storing what has arrived");
            cancel.cancel();
        }
    });

    let sync = SyncClient::new(source, store, options);
    log::info!("Syncing from {}", config.closure.base_url);

    let reports = if args.identifiers.is_empty() {
        sync.download_all(args.target, &natives).await?
    } else {
        let mut reports = Vec::with_capacity(args.identifiers.len());
        for identifier in &args.identifiers {
            reports.push(sync.download_situation(identifier, &natives).await?);
        }
        reports
    };

    let mut records = 0;
    for report in &reports {
        records += report.records;
        for failure in &report.failures {
            log::warn!("{}: could not fetch {}: {}", report.identifier, failure.id, failure.reason);
        }
    }
    log::info!(
        "Synced {} situations, {} glosses; local store now holds {}",
        reports.len(),
        records,
        sync.store().count().await?
    );
    println!("{}", serde_json::to_string_pretty(&reports)?);

    Ok(())
}
