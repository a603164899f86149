use std::{
    path::{
        Path,
        PathBuf,
    },
    sync::Arc,
    time::Duration,
};

use chrono::Utc;
use clap::{
    Parser,
    Subcommand,
};
use jreader_anki::{
    anki::{
        build_fields,
        build_plan,
        AnkiConnectClient,
        BaseUrlAssetFetcher,
        SyncOrchestrator,
    },
    core::{
        logging,
        SyncError,
    },
    persistence::{
        CardFile,
        SyncSettings,
    },
};
use serde_json::json;

#[derive(Parser)]
#[command(name = "jreader-anki")]
#[command(author, version, about = "Render and sync jreader flashcards to Anki", long_about = None)]
struct Cli {
    /// Settings file (defaults to the app data dir)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print each card's resolved fields without touching the network
    Render {
        /// JSON array of cards
        cards: PathBuf,
    },

    /// Print the media each card would upload
    Plan {
        /// JSON array of cards
        cards: PathBuf,
    },

    /// Write the effective settings back to the settings file and print them
    Settings,

    /// Push field updates through AnkiConnect and mark succeeded cards as synced
    Sync {
        /// JSON array of cards, rewritten in place for succeeded cards
        cards: PathBuf,

        /// Cards processed at once (overrides the settings file)
        #[arg(short, long)]
        concurrency: Option<usize>,

        /// AnkiConnect URL (overrides the settings file and JREADER_ANKI_URL)
        #[arg(long)]
        anki_url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), SyncError> {
    let cli = Cli::parse();
    logging::init()?;

    let settings = match &cli.settings {
        Some(path) => SyncSettings::load_from(path),
        None => SyncSettings::load(),
    };

    match cli.command {
        Commands::Render { cards } => render(&cards, &settings).await,
        Commands::Plan { cards } => plan(&cards, &settings).await,
        Commands::Settings => {
            match &cli.settings {
                Some(path) => settings.save_to(path)?,
                None => settings.save()?,
            }
            println!("{}", serde_json::to_string_pretty(&settings)?);
            Ok(())
        }
        Commands::Sync { cards, concurrency, anki_url } => {
            let mut settings = settings;
            if let Some(concurrency) = concurrency {
                settings.concurrency = concurrency;
            }
            if let Some(url) = anki_url {
                settings.anki_connect_url = url;
            }
            sync(&cards, &settings).await
        }
    }
}

async fn render(path: &Path, settings: &SyncSettings) -> Result<(), SyncError> {
    let cards = CardFile::open(path)?.cards().await;
    let options = settings.render_options();

    let mut output = Vec::with_capacity(cards.len());
    for card in &cards {
        let mut built = build_fields(card, &settings.field_mapping, &options);
        let plan = build_plan(card, &built.media);
        let unresolved = plan.resolve_fields(&mut built.fields);
        if !unresolved.is_empty() {
            tracing::error!("Card {} has unresolved placeholders in {:?}", card.id, unresolved);
        }
        output.push(json!({ "card_id": card.id, "fields": built.fields }));
    }

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn plan(path: &Path, settings: &SyncSettings) -> Result<(), SyncError> {
    let cards = CardFile::open(path)?.cards().await;
    let options = settings.render_options();

    let plans: Vec<_> = cards
        .iter()
        .map(|card| {
            let built = build_fields(card, &settings.field_mapping, &options);
            build_plan(card, &built.media)
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&plans)?);
    Ok(())
}

async fn sync(path: &Path, settings: &SyncSettings) -> Result<(), SyncError> {
    let file = CardFile::open(path)?;
    let cards = file.cards().await;
    if settings.field_mapping.is_empty() {
        tracing::warn!("Field mapping is empty; notes will receive no field changes");
    }

    let client = AnkiConnectClient::new(&settings.anki_connect_url, settings.request_timeout())?;
    client.wait_awake(3, Duration::from_secs(1)).await?;
    tracing::info!("Syncing {} through {}", file.path().display(), client.url());

    let fetcher = BaseUrlAssetFetcher::new(&settings.media_base_url, &settings.image_base_url)?;
    let orchestrator =
        SyncOrchestrator::new(Arc::new(client), Arc::new(fetcher), settings.field_mapping.clone())
            .with_options(settings.render_options())
            .with_timeout(settings.request_timeout())
            .with_concurrency(settings.concurrency);

    let report = orchestrator.sync_batch(&cards).await;
    report.persist(&file, Utc::now()).await?;

    for (card_id, reason) in report.failed() {
        tracing::warn!("Card {} failed: {}", card_id, reason);
    }
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
