use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use ramq_billing_core::config::{API_KEY_VAR, DB_PATH_VAR};
use ramq_billing_core::{
    parse_local_datetime, CatalogRow, Database, EncounterInput, EngineConfig, SuggestionBundle,
    SuggestionEngine,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "ramq-billing")]
#[command(about = "RAMQ emergency billing code assistant")]
struct Cli {
    /// SQLite database file
    #[arg(long, env = DB_PATH_VAR, default_value = "ramq_billing.db")]
    db: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the schema and load the base fee schedule
    Init,
    /// Suggest billing codes for an encounter
    Analyze {
        /// Triage level (1 = most urgent)
        #[arg(long)]
        triage: u8,
        /// Chief complaint
        #[arg(long)]
        complaint: String,
        /// Procedure performed (repeatable)
        #[arg(long = "procedure")]
        procedures: Vec<String>,
        /// Encounter length in minutes
        #[arg(long)]
        duration: u32,
        /// Local encounter time (YYYY-MM-DDTHH:MM), defaults to now
        #[arg(long)]
        at: Option<String>,
        /// Print the bundle as JSON
        #[arg(long)]
        json: bool,
    },
    /// List catalog codes
    Codes {
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        search: Option<String>,
    },
    /// Import catalog rows from a JSON array file
    Import {
        file: PathBuf,
        /// Delete every existing code first
        #[arg(long)]
        replace: bool,
    },
    /// Show history and cache statistics
    Stats,
    /// Delete expired cache entries
    PurgeCache,
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ramq_billing=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = EngineConfig::from_env()?;
    let mut db = Database::open(&cli.db)
        .with_context(|| format!("opening database {}", cli.db.display()))?;

    match cli.command {
        Commands::Init => {
            let inserted = db.seed_base_catalog()?;
            println!("Initialised {} ({} codes added)", cli.db.display(), inserted);
        }
        Commands::Analyze {
            triage,
            complaint,
            procedures,
            duration,
            at,
            json,
        } => {
            let mut input =
                EncounterInput::new(triage, complaint, duration).with_procedures(procedures);
            if let Some(at) = at {
                input = input.at(parse_local_datetime(&at)?);
            }
            input.validate()?;

            let engine = build_engine(&db, config)?;
            let bundle = engine.analyze(&db, &input)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&bundle)?);
            } else {
                print_bundle(&bundle);
            }
        }
        Commands::Codes { category, search } => {
            let engine = SuggestionEngine::load(&db, config)?;
            let entries = engine
                .catalog()
                .query(category.as_deref(), search.as_deref());
            if entries.is_empty() {
                println!("No codes found.");
            }
            for entry in entries {
                println!(
                    "{:<10} {:>8.2}  {:<14} {}",
                    entry.code, entry.base_fee, entry.category, entry.description
                );
            }
        }
        Commands::Import { file, replace } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let rows: Vec<CatalogRow> = serde_json::from_str(&raw)
                .with_context(|| format!("parsing {}", file.display()))?;
            let report = if replace {
                db.replace_catalog(&rows)?
            } else {
                db.import_catalog(&rows)?
            };
            println!("Imported {} codes ({} skipped)", report.imported, report.skipped);
        }
        Commands::Stats => {
            let stats = db.encounter_statistics()?;
            let cached = db.count_live_cache_entries(chrono::Utc::now())?;
            let engine = build_engine(&db, config)?;
            println!("Encounters:  {}", stats.total_encounters);
            println!("Average fee: {:.2}", stats.average_fee);
            println!("Physicians:  {}", stats.total_physicians);
            println!("Cached:      {}", cached);
            println!("Engine:      {}", engine.provider_name());
        }
        Commands::PurgeCache => {
            let removed = db.purge_expired_cache(chrono::Utc::now())?;
            println!("Removed {} expired cache entries", removed);
        }
    }

    Ok(())
}

/// Engine over the stored catalog, with the remote provider when configured.
#[cfg(feature = "remote")]
fn build_engine(db: &Database, config: EngineConfig) -> anyhow::Result<SuggestionEngine> {
    use std::sync::Arc;

    use ramq_billing_core::config::REMOTE_MODEL_VAR;
    use ramq_billing_core::engine::ChatProvider;
    use ramq_billing_llm::{OpenAiClient, DEFAULT_MODEL};

    let timeout = config.remote.timeout;
    let engine = SuggestionEngine::load(db, config)?;
    let Some(api_key) = api_key() else {
        return Ok(engine);
    };

    let model = std::env::var(REMOTE_MODEL_VAR).unwrap_or_else(|_| DEFAULT_MODEL.to_string());
    let client = OpenAiClient::new(api_key, model, timeout)?;
    Ok(engine.with_provider(Arc::new(ChatProvider::new(client))))
}

/// Engine over the stored catalog.
#[cfg(not(feature = "remote"))]
fn build_engine(db: &Database, config: EngineConfig) -> anyhow::Result<SuggestionEngine> {
    if api_key().is_some() {
        tracing::warn!("{} is set but this build has no remote support", API_KEY_VAR);
    }
    Ok(SuggestionEngine::load(db, config)?)
}

fn api_key() -> Option<String> {
    std::env::var(API_KEY_VAR).ok().filter(|k| !k.trim().is_empty())
}

fn print_bundle(bundle: &SuggestionBundle) {
    println!("Primary code:  {} ({:.2} $)", bundle.primary_code, bundle.base_fee);
    for fee in &bundle.procedure_fees {
        println!("Procedure:     {} ({:.2} $)", fee.code, fee.fee);
    }
    if !bundle.modifiers.is_empty() {
        let tags: Vec<&str> = bundle.modifiers.iter().map(|m| m.as_str()).collect();
        println!("Modifiers:     {} (x{:.2})", tags.join(", "), bundle.multiplier);
    }
    println!("Total:         {:.2} $", bundle.total_fee);
    println!("Confidence:    {:.2}", bundle.confidence);
    let cached = if bundle.from_cache { " (cached)" } else { "" };
    println!("Provider:      {}{}", bundle.provider, cached);
    println!("Reasoning:     {}", bundle.reasoning);
    for alt in &bundle.semantic_alternatives {
        println!("  ~ {:<8} {:.3}  {}", alt.code, alt.similarity, alt.description);
    }
}
