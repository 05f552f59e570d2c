//! trawl - persona triage and synthesis run
//!
//! `trawl` (or `trawl run`) performs one pipeline run and writes the rendered
//! export to `<root>/exports/<draft_id>.md`. `trawl digest` prints the current
//! delivery digest without calling the AI backend.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use trawl_common::config::{config_file_path, prepare_root_folder, RootFolderResolver};
use trawl_common::db::init_database;
use trawl_common::events::EventBus;
use trawl_common::persona::PersonaRegistry;
use trawl_common::time;

use trawl_engine::ai::HttpAiClient;
use trawl_engine::config::EngineConfig;
use trawl_engine::delivery::delivery_digest;
use trawl_engine::ingest::JsonFileFeed;
use trawl_engine::orchestrator::PipelineOrchestrator;
use trawl_engine::store::SqliteStore;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "trawl")]
#[command(about = "Creator-persona triage and synthesis pipeline")]
#[command(version)]
struct Cli {
    /// Config file (default: <config_dir>/trawl/trawl.toml)
    #[arg(short, long, env = "TRAWL_CONFIG")]
    config: Option<PathBuf>,

    /// Persona id, overriding pipeline.persona
    #[arg(short, long)]
    persona: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
enum Command {
    /// Ingest, score, escalate and compose one draft (default)
    Run {
        /// Re-score lite packs cached under the current prompt version
        #[arg(long)]
        force_refresh: bool,

        /// Proceed when the budget plan exceeds a ceiling
        #[arg(long)]
        override_budget: bool,
    },
    /// Print the delivery digest as JSON lines
    Digest {
        /// Maximum entries
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
}

impl Cli {
    fn selected_command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Run {
            force_refresh: false,
            override_budget: false,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Step 1: Configuration (defaults when the file is absent)
    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => config_file_path()?,
    };
    let mut config = EngineConfig::load(&config_path)?;

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting trawl {}", env!("CARGO_PKG_VERSION"));
    info!("Config: {}", config_path.display());

    // Step 2: Root folder and database
    let root = RootFolderResolver::new(config.root_folder.clone()).resolve();
    let db_path = prepare_root_folder(&root)?;
    info!("Database: {}", db_path.display());
    let pool = init_database(&db_path).await?;
    let store = SqliteStore::new(pool).with_max_lock_wait(config.pipeline.max_lock_wait_ms);

    // Step 3: Personas
    let personas_dir = config
        .personas_dir
        .clone()
        .unwrap_or_else(|| root.join("personas"));
    let personas = PersonaRegistry::load_dir(&personas_dir)
        .with_context(|| format!("loading personas from {}", personas_dir.display()))?;
    let requested = cli.persona.clone().or_else(|| config.pipeline.persona.clone());
    let persona_id = match (&requested, personas.ids().as_slice()) {
        (Some(id), _) => id.clone(),
        (None, [only]) => only.to_string(),
        (None, []) => bail!("no personas found in {}", personas_dir.display()),
        (None, ids) => bail!(
            "several personas available ({}); pass --persona or set pipeline.persona",
            ids.join(", ")
        ),
    };

    match cli.selected_command() {
        Command::Digest { limit } => {
            let entries = delivery_digest(
                &store,
                &persona_id,
                config.pipeline.pick_lookback_hours,
                limit,
                time::now(),
            )
            .await?;
            info!(persona = %persona_id, entries = entries.len(), "Delivery digest");
            for entry in &entries {
                println!("{}", serde_json::to_string(entry)?);
            }
            return Ok(());
        }
        Command::Run {
            force_refresh,
            override_budget,
        } => {
            config.pipeline.force_refresh |= force_refresh;
            config.pipeline.override_budget |= override_budget;
        }
    }

    // Step 4: Collaborators
    let backend = Arc::new(HttpAiClient::new(&config.ai)?);
    let inbox = config
        .ingest
        .inbox_dir
        .clone()
        .unwrap_or_else(|| root.join("inbox"));
    let sources = if inbox.is_dir() {
        JsonFileFeed::discover(&inbox)?
    } else {
        info!("No inbox at {}, ingest has no sources", inbox.display());
        Vec::new()
    };

    // Step 5: Run, then export
    let orchestrator = PipelineOrchestrator::new(store, backend, config, personas)
        .with_sources(sources)
        .with_event_bus(EventBus::new(100));
    let outcome = orchestrator.run(&persona_id).await?;

    let bundle = orchestrator.composer().export(outcome.draft.id).await?;
    let exports = root.join("exports");
    std::fs::create_dir_all(&exports)?;
    let export_path = exports.join(format!("{}.md", bundle.draft_id));
    std::fs::write(&export_path, &bundle.rendered)?;
    info!(draft_id = %bundle.draft_id, "Export written to {}", export_path.display());

    Ok(())
}
