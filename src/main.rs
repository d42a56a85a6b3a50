//! # Ad Censor CLI (`adcensor`)
//!
//! Manages the regulation knowledge base and runs compliance checks.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `adcensor docs add <paths..>` | Upload and index regulation documents |
//! | `adcensor docs list` | List documents in the knowledge base |
//! | `adcensor docs remove <name>` | Remove one document |
//! | `adcensor docs clear` | Remove every document and the index |
//! | `adcensor chunks <path>` | Preview how a document is chunked (local only) |
//! | `adcensor analyze --text T --image P` | Check an ad |
//! | `adcensor check` | Test the knowledge-service connection |
//! | `adcensor models` | List vision models |
//!
//! Credentials are read from the environment (`YC_FOLDER_ID`, `YC_API_KEY`,
//! `GEMINI_API_KEY`), optionally through a `.env` file next to the config.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use ad_censor::chunk::Chunker;
use ad_censor::config::{self, Config, AVAILABLE_VISION_MODELS};
use ad_censor::engine::Engine;
use ad_censor::models::AnalysisRequest;
use ad_censor::prompts::{risk_percentage, verdict};
use ad_censor::remote::memory::{InMemoryKnowledgeService, ScriptedVision};
use ad_censor::remote::{KnowledgeService, VisionModel};

/// Ad Censor: check advertising against Russian advertising law.
#[derive(Parser)]
#[command(name = "adcensor", version)]
struct Cli {
    /// Path to configuration file (TOML). Defaults apply when it does not exist.
    #[arg(long, global = true, default_value = "./config/adcensor.toml")]
    config: PathBuf,

    /// Vision model used to describe images (overrides config and GEMINI_MODEL).
    #[arg(long, global = true)]
    model: Option<String>,

    /// Use in-memory remote services instead of the cloud APIs.
    #[arg(long, global = true)]
    offline: bool,

    /// Debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only log warnings and errors.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the regulation knowledge base.
    Docs {
        #[command(subcommand)]
        action: DocsAction,
    },

    /// Show the chunks a document would be split into. No remote calls.
    Chunks {
        /// PDF, DOCX, or TXT file.
        path: PathBuf,
    },

    /// Check an ad (text, image, or both) against the knowledge base.
    Analyze {
        /// Ad text.
        #[arg(long, default_value = "")]
        text: String,

        /// Ad image (PNG, JPEG, GIF, BMP, WEBP).
        #[arg(long)]
        image: Option<PathBuf>,
    },

    /// Test the connection to the knowledge service.
    Check,

    /// List the available vision models.
    Models,
}

#[derive(Subcommand)]
enum DocsAction {
    /// Upload and index documents, one after another.
    Add {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// List document names.
    List,
    /// Remove a document by name.
    Remove { name: String },
    /// Remove every document and delete the index.
    Clear,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    ad_censor::logging::init_tracing(cli.verbose, cli.quiet);

    let mut cfg = config::load_config(&cli.config)?;
    if let Some(model) = &cli.model {
        cfg.vision.model = model.clone();
    }

    // Commands that need no remote services
    match &cli.command {
        Commands::Chunks { path } => return print_chunks(&cfg, path),
        Commands::Models => {
            for model in AVAILABLE_VISION_MODELS {
                let marker = if *model == cfg.vision.model { "*" } else { " " };
                println!("{} {}", marker, model);
            }
            return Ok(());
        }
        _ => {}
    }

    let mut engine = connect(&cfg, cli.offline).await?;

    match cli.command {
        Commands::Docs { action } => match action {
            DocsAction::Add { paths } => {
                let mut failed = 0;
                for (path, result) in engine.add_documents(&paths).await {
                    match result {
                        Ok(name) => {
                            let chunks = engine.chunks(&name).map_or(0, |c| c.len());
                            println!("[OK]   {} ({} chunks)", name, chunks);
                        }
                        Err(e) => {
                            failed += 1;
                            println!("[FAIL] {}\n{}", path.display(), e);
                        }
                    }
                }
                println!("Документов в базе знаний: {}", engine.document_count());
                if failed > 0 {
                    anyhow::bail!("{} of {} documents failed", failed, paths.len());
                }
            }
            DocsAction::List => {
                let names = engine.list_document_names();
                if names.is_empty() {
                    println!("База знаний пуста.");
                }
                for name in names {
                    println!("{}", name);
                }
            }
            DocsAction::Remove { name } => {
                engine.remove_document(&name).await;
                println!("Удалено: {}", name);
            }
            DocsAction::Clear => {
                engine.clear_all_documents().await;
                println!("База знаний очищена.");
            }
        },
        Commands::Analyze { text, image } => {
            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    on_interrupt.cancel();
                }
            });

            let report = engine
                .analyze_with_cancel(AnalysisRequest::new(text, image), cancel)
                .await;
            println!("{}", report);
            if let (Some(risk), Some(v)) = (risk_percentage(&report), verdict(&report)) {
                eprintln!("risk: {}%, status: {}", risk, v.literal());
            }
        }
        Commands::Check => {
            println!("{}", engine.test_connection().await);
        }
        Commands::Chunks { .. } | Commands::Models => unreachable!(),
    }

    Ok(())
}

async fn connect(cfg: &Config, offline: bool) -> anyhow::Result<Engine> {
    if offline {
        let knowledge: Arc<dyn KnowledgeService> = Arc::new(InMemoryKnowledgeService::new());
        let vision: Arc<dyn VisionModel> = Arc::new(ScriptedVision::default());
        let mut engine = Engine::new(cfg, Some(knowledge), Some(vision));
        engine.restore().await;
        return Ok(engine);
    }
    Engine::connect(cfg)
        .await
        .context("Failed to create remote service clients")
}

fn print_chunks(cfg: &Config, path: &std::path::Path) -> anyhow::Result<()> {
    let chunker = Chunker::from_config(&cfg.chunking);
    let chunks = chunker
        .process_document(path)
        .with_context(|| format!("Failed to load {}", path.display()))?;
    for chunk in &chunks {
        println!(
            "--- {} (offset {}, {} chars) ---",
            chunk.id,
            chunk.start,
            chunk.text.chars().count()
        );
        println!("{}", chunk.text);
    }
    println!("{} chunks", chunks.len());
    Ok(())
}
