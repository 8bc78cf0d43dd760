// Theory Cascade - command-line entry point

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use theory_cascade::services::coding::PipelineReport;
use theory_cascade::storage::ConfigService;
use theory_cascade::utils::paths::config_path;
use theory_cascade::{AppConfig, CodingPipeline, Document, ModelState, SettingsStore};

#[derive(Parser)]
#[command(name = "theory-cascade", version, about = "Gioia-style qualitative coding with language models")]
struct Cli {
    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Code a corpus into first-order codes, themes and dimensions
    Code {
        #[command(flatten)]
        corpus: CorpusArgs,
    },
    /// Run the full pipeline up to a named model and its diagram
    Model {
        #[command(flatten)]
        corpus: CorpusArgs,
        /// Critique-and-revise rounds after the first model
        #[arg(long, default_value_t = 0)]
        critique_rounds: usize,
    },
    /// Rank a corpus by relevance to a query
    Rank {
        #[command(flatten)]
        corpus: CorpusArgs,
        #[arg(long)]
        query: String,
    },
    /// Send a free-form prompt to the configured provider
    Ask {
        prompt: String,
        /// System instruction for the request
        #[arg(long, conflicts_with = "stream")]
        system: Option<String>,
        /// Print the answer as it arrives
        #[arg(long)]
        stream: bool,
    },
    /// Inspect or create the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Write the default configuration if none exists
    Init,
}

#[derive(clap::Args)]
struct CorpusArgs {
    /// JSON array of documents, or a directory of .txt/.md files
    input: PathBuf,
    /// Remarks passed to the coding and modeling prompts
    #[arg(long)]
    remarks: Option<String>,
    /// Write JSON here instead of stdout
    #[arg(long, short)]
    output: Option<PathBuf>,
}

#[derive(Serialize)]
struct RunOutput<'a, T: Serialize> {
    result: &'a T,
    reports: &'a [PipelineReport],
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("theory_cascade=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let path = match cli.config {
        Some(path) => path,
        None => config_path()?,
    };

    match cli.command {
        Command::Config { action } => run_config(action, &path),
        Command::Code { corpus } => {
            let pipeline = open_pipeline(&path)?;
            let state = corpus.load_state()?;
            let (state, report) = pipeline.code_corpus(&state).await;
            print_notices(&report);
            corpus.write(&RunOutput {
                result: &state,
                reports: &[report],
            })
        }
        Command::Model {
            corpus,
            critique_rounds,
        } => {
            let pipeline = open_pipeline(&path)?;
            let state = corpus.load_state()?;
            let mut reports = Vec::new();

            let (mut state, report) = pipeline.code_corpus(&state).await;
            let stopped = report.stopped_at.is_some();
            reports.push(report);
            if !stopped {
                let (theorized, report) = pipeline.theorize(&state).await;
                reports.push(report);
                let (built, report) = pipeline.build_model(&theorized).await;
                reports.push(report);
                state = built;
                for round in 1..=critique_rounds {
                    info!(round, "Refining model");
                    let (refined, report) = pipeline.refine_model(&state).await;
                    let stopped = report.stopped_at.is_some();
                    reports.push(report);
                    state = refined;
                    if stopped {
                        break;
                    }
                }
            }
            reports.iter().for_each(print_notices);
            corpus.write(&RunOutput {
                result: &state,
                reports: &reports,
            })
        }
        Command::Ask {
            prompt,
            system,
            stream,
        } => {
            let pipeline = open_pipeline(&path)?;
            let outcome = if stream {
                let outcome = pipeline
                    .stream_completion(&prompt, |fragment| {
                        print!("{}", fragment);
                        let _ = std::io::stdout().flush();
                    })
                    .await;
                println!();
                outcome
            } else {
                let outcome = pipeline.complete(&prompt, system.as_deref()).await;
                println!("{}", outcome.value);
                outcome
            };
            for notice in &outcome.notices {
                warn!("{}", notice.message);
            }
            Ok(())
        }
        Command::Rank { corpus, query } => {
            let pipeline = open_pipeline(&path)?;
            let documents = load_documents(&corpus.input)?;
            let outcome = pipeline.run_retrieval(Some(&query), documents).await;
            for notice in &outcome.notices {
                warn!("{}", notice.message);
            }
            corpus.write(&outcome)
        }
    }
}

fn run_config(action: ConfigAction, path: &Path) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = ConfigService::load_or_default(path)?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        ConfigAction::Init => {
            let service = ConfigService::open(path)?;
            eprintln!("Configuration at {}", service.path().display());
        }
    }
    Ok(())
}

fn open_pipeline(path: &Path) -> Result<CodingPipeline> {
    let config: AppConfig = ConfigService::load_or_default(path)
        .with_context(|| format!("loading {}", path.display()))?;
    info!(provider = %config.provider, "Using provider");
    Ok(CodingPipeline::with_registry(SettingsStore::new(config)))
}

fn print_notices(report: &PipelineReport) {
    for notice in &report.notices {
        warn!("{}", notice.message);
    }
    if let Some(stage) = &report.stopped_at {
        info!(stage = %stage, "Pipeline stopped early");
    }
}

impl CorpusArgs {
    fn load_state(&self) -> Result<ModelState> {
        let mut state = ModelState::new(load_documents(&self.input)?);
        state.remarks = self.remarks.clone();
        Ok(state)
    }

    fn write<T: Serialize>(&self, value: &T) -> Result<()> {
        let json = serde_json::to_string_pretty(value)?;
        match &self.output {
            Some(path) => {
                fs::write(path, json).with_context(|| format!("writing {}", path.display()))?
            }
            None => println!("{}", json),
        }
        Ok(())
    }
}

/// Documents from a JSON array file or a directory of text files.
fn load_documents(input: &Path) -> Result<Vec<Document>> {
    if input.is_dir() {
        let mut paths: Vec<PathBuf> = fs::read_dir(input)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                matches!(
                    p.extension().and_then(|e| e.to_str()),
                    Some("txt") | Some("md")
                )
            })
            .collect();
        paths.sort();
        if paths.is_empty() {
            bail!("no .txt or .md files in {}", input.display());
        }
        paths
            .iter()
            .map(|path| {
                let stem = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or_default()
                    .to_string();
                let text = fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                Ok(Document::new(stem.clone(), stem, text))
            })
            .collect()
    } else {
        let content = fs::read_to_string(input)
            .with_context(|| format!("reading {}", input.display()))?;
        serde_json::from_str(&content).with_context(|| format!("parsing {}", input.display()))
    }
}
