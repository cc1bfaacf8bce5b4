//! Onto CLI - Command-line interface
//!
//! Usage:
//!   onto refine <file> [--domain legal] [--strategy pattern] [--config onto.toml]
//!   onto extract <file>... [--domain medical]
//!   onto config

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use onto_core::{EngineConfig, ExtractionContext, ExtractionStrategy, LoggingConfig};
use onto_extractor::{
    CorpusExtractor, ExtractionEngine, HashedNgramEmbedder, OntologyPipeline, PatternLibrary,
    PipelineParams, RelationshipInferencer, SemanticDeduplicator,
};
use onto_refine::RefinementMediator;

#[derive(Parser)]
#[command(name = "onto")]
#[command(about = "Ontology extraction and refinement CLI")]
#[command(version)]
struct Cli {
    /// TOML configuration file; environment variables override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a refinement cycle over one text file and print the final state
    Refine {
        /// Text file to read
        file: PathBuf,
        /// Target domain (legal, medical, business); generic when omitted
        #[arg(long)]
        domain: Option<String>,
        /// pattern, fallback or generative
        #[arg(long, default_value = "pattern")]
        strategy: String,
        /// Kind of input recorded in metadata
        #[arg(long, default_value = "text")]
        data_type: String,
    },
    /// Extract each file as an independent chunk and print the merged ontology
    Extract {
        files: Vec<PathBuf>,
        #[arg(long)]
        domain: Option<String>,
    },
    /// Print the effective configuration
    Config,
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<EngineConfig> {
    let config = match path {
        Some(path) => EngineConfig::from_file(path)?.with_env_override()?,
        None => EngineConfig::from_env()?,
    };
    config.validate()?;
    Ok(config)
}

fn init_logging(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "onto={level},onto_core={level},onto_extractor={level},onto_refine={level}",
            level = logging.level
        )
        .into()
    });

    // Logs go to stderr so stdout carries only JSON output.
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if logging.json_format {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn context(domain: Option<String>) -> ExtractionContext {
    match domain {
        Some(domain) => ExtractionContext::new(domain),
        None => ExtractionContext::generic(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;
    init_logging(&config.logging);

    match cli.command {
        Commands::Refine {
            file,
            domain,
            strategy,
            data_type,
        } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let strategy: ExtractionStrategy = strategy.parse()?;
            let context = context(domain)
                .with_strategy(strategy)
                .with_data_type(data_type);

            let mediator = RefinementMediator::from_config(
                &config,
                None,
                Some(Arc::new(HashedNgramEmbedder::default())),
            )?;
            let state = mediator.run_refinement_cycle_async(&text, &context).await?;

            info!(
                session = %state.session_id,
                phase = %state.phase,
                rounds = state.round,
                "Refinement complete"
            );
            println!("{}", serde_json::to_string_pretty(&state)?);
        }
        Commands::Extract { files, domain } => {
            let mut chunks = Vec::with_capacity(files.len());
            for file in &files {
                chunks.push(
                    std::fs::read_to_string(file)
                        .with_context(|| format!("failed to read {}", file.display()))?,
                );
            }

            let library = Arc::new(PatternLibrary::from_config(&config.extraction)?);
            let pipeline = OntologyPipeline::new(
                ExtractionEngine::new(library.clone()),
                RelationshipInferencer::new(library),
                SemanticDeduplicator::new(Some(Arc::new(HashedNgramEmbedder::default()))),
            );
            let ontology = CorpusExtractor::new(pipeline)
                .extract_corpus(chunks, &context(domain), &PipelineParams::from_config(&config))
                .await?;

            println!("{}", serde_json::to_string_pretty(&ontology)?);
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
