//! fileclassify - preview where documents would be filed.
//!
//! Usage:
//!   fileclassify preview --rule "类型 >> 年份" FILES...   Propose a destination per file
//!   fileclassify extract FILE [--metadata]               Dump extracted text / metadata
//!   fileclassify formats                                 List supported extensions
//!
//! Files are never moved.

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use fileclassify::config::AppConfig;
use fileclassify::pipeline::extraction::{ExtractionContext, ParserRegistry};
use fileclassify::pipeline::processor::Classifier;
use fileclassify::pipeline::structuring::OllamaBackend;

#[derive(Parser)]
#[command(name = "fileclassify")]
#[command(about = "Classify documents with a local LLM and preview their destination folders")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Config file (defaults to ~/FileClassify/config.json)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Classification model name
    #[arg(long, global = true)]
    model: Option<String>,

    /// Ollama base URL
    #[arg(long, global = true, value_name = "URL")]
    ollama_url: Option<String>,

    /// Vision model for scanned-PDF OCR
    #[arg(long, global = true)]
    ocr_model: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Classify files and print the proposed destination for each
    Preview {
        /// Folder rule, e.g. "Category [Contract, Invoice] >> Year"
        #[arg(short, long)]
        rule: String,

        /// Print one JSON object per file instead of a table
        #[arg(long)]
        json: bool,

        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Print the text (or metadata) a parser extracts from a file
    Extract {
        file: PathBuf,

        /// Print metadata as JSON instead of text
        #[arg(long)]
        metadata: bool,

        /// Print only the first N characters
        #[arg(long, value_name = "N")]
        summary: Option<usize>,
    },
    /// List the registered file extensions
    Formats,
}

impl Cli {
    fn app_config(&self) -> Result<AppConfig> {
        let mut config = match &self.config {
            Some(path) => AppConfig::load_at(path)?,
            None => AppConfig::load()?,
        };
        if let Some(model) = &self.model {
            config.model = model.clone();
        }
        if let Some(url) = &self.ollama_url {
            config.ollama_url = url.clone();
        }
        if let Some(ocr) = &self.ocr_model {
            config.ocr_model = Some(ocr.clone());
        }
        Ok(config)
    }
}

fn main() -> Result<()> {
    fileclassify::init_tracing();
    let cli = Cli::parse();

    match &cli.command {
        Command::Formats => {
            let registry = ParserRegistry::with_defaults(Arc::new(ExtractionContext::text_only()));
            for ext in registry.get_supported_extensions() {
                println!("{ext}");
            }
        }
        Command::Extract {
            file,
            metadata,
            summary,
        } => {
            let config = cli.app_config()?;
            let registry = ParserRegistry::with_defaults(Arc::new(ExtractionContext::detect(&config)));
            let parser = registry
                .get_parser(file)
                .with_context(|| format!("Cannot open {}", file.display()))?;

            if *metadata {
                let meta = parser.extract_metadata();
                println!("{}", serde_json::to_string_pretty(&meta)?);
            } else if let Some(n) = summary {
                println!("{}", parser.extract_summary(*n));
            } else {
                println!("{}", parser.extract_text().text());
            }
        }
        Command::Preview { rule, json, files } => {
            let config = cli.app_config()?;
            let registry = ParserRegistry::with_defaults(Arc::new(ExtractionContext::detect(&config)));
            let model = OllamaBackend::connect(&config)
                .with_context(|| format!("Cannot use model {} at {}", config.model, config.ollama_url))?;

            let classifier = Classifier::new(&registry, &model, rule)
                .with_summary_length(config.summary_max_length);
            let report = classifier.classify_batch(files, &AtomicBool::new(false));

            for outcome in &report.outcomes {
                if *json {
                    println!("{}", serde_json::to_string(outcome)?);
                } else {
                    println!("{}\t{}", outcome.source.display(), outcome.target_path().display());
                }
            }
            for (path, error) in &report.failures {
                eprintln!("{}: {error}", path.display());
            }
            if !report.failures.is_empty() {
                anyhow::bail!("{} of {} files could not be classified", report.failures.len(), files.len());
            }
        }
    }

    Ok(())
}
