//! # Folio CLI (`folio`)
//!
//! The `folio` binary is the interface to the document QA pipeline. It
//! provides commands for ingesting PDFs, asking questions (text, image,
//! or both), listing indexed documents, and deleting them.
//!
//! ## Usage
//!
//! ```bash
//! folio --config ./folio.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `folio ingest <file.pdf>` | Extract, caption, chunk, embed, and index a PDF |
//! | `folio ask "<question>"` | Answer a question from the indexed documents |
//! | `folio ask --image <img>` | Query by image (optionally with a question) |
//! | `folio list` | List indexed document ids |
//! | `folio delete <id>` | Remove a document and its chunks |
//!
//! ## Examples
//!
//! ```bash
//! # Ingest a report
//! folio ingest ./reports/q3.pdf
//!
//! # Ask a text question
//! folio ask "What was the Q3 revenue?"
//!
//! # Ask about a chart screenshot
//! folio ask --image ./chart.png "What trend does this show?"
//!
//! # Ask for more results
//! folio ask "deployment steps" -k 12
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use folio::config::{self, Config};
use folio::embedding::OllamaProvider;
use folio::generate::OllamaGenerator;
use folio::pipeline::{AskOutcome, Pipeline, UploadOutcome};
use folio::store_file::FileIndex;
use folio::vision::OllamaCaptioner;
use folio_core::error::PipelineError;

/// Folio — local multimodal question answering over PDF documents.
#[derive(Parser)]
#[command(
    name = "folio",
    about = "Folio — local multimodal question answering over PDF documents",
    version,
    long_about = "Folio ingests PDFs (text and embedded images), indexes them with locally \
    hosted embedding and vision models, and answers questions with page-level citations. \
    Questions may be text, an image, or both."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./folio.toml`. A missing file means built-in
    /// defaults; a present file overrides per section.
    #[arg(long, global = true, default_value = "./folio.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Ingest a PDF into the index.
    ///
    /// Extracts text per page and embedded images, captions the images
    /// with the vision model, chunks, embeds, and indexes. Re-ingesting
    /// the identical file is a no-op.
    Ingest {
        /// Path to the PDF file.
        file: PathBuf,
    },

    /// Ask a question against the indexed documents.
    ///
    /// Provide a text question, a query image, or both. The answer is
    /// generated strictly from retrieved document context and printed
    /// with its page-level citations. When nothing relevant is indexed,
    /// Folio says so rather than inventing an answer.
    Ask {
        /// The question text.
        question: Option<String>,

        /// Path to a query image (PNG/JPEG).
        #[arg(long)]
        image: Option<PathBuf>,

        /// Number of chunks to retrieve (overrides the config).
        #[arg(short)]
        k: Option<usize>,
    },

    /// List indexed document ids.
    List,

    /// Delete a document and all its chunks from the index.
    Delete {
        /// Document id, as printed by `ingest` and `list`.
        id: String,
    },
}

fn build_pipeline(cfg: &Config) -> Result<Pipeline> {
    let index = FileIndex::open(&cfg.index.path)?;
    let embedder = OllamaProvider::new(&cfg.embedding)?;
    let captioner = OllamaCaptioner::new(&cfg.vision)?;
    let generator = OllamaGenerator::new(&cfg.generation)?;
    Ok(Pipeline::new(
        Arc::new(index),
        Arc::new(embedder),
        Arc::new(captioner),
        Arc::new(generator),
        cfg,
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Ingest { file } => {
            let bytes = std::fs::read(&file)
                .with_context(|| format!("Failed to read file: {}", file.display()))?;
            let filename = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| file.display().to_string());

            let pipeline = build_pipeline(&cfg)?;
            match pipeline.upload(&bytes, &filename).await? {
                UploadOutcome::Ingested { document, chunks } => {
                    println!(
                        "Ingested {} ({} pages, {} chunks)",
                        document.filename, document.page_count, chunks
                    );
                    println!("Document id: {}", document.id);
                }
                UploadOutcome::AlreadyIngested { document_id } => {
                    println!("Already ingested (document id: {})", document_id);
                }
            }
        }
        Commands::Ask { question, image, k } => {
            let image_bytes = match &image {
                Some(path) => Some(std::fs::read(path).with_context(|| {
                    format!("Failed to read query image: {}", path.display())
                })?),
                None => None,
            };

            let pipeline = build_pipeline(&cfg)?;
            let outcome = pipeline
                .ask(question.as_deref(), image_bytes.as_deref(), k)
                .await;

            match outcome {
                Ok(AskOutcome::Answered(answer)) => {
                    println!("{}", answer.text);
                    if !answer.citations.is_empty() {
                        println!();
                        println!("Sources:");
                        for (i, citation) in answer.citations.iter().enumerate() {
                            println!("  [{}] {}", i + 1, citation.label);
                        }
                    }
                }
                Ok(AskOutcome::NoGrounding) => {
                    println!("No relevant information found in the indexed documents.");
                }
                Err(PipelineError::EmptyQuery) => {
                    println!("Provide a question, an image (--image), or both.");
                    std::process::exit(2);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Commands::List => {
            let pipeline = build_pipeline(&cfg)?;
            let ids = pipeline.documents().await?;
            if ids.is_empty() {
                println!("No documents indexed.");
            } else {
                println!("{} document(s) indexed:", ids.len());
                for id in ids {
                    println!("  {}", id);
                }
            }
        }
        Commands::Delete { id } => {
            let pipeline = build_pipeline(&cfg)?;
            pipeline.delete(&id).await?;
            println!("Deleted document {} (if it was indexed).", id);
        }
    }

    Ok(())
}
