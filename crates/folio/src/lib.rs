//! # Folio
//!
//! A local-first, multimodal question-answering pipeline over PDF
//! documents.
//!
//! Folio ingests PDFs, extracts text per page and embedded images,
//! captions images with a locally hosted vision model so every chunk
//! lives in one text embedding space, and indexes the embedded chunks.
//! Questions (text, image, or both) retrieve the best-matching chunks,
//! which are assembled into a citation-bearing context and handed to a
//! generation model that answers from that context alone.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────────┐   ┌───────────┐
//! │   PDF    │──▶│   Pipeline     │──▶│ FileIndex │
//! │ ingest   │   │ caption+chunk │   │  (JSON)   │
//! └──────────┘   │    +embed     │   └─────┬─────┘
//!                └───────────────┘         │
//!                                          ▼
//! ┌──────────┐   ┌───────────────┐   ┌───────────┐
//! │ question │──▶│ retrieve+fuse │──▶│ generate  │
//! │ + image  │   │  +assemble    │   │ (cited)   │
//! └──────────┘   └───────────────┘   └───────────┘
//! ```
//!
//! Core data types, chunking, retrieval, fusion, and context assembly
//! live in the I/O-free `folio-core` crate; this crate adds the PDF
//! ingestor, the Ollama-backed model adapters, persistence, config,
//! and the CLI.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`ingest`] | PDF text and image extraction |
//! | [`vision`] | Image captioning and query-image description |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`generate`] | Answer generation adapter |
//! | [`store_file`] | JSON-file-persisted vector index |
//! | [`pipeline`] | Upload and ask orchestration |

pub mod config;
pub mod embedding;
pub mod generate;
pub mod ingest;
pub mod pipeline;
pub mod store_file;
pub mod vision;
