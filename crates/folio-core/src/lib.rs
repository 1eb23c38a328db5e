//! # Folio Core
//!
//! Shared logic for Folio's multimodal retrieval-and-grounding pipeline:
//! data models, chunking, vector index abstraction, fused retrieval, and
//! grounded context assembly.
//!
//! This crate contains no tokio, HTTP, filesystem I/O, or PDF parsing.
//! Everything here is deterministic given its inputs, so the retrieval
//! algorithm can be tested without external model-serving processes.

pub mod assemble;
pub mod chunk;
pub mod error;
pub mod models;
pub mod retrieve;
pub mod store;
