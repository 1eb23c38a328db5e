//! Grounded context assembly.
//!
//! Converts a ranked result list into the structured, citation-bearing
//! context handed to the answer generator. Chunks are admitted greedily
//! in rank order under a character budget; a chunk that would overflow
//! is skipped whole, never truncated mid-content. Each admitted chunk
//! gets a human-readable citation label derived from its source
//! filename and page.

use crate::models::{Chunk, Citation, Modality, RetrievalResult};

/// One admitted chunk with its citation label.
#[derive(Debug, Clone)]
pub struct ContextEntry {
    pub chunk: Chunk,
    pub label: String,
    pub score: f64,
}

/// Ordered evidence set for a single query. Never persisted; built per
/// query and discarded after the generation call returns.
#[derive(Debug, Clone)]
pub struct GroundedContext {
    pub entries: Vec<ContextEntry>,
    /// Characters admitted so far; never exceeds `budget_chars`.
    pub used_chars: usize,
    pub budget_chars: usize,
}

/// Citation label for a chunk: `"paper.pdf, p.12"`.
pub fn citation_label(chunk: &Chunk) -> String {
    format!("{}, p.{}", chunk.filename, chunk.page)
}

/// Greedily admit ranked chunks under the character budget.
///
/// Admission stops early only when the budget is fully exhausted;
/// otherwise each remaining chunk is considered, so a small chunk can
/// still be admitted after a large one was skipped.
pub fn assemble(results: &[RetrievalResult], budget_chars: usize) -> GroundedContext {
    let mut ctx = GroundedContext {
        entries: Vec::new(),
        used_chars: 0,
        budget_chars,
    };

    for result in results {
        let cost = result.chunk.text.chars().count();
        if ctx.used_chars + cost > budget_chars {
            continue;
        }
        ctx.used_chars += cost;
        ctx.entries.push(ContextEntry {
            label: citation_label(&result.chunk),
            chunk: result.chunk.clone(),
            score: result.score,
        });
        if ctx.used_chars == budget_chars {
            break;
        }
    }

    ctx
}

impl GroundedContext {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render the context block for the generator prompt.
    ///
    /// Text chunks contribute their text verbatim; image chunks are
    /// represented as an image reference plus their caption. Each entry
    /// is introduced by a numbered citation marker.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                out.push_str("\n\n---\n\n");
            }
            out.push_str(&format!("[{}] ({})\n", i + 1, entry.label));
            match entry.chunk.modality {
                Modality::Text => out.push_str(&entry.chunk.text),
                Modality::Image => {
                    out.push_str(&format!("[image] {}", entry.chunk.text));
                }
            }
        }
        out
    }

    /// Ordered citation list matching the `[n]` markers in `render`.
    pub fn citations(&self) -> Vec<Citation> {
        self.entries
            .iter()
            .map(|e| Citation {
                label: e.label.clone(),
                document_id: e.chunk.document_id.clone(),
                filename: e.chunk.filename.clone(),
                page: e.chunk.page,
            })
            .collect()
    }
}
