//! # Blockflow
//!
//! A block-box layout engine: stacks block boxes, collapses their margins,
//! breaks inline content into bidi-ordered lines that wrap around floats,
//! and fragments the flow across a chain of regions.
//!
//! The engine decides where things go. It doesn't shape text or paint; text
//! widths come from a `TextMeasurer` and bidi levels from a
//! `ParagraphResolver`, both replaceable.
//!
//! ## Architecture
//!
//! ```text
//! Input (JSON/API)
//!       ↓
//!   [model]    — Document tree → box tree (anonymous blocks, splits)
//!       ↓
//!   [style]    — Resolve inheritance and initial values
//!       ↓
//!   [layout]   — Blocks, margins, floats, lines, fragmentation
//!       ↓
//!   LayoutResult (fragments, lines, regions, repaint range)
//! ```

pub mod error;
pub mod geometry;
pub mod layout;
pub mod model;
pub mod style;
pub mod text;

use error::FlowError;
use layout::{LayoutEngine, LayoutResult};
use model::tree::BoxTree;
use model::Document;

/// Lay out a document with the built-in measurer.
///
/// This is the primary entry point. Fails only when the node tree can't
/// form a box tree.
pub fn layout_document(document: &Document) -> Result<LayoutResult, FlowError> {
    let tree = BoxTree::build(&document.root)?;
    let engine = LayoutEngine::from_config(&document.config);
    Ok(engine.layout(&tree, &document.config))
}

/// Lay out a document described as JSON.
pub fn layout_json(json: &str) -> Result<LayoutResult, FlowError> {
    let document: Document = serde_json::from_str(json)?;
    layout_document(&document)
}
