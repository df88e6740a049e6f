//! # Document Model
//!
//! The input representation for the layout engine. A document is a layout
//! configuration plus a tree of nodes, each with a type, declared style
//! properties, and children. The tree is designed to be produced by a DOM
//! walker or written directly as JSON.
//!
//! Nodes are not laid out directly. `tree::BoxTree::build` turns them into
//! an arena of boxes: float and position styles pick the box kind, inline
//! runs between blocks get anonymous wrappers, and blocks nested inside
//! inlines split those inlines apart.

pub mod tree;

use crate::style::Style;
use serde::{Deserialize, Serialize};

/// A complete document ready for layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    #[serde(default)]
    pub config: LayoutConfig,
    /// The root node. Must be a `Block`.
    pub root: Node,
}

/// Layout-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutConfig {
    /// Width of the initial containing block, in points.
    #[serde(default = "default_container_width")]
    pub container_width: f64,

    /// Inline boxes nested deeper than this are flattened into their
    /// outermost container.
    #[serde(default = "default_max_inline_depth")]
    pub max_inline_depth: usize,

    /// When set, the flow is fragmented into the given regions.
    #[serde(default)]
    pub fragmentation: Option<RegionConfig>,

    /// Metrics for the built-in fixed-advance measurer.
    #[serde(default)]
    pub measurer: MeasurerConfig,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            container_width: default_container_width(),
            max_inline_depth: default_max_inline_depth(),
            fragmentation: None,
            measurer: MeasurerConfig::default(),
        }
    }
}

fn default_container_width() -> f64 {
    // A4 minus 0.75in margins
    487.28
}

fn default_max_inline_depth() -> usize {
    64
}

/// A sequence of regions (pages or columns) the flow is split across.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionConfig {
    /// Heights of consecutive regions, in points.
    pub heights: Vec<f64>,
    /// Keep producing regions of the last height once the list runs out.
    #[serde(default = "default_true")]
    pub repeat_last: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasurerConfig {
    /// Advance of every character, in points.
    #[serde(default = "default_advance")]
    pub advance: f64,
    /// Ascent as a fraction of the font size.
    #[serde(default = "default_ascent_ratio")]
    pub ascent_ratio: f64,
    /// Descent as a fraction of the font size.
    #[serde(default = "default_descent_ratio")]
    pub descent_ratio: f64,
}

impl Default for MeasurerConfig {
    fn default() -> Self {
        Self {
            advance: default_advance(),
            ascent_ratio: default_ascent_ratio(),
            descent_ratio: default_descent_ratio(),
        }
    }
}

fn default_advance() -> f64 {
    6.0
}

fn default_ascent_ratio() -> f64 {
    0.8
}

fn default_descent_ratio() -> f64 {
    0.2
}

/// A node in the document tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// What kind of node this is.
    pub kind: NodeKind,

    /// Style properties for this node.
    #[serde(default)]
    pub style: Style,

    /// Child nodes.
    #[serde(default)]
    pub children: Vec<Node>,

    /// A unique identifier for this node (optional, useful for debugging).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// The different kinds of nodes in the document tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum NodeKind {
    /// A block-level container, analogous to a `<div>`.
    Block,
    /// An inline container, analogous to a `<span>`.
    Inline,
    /// A run of text. Cannot have children.
    Text { content: String },
    /// Atomic content of a fixed size, like an image.
    Replaced { width: f64, height: f64 },
    /// A forced line break, like `<br>`.
    LineBreak,
}

impl Node {
    /// Create a Block node with children.
    pub fn block(style: Style, children: Vec<Node>) -> Self {
        Self {
            kind: NodeKind::Block,
            style,
            children,
            id: None,
        }
    }

    /// Create an Inline node with children.
    pub fn inline(style: Style, children: Vec<Node>) -> Self {
        Self {
            kind: NodeKind::Inline,
            style,
            children,
            id: None,
        }
    }

    /// Create a Text node.
    pub fn text(content: &str) -> Self {
        Self {
            kind: NodeKind::Text {
                content: content.to_string(),
            },
            style: Style::default(),
            children: vec![],
            id: None,
        }
    }

    pub fn replaced(width: f64, height: f64, style: Style) -> Self {
        Self {
            kind: NodeKind::Replaced { width, height },
            style,
            children: vec![],
            id: None,
        }
    }

    pub fn line_break() -> Self {
        Self {
            kind: NodeKind::LineBreak,
            style: Style::default(),
            children: vec![],
            id: None,
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    /// Can this node have children?
    pub fn accepts_children(&self) -> bool {
        matches!(self.kind, NodeKind::Block | NodeKind::Inline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_apply_to_missing_fields() {
        let doc: Document = serde_json::from_str(
            r#"{ "config": { "containerWidth": 300 }, "root": { "kind": { "type": "Block" } } }"#,
        )
        .unwrap();
        assert_eq!(doc.config.container_width, 300.0);
        assert_eq!(doc.config.max_inline_depth, 64);
        assert!(doc.config.fragmentation.is_none());
        assert_eq!(doc.config.measurer.advance, 6.0);
    }

    #[test]
    fn node_kinds_deserialize_from_type_tag() {
        let node: Node = serde_json::from_str(
            r#"{ "kind": { "type": "Block" }, "children": [
                { "kind": { "type": "Text", "content": "hi" } },
                { "kind": { "type": "Replaced", "width": 20, "height": 10 } },
                { "kind": { "type": "LineBreak" } }
            ] }"#,
        )
        .unwrap();
        assert!(matches!(node.kind, NodeKind::Block));
        assert!(matches!(node.children[0].kind, NodeKind::Text { ref content } if content == "hi"));
        assert!(matches!(node.children[1].kind, NodeKind::Replaced { width, .. } if width == 20.0));
        assert!(matches!(node.children[2].kind, NodeKind::LineBreak));
    }

    #[test]
    fn region_config_repeats_by_default() {
        let cfg: RegionConfig = serde_json::from_str(r#"{ "heights": [100] }"#).unwrap();
        assert!(cfg.repeat_last);
    }
}
