//! # Box Geometry
//!
//! Resolves the inline-axis geometry of a block box against its containing
//! block (width, margins, borders, padding) and its block-axis size once the
//! content height is known. Also computes intrinsic (min-content and
//! max-content) widths, which floats and other shrink-to-fit boxes use.

use unicode_linebreak::BreakOpportunity;

use crate::layout::inline_items::inline_edge;
use crate::model::tree::{BoxId, BoxKind, BoxTree};
use crate::style::{Dimension, Direction, Edges, ResolvedStyle};
use crate::text::{break_opportunities, collapse_white_space, trailing_space_len, TextMeasurer};

/// Resolved inline-axis geometry of a block box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockGeometry {
    pub content_width: f64,
    /// Used margins. Top and bottom are resolved here too (`auto` is 0).
    pub margin: Edges,
    pub border: Edges,
    pub padding: Edges,
    /// Offset of the border box from the start of the space it was given.
    pub x: f64,
}

impl BlockGeometry {
    pub fn border_box_width(&self) -> f64 {
        self.content_width + self.border.horizontal() + self.padding.horizontal()
    }

    pub fn margin_box_width(&self) -> f64 {
        self.border_box_width() + self.margin.horizontal()
    }

    /// Left edge of the content box, relative to the border box.
    pub fn content_left(&self) -> f64 {
        self.border.left + self.padding.left
    }

    pub fn border_padding_before(&self) -> f64 {
        self.border.top + self.padding.top
    }

    pub fn border_padding_after(&self) -> f64 {
        self.border.bottom + self.padding.bottom
    }
}

fn clamp_width(style: &ResolvedStyle, width: f64, containing_width: f64) -> f64 {
    let mut w = width;
    if let Some(max) = style.max_width.and_then(|d| d.resolve(containing_width)) {
        w = w.min(max);
    }
    if let Some(min) = style.min_width.resolve(containing_width) {
        w = w.max(min);
    }
    w.max(0.0)
}

/// Resolve a block's width and margins.
///
/// `containing_width` is the content width of the containing block, which
/// percentages resolve against. `float_shrink` is the width taken by floats
/// beside the block's provisional top; only boxes that avoid floats pass a
/// non-zero value. `direction` is the containing block's: it decides which
/// side an over-constrained box overflows on.
pub fn resolve_block_geometry(
    style: &ResolvedStyle,
    containing_width: f64,
    float_shrink: f64,
    direction: Direction,
) -> BlockGeometry {
    let available = (containing_width - float_shrink).max(0.0);
    let border = style.border_width;
    let padding = style.padding;
    let bp = border.horizontal() + padding.horizontal();

    let margin_left = style.margin.left.resolve(containing_width);
    let margin_right = style.margin.right.resolve(containing_width);
    let margin_top = style.margin.top.resolve_or_zero(containing_width);
    let margin_bottom = style.margin.bottom.resolve_or_zero(containing_width);

    let (content_width, left, right) = match style.width.resolve(containing_width) {
        None => {
            let left = margin_left.unwrap_or(0.0);
            let right = margin_right.unwrap_or(0.0);
            let width = clamp_width(style, available - left - right - bp, containing_width);
            (width, left, right)
        }
        Some(specified) => {
            let width = clamp_width(style, specified, containing_width);
            let slack = available - width - bp;
            match (margin_left, margin_right) {
                (None, None) => {
                    if slack >= 0.0 {
                        (width, slack / 2.0, slack / 2.0)
                    } else if direction.is_ltr() {
                        (width, 0.0, slack)
                    } else {
                        (width, slack, 0.0)
                    }
                }
                (None, Some(r)) => (width, slack - r, r),
                (Some(l), None) => (width, l, slack - l),
                (Some(l), Some(r)) => (width, l, r),
            }
        }
    };

    let border_box = content_width + bp;
    let x = if direction.is_ltr() || style.width.is_auto() {
        left
    } else {
        available - right - border_box
    };

    BlockGeometry {
        content_width,
        margin: Edges {
            top: margin_top,
            right,
            bottom: margin_bottom,
            left,
        },
        border,
        padding,
        x,
    }
}

/// Resolve a box's content height from its laid-out content height.
///
/// Percentages resolve against `containing_height` when it's definite and
/// behave as `auto` otherwise.
pub fn resolve_content_height(
    style: &ResolvedStyle,
    content_height: f64,
    containing_height: Option<f64>,
) -> f64 {
    let resolve = |d: Dimension| match d {
        Dimension::Percent(_) => containing_height.and_then(|h| d.resolve(h)),
        _ => d.resolve(0.0),
    };
    let mut h = resolve(style.height).unwrap_or(content_height);
    if let Some(max) = style.max_height.and_then(resolve) {
        h = h.min(max);
    }
    if let Some(min) = resolve(style.min_height) {
        h = h.max(min);
    }
    h.max(0.0)
}

/// Whether the height is fixed before layout (needed by percentage heights
/// of children).
pub fn definite_height(style: &ResolvedStyle, containing_height: Option<f64>) -> Option<f64> {
    match style.height {
        Dimension::Pt(h) => Some(resolve_content_height(style, h, containing_height)),
        Dimension::Percent(p) => containing_height.map(|c| {
            resolve_content_height(style, c * p / 100.0, containing_height)
        }),
        Dimension::Auto => None,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct IntrinsicSizes {
    pub min_content: f64,
    pub max_content: f64,
}

impl IntrinsicSizes {
    /// `min(max(min-content, available), max-content)`.
    pub fn shrink_to_fit(&self, available: f64) -> f64 {
        self.min_content.max(available).min(self.max_content).max(0.0)
    }
}

/// Accumulates line widths while walking inline content.
#[derive(Debug, Default)]
struct InlineWidths {
    line: f64,
    line_trailing: f64,
    max_line: f64,
    widest_unit: f64,
    after_space: bool,
}

impl InlineWidths {
    fn force_break(&mut self) {
        self.max_line = self.max_line.max(self.line - self.line_trailing);
        self.line = 0.0;
        self.line_trailing = 0.0;
        self.after_space = true;
    }

    fn add_unbreakable(&mut self, width: f64) {
        self.line += width;
        self.line_trailing = 0.0;
        self.widest_unit = self.widest_unit.max(width);
        self.after_space = false;
    }
}

/// Intrinsic widths of a box's content box (border box for `Replaced`).
pub fn intrinsic_sizes(tree: &BoxTree, id: BoxId, measurer: &dyn TextMeasurer) -> IntrinsicSizes {
    let style = tree.style(id);
    if let Dimension::Pt(w) = style.width {
        let w = clamp_width(style, w, 0.0);
        return IntrinsicSizes {
            min_content: w,
            max_content: w,
        };
    }

    let mut sizes = if tree.children_inline(id) {
        let mut acc = InlineWidths {
            after_space: true,
            ..Default::default()
        };
        inline_widths(tree, id, measurer, &mut acc);
        acc.force_break();
        IntrinsicSizes {
            min_content: acc.widest_unit,
            max_content: acc.max_line,
        }
    } else {
        let mut sizes = IntrinsicSizes::default();
        for &child in tree.children(id) {
            if matches!(tree.kind(child), BoxKind::OutOfFlow) {
                continue;
            }
            let child_sizes = outer_intrinsic_sizes(tree, child, measurer);
            sizes.min_content = sizes.min_content.max(child_sizes.min_content);
            sizes.max_content = sizes.max_content.max(child_sizes.max_content);
        }
        sizes
    };

    sizes.min_content = clamp_width(style, sizes.min_content, 0.0);
    sizes.max_content = clamp_width(style, sizes.max_content, 0.0).max(sizes.min_content);
    sizes
}

/// Intrinsic widths of a box including its border, padding and fixed
/// margins, as its parent sees it.
pub fn outer_intrinsic_sizes(tree: &BoxTree, id: BoxId, measurer: &dyn TextMeasurer) -> IntrinsicSizes {
    let style = tree.style(id);
    let extra = style.border_width.horizontal()
        + style.padding.horizontal()
        + style.margin.left.fixed()
        + style.margin.right.fixed();
    let inner = match tree.kind(id) {
        BoxKind::Replaced { width, .. } => IntrinsicSizes {
            min_content: *width,
            max_content: *width,
        },
        _ => intrinsic_sizes(tree, id, measurer),
    };
    IntrinsicSizes {
        min_content: inner.min_content + extra,
        max_content: inner.max_content + extra,
    }
}

/// Pending work of the inline width walk.
enum WidthStep {
    Visit(BoxId),
    Close(BoxId),
}

/// Add the inline content under `container` to `acc`, walking with an
/// explicit stack.
fn inline_widths(tree: &BoxTree, container: BoxId, measurer: &dyn TextMeasurer, acc: &mut InlineWidths) {
    let mut stack: Vec<WidthStep> = tree.children(container).iter().rev().map(|&c| WidthStep::Visit(c)).collect();
    while let Some(step) = stack.pop() {
        let id = match step {
            WidthStep::Visit(id) => id,
            WidthStep::Close(id) => {
                if tree.get(id).slice.has_end_edge {
                    acc.line += inline_edge(tree.style(id), false);
                }
                continue;
            }
        };
        let style = tree.style(id);
        match tree.kind(id) {
            BoxKind::Text(content) => text_widths(content, style, measurer, acc),
            BoxKind::Inline => {
                if tree.get(id).slice.has_start_edge {
                    acc.line += inline_edge(style, true);
                }
                stack.push(WidthStep::Close(id));
                stack.extend(tree.children(id).iter().rev().map(|&c| WidthStep::Visit(c)));
            }
            BoxKind::Replaced { width, .. } => {
                let w = width + style.margin.left.fixed() + style.margin.right.fixed();
                acc.add_unbreakable(w);
            }
            BoxKind::LineBreak => acc.force_break(),
            BoxKind::Floated => {
                let sizes = outer_intrinsic_sizes(tree, id, measurer);
                acc.widest_unit = acc.widest_unit.max(sizes.min_content);
                acc.line += sizes.max_content;
            }
            BoxKind::BlockContainer => {
                // Only reachable through a container that wasn't normalized.
                let sizes = outer_intrinsic_sizes(tree, id, measurer);
                acc.force_break();
                acc.widest_unit = acc.widest_unit.max(sizes.min_content);
                acc.max_line = acc.max_line.max(sizes.max_content);
            }
            BoxKind::OutOfFlow => {}
        }
    }
}

fn text_widths(content: &str, style: &ResolvedStyle, measurer: &dyn TextMeasurer, acc: &mut InlineWidths) {
    let text = collapse_white_space(content, style.white_space, &mut acc.after_space);
    let mut start = 0;
    let mut ends: Vec<(usize, bool)> = break_opportunities(&text)
        .into_iter()
        .filter(|(_, opp)| *opp == BreakOpportunity::Mandatory || style.white_space.wraps())
        .map(|(offset, opp)| (offset, opp == BreakOpportunity::Mandatory))
        .collect();
    ends.push((text.len(), false));
    for (end, mandatory) in ends {
        if end <= start {
            continue;
        }
        let segment = &text[start..end];
        let width = measurer.measure(segment, style, style.direction).width;
        let trailing = trailing_space_len(segment, style.white_space);
        let trailing_width = if trailing > 0 {
            measurer
                .measure(&segment[segment.len() - trailing..], style, style.direction)
                .width
        } else {
            0.0
        };
        acc.widest_unit = acc.widest_unit.max(width - trailing_width);
        acc.line += width;
        acc.line_trailing = trailing_width;
        if mandatory {
            acc.force_break();
        }
        start = end;
    }
    acc.after_space = text.ends_with(' ') || text.ends_with('\n') || (text.is_empty() && acc.after_space);
}
