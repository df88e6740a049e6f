//! # Block Flow Layout
//!
//! Turns a box tree into positioned fragments. The engine stacks block
//! boxes, collapses their margins, wraps inline content into lines around
//! floats and, when the document asks for it, splits the flow across a
//! chain of regions.
//!
//! ## How a pass works
//!
//! 1. The root is laid out as a new block formatting context at offset 0.
//! 2. Each block container either hosts lines (`line_breaker`) or stacks
//!    block children (`block`). Children are placed top to bottom; a child
//!    is never revisited once the next one is placed, except when a region
//!    boundary or a float forces one relayout of that child.
//! 3. Floats live in a `FloatManager` per formatting context. Children that
//!    don't start a new context see their ancestors' floats as intruding.
//! 4. With fragmentation on, lines and unsplittable boxes that straddle a
//!    region boundary are pushed down by a strut, and widows and orphans are
//!    honored by pushing whole lines or whole blocks.
//!
//! Fragment rectangles are relative to the parent fragment's border box,
//! lines and runs to their container's border box. `LayoutResult::absolute_lines`
//! flattens them into flow coordinates.

pub mod block;
pub mod floats;
pub mod fragmentation;
pub mod inline_items;
pub mod line_breaker;
pub mod line_positioner;
pub mod margins;
pub mod sizing;

use std::cell::RefCell;
use std::collections::HashMap;

use serde::Serialize;

use crate::geometry::Rect;
use crate::model::tree::{BoxId, BoxTree};
use crate::model::LayoutConfig;
use crate::style::{Direction, ResolvedStyle};
use crate::text::bidi::{ParagraphResolver, UnicodeBidiResolver};
use crate::text::{FixedAdvanceMeasurer, FontMetrics, Measurement, TextMeasurer};

use self::block::BlockFlow;
use self::fragmentation::{Region, RegionChain, RegionProvider};
use self::margins::MarginValues;

// ── Output types ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunKind {
    Text,
    /// Collapsible space at the end of a line. Never counts toward alignment.
    TrailingSpace,
    Atomic,
    InlineStart,
    InlineEnd,
    /// The hyphen drawn where a line breaks inside a word.
    Hyphen,
    /// "…" closing a line truncated by `text-overflow: ellipsis`.
    Ellipsis,
}

/// A piece of a line with one box, one bidi level and one position.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacedRun {
    pub box_id: BoxId,
    pub kind: RunKind,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub text: String,
    /// Byte range in the paragraph text.
    pub start: usize,
    pub end: usize,
    pub level: u8,
    pub direction: Direction,
    pub rect: Rect,
    /// Extra width added by justification.
    pub expansion: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineBox {
    /// Runs in visual order, left to right.
    pub runs: Vec<PlacedRun>,
    /// Left edge of the space the line was fitted into.
    pub left: f64,
    pub available_width: f64,
    pub top: f64,
    pub bottom: f64,
    pub baseline: f64,
    pub bidi_level: u8,
    pub ends_with_break: bool,
    pub pagination_strut: f64,
    pub is_first_after_break: bool,
    pub visual_overflow: Rect,
}

impl LineBox {
    pub fn height(&self) -> f64 {
        self.bottom - self.top
    }

    /// Text of the line in logical order, trailing space included.
    pub fn text(&self) -> String {
        let mut runs: Vec<&PlacedRun> = self.runs.iter().filter(|r| !r.text.is_empty()).collect();
        runs.sort_by_key(|r| r.start);
        runs.iter().map(|r| r.text.as_str()).collect()
    }
}

/// Where an out-of-flow box would have been had it been in flow.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticPosition {
    pub box_id: BoxId,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FragmentKind {
    Block,
    Float,
    OutOfFlow,
}

/// The laid-out form of one container box.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoxFragment {
    pub box_id: BoxId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub kind: FragmentKind,
    /// Border box, relative to the parent fragment's border box.
    pub rect: Rect,
    /// Collapsed margins, including those collapsed through from children.
    pub margins: MarginValues,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub lines: Vec<LineBox>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<BoxFragment>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub static_positions: Vec<StaticPosition>,
    pub pagination_strut: f64,
    pub self_collapsing: bool,
}

impl BoxFragment {
    pub fn new(tree: &BoxTree, box_id: BoxId, kind: FragmentKind) -> Self {
        Self {
            box_id,
            name: tree.get(box_id).name.clone(),
            kind,
            rect: Rect::default(),
            margins: MarginValues::default(),
            lines: Vec::new(),
            children: Vec::new(),
            static_positions: Vec::new(),
            pagination_strut: 0.0,
            self_collapsing: false,
        }
    }

    /// Depth-first search for the fragment of `id`.
    pub fn find(&self, id: BoxId) -> Option<&BoxFragment> {
        if self.box_id == id {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(id))
    }

    /// First fragment with the given document id.
    pub fn find_named(&self, name: &str) -> Option<&BoxFragment> {
        if self.name.as_deref() == Some(name) {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find_named(name))
    }

    fn collect_lines(&self, x: f64, y: f64, out: &mut Vec<AbsoluteLine>) {
        let x = x + self.rect.x;
        let y = y + self.rect.y;
        for (index, line) in self.lines.iter().enumerate() {
            out.push(AbsoluteLine {
                box_id: self.box_id,
                index,
                rect: Rect::new(x + line.left, y + line.top, line.available_width, line.height()),
                runs: line
                    .runs
                    .iter()
                    .map(|r| PlacedRun {
                        rect: r.rect.translate(x, y),
                        ..r.clone()
                    })
                    .collect(),
            });
        }
        for child in &self.children {
            child.collect_lines(x, y, out);
        }
    }
}

/// A line in flow coordinates.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AbsoluteLine {
    pub box_id: BoxId,
    /// Index of the line within its container.
    pub index: usize,
    pub rect: Rect,
    pub runs: Vec<PlacedRun>,
}

/// The vertical span whose lines differ from the previous pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepaintRange {
    pub min_top: Option<f64>,
    pub max_bottom: Option<f64>,
    /// Lines pushed to a region with a different available width and kept
    /// their old line breaks.
    pub width_mismatches: usize,
}

impl RepaintRange {
    fn include(&mut self, rect: &Rect) {
        self.min_top = Some(self.min_top.map_or(rect.y, |t| t.min(rect.y)));
        self.max_bottom = Some(self.max_bottom.map_or(rect.bottom(), |b| b.max(rect.bottom())));
    }

    pub fn is_empty(&self) -> bool {
        self.min_top.is_none()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutResult {
    pub root: BoxFragment,
    /// Height of the whole flow, floats included.
    pub height: f64,
    /// The root's collapsed margins.
    pub margins: MarginValues,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub regions: Vec<Region>,
    pub repaint: RepaintRange,
}

impl LayoutResult {
    pub fn absolute_lines(&self) -> Vec<AbsoluteLine> {
        let mut out = Vec::new();
        self.root.collect_lines(0.0, 0.0, &mut out);
        out
    }
}

// ── Measurement cache ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MeasureKey {
    text: String,
    font_family: String,
    font_size: u64,
    ltr: bool,
}

/// Entries kept before the measurement cache starts over.
pub const DEFAULT_MEASURE_CACHE_LIMIT: usize = 16_384;

/// Memoizes a measurer by text, font and direction.
struct CachedMeasurer<'a> {
    inner: &'a dyn TextMeasurer,
    cache: &'a RefCell<HashMap<MeasureKey, Measurement>>,
    limit: usize,
}

impl TextMeasurer for CachedMeasurer<'_> {
    fn measure(&self, text: &str, style: &ResolvedStyle, direction: Direction) -> Measurement {
        let key = MeasureKey {
            text: text.to_string(),
            font_family: style.font_family.clone(),
            font_size: style.font_size.to_bits(),
            ltr: direction.is_ltr(),
        };
        if let Some(m) = self.cache.borrow().get(&key) {
            return m.clone();
        }
        let m = self.inner.measure(text, style, direction);
        let mut cache = self.cache.borrow_mut();
        if cache.len() >= self.limit {
            cache.clear();
        }
        cache.insert(key, m.clone());
        m
    }

    fn font_metrics(&self, style: &ResolvedStyle) -> FontMetrics {
        self.inner.font_metrics(style)
    }
}

// ── Engine ──────────────────────────────────────────────────────

/// Lays out box trees. Keeps the measurement cache and the previous pass's
/// lines between calls, so relayouts of a mutated tree report what changed.
pub struct LayoutEngine {
    measurer: Box<dyn TextMeasurer>,
    resolver: Box<dyn ParagraphResolver>,
    measure_cache: RefCell<HashMap<MeasureKey, Measurement>>,
    measure_cache_limit: usize,
    previous_lines: RefCell<Option<Vec<AbsoluteLine>>>,
}

impl Default for LayoutEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl LayoutEngine {
    pub fn new() -> Self {
        Self::from_config(&LayoutConfig::default())
    }

    /// An engine using the built-in measurer configured by `config`.
    pub fn from_config(config: &LayoutConfig) -> Self {
        Self::with_services(
            Box::new(FixedAdvanceMeasurer::from(config.measurer)),
            Box::new(UnicodeBidiResolver),
        )
    }

    pub fn with_services(measurer: Box<dyn TextMeasurer>, resolver: Box<dyn ParagraphResolver>) -> Self {
        Self {
            measurer,
            resolver,
            measure_cache: RefCell::new(HashMap::new()),
            measure_cache_limit: DEFAULT_MEASURE_CACHE_LIMIT,
            previous_lines: RefCell::new(None),
        }
    }

    /// Cap the number of cached measurements. A full cache is emptied
    /// before the next insert.
    pub fn with_cache_limit(mut self, limit: usize) -> Self {
        self.measure_cache_limit = limit.max(1);
        self
    }

    /// Drop cached measurements and the previous pass.
    pub fn clear_cache(&self) {
        self.measure_cache.borrow_mut().clear();
        *self.previous_lines.borrow_mut() = None;
    }

    pub fn layout(&self, tree: &BoxTree, config: &LayoutConfig) -> LayoutResult {
        let measurer = CachedMeasurer {
            inner: self.measurer.as_ref(),
            cache: &self.measure_cache,
            limit: self.measure_cache_limit,
        };
        let chain = config
            .fragmentation
            .as_ref()
            .map(|f| RegionChain::new(f.heights.clone(), f.repeat_last, config.container_width));

        let mut flow = BlockFlow::new(
            tree,
            &measurer,
            self.resolver.as_ref(),
            chain.as_ref().map(|c| c as &dyn RegionProvider),
            config.max_inline_depth,
        );
        let root = flow.layout_root(config.container_width);
        let height = root.rect.bottom().max(0.0);
        log::debug!(
            "laid out {} boxes: height {:.2}, {} width mismatches",
            tree.len(),
            height,
            flow.width_mismatches
        );

        let mut result = LayoutResult {
            margins: root.margins,
            root,
            height,
            regions: chain.as_ref().map(|c| c.regions_for(height)).unwrap_or_default(),
            repaint: RepaintRange {
                width_mismatches: flow.width_mismatches,
                ..Default::default()
            },
        };

        let lines = result.absolute_lines();
        let previous = self.previous_lines.borrow_mut().replace(lines.clone());
        result.repaint = repaint_range(previous.as_deref(), &lines, result.repaint.width_mismatches);
        result
    }
}

/// Span covering every line that was added, removed or moved since the
/// previous pass. With no previous pass everything is dirty.
fn repaint_range(previous: Option<&[AbsoluteLine]>, current: &[AbsoluteLine], width_mismatches: usize) -> RepaintRange {
    let mut range = RepaintRange {
        width_mismatches,
        ..Default::default()
    };
    let Some(previous) = previous else {
        for line in current {
            range.include(&line.rect);
        }
        return range;
    };

    let key = |l: &AbsoluteLine| (l.box_id, l.index);
    let old: HashMap<_, &AbsoluteLine> = previous.iter().map(|l| (key(l), l)).collect();
    let new: HashMap<_, &AbsoluteLine> = current.iter().map(|l| (key(l), l)).collect();
    for line in current {
        if !matches!(old.get(&key(line)), Some(o) if *o == line) {
            range.include(&line.rect);
        }
    }
    for line in previous {
        if !matches!(new.get(&key(line)), Some(n) if *n == line) {
            range.include(&line.rect);
        }
    }
    range
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Node, RegionConfig};
    use crate::style::{LineHeight, Style};

    fn text_tree(content: &str) -> BoxTree {
        BoxTree::build(&Node::block(
            Style {
                line_height: Some(LineHeight::Length(10.0)),
                ..Default::default()
            },
            vec![Node::text(content)],
        ))
        .unwrap()
    }

    fn config(width: f64) -> LayoutConfig {
        LayoutConfig {
            container_width: width,
            ..Default::default()
        }
    }

    #[test]
    fn first_pass_repaints_everything() {
        let engine = LayoutEngine::new();
        let result = engine.layout(&text_tree("aaaa bbbb cccc"), &config(60.0));
        assert_eq!(result.repaint.min_top, Some(0.0));
        assert_eq!(result.repaint.max_bottom, Some(result.height));
    }

    #[test]
    fn identical_pass_repaints_nothing() {
        let engine = LayoutEngine::new();
        let tree = text_tree("aaaa bbbb cccc");
        let first = engine.layout(&tree, &config(60.0));
        let second = engine.layout(&tree, &config(60.0));
        assert!(second.repaint.is_empty());
        assert_eq!(first.absolute_lines(), second.absolute_lines());
    }

    #[test]
    fn edited_line_is_repainted() {
        let engine = LayoutEngine::new();
        let mut tree = text_tree("aaaa bbbb cccc");
        engine.layout(&tree, &config(60.0));
        let text = tree.children(tree.root())[0];
        tree.set_text(text, "aaaa bbbb dd").unwrap();
        let result = engine.layout(&tree, &config(60.0));
        // Only the second line changed.
        assert_eq!(result.repaint.min_top, Some(10.0));
        assert_eq!(result.repaint.max_bottom, Some(20.0));
    }

    #[test]
    fn measurements_are_cached() {
        let engine = LayoutEngine::new();
        engine.layout(&text_tree("aaaa bbbb"), &config(200.0));
        assert!(!engine.measure_cache.borrow().is_empty());
        engine.clear_cache();
        assert!(engine.measure_cache.borrow().is_empty());
    }

    #[test]
    fn measurement_cache_stays_bounded() {
        let engine = LayoutEngine::new().with_cache_limit(4);
        engine.layout(&text_tree("aaaa bbbb cccc dddd eeee ffff gggg"), &config(60.0));
        assert!(engine.measure_cache.borrow().len() <= 4);
    }

    #[test]
    fn regions_cover_the_flow() {
        let engine = LayoutEngine::new();
        let config = LayoutConfig {
            fragmentation: Some(RegionConfig {
                heights: vec![25.0],
                repeat_last: true,
            }),
            ..config(60.0)
        };
        let result = engine.layout(&text_tree("aaaa bbbb cccc"), &config);
        assert_eq!(result.regions.len(), 2);
        assert_eq!(result.regions[1].rect.y, 25.0);
        assert!(result.height > 25.0 && result.height <= 50.0);
    }

    #[test]
    fn line_text_is_logical() {
        let engine = LayoutEngine::new();
        let result = engine.layout(&text_tree("hello world"), &config(200.0));
        assert_eq!(result.root.lines[0].text(), "hello world");
    }
}
