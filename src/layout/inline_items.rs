//! # Inline Items
//!
//! Flattens the inline content of a block container into one paragraph: a
//! string of collapsed text plus a list of items that say which box each
//! byte range came from. Inline box boundaries, floats and out-of-flow
//! boxes become zero-length items at their position in the text, atomic
//! inlines an object replacement character, forced breaks a newline.
//!
//! The line breaker and the bidi resolver both work on this flat form.

use std::ops::Range;

use crate::model::tree::{BoxId, BoxKind, BoxTree};
use crate::style::{Clear, ResolvedStyle, UnicodeBidi};
use crate::text::bidi::BidiControl;
use crate::text::collapse_white_space;

pub const OBJECT_REPLACEMENT: char = '\u{FFFC}';

#[derive(Debug, Clone, PartialEq)]
pub enum ItemKind {
    Text,
    /// Start of an inline box. `edge` is its start margin, border and padding.
    OpenBox { edge: f64 },
    CloseBox { edge: f64 },
    /// A replaced element; `width` and `height` are its margin box.
    Atomic { width: f64, height: f64 },
    Float,
    OutOfFlow,
    ForcedBreak { clear: Clear },
}

#[derive(Debug, Clone, PartialEq)]
pub struct InlineItem {
    pub kind: ItemKind,
    pub box_id: BoxId,
    /// Bytes of the paragraph text this item covers.
    pub range: Range<usize>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InlineParagraph {
    pub text: String,
    pub items: Vec<InlineItem>,
    pub controls: Vec<BidiControl>,
}

impl InlineParagraph {
    /// Floats in the paragraph, in order.
    pub fn floats(&self) -> impl Iterator<Item = BoxId> + '_ {
        self.items
            .iter()
            .filter(|i| matches!(i.kind, ItemKind::Float))
            .map(|i| i.box_id)
    }

    /// Whether anything in the paragraph can produce a line.
    pub fn has_line_content(&self) -> bool {
        self.items.iter().any(|i| match i.kind {
            ItemKind::Text => !self.text[i.range.clone()].trim_matches(' ').is_empty(),
            ItemKind::OpenBox { edge } | ItemKind::CloseBox { edge } => edge > 0.0,
            ItemKind::Atomic { .. } | ItemKind::ForcedBreak { .. } => true,
            ItemKind::Float | ItemKind::OutOfFlow => false,
        })
    }
}

/// Start (or end) margin + border + padding of an inline box, in its own
/// direction.
pub fn inline_edge(style: &ResolvedStyle, start: bool) -> f64 {
    let left = style.margin.left.fixed() + style.border_width.left + style.padding.left;
    let right = style.margin.right.fixed() + style.border_width.right + style.padding.right;
    if start == style.direction.is_ltr() {
        left
    } else {
        right
    }
}

/// Pending work of the inline walk.
enum Step {
    Visit { id: BoxId, depth: usize },
    Close { id: BoxId, start: usize },
}

struct Collector<'a> {
    tree: &'a BoxTree,
    max_depth: usize,
    paragraph: InlineParagraph,
    after_space: bool,
    warned: bool,
}

/// Flatten the inline children of `container`.
///
/// Inline boxes nested deeper than `max_depth` are flattened into their
/// ancestors: their edges and bidi behavior are dropped, their content is
/// kept.
pub fn collect_inline_items(tree: &BoxTree, container: BoxId, max_depth: usize) -> InlineParagraph {
    let mut collector = Collector {
        tree,
        max_depth,
        paragraph: InlineParagraph::default(),
        after_space: true,
        warned: false,
    };
    collector.walk(container);

    let style = tree.style(container);
    if style.unicode_bidi == UnicodeBidi::Plaintext && !collector.paragraph.text.is_empty() {
        let len = collector.paragraph.text.len();
        collector.paragraph.controls.push(BidiControl {
            range: 0..len,
            unicode_bidi: UnicodeBidi::Plaintext,
            direction: style.direction,
        });
    }
    collector.paragraph
}

impl Collector<'_> {
    fn push(&mut self, kind: ItemKind, box_id: BoxId, text: &str) {
        let start = self.paragraph.text.len();
        self.paragraph.text.push_str(text);
        self.paragraph.items.push(InlineItem {
            kind,
            box_id,
            range: start..self.paragraph.text.len(),
        });
    }

    /// Walk the inline descendants of `container` in document order with
    /// an explicit stack, so nesting depth never grows the call stack.
    fn walk(&mut self, container: BoxId) {
        let mut stack: Vec<Step> = self
            .tree
            .children(container)
            .iter()
            .rev()
            .map(|&id| Step::Visit { id, depth: 1 })
            .collect();
        while let Some(step) = stack.pop() {
            match step {
                Step::Visit { id, depth } => self.visit(id, depth, &mut stack),
                Step::Close { id, start } => self.close(id, start),
            }
        }
    }

    fn close(&mut self, id: BoxId, start: usize) {
        let tree = self.tree;
        let style = tree.style(id);
        let close = if tree.get(id).slice.has_end_edge { inline_edge(style, false) } else { 0.0 };
        self.push(ItemKind::CloseBox { edge: close }, id, "");
        let end = self.paragraph.text.len();
        if style.unicode_bidi != UnicodeBidi::Normal {
            self.paragraph.controls.push(BidiControl {
                range: start..end,
                unicode_bidi: style.unicode_bidi,
                direction: style.direction,
            });
        }
    }

    fn visit(&mut self, id: BoxId, depth: usize, stack: &mut Vec<Step>) {
        let tree = self.tree;
        let style = tree.style(id);
        match tree.kind(id) {
            BoxKind::Text(content) => {
                let collapsed = collapse_white_space(content, style.white_space, &mut self.after_space);
                if !style.white_space.preserves_newlines() {
                    if !collapsed.is_empty() {
                        self.push(ItemKind::Text, id, &collapsed);
                    }
                    return;
                }
                let mut pieces = collapsed.split('\n').peekable();
                while let Some(piece) = pieces.next() {
                    if !piece.is_empty() {
                        self.push(ItemKind::Text, id, piece);
                    }
                    if pieces.peek().is_some() {
                        self.push(ItemKind::ForcedBreak { clear: Clear::None }, id, "\n");
                    }
                }
            }
            BoxKind::LineBreak => {
                self.push(ItemKind::ForcedBreak { clear: style.clear }, id, "\n");
                self.after_space = true;
            }
            BoxKind::Replaced { width, height } => {
                let width = width + style.margin.left.fixed() + style.margin.right.fixed();
                let height = height + style.margin.top.fixed() + style.margin.bottom.fixed();
                let mut buf = [0u8; 4];
                self.push(
                    ItemKind::Atomic { width, height },
                    id,
                    OBJECT_REPLACEMENT.encode_utf8(&mut buf),
                );
                self.after_space = false;
            }
            BoxKind::Floated => self.push(ItemKind::Float, id, ""),
            BoxKind::OutOfFlow => self.push(ItemKind::OutOfFlow, id, ""),
            BoxKind::Inline if depth > self.max_depth => {
                if !self.warned {
                    log::warn!(
                        "inline nesting deeper than {} levels; flattening box {}",
                        self.max_depth,
                        id.0
                    );
                    self.warned = true;
                }
                // Flattened boxes keep the depth of the capped ancestor.
                stack.extend(tree.children(id).iter().rev().map(|&child| Step::Visit { id: child, depth }));
            }
            BoxKind::Inline => {
                let open = if tree.get(id).slice.has_start_edge { inline_edge(style, true) } else { 0.0 };
                let start = self.paragraph.text.len();
                self.push(ItemKind::OpenBox { edge: open }, id, "");
                stack.push(Step::Close { id, start });
                stack.extend(
                    tree.children(id)
                        .iter()
                        .rev()
                        .map(|&child| Step::Visit { id: child, depth: depth + 1 }),
                );
            }
            BoxKind::BlockContainer => {
                // Normalized trees never put a block under inline content.
                log::debug!("block box {} inside inline content ignored", id.0);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Node;
    use crate::style::{Direction, Edges, Float, Style, WhiteSpace};

    fn collect(root: Node) -> (BoxTree, InlineParagraph) {
        let tree = BoxTree::build(&root).unwrap();
        let paragraph = collect_inline_items(&tree, tree.root(), 64);
        (tree, paragraph)
    }

    #[test]
    fn text_is_collapsed_across_boxes() {
        let (_, p) = collect(Node::block(
            Style::default(),
            vec![
                Node::text("  hello   "),
                Node::inline(Style::default(), vec![Node::text("  world")]),
            ],
        ));
        assert_eq!(p.text, "hello world");
        let kinds: Vec<&ItemKind> = p.items.iter().map(|i| &i.kind).collect();
        assert!(matches!(kinds[0], ItemKind::Text));
        assert!(matches!(kinds[1], ItemKind::OpenBox { .. }));
        assert!(matches!(kinds[3], ItemKind::CloseBox { .. }));
    }

    #[test]
    fn preserved_newlines_become_forced_breaks() {
        let (_, p) = collect(Node::block(
            Style {
                white_space: Some(WhiteSpace::Pre),
                ..Default::default()
            },
            vec![Node::text("a\nb")],
        ));
        assert_eq!(p.text, "a\nb");
        assert_eq!(p.items.len(), 3);
        assert!(matches!(p.items[1].kind, ItemKind::ForcedBreak { .. }));
        assert_eq!(p.items[1].range, 1..2);
    }

    #[test]
    fn atomics_floats_and_line_breaks() {
        let (_, p) = collect(Node::block(
            Style::default(),
            vec![
                Node::text("a"),
                Node::replaced(20.0, 10.0, Style::default()),
                Node::line_break(),
                Node::block(
                    Style {
                        float: Some(Float::Left),
                        ..Default::default()
                    },
                    vec![],
                ),
            ],
        ));
        assert_eq!(p.text, "a\u{FFFC}\n");
        assert!(matches!(p.items[1].kind, ItemKind::Atomic { width, .. } if width == 20.0));
        assert!(matches!(p.items[2].kind, ItemKind::ForcedBreak { .. }));
        assert_eq!(p.floats().count(), 1);
        assert!(p.has_line_content());
    }

    #[test]
    fn inline_edges_follow_direction() {
        let style = Style {
            padding: Some(Edges {
                top: 0.0,
                right: 3.0,
                bottom: 0.0,
                left: 5.0,
            }),
            ..Default::default()
        };
        let ltr = style.resolve(None);
        assert_eq!(inline_edge(&ltr, true), 5.0);
        let rtl = Style {
            direction: Some(Direction::Rtl),
            ..style
        }
        .resolve(None);
        assert_eq!(inline_edge(&rtl, true), 3.0);
    }

    #[test]
    fn bidi_boxes_become_controls() {
        let (_, p) = collect(Node::block(
            Style::default(),
            vec![
                Node::text("ab "),
                Node::inline(
                    Style {
                        unicode_bidi: Some(UnicodeBidi::Isolate),
                        direction: Some(Direction::Rtl),
                        ..Default::default()
                    },
                    vec![Node::text("cd")],
                ),
            ],
        ));
        assert_eq!(p.controls.len(), 1);
        assert_eq!(p.controls[0].range, 3..5);
        assert_eq!(p.controls[0].direction, Direction::Rtl);
    }

    #[test]
    fn depth_cap_flattens_nested_inlines() {
        let mut node = Node::text("deep");
        for _ in 0..5 {
            node = Node::inline(Style::default(), vec![node]);
        }
        let tree = BoxTree::build(&Node::block(Style::default(), vec![node])).unwrap();
        let p = collect_inline_items(&tree, tree.root(), 2);
        assert_eq!(p.text, "deep");
        let opens = p
            .items
            .iter()
            .filter(|i| matches!(i.kind, ItemKind::OpenBox { .. }))
            .count();
        assert_eq!(opens, 2);
    }

    #[test]
    fn very_deep_nesting_runs_on_a_small_stack() {
        let mut tree = BoxTree::build(&Node::block(Style::default(), vec![])).unwrap();
        let mut parent = tree.root();
        for _ in 0..3000 {
            parent = tree.append_child(parent, &Node::inline(Style::default(), vec![])).unwrap();
        }
        tree.append_child(parent, &Node::text("deep")).unwrap();

        let p = std::thread::Builder::new()
            .stack_size(128 * 1024)
            .spawn(move || collect_inline_items(&tree, tree.root(), 64))
            .unwrap()
            .join()
            .unwrap();
        assert_eq!(p.text, "deep");
        let opens = p
            .items
            .iter()
            .filter(|i| matches!(i.kind, ItemKind::OpenBox { .. }))
            .count();
        assert_eq!(opens, 64);
        let closes = p
            .items
            .iter()
            .filter(|i| matches!(i.kind, ItemKind::CloseBox { .. }))
            .count();
        assert_eq!(closes, 64);
    }

    #[test]
    fn whitespace_only_paragraph_has_no_line_content() {
        let (_, p) = collect(Node::block(
            Style::default(),
            vec![Node::inline(Style::default(), vec![Node::text("   ")])],
        ));
        assert!(!p.has_line_content());
    }
}
