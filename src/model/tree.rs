//! # Box Tree
//!
//! An arena of layout boxes addressed by stable `BoxId` handles. Parent and
//! child links are indices, so the tree can be mutated in place between
//! layout passes without invalidating handles held by the caller.
//!
//! Every block container ends up in one of two shapes: all of its in-flow
//! children are block-level, or all of them are inline-level. Mixed content
//! is repaired by two pure transformations of the child list:
//!
//! - runs of inline content between blocks are wrapped in anonymous blocks
//!   (`partition_children`), whitespace-only runs are dropped;
//! - an inline box that contains a block is split around it into sibling
//!   inline pieces, each remembering the box it was split from.
//!
//! Removing content runs the transformations backwards first: anonymous
//! wrappers are unwrapped and adjacent pieces of the same inline are merged,
//! then the child list is partitioned again.

use std::ops::Range;

use serde::Serialize;

use crate::error::FlowError;
use crate::model::{Node, NodeKind};
use crate::style::{Dimension, ResolvedStyle, Style};

/// Stable handle to a box in a `BoxTree`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct BoxId(pub usize);

/// What a box is. Decided once from the node type and its float/position
/// styles, so layout can match on it exhaustively.
#[derive(Debug, Clone, PartialEq)]
pub enum BoxKind {
    /// A block container: either stacks block children or hosts lines.
    BlockContainer,
    /// An inline box wrapping inline content.
    Inline,
    Text(String),
    /// A floated box. Lays out its children as a new formatting context.
    Floated,
    /// An absolutely or fixed positioned box.
    OutOfFlow,
    /// Atomic inline content with an intrinsic size.
    Replaced { width: f64, height: f64 },
    LineBreak,
}

/// Which edges of a (possibly split) inline box are drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InlineSlice {
    pub has_start_edge: bool,
    pub has_end_edge: bool,
}

impl Default for InlineSlice {
    fn default() -> Self {
        Self {
            has_start_edge: true,
            has_end_edge: true,
        }
    }
}

/// A descendant whose layout a container is responsible for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owned {
    /// Positioned against this container once its size is known.
    OutOfFlow(BoxId),
    /// Height is a percentage of this container's height.
    PercentHeight(BoxId),
}

#[derive(Debug, Clone)]
pub struct LayoutBox {
    pub kind: BoxKind,
    /// The declared style, kept so inherited values can be re-resolved.
    pub declared: Style,
    pub style: ResolvedStyle,
    pub parent: Option<BoxId>,
    pub children: Vec<BoxId>,
    /// Bumped whenever this box or anything below it changes.
    pub generation: u64,
    /// Generated by the tree itself rather than by a node.
    pub anonymous: bool,
    pub slice: InlineSlice,
    /// For inline pieces produced by a block-in-inline split: the box that
    /// was split.
    pub split_origin: Option<BoxId>,
    pub owns: Vec<Owned>,
    pub name: Option<String>,
    alive: bool,
}

/// Classification of a child for anonymous block wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildClass {
    Block,
    Inline,
    /// Inline content consisting only of collapsible whitespace.
    Whitespace,
    /// Floats and out-of-flow boxes: they join whichever run surrounds them.
    OutOfFlow,
}

/// One step of rewriting a child list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Keep(usize),
    Wrap(Range<usize>),
    Drop(usize),
}

/// Decide how a child list is rewritten so that a block container never
/// mixes block-level and inline-level children.
pub fn partition_children(classes: &[ChildClass]) -> Vec<Segment> {
    if !classes.contains(&ChildClass::Block) {
        return (0..classes.len()).map(Segment::Keep).collect();
    }

    let mut segments = Vec::new();
    let mut i = 0;
    while i < classes.len() {
        if classes[i] == ChildClass::Block {
            segments.push(Segment::Keep(i));
            i += 1;
            continue;
        }
        let start = i;
        while i < classes.len() && classes[i] != ChildClass::Block {
            i += 1;
        }
        if classes[start..i].contains(&ChildClass::Inline) {
            segments.push(Segment::Wrap(start..i));
        } else {
            for (j, class) in classes.iter().enumerate().take(i).skip(start) {
                match class {
                    ChildClass::Whitespace => segments.push(Segment::Drop(j)),
                    _ => segments.push(Segment::Keep(j)),
                }
            }
        }
    }
    segments
}

/// The arena.
#[derive(Debug, Clone)]
pub struct BoxTree {
    boxes: Vec<LayoutBox>,
    root: BoxId,
    next_generation: u64,
}

impl BoxTree {
    /// Build a box tree from a document node. The root must be a block.
    pub fn build(root: &Node) -> Result<BoxTree, FlowError> {
        if !matches!(root.kind, NodeKind::Block) {
            return Err(FlowError::InvalidTree(
                "the root node must be a Block".to_string(),
            ));
        }
        let mut tree = BoxTree {
            boxes: Vec::new(),
            root: BoxId(0),
            next_generation: 1,
        };
        let root_id = tree.build_node(root, None)?;
        tree.root = root_id;
        tree.rebuild_owns();
        Ok(tree)
    }

    pub fn root(&self) -> BoxId {
        self.root
    }

    pub fn get(&self, id: BoxId) -> &LayoutBox {
        &self.boxes[id.0]
    }

    pub fn kind(&self, id: BoxId) -> &BoxKind {
        &self.boxes[id.0].kind
    }

    pub fn style(&self, id: BoxId) -> &ResolvedStyle {
        &self.boxes[id.0].style
    }

    pub fn children(&self, id: BoxId) -> &[BoxId] {
        &self.boxes[id.0].children
    }

    pub fn parent(&self, id: BoxId) -> Option<BoxId> {
        self.boxes[id.0].parent
    }

    pub fn generation(&self, id: BoxId) -> u64 {
        self.boxes[id.0].generation
    }

    pub fn is_alive(&self, id: BoxId) -> bool {
        self.boxes.get(id.0).map(|b| b.alive).unwrap_or(false)
    }

    /// Number of live boxes.
    pub fn len(&self) -> usize {
        self.boxes.iter().filter(|b| b.alive).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn owns(&self, id: BoxId) -> &[Owned] {
        &self.boxes[id.0].owns
    }

    /// Does this box lay out its children as block containers do?
    pub fn is_container(&self, id: BoxId) -> bool {
        matches!(
            self.kind(id),
            BoxKind::BlockContainer | BoxKind::Floated | BoxKind::OutOfFlow
        )
    }

    /// Whether a container hosts an inline formatting context.
    pub fn children_inline(&self, id: BoxId) -> bool {
        !self
            .children(id)
            .iter()
            .any(|&c| matches!(self.kind(c), BoxKind::BlockContainer))
    }

    /// Whether `id` contains a block-level box somewhere under inline boxes.
    pub fn contains_block(&self, id: BoxId) -> bool {
        let mut stack = vec![id];
        while let Some(cur) = stack.pop() {
            for &c in self.children(cur) {
                match self.kind(c) {
                    BoxKind::BlockContainer => return true,
                    BoxKind::Inline => stack.push(c),
                    _ => {}
                }
            }
        }
        false
    }

    pub fn classify(&self, id: BoxId) -> ChildClass {
        let b = self.get(id);
        match &b.kind {
            BoxKind::BlockContainer => ChildClass::Block,
            BoxKind::Floated | BoxKind::OutOfFlow => ChildClass::OutOfFlow,
            BoxKind::Text(content) => {
                if b.style.white_space.collapses_spaces()
                    && content.chars().all(|c| matches!(c, ' ' | '\t' | '\n' | '\r'))
                {
                    ChildClass::Whitespace
                } else {
                    ChildClass::Inline
                }
            }
            BoxKind::Inline | BoxKind::Replaced { .. } | BoxKind::LineBreak => ChildClass::Inline,
        }
    }

    /// The nearest ancestor that is a container (skipping inline boxes).
    pub fn containing_block(&self, id: BoxId) -> Option<BoxId> {
        let mut cur = self.parent(id);
        while let Some(p) = cur {
            if self.is_container(p) {
                return Some(p);
            }
            cur = self.parent(p);
        }
        None
    }

    // ── Mutation ────────────────────────────────────────────────

    /// Append a node as the last child of `parent`.
    pub fn append_child(&mut self, parent: BoxId, node: &Node) -> Result<BoxId, FlowError> {
        if !self.is_alive(parent) {
            return Err(FlowError::InvalidTree(format!("box {} does not exist", parent.0)));
        }
        if !matches!(
            self.kind(parent),
            BoxKind::BlockContainer | BoxKind::Inline | BoxKind::Floated | BoxKind::OutOfFlow
        ) {
            return Err(FlowError::InvalidTree(format!(
                "box {} cannot have children",
                parent.0
            )));
        }
        // Appending to a wrapped inline run goes into the last anonymous block.
        let target = match self.children(parent).last() {
            Some(&last) if self.get(last).anonymous && !self.children_inline(parent) => {
                if self.classify_node(node) == ChildClass::Block {
                    parent
                } else {
                    last
                }
            }
            _ => parent,
        };
        let id = self.build_node(node, Some(target))?;
        self.boxes[target.0].children.push(id);
        self.restructure_around(target);
        self.touch(id);
        self.rebuild_owns();
        Ok(id)
    }

    /// Remove a box and everything below it.
    pub fn remove(&mut self, id: BoxId) -> Result<(), FlowError> {
        if id == self.root {
            return Err(FlowError::InvalidTree("cannot remove the root".to_string()));
        }
        if !self.is_alive(id) {
            return Err(FlowError::InvalidTree(format!("box {} does not exist", id.0)));
        }
        let parent = self.parent(id);
        if let Some(p) = parent {
            self.boxes[p.0].children.retain(|&c| c != id);
            self.touch(p);
            self.restructure_around(p);
        }
        self.kill(id);
        self.rebuild_owns();
        Ok(())
    }

    /// Replace the content of a text box.
    pub fn set_text(&mut self, id: BoxId, content: &str) -> Result<(), FlowError> {
        match &mut self.boxes[id.0].kind {
            BoxKind::Text(text) => {
                *text = content.to_string();
            }
            _ => {
                return Err(FlowError::InvalidTree(format!(
                    "box {} is not a text box",
                    id.0
                )))
            }
        }
        self.touch(id);
        if let Some(p) = self.parent(id) {
            self.restructure_around(p);
        }
        Ok(())
    }

    /// Replace the declared style of a box and re-resolve its subtree.
    pub fn set_style(&mut self, id: BoxId, style: Style) -> Result<(), FlowError> {
        if !self.is_alive(id) {
            return Err(FlowError::InvalidTree(format!("box {} does not exist", id.0)));
        }
        self.boxes[id.0].declared = style;
        self.reresolve(id);

        // Block-level containers change kind with float and position.
        if matches!(
            self.kind(id),
            BoxKind::BlockContainer | BoxKind::Floated | BoxKind::OutOfFlow
        ) && !self.get(id).anonymous
        {
            let resolved = &self.boxes[id.0].style;
            let kind = if resolved.position.is_out_of_flow() {
                BoxKind::OutOfFlow
            } else if resolved.is_floating() {
                BoxKind::Floated
            } else {
                BoxKind::BlockContainer
            };
            self.boxes[id.0].kind = kind;
        }

        self.touch(id);
        for owned in self.owns(id).to_vec() {
            if let Owned::PercentHeight(d) = owned {
                self.touch(d);
            }
        }
        if let Some(p) = self.parent(id) {
            self.restructure_around(p);
        }
        self.rebuild_owns();
        Ok(())
    }

    // ── Construction ────────────────────────────────────────────

    fn classify_node(&self, node: &Node) -> ChildClass {
        match node.kind {
            NodeKind::Block => {
                let floats = node.style.float.map(|f| f != crate::style::Float::None);
                let positioned = node.style.position.map(|p| p.is_out_of_flow());
                if floats == Some(true) || positioned == Some(true) {
                    ChildClass::OutOfFlow
                } else {
                    ChildClass::Block
                }
            }
            _ => ChildClass::Inline,
        }
    }

    fn push_box(&mut self, kind: BoxKind, declared: Style, style: ResolvedStyle, parent: Option<BoxId>) -> BoxId {
        let id = BoxId(self.boxes.len());
        self.boxes.push(LayoutBox {
            kind,
            declared,
            style,
            parent,
            children: Vec::new(),
            generation: self.next_generation,
            anonymous: false,
            slice: InlineSlice::default(),
            split_origin: None,
            owns: Vec::new(),
            name: None,
            alive: true,
        });
        id
    }

    fn build_node(&mut self, node: &Node, parent: Option<BoxId>) -> Result<BoxId, FlowError> {
        if !node.accepts_children() && !node.children.is_empty() {
            return Err(FlowError::InvalidTree(format!(
                "{} nodes cannot have children{}",
                match node.kind {
                    NodeKind::Text { .. } => "Text",
                    NodeKind::Replaced { .. } => "Replaced",
                    _ => "LineBreak",
                },
                node.id
                    .as_ref()
                    .map(|id| format!(" (node \"{}\")", id))
                    .unwrap_or_default()
            )));
        }

        let parent_style = parent.map(|p| self.boxes[p.0].style.clone());
        let style = node.style.resolve(parent_style.as_ref());

        let out_of_flow = style.position.is_out_of_flow();
        let floating = style.is_floating();
        let kind = match &node.kind {
            NodeKind::Text { content } => BoxKind::Text(content.clone()),
            NodeKind::LineBreak => BoxKind::LineBreak,
            _ if out_of_flow => BoxKind::OutOfFlow,
            _ if floating => BoxKind::Floated,
            NodeKind::Block => BoxKind::BlockContainer,
            NodeKind::Inline => BoxKind::Inline,
            NodeKind::Replaced { width, height } => BoxKind::Replaced {
                width: *width,
                height: *height,
            },
        };

        let id = self.push_box(kind, node.style.clone(), style, parent);
        self.boxes[id.0].name = node.id.clone();

        match &node.kind {
            // A floated or positioned replaced element becomes a container
            // around the atomic content.
            NodeKind::Replaced { width, height } if out_of_flow || floating => {
                let inner_style = Style::default().resolve(Some(&self.boxes[id.0].style));
                let inner = self.push_box(
                    BoxKind::Replaced {
                        width: *width,
                        height: *height,
                    },
                    Style::default(),
                    inner_style,
                    Some(id),
                );
                self.boxes[inner.0].anonymous = true;
                self.boxes[id.0].children.push(inner);
            }
            _ => {
                for child in &node.children {
                    let child_id = self.build_node(child, Some(id))?;
                    self.boxes[id.0].children.push(child_id);
                }
            }
        }

        if self.is_container(id) {
            self.normalize(id);
        }
        Ok(id)
    }

    /// Bring a container's child list into shape: split inlines around
    /// blocks, then wrap inline runs among blocks in anonymous blocks.
    fn normalize(&mut self, container: BoxId) {
        let children = std::mem::take(&mut self.boxes[container.0].children);
        let mut expanded = Vec::with_capacity(children.len());
        for child in children {
            if matches!(self.kind(child), BoxKind::Inline) && self.contains_block(child) {
                expanded.extend(self.split_inline(child));
            } else {
                expanded.push(child);
            }
        }

        let classes: Vec<ChildClass> = expanded.iter().map(|&c| self.classify(c)).collect();
        let mut rewritten = Vec::with_capacity(expanded.len());
        for segment in partition_children(&classes) {
            match segment {
                Segment::Keep(i) => rewritten.push(expanded[i]),
                Segment::Drop(i) => self.kill(expanded[i]),
                Segment::Wrap(range) => {
                    let anon = self.anonymous_block(container);
                    for &c in &expanded[range] {
                        self.boxes[c.0].parent = Some(anon);
                        self.boxes[anon.0].children.push(c);
                    }
                    rewritten.push(anon);
                }
            }
        }
        for &c in &rewritten {
            self.boxes[c.0].parent = Some(container);
        }
        self.boxes[container.0].children = rewritten;
    }

    fn anonymous_block(&mut self, parent: BoxId) -> BoxId {
        let style = Style::default().resolve(Some(&self.boxes[parent.0].style));
        let id = self.push_box(BoxKind::BlockContainer, Style::default(), style, Some(parent));
        self.boxes[id.0].anonymous = true;
        id
    }

    /// Split an inline box around the blocks it contains. Returns the new
    /// sibling sequence: inline pieces interleaved with the blocks.
    fn split_inline(&mut self, inline: BoxId) -> Vec<BoxId> {
        enum Piece {
            Inline(Vec<BoxId>),
            Block(BoxId),
        }

        let mut pieces = Vec::new();
        let mut current = Vec::new();
        for child in self.boxes[inline.0].children.clone() {
            match self.kind(child) {
                BoxKind::BlockContainer => {
                    pieces.push(Piece::Inline(std::mem::take(&mut current)));
                    pieces.push(Piece::Block(child));
                }
                BoxKind::Inline if self.contains_block(child) => {
                    for part in self.split_inline(child) {
                        if matches!(self.kind(part), BoxKind::BlockContainer) {
                            pieces.push(Piece::Inline(std::mem::take(&mut current)));
                            pieces.push(Piece::Block(part));
                        } else {
                            current.push(part);
                        }
                    }
                }
                _ => current.push(child),
            }
        }
        pieces.push(Piece::Inline(current));
        pieces.retain(|p| !matches!(p, Piece::Inline(c) if c.is_empty()));

        let origin = self.boxes[inline.0].split_origin.unwrap_or(inline);
        let original_slice = self.boxes[inline.0].slice;
        let count = pieces.len();
        let mut reused = false;
        let mut result = Vec::with_capacity(count);
        for (i, piece) in pieces.into_iter().enumerate() {
            match piece {
                Piece::Block(b) => result.push(b),
                Piece::Inline(children) => {
                    let id = if reused {
                        let b = &self.boxes[inline.0];
                        let (declared, style) = (b.declared.clone(), b.style.clone());
                        let id = self.push_box(BoxKind::Inline, declared, style, None);
                        self.boxes[id.0].name = self.boxes[inline.0].name.clone();
                        id
                    } else {
                        reused = true;
                        inline
                    };
                    for &c in &children {
                        self.boxes[c.0].parent = Some(id);
                    }
                    let b = &mut self.boxes[id.0];
                    b.children = children;
                    b.split_origin = Some(origin);
                    b.slice = InlineSlice {
                        has_start_edge: original_slice.has_start_edge && i == 0,
                        has_end_edge: original_slice.has_end_edge && i + 1 == count,
                    };
                    result.push(id);
                }
            }
        }
        if !reused {
            self.boxes[inline.0].alive = false;
        }
        result
    }

    /// Undo anonymous wrapping and inline splitting below `container`, then
    /// normalize again.
    fn restructure_around(&mut self, start: BoxId) {
        let container = if self.is_container(start) {
            start
        } else {
            match self.containing_block(start) {
                Some(c) => c,
                None => return,
            }
        };
        // An anonymous wrapper is restructured as part of its parent.
        let container = if self.get(container).anonymous
            && matches!(self.kind(container), BoxKind::BlockContainer)
        {
            self.parent(container).unwrap_or(container)
        } else {
            container
        };

        let mut flat = Vec::new();
        for child in std::mem::take(&mut self.boxes[container.0].children) {
            let b = self.get(child);
            if b.anonymous && matches!(b.kind, BoxKind::BlockContainer) {
                let inner = std::mem::take(&mut self.boxes[child.0].children);
                self.boxes[child.0].alive = false;
                flat.extend(inner);
            } else {
                flat.push(child);
            }
        }
        let merged = self.merge_split_pieces(flat);
        for &c in &merged {
            self.boxes[c.0].parent = Some(container);
        }
        self.boxes[container.0].children = merged;
        self.normalize(container);
        self.touch(container);
    }

    /// Merge adjacent inline pieces that were split from the same box.
    fn merge_split_pieces(&mut self, children: Vec<BoxId>) -> Vec<BoxId> {
        let mut out: Vec<BoxId> = Vec::with_capacity(children.len());
        for child in children {
            if let Some(&prev) = out.last() {
                let a = self.get(prev);
                let b = self.get(child);
                if matches!(a.kind, BoxKind::Inline)
                    && matches!(b.kind, BoxKind::Inline)
                    && a.split_origin.is_some()
                    && a.split_origin == b.split_origin
                {
                    let moved = std::mem::take(&mut self.boxes[child.0].children);
                    for &m in &moved {
                        self.boxes[m.0].parent = Some(prev);
                    }
                    let end_edge = self.boxes[child.0].slice.has_end_edge;
                    self.boxes[child.0].alive = false;
                    let mut combined = std::mem::take(&mut self.boxes[prev.0].children);
                    combined.extend(moved);
                    let combined = self.merge_split_pieces(combined);
                    let p = &mut self.boxes[prev.0];
                    p.children = combined;
                    p.slice.has_end_edge = end_edge;
                    continue;
                }
            }
            out.push(child);
        }
        out
    }

    fn kill(&mut self, id: BoxId) {
        let mut stack = vec![id];
        while let Some(cur) = stack.pop() {
            self.boxes[cur.0].alive = false;
            stack.extend_from_slice(&self.boxes[cur.0].children);
        }
    }

    /// Resolve the style of `id` and its subtree again, parents first.
    fn reresolve(&mut self, id: BoxId) {
        let mut stack = vec![id];
        while let Some(cur) = stack.pop() {
            let parent_style = self.parent(cur).map(|p| self.boxes[p.0].style.clone());
            let resolved = self.boxes[cur.0].declared.resolve(parent_style.as_ref());
            self.boxes[cur.0].style = resolved;
            stack.extend_from_slice(&self.boxes[cur.0].children);
        }
    }

    /// Mark a box and its ancestors as changed.
    fn touch(&mut self, id: BoxId) {
        self.next_generation += 1;
        let generation = self.next_generation;
        let mut cur = Some(id);
        while let Some(c) = cur {
            self.boxes[c.0].generation = generation;
            cur = self.boxes[c.0].parent;
        }
    }

    /// Recompute every container's list of owned descendants.
    fn rebuild_owns(&mut self) {
        for b in &mut self.boxes {
            b.owns.clear();
        }
        for i in 0..self.boxes.len() {
            let id = BoxId(i);
            if !self.boxes[i].alive || id == self.root {
                continue;
            }
            if matches!(self.kind(id), BoxKind::OutOfFlow) {
                let owner = self.positioned_ancestor(id);
                self.boxes[owner.0].owns.push(Owned::OutOfFlow(id));
            }
            let style = &self.boxes[i].style;
            let percent_height = [Some(style.height), Some(style.min_height), style.max_height]
                .iter()
                .any(|d| matches!(d, Some(Dimension::Percent(_))));
            if percent_height {
                if let Some(owner) = self.containing_block(id) {
                    self.boxes[owner.0].owns.push(Owned::PercentHeight(id));
                }
            }
        }
    }

    fn positioned_ancestor(&self, id: BoxId) -> BoxId {
        let mut cur = self.parent(id);
        while let Some(p) = cur {
            if self.style(p).position != crate::style::Position::Static && self.is_container(p) {
                return p;
            }
            cur = self.parent(p);
        }
        self.root
    }
}
