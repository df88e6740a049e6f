//! # Block Flow
//!
//! Lays out a block container and everything in it. A container either
//! hosts lines, handed to the line breaker, or stacks block-level children.
//!
//! Stacking walks the children once, top to bottom, threading a
//! `MarginInfo` through them:
//!
//! 1. Guess the child's top from the pending margin and clearance.
//! 2. Apply forced breaks, then narrow the child if it must avoid floats.
//! 3. Lay the child out. If it asks to be pushed to the next region,
//!    either pass the request up (when nothing above it in this container
//!    would stay behind) or push it here and lay it out again.
//! 4. Collapse its margins, apply clearance, and lay it out once more if
//!    the guess was wrong and anything position-dependent is around.
//! 5. Keep unsplittable children out of region boundaries, then adopt the
//!    floats that hang out of the child.

use std::collections::HashMap;

use crate::geometry::{Rect, Size, EPSILON};
use crate::layout::floats::{FloatEntry, FloatManager, FloatSide};
use crate::layout::fragmentation::{
    find_widow_break, strut_for_forced_break, strut_for_unsplittable, RegionProvider,
};
use crate::layout::inline_items::collect_inline_items;
use crate::layout::line_breaker::{LineBreaker, Pagination};
use crate::layout::margins::{
    clear_floats_if_needed, collapse_margins, estimate_top, handle_after_side, MarginInfo, MarginValues,
};
use crate::layout::sizing::{
    definite_height, intrinsic_sizes, resolve_block_geometry, resolve_content_height, BlockGeometry,
};
use crate::layout::{BoxFragment, FragmentKind, StaticPosition};
use crate::model::tree::{BoxId, BoxKind, BoxTree, Owned};
use crate::style::{BreakInside, Direction, Edges, ResolvedStyle};
use crate::text::bidi::{resolve_levels, ParagraphResolver};
use crate::text::TextMeasurer;

/// The block must move down by this much and be laid out again.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PushDown(pub f64);

/// What a container is given to lay itself out.
#[derive(Debug, Clone)]
pub struct BlockInput {
    pub geometry: BlockGeometry,
    /// Definite content height of the containing block.
    pub containing_height: Option<f64>,
    /// Absolute block offset of the border box.
    pub offset: f64,
    /// Floats of the enclosing formatting context, in this box's border-box
    /// coordinates. `None` starts a new formatting context.
    pub floats: Option<FloatManager>,
    /// Whether the box may answer with a `PushDown`.
    pub allows_strut: bool,
    pub paginate: bool,
}

#[derive(Debug, Clone)]
pub struct LaidOutBlock {
    /// Sized but not yet positioned; the parent sets `rect.x` and `rect.y`.
    pub fragment: BoxFragment,
    /// Every float known at the end of the box, in its border-box
    /// coordinates.
    pub floats: FloatManager,
}

/// The container currently stacking children or lines.
struct Container<'a> {
    id: BoxId,
    style: &'a ResolvedStyle,
    geometry: BlockGeometry,
    offset: f64,
    allows_strut: bool,
    regions: Option<&'a dyn RegionProvider>,
    /// Definite content height, for percentage heights of children.
    child_containing_height: Option<f64>,
}

#[derive(Debug, Default)]
struct FlowState {
    logical_height: f64,
    previous_in_flow: bool,
    break_after_previous: bool,
}

pub struct BlockFlow<'a> {
    tree: &'a BoxTree,
    measurer: &'a dyn TextMeasurer,
    resolver: &'a dyn ParagraphResolver,
    regions: Option<&'a dyn RegionProvider>,
    max_inline_depth: usize,
    /// Content widths of containers laid out so far, for out-of-flow boxes
    /// that resolve against an ancestor.
    content_widths: HashMap<BoxId, f64>,
    pub width_mismatches: usize,
}

impl<'a> BlockFlow<'a> {
    pub fn new(
        tree: &'a BoxTree,
        measurer: &'a dyn TextMeasurer,
        resolver: &'a dyn ParagraphResolver,
        regions: Option<&'a dyn RegionProvider>,
        max_inline_depth: usize,
    ) -> Self {
        Self {
            tree,
            measurer,
            resolver,
            regions,
            max_inline_depth,
            content_widths: HashMap::new(),
            width_mismatches: 0,
        }
    }

    /// Lay out the whole tree in a container of `width`. The root's border
    /// box sits below its own top margin.
    pub fn layout_root(&mut self, width: f64) -> BoxFragment {
        let root = self.tree.root();
        let style = self.tree.style(root);
        let geometry = resolve_block_geometry(style, width, 0.0, style.direction);
        let input = BlockInput {
            geometry,
            containing_height: None,
            offset: geometry.margin.top,
            floats: None,
            allows_strut: false,
            paginate: self.regions.is_some(),
        };
        let mut fragment = self.layout_in_place(root, input).fragment;
        fragment.rect.x = geometry.x;
        fragment.rect.y = geometry.margin.top;
        fragment
    }

    /// Lay out a box that may not be pushed.
    fn layout_in_place(&mut self, id: BoxId, mut input: BlockInput) -> LaidOutBlock {
        input.allows_strut = false;
        match self.layout_block(id, input.clone()) {
            Ok(block) => block,
            Err(PushDown(strut)) => {
                log::warn!(
                    "box {} asked to move down {:.2} where it can't; laying it out unfragmented",
                    id.0,
                    strut
                );
                input.paginate = false;
                self.layout_in_place(id, input)
            }
        }
    }

    pub fn layout_block(&mut self, id: BoxId, input: BlockInput) -> Result<LaidOutBlock, PushDown> {
        let tree = self.tree;
        let style = tree.style(id);
        let geometry = input.geometry;
        let bp_before = geometry.border_padding_before();
        let bp_after = geometry.border_padding_after();
        self.content_widths.insert(id, geometry.content_width);

        let new_context = input.floats.is_none();
        let mut floats = input
            .floats
            .unwrap_or_else(|| FloatManager::new(geometry.content_left(), geometry.content_width));
        let mut own = MarginValues::from_margins(geometry.margin.top, geometry.margin.bottom);
        let kind = match tree.kind(id) {
            BoxKind::Floated => FragmentKind::Float,
            BoxKind::OutOfFlow => FragmentKind::OutOfFlow,
            _ => FragmentKind::Block,
        };
        let mut fragment = BoxFragment::new(tree, id, kind);

        let container = Container {
            id,
            style,
            geometry,
            offset: input.offset,
            allows_strut: input.allows_strut,
            regions: if input.paginate { self.regions } else { None },
            child_containing_height: definite_height(style, input.containing_height),
        };

        let logical_height = if tree.children_inline(id) {
            self.layout_inline_children(&container, &mut floats, &mut fragment)?
        } else {
            let min_height = style.min_height.resolve(0.0).unwrap_or(0.0);
            let can_collapse_before = !new_context && bp_before == 0.0;
            let can_collapse_after =
                !new_context && bp_after == 0.0 && style.height.is_auto() && min_height <= 0.0;
            let mut info = MarginInfo::new(&own, can_collapse_before, can_collapse_after);
            self.layout_block_children(&container, &mut info, &mut own, &mut floats, &mut fragment)?
        };

        let content = (logical_height - bp_before - bp_after).max(0.0);
        let mut height =
            resolve_content_height(style, content, input.containing_height) + bp_before + bp_after;
        if new_context && style.height.is_auto() {
            // A formatting context root grows to contain its floats.
            if let Some(bottom) = floats.lowest_float_bottom() {
                height = height.max(bottom + bp_after);
            }
        }

        fragment.self_collapsing = !new_context
            && height <= EPSILON
            && bp_before + bp_after <= 0.0
            && style.height.is_auto()
            && fragment.lines.is_empty()
            && fragment
                .children
                .iter()
                .filter(|c| c.kind == FragmentKind::Block)
                .all(|c| c.self_collapsing);
        fragment.rect = Rect::new(geometry.x, 0.0, geometry.border_box_width(), height);
        fragment.margins = own;
        Ok(LaidOutBlock { fragment, floats })
    }

    // ── Inline content ──────────────────────────────────────────

    fn layout_inline_children(
        &mut self,
        c: &Container<'a>,
        floats: &mut FloatManager,
        fragment: &mut BoxFragment,
    ) -> Result<f64, PushDown> {
        let tree = self.tree;
        let paragraph = collect_inline_items(tree, c.id, self.max_inline_depth);

        let mut float_sizes = HashMap::new();
        let mut float_fragments = Vec::new();
        for id in paragraph.floats() {
            let (block, margin) = self.shrink_to_fit(id, c.geometry.content_width, c.child_containing_height);
            let rect = block.fragment.rect;
            float_sizes.insert(
                id,
                Size::new(rect.width + margin.horizontal(), rect.height + margin.vertical()),
            );
            float_fragments.push((block.fragment, margin));
        }

        let levels = resolve_levels(&paragraph.text, c.style.direction, &paragraph.controls, self.resolver);
        let pagination = c.regions.map(|regions| Pagination {
            regions,
            block_offset: c.offset,
            allows_block_strut: c.allows_strut,
        });

        let mark = floats.mark();
        let mut widow_break = None;
        let layout = loop {
            let layout = LineBreaker::new(
                tree,
                c.id,
                &paragraph,
                &levels,
                self.measurer,
                &float_sizes,
                pagination,
                widow_break,
            )
            .run(floats, c.geometry.border_padding_before());
            if let Some(strut) = layout.block_strut {
                return Err(PushDown(strut));
            }
            if pagination.is_some() && widow_break.is_none() {
                let breaks: Vec<bool> = layout.lines.iter().map(|l| l.is_first_after_break).collect();
                if let Some(line) = find_widow_break(&breaks, c.style.widows, c.style.orphans) {
                    log::debug!("box {}: breaking before line {} to keep widows", c.id.0, line + 1);
                    floats.rollback(mark, f64::NEG_INFINITY);
                    widow_break = Some(line);
                    continue;
                }
            }
            break layout;
        };
        self.width_mismatches += layout.width_mismatches;

        for (mut frag, margin) in float_fragments {
            let placed = floats
                .floats()
                .iter()
                .rev()
                .find(|e| e.box_id == frag.box_id && !e.intruding);
            if let Some(entry) = placed {
                frag.rect.x = entry.rect.x + margin.left;
                frag.rect.y = entry.rect.y + margin.top;
                frag.pagination_strut = entry.pagination_strut;
            }
            fragment.children.push(frag);
        }
        for pos in &layout.static_positions {
            let frag = self.layout_out_of_flow(pos.box_id, c, pos.x, pos.y);
            fragment.children.push(frag);
        }
        fragment.static_positions = layout.static_positions;
        fragment.lines = layout.lines;
        Ok(layout.height + c.geometry.border_padding_after())
    }

    // ── Block-level children ────────────────────────────────────

    fn layout_block_children(
        &mut self,
        c: &Container<'a>,
        info: &mut MarginInfo,
        own: &mut MarginValues,
        floats: &mut FloatManager,
        fragment: &mut BoxFragment,
    ) -> Result<f64, PushDown> {
        let tree = self.tree;
        let geometry = c.geometry;
        let mut state = FlowState {
            logical_height: geometry.border_padding_before(),
            ..Default::default()
        };

        for &child in tree.children(c.id) {
            match tree.kind(child) {
                BoxKind::OutOfFlow => {
                    let y = estimate_top(info, 0.0, state.logical_height);
                    let x = if c.style.direction.is_ltr() {
                        geometry.content_left()
                    } else {
                        geometry.content_left() + geometry.content_width
                    };
                    fragment.static_positions.push(StaticPosition { box_id: child, x, y });
                    let frag = self.layout_out_of_flow(child, c, x, y);
                    fragment.children.push(frag);
                }
                BoxKind::Floated => {
                    let pending = if info.can_collapse_with_margin_before() {
                        0.0
                    } else {
                        info.margin()
                    };
                    let frag = self.place_float(c, floats, child, state.logical_height + pending);
                    fragment.children.push(frag);
                }
                BoxKind::BlockContainer => {
                    let frag = self.layout_in_flow_child(c, child, &mut state, info, own, floats)?;
                    fragment.children.push(frag);
                }
                _ => log::debug!("inline-level box {} in block flow skipped", child.0),
            }
        }

        handle_after_side(
            info,
            own,
            &mut state.logical_height,
            geometry.border_padding_before(),
            geometry.border_padding_after(),
        );
        Ok(state.logical_height)
    }

    fn layout_in_flow_child(
        &mut self,
        c: &Container<'a>,
        child: BoxId,
        state: &mut FlowState,
        info: &mut MarginInfo,
        own: &mut MarginValues,
        floats: &mut FloatManager,
    ) -> Result<BoxFragment, PushDown> {
        let tree = self.tree;
        let style = tree.style(child);
        let bp_before = c.geometry.border_padding_before();
        let content_width = c.geometry.content_width;

        // Forced break between siblings. Margins at the break are dropped.
        let mut truncate_before = false;
        if state.previous_in_flow && (state.break_after_previous || style.break_before.is_forced()) {
            if let Some(regions) = c.regions {
                let strut = strut_for_forced_break(regions, c.offset + state.logical_height);
                if strut > 0.0 {
                    state.logical_height += strut;
                    info.clear_margin();
                    truncate_before = true;
                }
            }
        }

        let margin_before = if truncate_before {
            0.0
        } else {
            style.margin.top.resolve_or_zero(content_width)
        };
        let mut top_guess = estimate_top(info, margin_before, state.logical_height);
        let mut clear_to = floats.clear(style.clear);
        if let Some(bottom) = clear_to {
            top_guess = top_guess.max(bottom);
        }
        let fit = self.fit_beside_floats(floats, style, content_width, top_guess);
        if fit > top_guess + EPSILON {
            clear_to = Some(clear_to.map_or(fit, |b| b.max(fit)));
            top_guess = fit;
        }

        let allows = state.previous_in_flow || c.allows_strut;
        let mut attempt_top = top_guess;
        let mut strut = 0.0;
        let (mut laid, mut x) = loop {
            let (input, x) = self.child_input(c, floats, child, attempt_top, allows && strut == 0.0);
            match self.layout_block(child, input) {
                Ok(block) => break (block, x),
                Err(PushDown(s)) => {
                    if !state.previous_in_flow && c.allows_strut && (attempt_top - bp_before).abs() < EPSILON {
                        return Err(PushDown(s));
                    }
                    log::debug!("box {} pushed down {:.2} into the next region", child.0, s);
                    strut += s;
                    attempt_top += s;
                }
            }
        };

        let mut child_margins = laid.fragment.margins;
        if truncate_before {
            child_margins.positive_before = 0.0;
            child_margins.negative_before = 0.0;
        }
        let self_collapsing = laid.fragment.self_collapsing;
        let saved_own_before = (own.positive_before, own.negative_before);
        let before = state.logical_height;
        let mut top = collapse_margins(info, own, &child_margins, self_collapsing, &mut state.logical_height);

        // A margin that spans a region boundary ends there.
        if let Some(regions) = c.regions {
            if !self_collapsing && regions.page_height(c.offset + before) > 0.0 {
                let boundary = regions.next_region_top(c.offset + before) - c.offset;
                if top > boundary + EPSILON {
                    state.logical_height -= top - boundary;
                    top = boundary;
                }
            }
        }

        top = clear_floats_if_needed(
            info,
            own,
            saved_own_before,
            &child_margins,
            self_collapsing,
            top,
            clear_to,
            &mut state.logical_height,
        );
        if !self_collapsing {
            info.set_at_before_side(false);
        }
        if strut > 0.0 {
            top += strut;
            if !self_collapsing {
                state.logical_height += strut;
            }
        }

        if (top - attempt_top).abs() > EPSILON && (!floats.is_empty() || c.regions.is_some()) {
            log::trace!("box {} moved from {:.2} to {:.2}; laying out again", child.0, attempt_top, top);
            let (input, new_x) = self.child_input(c, floats, child, top, false);
            if let Ok(block) = self.layout_block(child, input) {
                laid = block;
                x = new_x;
            }
        }

        if let Some(regions) = c.regions {
            if !self_collapsing && style.break_inside == BreakInside::Avoid {
                let push = strut_for_unsplittable(regions, c.offset + top, laid.fragment.rect.height);
                if push > 0.0 {
                    if !state.previous_in_flow && c.allows_strut && (top - bp_before).abs() < EPSILON {
                        return Err(PushDown(push));
                    }
                    top += push;
                    strut += push;
                    state.logical_height += push;
                    let (input, new_x) = self.child_input(c, floats, child, top, false);
                    if let Ok(block) = self.layout_block(child, input) {
                        laid = block;
                        x = new_x;
                    }
                }
            }
        }

        laid.fragment.rect.x = x;
        laid.fragment.rect.y = top;
        laid.fragment.pagination_strut = strut;
        if !self_collapsing {
            state.logical_height = top + laid.fragment.rect.height;
        }
        if !style.avoids_floats() {
            floats.adopt_overhanging(&laid.floats, x, top);
        }
        state.previous_in_flow = true;
        state.break_after_previous = style.break_after.is_forced();
        Ok(laid.fragment)
    }

    /// Input for an in-flow child whose border box starts at `top`, and the
    /// child's x.
    fn child_input(
        &self,
        c: &Container<'a>,
        floats: &FloatManager,
        child: BoxId,
        top: f64,
        allows_strut: bool,
    ) -> (BlockInput, f64) {
        let style = self.tree.style(child);
        let (shrink, left_offset) = if style.avoids_floats() {
            float_intrusion(floats, top)
        } else {
            (0.0, 0.0)
        };
        let geometry = resolve_block_geometry(style, c.geometry.content_width, shrink, c.style.direction);
        let x = c.geometry.content_left() + left_offset + geometry.x;
        let child_floats = if style.avoids_floats() {
            None
        } else {
            Some(floats.intruding_into(x, top, geometry.content_left(), geometry.content_width))
        };
        let input = BlockInput {
            geometry,
            containing_height: c.child_containing_height,
            offset: c.offset + top,
            floats: child_floats,
            allows_strut,
            paginate: c.regions.is_some(),
        };
        (input, x)
    }

    /// First offset at or below `top` where a fixed-width box that avoids
    /// floats fits beside them.
    fn fit_beside_floats(&self, floats: &FloatManager, style: &ResolvedStyle, containing_width: f64, top: f64) -> f64 {
        if floats.is_empty() || !style.avoids_floats() || style.width.is_auto() {
            return top;
        }
        let geometry = resolve_block_geometry(style, containing_width, 0.0, Direction::Ltr);
        let needed = geometry.border_box_width()
            + style.margin.left.resolve_or_zero(containing_width)
            + style.margin.right.resolve_or_zero(containing_width);
        let mut y = top;
        loop {
            if floats.available_width(y, 0.0) >= needed - EPSILON {
                return y;
            }
            match floats.next_float_bottom_below(y) {
                Some(bottom) => y = bottom,
                None => return y,
            }
        }
    }

    // ── Floats and out-of-flow boxes ────────────────────────────

    /// Lay out a float or out-of-flow box at its shrink-to-fit width.
    /// Returns the block and its used margins.
    fn shrink_to_fit(
        &mut self,
        id: BoxId,
        containing_width: f64,
        containing_height: Option<f64>,
    ) -> (LaidOutBlock, Edges) {
        let tree = self.tree;
        let style = tree.style(id);
        let mut geometry = resolve_block_geometry(style, containing_width, 0.0, Direction::Ltr);
        geometry.margin.left = style.margin.left.resolve_or_zero(containing_width);
        geometry.margin.right = style.margin.right.resolve_or_zero(containing_width);
        if style.width.is_auto() {
            let available = (containing_width
                - geometry.margin.horizontal()
                - geometry.border.horizontal()
                - geometry.padding.horizontal())
            .max(0.0);
            geometry.content_width = intrinsic_sizes(tree, id, self.measurer).shrink_to_fit(available);
        }
        geometry.x = geometry.margin.left;
        let block = self.layout_in_place(
            id,
            BlockInput {
                geometry,
                containing_height,
                offset: 0.0,
                floats: None,
                allows_strut: false,
                paginate: false,
            },
        );
        (block, geometry.margin)
    }

    /// Place a block-level float whose margin box may start at `top`.
    fn place_float(&mut self, c: &Container<'a>, floats: &mut FloatManager, id: BoxId, top: f64) -> BoxFragment {
        let tree = self.tree;
        let style = tree.style(id);
        let (block, margin) = self.shrink_to_fit(id, c.geometry.content_width, c.child_containing_height);
        let mut fragment = block.fragment;
        let size = Size::new(
            fragment.rect.width + margin.horizontal(),
            fragment.rect.height + margin.vertical(),
        );
        let side = FloatSide::resolve(style.float, c.style.direction).unwrap_or(FloatSide::Left);
        let mut at = floats.find_position(side, size, top, style.clear);
        let mut strut = 0.0;
        if let Some(regions) = c.regions {
            strut = strut_for_unsplittable(regions, c.offset + at.y, size.height);
            if strut > 0.0 {
                at = floats.find_position(side, size, at.y + strut, style.clear);
            }
        }
        floats.push(FloatEntry {
            box_id: id,
            side,
            rect: Rect::new(at.x, at.y, size.width, size.height),
            pagination_strut: strut,
            originating_line: None,
            intruding: false,
        });
        fragment.rect.x = at.x + margin.left;
        fragment.rect.y = at.y + margin.top;
        fragment.pagination_strut = strut;
        fragment
    }

    /// Lay out an out-of-flow box at its static position `(x, y)` in `c`.
    /// In a right-to-left container `x` is the box's right edge.
    fn layout_out_of_flow(&mut self, id: BoxId, c: &Container<'a>, x: f64, y: f64) -> BoxFragment {
        let width = self
            .positioned_container_width(id)
            .unwrap_or(c.geometry.content_width);
        let (block, margin) = self.shrink_to_fit(id, width, None);
        let mut fragment = block.fragment;
        fragment.rect.x = if c.style.direction.is_ltr() {
            x + margin.left
        } else {
            x - margin.right - fragment.rect.width
        };
        fragment.rect.y = y + margin.top;
        fragment
    }

    /// Content width of the container that owns an out-of-flow box.
    fn positioned_container_width(&self, id: BoxId) -> Option<f64> {
        let mut current = self.tree.parent(id);
        while let Some(p) = current {
            if self.tree.owns(p).contains(&Owned::OutOfFlow(id)) {
                return self.content_widths.get(&p).copied();
            }
            current = self.tree.parent(p);
        }
        None
    }
}

/// Width taken by floats at `top`, and how much of it is on the left.
fn float_intrusion(floats: &FloatManager, top: f64) -> (f64, f64) {
    let (left, right) = floats.line_offsets(top, 0.0);
    let left_offset = (left - floats.content_left()).max(0.0);
    let right_offset = (floats.content_left() + floats.content_width() - right).max(0.0);
    (left_offset + right_offset, left_offset)
}
