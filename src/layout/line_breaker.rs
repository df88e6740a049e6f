//! # Line Breaking
//!
//! Turns an inline paragraph into line boxes. The paragraph is first cut
//! into *break units*: the stretches of content between two UAX #14 break
//! opportunities, each with its width and the width of the collapsible
//! space it ends with. Lines are then filled greedily, one unit at a time,
//! against the width the float manager leaves at the line's position.
//!
//! Each line goes through a small state machine:
//!
//! ```text
//! AtStart → Accumulating → PaginationCheck → Committed
//!                              │
//!                              └→ Restart → AtStart   (at most once)
//! ```
//!
//! A restart happens when pagination pushes a line into the next region
//! while floats are around: floats placed while building the line are
//! rolled back and the line is built again at its new position, where the
//! available width may differ.

use std::collections::HashMap;
use std::ops::Range;

use unicode_linebreak::BreakOpportunity;

use crate::geometry::{Rect, Size, EPSILON};
use crate::layout::floats::{FloatEntry, FloatManager, FloatMark, FloatSide};
use crate::layout::fragmentation::{adjust_line_for_pagination, strut_for_unsplittable, LinePlacement, RegionProvider};
use crate::layout::inline_items::{InlineParagraph, ItemKind};
use crate::layout::line_positioner::{
    align_box, align_line, leading_box, line_metrics, text_alignment_for_line, VerticalBox,
};
use crate::layout::{LineBox, PlacedRun, RunKind, StaticPosition};
use crate::model::tree::{BoxId, BoxKind, BoxTree};
use crate::style::{Clear, Direction, Hyphens, Overflow, ResolvedStyle, TextJustify, TextOverflow, VerticalAlign};
use crate::text::{
    break_opportunities, hyphenation_lang, hyphenation_points, is_expansion_opportunity, trailing_space_len,
    GlyphOverflow, TextMeasurer, SOFT_HYPHEN,
};

const ELLIPSIS: &str = "\u{2026}";

/// Where the container sits in the fragmented flow.
#[derive(Clone, Copy)]
pub struct Pagination<'a> {
    pub regions: &'a dyn RegionProvider,
    /// Absolute offset of the container's border box.
    pub block_offset: f64,
    /// Whether the container may be pushed to the next region as a whole.
    pub allows_block_strut: bool,
}

/// Everything the line breaker produced for one paragraph.
#[derive(Debug, Clone, Default)]
pub struct InlineLayout {
    pub lines: Vec<LineBox>,
    /// Logical height of the container after its last line.
    pub height: f64,
    pub static_positions: Vec<StaticPosition>,
    /// Set when the container must move down by this much and be laid out
    /// again (orphans, or a first line that belongs in the next region).
    pub block_strut: Option<f64>,
    /// Lines that were pushed without a restart and found a different
    /// available width at their final position.
    pub width_mismatches: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum PieceKind {
    Text,
    Open,
    Close,
    Atomic { height: f64 },
    Break,
}

#[derive(Debug, Clone)]
struct Piece {
    box_id: BoxId,
    range: Range<usize>,
    kind: PieceKind,
    width: f64,
}

/// Content between two break opportunities, plus the floats and
/// out-of-flow boxes met just before or inside it.
#[derive(Debug, Clone, Default)]
struct Unit {
    pieces: Vec<Piece>,
    floats: Vec<BoxId>,
    out_of_flow: Vec<BoxId>,
    width: f64,
    /// Hanging collapsible space at the end: (piece index, bytes, width).
    trailing: Option<(usize, usize, f64)>,
    forced_break: Option<Clear>,
    has_content: bool,
    /// Width of the hyphen drawn when a line breaks after this unit.
    hyphen: Option<f64>,
}

impl Unit {
    fn trailing_width(&self) -> f64 {
        self.trailing.map(|t| t.2).unwrap_or(0.0)
    }
}

/// A line whose units are chosen but not yet committed.
#[derive(Debug, Clone)]
struct Draft {
    start: usize,
    end: usize,
    top: f64,
    left: f64,
    available: f64,
    deferred: Vec<BoxId>,
    statics: Vec<(BoxId, f64)>,
}

/// Where a line is in its state machine. `strut` is how far a restart
/// already moved the line down.
enum LineState {
    AtStart { top: f64, strut: f64 },
    Accumulating { top: f64, strut: f64, mark: FloatMark, floats_done: usize },
    PaginationCheck { line: Box<(Draft, LineBox)>, strut: f64, mark: FloatMark, floats_done: usize },
    Restart { line_top: f64, strut: f64, mark: FloatMark, floats_done: usize },
    Committed(Box<(Draft, LineBox)>),
}

enum LineOutcome {
    /// The units produced no line box.
    Empty { end: usize },
    Line(Box<(Draft, LineBox)>),
}

/// A logical piece of one line, after splitting by bidi level.
#[derive(Debug, Clone)]
struct LineItem {
    piece: Piece,
    level: u8,
    width: f64,
    overflow: GlyphOverflow,
    kind: RunKind,
    opportunities: usize,
}

impl LineItem {
    fn is_trailing(&self) -> bool {
        self.kind == RunKind::TrailingSpace
    }
}

pub struct LineBreaker<'a> {
    tree: &'a BoxTree,
    container: BoxId,
    style: &'a ResolvedStyle,
    paragraph: &'a InlineParagraph,
    levels: &'a [u8],
    measurer: &'a dyn TextMeasurer,
    float_sizes: &'a HashMap<BoxId, Size>,
    pagination: Option<Pagination<'a>>,
    /// Break in front of this line (0-based) to leave enough widows.
    widow_break: Option<usize>,
    units: Vec<Unit>,
    floats_done: usize,
    strut: (f64, f64),
}

impl<'a> LineBreaker<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tree: &'a BoxTree,
        container: BoxId,
        paragraph: &'a InlineParagraph,
        levels: &'a [u8],
        measurer: &'a dyn TextMeasurer,
        float_sizes: &'a HashMap<BoxId, Size>,
        pagination: Option<Pagination<'a>>,
        widow_break: Option<usize>,
    ) -> Self {
        let style = tree.style(container);
        let strut = leading_box(style, measurer.font_metrics(style));
        let mut breaker = Self {
            tree,
            container,
            style,
            paragraph,
            levels,
            measurer,
            float_sizes,
            pagination,
            widow_break,
            units: Vec::new(),
            floats_done: 0,
            strut,
        };
        breaker.units = breaker.build_units();
        breaker
    }

    fn base_level(&self) -> u8 {
        if self.style.direction.is_ltr() {
            0
        } else {
            1
        }
    }

    // ── Break units ─────────────────────────────────────────────

    fn build_units(&self) -> Vec<Unit> {
        let text = &self.paragraph.text;
        let opportunities: HashMap<usize, BreakOpportunity> = break_opportunities(text).into_iter().collect();
        let after_soft_hyphen = |offset: usize| text[..offset].ends_with(SOFT_HYPHEN);
        let allowed = |offset: usize, style: &ResolvedStyle| match opportunities.get(&offset) {
            Some(BreakOpportunity::Mandatory) => true,
            Some(BreakOpportunity::Allowed) => {
                style.white_space.wraps() && !(style.hyphens == Hyphens::None && after_soft_hyphen(offset))
            }
            None => false,
        };

        let mut units = Vec::new();
        let mut cur = Unit::default();
        let flush = |cur: &mut Unit, units: &mut Vec<Unit>| {
            if cur.pieces.is_empty() {
                cur.hyphen = None;
            } else {
                units.push(std::mem::take(cur));
            }
        };

        for item in &self.paragraph.items {
            let style = self.tree.style(item.box_id);
            let piece = |range: Range<usize>, kind: PieceKind, width: f64| Piece {
                box_id: item.box_id,
                range,
                kind,
                width,
            };
            match item.kind {
                ItemKind::Text => {
                    let mut start = item.range.start;
                    // (offset, whether a break there draws a hyphen)
                    let mut cuts: Vec<(usize, bool)> = opportunities
                        .keys()
                        .copied()
                        .filter(|&o| o >= item.range.start && o < item.range.end && allowed(o, style))
                        .map(|o| (o, after_soft_hyphen(o)))
                        .collect();
                    cuts.extend(self.hyphenation_cuts(item.range.clone(), style));
                    cuts.sort_unstable_by_key(|&(offset, hyphen)| (offset, !hyphen));
                    cuts.dedup_by_key(|c| c.0);
                    for (cut, hyphen) in cuts {
                        if cut > start {
                            let w = self.measure(&text[start..cut], style);
                            cur.pieces.push(piece(start..cut, PieceKind::Text, w));
                            start = cut;
                        }
                        if hyphen && !cur.pieces.is_empty() {
                            cur.hyphen = Some(self.measure("-", style));
                        }
                        flush(&mut cur, &mut units);
                    }
                    if start < item.range.end {
                        let w = self.measure(&text[start..item.range.end], style);
                        cur.pieces.push(piece(start..item.range.end, PieceKind::Text, w));
                    }
                }
                ItemKind::OpenBox { edge } => {
                    if allowed(item.range.start, style) {
                        flush(&mut cur, &mut units);
                    }
                    cur.pieces.push(piece(item.range.clone(), PieceKind::Open, edge));
                }
                ItemKind::CloseBox { edge } => {
                    cur.pieces.push(piece(item.range.clone(), PieceKind::Close, edge));
                }
                ItemKind::Atomic { width, height } => {
                    if allowed(item.range.start, style) {
                        flush(&mut cur, &mut units);
                    }
                    cur.pieces.push(piece(item.range.clone(), PieceKind::Atomic { height }, width));
                }
                ItemKind::Float => cur.floats.push(item.box_id),
                ItemKind::OutOfFlow => cur.out_of_flow.push(item.box_id),
                ItemKind::ForcedBreak { clear } => {
                    cur.pieces.push(piece(item.range.clone(), PieceKind::Break, 0.0));
                    cur.forced_break = Some(clear);
                    flush(&mut cur, &mut units);
                }
            }
        }
        if !cur.pieces.is_empty() || !cur.floats.is_empty() || !cur.out_of_flow.is_empty() {
            units.push(cur);
        }

        for unit in &mut units {
            self.finish_unit(unit);
        }
        units
    }

    /// Dictionary hyphenation points inside a text item, for `hyphens: auto`.
    fn hyphenation_cuts(&self, range: Range<usize>, style: &ResolvedStyle) -> Vec<(usize, bool)> {
        if style.hyphens != Hyphens::Auto || !style.white_space.wraps() {
            return Vec::new();
        }
        let Some(lang) = hyphenation_lang(style.lang.as_deref()) else {
            return Vec::new();
        };
        hyphenation_points(&self.paragraph.text[range.clone()], lang)
            .into_iter()
            .map(|p| (range.start + p, true))
            .collect()
    }

    fn finish_unit(&self, unit: &mut Unit) {
        let text = &self.paragraph.text;
        unit.width = unit.pieces.iter().map(|p| p.width).sum();
        unit.has_content = unit.pieces.iter().any(|p| match p.kind {
            PieceKind::Text => {
                let style = self.tree.style(p.box_id);
                !style.white_space.collapses_spaces() || !text[p.range.clone()].trim_matches(' ').is_empty()
            }
            PieceKind::Open | PieceKind::Close => p.width > 0.0,
            PieceKind::Atomic { .. } | PieceKind::Break => true,
        });
        let last_text = unit
            .pieces
            .iter()
            .rposition(|p| p.kind != PieceKind::Close && p.kind != PieceKind::Break);
        if let Some(index) = last_text {
            let p = &unit.pieces[index];
            if p.kind == PieceKind::Text {
                let style = self.tree.style(p.box_id);
                let slice = &text[p.range.clone()];
                let bytes = trailing_space_len(slice, style.white_space);
                if bytes > 0 {
                    let width = self.measure(&slice[slice.len() - bytes..], style);
                    unit.trailing = Some((index, bytes, width));
                }
            }
        }
    }

    fn measure(&self, text: &str, style: &ResolvedStyle) -> f64 {
        self.measurer.measure(text, style, style.direction).width
    }

    // ── Line loop ───────────────────────────────────────────────

    /// Build every line, starting at logical offset `top` of the container.
    pub fn run(mut self, floats: &mut FloatManager, top: f64) -> InlineLayout {
        let mut out = InlineLayout {
            height: top,
            ..Default::default()
        };
        let mut y = top;
        let mut index = 0;

        while index < self.units.len() {
            let line_index = out.lines.len();
            let mut state = LineState::AtStart { top: y, strut: 0.0 };
            let outcome = loop {
                state = match state {
                    LineState::AtStart { top, strut } => LineState::Accumulating {
                        top,
                        strut,
                        mark: floats.mark(),
                        floats_done: self.floats_done,
                    },
                    LineState::Accumulating {
                        top,
                        strut,
                        mark,
                        floats_done,
                    } => {
                        let draft = self.accumulate(index, top, line_index, floats);
                        if !self.units[draft.start..draft.end].iter().any(|u| u.has_content) {
                            // Only floats, out-of-flow boxes or collapsed space.
                            self.place_deferred(&draft, draft.top, line_index, floats);
                            self.record_statics(&draft, draft.top, &mut out);
                            break LineOutcome::Empty { end: draft.end };
                        }
                        let mut line = self.assemble(&draft, line_index);
                        line.pagination_strut = strut;
                        line.is_first_after_break = strut > 0.0;
                        LineState::PaginationCheck {
                            line: Box::new((draft, line)),
                            strut,
                            mark,
                            floats_done,
                        }
                    }
                    LineState::PaginationCheck {
                        mut line,
                        strut,
                        mark,
                        floats_done,
                    } => {
                        let Some(p) = self.pagination else {
                            break LineOutcome::Line(line);
                        };
                        let (draft, line_box) = &mut *line;
                        let placement = LinePlacement {
                            offset: p.block_offset + line_box.top,
                            height: line_box.bottom - line_box.top,
                            offset_in_block: line_box.top,
                            line_number: line_index + 1,
                            orphans: self.style.orphans,
                            border_padding_before: self.style.border_padding_before(),
                            block_offset: p.block_offset,
                            allows_block_strut: p.allows_block_strut,
                            break_for_widow: self.widow_break == Some(line_index) && strut == 0.0,
                        };
                        let adjustment = adjust_line_for_pagination(p.regions, &placement);
                        if let Some(block_strut) = adjustment.block_strut {
                            log::debug!(
                                "line {} of box {} pushes its block down by {:.2}",
                                line_index + 1,
                                self.container.0,
                                block_strut
                            );
                            out.block_strut = Some(block_strut);
                            return out;
                        }
                        line_box.is_first_after_break |= adjustment.first_after_break;
                        if adjustment.strut <= 0.0 {
                            LineState::Committed(line)
                        } else if strut == 0.0 && !floats.is_empty() {
                            LineState::Restart {
                                line_top: draft.top,
                                strut: adjustment.strut,
                                mark,
                                floats_done,
                            }
                        } else {
                            let new_top = draft.top + adjustment.strut;
                            let height = line_box.bottom - line_box.top;
                            if !floats.is_empty()
                                && (floats.available_width(new_top, height) - draft.available).abs() > EPSILON
                            {
                                log::debug!("line at {:.2} committed with a stale width", new_top);
                                out.width_mismatches += 1;
                            }
                            translate_line(line_box, adjustment.strut);
                            line_box.pagination_strut += adjustment.strut;
                            line_box.is_first_after_break = true;
                            draft.top = new_top;
                            LineState::Committed(line)
                        }
                    }
                    LineState::Restart {
                        line_top,
                        strut,
                        mark,
                        floats_done,
                    } => {
                        let removed = floats.rollback(mark, line_top);
                        self.floats_done = floats_done;
                        log::debug!(
                            "restarting line {} of box {} at {:.2} ({} floats rolled back)",
                            line_index + 1,
                            self.container.0,
                            line_top + strut,
                            removed.len()
                        );
                        LineState::AtStart {
                            top: line_top + strut,
                            strut,
                        }
                    }
                    LineState::Committed(line) => break LineOutcome::Line(line),
                };
            };

            let (draft, line_box) = match outcome {
                LineOutcome::Empty { end } => {
                    index = end;
                    continue;
                }
                LineOutcome::Line(line) => *line,
            };
            self.commit(&draft, &line_box, line_index, floats, &mut out);
            y = line_box.bottom;
            if let Some(clear) = self.units[draft.end - 1].forced_break {
                if let Some(bottom) = floats.clear(clear) {
                    y = y.max(bottom);
                }
            }
            out.lines.push(line_box);
            index = draft.end;
        }

        out.height = y;
        out
    }

    fn commit(&self, draft: &Draft, line: &LineBox, index: usize, floats: &mut FloatManager, out: &mut InlineLayout) {
        log::trace!(
            "line {} of box {}: units {}..{} at {:.2}..{:.2}",
            index + 1,
            self.container.0,
            draft.start,
            draft.end,
            line.top,
            line.bottom
        );
        self.place_deferred(draft, line.bottom, index, floats);
        self.record_statics(draft, line.top, out);
    }

    fn record_statics(&self, draft: &Draft, top: f64, out: &mut InlineLayout) {
        for &(box_id, x) in &draft.statics {
            out.static_positions.push(StaticPosition { box_id, x, y: top });
        }
    }

    fn place_deferred(&self, draft: &Draft, top: f64, line_index: usize, floats: &mut FloatManager) {
        for &id in &draft.deferred {
            self.place_float(id, top, line_index, floats);
        }
    }

    fn place_float(&self, id: BoxId, top: f64, line_index: usize, floats: &mut FloatManager) {
        let style = self.tree.style(id);
        let side = FloatSide::resolve(style.float, self.style.direction).unwrap_or(FloatSide::Left);
        let size = self.float_sizes.get(&id).copied().unwrap_or_default();
        let mut at = floats.find_position(side, size, top, style.clear);
        let mut strut = 0.0;
        if let Some(p) = self.pagination {
            strut = strut_for_unsplittable(p.regions, p.block_offset + at.y, size.height);
            if strut > 0.0 {
                at = floats.find_position(side, size, at.y + strut, style.clear);
            }
        }
        floats.push(FloatEntry {
            box_id: id,
            side,
            rect: Rect::new(at.x, at.y, size.width, size.height),
            pagination_strut: strut,
            originating_line: Some(line_index),
            intruding: false,
        });
    }

    /// Choose the units of the line starting at unit `start`. Places the
    /// floats that fit beside the line as it goes.
    fn accumulate(&mut self, start: usize, top: f64, line_index: usize, floats: &mut FloatManager) -> Draft {
        let indent = if line_index == 0 { self.style.text_indent } else { 0.0 };
        let ltr = self.style.direction.is_ltr();
        let line_height = self.strut.0 + self.strut.1;
        let mut top = top;
        // Floats met before the line moves down stay placed or deferred.
        let mut deferred = Vec::new();

        'position: loop {
            let (mut left, mut right) = floats.line_offsets(top, line_height);
            let mut available = (right - left - indent).max(0.0);
            let mut draft = Draft {
                start,
                end: start,
                top,
                left,
                available,
                deferred: std::mem::take(&mut deferred),
                statics: Vec::new(),
            };
            let mut used = 0.0;

            while draft.end < self.units.len() {
                let unit_index = draft.end;
                if unit_index >= self.floats_done {
                    for &id in &self.units[unit_index].floats {
                        let width = self.float_sizes.get(&id).map(|s| s.width).unwrap_or(0.0);
                        if used + width <= available + EPSILON {
                            self.place_float(id, top, line_index, floats);
                            (left, right) = floats.line_offsets(top, line_height);
                            available = (right - left - indent).max(0.0);
                        } else {
                            draft.deferred.push(id);
                        }
                    }
                    self.floats_done = unit_index + 1;
                }

                let unit = &self.units[unit_index];
                let x = if ltr { left + indent + used } else { right - indent - used };
                let hyphen = unit.hyphen.unwrap_or(0.0);
                let fits = used + unit.width - unit.trailing_width() + hyphen <= available + EPSILON;
                if draft.end == start {
                    let narrowed = left > floats.content_left() + EPSILON
                        || right < floats.content_left() + floats.content_width() - EPSILON;
                    if !fits && unit.has_content && narrowed {
                        if let Some(bottom) = floats.next_float_bottom_below(top) {
                            deferred = draft.deferred;
                            top = bottom;
                            continue 'position;
                        }
                    }
                } else if !fits && unit.has_content {
                    break;
                }
                for &id in &unit.out_of_flow {
                    draft.statics.push((id, x));
                }
                used += unit.width;
                draft.end += 1;
                if unit.forced_break.is_some() {
                    break;
                }
            }

            draft.left = left;
            draft.available = available;
            return draft;
        }
    }

    // ── Line assembly ───────────────────────────────────────────

    fn line_items(&self, draft: &Draft) -> Vec<LineItem> {
        let text = &self.paragraph.text;
        let base = self.base_level();
        let last_unit = draft.end - 1;
        let mut items = Vec::new();

        for (unit_index, unit) in self.units[draft.start..draft.end].iter().enumerate() {
            let unit_index = unit_index + draft.start;
            for (piece_index, piece) in unit.pieces.iter().enumerate() {
                let style = self.tree.style(piece.box_id);
                match piece.kind {
                    PieceKind::Text => {
                        let mut range = piece.range.clone();
                        let mut trailing_range = None;
                        if unit_index == last_unit {
                            if let Some((index, bytes, _)) = unit.trailing {
                                if index == piece_index {
                                    trailing_range = Some(range.end - bytes..range.end);
                                    range.end -= bytes;
                                }
                            }
                        }
                        for sub in split_by_level(self.levels, range) {
                            let slice = &text[sub.clone()];
                            let m = self.measurer.measure(slice, style, direction_of(self.levels[sub.start]));
                            items.push(LineItem {
                                level: self.levels[sub.start],
                                width: m.width,
                                overflow: m.glyph_overflow,
                                kind: RunKind::Text,
                                opportunities: 0,
                                piece: Piece {
                                    range: sub,
                                    ..piece.clone()
                                },
                            });
                        }
                        if let Some(range) = trailing_range {
                            let slice = &text[range.clone()];
                            let m = self.measurer.measure(slice, style, self.style.direction);
                            items.push(LineItem {
                                level: base,
                                width: m.width,
                                overflow: GlyphOverflow::default(),
                                kind: RunKind::TrailingSpace,
                                opportunities: 0,
                                piece: Piece {
                                    range,
                                    ..piece.clone()
                                },
                            });
                        }
                    }
                    PieceKind::Open => {
                        let level = self.levels.get(piece.range.start).copied().unwrap_or(base);
                        items.push(self.edge_item(piece, level, RunKind::InlineStart));
                    }
                    PieceKind::Close => {
                        let level = piece
                            .range
                            .start
                            .checked_sub(1)
                            .and_then(|i| self.levels.get(i).copied())
                            .unwrap_or(base);
                        items.push(self.edge_item(piece, level, RunKind::InlineEnd));
                    }
                    PieceKind::Atomic { .. } => {
                        let level = self.levels.get(piece.range.start).copied().unwrap_or(base);
                        items.push(self.edge_item(piece, level, RunKind::Atomic));
                    }
                    PieceKind::Break => {}
                }
            }
        }
        if let Some(item) = self.hyphen_item(draft) {
            items.push(item);
        }
        items
    }

    /// The hyphen closing a line that breaks inside a word.
    fn hyphen_item(&self, draft: &Draft) -> Option<LineItem> {
        if draft.end >= self.units.len() {
            return None;
        }
        let unit = &self.units[draft.end - 1];
        let width = unit.hyphen?;
        let last = unit.pieces.iter().rev().find(|p| p.kind == PieceKind::Text)?;
        let end = last.range.end;
        let level = end
            .checked_sub(1)
            .and_then(|i| self.levels.get(i).copied())
            .unwrap_or_else(|| self.base_level());
        Some(LineItem {
            piece: Piece {
                range: end..end,
                width,
                ..last.clone()
            },
            level,
            width,
            overflow: GlyphOverflow::default(),
            kind: RunKind::Hyphen,
            opportunities: 0,
        })
    }

    fn edge_item(&self, piece: &Piece, level: u8, kind: RunKind) -> LineItem {
        LineItem {
            piece: piece.clone(),
            level,
            width: piece.width,
            overflow: GlyphOverflow::default(),
            kind,
            opportunities: 0,
        }
    }

    /// Count justification opportunities per item; the final character of
    /// the line never expands.
    fn count_opportunities(&self, items: &mut [LineItem]) -> usize {
        let justify = self.style.text_justify;
        if justify == TextJustify::None {
            return 0;
        }
        let text = &self.paragraph.text;
        let mut positions: Vec<usize> = Vec::new();
        let mut last_char: Option<usize> = None;
        for (i, item) in items.iter().enumerate() {
            if item.kind != RunKind::Text {
                if matches!(item.piece.kind, PieceKind::Atomic { .. }) {
                    last_char = None;
                }
                continue;
            }
            for (_, c) in text[item.piece.range.clone()].char_indices() {
                if is_expansion_opportunity(c, justify) {
                    positions.push(i);
                    last_char = Some(positions.len() - 1);
                } else {
                    last_char = None;
                }
            }
        }
        if let Some(last) = last_char {
            positions.remove(last);
        }
        for &i in &positions {
            items[i].opportunities += 1;
        }
        positions.len()
    }

    fn assemble(&self, draft: &Draft, line_index: usize) -> LineBox {
        let text = &self.paragraph.text;
        let base = self.base_level();
        let mut items = self.line_items(draft);
        let opportunities = self.count_opportunities(&mut items);

        let ends_with_break = self.units[draft.end - 1].forced_break.is_some();
        let is_last = !self.units[draft.end..].iter().any(|u| u.has_content);
        let align = text_alignment_for_line(self.style, is_last || ends_with_break);

        let trailing: f64 = items.iter().filter(|i| i.is_trailing()).map(|i| i.width).sum();
        let total: f64 = items.iter().map(|i| i.width).sum();
        let alignment = align_line(align, self.style.direction, draft.available, total, trailing, opportunities);

        // Expansion per item, in logical order; the last opportunity takes the remainder.
        let mut expansions = vec![0.0; items.len()];
        if opportunities > 0 {
            let mut seen = 0;
            for (i, item) in items.iter().enumerate() {
                for _ in 0..item.opportunities {
                    seen += 1;
                    expansions[i] += if seen == opportunities {
                        alignment.last_expansion
                    } else {
                        alignment.expansion
                    };
                }
            }
        }

        // Visual order: reorder everything but the trailing space, which
        // sits at the visual end of the line.
        let ordered: Vec<usize> = (0..items.len()).filter(|&i| !items[i].is_trailing()).collect();
        let levels: Vec<u8> = ordered.iter().map(|&i| items[i].level).collect();
        let mut visual: Vec<usize> = crate::text::bidi::visual_order(&levels)
            .into_iter()
            .map(|k| ordered[k])
            .collect();
        let trailing_items: Vec<usize> = (0..items.len()).filter(|&i| items[i].is_trailing()).collect();
        if base == 0 {
            visual.extend(trailing_items);
        } else {
            let mut v = trailing_items;
            v.extend(visual);
            visual = v;
        }

        // Vertical metrics.
        let boxes: Vec<Option<VerticalBox>> = items.iter().map(|i| self.vertical_box(i)).collect();
        let present: Vec<VerticalBox> = boxes.iter().flatten().copied().collect();
        let metrics = line_metrics(self.strut, &present);
        let top = draft.top;

        let indent = if line_index == 0 && self.style.direction.is_ltr() {
            self.style.text_indent
        } else {
            0.0
        };
        let mut x = draft.left + indent + alignment.offset;
        let mut runs = Vec::with_capacity(items.len());
        let mut overflow = Rect::new(draft.left, top, draft.available, metrics.height());
        for &i in &visual {
            let item = &items[i];
            let width = if item.is_trailing() {
                alignment.trailing_space
            } else {
                item.width + expansions[i]
            };
            let (y, height) = match boxes[i] {
                Some(b) => (top + metrics.box_top(&b), b.height()),
                None => (top, 0.0),
            };
            let rect = Rect::new(x, y, width, height);
            if width > 0.0 || height > 0.0 {
                let painted = Rect::new(
                    rect.x - item.overflow.left,
                    rect.y - item.overflow.top,
                    rect.width + item.overflow.left + item.overflow.right,
                    rect.height + item.overflow.top + item.overflow.bottom,
                );
                overflow = overflow.union(&painted);
            }
            runs.push(PlacedRun {
                box_id: item.piece.box_id,
                kind: item.kind,
                text: match item.kind {
                    RunKind::Text | RunKind::TrailingSpace => text[item.piece.range.clone()].replace(SOFT_HYPHEN, ""),
                    RunKind::Hyphen => "-".to_string(),
                    _ => String::new(),
                },
                start: item.piece.range.start,
                end: item.piece.range.end,
                level: item.level,
                direction: direction_of(item.level),
                rect,
                expansion: expansions[i],
            });
            x += width;
        }

        let mut line = LineBox {
            runs,
            left: draft.left,
            available_width: draft.available,
            top,
            bottom: top + metrics.height(),
            baseline: top + metrics.above,
            bidi_level: base,
            ends_with_break,
            pagination_strut: 0.0,
            is_first_after_break: false,
            visual_overflow: overflow,
        };
        if self.style.text_overflow == TextOverflow::Ellipsis && self.style.overflow != Overflow::Visible {
            self.truncate_with_ellipsis(&mut line);
        }
        line
    }

    // ── Text overflow ───────────────────────────────────────────

    /// Cut a line whose content runs past its end edge and close it with
    /// an ellipsis at the point of truncation.
    fn truncate_with_ellipsis(&self, line: &mut LineBox) {
        let ltr = self.style.direction.is_ltr();
        let end_edge = if ltr { line.left + line.available_width } else { line.left };
        let mut content = line
            .runs
            .iter()
            .filter(|r| r.kind != RunKind::TrailingSpace && r.rect.width > 0.0);
        let overflows = if ltr {
            content.any(|r| r.rect.right() > end_edge + EPSILON)
        } else {
            content.any(|r| r.rect.x < end_edge - EPSILON)
        };
        if !overflows {
            return;
        }

        let ellipsis = self.measure(ELLIPSIS, self.style);
        let limit = if ltr { end_edge - ellipsis } else { end_edge + ellipsis };
        let mut runs = std::mem::take(&mut line.runs);
        if !ltr {
            runs.reverse();
        }
        let mut reach = runs
            .first()
            .map(|r| if ltr { r.rect.x } else { r.rect.right() })
            .unwrap_or(if ltr { line.left } else { line.left + line.available_width });
        let mut kept: Vec<PlacedRun> = Vec::new();
        for run in runs {
            if run.kind == RunKind::TrailingSpace {
                continue;
            }
            let room = if ltr { limit - run.rect.x } else { run.rect.right() - limit };
            let fits = run.rect.width <= room + EPSILON;
            let run = if fits {
                run
            } else if run.kind == RunKind::Text {
                match self.truncate_run(run, room, ltr) {
                    Some(cut) => cut,
                    None => break,
                }
            } else {
                break;
            };
            reach = if ltr { run.rect.right() } else { run.rect.x };
            kept.push(run);
            if !fits {
                break;
            }
        }

        let (above, below) = self.strut;
        let offset = kept.iter().map(|r| r.end).max().unwrap_or(0);
        let x = if ltr { reach } else { reach - ellipsis };
        let marker = PlacedRun {
            box_id: self.container,
            kind: RunKind::Ellipsis,
            text: ELLIPSIS.to_string(),
            start: offset,
            end: offset,
            level: self.base_level(),
            direction: self.style.direction,
            rect: Rect::new(x, line.baseline - above, ellipsis, above + below),
            expansion: 0.0,
        };
        if ltr {
            kept.push(marker);
        } else {
            kept.reverse();
            kept.insert(0, marker);
        }

        let left = kept.iter().map(|r| r.rect.x).fold(line.left, f64::min);
        let right = kept
            .iter()
            .map(|r| r.rect.right())
            .fold(line.left + line.available_width, f64::max);
        line.visual_overflow.x = left;
        line.visual_overflow.width = right - left;
        line.runs = kept;
    }

    /// Keep the part of a text run nearest the line's start edge that fits
    /// in `room`.
    fn truncate_run(&self, run: PlacedRun, room: f64, ltr: bool) -> Option<PlacedRun> {
        let text = &self.paragraph.text;
        let style = self.tree.style(run.box_id);
        let slice = &text[run.start..run.end];
        let keep_prefix = run.direction == self.style.direction;
        let width = |s: &str| self.measurer.measure(s, style, run.direction).width;

        let mut best: Option<(Range<usize>, f64)> = None;
        for (b, _) in slice.char_indices().skip(1) {
            let range = if keep_prefix { 0..b } else { b..slice.len() };
            let w = width(&slice[range.clone()]);
            if w <= room + EPSILON {
                best = Some((range, w));
                if !keep_prefix {
                    break;
                }
            } else if keep_prefix {
                break;
            }
        }
        let (range, w) = best?;
        let x = if ltr { run.rect.x } else { run.rect.right() - w };
        Some(PlacedRun {
            text: slice[range.clone()].replace(SOFT_HYPHEN, ""),
            start: run.start + range.start,
            end: run.start + range.end,
            rect: Rect::new(x, run.rect.y, w, run.rect.height),
            expansion: 0.0,
            ..run
        })
    }

    fn vertical_box(&self, item: &LineItem) -> Option<VerticalBox> {
        let (above, below) = match item.piece.kind {
            PieceKind::Text => {
                let style = self.tree.style(item.piece.box_id);
                leading_box(style, self.measurer.font_metrics(style))
            }
            PieceKind::Atomic { height } => (height, 0.0),
            PieceKind::Open | PieceKind::Close | PieceKind::Break => return None,
        };
        let (align, parent) = self.effective_vertical_align(item.piece.box_id);
        let parent_style = self.tree.style(parent);
        Some(align_box(
            align,
            above,
            below,
            parent_style.font_size,
            self.measurer.font_metrics(parent_style),
        ))
    }

    /// The `vertical-align` that positions a box, looking through the
    /// inline ancestors that are themselves baseline-aligned. Returns the
    /// value and the box it is relative to.
    fn effective_vertical_align(&self, id: BoxId) -> (VerticalAlign, BoxId) {
        let mut current = id;
        loop {
            let parent = self.tree.parent(current).unwrap_or(self.container);
            let align = self.tree.style(current).vertical_align;
            if align != VerticalAlign::Baseline
                || parent == self.container
                || !matches!(self.tree.kind(parent), BoxKind::Inline)
            {
                return (align, parent);
            }
            current = parent;
        }
    }
}

fn direction_of(level: u8) -> Direction {
    if level % 2 == 0 {
        Direction::Ltr
    } else {
        Direction::Rtl
    }
}

/// Split a byte range into maximal runs of equal embedding level.
fn split_by_level(levels: &[u8], range: Range<usize>) -> Vec<Range<usize>> {
    let mut out = Vec::new();
    if range.is_empty() {
        return out;
    }
    let mut start = range.start;
    for i in range.start + 1..range.end {
        if levels[i] != levels[start] {
            out.push(start..i);
            start = i;
        }
    }
    out.push(start..range.end);
    out
}

fn translate_line(line: &mut LineBox, dy: f64) {
    line.top += dy;
    line.bottom += dy;
    line.baseline += dy;
    line.visual_overflow = line.visual_overflow.translate(0.0, dy);
    for run in &mut line.runs {
        run.rect = run.rect.translate(0.0, dy);
    }
}
