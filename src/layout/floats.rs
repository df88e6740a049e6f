//! # Float Placement
//!
//! Tracks the floats of one block formatting context, in the coordinate
//! space of the container currently being laid out (its border box). A
//! child block that doesn't establish a new formatting context receives the
//! floats of its parent translated into its own space, and hands the floats
//! it placed itself back up when it's done.
//!
//! A float is placed by scanning downward band by band: at each candidate
//! top, the float fits if the space between the left and right floats that
//! overlap its height is wide enough. Otherwise the candidate moves to the
//! next float bottom.

use serde::Serialize;

use crate::geometry::{Point, Rect, Size};
use crate::model::tree::BoxId;
use crate::style::{Clear, Direction, Float};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FloatSide {
    Left,
    Right,
}

impl FloatSide {
    /// Physical side of a `float` value in a container of `direction`.
    pub fn resolve(float: Float, direction: Direction) -> Option<FloatSide> {
        match (float, direction) {
            (Float::None, _) => None,
            (Float::Left, _) => Some(FloatSide::Left),
            (Float::Right, _) => Some(FloatSide::Right),
            (Float::InlineStart, Direction::Ltr) | (Float::InlineEnd, Direction::Rtl) => {
                Some(FloatSide::Left)
            }
            (Float::InlineStart, Direction::Rtl) | (Float::InlineEnd, Direction::Ltr) => {
                Some(FloatSide::Right)
            }
        }
    }

    fn cleared_by(self, clear: Clear) -> bool {
        match self {
            FloatSide::Left => clear.clears_left(),
            FloatSide::Right => clear.clears_right(),
        }
    }
}

/// A placed float.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FloatEntry {
    pub box_id: BoxId,
    pub side: FloatSide,
    /// Margin box, in the manager's coordinate space.
    pub rect: Rect,
    pub pagination_strut: f64,
    /// Index of the line during whose construction the float was placed.
    pub originating_line: Option<usize>,
    /// Placed by an ancestor rather than by the container that owns this
    /// manager.
    #[serde(skip)]
    pub intruding: bool,
}

/// Position in the float list, for rolling back floats placed by a line
/// that gets laid out again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FloatMark(usize);

#[derive(Debug, Clone)]
pub struct FloatManager {
    content_left: f64,
    content_right: f64,
    floats: Vec<FloatEntry>,
}

impl FloatManager {
    pub fn new(content_left: f64, content_width: f64) -> Self {
        Self {
            content_left,
            content_right: content_left + content_width.max(0.0),
            floats: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.floats.is_empty()
    }

    pub fn floats(&self) -> &[FloatEntry] {
        &self.floats
    }

    pub fn content_left(&self) -> f64 {
        self.content_left
    }

    pub fn content_width(&self) -> f64 {
        self.content_right - self.content_left
    }

    /// Floats placed by this container itself.
    pub fn own_floats(&self) -> impl Iterator<Item = &FloatEntry> {
        self.floats.iter().filter(|f| !f.intruding)
    }

    fn overlaps(rect: &Rect, top: f64, height: f64) -> bool {
        if height <= 0.0 {
            rect.y <= top && top < rect.bottom()
        } else {
            rect.y < top + height && rect.bottom() > top
        }
    }

    /// Left and right edges of the space left by floats over the band
    /// `[top, top + height)`. A zero height queries a single point.
    pub fn line_offsets(&self, top: f64, height: f64) -> (f64, f64) {
        let mut left = self.content_left;
        let mut right = self.content_right;
        for f in &self.floats {
            if !Self::overlaps(&f.rect, top, height) {
                continue;
            }
            match f.side {
                FloatSide::Left => left = left.max(f.rect.right()),
                FloatSide::Right => right = right.min(f.rect.x),
            }
        }
        (left, right)
    }

    /// Width left by floats over the band `[top, top + height)`.
    pub fn available_width(&self, top: f64, height: f64) -> f64 {
        let (left, right) = self.line_offsets(top, height);
        (right - left).max(0.0)
    }

    /// Lowest bottom of the floats a `clear` value clears, if any.
    pub fn clear(&self, clear: Clear) -> Option<f64> {
        self.floats
            .iter()
            .filter(|f| f.side.cleared_by(clear))
            .map(|f| f.rect.bottom())
            .fold(None, |acc: Option<f64>, b| Some(acc.map_or(b, |a| a.max(b))))
    }

    pub fn lowest_float_bottom(&self) -> Option<f64> {
        self.clear(Clear::Both)
    }

    /// The nearest float bottom strictly below `y`.
    pub fn next_float_bottom_below(&self, y: f64) -> Option<f64> {
        self.floats
            .iter()
            .map(|f| f.rect.bottom())
            .filter(|&b| b > y)
            .fold(None, |acc: Option<f64>, b| Some(acc.map_or(b, |a| a.min(b))))
    }

    /// Where a float's margin box of `size` would go if inserted at
    /// `logical_top`.
    pub fn find_position(&self, side: FloatSide, size: Size, logical_top: f64, clear: Clear) -> Point {
        let mut top = logical_top;
        // A float never starts above one placed before it.
        if let Some(last_top) = self.floats.iter().map(|f| f.rect.y).reduce(f64::max) {
            top = top.max(last_top);
        }
        if let Some(clear_y) = self.clear(clear) {
            top = top.max(clear_y);
        }

        let mut iterations = 0;
        loop {
            let (left, right) = self.line_offsets(top, size.height);
            if right - left >= size.width - 1e-9 {
                let x = match side {
                    FloatSide::Left => left,
                    FloatSide::Right => right - size.width,
                };
                return Point { x, y: top };
            }
            iterations += 1;
            match self.next_float_bottom_below(top) {
                Some(bottom) if iterations <= self.floats.len() + 1 => top = bottom,
                _ => break,
            }
        }

        // No band admits it: drop below every float.
        log::debug!(
            "float of width {:.2} fits no band from {:.2}; placing below all floats",
            size.width,
            logical_top
        );
        let top = self.lowest_float_bottom().map_or(top, |b| top.max(b));
        let x = match side {
            FloatSide::Left => self.content_left,
            FloatSide::Right => self.content_right - size.width,
        };
        Point { x, y: top }
    }

    /// Place a float and record it. Returns its margin box.
    pub fn insert(&mut self, box_id: BoxId, side: FloatSide, size: Size, logical_top: f64, clear: Clear) -> Rect {
        let at = self.find_position(side, size, logical_top, clear);
        let rect = Rect::new(at.x, at.y, size.width, size.height);
        self.push(FloatEntry {
            box_id,
            side,
            rect,
            pagination_strut: 0.0,
            originating_line: None,
            intruding: false,
        });
        rect
    }

    pub fn push(&mut self, entry: FloatEntry) {
        self.floats.push(entry);
    }

    /// Delete every float whose top is at or below `y`.
    pub fn remove_below(&mut self, y: f64) {
        self.floats.retain(|f| f.rect.y < y);
    }

    pub fn mark(&self) -> FloatMark {
        FloatMark(self.floats.len())
    }

    /// Undo floats inserted after `mark` whose top is at or below `y`.
    /// Returns the removed floats.
    pub fn rollback(&mut self, mark: FloatMark, y: f64) -> Vec<FloatEntry> {
        let mut removed = Vec::new();
        let mut index = 0;
        self.floats.retain(|f| {
            let keep = index < mark.0 || f.rect.y < y;
            if !keep {
                removed.push(f.clone());
            }
            index += 1;
            keep
        });
        removed
    }

    /// The floats of this manager as seen from a child whose border box
    /// sits at `(dx, dy)`, with the child's own content edges.
    pub fn intruding_into(&self, dx: f64, dy: f64, content_left: f64, content_width: f64) -> FloatManager {
        let mut child = FloatManager::new(content_left, content_width);
        child.floats = self
            .floats
            .iter()
            .map(|f| FloatEntry {
                rect: f.rect.translate(-dx, -dy),
                intruding: true,
                originating_line: None,
                ..f.clone()
            })
            .collect();
        child
    }

    /// Take over the floats a child at `(dx, dy)` placed itself. They keep
    /// affecting content after the child.
    pub fn adopt_overhanging(&mut self, child: &FloatManager, dx: f64, dy: f64) {
        for f in child.own_floats() {
            self.floats.push(FloatEntry {
                rect: f.rect.translate(dx, dy),
                intruding: false,
                originating_line: None,
                ..f.clone()
            });
        }
    }
}
