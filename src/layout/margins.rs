//! # Margin Collapsing
//!
//! Adjoining block margins collapse into one: the largest positive margin
//! minus the largest-magnitude negative margin. Margins are tracked as
//! separate positive and negative maxima so that any number of them can be
//! folded together in any order.
//!
//! A container threads one `MarginInfo` through its children. It holds the
//! margin still pending below the previous child, and whether the container
//! is still at its top (or bottom) edge with nothing separating it from its
//! children, in which case child margins collapse through into the
//! container's own.

use serde::Serialize;

/// The collapsed margins of a box, split by sign. Frozen once the box's
/// layout is finished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarginValues {
    pub positive_before: f64,
    pub negative_before: f64,
    pub positive_after: f64,
    pub negative_after: f64,
}

impl MarginValues {
    /// Split a pair of resolved margins into positive and negative parts.
    pub fn from_margins(before: f64, after: f64) -> Self {
        Self {
            positive_before: before.max(0.0),
            negative_before: (-before).max(0.0),
            positive_after: after.max(0.0),
            negative_after: (-after).max(0.0),
        }
    }

    pub fn collapsed_before(&self) -> f64 {
        self.positive_before - self.negative_before
    }

    pub fn collapsed_after(&self) -> f64 {
        self.positive_after - self.negative_after
    }
}

/// Collapse two margins: `max(positives) - max(|negatives|)`.
pub fn collapse(a: f64, b: f64) -> f64 {
    a.max(b).max(0.0) - (-a).max(-b).max(0.0)
}

/// Running margin state while a container lays out its children.
#[derive(Debug, Clone)]
pub struct MarginInfo {
    at_before_side: bool,
    at_after_side: bool,
    can_collapse_before_with_children: bool,
    can_collapse_after_with_children: bool,
    /// Cleared after a self-collapsing child with clearance: what follows
    /// may not collapse through the container's bottom.
    can_collapse_with_last_child: bool,
    positive: f64,
    negative: f64,
}

impl MarginInfo {
    pub fn new(own: &MarginValues, can_collapse_before: bool, can_collapse_after: bool) -> Self {
        let (positive, negative) = if can_collapse_before {
            (own.positive_before, own.negative_before)
        } else {
            (0.0, 0.0)
        };
        Self {
            at_before_side: true,
            at_after_side: false,
            can_collapse_before_with_children: can_collapse_before,
            can_collapse_after_with_children: can_collapse_after,
            can_collapse_with_last_child: true,
            positive,
            negative,
        }
    }

    pub fn at_before_side(&self) -> bool {
        self.at_before_side
    }

    pub fn set_at_before_side(&mut self, value: bool) {
        self.at_before_side = value;
    }

    pub fn can_collapse_with_margin_before(&self) -> bool {
        self.at_before_side && self.can_collapse_before_with_children
    }

    pub fn can_collapse_with_margin_after(&self) -> bool {
        self.at_after_side && self.can_collapse_after_with_children && self.can_collapse_with_last_child
    }

    /// The margin pending below the last child.
    pub fn margin(&self) -> f64 {
        self.positive - self.negative
    }

    pub fn positive(&self) -> f64 {
        self.positive
    }

    pub fn negative(&self) -> f64 {
        self.negative
    }

    pub fn set_margin(&mut self, positive: f64, negative: f64) {
        self.positive = positive;
        self.negative = negative;
    }

    pub fn clear_margin(&mut self) {
        self.positive = 0.0;
        self.negative = 0.0;
    }
}

/// Guess where a child's border box will start before its own margins are
/// known in full (only its declared margin-before is).
pub fn estimate_top(info: &MarginInfo, child_margin_before: f64, logical_height: f64) -> f64 {
    if info.can_collapse_with_margin_before() {
        return logical_height;
    }
    let pos = child_margin_before.max(0.0);
    let neg = (-child_margin_before).max(0.0);
    logical_height + info.positive.max(pos) - info.negative.max(neg)
}

/// Collapse a laid-out child's margins with the pending margin. Returns the
/// child's logical top; advances `logical_height` past the collapsed margin.
///
/// When the container is still at its top edge and may collapse with its
/// children, the child's before margin becomes part of the container's own
/// (`own`), and the child sits at `logical_height`.
pub fn collapse_margins(
    info: &mut MarginInfo,
    own: &mut MarginValues,
    child: &MarginValues,
    child_self_collapsing: bool,
    logical_height: &mut f64,
) -> f64 {
    let mut pos_top = child.positive_before;
    let mut neg_top = child.negative_before;
    if child_self_collapsing {
        pos_top = pos_top.max(child.positive_after);
        neg_top = neg_top.max(child.negative_after);
    }

    if info.can_collapse_with_margin_before() {
        own.positive_before = own.positive_before.max(pos_top);
        own.negative_before = own.negative_before.max(neg_top);
    }

    let mut top = *logical_height;
    if child_self_collapsing {
        // The top and bottom margins meet: fold both into the pending margin
        // and keep going. Position the box where the collapsed top margin
        // would put it.
        let collapsed_pos = info.positive.max(child.positive_before);
        let collapsed_neg = info.negative.max(child.negative_before);
        info.set_margin(collapsed_pos, collapsed_neg);
        info.positive = info.positive.max(child.positive_after);
        info.negative = info.negative.max(child.negative_after);
        if !info.can_collapse_with_margin_before() {
            top = *logical_height + collapsed_pos - collapsed_neg;
        }
    } else {
        if !info.at_before_side || !info.can_collapse_before_with_children {
            *logical_height += info.positive.max(pos_top) - info.negative.max(neg_top);
            top = *logical_height;
        }
        info.set_margin(child.positive_after, child.negative_after);
        info.can_collapse_with_last_child = true;
    }
    top
}

/// Apply clearance to a child placed at `top` whose border box must start
/// at or below `clear_to`. Returns the new top.
///
/// `saved_own_before` is the container's own before margin from before this
/// child was collapsed: once a child has clearance, the container no longer
/// collapses with it.
pub fn clear_floats_if_needed(
    info: &mut MarginInfo,
    own: &mut MarginValues,
    saved_own_before: (f64, f64),
    child: &MarginValues,
    child_self_collapsing: bool,
    top: f64,
    clear_to: Option<f64>,
    logical_height: &mut f64,
) -> f64 {
    let delta = match clear_to {
        Some(bottom) => (bottom - top).max(0.0),
        None => 0.0,
    };
    if delta <= 0.0 {
        return top;
    }

    if child_self_collapsing {
        // Its margins still collapse with following siblings, but not
        // through the container's bottom.
        info.set_margin(
            child.positive_before.max(child.positive_after),
            child.negative_before.max(child.negative_after),
        );
        info.can_collapse_with_last_child = false;
        *logical_height = top + delta + child.negative_before;
    } else {
        *logical_height += delta;
    }

    if info.can_collapse_with_margin_before() {
        own.positive_before = saved_own_before.0;
        own.negative_before = saved_own_before.1;
        info.at_before_side = false;
    }
    top + delta
}

/// Close the container after its last child: add the pending margin unless
/// it collapses through the bottom, add bottom border and padding, and
/// record the container's own collapsed after margin.
pub fn handle_after_side(
    info: &mut MarginInfo,
    own: &mut MarginValues,
    logical_height: &mut f64,
    border_padding_before: f64,
    border_padding_after: f64,
) {
    info.at_after_side = true;

    if !info.can_collapse_with_margin_after() && !info.can_collapse_with_margin_before() {
        *logical_height += info.margin();
    }
    *logical_height += border_padding_after;
    // Negative margins can't shrink a box below its border and padding.
    *logical_height = logical_height.max(border_padding_before + border_padding_after);

    if info.can_collapse_with_margin_after() && !info.can_collapse_with_margin_before() {
        own.positive_after = own.positive_after.max(info.positive);
        own.negative_after = own.negative_after.max(info.negative);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn child(before: f64, after: f64) -> MarginValues {
        MarginValues::from_margins(before, after)
    }

    #[test]
    fn collapse_takes_largest_positive_minus_largest_negative() {
        assert_eq!(collapse(20.0, 10.0), 20.0);
        assert_eq!(collapse(20.0, -5.0), 15.0);
        assert_eq!(collapse(-20.0, -5.0), -20.0);
    }

    #[test]
    fn sibling_margins_collapse_to_the_larger() {
        // Container with padding: no collapsing through it.
        let mut own = MarginValues::default();
        let mut info = MarginInfo::new(&own, false, false);
        let mut height = 0.0;

        let first = child(0.0, 20.0);
        let top = collapse_margins(&mut info, &mut own, &first, false, &mut height);
        assert_eq!(top, 0.0);
        info.set_at_before_side(false);
        height = top + 50.0;

        let second = child(10.0, 0.0);
        let top = collapse_margins(&mut info, &mut own, &second, false, &mut height);
        assert_eq!(top, 70.0);
    }

    #[test]
    fn negative_margin_pulls_sibling_up() {
        let mut own = MarginValues::default();
        let mut info = MarginInfo::new(&own, false, false);
        let mut height = 0.0;
        collapse_margins(&mut info, &mut own, &child(0.0, 20.0), false, &mut height);
        info.set_at_before_side(false);
        height = 50.0;
        let top = collapse_margins(&mut info, &mut own, &child(-30.0, 0.0), false, &mut height);
        assert_eq!(top, 40.0);
    }

    #[test]
    fn first_child_margin_collapses_through_parent() {
        let mut own = MarginValues::from_margins(5.0, 0.0);
        let mut info = MarginInfo::new(&own, true, true);
        let mut height = 0.0;
        let top = collapse_margins(&mut info, &mut own, &child(12.0, 0.0), false, &mut height);
        assert_eq!(top, 0.0);
        assert_eq!(own.positive_before, 12.0);
    }

    #[test]
    fn border_stops_collapsing_through_parent() {
        let mut own = MarginValues::from_margins(5.0, 0.0);
        let mut info = MarginInfo::new(&own, false, false);
        let mut height = 2.0; // border-top
        let top = collapse_margins(&mut info, &mut own, &child(12.0, 0.0), false, &mut height);
        assert_eq!(top, 14.0);
        assert_eq!(own.positive_before, 5.0);
    }

    #[test]
    fn self_collapsing_child_folds_both_margins() {
        let mut own = MarginValues::default();
        let mut info = MarginInfo::new(&own, false, false);
        let mut height = 0.0;
        collapse_margins(&mut info, &mut own, &child(0.0, 10.0), false, &mut height);
        info.set_at_before_side(false);
        height = 30.0;
        // empty block with margins 15 / 25
        collapse_margins(&mut info, &mut own, &child(15.0, 25.0), true, &mut height);
        assert_eq!(info.margin(), 25.0);
        let top = collapse_margins(&mut info, &mut own, &child(5.0, 0.0), false, &mut height);
        assert_eq!(top, 55.0);
    }

    #[test]
    fn last_child_margin_collapses_through_bottom() {
        let mut own = MarginValues::from_margins(0.0, 8.0);
        let mut info = MarginInfo::new(&own, true, true);
        let mut height = 0.0;
        collapse_margins(&mut info, &mut own, &child(0.0, 20.0), false, &mut height);
        info.set_at_before_side(false);
        height = 40.0;
        handle_after_side(&mut info, &mut own, &mut height, 0.0, 0.0);
        assert_eq!(height, 40.0);
        assert_eq!(own.positive_after, 20.0);
    }

    #[test]
    fn padding_keeps_last_margin_inside() {
        let mut own = MarginValues::default();
        let mut info = MarginInfo::new(&own, false, false);
        let mut height = 0.0;
        collapse_margins(&mut info, &mut own, &child(0.0, 20.0), false, &mut height);
        info.set_at_before_side(false);
        height = 40.0;
        handle_after_side(&mut info, &mut own, &mut height, 0.0, 3.0);
        assert_eq!(height, 63.0);
        assert_eq!(own.positive_after, 0.0);
    }

    #[test]
    fn clearance_moves_child_and_stops_collapsing_through() {
        let mut own = MarginValues::default();
        let saved = (own.positive_before, own.negative_before);
        let mut info = MarginInfo::new(&own, true, true);
        let mut height = 0.0;
        let c = child(10.0, 0.0);
        let top = collapse_margins(&mut info, &mut own, &c, false, &mut height);
        assert_eq!(own.positive_before, 10.0);
        let cleared = clear_floats_if_needed(&mut info, &mut own, saved, &c, false, top, Some(30.0), &mut height);
        assert_eq!(cleared, 30.0);
        assert_eq!(height, 30.0);
        assert_eq!(own.positive_before, 0.0);
        assert!(!info.at_before_side());
    }

    #[test]
    fn estimate_uses_pending_margin() {
        let own = MarginValues::default();
        let mut info = MarginInfo::new(&own, false, false);
        info.set_at_before_side(false);
        info.set_margin(20.0, 0.0);
        assert_eq!(estimate_top(&info, 10.0, 50.0), 70.0);
    }
}
