//! # Line Positioning
//!
//! Places a finished line horizontally (text alignment, justification) and
//! vertically (baseline alignment of the inline boxes on it).
//!
//! Horizontal placement works on the line's total width and its trailing
//! space run. Hanging trailing space may be clipped so that a line that
//! only overflows by its trailing space still aligns as if it fit, and wide
//! lines spill out on the side their direction dictates.

use crate::style::{Direction, ResolvedStyle, TextAlign, TextAlignLast, VerticalAlign};
use crate::text::FontMetrics;

/// The alignment that applies to a line.
///
/// `text-align-last` governs the last line of a paragraph and every line
/// that ends in a forced break. Its `auto` value follows `text-align`,
/// except that `justify` turns into `start`.
pub fn text_alignment_for_line(style: &ResolvedStyle, ends_paragraph_or_forced: bool) -> TextAlign {
    if !ends_paragraph_or_forced {
        return style.text_align;
    }
    match style.text_align_last {
        TextAlignLast::Auto => match style.text_align {
            TextAlign::Justify => TextAlign::Start,
            other => other,
        },
        TextAlignLast::Start => TextAlign::Start,
        TextAlignLast::End => TextAlign::End,
        TextAlignLast::Left => TextAlign::Left,
        TextAlignLast::Right => TextAlign::Right,
        TextAlignLast::Center => TextAlign::Center,
        TextAlignLast::Justify => TextAlign::Justify,
    }
}

/// Result of horizontal alignment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HorizontalAlignment {
    /// Offset of the line's left edge from the left of the available space.
    pub offset: f64,
    /// Width left to the trailing space run after clipping.
    pub trailing_space: f64,
    /// Space added at every justification opportunity but the last.
    pub expansion: f64,
    /// Space added at the last opportunity, which absorbs rounding.
    pub last_expansion: f64,
}

/// Horizontal placement of a line.
///
/// `total_width` includes `trailing_space`, the width of the line's
/// trailing collapsible space. `opportunities` counts the justification
/// opportunities outside that trailing space.
pub fn align_line(
    align: TextAlign,
    direction: Direction,
    available: f64,
    total_width: f64,
    trailing_space: f64,
    opportunities: usize,
) -> HorizontalAlignment {
    let ltr = direction.is_ltr();
    let mut result = HorizontalAlignment {
        offset: 0.0,
        trailing_space,
        expansion: 0.0,
        last_expansion: 0.0,
    };

    let physical = match align {
        TextAlign::Justify => {
            if opportunities > 0 {
                let content = total_width - trailing_space;
                result.trailing_space = 0.0;
                let extra = available - content;
                if extra > 0.0 {
                    let per = (extra / opportunities as f64 * 64.0).floor() / 64.0;
                    result.expansion = per;
                    result.last_expansion = extra - per * (opportunities - 1) as f64;
                }
                return result;
            }
            if ltr {
                TextAlign::Left
            } else {
                TextAlign::Right
            }
        }
        TextAlign::Start => {
            if ltr {
                TextAlign::Left
            } else {
                TextAlign::Right
            }
        }
        TextAlign::End => {
            if ltr {
                TextAlign::Right
            } else {
                TextAlign::Left
            }
        }
        other => other,
    };

    match physical {
        TextAlign::Left => {
            if ltr {
                if total_width > available {
                    result.trailing_space = (trailing_space - total_width + available).max(0.0);
                }
            } else if trailing_space > 0.0 {
                result.trailing_space = 0.0;
            } else if total_width > available {
                result.offset -= total_width - available;
            }
        }
        TextAlign::Right => {
            if ltr {
                let content = total_width - trailing_space;
                result.trailing_space = 0.0;
                if content < available {
                    result.offset += available - content;
                }
            } else if total_width > available && trailing_space > 0.0 {
                result.trailing_space = (trailing_space - total_width + available).max(0.0);
            } else {
                result.offset += available - total_width;
            }
        }
        TextAlign::Center => {
            let content = total_width - trailing_space;
            let trailing = if trailing_space > 0.0 {
                trailing_space.min((available - content) / 2.0).max(0.0)
            } else {
                0.0
            };
            result.trailing_space = trailing;
            if ltr {
                result.offset += ((available - content) / 2.0).max(0.0);
            } else if content > available {
                result.offset += available - content;
            } else {
                result.offset += (available - content) / 2.0 - trailing;
            }
        }
        // Start, end and justify were mapped to physical sides above.
        TextAlign::Start | TextAlign::End | TextAlign::Justify => {}
    }
    result
}

/// The vertical extent of one inline box around the baseline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VerticalBox {
    /// Distance from the baseline to the top of the box (after shifting).
    pub above: f64,
    /// Distance from the baseline to the bottom of the box.
    pub below: f64,
    pub anchor: VerticalAnchor,
}

impl VerticalBox {
    pub fn height(&self) -> f64 {
        self.above + self.below
    }
}

/// Boxes aligned to the line box edges are placed after everything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerticalAnchor {
    Baseline,
    LineTop,
    LineBottom,
}

/// Half-leading model: the box's line height is split evenly above the
/// ascent and below the descent.
pub fn leading_box(style: &ResolvedStyle, metrics: FontMetrics) -> (f64, f64) {
    let natural = metrics.height();
    let line_height = style.computed_line_height(natural);
    let half_leading = (line_height - natural) / 2.0;
    (metrics.ascent + half_leading, metrics.descent + half_leading)
}

/// Place a box of the given extent according to `vertical-align`, relative
/// to its parent's font.
pub fn align_box(
    align: VerticalAlign,
    above: f64,
    below: f64,
    parent_font_size: f64,
    parent_metrics: FontMetrics,
) -> VerticalBox {
    let height = above + below;
    let shifted = |shift: f64| VerticalBox {
        above: above + shift,
        below: below - shift,
        anchor: VerticalAnchor::Baseline,
    };
    match align {
        VerticalAlign::Baseline => shifted(0.0),
        VerticalAlign::Sub => shifted(-(parent_font_size / 5.0 + 1.0)),
        VerticalAlign::Super => shifted(parent_font_size / 3.0 + 1.0),
        VerticalAlign::Length(l) => shifted(l),
        VerticalAlign::Middle => {
            // Midpoint sits half an x-height (taken as half an em) above the baseline.
            let mid = parent_font_size / 4.0;
            VerticalBox {
                above: height / 2.0 + mid,
                below: height / 2.0 - mid,
                anchor: VerticalAnchor::Baseline,
            }
        }
        VerticalAlign::TextTop => VerticalBox {
            above: parent_metrics.ascent,
            below: height - parent_metrics.ascent,
            anchor: VerticalAnchor::Baseline,
        },
        VerticalAlign::TextBottom => VerticalBox {
            above: height - parent_metrics.descent,
            below: parent_metrics.descent,
            anchor: VerticalAnchor::Baseline,
        },
        VerticalAlign::Top => VerticalBox {
            above,
            below,
            anchor: VerticalAnchor::LineTop,
        },
        VerticalAlign::Bottom => VerticalBox {
            above,
            below,
            anchor: VerticalAnchor::LineBottom,
        },
    }
}

/// Vertical metrics of a line: how far it extends above and below its
/// baseline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineMetrics {
    pub above: f64,
    pub below: f64,
}

impl LineMetrics {
    pub fn height(&self) -> f64 {
        self.above + self.below
    }

    /// Offset of a box's top from the line top.
    pub fn box_top(&self, b: &VerticalBox) -> f64 {
        match b.anchor {
            VerticalAnchor::Baseline => self.above - b.above,
            VerticalAnchor::LineTop => 0.0,
            VerticalAnchor::LineBottom => self.height() - b.height(),
        }
    }
}

/// Combine the root strut with every box on the line. Baseline-relative
/// boxes are merged first; boxes anchored to the line edges then grow the
/// line on the far side if they are taller than it.
pub fn line_metrics(strut: (f64, f64), boxes: &[VerticalBox]) -> LineMetrics {
    let mut metrics = LineMetrics {
        above: strut.0,
        below: strut.1,
    };
    for b in boxes.iter().filter(|b| b.anchor == VerticalAnchor::Baseline) {
        metrics.above = metrics.above.max(b.above);
        metrics.below = metrics.below.max(b.below);
    }
    for b in boxes.iter().filter(|b| b.anchor != VerticalAnchor::Baseline) {
        let overflow = b.height() - metrics.height();
        if overflow > 0.0 {
            match b.anchor {
                VerticalAnchor::LineTop => metrics.below += overflow,
                _ => metrics.above += overflow,
            }
        }
    }
    metrics
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::{Style, TextAlign};

    fn metrics(ascent: f64, descent: f64) -> FontMetrics {
        FontMetrics { ascent, descent }
    }

    #[test]
    fn justify_distributes_extra_space() {
        let a = align_line(TextAlign::Justify, Direction::Ltr, 200.0, 175.0, 5.0, 3);
        assert_eq!(a.expansion, 10.0);
        assert_eq!(a.last_expansion, 10.0);
        assert_eq!(a.trailing_space, 0.0);
        let total = 170.0 + a.expansion * 2.0 + a.last_expansion;
        assert_eq!(total, 200.0);
    }

    #[test]
    fn justify_remainder_goes_to_last_opportunity() {
        let a = align_line(TextAlign::Justify, Direction::Ltr, 100.0, 90.0, 0.0, 3);
        assert!(a.expansion <= 10.0 / 3.0);
        assert!((a.expansion * 2.0 + a.last_expansion - 10.0).abs() < 1e-9);
    }

    #[test]
    fn justify_without_opportunities_falls_back_to_start() {
        let a = align_line(TextAlign::Justify, Direction::Rtl, 100.0, 40.0, 0.0, 0);
        assert_eq!(a.offset, 60.0);
        assert_eq!(a.expansion, 0.0);
    }

    #[test]
    fn right_alignment_drops_trailing_space_in_ltr() {
        let a = align_line(TextAlign::Right, Direction::Ltr, 100.0, 50.0, 10.0, 0);
        assert_eq!(a.offset, 60.0);
        assert_eq!(a.trailing_space, 0.0);
    }

    #[test]
    fn left_alignment_clips_hanging_space() {
        let a = align_line(TextAlign::Left, Direction::Ltr, 100.0, 105.0, 10.0, 0);
        assert_eq!(a.offset, 0.0);
        assert_eq!(a.trailing_space, 5.0);
    }

    #[test]
    fn wide_rtl_lines_spill_left() {
        let a = align_line(TextAlign::Start, Direction::Rtl, 100.0, 130.0, 0.0, 0);
        assert_eq!(a.offset, -30.0);
    }

    #[test]
    fn center_alignment() {
        let a = align_line(TextAlign::Center, Direction::Ltr, 100.0, 50.0, 10.0, 0);
        assert_eq!(a.offset, 30.0);
        assert_eq!(a.trailing_space, 10.0);
    }

    #[test]
    fn last_line_alignment() {
        let style = Style {
            text_align: Some(TextAlign::Justify),
            ..Default::default()
        }
        .resolve(None);
        assert_eq!(text_alignment_for_line(&style, false), TextAlign::Justify);
        assert_eq!(text_alignment_for_line(&style, true), TextAlign::Start);

        let style = Style {
            text_align: Some(TextAlign::Justify),
            text_align_last: Some(TextAlignLast::Center),
            ..Default::default()
        }
        .resolve(None);
        assert_eq!(text_alignment_for_line(&style, true), TextAlign::Center);
    }

    #[test]
    fn half_leading_splits_evenly() {
        let style = Style {
            line_height: Some(crate::style::LineHeight::Length(20.0)),
            ..Default::default()
        }
        .resolve(None);
        let (above, below) = leading_box(&style, metrics(8.0, 2.0));
        assert_eq!(above, 13.0);
        assert_eq!(below, 7.0);
    }

    #[test]
    fn super_raises_and_grows_the_line() {
        let b = align_box(VerticalAlign::Super, 8.0, 2.0, 12.0, metrics(9.6, 2.4));
        assert_eq!(b.above, 13.0);
        let m = line_metrics((8.0, 2.0), &[b]);
        assert_eq!(m.above, 13.0);
        assert_eq!(m.below, 2.0);
    }

    #[test]
    fn replaced_box_sits_on_the_baseline() {
        let b = align_box(VerticalAlign::Baseline, 30.0, 0.0, 10.0, metrics(8.0, 2.0));
        let m = line_metrics((8.0, 2.0), &[b]);
        assert_eq!(m.height(), 32.0);
        assert_eq!(m.box_top(&b), 0.0);
    }

    #[test]
    fn top_aligned_box_extends_the_bottom() {
        let tall = align_box(VerticalAlign::Top, 25.0, 5.0, 10.0, metrics(8.0, 2.0));
        let m = line_metrics((8.0, 2.0), &[tall]);
        assert_eq!(m.above, 8.0);
        assert_eq!(m.below, 22.0);
        assert_eq!(m.box_top(&tall), 0.0);
    }
}
