//! # Style Snapshots
//!
//! The engine does not cascade. Each box arrives with the values its author
//! declared (`Style`, every field optional) and `Style::resolve` turns that
//! into a `ResolvedStyle`: inherited properties come from the parent, the
//! rest fall back to their initial values.
//!
//! Percentages and `auto` survive resolution as `Dimension`s because they
//! can only be settled against a containing block during layout.

use serde::{Deserialize, Serialize};

/// The declared style properties of a box.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Style {
    // ── Box Model ──────────────────────────────────────────────
    pub width: Option<Dimension>,
    pub height: Option<Dimension>,
    pub min_width: Option<Dimension>,
    pub max_width: Option<Dimension>,
    pub min_height: Option<Dimension>,
    pub max_height: Option<Dimension>,
    /// Margin outside the border. `auto` is allowed on every side.
    pub margin: Option<EdgeValues<Dimension>>,
    /// Padding inside the border.
    pub padding: Option<Edges>,
    pub border_width: Option<Edges>,

    // ── Flow ───────────────────────────────────────────────────
    pub float: Option<Float>,
    pub clear: Option<Clear>,
    pub position: Option<Position>,
    /// Anything but `Visible` makes the box a float-avoiding BFC root.
    pub overflow: Option<Overflow>,
    /// `display: flow-root`.
    pub flow_root: Option<bool>,

    // ── Inline Formatting ──────────────────────────────────────
    pub direction: Option<Direction>,
    pub unicode_bidi: Option<UnicodeBidi>,
    pub text_align: Option<TextAlign>,
    pub text_align_last: Option<TextAlignLast>,
    pub text_justify: Option<TextJustify>,
    /// Indentation of the first line, in points.
    pub text_indent: Option<f64>,
    pub white_space: Option<WhiteSpace>,
    pub vertical_align: Option<VerticalAlign>,
    pub hyphens: Option<Hyphens>,
    /// BCP 47 language tag. Picks the dictionary for `hyphens: auto`.
    pub lang: Option<String>,
    /// Only takes effect on blocks whose `overflow` isn't `Visible`.
    pub text_overflow: Option<TextOverflow>,

    // ── Font (consumed by the measurement service) ─────────────
    pub font_family: Option<String>,
    pub font_size: Option<f64>,
    pub line_height: Option<LineHeight>,

    // ── Fragmentation ──────────────────────────────────────────
    /// Minimum number of lines left at the bottom of a region before a
    /// break. Default: 2.
    pub orphans: Option<u32>,
    /// Minimum number of lines carried to the top of the next region
    /// after a break. Default: 2.
    pub widows: Option<u32>,
    pub break_before: Option<BreakBetween>,
    pub break_after: Option<BreakBetween>,
    pub break_inside: Option<BreakInside>,
}

/// A length that can be points, a percentage, or auto.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum Dimension {
    /// Fixed size in points.
    Pt(f64),
    /// Percentage of the containing block's corresponding dimension.
    Percent(f64),
    #[default]
    Auto,
}

impl Dimension {
    /// Resolve this dimension against a reference size.
    /// Returns None for Auto.
    pub fn resolve(&self, reference: f64) -> Option<f64> {
        match self {
            Dimension::Pt(v) => Some(*v),
            Dimension::Percent(p) => Some(reference * p / 100.0),
            Dimension::Auto => None,
        }
    }

    /// Resolve, treating `auto` as zero.
    pub fn resolve_or_zero(&self, reference: f64) -> f64 {
        self.resolve(reference).unwrap_or(0.0)
    }

    pub fn is_auto(&self) -> bool {
        matches!(self, Dimension::Auto)
    }

    /// The point value, or zero for percentages and auto. Used where no
    /// containing size is known yet.
    pub fn fixed(&self) -> f64 {
        match self {
            Dimension::Pt(v) => *v,
            _ => 0.0,
        }
    }
}

/// Physical edge values in points.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Edges {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

impl Edges {
    pub fn uniform(v: f64) -> Self {
        Self {
            top: v,
            right: v,
            bottom: v,
            left: v,
        }
    }

    pub fn symmetric(vertical: f64, horizontal: f64) -> Self {
        Self {
            top: vertical,
            right: horizontal,
            bottom: vertical,
            left: horizontal,
        }
    }

    pub fn horizontal(&self) -> f64 {
        self.left + self.right
    }

    pub fn vertical(&self) -> f64 {
        self.top + self.bottom
    }

    pub fn sum(&self, other: &Edges) -> Edges {
        Edges {
            top: self.top + other.top,
            right: self.right + other.right,
            bottom: self.bottom + other.bottom,
            left: self.left + other.left,
        }
    }
}

/// Values for each edge (top, right, bottom, left).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EdgeValues<T: Copy> {
    pub top: T,
    pub right: T,
    pub bottom: T,
    pub left: T,
}

impl<T: Copy> EdgeValues<T> {
    pub fn uniform(v: T) -> Self {
        Self {
            top: v,
            right: v,
            bottom: v,
            left: v,
        }
    }
}

impl Default for EdgeValues<Dimension> {
    fn default() -> Self {
        Self::uniform(Dimension::Pt(0.0))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Float {
    #[default]
    None,
    Left,
    Right,
    InlineStart,
    InlineEnd,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Clear {
    #[default]
    None,
    Left,
    Right,
    Both,
}

impl Clear {
    pub fn clears_left(self) -> bool {
        matches!(self, Clear::Left | Clear::Both)
    }

    pub fn clears_right(self) -> bool {
        matches!(self, Clear::Right | Clear::Both)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Position {
    #[default]
    Static,
    Relative,
    Absolute,
    Fixed,
}

impl Position {
    pub fn is_out_of_flow(self) -> bool {
        matches!(self, Position::Absolute | Position::Fixed)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Overflow {
    #[default]
    Visible,
    Hidden,
    Clip,
    Auto,
    Scroll,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    Ltr,
    Rtl,
}

impl Direction {
    pub fn is_ltr(self) -> bool {
        matches!(self, Direction::Ltr)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnicodeBidi {
    #[default]
    Normal,
    Embed,
    Isolate,
    BidiOverride,
    IsolateOverride,
    Plaintext,
}

impl UnicodeBidi {
    pub fn is_isolate(self) -> bool {
        matches!(
            self,
            UnicodeBidi::Isolate | UnicodeBidi::IsolateOverride | UnicodeBidi::Plaintext
        )
    }

    pub fn is_override(self) -> bool {
        matches!(self, UnicodeBidi::BidiOverride | UnicodeBidi::IsolateOverride)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextAlign {
    #[default]
    Start,
    End,
    Left,
    Right,
    Center,
    Justify,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextAlignLast {
    /// Follow `text-align`, except that `justify` becomes `start`.
    #[default]
    Auto,
    Start,
    End,
    Left,
    Right,
    Center,
    Justify,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextJustify {
    #[default]
    Auto,
    None,
    InterWord,
    InterCharacter,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum WhiteSpace {
    #[default]
    Normal,
    Nowrap,
    Pre,
    PreWrap,
    PreLine,
}

impl WhiteSpace {
    /// Whether runs of spaces and tabs collapse to a single space.
    pub fn collapses_spaces(self) -> bool {
        matches!(self, WhiteSpace::Normal | WhiteSpace::Nowrap | WhiteSpace::PreLine)
    }

    /// Whether newlines in the source force a line break.
    pub fn preserves_newlines(self) -> bool {
        matches!(self, WhiteSpace::Pre | WhiteSpace::PreWrap | WhiteSpace::PreLine)
    }

    /// Whether soft wrap opportunities may be taken.
    pub fn wraps(self) -> bool {
        !matches!(self, WhiteSpace::Nowrap | WhiteSpace::Pre)
    }
}

/// Where words may be hyphenated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Hyphens {
    /// Never, not even at soft hyphens.
    None,
    /// Only at soft hyphens (U+00AD).
    #[default]
    Manual,
    /// At soft hyphens and at dictionary syllable boundaries.
    Auto,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextOverflow {
    #[default]
    Clip,
    /// Truncate overflowing lines and end them with "…".
    Ellipsis,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub enum VerticalAlign {
    #[default]
    Baseline,
    Middle,
    Sub,
    Super,
    TextTop,
    TextBottom,
    Top,
    Bottom,
    /// Raise (positive) or lower (negative) the baseline by a length.
    Length(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum LineHeight {
    /// Use the font's own ascent + descent + line gap.
    Normal,
    /// A multiple of the font size. Inherits as the multiplier.
    Number(f64),
    /// An absolute length in points.
    Length(f64),
}

impl Default for LineHeight {
    fn default() -> Self {
        LineHeight::Normal
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BreakBetween {
    #[default]
    Auto,
    Avoid,
    Column,
    Page,
}

impl BreakBetween {
    pub fn is_forced(self) -> bool {
        matches!(self, BreakBetween::Column | BreakBetween::Page)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BreakInside {
    #[default]
    Auto,
    Avoid,
}

/// Resolved style: inherited values filled in, initial values applied.
/// This is the immutable snapshot the layout engine works with.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedStyle {
    // Box model
    pub width: Dimension,
    pub height: Dimension,
    pub min_width: Dimension,
    pub max_width: Option<Dimension>,
    pub min_height: Dimension,
    pub max_height: Option<Dimension>,
    pub margin: EdgeValues<Dimension>,
    pub padding: Edges,
    pub border_width: Edges,

    // Flow
    pub float: Float,
    pub clear: Clear,
    pub position: Position,
    pub overflow: Overflow,
    pub flow_root: bool,

    // Inline formatting (inherited unless noted)
    pub direction: Direction,
    /// Not inherited.
    pub unicode_bidi: UnicodeBidi,
    pub text_align: TextAlign,
    pub text_align_last: TextAlignLast,
    pub text_justify: TextJustify,
    pub text_indent: f64,
    pub white_space: WhiteSpace,
    /// Not inherited.
    pub vertical_align: VerticalAlign,
    pub hyphens: Hyphens,
    pub lang: Option<String>,
    /// Not inherited.
    pub text_overflow: TextOverflow,

    // Font
    pub font_family: String,
    pub font_size: f64,
    pub line_height: LineHeight,

    // Fragmentation
    pub orphans: u32,
    pub widows: u32,
    pub break_before: BreakBetween,
    pub break_after: BreakBetween,
    pub break_inside: BreakInside,
}

impl Default for ResolvedStyle {
    fn default() -> Self {
        Style::default().resolve(None)
    }
}

impl ResolvedStyle {
    /// Whether a block with this style must keep its geometry clear of
    /// floats (i.e. it establishes a new block formatting context).
    pub fn avoids_floats(&self) -> bool {
        self.overflow != Overflow::Visible || self.flow_root
    }

    pub fn is_floating(&self) -> bool {
        self.float != Float::None
    }

    /// Border + padding on the block-start side.
    pub fn border_padding_before(&self) -> f64 {
        self.border_width.top + self.padding.top
    }

    /// Border + padding on the block-end side.
    pub fn border_padding_after(&self) -> f64 {
        self.border_width.bottom + self.padding.bottom
    }

    pub fn border_padding_horizontal(&self) -> f64 {
        self.border_width.horizontal() + self.padding.horizontal()
    }

    /// Resolve `line-height` into points given the font's natural height.
    pub fn computed_line_height(&self, natural: f64) -> f64 {
        match self.line_height {
            LineHeight::Normal => natural,
            LineHeight::Number(n) => (n * self.font_size).max(0.0),
            LineHeight::Length(l) => l.max(0.0),
        }
    }
}

impl Style {
    /// Resolve this style against a parent's resolved style.
    pub fn resolve(&self, parent: Option<&ResolvedStyle>) -> ResolvedStyle {
        let parent_font_family = parent
            .map(|p| p.font_family.clone())
            .unwrap_or_else(|| "monospace".to_string());

        let direction = self
            .direction
            .unwrap_or(parent.map(|p| p.direction).unwrap_or_default());

        ResolvedStyle {
            width: self.width.unwrap_or_default(),
            height: self.height.unwrap_or_default(),
            min_width: self.min_width.unwrap_or(Dimension::Pt(0.0)),
            max_width: self.max_width.filter(|d| !d.is_auto()),
            min_height: self.min_height.unwrap_or(Dimension::Pt(0.0)),
            max_height: self.max_height.filter(|d| !d.is_auto()),
            margin: self.margin.unwrap_or_default(),
            padding: self.padding.unwrap_or_default(),
            border_width: self.border_width.unwrap_or_default(),

            float: self.float.unwrap_or_default(),
            clear: self.clear.unwrap_or_default(),
            position: self.position.unwrap_or_default(),
            overflow: self.overflow.unwrap_or_default(),
            flow_root: self.flow_root.unwrap_or(false),

            direction,
            unicode_bidi: self.unicode_bidi.unwrap_or_default(),
            text_align: self
                .text_align
                .unwrap_or(parent.map(|p| p.text_align).unwrap_or_default()),
            text_align_last: self
                .text_align_last
                .unwrap_or(parent.map(|p| p.text_align_last).unwrap_or_default()),
            text_justify: self
                .text_justify
                .unwrap_or(parent.map(|p| p.text_justify).unwrap_or_default()),
            text_indent: self
                .text_indent
                .unwrap_or(parent.map(|p| p.text_indent).unwrap_or(0.0)),
            white_space: self
                .white_space
                .unwrap_or(parent.map(|p| p.white_space).unwrap_or_default()),
            vertical_align: self.vertical_align.unwrap_or_default(),
            hyphens: self
                .hyphens
                .unwrap_or(parent.map(|p| p.hyphens).unwrap_or_default()),
            lang: self
                .lang
                .clone()
                .or_else(|| parent.and_then(|p| p.lang.clone())),
            text_overflow: self.text_overflow.unwrap_or_default(),

            font_family: self.font_family.clone().unwrap_or(parent_font_family),
            font_size: self
                .font_size
                .unwrap_or(parent.map(|p| p.font_size).unwrap_or(10.0)),
            line_height: self
                .line_height
                .unwrap_or(parent.map(|p| p.line_height).unwrap_or_default()),

            orphans: self
                .orphans
                .unwrap_or(parent.map(|p| p.orphans).unwrap_or(2))
                .max(1),
            widows: self
                .widows
                .unwrap_or(parent.map(|p| p.widows).unwrap_or(2))
                .max(1),
            break_before: self.break_before.unwrap_or_default(),
            break_after: self.break_after.unwrap_or_default(),
            break_inside: self.break_inside.unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inherited_properties_flow_from_parent() {
        let parent = Style {
            direction: Some(Direction::Rtl),
            text_align: Some(TextAlign::Justify),
            font_size: Some(16.0),
            white_space: Some(WhiteSpace::Pre),
            orphans: Some(3),
            hyphens: Some(Hyphens::Auto),
            lang: Some("de-CH".to_string()),
            ..Default::default()
        }
        .resolve(None);

        let child = Style::default().resolve(Some(&parent));
        assert_eq!(child.hyphens, Hyphens::Auto);
        assert_eq!(child.lang.as_deref(), Some("de-CH"));
        assert_eq!(child.direction, Direction::Rtl);
        assert_eq!(child.text_align, TextAlign::Justify);
        assert_eq!(child.font_size, 16.0);
        assert_eq!(child.white_space, WhiteSpace::Pre);
        assert_eq!(child.orphans, 3);
    }

    #[test]
    fn non_inherited_properties_reset() {
        let parent = Style {
            float: Some(Float::Left),
            clear: Some(Clear::Both),
            unicode_bidi: Some(UnicodeBidi::Isolate),
            vertical_align: Some(VerticalAlign::Top),
            padding: Some(Edges::uniform(4.0)),
            text_overflow: Some(TextOverflow::Ellipsis),
            ..Default::default()
        }
        .resolve(None);

        let child = Style::default().resolve(Some(&parent));
        assert_eq!(child.text_overflow, TextOverflow::Clip);
        assert_eq!(child.float, Float::None);
        assert_eq!(child.clear, Clear::None);
        assert_eq!(child.unicode_bidi, UnicodeBidi::Normal);
        assert_eq!(child.vertical_align, VerticalAlign::Baseline);
        assert_eq!(child.padding, Edges::default());
    }

    #[test]
    fn only_fixed_dimensions_contribute_a_length() {
        assert_eq!(Dimension::Pt(12.0).fixed(), 12.0);
        assert_eq!(Dimension::Percent(50.0).fixed(), 0.0);
        assert_eq!(Dimension::Auto.fixed(), 0.0);
    }

    #[test]
    fn overflow_makes_box_avoid_floats() {
        let plain = Style::default().resolve(None);
        assert!(!plain.avoids_floats());

        let clipped = Style {
            overflow: Some(Overflow::Hidden),
            ..Default::default()
        }
        .resolve(None);
        assert!(clipped.avoids_floats());
    }

    #[test]
    fn zero_orphans_clamp_to_one() {
        let style = Style {
            orphans: Some(0),
            widows: Some(0),
            ..Default::default()
        }
        .resolve(None);
        assert_eq!(style.orphans, 1);
        assert_eq!(style.widows, 1);
    }

    #[test]
    fn dimension_resolution() {
        assert_eq!(Dimension::Pt(12.0).resolve(300.0), Some(12.0));
        assert_eq!(Dimension::Percent(10.0).resolve(300.0), Some(30.0));
        assert_eq!(Dimension::Auto.resolve(300.0), None);
        assert_eq!(Dimension::Auto.resolve_or_zero(300.0), 0.0);
    }

    #[test]
    fn style_deserializes_from_camel_case() {
        let style: Style = serde_json::from_str(
            r#"{ "textAlign": "Justify", "whiteSpace": "PreWrap", "margin": { "top": { "Pt": 4 }, "right": "Auto", "bottom": { "Percent": 10 }, "left": "Auto" } }"#,
        )
        .unwrap();
        assert_eq!(style.text_align, Some(TextAlign::Justify));
        assert_eq!(style.white_space, Some(WhiteSpace::PreWrap));
        let margin = style.margin.unwrap();
        assert_eq!(margin.right, Dimension::Auto);
        assert_eq!(margin.bottom, Dimension::Percent(10.0));
    }
}
