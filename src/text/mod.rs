//! # Text Measurement and Segmentation
//!
//! The engine never shapes text itself. Widths and font metrics come from a
//! `TextMeasurer`; everything else in here is character-level work that
//! doesn't depend on fonts: UAX #14 break opportunities, white-space
//! collapsing, and finding the places justification may stretch.

pub mod bidi;

use serde::Serialize;
use unicode_linebreak::{linebreaks, BreakOpportunity};
use unicode_script::{Script, UnicodeScript};

use crate::model::MeasurerConfig;
use crate::style::{Direction, ResolvedStyle, TextJustify, WhiteSpace};

/// How far glyphs paint outside their advance box.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct GlyphOverflow {
    pub top: f64,
    pub bottom: f64,
    pub left: f64,
    pub right: f64,
}

impl GlyphOverflow {
    pub fn max(&self, other: &GlyphOverflow) -> GlyphOverflow {
        GlyphOverflow {
            top: self.top.max(other.top),
            bottom: self.bottom.max(other.bottom),
            left: self.left.max(other.left),
            right: self.right.max(other.right),
        }
    }
}

/// Result of measuring a piece of text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Measurement {
    pub width: f64,
    /// Fonts other than the primary one that were needed to cover the text.
    pub fallback_fonts: Vec<String>,
    pub glyph_overflow: GlyphOverflow,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FontMetrics {
    pub ascent: f64,
    pub descent: f64,
}

impl FontMetrics {
    pub fn height(&self) -> f64 {
        self.ascent + self.descent
    }
}

/// The text measurement service. Implementations must be deterministic:
/// the same text and style always measure the same.
pub trait TextMeasurer {
    fn measure(&self, text: &str, style: &ResolvedStyle, direction: Direction) -> Measurement;
    fn font_metrics(&self, style: &ResolvedStyle) -> FontMetrics;
}

/// Every character advances by the same amount, regardless of font.
/// Newlines and bidi controls take no space.
#[derive(Debug, Clone, Copy)]
pub struct FixedAdvanceMeasurer {
    pub advance: f64,
    pub ascent_ratio: f64,
    pub descent_ratio: f64,
}

impl FixedAdvanceMeasurer {
    pub fn new(advance: f64) -> Self {
        Self {
            advance,
            ascent_ratio: 0.8,
            descent_ratio: 0.2,
        }
    }
}

impl From<MeasurerConfig> for FixedAdvanceMeasurer {
    fn from(config: MeasurerConfig) -> Self {
        Self {
            advance: config.advance,
            ascent_ratio: config.ascent_ratio,
            descent_ratio: config.descent_ratio,
        }
    }
}

impl TextMeasurer for FixedAdvanceMeasurer {
    fn measure(&self, text: &str, _style: &ResolvedStyle, _direction: Direction) -> Measurement {
        let count = text.chars().filter(|&c| !is_zero_width(c)).count();
        Measurement {
            width: count as f64 * self.advance,
            fallback_fonts: Vec::new(),
            glyph_overflow: GlyphOverflow::default(),
        }
    }

    fn font_metrics(&self, style: &ResolvedStyle) -> FontMetrics {
        FontMetrics {
            ascent: style.font_size * self.ascent_ratio,
            descent: style.font_size * self.descent_ratio,
        }
    }
}

fn is_zero_width(c: char) -> bool {
    matches!(
        c,
        '\n' | '\r' | SOFT_HYPHEN | '\u{200B}'..='\u{200F}' | '\u{202A}'..='\u{202E}' | '\u{2066}'..='\u{2069}'
    )
}

pub const SOFT_HYPHEN: char = '\u{00AD}';

/// Map a BCP 47 tag onto a hyphenation dictionary. Untagged text is
/// hyphenated as English; unknown languages aren't hyphenated at all.
pub fn hyphenation_lang(tag: Option<&str>) -> Option<hypher::Lang> {
    let Some(tag) = tag else {
        return Some(hypher::Lang::English);
    };
    let primary = tag.split(['-', '_']).next()?.to_ascii_lowercase();
    let code: [u8; 2] = primary.as_bytes().try_into().ok()?;
    hypher::Lang::from_iso(code)
}

/// Byte offsets inside `text` where a word may be hyphenated, in order.
/// Words are maximal runs of alphabetic characters; offsets at word edges
/// are never returned.
pub fn hyphenation_points(text: &str, lang: hypher::Lang) -> Vec<usize> {
    let mut points = Vec::new();
    let mut word_start = None;
    for (i, c) in text.char_indices().chain(std::iter::once((text.len(), ' '))) {
        match (c.is_alphabetic(), word_start) {
            (true, None) => word_start = Some(i),
            (false, Some(start)) => {
                let mut offset = start;
                let mut syllables = hypher::hyphenate(&text[start..i], lang).peekable();
                while let Some(syllable) = syllables.next() {
                    offset += syllable.len();
                    if syllables.peek().is_some() {
                        points.push(offset);
                    }
                }
                word_start = None;
            }
            _ => {}
        }
    }
    points
}

/// UAX #14 break opportunities in `text`, as byte offsets of the position
/// *before which* a break may occur. The implicit break at the end of the
/// text is omitted unless the text ends in a hard line break.
pub fn break_opportunities(text: &str) -> Vec<(usize, BreakOpportunity)> {
    linebreaks(text)
        .filter(|&(offset, opp)| {
            offset < text.len()
                || (opp == BreakOpportunity::Mandatory && text.ends_with(['\n', '\u{2028}', '\u{2029}']))
        })
        .collect()
}

/// Collapse white space the way the given `white-space` mode requires.
///
/// `after_space` carries state across adjacent text boxes: when it's set, a
/// leading collapsible space is dropped. Start a paragraph (or the line after
/// a forced break) with it set to strip leading spaces.
pub fn collapse_white_space(text: &str, mode: WhiteSpace, after_space: &mut bool) -> String {
    let mut out = String::with_capacity(text.len());
    match mode {
        WhiteSpace::Pre | WhiteSpace::PreWrap => {
            for c in text.chars() {
                if c != '\r' {
                    out.push(c);
                }
            }
            *after_space = out.ends_with('\n');
        }
        WhiteSpace::PreLine => {
            for c in text.chars() {
                match c {
                    '\n' => {
                        while out.ends_with(' ') {
                            out.pop();
                        }
                        out.push('\n');
                        *after_space = true;
                    }
                    ' ' | '\t' | '\r' => {
                        if !*after_space {
                            out.push(' ');
                            *after_space = true;
                        }
                    }
                    _ => {
                        out.push(c);
                        *after_space = false;
                    }
                }
            }
        }
        WhiteSpace::Normal | WhiteSpace::Nowrap => {
            for c in text.chars() {
                if matches!(c, ' ' | '\t' | '\n' | '\r') {
                    if !*after_space {
                        out.push(' ');
                        *after_space = true;
                    }
                } else {
                    out.push(c);
                    *after_space = false;
                }
            }
        }
    }
    out
}

/// Number of trailing bytes of `text` that are spaces which may hang past
/// the end of a line.
pub fn trailing_space_len(text: &str, mode: WhiteSpace) -> usize {
    if matches!(mode, WhiteSpace::Pre) {
        return 0;
    }
    text.len() - text.trim_end_matches([' ', '\t']).len()
}

/// Scripts written without spaces, where every character boundary is a
/// justification opportunity.
fn is_cjk(c: char) -> bool {
    matches!(
        c.script(),
        Script::Han | Script::Hiragana | Script::Katakana | Script::Bopomofo | Script::Yi
    ) || matches!(c, '\u{3000}'..='\u{303F}' | '\u{FF00}'..='\u{FFEF}')
}

/// Whether justification may add space after `c`.
pub fn is_expansion_opportunity(c: char, justify: TextJustify) -> bool {
    match justify {
        TextJustify::None => false,
        TextJustify::InterCharacter => !is_zero_width(c),
        TextJustify::Auto | TextJustify::InterWord => matches!(c, ' ' | '\u{00A0}' | '\t') || is_cjk(c),
    }
}

/// Count justification opportunities in a run of text.
pub fn count_expansion_opportunities(text: &str, justify: TextJustify) -> usize {
    text.chars()
        .filter(|&c| is_expansion_opportunity(c, justify))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_advance_measures_per_char() {
        let m = FixedAdvanceMeasurer::new(10.0);
        let style = ResolvedStyle::default();
        assert_eq!(m.measure("aaaa", &style, Direction::Ltr).width, 40.0);
        assert_eq!(m.measure("a\n", &style, Direction::Ltr).width, 10.0);
        let metrics = m.font_metrics(&style);
        assert!((metrics.height() - style.font_size).abs() < 1e-9);
    }

    #[test]
    fn soft_hyphens_take_no_space() {
        let m = FixedAdvanceMeasurer::new(10.0);
        let style = ResolvedStyle::default();
        assert_eq!(m.measure("co\u{AD}op", &style, Direction::Ltr).width, 40.0);
    }

    #[test]
    fn hyphenation_language_from_tag() {
        assert_eq!(hyphenation_lang(None), Some(hypher::Lang::English));
        assert_eq!(hyphenation_lang(Some("de-CH")), Some(hypher::Lang::German));
        assert_eq!(hyphenation_lang(Some("FR")), Some(hypher::Lang::French));
        assert_eq!(hyphenation_lang(Some("xx")), None);
    }

    #[test]
    fn hyphenation_points_fall_inside_words() {
        let text = "a hyphenation example";
        let points = hyphenation_points(text, hypher::Lang::English);
        assert!(!points.is_empty());
        for &p in &points {
            assert!(text.is_char_boundary(p));
            assert!(text[..p].ends_with(char::is_alphabetic));
            assert!(text[p..].starts_with(char::is_alphabetic));
        }
        assert!(points.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn break_opportunities_follow_spaces() {
        let opps = break_opportunities("aaaa bbbb cccc");
        let offsets: Vec<usize> = opps.iter().map(|(o, _)| *o).collect();
        assert_eq!(offsets, vec![5, 10]);
        assert!(opps.iter().all(|(_, o)| *o == BreakOpportunity::Allowed));
    }

    #[test]
    fn break_opportunities_after_newline_are_mandatory() {
        let opps = break_opportunities("ab\ncd");
        assert_eq!(opps, vec![(3, BreakOpportunity::Mandatory)]);
    }

    #[test]
    fn cjk_text_breaks_between_ideographs() {
        let opps = break_opportunities("漢字漢字");
        assert_eq!(opps.len(), 3);
    }

    #[test]
    fn normal_white_space_collapses() {
        let mut after_space = true;
        let out = collapse_white_space("  hello \n\t world ", WhiteSpace::Normal, &mut after_space);
        assert_eq!(out, "hello world ");
        assert!(after_space);
        let next = collapse_white_space(" again", WhiteSpace::Normal, &mut after_space);
        assert_eq!(next, "again");
    }

    #[test]
    fn pre_line_keeps_newlines_and_strips_spaces_around_them() {
        let mut after_space = true;
        let out = collapse_white_space("a  \n  b", WhiteSpace::PreLine, &mut after_space);
        assert_eq!(out, "a\nb");
    }

    #[test]
    fn pre_keeps_everything() {
        let mut after_space = true;
        let out = collapse_white_space("  a  b ", WhiteSpace::Pre, &mut after_space);
        assert_eq!(out, "  a  b ");
    }

    #[test]
    fn expansion_opportunities_by_mode() {
        assert_eq!(count_expansion_opportunities("aa bb cc", TextJustify::Auto), 2);
        assert_eq!(count_expansion_opportunities("aa bb", TextJustify::InterCharacter), 5);
        assert_eq!(count_expansion_opportunities("aa bb", TextJustify::None), 0);
        assert_eq!(count_expansion_opportunities("漢字", TextJustify::Auto), 2);
    }

    #[test]
    fn trailing_spaces_hang_unless_pre() {
        assert_eq!(trailing_space_len("abc  ", WhiteSpace::Normal), 2);
        assert_eq!(trailing_space_len("abc  ", WhiteSpace::Pre), 0);
    }
}
