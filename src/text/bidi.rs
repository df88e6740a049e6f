//! # BiDi Support
//!
//! Embedding levels come from a `ParagraphResolver`, which runs the Unicode
//! Bidirectional Algorithm (UAX #9) over plain text. `UnicodeBidiResolver`
//! does this with the `unicode-bidi` crate.
//!
//! Inline boxes contribute to the paragraph in two ways:
//! - `embed` and `bidi-override` become explicit embedding controls in the
//!   text handed to the resolver;
//! - `isolate`, `isolate-override` and `plaintext` content is replaced by a
//!   single neutral placeholder in the enclosing pass and resolved in its own
//!   pass, at the next embedding level of the right parity. Its levels are
//!   then spliced back at the original positions.
//!
//! Per-line work (resetting trailing whitespace, visual reordering) lives at
//! the bottom of this file.

use std::ops::Range;

use unicode_bidi::{BidiInfo, Level};

use crate::style::{Direction, UnicodeBidi};

/// A maximal run of bytes sharing one embedding level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedRun {
    pub start: usize,
    pub end: usize,
    pub level: u8,
}

/// The resolver's answer for one piece of text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedParagraph {
    /// The paragraph embedding level that was used (detected when no base
    /// level was given).
    pub level: u8,
    pub runs: Vec<ResolvedRun>,
}

/// The external bidi paragraph resolver.
pub trait ParagraphResolver {
    /// Resolve embedding levels for `text`. With `base == None` the paragraph
    /// level is detected from the first strong character.
    fn resolve(&self, text: &str, base: Option<u8>) -> ResolvedParagraph;
}

/// Resolves levels with the `unicode-bidi` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnicodeBidiResolver;

impl ParagraphResolver for UnicodeBidiResolver {
    fn resolve(&self, text: &str, base: Option<u8>) -> ResolvedParagraph {
        let base_level = base.and_then(|b| Level::new(b).ok());
        if text.is_empty() {
            return ResolvedParagraph {
                level: base_level.map(|l| l.number()).unwrap_or(0),
                runs: vec![],
            };
        }

        let info = BidiInfo::new(text, base_level);
        let level = info
            .paragraphs
            .first()
            .map(|p| p.level.number())
            .or(base)
            .unwrap_or(0);

        // levels is indexed by byte position
        let mut runs: Vec<ResolvedRun> = Vec::new();
        for (byte_idx, _) in text.char_indices() {
            let lvl = info.levels[byte_idx].number();
            match runs.last_mut() {
                Some(run) if run.level == lvl => {}
                _ => runs.push(ResolvedRun {
                    start: byte_idx,
                    end: byte_idx,
                    level: lvl,
                }),
            }
        }
        let mut ends: Vec<usize> = runs.iter().skip(1).map(|r| r.start).collect();
        ends.push(text.len());
        for (run, end) in runs.iter_mut().zip(ends) {
            run.end = end;
        }
        ResolvedParagraph { level, runs }
    }
}

/// Bidi behavior of an inline box, over the byte range of paragraph text
/// its content covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BidiControl {
    pub range: Range<usize>,
    pub unicode_bidi: UnicodeBidi,
    pub direction: Direction,
}

const PLACEHOLDER: char = '\u{FFFC}';

/// Smallest level greater than `level` with the parity of `direction`.
pub fn next_level(level: u8, direction: Direction) -> u8 {
    match direction {
        Direction::Ltr => (level + 2) & !1,
        Direction::Rtl => (level + 1) | 1,
    }
}

/// Resolve the embedding level of every byte of a paragraph.
///
/// `controls` must be properly nested (every pair is either disjoint or one
/// contains the other), as the inline boxes they come from are.
pub fn resolve_levels(
    text: &str,
    base: Direction,
    controls: &[BidiControl],
    resolver: &dyn ParagraphResolver,
) -> Vec<u8> {
    let base_level = if base.is_ltr() { 0 } else { 1 };
    let mut levels = vec![base_level; text.len()];

    let mut sorted: Vec<&BidiControl> = controls
        .iter()
        .filter(|c| c.unicode_bidi != UnicodeBidi::Normal && !c.range.is_empty())
        .collect();
    sorted.sort_by(|a, b| a.range.start.cmp(&b.range.start).then(b.range.end.cmp(&a.range.end)));

    resolve_pass(text, 0..text.len(), Some(base_level), &sorted, resolver, &mut levels);
    levels
}

/// One resolver pass over `range`. Isolates inside it get their own passes.
fn resolve_pass(
    text: &str,
    range: Range<usize>,
    base: Option<u8>,
    controls: &[&BidiControl],
    resolver: &dyn ParagraphResolver,
    levels: &mut [u8],
) {
    let mut emitter = Emitter {
        text,
        out: String::new(),
        map: Vec::new(),
        isolates: Vec::new(),
    };
    emitter.emit(range.clone(), controls);

    let paragraph = resolver.resolve(&emitter.out, base);
    let mut out_levels = vec![paragraph.level; emitter.out.len()];
    for run in &paragraph.runs {
        for l in &mut out_levels[run.start..run.end.min(emitter.out.len())] {
            *l = run.level;
        }
    }
    for (out_idx, original) in emitter.map.iter().enumerate() {
        if let Some(orig) = original {
            levels[*orig] = out_levels[out_idx];
        }
    }

    for (out_pos, control) in std::mem::take(&mut emitter.isolates) {
        let outer = out_levels.get(out_pos).copied().unwrap_or(paragraph.level);
        let direction = if control.unicode_bidi == UnicodeBidi::Plaintext {
            let detected = resolver.resolve(&text[control.range.clone()], None);
            if detected.level % 2 == 1 {
                Direction::Rtl
            } else {
                Direction::Ltr
            }
        } else {
            control.direction
        };
        let inner_base = next_level(outer, direction);
        let nested: Vec<&BidiControl> = controls
            .iter()
            .copied()
            .filter(|c| {
                !std::ptr::eq(*c, control)
                    && c.range.start >= control.range.start
                    && c.range.end <= control.range.end
            })
            .collect();

        if control.unicode_bidi == UnicodeBidi::IsolateOverride {
            // The override applies to the isolate's own content.
            let mut wrapped: Vec<&BidiControl> = Vec::with_capacity(nested.len() + 1);
            let override_control = Box::new(BidiControl {
                range: control.range.clone(),
                unicode_bidi: UnicodeBidi::BidiOverride,
                direction,
            });
            let override_ref: &BidiControl = &override_control;
            wrapped.push(override_ref);
            wrapped.extend(nested);
            resolve_pass(
                text,
                control.range.clone(),
                Some(inner_base),
                &wrapped,
                resolver,
                levels,
            );
        } else {
            resolve_pass(
                text,
                control.range.clone(),
                Some(inner_base),
                &nested,
                resolver,
                levels,
            );
        }
    }
}

/// Builds the text handed to the resolver for one pass.
struct Emitter<'a, 'c> {
    text: &'a str,
    out: String,
    /// For every byte of `out`, the paragraph byte it came from.
    map: Vec<Option<usize>>,
    /// Placeholder positions in `out` and the isolate they stand for.
    isolates: Vec<(usize, &'c BidiControl)>,
}

impl<'a, 'c> Emitter<'a, 'c> {
    fn push_original(&mut self, range: Range<usize>) {
        for (offset, ch) in self.text[range.clone()].char_indices() {
            let orig = range.start + offset;
            self.out.push(ch);
            for i in 0..ch.len_utf8() {
                self.map.push(Some(orig + i));
            }
        }
    }

    fn push_synthetic(&mut self, ch: char) {
        self.out.push(ch);
        for _ in 0..ch.len_utf8() {
            self.map.push(None);
        }
    }

    fn emit(&mut self, range: Range<usize>, controls: &[&'c BidiControl]) {
        let mut cursor = range.start;
        let mut i = 0;
        while i < controls.len() {
            let control = controls[i];
            if control.range.start < cursor || control.range.end > range.end {
                i += 1;
                continue;
            }
            // Direct child of this range: everything it contains is handled
            // by the recursive call.
            self.push_original(cursor..control.range.start);
            let inner: Vec<&'c BidiControl> = controls[i + 1..]
                .iter()
                .copied()
                .take_while(|c| c.range.start < control.range.end)
                .filter(|c| c.range.end <= control.range.end)
                .collect();

            if control.unicode_bidi.is_isolate() {
                let pos = self.out.len();
                self.push_synthetic(PLACEHOLDER);
                self.isolates.push((pos, control));
            } else {
                let opener = match (control.unicode_bidi, control.direction) {
                    (UnicodeBidi::BidiOverride, Direction::Ltr) => '\u{202D}',
                    (UnicodeBidi::BidiOverride, Direction::Rtl) => '\u{202E}',
                    (_, Direction::Ltr) => '\u{202A}',
                    (_, Direction::Rtl) => '\u{202B}',
                };
                self.push_synthetic(opener);
                self.emit(control.range.clone(), &inner);
                self.push_synthetic('\u{202C}');
            }
            cursor = control.range.end;
            i += 1 + inner.len();
        }
        self.push_original(cursor..range.end);
    }
}

// ── Per-line operations ─────────────────────────────────────────

/// UAX #9 rule L2: the visual order of items with the given levels.
///
/// Returns logical indices in visual (left-to-right) order. From the highest
/// level down to the lowest odd level, every maximal sequence at that level
/// or higher is reversed.
pub fn visual_order(levels: &[u8]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..levels.len()).collect();
    if levels.is_empty() {
        return order;
    }

    let max_level = levels.iter().copied().max().unwrap_or(0);
    let min_level = levels.iter().copied().min().unwrap_or(0);

    // Only reorder if there's actually an RTL level
    if max_level % 2 == 0 && max_level == min_level {
        return order;
    }
    let min_odd = if min_level % 2 == 1 { min_level } else { min_level + 1 };

    let mut current = max_level;
    while current >= min_odd && current > 0 {
        let mut i = 0;
        while i < order.len() {
            if levels[order[i]] >= current {
                let start = i;
                while i < order.len() && levels[order[i]] >= current {
                    i += 1;
                }
                order[start..i].reverse();
            } else {
                i += 1;
            }
        }
        current -= 1;
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    fn levels_of(text: &str, base: Direction, controls: &[BidiControl]) -> Vec<u8> {
        resolve_levels(text, base, controls, &UnicodeBidiResolver)
    }

    #[test]
    fn pure_ltr_is_level_zero() {
        let levels = levels_of("hello world", Direction::Ltr, &[]);
        assert!(levels.iter().all(|&l| l == 0));
    }

    #[test]
    fn hebrew_in_ltr_paragraph_is_level_one() {
        let text = "abc שלום def";
        let levels = levels_of(text, Direction::Ltr, &[]);
        let hebrew_start = text.find('ש').unwrap();
        assert_eq!(levels[0], 0);
        assert_eq!(levels[hebrew_start], 1);
        assert_eq!(*levels.last().unwrap(), 0);
    }

    #[test]
    fn rtl_base_puts_latin_at_level_two() {
        let levels = levels_of("abc", Direction::Rtl, &[]);
        assert!(levels.iter().all(|&l| l == 2));
    }

    #[test]
    fn override_forces_direction() {
        let levels = levels_of(
            "abc def",
            Direction::Ltr,
            &[BidiControl {
                range: 4..7,
                unicode_bidi: UnicodeBidi::BidiOverride,
                direction: Direction::Rtl,
            }],
        );
        assert_eq!(&levels[0..3], &[0, 0, 0]);
        assert_eq!(&levels[4..7], &[1, 1, 1]);
    }

    #[test]
    fn isolate_is_resolved_in_its_own_pass() {
        // An RTL isolate holding Latin text: the Latin sits at level 2,
        // above the isolate's own base level 1.
        let levels = levels_of(
            "ab cd ef",
            Direction::Ltr,
            &[BidiControl {
                range: 3..5,
                unicode_bidi: UnicodeBidi::Isolate,
                direction: Direction::Rtl,
            }],
        );
        assert_eq!(&levels[0..2], &[0, 0]);
        assert_eq!(&levels[3..5], &[2, 2]);
        assert_eq!(&levels[6..8], &[0, 0]);
    }

    #[test]
    fn next_level_respects_parity() {
        assert_eq!(next_level(0, Direction::Rtl), 1);
        assert_eq!(next_level(0, Direction::Ltr), 2);
        assert_eq!(next_level(1, Direction::Ltr), 2);
        assert_eq!(next_level(1, Direction::Rtl), 3);
    }

    #[test]
    fn visual_order_reverses_rtl_runs() {
        assert_eq!(visual_order(&[0, 0, 0]), vec![0, 1, 2]);
        assert_eq!(visual_order(&[1, 1, 1]), vec![2, 1, 0]);
        assert_eq!(visual_order(&[0, 1, 1, 0]), vec![0, 2, 1, 3]);
        // Level-2 run inside RTL keeps its internal order
        assert_eq!(visual_order(&[1, 2, 2, 1]), vec![3, 1, 2, 0]);
    }
}
