//! # Fragmentation
//!
//! Logic for deciding when and how the flow breaks across regions (pages or
//! columns). Regions are only ever seen through `RegionProvider`; nothing
//! here knows whether they are pages, columns, or something else.
//!
//! Breaks are expressed as *pagination struts*: extra space inserted in
//! front of a line or block so that it starts at the top of the next
//! region. An offset that lies exactly on a region boundary belongs to the
//! later region.

use serde::Serialize;

use crate::geometry::Rect;

/// Answers questions about the regions the flow is split across. Offsets
/// are absolute block offsets in the fragmented flow.
pub trait RegionProvider {
    /// Height of the region containing `offset`, or 0 when there is no
    /// region there (the flow is no longer fragmented).
    fn page_height(&self, offset: f64) -> f64;

    /// Space from `offset` to the end of the region containing it.
    fn remaining_height(&self, offset: f64) -> f64;

    /// Offset at which the next region starts.
    fn next_region_top(&self, offset: f64) -> f64 {
        offset + self.remaining_height(offset)
    }

    /// Whether `offset` is the very top of a region.
    fn is_region_top(&self, offset: f64) -> bool {
        let page = self.page_height(offset);
        page > 0.0 && (self.remaining_height(offset) - page).abs() < 1e-6
    }
}

/// One region of the chain, positioned in flow coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Region {
    pub index: usize,
    pub rect: Rect,
}

/// A sequence of regions with explicit heights, optionally repeating the
/// last height forever.
#[derive(Debug, Clone)]
pub struct RegionChain {
    heights: Vec<f64>,
    repeat_last: bool,
    width: f64,
}

impl RegionChain {
    pub fn new(heights: Vec<f64>, repeat_last: bool, width: f64) -> Self {
        let heights: Vec<f64> = heights.into_iter().filter(|h| *h > 0.0).collect();
        Self {
            heights,
            repeat_last,
            width,
        }
    }

    /// The region containing `offset`.
    pub fn region_at(&self, offset: f64) -> Option<Region> {
        let offset = offset.max(0.0);
        let mut start = 0.0;
        for (index, &height) in self.heights.iter().enumerate() {
            if offset < start + height {
                return Some(self.region(index, start, height));
            }
            start += height;
        }
        if !self.repeat_last {
            return None;
        }
        let height = *self.heights.last()?;
        let k = ((offset - start) / height).floor();
        Some(self.region(self.heights.len() + k as usize, start + k * height, height))
    }

    /// Every region needed to hold a flow of the given height.
    pub fn regions_for(&self, flow_height: f64) -> Vec<Region> {
        let mut regions = Vec::new();
        let mut offset = 0.0;
        while let Some(region) = self.region_at(offset) {
            regions.push(region);
            offset = region.rect.bottom();
            if offset >= flow_height {
                break;
            }
        }
        regions
    }

    fn region(&self, index: usize, start: f64, height: f64) -> Region {
        Region {
            index,
            rect: Rect::new(0.0, start, self.width, height),
        }
    }
}

impl RegionProvider for RegionChain {
    fn page_height(&self, offset: f64) -> f64 {
        self.region_at(offset).map(|r| r.rect.height).unwrap_or(0.0)
    }

    fn remaining_height(&self, offset: f64) -> f64 {
        self.region_at(offset)
            .map(|r| r.rect.bottom() - offset.max(0.0))
            .unwrap_or(0.0)
    }
}

/// Where a line sits and what its block allows.
#[derive(Debug, Clone, Copy)]
pub struct LinePlacement {
    /// Absolute offset of the line top.
    pub offset: f64,
    pub height: f64,
    /// Line top relative to the block's border box.
    pub offset_in_block: f64,
    /// 1-based position of the line in its block.
    pub line_number: usize,
    pub orphans: u32,
    pub border_padding_before: f64,
    /// Absolute offset of the block's border box.
    pub block_offset: f64,
    /// Whether the block may be pushed as a whole.
    pub allows_block_strut: bool,
    /// Widow control asked for a break in front of this line.
    pub break_for_widow: bool,
}

/// What pagination does to one line.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LineAdjustment {
    /// Space inserted in front of the line.
    pub strut: f64,
    /// Space to insert in front of the whole block instead.
    pub block_strut: Option<f64>,
    pub first_after_break: bool,
}

fn should_set_strut_on_block(
    regions: &dyn RegionProvider,
    line: &LinePlacement,
    page_height: f64,
) -> bool {
    // Pushing a block that already starts a region gains nothing.
    if regions.is_region_top(line.block_offset) {
        return false;
    }
    if line.line_number == 1 {
        // The line was pushed down by floats: break in front of it, not the block.
        if line.offset_in_block > line.border_padding_before {
            return false;
        }
        if line.height + line.offset_in_block.max(0.0) > page_height {
            return false;
        }
    } else if line.line_number > line.orphans as usize {
        return false;
    }
    line.allows_block_strut
}

/// Decide whether a line must move to the next region.
///
/// A line that doesn't fit in the remaining space gets a strut equal to that
/// space, unless it's too tall for any region, in which case it stays put.
/// When moving the line would leave fewer than `orphans` lines behind, the
/// whole block is pushed instead.
pub fn adjust_line_for_pagination(
    regions: &dyn RegionProvider,
    line: &LinePlacement,
) -> LineAdjustment {
    let mut adjustment = LineAdjustment::default();
    let page_height = regions.page_height(line.offset);
    if page_height <= 0.0 {
        return adjustment;
    }
    let remaining = regions.remaining_height(line.offset);

    if remaining < line.height || line.break_for_widow {
        let strut = remaining;
        if line.height > regions.page_height(line.offset + strut) {
            return adjustment;
        }
        if should_set_strut_on_block(regions, line, page_height) {
            adjustment.block_strut = Some(strut + line.offset_in_block);
        } else {
            adjustment.strut = strut;
            adjustment.first_after_break = true;
        }
        return adjustment;
    }

    if (remaining - page_height).abs() < 1e-6 {
        // At the very top of a region.
        if line.line_number != 1 {
            adjustment.first_after_break = true;
        }
    } else if line.line_number == 1 && line.allows_block_strut {
        // The block starts in an earlier region: pull it over to this line
        // so its border and padding aren't split off.
        let strut = remaining + line.offset_in_block - page_height;
        if strut > 0.0 && line.offset_in_block + line.height <= page_height {
            adjustment.block_strut = Some(strut);
        }
    }
    adjustment
}

/// Pick the line to break in front of so that at least `widows` lines end
/// up after the last break. Never leaves fewer than `orphans` lines before
/// that break; gives up instead.
///
/// `first_after_break[i]` tells whether line `i` starts a new region.
pub fn find_widow_break(first_after_break: &[bool], widows: u32, orphans: u32) -> Option<usize> {
    if widows <= 1 || first_after_break.len() < 2 {
        return None;
    }

    // Count from the end of the block backwards, to see how many hanging
    // lines we have.
    let mut i = first_after_break.len() - 1;
    let mut hanging = 1;
    while i != 0 && !first_after_break[i] {
        hanging += 1;
        i -= 1;
    }
    // If there were no breaks in the block, we didn't create any widows.
    if i == 0 || !first_after_break[i] {
        return None;
    }
    if hanging >= widows as usize {
        return None;
    }

    let needed = widows as usize - hanging;
    let first_of_new_region = i;

    let mut j = i - 1;
    let mut in_previous = 1;
    while j != 0 && !first_after_break[j] {
        in_previous += 1;
        j -= 1;
    }

    let available = in_previous as i64 - orphans as i64;
    if available <= 0 {
        return None;
    }
    let take = (available as usize).min(needed);
    Some(first_of_new_region - take)
}

/// Strut that moves an unsplittable box of `height` at `offset` to the next
/// region, or 0 if it fits or would not fit anywhere.
pub fn strut_for_unsplittable(regions: &dyn RegionProvider, offset: f64, height: f64) -> f64 {
    let page_height = regions.page_height(offset);
    if page_height <= 0.0 {
        return 0.0;
    }
    let remaining = regions.remaining_height(offset);
    if remaining >= height {
        return 0.0;
    }
    if height > regions.page_height(offset + remaining) {
        return 0.0;
    }
    remaining
}

/// Strut for a forced break at `offset`. None needed at the top of a region.
pub fn strut_for_forced_break(regions: &dyn RegionProvider, offset: f64) -> f64 {
    if regions.page_height(offset) <= 0.0 || regions.is_region_top(offset) {
        return 0.0;
    }
    regions.remaining_height(offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(heights: &[f64]) -> RegionChain {
        RegionChain::new(heights.to_vec(), true, 100.0)
    }

    fn placement(offset: f64, line_number: usize) -> LinePlacement {
        LinePlacement {
            offset,
            height: 10.0,
            offset_in_block: offset - 50.0,
            line_number,
            orphans: 2,
            border_padding_before: 0.0,
            block_offset: 50.0,
            allows_block_strut: true,
            break_for_widow: false,
        }
    }

    #[test]
    fn boundary_offset_belongs_to_later_region() {
        let regions = chain(&[100.0, 50.0]);
        assert_eq!(regions.region_at(99.0).unwrap().index, 0);
        assert_eq!(regions.region_at(100.0).unwrap().index, 1);
        assert_eq!(regions.remaining_height(100.0), 50.0);
        assert!(regions.is_region_top(100.0));
        // repeats the last height
        assert_eq!(regions.region_at(160.0).unwrap().index, 2);
        assert_eq!(regions.page_height(160.0), 50.0);
    }

    #[test]
    fn non_repeating_chain_ends() {
        let regions = RegionChain::new(vec![100.0], false, 100.0);
        assert_eq!(regions.page_height(150.0), 0.0);
        assert_eq!(regions.regions_for(250.0).len(), 1);
    }

    #[test]
    fn regions_cover_the_flow() {
        let regions = chain(&[100.0]);
        let list = regions.regions_for(250.0);
        assert_eq!(list.len(), 3);
        assert_eq!(list[2].rect.y, 200.0);
    }

    #[test]
    fn line_that_fits_is_left_alone() {
        let regions = chain(&[100.0]);
        let adj = adjust_line_for_pagination(&regions, &placement(70.0, 3));
        assert_eq!(adj, LineAdjustment::default());
    }

    #[test]
    fn line_crossing_the_boundary_gets_a_strut() {
        let regions = chain(&[100.0]);
        let adj = adjust_line_for_pagination(&regions, &placement(95.0, 5));
        assert_eq!(adj.strut, 5.0);
        assert!(adj.first_after_break);
        assert_eq!(adj.block_strut, None);
    }

    #[test]
    fn orphan_pushes_the_block() {
        // Second line of a block starting at 50 doesn't fit: with orphans=2
        // only one line would stay behind, so the block moves.
        let regions = chain(&[100.0]);
        let adj = adjust_line_for_pagination(&regions, &placement(95.0, 2));
        assert_eq!(adj.strut, 0.0);
        assert_eq!(adj.block_strut, Some(5.0 + 45.0));
    }

    #[test]
    fn orphan_at_region_top_breaks_normally() {
        let regions = chain(&[100.0]);
        let mut line = placement(95.0, 2);
        line.block_offset = 0.0;
        line.offset_in_block = 95.0;
        let adj = adjust_line_for_pagination(&regions, &line);
        assert_eq!(adj.block_strut, None);
        assert_eq!(adj.strut, 5.0);
    }

    #[test]
    fn too_tall_line_is_never_pushed() {
        let regions = chain(&[100.0]);
        let mut line = placement(95.0, 5);
        line.height = 150.0;
        assert_eq!(adjust_line_for_pagination(&regions, &line), LineAdjustment::default());
    }

    #[test]
    fn widow_steals_lines_from_previous_region() {
        // 5 lines, break before the last one: 1 widow, widows=2.
        let breaks = [false, false, false, false, true];
        assert_eq!(find_widow_break(&breaks, 2, 2), Some(3));
    }

    #[test]
    fn widow_fix_never_creates_orphans() {
        // 2 lines before the break, orphans=2: nothing to take.
        let breaks = [false, false, true];
        assert_eq!(find_widow_break(&breaks, 2, 2), None);
    }

    #[test]
    fn enough_widows_needs_no_fix() {
        let breaks = [false, false, false, true, false];
        assert_eq!(find_widow_break(&breaks, 2, 2), None);
        assert_eq!(find_widow_break(&[false, false, false], 2, 2), None);
    }

    #[test]
    fn unsplittable_content_moves_when_it_fits_the_next_region() {
        let regions = chain(&[100.0]);
        assert_eq!(strut_for_unsplittable(&regions, 80.0, 30.0), 20.0);
        assert_eq!(strut_for_unsplittable(&regions, 80.0, 10.0), 0.0);
        assert_eq!(strut_for_unsplittable(&regions, 80.0, 130.0), 0.0);
    }

    #[test]
    fn forced_break_is_free_at_region_top() {
        let regions = chain(&[100.0]);
        assert_eq!(strut_for_forced_break(&regions, 0.0), 0.0);
        assert_eq!(strut_for_forced_break(&regions, 100.0), 0.0);
        assert_eq!(strut_for_forced_break(&regions, 40.0), 60.0);
    }
}
