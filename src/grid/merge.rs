//! Merge index: every member cell of a merged region mapped to its anchor

use super::Worksheet;
use crate::address::{CellAddress, CellRange};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::warn;

/// A merge range as stored in a codec's internal table, before validation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawMergeRange {
    pub top: Option<u32>,
    pub left: Option<u32>,
    pub bottom: Option<u32>,
    pub right: Option<u32>,
}

impl RawMergeRange {
    fn validate(&self) -> Option<CellRange> {
        let (top, left, bottom, right) = (self.top?, self.left?, self.bottom?, self.right?);
        if top == 0 || left == 0 || bottom < top || right < left {
            return None;
        }
        Some(CellRange::new(
            CellAddress::new(top, left),
            CellAddress::new(bottom, right),
        ))
    }
}

/// How a cell takes part in merging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeRole {
    Unmerged,
    /// Top-left cell of a region; carries the region extent.
    Anchor(CellRange),
    /// Covered by a region whose anchor is the given address.
    Member(CellAddress),
}

#[derive(Debug, Clone, Default)]
pub struct MergeIndex {
    anchors: HashMap<CellAddress, CellAddress>,
    regions: HashMap<CellAddress, CellRange>,
}

impl MergeIndex {
    /// Build the index from a worksheet.
    ///
    /// The structured region list is preferred; the raw merge table is the
    /// fallback. When neither is available the index is empty.
    pub fn build(sheet: &dyn Worksheet) -> Self {
        let regions = match sheet.merged_regions() {
            Some(regions) => regions,
            None => match sheet.merge_table() {
                Some(table) => table
                    .iter()
                    .filter_map(|raw| {
                        let range = raw.validate();
                        if range.is_none() {
                            warn!(sheet = sheet.name(), ?raw, "skipping malformed merge range");
                        }
                        range
                    })
                    .collect(),
                None => Vec::new(),
            },
        };
        Self::from_regions(regions)
    }

    /// Index the regions in order. A region sharing any cell with an earlier
    /// one is skipped.
    pub fn from_regions(regions: impl IntoIterator<Item = CellRange>) -> Self {
        let mut index = MergeIndex::default();
        for range in regions {
            if let Some(taken) = range.cells().find(|c| index.anchors.contains_key(c)) {
                warn!(region = %range, cell = %taken, "skipping overlapping merge range");
                continue;
            }
            let anchor = range.start;
            for cell in range.cells() {
                index.anchors.insert(cell, anchor);
            }
            index.regions.insert(anchor, range);
        }
        index
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    /// Every region, sorted by anchor.
    pub fn regions(&self) -> Vec<CellRange> {
        let mut regions: Vec<CellRange> = self.regions.values().copied().collect();
        regions.sort_by_key(|r| r.start);
        regions
    }

    pub fn anchor_of(&self, at: CellAddress) -> Option<CellAddress> {
        self.anchors.get(&at).copied()
    }

    pub fn classify(&self, at: CellAddress) -> MergeRole {
        match self.anchors.get(&at) {
            None => MergeRole::Unmerged,
            Some(anchor) if *anchor == at => match self.regions.get(anchor) {
                Some(range) => MergeRole::Anchor(*range),
                None => MergeRole::Unmerged,
            },
            Some(anchor) => MergeRole::Member(*anchor),
        }
    }

    /// Member address → anchor address, as strings, sorted for stable output.
    pub fn to_address_map(&self) -> BTreeMap<String, String> {
        self.anchors
            .iter()
            .map(|(cell, anchor)| (cell.to_string(), anchor.to_string()))
            .collect()
    }
}

impl Serialize for MergeIndex {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_address_map().serialize(serializer)
    }
}
