//! Column → cell mappings: editing, validation, suggestion and recall

pub mod memory;

pub use memory::{JsonFileStore, KeyValueStore, MappingMemory, MemoryStore};

use crate::address::CellAddress;
use crate::grid::{GridModel, MergeRole};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// One input column routed to one template cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnMapping {
    pub source_column: String,
    pub target_cell: String,
}

impl ColumnMapping {
    pub fn new(source_column: impl Into<String>, target_cell: impl Into<String>) -> Self {
        Self {
            source_column: source_column.into(),
            target_cell: target_cell.into(),
        }
    }
}

/// Ordered mapping list with at most one entry per source column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MappingStore {
    mappings: Vec<ColumnMapping>,
}

/// Problems worth showing before a run. None of them stop the batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MappingIssue {
    #[error("column '{source_column}' is not in the input headers")]
    UnknownColumn { source_column: String },

    #[error("column '{source_column}' targets '{target}', which is not a cell address")]
    InvalidTarget { source_column: String, target: String },

    #[error("column '{source_column}' targets {target}, hidden inside the merge anchored at {anchor}")]
    MergedMember {
        source_column: String,
        target: String,
        anchor: String,
    },

    #[error("column '{source_column}' targets {target}, outside the template grid")]
    OutsideGrid { source_column: String, target: String },

    #[error("cell {target} is targeted by several columns: {}", .sources.join(", "))]
    DuplicateTarget { target: String, sources: Vec<String> },
}

impl MappingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or update the mapping for `source_column`. An update keeps the
    /// entry's position. Returns `true` when an existing entry was replaced.
    pub fn add(&mut self, source_column: impl Into<String>, target_cell: impl Into<String>) -> bool {
        let source_column = source_column.into();
        let target_cell = target_cell.into();
        match self
            .mappings
            .iter_mut()
            .find(|m| m.source_column == source_column)
        {
            Some(existing) => {
                existing.target_cell = target_cell;
                true
            }
            None => {
                self.mappings
                    .push(ColumnMapping::new(source_column, target_cell));
                false
            }
        }
    }

    pub fn remove(&mut self, index: usize) -> Option<ColumnMapping> {
        (index < self.mappings.len()).then(|| self.mappings.remove(index))
    }

    /// Upsert every mapping in order.
    pub fn apply(&mut self, mappings: impl IntoIterator<Item = ColumnMapping>) {
        for m in mappings {
            self.add(m.source_column, m.target_cell);
        }
    }

    pub fn as_slice(&self) -> &[ColumnMapping] {
        &self.mappings
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ColumnMapping> {
        self.mappings.iter()
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    pub fn get(&self, source_column: &str) -> Option<&ColumnMapping> {
        self.mappings
            .iter()
            .find(|m| m.source_column == source_column)
    }

    /// Target cells in mapping order, each listed once.
    pub fn mapped_cells(&self) -> Vec<&str> {
        let mut cells: Vec<&str> = Vec::new();
        for m in &self.mappings {
            if !cells.contains(&m.target_cell.as_str()) {
                cells.push(&m.target_cell);
            }
        }
        cells
    }

    /// Target cells written by more than one column, with those columns.
    pub fn duplicate_targets(&self) -> BTreeMap<String, Vec<String>> {
        let mut by_target: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for m in &self.mappings {
            by_target
                .entry(m.target_cell.clone())
                .or_default()
                .push(m.source_column.clone());
        }
        by_target.retain(|_, sources| sources.len() > 1);
        by_target
    }

    /// Check the mappings against the input headers and, when available, the
    /// template grid.
    pub fn validate(&self, headers: &[String], grid: Option<&GridModel>) -> Vec<MappingIssue> {
        let mut issues = Vec::new();
        for m in &self.mappings {
            if !headers.iter().any(|h| *h == m.source_column) {
                issues.push(MappingIssue::UnknownColumn {
                    source_column: m.source_column.clone(),
                });
            }
            let at: CellAddress = match m.target_cell.parse() {
                Ok(at) => at,
                Err(_) => {
                    issues.push(MappingIssue::InvalidTarget {
                        source_column: m.source_column.clone(),
                        target: m.target_cell.clone(),
                    });
                    continue;
                }
            };
            let Some(grid) = grid else { continue };
            if let MergeRole::Member(anchor) = grid.merges().classify(at) {
                issues.push(MappingIssue::MergedMember {
                    source_column: m.source_column.clone(),
                    target: m.target_cell.clone(),
                    anchor: anchor.to_string(),
                });
            } else if !grid.bounds().contains(at) {
                issues.push(MappingIssue::OutsideGrid {
                    source_column: m.source_column.clone(),
                    target: m.target_cell.clone(),
                });
            }
        }
        for (target, sources) in self.duplicate_targets() {
            issues.push(MappingIssue::DuplicateTarget { target, sources });
        }
        issues
    }
}

impl FromIterator<ColumnMapping> for MappingStore {
    fn from_iter<I: IntoIterator<Item = ColumnMapping>>(iter: I) -> Self {
        let mut store = MappingStore::new();
        store.apply(iter);
        store
    }
}

impl<'a> IntoIterator for &'a MappingStore {
    type Item = &'a ColumnMapping;
    type IntoIter = std::slice::Iter<'a, ColumnMapping>;

    fn into_iter(self) -> Self::IntoIter {
        self.mappings.iter()
    }
}

/// Propose a target cell for each header: the first grid cell, in row-major
/// order, whose text contains the header or is contained in it
/// (case-insensitive). Greedy per header; two headers may pick the same cell.
pub fn suggest_mappings(headers: &[String], grid: &GridModel) -> Vec<ColumnMapping> {
    let labels: Vec<(&str, String)> = grid
        .cells()
        .filter_map(|cell| {
            let text = cell.value.as_deref()?.trim();
            (!text.is_empty()).then(|| (cell.address.as_str(), text.to_lowercase()))
        })
        .collect();

    headers
        .iter()
        .filter_map(|header| {
            let needle = header.trim().to_lowercase();
            if needle.is_empty() {
                return None;
            }
            labels
                .iter()
                .find(|(_, text)| text.contains(&needle) || needle.contains(text.as_str()))
                .map(|(address, _)| ColumnMapping::new(header.clone(), *address))
        })
        .collect()
}
