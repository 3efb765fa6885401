//! Mapping suggestion, validation and recall against real workbooks

mod common;

use common::{customers, form_template, grid_of};
use pretty_assertions::assert_eq;
use sheetfill::excel::parse_input;
use sheetfill::mapping::{
    suggest_mappings, JsonFileStore, MappingIssue, MappingMemory, MappingStore,
};
use sheetfill::ColumnMapping;
use tempfile::TempDir;

#[test]
fn test_suggestions_follow_template_labels() {
    let data = parse_input(&customers()).unwrap();
    let grid = grid_of(&form_template(), None);

    let suggestions = suggest_mappings(&data.headers, &grid);
    assert_eq!(
        suggestions,
        vec![
            ColumnMapping::new("Name", "A2"),
            ColumnMapping::new("Code", "A3"),
            ColumnMapping::new("City", "A4"),
        ]
    );

    let mut sources: Vec<&str> = suggestions.iter().map(|m| m.source_column.as_str()).collect();
    sources.dedup();
    assert_eq!(sources.len(), suggestions.len());
}

#[test]
fn test_validation_against_template_grid() {
    let data = parse_input(&customers()).unwrap();
    let grid = grid_of(&form_template(), None);

    let mut store = MappingStore::new();
    store.add("Name", "B2");
    store.add("Code", "E2");
    store.add("City", "B2");

    let issues = store.validate(&data.headers, Some(&grid));
    assert_eq!(
        issues,
        vec![
            MappingIssue::MergedMember {
                source_column: "Code".into(),
                target: "E2".into(),
                anchor: "D1".into(),
            },
            MappingIssue::DuplicateTarget {
                target: "B2".into(),
                sources: vec!["Name".into(), "City".into()],
            },
        ]
    );
}

#[test]
fn test_recall_across_sessions_with_file_store() {
    let dir = TempDir::new().unwrap();
    let store_path = dir.path().join("mappings.json");
    let data = parse_input(&customers()).unwrap();

    let mut mappings = MappingStore::new();
    mappings.add("Name", "B2");
    mappings.add("City", "B4");
    MappingMemory::new(JsonFileStore::new(&store_path)).remember(
        &data.headers,
        "invoice.xlsx",
        &mappings,
    );

    let raw = std::fs::read_to_string(&store_path).unwrap();
    assert!(raw.contains("excel-mapping-input-Name-Code-City-template-invoice.xlsx"));

    let memory = MappingMemory::new(JsonFileStore::new(&store_path));
    assert_eq!(memory.recall(&data.headers, "invoice.xlsx"), Some(mappings));

    // a different header set is a different key
    let fewer = vec!["Name".to_string(), "Code".to_string()];
    assert_eq!(memory.recall(&fewer, "invoice.xlsx"), None);
}
