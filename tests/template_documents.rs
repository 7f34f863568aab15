//! Integration tests for template documents loaded from TOML and JSON

use pretty_assertions::assert_eq;
use serde_json::json;

use table_tidier::template::TemplatePath;
use table_tidier::{
    tidy_document, BranchErrorPolicy, Grid, MatchConfig, MatchError, RuleRegistry,
    TemplateDocument, TemplateError, TidyConfig, TidyError,
};

const CROSS_TAB: &str = r#"
[[templates]]
start_cell = { frame = "root", y_offset = 1 }
size = { width = "to_parent", height = 1 }
traverse = { y = "after" }
constraints = [ { value_type = "string" } ]

[[templates.children]]
transform = { target_cols = ["item"] }

[[templates.children]]
start_cell = { x_offset = 1 }
size = { width = "unbounded", height = 1 }

[templates.children.transform.context]
position = [ { frame = "root", x_offset = "cell.x", y_offset = 0 } ]
target_col = { expr = '"y" + value' }
"#;

fn cross_tab_grid() -> Grid {
    Grid::from_json_str(
        r#"[
            [null, "2019", "2020"],
            ["Apples", 1, 2],
            ["Pears", 3, null]
        ]"#,
    )
    .expect("Should parse grid")
}

fn run(document: &TemplateDocument, grid: &Grid) -> Result<table_tidier::TidyOutput, TidyError> {
    tidy_document(grid, document, &RuleRegistry::new(), &TidyConfig::default())
}

#[test]
fn test_cross_tab_document() {
    let document = TemplateDocument::from_toml_str(CROSS_TAB).expect("Should load");
    let output = run(&document, &cross_tab_grid()).expect("Should tidy");

    assert_eq!(
        serde_json::to_value(&output.table).unwrap(),
        json!([
            {"item": "Apples", "y2019": 1.0, "y2020": 2.0},
            {"item": "Pears", "y2019": 3.0},
        ])
    );
}

#[test]
fn test_cross_tab_csv() {
    let document = TemplateDocument::from_toml_str(CROSS_TAB).expect("Should load");
    let output = run(&document, &cross_tab_grid()).expect("Should tidy");

    insta::assert_snapshot!(output.table.to_csv().expect("Should write CSV"), @r###"
    item,y2019,y2020
    Apples,1,2
    Pears,3,
    "###);
}

#[test]
fn test_json_document_with_camel_case_fields() {
    let document = TemplateDocument::from_json_str(
        r#"{
            "templates": [{
                "startCell": { "frame": "root", "xOffset": 0, "yOffset": 1 },
                "size": { "width": 2, "height": 1 },
                "traverse": { "y": "after" },
                "transform": { "context": { "position": "top", "targetCol": "cellValue" } }
            }]
        }"#,
    )
    .expect("Should load");
    let grid = Grid::from_json_str(r#"[["Name", "Age"], ["Alice", "30"], ["Bob", "25"]]"#)
        .expect("Should parse grid");
    let output = run(&document, &grid).expect("Should tidy");

    assert_eq!(output.table.to_csv().expect("Should write CSV"), "Name,Age\nAlice,30\nBob,25\n");
}

#[test]
fn test_map_expression_and_check() {
    let document = TemplateDocument::from_toml_str(
        r#"
        [[templates]]
        size = { width = 3, height = 1 }
        traverse = { y = "whole" }
        constraints = [ { check = 'not is_empty(value)' } ]
        transform = { map = 'if is_number(value) then "n" + str(cell.x_offset) else null' }
        "#,
    )
    .expect("Should load");
    let grid = Grid::from_json_str(r#"[["a", 1, 2], [null, 9, 9], ["b", 3, "x"]]"#)
        .expect("Should parse grid");
    let output = run(&document, &grid).expect("Should tidy");

    assert_eq!(
        serde_json::to_value(&output.table).unwrap(),
        json!([
            {"n1": 1.0, "n2": 2.0},
            {"n1": 3.0},
        ])
    );
}

#[test]
fn test_named_rules_from_registry() {
    let mut registry = RuleRegistry::new();
    registry
        .register_offset("last_column", |input| Ok(input.current.rect.width as i64 - 1))
        .unwrap();
    registry
        .register_predicate("is_total", |value| Ok(value.as_str() == Some("Total")))
        .unwrap();

    let document = TemplateDocument::from_toml_str(
        r#"
        [[templates]]
        start_cell = { frame = "root", x_offset = { rule = "last_column" } }
        constraints = [ { rule = "is_total" } ]
        traverse = { y = "whole" }
        transform = { target_cols = ["total"] }
        "#,
    )
    .expect("Should load");
    let grid = Grid::from_json_str(r#"[["a", "Total"], ["b", "x"], ["c", "Total"]]"#)
        .expect("Should parse grid");
    let output = tidy_document(&grid, &document, &registry, &TidyConfig::default())
        .expect("Should tidy");

    let sources: Vec<(usize, usize)> = output
        .table
        .rows()
        .iter()
        .filter_map(|row| row.source("total"))
        .map(|c| (c.x, c.y))
        .collect();
    assert_eq!(sources, vec![(1, 0), (1, 2)]);
}

#[test]
fn test_unknown_rule_is_load_error() {
    let document = TemplateDocument::from_toml_str(
        r#"
        [[templates]]
        [[templates.children]]
        constraints = [ { rule = "missing" } ]
        "#,
    )
    .expect("Should load");
    let err = run(&document, &cross_tab_grid()).unwrap_err();

    match err {
        TidyError::Template(e @ TemplateError::Registry { .. }) => {
            assert_eq!(e.path(), Some(&TemplatePath(vec![0, 0])));
        }
        other => panic!("expected a registry error, got {other}"),
    }
}

#[test]
fn test_malformed_expression_reports_source() {
    let document = TemplateDocument::from_toml_str(
        r#"
        [[templates]]
        start_cell = { x_offset = "current.width - " }
        "#,
    )
    .expect("Should load");
    let err = document.resolve(&RuleRegistry::new()).unwrap_err();

    assert!(matches!(err, TemplateError::Expression { .. }));
    assert!(err
        .to_string()
        .starts_with("invalid expression in start_cell.x_offset of template 0"));
    assert!(!err.report().is_empty());
}

#[test]
fn test_unknown_frame_is_rejected() {
    let result = TemplateDocument::from_toml_str(
        r#"
        [[templates]]
        start_cell = { frame = "grandparent" }
        "#,
    );
    assert!(matches!(result, Err(TemplateError::Toml(_))));
}

#[test]
fn test_expression_type_error_is_rule_error() {
    let document = TemplateDocument::from_toml_str(
        r#"
        [[templates]]
        start_cell = { x_offset = '"a" * 2' }
        "#,
    )
    .expect("Should load");
    let grid = cross_tab_grid();
    let err = run(&document, &grid).unwrap_err();
    assert!(matches!(err, TidyError::Match(MatchError::Rule { .. })));

    let config = TidyConfig::new()
        .with_matching(MatchConfig::new().with_branch_errors(BranchErrorPolicy::Skip));
    let output = tidy_document(&grid, &document, &RuleRegistry::new(), &config)
        .expect("Should skip the failing branch");
    assert_eq!(output.diagnostics.len(), 1);
    assert_eq!(output.areas.len(), 1);
}
