//! Table Tidier - Reshape messy spreadsheet grids into tidy tables
//!
//! This library matches a tree of declarative templates against a 2D grid of
//! cells, repeats matched regions along the traverse axes, assigns each
//! matched cell to an output column and assembles the result into rows.
//!
//! # Example
//!
//! ```rust
//! use table_tidier::grid::Grid;
//! use table_tidier::template::{
//!     CellSelection, ContextPosition, Direction, Edge, ReferenceFrame, Size, TargetCol,
//!     Template, Transform,
//! };
//! use table_tidier::tidy;
//!
//! let grid = Grid::from_rows(vec![
//!     vec!["Name", "Age"],
//!     vec!["Alice", "30"],
//!     vec!["Bob", "25"],
//! ]);
//! let data = Template::new()
//!     .start_at(CellSelection::at(ReferenceFrame::Root, 0, 1))
//!     .with_size(Size::cells(2, 1))
//!     .traverse_y(Direction::After)
//!     .with_transform(Transform::context(
//!         ContextPosition::Edge(Edge::Top),
//!         TargetCol::CellValue,
//!     ));
//!
//! let output = tidy(&grid, &[data]).unwrap();
//! assert_eq!(output.table.len(), 2);
//! assert_eq!(output.table.to_csv().unwrap(), "Name,Age\nAlice,30\nBob,25\n");
//! ```

pub mod error;
pub mod expr;
pub mod grid;
pub mod matching;
pub mod output;
pub mod template;

pub use error::ParseError;
pub use grid::{CellCoord, CellValue, Grid};
pub use matching::{match_templates, AreaTree, BranchErrorPolicy, MatchConfig, MatchError};
pub use output::{geometry_tree, GeometryNode, OutputError, TidyTable};
pub use template::{RuleRegistry, Template, TemplateDocument, TemplateError};

use thiserror::Error;

/// Errors that can occur in the tidy pipeline
#[derive(Debug, Error)]
pub enum TidyError {
    /// Error while loading or resolving a template document
    #[error("template error: {0}")]
    Template(#[from] TemplateError),

    /// Error during matching
    #[error("match error: {0}")]
    Match(#[from] MatchError),
}

/// Configuration for the complete tidy pipeline
#[derive(Debug, Clone, Default)]
pub struct TidyConfig {
    /// Matching limits and branch error policy
    pub matching: MatchConfig,
    /// Debug mode: print the area tree to stderr
    pub debug: bool,
}

impl TidyConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the match configuration
    pub fn with_matching(mut self, config: MatchConfig) -> Self {
        self.matching = config;
        self
    }

    /// Enable or disable debug mode
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

/// Everything a run produces
#[derive(Debug, Clone, PartialEq)]
pub struct TidyOutput {
    pub areas: AreaTree,
    pub table: TidyTable,
    pub geometry: GeometryNode,
    /// Branch errors skipped under [`BranchErrorPolicy::Skip`]
    pub diagnostics: Vec<MatchError>,
}

/// Tidy a grid with default configuration
pub fn tidy(grid: &Grid, templates: &[Template]) -> Result<TidyOutput, TidyError> {
    tidy_with_config(grid, templates, &TidyConfig::default())
}

/// Tidy a grid with custom configuration
///
/// # Example
///
/// ```rust
/// use table_tidier::{tidy_with_config, BranchErrorPolicy, Grid, MatchConfig, TidyConfig};
/// use table_tidier::template::{Size, Template, Transform};
///
/// let config = TidyConfig::new().with_matching(
///     MatchConfig::new()
///         .with_max_tiles(100)
///         .with_branch_errors(BranchErrorPolicy::Skip),
/// );
/// let grid = Grid::from_rows(vec![vec!["a", "b"]]);
/// let template = Template::new()
///     .with_size(Size::cells(2, 1))
///     .with_transform(Transform::positional([Some("first"), None]));
///
/// let output = tidy_with_config(&grid, &[template], &config).unwrap();
/// assert_eq!(output.table.columns(), ["first"]);
/// ```
pub fn tidy_with_config(
    grid: &Grid,
    templates: &[Template],
    config: &TidyConfig,
) -> Result<TidyOutput, TidyError> {
    let result = match_templates(grid, templates, &config.matching)?;

    if config.debug {
        eprintln!("=== Area Tree ===");
        eprint!("{}", result.tree.outline());
        for skipped in &result.diagnostics {
            eprintln!("skipped: {}", skipped);
        }
        eprintln!("=================");
    }

    let table = TidyTable::from_tree(&result.tree);
    let geometry = geometry_tree(templates, &result.tree);
    Ok(TidyOutput {
        areas: result.tree,
        table,
        geometry,
        diagnostics: result.diagnostics,
    })
}

/// Resolve a template document against a rule registry, then tidy the grid
pub fn tidy_document(
    grid: &Grid,
    document: &TemplateDocument,
    registry: &RuleRegistry,
    config: &TidyConfig,
) -> Result<TidyOutput, TidyError> {
    let templates = document.resolve(registry)?;
    tidy_with_config(grid, &templates, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{CellSelection, Constraint, RuleError};

    #[test]
    fn test_tidy_empty_grid() {
        let output = tidy(&Grid::default(), &[Template::new()]).unwrap();
        assert!(output.table.is_empty());
        assert_eq!(output.areas.len(), 1);
        assert_eq!(output.geometry.children[0].matches, vec![]);
    }

    #[test]
    fn test_tidy_document() {
        let document = TemplateDocument::from_toml_str(
            r#"
            [[templates]]
            size = { width = 2, height = 1 }
            transform = { target_cols = ["left", "right"] }
            "#,
        )
        .unwrap();
        let grid = Grid::from_rows(vec![vec!["1", "2"]]);
        let output =
            tidy_document(&grid, &document, &RuleRegistry::new(), &TidyConfig::default()).unwrap();
        assert_eq!(output.table.to_csv().unwrap(), "left,right\n1,2\n");
    }

    #[test]
    fn test_match_error_is_wrapped() {
        let failing = Template::new().with_constraint(Constraint::custom(CellSelection::new(), |_| {
            Err(RuleError::new("boom"))
        }));
        let grid = Grid::from_rows(vec![vec!["x"]]);
        let err = tidy(&grid, &[failing]).unwrap_err();
        assert!(matches!(err, TidyError::Match(MatchError::Rule { .. })));
        assert!(err.to_string().starts_with("match error:"));
    }

    #[test]
    fn test_skip_policy_reports_diagnostics() {
        let failing = Template::new().with_constraint(Constraint::custom(CellSelection::new(), |_| {
            Err(RuleError::new("boom"))
        }));
        let config = TidyConfig::new()
            .with_matching(MatchConfig::new().with_branch_errors(BranchErrorPolicy::Skip));
        let grid = Grid::from_rows(vec![vec!["x"]]);
        let output = tidy_with_config(&grid, &[failing], &config).unwrap();
        assert_eq!(output.diagnostics.len(), 1);
        assert!(output.table.is_empty());
    }
}
