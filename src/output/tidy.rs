//! Output assembler: flattens the area tree into tidy rows

use std::collections::{HashMap, HashSet};

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::grid::{CellCoord, CellValue};
use crate::matching::{AreaId, AreaInfo, AreaTree};

/// Errors that can occur when rendering a tidy table
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("failed to serialize JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to write CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to flush CSV: {0}")]
    CsvFlush(#[from] csv::IntoInnerError<csv::Writer<Vec<u8>>>),

    #[error("CSV output is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// A tidy value and the grid cell it came from
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TidyValue {
    pub value: CellValue,
    pub source: CellCoord,
}

/// One output row: column name to value, in assignment order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TidyRow {
    entries: Vec<(String, TidyValue)>,
}

impl TidyRow {
    pub fn get(&self, column: &str) -> Option<&CellValue> {
        self.entry(column).map(|v| &v.value)
    }

    /// Source coordinate of a column's value
    pub fn source(&self, column: &str) -> Option<CellCoord> {
        self.entry(column).map(|v| v.source)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.entry(column).is_some()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &TidyValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry(&self, column: &str) -> Option<&TidyValue> {
        self.entries
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, v)| v)
    }
}

impl Serialize for TidyRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (column, value) in &self.entries {
            map.serialize_entry(column, &value.value)?;
        }
        map.end()
    }
}

/// The tidy table of a match run
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TidyTable {
    columns: Vec<String>,
    rows: Vec<TidyRow>,
}

impl TidyTable {
    /// Assemble rows from a resolved area tree
    ///
    /// Cells are visited in pre-order. A cell joins the row of its record
    /// area; assigning a column twice within one record opens a new row.
    pub fn from_tree(tree: &AreaTree) -> Self {
        let mut table = TidyTable::default();
        let mut known: HashSet<String> = HashSet::new();
        let mut open_rows: HashMap<AreaId, usize> = HashMap::new();

        for id in tree.preorder() {
            let area = &tree[id];
            let mut record = None;

            for cell in &area.cells {
                let Some(column) = cell.column() else {
                    continue;
                };
                let record = *record.get_or_insert_with(|| record_of(tree, area));

                let row = match open_rows.get(&record) {
                    Some(&row) if !table.rows[row].contains(column) => row,
                    _ => {
                        table.rows.push(TidyRow::default());
                        open_rows.insert(record, table.rows.len() - 1);
                        table.rows.len() - 1
                    }
                };

                if known.insert(column.to_string()) {
                    table.columns.push(column.to_string());
                }
                table.rows[row].entries.push((
                    column.to_string(),
                    TidyValue {
                        value: cell.value.clone(),
                        source: area.coord_of(cell),
                    },
                ));
            }
        }

        log::debug!(
            "assembled {} row(s) over {} column(s)",
            table.rows.len(),
            table.columns.len()
        );
        table
    }

    /// Column names in order of first assignment
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[TidyRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows holding a value taken from the given grid cell
    pub fn rows_from(&self, source: CellCoord) -> Vec<usize> {
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, row)| row.entries.iter().any(|(_, v)| v.source == source))
            .map(|(i, _)| i)
            .collect()
    }

    pub fn to_json(&self) -> Result<String, OutputError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// CSV with a header line; absent values are empty fields
    pub fn to_csv(&self) -> Result<String, OutputError> {
        let mut wtr = csv::Writer::from_writer(Vec::new());
        wtr.write_record(&self.columns)?;
        for row in &self.rows {
            wtr.write_record(
                self.columns
                    .iter()
                    .map(|column| row.get(column).map(CellValue::to_string).unwrap_or_default()),
            )?;
        }
        let bytes = wtr.into_inner()?;
        Ok(String::from_utf8(bytes)?)
    }
}

impl Serialize for TidyTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.rows.len()))?;
        for row in &self.rows {
            seq.serialize_element(row)?;
        }
        seq.end()
    }
}

/// Area whose cells share output rows with `area`
///
/// The nearest ancestor-or-self flagged as a record, else the shallowest
/// repeating area on the chain, else the root.
fn record_of(tree: &AreaTree, area: &AreaInfo) -> AreaId {
    if let Some(flagged) = tree.ancestors(area.id).find(|a| a.record) {
        return flagged.id;
    }
    tree.ancestors(area.id)
        .filter(|a| a.repeating)
        .last()
        .map(|a| a.id)
        .unwrap_or(AreaId::ROOT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Grid;
    use crate::matching::{match_templates, MatchConfig};
    use crate::template::{
        CellSelection, ContextPosition, Direction, Edge, ReferenceFrame, Size, TargetCol,
        Template, Transform,
    };

    fn tidy(grid: &Grid, templates: &[Template]) -> TidyTable {
        let result = match_templates(grid, templates, &MatchConfig::default()).unwrap();
        TidyTable::from_tree(&result.tree)
    }

    #[test]
    fn test_each_repeating_area_is_a_row() {
        let grid = Grid::from_rows(vec![
            vec!["Name", "Age"],
            vec!["Alice", "30"],
            vec!["Bob", "25"],
        ]);
        let data = Template::new()
            .start_at(CellSelection::at(ReferenceFrame::Root, 0, 1))
            .with_size(Size::cells(2, 1))
            .traverse_y(Direction::After)
            .with_transform(Transform::context(
                ContextPosition::Edge(Edge::Top),
                TargetCol::CellValue,
            ));
        let table = tidy(&grid, &[Template::new().with_size(Size::cells(2, 1)), data]);

        assert_eq!(table.columns(), ["Name", "Age"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows()[1].get("Name"), Some(&CellValue::text("Bob")));
        assert_eq!(table.rows()[1].source("Age"), Some(CellCoord::new(1, 2)));
        assert_eq!(table.rows_from(CellCoord::new(0, 1)), vec![0]);
    }

    #[test]
    fn test_repeated_column_opens_new_row() {
        // Without a repeating template everything belongs to the root record
        let grid = Grid::from_rows(vec![vec!["a", "b", "c"]]);
        let template = Template::new()
            .with_size(Size::cells(3, 1))
            .with_transform(Transform::positional([Some("X"), Some("Y"), Some("X")]));
        let table = tidy(&grid, &[template]);

        assert_eq!(table.len(), 2);
        assert_eq!(table.rows()[0].len(), 2);
        assert_eq!(table.rows()[1].get("X"), Some(&CellValue::text("c")));
    }

    #[test]
    fn test_record_flag_groups_child_cells() {
        // Each row block holds a label cell and a value cell matched by two children
        let grid = Grid::from_rows(vec![vec!["k1", "v1"], vec!["k2", "v2"]]);
        let key = Template::new().with_transform(Transform::positional([Some("key")]));
        let value = Template::new()
            .start_at(CellSelection::at(ReferenceFrame::Current, 1, 0))
            .with_transform(Transform::positional([Some("value")]));
        let block = Template::new()
            .with_size(Size::cells(2, 1))
            .traverse_y(Direction::After)
            .as_record()
            .with_child(key)
            .with_child(value);
        let table = tidy(&grid, &[block]);

        assert_eq!(table.len(), 2);
        assert_eq!(table.rows()[0].get("key"), Some(&CellValue::text("k1")));
        assert_eq!(table.rows()[0].get("value"), Some(&CellValue::text("v1")));
        assert_eq!(table.rows()[1].get("value"), Some(&CellValue::text("v2")));
    }

    #[test]
    fn test_csv_quotes_special_characters() {
        let grid = Grid::from_rows(vec![vec!["1,5", "say \"hi\""]]);
        let template = Template::new()
            .with_size(Size::cells(2, 1))
            .with_transform(Transform::positional([Some("a"), Some("b")]));
        let table = tidy(&grid, &[template]);
        assert_eq!(table.to_csv().unwrap(), "a,b\n\"1,5\",\"say \"\"hi\"\"\"\n");
    }

    #[test]
    fn test_json_keeps_column_order() {
        let grid = Grid::from_rows(vec![vec![CellValue::text("z"), CellValue::Number(2.0)]]);
        let template = Template::new()
            .with_size(Size::cells(2, 1))
            .with_transform(Transform::positional([Some("zeta"), Some("alpha")]));
        let table = tidy(&grid, &[template]);
        let json = serde_json::to_string(&table).unwrap();
        assert_eq!(json, r#"[{"zeta":"z","alpha":2.0}]"#);
    }
}
