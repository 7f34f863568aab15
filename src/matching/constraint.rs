//! Constraint evaluator

use crate::grid::{CellValue, Grid};
use crate::template::{Constraint, RuleError, ValueCheck, ValueType};

use super::position::{resolve, Frames, ResolveError};

/// Apply a value check to a single cell value
pub fn check_value(check: &ValueCheck, value: &CellValue) -> Result<bool, RuleError> {
    match check {
        ValueCheck::Equals(expected) => Ok(value == expected),
        ValueCheck::Type(ValueType::String) => Ok(value.is_text()),
        ValueCheck::Type(ValueType::Number) => Ok(value.is_number()),
        ValueCheck::Type(ValueType::None) => Ok(value.is_empty()),
        ValueCheck::Custom(predicate) => predicate(value),
    }
}

/// Whether every constraint holds for the area described by `frames`
///
/// A constraint cell outside the grid rejects the candidate.
pub fn satisfied(constraints: &[Constraint], frames: &Frames<'_>, grid: &Grid) -> Result<bool, RuleError> {
    for constraint in constraints {
        let coord = match resolve(&constraint.selection, frames, grid) {
            Ok(coord) => coord,
            Err(ResolveError::OutOfBounds { x, y }) => {
                log::trace!("constraint cell ({}, {}) is outside the grid", x, y);
                return Ok(false);
            }
            Err(ResolveError::Rule(err)) => return Err(err),
        };
        if !check_value(&constraint.check, grid.value_at(coord))? {
            return Ok(false);
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::types::Rect;
    use crate::template::{AreaView, CellSelection, ReferenceFrame};

    fn grid() -> Grid {
        Grid::from_rows(vec![
            vec![CellValue::text("Name"), CellValue::text("Age")],
            vec![CellValue::text("Alice"), CellValue::Number(30.0)],
            vec![CellValue::Empty, CellValue::Empty],
        ])
    }

    fn layers() -> [AreaView; 1] {
        [AreaView {
            rect: Rect::new(0, 0, 2, 3),
            ..AreaView::default()
        }]
    }

    fn candidate(y: usize) -> AreaView {
        AreaView {
            rect: Rect::new(0, y, 2, 1),
            layer: 1,
            ..AreaView::default()
        }
    }

    #[test]
    fn test_check_value_kinds() {
        let text = CellValue::text("x");
        let number = CellValue::Number(1.0);
        let empty = CellValue::Empty;
        assert!(check_value(&ValueCheck::Type(ValueType::String), &text).unwrap());
        assert!(!check_value(&ValueCheck::Type(ValueType::String), &number).unwrap());
        assert!(check_value(&ValueCheck::Type(ValueType::Number), &number).unwrap());
        assert!(check_value(&ValueCheck::Type(ValueType::None), &empty).unwrap());
        assert!(!check_value(&ValueCheck::Type(ValueType::None), &text).unwrap());
        assert!(check_value(&ValueCheck::Equals(CellValue::text("x")), &text).unwrap());
    }

    #[test]
    fn test_all_constraints_must_hold() {
        let grid = grid();
        let layers = layers();
        let constraints = vec![
            Constraint::of_type(CellSelection::new(), ValueType::String),
            Constraint::of_type(CellSelection::at(ReferenceFrame::Current, 1, 0), ValueType::Number),
        ];

        let row = |y| Frames::for_area(candidate(y), &layers);
        assert!(satisfied(&constraints, &row(1), &grid).unwrap());
        assert!(!satisfied(&constraints, &row(0), &grid).unwrap());
        assert!(!satisfied(&constraints, &row(2), &grid).unwrap());
    }

    #[test]
    fn test_out_of_bounds_constraint_rejects() {
        let grid = grid();
        let layers = layers();
        let constraints = vec![Constraint::of_type(
            CellSelection::at(ReferenceFrame::Current, 0, 1),
            ValueType::None,
        )];
        let frames = Frames::for_area(candidate(2), &layers);
        assert!(!satisfied(&constraints, &frames, &grid).unwrap());
    }

    #[test]
    fn test_custom_predicate_error_propagates() {
        let grid = grid();
        let layers = layers();
        let constraints = vec![Constraint::custom(CellSelection::new(), |_| {
            Err(RuleError::new("broken predicate"))
        })];
        let frames = Frames::for_area(candidate(0), &layers);
        assert_eq!(
            satisfied(&constraints, &frames, &grid),
            Err(RuleError::new("broken predicate"))
        );
    }

    #[test]
    fn test_evaluation_is_idempotent() {
        let grid = grid();
        let layers = layers();
        let constraints = vec![Constraint::equals(CellSelection::new(), "Alice")];
        let frames = Frames::for_area(candidate(1), &layers);
        let first = satisfied(&constraints, &frames, &grid).unwrap();
        assert_eq!(first, satisfied(&constraints, &frames, &grid).unwrap());
        assert!(first);
    }
}
