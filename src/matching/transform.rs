//! Transform engine: assigns output columns to the cells of an area

use crate::grid::{CellCoord, CellValue, Grid};
use crate::template::{
    CellSelection, CellView, ContextPosition, ContextTransform, Edge, RuleError, TargetCol,
    TemplatePath, Transform,
};

use super::error::MatchError;
use super::position::{resolve, Frames, ResolveError};
use super::types::{AreaCell, CellTarget};

/// Assign a target column (or exclusion) to every cell of an area
///
/// `frames` describes the area itself: `current` is the matched area and
/// `parent` its enclosing area. Cells are in traversal order.
pub fn assign(
    transform: &Transform,
    cells: &mut [AreaCell],
    frames: &Frames<'_>,
    grid: &Grid,
    path: &TemplatePath,
) -> Result<(), MatchError> {
    let targets: Vec<CellTarget> = match transform {
        Transform::Positional(columns) => {
            if columns.len() != cells.len() {
                return Err(MatchError::validation(
                    path,
                    format!(
                        "positional mapping has {} columns but the area has {} cells",
                        columns.len(),
                        cells.len()
                    ),
                ));
            }
            columns.iter().cloned().map(CellTarget::from_name).collect()
        }
        Transform::Context(context) => cells
            .iter()
            .map(|cell| context_target(context, cell, frames, grid))
            .collect::<Result<_, _>>()
            .map_err(|err| MatchError::rule(path, err))?,
        Transform::Custom(map) => {
            let names = map(&*cells, &frames.input()).map_err(|err| MatchError::rule(path, err))?;
            if names.len() != cells.len() {
                return Err(MatchError::rule(
                    path,
                    RuleError::new(format!(
                        "column mapping returned {} names for {} cells",
                        names.len(),
                        cells.len()
                    )),
                ));
            }
            names.into_iter().map(CellTarget::from_name).collect()
        }
    };

    for (cell, target) in cells.iter_mut().zip(targets) {
        cell.target = target;
    }
    Ok(())
}

fn context_target(
    context: &ContextTransform,
    cell: &AreaCell,
    frames: &Frames<'_>,
    grid: &Grid,
) -> Result<CellTarget, RuleError> {
    let view = CellView {
        x: frames.current.rect.x + cell.x_offset,
        y: frames.current.rect.y + cell.y_offset,
        x_offset: cell.x_offset,
        y_offset: cell.y_offset,
        value: &cell.value,
    };
    let cell_frames = frames.with_cell(view);

    let coords = context_cells(&context.position, view, &cell_frames, grid)?;
    let values: Vec<CellValue> = coords.iter().map(|c| grid.value_at(*c).clone()).collect();

    match &context.target {
        TargetCol::CellValue => Ok(values
            .iter()
            .find(|v| !v.is_empty())
            .map(|v| CellTarget::Column(v.to_string()))
            .unwrap_or(CellTarget::Excluded)),
        TargetCol::Custom(_) if values.iter().all(CellValue::is_empty) => Ok(CellTarget::Excluded),
        TargetCol::Custom(rule) => {
            let mut input = cell_frames.with_context(&values).input();
            input.value = values.first();
            Ok(CellTarget::from_name(rule(&input)?))
        }
    }
}

/// Grid coordinates of the context cells of one cell; cells outside the grid are skipped
///
/// An edge position takes the matching edge of the nearest enclosing area that
/// extends past the current area on that side; without one there is no context.
fn context_cells(
    position: &ContextPosition,
    cell: CellView<'_>,
    frames: &Frames<'_>,
    grid: &Grid,
) -> Result<Vec<CellCoord>, RuleError> {
    // Nearest enclosing area whose edge lies outside the current area
    let edge_cell = |edge: Edge| {
        let area = frames.current.rect;
        frames.layers.iter().rev().find_map(|layer| {
            let bounds = layer.rect;
            let (x, y) = match edge {
                Edge::Top if bounds.y < area.y => (cell.x, bounds.y),
                Edge::Bottom if bounds.bottom() > area.bottom() => (cell.x, bounds.bottom() - 1),
                Edge::Left if bounds.x < area.x => (bounds.x, cell.y),
                Edge::Right if bounds.right() > area.right() => (bounds.right() - 1, cell.y),
                _ => return None,
            };
            grid.contains(x as i64, y as i64)
                .then(|| CellCoord::new(x, y))
        })
    };

    let resolve_all = |selections: &[CellSelection]| -> Result<Vec<CellCoord>, RuleError> {
        let mut coords = Vec::with_capacity(selections.len());
        for selection in selections {
            match resolve(selection, frames, grid) {
                Ok(coord) => coords.push(coord),
                Err(ResolveError::OutOfBounds { .. }) => {}
                Err(ResolveError::Rule(err)) => return Err(err),
            }
        }
        Ok(coords)
    };

    match position {
        ContextPosition::Edge(edge) => Ok(edge_cell(*edge).into_iter().collect()),
        ContextPosition::Selections(selections) => resolve_all(selections),
        ContextPosition::Custom(rule) => resolve_all(&rule(&frames.input())?),
    }
}
