//! Position resolver: relative cell selections to absolute coordinates

use thiserror::Error;

use crate::grid::{CellCoord, CellValue, Grid};
use crate::template::{AreaView, CellSelection, CellView, Corner, ReferenceFrame, RuleError, RuleInput};

/// Areas a cell selection can be relative to
#[derive(Debug, Clone, Copy)]
pub struct Frames<'a> {
    pub current: AreaView,
    pub parent: Option<AreaView>,
    /// Root down to the enclosing area, indexed by layer
    pub layers: &'a [AreaView],
    pub cell: Option<CellView<'a>>,
    pub context: &'a [CellValue],
}

impl<'a> Frames<'a> {
    /// Frames for resolving a start cell: the area has no bounds yet, so
    /// `current` and `parent` both bind to the enclosing area
    pub fn for_start(layers: &'a [AreaView]) -> Self {
        let enclosing = layers.last().copied().unwrap_or_default();
        Self {
            current: enclosing,
            parent: Some(enclosing),
            layers,
            cell: None,
            context: &[],
        }
    }

    /// Frames for a candidate or matched area inside the last layer
    pub fn for_area(current: AreaView, layers: &'a [AreaView]) -> Self {
        Self {
            current,
            parent: layers.last().copied(),
            layers,
            cell: None,
            context: &[],
        }
    }

    pub fn with_cell(mut self, cell: CellView<'a>) -> Self {
        self.cell = Some(cell);
        self
    }

    pub fn with_context(mut self, context: &'a [CellValue]) -> Self {
        self.context = context;
        self
    }

    pub fn root(&self) -> AreaView {
        self.layers.first().copied().unwrap_or(self.current)
    }

    /// Rule input for computed fields
    pub fn input(&self) -> RuleInput<'a> {
        RuleInput {
            current: self.current,
            parent: self.parent,
            root: self.root(),
            cell: self.cell,
            value: self.cell.map(|cell| cell.value),
            context: self.context,
        }
    }

    fn layer(&self, layer: i64) -> Result<AreaView, RuleError> {
        let index = usize::try_from(layer)
            .map_err(|_| RuleError::new(format!("layer must not be negative, got {}", layer)))?;
        if let Some(view) = self.layers.get(index) {
            return Ok(*view);
        }
        if index == self.current.layer {
            return Ok(self.current);
        }
        Err(RuleError::new(format!(
            "layer {} is deeper than the current area (layer {})",
            layer, self.current.layer
        )))
    }

    fn reference(&self, frame: &ReferenceFrame, input: &RuleInput<'_>) -> Result<AreaView, RuleError> {
        match frame {
            ReferenceFrame::Current => Ok(self.current),
            ReferenceFrame::Parent => Ok(self.parent.unwrap_or_else(|| self.root())),
            ReferenceFrame::Root => Ok(self.root()),
            ReferenceFrame::Layer(layer) => self.layer(layer.resolve(input)?),
        }
    }
}

/// Errors raised while resolving a cell selection
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ResolveError {
    #[error("cell ({x}, {y}) is outside the grid")]
    OutOfBounds { x: i64, y: i64 },

    #[error(transparent)]
    Rule(#[from] RuleError),
}

/// Resolve a selection to a coordinate that may lie outside the grid
pub fn resolve_unchecked(selection: &CellSelection, frames: &Frames<'_>) -> Result<(i64, i64), RuleError> {
    let input = frames.input();
    let reference = frames.reference(&selection.frame, &input)?;
    let rect = reference.rect;

    let left = rect.x as i64;
    let top = rect.y as i64;
    let right = left + rect.width as i64 - 1;
    let bottom = top + rect.height as i64 - 1;
    let (x, y) = match selection.corner {
        Corner::TopLeft => (left, top),
        Corner::TopRight => (right, top),
        Corner::BottomLeft => (left, bottom),
        Corner::BottomRight => (right, bottom),
    };

    let dx = selection.x_offset.resolve(&input)?;
    let dy = selection.y_offset.resolve(&input)?;
    Ok((x.saturating_add(dx), y.saturating_add(dy)))
}

/// Resolve a selection to a coordinate inside the grid
pub fn resolve(
    selection: &CellSelection,
    frames: &Frames<'_>,
    grid: &Grid,
) -> Result<CellCoord, ResolveError> {
    let (x, y) = resolve_unchecked(selection, frames)?;
    if grid.contains(x, y) {
        Ok(CellCoord::new(x as usize, y as usize))
    } else {
        Err(ResolveError::OutOfBounds { x, y })
    }
}
