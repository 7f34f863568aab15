//! Area matcher: finds and sizes the first area of a template

use crate::grid::Grid;
use crate::template::{AreaView, Extent, Template, TemplatePath};

use super::constraint;
use super::error::MatchError;
use super::position::{resolve, Frames, ResolveError};
use super::types::Rect;

/// Outcome of looking for the first area of a template
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirstMatch {
    Matched(Rect),
    /// The start cell resolved outside the grid
    StartOutOfBounds { x: i64, y: i64 },
    /// The region does not fit or its constraints fail
    NoMatch,
}

/// Matches one template inside one enclosing area
#[derive(Debug, Clone, Copy)]
pub struct AreaMatcher<'a> {
    grid: &'a Grid,
    template: &'a Template,
    path: &'a TemplatePath,
    /// Root down to the enclosing area
    layers: &'a [AreaView],
}

impl<'a> AreaMatcher<'a> {
    pub fn new(
        grid: &'a Grid,
        template: &'a Template,
        path: &'a TemplatePath,
        layers: &'a [AreaView],
    ) -> Self {
        Self {
            grid,
            template,
            path,
            layers,
        }
    }

    pub fn path(&self) -> &'a TemplatePath {
        self.path
    }

    pub fn layers(&self) -> &'a [AreaView] {
        self.layers
    }

    pub fn enclosing(&self) -> AreaView {
        self.layers.last().copied().unwrap_or_default()
    }

    /// Resolve the start cell, size the region and check its constraints
    pub fn first_match(&self) -> Result<FirstMatch, MatchError> {
        let frames = Frames::for_start(self.layers);
        let anchor = match resolve(&self.template.start_cell, &frames, self.grid) {
            Ok(coord) => coord,
            Err(ResolveError::OutOfBounds { x, y }) => {
                return Ok(FirstMatch::StartOutOfBounds { x, y })
            }
            Err(ResolveError::Rule(err)) => return Err(MatchError::rule(self.path, err)),
        };

        let Some((width, height)) = self.extent(anchor.x, anchor.y) else {
            return Ok(FirstMatch::NoMatch);
        };
        let rect = Rect::new(anchor.x, anchor.y, width, height);
        if self.accepts(rect.x as i64, rect.y as i64, width, height)? {
            Ok(FirstMatch::Matched(rect))
        } else {
            Ok(FirstMatch::NoMatch)
        }
    }

    /// Whether a region of the given size at (x, y) is an area of the template
    ///
    /// Tile indices are assigned once a scan is complete, so rules evaluated
    /// here see index 0.
    pub fn accepts(&self, x: i64, y: i64, width: usize, height: usize) -> Result<bool, MatchError> {
        if x < 0 || y < 0 || width == 0 || height == 0 {
            return Ok(false);
        }
        let enclosing = self.enclosing();
        let rect = Rect::new(x as usize, y as usize, width, height);
        if !enclosing.rect.contains_rect(&rect) {
            return Ok(false);
        }

        let view = AreaView {
            rect,
            layer: enclosing.layer + 1,
            x_index: 0,
            y_index: 0,
        };
        let frames = Frames::for_area(view, self.layers);
        constraint::satisfied(&self.template.constraints, &frames, self.grid)
            .map_err(|err| MatchError::rule(self.path, err))
    }

    /// Width and height of the region anchored at (x, y)
    fn extent(&self, x: usize, y: usize) -> Option<(usize, usize)> {
        let bounds = self.enclosing().rect;
        let size = self.template.size;

        let along = |extent: Extent, anchor: usize, far: usize| match extent {
            Extent::Cells(n) => Some(n),
            Extent::ToParent | Extent::Unbounded => far.checked_sub(anchor).filter(|n| *n > 0),
        };
        let mut width = along(size.width, x, bounds.right())?;
        let mut height = along(size.height, y, bounds.bottom())?;
        if width == 0 || height == 0 {
            return None;
        }

        if size.width == Extent::Unbounded {
            while width > 1 && (y..y + height).all(|row| self.grid.get(x + width - 1, row).is_empty()) {
                width -= 1;
            }
        }
        if size.height == Extent::Unbounded {
            while height > 1 && (x..x + width).all(|col| self.grid.get(col, y + height - 1).is_empty()) {
                height -= 1;
            }
        }
        Some((width, height))
    }
}
