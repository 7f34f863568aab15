//! Tiler: repeats a matched area along the traverse axes

use crate::template::{Direction, Traverse};

use super::area::AreaMatcher;
use super::error::MatchError;
use super::types::Rect;

/// One accepted tile of a tiling run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub rect: Rect,
    pub x_index: usize,
    pub y_index: usize,
}

/// All tiles of a template inside the matcher's enclosing area
///
/// `first` must be an accepted area. With two active axes the scan is
/// row-major: rows are found along y at the anchor's column, then each row is
/// scanned along x from the anchor's column.
pub fn tile(
    matcher: &AreaMatcher<'_>,
    first: Rect,
    traverse: &Traverse,
    max_tiles: usize,
) -> Result<Vec<Placement>, MatchError> {
    let bounds = matcher.enclosing().rect;
    let (width, height) = (first.width, first.height);
    let overflow = || MatchError::TraversalOverflow {
        path: matcher.path().clone(),
        limit: max_tiles,
    };

    let rows = scan_axis(
        traverse.y,
        first.y as i64,
        height as i64,
        (bounds.y as i64, bounds.bottom() as i64),
        |y| matcher.accepts(first.x as i64, y, width, height),
    )?;
    if rows.len() > max_tiles {
        return Err(overflow());
    }

    let mut placements = Vec::new();
    for (y_index, &y) in rows.iter().enumerate() {
        let columns = scan_axis(
            traverse.x,
            first.x as i64,
            width as i64,
            (bounds.x as i64, bounds.right() as i64),
            |x| matcher.accepts(x, y, width, height),
        )?;
        for (x_index, &x) in columns.iter().enumerate() {
            log::trace!(
                "template {} tile ({}, {}) at ({}, {})",
                matcher.path(),
                x_index,
                y_index,
                x,
                y
            );
            placements.push(Placement {
                rect: Rect::new(x as usize, y as usize, width, height),
                x_index,
                y_index,
            });
            if placements.len() > max_tiles {
                return Err(overflow());
            }
        }
    }
    Ok(placements)
}

/// Accepted tile positions along one axis, ascending
///
/// The anchor is accepted by the caller; `bounds` is the half-open range of
/// the enclosing area on this axis.
fn scan_axis(
    direction: Direction,
    anchor: i64,
    step: i64,
    bounds: (i64, i64),
    mut accept: impl FnMut(i64) -> Result<bool, MatchError>,
) -> Result<Vec<i64>, MatchError> {
    let (lo, hi) = bounds;
    let fits = |p: i64| p >= lo && p + step <= hi;

    let mut found = Vec::new();
    match direction {
        Direction::None => found.push(anchor),
        Direction::After => {
            found.push(anchor);
            let mut p = anchor + step;
            while fits(p) && accept(p)? {
                found.push(p);
                p += step;
            }
        }
        Direction::Before => {
            let mut p = anchor - step;
            while fits(p) && accept(p)? {
                found.push(p);
                p -= step;
            }
            found.reverse();
            found.push(anchor);
        }
        Direction::Whole => {
            let mut p = anchor - step * ((anchor - lo) / step);
            while fits(p) {
                if p == anchor || accept(p)? {
                    found.push(p);
                }
                p += step;
            }
        }
    }
    Ok(found)
}
