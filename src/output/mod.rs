//! Output of a match run: the tidy table and the geometry tree

mod geometry;
mod tidy;

pub use geometry::{geometry_tree, GeometryNode};
pub use tidy::{OutputError, TidyRow, TidyTable, TidyValue};
