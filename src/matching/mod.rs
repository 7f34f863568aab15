//! Matching engine: resolves a template tree against a grid
//!
//! A run walks the template tree top-down. For each template inside each
//! enclosing area it resolves the start cell, sizes and checks the first
//! region, tiles it along the traverse axes, assigns output columns to the
//! cells of every tile and recurses into the children.

pub mod area;
pub mod config;
pub mod constraint;
pub mod engine;
pub mod error;
pub mod position;
pub mod tiler;
pub mod transform;
pub mod types;

pub use config::{BranchErrorPolicy, MatchConfig};
pub use engine::{match_templates, validate, MatchResult};
pub use error::MatchError;
pub use types::*;
