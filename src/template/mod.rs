//! Template model
//!
//! A template describes where a region of the grid sits, how repetitions of
//! it are found and how its cells map to output columns. Templates nest: each
//! child is matched inside every area matched by its parent.
//!
//! Templates are built either in Rust, with literal values and closures:
//!
//! ```rust
//! use table_tidier::template::{CellSelection, Direction, ReferenceFrame, Size, Template, Transform};
//!
//! let data = Template::new()
//!     .start_at(CellSelection::at(ReferenceFrame::Root, 0, 1))
//!     .with_size(Size::cells(2, 1))
//!     .traverse_y(Direction::After)
//!     .with_transform(Transform::positional([Some("Name"), Some("Age")]));
//! assert!(data.traverse.is_repeating());
//! ```
//!
//! or loaded from a TOML/JSON [`TemplateDocument`] and resolved against a
//! [`RuleRegistry`] of named rules.

mod document;
mod registry;
mod resolver;
mod types;

pub use document::{
    ConstraintSpec, ContextSpec, ExtentKeyword, ExtentSpec, FrameKeyword, FrameSpec, IntRuleSpec,
    PositionSpec, SelectionSpec, SizeSpec, TargetColSpec, TargetKeyword, TemplateDocument,
    TemplateError, TemplateSpec, TransformSpec, TraverseSpec,
};
pub use registry::{NamedRule, RegistryError, RuleKind, RuleRegistry};
pub use resolver::{resolve_document, resolve_template};
pub use types::{
    AreaFn, AreaView, CellSelection, CellView, Constraint, ContextPosition,
    ContextTransform, Corner, Direction, Edge, Extent, LayerKind, MapColsFn, Offset, PredicateFn,
    ReferenceFrame, Rule, RuleError, RuleInput, Size, TargetCol, Template, TemplatePath,
    Transform, Traverse, ValueCheck, ValueType,
};
