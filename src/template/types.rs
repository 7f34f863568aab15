//! Core types of the template model
//!
//! A [`Template`] is fully populated: every optional field of a template
//! document has already been filled in by the resolver, so the matching
//! engine never deals with missing values.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::expr::{EvalError, Scope, Value};
use crate::grid::CellValue;
use crate::matching::types::{AreaCell, Rect};

/// Position of a template in the template tree, as child indices from the root
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TemplatePath(pub Vec<usize>);

impl TemplatePath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Path of the `index`-th child of this template
    pub fn child(&self, index: usize) -> Self {
        let mut segments = self.0.clone();
        segments.push(index);
        Self(segments)
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for TemplatePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "<root>");
        }
        let parts: Vec<String> = self.0.iter().map(|i| i.to_string()).collect();
        write!(f, "{}", parts.join("."))
    }
}

/// Error returned by a computed rule
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{message}")]
pub struct RuleError {
    pub message: String,
}

impl RuleError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<EvalError> for RuleError {
    fn from(err: EvalError) -> Self {
        Self::new(err.to_string())
    }
}

/// Read-only geometry of a resolved area, as seen by rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AreaView {
    pub rect: Rect,
    pub layer: usize,
    pub x_index: usize,
    pub y_index: usize,
}

impl AreaView {
    fn to_value(self) -> Value {
        Value::record([
            ("x", Value::from(self.rect.x)),
            ("y", Value::from(self.rect.y)),
            ("width", Value::from(self.rect.width)),
            ("height", Value::from(self.rect.height)),
            ("right", Value::from(self.rect.right())),
            ("bottom", Value::from(self.rect.bottom())),
            ("layer", Value::from(self.layer)),
            ("x_index", Value::from(self.x_index)),
            ("y_index", Value::from(self.y_index)),
        ])
    }
}

/// The cell a rule is invoked for
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellView<'a> {
    pub x: usize,
    pub y: usize,
    pub x_offset: usize,
    pub y_offset: usize,
    pub value: &'a CellValue,
}

/// Explicit input of every area-level rule
///
/// Rules never reach for implicit state: the current, parent and root areas,
/// the invoking cell and its resolved context values are all passed in here.
#[derive(Debug, Clone, Copy)]
pub struct RuleInput<'a> {
    pub current: AreaView,
    pub parent: Option<AreaView>,
    pub root: AreaView,
    pub cell: Option<CellView<'a>>,
    /// The value a rule is primarily about (`value` in expressions)
    pub value: Option<&'a CellValue>,
    pub context: &'a [CellValue],
}

impl<'a> RuleInput<'a> {
    pub fn new(current: AreaView, root: AreaView) -> Self {
        Self {
            current,
            parent: None,
            root,
            cell: None,
            value: None,
            context: &[],
        }
    }
}

impl Scope for RuleInput<'_> {
    fn lookup(&self, name: &str) -> Option<Value> {
        match name {
            "current" => Some(self.current.to_value()),
            "parent" => Some(self.parent.map(AreaView::to_value).unwrap_or(Value::Null)),
            "root" => Some(self.root.to_value()),
            "cell" => Some(match self.cell {
                Some(cell) => Value::record([
                    ("x", Value::from(cell.x)),
                    ("y", Value::from(cell.y)),
                    ("x_offset", Value::from(cell.x_offset)),
                    ("y_offset", Value::from(cell.y_offset)),
                    ("value", Value::from(cell.value)),
                ]),
                None => Value::Null,
            }),
            "value" => Some(self.value.map(Value::from).unwrap_or(Value::Null)),
            "context" => Some(Value::List(self.context.iter().map(Value::from).collect())),
            _ => None,
        }
    }
}

/// Scope of a value predicate: only `value` is bound
pub(crate) struct ValueScope<'a>(pub &'a CellValue);

impl Scope for ValueScope<'_> {
    fn lookup(&self, name: &str) -> Option<Value> {
        match name {
            "value" => Some(Value::from(self.0)),
            _ => None,
        }
    }
}

/// Area-level rule function
pub type AreaFn<T> = dyn Fn(&RuleInput<'_>) -> Result<T, RuleError> + Send + Sync;

/// Value predicate used by constraints
pub type PredicateFn = dyn Fn(&CellValue) -> Result<bool, RuleError> + Send + Sync;

/// Custom column mapping over all cells of an area, in traversal order
pub type MapColsFn =
    dyn Fn(&[AreaCell], &RuleInput<'_>) -> Result<Vec<Option<String>>, RuleError> + Send + Sync;

/// A field that is either a literal value or computed by a rule
pub enum Rule<T, F: ?Sized> {
    Literal(T),
    Computed(Arc<F>),
}

impl<T: Clone, F: ?Sized> Clone for Rule<T, F> {
    fn clone(&self) -> Self {
        match self {
            Rule::Literal(v) => Rule::Literal(v.clone()),
            Rule::Computed(f) => Rule::Computed(Arc::clone(f)),
        }
    }
}

impl<T: fmt::Debug, F: ?Sized> fmt::Debug for Rule<T, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::Literal(v) => f.debug_tuple("Literal").field(v).finish(),
            Rule::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

impl<T: Clone> Rule<T, AreaFn<T>> {
    /// Wrap a closure as a computed rule
    pub fn computed(
        f: impl Fn(&RuleInput<'_>) -> Result<T, RuleError> + Send + Sync + 'static,
    ) -> Self {
        Rule::Computed(Arc::new(f))
    }

    /// Resolve the rule for a given input
    pub fn resolve(&self, input: &RuleInput<'_>) -> Result<T, RuleError> {
        match self {
            Rule::Literal(v) => Ok(v.clone()),
            Rule::Computed(f) => f(input),
        }
    }
}

/// Offset along one axis
pub type Offset = Rule<i64, AreaFn<i64>>;

impl Default for Offset {
    fn default() -> Self {
        Rule::Literal(0)
    }
}

impl From<i64> for Offset {
    fn from(v: i64) -> Self {
        Rule::Literal(v)
    }
}

/// Area a cell selection is relative to
#[derive(Debug, Clone, Default)]
pub enum ReferenceFrame {
    #[default]
    Current,
    Parent,
    Root,
    /// Ancestor at an explicit nesting depth (0 = root)
    Layer(Rule<i64, AreaFn<i64>>),
}

/// Corner of the reference area that offsets start from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Corner {
    #[default]
    #[serde(alias = "topLeft")]
    TopLeft,
    #[serde(alias = "topRight")]
    TopRight,
    #[serde(alias = "bottomLeft")]
    BottomLeft,
    #[serde(alias = "bottomRight")]
    BottomRight,
}

/// Relative cell-selection rule
#[derive(Debug, Clone, Default)]
pub struct CellSelection {
    pub frame: ReferenceFrame,
    pub corner: Corner,
    pub x_offset: Offset,
    pub y_offset: Offset,
}

impl CellSelection {
    /// Top-left of the current frame, no offset
    pub fn new() -> Self {
        Self::default()
    }

    /// Literal offset from the top-left of a frame
    pub fn at(frame: ReferenceFrame, x_offset: i64, y_offset: i64) -> Self {
        Self {
            frame,
            corner: Corner::TopLeft,
            x_offset: Rule::Literal(x_offset),
            y_offset: Rule::Literal(y_offset),
        }
    }

    pub fn with_frame(mut self, frame: ReferenceFrame) -> Self {
        self.frame = frame;
        self
    }

    pub fn with_corner(mut self, corner: Corner) -> Self {
        self.corner = corner;
        self
    }

    pub fn with_offsets(mut self, x_offset: impl Into<Offset>, y_offset: impl Into<Offset>) -> Self {
        self.x_offset = x_offset.into();
        self.y_offset = y_offset.into();
        self
    }
}

/// Extent of an area along one axis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extent {
    Cells(usize),
    /// Up to the far edge of the enclosing area
    ToParent,
    /// Up to the far edge of the enclosing area, trailing empty lines trimmed
    Unbounded,
}

impl Default for Extent {
    fn default() -> Self {
        Extent::Cells(1)
    }
}

impl Extent {
    pub fn literal(&self) -> Option<usize> {
        match self {
            Extent::Cells(n) => Some(*n),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Size {
    pub width: Extent,
    pub height: Extent,
}

impl Size {
    pub fn new(width: Extent, height: Extent) -> Self {
        Self { width, height }
    }

    pub fn cells(width: usize, height: usize) -> Self {
        Self::new(Extent::Cells(width), Extent::Cells(height))
    }
}

/// Type a constrained cell must have
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    String,
    Number,
    None,
}

/// Predicate applied to a constrained cell
#[derive(Clone)]
pub enum ValueCheck {
    Equals(CellValue),
    Type(ValueType),
    Custom(Arc<PredicateFn>),
}

impl fmt::Debug for ValueCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueCheck::Equals(v) => f.debug_tuple("Equals").field(v).finish(),
            ValueCheck::Type(t) => f.debug_tuple("Type").field(t).finish(),
            ValueCheck::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// A position + value-predicate pair an area must satisfy
#[derive(Debug, Clone)]
pub struct Constraint {
    pub selection: CellSelection,
    pub check: ValueCheck,
}

impl Constraint {
    pub fn equals(selection: CellSelection, value: impl Into<CellValue>) -> Self {
        Self {
            selection,
            check: ValueCheck::Equals(value.into()),
        }
    }

    pub fn of_type(selection: CellSelection, value_type: ValueType) -> Self {
        Self {
            selection,
            check: ValueCheck::Type(value_type),
        }
    }

    pub fn custom(
        selection: CellSelection,
        check: impl Fn(&CellValue) -> Result<bool, RuleError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            selection,
            check: ValueCheck::Custom(Arc::new(check)),
        }
    }
}

/// Tiling policy along one axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    None,
    After,
    Before,
    Whole,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Traverse {
    pub x: Direction,
    pub y: Direction,
}

impl Traverse {
    pub fn is_repeating(&self) -> bool {
        self.x != Direction::None || self.y != Direction::None
    }
}

/// Edge of the enclosing area used as context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Edge {
    Top,
    Bottom,
    Left,
    Right,
}

/// Where the context cell of a cell is found
#[derive(Clone)]
pub enum ContextPosition {
    Edge(Edge),
    /// Candidate selections, resolved with the cell bound in the rule input
    Selections(Vec<CellSelection>),
    Custom(Arc<AreaFn<Vec<CellSelection>>>),
}

impl fmt::Debug for ContextPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextPosition::Edge(e) => f.debug_tuple("Edge").field(e).finish(),
            ContextPosition::Selections(s) => f.debug_tuple("Selections").field(s).finish(),
            ContextPosition::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// How a column name is derived from the context values
#[derive(Clone)]
pub enum TargetCol {
    /// The first non-empty context value is the column name
    CellValue,
    Custom(Arc<AreaFn<Option<String>>>),
}

impl fmt::Debug for TargetCol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetCol::CellValue => f.write_str("CellValue"),
            TargetCol::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ContextTransform {
    pub position: ContextPosition,
    pub target: TargetCol,
}

/// Cell-to-column mapping of a template
#[derive(Clone)]
pub enum Transform {
    /// One column (or exclusion) per cell in traversal order
    Positional(Vec<Option<String>>),
    Context(ContextTransform),
    Custom(Arc<MapColsFn>),
}

impl Transform {
    /// Positional mapping from column names; empty names exclude the cell
    pub fn positional<S: AsRef<str>>(columns: impl IntoIterator<Item = Option<S>>) -> Self {
        Transform::Positional(
            columns
                .into_iter()
                .map(|c| c.map(|s| s.as_ref().to_string()).filter(|s| !s.is_empty()))
                .collect(),
        )
    }

    pub fn context(position: ContextPosition, target: TargetCol) -> Self {
        Transform::Context(ContextTransform { position, target })
    }

    pub fn custom(
        f: impl Fn(&[AreaCell], &RuleInput<'_>) -> Result<Vec<Option<String>>, RuleError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Transform::Custom(Arc::new(f))
    }

    pub fn kind(&self) -> LayerKind {
        match self {
            Transform::Positional(_) => LayerKind::Position,
            Transform::Context(_) => LayerKind::Context,
            Transform::Custom(_) => LayerKind::Value,
        }
    }
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transform::Positional(cols) => f.debug_tuple("Positional").field(cols).finish(),
            Transform::Context(ctx) => f.debug_tuple("Context").field(ctx).finish(),
            Transform::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Layer classification of a template, as shown by the rendering collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    Position,
    Context,
    Value,
    Null,
}

/// A fully populated template
#[derive(Debug, Clone, Default)]
pub struct Template {
    pub start_cell: CellSelection,
    pub size: Size,
    pub constraints: Vec<Constraint>,
    pub traverse: Traverse,
    pub transform: Option<Transform>,
    pub children: Vec<Template>,
    /// Areas of this template delimit one output row
    pub record: bool,
    /// The template must match at least once
    pub required: bool,
}

impl Template {
    /// A 1x1 template at the top-left of the enclosing area
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_at(mut self, selection: CellSelection) -> Self {
        self.start_cell = selection;
        self
    }

    pub fn with_size(mut self, size: Size) -> Self {
        self.size = size;
        self
    }

    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    pub fn traverse_x(mut self, direction: Direction) -> Self {
        self.traverse.x = direction;
        self
    }

    pub fn traverse_y(mut self, direction: Direction) -> Self {
        self.traverse.y = direction;
        self
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn with_child(mut self, child: Template) -> Self {
        self.children.push(child);
        self
    }

    pub fn as_record(mut self) -> Self {
        self.record = true;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn kind(&self) -> LayerKind {
        self.transform
            .as_ref()
            .map(Transform::kind)
            .unwrap_or(LayerKind::Null)
    }

    /// Depth of the deepest descendant (a leaf template has depth 1)
    pub fn depth(&self) -> usize {
        1 + self.children.iter().map(Template::depth).max().unwrap_or(0)
    }
}
