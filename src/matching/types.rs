//! Core types for the resolved area tree

use std::fmt::Write as _;
use std::ops::Index;

use serde::Serialize;

use crate::grid::{CellCoord, CellValue};
use crate::template::{AreaView, LayerKind, TemplatePath};

/// Axis-aligned rectangle of grid cells
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct Rect {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl Rect {
    pub fn new(x: usize, y: usize, width: usize, height: usize) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Column just past the right edge
    pub fn right(&self) -> usize {
        self.x + self.width
    }

    /// Row just past the bottom edge
    pub fn bottom(&self) -> usize {
        self.y + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Check if this rectangle fully contains another
    pub fn contains_rect(&self, other: &Rect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    /// Check if this rectangle shares at least one cell with another
    pub fn intersects(&self, other: &Rect) -> bool {
        self.x < other.right()
            && self.right() > other.x
            && self.y < other.bottom()
            && self.bottom() > other.y
    }

    /// Cell coordinates in traversal order (row-major)
    pub fn cells(&self) -> impl Iterator<Item = CellCoord> + '_ {
        (self.y..self.bottom()).flat_map(move |y| (self.x..self.right()).map(move |x| CellCoord::new(x, y)))
    }
}

/// Index of an area in its [`AreaTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct AreaId(pub usize);

impl AreaId {
    pub const ROOT: AreaId = AreaId(0);
}

/// Output column assigned to a cell by a transform
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CellTarget {
    /// The area has no transform
    #[default]
    Unassigned,
    Column(String),
    /// Omitted from tidy output
    Excluded,
}

impl CellTarget {
    pub fn from_name(name: Option<String>) -> Self {
        match name {
            Some(name) if !name.is_empty() => CellTarget::Column(name),
            _ => CellTarget::Excluded,
        }
    }
}

/// A cell of a matched area
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AreaCell {
    pub x_offset: usize,
    pub y_offset: usize,
    pub value: CellValue,
    pub target: CellTarget,
}

impl AreaCell {
    /// Assigned column name, if any
    pub fn column(&self) -> Option<&str> {
        match &self.target {
            CellTarget::Column(name) => Some(name),
            _ => None,
        }
    }
}

/// A resolved area matched by one template
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AreaInfo {
    pub id: AreaId,
    pub parent: Option<AreaId>,
    /// Nesting depth; the root is layer 0
    pub layer: usize,
    /// Index of the producing template among its siblings
    pub template_index: usize,
    pub template_path: TemplatePath,
    pub kind: LayerKind,
    /// Produced by a template with a traverse direction
    pub repeating: bool,
    /// Produced by a template flagged as a record boundary
    pub record: bool,
    pub x_index: usize,
    pub y_index: usize,
    /// Position relative to the parent area
    pub x_offset: usize,
    pub y_offset: usize,
    pub rect: Rect,
    pub cells: Vec<AreaCell>,
    pub children: Vec<AreaId>,
}

impl AreaInfo {
    pub fn view(&self) -> AreaView {
        AreaView {
            rect: self.rect,
            layer: self.layer,
            x_index: self.x_index,
            y_index: self.y_index,
        }
    }

    /// Absolute grid coordinate of one of the area's cells
    pub fn coord_of(&self, cell: &AreaCell) -> CellCoord {
        CellCoord::new(self.rect.x + cell.x_offset, self.rect.y + cell.y_offset)
    }
}

/// Arena of resolved areas; index 0 is the root covering the whole grid
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AreaTree {
    areas: Vec<AreaInfo>,
}

impl AreaTree {
    /// Create a tree holding only the root area
    pub fn new(bounds: Rect) -> Self {
        Self {
            areas: vec![AreaInfo {
                id: AreaId::ROOT,
                parent: None,
                layer: 0,
                template_index: 0,
                template_path: TemplatePath::root(),
                kind: LayerKind::Null,
                repeating: false,
                record: false,
                x_index: 0,
                y_index: 0,
                x_offset: 0,
                y_offset: 0,
                rect: bounds,
                cells: Vec::new(),
                children: Vec::new(),
            }],
        }
    }

    pub fn root(&self) -> &AreaInfo {
        &self.areas[0]
    }

    pub fn get(&self, id: AreaId) -> Option<&AreaInfo> {
        self.areas.get(id.0)
    }

    /// Number of areas, root included
    pub fn len(&self) -> usize {
        self.areas.len()
    }

    /// Always false: the root exists even for an empty grid
    pub fn is_empty(&self) -> bool {
        self.areas.is_empty()
    }

    /// All areas in creation order (which is pre-order)
    pub fn iter(&self) -> impl Iterator<Item = &AreaInfo> {
        self.areas.iter()
    }

    pub fn children(&self, id: AreaId) -> impl Iterator<Item = &AreaInfo> {
        self[id].children.iter().map(move |child| &self[*child])
    }

    /// The area and its ancestors, nearest first
    pub fn ancestors(&self, id: AreaId) -> impl Iterator<Item = &AreaInfo> {
        std::iter::successors(self.get(id), move |area| area.parent.map(|p| &self[p]))
    }

    /// Views of the root down to `id`, indexed by layer
    pub fn chain_views(&self, id: AreaId) -> Vec<AreaView> {
        let mut views: Vec<AreaView> = self.ancestors(id).map(AreaInfo::view).collect();
        views.reverse();
        views
    }

    /// Areas produced by the template at `path`, in match order
    pub fn areas_of<'a>(&'a self, path: &'a TemplatePath) -> impl Iterator<Item = &'a AreaInfo> {
        self.areas
            .iter()
            .skip(1)
            .filter(move |area| &area.template_path == path)
    }

    /// Pre-order ids, following child lists
    pub fn preorder(&self) -> Vec<AreaId> {
        let mut order = Vec::with_capacity(self.areas.len());
        let mut stack = vec![AreaId::ROOT];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self[id].children.iter().rev().copied());
        }
        order
    }

    pub(crate) fn push(&mut self, parent: AreaId, mut area: AreaInfo) -> AreaId {
        let id = AreaId(self.areas.len());
        area.id = id;
        area.parent = Some(parent);
        self.areas.push(area);
        self.areas[parent.0].children.push(id);
        id
    }

    /// Remove every area created after a checkpoint
    pub(crate) fn rollback(&mut self, checkpoint: Checkpoint) {
        self.areas.truncate(checkpoint.len);
        self.areas[checkpoint.parent.0]
            .children
            .truncate(checkpoint.children);
    }

    pub(crate) fn checkpoint(&self, parent: AreaId) -> Checkpoint {
        Checkpoint {
            len: self.areas.len(),
            parent,
            children: self.areas[parent.0].children.len(),
        }
    }

    /// Indented outline of the tree, one area per line
    pub fn outline(&self) -> String {
        let mut out = String::new();
        for id in self.preorder() {
            let area = &self[id];
            let assigned = area.cells.iter().filter(|c| c.column().is_some()).count();
            let _ = writeln!(
                out,
                "{}[{}] template={} tile=({},{}) x={} y={} w={} h={} cells={}",
                "  ".repeat(area.layer),
                id.0,
                area.template_path,
                area.x_index,
                area.y_index,
                area.rect.x,
                area.rect.y,
                area.rect.width,
                area.rect.height,
                assigned
            );
        }
        out
    }
}

impl Index<AreaId> for AreaTree {
    type Output = AreaInfo;

    fn index(&self, id: AreaId) -> &AreaInfo {
        &self.areas[id.0]
    }
}

/// Saved tree size used to drop a failed branch
#[derive(Debug, Clone, Copy)]
pub(crate) struct Checkpoint {
    len: usize,
    parent: AreaId,
    children: usize,
}
