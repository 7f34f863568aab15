//! Per-template geometry tree for the rendering collaborator

use std::collections::HashMap;

use serde::Serialize;

use crate::matching::{AreaTree, Rect};
use crate::template::{LayerKind, Template, TemplatePath};

/// One template with the rectangles of every area it matched
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeometryNode {
    pub path: TemplatePath,
    pub kind: LayerKind,
    /// Declared width; `None` unless literal
    pub width: Option<usize>,
    pub height: Option<usize>,
    pub matches: Vec<Rect>,
    pub children: Vec<GeometryNode>,
}

impl GeometryNode {
    /// Node of the template at `path`, if it exists below this node
    pub fn find(&self, path: &TemplatePath) -> Option<&GeometryNode> {
        if &self.path == path {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(path))
    }
}

/// Geometry of a template forest after a match run
///
/// The returned root stands for the whole grid; its children mirror
/// `templates`. Templates that matched nothing keep an empty `matches` list.
pub fn geometry_tree(templates: &[Template], tree: &AreaTree) -> GeometryNode {
    let mut matches: HashMap<&TemplatePath, Vec<Rect>> = HashMap::new();
    for area in tree.iter().skip(1) {
        matches.entry(&area.template_path).or_default().push(area.rect);
    }

    let root = tree.root().rect;
    let root_path = TemplatePath::root();
    let children = nodes(templates, &root_path, &mut matches);
    GeometryNode {
        path: root_path,
        kind: LayerKind::Null,
        width: Some(root.width),
        height: Some(root.height),
        matches: vec![root],
        children,
    }
}

fn nodes(
    templates: &[Template],
    parent: &TemplatePath,
    matches: &mut HashMap<&TemplatePath, Vec<Rect>>,
) -> Vec<GeometryNode> {
    templates
        .iter()
        .enumerate()
        .map(|(index, template)| {
            let path = parent.child(index);
            let children = nodes(&template.children, &path, matches);
            GeometryNode {
                kind: template.kind(),
                width: template.size.width.literal(),
                height: template.size.height.literal(),
                matches: matches.remove(&path).unwrap_or_default(),
                children,
                path,
            }
        })
        .collect()
}
