//! Tree builder: recursive template application over the grid

use crate::grid::Grid;
use crate::template::{Extent, Template, TemplatePath, Transform};

use super::area::{AreaMatcher, FirstMatch};
use super::config::{BranchErrorPolicy, MatchConfig};
use super::error::MatchError;
use super::position::Frames;
use super::tiler;
use super::transform;
use super::types::{AreaCell, AreaId, AreaInfo, AreaTree, CellTarget, Rect};

/// Result of a match run
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub tree: AreaTree,
    /// Branch errors dropped under [`BranchErrorPolicy::Skip`]
    pub diagnostics: Vec<MatchError>,
}

/// Match a template forest against a grid
///
/// The templates are applied inside the root area covering the whole grid;
/// the resulting tree is rebuilt from scratch on every call.
pub fn match_templates(
    grid: &Grid,
    templates: &[Template],
    config: &MatchConfig,
) -> Result<MatchResult, MatchError> {
    validate(templates, &TemplatePath::root(), config)?;

    let bounds = Rect::new(0, 0, grid.width(), grid.height());
    let mut builder = Builder {
        grid,
        config,
        tree: AreaTree::new(bounds),
        diagnostics: Vec::new(),
    };
    if !bounds.is_empty() {
        builder.match_children(AreaId::ROOT, templates, &TemplatePath::root())?;
    }

    log::debug!(
        "match run produced {} area(s), {} skipped branch(es)",
        builder.tree.len(),
        builder.diagnostics.len()
    );
    Ok(MatchResult {
        tree: builder.tree,
        diagnostics: builder.diagnostics,
    })
}

/// Check a template forest before touching the grid
pub fn validate(
    templates: &[Template],
    parent: &TemplatePath,
    config: &MatchConfig,
) -> Result<(), MatchError> {
    for (index, template) in templates.iter().enumerate() {
        let path = parent.child(index);
        if path.depth() > config.max_depth {
            return Err(MatchError::DepthExceeded {
                path,
                limit: config.max_depth,
            });
        }

        let size = template.size;
        if size.width == Extent::Cells(0) || size.height == Extent::Cells(0) {
            return Err(MatchError::validation(&path, "size must be at least 1x1"));
        }

        if let (Some(Transform::Positional(columns)), Some(width), Some(height)) = (
            &template.transform,
            size.width.literal(),
            size.height.literal(),
        ) {
            if columns.len() != width * height {
                return Err(MatchError::validation(
                    &path,
                    format!(
                        "positional mapping has {} columns but the area has {} cells",
                        columns.len(),
                        width * height
                    ),
                ));
            }
        }

        validate(&template.children, &path, config)?;
    }
    Ok(())
}

struct Builder<'a> {
    grid: &'a Grid,
    config: &'a MatchConfig,
    tree: AreaTree,
    diagnostics: Vec<MatchError>,
}

impl Builder<'_> {
    /// Apply every template inside one area, in declaration order
    fn match_children(
        &mut self,
        parent: AreaId,
        templates: &[Template],
        parent_path: &TemplatePath,
    ) -> Result<(), MatchError> {
        for (index, template) in templates.iter().enumerate() {
            let path = parent_path.child(index);
            let checkpoint = self.tree.checkpoint(parent);

            match self.match_template(parent, index, template, &path) {
                Ok(()) => {}
                Err(err)
                    if self.config.branch_errors == BranchErrorPolicy::Skip
                        && err.is_branch_local() =>
                {
                    log::warn!("skipping template {} in area #{}: {}", path, parent.0, err);
                    self.tree.rollback(checkpoint);
                    self.diagnostics.push(err);
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    fn match_template(
        &mut self,
        parent: AreaId,
        index: usize,
        template: &Template,
        path: &TemplatePath,
    ) -> Result<(), MatchError> {
        let layers = self.tree.chain_views(parent);
        let matcher = AreaMatcher::new(self.grid, template, path, &layers);

        let first = match matcher.first_match()? {
            FirstMatch::Matched(rect) => rect,
            FirstMatch::StartOutOfBounds { x, y } if template.required => {
                return Err(MatchError::OutOfBounds {
                    path: path.clone(),
                    x,
                    y,
                });
            }
            FirstMatch::NoMatch if template.required => {
                return Err(MatchError::Unmatched { path: path.clone() });
            }
            _ => {
                log::trace!("template {} has no match in area #{}", path, parent.0);
                return Ok(());
            }
        };

        let placements = tiler::tile(&matcher, first, &template.traverse, self.config.max_tiles)?;
        log::debug!(
            "template {} matched {} area(s) in area #{}",
            path,
            placements.len(),
            parent.0
        );

        let enclosing = matcher.enclosing();
        for placement in placements {
            if self.tree.len() >= self.config.max_areas {
                return Err(MatchError::AreaLimitExceeded {
                    limit: self.config.max_areas,
                });
            }

            let rect = placement.rect;
            let mut area = AreaInfo {
                id: AreaId::ROOT,
                parent: Some(parent),
                layer: enclosing.layer + 1,
                template_index: index,
                template_path: path.clone(),
                kind: template.kind(),
                repeating: template.traverse.is_repeating(),
                record: template.record,
                x_index: placement.x_index,
                y_index: placement.y_index,
                x_offset: rect.x - enclosing.rect.x,
                y_offset: rect.y - enclosing.rect.y,
                rect,
                cells: rect
                    .cells()
                    .map(|coord| AreaCell {
                        x_offset: coord.x - rect.x,
                        y_offset: coord.y - rect.y,
                        value: self.grid.value_at(coord).clone(),
                        target: CellTarget::Unassigned,
                    })
                    .collect(),
                children: Vec::new(),
            };

            if let Some(mapping) = &template.transform {
                let frames = Frames::for_area(area.view(), &layers);
                transform::assign(mapping, &mut area.cells, &frames, self.grid, path)?;
            }

            let id = self.tree.push(parent, area);
            self.match_children(id, &template.children, path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::CellValue;
    use crate::template::{
        CellSelection, Constraint, ContextPosition, Direction, Edge, ReferenceFrame, RuleError,
        Size, TargetCol, ValueType,
    };

    fn people() -> Grid {
        Grid::from_rows(vec![
            vec![CellValue::text("Name"), CellValue::text("Age")],
            vec![CellValue::text("Alice"), CellValue::text("30")],
            vec![CellValue::text("Bob"), CellValue::text("25")],
        ])
    }

    fn header() -> Template {
        Template::new().with_size(Size::cells(2, 1))
    }

    fn data() -> Template {
        Template::new()
            .start_at(CellSelection::at(ReferenceFrame::Root, 0, 1))
            .with_size(Size::cells(2, 1))
            .traverse_y(Direction::After)
            .with_transform(Transform::context(
                ContextPosition::Edge(Edge::Top),
                TargetCol::CellValue,
            ))
    }

    #[test]
    fn test_header_and_data_areas() {
        let result = match_templates(&people(), &[header(), data()], &MatchConfig::default()).unwrap();
        let tree = &result.tree;
        assert_eq!(tree.len(), 4);

        let path = TemplatePath::root().child(1);
        let data: Vec<&AreaInfo> = tree.areas_of(&path).collect();
        assert_eq!(data.len(), 2);
        assert_eq!((data[0].x_index, data[0].y_index), (0, 0));
        assert_eq!((data[1].x_index, data[1].y_index), (0, 1));
        assert_eq!(data[1].rect, Rect::new(0, 2, 2, 1));
        assert_eq!(data[1].cells[1].column(), Some("Age"));
        assert!(result.diagnostics.is_empty());
    }

    #[test]
    fn test_children_are_matched_inside_parent() {
        let row = data().with_child(
            Template::new()
                .start_at(CellSelection::at(ReferenceFrame::Current, 1, 0))
                .with_transform(Transform::positional([Some("Age")])),
        );
        let result = match_templates(&people(), &[row], &MatchConfig::default()).unwrap();
        let tree = &result.tree;
        for area in tree.iter().skip(1) {
            let parent = &tree[area.parent.unwrap()];
            assert!(parent.rect.contains_rect(&area.rect));
        }
        let children: Vec<Rect> = tree
            .areas_of(&TemplatePath::root().child(0).child(0))
            .map(|a| a.rect)
            .collect();
        assert_eq!(children, vec![Rect::new(1, 1, 1, 1), Rect::new(1, 2, 1, 1)]);
    }

    #[test]
    fn test_zero_size_is_validation_error() {
        let template = Template::new().with_size(Size::cells(0, 1));
        assert!(matches!(
            match_templates(&people(), &[template], &MatchConfig::default()),
            Err(MatchError::TemplateValidation { .. })
        ));
    }

    #[test]
    fn test_positional_length_checked_eagerly() {
        // The region never matches, yet the mismatch is reported
        let template = Template::new()
            .with_size(Size::cells(2, 1))
            .with_constraint(Constraint::equals(CellSelection::new(), "nowhere"))
            .with_transform(Transform::positional([Some("A")]));
        assert!(matches!(
            match_templates(&people(), &[template], &MatchConfig::default()),
            Err(MatchError::TemplateValidation { .. })
        ));
    }

    #[test]
    fn test_depth_limit() {
        let nested = Template::new().with_child(Template::new().with_child(Template::new()));
        let config = MatchConfig::new().with_max_depth(2);
        assert_eq!(
            match_templates(&people(), &[nested], &config),
            Err(MatchError::DepthExceeded {
                path: TemplatePath(vec![0, 0, 0]),
                limit: 2,
            })
        );
    }

    #[test]
    fn test_area_limit() {
        let config = MatchConfig::new().with_max_areas(2);
        assert_eq!(
            match_templates(&people(), &[data()], &config),
            Err(MatchError::AreaLimitExceeded { limit: 2 })
        );
    }

    #[test]
    fn test_required_template() {
        let missing = Template::new()
            .with_constraint(Constraint::of_type(CellSelection::new(), ValueType::Number))
            .required();
        assert_eq!(
            match_templates(&people(), &[missing], &MatchConfig::default()),
            Err(MatchError::Unmatched {
                path: TemplatePath(vec![0]),
            })
        );

        let outside = Template::new()
            .start_at(CellSelection::at(ReferenceFrame::Root, 5, 0))
            .required();
        assert!(matches!(
            match_templates(&people(), &[outside], &MatchConfig::default()),
            Err(MatchError::OutOfBounds { x: 5, y: 0, .. })
        ));
    }

    #[test]
    fn test_skip_policy_drops_failing_branch() {
        let failing = data().with_child(Template::new().with_constraint(Constraint::custom(
            CellSelection::new(),
            |_| Err(RuleError::new("boom")),
        )));
        let config = MatchConfig::new().with_branch_errors(BranchErrorPolicy::Skip);
        let result = match_templates(&people(), &[header(), failing], &config).unwrap();

        // Rows survive; only the failing child branch of each row is dropped
        assert_eq!(result.tree.len(), 4);
        assert_eq!(result.diagnostics.len(), 2);
        assert!(matches!(result.diagnostics[0], MatchError::Rule { .. }));
    }

    #[test]
    fn test_abort_policy_returns_rule_error() {
        let failing = Template::new().with_constraint(Constraint::custom(CellSelection::new(), |_| {
            Err(RuleError::new("boom"))
        }));
        assert_eq!(
            match_templates(&people(), &[failing], &MatchConfig::default()),
            Err(MatchError::Rule {
                path: TemplatePath(vec![0]),
                message: "boom".to_string(),
            })
        );
    }

    #[test]
    fn test_empty_grid_has_only_root() {
        let result = match_templates(&Grid::default(), &[data()], &MatchConfig::default()).unwrap();
        assert_eq!(result.tree.len(), 1);
    }

    #[test]
    fn test_runs_are_deterministic() {
        let templates = [header(), data()];
        let first = match_templates(&people(), &templates, &MatchConfig::default()).unwrap();
        let second = match_templates(&people(), &templates, &MatchConfig::default()).unwrap();
        assert_eq!(first, second);
    }
}
