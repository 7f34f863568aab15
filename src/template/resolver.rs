//! Template resolution - fills in defaults and compiles rules
//!
//! Every optional field of a [`TemplateSpec`] gets its default here, once,
//! so the matching engine only ever sees fully populated templates.

use std::sync::Arc;

use crate::expr::{Expression, Value};
use crate::grid::{format_number, CellValue};

use super::document::{
    ConstraintSpec, ContextSpec, ExtentKeyword, ExtentSpec, FrameKeyword, FrameSpec, IntRuleSpec,
    PositionSpec, SelectionSpec, SizeSpec, TargetColSpec, TemplateDocument, TemplateError,
    TemplateSpec, TransformSpec,
};
use super::registry::{RegistryError, RuleRegistry};
use super::types::{
    AreaFn, CellSelection, CellView, Constraint, ContextPosition, Extent, ReferenceFrame, Rule,
    RuleError, RuleInput, Size, TargetCol, Template, TemplatePath, Transform, Traverse,
    ValueCheck, ValueScope,
};

/// Resolve every top-level template of a document
pub fn resolve_document(
    doc: &TemplateDocument,
    registry: &RuleRegistry,
) -> Result<Vec<Template>, TemplateError> {
    let root = TemplatePath::root();
    doc.templates
        .iter()
        .enumerate()
        .map(|(i, spec)| resolve_template(spec, registry, &root.child(i)))
        .collect()
}

/// Resolve one template spec (and its children) at the given path
pub fn resolve_template(
    spec: &TemplateSpec,
    registry: &RuleRegistry,
    path: &TemplatePath,
) -> Result<Template, TemplateError> {
    let cx = Resolver { registry, path };

    let start_cell = match &spec.start_cell {
        Some(selection) => cx.selection("start_cell", selection)?,
        None => CellSelection::default(),
    };

    let size = match &spec.size {
        Some(size) => cx.size(size)?,
        None => Size::default(),
    };

    let constraints = spec
        .constraints
        .iter()
        .enumerate()
        .map(|(i, c)| cx.constraint(i, c))
        .collect::<Result<Vec<_>, _>>()?;

    let traverse = spec
        .traverse
        .map(|t| Traverse {
            x: t.x.unwrap_or_default(),
            y: t.y.unwrap_or_default(),
        })
        .unwrap_or_default();

    let transform = spec
        .transform
        .as_ref()
        .map(|t| cx.transform(t))
        .transpose()?;

    let children = spec
        .children
        .iter()
        .enumerate()
        .map(|(i, child)| resolve_template(child, registry, &path.child(i)))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Template {
        start_cell,
        size,
        constraints,
        traverse,
        transform,
        children,
        record: spec.record.unwrap_or(false),
        required: spec.required.unwrap_or(false),
    })
}

struct Resolver<'a> {
    registry: &'a RuleRegistry,
    path: &'a TemplatePath,
}

impl Resolver<'_> {
    fn compile(&self, field: &str, source: &str) -> Result<Arc<Expression>, TemplateError> {
        Expression::parse(source)
            .map(Arc::new)
            .map_err(|errors| TemplateError::Expression {
                path: self.path.clone(),
                field: field.to_string(),
                source_text: source.to_string(),
                errors,
            })
    }

    fn registry_error(&self, error: RegistryError) -> TemplateError {
        TemplateError::Registry {
            path: self.path.clone(),
            error,
        }
    }

    fn int_rule(&self, field: &str, spec: &IntRuleSpec) -> Result<Rule<i64, AreaFn<i64>>, TemplateError> {
        match spec {
            IntRuleSpec::Literal(v) => Ok(Rule::Literal(*v)),
            IntRuleSpec::Expr(source) => {
                let expr = self.compile(field, source)?;
                Ok(Rule::computed(move |input| {
                    expect_integer(expr.evaluate(input)?)
                }))
            }
            IntRuleSpec::Named { rule } => self
                .registry
                .offset(rule)
                .map(Rule::Computed)
                .map_err(|e| self.registry_error(e)),
        }
    }

    fn selection(&self, field: &str, spec: &SelectionSpec) -> Result<CellSelection, TemplateError> {
        let frame = match &spec.frame {
            None | Some(FrameSpec::Keyword(FrameKeyword::Current)) => ReferenceFrame::Current,
            Some(FrameSpec::Keyword(FrameKeyword::Parent)) => ReferenceFrame::Parent,
            Some(FrameSpec::Keyword(FrameKeyword::Root)) => ReferenceFrame::Root,
            Some(FrameSpec::Layer { layer }) => {
                ReferenceFrame::Layer(self.int_rule(&format!("{}.frame.layer", field), layer)?)
            }
        };
        let offset = |name: &str, spec: &Option<IntRuleSpec>| match spec {
            Some(spec) => self.int_rule(&format!("{}.{}", field, name), spec),
            None => Ok(Rule::Literal(0)),
        };

        Ok(CellSelection {
            frame,
            corner: spec.corner.unwrap_or_default(),
            x_offset: offset("x_offset", &spec.x_offset)?,
            y_offset: offset("y_offset", &spec.y_offset)?,
        })
    }

    fn extent(&self, axis: &str, spec: Option<ExtentSpec>) -> Result<Extent, TemplateError> {
        match spec {
            None => Ok(Extent::Cells(1)),
            Some(ExtentSpec::Cells(n)) => usize::try_from(n).map(Extent::Cells).map_err(|_| {
                TemplateError::invalid(self.path, format!("size {} must be positive, got {}", axis, n))
            }),
            Some(ExtentSpec::Keyword(ExtentKeyword::ToParent)) => Ok(Extent::ToParent),
            Some(ExtentSpec::Keyword(ExtentKeyword::Unbounded)) => Ok(Extent::Unbounded),
        }
    }

    fn size(&self, spec: &SizeSpec) -> Result<Size, TemplateError> {
        Ok(Size {
            width: self.extent("width", spec.width)?,
            height: self.extent("height", spec.height)?,
        })
    }

    fn constraint(&self, index: usize, spec: &ConstraintSpec) -> Result<Constraint, TemplateError> {
        let field = format!("constraints[{}]", index);
        let selection = self.selection(&field, &spec.selection())?;

        let check = match (&spec.equals, spec.value_type, &spec.check, &spec.rule) {
            (Some(value), None, None, None) => ValueCheck::Equals(value.clone()),
            (None, Some(value_type), None, None) => ValueCheck::Type(value_type),
            (None, None, Some(source), None) => {
                let expr = self.compile(&format!("{}.check", field), source)?;
                ValueCheck::Custom(Arc::new(move |value: &CellValue| -> Result<bool, RuleError> {
                    Ok(expr.evaluate(&ValueScope(value))?.is_truthy())
                }))
            }
            (None, None, None, Some(name)) => ValueCheck::Custom(
                self.registry
                    .predicate(name)
                    .map_err(|e| self.registry_error(e))?,
            ),
            _ => {
                return Err(TemplateError::invalid(
                    self.path,
                    format!(
                        "{} needs exactly one of equals, value_type, check or rule",
                        field
                    ),
                ))
            }
        };

        Ok(Constraint { selection, check })
    }

    fn transform(&self, spec: &TransformSpec) -> Result<Transform, TemplateError> {
        match (&spec.target_cols, &spec.context, &spec.map, &spec.rule) {
            (Some(cols), None, None, None) => Ok(Transform::positional(cols.iter().cloned())),
            (None, Some(context), None, None) => self.context(context),
            (None, None, Some(source), None) => {
                let expr = self.compile("transform.map", source)?;
                Ok(Transform::custom(move |cells, input| {
                    cells
                        .iter()
                        .map(|cell| {
                            let mut cell_input = *input;
                            cell_input.cell = Some(CellView {
                                x: input.current.rect.x + cell.x_offset,
                                y: input.current.rect.y + cell.y_offset,
                                x_offset: cell.x_offset,
                                y_offset: cell.y_offset,
                                value: &cell.value,
                            });
                            cell_input.value = Some(&cell.value);
                            Ok(column_name(expr.evaluate(&cell_input)?))
                        })
                        .collect()
                }))
            }
            (None, None, None, Some(name)) => self
                .registry
                .map_cols(name)
                .map(Transform::Custom)
                .map_err(|e| self.registry_error(e)),
            _ => Err(TemplateError::invalid(
                self.path,
                "transform needs exactly one of target_cols, context, map or rule",
            )),
        }
    }

    fn context(&self, spec: &ContextSpec) -> Result<Transform, TemplateError> {
        let position = match &spec.position {
            None => {
                return Err(TemplateError::invalid(
                    self.path,
                    "context transform requires a position",
                ))
            }
            Some(PositionSpec::Edge(edge)) => ContextPosition::Edge(*edge),
            Some(PositionSpec::Selections(selections)) => ContextPosition::Selections(
                selections
                    .iter()
                    .enumerate()
                    .map(|(i, s)| self.selection(&format!("context.position[{}]", i), s))
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            Some(PositionSpec::Named { rule }) => ContextPosition::Custom(
                self.registry
                    .context_position(rule)
                    .map_err(|e| self.registry_error(e))?,
            ),
        };

        let target = match &spec.target_col {
            None | Some(TargetColSpec::Keyword(_)) => TargetCol::CellValue,
            Some(TargetColSpec::Expr { expr }) => {
                let expr = self.compile("context.target_col", expr)?;
                TargetCol::Custom(Arc::new(move |input: &RuleInput<'_>| -> Result<Option<String>, RuleError> {
                    Ok(column_name(expr.evaluate(input)?))
                }))
            }
            Some(TargetColSpec::Named { rule }) => TargetCol::Custom(
                self.registry
                    .target_col(rule)
                    .map_err(|e| self.registry_error(e))?,
            ),
        };

        Ok(Transform::context(position, target))
    }
}

fn expect_integer(value: Value) -> Result<i64, RuleError> {
    match value {
        Value::Number(n) if n.fract() == 0.0 && n.is_finite() => Ok(n as i64),
        Value::Number(n) => Err(RuleError::new(format!(
            "expected an integer, found {}",
            format_number(n)
        ))),
        other => Err(RuleError::new(format!(
            "expected an integer, found {}",
            other.type_name()
        ))),
    }
}

/// Column name produced by an expression; null and "" exclude the cell
fn column_name(value: Value) -> Option<String> {
    let name = match value {
        Value::Null => return None,
        Value::String(s) => s,
        other => other.to_string(),
    };
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::types::Rect;
    use crate::template::types::{AreaView, Direction, LayerKind};

    fn document(toml: &str) -> TemplateDocument {
        TemplateDocument::from_toml_str(toml).expect("Should parse")
    }

    fn input() -> RuleInput<'static> {
        let view = AreaView {
            rect: Rect::new(1, 2, 3, 4),
            ..AreaView::default()
        };
        RuleInput::new(view, view)
    }

    #[test]
    fn test_defaults_are_filled_in() {
        let templates = resolve_document(&document("[[templates]]"), &RuleRegistry::new()).unwrap();
        let t = &templates[0];
        assert_eq!(t.size, Size::cells(1, 1));
        assert_eq!(t.traverse, Traverse::default());
        assert!(t.constraints.is_empty());
        assert!(t.transform.is_none());
        assert!(!t.record);
        assert!(!t.required);
        assert!(matches!(t.start_cell.frame, ReferenceFrame::Current));
    }

    #[test]
    fn test_expression_offset_is_compiled() {
        let templates = resolve_document(
            &document(
                r#"
                [[templates]]
                start_cell = { x_offset = "current.width - 1" }
                traverse = { x = "whole" }
                "#,
            ),
            &RuleRegistry::new(),
        )
        .unwrap();
        let t = &templates[0];
        assert_eq!(t.start_cell.x_offset.resolve(&input()).unwrap(), 2);
        assert_eq!(t.traverse.x, Direction::Whole);
        assert_eq!(t.traverse.y, Direction::None);
    }

    #[test]
    fn test_non_integer_offset_is_rule_error() {
        let templates = resolve_document(
            &document(
                r#"
                [[templates]]
                start_cell = { y_offset = "current.width / 2" }
                "#,
            ),
            &RuleRegistry::new(),
        )
        .unwrap();
        let err = templates[0].start_cell.y_offset.resolve(&input()).unwrap_err();
        assert_eq!(err.message, "expected an integer, found 1.5");
    }

    #[test]
    fn test_malformed_expression_reports_path() {
        let err = resolve_document(
            &document(
                r#"
                [[templates]]
                [[templates.children]]
                constraints = [ { check = "value ==" } ]
                "#,
            ),
            &RuleRegistry::new(),
        )
        .unwrap_err();
        match &err {
            TemplateError::Expression { path, field, .. } => {
                assert_eq!(path.to_string(), "0.0");
                assert_eq!(field, "constraints[0].check");
            }
            other => panic!("Expected expression error, got {:?}", other),
        }
        assert!(err.report().contains("value =="));
    }

    #[test]
    fn test_unknown_rule_name() {
        let err = resolve_document(
            &document(
                r#"
                [[templates]]
                transform = { rule = "split_units" }
                "#,
            ),
            &RuleRegistry::new(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            TemplateError::Registry {
                error: RegistryError::NotFound { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_constraint_needs_exactly_one_check() {
        let err = resolve_document(
            &document(
                r#"
                [[templates]]
                constraints = [ { equals = "Name", value_type = "string" } ]
                "#,
            ),
            &RuleRegistry::new(),
        )
        .unwrap_err();
        assert!(matches!(err, TemplateError::Invalid { .. }));
    }

    #[test]
    fn test_negative_size_is_invalid() {
        let err = resolve_document(
            &document(
                r#"
                [[templates]]
                size = { width = -2 }
                "#,
            ),
            &RuleRegistry::new(),
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid template 0: size width must be positive, got -2"
        );
    }

    #[test]
    fn test_check_expression_predicate() {
        let templates = resolve_document(
            &document(
                r#"
                [[templates]]
                constraints = [ { check = 'value in ["Height", "Width"]' } ]
                "#,
            ),
            &RuleRegistry::new(),
        )
        .unwrap();
        match &templates[0].constraints[0].check {
            ValueCheck::Custom(check) => {
                assert!(check(&CellValue::text("Height")).unwrap());
                assert!(!check(&CellValue::text("Depth")).unwrap());
            }
            other => panic!("Expected custom check, got {:?}", other),
        }
    }

    #[test]
    fn test_transform_kinds() {
        let templates = resolve_document(
            &document(
                r#"
                [[templates]]
                transform = { target_cols = ["A", ""] }

                [[templates]]
                transform = { context = { position = "left" } }

                [[templates]]
                transform = { map = "upper(value)" }
                "#,
            ),
            &RuleRegistry::new(),
        )
        .unwrap();
        let kinds: Vec<LayerKind> = templates.iter().map(Template::kind).collect();
        assert_eq!(
            kinds,
            vec![LayerKind::Position, LayerKind::Context, LayerKind::Value]
        );
    }

    #[test]
    fn test_column_name_normalization() {
        assert_eq!(column_name(Value::Null), None);
        assert_eq!(column_name(Value::String(String::new())), None);
        assert_eq!(column_name(Value::Number(2.0)), Some("2".to_string()));
        assert_eq!(
            column_name(Value::String("Age".to_string())),
            Some("Age".to_string())
        );
    }
}
