//! Serializable template documents
//!
//! A document is the partial, author-facing form of a template tree: every
//! field is optional and computed fields are written as rule expressions or
//! names of registered rules. [`super::resolve_document`] turns it into
//! fully populated [`Template`](super::Template) values.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::error::ParseError;
use crate::grid::CellValue;

use super::registry::{RegistryError, RuleRegistry};
use super::types::{Corner, Direction, Edge, Template, TemplatePath, ValueType};

/// Errors that can occur when loading a template document
#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("Failed to read template file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse template TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Failed to parse template JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A rule expression failed to parse
    #[error("invalid expression in {field} of template {path}: {}", first_message(.errors))]
    Expression {
        path: TemplatePath,
        field: String,
        source_text: String,
        errors: Vec<ParseError>,
    },

    /// A named rule is missing or has the wrong kind
    #[error("template {path}: {error}")]
    Registry {
        path: TemplatePath,
        error: RegistryError,
    },

    /// Invalid field value or field combination
    #[error("invalid template {path}: {reason}")]
    Invalid { path: TemplatePath, reason: String },
}

fn first_message(errors: &[ParseError]) -> String {
    errors
        .first()
        .map(|e| match e {
            ParseError::Syntax { message, .. } => message.clone(),
        })
        .unwrap_or_default()
}

impl TemplateError {
    pub fn invalid(path: &TemplatePath, reason: impl Into<String>) -> Self {
        Self::Invalid {
            path: path.clone(),
            reason: reason.into(),
        }
    }

    /// Template the error refers to, if any
    pub fn path(&self) -> Option<&TemplatePath> {
        match self {
            TemplateError::Expression { path, .. }
            | TemplateError::Registry { path, .. }
            | TemplateError::Invalid { path, .. } => Some(path),
            _ => None,
        }
    }

    /// Human-readable report; expression errors include a source excerpt
    pub fn report(&self) -> String {
        match self {
            TemplateError::Expression {
                path,
                field,
                source_text,
                errors,
            } => {
                let name = format!("template {} {}", path, field);
                errors
                    .iter()
                    .map(|e| e.format(source_text, &name))
                    .collect::<Vec<_>>()
                    .join("\n")
            }
            other => other.to_string(),
        }
    }
}

/// Top-level template document
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TemplateDocument {
    #[serde(default)]
    pub templates: Vec<TemplateSpec>,
}

impl TemplateDocument {
    /// Load a document, choosing the format by file extension (TOML unless `.json`)
    pub fn from_file(path: &Path) -> Result<Self, TemplateError> {
        let content = std::fs::read_to_string(path).map_err(|source| TemplateError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let is_json = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        if is_json {
            Self::from_json_str(&content)
        } else {
            Self::from_toml_str(&content)
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, TemplateError> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_json_str(content: &str) -> Result<Self, TemplateError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Fill in defaults and compile rules
    pub fn resolve(&self, registry: &RuleRegistry) -> Result<Vec<Template>, TemplateError> {
        super::resolve_document(self, registry)
    }
}

/// Partial template; every field is optional
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TemplateSpec {
    #[serde(default, alias = "startCell")]
    pub start_cell: Option<SelectionSpec>,
    #[serde(default)]
    pub size: Option<SizeSpec>,
    #[serde(default)]
    pub constraints: Vec<ConstraintSpec>,
    #[serde(default)]
    pub traverse: Option<TraverseSpec>,
    #[serde(default)]
    pub transform: Option<TransformSpec>,
    #[serde(default)]
    pub children: Vec<TemplateSpec>,
    #[serde(default)]
    pub record: Option<bool>,
    #[serde(default)]
    pub required: Option<bool>,
}

/// Integer field: literal, expression or named rule
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum IntRuleSpec {
    Literal(i64),
    Expr(String),
    Named { rule: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameKeyword {
    Current,
    Parent,
    Root,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum FrameSpec {
    Keyword(FrameKeyword),
    /// Ancestor at an explicit nesting depth
    Layer { layer: IntRuleSpec },
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SelectionSpec {
    #[serde(default)]
    pub frame: Option<FrameSpec>,
    #[serde(default)]
    pub corner: Option<Corner>,
    #[serde(default, alias = "xOffset")]
    pub x_offset: Option<IntRuleSpec>,
    #[serde(default, alias = "yOffset")]
    pub y_offset: Option<IntRuleSpec>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtentKeyword {
    #[serde(alias = "toParent", alias = "toParentX", alias = "toParentY")]
    ToParent,
    Unbounded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ExtentSpec {
    Cells(i64),
    Keyword(ExtentKeyword),
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SizeSpec {
    #[serde(default)]
    pub width: Option<ExtentSpec>,
    #[serde(default)]
    pub height: Option<ExtentSpec>,
}

/// Constraint: a cell selection plus exactly one value check
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConstraintSpec {
    #[serde(default)]
    pub frame: Option<FrameSpec>,
    #[serde(default)]
    pub corner: Option<Corner>,
    #[serde(default, alias = "xOffset")]
    pub x_offset: Option<IntRuleSpec>,
    #[serde(default, alias = "yOffset")]
    pub y_offset: Option<IntRuleSpec>,
    #[serde(default)]
    pub equals: Option<CellValue>,
    #[serde(default, alias = "valueType")]
    pub value_type: Option<ValueType>,
    /// Predicate expression over `value`
    #[serde(default)]
    pub check: Option<String>,
    #[serde(default)]
    pub rule: Option<String>,
}

impl ConstraintSpec {
    pub fn selection(&self) -> SelectionSpec {
        SelectionSpec {
            frame: self.frame.clone(),
            corner: self.corner,
            x_offset: self.x_offset.clone(),
            y_offset: self.y_offset.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TraverseSpec {
    #[serde(default, alias = "x_direction", alias = "xDirection")]
    pub x: Option<Direction>,
    #[serde(default, alias = "y_direction", alias = "yDirection")]
    pub y: Option<Direction>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum PositionSpec {
    Edge(Edge),
    Selections(Vec<SelectionSpec>),
    Named { rule: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKeyword {
    #[serde(alias = "cellValue")]
    CellValue,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum TargetColSpec {
    Keyword(TargetKeyword),
    Expr { expr: String },
    Named { rule: String },
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContextSpec {
    #[serde(default)]
    pub position: Option<PositionSpec>,
    #[serde(default, alias = "targetCol")]
    pub target_col: Option<TargetColSpec>,
}

/// Transform: exactly one of the strategies
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransformSpec {
    #[serde(default, alias = "targetCols")]
    pub target_cols: Option<Vec<Option<String>>>,
    #[serde(default)]
    pub context: Option<ContextSpec>,
    /// Column expression evaluated per cell
    #[serde(default)]
    pub map: Option<String>,
    #[serde(default)]
    pub rule: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_toml_document() {
        let doc = TemplateDocument::from_toml_str(
            r#"
            [[templates]]
            size = { width = 2 }

            [[templates]]
            start_cell = { frame = "root", y_offset = 1 }
            size = { width = "to_parent", height = 1 }
            traverse = { y = "after" }
            record = true
            constraints = [ { x_offset = 0, value_type = "string" } ]
            transform = { context = { position = "top", target_col = "cell_value" } }
            "#,
        )
        .expect("Should parse");

        assert_eq!(doc.templates.len(), 2);
        let data = &doc.templates[1];
        let start = data.start_cell.as_ref().unwrap();
        assert_eq!(start.frame, Some(FrameSpec::Keyword(FrameKeyword::Root)));
        assert_eq!(start.y_offset, Some(IntRuleSpec::Literal(1)));
        assert_eq!(
            data.size.as_ref().unwrap().width,
            Some(ExtentSpec::Keyword(ExtentKeyword::ToParent))
        );
        assert_eq!(data.traverse.unwrap().y, Some(Direction::After));
        assert_eq!(data.constraints[0].value_type, Some(ValueType::String));
        let context = data.transform.as_ref().unwrap().context.as_ref().unwrap();
        assert_eq!(context.position, Some(PositionSpec::Edge(Edge::Top)));
        assert_eq!(
            context.target_col,
            Some(TargetColSpec::Keyword(TargetKeyword::CellValue))
        );
    }

    #[test]
    fn test_int_rule_variants() {
        let doc = TemplateDocument::from_toml_str(
            r#"
            [[templates]]
            start_cell = { frame = { layer = 1 }, x_offset = "current.width - 1", y_offset = { rule = "below" } }
            "#,
        )
        .unwrap();
        let start = doc.templates[0].start_cell.as_ref().unwrap();
        assert_eq!(
            start.frame,
            Some(FrameSpec::Layer {
                layer: IntRuleSpec::Literal(1)
            })
        );
        assert_eq!(
            start.x_offset,
            Some(IntRuleSpec::Expr("current.width - 1".to_string()))
        );
        assert_eq!(
            start.y_offset,
            Some(IntRuleSpec::Named {
                rule: "below".to_string()
            })
        );
    }

    #[test]
    fn test_parse_json_document_with_camel_case() {
        let doc = TemplateDocument::from_json_str(
            r#"{"templates": [{
                "startCell": {"frame": "current", "corner": "topRight", "xOffset": -1},
                "traverse": {"xDirection": "whole"},
                "transform": {"targetCols": ["A", null, ""]}
            }]}"#,
        )
        .expect("Should parse");
        let spec = &doc.templates[0];
        assert_eq!(spec.start_cell.as_ref().unwrap().corner, Some(Corner::TopRight));
        assert_eq!(spec.traverse.unwrap().x, Some(Direction::Whole));
        assert_eq!(
            spec.transform.as_ref().unwrap().target_cols,
            Some(vec![Some("A".to_string()), None, Some(String::new())])
        );
    }

    #[test]
    fn test_unknown_frame_is_rejected() {
        let result = TemplateDocument::from_toml_str(
            r#"
            [[templates]]
            start_cell = { frame = "sibling" }
            "#,
        );
        assert!(matches!(result, Err(TemplateError::Toml(_))));
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let result = TemplateDocument::from_toml_str(
            r#"
            [[templates]]
            sizes = { width = 2 }
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_file_error() {
        let result = TemplateDocument::from_file(Path::new("/nonexistent/templates.toml"));
        assert!(matches!(result, Err(TemplateError::Io { .. })));
    }
}
