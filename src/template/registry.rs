//! Registry of named rules that template documents can refer to
//!
//! Documents name a rule with `{ rule = "..." }` wherever a closure would be
//! accepted by the programmatic API. The host program registers the rule
//! functions up front.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::grid::CellValue;
use crate::matching::types::AreaCell;

use super::types::{AreaFn, CellSelection, MapColsFn, PredicateFn, RuleError, RuleInput};

/// Errors that can occur during rule lookup and registration
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RegistryError {
    /// Rule not found in registry
    #[error("rule not found: {name}")]
    NotFound { name: String },

    /// Duplicate rule definition
    #[error("duplicate rule definition: {name}")]
    Duplicate { name: String },

    /// Rule exists but is used where a different kind is expected
    #[error("rule {name} has kind {found}, expected {expected}")]
    WrongKind {
        name: String,
        expected: RuleKind,
        found: RuleKind,
    },
}

/// What a named rule computes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    Offset,
    Predicate,
    ContextPosition,
    TargetCol,
    MapCols,
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RuleKind::Offset => "offset",
            RuleKind::Predicate => "predicate",
            RuleKind::ContextPosition => "context position",
            RuleKind::TargetCol => "target column",
            RuleKind::MapCols => "column mapping",
        };
        f.write_str(name)
    }
}

/// A stored rule function
#[derive(Clone)]
pub enum NamedRule {
    Offset(Arc<AreaFn<i64>>),
    Predicate(Arc<PredicateFn>),
    ContextPosition(Arc<AreaFn<Vec<CellSelection>>>),
    TargetCol(Arc<AreaFn<Option<String>>>),
    MapCols(Arc<MapColsFn>),
}

impl NamedRule {
    pub fn kind(&self) -> RuleKind {
        match self {
            NamedRule::Offset(_) => RuleKind::Offset,
            NamedRule::Predicate(_) => RuleKind::Predicate,
            NamedRule::ContextPosition(_) => RuleKind::ContextPosition,
            NamedRule::TargetCol(_) => RuleKind::TargetCol,
            NamedRule::MapCols(_) => RuleKind::MapCols,
        }
    }
}

impl fmt::Debug for NamedRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NamedRule({})", self.kind())
    }
}

/// Registry for storing named rules
#[derive(Debug, Default, Clone)]
pub struct RuleRegistry {
    rules: HashMap<String, NamedRule>,
}

impl RuleRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a rule under a name
    pub fn register(&mut self, name: &str, rule: NamedRule) -> Result<(), RegistryError> {
        if self.rules.contains_key(name) {
            return Err(RegistryError::Duplicate {
                name: name.to_string(),
            });
        }
        log::trace!("registered {} rule {}", rule.kind(), name);
        self.rules.insert(name.to_string(), rule);
        Ok(())
    }

    pub fn register_offset(
        &mut self,
        name: &str,
        f: impl Fn(&RuleInput<'_>) -> Result<i64, RuleError> + Send + Sync + 'static,
    ) -> Result<(), RegistryError> {
        self.register(name, NamedRule::Offset(Arc::new(f)))
    }

    pub fn register_predicate(
        &mut self,
        name: &str,
        f: impl Fn(&CellValue) -> Result<bool, RuleError> + Send + Sync + 'static,
    ) -> Result<(), RegistryError> {
        self.register(name, NamedRule::Predicate(Arc::new(f)))
    }

    pub fn register_context_position(
        &mut self,
        name: &str,
        f: impl Fn(&RuleInput<'_>) -> Result<Vec<CellSelection>, RuleError> + Send + Sync + 'static,
    ) -> Result<(), RegistryError> {
        self.register(name, NamedRule::ContextPosition(Arc::new(f)))
    }

    pub fn register_target_col(
        &mut self,
        name: &str,
        f: impl Fn(&RuleInput<'_>) -> Result<Option<String>, RuleError> + Send + Sync + 'static,
    ) -> Result<(), RegistryError> {
        self.register(name, NamedRule::TargetCol(Arc::new(f)))
    }

    pub fn register_map_cols(
        &mut self,
        name: &str,
        f: impl Fn(&[AreaCell], &RuleInput<'_>) -> Result<Vec<Option<String>>, RuleError>
            + Send
            + Sync
            + 'static,
    ) -> Result<(), RegistryError> {
        self.register(name, NamedRule::MapCols(Arc::new(f)))
    }

    /// Get a rule by name
    pub fn get(&self, name: &str) -> Result<&NamedRule, RegistryError> {
        self.rules.get(name).ok_or_else(|| RegistryError::NotFound {
            name: name.to_string(),
        })
    }

    /// Check if a rule exists
    pub fn contains(&self, name: &str) -> bool {
        self.rules.contains_key(name)
    }

    /// Get all rule names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.rules.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn offset(&self, name: &str) -> Result<Arc<AreaFn<i64>>, RegistryError> {
        match self.get(name)? {
            NamedRule::Offset(f) => Ok(Arc::clone(f)),
            other => Err(wrong_kind(name, RuleKind::Offset, other)),
        }
    }

    pub fn predicate(&self, name: &str) -> Result<Arc<PredicateFn>, RegistryError> {
        match self.get(name)? {
            NamedRule::Predicate(f) => Ok(Arc::clone(f)),
            other => Err(wrong_kind(name, RuleKind::Predicate, other)),
        }
    }

    pub fn context_position(
        &self,
        name: &str,
    ) -> Result<Arc<AreaFn<Vec<CellSelection>>>, RegistryError> {
        match self.get(name)? {
            NamedRule::ContextPosition(f) => Ok(Arc::clone(f)),
            other => Err(wrong_kind(name, RuleKind::ContextPosition, other)),
        }
    }

    pub fn target_col(&self, name: &str) -> Result<Arc<AreaFn<Option<String>>>, RegistryError> {
        match self.get(name)? {
            NamedRule::TargetCol(f) => Ok(Arc::clone(f)),
            other => Err(wrong_kind(name, RuleKind::TargetCol, other)),
        }
    }

    pub fn map_cols(&self, name: &str) -> Result<Arc<MapColsFn>, RegistryError> {
        match self.get(name)? {
            NamedRule::MapCols(f) => Ok(Arc::clone(f)),
            other => Err(wrong_kind(name, RuleKind::MapCols, other)),
        }
    }
}

fn wrong_kind(name: &str, expected: RuleKind, found: &NamedRule) -> RegistryError {
    RegistryError::WrongKind {
        name: name.to_string(),
        expected,
        found: found.kind(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_register_and_get() {
        let mut registry = RuleRegistry::new();
        registry
            .register_predicate("is_year", |v| {
                Ok(v.as_number().map(|n| n >= 1900.0).unwrap_or(false))
            })
            .expect("Should register");

        assert!(registry.contains("is_year"));
        let check = registry.predicate("is_year").expect("Should find predicate");
        assert!(check(&CellValue::Number(2024.0)).unwrap());
        assert!(!check(&CellValue::text("n/a")).unwrap());
    }

    #[test]
    fn test_registry_duplicate_error() {
        let mut registry = RuleRegistry::new();
        registry
            .register_offset("last_col", |input| Ok(input.current.rect.width as i64 - 1))
            .expect("First register should succeed");
        let result = registry.register_offset("last_col", |_| Ok(0));
        assert!(matches!(result, Err(RegistryError::Duplicate { .. })));
    }

    #[test]
    fn test_registry_wrong_kind() {
        let mut registry = RuleRegistry::new();
        registry.register_offset("zero", |_| Ok(0)).unwrap();

        let err = registry.predicate("zero").map(|_| ()).unwrap_err();
        assert_eq!(
            err,
            RegistryError::WrongKind {
                name: "zero".to_string(),
                expected: RuleKind::Predicate,
                found: RuleKind::Offset,
            }
        );
        assert_eq!(
            err.to_string(),
            "rule zero has kind offset, expected predicate"
        );
    }

    #[test]
    fn test_registry_not_found() {
        let registry = RuleRegistry::new();
        assert!(matches!(
            registry.map_cols("missing").map(|_| ()),
            Err(RegistryError::NotFound { .. })
        ));
        assert!(registry.names().is_empty());
    }
}
