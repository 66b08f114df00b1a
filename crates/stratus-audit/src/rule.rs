//! Audit rule capability and the registry that indexes rules.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use stratus_core::CloudCredentials;

use crate::error::{AuditError, RuleError};
use crate::result::AuditItem;

/// A named, categorized compliance check.
#[async_trait]
pub trait Rule: Send + Sync {
    /// Stable identifier, unique across the registry.
    fn id(&self) -> &str;

    /// Human-readable title.
    fn name(&self) -> &str;

    /// Grouping key, e.g. "overprovision".
    fn category(&self) -> &str;

    /// Evaluate the account and return one finding per inspected instance.
    async fn execute(&self, credentials: &CloudCredentials) -> Result<Vec<AuditItem>, RuleError>;
}

/// Listing entry for a registered rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleInfo {
    pub id: String,
    pub name: String,
    pub category: String,
}

/// Immutable index of the registered rules.
///
/// Categories keep registration order, so running a category runs its rules
/// in the order they were handed to [`RuleRegistry::new`].
#[derive(Default)]
pub struct RuleRegistry {
    rules: Vec<Arc<dyn Rule>>,
    by_id: BTreeMap<String, usize>,
    by_category: BTreeMap<String, Vec<usize>>,
}

impl RuleRegistry {
    pub fn new(rules: Vec<Arc<dyn Rule>>) -> Result<Self, AuditError> {
        let mut by_id = BTreeMap::new();
        let mut by_category: BTreeMap<String, Vec<usize>> = BTreeMap::new();

        for (index, rule) in rules.iter().enumerate() {
            if by_id.insert(rule.id().to_string(), index).is_some() {
                return Err(AuditError::DuplicateRule(rule.id().to_string()));
            }
            by_category
                .entry(rule.category().to_string())
                .or_default()
                .push(index);
        }

        Ok(Self {
            rules,
            by_id,
            by_category,
        })
    }

    pub fn get(&self, rule_id: &str) -> Option<Arc<dyn Rule>> {
        self.by_id.get(rule_id).map(|&i| Arc::clone(&self.rules[i]))
    }

    /// Rules of a category in registration order; `None` if the category is unknown.
    pub fn category(&self, category: &str) -> Option<Vec<Arc<dyn Rule>>> {
        self.by_category
            .get(category)
            .map(|indices| indices.iter().map(|&i| Arc::clone(&self.rules[i])).collect())
    }

    /// Category names in lexical order.
    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.by_category.keys().map(String::as_str)
    }

    /// All rules in registration order.
    pub fn rules(&self) -> &[Arc<dyn Rule>] {
        &self.rules
    }

    pub fn describe(&self) -> Vec<RuleInfo> {
        self.rules
            .iter()
            .map(|r| RuleInfo {
                id: r.id().to_string(),
                name: r.name().to_string(),
                category: r.category().to_string(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl std::fmt::Debug for RuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleRegistry")
            .field("rules", &self.by_id.keys().collect::<Vec<_>>())
            .finish()
    }
}
