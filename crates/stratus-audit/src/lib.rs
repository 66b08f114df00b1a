//! # stratus-audit
//!
//! Compliance checks run against cloud accounts.
//!
//! - [`Rule`]: a named, categorized check evaluated with an account's
//!   resolved credentials.
//! - [`RuleRegistry`]: immutable index by rule id and by category.
//! - [`AuditService`]: runs rules (one, a category, or all) and serves the
//!   latest results.
//! - [`ResultsStore`]: persistence of results through their
//!   `pending` → `evaluated` lifecycle.
//!
//! ## Batch failure policy
//!
//! Category and full runs keep going when a rule fails. The failure is
//! reported next to the results of the rules that succeeded.

pub mod error;
pub mod result;
pub mod rule;
pub mod service;
pub mod store;

pub use error::{AuditError, RuleError};
pub use result::{
    AuditItem, AuditResult, Classification, ResultId, ResultState, classify_utilization,
};
pub use rule::{Rule, RuleInfo, RuleRegistry};
pub use service::{AuditService, CategoryResults, CategoryRun, RuleFailure};
pub use store::{MemoryResultsStore, ResultsStore};
