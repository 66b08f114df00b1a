//! Audit service: runs rules against cloud accounts and serves their latest
//! results.
//!
//! Every run writes a pending row before the rule executes and completes it
//! afterwards, so an interrupted or failed rule still leaves a trace of the
//! attempt.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use stratus_core::{CloudAccountId, CloudCredentials};
use stratus_runtime::CredentialResolver;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::error::AuditError;
use crate::result::AuditResult;
use crate::rule::{Rule, RuleRegistry};
use crate::store::ResultsStore;

/// A rule that did not produce an evaluated result during a batch run.
#[derive(Debug)]
pub struct RuleFailure {
    pub rule_id: String,
    pub error: AuditError,
}

/// Outcome of running every rule of one category.
#[derive(Debug)]
pub struct CategoryRun {
    pub category: String,
    /// Evaluated results in rule registration order.
    pub results: Vec<AuditResult>,
    pub failures: Vec<RuleFailure>,
}

impl CategoryRun {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Latest results of a category, for read paths.
#[derive(Debug, Clone, Serialize)]
pub struct CategoryResults {
    pub category: String,
    pub results: Vec<AuditResult>,
}

pub struct AuditService {
    registry: Arc<RuleRegistry>,
    resolver: Arc<dyn CredentialResolver>,
    results: Arc<dyn ResultsStore>,
}

impl AuditService {
    pub fn new(
        registry: Arc<RuleRegistry>,
        resolver: Arc<dyn CredentialResolver>,
        results: Arc<dyn ResultsStore>,
    ) -> Self {
        Self {
            registry,
            resolver,
            results,
        }
    }

    pub fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    /// Run a single rule.
    pub async fn run_by_id(
        &self,
        rule_id: &str,
        account_id: CloudAccountId,
    ) -> Result<AuditResult, AuditError> {
        let rule = self
            .registry
            .get(rule_id)
            .ok_or_else(|| AuditError::RuleNotFound(rule_id.to_string()))?;
        let credentials = self.resolve(account_id).await?;
        self.run_rule(rule.as_ref(), &credentials).await
    }

    /// Run every rule of a category in registration order.
    ///
    /// A failing rule is recorded and the remaining rules still run.
    pub async fn run_by_category(
        &self,
        category: &str,
        account_id: CloudAccountId,
    ) -> Result<CategoryRun, AuditError> {
        let rules = self
            .registry
            .category(category)
            .ok_or_else(|| AuditError::CategoryNotFound(category.to_string()))?;
        let credentials = self.resolve(account_id).await?;
        Ok(self.run_rules(category, &rules, &credentials).await)
    }

    /// Run every registered rule, grouped by category.
    pub async fn run_all(
        &self,
        account_id: CloudAccountId,
    ) -> Result<BTreeMap<String, CategoryRun>, AuditError> {
        let credentials = self.resolve(account_id).await?;

        let mut runs = BTreeMap::new();
        for category in self.registry.categories() {
            let Some(rules) = self.registry.category(category) else {
                continue;
            };
            let run = self.run_rules(category, &rules, &credentials).await;
            runs.insert(category.to_string(), run);
        }
        Ok(runs)
    }

    /// Latest persisted result of a rule, pending or evaluated.
    pub async fn get_result_by_id(
        &self,
        rule_id: &str,
        account_id: CloudAccountId,
    ) -> Result<AuditResult, AuditError> {
        if self.registry.get(rule_id).is_none() {
            return Err(AuditError::RuleNotFound(rule_id.to_string()));
        }
        self.results
            .get_last_run(account_id, rule_id)
            .await?
            .ok_or_else(|| AuditError::ResultNotFound {
                rule_id: rule_id.to_string(),
                account_id,
            })
    }

    /// Latest result of every rule in a category. Rules that never ran are omitted.
    pub async fn get_results_by_category(
        &self,
        category: &str,
        account_id: CloudAccountId,
    ) -> Result<CategoryResults, AuditError> {
        let rules = self
            .registry
            .category(category)
            .ok_or_else(|| AuditError::CategoryNotFound(category.to_string()))?;
        self.latest_results(category, &rules, account_id).await
    }

    /// Latest result of every rule, grouped by category.
    pub async fn get_all_results(
        &self,
        account_id: CloudAccountId,
    ) -> Result<BTreeMap<String, CategoryResults>, AuditError> {
        let mut grouped = BTreeMap::new();
        for category in self.registry.categories() {
            let Some(rules) = self.registry.category(category) else {
                continue;
            };
            let results = self.latest_results(category, &rules, account_id).await?;
            grouped.insert(category.to_string(), results);
        }
        Ok(grouped)
    }

    async fn latest_results(
        &self,
        category: &str,
        rules: &[Arc<dyn Rule>],
        account_id: CloudAccountId,
    ) -> Result<CategoryResults, AuditError> {
        let mut results = Vec::with_capacity(rules.len());
        for rule in rules {
            if let Some(result) = self.results.get_last_run(account_id, rule.id()).await? {
                results.push(result);
            }
        }
        Ok(CategoryResults {
            category: category.to_string(),
            results,
        })
    }

    async fn run_rules(
        &self,
        category: &str,
        rules: &[Arc<dyn Rule>],
        credentials: &CloudCredentials,
    ) -> CategoryRun {
        let mut run = CategoryRun {
            category: category.to_string(),
            results: Vec::with_capacity(rules.len()),
            failures: Vec::new(),
        };

        for rule in rules {
            match self.run_rule(rule.as_ref(), credentials).await {
                Ok(result) => run.results.push(result),
                Err(error) => {
                    warn!(rule_id = rule.id(), category, error = %error, "Audit rule failed");
                    run.failures.push(RuleFailure {
                        rule_id: rule.id().to_string(),
                        error,
                    });
                }
            }
        }

        info!(
            category,
            account_id = credentials.account_id,
            evaluated = run.results.len(),
            failed = run.failures.len(),
            "Audit category run finished"
        );
        run
    }

    async fn run_rule(
        &self,
        rule: &dyn Rule,
        credentials: &CloudCredentials,
    ) -> Result<AuditResult, AuditError> {
        let span = info_span!("audit_rule", rule_id = rule.id(), account_id = credentials.account_id);

        async {
            let pending = self
                .results
                .create_pending(&AuditResult::pending(credentials.account_id, rule.id()))
                .await?;
            debug!(result_id = ?pending.id, "Pending audit result written");

            let items = rule
                .execute(credentials)
                .await
                .map_err(|source| AuditError::Rule {
                    rule_id: rule.id().to_string(),
                    source,
                })?;

            let evaluated = pending.evaluated(items);
            self.results.update_result(&evaluated).await?;

            let (compliant, warning, danger) = evaluated.tally();
            info!(compliant, warning, danger, "Audit rule evaluated");
            Ok(evaluated)
        }
        .instrument(span)
        .await
    }

    async fn resolve(&self, account_id: CloudAccountId) -> Result<CloudCredentials, AuditError> {
        self.resolver
            .get_credentials(account_id)
            .await
            .map_err(|source| AuditError::Credentials { account_id, source })
    }
}
