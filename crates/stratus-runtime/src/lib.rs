pub mod credentials;
pub mod diff;
pub mod driver;
pub mod error;
pub mod groups;
pub mod memory;
pub mod metrics;
pub mod provider;
pub mod reconcile;
pub mod store;

pub use credentials::{CredentialResolver, HttpCredentialResolver, StaticCredentialResolver};
pub use diff::{DiffPlan, StatusUpdate, plan_diff};
pub use driver::SyncDriver;
pub use error::{CredentialError, ProviderError, ReconcileError, ReconcileResult, StoreError};
pub use groups::{GroupView, ResourceGroupService};
pub use memory::{MemoryGroupStore, MemoryResourceStore};
pub use metrics::SyncMetrics;
pub use provider::{ProviderCapability, ProviderRegistry};
pub use reconcile::{ReconciliationService, SyncFailure, SyncSummary};
pub use store::{GroupStore, ResourceStore};
