//! Google Cloud provider for Stratus.
//!
//! Talks to the public REST APIs directly with a bearer token taken from the
//! account's credential bag (`project_id`, `access_token`):
//!
//! - Compute Engine: aggregated instance listing, start/stop.
//! - Cloud SQL Admin: instance listing, start/stop through the activation
//!   policy.
//! - Cloud Monitoring: CPU utilization for the `overprovision` rules.

mod client;
mod compute;
pub mod error;
mod monitoring;
mod provider;
pub mod rules;
mod sql;

pub use client::{GcpClient, ProjectAuth};
pub use error::GcpError;
pub use provider::{GcpProvider, PROVIDER_NAME};
pub use rules::{OVERPROVISION, SqlCpuUtilizationRule, VmCpuUtilizationRule};
