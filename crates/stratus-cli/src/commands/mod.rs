//! `stratus` subcommands. Every command prints JSON on stdout.

pub mod audit;
pub mod daemon;
pub mod groups;
pub mod resources;
pub mod sync;

use serde::Serialize;
use serde_json::json;
use stratus_core::ErrorKind;

pub(crate) fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// JSON shape of a failure inside a batch report.
pub(crate) fn error_json(kind: ErrorKind, error: &impl std::fmt::Display) -> serde_json::Value {
    json!({ "kind": kind, "message": error.to_string() })
}

/// Tag a service error with its kind for the process exit message.
pub(crate) fn failed(kind: ErrorKind, error: impl std::fmt::Display) -> anyhow::Error {
    anyhow::anyhow!("{kind}: {error}")
}
