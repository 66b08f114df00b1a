//! Command implementations behind the `stratus` binary.

pub mod app;
pub mod commands;

pub use app::App;
