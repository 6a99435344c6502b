//! vtl-preview - live preview core for Velocity templates
//!
//! This crate provides the core types and logic of a template previewer
//! implementing the Elm Architecture pattern: incremental highlighting,
//! inline validation, and background rendering whose stale results are
//! discarded by generation.

pub mod app;
pub mod cli;
pub mod commands;
pub mod config;
pub mod config_paths;
pub mod diagnostics;
pub mod engine;
pub mod messages;
pub mod model;
pub mod render;
pub mod syntax;
pub mod tracing;
pub mod update;
pub mod validation;

// Re-export commonly used types
pub use app::PreviewApp;
pub use commands::Cmd;
pub use config::PreviewConfig;
pub use diagnostics::Diagnostic;
pub use messages::Msg;
pub use model::PreviewModel;
