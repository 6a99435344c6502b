//! Command-line argument parsing for the previewer
//!
//! Supports:
//! - Rendering a template against a JSON data file
//! - Validation only (`--check`)
//! - Dumping highlight spans (`--highlight`)

use clap::Parser;
use std::path::PathBuf;

use crate::config::PreviewConfig;

/// Preview Velocity templates against JSON data
#[derive(Parser, Debug)]
#[command(
    name = "vtl-preview",
    version,
    about = "Preview Velocity templates against JSON data"
)]
pub struct CliArgs {
    /// Template file to render
    #[arg(value_name = "TEMPLATE")]
    pub template: PathBuf,

    /// JSON file with the data context (an object)
    #[arg(short = 'd', long, value_name = "FILE")]
    pub data: Option<PathBuf>,

    /// Fail on unresolved references instead of rendering them literally
    #[arg(long)]
    pub strict: bool,

    /// Only validate the template and data, do not render
    #[arg(long)]
    pub check: bool,

    /// Print the template's highlight spans as JSON instead of rendering
    #[arg(long, conflicts_with = "check")]
    pub highlight: bool,

    /// Write rendered output to FILE instead of stdout
    #[arg(short = 'o', long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

/// What the binary should do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Render,
    Check,
    Highlight,
}

impl CliArgs {
    pub fn mode(&self) -> Mode {
        if self.check {
            Mode::Check
        } else if self.highlight {
            Mode::Highlight
        } else {
            Mode::Render
        }
    }

    /// Apply flag overrides on top of the persisted config
    pub fn apply_to(&self, config: &mut PreviewConfig) {
        if self.strict {
            config.strict_references = true;
        }
    }
}
