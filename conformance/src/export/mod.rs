//! Exporting captured suite metadata to other test formats.
//!
//! Both formats are derived from metadata capture only: no server is
//! contacted and no suite setup runs.

use std::fmt;

use crate::engine::SuiteMetadata;

pub mod tcl;
pub mod testscript;

/// Supported export formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// TestScript-style JSON document, one per selection.
    TestScript,
    /// Line-oriented test control language.
    Tcl,
}

impl ExportFormat {
    pub fn parse(name: &str) -> Result<Self, ExportError> {
        match name {
            "testscript" => Ok(ExportFormat::TestScript),
            "tcl" => Ok(ExportFormat::Tcl),
            other => Err(ExportError::UnknownFormat(other.to_string())),
        }
    }
}

/// Error type for exports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportError {
    UnknownFormat(String),
    Serialize(String),
}

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportError::UnknownFormat(name) => {
                write!(f, "unknown export format: {} (expected testscript or tcl)", name)
            }
            ExportError::Serialize(detail) => write!(f, "failed to serialize export: {}", detail),
        }
    }
}

impl std::error::Error for ExportError {}

/// Render `metadata` in `format`.
pub fn export(metadata: &[SuiteMetadata], format: ExportFormat) -> Result<String, ExportError> {
    match format {
        ExportFormat::TestScript => testscript::render(metadata),
        ExportFormat::Tcl => Ok(tcl::render(metadata)),
    }
}
