//! Detection primitives (C2, §4.2): scanner-agnostic operators, each
//! a pure function of `(bytes|handle, options, registry_snapshot)` that
//! never writes persistent state. Scanners (C3) compose these.

pub mod html;
pub mod model_artifact;
pub mod ocr;
pub mod tabular;
pub mod text;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticLevel {
    Info,
    Warn,
    Error,
}

/// A non-finding observation surfaced alongside a primitive's findings —
/// e.g. "OCR not available" or "unrecognized model framework".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub message: String,
}

impl Diagnostic {
    pub fn info(message: impl Into<String>) -> Self {
        Self { level: DiagnosticLevel::Info, message: message.into() }
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self { level: DiagnosticLevel::Warn, message: message.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { level: DiagnosticLevel::Error, message: message.into() }
    }
}
