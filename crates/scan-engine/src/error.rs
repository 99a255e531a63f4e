use thiserror::Error;

/// Errors raised while evaluating the registry (C1) or running a scanner (C2/C3).
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("malformed rule pack: {0}")]
    MalformedRulePack(String),

    #[error("unsupported capability for this scan type: {0}")]
    UnsupportedCapability(String),

    #[error("OCR not available")]
    OcrUnavailable,

    #[error("model artifact could not be parsed: {0}")]
    ArtifactParse(String),

    #[error("scan target is malformed: {0}")]
    InvalidTarget(String),

    #[error("core error: {0}")]
    Core(#[from] scan_core::error::Error),

    #[error("http probe failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
