use thiserror::Error;

/// Errors surfaced by the document operations.
///
/// Boundary ambiguity is not represented here: when a heading matches but
/// its level metadata cannot bound the section confidently, operations
/// return an over-inclusive range and a warning instead of failing.
#[derive(Debug, Error)]
pub enum DocxError {
    /// No paragraph matches the requested section or sub-heading.
    #[error("not found: {0}")]
    NotFound(String),

    /// A required XML part is absent from the package.
    #[error("missing required part: {0}")]
    MissingPart(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, DocxError>;
