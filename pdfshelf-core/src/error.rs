use thiserror::Error;

pub type Result<T> = std::result::Result<T, ShelfError>;

/// Errors surfaced by the library, session, and renderer boundaries.
///
/// Every variant is a caller-input or environment error: none of them are
/// fatal to the process and the core never retries on them.
#[derive(Debug, Error)]
pub enum ShelfError {
    #[error("document {0:?} not found in the library")]
    NotFound(String),

    #[error("document {name:?} could not be parsed: {reason}")]
    CorruptDocument { name: String, reason: String },

    #[error("page {} is out of range (document has {page_count} pages)", .page + 1)]
    OutOfRange { page: usize, page_count: usize },

    #[error("zoom {zoom} is outside the allowed range {min}..={max}")]
    InvalidZoom { zoom: f32, min: f32, max: f32 },

    #[error("no document is open")]
    NoDocumentOpen,

    #[error("invalid document name {0:?}")]
    InvalidName(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("render error: {0}")]
    Render(#[from] anyhow::Error),
}

impl ShelfError {
    pub(crate) fn check_page(page: usize, page_count: usize) -> Result<()> {
        if page < page_count {
            Ok(())
        } else {
            Err(ShelfError::OutOfRange { page, page_count })
        }
    }
}
