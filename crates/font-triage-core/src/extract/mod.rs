pub mod sfnt;

use crate::model::FontMetadata;
use thiserror::Error;

pub use sfnt::SfntExtractor;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExtractError {
    #[error("truncated data reading {0}")]
    Truncated(&'static str),

    #[error("unsupported format: {0}")]
    Unsupported(String),

    #[error("missing required table '{0}'")]
    MissingTable(&'static str),

    #[error("malformed font: {0}")]
    Malformed(String),
}

/// Turns the raw bytes of one asset into a structured record.
///
/// Implementations must be pure with respect to their input so extraction can
/// run on a rayon pool.
pub trait Extractor: Send + Sync {
    fn extract(&self, bytes: &[u8]) -> Result<FontMetadata, ExtractError>;
}
