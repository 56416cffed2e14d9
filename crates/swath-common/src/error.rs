//! Error taxonomy for gridding and stacking.

use thiserror::Error;

/// Result type alias using SwathError.
pub type SwathResult<T> = Result<T, SwathError>;

/// Errors raised while building grids, resampling swaths, and stacking frames.
///
/// Configuration errors abort the call that raised them. Per-item errors
/// describe a single granule or frame that should be skipped while the rest
/// of the batch continues; see [`SwathError::is_per_item`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SwathError {
    // === Configuration errors (fatal to the call) ===
    #[error("Invalid grid bounds: {0}")]
    InvalidBounds(String),

    #[error("Invalid parameter '{param}': {message}")]
    InvalidParameter { param: String, message: String },

    #[error("Unsupported CRS: {0}")]
    UnsupportedCrs(String),

    // === Per-item errors (skip and continue) ===
    #[error("Granule {granule_id} is missing input: {missing}")]
    MissingInput { granule_id: String, missing: String },

    #[error("Invalid swath for granule {granule_id}: {message}")]
    InvalidSwath { granule_id: String, message: String },

    #[error("No YYYYMMDDTHHMMSS timestamp token in identifier: {0}")]
    TimestampParse(String),

    #[error("Frame shape {actual:?} does not match stack shape {expected:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("Frame {field} {actual} does not match stack {field} {expected}")]
    MetadataMismatch {
        field: &'static str,
        expected: String,
        actual: String,
    },

    // === Terminal stacking error ===
    #[error("No frames survived to stacking")]
    EmptyStack,
}

impl SwathError {
    /// Shorthand for an [`SwathError::InvalidParameter`].
    pub fn invalid_parameter(param: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            param: param.into(),
            message: message.into(),
        }
    }

    /// Shorthand for an [`SwathError::MissingInput`].
    pub fn missing_input(granule_id: impl Into<String>, missing: impl Into<String>) -> Self {
        Self::MissingInput {
            granule_id: granule_id.into(),
            missing: missing.into(),
        }
    }

    /// Attach a granule id to per-item errors raised before the id was known.
    pub fn for_granule(self, id: &str) -> Self {
        match self {
            SwathError::MissingInput { granule_id, missing } if granule_id.is_empty() => {
                SwathError::MissingInput {
                    granule_id: id.to_string(),
                    missing,
                }
            }
            SwathError::InvalidSwath {
                granule_id,
                message,
            } if granule_id.is_empty() => SwathError::InvalidSwath {
                granule_id: id.to_string(),
                message,
            },
            other => other,
        }
    }

    /// Whether this error only affects one item of a batch.
    ///
    /// Per-item errors are reported and the batch continues; everything else
    /// invalidates the whole run.
    pub fn is_per_item(&self) -> bool {
        matches!(
            self,
            SwathError::MissingInput { .. }
                | SwathError::InvalidSwath { .. }
                | SwathError::TimestampParse(_)
                | SwathError::ShapeMismatch { .. }
                | SwathError::MetadataMismatch { .. }
        )
    }

    /// Short machine-friendly kind name, used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            SwathError::InvalidBounds(_) => "invalid_bounds",
            SwathError::InvalidParameter { .. } => "invalid_parameter",
            SwathError::UnsupportedCrs(_) => "unsupported_crs",
            SwathError::MissingInput { .. } => "missing_input",
            SwathError::InvalidSwath { .. } => "invalid_swath",
            SwathError::TimestampParse(_) => "timestamp_parse",
            SwathError::ShapeMismatch { .. } => "shape_mismatch",
            SwathError::MetadataMismatch { .. } => "metadata_mismatch",
            SwathError::EmptyStack => "empty_stack",
        }
    }
}
