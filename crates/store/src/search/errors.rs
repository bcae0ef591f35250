//! Extraction errors.
//!
//! These never escape a write: the extractor logs them and skips the
//! offending parameter value.

use thiserror::Error;

/// Error while extracting index values from a document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    /// The value at a parameter path could not be converted to the parameter's type.
    #[error("cannot convert '{actual_value}' to {expected_type} for parameter '{param_name}'")]
    ConversionFailed {
        /// Parameter code.
        param_name: String,
        /// Target index type.
        expected_type: String,
        /// What was found.
        actual_value: String,
    },

    /// The document is not a JSON object.
    #[error("invalid resource: {message}")]
    InvalidResource {
        /// Description of the problem.
        message: String,
    },
}

impl ExtractionError {
    pub(crate) fn conversion(
        param_name: &str,
        expected_type: &str,
        actual_value: impl ToString,
    ) -> Self {
        ExtractionError::ConversionFailed {
            param_name: param_name.to_string(),
            expected_type: expected_type.to_string(),
            actual_value: actual_value.to_string(),
        }
    }
}
