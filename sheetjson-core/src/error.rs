//! Error types for sheet formatting and collection linking

use thiserror::Error;

/// Fatal condition for a single sheet; other sheets keep going
#[derive(Debug, Error)]
pub enum FormatError {
    /// The option cell does not hold a valid sheet option object
    #[error("invalid sheet option in {cell}: {source}")]
    InvalidOptionCell {
        cell: String,
        #[source]
        source: serde_json::Error,
    },

    /// A data cell was found before any origin record was started
    #[error("no origin record for data cell {cell}")]
    MissingOrigin { cell: String },
}

/// Reason a record from a non-origin sheet could not be linked
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    #[error("not found origin")]
    OriginNotFound,

    #[error("not found key path")]
    MissingKeyPath,

    #[error("not found index for `{segment}`")]
    MissingIndex { segment: String },

    #[error("not found origin parts at `{segment}`")]
    OriginPartNotFound { segment: String },

    #[error("is not Array")]
    NotAnArray,

    #[error("is not Object")]
    NotAnObject,

    #[error("not found __key")]
    MissingMapKey,

    #[error("not found ref key `{ref_key}`")]
    MissingRefKey { ref_key: String },
}
