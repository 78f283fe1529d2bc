use facetq_common::recording::RecordingError;
use thiserror::Error;

/// Caller errors raised synchronously by the query state engine.
///
/// These are precondition violations; state is left untouched when one is
/// returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("Column '{0}' is not a categorical facet of the current result")]
    InvalidFacetColumn(String),
    #[error("Single facet selection on '{0}' needs a value")]
    EmptyFacetValue(String),
    #[error("Facets were requested for display but the result does not carry them")]
    MissingFacetsInResult,
    #[error("Menu has no entry {0}")]
    MenuIndexOutOfRange(usize),
}

/// Failure of a transport to produce a result.
///
/// Recorded in orchestrator state rather than returned to the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Backend refused the query: {0}")]
    Remote(String),
    #[error("No recorded result for this request")]
    NotRecorded,
    #[error("Unable to decode backend reply: {0}")]
    Decode(String),
    #[error("Transport I/O failed: {0}")]
    Io(String),
    #[error("Transport closed")]
    Closed,
}

impl From<RecordingError> for TransportError {
    fn from(value: RecordingError) -> Self {
        match value {
            RecordingError::Io(e) => TransportError::Io(e.to_string()),
            other => TransportError::Decode(other.to_string()),
        }
    }
}
