use thiserror::Error;

/// Failure of the payload decoder on a single byte buffer.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("insufficient length: expected at least {expected} bytes, got {actual}")]
    InsufficientLength { expected: usize, actual: usize },

    #[error("non-finite value for sensor tag {tag}")]
    NonFinite { tag: u8 },

    #[error("value {value} out of range [{min}, {max}] for sensor tag {tag}")]
    OutOfRange { tag: u8, value: f32, min: f32, max: f32 },
}

/// Why a single uplink record was rejected. Counted, never propagated.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RecordError {
    #[error("malformed record: {0}")]
    MalformedRecord(String),

    #[error("decode failure: {0}")]
    DecodeFailure(String),

    #[error("value rejected: {0}")]
    OutOfRangeValue(DecodeError),

    #[error("unparsable timestamp: {0}")]
    UnparsableTimestamp(String),
}

impl From<DecodeError> for RecordError {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::InsufficientLength { .. } => RecordError::DecodeFailure(err.to_string()),
            DecodeError::NonFinite { .. } | DecodeError::OutOfRange { .. } => {
                RecordError::OutOfRangeValue(err)
            }
        }
    }
}

/// Failure of a whole batch, as opposed to a single record.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("expected a JSON array of uplink records, got {0}")]
    NotAnArray(&'static str),
}

/// Failure to obtain a batch from the uplink endpoint.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("endpoint {url} answered HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("response body is not valid JSON: {0}")]
    Body(#[source] reqwest::Error),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("endpoint returned no usable CO2 readings")]
    Empty,
}
