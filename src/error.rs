use thiserror::Error;
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("invalid type for {field}: expected {expected}, got {found}")]
    InvalidType {
        field: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error("no channel registered under `{0}`")]
    NotFound(String),
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("failed to route attribute `{attribute}` onto channel `{channel}`: {reason}")]
    AttributeRoutingFailed {
        channel: String,
        attribute: String,
        reason: String,
    },
    #[error("insufficient data: {0}")]
    InsufficientData(String),
    #[error("missing precondition: {0}")]
    MissingPrecondition(String),
    #[error("time step of {0} ms is not positive or runs past the representable time range")]
    InvalidStep(i64),
    #[error("length mismatch for {what}: expected {expected}, got {actual}")]
    LengthMismatch {
        what: String,
        expected: usize,
        actual: usize,
    },
    #[error("malformed TDMS container: {0}")]
    MalformedContainer(String),
    #[error("{path}:{line}: {message}")]
    Parse {
        path: String,
        line: usize,
        message: String,
    },
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
    #[cfg(feature = "hdf5")]
    #[error("hdf5 error: {0}")]
    Hdf5(#[from] hdf5::Error),
}
impl ConvertError {
    pub(crate) fn invalid_type(
        field: impl Into<String>,
        expected: &'static str,
        found: &'static str,
    ) -> Self {
        ConvertError::InvalidType {
            field: field.into(),
            expected,
            found,
        }
    }
    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        ConvertError::MalformedContainer(message.into())
    }
}
pub type Result<T> = std::result::Result<T, ConvertError>;
