#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error("invalid grid dimension on axis {axis}: {value} (minimum {min})")]
    InvalidDimension {
        axis: &'static str,
        value: usize,
        min: usize,
    },

    #[error("linear solver diagonal must be finite and non-zero, got {0}")]
    ZeroDiagonal(f32),

    #[error("buffer length mismatch for {what}: expected {expected}, got {actual}")]
    BufferLengthMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("unsupported grid layout: {0:?} storage cannot hold scalar data")]
    InvalidCentering(crate::grid_data::Centering),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type SimResult<T> = Result<T, SimError>;

pub(crate) fn check_len(what: &'static str, expected: usize, actual: usize) -> SimResult<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(SimError::BufferLengthMismatch {
            what,
            expected,
            actual,
        })
    }
}
