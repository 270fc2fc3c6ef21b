use std::{error::Error, fmt, io};

use ml_core::MlError;

/// The master module's result type.
pub type Result<T> = std::result::Result<T, MasterErr>;

/// Fatal master failures; anything recoverable is logged instead.
#[derive(Debug)]
pub enum MasterErr {
    Io(io::Error),
    Ml(MlError),
    /// Bad mode, estimator, or selector configuration.
    Config(String),
    /// Workers disagree on the dataset shape.
    DatasetMismatch {
        source: usize,
        nx: (u64, u64),
        ny: (u64, u64),
    },
    /// The resumed parameter does not fit the configured model.
    ResumeMismatch {
        got: usize,
        expected: usize,
    },
}

impl fmt::Display for MasterErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MasterErr::Io(e) => write!(f, "io error: {e}"),
            MasterErr::Ml(e) => write!(f, "model error: {e}"),
            MasterErr::Config(detail) => write!(f, "bad configuration: {detail}"),
            MasterErr::DatasetMismatch { source, nx, ny } => write!(
                f,
                "dataset on worker {source} does not match the others: \
                 x {} vs {}, y {} vs {}",
                nx.1, nx.0, ny.1, ny.0
            ),
            MasterErr::ResumeMismatch { got, expected } => write!(
                f,
                "resumed parameter width {got} does not match the model width {expected}"
            ),
        }
    }
}

impl Error for MasterErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            MasterErr::Io(e) => Some(e),
            MasterErr::Ml(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for MasterErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<MlError> for MasterErr {
    fn from(value: MlError) -> Self {
        Self::Ml(value)
    }
}
