use std::{error::Error, fmt};

/// The model module's result type.
pub type Result<T> = std::result::Result<T, MlError>;

/// Model configuration and shape failures.
#[derive(Debug)]
pub enum MlError {
    UnknownKernel(String),
    UnknownOptimizer(String),
    BadKernelParam {
        kernel: &'static str,
        detail: String,
    },
    BadOptimizerParam {
        optimizer: &'static str,
        detail: String,
    },
    DataShapeMismatch {
        kernel: &'static str,
        nx: u64,
        ny: u64,
    },
    ParameterWidthMismatch {
        got: usize,
        expected: usize,
    },
}

impl fmt::Display for MlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MlError::UnknownKernel(name) => write!(f, "unknown kernel: {name}"),
            MlError::UnknownOptimizer(name) => write!(f, "unknown optimizer: {name}"),
            MlError::BadKernelParam { kernel, detail } => {
                write!(f, "cannot parse parameters for kernel {kernel}: {detail}")
            }
            MlError::BadOptimizerParam { optimizer, detail } => {
                write!(
                    f,
                    "cannot parse parameters for optimizer {optimizer}: {detail}"
                )
            }
            MlError::DataShapeMismatch { kernel, nx, ny } => {
                write!(
                    f,
                    "dataset shape ({nx}, {ny}) does not match kernel {kernel}"
                )
            }
            MlError::ParameterWidthMismatch { got, expected } => {
                write!(f, "parameter width mismatch: got {got}, expected {expected}")
            }
        }
    }
}

impl Error for MlError {}
