//! Model kernels as seen from the master.
//!
//! The master never evaluates a kernel; it only needs the parameter width,
//! the dataset shape check, and whether the initial parameter must be
//! folded together from worker-side data.

use crate::error::{MlError, Result};

/// The shape contract of a concrete model family.
pub trait Kernel: Send + Sync {
    fn name(&self) -> &'static str;

    /// Width of the flat parameter vector.
    fn length_parameter(&self) -> usize;

    /// Whether a dataset of shape `(nx, ny)` fits this kernel.
    fn check_data(&self, nx: u64, ny: u64) -> bool;

    /// Whether the initial parameter is built from worker-side data
    /// (`DParameter` coordination) instead of a local draw.
    fn need_init_parameter_by_data(&self) -> bool {
        false
    }
}

/// Builds a kernel from its config name and parameter string.
///
/// # Arguments
/// * `name` - Kernel family, one of `linear`, `mlp`, `kmeans`.
/// * `param` - Dash-separated dimensions, e.g. `4-3-1` for an mlp.
///
/// # Errors
/// `MlError::UnknownKernel` for an unrecognized name,
/// `MlError::BadKernelParam` for an unparsable dimension string.
pub fn from_conf(name: &str, param: &str) -> Result<Box<dyn Kernel>> {
    match name {
        "linear" => Ok(Box::new(LinearKernel::new(param)?)),
        "mlp" => Ok(Box::new(MlpKernel::new(param)?)),
        "kmeans" => Ok(Box::new(KMeansKernel::new(param)?)),
        other => Err(MlError::UnknownKernel(other.to_string())),
    }
}

fn parse_dims(kernel: &'static str, param: &str) -> Result<Vec<u64>> {
    let dims: Vec<u64> = param
        .split('-')
        .map(|d| d.trim().parse())
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| MlError::BadKernelParam {
            kernel,
            detail: format!("bad dimension in '{param}': {e}"),
        })?;

    if dims.iter().any(|&d| d == 0) {
        return Err(MlError::BadKernelParam {
            kernel,
            detail: format!("zero dimension in '{param}'"),
        });
    }
    Ok(dims)
}

/// Linear model over `nx` features: one weight per feature.
pub struct LinearKernel {
    nx: u64,
}

impl LinearKernel {
    fn new(param: &str) -> Result<Self> {
        let dims = parse_dims("linear", param)?;
        if dims.len() != 1 {
            return Err(MlError::BadKernelParam {
                kernel: "linear",
                detail: format!("expected one dimension, got '{param}'"),
            });
        }
        Ok(Self { nx: dims[0] })
    }
}

impl Kernel for LinearKernel {
    fn name(&self) -> &'static str {
        "linear"
    }

    fn length_parameter(&self) -> usize {
        self.nx as usize
    }

    fn check_data(&self, nx: u64, ny: u64) -> bool {
        nx == self.nx && ny == 1
    }
}

/// Dense feed-forward stack; width counts one bias row per layer.
pub struct MlpKernel {
    dims: Vec<u64>,
}

impl MlpKernel {
    fn new(param: &str) -> Result<Self> {
        let dims = parse_dims("mlp", param)?;
        if dims.len() < 2 {
            return Err(MlError::BadKernelParam {
                kernel: "mlp",
                detail: format!("expected at least two dimensions, got '{param}'"),
            });
        }
        Ok(Self { dims })
    }
}

impl Kernel for MlpKernel {
    fn name(&self) -> &'static str {
        "mlp"
    }

    fn length_parameter(&self) -> usize {
        self.dims
            .windows(2)
            .map(|w| ((w[0] + 1) * w[1]) as usize)
            .sum()
    }

    fn check_data(&self, nx: u64, ny: u64) -> bool {
        nx == self.dims[0] && ny == *self.dims.last().unwrap()
    }
}

/// K-means centroids over `nx` features; centroids are seeded from the
/// workers' shards, so the initial parameter is data-driven.
pub struct KMeansKernel {
    nx: u64,
    k: u64,
}

impl KMeansKernel {
    fn new(param: &str) -> Result<Self> {
        let dims = parse_dims("kmeans", param)?;
        if dims.len() != 2 {
            return Err(MlError::BadKernelParam {
                kernel: "kmeans",
                detail: format!("expected '<nx>-<k>', got '{param}'"),
            });
        }
        Ok(Self {
            nx: dims[0],
            k: dims[1],
        })
    }
}

impl Kernel for KMeansKernel {
    fn name(&self) -> &'static str {
        "kmeans"
    }

    fn length_parameter(&self) -> usize {
        (self.nx * self.k) as usize
    }

    fn check_data(&self, nx: u64, ny: u64) -> bool {
        nx == self.nx && ny <= 1
    }

    fn need_init_parameter_by_data(&self) -> bool {
        true
    }
}
