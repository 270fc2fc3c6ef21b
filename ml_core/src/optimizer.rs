use crate::error::{MlError, Result};

/// Parsed optimizer configuration.
///
/// The optimization step itself runs on the workers; the master only needs
/// the descriptor validated up front and the averaging contract it implies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OptimizerSpec {
    GradientDescent { lr: f64 },
    GradientDescentWithMomentum { lr: f64, mu: f64 },
    Adam { lr: f64, b1: f64, b2: f64, eps: f64 },
}

impl OptimizerSpec {
    /// Parses an optimizer from its config name and comma-separated params.
    ///
    /// # Errors
    /// `MlError::UnknownOptimizer` for an unrecognized name,
    /// `MlError::BadOptimizerParam` for missing or unparsable parameters.
    pub fn parse(name: &str, param: &str) -> Result<Self> {
        let fields: Vec<&str> = param.split(',').map(str::trim).collect();

        let field = |i: usize, optimizer: &'static str, default: Option<f64>| -> Result<f64> {
            match fields.get(i).filter(|s| !s.is_empty()) {
                Some(s) => s.parse().map_err(|e| MlError::BadOptimizerParam {
                    optimizer,
                    detail: format!("field {i} in '{param}': {e}"),
                }),
                None => default.ok_or_else(|| MlError::BadOptimizerParam {
                    optimizer,
                    detail: format!("missing field {i} in '{param}'"),
                }),
            }
        };

        match name {
            "gd" => Ok(OptimizerSpec::GradientDescent {
                lr: field(0, "gd", None)?,
            }),
            "momentum" => Ok(OptimizerSpec::GradientDescentWithMomentum {
                lr: field(0, "momentum", None)?,
                mu: field(1, "momentum", Some(0.9))?,
            }),
            "adam" => Ok(OptimizerSpec::Adam {
                lr: field(0, "adam", None)?,
                b1: field(1, "adam", Some(0.9))?,
                b2: field(2, "adam", Some(0.999))?,
                eps: field(3, "adam", Some(1e-8))?,
            }),
            other => Err(MlError::UnknownOptimizer(other.to_string())),
        }
    }

    /// Whether deltas folded at the master should be averaged over the
    /// workers in synchronous modes.
    pub fn need_averaged_delta(&self) -> bool {
        matches!(
            self,
            OptimizerSpec::GradientDescent { .. }
                | OptimizerSpec::GradientDescentWithMomentum { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_gd() {
        let spec = OptimizerSpec::parse("gd", "0.1").unwrap();
        assert_eq!(spec, OptimizerSpec::GradientDescent { lr: 0.1 });
        assert!(spec.need_averaged_delta());
    }

    #[test]
    fn test_parse_adam_defaults() {
        let spec = OptimizerSpec::parse("adam", "0.001").unwrap();
        assert_eq!(
            spec,
            OptimizerSpec::Adam {
                lr: 0.001,
                b1: 0.9,
                b2: 0.999,
                eps: 1e-8
            }
        );
        assert!(!spec.need_averaged_delta());
    }

    #[test]
    fn test_rejects_unknown_and_empty() {
        assert!(OptimizerSpec::parse("sgdx", "0.1").is_err());
        assert!(OptimizerSpec::parse("gd", "").is_err());
        assert!(OptimizerSpec::parse("gd", "fast").is_err());
    }
}
