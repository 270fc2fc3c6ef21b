use crate::{
    error::{MlError, Result},
    kernel::{self, Kernel},
    parameter::Parameter,
};

/// A kernel paired with the parameter vector the master owns.
pub struct Model {
    kernel: Box<dyn Kernel>,
    param: Parameter,
}

impl Model {
    /// Builds the model named by the configuration.
    ///
    /// The parameter starts as zeros of the kernel's width; the caller
    /// replaces it during initialization.
    ///
    /// # Errors
    /// Propagates kernel construction failures.
    pub fn new(algorithm: &str, alg_param: &str) -> Result<Self> {
        let kernel = kernel::from_conf(algorithm, alg_param)?;
        let param = Parameter::zeros(kernel.length_parameter());
        Ok(Self { kernel, param })
    }

    pub fn kernel(&self) -> &dyn Kernel {
        self.kernel.as_ref()
    }

    pub fn param_width(&self) -> usize {
        self.kernel.length_parameter()
    }

    /// Verifies the dataset shape agreed on by the workers.
    pub fn check_data(&self, nx: u64, ny: u64) -> Result<()> {
        if self.kernel.check_data(nx, ny) {
            Ok(())
        } else {
            Err(MlError::DataShapeMismatch {
                kernel: self.kernel.name(),
                nx,
                ny,
            })
        }
    }

    /// Replaces the parameter, enforcing the kernel's width.
    pub fn set_parameter(&mut self, param: Parameter) -> Result<()> {
        if param.width() != self.param_width() {
            return Err(MlError::ParameterWidthMismatch {
                got: param.width(),
                expected: self.param_width(),
            });
        }
        self.param = param;
        Ok(())
    }

    pub fn parameter(&self) -> &Parameter {
        &self.param
    }

    /// Adds `factor * delta` into the parameter, element by element in
    /// index order.
    pub fn accumulate_parameter(&mut self, delta: &[f64], factor: f64) {
        let weights = self.param.weights_mut();
        for (w, d) in weights.iter_mut().zip(delta) {
            *w += factor * d;
        }
    }

    /// Folds a peer-supplied parameter in with unit factor, used while
    /// coordinating a data-driven initial parameter.
    pub fn merge_parameter(&mut self, other: &[f64]) {
        self.accumulate_parameter(other, 1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulate_is_scaled_elementwise() {
        let mut m = Model::new("linear", "3").unwrap();
        m.accumulate_parameter(&[1.0, 2.0, 4.0], 0.5);
        m.accumulate_parameter(&[1.0, 0.0, 0.0], 0.5);
        assert_eq!(m.parameter().weights(), &[1.0, 1.0, 2.0]);
    }

    #[test]
    fn test_set_parameter_checks_width() {
        let mut m = Model::new("linear", "3").unwrap();
        assert!(m.set_parameter(Parameter::zeros(2)).is_err());
        assert!(m.set_parameter(Parameter::zeros(3)).is_ok());
    }

    #[test]
    fn test_check_data_names_kernel() {
        let m = Model::new("mlp", "4-2-1").unwrap();
        assert!(m.check_data(4, 1).is_ok());
        let err = m.check_data(3, 1).unwrap_err();
        assert!(err.to_string().contains("mlp"));
    }
}
