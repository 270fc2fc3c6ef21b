use rand::{Rng, SeedableRng, rngs::StdRng};

/// A flat model parameter vector.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parameter {
    weights: Vec<f64>,
}

impl Parameter {
    /// Creates a parameter of `width` zeros.
    pub fn zeros(width: usize) -> Self {
        Self {
            weights: vec![0.0; width],
        }
    }

    /// Creates a parameter of `width` values drawn uniformly from
    /// `[-margin, margin]`, reproducible from `seed`.
    pub fn uniform(width: usize, margin: f64, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        Self {
            weights: (0..width).map(|_| rng.gen_range(-margin..=margin)).collect(),
        }
    }

    /// Wraps an existing weight vector.
    pub fn from_weights(weights: Vec<f64>) -> Self {
        Self { weights }
    }

    pub fn width(&self) -> usize {
        self.weights.len()
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn weights_mut(&mut self) -> &mut [f64] {
        &mut self.weights
    }

    pub fn into_weights(self) -> Vec<f64> {
        self.weights
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_is_seeded() {
        const WIDTH: usize = 32;

        let a = Parameter::uniform(WIDTH, 0.01, 7);
        let b = Parameter::uniform(WIDTH, 0.01, 7);
        let c = Parameter::uniform(WIDTH, 0.01, 8);

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.weights().iter().all(|w| w.abs() <= 0.01));
    }

    #[test]
    fn test_zeros_width() {
        let p = Parameter::zeros(5);
        assert_eq!(p.width(), 5);
        assert!(p.weights().iter().all(|&w| w == 0.0));
    }
}
