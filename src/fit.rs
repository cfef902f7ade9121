//! Nonlinear least-squares fitting of the focus response curve.
//!
//! Wraps a Levenberg-Marquardt solver around a Gaussian response model,
//! optionally with a constant floor. The fitter owns its parameter vector:
//! `fit` mutates it only when the solver converges, so a failed fit leaves
//! the previous calibration usable.

use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt};
use nalgebra::storage::Owned;
use nalgebra::{DMatrix, DVector, Dyn};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Smallest ratio admitted into the inverse model's logarithm.
const MIN_INVERT_RATIO: f64 = 1e-6;
/// Width magnitude below which the model is considered degenerate.
const MIN_WIDTH: f64 = 1e-12;

/// Response model variant selected at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurveModel {
    /// `a * exp(-(x - m)^2 / (2 w^2))`: amplitude, mean, width.
    Gaussian,
    /// Gaussian plus a constant floor: amplitude, mean, width, offset.
    GaussianWithOffset,
}

impl CurveModel {
    pub fn param_count(self) -> usize {
        match self {
            CurveModel::Gaussian => 3,
            CurveModel::GaussianWithOffset => 4,
        }
    }

    fn default_params(self) -> Vec<f64> {
        match self {
            CurveModel::Gaussian => vec![1.0, 0.0, 1.0],
            CurveModel::GaussianWithOffset => vec![1.0, 0.0, 1.0, 0.0],
        }
    }
}

pub struct CurveFitter {
    model: CurveModel,
    params: Vec<f64>,
}

impl CurveFitter {
    pub fn new(model: CurveModel) -> Self {
        Self {
            params: model.default_params(),
            model,
        }
    }

    pub fn model(&self) -> CurveModel {
        self.model
    }

    pub fn params(&self) -> &[f64] {
        &self.params
    }

    /// Replace the parameter vector.
    ///
    /// A wrong-length vector is corrected to the model's length (truncated,
    /// or padded from the model defaults) and logged; callers must not rely
    /// on corrected values retaining semantic meaning.
    pub fn set_params(&mut self, params: &[f64]) {
        let expected = self.model.param_count();
        if params.len() != expected {
            warn!(
                "[fit] parameter vector length {} corrected to {expected}",
                params.len()
            );
        }
        let defaults = self.model.default_params();
        self.params = (0..expected)
            .map(|i| params.get(i).copied().unwrap_or(defaults[i]))
            .collect();
    }

    /// Fit the model to equal-length sample sequences, starting from the
    /// current parameter vector. Returns `true` and updates the parameters
    /// only when the solver reports convergence.
    pub fn fit(&mut self, xs: &[f64], ys: &[f64]) -> bool {
        if xs.len() != ys.len() {
            warn!(
                "[fit] sample length mismatch: {} positions vs {} scores",
                xs.len(),
                ys.len()
            );
            return false;
        }
        if xs.len() < self.model.param_count() {
            warn!("[fit] {} samples cannot constrain the model", xs.len());
            return false;
        }

        let problem = GaussianProblem {
            xs,
            ys,
            params: DVector::from_column_slice(&self.params),
            with_offset: self.model == CurveModel::GaussianWithOffset,
        };

        let (solved, report) = LevenbergMarquardt::new().minimize(problem);
        if !report.termination.was_successful() {
            warn!("[fit] solver did not converge: {:?}", report.termination);
            return false;
        }

        let fitted = solved.params;
        if fitted.iter().any(|v| !v.is_finite()) {
            warn!("[fit] solver produced non-finite parameters");
            return false;
        }

        self.params.copy_from_slice(fitted.as_slice());
        true
    }

    /// Apply the forward model at `x`.
    pub fn evaluate(&self, x: f64) -> f64 {
        evaluate_model(&self.params, self.model == CurveModel::GaussianWithOffset, x)
    }

    /// Functional inverse of the model, above-mean branch.
    ///
    /// `y` is clamped into the model's valid range (at most the amplitude
    /// plus offset, at least a small positive fraction of it) before
    /// the logarithm. The clamping is an intentional domain restriction, not
    /// an error: out-of-range scores map to the nearest representable axis
    /// position.
    pub fn invert(&self, y: f64) -> f64 {
        let amplitude = self.params[0];
        let mean = self.params[1];
        let width = self.params[2];
        let offset = if self.model == CurveModel::GaussianWithOffset {
            self.params[3]
        } else {
            0.0
        };

        if amplitude.abs() < f64::EPSILON || width.abs() < MIN_WIDTH {
            return mean;
        }

        let ratio = ((y - offset) / amplitude).clamp(MIN_INVERT_RATIO, 1.0);
        mean + width.abs() * (2.0 * (1.0 / ratio).ln()).sqrt()
    }
}

impl std::fmt::Debug for CurveFitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CurveFitter")
            .field("model", &self.model)
            .field("params", &self.params)
            .finish()
    }
}

fn evaluate_model(params: &[f64], with_offset: bool, x: f64) -> f64 {
    let amplitude = params[0];
    let mean = params[1];
    let width = params[2];
    let offset = if with_offset { params[3] } else { 0.0 };
    let z = (x - mean) / width;
    amplitude * (-0.5 * z * z).exp() + offset
}

struct GaussianProblem<'a> {
    xs: &'a [f64],
    ys: &'a [f64],
    params: DVector<f64>,
    with_offset: bool,
}

impl LeastSquaresProblem<f64, Dyn, Dyn> for GaussianProblem<'_> {
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, params: &DVector<f64>) {
        self.params.copy_from(params);
    }

    fn params(&self) -> DVector<f64> {
        self.params.clone()
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        let width = self.params[2];
        if !width.is_finite() || width.abs() < MIN_WIDTH {
            return None;
        }
        let values = self
            .xs
            .iter()
            .zip(self.ys)
            .map(|(&x, &y)| evaluate_model(self.params.as_slice(), self.with_offset, x) - y);
        Some(DVector::from_iterator(self.xs.len(), values))
    }

    fn jacobian(&self) -> Option<DMatrix<f64>> {
        let amplitude = self.params[0];
        let mean = self.params[1];
        let width = self.params[2];
        if !width.is_finite() || width.abs() < MIN_WIDTH {
            return None;
        }

        let cols = if self.with_offset { 4 } else { 3 };
        let mut jacobian = DMatrix::zeros(self.xs.len(), cols);
        for (row, &x) in self.xs.iter().enumerate() {
            let z = (x - mean) / width;
            let envelope = (-0.5 * z * z).exp();
            jacobian[(row, 0)] = envelope;
            jacobian[(row, 1)] = amplitude * envelope * z / width;
            jacobian[(row, 2)] = amplitude * envelope * z * z / width;
            if self.with_offset {
                jacobian[(row, 3)] = 1.0;
            }
        }
        Some(jacobian)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn samples(params: &[f64], with_offset: bool, count: usize) -> (Vec<f64>, Vec<f64>) {
        let xs: Vec<f64> = (0..count).map(|i| i as f64).collect();
        let ys = xs
            .iter()
            .map(|&x| evaluate_model(params, with_offset, x))
            .collect();
        (xs, ys)
    }

    #[test]
    fn recovers_known_parameters_from_exact_seed() {
        let truth = [50.0, 10.0, 2.0, 1.0];
        let (xs, ys) = samples(&truth, true, 21);

        let mut fitter = CurveFitter::new(CurveModel::GaussianWithOffset);
        fitter.set_params(&truth);
        assert!(fitter.fit(&xs, &ys));

        for (fitted, expected) in fitter.params().iter().zip(&truth) {
            assert!(
                (fitted - expected).abs() <= 0.01 * expected.abs(),
                "fitted {fitted} vs {expected}"
            );
        }
    }

    #[test]
    fn recovers_known_parameters_from_perturbed_seed() {
        let truth = [50.0, 10.0, 2.0, 1.0];
        let (xs, ys) = samples(&truth, true, 21);

        let mut fitter = CurveFitter::new(CurveModel::GaussianWithOffset);
        fitter.set_params(&[40.0, 9.0, 3.0, 0.5]);
        assert!(fitter.fit(&xs, &ys));

        for (fitted, expected) in fitter.params().iter().zip(&truth) {
            assert!(
                (fitted - expected).abs() <= 0.02 * expected.abs().max(1.0),
                "fitted {fitted} vs {expected}"
            );
        }
    }

    #[test]
    fn plain_gaussian_fit_converges() {
        let truth = [30.0, 5.0, 1.5];
        let (xs, ys) = samples(&truth, false, 11);

        let mut fitter = CurveFitter::new(CurveModel::Gaussian);
        fitter.set_params(&[25.0, 4.0, 2.0]);
        assert!(fitter.fit(&xs, &ys));
        assert_relative_eq!(fitter.params()[1], 5.0, max_relative = 0.01);
    }

    #[test]
    fn mismatched_sample_lengths_fail_without_mutation() {
        let mut fitter = CurveFitter::new(CurveModel::Gaussian);
        fitter.set_params(&[2.0, 3.0, 4.0]);
        assert!(!fitter.fit(&[1.0, 2.0], &[1.0]));
        assert_eq!(fitter.params(), &[2.0, 3.0, 4.0]);
    }

    #[test]
    fn set_params_corrects_wrong_lengths() {
        let mut fitter = CurveFitter::new(CurveModel::GaussianWithOffset);
        fitter.set_params(&[9.0, 8.0]);
        assert_eq!(fitter.params().len(), 4);
        assert_eq!(&fitter.params()[..2], &[9.0, 8.0]);

        fitter.set_params(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(fitter.params(), &[1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn evaluate_peaks_at_the_mean() {
        let mut fitter = CurveFitter::new(CurveModel::GaussianWithOffset);
        fitter.set_params(&[50.0, 10.0, 2.0, 1.0]);
        assert_relative_eq!(fitter.evaluate(10.0), 51.0);
        assert!(fitter.evaluate(14.0) < 51.0);
    }

    #[test]
    fn invert_is_the_above_mean_inverse_of_evaluate() {
        let mut fitter = CurveFitter::new(CurveModel::GaussianWithOffset);
        fitter.set_params(&[50.0, 10.0, 2.0, 1.0]);
        for x in [10.5, 12.0, 14.0] {
            let y = fitter.evaluate(x);
            assert_relative_eq!(fitter.invert(y), x, epsilon = 1e-9);
        }
    }

    #[test]
    fn invert_clamps_out_of_range_scores() {
        let mut fitter = CurveFitter::new(CurveModel::Gaussian);
        fitter.set_params(&[50.0, 10.0, 2.0]);
        // Above the amplitude: clamped to the peak position.
        assert_relative_eq!(fitter.invert(500.0), 10.0);
        // Far below the floor: clamped to a finite distance.
        assert!(fitter.invert(-3.0).is_finite());
    }
}
