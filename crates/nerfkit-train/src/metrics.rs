use serde::{Deserialize, Serialize};

use crate::error::TrainError;

/// Weight of the eikonal term in the total loss.
pub const EIKONAL_WEIGHT: f64 = 0.1;

/// Weight of the curvature term in the total loss.
pub const CURVATURE_WEIGHT: f64 = 0.1;

fn check_len(pred: &[[f32; 3]], target: &[[f32; 3]]) -> Result<(), TrainError> {
    if pred.len() != target.len() {
        return Err(TrainError::InvalidData(format!(
            "prediction has {} pixels but target has {}",
            pred.len(),
            target.len()
        )));
    }
    if pred.is_empty() {
        return Err(TrainError::InvalidData("empty prediction".to_string()));
    }
    Ok(())
}

/// Compute the mean squared error over all channels of two color buffers.
///
/// # Arguments
///
/// * `pred` - The predicted colors.
/// * `target` - The ground-truth colors, same length as `pred`.
///
/// # Returns
///
/// `mean((pred - target)^2)`.
pub fn mse(pred: &[[f32; 3]], target: &[[f32; 3]]) -> Result<f64, TrainError> {
    check_len(pred, target)?;

    let sum = pred
        .iter()
        .flatten()
        .zip(target.iter().flatten())
        .map(|(a, b)| (*a as f64 - *b as f64).powi(2))
        .sum::<f64>();

    Ok(sum / (pred.len() * 3) as f64)
}

/// Compute the mean absolute error over all channels of two color buffers.
pub fn l1(pred: &[[f32; 3]], target: &[[f32; 3]]) -> Result<f64, TrainError> {
    check_len(pred, target)?;

    let sum = pred
        .iter()
        .flatten()
        .zip(target.iter().flatten())
        .map(|(a, b)| (*a as f64 - *b as f64).abs())
        .sum::<f64>();

    Ok(sum / (pred.len() * 3) as f64)
}

/// Compute the peak signal-to-noise ratio in dB.
///
/// `psnr = 10 * log10(data_range^2 / mse)`, infinite for identical inputs.
///
/// Example:
///
/// ```
/// use nerfkit_train::psnr;
///
/// let pred = [[0.5f32, 0.5, 0.5]];
/// let target = [[0.6f32, 0.6, 0.6]];
/// let value = psnr(&pred, &target, 1.0).unwrap();
/// assert!((value - 20.0).abs() < 1e-4);
/// ```
pub fn psnr(pred: &[[f32; 3]], target: &[[f32; 3]], data_range: f64) -> Result<f64, TrainError> {
    Ok(psnr_from_mse(mse(pred, target)?, data_range))
}

/// Convert a mean squared error to PSNR in dB, infinite for a zero error.
pub fn psnr_from_mse(mse: f64, data_range: f64) -> f64 {
    if mse == 0.0 {
        return f64::INFINITY;
    }
    10.0 * (data_range * data_range / mse).log10()
}

/// Accumulates squared errors over many batches and reports the PSNR of the pooled error.
///
/// A single perfect batch does not make the pooled PSNR infinite.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PsnrMeter {
    sum_squared_error: f64,
    count: usize,
}

impl PsnrMeter {
    /// Create an empty meter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the squared errors of one batch.
    pub fn update(&mut self, pred: &[[f32; 3]], target: &[[f32; 3]]) -> Result<(), TrainError> {
        let batch_mse = mse(pred, target)?;
        let count = pred.len() * 3;
        self.sum_squared_error += batch_mse * count as f64;
        self.count += count;
        Ok(())
    }

    /// The mean squared error over every value seen, `None` before the first update.
    pub fn mse(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum_squared_error / self.count as f64)
    }

    /// The PSNR of the pooled error, `None` before the first update.
    pub fn measure(&self, data_range: f64) -> Option<f64> {
        self.mse().map(|mse| psnr_from_mse(mse, data_range))
    }

    /// Reset the meter.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// The photometric loss between rendered and ground-truth colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Criterion {
    /// Mean squared error.
    #[default]
    Mse,
    /// Mean absolute error.
    L1,
}

impl Criterion {
    /// Evaluate the criterion.
    pub fn evaluate(&self, pred: &[[f32; 3]], target: &[[f32; 3]]) -> Result<f64, TrainError> {
        match self {
            Criterion::Mse => mse(pred, target),
            Criterion::L1 => l1(pred, target),
        }
    }
}

/// The terms of a training loss.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LossBreakdown {
    /// The photometric criterion.
    pub criterion: f64,
    /// The eikonal regularizer.
    pub eikonal: f64,
    /// The curvature regularizer.
    pub curvature: f64,
    /// `criterion + 0.1 * eikonal + 0.1 * curvature`.
    pub total: f64,
}

impl LossBreakdown {
    /// Combine the loss terms.
    pub fn new(criterion: f64, eikonal: f64, curvature: f64) -> Self {
        Self {
            criterion,
            eikonal,
            curvature,
            total: criterion + EIKONAL_WEIGHT * eikonal + CURVATURE_WEIGHT * curvature,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_mse_l1() -> Result<(), TrainError> {
        let pred = [[0.0, 0.5, 1.0], [1.0, 1.0, 1.0]];
        let target = [[0.0, 0.0, 1.0], [1.0, 1.0, 0.0]];
        assert_relative_eq!(mse(&pred, &target)?, (0.25 + 1.0) / 6.0);
        assert_relative_eq!(l1(&pred, &target)?, 1.5 / 6.0);
        assert_relative_eq!(Criterion::Mse.evaluate(&pred, &target)?, (0.25 + 1.0) / 6.0);
        assert_relative_eq!(Criterion::L1.evaluate(&pred, &target)?, 1.5 / 6.0);
        Ok(())
    }

    #[test]
    fn test_psnr() -> Result<(), TrainError> {
        let pred = [[0.0; 3]; 4];
        assert_eq!(psnr(&pred, &pred, 1.0)?, f64::INFINITY);

        let target = [[0.1; 3]; 4];
        assert_relative_eq!(psnr(&pred, &target, 1.0)?, 20.0, epsilon = 1e-4);
        assert_relative_eq!(psnr(&pred, &target, 2.0)?, 20.0 + 20.0 * 2f64.log10(), epsilon = 1e-4);
        Ok(())
    }

    #[test]
    fn test_psnr_meter_pools_errors() -> Result<(), TrainError> {
        let mut meter = PsnrMeter::new();
        assert_eq!(meter.measure(1.0), None);

        let zeros = [[0.0f32; 3]; 4];
        meter.update(&zeros, &zeros)?;
        assert_eq!(meter.measure(1.0), Some(f64::INFINITY));

        meter.update(&zeros, &[[0.1; 3]; 4])?;
        let pooled = meter.measure(1.0).expect("updated");
        assert_relative_eq!(pooled, 10.0 * 200f64.log10(), epsilon = 1e-3);

        assert!(meter.update(&zeros, &[[0.0; 3]; 3]).is_err());
        meter.clear();
        assert_eq!(meter.mse(), None);
        Ok(())
    }

    #[test]
    fn test_length_mismatch() {
        let res = mse(&[[0.0; 3]], &[[0.0; 3], [0.0; 3]]);
        assert!(matches!(res, Err(TrainError::InvalidData(_))));
        assert!(l1(&[], &[]).is_err());
    }

    #[test]
    fn test_loss_breakdown() {
        let loss = LossBreakdown::new(0.5, 2.0, 1.0);
        assert_relative_eq!(loss.total, 0.8);
        assert_eq!(LossBreakdown::new(0.5, 0.0, 0.0).total, 0.5);
    }

    #[test]
    fn test_criterion_serde() -> Result<(), serde_json::Error> {
        assert_eq!(serde_json::to_string(&Criterion::L1)?, "\"l1\"");
        let c: Criterion = serde_json::from_str("\"mse\"")?;
        assert_eq!(c, Criterion::Mse);
        Ok(())
    }
}
