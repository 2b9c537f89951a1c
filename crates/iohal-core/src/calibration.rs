//! Linear calibration of raw readings.
//!
//! A [`Calibrator`] is built from reference [`Measurement`]s and maps raw values to
//! physical units:
//!
//! | points | mapping |
//! |--------|---------|
//! | 0 | identity |
//! | 1 | offset, `x + (expected - observed)` |
//! | 2+ | least-squares line through `(observed, expected)` |
//!
//! Points are validated once at construction. `calibrate` is a pure function of the stored
//! points, so two calibrators built from the same points agree bit for bit.

use serde::{Deserialize, Serialize};

use crate::error::{HalError, Result};

/// One calibration point: a known reference value and the raw reading taken in its presence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Reference value in physical units.
    pub expected: f64,
    /// Raw reading.
    pub observed: f64,
}

impl Measurement {
    /// Create a calibration point.
    pub fn new(expected: f64, observed: f64) -> Self {
        Self { expected, observed }
    }
}

/// Immutable observed → expected mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct Calibrator {
    points: Vec<Measurement>,
    slope: f64,
    intercept: f64,
}

impl Calibrator {
    /// Identity calibrator.
    pub fn identity() -> Self {
        Self {
            points: Vec::new(),
            slope: 1.0,
            intercept: 0.0,
        }
    }

    /// Build a calibrator from reference points.
    ///
    /// Fails with [`HalError::Calibration`] if any value is not finite or two points share
    /// the same observed value.
    pub fn new(points: &[Measurement]) -> Result<Self> {
        for (i, p) in points.iter().enumerate() {
            if !p.expected.is_finite() || !p.observed.is_finite() {
                return Err(HalError::Calibration(format!(
                    "point {i} is not finite (expected {}, observed {})",
                    p.expected, p.observed
                )));
            }
            if points[..i].iter().any(|q| q.observed == p.observed) {
                return Err(HalError::Calibration(format!(
                    "duplicate observed value {}",
                    p.observed
                )));
            }
        }

        let (slope, intercept) = match points {
            [] => (1.0, 0.0),
            [only] => (1.0, only.expected - only.observed),
            _ => least_squares(points),
        };

        Ok(Self {
            points: points.to_vec(),
            slope,
            intercept,
        })
    }

    /// Map a raw reading to calibrated units.
    pub fn calibrate(&self, raw: f64) -> f64 {
        if self.points.is_empty() {
            return raw;
        }
        self.slope * raw + self.intercept
    }

    /// Points this calibrator was built from.
    pub fn points(&self) -> &[Measurement] {
        &self.points
    }

    /// Gain of the fitted line.
    pub fn slope(&self) -> f64 {
        self.slope
    }

    /// Offset of the fitted line.
    pub fn intercept(&self) -> f64 {
        self.intercept
    }
}

impl Default for Calibrator {
    fn default() -> Self {
        Self::identity()
    }
}

// Distinct observed values guarantee a non-zero denominator.
fn least_squares(points: &[Measurement]) -> (f64, f64) {
    let n = points.len() as f64;
    let mean_x = points.iter().map(|p| p.observed).sum::<f64>() / n;
    let mean_y = points.iter().map(|p| p.expected).sum::<f64>() / n;

    let mut sxy = 0.0;
    let mut sxx = 0.0;
    for p in points {
        let dx = p.observed - mean_x;
        sxy += dx * (p.expected - mean_y);
        sxx += dx * dx;
    }

    let slope = sxy / sxx;
    (slope, mean_y - slope * mean_x)
}
