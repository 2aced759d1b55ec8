//! Point and run quality grading.

use std::fmt;

use hardware::{AcceptanceSample, AcceptedPoint};
use serde::{Deserialize, Serialize};
use shared::CalibrationPoint;

/// Quality grade of a point or a whole run.
///
/// Discriminants are the numeric status reported by the flat API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(i32)]
pub enum CalibrationQuality {
    Excellent = 0,
    Good = 1,
    Average = 2,
    Poor = 3,
    Failed = 4,
}

impl CalibrationQuality {
    /// Grade a mean confidence. `None` means no usable samples.
    pub fn from_confidence(mean: Option<f64>) -> Self {
        match mean {
            Some(c) if c >= 0.9 => CalibrationQuality::Excellent,
            Some(c) if c >= 0.8 => CalibrationQuality::Good,
            Some(c) if c >= 0.6 => CalibrationQuality::Average,
            Some(c) if c > 0.0 => CalibrationQuality::Poor,
            _ => CalibrationQuality::Failed,
        }
    }

    pub fn code(self) -> i32 {
        self as i32
    }
}

impl fmt::Display for CalibrationQuality {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            CalibrationQuality::Excellent => "Excellent",
            CalibrationQuality::Good => "Good",
            CalibrationQuality::Average => "Average",
            CalibrationQuality::Poor => "Poor",
            CalibrationQuality::Failed => "Failed",
        };
        f.write_str(name)
    }
}

/// Averaged acceptance measurements for one presentation of a point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointMeasurement {
    /// Mean confidence over usable samples, `None` if there were none
    pub mean_confidence: Option<f64>,
    pub mean_offset_x: f64,
    pub mean_offset_y: f64,
    pub usable_samples: usize,
}

impl PointMeasurement {
    /// Average the finite samples, ignoring any the device marked with NaN.
    pub fn from_samples(samples: &[AcceptanceSample]) -> Self {
        let usable: Vec<&AcceptanceSample> = samples
            .iter()
            .filter(|s| s.confidence.is_finite() && s.offset_x.is_finite() && s.offset_y.is_finite())
            .collect();

        if usable.is_empty() {
            return Self {
                mean_confidence: None,
                mean_offset_x: 0.0,
                mean_offset_y: 0.0,
                usable_samples: 0,
            };
        }

        let n = usable.len() as f64;
        let (sum_c, sum_x, sum_y) = usable.iter().fold((0.0, 0.0, 0.0), |(c, x, y), s| {
            (c + s.confidence, x + s.offset_x, y + s.offset_y)
        });

        Self {
            mean_confidence: Some(sum_c / n),
            mean_offset_x: sum_x / n,
            mean_offset_y: sum_y / n,
            usable_samples: usable.len(),
        }
    }

    pub fn quality(&self) -> CalibrationQuality {
        CalibrationQuality::from_confidence(self.mean_confidence)
    }

    /// Whether the point passes at the given confidence threshold.
    pub fn is_acceptable(&self, min_confidence: f64) -> bool {
        self.mean_confidence.is_some_and(|c| c >= min_confidence)
    }
}

/// Outcome of one calibration point over all its presentations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointReport {
    pub point: CalibrationPoint,
    pub quality: CalibrationQuality,
    /// Mean confidence of the last presentation, 0.0 without usable samples
    pub mean_confidence: f64,
    pub mean_offset_x: f64,
    pub mean_offset_y: f64,
    /// Number of times the point was shown
    pub presentations: u32,
    pub accepted: bool,
}

impl PointReport {
    pub fn new(
        point: CalibrationPoint,
        measurement: &PointMeasurement,
        presentations: u32,
        accepted: bool,
    ) -> Self {
        Self {
            point,
            quality: measurement.quality(),
            mean_confidence: measurement.mean_confidence.unwrap_or(0.0),
            mean_offset_x: measurement.mean_offset_x,
            mean_offset_y: measurement.mean_offset_y,
            presentations,
            accepted,
        }
    }

    /// Device-facing form of an accepted point.
    pub fn to_accepted(&self) -> Option<AcceptedPoint> {
        self.accepted.then_some(AcceptedPoint {
            point: self.point,
            mean_offset_x: self.mean_offset_x,
            mean_offset_y: self.mean_offset_y,
            mean_confidence: self.mean_confidence,
        })
    }
}

/// Grade a set of point reports: the grade of the mean confidence of the
/// accepted points, `Failed` when none were accepted.
pub fn overall_quality(reports: &[PointReport]) -> CalibrationQuality {
    let accepted: Vec<f64> = reports
        .iter()
        .filter(|r| r.accepted)
        .map(|r| r.mean_confidence)
        .collect();
    if accepted.is_empty() {
        return CalibrationQuality::Failed;
    }
    let mean = accepted.iter().sum::<f64>() / accepted.len() as f64;
    CalibrationQuality::from_confidence(Some(mean))
}

/// Fraction of reports that were accepted, 0.0 for an empty set.
pub fn accepted_fraction(reports: &[PointReport]) -> f64 {
    if reports.is_empty() {
        return 0.0;
    }
    reports.iter().filter(|r| r.accepted).count() as f64 / reports.len() as f64
}
