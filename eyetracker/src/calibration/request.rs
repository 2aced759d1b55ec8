use std::path::PathBuf;

use hardware::CalibrationStyle;
use serde::{Deserialize, Serialize};
use shared::calibration::SUPPORTED_POINT_COUNTS;
use shared::{CalibrationPoint, EyeMode, PointLayout, Rgb};

use crate::error::{TrackerError, TrackerResult};

/// Settings for one calibration run. Read-only once the run starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationRequest {
    pub point_count: usize,
    pub layout: PointLayout,
    pub eye: EyeMode,
    /// Present points in a shuffled order
    pub randomize: bool,
    /// Seed for the shuffle; a fresh seed is drawn when unset
    pub shuffle_seed: Option<u64>,
    pub slow_mode: bool,
    pub audio_feedback: bool,
    /// Offer an improvement pass instead of failing when too few points pass
    pub allow_improvement: bool,
    /// Move low-quality points to the end instead of repeating them in place
    pub skip_bad_points: bool,
    /// Advance on a settled fixation instead of a fixed dwell
    pub auto_calibration: bool,
    pub background: Rgb,
    pub point_color: Rgb,
    pub background_image: Option<PathBuf>,
}

impl Default for CalibrationRequest {
    fn default() -> Self {
        Self {
            point_count: 9,
            layout: PointLayout::Full,
            eye: EyeMode::Both,
            randomize: false,
            shuffle_seed: None,
            slow_mode: false,
            audio_feedback: false,
            allow_improvement: false,
            skip_bad_points: false,
            auto_calibration: false,
            background: Rgb::new(0xC0, 0xC0, 0xC0),
            point_color: Rgb::new(0xFF, 0x00, 0x00),
            background_image: None,
        }
    }
}

impl CalibrationRequest {
    pub fn new(point_count: usize, layout: PointLayout, eye: EyeMode) -> Self {
        Self {
            point_count,
            layout,
            eye,
            ..Self::default()
        }
    }

    /// Check the request and return the points it describes, in layout order.
    ///
    /// # Errors
    /// `InvalidParameters` for an unsupported point count or an empty image path.
    pub fn validate(&self) -> TrackerResult<Vec<CalibrationPoint>> {
        if let Some(path) = &self.background_image {
            if path.as_os_str().is_empty() {
                return Err(TrackerError::InvalidParameters(
                    "background image path is empty".to_string(),
                ));
            }
        }

        self.layout.points(self.point_count).ok_or_else(|| {
            TrackerError::InvalidParameters(format!(
                "point count {} not one of {:?}",
                self.point_count, SUPPORTED_POINT_COUNTS
            ))
        })
    }

    /// Visual settings handed to the presentation surface.
    pub fn style(&self) -> CalibrationStyle {
        CalibrationStyle {
            background: self.background,
            point: self.point_color,
            background_image: self.background_image.clone(),
            slow_mode: self.slow_mode,
            audio_feedback: self.audio_feedback,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_counts_validate() {
        for &count in &SUPPORTED_POINT_COUNTS {
            let request = CalibrationRequest::new(count, PointLayout::Center, EyeMode::Both);
            assert_eq!(request.validate().unwrap().len(), count);
        }
    }

    #[test]
    fn test_unsupported_count_rejected() {
        for count in [0, 3, 4, 10, 17, 100] {
            let request = CalibrationRequest::new(count, PointLayout::Full, EyeMode::Both);
            assert!(matches!(
                request.validate(),
                Err(TrackerError::InvalidParameters(_))
            ));
        }
    }

    #[test]
    fn test_empty_image_path_rejected() {
        let request = CalibrationRequest {
            background_image: Some(PathBuf::new()),
            ..CalibrationRequest::default()
        };
        assert!(matches!(
            request.validate(),
            Err(TrackerError::InvalidParameters(_))
        ));
    }

    #[test]
    fn test_style_carries_visuals() {
        let request = CalibrationRequest {
            slow_mode: true,
            background_image: Some(PathBuf::from("bg.png")),
            ..CalibrationRequest::default()
        };
        let style = request.style();
        assert!(style.slow_mode);
        assert_eq!(style.point, Rgb::from_colorref(0x0000FF));
        assert_eq!(style.background_image, Some(PathBuf::from("bg.png")));
    }
}
