//! Calibration vocabulary shared by the engine and the device collaborators.
//!
//! Point positions are normalized screen coordinates: (0, 0) is the top-left
//! corner and (1, 1) the bottom-right. The presentation surface scales them to
//! its own resolution.

use serde::{Deserialize, Serialize};

/// Point counts the calibration layouts are defined for.
pub const SUPPORTED_POINT_COUNTS: [usize; 6] = [1, 2, 5, 9, 13, 16];

/// Where calibration points are placed on the screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PointLayout {
    /// Outer points 5% off the monitor border
    Full = 0,
    /// Outer points 20% off the monitor border
    Center = 1,
    /// Points located in the lower half of the monitor
    Bottom = 2,
}

impl PointLayout {
    /// Map the device API's numeric location parameter.
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(PointLayout::Full),
            1 => Some(PointLayout::Center),
            2 => Some(PointLayout::Bottom),
            _ => None,
        }
    }

    /// Normalized bounding box (x_min, x_max, y_min, y_max) of the layout.
    fn extent(self) -> (f64, f64, f64, f64) {
        match self {
            PointLayout::Full => (0.05, 0.95, 0.05, 0.95),
            PointLayout::Center => (0.20, 0.80, 0.20, 0.80),
            PointLayout::Bottom => (0.05, 0.95, 0.50, 0.95),
        }
    }

    /// Generate the calibration points for `count` points in presentation order.
    ///
    /// Returns `None` if `count` is not one of [`SUPPORTED_POINT_COUNTS`].
    pub fn points(self, count: usize) -> Option<Vec<CalibrationPoint>> {
        let (x0, x1, y0, y1) = self.extent();
        let cx = (x0 + x1) / 2.0;
        let cy = (y0 + y1) / 2.0;

        let coords: Vec<(f64, f64)> = match count {
            1 => vec![(cx, cy)],
            2 => vec![(x0, cy), (x1, cy)],
            5 => vec![(cx, cy), (x0, y0), (x1, y0), (x0, y1), (x1, y1)],
            9 => grid(3, x0, x1, y0, y1),
            13 => {
                let mut coords = grid(3, x0, x1, y0, y1);
                let qx = [(x0 + cx) / 2.0, (cx + x1) / 2.0];
                let qy = [(y0 + cy) / 2.0, (cy + y1) / 2.0];
                for &y in &qy {
                    for &x in &qx {
                        coords.push((x, y));
                    }
                }
                coords
            }
            16 => grid(4, x0, x1, y0, y1),
            _ => return None,
        };

        Some(
            coords
                .into_iter()
                .enumerate()
                .map(|(index, (x, y))| CalibrationPoint { index, x, y })
                .collect(),
        )
    }
}

/// Row-major NxN grid spanning the given extent.
fn grid(n: usize, x0: f64, x1: f64, y0: f64, y1: f64) -> Vec<(f64, f64)> {
    let step_x = (x1 - x0) / (n - 1) as f64;
    let step_y = (y1 - y0) / (n - 1) as f64;

    let mut coords = Vec::with_capacity(n * n);
    for row in 0..n {
        for col in 0..n {
            coords.push((x0 + col as f64 * step_x, y0 + row as f64 * step_y));
        }
    }
    coords
}

/// Which eyes are calibrated and which are tracked afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EyeMode {
    /// Calibrate and track both eyes
    Both = 0,
    /// Calibrate left, track both ("glass eye")
    CalibrateLeftTrackBoth = 1,
    /// Calibrate right, track both ("glass eye")
    CalibrateRightTrackBoth = 2,
    /// Calibrate and track left only ("pirate eye")
    CalibrateAndTrackLeft = 3,
    /// Calibrate and track right only ("pirate eye")
    CalibrateAndTrackRight = 4,
}

impl EyeMode {
    /// Map the device API's numeric eye parameter.
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(EyeMode::Both),
            1 => Some(EyeMode::CalibrateLeftTrackBoth),
            2 => Some(EyeMode::CalibrateRightTrackBoth),
            3 => Some(EyeMode::CalibrateAndTrackLeft),
            4 => Some(EyeMode::CalibrateAndTrackRight),
            _ => None,
        }
    }

    /// Returns (left, right) calibration flags.
    pub fn calibrated_eyes(self) -> (bool, bool) {
        match self {
            EyeMode::Both => (true, true),
            EyeMode::CalibrateLeftTrackBoth | EyeMode::CalibrateAndTrackLeft => (true, false),
            EyeMode::CalibrateRightTrackBoth | EyeMode::CalibrateAndTrackRight => (false, true),
        }
    }

    /// Returns (left, right) tracking flags.
    pub fn tracked_eyes(self) -> (bool, bool) {
        match self {
            EyeMode::CalibrateAndTrackLeft => (true, false),
            EyeMode::CalibrateAndTrackRight => (false, true),
            _ => (true, true),
        }
    }
}

/// 8-bit RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Decode a Windows COLORREF (0x00BBGGRR) as passed to the device API.
    pub fn from_colorref(value: u32) -> Self {
        Self {
            r: (value & 0xFF) as u8,
            g: ((value >> 8) & 0xFF) as u8,
            b: ((value >> 16) & 0xFF) as u8,
        }
    }

    pub fn to_colorref(self) -> u32 {
        self.r as u32 | (self.g as u32) << 8 | (self.b as u32) << 16
    }
}

/// A calibration target in normalized screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationPoint {
    /// Position of the point in the layout's canonical order
    pub index: usize,
    pub x: f64,
    pub y: f64,
}

impl CalibrationPoint {
    /// Scale to pixel coordinates on a screen of the given size.
    pub fn to_pixels(&self, width: u32, height: u32) -> (f64, f64) {
        (self.x * width as f64, self.y * height as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_supported_counts_produce_points() {
        for layout in [PointLayout::Full, PointLayout::Center, PointLayout::Bottom] {
            for &count in &SUPPORTED_POINT_COUNTS {
                let points = layout.points(count).unwrap();
                assert_eq!(points.len(), count);
                for (i, p) in points.iter().enumerate() {
                    assert_eq!(p.index, i);
                    assert!((0.0..=1.0).contains(&p.x));
                    assert!((0.0..=1.0).contains(&p.y));
                }
            }
        }
    }

    #[test]
    fn test_unsupported_counts_rejected() {
        assert!(PointLayout::Full.points(0).is_none());
        assert!(PointLayout::Full.points(3).is_none());
        assert!(PointLayout::Center.points(17).is_none());
    }

    #[test]
    fn test_nine_point_center_grid() {
        let points = PointLayout::Center.points(9).unwrap();
        let expected = [
            (0.2, 0.2),
            (0.5, 0.2),
            (0.8, 0.2),
            (0.2, 0.5),
            (0.5, 0.5),
            (0.8, 0.5),
            (0.2, 0.8),
            (0.5, 0.8),
            (0.8, 0.8),
        ];
        for (p, (ex, ey)) in points.iter().zip(expected.iter()) {
            assert_relative_eq!(p.x, *ex, epsilon = 1e-10);
            assert_relative_eq!(p.y, *ey, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_bottom_layout_stays_in_lower_half() {
        for p in PointLayout::Bottom.points(16).unwrap() {
            assert!(p.y >= 0.5);
        }
    }

    #[test]
    fn test_raw_enum_mapping() {
        assert_eq!(PointLayout::from_raw(1), Some(PointLayout::Center));
        assert_eq!(PointLayout::from_raw(3), None);
        assert_eq!(EyeMode::from_raw(4), Some(EyeMode::CalibrateAndTrackRight));
        assert_eq!(EyeMode::from_raw(5), None);
        assert_eq!(EyeMode::from_raw(-1), None);
        assert_eq!(EyeMode::CalibrateLeftTrackBoth.calibrated_eyes(), (true, false));
        assert_eq!(EyeMode::CalibrateLeftTrackBoth.tracked_eyes(), (true, true));
        assert_eq!(EyeMode::CalibrateAndTrackRight.tracked_eyes(), (false, true));
    }

    #[test]
    fn test_colorref_round_trip() {
        let grey = Rgb::from_colorref(0xC0C0C0);
        assert_eq!(grey, Rgb::new(0xC0, 0xC0, 0xC0));
        let red = Rgb::from_colorref(0x0000FF);
        assert_eq!(red, Rgb::new(0xFF, 0, 0));
        assert_eq!(red.to_colorref(), 0x0000FF);
    }

    #[test]
    fn test_to_pixels() {
        let p = CalibrationPoint {
            index: 0,
            x: 0.5,
            y: 0.25,
        };
        assert_eq!(p.to_pixels(1920, 1080), (960.0, 270.0));
    }
}
