//! Decoded gaze telemetry.
//!
//! The tracker reports two kinds of data on the same stream: raw gaze samples
//! at the device sample rate, and events (fixations, saccades, blinks) whenever
//! the device's event detector closes one. Both are carried by [`Sample`], which
//! also records the sample's position in the stream.

use serde::{Deserialize, Serialize};

/// Gaze measurement for a single eye.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EyeSample {
    /// Gaze position X in screen pixels
    pub x: f64,
    /// Gaze position Y in screen pixels
    pub y: f64,
    /// Tracking confidence, 0.0 (lost) to 1.0
    pub confidence: f64,
    /// Pupil diameter as reported by the device
    pub pupil_diameter: f64,
}

/// Raw gaze sample at the device sample rate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    /// Device capture timestamp in milliseconds
    pub timestamp: i64,
    /// Combined binocular gaze estimate X
    pub gaze_x: f64,
    /// Combined binocular gaze estimate Y
    pub gaze_y: f64,
    pub left: EyeSample,
    pub right: EyeSample,
}

/// Kind of event reported by the device's event detector.
///
/// Discriminants match the device's numeric event ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Fixation = 0,
    Saccade = 1,
    Blink = 2,
    NoEvent = 3,
}

impl EventKind {
    /// Map a device event id. Unknown ids are treated as no event.
    pub fn from_id(id: i32) -> Self {
        match id {
            0 => EventKind::Fixation,
            1 => EventKind::Saccade,
            2 => EventKind::Blink,
            _ => EventKind::NoEvent,
        }
    }

    pub fn id(self) -> i32 {
        self as i32
    }

    pub fn describe(self) -> &'static str {
        match self {
            EventKind::Fixation => "Fixation detected",
            EventKind::Saccade => "Saccade detected",
            EventKind::Blink => "Blink detected",
            EventKind::NoEvent => "No Event detected",
        }
    }
}

/// Event closed by the device's event detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EventSample {
    pub kind: EventKind,
    /// Event timestamp in milliseconds
    pub timestamp: i64,
    /// Event duration in milliseconds
    pub duration: i64,
    /// Fixation / event position X
    pub x: f64,
    /// Fixation / event position Y
    pub y: f64,
    pub dispersion_x: f64,
    pub dispersion_y: f64,
    pub confidence: f64,
}

/// Payload of a [`Sample`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SampleData {
    Raw(RawSample),
    Event(EventSample),
}

/// One unit of decoded telemetry and its position in the stream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Stream position, strictly increasing in production order
    pub sequence: u64,
    pub data: SampleData,
}

impl Sample {
    pub fn raw(sequence: u64, raw: RawSample) -> Self {
        Self {
            sequence,
            data: SampleData::Raw(raw),
        }
    }

    pub fn event(sequence: u64, event: EventSample) -> Self {
        Self {
            sequence,
            data: SampleData::Event(event),
        }
    }

    /// Device timestamp of the payload in milliseconds.
    pub fn timestamp(&self) -> i64 {
        match &self.data {
            SampleData::Raw(raw) => raw.timestamp,
            SampleData::Event(event) => event.timestamp,
        }
    }

    pub fn as_raw(&self) -> Option<&RawSample> {
        match &self.data {
            SampleData::Raw(raw) => Some(raw),
            SampleData::Event(_) => None,
        }
    }

    pub fn as_event(&self) -> Option<&EventSample> {
        match &self.data {
            SampleData::Event(event) => Some(event),
            SampleData::Raw(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_at(timestamp: i64) -> RawSample {
        RawSample {
            timestamp,
            gaze_x: 640.0,
            gaze_y: 512.0,
            left: EyeSample::default(),
            right: EyeSample::default(),
        }
    }

    #[test]
    fn test_event_kind_ids() {
        for kind in [
            EventKind::Fixation,
            EventKind::Saccade,
            EventKind::Blink,
            EventKind::NoEvent,
        ] {
            assert_eq!(EventKind::from_id(kind.id()), kind);
        }
        assert_eq!(EventKind::from_id(42), EventKind::NoEvent);
        assert_eq!(EventKind::from_id(-1), EventKind::NoEvent);
        assert_eq!(EventKind::Blink.describe(), "Blink detected");
    }

    #[test]
    fn test_sample_accessors() {
        let s = Sample::raw(7, raw_at(1234));
        assert_eq!(s.timestamp(), 1234);
        assert!(s.as_raw().is_some());
        assert!(s.as_event().is_none());

        let e = Sample::event(
            8,
            EventSample {
                kind: EventKind::Fixation,
                timestamp: 1200,
                duration: 180,
                x: 607.0,
                y: 322.0,
                dispersion_x: 4.0,
                dispersion_y: 3.5,
                confidence: 0.9,
            },
        );
        assert_eq!(e.timestamp(), 1200);
        assert_eq!(e.as_event().map(|ev| ev.duration), Some(180));
        assert!(e.as_raw().is_none());
    }

    #[test]
    fn test_sample_serialization() {
        let s = Sample::raw(3, raw_at(99));
        let json = serde_json::to_string(&s).unwrap();
        let parsed: Sample = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, s);
    }
}
