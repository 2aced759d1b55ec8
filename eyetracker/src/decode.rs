//! Decoding of device frames into stream samples.
//!
//! Every frame yields a raw sample. A frame also repeats the fields of the most
//! recent closed event, so an event sample is only emitted the first time a
//! given event shows up.

use hardware::RawFrame;
use shared::{EventKind, EventSample, EyeSample, RawSample, Sample};

/// Turns frames into numbered samples.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    next_sequence: u64,
    /// Timestamp of the last event emitted
    last_event: Option<i64>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one frame. Samples come out in timestamp order.
    pub fn decode(&mut self, frame: &RawFrame) -> Vec<Sample> {
        let mut out = Vec::with_capacity(2);

        let event = self.new_event(frame);
        let raw = raw_sample(frame);

        match event {
            Some(event) if event.timestamp <= raw.timestamp => {
                out.push(self.numbered(|seq| Sample::event(seq, event)));
                out.push(self.numbered(|seq| Sample::raw(seq, raw)));
            }
            Some(event) => {
                out.push(self.numbered(|seq| Sample::raw(seq, raw)));
                out.push(self.numbered(|seq| Sample::event(seq, event)));
            }
            None => out.push(self.numbered(|seq| Sample::raw(seq, raw))),
        }
        out
    }

    /// Start a new stream: numbering restarts at zero and the next frame's
    /// event is reported again.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn numbered(&mut self, make: impl FnOnce(u64) -> Sample) -> Sample {
        let sample = make(self.next_sequence);
        self.next_sequence += 1;
        sample
    }

    fn new_event(&mut self, frame: &RawFrame) -> Option<EventSample> {
        let kind = EventKind::from_id(frame.event_id);
        if kind == EventKind::NoEvent || self.last_event == Some(frame.event_timestamp) {
            return None;
        }
        self.last_event = Some(frame.event_timestamp);
        Some(EventSample {
            kind,
            timestamp: frame.event_timestamp,
            duration: frame.event_duration,
            x: frame.event_x,
            y: frame.event_y,
            dispersion_x: frame.dispersion_x,
            dispersion_y: frame.dispersion_y,
            confidence: frame.event_confidence,
        })
    }
}

fn raw_sample(frame: &RawFrame) -> RawSample {
    RawSample {
        timestamp: frame.raw_timestamp,
        gaze_x: frame.gaze_x,
        gaze_y: frame.gaze_y,
        left: EyeSample {
            x: frame.left_x,
            y: frame.left_y,
            confidence: frame.left_confidence,
            pupil_diameter: frame.left_pupil_diameter,
        },
        right: EyeSample {
            x: frame.right_x,
            y: frame.right_y,
            confidence: frame.right_confidence,
            pupil_diameter: frame.right_pupil_diameter,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(raw_ts: i64, event_id: i32, event_ts: i64) -> RawFrame {
        RawFrame {
            raw_timestamp: raw_ts,
            gaze_x: 640.0,
            gaze_y: 512.0,
            left_confidence: 0.9,
            right_pupil_diameter: 3.5,
            event_id,
            event_timestamp: event_ts,
            event_duration: 200,
            event_x: 630.0,
            ..RawFrame::default()
        }
    }

    #[test]
    fn test_raw_fields_copied() {
        let mut decoder = FrameDecoder::new();
        let samples = decoder.decode(&frame(10, 3, 0));
        assert_eq!(samples.len(), 1);
        let raw = samples[0].as_raw().unwrap();
        assert_eq!(raw.timestamp, 10);
        assert_eq!(raw.left.confidence, 0.9);
        assert_eq!(raw.right.pupil_diameter, 3.5);
    }

    #[test]
    fn test_event_emitted_once() {
        let mut decoder = FrameDecoder::new();
        let first = decoder.decode(&frame(10, 0, 8));
        let second = decoder.decode(&frame(14, 0, 8));
        let third = decoder.decode(&frame(18, 1, 16));

        assert_eq!(first.len(), 2);
        let event = first[0].as_event().unwrap();
        assert_eq!(event.kind, EventKind::Fixation);
        assert_eq!(event.duration, 200);
        assert_eq!(second.len(), 1);
        assert_eq!(third[0].as_event().unwrap().kind, EventKind::Saccade);
    }

    #[test]
    fn test_no_event_id_ignored() {
        let mut decoder = FrameDecoder::new();
        assert_eq!(decoder.decode(&frame(10, 3, 10)).len(), 1);
        // Unknown ids are treated as no event
        assert_eq!(decoder.decode(&frame(14, 42, 12)).len(), 1);
    }

    #[test]
    fn test_sequence_strictly_increases() {
        let mut decoder = FrameDecoder::new();
        let sequences: Vec<u64> = (0..5)
            .flat_map(|i| decoder.decode(&frame(i * 4, 0, i * 4)))
            .map(|s| s.sequence)
            .collect();
        assert_eq!(sequences, (0..10).collect::<Vec<u64>>());
    }

    #[test]
    fn test_samples_ordered_by_timestamp() {
        let mut decoder = FrameDecoder::new();
        let samples = decoder.decode(&frame(10, 2, 12));
        assert!(samples[0].as_raw().is_some());
        assert!(samples[1].as_event().is_some());
    }

    #[test]
    fn test_reset_starts_new_stream() {
        let mut decoder = FrameDecoder::new();
        decoder.decode(&frame(10, 0, 8));
        decoder.reset();
        let samples = decoder.decode(&frame(14, 0, 8));
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].sequence, 0);
    }
}
