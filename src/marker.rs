//! Synchronization marker detection.
//!
//! The marker is a short loud tone recorded near the start of a take. It is
//! found by a majority vote over the peaks of the most recent frames: once 3 of
//! the last 5 frame peaks exceed the threshold the tone has started.

use tracing::debug;

use crate::container::FrameSource;
use crate::error::{ClipError, Result};
use crate::layout::{peak_amplitude, SampleLayout};

pub const RING_DEPTH: usize = 5;
pub const VOTES_NEEDED: usize = 3;
pub const DEFAULT_THRESHOLD: u32 = 150;
pub const DEFAULT_SEARCH_SECS: f64 = 15.0 * 60.0;

/// Where the marker was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkerPosition {
    /// Frame at which the vote succeeded
    pub trigger_frame: u64,
    /// Approximate tone onset, `trigger_frame - (RING_DEPTH - 1)`
    pub marker_frame: i64,
    /// Frames consumed from the source, i.e. the index of the next unread frame
    pub frames_consumed: u64,
}

/// Ring of the most recent frame peaks
#[derive(Debug, Clone, Default)]
pub struct PeakVote {
    recents: [u32; RING_DEPTH],
    next: usize,
}

impl PeakVote {
    /// Record one frame peak and report whether the vote now passes.
    pub fn feed(&mut self, peak: u32, threshold: u32) -> bool {
        self.recents[self.next] = peak;
        self.next = (self.next + 1) % RING_DEPTH;
        self.recents.iter().filter(|&&p| p > threshold).count() >= VOTES_NEEDED
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MarkerDetector {
    threshold: u32,
    max_search_frames: u64,
}

impl MarkerDetector {
    pub fn new(threshold: u32, max_search_frames: u64) -> Self {
        Self {
            threshold,
            max_search_frames,
        }
    }

    /// Detector capped at `search_secs` of audio at `sample_rate`.
    pub fn for_rate(threshold: u32, sample_rate: u32, search_secs: f64) -> Self {
        Self::new(threshold, (sample_rate as f64 * search_secs) as u64)
    }

    /// Scan the source one frame at a time until the marker vote passes.
    ///
    /// Fails if the cap, or the end of the stream, is reached first; a take
    /// without a detectable marker cannot be synchronized.
    pub fn find<S: FrameSource + ?Sized>(&self, source: &mut S, layout: SampleLayout) -> Result<MarkerPosition> {
        let mut vote = PeakVote::default();
        let mut frame_index = 0u64;

        while frame_index < self.max_search_frames {
            let frame = source.read_frames(1)?;
            if frame.is_empty() {
                break;
            }
            let peak = peak_amplitude(&layout.decode(&frame));

            if vote.feed(peak, self.threshold) {
                let position = MarkerPosition {
                    trigger_frame: frame_index,
                    marker_frame: frame_index as i64 - (RING_DEPTH as i64 - 1),
                    frames_consumed: frame_index + 1,
                };
                debug!(
                    "Marker vote passed at frame {} (onset {})",
                    position.trigger_frame, position.marker_frame
                );
                return Ok(position);
            }
            frame_index += 1;
        }

        Err(ClipError::MarkerNotFound { searched: frame_index })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{ContainerParams, PcmCursor};
    use std::io::Cursor;

    /// In-memory stereo 16-bit source
    struct Frames {
        cursor: PcmCursor<Cursor<Vec<u8>>>,
        frame_count: u64,
    }

    impl Frames {
        fn new(peaks: &[i16]) -> Self {
            let samples: Vec<i32> = peaks.iter().flat_map(|&p| [p as i32 / 2, p as i32]).collect();
            let bytes = SampleLayout::Pcm16.encode(&samples);
            Frames {
                cursor: PcmCursor::new(Cursor::new(bytes), 4, peaks.len() as u64),
                frame_count: peaks.len() as u64,
            }
        }
    }

    impl FrameSource for Frames {
        fn params(&self) -> ContainerParams {
            ContainerParams {
                channels: 2,
                bytes_per_sample: 2,
                sample_rate: 44100,
                frame_count: self.frame_count,
            }
        }

        fn frames_remaining(&self) -> u64 {
            self.cursor.frames_remaining()
        }

        fn read_frames(&mut self, frames: u64) -> Result<Vec<u8>> {
            self.cursor.read_frames(frames)
        }
    }

    #[test]
    fn test_peak_vote_needs_three_of_five() {
        let mut vote = PeakVote::default();
        assert!(!vote.feed(500, 150));
        assert!(!vote.feed(0, 150));
        assert!(!vote.feed(500, 150));
        assert!(!vote.feed(150, 150)); // equal is not above
        assert!(vote.feed(500, 150));
    }

    #[test]
    fn test_peak_vote_forgets_old_frames() {
        let mut vote = PeakVote::default();
        vote.feed(500, 150);
        vote.feed(500, 150);
        for _ in 0..4 {
            assert!(!vote.feed(0, 150));
        }
        assert!(!vote.feed(500, 150));
    }

    #[test]
    fn test_marker_backs_off_from_trigger() {
        let mut peaks = vec![10i16; 1000];
        peaks.extend_from_slice(&[500, 500, 500]);
        peaks.extend(vec![10i16; 100]);
        let mut source = Frames::new(&peaks);

        let position = MarkerDetector::new(150, 10_000)
            .find(&mut source, SampleLayout::Pcm16)
            .unwrap();
        assert_eq!(position.trigger_frame, 1002);
        assert_eq!(position.marker_frame, 998);
        assert_eq!(position.frames_consumed, 1003);
        assert_eq!(source.frames_remaining(), 100);
    }

    #[test]
    fn test_negative_samples_count() {
        let mut source = Frames::new(&[0, -400, -400, -400, 0]);
        let position = MarkerDetector::new(150, 100)
            .find(&mut source, SampleLayout::Pcm16)
            .unwrap();
        assert_eq!(position.trigger_frame, 3);
        assert_eq!(position.marker_frame, -1);
    }

    #[test]
    fn test_search_cap() {
        let mut peaks = vec![0i16; 50];
        peaks.extend_from_slice(&[500, 500, 500]);
        let mut source = Frames::new(&peaks);
        match MarkerDetector::new(150, 40).find(&mut source, SampleLayout::Pcm16) {
            Err(ClipError::MarkerNotFound { searched }) => assert_eq!(searched, 40),
            other => panic!("expected MarkerNotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_end_of_stream_before_marker() {
        let mut source = Frames::new(&[0i16; 20]);
        assert!(matches!(
            MarkerDetector::new(150, 1000).find(&mut source, SampleLayout::Pcm16),
            Err(ClipError::MarkerNotFound { searched: 20 })
        ));
    }

    #[test]
    fn test_for_rate_cap() {
        let detector = MarkerDetector::for_rate(DEFAULT_THRESHOLD, 44100, DEFAULT_SEARCH_SECS);
        assert_eq!(detector.max_search_frames, 44100 * 900);
    }
}
