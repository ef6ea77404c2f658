//! Mapping log coordinates onto container frames.
//!
//! Each segment gets a [`TimelineOrigin`]: the container frame that corresponds
//! to time zero of the log clock. It starts at the detected marker onset and
//! may be corrected once by the segment's first marker record.

use std::path::{Path, PathBuf};

use crate::descriptor::ClipDescriptor;

/// Default pre-roll included before every clip, in seconds
pub const DEFAULT_LEAD_TIME: f64 = 0.25;

/// Per-segment time origin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimelineOrigin {
    zero_frame: i64,
    marker_adjusted: bool,
}

impl TimelineOrigin {
    /// Origin at the detected marker frame, before any marker record correction
    pub fn new(marker_frame: i64) -> Self {
        Self {
            zero_frame: marker_frame,
            marker_adjusted: false,
        }
    }

    pub fn zero_frame(&self) -> i64 {
        self.zero_frame
    }

    pub fn marker_adjusted(&self) -> bool {
        self.marker_adjusted
    }

    /// Apply a marker record. Only the first one per segment counts.
    ///
    /// # Returns
    /// `true` if the origin moved, `false` if the record was ignored
    pub fn apply_marker(&mut self, marker_time: f64, sample_rate: u32) -> bool {
        if self.marker_adjusted {
            return false;
        }
        self.zero_frame -= (marker_time * sample_rate as f64).round() as i64;
        self.marker_adjusted = true;
        true
    }
}

/// A clip's resolved window in container coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipWindow {
    pub start_time: f64,
    pub stop_time: f64,
    pub start_frame: i64,
    pub end_frame: i64,
}

impl ClipWindow {
    pub fn frames(&self) -> i64 {
        self.end_frame - self.start_frame
    }
}

/// How to bring the read cursor to a window start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorMove {
    /// Discard this many frames first
    Skip(u64),
    /// Already there
    Stay,
    /// The window starts this many frames behind the cursor; the stream cannot rewind
    Behind(u64),
}

impl CursorMove {
    pub fn between(cursor: u64, start_frame: i64) -> Self {
        let skip = start_frame - cursor as i64;
        match skip {
            s if s > 0 => CursorMove::Skip(s as u64),
            0 => CursorMove::Stay,
            s => CursorMove::Behind(s.unsigned_abs()),
        }
    }
}

/// Converts clip descriptors into container windows for one sample rate
#[derive(Debug, Clone, Copy)]
pub struct SegmentPlanner {
    sample_rate: u32,
    lead_time: f64,
    lead_frames: i64,
}

impl SegmentPlanner {
    pub fn new(sample_rate: u32, lead_time: f64) -> Self {
        Self {
            sample_rate,
            lead_time,
            lead_frames: (lead_time * sample_rate as f64) as i64,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn lead_frames(&self) -> i64 {
        self.lead_frames
    }

    /// Window for a clip descriptor: pull both edges back by the lead time and
    /// shift the declared frames by the segment's zero frame.
    pub fn window(&self, descriptor: &ClipDescriptor, origin: &TimelineOrigin) -> ClipWindow {
        let offset = self.lead_frames + origin.zero_frame();
        ClipWindow {
            start_time: descriptor.start_time - self.lead_time,
            stop_time: descriptor.stop_time - self.lead_time,
            start_frame: descriptor.start_frame - offset,
            end_frame: descriptor.end_frame - offset,
        }
    }
}

/// Container file for a segment: `<base>.wav` for segment 0, `<base><id>.wav` otherwise.
pub fn segment_path(base: &Path, segment: u32) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    if segment != 0 {
        name.push(segment.to_string());
    }
    name.push(".wav");
    PathBuf::from(name)
}
