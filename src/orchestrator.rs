//! Single forward pass over the companion log.
//!
//! Descriptors are consumed in log order. Each segment id maps to one
//! container; when the id changes the previous container is dropped, the next
//! one is opened and its marker located. The read cursor only moves forward:
//! a clip whose window starts behind it is still cut, from wherever the cursor
//! is, and flagged as misaligned.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::clip::{probe_onset, ClipProcessor};
use crate::config::ClipSettings;
use crate::container::{Container, ContainerParams, FrameSource};
use crate::descriptor::ClipDescriptor;
use crate::error::{ClipError, Result};
use crate::layout::SampleLayout;
use crate::marker::MarkerDetector;
use crate::planner::{segment_path, ClipWindow, CursorMove, SegmentPlanner, TimelineOrigin};
use crate::report::{clip_relative_path, format_timestamp, CompletionRecord};

/// What to do with each clip window
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMode {
    /// Write processed clips under `wav_dir`
    Extract { wav_dir: PathBuf },
    /// Score onset alignment only; nothing is written
    Verify,
}

/// Where a forward seek left the cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SeekOutcome {
    Reached,
    /// Container ended before the window start
    Short,
    /// Window starts behind the cursor; nothing was skipped
    Behind,
}

/// Per-segment state, replaced whenever the segment id changes
#[derive(Debug)]
pub struct SegmentState {
    pub segment: u32,
    pub path: PathBuf,
    container: Container,
    pub params: ContainerParams,
    pub layout: SampleLayout,
    pub planner: SegmentPlanner,
    pub origin: TimelineOrigin,
    /// Index of the next unread frame
    pub cursor: u64,
}

impl SegmentState {
    /// Open a segment's container and locate its marker.
    pub fn open(path: PathBuf, segment: u32, settings: &ClipSettings, lead_time: f64) -> Result<Self> {
        let mut container = Container::open(&path)?;
        let params = container.params();
        let layout = params.layout()?;
        info!(
            "Opened {} ({}, {} ch, {} bytes/sample, {} Hz, {} frames)",
            path.display(),
            container.kind(),
            params.channels,
            params.bytes_per_sample,
            params.sample_rate,
            params.frame_count
        );

        let detector = MarkerDetector::for_rate(settings.threshold, params.sample_rate, settings.marker_search_secs);
        let marker = detector.find(&mut container, layout)?;
        info!(
            "Found marker at {} in segment {}, initial zero frame {}",
            format_timestamp(marker.trigger_frame as i64, params.sample_rate),
            segment,
            marker.marker_frame
        );

        Ok(SegmentState {
            segment,
            path,
            container,
            params,
            layout,
            planner: SegmentPlanner::new(params.sample_rate, lead_time),
            origin: TimelineOrigin::new(marker.marker_frame),
            cursor: marker.frames_consumed,
        })
    }

    /// Bring the cursor to `start_frame` if it lies ahead.
    fn seek_forward(&mut self, name: &str, start_frame: i64) -> Result<SeekOutcome> {
        match CursorMove::between(self.cursor, start_frame) {
            CursorMove::Skip(frames) => {
                let skipped = self.container.skip_frames(frames)?;
                self.cursor += skipped;
                if skipped < frames {
                    warn!(
                        "{}: container ended {} frames before the window start",
                        name,
                        frames - skipped
                    );
                    return Ok(SeekOutcome::Short);
                }
                Ok(SeekOutcome::Reached)
            }
            CursorMove::Stay => Ok(SeekOutcome::Reached),
            CursorMove::Behind(frames) => {
                warn!(
                    "Warning: can't back up for {} (window starts {} frames behind the read position)",
                    name, frames
                );
                Ok(SeekOutcome::Behind)
            }
        }
    }
}

/// Totals of a finished run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub records: Vec<CompletionRecord>,
    pub segments: usize,
    pub markers_applied: usize,
    pub markers_ignored: usize,
    pub warnings: usize,
}

#[derive(Debug)]
pub struct Orchestrator {
    base: PathBuf,
    settings: ClipSettings,
    mode: RunMode,
}

impl Orchestrator {
    /// `base` names the take: segment containers are `<base>.wav`, `<base>1.wav`, ...
    pub fn new(base: &Path, settings: ClipSettings, mode: RunMode) -> Self {
        Orchestrator {
            base: base.to_path_buf(),
            settings,
            mode,
        }
    }

    fn lead_time(&self) -> f64 {
        match self.mode {
            RunMode::Extract { .. } => self.settings.lead_time,
            RunMode::Verify => self.settings.verify_lead_time,
        }
    }

    /// Process every descriptor in order.
    pub fn run<I>(&self, descriptors: I) -> Result<RunSummary>
    where
        I: IntoIterator<Item = ClipDescriptor>,
    {
        let mut summary = RunSummary::default();
        let mut current: Option<SegmentState> = None;

        for descriptor in descriptors {
            let switch = current.as_ref().map_or(true, |s| s.segment != descriptor.segment);
            if switch {
                // close the previous container before opening the next
                if let Some(previous) = current.take() {
                    debug!("Closing {}", previous.path.display());
                }
                let path = segment_path(&self.base, descriptor.segment);
                current = Some(SegmentState::open(path, descriptor.segment, &self.settings, self.lead_time())?);
                summary.segments += 1;
            }
            let Some(state) = current.as_mut() else {
                continue;
            };

            if descriptor.is_marker() {
                if state.origin.apply_marker(descriptor.start_time, state.params.sample_rate) {
                    info!("Skipping marker, adjusting zero frame = {}", state.origin.zero_frame());
                    summary.markers_applied += 1;
                } else {
                    warn!("Skipping extra marker in segment {}, zero frame unchanged", state.segment);
                    summary.markers_ignored += 1;
                    summary.warnings += 1;
                }
                continue;
            }

            let record = self.process_clip(state, &descriptor)?;
            summary.warnings += record.misaligned as usize + record.truncated as usize;
            summary.records.push(record);
        }

        if let Some(state) = current.take() {
            debug!("Closing {}", state.path.display());
        }
        Ok(summary)
    }

    fn process_clip(&self, state: &mut SegmentState, descriptor: &ClipDescriptor) -> Result<CompletionRecord> {
        let window = state.planner.window(descriptor, &state.origin);
        let rate = state.params.sample_rate;

        if let RunMode::Extract { .. } = self.mode {
            if window.frames() <= 0 {
                return Err(ClipError::InvalidWindow {
                    name: descriptor.name.clone(),
                    start: window.start_frame,
                    end: window.end_frame,
                });
            }
        }

        let mut record = CompletionRecord {
            name: descriptor.name.clone(),
            segment: descriptor.segment,
            start_time: window.start_time,
            stop_time: window.stop_time,
            start_frame: window.start_frame,
            end_frame: window.end_frame,
            frames_written: None,
            output: None,
            onset_score: None,
            misaligned: false,
            truncated: false,
        };
        match state.seek_forward(&descriptor.name, window.start_frame)? {
            SeekOutcome::Reached => {}
            SeekOutcome::Short => record.truncated = true,
            SeekOutcome::Behind => record.misaligned = true,
        }

        match &self.mode {
            RunMode::Extract { wav_dir } => {
                let relative = clip_relative_path(&descriptor.name, self.settings.subdirs);
                let path = wav_dir.join(&relative);
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }

                let wanted = window.frames() as u64;
                info!(
                    "Writing {} frames to {} ({} -> {})",
                    wanted,
                    relative.display(),
                    format_timestamp(window.start_frame, rate),
                    format_timestamp(window.end_frame, rate)
                );
                let processor = ClipProcessor::new(
                    state.layout,
                    state.params.channels,
                    self.settings.agc,
                    self.settings.taper_frames(rate),
                );
                let clip = processor.extract(&mut state.container, wanted, state.params, &path)?;
                state.cursor += clip.frames;
                if clip.frames < wanted {
                    warn!("{}: container ended after {} of {} frames", descriptor.name, clip.frames, wanted);
                    record.truncated = true;
                }
                debug!("{}: gain {:.3}, tapered {}", descriptor.name, clip.gain, clip.tapered);

                record.frames_written = Some(clip.frames);
                record.output = Some(relative);
            }
            RunMode::Verify => {
                let sample_frames = (self.settings.verify_sample_time * rate as f64) as u64;
                let probe = probe_onset(&mut state.container, state.layout, sample_frames)?;
                state.cursor += probe.frames_read;
                log_onset(descriptor, &window, rate, probe.score, probe.missing());
                record.onset_score = Some(probe.score);
            }
        }

        info!(
            "Done {} segment {} ({:.3} -> {:.3} s, frames {} -> {})",
            record.name, record.segment, record.start_time, record.stop_time, record.start_frame, record.end_frame
        );
        Ok(record)
    }
}

fn log_onset(descriptor: &ClipDescriptor, window: &ClipWindow, rate: u32, score: f64, missing: bool) {
    let at = format_timestamp(window.start_frame, rate);
    let secs = window.start_frame as f64 / rate as f64;
    if missing {
        warn!(
            "****** Missing start at {}, {:.6} sec, {} samps (score {:.6}) ******",
            at, secs, descriptor.start_frame, score
        );
    } else {
        info!(
            "Found start at {}, {:.6} sec, {} samps (score {:.6})",
            at, secs, descriptor.start_frame, score
        );
    }
}
