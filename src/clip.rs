//! Clip processing: gain normalization, fade-out taper and onset verification.

use std::path::Path;

use crate::container::{ContainerParams, FrameSource};
use crate::error::Result;
use crate::layout::{peak_amplitude, SampleLayout};
use crate::wavfile::write_clip;

/// Normalized clips peak at this fraction of full scale
pub const TARGET_PEAK_FRACTION: f64 = 0.60;
pub const MIN_GAIN: f64 = 0.1;
pub const MAX_GAIN: f64 = 10.0;
const FULL_SCALE: f64 = 32768.0;

pub const DEFAULT_TAPER_TIME: f64 = 0.25;

/// Verification reads windows of this length
pub const DEFAULT_VERIFY_SAMPLE_TIME: f64 = 0.1;
/// Verification pre-roll, replaces the extraction lead time
pub const DEFAULT_VERIFY_LEAD_TIME: f64 = 0.2;
/// Scores below this mean the onset was probably missed
pub const MISSING_ONSET_SCORE: f64 = 0.05;

/// Gain that brings `peak` to the target level, clamped to [`MIN_GAIN`, `MAX_GAIN`].
/// Silence gets unity gain.
pub fn normalizing_gain(peak: u32) -> f64 {
    if peak == 0 {
        return 1.0;
    }
    (TARGET_PEAK_FRACTION * FULL_SCALE / peak as f64).clamp(MIN_GAIN, MAX_GAIN)
}

/// Scale every sample to the target peak.
///
/// # Returns
/// The gain that was applied
pub fn normalize(samples: &mut [i32]) -> f64 {
    let gain = normalizing_gain(peak_amplitude(samples));
    if gain != 1.0 {
        for s in samples.iter_mut() {
            *s = (*s as f64 * gain).round() as i32;
        }
    }
    gain
}

/// Fade out the trailing `taper_frames` frames with a `sqrt(1 - t)` envelope.
///
/// Every channel of a frame gets the same envelope value. Windows that are not
/// longer than the taper are left alone.
pub fn apply_taper(samples: &mut [i32], channels: usize, taper_frames: usize) {
    let channels = channels.max(1);
    let frames = samples.len() / channels;
    if taper_frames == 0 || frames <= taper_frames {
        return;
    }

    let front = (frames - taper_frames) * channels;
    for (i, frame) in samples[front..].chunks_exact_mut(channels).enumerate() {
        let t = i as f64 / taper_frames as f64;
        let gain = (1.0 - t).sqrt();
        for s in frame {
            *s = (*s as f64 * gain).round() as i32;
        }
    }
}

/// Extraction options
#[derive(Debug, Clone, Copy)]
pub struct ClipProcessor {
    layout: SampleLayout,
    channels: usize,
    agc: bool,
    taper_frames: usize,
}

/// Result of processing one window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessedClip {
    pub frames: u64,
    pub gain: f64,
    pub tapered: bool,
}

impl ClipProcessor {
    pub fn new(layout: SampleLayout, channels: u16, agc: bool, taper_frames: usize) -> Self {
        Self {
            layout,
            channels: channels as usize,
            agc,
            taper_frames,
        }
    }

    /// Apply gain and taper to a raw window, returning the re-encoded bytes.
    pub fn process(&self, raw: &[u8]) -> (Vec<u8>, ProcessedClip) {
        let mut samples = self.layout.decode(raw);
        let gain = if self.agc { normalize(&mut samples) } else { 1.0 };

        let frames = samples.len() / self.channels.max(1);
        let tapered = self.taper_frames > 0 && frames > self.taper_frames;
        apply_taper(&mut samples, self.channels, self.taper_frames);

        let info = ProcessedClip {
            frames: frames as u64,
            gain,
            tapered,
        };
        (self.layout.encode(&samples), info)
    }

    /// Read `frames` frames from the source, process them and write a WAV file.
    pub fn extract<S: FrameSource + ?Sized>(
        &self,
        source: &mut S,
        frames: u64,
        params: ContainerParams,
        path: &Path,
    ) -> Result<ProcessedClip> {
        let raw = source.read_frames(frames)?;
        let (processed, info) = self.process(&raw);
        write_clip(path, params.with_frame_count(info.frames), &processed)?;
        Ok(info)
    }
}

/// Peaks around an expected onset
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OnsetProbe {
    pub off_peak: u32,
    pub on_peak: u32,
    pub score: f64,
    /// Frames consumed from the source
    pub frames_read: u64,
}

impl OnsetProbe {
    pub fn from_peaks(off_peak: u32, on_peak: u32) -> Self {
        let total = on_peak as f64 + off_peak as f64;
        let score = if total > 0.0 { on_peak as f64 / total } else { 0.0 };
        Self {
            off_peak,
            on_peak,
            score,
            frames_read: 0,
        }
    }

    pub fn missing(&self) -> bool {
        self.score < MISSING_ONSET_SCORE
    }
}

/// Score an onset: the first window is the quiet pre-roll, two windows are
/// discarded, and the fourth is expected to carry the note.
pub fn probe_onset<S: FrameSource + ?Sized>(
    source: &mut S,
    layout: SampleLayout,
    sample_frames: u64,
) -> Result<OnsetProbe> {
    let off = source.read_frames(sample_frames)?;
    let skipped = source.skip_frames(2 * sample_frames)?;
    let on = source.read_frames(sample_frames)?;

    let bytes_per_frame = source.bytes_per_frame().max(1) as u64;
    let mut probe = OnsetProbe::from_peaks(
        peak_amplitude(&layout.decode(&off)),
        peak_amplitude(&layout.decode(&on)),
    );
    probe.frames_read = (off.len() + on.len()) as u64 / bytes_per_frame + skipped;
    Ok(probe)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::PcmCursor;
    use approx::assert_relative_eq;
    use std::io::Cursor;

    struct Frames {
        cursor: PcmCursor<Cursor<Vec<u8>>>,
        frame_count: u64,
    }

    impl Frames {
        fn stereo(samples: &[i32]) -> Self {
            let bytes = SampleLayout::Pcm16.encode(samples);
            let frame_count = (samples.len() / 2) as u64;
            Frames {
                cursor: PcmCursor::new(Cursor::new(bytes), 4, frame_count),
                frame_count,
            }
        }
    }

    impl FrameSource for Frames {
        fn params(&self) -> ContainerParams {
            ContainerParams {
                channels: 2,
                bytes_per_sample: 2,
                sample_rate: 1000,
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
    fn test_gain_clamped() {
        assert_eq!(normalizing_gain(0), 1.0);
        assert_eq!(normalizing_gain(1), MAX_GAIN);
        assert_eq!(normalizing_gain(32768), TARGET_PEAK_FRACTION);
        assert_relative_eq!(normalizing_gain(9830), 2.0, epsilon = 1e-3);
    }

    #[test]
    fn test_gain_idempotent_at_target() {
        let target = (TARGET_PEAK_FRACTION * FULL_SCALE).round() as i32;
        let mut samples = vec![target, -target / 2, 100];
        let gain = normalize(&mut samples);
        assert_relative_eq!(gain, 1.0, epsilon = 1e-4);
        assert_eq!(samples, vec![target, -target / 2, 100]);
    }

    #[test]
    fn test_normalize_rounds() {
        let mut samples = vec![9830, -4915, 3];
        let gain = normalize(&mut samples);
        assert_relative_eq!(gain, 19660.8 / 9830.0);
        assert_eq!(samples, vec![19661, -9830, 6]);
    }

    #[test]
    fn test_silence_untouched() {
        let mut samples = vec![0; 8];
        assert_eq!(normalize(&mut samples), 1.0);
        assert_eq!(samples, vec![0; 8]);
    }

    #[test]
    fn test_taper_monotonic_on_constant_window() {
        let mut samples = vec![10000; 2 * 100];
        apply_taper(&mut samples, 2, 40);

        assert!(samples[..2 * 60].iter().all(|&s| s == 10000));
        let tail: Vec<i32> = samples[2 * 60..].chunks(2).map(|f| f[0]).collect();
        assert_eq!(tail[0], 10000);
        for pair in tail.windows(2) {
            assert!(pair[1] <= pair[0]);
        }
        // Both channels share the envelope
        for frame in samples.chunks(2) {
            assert_eq!(frame[0], frame[1]);
        }
        assert_eq!(tail[39], (10000.0 * (1.0f64 / 40.0).sqrt()).round() as i32);
    }

    #[test]
    fn test_taper_skips_short_windows() {
        let mut samples = vec![500; 2 * 40];
        apply_taper(&mut samples, 2, 40);
        assert!(samples.iter().all(|&s| s == 500));
    }

    #[test]
    fn test_process_applies_gain_then_taper() {
        let processor = ClipProcessor::new(SampleLayout::Pcm16, 2, true, 2);
        let raw = SampleLayout::Pcm16.encode(&[9830, 9830, 9830, 9830, 9830, 9830, 9830, 9830]);
        let (out, info) = processor.process(&raw);
        assert_eq!(info.frames, 4);
        assert!(info.tapered);
        let samples = SampleLayout::Pcm16.decode(&out);
        assert_eq!(&samples[..6], &[19661, 19661, 19661, 19661, 19661, 19661]);
        let faded = (19661.0 * 0.5f64.sqrt()).round() as i32;
        assert_eq!(&samples[6..], &[faded, faded]);
    }

    #[test]
    fn test_process_raw_mode() {
        let processor = ClipProcessor::new(SampleLayout::Pcm16In32, 2, false, 0);
        let raw = SampleLayout::Pcm16In32.encode(&[1, -2, 3, -4]);
        let (out, info) = processor.process(&raw);
        assert_eq!(out, raw);
        assert_eq!(info.gain, 1.0);
        assert!(!info.tapered);
    }

    #[test]
    fn test_extract_writes_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.wav");
        let mut source = Frames::stereo(&[100; 2 * 50]);
        let params = source.params();
        let processor = ClipProcessor::new(SampleLayout::Pcm16, 2, true, 10);

        let info = processor.extract(&mut source, 30, params, &path).unwrap();
        assert_eq!(info.frames, 30);
        assert_eq!(source.frames_remaining(), 20);

        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.duration(), 30);
        assert_eq!(reader.spec().sample_rate, 1000);
    }

    #[test]
    fn test_onset_score() {
        assert_eq!(OnsetProbe::from_peaks(0, 0).score, 0.0);
        assert!(OnsetProbe::from_peaks(0, 0).missing());
        assert_relative_eq!(OnsetProbe::from_peaks(100, 900).score, 0.9);
        assert!(OnsetProbe::from_peaks(2000, 50).missing());
        assert!(!OnsetProbe::from_peaks(10, 1000).missing());
    }

    #[test]
    fn test_probe_onset_reads_four_windows() {
        // 4 windows of 5 frames: quiet, loud, loud, loud
        let mut samples = vec![20; 2 * 5];
        samples.extend(vec![3000; 2 * 15]);
        samples.extend(vec![0; 2 * 5]);
        let mut source = Frames::stereo(&samples);

        let probe = probe_onset(&mut source, SampleLayout::Pcm16, 5).unwrap();
        assert_eq!(probe.off_peak, 20);
        assert_eq!(probe.on_peak, 3000);
        assert_eq!(probe.frames_read, 20);
        assert!(!probe.missing());
        assert_eq!(source.frames_remaining(), 5);
    }
}
