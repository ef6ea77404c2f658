//! Forward-only PCM containers: Wave64 with a fallback to conventional RIFF/WAVE.
//!
//! Both container variants expose the same parameter tuple and the same
//! frame cursor through [`FrameSource`]. The variant is chosen once, when the
//! file is opened, by looking at its leading chunk id.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use tracing::debug;

use crate::error::{ClipError, Result};
use crate::layout::SampleLayout;
use crate::wav64::Wave64Reader;
use crate::wavfile::WavReader;

/// Upper bound on the buffer used when discarding frames
const SKIP_BLOCK_BYTES: usize = 1 << 20;

/// Format parameters shared by every container variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerParams {
    pub channels: u16,
    pub bytes_per_sample: u16,
    pub sample_rate: u32,
    pub frame_count: u64,
}

impl ContainerParams {
    pub fn bytes_per_frame(&self) -> usize {
        self.channels as usize * self.bytes_per_sample as usize
    }

    /// Decode layout for this sample width
    pub fn layout(&self) -> Result<SampleLayout> {
        SampleLayout::from_params(self.channels, self.bytes_per_sample)
    }

    /// Same parameters with a different frame count
    pub fn with_frame_count(&self, frame_count: u64) -> Self {
        ContainerParams { frame_count, ..*self }
    }
}

/// A forward-only source of interleaved PCM frames
pub trait FrameSource {
    /// Get the container's format parameters
    fn params(&self) -> ContainerParams;

    /// Frames not yet read
    fn frames_remaining(&self) -> u64;

    /// Read up to `frames` frames; fewer are returned only at the end of the data.
    /// Returns an empty buffer once the data is exhausted.
    fn read_frames(&mut self, frames: u64) -> Result<Vec<u8>>;

    fn bytes_per_frame(&self) -> usize {
        self.params().bytes_per_frame()
    }

    fn sample_rate(&self) -> u32 {
        self.params().sample_rate
    }

    /// Read and discard `frames` frames. Returns how many were actually skipped.
    fn skip_frames(&mut self, frames: u64) -> Result<u64> {
        let bytes_per_frame = self.bytes_per_frame().max(1);
        let block = (SKIP_BLOCK_BYTES / bytes_per_frame).max(1) as u64;
        let mut skipped = 0;
        while skipped < frames {
            let chunk = self.read_frames(block.min(frames - skipped))?;
            if chunk.is_empty() {
                break;
            }
            skipped += (chunk.len() / bytes_per_frame) as u64;
        }
        Ok(skipped)
    }
}

/// Fill `buf` from `reader`, stopping early only at end of stream.
pub(crate) fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Frame cursor over the data payload of an open container
#[derive(Debug)]
pub struct PcmCursor<R> {
    reader: R,
    bytes_per_frame: usize,
    frames_remaining: u64,
}

impl<R: Read> PcmCursor<R> {
    pub(crate) fn new(reader: R, bytes_per_frame: usize, frame_count: u64) -> Self {
        PcmCursor {
            reader,
            bytes_per_frame,
            frames_remaining: frame_count,
        }
    }

    pub fn frames_remaining(&self) -> u64 {
        self.frames_remaining
    }

    pub fn read_frames(&mut self, frames: u64) -> Result<Vec<u8>> {
        let n = frames.min(self.frames_remaining);
        let wanted = n as usize * self.bytes_per_frame;
        let mut buf = vec![0u8; wanted];
        let read = read_up_to(&mut self.reader, &mut buf)?;
        if read != wanted {
            return Err(ClipError::Truncated { read, wanted });
        }
        self.frames_remaining -= n;
        Ok(buf)
    }
}

/// An open input container, resolved once at open time
#[derive(Debug)]
pub enum Container {
    Wave64(Wave64Reader<BufReader<File>>),
    Wav(WavReader<BufReader<File>>),
}

impl Container {
    /// Open a container, falling back to RIFF/WAVE when the file does not start
    /// with the Wave64 outer chunk id.
    pub fn open(path: &Path) -> Result<Self> {
        let file = BufReader::new(File::open(path)?);
        if let Some(reader) = Wave64Reader::new(file)? {
            debug!("Opened {} as Wave64", path.display());
            return Ok(Container::Wave64(reader));
        }

        debug!("{} is not Wave64, reopening as RIFF/WAVE", path.display());
        let file = BufReader::new(File::open(path)?);
        Ok(Container::Wav(WavReader::new(file)?))
    }

    pub fn kind(&self) -> &str {
        match self {
            Container::Wave64(_) => "wave64",
            Container::Wav(_) => "wav",
        }
    }
}

impl FrameSource for Container {
    fn params(&self) -> ContainerParams {
        match self {
            Container::Wave64(r) => r.params(),
            Container::Wav(r) => r.params(),
        }
    }

    fn frames_remaining(&self) -> u64 {
        match self {
            Container::Wave64(r) => r.frames_remaining(),
            Container::Wav(r) => r.frames_remaining(),
        }
    }

    fn read_frames(&mut self, frames: u64) -> Result<Vec<u8>> {
        match self {
            Container::Wave64(r) => r.read_frames(frames),
            Container::Wav(r) => r.read_frames(frames),
        }
    }
}
