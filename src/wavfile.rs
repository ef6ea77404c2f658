//! Conventional RIFF/WAVE I/O: the fallback input reader and the clip writer.

use std::fs::File;
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt};

use crate::container::{read_up_to, ContainerParams, FrameSource, PcmCursor};
use crate::error::{ClipError, Result};

const WAVE_FORMAT_PCM: u16 = 1;
const WAVE_FORMAT_EXTENSIBLE: u16 = 0xFFFE;
const RIFF_HEADER_LEN: u32 = 36; // RIFF size field covers everything after it except data

/// WAV file header information
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavHeader {
    pub format_tag: u16,
    pub sample_rate: u32,
    pub num_channels: u16,
    pub bits_per_sample: u16,
    pub block_align: u16,
    pub data_size: u32,
}

impl WavHeader {
    pub fn bytes_per_sample(&self) -> u16 {
        self.block_align / self.num_channels
    }

    pub fn frame_count(&self) -> u64 {
        (self.data_size / self.block_align as u32) as u64
    }
}

/// Read and parse a WAV file header, leaving the reader on the first data byte.
///
/// Walks the chunk list forward without seeking; chunks other than `fmt ` and
/// `data` are read past, including the RIFF pad byte after odd-sized chunks.
pub fn read_wav_header<R: Read>(reader: &mut R) -> Result<WavHeader> {
    let mut riff = [0u8; 12];
    if read_up_to(reader, &mut riff)? != riff.len() {
        return Err(ClipError::InvalidWav("file too short".to_string()));
    }
    if &riff[0..4] != b"RIFF" || &riff[8..12] != b"WAVE" {
        return Err(ClipError::InvalidWav("missing RIFF/WAVE header".to_string()));
    }

    let mut fmt: Option<(u16, u16, u32, u16, u16)> = None;
    loop {
        let mut chunk_header = [0u8; 8];
        if read_up_to(reader, &mut chunk_header)? != chunk_header.len() {
            return Err(ClipError::InvalidWav("Could not find data chunk".to_string()));
        }
        let chunk_size = u32::from_le_bytes([
            chunk_header[4],
            chunk_header[5],
            chunk_header[6],
            chunk_header[7],
        ]);

        match &chunk_header[0..4] {
            b"fmt " => {
                if chunk_size < 16 {
                    return Err(ClipError::InvalidWav(format!("fmt chunk of {} bytes", chunk_size)));
                }
                let format_tag = reader.read_u16::<LittleEndian>()?;
                let num_channels = reader.read_u16::<LittleEndian>()?;
                let sample_rate = reader.read_u32::<LittleEndian>()?;
                let _byte_rate = reader.read_u32::<LittleEndian>()?;
                let block_align = reader.read_u16::<LittleEndian>()?;
                let bits_per_sample = reader.read_u16::<LittleEndian>()?;
                skip(reader, padded(chunk_size) - 16)?;
                fmt = Some((format_tag, num_channels, sample_rate, block_align, bits_per_sample));
            }
            b"data" => {
                let (format_tag, num_channels, sample_rate, block_align, bits_per_sample) =
                    fmt.ok_or_else(|| ClipError::InvalidWav("data chunk before fmt chunk".to_string()))?;
                let header = WavHeader {
                    format_tag,
                    sample_rate,
                    num_channels,
                    bits_per_sample,
                    block_align,
                    data_size: chunk_size,
                };
                validate(&header)?;
                return Ok(header);
            }
            _ => skip(reader, padded(chunk_size))?,
        }
    }
}

fn padded(chunk_size: u32) -> u64 {
    chunk_size as u64 + (chunk_size as u64 & 1)
}

fn skip<R: Read>(reader: &mut R, n: u64) -> Result<()> {
    let copied = io::copy(&mut reader.take(n), &mut io::sink())?;
    if copied != n {
        return Err(ClipError::Truncated {
            read: copied as usize,
            wanted: n as usize,
        });
    }
    Ok(())
}

fn validate(header: &WavHeader) -> Result<()> {
    if header.format_tag != WAVE_FORMAT_PCM && header.format_tag != WAVE_FORMAT_EXTENSIBLE {
        return Err(ClipError::InvalidWav(format!(
            "unsupported format tag {:#06x} (compressed audio is not decoded)",
            header.format_tag
        )));
    }
    if header.num_channels == 0 || header.bits_per_sample == 0 || header.bits_per_sample % 8 != 0 {
        return Err(ClipError::InvalidWav(format!(
            "{} channels at {} bits per sample",
            header.num_channels, header.bits_per_sample
        )));
    }
    if header.block_align as u32 != header.num_channels as u32 * (header.bits_per_sample as u32 / 8) {
        return Err(ClipError::InvalidWav(format!(
            "block align {} does not match {} channels of {} bits",
            header.block_align, header.num_channels, header.bits_per_sample
        )));
    }
    Ok(())
}

/// Forward-only RIFF/WAVE reader positioned on the data payload
#[derive(Debug)]
pub struct WavReader<R> {
    header: WavHeader,
    cursor: PcmCursor<R>,
}

impl<R: Read> WavReader<R> {
    pub fn new(mut reader: R) -> Result<Self> {
        let header = read_wav_header(&mut reader)?;
        let cursor = PcmCursor::new(reader, header.block_align as usize, header.frame_count());
        Ok(WavReader { header, cursor })
    }

    pub fn header(&self) -> &WavHeader {
        &self.header
    }
}

impl<R: Read> FrameSource for WavReader<R> {
    fn params(&self) -> ContainerParams {
        ContainerParams {
            channels: self.header.num_channels,
            bytes_per_sample: self.header.bytes_per_sample(),
            sample_rate: self.header.sample_rate,
            frame_count: self.header.frame_count(),
        }
    }

    fn frames_remaining(&self) -> u64 {
        self.cursor.frames_remaining()
    }

    fn read_frames(&mut self, frames: u64) -> Result<Vec<u8>> {
        self.cursor.read_frames(frames)
    }
}

/// Simple WAV file writer for extracted clips
pub struct WavWriter {
    file: BufWriter<File>,
    data_size: u64,
    params: ContainerParams,
}

impl WavWriter {
    /// Create the file and write a header that `finalize` patches with the real size.
    pub fn create(path: &Path, params: ContainerParams) -> Result<Self> {
        let mut file = BufWriter::new(File::create(path)?);
        Self::write_wav_header(&mut file, 0, &params)?;
        Ok(WavWriter {
            file,
            data_size: 0,
            params,
        })
    }

    fn write_wav_header<W: Write>(w: &mut W, data_size: u32, params: &ContainerParams) -> io::Result<()> {
        let channels = params.channels;
        let bits_per_sample = params.bytes_per_sample * 8;
        let block_align = params.bytes_per_frame() as u16;
        let byte_rate = params.sample_rate * block_align as u32;

        w.write_all(b"RIFF")?;
        w.write_all(&(data_size + RIFF_HEADER_LEN).to_le_bytes())?;
        w.write_all(b"WAVE")?;
        w.write_all(b"fmt ")?;
        w.write_all(&16u32.to_le_bytes())?; // fmt chunk size
        w.write_all(&WAVE_FORMAT_PCM.to_le_bytes())?;
        w.write_all(&channels.to_le_bytes())?;
        w.write_all(&params.sample_rate.to_le_bytes())?;
        w.write_all(&byte_rate.to_le_bytes())?;
        w.write_all(&block_align.to_le_bytes())?;
        w.write_all(&bits_per_sample.to_le_bytes())?;
        w.write_all(b"data")?;
        w.write_all(&data_size.to_le_bytes())?;
        Ok(())
    }

    /// Append whole interleaved frames
    pub fn write_frames(&mut self, frames: &[u8]) -> Result<()> {
        self.file.write_all(frames)?;
        self.data_size += frames.len() as u64;
        Ok(())
    }

    /// Patch the header with the final sizes and flush. Returns the frame count written.
    pub fn finalize(mut self) -> Result<u64> {
        let max_data = (u32::MAX - RIFF_HEADER_LEN) as u64;
        if self.data_size > max_data {
            return Err(ClipError::InvalidWav(format!(
                "{} data bytes do not fit a RIFF header",
                self.data_size
            )));
        }
        self.file.seek(SeekFrom::Start(0))?;
        Self::write_wav_header(&mut self.file, self.data_size as u32, &self.params)?;
        self.file.flush()?;
        Ok(self.data_size / self.params.bytes_per_frame().max(1) as u64)
    }
}

/// Write one complete clip file.
pub fn write_clip(path: &Path, params: ContainerParams, frames: &[u8]) -> Result<u64> {
    let mut writer = WavWriter::create(path, params)?;
    writer.write_frames(frames)?;
    writer.finalize()
}
