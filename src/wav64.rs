//! Sony Wave64 reader.
//!
//! Wave64 replaces the four-character RIFF ids with 16-byte GUIDs and the
//! 32-bit chunk sizes with 64-bit ones, so recordings longer than the 4 GiB
//! RIFF limit stay addressable. Every chunk header is a GUID followed by a
//! little-endian u64 size that includes the 24 header bytes, and chunks start
//! on 8-byte boundaries relative to the start of the file.

use std::io::{self, Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt};

use crate::container::{read_up_to, ContainerParams, FrameSource, PcmCursor};
use crate::error::{ClipError, Result};

pub const GUID_LEN: usize = 16;
pub const CHUNK_HEADER_LEN: u64 = 24;
const CHUNK_ALIGN: u64 = 8;
const FMT_FIELDS_LEN: u64 = 16;

pub const RIFF_GUID: [u8; GUID_LEN] = [
    b'r', b'i', b'f', b'f', 0x2E, 0x91, 0xCF, 0x11, 0xA5, 0xD6, 0x28, 0xDB, 0x04, 0xC1, 0x00, 0x00,
];
pub const WAVE_GUID: [u8; GUID_LEN] = [
    b'w', b'a', b'v', b'e', 0xF3, 0xAC, 0xD3, 0x11, 0x8C, 0xD1, 0x00, 0xC0, 0x4F, 0x8E, 0xDB, 0x8A,
];
pub const FMT_GUID: [u8; GUID_LEN] = [
    b'f', b'm', b't', b' ', 0xF3, 0xAC, 0xD3, 0x11, 0x8C, 0xD1, 0x00, 0xC0, 0x4F, 0x8E, 0xDB, 0x8A,
];
pub const DATA_GUID: [u8; GUID_LEN] = [
    b'd', b'a', b't', b'a', 0xF3, 0xAC, 0xD3, 0x11, 0x8C, 0xD1, 0x00, 0xC0, 0x4F, 0x8E, 0xDB, 0x8A,
];

/// Fields of the Wave64 format chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatChunk {
    pub format_tag: u16,
    pub channels: u16,
    pub sample_rate: u32,
    pub byte_rate: u32,
    pub bytes_per_frame: u16,
    pub bits_per_sample: u16,
}

impl FormatChunk {
    fn parse(fields: &[u8]) -> Result<Self> {
        let mut rdr = Cursor::new(fields);
        let fmt = FormatChunk {
            format_tag: rdr.read_u16::<LittleEndian>()?,
            channels: rdr.read_u16::<LittleEndian>()?,
            sample_rate: rdr.read_u32::<LittleEndian>()?,
            byte_rate: rdr.read_u32::<LittleEndian>()?,
            bytes_per_frame: rdr.read_u16::<LittleEndian>()?,
            bits_per_sample: rdr.read_u16::<LittleEndian>()?,
        };

        if fmt.channels == 0 || fmt.bytes_per_frame == 0 {
            return Err(ClipError::BadChunk {
                chunk: "fmt",
                reason: format!(
                    "{} channels, {} bytes per frame",
                    fmt.channels, fmt.bytes_per_frame
                ),
            });
        }
        if fmt.bits_per_sample as u32 != 8 * fmt.bytes_per_sample() as u32 {
            return Err(ClipError::BitsPerSample {
                bits: fmt.bits_per_sample,
                bytes_per_frame: fmt.bytes_per_frame,
                channels: fmt.channels,
            });
        }
        Ok(fmt)
    }

    pub fn bytes_per_sample(&self) -> u16 {
        self.bytes_per_frame / self.channels
    }
}

/// Byte stream that remembers its absolute offset for chunk alignment
struct ChunkStream<R> {
    reader: R,
    offset: u64,
}

impl<R: Read> ChunkStream<R> {
    fn fill(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = read_up_to(&mut self.reader, buf)?;
        self.offset += n as u64;
        Ok(n)
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let read = self.fill(buf)?;
        if read != buf.len() {
            return Err(ClipError::Truncated { read, wanted: buf.len() });
        }
        Ok(())
    }

    fn read_size(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    /// Discard exactly `n` bytes
    fn skip(&mut self, n: u64) -> Result<()> {
        let copied = io::copy(&mut (&mut self.reader).take(n), &mut io::sink())?;
        self.offset += copied;
        if copied != n {
            return Err(ClipError::Truncated {
                read: copied as usize,
                wanted: n as usize,
            });
        }
        Ok(())
    }

    /// Consume padding up to the next 8-byte boundary. Running out of input here
    /// is not an error; the following id read reports it.
    fn align(&mut self) -> io::Result<u64> {
        let partial = self.offset % CHUNK_ALIGN;
        if partial == 0 {
            return Ok(0);
        }
        let mut pad = [0u8; CHUNK_ALIGN as usize];
        let n = self.fill(&mut pad[..(CHUNK_ALIGN - partial) as usize])?;
        Ok(n as u64)
    }
}

/// Forward-only Wave64 reader positioned on the data payload
#[derive(Debug)]
pub struct Wave64Reader<R> {
    format: FormatChunk,
    frame_count: u64,
    data_offset: u64,
    file_size: u64,
    cursor: PcmCursor<R>,
}

impl<R: Read> Wave64Reader<R> {
    /// Parse chunk headers up to the start of the data payload.
    ///
    /// # Returns
    /// `Ok(None)` if the stream does not begin with the Wave64 outer chunk id,
    /// so the caller can fall back to another reader.
    pub fn new(reader: R) -> Result<Option<Self>> {
        let mut stream = ChunkStream { reader, offset: 0 };

        let mut id = [0u8; GUID_LEN];
        if stream.fill(&mut id)? < GUID_LEN || id != RIFF_GUID {
            return Ok(None);
        }
        let file_size = stream.read_size()?;
        let mut form = [0u8; GUID_LEN];
        stream.read_exact(&mut form)?;
        if form != WAVE_GUID {
            return Err(ClipError::BadForm);
        }

        let mut format: Option<FormatChunk> = None;
        loop {
            stream.align()?;
            let read = stream.fill(&mut id)?;
            if read == 0 {
                return Err(ClipError::MissingData);
            }
            if read < GUID_LEN {
                return Err(ClipError::Truncated { read, wanted: GUID_LEN });
            }

            let size = stream.read_size()?;
            if size < CHUNK_HEADER_LEN {
                return Err(ClipError::BadChunk {
                    chunk: chunk_name(&id),
                    reason: format!("size {} is smaller than its header", size),
                });
            }
            let payload = size - CHUNK_HEADER_LEN;

            match id {
                FMT_GUID => {
                    if payload != FMT_FIELDS_LEN {
                        return Err(ClipError::BadChunk {
                            chunk: "fmt",
                            reason: format!("size {}, expected {}", size, CHUNK_HEADER_LEN + FMT_FIELDS_LEN),
                        });
                    }
                    let mut fields = [0u8; FMT_FIELDS_LEN as usize];
                    stream.read_exact(&mut fields)?;
                    format = Some(FormatChunk::parse(&fields)?);
                }
                DATA_GUID => {
                    let format = format.ok_or(ClipError::MissingFormat)?;
                    let frame_size = format.bytes_per_frame as u64;
                    if payload % frame_size != 0 {
                        return Err(ClipError::DataNotFrameAligned {
                            size: payload,
                            frame_size: format.bytes_per_frame,
                        });
                    }
                    let frame_count = payload / frame_size;
                    let data_offset = stream.offset;
                    return Ok(Some(Wave64Reader {
                        format,
                        frame_count,
                        data_offset,
                        file_size,
                        cursor: PcmCursor::new(
                            stream.reader,
                            format.bytes_per_frame as usize,
                            frame_count,
                        ),
                    }));
                }
                _ => stream.skip(payload)?,
            }
        }
    }

    pub fn format(&self) -> &FormatChunk {
        &self.format
    }

    /// Absolute byte offset of the first data frame
    pub fn data_offset(&self) -> u64 {
        self.data_offset
    }

    /// File size declared by the outer chunk
    pub fn declared_file_size(&self) -> u64 {
        self.file_size
    }
}

impl<R: Read> FrameSource for Wave64Reader<R> {
    fn params(&self) -> ContainerParams {
        ContainerParams {
            channels: self.format.channels,
            bytes_per_sample: self.format.bytes_per_sample(),
            sample_rate: self.format.sample_rate,
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

fn chunk_name(id: &[u8; GUID_LEN]) -> &'static str {
    match *id {
        RIFF_GUID => "riff",
        FMT_GUID => "fmt",
        DATA_GUID => "data",
        _ => "unknown",
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn chunk_header(id: &[u8; GUID_LEN], payload_len: u64) -> Vec<u8> {
        let mut out = id.to_vec();
        out.extend_from_slice(&(payload_len + CHUNK_HEADER_LEN).to_le_bytes());
        out
    }

    pub fn fmt_chunk(channels: u16, bytes_per_sample: u16, sample_rate: u32) -> Vec<u8> {
        let bytes_per_frame = channels * bytes_per_sample;
        let mut out = chunk_header(&FMT_GUID, FMT_FIELDS_LEN);
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&channels.to_le_bytes());
        out.extend_from_slice(&sample_rate.to_le_bytes());
        out.extend_from_slice(&(sample_rate * bytes_per_frame as u32).to_le_bytes());
        out.extend_from_slice(&bytes_per_frame.to_le_bytes());
        out.extend_from_slice(&(bytes_per_sample * 8).to_le_bytes());
        out
    }

    pub fn pad_to_align(buf: &mut Vec<u8>) {
        while buf.len() as u64 % CHUNK_ALIGN != 0 {
            buf.push(0);
        }
    }

    /// Assemble a Wave64 file from already-encoded chunks after the outer header.
    pub fn assemble(chunks: &[Vec<u8>]) -> Vec<u8> {
        let mut body = Vec::new();
        for chunk in chunks {
            pad_to_align(&mut body);
            body.extend_from_slice(chunk);
        }
        let mut out = RIFF_GUID.to_vec();
        out.extend_from_slice(&(body.len() as u64 + 40).to_le_bytes());
        out.extend_from_slice(&WAVE_GUID);
        out.extend_from_slice(&body);
        out
    }

    pub fn data_chunk(payload: &[u8]) -> Vec<u8> {
        let mut out = chunk_header(&DATA_GUID, payload.len() as u64);
        out.extend_from_slice(payload);
        out
    }

    pub fn build_wave64(channels: u16, bytes_per_sample: u16, sample_rate: u32, payload: &[u8]) -> Vec<u8> {
        assemble(&[fmt_chunk(channels, bytes_per_sample, sample_rate), data_chunk(payload)])
    }
}
