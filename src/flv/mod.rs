//! Minimal FLV container support: enough to write recordings, replay them
//! and read a file's duration from its trailing tag.
//!
//! ```text
//! +============+==================+==============+==================+
//! | FLV Header | PrevTagSize0 (0) | Tag 1        | PrevTagSize1 ... |
//! | (9 bytes)  | (4 bytes)        | (11+N bytes) | (4 bytes)        |
//! +============+==================+==============+==================+
//! ```

use std::io::{self, Read, Seek, SeekFrom, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use bytes::Bytes;

pub const FLV_EXTENSION: &str = "flv";

const FLV_SIGNATURE: [u8; 3] = *b"FLV";
const FLV_VERSION: u8 = 0x01;
/// bit 0 = video, bit 2 = audio
const FLV_TYPE_FLAGS_AV: u8 = 0x05;
const FLV_HEADER_SIZE: u32 = 9;

/// Header plus `PreviousTagSize0`.
pub const FLV_PREAMBLE_LEN: u64 = FLV_HEADER_SIZE as u64 + 4;
pub const TAG_HEADER_LEN: u32 = 11;
const MAX_TAG_DATA: usize = 0x00FF_FFFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    Audio,
    Video,
    Script,
}

impl TagKind {
    pub fn code(self) -> u8 {
        match self {
            TagKind::Audio => 8,
            TagKind::Video => 9,
            TagKind::Script => 18,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            8 => Some(TagKind::Audio),
            9 => Some(TagKind::Video),
            18 => Some(TagKind::Script),
            _ => None,
        }
    }
}

/// One FLV tag as it travels over the media bus. `timestamp` is in
/// milliseconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaTag {
    pub kind: TagKind,
    pub timestamp: u32,
    pub data: Bytes,
}

impl MediaTag {
    pub fn new(kind: TagKind, timestamp: u32, data: impl Into<Bytes>) -> Self {
        Self {
            kind,
            timestamp,
            data: data.into(),
        }
    }
}

pub fn write_header<W: Write>(writer: &mut W) -> io::Result<()> {
    writer.write_all(&FLV_SIGNATURE)?;
    writer.write_u8(FLV_VERSION)?;
    writer.write_u8(FLV_TYPE_FLAGS_AV)?;
    writer.write_u32::<BigEndian>(FLV_HEADER_SIZE)?;
    writer.write_u32::<BigEndian>(0)?;
    Ok(())
}

/// Writes one tag followed by its `PreviousTagSize`. Returns the number of
/// bytes written.
pub fn write_tag<W: Write>(
    writer: &mut W,
    kind: TagKind,
    timestamp: u32,
    data: &[u8],
) -> io::Result<u64> {
    if data.len() > MAX_TAG_DATA {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("tag payload of {} bytes exceeds 24-bit size", data.len()),
        ));
    }
    let data_size = data.len() as u32;

    writer.write_u8(kind.code())?;
    writer.write_u24::<BigEndian>(data_size)?;
    // lower 24 bits, then the extension byte
    writer.write_u24::<BigEndian>(timestamp & 0x00FF_FFFF)?;
    writer.write_u8((timestamp >> 24) as u8)?;
    // stream id, always 0
    writer.write_u24::<BigEndian>(0)?;
    writer.write_all(data)?;
    writer.write_u32::<BigEndian>(TAG_HEADER_LEN + data_size)?;

    Ok(u64::from(TAG_HEADER_LEN + data_size) + 4)
}

pub struct FlvReader<R> {
    inner: R,
}

impl<R: Read> FlvReader<R> {
    pub fn open(mut inner: R) -> io::Result<Self> {
        let mut header = [0u8; FLV_HEADER_SIZE as usize];
        inner.read_exact(&mut header)?;
        if header[..3] != FLV_SIGNATURE {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "missing FLV signature"));
        }

        let data_offset = u32::from_be_bytes([header[5], header[6], header[7], header[8]]);
        if data_offset < FLV_HEADER_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("invalid FLV data offset {}", data_offset),
            ));
        }
        let extra = u64::from(data_offset - FLV_HEADER_SIZE);
        io::copy(&mut (&mut inner).take(extra), &mut io::sink())?;
        inner.read_u32::<BigEndian>()?;

        Ok(Self { inner })
    }

    /// Next tag, or `None` at end of stream. A truncated trailing tag (a file
    /// still being written) also ends the stream.
    pub fn next_tag(&mut self) -> io::Result<Option<MediaTag>> {
        let mut kind = [0u8; 1];
        if self.inner.read(&mut kind)? == 0 {
            return Ok(None);
        }

        match self.read_tag_body(kind[0]) {
            Ok(tag) => Ok(Some(tag)),
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn read_tag_body(&mut self, code: u8) -> io::Result<MediaTag> {
        let kind = TagKind::from_code(code).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidData, format!("unknown FLV tag type {}", code))
        })?;
        let data_size = self.inner.read_u24::<BigEndian>()?;
        let timestamp = read_timestamp(&mut self.inner)?;
        self.inner.read_u24::<BigEndian>()?;

        let mut data = vec![0u8; data_size as usize];
        self.inner.read_exact(&mut data)?;
        self.inner.read_u32::<BigEndian>()?;

        Ok(MediaTag::new(kind, timestamp, data))
    }
}

fn read_timestamp<R: Read>(reader: &mut R) -> io::Result<u32> {
    let lower = reader.read_u24::<BigEndian>()?;
    let extension = reader.read_u8()?;
    Ok((u32::from(extension) << 24) | lower)
}

/// Duration in milliseconds, taken from the timestamp of the last tag.
///
/// Only the trailing `PreviousTagSize` and the header of the tag it points
/// to are read. Files without a usable trailing tag report 0.
pub fn read_duration<R: Read + Seek>(reader: &mut R) -> io::Result<u32> {
    let len = reader.seek(SeekFrom::End(0))?;
    if len < FLV_PREAMBLE_LEN + 4 {
        return Ok(0);
    }

    reader.seek(SeekFrom::End(-4))?;
    let last_tag_size = u64::from(reader.read_u32::<BigEndian>()?);
    if last_tag_size < u64::from(TAG_HEADER_LEN) || last_tag_size + 4 > len - FLV_PREAMBLE_LEN {
        return Ok(0);
    }

    reader.seek(SeekFrom::End(-(last_tag_size as i64) - 4))?;
    // type + data size
    reader.read_u32::<BigEndian>()?;
    read_timestamp(reader)
}
