//! EBML variable-size integers, element ids and value readers.
//!
//! EBML uses a leading-1 encoding for variable-size integers:
//! - 1 byte:  `1xxx xxxx`                (7 data bits)
//! - 2 bytes: `01xx xxxx xxxx xxxx`       (14 data bits)
//! - 3 bytes: `001x xxxx ...`             (21 data bits)
//! - 4 bytes: `0001 xxxx ...`             (28 data bits)
//!
//! Ids keep the marker bit and are at most 4 bytes; sizes drop it and are at
//! most 8 bytes. A size with every data bit set means "unknown".

use crate::{Error, Result};

// EBML header
pub const EBML_HEADER: u32 = 0x1A45_DFA3;
pub const DOC_TYPE: u32 = 0x4282;

// Segment and its top-level children
pub const SEGMENT: u32 = 0x1853_8067;
pub const SEEK_HEAD: u32 = 0x114D_9B74;
pub const INFO: u32 = 0x1549_A966;
pub const TRACKS: u32 = 0x1654_AE6B;
pub const CLUSTER: u32 = 0x1F43_B675;
pub const CUES: u32 = 0x1C53_BB6B;
pub const TAGS: u32 = 0x1254_C367;

// Info
pub const TIMECODE_SCALE: u32 = 0x2A_D7B1;
pub const DURATION: u32 = 0x4489;

// TrackEntry
pub const TRACK_ENTRY: u32 = 0xAE;
pub const TRACK_NUMBER: u32 = 0xD7;
pub const TRACK_TYPE: u32 = 0x83;
pub const CODEC_ID: u32 = 0x86;
pub const CODEC_PRIVATE: u32 = 0x63A2;
pub const DEFAULT_DURATION: u32 = 0x23_E383;
pub const LANGUAGE: u32 = 0x22_B59C;

// Video
pub const VIDEO: u32 = 0xE0;
pub const PIXEL_WIDTH: u32 = 0xB0;
pub const PIXEL_HEIGHT: u32 = 0xBA;
pub const DISPLAY_WIDTH: u32 = 0x54B0;
pub const DISPLAY_HEIGHT: u32 = 0x54BA;
pub const DISPLAY_UNIT: u32 = 0x54B2;
pub const PROJECTION: u32 = 0x7670;
pub const PROJECTION_POSE_ROLL: u32 = 0x7675;

// Audio
pub const AUDIO: u32 = 0xE1;
pub const SAMPLING_FREQUENCY: u32 = 0xB5;
pub const CHANNELS: u32 = 0x9F;

/// Size value reserved for "unknown size".
pub const UNKNOWN_SIZE: u64 = u64::MAX;

/// Total encoded length of a vint from its first byte.
pub fn vint_width(first: u8, max: usize) -> Option<usize> {
    let width = first.leading_zeros() as usize + 1;
    (width <= max).then_some(width)
}

/// Decode an element id (marker bit kept) from the start of `data`.
///
/// Returns the id and the number of bytes consumed.
pub fn parse_id(data: &[u8], offset: u64) -> Result<(u32, usize)> {
    let first = *data
        .first()
        .ok_or_else(|| Error::malformed(offset, "missing element id"))?;
    let width = vint_width(first, 4)
        .ok_or_else(|| Error::malformed(offset, format!("invalid element id byte 0x{first:02X}")))?;
    let bytes = data
        .get(..width)
        .ok_or_else(|| Error::malformed(offset, "element id runs past its parent"))?;
    let id = bytes.iter().fold(0u32, |acc, b| (acc << 8) | *b as u32);
    Ok((id, width))
}

/// Decode an element data size from the start of `data`.
///
/// Returns [`UNKNOWN_SIZE`] for the all-ones sentinel.
pub fn parse_size(data: &[u8], offset: u64) -> Result<(u64, usize)> {
    let first = *data
        .first()
        .ok_or_else(|| Error::malformed(offset, "missing element size"))?;
    let width = vint_width(first, 8)
        .ok_or_else(|| Error::malformed(offset, "invalid element size byte 0x00"))?;
    let bytes = data
        .get(..width)
        .ok_or_else(|| Error::malformed(offset, "element size runs past its parent"))?;

    // Mask out the leading-1 marker
    let mask = (0xFFu16 >> width) as u8;
    let value = bytes[1..]
        .iter()
        .fold((first & mask) as u64, |acc, b| (acc << 8) | *b as u64);

    let max_for_width = (1u64 << (7 * width)) - 1;
    if value == max_for_width {
        return Ok((UNKNOWN_SIZE, width));
    }
    Ok((value, width))
}

/// One element inside a materialized master element.
#[derive(Debug, Clone, Copy)]
pub struct Element<'a> {
    pub id: u32,
    /// Absolute offset of the element header.
    pub offset: u64,
    pub data: &'a [u8],
}

/// Iterator over the child elements of a materialized master element.
pub struct ElementIter<'a> {
    data: &'a [u8],
    pos: usize,
    base: u64,
}

impl<'a> ElementIter<'a> {
    pub fn new(data: &'a [u8], base: u64) -> Self {
        Self { data, pos: 0, base }
    }
}

impl<'a> Iterator for ElementIter<'a> {
    type Item = Result<Element<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.data.len() {
            return None;
        }
        let offset = self.base + self.pos as u64;
        let rest = &self.data[self.pos..];

        let parsed = parse_id(rest, offset).and_then(|(id, id_len)| {
            let (size, size_len) = parse_size(&rest[id_len..], offset)?;
            let start = id_len + size_len;
            // Unknown size inside a materialized parent runs to its end.
            let len = if size == UNKNOWN_SIZE {
                rest.len() - start
            } else {
                size as usize
            };
            if size != UNKNOWN_SIZE && size > (rest.len() - start) as u64 {
                return Err(Error::malformed(
                    offset,
                    format!("element 0x{id:X} declares {size} bytes, parent has {}", rest.len() - start),
                ));
            }
            Ok((Element { id, offset, data: &rest[start..start + len] }, start + len))
        });

        match parsed {
            Ok((element, consumed)) => {
                self.pos += consumed;
                Some(Ok(element))
            }
            Err(e) => {
                self.pos = self.data.len();
                Some(Err(e))
            }
        }
    }
}

/// Unsigned integer element value (0-8 bytes, big-endian).
pub fn read_uint(element: &Element<'_>) -> Result<u64> {
    if element.data.len() > 8 {
        return Err(Error::malformed(
            element.offset,
            format!("uint element is {} bytes", element.data.len()),
        ));
    }
    Ok(element
        .data
        .iter()
        .fold(0u64, |acc, b| (acc << 8) | *b as u64))
}

/// Float element value (0, 4 or 8 bytes).
pub fn read_float(element: &Element<'_>) -> Result<f64> {
    let data = element.data;
    match data.len() {
        0 => Ok(0.0),
        4 => Ok(f32::from_be_bytes([data[0], data[1], data[2], data[3]]) as f64),
        8 => {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(data);
            Ok(f64::from_be_bytes(buf))
        }
        n => Err(Error::malformed(
            element.offset,
            format!("float element is {n} bytes (must be 0, 4, or 8)"),
        )),
    }
}

/// String element value. Trailing NULs are stripped.
pub fn read_string(element: &Element<'_>) -> String {
    let end = element
        .data
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(element.data.len());
    String::from_utf8_lossy(&element.data[..end]).into_owned()
}
