//! MP4 box type codes and in-memory box iteration.

use crate::track::MediaType;
use crate::{Error, Result};

/// Four-character box type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoxType(pub [u8; 4]);

impl BoxType {
    pub const FTYP: Self = Self(*b"ftyp");
    pub const MOOV: Self = Self(*b"moov");
    pub const MVHD: Self = Self(*b"mvhd");
    pub const TRAK: Self = Self(*b"trak");
    pub const TKHD: Self = Self(*b"tkhd");
    pub const MDIA: Self = Self(*b"mdia");
    pub const MDHD: Self = Self(*b"mdhd");
    pub const HDLR: Self = Self(*b"hdlr");
    pub const MINF: Self = Self(*b"minf");
    pub const STBL: Self = Self(*b"stbl");
    pub const STSD: Self = Self(*b"stsd");
    pub const STTS: Self = Self(*b"stts");

    // Sample entry children.
    pub const AVCC: Self = Self(*b"avcC");
    pub const HVCC: Self = Self(*b"hvcC");
    pub const AV1C: Self = Self(*b"av1C");
    pub const VPCC: Self = Self(*b"vpcC");
    pub const ESDS: Self = Self(*b"esds");
    pub const WAVE: Self = Self(*b"wave");
    pub const SINF: Self = Self(*b"sinf");
    pub const FRMA: Self = Self(*b"frma");

    /// Create from bytes.
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    /// Get the 4-char code as a string.
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("????")
    }
}

impl std::fmt::Display for BoxType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Handler type for a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerType {
    Video,
    Audio,
    Hint,
    Meta,
    Text,
    Subtitle,
    Unknown([u8; 4]),
}

impl HandlerType {
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        match &bytes {
            b"vide" => Self::Video,
            b"soun" => Self::Audio,
            b"hint" => Self::Hint,
            b"meta" => Self::Meta,
            b"text" => Self::Text,
            b"sbtl" | b"subt" => Self::Subtitle,
            _ => Self::Unknown(bytes),
        }
    }

    pub fn media_type(&self) -> MediaType {
        match self {
            Self::Video => MediaType::Video,
            Self::Audio => MediaType::Audio,
            _ => MediaType::Other,
        }
    }
}

/// Iterator over the boxes packed in a byte slice.
///
/// `base` is the absolute offset of `data[0]` and is only used for error
/// reporting.
pub struct BoxIter<'a> {
    data: &'a [u8],
    pos: usize,
    base: u64,
}

impl<'a> BoxIter<'a> {
    pub fn new(data: &'a [u8], base: u64) -> Self {
        Self { data, pos: 0, base }
    }
}

impl<'a> Iterator for BoxIter<'a> {
    type Item = Result<(BoxType, &'a [u8])>;

    fn next(&mut self) -> Option<Self::Item> {
        let rest = &self.data[self.pos..];
        // Trailing padding shorter than a header.
        if rest.len() < 8 {
            return None;
        }

        let offset = self.base + self.pos as u64;
        let box_type = BoxType([rest[4], rest[5], rest[6], rest[7]]);
        let (size, header_size) = match be_u32(rest, 0) {
            0 => (rest.len(), 8),
            1 if rest.len() >= 16 => (usize::try_from(be_u64(rest, 8)).unwrap_or(usize::MAX), 16),
            // Largesize marker without room for the 64-bit size.
            1 => (usize::MAX, 16),
            n => (n as usize, 8),
        };

        if size < header_size || size > rest.len() {
            self.pos = self.data.len();
            return Some(Err(Error::malformed(
                offset,
                format!(
                    "box {box_type} declares {size} bytes, {} available",
                    rest.len()
                ),
            )));
        }

        self.pos += size;
        Some(Ok((box_type, &rest[header_size..size])))
    }
}

/// Find the first child box of the given type.
pub fn find_box<'a>(data: &'a [u8], base: u64, wanted: BoxType) -> Result<Option<&'a [u8]>> {
    for entry in BoxIter::new(data, base) {
        let (box_type, payload) = entry?;
        if box_type == wanted {
            return Ok(Some(payload));
        }
    }
    Ok(None)
}

pub(crate) fn be_u16(data: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([data[at], data[at + 1]])
}

pub(crate) fn be_u32(data: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

pub(crate) fn be_u64(data: &[u8], at: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&data[at..at + 8]);
    u64::from_be_bytes(bytes)
}
