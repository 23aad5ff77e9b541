//! Pure interpreters for materialized MP4 leaf boxes.
//!
//! Each function takes a box payload (header excluded) and the absolute
//! offset of that payload, used only for error reporting.

use super::atoms::{be_u16, be_u32, be_u64, find_box, BoxIter, BoxType, HandlerType};
use crate::codec;
use crate::result::Dimensions;
use crate::track::{normalize_degrees, MediaType, SampleDescription, TimeToSample};
use crate::{Error, Result};

/// Fields of `mvhd`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MovieHeader {
    pub timescale: u32,
    /// Zero when unknown.
    pub duration: u64,
}

impl MovieHeader {
    pub fn duration_seconds(&self) -> Option<f64> {
        if self.timescale == 0 || self.duration == 0 {
            return None;
        }
        Some(self.duration as f64 / self.timescale as f64)
    }
}

/// Fields of `tkhd`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackHeader {
    pub track_id: u32,
    /// In movie timescale units.
    pub duration: u64,
    pub dimensions: Dimensions,
    pub rotation_degrees: u32,
}

/// Fields of `mdhd`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaHeader {
    pub timescale: u32,
    pub duration: u64,
    pub language: Option<String>,
}

fn require(data: &[u8], len: usize, offset: u64, what: &str) -> Result<()> {
    if data.len() < len {
        return Err(Error::malformed(
            offset,
            format!("{what} payload is {} bytes, need {len}", data.len()),
        ));
    }
    Ok(())
}

/// Duration fields of all ones mean "unknown".
fn known_duration(value: u64, version: u8) -> u64 {
    let unknown = if version == 1 { u64::MAX } else { u32::MAX as u64 };
    if value == unknown {
        0
    } else {
        value
    }
}

/// Parse `mvhd`.
pub fn movie_header(data: &[u8], offset: u64) -> Result<MovieHeader> {
    require(data, 4, offset, "mvhd")?;
    let version = data[0];
    let (timescale, duration) = if version == 1 {
        require(data, 32, offset, "mvhd")?;
        (be_u32(data, 20), be_u64(data, 24))
    } else {
        require(data, 20, offset, "mvhd")?;
        (be_u32(data, 12), be_u32(data, 16) as u64)
    };
    Ok(MovieHeader {
        timescale,
        duration: known_duration(duration, version),
    })
}

/// Parse `tkhd`.
pub fn track_header(data: &[u8], offset: u64) -> Result<TrackHeader> {
    require(data, 4, offset, "tkhd")?;
    let version = data[0];
    let (track_id, duration, matrix_at, size_at) = if version == 1 {
        require(data, 96, offset, "tkhd")?;
        (be_u32(data, 20), be_u64(data, 28), 52, 88)
    } else {
        require(data, 84, offset, "tkhd")?;
        (be_u32(data, 12), be_u32(data, 20) as u64, 40, 76)
    };

    // 16.16 fixed point; only the integer part is meaningful.
    let width = be_u32(data, size_at) >> 16;
    let height = be_u32(data, size_at + 4) >> 16;

    Ok(TrackHeader {
        track_id,
        duration: known_duration(duration, version),
        dimensions: Dimensions::new(width, height),
        rotation_degrees: matrix_rotation(&data[matrix_at..matrix_at + 36]),
    })
}

/// Rotation encoded by a transformation matrix, in degrees `[0, 360)`.
///
/// The matrix is `{a, b, u, c, d, v, x, y, w}`; `a..d` are 16.16 fixed point.
pub fn matrix_rotation(matrix: &[u8]) -> u32 {
    let a = be_u32(matrix, 0) as i32 as f64 / 65536.0;
    let b = be_u32(matrix, 4) as i32 as f64 / 65536.0;
    if a == 0.0 && b == 0.0 {
        return 0;
    }
    normalize_degrees(b.atan2(a).to_degrees())
}

/// Parse `mdhd`.
pub fn media_header(data: &[u8], offset: u64) -> Result<MediaHeader> {
    require(data, 4, offset, "mdhd")?;
    let version = data[0];
    let (timescale, duration, language_at) = if version == 1 {
        require(data, 34, offset, "mdhd")?;
        (be_u32(data, 20), be_u64(data, 24), 32)
    } else {
        require(data, 22, offset, "mdhd")?;
        (be_u32(data, 12), be_u32(data, 16) as u64, 20)
    };
    Ok(MediaHeader {
        timescale,
        duration: known_duration(duration, version),
        language: packed_language(be_u16(data, language_at)),
    })
}

/// ISO 639-2/T code packed as three 5-bit letters.
fn packed_language(packed: u16) -> Option<String> {
    let letters: String = [10u16, 5, 0]
        .iter()
        .map(|shift| (((packed >> shift) & 0x1F) as u8 + 0x60) as char)
        .collect();
    letters
        .chars()
        .all(|c| c.is_ascii_lowercase())
        .then_some(letters)
}

/// Parse the handler type out of `hdlr`.
pub fn handler(data: &[u8], offset: u64) -> Result<HandlerType> {
    require(data, 12, offset, "hdlr")?;
    Ok(HandlerType::from_bytes([data[8], data[9], data[10], data[11]]))
}

/// Parse `stts`.
pub fn time_to_sample(data: &[u8], offset: u64) -> Result<Vec<TimeToSample>> {
    require(data, 8, offset, "stts")?;
    let count = be_u32(data, 4) as usize;
    let needed = count
        .checked_mul(8)
        .and_then(|n| n.checked_add(8))
        .ok_or_else(|| Error::malformed(offset, "stts entry count overflows"))?;
    require(data, needed, offset, "stts")?;

    Ok((0..count)
        .map(|i| {
            let at = 8 + i * 8;
            TimeToSample {
                count: be_u32(data, at),
                delta: be_u32(data, at + 4),
            }
        })
        .collect())
}

/// Parse every entry of `stsd`.
///
/// The layout of each entry depends on the track's media type, so audio
/// entries in a video track (and the reverse) are only named, not decoded.
pub fn sample_descriptions(
    data: &[u8],
    offset: u64,
    media_type: MediaType,
) -> Result<Vec<SampleDescription>> {
    require(data, 8, offset, "stsd")?;
    let declared = be_u32(data, 4) as usize;

    let mut entries = Vec::new();
    let mut entry_offset = offset + 8;
    for entry in BoxIter::new(&data[8..], offset + 8) {
        let (format, payload) = entry?;
        entries.push(sample_entry(format, payload, entry_offset + 8, media_type)?);
        entry_offset += payload.len() as u64 + 8;
        if entries.len() == declared {
            break;
        }
    }
    Ok(entries)
}

fn sample_entry(
    format: BoxType,
    payload: &[u8],
    offset: u64,
    media_type: MediaType,
) -> Result<SampleDescription> {
    let mut description = SampleDescription {
        format: format.to_string(),
        ..Default::default()
    };

    match media_type {
        MediaType::Video => {
            // SampleEntry (8) + VisualSampleEntry fields up to depth/pre_defined.
            require(payload, 78, offset, "visual sample entry")?;
            description.width = Some(be_u16(payload, 24) as u32);
            description.height = Some(be_u16(payload, 26) as u32);
            let children = &payload[78..];
            let base = offset + 78;

            let format = original_format(format, children, base)?;
            let config_type = match &format.0 {
                b"avc1" | b"avc3" => Some(BoxType::AVCC),
                b"hvc1" | b"hev1" => Some(BoxType::HVCC),
                b"av01" => Some(BoxType::AV1C),
                b"vp08" | b"vp09" => Some(BoxType::VPCC),
                _ => None,
            };
            let config = match config_type {
                Some(config_type) => find_box(children, base, config_type)?,
                None => None,
            };
            description.format = format.to_string();
            description.codec_string = Some(codec::sample_entry(format.as_str(), config));
        }
        MediaType::Audio => {
            require(payload, 28, offset, "audio sample entry")?;
            let version = be_u16(payload, 8);
            let (channels, sample_rate, children_at) = match version {
                2 => {
                    require(payload, 64, offset, "audio sample entry v2")?;
                    let rate = f64::from_bits(be_u64(payload, 32));
                    (be_u32(payload, 40), rate.round() as u32, 64)
                }
                1 => (
                    be_u16(payload, 16) as u32,
                    be_u32(payload, 24) >> 16,
                    44,
                ),
                _ => (
                    be_u16(payload, 16) as u32,
                    be_u32(payload, 24) >> 16,
                    28,
                ),
            };
            description.channels = Some(channels);
            description.sample_rate = Some(sample_rate);

            let children = payload.get(children_at..).unwrap_or(&[]);
            let base = offset + children_at as u64;
            let format = original_format(format, children, base)?;
            let config = if &format.0 == b"mp4a" {
                esds(children, base)?
            } else {
                None
            };
            description.format = format.to_string();
            description.codec_string = Some(codec::sample_entry(format.as_str(), config));
        }
        MediaType::Other => {}
    }

    Ok(description)
}

/// Resolve protected (`encv`/`enca`) entries to their original format.
fn original_format(format: BoxType, children: &[u8], base: u64) -> Result<BoxType> {
    if &format.0 != b"encv" && &format.0 != b"enca" {
        return Ok(format);
    }
    let Some(sinf) = find_box(children, base, BoxType::SINF)? else {
        return Ok(format);
    };
    match find_box(sinf, base, BoxType::FRMA)? {
        Some(frma) if frma.len() >= 4 => Ok(BoxType([frma[0], frma[1], frma[2], frma[3]])),
        _ => Ok(format),
    }
}

/// `esds` of an audio entry, either directly or inside a QuickTime `wave`.
fn esds(children: &[u8], base: u64) -> Result<Option<&[u8]>> {
    if let Some(esds) = find_box(children, base, BoxType::ESDS)? {
        return Ok(Some(esds));
    }
    match find_box(children, base, BoxType::WAVE)? {
        Some(wave) => find_box(wave, base, BoxType::ESDS),
        None => Ok(None),
    }
}
