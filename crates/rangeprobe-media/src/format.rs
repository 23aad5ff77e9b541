//! Container format detection from the first bytes of a source.

use crate::cursor::RangeCursor;
use crate::source::ByteSource;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Number of prefix bytes inspected for classification.
pub const PREFIX_LEN: u64 = 32;

/// Supported container grammars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Container {
    /// ISO base media file format (.mp4, .m4v, .m4a, .mov, .3gp)
    IsoBmff,
    /// Matroska (.mkv, .webm)
    Matroska,
}

impl Container {
    pub fn as_str(&self) -> &'static str {
        match self {
            Container::IsoBmff => "mp4",
            Container::Matroska => "matroska",
        }
    }
}

impl std::fmt::Display for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Container::IsoBmff => write!(f, "MP4"),
            Container::Matroska => write!(f, "Matroska"),
        }
    }
}

/// EBML magic shared by Matroska and WebM.
const EBML_MAGIC: [u8; 4] = [0x1A, 0x45, 0xDF, 0xA3];

/// Box types accepted as the first box of an ISO-BMFF file.
const LEADING_BOXES: [&[u8; 4]; 8] = [
    b"ftyp", b"styp", b"moov", b"mdat", b"free", b"skip", b"wide", b"pnot",
];

/// Classify a prefix.
pub fn detect(prefix: &[u8]) -> Result<Container> {
    if prefix.len() >= 4 && prefix[0..4] == EBML_MAGIC {
        return Ok(Container::Matroska);
    }

    if prefix.len() >= 8 && LEADING_BOXES.iter().any(|b| &prefix[4..8] == *b) {
        return Ok(Container::IsoBmff);
    }

    match recognize_unsupported(prefix) {
        Some(name) => Err(Error::unsupported(format!(
            "{name} is not a supported container"
        ))),
        None => Err(Error::unsupported(format!(
            "unrecognized prefix {}",
            hex_prefix(prefix, 8)
        ))),
    }
}

/// Read the prefix through the cursor and classify it.
///
/// The cursor position is left untouched.
pub async fn dispatch<S: ByteSource>(cursor: &mut RangeCursor<S>) -> Result<Container> {
    let prefix = cursor.peek_up_to(PREFIX_LEN).await?;
    if prefix.is_empty() {
        return Err(Error::unsupported("source is empty"));
    }
    detect(&prefix)
}

/// Name well-known formats we have no grammar for.
fn recognize_unsupported(prefix: &[u8]) -> Option<&'static str> {
    if prefix.len() >= 12 && &prefix[0..4] == b"RIFF" {
        return Some(match &prefix[8..12] {
            b"WAVE" => "WAVE",
            b"AVI " => "AVI",
            _ => "RIFF",
        });
    }
    if prefix.starts_with(b"OggS") {
        return Some("Ogg");
    }
    if prefix.starts_with(b"fLaC") {
        return Some("FLAC");
    }
    if prefix.starts_with(b"ID3") || (prefix.len() >= 2 && prefix[0] == 0xFF && prefix[1] & 0xE0 == 0xE0) {
        return Some("MP3");
    }
    if prefix.first() == Some(&0x47) {
        return Some("MPEG-TS");
    }
    None
}

fn hex_prefix(prefix: &[u8], n: usize) -> String {
    prefix
        .iter()
        .take(n)
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;
    use assert_matches::assert_matches;

    #[test]
    fn test_detect_mp4_ftyp() {
        let prefix = [
            0x00, 0x00, 0x00, 0x14, b'f', b't', b'y', b'p', b'i', b's', b'o', b'm',
        ];
        assert_eq!(detect(&prefix).unwrap(), Container::IsoBmff);
    }

    #[test]
    fn test_detect_mov_leading_wide() {
        let prefix = [0x00, 0x00, 0x00, 0x08, b'w', b'i', b'd', b'e'];
        assert_eq!(detect(&prefix).unwrap(), Container::IsoBmff);
    }

    #[test]
    fn test_detect_matroska() {
        let prefix = [0x1A, 0x45, 0xDF, 0xA3, 0x93, 0x42, 0x82, 0x88];
        assert_eq!(detect(&prefix).unwrap(), Container::Matroska);
    }

    #[test]
    fn test_detect_known_unsupported() {
        assert_matches!(
            detect(b"RIFF\x00\x00\x00\x00WAVEfmt "),
            Err(Error::UnsupportedFormat(msg)) if msg.contains("WAVE")
        );
        assert_matches!(
            detect(b"OggS\x00\x02"),
            Err(Error::UnsupportedFormat(msg)) if msg.contains("Ogg")
        );
        assert_matches!(
            detect(&[0x47, 0x40, 0x00, 0x10]),
            Err(Error::UnsupportedFormat(msg)) if msg.contains("MPEG-TS")
        );
    }

    #[test]
    fn test_detect_garbage() {
        assert_matches!(
            detect(b"hello world, not media"),
            Err(Error::UnsupportedFormat(msg)) if msg.contains("68 65 6c 6c")
        );
        assert_matches!(detect(&[]), Err(Error::UnsupportedFormat(_)));
    }

    #[tokio::test]
    async fn test_dispatch_leaves_position() {
        let mut data = vec![0x00, 0x00, 0x00, 0x10];
        data.extend_from_slice(b"ftypmp42");
        data.extend_from_slice(&[0; 4]);
        let mut cursor = RangeCursor::new(MemorySource::new(data), Some(16), 1024);

        assert_eq!(dispatch(&mut cursor).await.unwrap(), Container::IsoBmff);
        assert_eq!(cursor.position(), 0);
    }

    #[tokio::test]
    async fn test_dispatch_empty_source() {
        let mut cursor = RangeCursor::new(MemorySource::new(Vec::new()), Some(0), 1024);
        assert_matches!(
            dispatch(&mut cursor).await,
            Err(Error::UnsupportedFormat(_))
        );
    }
}
