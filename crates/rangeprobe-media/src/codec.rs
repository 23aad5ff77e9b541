//! Codec identifier strings in RFC 6381 style.
//!
//! Every function here is a pure function over already materialized
//! configuration records (`avcC`, `hvcC`, `av1C`, `vpcC`, `esds`, Matroska
//! `CodecPrivate`). Records that are too short yield `None` and callers fall
//! back to the bare sample entry format.

use std::fmt::Write as _;

/// `avc1.PPCCLL` from an `AVCDecoderConfigurationRecord`.
pub fn avc(prefix: &str, avcc: &[u8]) -> Option<String> {
    if avcc.len() < 4 {
        return None;
    }
    Some(format!(
        "{prefix}.{:02x}{:02x}{:02x}",
        avcc[1], avcc[2], avcc[3]
    ))
}

/// `hvc1.<space><profile>.<compat>.<tier><level>.<constraints>` from an
/// `HEVCDecoderConfigurationRecord`.
pub fn hevc(prefix: &str, hvcc: &[u8]) -> Option<String> {
    if hvcc.len() < 13 {
        return None;
    }

    let profile_space = match hvcc[1] >> 6 {
        0 => "",
        1 => "A",
        2 => "B",
        _ => "C",
    };
    let tier = if hvcc[1] & 0x20 != 0 { 'H' } else { 'L' };
    let profile_idc = hvcc[1] & 0x1F;
    let compat = u32::from_be_bytes([hvcc[2], hvcc[3], hvcc[4], hvcc[5]]).reverse_bits();
    let level = hvcc[12];

    let mut out = format!("{prefix}.{profile_space}{profile_idc}.{compat:X}.{tier}{level}");

    // Constraint flags, trailing zero bytes dropped.
    let constraints = &hvcc[6..12];
    let used = constraints
        .iter()
        .rposition(|b| *b != 0)
        .map_or(0, |last| last + 1);
    for byte in &constraints[..used] {
        let _ = write!(out, ".{byte:02X}");
    }
    Some(out)
}

/// `av01.P.LLT.DD` from an `AV1CodecConfigurationRecord`.
pub fn av1(av1c: &[u8]) -> Option<String> {
    if av1c.len() < 3 {
        return None;
    }
    let profile = av1c[1] >> 5;
    let level = av1c[1] & 0x1F;
    let tier = if av1c[2] & 0x80 != 0 { 'H' } else { 'M' };
    let high_bitdepth = av1c[2] & 0x40 != 0;
    let twelve_bit = av1c[2] & 0x20 != 0;
    let bit_depth = match (high_bitdepth, twelve_bit) {
        (true, true) if profile == 2 => 12,
        (true, _) => 10,
        _ => 8,
    };
    Some(format!("av01.{profile}.{level:02}{tier}.{bit_depth:02}"))
}

/// `vp09.PP.LL.DD` from a `vpcC` full box payload.
pub fn vp9(prefix: &str, vpcc: &[u8]) -> Option<String> {
    // version + flags precede the record
    if vpcc.len() < 7 {
        return None;
    }
    let profile = vpcc[4];
    let level = vpcc[5];
    let bit_depth = vpcc[6] >> 4;
    Some(format!("{prefix}.{profile:02}.{level:02}.{bit_depth:02}"))
}

/// `mp4a.40.N` (or `mp4a.XX` for non-AAC object types) from an `esds`
/// full box payload.
pub fn mp4a_from_esds(esds: &[u8]) -> Option<String> {
    let config = DecoderConfig::parse(esds.get(4..)?)?;
    Some(mp4a(config.object_type_indication, config.specific_info))
}

/// `mp4a.40.N` from a bare `AudioSpecificConfig`.
pub fn mp4a_from_asc(asc: &[u8]) -> Option<String> {
    audio_object_type(asc).map(|aot| format!("mp4a.40.{aot}"))
}

fn mp4a(object_type_indication: u8, specific_info: Option<&[u8]>) -> String {
    match object_type_indication {
        0x40 | 0x66 | 0x67 | 0x68 => match specific_info.and_then(audio_object_type) {
            Some(aot) => format!("mp4a.40.{aot}"),
            None => "mp4a.40".to_string(),
        },
        0x69 | 0x6B => "mp3".to_string(),
        oti => format!("mp4a.{oti:02X}"),
    }
}

/// Audio object type from the first bits of an `AudioSpecificConfig`.
pub fn audio_object_type(asc: &[u8]) -> Option<u8> {
    let first = *asc.first()?;
    let aot = first >> 3;
    if aot != 31 {
        return Some(aot);
    }
    // Escape: six more bits follow.
    let second = *asc.get(1)?;
    Some(32 + (((first & 0x07) << 3) | (second >> 5)))
}

/// Fields of interest from an MPEG-4 `ES_Descriptor`.
struct DecoderConfig<'a> {
    object_type_indication: u8,
    specific_info: Option<&'a [u8]>,
}

impl<'a> DecoderConfig<'a> {
    const ES_DESCRIPTOR: u8 = 0x03;
    const DECODER_CONFIG: u8 = 0x04;
    const DECODER_SPECIFIC_INFO: u8 = 0x05;

    fn parse(data: &'a [u8]) -> Option<Self> {
        let (tag, es) = descriptor(data)?;
        if tag != Self::ES_DESCRIPTOR || es.len() < 3 {
            return None;
        }

        let flags = es[2];
        let mut pos = 3;
        if flags & 0x80 != 0 {
            pos += 2;
        }
        if flags & 0x40 != 0 {
            pos += 1 + *es.get(pos)? as usize;
        }
        if flags & 0x20 != 0 {
            pos += 2;
        }

        let (tag, config) = descriptor(es.get(pos..)?)?;
        if tag != Self::DECODER_CONFIG || config.is_empty() {
            return None;
        }

        let specific_info = config
            .get(13..)
            .and_then(descriptor)
            .filter(|(tag, _)| *tag == Self::DECODER_SPECIFIC_INFO)
            .map(|(_, body)| body);

        Some(Self {
            object_type_indication: config[0],
            specific_info,
        })
    }
}

/// Split one tag + expandable-length descriptor off the front of `data`.
fn descriptor(data: &[u8]) -> Option<(u8, &[u8])> {
    let tag = *data.first()?;
    let mut len = 0usize;
    let mut pos = 1;
    for _ in 0..4 {
        let byte = *data.get(pos)?;
        pos += 1;
        len = (len << 7) | (byte & 0x7F) as usize;
        if byte & 0x80 == 0 {
            break;
        }
    }
    let end = (pos + len).min(data.len());
    Some((tag, &data[pos..end]))
}

/// Codec string for an ISO-BMFF sample entry.
///
/// `config` is the payload of the configuration child box matching the
/// format (`avcC` for `avc1`, `esds` for `mp4a`, ...), when present.
pub fn sample_entry(format: &str, config: Option<&[u8]>) -> String {
    let derived = config.and_then(|config| match format {
        "avc1" | "avc3" => avc(format, config),
        "hvc1" | "hev1" => hevc(format, config),
        "av01" => av1(config),
        "vp08" | "vp09" => vp9(format, config),
        "mp4a" => mp4a_from_esds(config),
        _ => None,
    });

    derived.unwrap_or_else(|| match format {
        "Opus" => "opus".to_string(),
        "fLaC" => "flac".to_string(),
        ".mp3" => "mp3".to_string(),
        other => other.trim().to_string(),
    })
}

/// Codec string for a Matroska `CodecID`, refined by `CodecPrivate` when it
/// carries a configuration record.
pub fn matroska(codec_id: &str, private: Option<&[u8]>) -> String {
    let derived = private.and_then(|private| match codec_id {
        "V_MPEG4/ISO/AVC" => avc("avc1", private),
        "V_MPEGH/ISO/HEVC" => hevc("hvc1", private),
        "V_AV1" => av1(private),
        id if id.starts_with("A_AAC") => mp4a_from_asc(private),
        _ => None,
    });
    if let Some(codec) = derived {
        return codec;
    }

    match codec_id {
        "V_MPEG4/ISO/AVC" => "avc1".to_string(),
        "V_MPEGH/ISO/HEVC" => "hvc1".to_string(),
        "V_AV1" => "av01".to_string(),
        "V_VP8" => "vp8".to_string(),
        "V_VP9" => "vp9".to_string(),
        "V_THEORA" => "theora".to_string(),
        "V_MPEG1" => "mpeg1".to_string(),
        "V_MPEG2" => "mpeg2".to_string(),
        "A_AAC/MPEG2/LC" | "A_AAC/MPEG4/LC" => "mp4a.40.2".to_string(),
        "A_AAC/MPEG4/LC/SBR" => "mp4a.40.5".to_string(),
        "A_AAC" => "mp4a.40".to_string(),
        "A_OPUS" => "opus".to_string(),
        "A_VORBIS" => "vorbis".to_string(),
        "A_FLAC" => "flac".to_string(),
        "A_AC3" => "ac-3".to_string(),
        "A_EAC3" => "ec-3".to_string(),
        "A_MPEG/L3" => "mp3".to_string(),
        "A_MPEG/L2" => "mp2".to_string(),
        "A_DTS" => "dts".to_string(),
        "A_TRUEHD" => "truehd".to_string(),
        other => other
            .strip_prefix("V_")
            .or_else(|| other.strip_prefix("A_"))
            .or_else(|| other.strip_prefix("S_"))
            .unwrap_or(other)
            .to_ascii_lowercase(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_avc() {
        let avcc = [0x01, 0x64, 0x00, 0x1F, 0xFF];
        assert_eq!(avc("avc1", &avcc).unwrap(), "avc1.64001f");
        assert_eq!(avc("avc1", &avcc[..2]), None);
    }

    #[test]
    fn test_hevc_main_profile() {
        let mut hvcc = [0u8; 23];
        hvcc[0] = 1;
        hvcc[1] = 0x01; // space 0, tier main, profile 1
        hvcc[2..6].copy_from_slice(&[0x60, 0x00, 0x00, 0x00]);
        hvcc[6] = 0xB0;
        hvcc[12] = 93;
        assert_eq!(hevc("hvc1", &hvcc).unwrap(), "hvc1.1.6.L93.B0");
    }

    #[test]
    fn test_hevc_high_tier_main10() {
        let mut hvcc = [0u8; 23];
        hvcc[1] = 0x22; // tier high, profile 2
        hvcc[2..6].copy_from_slice(&[0x20, 0x00, 0x00, 0x00]);
        hvcc[12] = 150;
        assert_eq!(hevc("hev1", &hvcc).unwrap(), "hev1.2.4.H150");
    }

    #[test]
    fn test_av1() {
        // profile 0, level 8, main tier, 10-bit
        let av1c = [0x81, 0x08, 0x40, 0x00];
        assert_eq!(av1(&av1c).unwrap(), "av01.0.08M.10");
    }

    #[test]
    fn test_vp9() {
        let vpcc = [1, 0, 0, 0, 0, 31, 0x80, 0x01];
        assert_eq!(vp9("vp09", &vpcc).unwrap(), "vp09.00.31.08");
    }

    #[test]
    fn test_audio_object_type_escape() {
        assert_eq!(audio_object_type(&[0x12, 0x10]), Some(2));
        // 31 escape followed by 6 bits = 2 -> 34
        assert_eq!(audio_object_type(&[0xF8, 0x40]), Some(34));
        assert_eq!(audio_object_type(&[]), None);
    }

    #[test]
    fn test_mp4a_from_esds() {
        let esds = [
            0x00, 0x00, 0x00, 0x00, // version + flags
            0x03, 0x19, // ES_Descriptor
            0x00, 0x01, 0x00, // ES_ID, flags
            0x04, 0x11, // DecoderConfigDescriptor
            0x40, 0x15, 0x00, 0x00, 0x00, 0x00, 0x01, 0xF4, 0x00, 0x00, 0x01, 0xF4, 0x00,
            0x05, 0x02, 0x12, 0x10, // AudioSpecificConfig: AAC LC
            0x06, 0x01, 0x02,
        ];
        assert_eq!(mp4a_from_esds(&esds).unwrap(), "mp4a.40.2");
    }

    #[test]
    fn test_mp4a_long_form_length() {
        let esds = [
            0x00, 0x00, 0x00, 0x00,
            0x03, 0x80, 0x80, 0x80, 0x15,
            0x00, 0x01, 0x00,
            0x04, 0x80, 0x80, 0x80, 0x0D,
            0x6B, 0x15, 0x00, 0x00, 0x00, 0x00, 0x01, 0xF4, 0x00, 0x00, 0x01, 0xF4, 0x00,
        ];
        assert_eq!(mp4a_from_esds(&esds).unwrap(), "mp3");
    }

    #[test]
    fn test_sample_entry_fallbacks() {
        assert_eq!(sample_entry("Opus", None), "opus");
        assert_eq!(sample_entry("ac-3", None), "ac-3");
        assert_eq!(sample_entry("avc1", Some(&[1u8][..])), "avc1");
        assert_eq!(sample_entry("avc1", Some(&[1u8, 0x42, 0xC0, 0x1E][..])), "avc1.42c01e");
    }

    #[test]
    fn test_matroska() {
        assert_eq!(matroska("V_VP9", None), "vp9");
        assert_eq!(matroska("A_OPUS", Some(&b"OpusHead"[..])), "opus");
        assert_eq!(matroska("A_AAC", Some(&[0x12u8, 0x10][..])), "mp4a.40.2");
        assert_eq!(
            matroska("V_MPEG4/ISO/AVC", Some(&[1u8, 0x4D, 0x40, 0x28][..])),
            "avc1.4d4028"
        );
        assert_eq!(matroska("S_TEXT/UTF8", None), "text/utf8");
    }
}
