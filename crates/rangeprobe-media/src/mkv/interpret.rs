//! Interpreters for materialized Matroska master elements.

use super::ebml::{self, Element, ElementIter};
use crate::codec;
use crate::result::Dimensions;
use crate::track::{normalize_degrees, MediaType, SampleDescription, SampleTiming, TrackDescriptor};
use crate::{Error, Result};

/// Default `TimecodeScale`: one tick per millisecond.
pub const DEFAULT_TIMECODE_SCALE: u64 = 1_000_000;

/// Fields of the segment `Info` element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentInfo {
    /// Nanoseconds per tick.
    pub timecode_scale: u64,
    /// In ticks.
    pub duration: Option<f64>,
}

impl SegmentInfo {
    pub fn duration_seconds(&self) -> Option<f64> {
        self.duration
            .map(|ticks| ticks * self.timecode_scale as f64 / 1e9)
    }
}

/// `DocType` of the EBML header, `None` when absent.
pub fn doc_type(data: &[u8], offset: u64) -> Result<Option<String>> {
    for element in ElementIter::new(data, offset) {
        let element = element?;
        if element.id == ebml::DOC_TYPE {
            return Ok(Some(ebml::read_string(&element)));
        }
    }
    Ok(None)
}

/// Parse the payload of `Info`.
pub fn segment_info(data: &[u8], offset: u64) -> Result<SegmentInfo> {
    let mut info = SegmentInfo {
        timecode_scale: DEFAULT_TIMECODE_SCALE,
        duration: None,
    };
    for element in ElementIter::new(data, offset) {
        let element = element?;
        match element.id {
            ebml::TIMECODE_SCALE => {
                let scale = ebml::read_uint(&element)?;
                if scale > 0 {
                    info.timecode_scale = scale;
                }
            }
            ebml::DURATION => info.duration = Some(ebml::read_float(&element)?),
            _ => {}
        }
    }
    Ok(info)
}

/// Parse the payload of one `TrackEntry`.
///
/// Matroska tracks carry no duration of their own; `timescale` is set to
/// nanoseconds so a `DefaultDuration` can be read in track units.
pub fn track_entry(data: &[u8], offset: u64) -> Result<TrackDescriptor> {
    let mut track = TrackDescriptor::new(0, MediaType::Other);
    track.timescale = 1_000_000_000;

    let mut codec_id = None;
    let mut codec_private = None;
    let mut description = SampleDescription::default();

    for element in ElementIter::new(data, offset) {
        let element = element?;
        match element.id {
            ebml::TRACK_NUMBER => track.track_id = ebml::read_uint(&element)?,
            ebml::TRACK_TYPE => {
                track.media_type = match ebml::read_uint(&element)? {
                    1 => MediaType::Video,
                    2 => MediaType::Audio,
                    _ => MediaType::Other,
                }
            }
            ebml::CODEC_ID => codec_id = Some(ebml::read_string(&element)),
            ebml::CODEC_PRIVATE => codec_private = Some(element.data),
            ebml::DEFAULT_DURATION => {
                let nanos = ebml::read_uint(&element)?;
                if nanos > 0 {
                    track.timing = Some(SampleTiming::FrameDuration { nanos });
                }
            }
            ebml::LANGUAGE => track.language = Some(ebml::read_string(&element)),
            ebml::VIDEO => {
                let video = video_settings(&element)?;
                description.width = video.pixel.map(|d| d.width);
                description.height = video.pixel.map(|d| d.height);
                track.dimensions = video.display.or(video.pixel);
                track.rotation_degrees = Some(video.roll);
            }
            ebml::AUDIO => {
                let (sample_rate, channels) = audio_settings(&element)?;
                description.sample_rate = sample_rate;
                description.channels = channels;
            }
            _ => {}
        }
    }

    if let Some(codec_id) = codec_id {
        description.codec_string = Some(codec::matroska(&codec_id, codec_private));
        description.format = codec_id;
        track.sample_descriptions.push(description);
    }
    Ok(track)
}

struct VideoSettings {
    pixel: Option<Dimensions>,
    display: Option<Dimensions>,
    roll: u32,
}

/// Unsigned integer element that must fit in 32 bits.
fn read_u32(element: &Element<'_>) -> Result<u32> {
    let value = ebml::read_uint(element)?;
    u32::try_from(value).map_err(|_| {
        Error::malformed(
            element.offset,
            format!("element 0x{:X} value {value} exceeds 32 bits", element.id),
        )
    })
}

fn video_settings(video: &Element<'_>) -> Result<VideoSettings> {
    let (mut pixel_width, mut pixel_height) = (0, 0);
    let (mut display_width, mut display_height) = (0, 0);
    let mut display_unit = 0;
    let mut roll = 0.0;

    for element in ElementIter::new(video.data, video.offset) {
        let element = element?;
        match element.id {
            ebml::PIXEL_WIDTH => pixel_width = read_u32(&element)?,
            ebml::PIXEL_HEIGHT => pixel_height = read_u32(&element)?,
            ebml::DISPLAY_WIDTH => display_width = read_u32(&element)?,
            ebml::DISPLAY_HEIGHT => display_height = read_u32(&element)?,
            ebml::DISPLAY_UNIT => display_unit = ebml::read_uint(&element)?,
            ebml::PROJECTION => {
                for child in ElementIter::new(element.data, element.offset) {
                    let child = child?;
                    if child.id == ebml::PROJECTION_POSE_ROLL {
                        roll = ebml::read_float(&child)?;
                    }
                }
            }
            _ => {}
        }
    }

    let dims = |w: u32, h: u32| (w > 0 && h > 0).then(|| Dimensions::new(w, h));
    Ok(VideoSettings {
        pixel: dims(pixel_width, pixel_height),
        // Display sizes in centimeters, inches or aspect-ratio units are
        // not pixel counts.
        display: if display_unit == 0 {
            dims(display_width, display_height)
        } else {
            None
        },
        // PoseRoll is counter-clockwise.
        roll: normalize_degrees(-roll),
    })
}

fn audio_settings(audio: &Element<'_>) -> Result<(Option<u32>, Option<u32>)> {
    let mut sample_rate = None;
    let mut channels = None;
    for element in ElementIter::new(audio.data, audio.offset) {
        let element = element?;
        match element.id {
            ebml::SAMPLING_FREQUENCY => {
                sample_rate = Some(ebml::read_float(&element)?.round() as u32)
            }
            ebml::CHANNELS => channels = Some(read_u32(&element)?),
            _ => {}
        }
    }
    Ok((sample_rate, channels))
}
