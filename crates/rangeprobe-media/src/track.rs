//! Format-neutral track descriptors.

use crate::result::Dimensions;
use serde::Serialize;

/// Kind of media carried by a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Video,
    Audio,
    Other,
}

/// One entry of a time-to-sample table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeToSample {
    pub count: u32,
    pub delta: u32,
}

/// Sample timing information for a track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleTiming {
    /// ISO-BMFF `stts` run-length table, in track timescale units.
    TimeToSample(Vec<TimeToSample>),
    /// Matroska `DefaultDuration`.
    FrameDuration { nanos: u64 },
}

/// First-level description of the samples in a track.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SampleDescription {
    /// Sample entry fourcc or Matroska codec id.
    pub format: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub codec_string: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channels: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,
}

/// Everything the interpreters learned about one track.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackDescriptor {
    pub track_id: u64,
    pub media_type: MediaType,
    /// Units per second for `duration` and sample deltas.
    pub timescale: u64,
    /// Track duration in `timescale` units.
    pub duration: u64,
    /// Stored dimensions, before any rotation policy is applied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<Dimensions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotation_degrees: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub sample_descriptions: Vec<SampleDescription>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timing: Option<SampleTiming>,
}

impl TrackDescriptor {
    pub fn new(track_id: u64, media_type: MediaType) -> Self {
        Self {
            track_id,
            media_type,
            timescale: 0,
            duration: 0,
            dimensions: None,
            rotation_degrees: None,
            language: None,
            sample_descriptions: Vec::new(),
            timing: None,
        }
    }

    /// Track duration in seconds, if the timescale is known.
    pub fn duration_seconds(&self) -> Option<f64> {
        if self.timescale == 0 || self.duration == 0 {
            return None;
        }
        Some(self.duration as f64 / self.timescale as f64)
    }

    /// Codec string of the first sample description.
    pub fn codec(&self) -> Option<&str> {
        self.sample_descriptions
            .first()
            .map(|d| d.codec_string.as_deref().unwrap_or(&d.format))
    }

    /// Stored dimensions, falling back to the coded size of the first
    /// sample description.
    pub fn coded_dimensions(&self) -> Option<Dimensions> {
        self.dimensions.filter(|d| d.width > 0 && d.height > 0).or_else(|| {
            let first = self.sample_descriptions.first()?;
            match (first.width, first.height) {
                (Some(w), Some(h)) if w > 0 && h > 0 => Some(Dimensions::new(w, h)),
                _ => None,
            }
        })
    }

    /// Frames per second.
    ///
    /// For `stts` timing this is `sample_count / duration_seconds`, where the
    /// duration is the media header duration or, when that is zero, the sum
    /// of the table's deltas.
    pub fn fps(&self) -> Option<f64> {
        let fps = match self.timing.as_ref()? {
            SampleTiming::TimeToSample(entries) => {
                if self.timescale == 0 {
                    return None;
                }
                let samples: u64 = entries.iter().map(|e| e.count as u64).sum();
                let ticks = if self.duration > 0 {
                    self.duration
                } else {
                    entries
                        .iter()
                        .map(|e| e.count as u64 * e.delta as u64)
                        .sum()
                };
                if samples == 0 || ticks == 0 {
                    return None;
                }
                samples as f64 * self.timescale as f64 / ticks as f64
            }
            SampleTiming::FrameDuration { nanos } => {
                if *nanos == 0 {
                    return None;
                }
                1e9 / *nanos as f64
            }
        };
        Some(normalize_rate(fps))
    }
}

/// Snap to an integer when within 0.01 of one, otherwise keep 3 decimals.
pub fn normalize_rate(rate: f64) -> f64 {
    let nearest = rate.round();
    if (rate - nearest).abs() < 0.01 {
        nearest
    } else {
        round_to_millis(rate)
    }
}

/// Round to 3 decimal places.
pub fn round_to_millis(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Normalize an angle in degrees to `[0, 360)` and round to an integer.
pub fn normalize_degrees(degrees: f64) -> u32 {
    let rounded = degrees.round().rem_euclid(360.0);
    rounded as u32 % 360
}
