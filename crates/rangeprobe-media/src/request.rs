//! Requested fields and parse options.

use crate::cursor::DEFAULT_BLOCK_SIZE;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Largest leaf payload materialized by default (16 MiB).
pub const DEFAULT_MAX_LEAF_SIZE: u64 = 16 * 1024 * 1024;

/// A field a caller can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldName {
    DurationInSeconds,
    Dimensions,
    Fps,
    Rotation,
    VideoCodec,
    AudioCodec,
    Container,
    Tracks,
    Structure,
}

impl FieldName {
    pub const ALL: [FieldName; 9] = [
        FieldName::DurationInSeconds,
        FieldName::Dimensions,
        FieldName::Fps,
        FieldName::Rotation,
        FieldName::VideoCodec,
        FieldName::AudioCodec,
        FieldName::Container,
        FieldName::Tracks,
        FieldName::Structure,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldName::DurationInSeconds => "durationInSeconds",
            FieldName::Dimensions => "dimensions",
            FieldName::Fps => "fps",
            FieldName::Rotation => "rotation",
            FieldName::VideoCodec => "videoCodec",
            FieldName::AudioCodec => "audioCodec",
            FieldName::Container => "container",
            FieldName::Tracks => "tracks",
            FieldName::Structure => "structure",
        }
    }

    /// Fields that can only be settled by walking to the end of the
    /// structure the decoder understands.
    pub fn needs_full_walk(&self) -> bool {
        matches!(self, FieldName::Tracks | FieldName::Structure)
    }
}

impl std::fmt::Display for FieldName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "durationinseconds" | "duration" => Ok(FieldName::DurationInSeconds),
            "dimensions" | "size" => Ok(FieldName::Dimensions),
            "fps" | "framerate" => Ok(FieldName::Fps),
            "rotation" => Ok(FieldName::Rotation),
            "videocodec" => Ok(FieldName::VideoCodec),
            "audiocodec" => Ok(FieldName::AudioCodec),
            "container" | "format" => Ok(FieldName::Container),
            "tracks" => Ok(FieldName::Tracks),
            "structure" => Ok(FieldName::Structure),
            _ => Err(Error::Config(format!("unknown field: {s}"))),
        }
    }
}

/// The set of fields a session should resolve.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ParseRequest {
    pub duration_in_seconds: bool,
    pub dimensions: bool,
    pub fps: bool,
    pub rotation: bool,
    pub video_codec: bool,
    pub audio_codec: bool,
    pub container: bool,
    pub tracks: bool,
    pub structure: bool,
}

impl ParseRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every scalar field. `tracks` and `structure` are left off.
    pub fn all() -> Self {
        Self {
            duration_in_seconds: true,
            dimensions: true,
            fps: true,
            rotation: true,
            video_codec: true,
            audio_codec: true,
            container: true,
            tracks: false,
            structure: false,
        }
    }

    /// Builder-style toggle.
    pub fn with(mut self, field: FieldName) -> Self {
        *self.flag_mut(field) = true;
        self
    }

    pub fn contains(&self, field: FieldName) -> bool {
        match field {
            FieldName::DurationInSeconds => self.duration_in_seconds,
            FieldName::Dimensions => self.dimensions,
            FieldName::Fps => self.fps,
            FieldName::Rotation => self.rotation,
            FieldName::VideoCodec => self.video_codec,
            FieldName::AudioCodec => self.audio_codec,
            FieldName::Container => self.container,
            FieldName::Tracks => self.tracks,
            FieldName::Structure => self.structure,
        }
    }

    /// Requested fields, in declaration order.
    pub fn fields(&self) -> Vec<FieldName> {
        FieldName::ALL
            .into_iter()
            .filter(|field| self.contains(*field))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.fields().is_empty()
    }

    fn flag_mut(&mut self, field: FieldName) -> &mut bool {
        match field {
            FieldName::DurationInSeconds => &mut self.duration_in_seconds,
            FieldName::Dimensions => &mut self.dimensions,
            FieldName::Fps => &mut self.fps,
            FieldName::Rotation => &mut self.rotation,
            FieldName::VideoCodec => &mut self.video_codec,
            FieldName::AudioCodec => &mut self.audio_codec,
            FieldName::Container => &mut self.container,
            FieldName::Tracks => &mut self.tracks,
            FieldName::Structure => &mut self.structure,
        }
    }
}

impl FromIterator<FieldName> for ParseRequest {
    fn from_iter<I: IntoIterator<Item = FieldName>>(iter: I) -> Self {
        iter.into_iter().fold(Self::new(), Self::with)
    }
}

impl FromStr for ParseRequest {
    type Err = Error;

    /// Parse a comma-separated field list, e.g. `duration,dimensions`.
    fn from_str(s: &str) -> Result<Self> {
        s.split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(FieldName::from_str)
            .collect()
    }
}

/// How rotation affects reported dimensions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DimensionPolicy {
    /// Report the stored width and height regardless of rotation.
    #[default]
    Coded,
    /// Swap width and height for 90 and 270 degree rotations.
    Display,
}

impl FromStr for DimensionPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "coded" => Ok(DimensionPolicy::Coded),
            "display" => Ok(DimensionPolicy::Display),
            _ => Err(Error::Config(format!(
                "unknown dimension policy: {s} (expected coded or display)"
            ))),
        }
    }
}

/// Options for one parse session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOptions {
    pub request: ParseRequest,
    pub dimension_policy: DimensionPolicy,
    /// Minimum size of each range fetch.
    pub block_size: u64,
    /// Largest leaf payload the decoders will materialize.
    pub max_leaf_size: u64,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            request: ParseRequest::default(),
            dimension_policy: DimensionPolicy::default(),
            block_size: DEFAULT_BLOCK_SIZE,
            max_leaf_size: DEFAULT_MAX_LEAF_SIZE,
        }
    }
}

impl ParseOptions {
    pub fn new(request: ParseRequest) -> Self {
        Self {
            request,
            ..Self::default()
        }
    }

    pub fn with_dimension_policy(mut self, policy: DimensionPolicy) -> Self {
        self.dimension_policy = policy;
        self
    }

    pub fn with_block_size(mut self, block_size: u64) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.request.is_empty() {
            return Err(Error::Config("no fields requested".to_string()));
        }
        if self.block_size == 0 {
            return Err(Error::Config("block size must be positive".to_string()));
        }
        if self.max_leaf_size < 1024 {
            return Err(Error::Config(format!(
                "max leaf size {} is too small to hold a sample description",
                self.max_leaf_size
            )));
        }
        Ok(())
    }
}
