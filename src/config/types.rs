use rangeprobe_media::cursor::DEFAULT_BLOCK_SIZE;
use rangeprobe_media::request::DEFAULT_MAX_LEAF_SIZE;
use rangeprobe_media::source::HttpOptions;
use rangeprobe_media::{DimensionPolicy, FieldName};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub fetch: FetchConfig,

    #[serde(default)]
    pub http: HttpOptions,

    #[serde(default)]
    pub parse: ParseConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FetchConfig {
    /// Minimum number of bytes requested per range fetch
    #[serde(default = "default_block_size")]
    pub block_size: u64,

    /// Largest box/element payload that will be read into memory
    #[serde(default = "default_max_leaf_size")]
    pub max_leaf_size: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            block_size: default_block_size(),
            max_leaf_size: default_max_leaf_size(),
        }
    }
}

fn default_block_size() -> u64 {
    DEFAULT_BLOCK_SIZE
}

fn default_max_leaf_size() -> u64 {
    DEFAULT_MAX_LEAF_SIZE
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ParseConfig {
    /// Whether rotation swaps the reported width and height
    #[serde(default)]
    pub dimension_policy: DimensionPolicy,

    /// Fields resolved when `--fields` is not given
    #[serde(default = "default_fields")]
    pub fields: Vec<FieldName>,
}

impl Default for ParseConfig {
    fn default() -> Self {
        Self {
            dimension_policy: DimensionPolicy::default(),
            fields: default_fields(),
        }
    }
}

fn default_fields() -> Vec<FieldName> {
    vec![
        FieldName::DurationInSeconds,
        FieldName::Dimensions,
        FieldName::Fps,
        FieldName::Rotation,
        FieldName::VideoCodec,
        FieldName::AudioCodec,
        FieldName::Container,
    ]
}
