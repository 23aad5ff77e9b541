//! Parse results.

use crate::error::ErrorKind;
use crate::format::Container;
use crate::session::SessionState;
use crate::track::TrackDescriptor;
use crate::tree::NodeSummary;
use serde::Serialize;

/// Why a requested field has no value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Unavailable {
    /// The source was read to the end without finding the field.
    NotPresent,
    /// The structure that would carry the field failed to decode.
    Failed(ErrorKind),
}

impl std::fmt::Display for Unavailable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Unavailable::NotPresent => write!(f, "not present"),
            Unavailable::Failed(kind) => write!(f, "failed ({kind:?})"),
        }
    }
}

/// Outcome for one requested field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Field<T> {
    Value(T),
    Unavailable(Unavailable),
}

impl<T> Field<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            Field::Value(v) => Some(v),
            Field::Unavailable(_) => None,
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, Field::Unavailable(_))
    }
}

/// Shorthand for reading a requested field.
pub trait Resolved<T> {
    /// The value, if the field was requested and resolved.
    fn resolved(&self) -> Option<&T>;
}

impl<T> Resolved<T> for Option<Field<T>> {
    fn resolved(&self) -> Option<&T> {
        self.as_ref().and_then(Field::value)
    }
}

/// Width and height in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn swapped(self) -> Self {
        Self {
            width: self.height,
            height: self.width,
        }
    }
}

impl std::fmt::Display for Dimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Fetch accounting and final state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub state: SessionState,
    pub fetches: u64,
    pub bytes_fetched: u64,
}

/// Metadata extracted by one session.
///
/// Fields that were not requested stay `None` and are omitted when
/// serialized.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_in_seconds: Option<Field<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<Field<Dimensions>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fps: Option<Field<f64>>,
    /// Clockwise rotation in degrees, `[0, 360)`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotation: Option<Field<u32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_codec: Option<Field<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_codec: Option<Field<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container: Option<Field<Container>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracks: Option<Field<Vec<TrackDescriptor>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structure: Option<Field<Vec<NodeSummary>>>,
    pub stats: SessionStats,
}

impl ParseResult {
    /// Whether any requested field ended up unavailable.
    pub fn has_unavailable(&self) -> bool {
        fn missing<T>(field: &Option<Field<T>>) -> bool {
            field.as_ref().is_some_and(Field::is_unavailable)
        }

        missing(&self.duration_in_seconds)
            || missing(&self.dimensions)
            || missing(&self.fps)
            || missing(&self.rotation)
            || missing(&self.video_codec)
            || missing(&self.audio_codec)
            || missing(&self.container)
            || missing(&self.tracks)
            || missing(&self.structure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats() -> SessionStats {
        SessionStats {
            state: SessionState::FullyResolved,
            fetches: 2,
            bytes_fetched: 4096,
        }
    }

    #[test]
    fn test_resolved() {
        let field: Option<Field<f64>> = Some(Field::Value(3.4));
        assert_eq!(field.resolved(), Some(&3.4));

        let field: Option<Field<f64>> = Some(Field::Unavailable(Unavailable::NotPresent));
        assert_eq!(field.resolved(), None);

        let field: Option<Field<f64>> = None;
        assert_eq!(field.resolved(), None);
    }

    #[test]
    fn test_serialize_only_requested() {
        let result = ParseResult {
            duration_in_seconds: Some(Field::Value(4.167)),
            dimensions: Some(Field::Value(Dimensions::new(1080, 1080))),
            fps: Some(Field::Unavailable(Unavailable::Failed(
                ErrorKind::MalformedStructure,
            ))),
            rotation: None,
            video_codec: None,
            audio_codec: None,
            container: None,
            tracks: None,
            structure: None,
            stats: stats(),
        };

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["durationInSeconds"]["value"], 4.167);
        assert_eq!(json["dimensions"]["value"]["width"], 1080);
        assert_eq!(
            json["fps"]["unavailable"]["failed"],
            "malformed_structure"
        );
        assert!(json.get("rotation").is_none());
        assert_eq!(json["stats"]["state"], "fully_resolved");
        assert!(result.has_unavailable());
    }

    #[test]
    fn test_dimensions_swapped() {
        assert_eq!(
            Dimensions::new(1920, 1080).swapped(),
            Dimensions::new(1080, 1920)
        );
        assert_eq!(Dimensions::new(640, 480).to_string(), "640x480");
    }
}
