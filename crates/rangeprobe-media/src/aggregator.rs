//! Field settlement for one parse session.
//!
//! Decoders report what they find; the aggregator decides which requested
//! fields that settles, keeps the first value seen for each field, and tells
//! the decoders which parts of the structure are still worth reading.

use crate::error::ErrorKind;
use crate::format::Container;
use crate::request::{DimensionPolicy, FieldName, ParseRequest};
use crate::result::{Dimensions, Field, ParseResult, SessionStats, Unavailable};
use crate::session::SessionState;
use crate::track::{round_to_millis, MediaType, TrackDescriptor};
use crate::tree::StructureTree;
use std::collections::BTreeSet;

/// Fields that only video tracks settle.
const VIDEO_FIELDS: [FieldName; 4] = [
    FieldName::Dimensions,
    FieldName::Fps,
    FieldName::Rotation,
    FieldName::VideoCodec,
];

/// Partial result and outstanding field set of a session.
#[derive(Debug)]
pub struct Aggregator {
    request: ParseRequest,
    policy: DimensionPolicy,
    outstanding: BTreeSet<FieldName>,
    duration: Option<Field<f64>>,
    dimensions: Option<Field<Dimensions>>,
    fps: Option<Field<f64>>,
    rotation: Option<Field<u32>>,
    video_codec: Option<Field<String>>,
    audio_codec: Option<Field<String>>,
    container: Option<Field<Container>>,
    tracks: Vec<TrackDescriptor>,
    tracks_field: Option<Field<Vec<TrackDescriptor>>>,
    video_seen: bool,
    audio_seen: bool,
    track_failure: Option<ErrorKind>,
}

/// Store `value` in `slot` unless the field is already settled.
fn settle<T>(
    outstanding: &mut BTreeSet<FieldName>,
    slot: &mut Option<Field<T>>,
    name: FieldName,
    value: Field<T>,
) {
    if outstanding.remove(&name) {
        tracing::trace!("settled {}", name);
        *slot = Some(value);
    }
}

fn value_or<T>(value: Option<T>, missing: Unavailable) -> Field<T> {
    match value {
        Some(v) => Field::Value(v),
        None => Field::Unavailable(missing),
    }
}

impl Aggregator {
    pub fn new(request: ParseRequest, policy: DimensionPolicy) -> Self {
        let outstanding = request.fields().into_iter().collect();
        Self {
            request,
            policy,
            outstanding,
            duration: None,
            dimensions: None,
            fps: None,
            rotation: None,
            video_codec: None,
            audio_codec: None,
            container: None,
            tracks: Vec::new(),
            tracks_field: None,
            video_seen: false,
            audio_seen: false,
            track_failure: None,
        }
    }

    /// Whether every requested field has been settled.
    pub fn is_done(&self) -> bool {
        self.outstanding.is_empty()
    }

    pub fn wants(&self, field: FieldName) -> bool {
        self.outstanding.contains(&field)
    }

    /// Whether any track header could still settle something.
    pub fn wants_track_data(&self) -> bool {
        self.wants(FieldName::Tracks)
            || self.wants(FieldName::DurationInSeconds)
            || self.wants(FieldName::AudioCodec)
            || VIDEO_FIELDS.iter().any(|f| self.wants(*f))
    }

    /// Whether the sample descriptions of a track of this type are needed.
    pub fn wants_media(&self, media_type: MediaType) -> bool {
        if self.wants(FieldName::Tracks) {
            return true;
        }
        match media_type {
            MediaType::Video => {
                !self.video_seen
                    && (self.wants(FieldName::Dimensions)
                        || self.wants(FieldName::Fps)
                        || self.wants(FieldName::VideoCodec))
            }
            MediaType::Audio => !self.audio_seen && self.wants(FieldName::AudioCodec),
            MediaType::Other => false,
        }
    }

    /// Whether sample timing tables are needed.
    pub fn wants_timing(&self) -> bool {
        self.wants(FieldName::Tracks) || (!self.video_seen && self.wants(FieldName::Fps))
    }

    pub fn set_container(&mut self, container: Container) {
        settle(
            &mut self.outstanding,
            &mut self.container,
            FieldName::Container,
            Field::Value(container),
        );
    }

    /// Record the header duration. Zero or unknown durations leave the
    /// field open for the track fallback.
    pub fn set_duration(&mut self, seconds: Option<f64>) {
        if let Some(seconds) = seconds.filter(|s| s.is_finite() && *s > 0.0) {
            settle(
                &mut self.outstanding,
                &mut self.duration,
                FieldName::DurationInSeconds,
                Field::Value(round_to_millis(seconds)),
            );
        }
    }

    /// Settle one field as failed.
    pub fn fail_field(&mut self, field: FieldName, kind: ErrorKind) {
        self.settle_unavailable(field, Unavailable::Failed(kind));
    }

    /// Take in a fully interpreted track.
    pub fn absorb_track(&mut self, track: TrackDescriptor) {
        tracing::debug!(
            "track {} ({:?}): codec {:?}, {} sample description(s)",
            track.track_id,
            track.media_type,
            track.codec(),
            track.sample_descriptions.len()
        );

        match track.media_type {
            MediaType::Video if !self.video_seen => {
                self.video_seen = true;
                self.absorb_video(&track);
            }
            MediaType::Audio if !self.audio_seen => {
                self.audio_seen = true;
                let codec = track.codec().map(str::to_string);
                settle(
                    &mut self.outstanding,
                    &mut self.audio_codec,
                    FieldName::AudioCodec,
                    value_or(codec, Unavailable::NotPresent),
                );
            }
            _ => {}
        }

        self.tracks.push(track);
    }

    fn absorb_video(&mut self, track: &TrackDescriptor) {
        let rotation = track.rotation_degrees.unwrap_or(0);
        let dimensions = track.coded_dimensions().map(|dims| match self.policy {
            DimensionPolicy::Display if rotation == 90 || rotation == 270 => dims.swapped(),
            _ => dims,
        });

        settle(
            &mut self.outstanding,
            &mut self.dimensions,
            FieldName::Dimensions,
            value_or(dimensions, Unavailable::NotPresent),
        );
        settle(
            &mut self.outstanding,
            &mut self.rotation,
            FieldName::Rotation,
            Field::Value(rotation),
        );
        settle(
            &mut self.outstanding,
            &mut self.fps,
            FieldName::Fps,
            value_or(track.fps(), Unavailable::NotPresent),
        );
        let codec = track.codec().map(str::to_string);
        settle(
            &mut self.outstanding,
            &mut self.video_codec,
            FieldName::VideoCodec,
            value_or(codec, Unavailable::NotPresent),
        );
    }

    /// A track subtree failed to decode.
    ///
    /// When the media type was already known the fields that track would
    /// have settled are failed right away; otherwise the failure is applied
    /// to whatever track fields remain open once all tracks were seen.
    pub fn fail_track(&mut self, media_type: Option<MediaType>, kind: ErrorKind) {
        self.track_failure.get_or_insert(kind);
        let failed = Unavailable::Failed(kind);

        match media_type {
            Some(MediaType::Video) if !self.video_seen => {
                self.video_seen = true;
                for field in VIDEO_FIELDS {
                    self.settle_unavailable(field, failed);
                }
            }
            Some(MediaType::Audio) if !self.audio_seen => {
                self.audio_seen = true;
                self.settle_unavailable(FieldName::AudioCodec, failed);
            }
            _ => {}
        }
    }

    /// All track headers have been read.
    pub fn tracks_finished(&mut self) {
        if self.wants(FieldName::DurationInSeconds) {
            let longest = self
                .tracks
                .iter()
                .filter_map(TrackDescriptor::duration_seconds)
                .fold(None, |max: Option<f64>, d| Some(max.map_or(d, |m| m.max(d))));
            self.set_duration(longest);
        }

        let missing = match self.track_failure {
            Some(kind) => Unavailable::Failed(kind),
            None => Unavailable::NotPresent,
        };
        for field in VIDEO_FIELDS.into_iter().chain([FieldName::AudioCodec]) {
            self.settle_unavailable(field, missing);
        }

        let tracks = match self.track_failure {
            Some(kind) => Field::Unavailable(Unavailable::Failed(kind)),
            None => Field::Value(self.tracks.clone()),
        };
        settle(
            &mut self.outstanding,
            &mut self.tracks_field,
            FieldName::Tracks,
            tracks,
        );
    }

    /// The whole header has been read; nothing later in the file can settle
    /// a scalar field.
    pub fn header_finished(&mut self) {
        self.tracks_finished();
        self.settle_unavailable(FieldName::DurationInSeconds, Unavailable::NotPresent);
    }

    /// Fail every open field except the structure outline, which always
    /// reflects what was visited.
    pub fn fail_outstanding(&mut self, kind: ErrorKind) {
        let open: Vec<FieldName> = self
            .outstanding
            .iter()
            .copied()
            .filter(|f| *f != FieldName::Structure)
            .collect();
        for field in open {
            self.fail_field(field, kind);
        }
    }

    fn settle_unavailable(&mut self, field: FieldName, reason: Unavailable) {
        let outstanding = &mut self.outstanding;
        match field {
            FieldName::DurationInSeconds => {
                settle(outstanding, &mut self.duration, field, Field::Unavailable(reason))
            }
            FieldName::Dimensions => {
                settle(outstanding, &mut self.dimensions, field, Field::Unavailable(reason))
            }
            FieldName::Fps => {
                settle(outstanding, &mut self.fps, field, Field::Unavailable(reason))
            }
            FieldName::Rotation => {
                settle(outstanding, &mut self.rotation, field, Field::Unavailable(reason))
            }
            FieldName::VideoCodec => {
                settle(outstanding, &mut self.video_codec, field, Field::Unavailable(reason))
            }
            FieldName::AudioCodec => {
                settle(outstanding, &mut self.audio_codec, field, Field::Unavailable(reason))
            }
            FieldName::Container => {
                settle(outstanding, &mut self.container, field, Field::Unavailable(reason))
            }
            FieldName::Tracks => {
                settle(outstanding, &mut self.tracks_field, field, Field::Unavailable(reason))
            }
            // The outline is built from the tree in `finish`.
            FieldName::Structure => {}
        }
    }

    /// Settle anything still open as not present and build the result.
    pub fn finish(mut self, tree: &StructureTree, fetches: u64, bytes_fetched: u64) -> ParseResult {
        let open: Vec<FieldName> = self.outstanding.iter().copied().collect();
        for field in open {
            self.settle_unavailable(field, Unavailable::NotPresent);
        }

        let structure = self
            .request
            .structure
            .then(|| Field::Value(tree.summarize()));

        let mut result = ParseResult {
            duration_in_seconds: self.duration,
            dimensions: self.dimensions,
            fps: self.fps,
            rotation: self.rotation,
            video_codec: self.video_codec,
            audio_codec: self.audio_codec,
            container: self.container,
            tracks: self.tracks_field,
            structure,
            stats: SessionStats {
                state: SessionState::FullyResolved,
                fetches,
                bytes_fetched,
            },
        };
        if result.has_unavailable() {
            result.stats.state = SessionState::PartiallyResolved;
        }
        result
    }
}
