//! Streaming ISO-BMFF box walker.
//!
//! Walks `moov > trak > mdia > minf > stbl` in document order, reading only
//! the leaf boxes the outstanding fields need. Every other box is skipped by
//! moving the cursor past it, so its payload is never fetched.

use super::atoms::BoxType;
use super::interpret;
use crate::aggregator::Aggregator;
use crate::cursor::RangeCursor;
use crate::request::FieldName;
use crate::source::ByteSource;
use crate::track::{MediaType, SampleTiming, TrackDescriptor};
use crate::tree::{NodeId, NodeKind, StructureTree};
use crate::{Error, Result};
use bytes::Bytes;

/// Walk an ISO-BMFF source from offset 0.
///
/// Errors that only invalidate a subtree are folded into the aggregator.
/// Anything returned as `Err` is fatal for the session.
pub async fn decode<S: ByteSource>(
    cursor: &mut RangeCursor<S>,
    tree: &mut StructureTree,
    agg: &mut Aggregator,
    max_leaf_size: u64,
) -> Result<()> {
    cursor.seek(0);
    let mut decoder = Mp4Decoder {
        cursor,
        tree,
        agg,
        max_leaf_size,
    };

    match decoder.walk_top().await {
        Ok(()) => Ok(()),
        Err(e) if e.is_subtree_local() => {
            tracing::warn!("MP4 structure unreadable past this point: {}", e);
            decoder.agg.fail_outstanding(e.kind());
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Per-track state collected while walking a `trak`.
struct TrakState {
    track: TrackDescriptor,
    handler: Option<MediaType>,
    /// `stsd` read before `hdlr`; sample entries depend on the media type.
    deferred_stsd: Option<(Bytes, u64)>,
}

impl TrakState {
    fn new() -> Self {
        Self {
            track: TrackDescriptor::new(0, MediaType::Other),
            handler: None,
            deferred_stsd: None,
        }
    }

    /// Settle the media type and interpret anything read ahead of `hdlr`.
    fn finish(mut self) -> Result<TrackDescriptor> {
        let media_type = self.handler.unwrap_or(MediaType::Other);
        if let Some((data, at)) = self.deferred_stsd.take() {
            self.track.sample_descriptions = interpret::sample_descriptions(&data, at, media_type)?;
        }
        if media_type != MediaType::Video {
            self.track.timing = None;
        }
        self.track.media_type = media_type;
        Ok(self.track)
    }
}

struct Mp4Decoder<'a, S> {
    cursor: &'a mut RangeCursor<S>,
    tree: &'a mut StructureTree,
    agg: &'a mut Aggregator,
    max_leaf_size: u64,
}

impl<S: ByteSource> Mp4Decoder<'_, S> {
    /// Read the header at the cursor position.
    ///
    /// Returns `None` at the end of the parent, treating fewer than eight
    /// remaining bytes as padding.
    async fn next_box(
        &mut self,
        parent: Option<NodeId>,
        parent_end: Option<u64>,
    ) -> Result<Option<(NodeId, BoxType)>> {
        let offset = self.cursor.position();
        let limit = parent_end.or(self.cursor.length());
        match limit {
            Some(end) if end.saturating_sub(offset) < 8 => {
                self.cursor.seek(end.max(offset));
                return Ok(None);
            }
            Some(_) => {}
            None => {
                if self.cursor.is_exhausted().await? {
                    return Ok(None);
                }
            }
        }

        let size = self.cursor.read_u32().await?;
        let box_type = BoxType::from_bytes(self.cursor.read_array::<4>().await?);
        let (size, header_size) = match size {
            1 => (Some(self.cursor.read_u64().await?), 16),
            // Extends to the end of the parent, or of the source.
            0 => (limit.map(|end| end.saturating_sub(offset)), 8),
            n => (Some(n as u64), 8),
        };

        if let Some(size) = size {
            if size < header_size {
                return Err(Error::malformed(
                    offset,
                    format!("box {box_type} size {size} is smaller than its {header_size}-byte header"),
                ));
            }
            let end = offset
                .checked_add(size)
                .ok_or_else(|| Error::malformed(offset, format!("box {box_type} size overflows")))?;
            if let Some(parent_end) = parent_end.filter(|pe| end > *pe) {
                return Err(Error::malformed(
                    offset,
                    format!("box {box_type} ends at {end}, past its parent's end {parent_end}"),
                ));
            }
            if let Some(length) = self.cursor.length().filter(|len| end > *len) {
                return Err(Error::malformed(
                    offset,
                    format!("box {box_type} ends at {end}, past the end of the source ({length})"),
                ));
            }
        }

        tracing::trace!("box {} at {} size {:?}", box_type, offset, size);
        let id = self
            .tree
            .insert(parent, NodeKind::Box(box_type), offset, header_size, size);
        Ok(Some((id, box_type)))
    }

    /// Move past a box without reading its payload. Returns `false` when the
    /// box has no known end.
    fn skip(&mut self, id: NodeId) -> bool {
        let Some(end) = self.tree.get(id).end() else {
            return false;
        };
        self.tree.mark_skipped(id);
        self.cursor.seek(end);
        true
    }

    /// Materialize a leaf payload.
    async fn read_leaf(&mut self, id: NodeId) -> Result<(Bytes, u64)> {
        let node = self.tree.get(id);
        let payload_offset = node.payload_offset();
        let kind = node.kind;
        let Some(size) = node.payload_size() else {
            return Err(Error::malformed(node.offset, format!("leaf {kind} has no size")));
        };
        if size > self.max_leaf_size {
            return Err(Error::malformed(
                node.offset,
                format!("leaf {kind} is {size} bytes, limit is {}", self.max_leaf_size),
            ));
        }

        self.cursor.seek(payload_offset);
        let data = self.cursor.read_bytes(size).await?;
        self.tree.set_leaf(id, data.clone());
        Ok((data, payload_offset))
    }

    /// Position the cursor on the first child of a container box.
    fn enter(&mut self, id: NodeId) -> Option<u64> {
        self.tree.open(id);
        let node = self.tree.get(id);
        self.cursor.seek(node.payload_offset());
        node.end()
    }

    async fn walk_top(&mut self) -> Result<()> {
        loop {
            if self.agg.is_done() {
                tracing::debug!(
                    "all requested fields resolved at offset {}",
                    self.cursor.position()
                );
                return Ok(());
            }
            let Some((id, box_type)) = self.next_box(None, None).await? else {
                return Ok(());
            };

            if box_type == BoxType::MOOV {
                self.walk_moov(id).await?;
                self.agg.header_finished();
            } else if !self.skip(id) {
                // Unsized trailing box: nothing can follow it.
                return Ok(());
            }
        }
    }

    async fn walk_moov(&mut self, moov: NodeId) -> Result<()> {
        let end = self.enter(moov);
        loop {
            if self.agg.is_done() {
                return Ok(());
            }
            let Some((id, box_type)) = self.next_box(Some(moov), end).await? else {
                return Ok(());
            };

            match box_type {
                BoxType::MVHD if self.agg.wants(FieldName::DurationInSeconds) => {
                    let header = match self.read_leaf(id).await {
                        Ok((data, at)) => interpret::movie_header(&data, at),
                        Err(e) => Err(e),
                    };
                    match header {
                        Ok(header) => self.agg.set_duration(header.duration_seconds()),
                        Err(e) if e.is_subtree_local() => {
                            tracing::warn!("Unreadable movie header: {}", e);
                            self.agg.fail_field(FieldName::DurationInSeconds, e.kind());
                            self.resume_after(id)?;
                        }
                        Err(e) => return Err(e),
                    }
                }
                BoxType::TRAK if self.agg.wants_track_data() => {
                    let mut state = TrakState::new();
                    let walked = self.walk_trak(id, &mut state).await;
                    let handler = state.handler;
                    match walked.and_then(|()| state.finish()) {
                        Ok(track) => self.agg.absorb_track(track),
                        Err(e) if e.is_subtree_local() => {
                            tracing::warn!(
                                "Skipping unreadable track at offset {}: {}",
                                self.tree.get(id).offset,
                                e
                            );
                            self.agg.fail_track(handler, e.kind());
                            self.resume_after(id)?;
                        }
                        Err(e) => return Err(e),
                    }
                }
                _ => {
                    if !self.skip(id) {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Continue with the sibling after a failed subtree.
    fn resume_after(&mut self, id: NodeId) -> Result<()> {
        let node = self.tree.get(id);
        match node.end() {
            Some(end) => {
                self.cursor.seek(end);
                Ok(())
            }
            None => Err(Error::malformed(
                node.offset,
                format!("cannot resume after unsized {}", node.kind),
            )),
        }
    }

    async fn walk_trak(&mut self, trak: NodeId, state: &mut TrakState) -> Result<()> {
        let end = self.enter(trak);
        while let Some((id, box_type)) = self.next_box(Some(trak), end).await? {
            match box_type {
                BoxType::TKHD => {
                    let (data, at) = self.read_leaf(id).await?;
                    let header = interpret::track_header(&data, at)?;
                    state.track.track_id = header.track_id as u64;
                    state.track.dimensions = Some(header.dimensions);
                    state.track.rotation_degrees = Some(header.rotation_degrees);
                }
                BoxType::MDIA => self.walk_mdia(id, state).await?,
                _ => {
                    if !self.skip(id) {
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    async fn walk_mdia(&mut self, mdia: NodeId, state: &mut TrakState) -> Result<()> {
        let end = self.enter(mdia);
        while let Some((id, box_type)) = self.next_box(Some(mdia), end).await? {
            match box_type {
                BoxType::MDHD => {
                    let (data, at) = self.read_leaf(id).await?;
                    let header = interpret::media_header(&data, at)?;
                    state.track.timescale = header.timescale as u64;
                    state.track.duration = header.duration;
                    state.track.language = header.language;
                }
                BoxType::HDLR => {
                    let (data, at) = self.read_leaf(id).await?;
                    state.handler = Some(interpret::handler(&data, at)?.media_type());
                }
                // Without a handler yet, the sample table is read and
                // interpreted once `hdlr` turns up.
                BoxType::MINF
                    if state
                        .handler
                        .map_or(true, |media_type| self.agg.wants_media(media_type)) =>
                {
                    self.walk_minf(id, state).await?
                }
                _ => {
                    if !self.skip(id) {
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    async fn walk_minf(&mut self, minf: NodeId, state: &mut TrakState) -> Result<()> {
        let end = self.enter(minf);
        while let Some((id, box_type)) = self.next_box(Some(minf), end).await? {
            if box_type == BoxType::STBL {
                self.walk_stbl(id, state).await?;
            } else if !self.skip(id) {
                break;
            }
        }
        Ok(())
    }

    async fn walk_stbl(&mut self, stbl: NodeId, state: &mut TrakState) -> Result<()> {
        let media_type = state.handler;
        let end = self.enter(stbl);
        while let Some((id, box_type)) = self.next_box(Some(stbl), end).await? {
            match box_type {
                BoxType::STSD => {
                    let (data, at) = self.read_leaf(id).await?;
                    match media_type {
                        Some(media_type) => {
                            state.track.sample_descriptions =
                                interpret::sample_descriptions(&data, at, media_type)?
                        }
                        None => state.deferred_stsd = Some((data, at)),
                    }
                }
                BoxType::STTS
                    if media_type.map_or(true, |m| m == MediaType::Video)
                        && self.agg.wants_timing() =>
                {
                    let (data, at) = self.read_leaf(id).await?;
                    state.track.timing = Some(SampleTiming::TimeToSample(
                        interpret::time_to_sample(&data, at)?,
                    ));
                }
                _ => {
                    if !self.skip(id) {
                        break;
                    }
                }
            }
        }
        Ok(())
    }
}
