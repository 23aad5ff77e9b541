//! Streaming Matroska/WebM element walker.
//!
//! Reads the EBML header, then walks the Segment's top-level children,
//! materializing `Info` and each `TrackEntry`. Clusters, cues, tags and the
//! seek head are skipped without being fetched.

use super::ebml;
use super::interpret;
use crate::aggregator::Aggregator;
use crate::cursor::RangeCursor;
use crate::request::FieldName;
use crate::source::ByteSource;
use crate::tree::{NodeId, NodeKind, StructureTree};
use crate::{Error, Result};
use bytes::Bytes;

/// Walk a Matroska source from offset 0.
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
    let mut decoder = MkvDecoder {
        cursor,
        tree,
        agg,
        max_leaf_size,
        info_seen: false,
        tracks_seen: false,
    };

    decoder.read_ebml_header().await?;
    match decoder.walk_top().await {
        Ok(()) => {}
        Err(e) if e.is_subtree_local() => {
            tracing::warn!("Matroska structure unreadable past this point: {}", e);
            decoder.agg.fail_outstanding(e.kind());
        }
        Err(e) => return Err(e),
    }
    decoder.agg.header_finished();
    Ok(())
}

struct MkvDecoder<'a, S> {
    cursor: &'a mut RangeCursor<S>,
    tree: &'a mut StructureTree,
    agg: &'a mut Aggregator,
    max_leaf_size: u64,
    info_seen: bool,
    tracks_seen: bool,
}

impl<S: ByteSource> MkvDecoder<'_, S> {
    /// Read one variable-size integer, marker included.
    async fn read_vint(&mut self, max: usize, what: &str) -> Result<Vec<u8>> {
        let offset = self.cursor.position();
        let first = self.cursor.read_u8().await?;
        let width = ebml::vint_width(first, max)
            .ok_or_else(|| Error::malformed(offset, format!("invalid {what} byte 0x{first:02X}")))?;
        let mut bytes = Vec::with_capacity(width);
        bytes.push(first);
        bytes.extend_from_slice(&self.cursor.read_bytes(width as u64 - 1).await?);
        Ok(bytes)
    }

    /// Read the element header at the cursor position.
    async fn next_element(
        &mut self,
        parent: Option<NodeId>,
        parent_end: Option<u64>,
    ) -> Result<Option<(NodeId, u32)>> {
        let offset = self.cursor.position();
        match parent_end.or(self.cursor.length()) {
            Some(end) if offset >= end => return Ok(None),
            Some(_) => {}
            None => {
                if self.cursor.is_exhausted().await? {
                    return Ok(None);
                }
            }
        }

        let id_bytes = self.read_vint(4, "element id").await?;
        let (id, _) = ebml::parse_id(&id_bytes, offset)?;
        let size_bytes = self.read_vint(8, "element size").await?;
        let (data_size, _) = ebml::parse_size(&size_bytes, offset)?;
        let header_size = (id_bytes.len() + size_bytes.len()) as u64;

        let size = if data_size == ebml::UNKNOWN_SIZE {
            None
        } else {
            let size = data_size
                .checked_add(header_size)
                .ok_or_else(|| Error::malformed(offset, format!("element 0x{id:X} size overflows")))?;
            let end = offset.saturating_add(size);
            if let Some(parent_end) = parent_end.filter(|pe| end > *pe) {
                return Err(Error::malformed(
                    offset,
                    format!("element 0x{id:X} ends at {end}, past its parent's end {parent_end}"),
                ));
            }
            if let Some(length) = self.cursor.length().filter(|len| end > *len) {
                return Err(Error::malformed(
                    offset,
                    format!("element 0x{id:X} ends at {end}, past the end of the source ({length})"),
                ));
            }
            Some(size)
        };

        tracing::trace!("element 0x{:X} at {} size {:?}", id, offset, size);
        let node = self
            .tree
            .insert(parent, NodeKind::Element(id), offset, header_size, size);
        Ok(Some((node, id)))
    }

    fn skip(&mut self, id: NodeId) -> bool {
        let Some(end) = self.tree.get(id).end() else {
            return false;
        };
        self.tree.mark_skipped(id);
        self.cursor.seek(end);
        true
    }

    async fn read_leaf(&mut self, id: NodeId) -> Result<(Bytes, u64)> {
        let node = self.tree.get(id);
        let payload_offset = node.payload_offset();
        let Some(size) = node.payload_size() else {
            return Err(Error::malformed(
                node.offset,
                format!("element {} has unknown size", node.kind),
            ));
        };
        if size > self.max_leaf_size {
            return Err(Error::malformed(
                node.offset,
                format!("element {} is {size} bytes, limit is {}", node.kind, self.max_leaf_size),
            ));
        }

        self.cursor.seek(payload_offset);
        let data = self.cursor.read_bytes(size).await?;
        self.tree.set_leaf(id, data.clone());
        Ok((data, payload_offset))
    }

    fn resume_after(&mut self, id: NodeId) -> Result<()> {
        let node = self.tree.get(id);
        match node.end() {
            Some(end) => {
                self.cursor.seek(end);
                Ok(())
            }
            None => Err(Error::malformed(
                node.offset,
                format!("cannot resume after unknown-size element {}", node.kind),
            )),
        }
    }

    async fn read_ebml_header(&mut self) -> Result<()> {
        let Some((id, element_id)) = self.next_element(None, None).await? else {
            return Err(Error::unsupported("source is empty"));
        };
        if element_id != ebml::EBML_HEADER {
            return Err(Error::unsupported(format!(
                "expected EBML header, found element 0x{element_id:X}"
            )));
        }

        let (data, at) = self.read_leaf(id).await?;
        match interpret::doc_type(&data, at)?.as_deref() {
            // DocType defaults to "matroska" when absent.
            None | Some("matroska") | Some("webm") => Ok(()),
            Some(other) => Err(Error::unsupported(format!(
                "EBML document type {other:?} is not Matroska"
            ))),
        }
    }

    async fn walk_top(&mut self) -> Result<()> {
        loop {
            if self.agg.is_done() {
                return Ok(());
            }
            let Some((id, element_id)) = self.next_element(None, None).await? else {
                return Ok(());
            };
            if element_id == ebml::SEGMENT {
                // Only the first segment is read.
                return self.walk_segment(id).await;
            } else if !self.skip(id) {
                return Ok(());
            }
        }
    }

    async fn walk_segment(&mut self, segment: NodeId) -> Result<()> {
        self.tree.open(segment);
        let end = self.tree.get(segment).end();
        self.cursor.seek(self.tree.get(segment).payload_offset());

        loop {
            if self.agg.is_done() {
                tracing::debug!(
                    "all requested fields resolved at offset {}",
                    self.cursor.position()
                );
                return Ok(());
            }
            let Some((id, element_id)) = self.next_element(Some(segment), end).await? else {
                return Ok(());
            };

            match element_id {
                ebml::INFO => {
                    self.read_info(id).await?;
                    self.info_seen = true;
                    if self.tracks_seen {
                        self.agg.header_finished();
                    }
                }
                ebml::TRACKS if self.agg.wants_track_data() => {
                    self.walk_tracks(id).await?;
                    self.tracks_seen = true;
                    self.agg.tracks_finished();
                    if self.info_seen {
                        self.agg.header_finished();
                    }
                }
                ebml::CLUSTER => {
                    // Header elements precede the first cluster.
                    self.agg.header_finished();
                    if !self.skip(id) {
                        tracing::debug!("unknown-size cluster at {}, stopping", self.tree.get(id).offset);
                        return Ok(());
                    }
                }
                ebml::SEEK_HEAD | ebml::CUES | ebml::TAGS => {
                    if !self.skip(id) {
                        return Ok(());
                    }
                }
                _ => {
                    if !self.skip(id) {
                        tracing::debug!(
                            "unknown-size element 0x{:X} at {}, stopping",
                            element_id,
                            self.tree.get(id).offset
                        );
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn read_info(&mut self, id: NodeId) -> Result<()> {
        let info = match self.read_leaf(id).await {
            Ok((data, at)) => interpret::segment_info(&data, at),
            Err(e) => Err(e),
        };
        match info {
            Ok(info) => {
                self.agg.set_duration(info.duration_seconds());
                Ok(())
            }
            Err(e) if e.is_subtree_local() => {
                tracing::warn!("Unreadable segment info: {}", e);
                self.agg.fail_field(FieldName::DurationInSeconds, e.kind());
                self.resume_after(id)
            }
            Err(e) => Err(e),
        }
    }

    async fn walk_tracks(&mut self, tracks: NodeId) -> Result<()> {
        self.tree.open(tracks);
        let end = self.tree.get(tracks).end();
        self.cursor.seek(self.tree.get(tracks).payload_offset());

        while let Some((id, element_id)) = self.next_element(Some(tracks), end).await? {
            if element_id != ebml::TRACK_ENTRY {
                if !self.skip(id) {
                    break;
                }
                continue;
            }

            let track = match self.read_leaf(id).await {
                Ok((data, at)) => interpret::track_entry(&data, at),
                Err(e) => Err(e),
            };
            match track {
                Ok(track) => self.agg.absorb_track(track),
                Err(e) if e.is_subtree_local() => {
                    tracing::warn!(
                        "Skipping unreadable track entry at offset {}: {}",
                        self.tree.get(id).offset,
                        e
                    );
                    self.agg.fail_track(None, e.kind());
                    self.resume_after(id)?;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}
