//! Synthesized containers and sources shared by the integration tests.
//!
//! The MP4 builders write just enough of each box for the parser: version
//! 0 full boxes, one sample entry per track and no chunk tables.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use rangeprobe_media::source::ByteStream;
use rangeprobe_media::{ByteRange, ByteSource, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// ===== ISO-BMFF =====

pub fn make_box(kind: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut out = ((payload.len() + 8) as u32).to_be_bytes().to_vec();
    out.extend_from_slice(kind);
    out.extend_from_slice(payload);
    out
}

fn put_u16(data: &mut [u8], at: usize, value: u16) {
    data[at..at + 2].copy_from_slice(&value.to_be_bytes());
}

fn put_u32(data: &mut [u8], at: usize, value: u32) {
    data[at..at + 4].copy_from_slice(&value.to_be_bytes());
}

pub fn ftyp() -> Vec<u8> {
    make_box(b"ftyp", b"isom\0\0\x02\0isomiso2avc1mp41")
}

pub fn mvhd(timescale: u32, duration: u32) -> Vec<u8> {
    let mut data = vec![0u8; 100];
    put_u32(&mut data, 12, timescale);
    put_u32(&mut data, 16, duration);
    put_u32(&mut data, 20, 0x0001_0000); // rate 1.0
    put_u32(&mut data, 96, 3); // next track id
    make_box(b"mvhd", &data)
}

/// `tkhd` with a transformation matrix for a clockwise rotation.
pub fn tkhd(track_id: u32, width: u32, height: u32, rotation: u32) -> Vec<u8> {
    const ONE: i32 = 0x0001_0000;
    let (a, b, c, d) = match rotation {
        90 => (0, ONE, -ONE, 0),
        180 => (-ONE, 0, 0, -ONE),
        270 => (0, -ONE, ONE, 0),
        _ => (ONE, 0, 0, ONE),
    };

    let mut data = vec![0u8; 84];
    data[3] = 0x03; // enabled | in movie
    put_u32(&mut data, 12, track_id);
    data[40..44].copy_from_slice(&a.to_be_bytes());
    data[44..48].copy_from_slice(&b.to_be_bytes());
    data[52..56].copy_from_slice(&c.to_be_bytes());
    data[56..60].copy_from_slice(&d.to_be_bytes());
    put_u32(&mut data, 72, 0x4000_0000);
    put_u32(&mut data, 76, width << 16);
    put_u32(&mut data, 80, height << 16);
    make_box(b"tkhd", &data)
}

pub fn mdhd(timescale: u32, duration: u32) -> Vec<u8> {
    let mut data = vec![0u8; 24];
    put_u32(&mut data, 12, timescale);
    put_u32(&mut data, 16, duration);
    put_u16(&mut data, 20, 0x15C7); // "eng"
    make_box(b"mdhd", &data)
}

pub fn hdlr(handler: &[u8; 4]) -> Vec<u8> {
    let mut data = vec![0u8; 25];
    data[8..12].copy_from_slice(handler);
    make_box(b"hdlr", &data)
}

pub fn stts(entries: &[(u32, u32)]) -> Vec<u8> {
    let mut data = vec![0u8; 8];
    put_u32(&mut data, 4, entries.len() as u32);
    for (count, delta) in entries {
        data.extend_from_slice(&count.to_be_bytes());
        data.extend_from_slice(&delta.to_be_bytes());
    }
    make_box(b"stts", &data)
}

fn stsd(entry: Vec<u8>) -> Vec<u8> {
    let mut data = vec![0, 0, 0, 0, 0, 0, 0, 1];
    data.extend(entry);
    make_box(b"stsd", &data)
}

pub fn avcc(profile: u8, compat: u8, level: u8) -> Vec<u8> {
    make_box(b"avcC", &[1, profile, compat, level, 0xFF, 0xE0])
}

/// `hvcC` for Main profile, main tier, level 3.1.
pub fn hvcc_main() -> Vec<u8> {
    let mut data = vec![0u8; 23];
    data[0] = 1;
    data[1] = 0x01;
    data[2..6].copy_from_slice(&[0x60, 0x00, 0x00, 0x00]);
    data[6] = 0xB0;
    data[12] = 93;
    make_box(b"hvcC", &data)
}

/// `esds` for AAC LC.
pub fn esds_aac_lc() -> Vec<u8> {
    make_box(
        b"esds",
        &[
            0x00, 0x00, 0x00, 0x00, 0x03, 0x19, 0x00, 0x01, 0x00, 0x04, 0x11, 0x40, 0x15, 0x00,
            0x00, 0x00, 0x00, 0x01, 0xF4, 0x00, 0x00, 0x01, 0xF4, 0x00, 0x05, 0x02, 0x12, 0x10,
            0x06, 0x01, 0x02,
        ],
    )
}

/// Description of one synthesized video track.
#[derive(Debug, Clone)]
pub struct VideoTrack {
    pub track_id: u32,
    pub format: [u8; 4],
    pub config: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub rotation: u32,
    pub timescale: u32,
    pub duration: u32,
    pub stts: Vec<(u32, u32)>,
}

impl VideoTrack {
    pub fn avc(width: u32, height: u32) -> Self {
        Self {
            track_id: 1,
            format: *b"avc1",
            config: avcc(0x64, 0x00, 0x1F),
            width,
            height,
            rotation: 0,
            timescale: 30_000,
            duration: 125_125,
            stts: vec![(125, 1001)],
        }
    }

    pub fn trak(&self) -> Vec<u8> {
        self.build_trak(false)
    }

    /// Same track with `hdlr` placed after `minf` inside `mdia`.
    pub fn trak_with_late_handler(&self) -> Vec<u8> {
        self.build_trak(true)
    }

    fn build_trak(&self, late_handler: bool) -> Vec<u8> {
        let mut entry = vec![0u8; 78];
        put_u16(&mut entry, 6, 1); // data reference index
        put_u16(&mut entry, 24, self.width as u16);
        put_u16(&mut entry, 26, self.height as u16);
        put_u32(&mut entry, 28, 0x0048_0000);
        put_u32(&mut entry, 32, 0x0048_0000);
        put_u16(&mut entry, 40, 1);
        put_u16(&mut entry, 74, 0x0018);
        put_u16(&mut entry, 76, 0xFFFF);
        entry.extend_from_slice(&self.config);

        let stbl = make_box(
            b"stbl",
            &[
                stsd(make_box(&self.format, &entry)),
                stts(&self.stts),
                make_box(b"stsz", &[0u8; 12]),
            ]
            .concat(),
        );
        let vmhd = make_box(b"vmhd", &[0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0]);
        let minf = make_box(b"minf", &[vmhd, stbl].concat());
        let children = if late_handler {
            [mdhd(self.timescale, self.duration), minf, hdlr(b"vide")]
        } else {
            [mdhd(self.timescale, self.duration), hdlr(b"vide"), minf]
        };
        let mdia = make_box(b"mdia", &children.concat());
        make_box(
            b"trak",
            &[tkhd(self.track_id, self.width, self.height, self.rotation), mdia].concat(),
        )
    }
}

/// AAC LC stereo track at 48 kHz.
pub fn aac_trak(track_id: u32, duration: u32) -> Vec<u8> {
    let mut entry = vec![0u8; 28];
    put_u16(&mut entry, 6, 1);
    put_u16(&mut entry, 16, 2);
    put_u16(&mut entry, 18, 16);
    put_u32(&mut entry, 24, 48_000 << 16);
    entry.extend(esds_aac_lc());

    let stbl = make_box(
        b"stbl",
        &[stsd(make_box(b"mp4a", &entry)), stts(&[(1, 1024)])].concat(),
    );
    let minf = make_box(b"minf", &stbl);
    let mdia = make_box(
        b"mdia",
        &[mdhd(48_000, duration), hdlr(b"soun"), minf].concat(),
    );
    make_box(b"trak", &[tkhd(track_id, 0, 0, 0), mdia].concat())
}

pub fn moov(timescale: u32, duration: u32, traks: &[Vec<u8>]) -> Vec<u8> {
    let mut payload = mvhd(timescale, duration);
    for trak in traks {
        payload.extend_from_slice(trak);
    }
    payload.extend(make_box(b"udta", &make_box(b"free", &[0u8; 16])));
    make_box(b"moov", &payload)
}

/// `mdat` header followed by `size` payload bytes.
pub fn mdat(size: usize) -> Vec<u8> {
    let mut out = ((size + 8) as u32).to_be_bytes().to_vec();
    out.extend_from_slice(b"mdat");
    out.resize(size + 8, 0xAB);
    out
}

pub fn faststart(moov: Vec<u8>, mdat_size: usize) -> Vec<u8> {
    [ftyp(), moov, mdat(mdat_size)].concat()
}

pub fn moov_at_end(moov: Vec<u8>, mdat_size: usize) -> Vec<u8> {
    [ftyp(), mdat(mdat_size), moov].concat()
}

/// Square 1080p H.264 clip: 4.167 s.
pub fn scenario_a() -> Vec<u8> {
    let video = VideoTrack::avc(1080, 1080);
    faststart(moov(1000, 4167, &[video.trak()]), 512 * 1024)
}

/// Portrait phone recording: HEVC 1920x1080 coded, rotated 90°, 30 fps,
/// 3.4 s, with an AAC track.
pub fn scenario_b() -> Vec<u8> {
    let video = VideoTrack {
        track_id: 1,
        format: *b"hvc1",
        config: hvcc_main(),
        width: 1920,
        height: 1080,
        rotation: 90,
        timescale: 600,
        duration: 2040,
        stts: vec![(102, 20)],
    };
    faststart(
        moov(600, 2040, &[video.trak(), aac_trak(2, 163_200)]),
        256 * 1024,
    )
}

// ===== Matroska =====

pub fn element(id: u32, payload: &[u8]) -> Vec<u8> {
    let mut out: Vec<u8> = id.to_be_bytes().into_iter().skip_while(|b| *b == 0).collect();
    out.extend(vint_size(payload.len() as u64));
    out.extend_from_slice(payload);
    out
}

/// Eight-byte size field, as muxers write for large elements.
pub fn vint_size(size: u64) -> Vec<u8> {
    let mut bytes = size.to_be_bytes();
    bytes[0] = 0x01;
    bytes.to_vec()
}

pub fn uint(id: u32, value: u64) -> Vec<u8> {
    let bytes: Vec<u8> = value.to_be_bytes().into_iter().skip_while(|b| *b == 0).collect();
    element(id, if bytes.is_empty() { &[0] } else { &bytes })
}

pub fn float(id: u32, value: f64) -> Vec<u8> {
    element(id, &value.to_be_bytes())
}

pub fn ebml_header(doc_type: &str) -> Vec<u8> {
    element(
        0x1A45_DFA3,
        &[
            uint(0x4286, 1),
            uint(0x42F7, 1),
            element(0x4282, doc_type.as_bytes()),
            uint(0x4287, 4),
            uint(0x4285, 2),
        ]
        .concat(),
    )
}

pub fn mkv_info(duration_ms: f64) -> Vec<u8> {
    element(
        0x1549_A966,
        &[uint(0x2A_D7B1, 1_000_000), float(0x4489, duration_ms)].concat(),
    )
}

pub fn mkv_video_entry(number: u64, codec_id: &str, width: u64, height: u64, frame_ns: u64) -> Vec<u8> {
    element(
        0xAE,
        &[
            uint(0xD7, number),
            uint(0x83, 1),
            element(0x86, codec_id.as_bytes()),
            uint(0x23_E383, frame_ns),
            element(0xE0, &[uint(0xB0, width), uint(0xBA, height)].concat()),
        ]
        .concat(),
    )
}

pub fn mkv_audio_entry(number: u64, codec_id: &str) -> Vec<u8> {
    element(
        0xAE,
        &[
            uint(0xD7, number),
            uint(0x83, 2),
            element(0x86, codec_id.as_bytes()),
            element(0xE1, &[float(0xB5, 48_000.0), uint(0x9F, 2)].concat()),
        ]
        .concat(),
    )
}

/// Cluster of `size` payload bytes.
pub fn cluster(size: usize) -> Vec<u8> {
    let mut payload = uint(0xE7, 0);
    payload.resize(size.max(payload.len()), 0);
    element(0x1F43_B675, &payload)
}

/// WebM file: VP9 1280x720 at 25 fps with Opus audio, 3.4 s.
pub fn webm(cluster_size: usize) -> Vec<u8> {
    let tracks = element(
        0x1654_AE6B,
        &[
            mkv_video_entry(1, "V_VP9", 1280, 720, 40_000_000),
            mkv_audio_entry(2, "A_OPUS"),
        ]
        .concat(),
    );
    let segment = element(
        0x1853_8067,
        &[mkv_info(3400.0), tracks, cluster(cluster_size)].concat(),
    );
    [ebml_header("webm"), segment].concat()
}

/// Segment with an unknown size, as written by live muxers.
pub fn live_mkv() -> Vec<u8> {
    let tracks = element(0x1654_AE6B, &mkv_video_entry(1, "V_MPEG4/ISO/AVC", 640, 360, 33_366_667));
    let mut segment = vec![0x18, 0x53, 0x80, 0x67, 0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];
    segment.extend(mkv_info(10_000.0));
    segment.extend(tracks);
    // Unknown-size cluster.
    segment.extend_from_slice(&[0x1F, 0x43, 0xB6, 0x75, 0xFF]);
    segment.extend(uint(0xE7, 0));
    segment.resize(segment.len() + 4096, 0);
    [ebml_header("matroska"), segment].concat()
}

// ===== Sources =====

/// A large virtual resource that is zero everywhere except a few regions.
///
/// Lets tests place real headers around multi-gigabyte payloads without
/// allocating them.
#[derive(Clone)]
pub struct SparseSource {
    length: u64,
    regions: Arc<Vec<(u64, Bytes)>>,
    reads: Arc<AtomicUsize>,
}

impl SparseSource {
    pub fn new(length: u64, regions: Vec<(u64, Vec<u8>)>) -> Self {
        Self {
            length,
            regions: Arc::new(
                regions
                    .into_iter()
                    .map(|(offset, data)| (offset, Bytes::from(data)))
                    .collect(),
            ),
            reads: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn materialize(&self, start: u64, end: u64) -> Bytes {
        let mut out = vec![0u8; (end - start) as usize];
        for (offset, data) in self.regions.iter() {
            let region_end = offset + data.len() as u64;
            let from = start.max(*offset);
            let to = end.min(region_end);
            if from < to {
                out[(from - start) as usize..(to - start) as usize]
                    .copy_from_slice(&data[(from - offset) as usize..(to - offset) as usize]);
            }
        }
        Bytes::from(out)
    }
}

#[async_trait]
impl ByteSource for SparseSource {
    fn name(&self) -> &'static str {
        "sparse"
    }

    async fn read(&self, range: Option<ByteRange>) -> Result<ByteStream> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let range = range.unwrap_or(ByteRange::starting_at(0));
        let start = range.start().min(self.length);
        let end = range
            .end_inclusive()
            .map_or(self.length, |last| (last + 1).min(self.length));
        let chunk = self.materialize(start, end.max(start));
        Ok(stream::iter(vec![Ok(chunk)]).boxed())
    }

    async fn length(&self) -> Result<u64> {
        Ok(self.length)
    }
}
