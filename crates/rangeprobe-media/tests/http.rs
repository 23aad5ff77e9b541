//! HTTP source behavior against a mock server.

mod common;

use assert_matches::assert_matches;
use common::*;
use rangeprobe_media::source::HttpSource;
use rangeprobe_media::{
    parse_media, ByteRange, ByteSource, Dimensions, Error, ErrorKind, FieldName, ParseOptions, ParseRequest,
    Resolved, SessionState,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Serves `Range` requests from an in-memory body, like a static file server.
struct RangeResponder {
    body: Vec<u8>,
    honor_range: bool,
}

impl Respond for RangeResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let len = self.body.len();
        let range = request
            .headers
            .get("range")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("bytes="))
            .and_then(|bounds| {
                let (start, end) = bounds.split_once('-')?;
                let start: usize = start.parse().ok()?;
                let end: usize = if end.is_empty() {
                    len - 1
                } else {
                    end.parse::<usize>().ok()?.min(len - 1)
                };
                Some((start, end))
            });

        match range {
            Some((start, _)) if self.honor_range && start >= len => ResponseTemplate::new(416),
            Some((start, end)) if self.honor_range => ResponseTemplate::new(206)
                .insert_header("content-range", format!("bytes {start}-{end}/{len}").as_str())
                .set_body_bytes(self.body[start..=end].to_vec()),
            _ => ResponseTemplate::new(200).set_body_bytes(self.body.clone()),
        }
    }
}

async fn serve(body: Vec<u8>, with_length: bool, honor_range: bool) -> MockServer {
    let server = MockServer::start().await;

    let head = if with_length {
        ResponseTemplate::new(200).insert_header("content-length", body.len().to_string().as_str())
    } else {
        ResponseTemplate::new(200)
    };
    Mock::given(method("HEAD"))
        .and(path("/clip.mp4"))
        .respond_with(head)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/clip.mp4"))
        .respond_with(RangeResponder { body, honor_range })
        .mount(&server)
        .await;

    server
}

async fn range_headers(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.method.as_str() == "GET")
        .map(|r| {
            r.headers
                .get("range")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string()
        })
        .collect()
}

#[tokio::test]
async fn test_head_without_content_length() {
    let server = serve(scenario_a(), false, true).await;
    let source = HttpSource::new(&format!("{}/clip.mp4", server.uri())).unwrap();

    assert_matches!(source.length().await, Err(Error::LengthUnavailable(_)));
}

#[tokio::test]
async fn test_head_reports_length() {
    let body = scenario_a();
    let expected = body.len() as u64;
    let server = serve(body, true, true).await;
    let source = HttpSource::new(&format!("{}/clip.mp4", server.uri())).unwrap();

    assert_eq!(source.length().await.unwrap(), expected);
}

#[tokio::test]
async fn test_rotated_clip_over_http_uses_one_range_request() {
    let server = serve(scenario_b(), true, true).await;
    let source = HttpSource::new(&format!("{}/clip.mp4", server.uri())).unwrap();

    let result = parse_media(source, ParseOptions::new(ParseRequest::all()))
        .await
        .unwrap();

    assert_eq!(result.duration_in_seconds.resolved(), Some(&3.4));
    assert_eq!(result.dimensions.resolved(), Some(&Dimensions::new(1920, 1080)));
    assert_eq!(result.fps.resolved(), Some(&30.0));
    assert_eq!(result.stats.state, SessionState::FullyResolved);
    assert_eq!(range_headers(&server).await, vec!["bytes=0-65535".to_string()]);
}

#[tokio::test]
async fn test_moov_at_end_over_http() {
    let video = VideoTrack::avc(1280, 720);
    let file = moov_at_end(moov(1000, 12_000, &[video.trak()]), 2 * 1024 * 1024);
    let moov_offset = file.len() - moov(1000, 12_000, &[video.trak()]).len();
    let server = serve(file, true, true).await;
    let source = HttpSource::new(&format!("{}/clip.mp4", server.uri())).unwrap();

    let result = parse_media(
        source,
        ParseOptions::new(
            ParseRequest::new()
                .with(FieldName::DurationInSeconds)
                .with(FieldName::Dimensions),
        ),
    )
    .await
    .unwrap();

    assert_eq!(result.duration_in_seconds.resolved(), Some(&12.0));
    assert_eq!(result.dimensions.resolved(), Some(&Dimensions::new(1280, 720)));

    let ranges = range_headers(&server).await;
    assert_eq!(ranges.len(), 2);
    assert!(ranges[1].starts_with(&format!("bytes={moov_offset}-")));
}

#[tokio::test]
async fn test_unknown_length_reads_open_ended_range() {
    let server = serve(scenario_a(), false, true).await;
    let source = HttpSource::new(&format!("{}/clip.mp4", server.uri())).unwrap();

    let result = parse_media(
        source,
        ParseOptions::new(ParseRequest::new().with(FieldName::DurationInSeconds)),
    )
    .await
    .unwrap();

    assert_eq!(result.duration_in_seconds.resolved(), Some(&4.167));
    assert_eq!(range_headers(&server).await, vec!["bytes=0-".to_string()]);
}

#[tokio::test]
async fn test_server_ignoring_range_header() {
    let video = VideoTrack::avc(640, 480);
    let file = moov_at_end(moov(1000, 1500, &[video.trak()]), 128 * 1024);
    let server = serve(file, true, false).await;
    let source = HttpSource::new(&format!("{}/clip.mp4", server.uri())).unwrap();

    let result = parse_media(
        source,
        ParseOptions::new(ParseRequest::new().with(FieldName::Dimensions)),
    )
    .await
    .unwrap();

    assert_eq!(result.dimensions.resolved(), Some(&Dimensions::new(640, 480)));
}

#[tokio::test]
async fn test_identifier_without_scheme_fails_before_any_request() {
    let server = serve(scenario_a(), true, true).await;
    // host:port/path, no scheme
    let identifier = format!("{}/clip.mp4", server.address());

    let err = HttpSource::new(&identifier).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidSource);
    assert!(err.to_string().contains("needs to start with http"));
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn test_missing_resource_is_a_session_error() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    let source = HttpSource::new(&format!("{}/missing.mp4", server.uri())).unwrap();

    let err = parse_media(
        source,
        ParseOptions::new(ParseRequest::new().with(FieldName::DurationInSeconds)),
    )
    .await
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Http);
}

#[tokio::test]
async fn test_empty_partial_response_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/clip.mp4"))
        .respond_with(ResponseTemplate::new(206).insert_header("content-length", "0"))
        .mount(&server)
        .await;
    let source = HttpSource::new(&format!("{}/clip.mp4", server.uri())).unwrap();

    let err = match source.read(ByteRange::bounded(0, 65_535)).await {
        Ok(_) => panic!("an empty 206 body must not be streamed"),
        Err(err) => err,
    };
    assert_eq!(err.kind(), ErrorKind::EmptyBody);
}
