//! Remote-mode video feed against a mock MJPEG endpoint
//!
//! Run with: cargo test --test video_feed

mod common;

use std::io::Cursor;
use std::thread;
use std::time::{Duration, Instant};

use axum::http::header;
use axum::routing::get;
use axum::Router;

use sign_detection::camera::{CameraError, FrameSource, MjpegCapture, MjpegStream};

fn wait_until_stopped(capture: &MjpegCapture) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while capture.is_running() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
}

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const READ_TIMEOUT: Duration = Duration::from_secs(2);

fn jpeg(width: u32, height: u32, shade: u8) -> Vec<u8> {
    let image = image::RgbImage::from_pixel(width, height, image::Rgb([shade, 40, 90]));
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Jpeg)
        .unwrap();
    bytes
}

/// Body in the shape a Flask `Response(gen(), mimetype=...)` feed produces
fn feed_body(frames: &[Vec<u8>]) -> Vec<u8> {
    let mut body = Vec::new();
    for frame in frames {
        body.extend_from_slice(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n");
        body.extend_from_slice(frame);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(b"--frame--\r\n");
    body
}

fn feed_server(frames: Vec<Vec<u8>>) -> String {
    raw_feed_server(feed_body(&frames))
}

fn raw_feed_server(body: Vec<u8>) -> String {
    let router = Router::new().route(
        "/video_feed",
        get(move || {
            let body = body.clone();
            async move {
                (
                    [(header::CONTENT_TYPE, "multipart/x-mixed-replace; boundary=frame")],
                    body,
                )
            }
        }),
    );
    format!("{}/video_feed", common::spawn_server(router))
}

#[test]
fn test_stream_reads_frames_in_order() {
    let url = feed_server(vec![jpeg(16, 8, 10), jpeg(32, 16, 200)]);
    let mut stream = MjpegStream::connect(&url, CONNECT_TIMEOUT, READ_TIMEOUT).unwrap();

    let first = stream.read_frame().unwrap();
    assert_eq!((first.width, first.height), (16, 8));
    assert_eq!(first.data.len(), 16 * 8 * 4);

    let second = stream.read_frame().unwrap();
    assert_eq!((second.width, second.height), (32, 16));

    assert!(matches!(stream.read_frame(), Err(CameraError::Stream(_))));
}

#[test]
fn test_non_multipart_feed_is_rejected() {
    let router = Router::new().route(
        "/video_feed",
        get(|| async { ([(header::CONTENT_TYPE, "image/jpeg")], jpeg(4, 4, 0)) }),
    );
    let url = format!("{}/video_feed", common::spawn_server(router));

    let result = MjpegStream::connect(&url, CONNECT_TIMEOUT, READ_TIMEOUT);
    assert!(matches!(result, Err(CameraError::Stream(_))));
}

#[test]
fn test_missing_feed_is_open_error() {
    let url = format!("{}/video_feed", common::spawn_server(Router::new()));

    let result = MjpegStream::connect(&url, CONNECT_TIMEOUT, READ_TIMEOUT);
    assert!(matches!(result, Err(CameraError::Open(msg)) if msg.contains("404")));
}

#[test]
fn test_unreachable_feed() {
    let url = format!("{}/video_feed", common::closed_port_url());

    let result = MjpegCapture::start(&url, CONNECT_TIMEOUT, READ_TIMEOUT);
    assert!(matches!(result, Err(CameraError::Open(_))));
}

#[test]
fn test_capture_publishes_frames_until_feed_ends() {
    let url = feed_server(vec![jpeg(8, 8, 0), jpeg(8, 8, 100), jpeg(24, 12, 250)]);
    let mut capture = MjpegCapture::start(&url, CONNECT_TIMEOUT, READ_TIMEOUT).unwrap();
    assert!(capture.describe().contains("/video_feed"));

    wait_until_stopped(&capture);

    assert!(!capture.is_running(), "reader should stop when the feed closes");
    assert_eq!(capture.frame_count(), 3);
    let latest = capture.latest_frame().expect("a published frame");
    assert_eq!((latest.width, latest.height), (24, 12));

    // Stopping a finished capture is harmless
    capture.stop();
    assert!(!capture.is_running());
}

#[test]
fn test_undecodable_frame_is_skipped() {
    let url = feed_server(vec![jpeg(8, 8, 0), b"not a jpeg".to_vec(), jpeg(20, 10, 180)]);

    let mut stream = MjpegStream::connect(&url, CONNECT_TIMEOUT, READ_TIMEOUT).unwrap();
    assert!(stream.read_frame().is_ok());
    assert!(matches!(stream.read_frame(), Err(CameraError::Decode(_))));
    assert!(stream.read_frame().is_ok());

    let capture = MjpegCapture::start(&url, CONNECT_TIMEOUT, READ_TIMEOUT).unwrap();
    wait_until_stopped(&capture);
    assert_eq!(capture.frame_count(), 2);
    let latest = capture.latest_frame().expect("a published frame");
    assert_eq!((latest.width, latest.height), (20, 10));
}

#[test]
fn test_oversized_part_stops_the_reader() {
    let mut body = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n".to_vec();
    body.extend_from_slice(&jpeg(8, 8, 0));
    body.extend_from_slice(b"\r\n--frame\r\nContent-Length: 18446744073709551615\r\n\r\nabc\r\n");
    let url = raw_feed_server(body);

    let capture = MjpegCapture::start(&url, CONNECT_TIMEOUT, READ_TIMEOUT).unwrap();
    wait_until_stopped(&capture);

    assert!(!capture.is_running(), "reader should report the feed as lost");
    assert_eq!(capture.frame_count(), 1);
}
