//! MJPEG video feed reader
//!
//! In remote mode the prediction service owns the webcam and streams annotated
//! frames as `multipart/x-mixed-replace`. Each part is a JPEG.

use std::io::{BufRead, BufReader, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::{CameraError, CameraFrame, FrameSlots, FrameSource};

/// Extract the boundary from a `multipart/x-mixed-replace` content type
pub fn parse_boundary(content_type: &str) -> Option<String> {
    let mut parts = content_type.split(';').map(str::trim);
    let mime = parts.next()?;
    if !mime.eq_ignore_ascii_case("multipart/x-mixed-replace") {
        return None;
    }

    parts.find_map(|param| {
        let (name, value) = param.split_once('=')?;
        if !name.trim().eq_ignore_ascii_case("boundary") {
            return None;
        }
        let value = value.trim().trim_matches('"');
        let value = value.strip_prefix("--").unwrap_or(value);
        (!value.is_empty()).then(|| value.to_string())
    })
}

/// Largest part body accepted from a feed
pub const MAX_PART_LEN: usize = 16 * 1024 * 1024;

fn oversized(len: usize) -> CameraError {
    CameraError::Stream(format!("part of {} bytes exceeds the {} byte limit", len, MAX_PART_LEN))
}

fn stream_err(e: std::io::Error) -> CameraError {
    CameraError::Stream(e.to_string())
}

/// Splits a multipart body into parts
pub struct MultipartReader<R> {
    reader: R,
    /// Delimiter line including the leading `--`
    delimiter: Vec<u8>,
    /// Set when a part without Content-Length already consumed the next delimiter
    at_part_start: bool,
}

impl<R: BufRead> MultipartReader<R> {
    pub fn new(reader: R, boundary: &str) -> Self {
        Self {
            reader,
            delimiter: format!("--{}", boundary).into_bytes(),
            at_part_start: false,
        }
    }

    /// Read one raw line (with terminator), failing on EOF
    fn read_line(&mut self, line: &mut Vec<u8>) -> Result<(), CameraError> {
        line.clear();
        let n = (&mut self.reader)
            .take(MAX_PART_LEN as u64 + 1)
            .read_until(b'\n', line)
            .map_err(stream_err)?;
        if n == 0 {
            return Err(CameraError::Stream("stream ended".to_string()));
        }
        if line.len() > MAX_PART_LEN {
            return Err(oversized(line.len()));
        }
        Ok(())
    }

    /// Some(true) for the closing delimiter, Some(false) for a part delimiter
    fn delimiter_kind(&self, line: &[u8]) -> Option<bool> {
        let line = trim_line(line);
        let rest = line.strip_prefix(self.delimiter.as_slice())?;
        match rest {
            b"" => Some(false),
            b"--" => Some(true),
            _ => None,
        }
    }

    /// Return the body of the next part
    pub fn next_part(&mut self) -> Result<Vec<u8>, CameraError> {
        let mut line = Vec::new();

        if !self.at_part_start {
            // Skip preamble and blank lines up to the delimiter
            loop {
                self.read_line(&mut line)?;
                match self.delimiter_kind(&line) {
                    Some(false) => break,
                    Some(true) => return Err(CameraError::Stream("stream closed by server".to_string())),
                    None => {}
                }
            }
        }
        self.at_part_start = false;

        let mut content_length = None;
        loop {
            self.read_line(&mut line)?;
            let header = trim_line(&line);
            if header.is_empty() {
                break;
            }
            let header = String::from_utf8_lossy(header);
            if let Some((name, value)) = header.split_once(':') {
                if name.trim().eq_ignore_ascii_case("content-length") {
                    content_length = value.trim().parse::<usize>().ok();
                }
            }
        }

        match content_length {
            Some(len) if len > MAX_PART_LEN => Err(oversized(len)),
            Some(len) => {
                let mut body = vec![0u8; len];
                self.reader.read_exact(&mut body).map_err(stream_err)?;
                Ok(body)
            }
            None => self.read_until_delimiter(),
        }
    }

    /// Body without a Content-Length: everything before the next delimiter line,
    /// minus the line break that precedes it
    fn read_until_delimiter(&mut self) -> Result<Vec<u8>, CameraError> {
        let mut body = Vec::new();
        let mut line = Vec::new();

        loop {
            self.read_line(&mut line)?;
            if self.delimiter_kind(&line) == Some(false) {
                self.at_part_start = true;
                break;
            }
            if self.delimiter_kind(&line) == Some(true) {
                break;
            }
            body.extend_from_slice(&line);
            if body.len() > MAX_PART_LEN {
                return Err(oversized(body.len()));
            }
        }

        if body.ends_with(b"\n") {
            body.pop();
        }
        if body.ends_with(b"\r") {
            body.pop();
        }
        Ok(body)
    }
}

fn trim_line(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Decode one JPEG part into an RGBA frame
pub fn decode_jpeg(bytes: &[u8]) -> Result<CameraFrame, CameraError> {
    let image = image::load_from_memory_with_format(bytes, image::ImageFormat::Jpeg)
        .map_err(|e| CameraError::Decode(e.to_string()))?
        .to_rgba8();
    let (width, height) = image.dimensions();
    Ok(CameraFrame::new(image.into_raw(), width, height))
}

/// A connected MJPEG feed
pub struct MjpegStream {
    parts: MultipartReader<BufReader<Box<dyn Read + Send + Sync>>>,
    url: String,
}

impl MjpegStream {
    /// Connect and validate the multipart content type
    pub fn connect(url: &str, connect_timeout: Duration, read_timeout: Duration) -> Result<Self, CameraError> {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(connect_timeout)
            .timeout_read(read_timeout)
            .build();

        let response = agent.get(url).call().map_err(|e| match e {
            ureq::Error::Status(code, _) => CameraError::Open(format!("{} returned {}", url, code)),
            ureq::Error::Transport(t) => CameraError::Open(t.to_string()),
        })?;

        let content_type = response.header("Content-Type").unwrap_or_default().to_string();
        let boundary = parse_boundary(&content_type).ok_or_else(|| {
            CameraError::Stream(format!("not an MJPEG stream (content type {:?})", content_type))
        })?;

        tracing::info!(url, boundary = %boundary, "Connected to video feed");

        Ok(Self {
            parts: MultipartReader::new(BufReader::new(response.into_reader()), &boundary),
            url: url.to_string(),
        })
    }

    /// Block until the next frame arrives
    pub fn read_frame(&mut self) -> Result<CameraFrame, CameraError> {
        let bytes = self.parts.next_part()?;
        decode_jpeg(&bytes)
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Frame source fed by a remote MJPEG feed
pub struct MjpegCapture {
    slots: FrameSlots,
    running: Arc<AtomicBool>,
    thread_handle: Option<std::thread::JoinHandle<()>>,
    url: String,
}

impl MjpegCapture {
    /// Connect to the feed and start reading frames on a background thread.
    ///
    /// The connection is made on the reader thread; this waits for it at most
    /// `connect_timeout`.
    pub fn start(url: &str, connect_timeout: Duration, read_timeout: Duration) -> Result<Self, CameraError> {
        let slots = FrameSlots::default();
        let running = Arc::new(AtomicBool::new(true));
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<(), CameraError>>(1);

        let slots_clone = slots.clone();
        let running_clone = running.clone();
        let thread_url = url.to_string();

        let thread_handle = std::thread::Builder::new()
            .name("video-feed".to_string())
            .spawn(move || {
                let mut stream = match MjpegStream::connect(&thread_url, connect_timeout, read_timeout) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                if ready_tx.send(Ok(())).is_err() {
                    return;
                }
                Self::reader_thread(&mut stream, &slots_clone, &running_clone);
            })
            .map_err(|e| CameraError::Thread(e.to_string()))?;

        // Leave headroom for the response headers after the TCP connect
        match ready_rx.recv_timeout(connect_timeout + read_timeout) {
            Ok(Ok(())) => Ok(Self {
                slots,
                running,
                thread_handle: Some(thread_handle),
                url: url.to_string(),
            }),
            Ok(Err(e)) => {
                let _ = thread_handle.join();
                Err(e)
            }
            Err(_) => {
                running.store(false, Ordering::Release);
                Err(CameraError::Timeout(connect_timeout))
            }
        }
    }

    fn reader_thread(stream: &mut MjpegStream, slots: &FrameSlots, running: &AtomicBool) {
        while running.load(Ordering::Acquire) {
            match stream.read_frame() {
                Ok(frame) => {
                    slots.publish(frame);
                }
                Err(CameraError::Decode(msg)) => {
                    tracing::warn!("Skipping frame: {}", msg);
                }
                Err(e) => {
                    tracing::error!(url = stream.url(), "Video feed lost: {}", e);
                    break;
                }
            }
        }
        running.store(false, Ordering::Release);
        tracing::info!("Video feed reader stopped");
    }
}

impl FrameSource for MjpegCapture {
    fn latest_frame(&self) -> Option<CameraFrame> {
        self.slots.latest()
    }

    fn frame_count(&self) -> u64 {
        self.slots.count()
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn describe(&self) -> String {
        format!("Video feed {}", self.url)
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        // The reader may be blocked in a socket read; it exits on the next frame
        // or when the read timeout fires, so don't join here.
        self.thread_handle.take();
    }
}

impl Drop for MjpegCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_parse_boundary() {
        assert_eq!(
            parse_boundary("multipart/x-mixed-replace; boundary=frame").as_deref(),
            Some("frame")
        );
        assert_eq!(
            parse_boundary("multipart/x-mixed-replace;boundary=\"--myboundary\"").as_deref(),
            Some("myboundary")
        );
        assert_eq!(parse_boundary("image/jpeg"), None);
        assert_eq!(parse_boundary("multipart/x-mixed-replace"), None);
    }

    #[test]
    fn test_parts_with_content_length() {
        let body = b"--frame\r\nContent-Type: image/jpeg\r\nContent-Length: 3\r\n\r\nabc\r\n\
--frame\r\nContent-Length: 2\r\n\r\nxy\r\n"
            .to_vec();
        let mut reader = MultipartReader::new(Cursor::new(body), "frame");
        assert_eq!(reader.next_part().unwrap(), b"abc");
        assert_eq!(reader.next_part().unwrap(), b"xy");
        assert!(matches!(reader.next_part(), Err(CameraError::Stream(_))));
    }

    #[test]
    fn test_parts_without_content_length() {
        // The Flask-style feed: no Content-Length, binary body may contain newlines
        let body = b"--frame\r\nContent-Type: image/jpeg\r\n\r\nab\ncd\r\n\
--frame\r\nContent-Type: image/jpeg\r\n\r\nef\r\n--frame--\r\n"
            .to_vec();
        let mut reader = MultipartReader::new(Cursor::new(body), "frame");
        assert_eq!(reader.next_part().unwrap(), b"ab\ncd");
        assert_eq!(reader.next_part().unwrap(), b"ef");
        assert!(reader.next_part().is_err());
    }

    #[test]
    fn test_oversized_content_length_is_rejected() {
        let body = b"--frame\r\nContent-Length: 18446744073709551615\r\n\r\nabc".to_vec();
        let mut reader = MultipartReader::new(Cursor::new(body), "frame");
        assert!(matches!(reader.next_part(), Err(CameraError::Stream(msg)) if msg.contains("limit")));

        let body = format!("--frame\r\nContent-Length: {}\r\n\r\nabc", MAX_PART_LEN + 1).into_bytes();
        let mut reader = MultipartReader::new(Cursor::new(body), "frame");
        assert!(matches!(reader.next_part(), Err(CameraError::Stream(_))));
    }

    #[test]
    fn test_unterminated_part_is_bounded() {
        let mut body = b"--frame\r\n\r\n".to_vec();
        body.resize(body.len() + MAX_PART_LEN + 16, b'x');
        let mut reader = MultipartReader::new(Cursor::new(body), "frame");
        assert!(matches!(reader.next_part(), Err(CameraError::Stream(msg)) if msg.contains("limit")));
    }

    #[test]
    fn test_preamble_skipped() {
        let body = b"\r\nsome preamble\r\n--b\r\nContent-Length: 1\r\n\r\nz".to_vec();
        let mut reader = MultipartReader::new(Cursor::new(body), "b");
        assert_eq!(reader.next_part().unwrap(), b"z");
    }

    #[test]
    fn test_decode_jpeg() {
        let image = image::RgbImage::from_pixel(8, 4, image::Rgb([200, 10, 10]));
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgb8(image)
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Jpeg)
            .unwrap();

        let frame = decode_jpeg(&bytes).unwrap();
        assert_eq!((frame.width, frame.height), (8, 4));
        assert_eq!(frame.data.len(), 8 * 4 * 4);

        assert!(matches!(decode_jpeg(b"not a jpeg"), Err(CameraError::Decode(_))));
    }
}
