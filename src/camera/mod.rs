//! Video sources
//!
//! The local webcam (nokhwa) and the remote MJPEG feed both run on their own
//! thread and publish into [`FrameSlots`]; the window only ever reads the
//! newest frame through [`FrameSource`].

pub mod mjpeg;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use nokhwa::pixel_format::RgbAFormat;
use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType, Resolution};
use nokhwa::Camera;
use parking_lot::Mutex;

use crate::config::CameraSettings;

pub use mjpeg::{MjpegCapture, MjpegStream};

/// Camera frame data
#[derive(Clone)]
pub struct CameraFrame {
    /// RGBA pixel data
    pub data: Arc<Vec<u8>>,
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Frame number, starting at 1
    pub frame_number: u64,
    /// Frame timestamp
    pub timestamp: Instant,
}

impl CameraFrame {
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            data: Arc::new(data),
            width,
            height,
            frame_number: 0,
            timestamp: Instant::now(),
        }
    }
}

impl std::fmt::Debug for CameraFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("frame_number", &self.frame_number)
            .finish()
    }
}

/// Camera acquisition errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CameraError {
    #[error("No camera found")]
    NoDevice,
    #[error("Camera access denied: {0}")]
    PermissionDenied(String),
    #[error("Failed to open camera: {0}")]
    Open(String),
    #[error("Camera did not open within {0:?}")]
    Timeout(Duration),
    #[error("Failed to spawn capture thread: {0}")]
    Thread(String),
    #[error("Video stream error: {0}")]
    Stream(String),
    /// One frame could not be decoded; the stream itself is still usable
    #[error("Bad video frame: {0}")]
    Decode(String),
}

impl CameraError {
    /// Classify a backend error message
    pub fn from_backend(message: String) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("permission") || lower.contains("denied") || lower.contains("not authorized") {
            CameraError::PermissionDenied(message)
        } else {
            CameraError::Open(message)
        }
    }
}

/// A source of video frames attached to the window
///
/// Exactly one source is attached at a time; dropping or stopping it releases
/// the underlying device or connection.
pub trait FrameSource: Send {
    /// Newest published frame, if any
    fn latest_frame(&self) -> Option<CameraFrame>;
    /// Number of frames captured so far
    fn frame_count(&self) -> u64;
    /// Whether the capture thread is still delivering frames
    fn is_running(&self) -> bool;
    /// Human-readable name for the status bar
    fn describe(&self) -> String;
    /// Stop capturing and release the device
    fn stop(&mut self);
}

/// Latest-frame slots shared between a capture thread and the render thread
#[derive(Clone, Default)]
pub(crate) struct FrameSlots {
    /// Triple buffered so a slow reader never blocks the writer
    frames: Arc<[Mutex<Option<CameraFrame>>; 3]>,
    /// Frame number of the latest complete frame (0 = none yet)
    latest: Arc<AtomicU64>,
}

impl FrameSlots {
    /// Store a frame, assigning it the next frame number
    pub fn publish(&self, mut frame: CameraFrame) -> u64 {
        let frame_number = self.latest.load(Ordering::Acquire) + 1;
        frame.frame_number = frame_number;

        let slot = (frame_number % 3) as usize;
        *self.frames[slot].lock() = Some(frame);
        self.latest.store(frame_number, Ordering::Release);
        frame_number
    }

    pub fn latest(&self) -> Option<CameraFrame> {
        let frame_number = self.latest.load(Ordering::Acquire);
        if frame_number == 0 {
            return None;
        }
        let slot = (frame_number % 3) as usize;
        self.frames[slot].lock().clone()
    }

    pub fn count(&self) -> u64 {
        self.latest.load(Ordering::Acquire)
    }
}

/// A camera the user can pick
#[derive(Clone, Debug)]
pub struct CameraInfo {
    /// Camera index
    pub index: u32,
    /// Camera name
    pub name: String,
}

/// Webcam capture
pub struct CameraCapture {
    slots: FrameSlots,
    running: Arc<AtomicBool>,
    /// Capture thread handle
    thread_handle: Option<std::thread::JoinHandle<()>>,
    /// Name and negotiated resolution
    name: String,
    width: u32,
    height: u32,
}

/// What the capture thread reports once the device is open
struct Opened {
    name: String,
    width: u32,
    height: u32,
}

impl CameraCapture {
    /// Cameras reported by the platform backend; empty on failure
    pub fn list_cameras() -> Vec<CameraInfo> {
        match nokhwa::query(nokhwa::utils::ApiBackend::Auto) {
            Ok(camera_list) => camera_list
                .iter()
                .enumerate()
                .map(|(idx, info)| CameraInfo {
                    index: idx as u32,
                    name: info.human_name().to_string(),
                })
                .collect(),
            Err(e) => {
                tracing::warn!("Failed to enumerate cameras: {}", e);
                Vec::new()
            }
        }
    }

    /// Open the configured camera and start streaming.
    ///
    /// Returns only after the device opened (or failed to), so errors such as a
    /// denied permission surface here instead of on the capture thread.
    pub fn start(settings: &CameraSettings) -> Result<Self, CameraError> {
        let slots = FrameSlots::default();
        let running = Arc::new(AtomicBool::new(true));
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<Opened, CameraError>>(1);

        let slots_clone = slots.clone();
        let running_clone = running.clone();
        let camera_index = settings.index;
        let resolution = Resolution::new(settings.width, settings.height);

        let thread_handle = std::thread::Builder::new()
            .name("camera-capture".to_string())
            .spawn(move || {
                Self::capture_thread(camera_index, resolution, slots_clone, running_clone, ready_tx);
            })
            .map_err(|e| CameraError::Thread(e.to_string()))?;

        match ready_rx.recv_timeout(settings.open_timeout()) {
            Ok(Ok(opened)) => {
                tracing::info!(
                    camera = %opened.name,
                    width = opened.width,
                    height = opened.height,
                    "Camera capture started"
                );
                Ok(Self {
                    slots,
                    running,
                    thread_handle: Some(thread_handle),
                    name: opened.name,
                    width: opened.width,
                    height: opened.height,
                })
            }
            Ok(Err(e)) => {
                let _ = thread_handle.join();
                Err(e)
            }
            Err(_) => {
                // The thread notices `running` once the open call returns
                running.store(false, Ordering::Release);
                Err(CameraError::Timeout(settings.open_timeout()))
            }
        }
    }

    fn open_camera(camera_index: u32, resolution: Resolution) -> Result<Camera, CameraError> {
        let index = CameraIndex::Index(camera_index);

        let requested = RequestedFormat::new::<RgbAFormat>(RequestedFormatType::HighestResolution(resolution));
        let first_err = match Camera::new(index.clone(), requested) {
            Ok(camera) => return Ok(camera),
            Err(e) => e,
        };
        tracing::warn!("Failed to open camera at {}: {}", resolution, first_err);

        let requested = RequestedFormat::new::<RgbAFormat>(RequestedFormatType::AbsoluteHighestResolution);
        if let Ok(camera) = Camera::new(index.clone(), requested) {
            return Ok(camera);
        }

        // Last resort: whatever format the device offers
        let requested = RequestedFormat::new::<RgbAFormat>(RequestedFormatType::None);
        Camera::new(index, requested).map_err(|e| CameraError::from_backend(e.to_string()))
    }

    /// Camera capture thread
    fn capture_thread(
        camera_index: u32,
        resolution: Resolution,
        slots: FrameSlots,
        running: Arc<AtomicBool>,
        ready: crossbeam_channel::Sender<Result<Opened, CameraError>>,
    ) {
        tracing::info!("Starting camera capture thread (camera {})", camera_index);

        if matches!(nokhwa::query(nokhwa::utils::ApiBackend::Auto), Ok(list) if list.is_empty()) {
            let _ = ready.send(Err(CameraError::NoDevice));
            return;
        }

        let mut camera = match Self::open_camera(camera_index, resolution) {
            Ok(camera) => camera,
            Err(e) => {
                tracing::error!("Failed to open camera: {}", e);
                let _ = ready.send(Err(e));
                return;
            }
        };

        if let Err(e) = camera.open_stream() {
            tracing::error!("Failed to open camera stream: {}", e);
            let _ = ready.send(Err(CameraError::from_backend(e.to_string())));
            return;
        }

        let opened = Opened {
            name: camera.info().human_name().to_string(),
            width: camera.resolution().width(),
            height: camera.resolution().height(),
        };
        if ready.send(Ok(opened)).is_err() || !running.load(Ordering::Acquire) {
            // Caller gave up waiting
            let _ = camera.stop_stream();
            return;
        }

        while running.load(Ordering::Acquire) {
            match camera.frame() {
                Ok(buffer) => match buffer.decode_image::<RgbAFormat>() {
                    Ok(image) => {
                        let width = image.width();
                        let height = image.height();
                        slots.publish(CameraFrame::new(image.into_raw(), width, height));
                    }
                    Err(e) => {
                        tracing::warn!("Failed to decode frame: {}", e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to capture frame: {}", e);
                    std::thread::sleep(Duration::from_millis(10));
                }
            }
        }

        if let Err(e) = camera.stop_stream() {
            tracing::warn!("Failed to stop camera stream: {}", e);
        }
        tracing::info!("Camera capture thread stopped");
    }

    /// Get the negotiated camera resolution
    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl FrameSource for CameraCapture {
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
        format!("{} ({}x{})", self.name, self.width, self.height)
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
            tracing::info!("Camera released");
        }
    }
}

impl Drop for CameraCapture {
    fn drop(&mut self) {
        self.stop();
    }
}
