//! Hand landmark tracking
//!
//! The tracker is an opaque capability: given a frame, produce zero or more
//! hands with 21 landmarks each. Extraction runs on its own thread and every
//! completed extraction is reported as a [`TrackerEvent`], so the detection
//! cycle is driven by the tracker's completions rather than a fixed timer.

pub mod onnx;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, TrySendError};

use crate::camera::CameraFrame;
use crate::landmarks::Hand;

pub use onnx::OnnxHandLandmarker;

/// Tracker errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TrackerError {
    #[error("Hand landmark model not found: {0}")]
    ModelNotFound(String),
    #[error("ONNX Runtime error: {0}")]
    Runtime(String),
    #[error("Unexpected model output: {0}")]
    Output(String),
}

/// Frame in, hands out
pub trait LandmarkExtractor {
    fn extract(&mut self, frame: &CameraFrame) -> Result<Vec<Hand>, TrackerError>;
}

impl<T: LandmarkExtractor + ?Sized> LandmarkExtractor for Box<T> {
    fn extract(&mut self, frame: &CameraFrame) -> Result<Vec<Hand>, TrackerError> {
        (**self).extract(frame)
    }
}

/// Emitted by the tracker thread
#[derive(Debug, Clone, PartialEq)]
pub enum TrackerEvent {
    /// One extraction finished. Only the first hand is reported.
    Hands { frame_number: u64, hand: Option<Hand> },
    /// The extractor could not be created; no further events follow
    Unavailable(String),
}

/// Runs a landmark extractor on a background thread
pub struct HandTracker {
    /// Channel to send frames to the tracker thread
    frame_sender: Option<Sender<CameraFrame>>,
    /// Completed extractions
    events: Receiver<TrackerEvent>,
    /// Set once the extractor is constructed
    ready: Arc<AtomicBool>,
    thread_handle: Option<std::thread::JoinHandle<()>>,
}

impl HandTracker {
    /// Start the tracker. The extractor is built on the tracker thread, since
    /// model loading is slow and sessions need not be `Send`.
    pub fn spawn<E, F>(make_extractor: F) -> std::io::Result<Self>
    where
        E: LandmarkExtractor,
        F: FnOnce() -> Result<E, TrackerError> + Send + 'static,
    {
        // Capacity 1: while the extractor is busy, newer frames are dropped
        let (frame_sender, frame_receiver) = crossbeam_channel::bounded::<CameraFrame>(1);
        let (event_sender, events) = crossbeam_channel::unbounded::<TrackerEvent>();
        let ready = Arc::new(AtomicBool::new(false));

        let ready_clone = ready.clone();
        let thread_handle = std::thread::Builder::new()
            .name("hand-tracker".to_string())
            .spawn(move || {
                Self::tracker_thread(make_extractor, frame_receiver, event_sender, ready_clone);
            })?;

        Ok(Self {
            frame_sender: Some(frame_sender),
            events,
            ready,
            thread_handle: Some(thread_handle),
        })
    }

    fn tracker_thread<E, F>(
        make_extractor: F,
        frames: Receiver<CameraFrame>,
        events: Sender<TrackerEvent>,
        ready: Arc<AtomicBool>,
    ) where
        E: LandmarkExtractor,
        F: FnOnce() -> Result<E, TrackerError>,
    {
        let mut extractor = match make_extractor() {
            Ok(extractor) => extractor,
            Err(e) => {
                tracing::warn!("Hand tracker unavailable: {}", e);
                let _ = events.send(TrackerEvent::Unavailable(e.to_string()));
                return;
            }
        };
        ready.store(true, Ordering::Release);
        tracing::info!("Hand tracker started");

        while let Ok(frame) = frames.recv() {
            match extractor.extract(&frame) {
                Ok(hands) => {
                    let event = TrackerEvent::Hands {
                        frame_number: frame.frame_number,
                        hand: hands.into_iter().next(),
                    };
                    if events.send(event).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(frame = frame.frame_number, "Landmark extraction failed: {}", e);
                }
            }
        }

        ready.store(false, Ordering::Release);
        tracing::info!("Hand tracker stopped");
    }

    /// Offer a frame (non-blocking). Returns false when the tracker is busy
    /// or gone and the frame was dropped.
    pub fn submit(&self, frame: CameraFrame) -> bool {
        match self.frame_sender {
            Some(ref sender) => match sender.try_send(frame) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => false,
                Err(TrySendError::Disconnected(_)) => false,
            },
            None => false,
        }
    }

    /// Next event, if any
    pub fn try_recv(&self) -> Option<TrackerEvent> {
        self.events.try_recv().ok()
    }

    pub fn events(&self) -> &Receiver<TrackerEvent> {
        &self.events
    }

    /// Whether the extractor loaded and the thread is running
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Stop the tracker thread
    pub fn stop(&mut self) {
        self.frame_sender = None;
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for HandTracker {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    /// Reports a hand on even frame numbers
    struct EvenFrames;

    impl LandmarkExtractor for EvenFrames {
        fn extract(&mut self, frame: &CameraFrame) -> Result<Vec<Hand>, TrackerError> {
            if frame.frame_number % 2 == 0 {
                Ok(vec![crate::landmarks::test_hand(), Hand::default()])
            } else {
                Ok(Vec::new())
            }
        }
    }

    /// Blocks each extraction until released
    struct Gated {
        started: Sender<u64>,
        gate: Receiver<()>,
    }

    impl LandmarkExtractor for Gated {
        fn extract(&mut self, frame: &CameraFrame) -> Result<Vec<Hand>, TrackerError> {
            let _ = self.started.send(frame.frame_number);
            let _ = self.gate.recv();
            Ok(Vec::new())
        }
    }

    fn frame(number: u64) -> CameraFrame {
        let mut frame = CameraFrame::new(vec![0; 4], 1, 1);
        frame.frame_number = number;
        frame
    }

    fn next_event(tracker: &HandTracker) -> TrackerEvent {
        tracker
            .events()
            .recv_timeout(Duration::from_secs(5))
            .expect("tracker event")
    }

    #[test]
    fn test_events_follow_completions() {
        let tracker = HandTracker::spawn(|| Ok(EvenFrames)).unwrap();

        assert!(tracker.submit(frame(2)));
        match next_event(&tracker) {
            TrackerEvent::Hands { frame_number, hand } => {
                assert_eq!(frame_number, 2);
                // Only the first hand is forwarded
                assert_eq!(hand.unwrap().landmarks.len(), 21);
            }
            other => panic!("unexpected event: {:?}", other),
        }

        while !tracker.submit(frame(3)) {
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(
            next_event(&tracker),
            TrackerEvent::Hands {
                frame_number: 3,
                hand: None
            }
        );
        assert!(tracker.is_ready());
    }

    #[test]
    fn test_busy_tracker_drops_frames() {
        let (started_tx, started_rx) = crossbeam_channel::unbounded();
        let (gate_tx, gate_rx) = crossbeam_channel::unbounded();
        let tracker = HandTracker::spawn(move || {
            Ok(Gated {
                started: started_tx,
                gate: gate_rx,
            })
        })
        .unwrap();

        assert!(tracker.submit(frame(1)));
        assert_eq!(started_rx.recv_timeout(Duration::from_secs(5)).unwrap(), 1);

        // One frame may wait while the extractor is busy; the next is dropped
        assert!(tracker.submit(frame(2)));
        assert!(!tracker.submit(frame(3)));

        gate_tx.send(()).unwrap();
        gate_tx.send(()).unwrap();
        assert_eq!(started_rx.recv_timeout(Duration::from_secs(5)).unwrap(), 2);
    }

    #[test]
    fn test_unavailable_extractor() {
        let tracker =
            HandTracker::spawn(|| Err::<EvenFrames, _>(TrackerError::ModelNotFound("x.onnx".into()))).unwrap();
        match next_event(&tracker) {
            TrackerEvent::Unavailable(msg) => assert!(msg.contains("x.onnx")),
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(!tracker.is_ready());
        // The thread is gone, so frames are refused
        std::thread::sleep(Duration::from_millis(20));
        assert!(!tracker.submit(frame(1)));
    }
}
