//! Detection session state
//!
//! [`DetectionSession`] is the single owner of detection state: the last hand
//! seen, the current prediction, the request bookkeeping and user notices.
//! Tracker events and prediction replies are fed in on the UI thread; the
//! render pass reads a [`DetectionSnapshot`].
//!
//! Each start, stop and hand loss advances the session epoch. Prediction jobs
//! carry the epoch they were issued under and replies from an older epoch are
//! dropped, so nothing that arrives after toggle-off can change state.

pub mod notify;

use std::time::{Duration, Instant};

use crate::camera::CameraError;
use crate::config::DetectionSettings;
use crate::landmarks::{FeatureVector, Hand, LandmarkFallback};
use crate::predict::{JobKind, PredictError, PredictJob, Prediction, PredictionReply, ReplyOutcome, ToggleStatus};

pub use notify::{Notice, NoticeLevel, Notices};

/// Where the detection cycle is
#[derive(Debug, Clone, Default, PartialEq)]
pub enum DetectionState {
    /// Camera off
    #[default]
    Inactive,
    /// Camera on, no hand in view
    NoHand,
    /// Hand in view, waiting for a prediction
    Analyzing,
    /// Hand in view with a classified sign
    Result(Prediction),
}

impl DetectionState {
    pub fn is_active(&self) -> bool {
        !matches!(self, DetectionState::Inactive)
    }

    pub fn prediction(&self) -> Option<&Prediction> {
        match self {
            DetectionState::Result(prediction) => Some(prediction),
            _ => None,
        }
    }
}

/// Read-only copy of the session for one render pass
#[derive(Debug, Clone, Default)]
pub struct DetectionSnapshot {
    pub state: DetectionState,
    pub hand: Option<Hand>,
    pub awaiting_reply: bool,
    pub notices: Vec<Notice>,
}

impl DetectionSnapshot {
    pub fn is_detecting(&self) -> bool {
        self.state.is_active()
    }
}

/// Detection state container
#[derive(Debug)]
pub struct DetectionSession {
    state: DetectionState,
    hand: Option<Hand>,
    epoch: u64,
    /// A prediction request for the current epoch has not been answered yet
    in_flight: bool,
    /// Newest features not yet sent
    pending: Option<FeatureVector>,
    last_dispatch: Option<Instant>,
    fallback: LandmarkFallback,
    min_interval: Duration,
    notices: Notices,
}

impl DetectionSession {
    pub fn new(settings: &DetectionSettings) -> Self {
        Self {
            state: DetectionState::Inactive,
            hand: None,
            epoch: 0,
            in_flight: false,
            pending: None,
            last_dispatch: None,
            fallback: settings.fallback,
            min_interval: settings.min_predict_interval(),
            notices: Notices::default(),
        }
    }

    pub fn state(&self) -> &DetectionState {
        &self.state
    }

    pub fn hand(&self) -> Option<&Hand> {
        self.hand.as_ref()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    pub fn notices(&self) -> &Notices {
        &self.notices
    }

    pub fn notices_mut(&mut self) -> &mut Notices {
        &mut self.notices
    }

    /// Copy of everything the render pass draws
    pub fn snapshot(&self) -> DetectionSnapshot {
        DetectionSnapshot {
            state: self.state.clone(),
            hand: self.hand.clone(),
            awaiting_reply: self.in_flight,
            notices: self.notices.iter().cloned().collect(),
        }
    }

    fn advance_epoch(&mut self) {
        self.epoch += 1;
        self.in_flight = false;
        self.pending = None;
    }

    fn clear_detection(&mut self) {
        self.hand = None;
        self.advance_epoch();
    }

    /// Camera is up; begin detecting
    pub fn start(&mut self) {
        if self.is_active() {
            return;
        }
        self.clear_detection();
        self.last_dispatch = None;
        self.state = DetectionState::NoHand;
        tracing::info!(epoch = self.epoch, "Detection started");
    }

    /// Stop detecting. Safe to call repeatedly; replies still in flight are
    /// ignored when they arrive.
    pub fn stop(&mut self) {
        if !self.is_active() {
            return;
        }
        self.clear_detection();
        self.state = DetectionState::Inactive;
        tracing::info!(epoch = self.epoch, "Detection stopped");
    }

    /// Camera could not be acquired; stay inactive and tell the user
    pub fn camera_failed(&mut self, error: &CameraError, now: Instant) {
        self.stop();
        let message = match error {
            CameraError::PermissionDenied(_) => {
                "Camera access denied. Allow camera access and try again.".to_string()
            }
            CameraError::NoDevice => "No camera found. Connect a camera and try again.".to_string(),
            other => format!("Could not start the camera: {}", other),
        };
        self.notices.error(message, now);
    }

    /// Video stopped delivering frames while detecting
    pub fn source_lost(&mut self, now: Instant) {
        if self.is_active() {
            self.stop();
            self.notices.error("Video stream lost", now);
        }
    }

    /// The landmark tracker could not be loaded
    pub fn tracker_unavailable(&mut self, message: &str, now: Instant) {
        self.notices
            .warn(format!("Hand tracking unavailable: {}", message), now);
    }

    /// Apply one tracker completion. Returns a job to submit, if one is due.
    pub fn on_hands(&mut self, hand: Option<Hand>, now: Instant) -> Option<PredictJob> {
        if !self.is_active() {
            return None;
        }

        let Some(hand) = hand else {
            if self.hand.is_some() || self.in_flight || self.state != DetectionState::NoHand {
                // Drop overlay and prediction together; a late reply must not
                // resurrect the old sign
                self.clear_detection();
                self.state = DetectionState::NoHand;
                tracing::debug!(epoch = self.epoch, "Hand lost");
            }
            return None;
        };

        let features = FeatureVector::from_landmarks(&hand.landmarks, self.fallback);
        self.hand = Some(hand);
        if !matches!(self.state, DetectionState::Result(_)) {
            self.state = DetectionState::Analyzing;
        }

        match features {
            Ok(features) => {
                self.pending = Some(features);
                self.poll(now)
            }
            Err(e) => {
                tracing::debug!("Not predicting: {}", e);
                None
            }
        }
    }

    /// Dispatch pending features if nothing is in flight and the minimum
    /// interval has passed
    pub fn poll(&mut self, now: Instant) -> Option<PredictJob> {
        if !self.is_active() || self.in_flight {
            return None;
        }
        if let Some(last) = self.last_dispatch {
            if now.saturating_duration_since(last) < self.min_interval {
                return None;
            }
        }

        let features = self.pending.take()?;
        self.in_flight = true;
        self.last_dispatch = Some(now);
        tracing::debug!(epoch = self.epoch, "Dispatching prediction request");
        Some(PredictJob {
            epoch: self.epoch,
            kind: JobKind::Predict(features),
        })
    }

    /// Apply a finished job. Returns the next job to submit, if one is due.
    pub fn on_reply(&mut self, reply: PredictionReply, now: Instant) -> Option<PredictJob> {
        if reply.epoch != self.epoch {
            tracing::debug!(
                reply_epoch = reply.epoch,
                epoch = self.epoch,
                "Discarding stale reply"
            );
            return None;
        }

        match reply.outcome {
            ReplyOutcome::Prediction(result) => self.on_prediction(result, now),
            ReplyOutcome::Toggle { detect, result } => {
                self.on_toggle(detect, result, now);
                None
            }
        }
    }

    fn on_prediction(
        &mut self,
        result: Result<Option<Prediction>, PredictError>,
        now: Instant,
    ) -> Option<PredictJob> {
        if !self.is_active() {
            return None;
        }
        self.in_flight = false;

        match result {
            Ok(Some(prediction)) => {
                tracing::info!(
                    sign = %prediction.label,
                    confidence = prediction.confidence.percent(),
                    "Sign detected"
                );
                self.state = DetectionState::Result(prediction);
            }
            Ok(None) => {
                self.state = DetectionState::Analyzing;
            }
            Err(e) => {
                self.notices.error(e.to_string(), now);
                self.state = DetectionState::Analyzing;
            }
        }

        self.poll(now)
    }

    /// Job asking a remote service to switch its own detection on or off,
    /// tagged with the current epoch so its reply is not treated as stale
    pub fn toggle_job(&self, detect: bool) -> PredictJob {
        PredictJob {
            epoch: self.epoch,
            kind: JobKind::Toggle(detect),
        }
    }

    fn on_toggle(&mut self, detect: bool, result: Result<ToggleStatus, PredictError>, now: Instant) {
        let failure = match result {
            Ok(status) if status.success => {
                if !status.message.is_empty() {
                    self.notices.info(status.message, now);
                }
                if let Some(label) = status.prediction {
                    self.notices.info(format!("Last detected sign: {}", label), now);
                }
                None
            }
            Ok(status) => Some(if status.message.is_empty() {
                "Service refused to change detection".to_string()
            } else {
                status.message
            }),
            Err(e) => Some(e.to_string()),
        };

        if let Some(message) = failure {
            self.notices.error(message, now);
            if detect {
                // The service is not detecting, so neither are we
                self.stop();
            }
        }
    }
}
