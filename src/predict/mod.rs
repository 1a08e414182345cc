//! Prediction service client
//!
//! Sends flattened hand landmarks to the external sign classifier over HTTP
//! and parses its `{ prediction, confidence }` / `{ error }` replies.

pub mod types;
pub mod worker;

use std::io;

use crate::config::ServiceSettings;
use crate::landmarks::FeatureVector;

pub use types::{Confidence, Prediction, PredictRequest, PredictResponse, ToggleRequest, ToggleStatus};
pub use worker::{PredictJob, PredictionReply, PredictionWorker, ReplyOutcome, JobKind};

/// Prediction request errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PredictError {
    /// Connection refused, DNS failure, timeout
    #[error("Prediction service unreachable: {0}")]
    Transport(String),
    /// Non-2xx status
    #[error("Prediction service returned {code}: {message}")]
    Status { code: u16, message: String },
    /// 2xx response carrying `{ "error": ... }`
    #[error("Prediction failed: {0}")]
    Rejected(String),
    /// Body was not the expected JSON
    #[error("Invalid response from prediction service: {0}")]
    Decode(String),
}

/// The capability the prediction worker needs from a service
pub trait PredictionService: Send + 'static {
    /// Classify a landmark feature vector; `Ok(None)` means no sign was recognized
    fn predict(&self, features: &FeatureVector) -> Result<Option<Prediction>, PredictError>;

    /// Turn server-side detection on or off (remote mode)
    fn toggle_detection(&self, detect: bool) -> Result<ToggleStatus, PredictError>;
}

/// HTTP client for the prediction service
pub struct PredictionClient {
    agent: ureq::Agent,
    predict_url: String,
    toggle_url: String,
}

impl PredictionClient {
    pub fn new(settings: &ServiceSettings) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(settings.timeout())
            .build();

        Self {
            agent,
            predict_url: settings.predict_url(),
            toggle_url: settings.toggle_url(),
        }
    }

    pub fn predict_url(&self) -> &str {
        &self.predict_url
    }

    fn post_json<T: serde::Serialize>(&self, url: &str, body: &T) -> Result<ureq::Response, PredictError> {
        match self.agent.post(url).send_json(body) {
            Ok(response) => Ok(response),
            Err(ureq::Error::Status(code, response)) => {
                let message = response
                    .into_json::<types::ErrorBody>()
                    .ok()
                    .and_then(types::ErrorBody::message)
                    .unwrap_or_else(|| "no details".to_string());
                Err(PredictError::Status { code, message })
            }
            Err(ureq::Error::Transport(transport)) => {
                Err(PredictError::Transport(transport.to_string()))
            }
        }
    }
}

impl PredictionService for PredictionClient {
    fn predict(&self, features: &FeatureVector) -> Result<Option<Prediction>, PredictError> {
        let request = PredictRequest {
            landmarks: features.as_slice(),
        };
        let response = self.post_json(&self.predict_url, &request)?;
        let body: PredictResponse = response.into_json().map_err(decode_error)?;
        interpret_response(body)
    }

    fn toggle_detection(&self, detect: bool) -> Result<ToggleStatus, PredictError> {
        let response = self.post_json(&self.toggle_url, &ToggleRequest { detect })?;
        response.into_json().map_err(decode_error)
    }
}

fn decode_error(e: io::Error) -> PredictError {
    PredictError::Decode(e.to_string())
}

/// Map a decoded 2xx body onto the client's result
pub fn interpret_response(body: PredictResponse) -> Result<Option<Prediction>, PredictError> {
    if let Some(error) = body.error {
        return Err(PredictError::Rejected(error));
    }

    Ok(body.prediction.map(|label| Prediction {
        label,
        confidence: Confidence::from_service(body.confidence.unwrap_or(0.0)),
    }))
}
