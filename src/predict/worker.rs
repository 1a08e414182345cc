//! Prediction worker thread
//!
//! HTTP calls block, so they run off the UI thread. Every job carries the
//! session epoch it was issued under and the reply echoes it back; the session
//! uses that to drop replies that arrive after detection was toggled off.

use crossbeam_channel::{Receiver, Sender};

use super::{PredictError, Prediction, PredictionService, ToggleStatus};
use crate::landmarks::FeatureVector;

/// What to ask the service
#[derive(Debug, Clone, PartialEq)]
pub enum JobKind {
    Predict(FeatureVector),
    Toggle(bool),
}

/// A request tagged with the epoch it belongs to
#[derive(Debug, Clone, PartialEq)]
pub struct PredictJob {
    pub epoch: u64,
    pub kind: JobKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReplyOutcome {
    Prediction(Result<Option<Prediction>, PredictError>),
    Toggle {
        detect: bool,
        result: Result<ToggleStatus, PredictError>,
    },
}

/// Result of a job, carrying the job's epoch
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionReply {
    pub epoch: u64,
    pub outcome: ReplyOutcome,
}

/// Runs prediction jobs on a background thread
pub struct PredictionWorker {
    /// Channel to send jobs to the worker thread
    job_sender: Option<Sender<PredictJob>>,
    /// Replies in completion order
    replies: Receiver<PredictionReply>,
    /// Worker thread handle
    thread_handle: Option<std::thread::JoinHandle<()>>,
}

impl PredictionWorker {
    /// Start the worker with the given service
    pub fn spawn<S: PredictionService>(service: S) -> std::io::Result<Self> {
        let (job_sender, job_receiver) = crossbeam_channel::unbounded::<PredictJob>();
        let (reply_sender, replies) = crossbeam_channel::unbounded::<PredictionReply>();

        let thread_handle = std::thread::Builder::new()
            .name("prediction".to_string())
            .spawn(move || Self::worker_thread(service, job_receiver, reply_sender))?;

        Ok(Self {
            job_sender: Some(job_sender),
            replies,
            thread_handle: Some(thread_handle),
        })
    }

    fn worker_thread<S: PredictionService>(
        service: S,
        jobs: Receiver<PredictJob>,
        replies: Sender<PredictionReply>,
    ) {
        tracing::info!("Prediction worker started");

        while let Ok(job) = jobs.recv() {
            let outcome = match job.kind {
                JobKind::Predict(features) => {
                    tracing::debug!(epoch = job.epoch, placeholder = features.is_placeholder(), "Requesting prediction");
                    ReplyOutcome::Prediction(service.predict(&features))
                }
                JobKind::Toggle(detect) => {
                    tracing::debug!(epoch = job.epoch, detect, "Toggling remote detection");
                    ReplyOutcome::Toggle {
                        detect,
                        result: service.toggle_detection(detect),
                    }
                }
            };

            if replies
                .send(PredictionReply {
                    epoch: job.epoch,
                    outcome,
                })
                .is_err()
            {
                break;
            }
        }

        tracing::info!("Prediction worker stopped");
    }

    /// Queue a job (non-blocking)
    pub fn submit(&self, job: PredictJob) {
        if let Some(ref sender) = self.job_sender {
            if sender.send(job).is_err() {
                tracing::warn!("Prediction worker is gone, dropping job");
            }
        }
    }

    /// Next finished reply, if any
    pub fn try_recv(&self) -> Option<PredictionReply> {
        self.replies.try_recv().ok()
    }

    /// Reply channel, for blocking waits
    pub fn replies(&self) -> &Receiver<PredictionReply> {
        &self.replies
    }

    /// Stop the worker thread after the job in progress finishes
    pub fn stop(&mut self) {
        // Drop sender to signal thread to stop
        self.job_sender = None;

        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for PredictionWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predict::Confidence;
    use std::time::Duration;

    struct FixedService;

    impl PredictionService for FixedService {
        fn predict(&self, features: &FeatureVector) -> Result<Option<Prediction>, PredictError> {
            if features.is_placeholder() {
                return Err(PredictError::Rejected("placeholder".to_string()));
            }
            Ok(Some(Prediction {
                label: "Peace".to_string(),
                confidence: Confidence::from_fraction(0.8),
            }))
        }

        fn toggle_detection(&self, detect: bool) -> Result<ToggleStatus, PredictError> {
            Ok(ToggleStatus {
                success: true,
                message: format!("detect={}", detect),
                prediction: None,
            })
        }
    }

    fn recv(worker: &PredictionWorker) -> PredictionReply {
        worker
            .replies()
            .recv_timeout(Duration::from_secs(5))
            .expect("reply")
    }

    #[test]
    fn test_reply_echoes_epoch() {
        let worker = PredictionWorker::spawn(FixedService).unwrap();
        let hand = crate::landmarks::test_hand();
        let features =
            FeatureVector::from_landmarks(&hand.landmarks, Default::default()).unwrap();

        worker.submit(PredictJob {
            epoch: 7,
            kind: JobKind::Predict(features),
        });
        let reply = recv(&worker);
        assert_eq!(reply.epoch, 7);
        match reply.outcome {
            ReplyOutcome::Prediction(Ok(Some(p))) => assert_eq!(p.label, "Peace"),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_jobs_answered_in_order() {
        let worker = PredictionWorker::spawn(FixedService).unwrap();
        worker.submit(PredictJob {
            epoch: 1,
            kind: JobKind::Predict(FeatureVector::zeros()),
        });
        worker.submit(PredictJob {
            epoch: 2,
            kind: JobKind::Toggle(true),
        });

        let first = recv(&worker);
        assert_eq!(first.epoch, 1);
        assert!(matches!(first.outcome, ReplyOutcome::Prediction(Err(PredictError::Rejected(_)))));

        let second = recv(&worker);
        assert_eq!(second.epoch, 2);
        match second.outcome {
            ReplyOutcome::Toggle { detect, result } => {
                assert!(detect);
                assert_eq!(result.unwrap().message, "detect=true");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_stop_joins_thread() {
        let mut worker = PredictionWorker::spawn(FixedService).unwrap();
        worker.stop();
        assert!(worker.thread_handle.is_none());
        // Submitting after stop is a silent no-op
        worker.submit(PredictJob {
            epoch: 1,
            kind: JobKind::Toggle(false),
        });
        assert!(worker.try_recv().is_none());
    }
}
