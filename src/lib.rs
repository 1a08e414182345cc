//! Sign Detection - webcam sign language recognition client
//!
//! Captures webcam video, extracts 21 hand landmarks per frame with an ONNX
//! hand landmark model, sends them to an external prediction service over HTTP
//! and draws the hand skeleton and detected sign in an egui window.

pub mod app;
pub mod camera;
pub mod config;
pub mod detection;
pub mod landmarks;
pub mod overlay;
pub mod predict;
pub mod telemetry;
pub mod tracker;
pub mod ui;

pub use app::{App, AppError};
