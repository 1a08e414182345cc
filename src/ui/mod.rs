//! egui views
//!
//! Everything here draws from a [`DetectionSnapshot`](crate::detection::DetectionSnapshot)
//! and reports clicks back as plain data; none of it mutates detection state.

pub mod overlay;
pub mod panel;
pub mod shell;
pub mod toasts;

pub use panel::{ConfidenceBucket, PanelView};
pub use shell::ShellActions;
