//! Detection panel
//!
//! Pure view of (sign, confidence, is_detecting); the egui drawing has no side
//! effects on detection state.

use crate::detection::{DetectionSnapshot, DetectionState};
use crate::predict::Confidence;

/// Qualitative confidence label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfidenceBucket {
    High,
    Moderate,
    Low,
}

impl ConfidenceBucket {
    pub fn from_percent(percent: u8) -> Self {
        match percent {
            80.. => ConfidenceBucket::High,
            50.. => ConfidenceBucket::Moderate,
            _ => ConfidenceBucket::Low,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ConfidenceBucket::High => "high",
            ConfidenceBucket::Moderate => "moderate",
            ConfidenceBucket::Low => "low",
        }
    }

    fn color(self) -> egui::Color32 {
        match self {
            ConfidenceBucket::High => egui::Color32::from_rgb(34, 160, 90),
            ConfidenceBucket::Moderate => egui::Color32::from_rgb(220, 160, 40),
            ConfidenceBucket::Low => egui::Color32::from_rgb(200, 80, 70),
        }
    }
}

/// What the panel shows
#[derive(Debug, Clone, PartialEq)]
pub enum PanelView {
    Inactive,
    Loading,
    Result {
        sign: String,
        percent: u8,
        bucket: ConfidenceBucket,
    },
}

impl PanelView {
    pub fn new(sign: Option<&str>, confidence: Confidence, is_detecting: bool) -> Self {
        if !is_detecting {
            return PanelView::Inactive;
        }
        match sign {
            Some(sign) if !sign.is_empty() => {
                let percent = confidence.percent();
                PanelView::Result {
                    sign: sign.to_string(),
                    percent,
                    bucket: ConfidenceBucket::from_percent(percent),
                }
            }
            _ => PanelView::Loading,
        }
    }

    pub fn from_snapshot(snapshot: &DetectionSnapshot) -> Self {
        match snapshot.state {
            DetectionState::Result(ref prediction) => {
                Self::new(Some(&prediction.label), prediction.confidence, true)
            }
            ref state => Self::new(None, Confidence::default(), state.is_active()),
        }
    }

    /// "92% match"
    pub fn match_text(&self) -> Option<String> {
        match self {
            PanelView::Result { percent, .. } => Some(format!("{}% match", percent)),
            _ => None,
        }
    }

    pub fn summary(&self) -> String {
        match self {
            PanelView::Inactive => "Detection not active".to_string(),
            PanelView::Loading => "Analyzing hand gestures...".to_string(),
            PanelView::Result { bucket, .. } => {
                format!("Sign detected with {} confidence", bucket.label())
            }
        }
    }

    pub fn show(&self, ui: &mut egui::Ui) {
        egui::Frame::group(ui.style()).show(ui, |ui| {
            ui.set_min_width(ui.available_width());
            match self {
                PanelView::Inactive => {
                    ui.vertical_centered(|ui| {
                        ui.weak(self.summary());
                    });
                }
                PanelView::Loading => {
                    ui.vertical_centered(|ui| {
                        ui.spinner();
                        ui.weak(self.summary());
                    });
                }
                PanelView::Result { sign, percent, bucket } => {
                    ui.horizontal(|ui| {
                        ui.label(egui::RichText::new(sign).size(28.0).strong().color(bucket.color()));
                        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                            ui.weak(self.match_text().unwrap_or_default());
                        });
                    });
                    ui.add(egui::ProgressBar::new(*percent as f32 / 100.0).desired_height(6.0));
                    ui.label(self.summary());
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predict::Prediction;

    #[test]
    fn test_inactive() {
        let view = PanelView::new(Some("A"), Confidence::from_fraction(0.9), false);
        assert_eq!(view, PanelView::Inactive);
        assert_eq!(view.summary(), "Detection not active");
        assert_eq!(view.match_text(), None);
    }

    #[test]
    fn test_loading_without_sign() {
        assert_eq!(
            PanelView::new(None, Confidence::default(), true),
            PanelView::Loading
        );
        assert_eq!(
            PanelView::new(Some(""), Confidence::default(), true),
            PanelView::Loading
        );
        assert_eq!(PanelView::Loading.summary(), "Analyzing hand gestures...");
    }

    #[test]
    fn test_result_high() {
        let view = PanelView::new(Some("A"), Confidence::from_service(0.92), true);
        assert_eq!(
            view,
            PanelView::Result {
                sign: "A".to_string(),
                percent: 92,
                bucket: ConfidenceBucket::High,
            }
        );
        assert_eq!(view.match_text().as_deref(), Some("92% match"));
        assert_eq!(view.summary(), "Sign detected with high confidence");
    }

    #[test]
    fn test_buckets() {
        assert_eq!(ConfidenceBucket::from_percent(100), ConfidenceBucket::High);
        assert_eq!(ConfidenceBucket::from_percent(80), ConfidenceBucket::High);
        assert_eq!(ConfidenceBucket::from_percent(79), ConfidenceBucket::Moderate);
        assert_eq!(ConfidenceBucket::from_percent(50), ConfidenceBucket::Moderate);
        assert_eq!(ConfidenceBucket::from_percent(49), ConfidenceBucket::Low);
        assert_eq!(ConfidenceBucket::from_percent(0), ConfidenceBucket::Low);
    }

    #[test]
    fn test_from_snapshot() {
        let mut snapshot = DetectionSnapshot::default();
        assert_eq!(PanelView::from_snapshot(&snapshot), PanelView::Inactive);

        snapshot.state = DetectionState::Analyzing;
        assert_eq!(PanelView::from_snapshot(&snapshot), PanelView::Loading);

        snapshot.state = DetectionState::Result(Prediction {
            label: "Hello".to_string(),
            confidence: Confidence::from_service(61.0),
        });
        let view = PanelView::from_snapshot(&snapshot);
        assert_eq!(view.summary(), "Sign detected with moderate confidence");
        assert_eq!(view.match_text().as_deref(), Some("61% match"));
    }
}
