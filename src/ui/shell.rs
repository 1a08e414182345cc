//! Page shell: header, intro copy, feature cards and footer

use chrono::{DateTime, Datelike, Local, TimeZone};

use crate::camera::CameraInfo;
use crate::config::DetectionMode;

pub const APP_NAME: &str = "SignVision";
pub const TAGLINE: &str = "Sign Language Detection";
pub const INTRO: &str = "Our advanced AI system detects and interprets sign language in real-time, \
making communication more accessible for everyone.";

/// (title, description)
pub const FEATURES: [(&str, &str); 3] = [
    (
        "Accurate Detection",
        "Our model is trained on thousands of examples to provide highly accurate sign language recognition.",
    ),
    (
        "Real-time Processing",
        "Experience instant feedback with our lightning-fast detection and recognition system.",
    ),
    (
        "Accessibility",
        "Breaking communication barriers with technology designed to be accessible to everyone.",
    ),
];

/// What the header shows
pub struct HeaderState<'a> {
    pub is_detecting: bool,
    pub mode: DetectionMode,
    pub source: Option<String>,
    pub cameras: &'a [CameraInfo],
    pub selected_camera: u32,
    pub fps: f64,
}

/// Clicks collected from the shell, applied after the egui pass
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ShellActions {
    pub toggle_detection: bool,
    pub select_camera: Option<u32>,
    pub refresh_cameras: bool,
}

pub fn header(ctx: &egui::Context, state: &HeaderState<'_>, actions: &mut ShellActions) {
    egui::TopBottomPanel::top("header").show(ctx, |ui| {
        ui.add_space(4.0);
        ui.horizontal(|ui| {
            ui.vertical(|ui| {
                ui.heading(APP_NAME);
                ui.weak(TAGLINE);
            });
            ui.separator();

            let label = if state.is_detecting {
                "Stop Detection"
            } else {
                "Start Detection"
            };
            if ui.button(label).on_hover_text("Space").clicked() {
                actions.toggle_detection = true;
            }

            if state.mode == DetectionMode::Local {
                let selected = state
                    .cameras
                    .iter()
                    .find(|c| c.index == state.selected_camera)
                    .map(|c| c.name.clone())
                    .unwrap_or_else(|| format!("Camera {}", state.selected_camera));
                ui.add_enabled_ui(!state.is_detecting, |ui| {
                    egui::ComboBox::from_id_salt("camera_select")
                        .selected_text(selected)
                        .show_ui(ui, |ui| {
                            for cam in state.cameras {
                                if ui
                                    .selectable_label(cam.index == state.selected_camera, cam.name.as_str())
                                    .clicked()
                                {
                                    actions.select_camera = Some(cam.index);
                                }
                            }
                        });
                    if ui.small_button("Refresh").clicked() {
                        actions.refresh_cameras = true;
                    }
                });
            }

            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                ui.weak(format!("{:.0} fps", state.fps));
                ui.separator();
                match state.source {
                    Some(ref source) => ui.label(source.as_str()),
                    None => ui.weak("Camera off"),
                };
            });
        });
        ui.add_space(4.0);
    });
}

pub fn intro(ui: &mut egui::Ui) {
    ui.vertical_centered(|ui| {
        ui.heading(TAGLINE);
        ui.label(INTRO);
    });
}

pub fn feature_cards(ui: &mut egui::Ui) {
    ui.columns(FEATURES.len(), |columns| {
        for (column, (title, body)) in columns.iter_mut().zip(FEATURES.iter()) {
            egui::Frame::group(column.style()).show(column, |ui| {
                ui.set_min_width(ui.available_width());
                ui.strong(*title);
                ui.label(*body);
            });
        }
    });
}

pub fn footer(ctx: &egui::Context, year: i32) {
    egui::TopBottomPanel::bottom("footer").show(ctx, |ui| {
        ui.horizontal(|ui| {
            ui.weak(footer_text(year));
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                ui.weak("Contact");
                ui.weak("Terms of Service");
                ui.weak("Privacy Policy");
            });
        });
    });
}

pub fn footer_text(year: i32) -> String {
    format!("\u{a9} {} {}. All rights reserved.", year, APP_NAME)
}

/// Calendar year in the user's local time zone
pub fn current_year() -> i32 {
    year_at(&Local::now())
}

fn year_at<Tz: TimeZone>(now: &DateTime<Tz>) -> i32 {
    now.year()
}
