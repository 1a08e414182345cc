//! Toast notifications anchored to the bottom-right corner

use crate::detection::{Notice, NoticeLevel};

fn level_color(level: NoticeLevel) -> egui::Color32 {
    match level {
        NoticeLevel::Info => egui::Color32::from_rgb(70, 130, 200),
        NoticeLevel::Warning => egui::Color32::from_rgb(220, 160, 40),
        NoticeLevel::Error => egui::Color32::from_rgb(210, 60, 60),
    }
}

/// Text shown for a notice, with a repeat count when it was raised again
pub fn notice_text(notice: &Notice) -> String {
    if notice.repeats > 1 {
        format!("{} (x{})", notice.message, notice.repeats)
    } else {
        notice.message.clone()
    }
}

/// Draw the notices; returns the index of one the user dismissed
pub fn show(ctx: &egui::Context, notices: &[Notice]) -> Option<usize> {
    if notices.is_empty() {
        return None;
    }

    let mut dismissed = None;
    egui::Area::new(egui::Id::new("toasts"))
        .anchor(egui::Align2::RIGHT_BOTTOM, [-12.0, -48.0])
        .order(egui::Order::Foreground)
        .show(ctx, |ui| {
            ui.set_max_width(360.0);
            for (index, notice) in notices.iter().enumerate() {
                egui::Frame::popup(ui.style()).show(ui, |ui| {
                    ui.horizontal(|ui| {
                        ui.colored_label(level_color(notice.level), "\u{25cf}");
                        ui.label(notice_text(notice));
                        if ui.small_button("\u{2715}").clicked() {
                            dismissed = Some(index);
                        }
                    });
                });
                ui.add_space(4.0);
            }
        });
    dismissed
}
