//! Paints the hand skeleton over the video image

use egui::{pos2, Color32, Painter, Pos2, Stroke};
use glam::Vec2;

use crate::overlay::OverlayRenderer;

const BONE_COLOR: Color32 = Color32::from_rgb(0, 200, 255);
const JOINT_COLOR: Color32 = Color32::from_rgb(255, 64, 96);
const BONE_WIDTH: f32 = 3.0;
const JOINT_RADIUS: f32 = 5.0;

fn to_pos(v: Vec2) -> Pos2 {
    pos2(v.x, v.y)
}

pub fn paint(painter: &Painter, overlay: &OverlayRenderer) {
    let stroke = Stroke::new(BONE_WIDTH, BONE_COLOR);
    for segment in overlay.segments() {
        painter.line_segment([to_pos(segment.start), to_pos(segment.end())], stroke);
    }

    for marker in overlay.markers() {
        // Closer joints (more negative z) are drawn slightly larger
        let radius = (JOINT_RADIUS * (1.0 - marker.depth * 2.0)).clamp(3.0, 8.0);
        painter.circle_filled(to_pos(marker.position), radius, JOINT_COLOR);
    }
}
