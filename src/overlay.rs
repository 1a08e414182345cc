//! Hand skeleton overlay geometry
//!
//! Positions markers and bone segments over the video viewport. The overlay is
//! rebuilt from scratch on every update; drawing lives in `ui::overlay`.

use glam::Vec2;

use crate::landmarks::{Hand, HAND_CONNECTIONS};

/// Screen rectangle the video is drawn into
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub origin: Vec2,
    pub size: Vec2,
}

impl Viewport {
    pub fn new(origin: Vec2, size: Vec2) -> Self {
        Self { origin, size }
    }

    /// Normalized frame coordinates to screen position
    pub fn project(&self, x: f32, y: f32) -> Vec2 {
        self.origin + Vec2::new(x, y) * self.size
    }

    /// Largest rect with the frame's aspect ratio centered inside `self`
    pub fn fit(&self, frame_width: u32, frame_height: u32) -> Viewport {
        if frame_width == 0 || frame_height == 0 || self.size.x <= 0.0 || self.size.y <= 0.0 {
            return *self;
        }
        let aspect = frame_width as f32 / frame_height as f32;
        let size = if self.size.x / self.size.y > aspect {
            Vec2::new(self.size.y * aspect, self.size.y)
        } else {
            Vec2::new(self.size.x, self.size.x / aspect)
        };
        Viewport {
            origin: self.origin + (self.size - size) * 0.5,
            size,
        }
    }
}

/// One landmark dot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Marker {
    pub index: usize,
    pub position: Vec2,
    /// Relative depth, used for shading
    pub depth: f32,
}

/// One bone, stored as start, length and rotation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub from: usize,
    pub to: usize,
    pub start: Vec2,
    pub length: f32,
    /// Radians, `atan2(dy, dx)`
    pub angle: f32,
}

impl Segment {
    pub fn between(from: usize, to: usize, start: Vec2, end: Vec2) -> Self {
        let delta = end - start;
        Self {
            from,
            to,
            start,
            length: delta.length(),
            angle: delta.y.atan2(delta.x),
        }
    }

    pub fn end(&self) -> Vec2 {
        self.start + Vec2::from_angle(self.angle) * self.length
    }
}

/// Current overlay contents
#[derive(Debug, Clone, Default)]
pub struct OverlayRenderer {
    markers: Vec<Marker>,
    segments: Vec<Segment>,
}

impl OverlayRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the overlay with the given hand; `None` clears it
    pub fn update(&mut self, hand: Option<&Hand>, viewport: Viewport) {
        self.markers.clear();
        self.segments.clear();

        let Some(hand) = hand else {
            return;
        };

        self.markers.extend(hand.landmarks.iter().enumerate().map(|(index, lm)| Marker {
            index,
            position: viewport.project(lm.x, lm.y),
            depth: lm.z,
        }));

        for &(from, to) in HAND_CONNECTIONS.iter() {
            if let (Some(a), Some(b)) = (self.markers.get(from), self.markers.get(to)) {
                self.segments
                    .push(Segment::between(from, to, a.position, b.position));
            }
        }
    }

    pub fn clear(&mut self) {
        self.markers.clear();
        self.segments.clear();
    }

    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }
}
