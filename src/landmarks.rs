//! Hand landmark data model
//!
//! Landmarks follow the MediaPipe hand topology: 21 points per hand, with x and y
//! normalized to the video frame and z holding relative depth.

use serde::{Deserialize, Serialize};

/// Number of landmarks in a complete hand
pub const HAND_LANDMARK_COUNT: usize = 21;

/// Number of values in a flattened feature vector (x, y, z per landmark)
pub const FEATURE_LEN: usize = HAND_LANDMARK_COUNT * 3;

/// Landmark indices (MediaPipe hand landmark convention)
pub mod idx {
    pub const WRIST: usize = 0;
    pub const THUMB_CMC: usize = 1;
    pub const THUMB_MCP: usize = 2;
    pub const THUMB_IP: usize = 3;
    pub const THUMB_TIP: usize = 4;
    pub const INDEX_FINGER_MCP: usize = 5;
    pub const INDEX_FINGER_PIP: usize = 6;
    pub const INDEX_FINGER_DIP: usize = 7;
    pub const INDEX_FINGER_TIP: usize = 8;
    pub const MIDDLE_FINGER_MCP: usize = 9;
    pub const MIDDLE_FINGER_PIP: usize = 10;
    pub const MIDDLE_FINGER_DIP: usize = 11;
    pub const MIDDLE_FINGER_TIP: usize = 12;
    pub const RING_FINGER_MCP: usize = 13;
    pub const RING_FINGER_PIP: usize = 14;
    pub const RING_FINGER_DIP: usize = 15;
    pub const RING_FINGER_TIP: usize = 16;
    pub const PINKY_MCP: usize = 17;
    pub const PINKY_PIP: usize = 18;
    pub const PINKY_DIP: usize = 19;
    pub const PINKY_TIP: usize = 20;
}

/// Skeleton edges between landmark indices, used only for drawing
pub const HAND_CONNECTIONS: [(usize, usize); 21] = {
    use idx::*;
    [
        // Thumb
        (WRIST, THUMB_CMC),
        (THUMB_CMC, THUMB_MCP),
        (THUMB_MCP, THUMB_IP),
        (THUMB_IP, THUMB_TIP),
        // Index
        (WRIST, INDEX_FINGER_MCP),
        (INDEX_FINGER_MCP, INDEX_FINGER_PIP),
        (INDEX_FINGER_PIP, INDEX_FINGER_DIP),
        (INDEX_FINGER_DIP, INDEX_FINGER_TIP),
        // Middle
        (INDEX_FINGER_MCP, MIDDLE_FINGER_MCP),
        (MIDDLE_FINGER_MCP, MIDDLE_FINGER_PIP),
        (MIDDLE_FINGER_PIP, MIDDLE_FINGER_DIP),
        (MIDDLE_FINGER_DIP, MIDDLE_FINGER_TIP),
        // Ring
        (MIDDLE_FINGER_MCP, RING_FINGER_MCP),
        (RING_FINGER_MCP, RING_FINGER_PIP),
        (RING_FINGER_PIP, RING_FINGER_DIP),
        (RING_FINGER_DIP, RING_FINGER_TIP),
        // Pinky and palm base
        (RING_FINGER_MCP, PINKY_MCP),
        (WRIST, PINKY_MCP),
        (PINKY_MCP, PINKY_PIP),
        (PINKY_PIP, PINKY_DIP),
        (PINKY_DIP, PINKY_TIP),
    ]
};

/// A single tracked point on a hand
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    /// X coordinate (0.0 to 1.0, normalized to frame width)
    pub x: f32,
    /// Y coordinate (0.0 to 1.0, normalized to frame height)
    pub y: f32,
    /// Relative depth, 0.0 when the tracker does not provide one
    #[serde(default)]
    pub z: f32,
}

impl Landmark {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Handedness {
    Left,
    Right,
}

/// Detected hand
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Hand {
    /// Landmarks in topology order; complete hands carry exactly 21
    pub landmarks: Vec<Landmark>,
    /// Presence score reported by the tracker (0.0 to 1.0)
    pub score: f32,
    /// Estimated handedness, if the tracker reports one
    pub handedness: Option<Handedness>,
}

impl Hand {
    pub fn new(landmarks: Vec<Landmark>) -> Self {
        Self {
            landmarks,
            score: 1.0,
            handedness: None,
        }
    }
}

/// What to send when a landmark set is not a complete hand
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LandmarkFallback {
    /// Refuse to build a feature vector
    #[default]
    Reject,
    /// Substitute the all-zero placeholder vector
    ZeroVector,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LandmarkError {
    #[error("expected 21 landmarks, got {0}")]
    WrongCount(usize),
}

/// Flattened landmark coordinates sent to the prediction service
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureVector([f32; FEATURE_LEN]);

impl FeatureVector {
    /// The placeholder vector used when no valid hand was captured
    pub const fn zeros() -> Self {
        Self([0.0; FEATURE_LEN])
    }

    /// Flatten landmarks into (x0, y0, z0, x1, y1, z1, ...).
    ///
    /// Anything other than exactly 21 landmarks is handled by `fallback`.
    pub fn from_landmarks(
        landmarks: &[Landmark],
        fallback: LandmarkFallback,
    ) -> Result<Self, LandmarkError> {
        if landmarks.len() != HAND_LANDMARK_COUNT {
            return match fallback {
                LandmarkFallback::Reject => Err(LandmarkError::WrongCount(landmarks.len())),
                LandmarkFallback::ZeroVector => Ok(Self::zeros()),
            };
        }

        let mut values = [0.0; FEATURE_LEN];
        for (chunk, lm) in values.chunks_exact_mut(3).zip(landmarks) {
            chunk.copy_from_slice(&[lm.x, lm.y, lm.z]);
        }
        Ok(Self(values))
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn is_placeholder(&self) -> bool {
        self.0.iter().all(|&v| v == 0.0)
    }
}

#[cfg(test)]
pub(crate) fn test_hand() -> Hand {
    let landmarks = (0..HAND_LANDMARK_COUNT)
        .map(|i| {
            let i = i as f32;
            Landmark::new(0.1 + i * 0.01, 0.2 + i * 0.02, -0.001 * i)
        })
        .collect();
    Hand::new(landmarks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topology_is_fixed() {
        assert_eq!(HAND_CONNECTIONS.len(), 21);
        for (a, b) in HAND_CONNECTIONS {
            assert!(a < HAND_LANDMARK_COUNT);
            assert!(b < HAND_LANDMARK_COUNT);
            assert_ne!(a, b);
        }
        // Every landmark is reachable from the skeleton
        for i in 0..HAND_LANDMARK_COUNT {
            assert!(HAND_CONNECTIONS.iter().any(|&(a, b)| a == i || b == i));
        }
    }

    #[test]
    fn test_flatten_order() {
        let hand = test_hand();
        let features = FeatureVector::from_landmarks(&hand.landmarks, LandmarkFallback::Reject)
            .unwrap();
        let values = features.as_slice();
        assert_eq!(values.len(), FEATURE_LEN);
        for (i, lm) in hand.landmarks.iter().enumerate() {
            assert_eq!(values[i * 3], lm.x);
            assert_eq!(values[i * 3 + 1], lm.y);
            assert_eq!(values[i * 3 + 2], lm.z);
        }
        assert!(!features.is_placeholder());
    }

    #[test]
    fn test_short_hand_rejected() {
        let hand = test_hand();
        for len in [0, 1, 20] {
            let err = FeatureVector::from_landmarks(&hand.landmarks[..len], LandmarkFallback::Reject)
                .unwrap_err();
            assert_eq!(err, LandmarkError::WrongCount(len));
        }
    }

    #[test]
    fn test_short_hand_zero_fallback() {
        let hand = test_hand();
        for len in [0, 5, 20] {
            let features =
                FeatureVector::from_landmarks(&hand.landmarks[..len], LandmarkFallback::ZeroVector)
                    .unwrap();
            assert_eq!(features.as_slice().len(), FEATURE_LEN);
            assert!(features.is_placeholder());
        }
    }

    #[test]
    fn test_missing_depth_defaults_to_zero() {
        let lm: Landmark = serde_json::from_str(r#"{"x":0.25,"y":0.75}"#).unwrap();
        assert_eq!(lm, Landmark::new(0.25, 0.75, 0.0));
    }
}
