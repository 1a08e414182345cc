//! ONNX Runtime hand landmark extractor
//!
//! Runs a MediaPipe `hand_landmark` model (PINTO Model Zoo export). The model
//! takes a 224x224 RGB crop in NHWC layout and returns 21 screen-space
//! landmarks, a hand presence score and a handedness score.

use std::path::PathBuf;

use ndarray::Array4;

use super::{LandmarkExtractor, TrackerError};
use crate::camera::CameraFrame;
use crate::config::TrackerSettings;
use crate::landmarks::{Hand, Handedness, Landmark, FEATURE_LEN, HAND_LANDMARK_COUNT};

/// Model input size
const INPUT_SIZE: u32 = 224;

/// Square region of the frame fed to the model
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Crop {
    pub x: u32,
    pub y: u32,
    pub size: u32,
}

impl Crop {
    /// Largest centered square
    pub fn centered(width: u32, height: u32) -> Self {
        let size = width.min(height);
        Self {
            x: (width - size) / 2,
            y: (height - size) / 2,
            size,
        }
    }

    /// Map model pixel coordinates back to frame-normalized coordinates
    pub fn to_frame(&self, mx: f32, my: f32, mz: f32, width: u32, height: u32) -> Landmark {
        let scale = self.size as f32 / INPUT_SIZE as f32;
        Landmark::new(
            (self.x as f32 + mx * scale) / width as f32,
            (self.y as f32 + my * scale) / height as f32,
            mz / INPUT_SIZE as f32,
        )
    }
}

/// Hand landmark model session
pub struct OnnxHandLandmarker {
    session: ort::session::Session,
    min_presence: f32,
}

impl OnnxHandLandmarker {
    /// Load the model named in the settings
    pub fn new(settings: &TrackerSettings) -> Result<Self, TrackerError> {
        let model_dir = match settings.model_dir {
            Some(ref dir) => dir.clone(),
            None => find_model_dir()?,
        };
        let model_path = model_dir.join(&settings.model_file);
        if !model_path.exists() {
            return Err(TrackerError::ModelNotFound(model_path.display().to_string()));
        }
        tracing::info!("Loading hand landmark model from {:?}", model_path);

        ort::init()
            .with_name("SignDetection")
            .commit()
            .map_err(|e| TrackerError::Runtime(format!("Failed to initialize ORT: {}", e)))?;

        let session = ort::session::Session::builder()
            .map_err(|e| TrackerError::Runtime(format!("Failed to create session builder: {}", e)))?
            .with_intra_threads(settings.intra_threads)
            .map_err(|e| TrackerError::Runtime(format!("Failed to set threads: {}", e)))?
            .commit_from_file(&model_path)
            .map_err(|e| TrackerError::Runtime(format!("Failed to load model: {}", e)))?;

        Ok(Self {
            session,
            min_presence: settings.min_presence,
        })
    }
}

impl LandmarkExtractor for OnnxHandLandmarker {
    fn extract(&mut self, frame: &CameraFrame) -> Result<Vec<Hand>, TrackerError> {
        if frame.width == 0 || frame.height == 0 {
            return Ok(Vec::new());
        }

        let crop = Crop::centered(frame.width, frame.height);
        let input = preprocess_nhwc(frame, crop);
        let input_array = Array4::from_shape_vec((1, INPUT_SIZE as usize, INPUT_SIZE as usize, 3), input)
            .map_err(|e| TrackerError::Runtime(format!("Failed to create input array: {}", e)))?;
        let input_tensor = ort::value::Tensor::from_array(input_array)
            .map_err(|e| TrackerError::Runtime(format!("Failed to create tensor: {}", e)))?;

        let outputs = self
            .session
            .run(ort::inputs![input_tensor])
            .map_err(|e| TrackerError::Runtime(format!("Inference failed: {}", e)))?;

        let mut tensors = Vec::new();
        for (_name, value) in outputs.iter() {
            let (_shape, data) = value
                .try_extract_tensor::<f32>()
                .map_err(|e| TrackerError::Output(format!("Failed to extract output: {}", e)))?;
            tensors.push(data.to_vec());
        }

        let hand = decode_outputs(&tensors, crop, frame.width, frame.height)?;
        if hand.score < self.min_presence {
            return Ok(Vec::new());
        }
        Ok(vec![hand])
    }
}

/// Find the models directory next to the executable, its ancestors or the cwd
pub fn find_model_dir() -> Result<PathBuf, TrackerError> {
    if let Ok(exe_path) = std::env::current_exe() {
        // models/, ../models (target/debug), ../../models (target/release/deps)
        for dir in exe_path.ancestors().skip(1).take(3) {
            let model_dir = dir.join("models");
            if model_dir.exists() {
                return Ok(model_dir);
            }
        }
    }

    let cwd = std::env::current_dir().map_err(|e| TrackerError::ModelNotFound(e.to_string()))?;
    let model_dir = cwd.join("models");
    if model_dir.exists() {
        return Ok(model_dir);
    }

    Err(TrackerError::ModelNotFound(
        "models directory not found; create a 'models' directory with the hand landmark model".to_string(),
    ))
}

/// Resize the crop to the model input, RGB float [0, 1], HWC order
fn preprocess_nhwc(frame: &CameraFrame, crop: Crop) -> Vec<f32> {
    let mut output = vec![0.0f32; (INPUT_SIZE * INPUT_SIZE * 3) as usize];
    let ratio = crop.size as f32 / INPUT_SIZE as f32;

    for y in 0..INPUT_SIZE {
        for x in 0..INPUT_SIZE {
            let src_x = crop.x + (x as f32 * ratio) as u32;
            let src_y = crop.y + (y as f32 * ratio) as u32;
            let src_idx = ((src_y * frame.width + src_x) * 4) as usize;

            if src_idx + 2 < frame.data.len() {
                let out_idx = ((y * INPUT_SIZE + x) * 3) as usize;
                output[out_idx] = frame.data[src_idx] as f32 / 255.0;
                output[out_idx + 1] = frame.data[src_idx + 1] as f32 / 255.0;
                output[out_idx + 2] = frame.data[src_idx + 2] as f32 / 255.0;
            }
        }
    }

    output
}

/// Scores may come out as logits depending on the export
fn probability(v: f32) -> f32 {
    if (0.0..=1.0).contains(&v) {
        v
    } else {
        1.0 / (1.0 + (-v).exp())
    }
}

/// Interpret model outputs: the first 63-value tensor holds screen landmarks,
/// the first and second single values are presence and handedness.
fn decode_outputs(
    tensors: &[Vec<f32>],
    crop: Crop,
    width: u32,
    height: u32,
) -> Result<Hand, TrackerError> {
    let coords = tensors
        .iter()
        .find(|t| t.len() == FEATURE_LEN)
        .ok_or_else(|| TrackerError::Output(format!("no {}-value landmark tensor", FEATURE_LEN)))?;
    let mut scalars = tensors.iter().filter(|t| t.len() == 1).map(|t| t[0]);
    let presence = scalars
        .next()
        .map(probability)
        .ok_or_else(|| TrackerError::Output("no presence score".to_string()))?;
    let handedness = scalars.next().map(|v| {
        if probability(v) > 0.5 {
            Handedness::Right
        } else {
            Handedness::Left
        }
    });

    let landmarks: Vec<Landmark> = coords
        .chunks_exact(3)
        .take(HAND_LANDMARK_COUNT)
        .map(|c| crop.to_frame(c[0], c[1], c[2], width, height))
        .collect();

    Ok(Hand {
        landmarks,
        score: presence,
        handedness,
    })
}
