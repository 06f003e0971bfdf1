mod ssd;
mod threaded;
#[cfg(feature = "backend-tract")]
mod tract;
#[cfg(test)]
mod tests;

pub use ssd::parse_ssd_output;
pub use threaded::ThreadedGateway;
#[cfg(feature = "backend-tract")]
pub use tract::TractDetector;

use crate::config::ModelConfig;
use crate::error::InferenceError;
use crate::frame::Tensor;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One of the two alternating inference request contexts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestSlot {
    A,
    B,
}

impl RequestSlot {
    pub fn other(self) -> Self {
        match self {
            RequestSlot::A => RequestSlot::B,
            RequestSlot::B => RequestSlot::A,
        }
    }

    pub fn index(self) -> usize {
        match self {
            RequestSlot::A => 0,
            RequestSlot::B => 1,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            RequestSlot::A => "A",
            RequestSlot::B => "B",
        }
    }
}

/// Normalized bounding box, all coordinates in 0..1
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
}

impl BoundingBox {
    /// Pixel rectangle (x, y, width, height) for an image of the given size
    pub fn to_pixels(&self, width: u32, height: u32) -> (i32, i32, u32, u32) {
        let clamp = |v: f32| v.clamp(0.0, 1.0);
        let x0 = (clamp(self.x_min) * width as f32) as i32;
        let y0 = (clamp(self.y_min) * height as f32) as i32;
        let x1 = (clamp(self.x_max) * width as f32) as i32;
        let y1 = (clamp(self.y_max) * height as f32) as i32;
        (x0, y0, (x1 - x0).max(1) as u32, (y1 - y0).max(1) as u32)
    }
}

/// A single detector output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Detector class id (0 is background)
    pub class_id: usize,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// State of a request slot as seen by `poll`
#[derive(Debug, Clone)]
pub enum SlotStatus {
    Ready(Vec<Detection>),
    Pending,
    Idle,
    Failed(InferenceError),
}

/// Two-slot request contract over an external detector
pub trait InferenceGateway: Send {
    /// Tensor shape every submission must have
    fn input_shape(&self) -> [usize; 4];

    /// Start a request in `slot`; fails if the slot already has one in flight
    fn submit(&mut self, slot: RequestSlot, tensor: Tensor) -> Result<(), InferenceError>;

    /// Non-blocking check; a completed result is handed out once and frees the slot
    fn poll(&mut self, slot: RequestSlot) -> SlotStatus;

    /// Block until the request in `slot` completes; a timeout abandons it and frees the slot
    fn wait(
        &mut self,
        slot: RequestSlot,
        timeout: Duration,
    ) -> Result<Vec<Detection>, InferenceError>;

    fn is_busy(&self, slot: RequestSlot) -> bool;
}

/// Synchronous object detector run by a gateway worker
pub trait Detector: Send {
    fn name(&self) -> &str;

    fn input_shape(&self) -> [usize; 4];

    fn infer(&mut self, tensor: &Tensor) -> Result<Vec<Detection>, InferenceError>;
}

/// Build the detector named by the model configuration
pub fn create_detector(config: &ModelConfig) -> Result<Box<dyn Detector>, InferenceError> {
    match config.backend.as_str() {
        #[cfg(feature = "backend-tract")]
        "tract" => Ok(Box::new(TractDetector::new(
            &config.path,
            config.input_shape,
        )?)),
        other => Err(InferenceError::Initialization {
            details: format!("inference backend '{}' is not available", other),
        }),
    }
}

impl Detector for Box<dyn Detector> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn input_shape(&self) -> [usize; 4] {
        (**self).input_shape()
    }

    fn infer(&mut self, tensor: &Tensor) -> Result<Vec<Detection>, InferenceError> {
        (**self).infer(tensor)
    }
}
