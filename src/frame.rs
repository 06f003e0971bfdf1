use crate::config::{ChannelOrder, ModelConfig};
use crate::error::InferenceError;
use image::{imageops::FilterType, RgbImage};
use std::sync::Arc;
use std::time::SystemTime;

/// Decoded frame published by a frame source
#[derive(Debug, Clone)]
pub struct Frame {
    /// Monotonic per-source sequence number, starting at 1
    pub sequence: u64,
    /// Index of the owning source
    pub source: usize,
    /// Time the frame was decoded
    pub timestamp: SystemTime,
    /// Pixel data (shared so pipelined requests can hold the frame cheaply)
    pub image: Arc<RgbImage>,
}

impl Frame {
    pub fn new(sequence: u64, source: usize, image: RgbImage) -> Self {
        Self {
            sequence,
            source,
            timestamp: SystemTime::now(),
            image: Arc::new(image),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Get frame age in milliseconds
    pub fn age_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(self.timestamp)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

/// Dense NCHW float tensor handed to the inference gateway
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    pub shape: [usize; 4],
    pub data: Vec<f32>,
}

impl Tensor {
    pub fn zeros(shape: [usize; 4]) -> Self {
        Self {
            shape,
            data: vec![0.0; shape.iter().product()],
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Turns frames into model input tensors: resize, channel reorder, HWC to CHW
#[derive(Debug, Clone)]
pub struct Preprocessor {
    shape: [usize; 4],
    channel_order: ChannelOrder,
    scale: f32,
}

impl Preprocessor {
    pub fn new(shape: [usize; 4], channel_order: ChannelOrder, scale: f32) -> Self {
        Self {
            shape,
            channel_order,
            scale,
        }
    }

    pub fn from_config(config: &ModelConfig) -> Self {
        Self::new(config.input_shape, config.channel_order, config.input_scale)
    }

    pub fn input_shape(&self) -> [usize; 4] {
        self.shape
    }

    /// Model input resolution as (width, height)
    pub fn resolution(&self) -> (u32, u32) {
        (self.shape[3] as u32, self.shape[2] as u32)
    }

    /// Build a tensor for `frame`; the frame is repeated across the batch dimension
    pub fn prepare(&self, frame: &Frame) -> Result<Tensor, InferenceError> {
        let [batch, channels, height, width] = self.shape;
        if channels != 3 {
            return Err(InferenceError::ShapeMismatch {
                expected: [batch, 3, height, width],
                actual: self.shape,
            });
        }

        let (w, h) = self.resolution();
        let resized;
        let image: &RgbImage = if frame.image.dimensions() == (w, h) {
            &frame.image
        } else {
            resized = image::imageops::resize(frame.image.as_ref(), w, h, FilterType::Triangle);
            &resized
        };

        let plane = height * width;
        let mut tensor = Tensor::zeros(self.shape);
        let channel_map: [usize; 3] = match self.channel_order {
            ChannelOrder::Rgb => [0, 1, 2],
            ChannelOrder::Bgr => [2, 1, 0],
        };

        for (x, y, pixel) in image.enumerate_pixels() {
            let offset = y as usize * width + x as usize;
            for (plane_index, source_channel) in channel_map.iter().enumerate() {
                tensor.data[plane_index * plane + offset] =
                    pixel[*source_channel] as f32 * self.scale;
            }
        }

        let image_len = channels * plane;
        for b in 1..batch {
            let (first, rest) = tensor.data.split_at_mut(image_len * b);
            rest[..image_len].copy_from_slice(&first[..image_len]);
        }

        Ok(tensor)
    }
}
