use std::path::Path;

use tract_onnx::prelude::*;
use tracing::info;

use crate::error::InferenceError;
use crate::frame::Tensor as FrameTensor;
use crate::inference::{parse_ssd_output, Detection, Detector};

/// Tract-based ONNX detector for SSD-style models
pub struct TractDetector {
    model: TypedRunnableModel<TypedModel>,
    shape: [usize; 4],
}

impl TractDetector {
    /// Load an ONNX model from disk and prepare it for inference
    pub fn new<P: AsRef<Path>>(model_path: P, shape: [usize; 4]) -> Result<Self, InferenceError> {
        let model_path = model_path.as_ref();
        let init_error = |stage: &str, e: TractError| InferenceError::Initialization {
            details: format!("{} ({}): {}", stage, model_path.display(), e),
        };

        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .map_err(|e| init_error("failed to load ONNX model", e))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(shape[0], shape[1], shape[2], shape[3]),
                ),
            )
            .map_err(|e| init_error("failed to set input fact", e))?
            .into_optimized()
            .map_err(|e| init_error("failed to optimize ONNX model", e))?
            .into_runnable()
            .map_err(|e| init_error("failed to build runnable ONNX model", e))?;

        info!(
            "Loaded ONNX model {} with input {:?}",
            model_path.display(),
            shape
        );
        Ok(Self { model, shape })
    }
}

impl Detector for TractDetector {
    fn name(&self) -> &str {
        "tract"
    }

    fn input_shape(&self) -> [usize; 4] {
        self.shape
    }

    fn infer(&mut self, tensor: &FrameTensor) -> Result<Vec<Detection>, InferenceError> {
        if tensor.shape != self.shape {
            return Err(InferenceError::ShapeMismatch {
                expected: self.shape,
                actual: tensor.shape,
            });
        }

        let input = Tensor::from_shape(&tensor.shape, &tensor.data).map_err(|e| {
            InferenceError::Engine {
                details: format!("failed to build input tensor: {}", e),
            }
        })?;

        let outputs = self
            .model
            .run(tvec!(input.into()))
            .map_err(|e| InferenceError::Engine {
                details: format!("ONNX inference failed: {}", e),
            })?;

        let output = outputs.first().ok_or_else(|| InferenceError::Engine {
            details: "model produced no outputs".to_string(),
        })?;
        let view = output
            .to_array_view::<f32>()
            .map_err(|e| InferenceError::Engine {
                details: format!("model output tensor was not f32: {}", e),
            })?;

        let values: Vec<f32> = view.iter().copied().collect();
        Ok(parse_ssd_output(&values))
    }
}
