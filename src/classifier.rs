use log::{debug, info};
use ndarray::Array4;
use std::path::Path;
use tract_core::prelude::{TypedModel, TypedRunnableModel};
use tract_onnx::prelude::*;

use crate::error::{PipelineError, StartupError};
use crate::models::Prediction;
use crate::preprocess::{CHANNELS, IMAGE_SIZE};

/// Anything that can run one forward pass over a preprocessed leaf image.
pub trait Classify: Send + Sync {
    /// Raw model output for a `(1, 224, 224, 3)` input, one score per class.
    fn forward(&self, input: &Array4<f32>) -> Result<Vec<f32>, PipelineError>;

    /// Number of output classes.
    fn num_classes(&self) -> usize;

    fn predict(&self, input: &Array4<f32>) -> Result<Prediction, PipelineError> {
        let scores = self.forward(input)?;
        Prediction::from_scores(&scores)
    }
}

/// A classifier exported to ONNX, executed with tract.
pub struct OnnxClassifier {
    plan: TypedRunnableModel<TypedModel>,
    num_classes: usize,
}

impl OnnxClassifier {
    /// Loads and optimises the model, then runs one warm-up pass to find the
    /// number of classes. Any failure here is fatal.
    pub fn load(path: &Path) -> Result<Self, StartupError> {
        if !path.is_file() {
            return Err(StartupError::ModelMissing(path.to_path_buf()));
        }

        let to_startup = |e: TractError| StartupError::ModelLoad {
            path: path.to_path_buf(),
            reason: format!("{e:#}"),
        };

        let side = IMAGE_SIZE as usize;
        let plan = tract_onnx::onnx()
            .model_for_path(path)
            .and_then(|m| m.with_input_fact(0, f32::fact([1, side, side, CHANNELS]).into()))
            .and_then(|m| m.into_optimized())
            .and_then(|m| m.into_runnable())
            .map_err(to_startup)?;

        let mut classifier = Self {
            plan,
            num_classes: 0,
        };

        let warmup = Array4::zeros((1, side, side, CHANNELS));
        let scores = classifier.run(&warmup).map_err(to_startup)?;
        if scores.is_empty() {
            return Err(StartupError::ModelLoad {
                path: path.to_path_buf(),
                reason: "model produces an empty output vector".into(),
            });
        }
        classifier.num_classes = scores.len();

        info!(
            "Loaded model {} ({} classes)",
            path.display(),
            classifier.num_classes
        );
        Ok(classifier)
    }

    fn run(&self, input: &Array4<f32>) -> TractResult<Vec<f32>> {
        let tensor: Tensor =
            tract_ndarray::Array::from_shape_vec(input.shape(), input.iter().copied().collect())?
                .into_tensor();

        let result = self.plan.run(tvec!(tensor.into()))?;
        let output = result[0].to_array_view::<f32>()?;
        debug!("Model output shape: {:?}", output.shape());
        Ok(output.iter().copied().collect())
    }
}

impl Classify for OnnxClassifier {
    fn forward(&self, input: &Array4<f32>) -> Result<Vec<f32>, PipelineError> {
        self.run(input)
            .map_err(|e| PipelineError::Inference(format!("{e:#}")))
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_model_is_fatal() {
        let result = OnnxClassifier::load(Path::new("does/not/exist.onnx"));
        assert!(matches!(result, Err(StartupError::ModelMissing(_))));
    }

    #[test]
    fn corrupt_model_is_fatal() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"this is not a protobuf model").unwrap();

        let result = OnnxClassifier::load(file.path());
        assert!(matches!(result, Err(StartupError::ModelLoad { .. })));
    }

    struct Fixed(Vec<f32>);

    impl Classify for Fixed {
        fn forward(&self, _input: &Array4<f32>) -> Result<Vec<f32>, PipelineError> {
            Ok(self.0.clone())
        }

        fn num_classes(&self) -> usize {
            self.0.len()
        }
    }

    #[test]
    fn predict_reports_argmax_as_percentage() {
        let model = Fixed(vec![0.05, 0.15, 0.8]);
        let input = Array4::zeros((1, 224, 224, 3));
        let prediction = model.predict(&input).unwrap();
        assert_eq!(prediction.class_index, 2);
        assert!((prediction.confidence - 80.0).abs() < 1e-3);
        assert_eq!(prediction, model.predict(&input).unwrap());
    }
}
