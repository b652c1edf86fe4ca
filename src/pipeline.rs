use image::GenericImageView;
use log::debug;

use crate::classifier::Classify;
use crate::error::PipelineError;
use crate::models::{DiseaseRecord, Prediction, ReferenceTable};
use crate::preprocess;

/// Runs decode, preprocess and one forward pass over an uploaded image.
pub fn diagnose(
    classifier: &dyn Classify,
    bytes: &[u8],
    request_id: &str,
) -> Result<Prediction, PipelineError> {
    debug!("[{request_id}] image received ({} bytes)", bytes.len());

    let img = preprocess::decode(bytes)?;
    let (width, height) = img.dimensions();
    debug!("[{request_id}] decoded {width}x{height}");

    let input = preprocess::to_tensor(&img)?;
    debug!("[{request_id}] preprocessed to {:?}", input.shape());

    let prediction = classifier.predict(&input)?;
    debug!(
        "[{request_id}] inferred class {} ({:.2}%)",
        prediction.class_index, prediction.confidence
    );

    Ok(prediction)
}

/// Terminal state of a request, ready to be rendered.
#[derive(Debug)]
pub enum Diagnosis<'a> {
    Identified {
        prediction: Prediction,
        record: &'a DiseaseRecord,
    },
    /// The model answered but the table has nothing for that class.
    Unmapped { prediction: Prediction },
    Failed(PipelineError),
}

impl<'a> Diagnosis<'a> {
    pub fn resolve(table: &'a ReferenceTable, result: Result<Prediction, PipelineError>) -> Self {
        match result {
            Ok(prediction) => match table.get(prediction.class_index) {
                Some(record) => Diagnosis::Identified { prediction, record },
                None => Diagnosis::Unmapped { prediction },
            },
            Err(e) => Diagnosis::Failed(e),
        }
    }
}
