//! Tomato leaf disease detection served over HTTP.
//!
//! A pretrained ONNX classifier and a static disease table are loaded once at
//! startup. Each upload is decoded, resized to 224x224, scaled to `[0, 1]`,
//! classified with a single forward pass and rendered with the matching
//! description and cure.

pub mod classifier;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod pipeline;
pub mod preprocess;
pub mod render;

use log::{info, warn};
use std::sync::Arc;

use classifier::{Classify, OnnxClassifier};
use config::Config;
use error::StartupError;
use models::ReferenceTable;

/// Read-only state shared by every request.
pub struct AppState {
    pub classifier: Arc<dyn Classify>,
    pub table: ReferenceTable,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(classifier: Arc<dyn Classify>, table: ReferenceTable, max_upload_bytes: usize) -> Self {
        let unreachable = table.unreachable_keys(classifier.num_classes());
        if !unreachable.is_empty() {
            warn!(
                "Disease table entries {:?} are outside the model's {} classes and will never be shown",
                unreachable,
                classifier.num_classes()
            );
        }

        Self {
            classifier,
            table,
            max_upload_bytes,
        }
    }

    /// Loads the model, then the disease table. Either failing is fatal.
    pub fn from_config(config: &Config) -> Result<Self, StartupError> {
        let classifier = OnnxClassifier::load(&config.model_path)?;

        let table = ReferenceTable::load(&config.disease_table)?;
        info!(
            "Loaded {} disease records from {}",
            table.len(),
            config.disease_table.display()
        );

        Ok(Self::new(Arc::new(classifier), table, config.max_upload_bytes))
    }
}
