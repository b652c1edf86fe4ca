use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use crate::error::{PipelineError, StartupError};

/// Human-readable information for one disease class.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DiseaseRecord {
    pub disease: String,
    pub description: String,
    pub cure: String,
}

/// Read-only lookup from model class index to disease information.
///
/// On disk the keys are stringified class indices (`"0"`, `"1"`, ...). They
/// are converted to integers here so nothing downstream deals in strings.
#[derive(Debug, Clone, Default)]
pub struct ReferenceTable {
    entries: BTreeMap<usize, DiseaseRecord>,
}

impl ReferenceTable {
    pub fn load(path: &Path) -> Result<Self, StartupError> {
        let raw = fs::read_to_string(path).map_err(|source| StartupError::TableRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, StartupError> {
        let parsed: HashMap<String, DiseaseRecord> = serde_json::from_str(raw)?;

        let mut entries = BTreeMap::new();
        for (key, record) in parsed {
            // Only the canonical decimal form can ever equal a stringified class index.
            match key.parse::<usize>() {
                Ok(index) if index.to_string() == key => {
                    entries.insert(index, record);
                }
                _ => warn!("Ignoring disease table key {:?}: not a class index", key),
            }
        }

        Ok(Self { entries })
    }

    pub fn get(&self, class_index: usize) -> Option<&DiseaseRecord> {
        self.entries.get(&class_index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Class indices in the table that a `num_classes`-way model can never predict.
    pub fn unreachable_keys(&self, num_classes: usize) -> Vec<usize> {
        self.entries.range(num_classes..).map(|(&k, _)| k).collect()
    }
}

/// Outcome of a single forward pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub class_index: usize,
    /// Score of `class_index` as a percentage in `[0, 100]`.
    pub confidence: f32,
    pub probabilities: Vec<f32>,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ClassScore {
    pub class_index: usize,
    pub confidence: f32,
}

impl Prediction {
    /// Builds a prediction from the raw model output.
    ///
    /// Confidence is the top score times 100. Only outputs with a score outside
    /// `[0, 1]` (logits from a model exported without its softmax) are
    /// normalised first. Ties go to the lowest index.
    pub fn from_scores(scores: &[f32]) -> Result<Self, PipelineError> {
        if scores.is_empty() {
            return Err(PipelineError::Inference("model returned an empty output vector".into()));
        }
        if scores.iter().any(|s| !s.is_finite()) {
            return Err(PipelineError::Inference("model output contains non-finite values".into()));
        }

        let probabilities = if scores.iter().all(|s| (0.0..=1.0).contains(s)) {
            scores.to_vec()
        } else {
            softmax(scores)
        };

        let (class_index, max) = probabilities
            .iter()
            .copied()
            .enumerate()
            .fold((0, f32::MIN), |best, (i, p)| if p > best.1 { (i, p) } else { best });

        Ok(Self {
            class_index,
            confidence: (max * 100.0).clamp(0.0, 100.0),
            probabilities,
        })
    }

    /// The `k` most likely classes, best first.
    pub fn top(&self, k: usize) -> Vec<ClassScore> {
        let mut ranked: Vec<ClassScore> = self
            .probabilities
            .iter()
            .enumerate()
            .map(|(class_index, &p)| ClassScore {
                class_index,
                confidence: (p * 100.0).clamp(0.0, 100.0),
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.class_index.cmp(&b.class_index))
        });
        ranked.truncate(k);
        ranked
    }
}

fn softmax(scores: &[f32]) -> Vec<f32> {
    let max = scores.iter().copied().fold(f32::MIN, f32::max);
    let exps: Vec<f32> = scores.iter().map(|&s| (s - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

#[derive(Debug, Serialize)]
pub struct PredictionResponse {
    pub request_id: String,
    pub class_index: usize,
    pub confidence: f32,
    pub disease: Option<DiseaseRecord>,
    pub top: Vec<ClassScore>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub classes: usize,
    pub table_entries: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = r#"{
        "0": {"disease": "Early Blight", "description": "Dark concentric spots.", "cure": "Copper fungicide."},
        "1": {"disease": "Healthy", "description": "No disease.", "cure": "None needed.", "severity": "none"}
    }"#;

    #[test]
    fn table_keys_become_class_indices() {
        let table = ReferenceTable::from_json(TABLE).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(0).unwrap().disease, "Early Blight");
        assert_eq!(table.get(1).unwrap().cure, "None needed.");
        assert!(table.get(2).is_none());
    }

    #[test]
    fn bundled_table_parses() {
        let table = ReferenceTable::from_json(include_str!("../database/disease_info.json")).unwrap();
        assert_eq!(table.len(), 10);
        assert_eq!(table.get(1).unwrap().disease, "Early Blight");
        assert!(table.unreachable_keys(10).is_empty());
    }

    #[test]
    fn non_index_keys_are_skipped() {
        let table = ReferenceTable::from_json(
            r#"{"01": {"disease": "a", "description": "b", "cure": "c"},
                "leaf": {"disease": "a", "description": "b", "cure": "c"},
                "3": {"disease": "Mosaic", "description": "b", "cure": "c"}}"#,
        )
        .unwrap();
        assert_eq!(table.len(), 1);
        assert!(table.get(1).is_none());
        assert_eq!(table.get(3).unwrap().disease, "Mosaic");
    }

    #[test]
    fn missing_field_is_fatal() {
        let err = ReferenceTable::from_json(r#"{"0": {"disease": "Early Blight", "cure": "x"}}"#)
            .unwrap_err();
        assert!(matches!(err, StartupError::TableParse(_)));
    }

    #[test]
    fn malformed_json_is_fatal() {
        assert!(ReferenceTable::from_json("[1, 2, 3]").is_err());
        assert!(ReferenceTable::from_json("{\"0\": ").is_err());
    }

    #[test]
    fn unreachable_keys_are_reported() {
        let table = ReferenceTable::from_json(TABLE).unwrap();
        assert_eq!(table.unreachable_keys(1), vec![1]);
        assert!(table.unreachable_keys(10).is_empty());
    }

    #[test]
    fn prediction_takes_argmax_of_probabilities() {
        let prediction = Prediction::from_scores(&[0.1, 0.7, 0.2]).unwrap();
        assert_eq!(prediction.class_index, 1);
        assert!((prediction.confidence - 70.0).abs() < 1e-4);
        assert_eq!(prediction.probabilities.len(), 3);
    }

    #[test]
    fn ties_resolve_to_lowest_index() {
        let prediction = Prediction::from_scores(&[0.4, 0.4, 0.2]).unwrap();
        assert_eq!(prediction.class_index, 0);
    }

    #[test]
    fn independent_scores_keep_max_times_100() {
        let prediction = Prediction::from_scores(&[0.9, 0.6]).unwrap();
        assert_eq!(prediction.class_index, 0);
        assert_eq!(format!("{:.2}", prediction.confidence), "90.00");
        assert_eq!(prediction.probabilities, vec![0.9, 0.6]);

        let single = Prediction::from_scores(&[0.3]).unwrap();
        assert_eq!(format!("{:.2}", single.confidence), "30.00");
    }

    #[test]
    fn logits_are_normalised_into_range() {
        let prediction = Prediction::from_scores(&[2.0, 8.5, -3.0]).unwrap();
        assert_eq!(prediction.class_index, 1);
        assert!(prediction.confidence > 0.0 && prediction.confidence <= 100.0);
        let total: f32 = prediction.probabilities.iter().sum();
        assert!((total - 1.0).abs() < 1e-4);
    }

    #[test]
    fn unusable_outputs_are_inference_errors() {
        assert!(matches!(
            Prediction::from_scores(&[]),
            Err(PipelineError::Inference(_))
        ));
        assert!(matches!(
            Prediction::from_scores(&[0.5, f32::NAN]),
            Err(PipelineError::Inference(_))
        ));
    }

    #[test]
    fn top_ranks_best_first() {
        let prediction = Prediction::from_scores(&[0.1, 0.6, 0.3]).unwrap();
        let top = prediction.top(2);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].class_index, 1);
        assert_eq!(top[1].class_index, 2);
        assert_eq!(prediction.top(10).len(), 3);
    }
}
