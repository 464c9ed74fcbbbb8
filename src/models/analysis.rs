use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: String,
    pub probability: f64,
}

impl Prediction {
    pub fn new(label: impl Into<String>, probability: f64) -> Self {
        Self {
            label: label.into(),
            probability,
        }
    }
}

/// Where the probabilities came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisSource {
    Model,
    Simulated,
}

impl AnalysisSource {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Model => "model",
            Self::Simulated => "simulated",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Self {
        if value == "model" {
            Self::Model
        } else {
            Self::Simulated
        }
    }
}

impl fmt::Display for AnalysisSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisRecord {
    pub id: i32,
    #[serde(skip)]
    pub user_id: i32,
    pub timestamp: String,
    pub filename: String,
    #[serde(skip)]
    pub stored_name: String,
    pub image_url: String,
    pub predictions: Vec<Prediction>,
    pub source: AnalysisSource,
}

impl AnalysisRecord {
    #[must_use]
    pub fn top_prediction(&self) -> Option<&Prediction> {
        self.predictions.first()
    }
}

/// Sorts by probability (descending, label as tie-break) and keeps the
/// first `top_k`. Non-finite probabilities are dropped and the rest are
/// clamped into `[0, 1]`.
#[must_use]
pub fn rank_predictions(predictions: Vec<Prediction>, top_k: usize) -> Vec<Prediction> {
    let mut ranked: Vec<Prediction> = predictions
        .into_iter()
        .filter(|p| p.probability.is_finite())
        .map(|mut p| {
            p.probability = p.probability.clamp(0.0, 1.0);
            p
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.probability
            .partial_cmp(&a.probability)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.label.cmp(&b.label))
    });
    ranked.truncate(top_k);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_sorts_descending_and_truncates() {
        let ranked = rank_predictions(
            vec![
                Prediction::new("Edema", 0.2),
                Prediction::new("Mass", 0.9),
                Prediction::new("Nodule", 0.5),
                Prediction::new("Hernia", 0.7),
            ],
            3,
        );

        let labels: Vec<&str> = ranked.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(labels, vec!["Mass", "Hernia", "Nodule"]);
    }

    #[test]
    fn test_rank_drops_nan_and_clamps() {
        let ranked = rank_predictions(
            vec![
                Prediction::new("A", f64::NAN),
                Prediction::new("B", 1.4),
                Prediction::new("C", -0.1),
            ],
            5,
        );

        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0], Prediction::new("B", 1.0));
        assert_eq!(ranked[1], Prediction::new("C", 0.0));
    }

    #[test]
    fn test_rank_breaks_ties_by_label() {
        let ranked = rank_predictions(
            vec![Prediction::new("Zeta", 0.5), Prediction::new("Alpha", 0.5)],
            2,
        );
        assert_eq!(ranked[0].label, "Alpha");
    }

    #[test]
    fn test_source_parse() {
        assert_eq!(AnalysisSource::parse("model"), AnalysisSource::Model);
        assert_eq!(AnalysisSource::parse("simulated"), AnalysisSource::Simulated);
        assert_eq!(AnalysisSource::Model.to_string(), "model");
    }
}
