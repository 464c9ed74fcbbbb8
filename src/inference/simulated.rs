use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{Classifier, ClassifierError, ImageInput};
use crate::models::analysis::{AnalysisSource, Prediction};

/// Stand-in for a trained model. Probabilities are drawn from an RNG seeded
/// with a hash of the image bytes, so the same image always gets the same
/// result.
pub struct SimulatedClassifier {
    class_names: Vec<String>,
}

impl SimulatedClassifier {
    #[must_use]
    pub const fn new(class_names: Vec<String>) -> Self {
        Self { class_names }
    }

    fn predict(&self, bytes: &[u8]) -> Vec<Prediction> {
        let mut rng = StdRng::seed_from_u64(fnv1a(bytes));

        self.class_names
            .iter()
            .map(|label| {
                // Skewed towards low values, like a multi-label sigmoid head
                let p: f64 = rng.random::<f64>().powi(3);
                Prediction::new(label.clone(), (p * 10_000.0).round() / 10_000.0)
            })
            .collect()
    }
}

#[async_trait]
impl Classifier for SimulatedClassifier {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn source(&self) -> AnalysisSource {
        AnalysisSource::Simulated
    }

    fn class_names(&self) -> &[String] {
        &self.class_names
    }

    async fn is_ready(&self) -> bool {
        true
    }

    async fn classify(&self, image: ImageInput<'_>) -> Result<Vec<Prediction>, ClassifierError> {
        Ok(self.predict(image.bytes))
    }
}

/// 64-bit FNV-1a. Stable across builds and platforms, unlike `DefaultHasher`.
fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    bytes
        .iter()
        .fold(OFFSET, |hash, b| (hash ^ u64::from(*b)).wrapping_mul(PRIME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::defaults;

    fn classifier() -> SimulatedClassifier {
        SimulatedClassifier::new(defaults::CLASS_NAMES.iter().map(ToString::to_string).collect())
    }

    fn input(bytes: &[u8]) -> ImageInput<'_> {
        ImageInput {
            filename: "scan.png",
            mime_type: "image/png",
            bytes,
        }
    }

    #[tokio::test]
    async fn test_same_bytes_same_predictions() {
        let classifier = classifier();
        let a = classifier.classify(input(b"image-one")).await.unwrap();
        let b = classifier.classify(input(b"image-one")).await.unwrap();
        assert_eq!(a, b);

        let c = classifier.classify(input(b"image-two")).await.unwrap();
        assert_ne!(a, c);
    }

    #[tokio::test]
    async fn test_one_probability_per_class_in_range() {
        let classifier = classifier();
        let predictions = classifier.classify(input(b"bytes")).await.unwrap();

        assert_eq!(predictions.len(), defaults::CLASS_NAMES.len());
        assert!(
            predictions
                .iter()
                .all(|p| (0.0..=1.0).contains(&p.probability))
        );
    }

    #[test]
    fn test_fnv1a_known_values() {
        assert_eq!(fnv1a(b""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(fnv1a(b"a"), 0xaf63_dc4c_8601_ec8c);
    }
}
