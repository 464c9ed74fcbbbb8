use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use super::{Classifier, ClassifierError, ImageInput};
use crate::models::analysis::{AnalysisSource, Prediction};

/// Model server reply. Either labelled predictions, or one probability per
/// configured class in class order (raw sigmoid output).
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ModelResponse {
    Labelled { predictions: Vec<Prediction> },
    Raw { probabilities: Vec<f64> },
}

/// Forwards images to an HTTP model server as a multipart `image` field.
pub struct RemoteClassifier {
    client: Client,
    endpoint: Url,
    class_names: Vec<String>,
    timeout_secs: u64,
}

impl RemoteClassifier {
    pub fn new(
        endpoint: &str,
        class_names: Vec<String>,
        timeout_secs: u64,
    ) -> anyhow::Result<Self> {
        let endpoint = Url::parse(endpoint)?;
        let client = Client::builder()
            .user_agent("MediScan/1.0")
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()?;

        Ok(Self {
            client,
            endpoint,
            class_names,
            timeout_secs,
        })
    }

    fn map_transport_error(&self, err: &reqwest::Error) -> ClassifierError {
        if err.is_timeout() {
            ClassifierError::Timeout(self.timeout_secs)
        } else {
            ClassifierError::Backend(err.to_string())
        }
    }

    fn to_predictions(&self, response: ModelResponse) -> Result<Vec<Prediction>, ClassifierError> {
        match response {
            ModelResponse::Labelled { predictions } => Ok(predictions),
            ModelResponse::Raw { probabilities } => {
                if probabilities.len() != self.class_names.len() {
                    return Err(ClassifierError::InvalidResponse(format!(
                        "expected {} probabilities, got {}",
                        self.class_names.len(),
                        probabilities.len()
                    )));
                }

                Ok(self
                    .class_names
                    .iter()
                    .zip(probabilities)
                    .map(|(label, p)| Prediction::new(label.clone(), p))
                    .collect())
            }
        }
    }
}

#[async_trait]
impl Classifier for RemoteClassifier {
    fn name(&self) -> &'static str {
        "remote"
    }

    fn source(&self) -> AnalysisSource {
        AnalysisSource::Model
    }

    fn class_names(&self) -> &[String] {
        &self.class_names
    }

    /// Ready when the server answers at all without a 5xx.
    async fn is_ready(&self) -> bool {
        match self.client.get(self.endpoint.clone()).send().await {
            Ok(response) => !response.status().is_server_error(),
            Err(e) => {
                debug!(error = %e, "Model server not reachable");
                false
            }
        }
    }

    async fn classify(&self, image: ImageInput<'_>) -> Result<Vec<Prediction>, ClassifierError> {
        let part = Part::bytes(image.bytes.to_vec())
            .file_name(image.filename.to_string())
            .mime_str(image.mime_type)
            .map_err(|e| ClassifierError::Backend(e.to_string()))?;
        let form = Form::new().part("image", part);

        let response = self
            .client
            .post(self.endpoint.clone())
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.map_transport_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, body = %body, "Model server rejected image");
            return Err(ClassifierError::Backend(format!(
                "model server returned {status}"
            )));
        }

        let parsed: ModelResponse = response
            .json()
            .await
            .map_err(|e| ClassifierError::InvalidResponse(e.to_string()))?;

        self.to_predictions(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> RemoteClassifier {
        RemoteClassifier::new(
            "http://127.0.0.1:9/predict",
            vec!["Mass".to_string(), "Nodule".to_string()],
            1,
        )
        .unwrap()
    }

    #[test]
    fn test_rejects_invalid_endpoint() {
        assert!(RemoteClassifier::new("not a url", Vec::new(), 5).is_err());
    }

    #[test]
    fn test_labelled_response() {
        let response: ModelResponse = serde_json::from_str(
            r#"{"predictions":[{"label":"Mass","probability":0.7}]}"#,
        )
        .unwrap();
        let predictions = classifier().to_predictions(response).unwrap();
        assert_eq!(predictions, vec![Prediction::new("Mass", 0.7)]);
    }

    #[test]
    fn test_raw_response_is_zipped_with_class_names() {
        let response: ModelResponse =
            serde_json::from_str(r#"{"probabilities":[0.1,0.9]}"#).unwrap();
        let predictions = classifier().to_predictions(response).unwrap();
        assert_eq!(predictions[1], Prediction::new("Nodule", 0.9));

        let short: ModelResponse = serde_json::from_str(r#"{"probabilities":[0.1]}"#).unwrap();
        assert!(matches!(
            classifier().to_predictions(short),
            Err(ClassifierError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_not_ready() {
        assert!(!classifier().is_ready().await);
    }
}
