
use crate::auth::RequestAuthorizer;
use crate::genai::{API_VERSION, Embedder, ServingMode, provider_error, transport_error};
use crate::{BridgeError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use url::Url;

/// Provider request limit on inputs per embedText call.
const MAX_BATCH_SIZE: usize = 90;

/// Batched text-embedding client for the Generative AI inference service.
#[derive(Clone)]
pub struct EmbeddingsClient {
    http: reqwest::Client,
    authorizer: Arc<dyn RequestAuthorizer>,
    endpoint: Url,
    serving_mode: ServingMode,
    compartment_id: String,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    inputs: &'a [String],
    #[serde(rename = "servingMode")]
    serving_mode: &'a ServingMode,
    #[serde(rename = "compartmentId")]
    compartment_id: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Option<Vec<Vec<f32>>>,
}

impl EmbeddingsClient {
    #[inline]
    pub fn new(
        http: reqwest::Client,
        authorizer: Arc<dyn RequestAuthorizer>,
        endpoint: Url,
        serving_mode: ServingMode,
        compartment_id: impl Into<String>,
    ) -> Self {
        Self {
            http,
            authorizer,
            endpoint,
            serving_mode,
            compartment_id: compartment_id.into(),
        }
    }

    async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbedRequest {
            inputs,
            serving_mode: &self.serving_mode,
            compartment_id: &self.compartment_id,
        };

        let url = self
            .endpoint
            .join(&format!("/{API_VERSION}/actions/embedText"))
            .map_err(|e| BridgeError::Config(format!("Invalid embed endpoint: {e}")))?;

        debug!("Embedding batch of {} texts", inputs.len());

        let response = self
            .authorizer
            .authorize(self.http.post(url))
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error("Embed request failed", &e))?;

        if !response.status().is_success() {
            return Err(provider_error(response).await);
        }

        let decoded: EmbedResponse = response
            .json()
            .await
            .map_err(|e| BridgeError::Embedding(format!("Undecodable embed response: {e}")))?;

        let embeddings = decoded.embeddings.ok_or_else(|| {
            BridgeError::Embedding("Embed response carries no embeddings list".to_string())
        })?;

        if embeddings.len() != inputs.len() {
            return Err(BridgeError::Embedding(format!(
                "Embedding count mismatch: {} inputs, {} embeddings",
                inputs.len(),
                embeddings.len()
            )));
        }

        Ok(embeddings)
    }
}

#[async_trait]
impl Embedder for EmbeddingsClient {
    /// Embeds the non-empty texts in request batches of at most 90,
    /// concatenating results in batch order.
    #[inline]
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let inputs: Vec<String> = texts
            .iter()
            .filter(|t| !t.trim().is_empty())
            .cloned()
            .collect();
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let mut results = Vec::with_capacity(inputs.len());
        for batch in inputs.chunks(MAX_BATCH_SIZE) {
            results.extend(self.embed_batch(batch).await?);
        }

        debug!("Embedded {} texts total", results.len());
        Ok(results)
    }

    #[inline]
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut embeddings = self.embed_batch(&[text.to_string()]).await?;
        embeddings.pop().ok_or_else(|| {
            BridgeError::Embedding("Embed response missing the query embedding".to_string())
        })
    }
}
