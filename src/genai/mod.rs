// Clients for the OCI Generative AI inference service: a chat client speaking
// two wire formats and a batched embeddings client.

pub mod chat;
pub mod embeddings;
pub mod message;

use crate::{BridgeError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Inference API version segment, part of every request path.
pub const API_VERSION: &str = "20231130";

/// Text-embedding provider seam. The vector store engine probes dimensions and
/// embeds batches through this, which also keeps it testable without a live
/// endpoint.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;
}

/// On-demand vs dedicated model hosting, passed through to the provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "servingType")]
pub enum ServingMode {
    #[serde(rename = "ON_DEMAND")]
    OnDemand {
        #[serde(rename = "modelId")]
        model_id: String,
    },
    #[serde(rename = "DEDICATED")]
    Dedicated {
        #[serde(rename = "endpointId")]
        endpoint_id: String,
    },
}

impl ServingMode {
    /// The model identifier driving wire-format selection; dedicated endpoints
    /// carry no model id and default to the generic format.
    #[inline]
    pub fn model_id(&self) -> Option<&str> {
        match self {
            ServingMode::OnDemand { model_id } => Some(model_id),
            ServingMode::Dedicated { .. } => None,
        }
    }
}

/// Converts a non-success provider response into a `BridgeError::Provider`,
/// preserving the status code and `opc-request-id` diagnostic header.
pub(crate) async fn provider_error(response: reqwest::Response) -> BridgeError {
    let status = response.status().as_u16();
    let request_id = response
        .headers()
        .get("opc-request-id")
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string);
    let message = response
        .text()
        .await
        .unwrap_or_else(|e| format!("<unreadable body: {e}>"));

    BridgeError::Provider {
        status,
        request_id,
        message,
    }
}

/// Maps a transport-level failure, keeping the error chain readable.
pub(crate) fn transport_error(context: &str, err: &reqwest::Error) -> BridgeError {
    BridgeError::Provider {
        status: err.status().map_or(0, |s| s.as_u16()),
        request_id: None,
        message: format!("{context}: {err}"),
    }
}
