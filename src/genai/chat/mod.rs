#[cfg(test)]
mod tests;

use crate::auth::RequestAuthorizer;
use crate::genai::message::{
    ChatMessage, CohereHistoryMessage, CohereTool, CohereToolCall, CohereToolResult,
    GenericMessage, GenericToolDefinition, ToolDefinition, WireFormat, cohere_tools,
    decode_cohere, decode_generic, encode_cohere, encode_generic, generic_tools,
};
use crate::genai::{API_VERSION, ServingMode, provider_error, transport_error};
use crate::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

/// Sampling and length parameters; provider defaults apply when omitted.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct GenerationParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(rename = "topP", skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(rename = "topK", skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(rename = "maxTokens", skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(rename = "frequencyPenalty", skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
    #[serde(rename = "presencePenalty", skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,
}

/// Tool set translated once at bind time into the client's wire shape.
#[derive(Debug, Clone)]
enum BoundTools {
    None,
    Generic(Vec<GenericToolDefinition>),
    Cohere(Vec<CohereTool>),
}

/// One-shot chat inference client. Immutable after construction; `bind_tools`
/// returns a new instance carrying the translated tool set.
#[derive(Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    authorizer: Arc<dyn RequestAuthorizer>,
    endpoint: Url,
    serving_mode: ServingMode,
    compartment_id: String,
    params: GenerationParams,
    format: WireFormat,
    tools: BoundTools,
}

/// Decoded single-candidate chat result.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatResponse {
    pub message: ChatMessage,
}

#[derive(Serialize)]
struct RequestEnvelope<'a> {
    #[serde(rename = "compartmentId")]
    compartment_id: &'a str,
    #[serde(rename = "servingMode")]
    serving_mode: &'a ServingMode,
    #[serde(rename = "chatRequest")]
    chat_request: RequestBody<'a>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum RequestBody<'a> {
    Generic {
        #[serde(rename = "apiFormat")]
        api_format: &'static str,
        messages: Vec<GenericMessage>,
        #[serde(skip_serializing_if = "Option::is_none")]
        tools: Option<&'a [GenericToolDefinition]>,
        #[serde(flatten)]
        params: &'a GenerationParams,
    },
    Cohere {
        #[serde(rename = "apiFormat")]
        api_format: &'static str,
        message: String,
        #[serde(rename = "chatHistory", skip_serializing_if = "Vec::is_empty")]
        chat_history: Vec<CohereHistoryMessage>,
        #[serde(rename = "toolResults", skip_serializing_if = "Vec::is_empty")]
        tool_results: Vec<CohereToolResult>,
        #[serde(skip_serializing_if = "Option::is_none")]
        tools: Option<&'a [CohereTool]>,
        #[serde(flatten)]
        params: &'a GenerationParams,
    },
}

#[derive(Deserialize)]
struct ResponseEnvelope {
    #[serde(rename = "chatResponse")]
    chat_response: ResponseBody,
}

#[derive(Deserialize)]
#[serde(tag = "apiFormat")]
enum ResponseBody {
    #[serde(rename = "GENERIC")]
    Generic { choices: Vec<Choice> },
    #[serde(rename = "COHERE")]
    Cohere {
        text: String,
        #[serde(rename = "toolCalls", default)]
        tool_calls: Vec<CohereToolCall>,
    },
}

#[derive(Deserialize)]
struct Choice {
    message: GenericMessage,
}

impl ChatClient {
    #[inline]
    pub fn new(
        http: reqwest::Client,
        authorizer: Arc<dyn RequestAuthorizer>,
        endpoint: Url,
        serving_mode: ServingMode,
        compartment_id: impl Into<String>,
        params: GenerationParams,
    ) -> Self {
        let format = serving_mode
            .model_id()
            .map_or(WireFormat::Generic, WireFormat::for_model);
        Self {
            http,
            authorizer,
            endpoint,
            serving_mode,
            compartment_id: compartment_id.into(),
            params,
            format,
            tools: BoundTools::None,
        }
    }

    #[inline]
    pub fn wire_format(&self) -> WireFormat {
        self.format
    }

    #[inline]
    pub fn has_tools(&self) -> bool {
        !matches!(self.tools, BoundTools::None)
    }

    /// Returns a new client carrying `tools` translated into this model
    /// family's wire shape. The receiver is left untouched.
    #[inline]
    #[must_use]
    pub fn bind_tools(&self, tools: &[ToolDefinition]) -> Self {
        let bound = match self.format {
            WireFormat::Generic => BoundTools::Generic(generic_tools(tools)),
            WireFormat::Cohere => BoundTools::Cohere(cohere_tools(tools)),
        };
        let mut client = self.clone();
        client.tools = bound;
        client
    }

    /// Issues exactly one synchronous inference call for the conversation and
    /// decodes the single supported candidate.
    #[inline]
    pub async fn generate(&self, messages: &[ChatMessage]) -> Result<ChatResponse> {
        let chat_request = self.build_request_body(messages)?;
        let envelope = RequestEnvelope {
            compartment_id: &self.compartment_id,
            serving_mode: &self.serving_mode,
            chat_request,
        };

        let url = self
            .endpoint
            .join(&format!("/{API_VERSION}/actions/chat"))
            .map_err(|e| BridgeError::Config(format!("Invalid chat endpoint: {e}")))?;

        debug!("Issuing chat request to {url}");

        let request = self.authorizer.authorize(self.http.post(url)).json(&envelope);
        let response = request
            .send()
            .await
            .map_err(|e| transport_error("Chat request failed", &e))?;

        if !response.status().is_success() {
            return Err(provider_error(response).await);
        }

        let envelope: ResponseEnvelope = response
            .json()
            .await
            .map_err(|e| BridgeError::Protocol(format!("Undecodable chat response: {e}")))?;

        self.decode_response(envelope.chat_response)
    }

    fn build_request_body(&self, messages: &[ChatMessage]) -> Result<RequestBody<'_>> {
        match self.format {
            WireFormat::Generic => Ok(RequestBody::Generic {
                api_format: "GENERIC",
                messages: encode_generic(messages)?,
                tools: match &self.tools {
                    BoundTools::Generic(tools) => Some(tools.as_slice()),
                    _ => None,
                },
                params: &self.params,
            }),
            WireFormat::Cohere => {
                let encoded = encode_cohere(messages)?;
                Ok(RequestBody::Cohere {
                    api_format: "COHERE",
                    message: encoded.message,
                    chat_history: encoded.chat_history,
                    tool_results: encoded.tool_results,
                    tools: match &self.tools {
                        BoundTools::Cohere(tools) => Some(tools.as_slice()),
                        _ => None,
                    },
                    params: &self.params,
                })
            }
        }
    }

    fn decode_response(&self, body: ResponseBody) -> Result<ChatResponse> {
        let message = match body {
            ResponseBody::Generic { choices } => {
                if choices.len() > 1 {
                    warn!(
                        "Provider returned {} candidates; only the first is modeled",
                        choices.len()
                    );
                }
                let choice = choices.into_iter().next().ok_or_else(|| {
                    BridgeError::Protocol("Chat response contains no candidates".to_string())
                })?;
                decode_generic(&choice.message)?
            }
            ResponseBody::Cohere { text, tool_calls } => decode_cohere(text, &tool_calls),
        };

        Ok(ChatResponse { message })
    }
}
