//! Translation between the provider-agnostic conversation model and the two
//! inference wire formats: the generic chat format and the Cohere chat-history
//! format. All translation here is pure; clients own the HTTP traffic.
//!
//! The Cohere format carries no distinct tool-call id on the wire. Outgoing
//! tool results are correlated to their originating calls by the call id the
//! conversation carries (with the tool name as fallback), so the real name and
//! parameters survive encoding; decoded responses reuse the tool's *name* as
//! its nominal id. A conversation issuing two concurrent calls to the same
//! tool therefore stays ambiguous after a Cohere round trip; this is a
//! wire-format limitation, not ours to fix.


use crate::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Model-id prefix selecting the Cohere wire format.
const COHERE_MODEL_PREFIX: &str = "cohere.";

/// Provider-agnostic conversation message.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatMessage {
    System {
        content: String,
    },
    Human {
        content: String,
    },
    Assistant {
        content: String,
        tool_calls: Vec<ToolCall>,
    },
    /// Result of executing a tool call; references the assistant call's id.
    Tool {
        content: String,
        tool_call_id: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// A callable tool: name, description and a JSON Schema parameter object.
/// Immutable once bound to a chat client.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    Generic,
    Cohere,
}

impl WireFormat {
    /// Selects the wire format by model-naming convention.
    #[inline]
    pub fn for_model(model_id: &str) -> Self {
        if model_id.starts_with(COHERE_MODEL_PREFIX) {
            WireFormat::Cohere
        } else {
            WireFormat::Generic
        }
    }
}

// ---------------------------------------------------------------------------
// Generic format
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenericMessage {
    pub role: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<ContentPart>,
    #[serde(rename = "toolCalls", skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<GenericToolCall>>,
    #[serde(rename = "toolCallId", skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

/// Content part of a generic message. Only text parts are modeled; multimodal
/// parts are not supported.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ContentPart {
    #[serde(rename = "TEXT")]
    Text { text: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenericToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    /// JSON-stringified argument object.
    pub arguments: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenericToolDefinition {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Encodes a conversation into generic-format messages, order preserved.
#[inline]
pub fn encode_generic(messages: &[ChatMessage]) -> Result<Vec<GenericMessage>> {
    messages
        .iter()
        .map(|message| {
            Ok(match message {
                ChatMessage::System { content } => generic_text_message("SYSTEM", content),
                ChatMessage::Human { content } => generic_text_message("USER", content),
                ChatMessage::Assistant {
                    content,
                    tool_calls,
                } => {
                    let mut encoded = generic_text_message("ASSISTANT", content);
                    if !tool_calls.is_empty() {
                        encoded.tool_calls = Some(
                            tool_calls
                                .iter()
                                .map(|call| {
                                    Ok(GenericToolCall {
                                        id: call.id.clone(),
                                        kind: "FUNCTION".to_string(),
                                        name: call.name.clone(),
                                        arguments: serde_json::to_string(&call.arguments)
                                            .map_err(|e| {
                                                BridgeError::Protocol(format!(
                                                    "Failed to serialize tool-call arguments: {e}"
                                                ))
                                            })?,
                                    })
                                })
                                .collect::<Result<Vec<_>>>()?,
                        );
                    }
                    encoded
                }
                ChatMessage::Tool {
                    content,
                    tool_call_id,
                } => {
                    let mut encoded = generic_text_message("TOOL", content);
                    encoded.tool_call_id = Some(tool_call_id.clone());
                    encoded
                }
            })
        })
        .collect()
}

fn generic_text_message(role: &str, content: &str) -> GenericMessage {
    GenericMessage {
        role: role.to_string(),
        content: vec![ContentPart::Text {
            text: content.to_string(),
        }],
        tool_calls: None,
        tool_call_id: None,
    }
}

/// Decodes one generic-format message back into the agnostic shape. Text is
/// the concatenation of all text parts.
#[inline]
pub fn decode_generic(message: &GenericMessage) -> Result<ChatMessage> {
    let text: String = message
        .content
        .iter()
        .map(|part| match part {
            ContentPart::Text { text } => text.as_str(),
        })
        .collect();

    let decoded = match message.role.as_str() {
        "SYSTEM" => ChatMessage::System { content: text },
        "USER" => ChatMessage::Human { content: text },
        "ASSISTANT" => {
            let tool_calls = message
                .tool_calls
                .as_deref()
                .unwrap_or_default()
                .iter()
                .map(|call| {
                    Ok(ToolCall {
                        id: call.id.clone(),
                        name: call.name.clone(),
                        arguments: serde_json::from_str(&call.arguments).map_err(|e| {
                            BridgeError::Protocol(format!(
                                "Tool call '{}' carries undecodable arguments: {e}",
                                call.name
                            ))
                        })?,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            ChatMessage::Assistant {
                content: text,
                tool_calls,
            }
        }
        "TOOL" => ChatMessage::Tool {
            content: text,
            tool_call_id: message.tool_call_id.clone().ok_or_else(|| {
                BridgeError::Protocol("TOOL message missing toolCallId".to_string())
            })?,
        },
        other => {
            return Err(BridgeError::Protocol(format!(
                "Unknown generic message role: {other}"
            )));
        }
    };

    Ok(decoded)
}

/// Translates tool definitions into typed generic function definitions.
#[inline]
pub fn generic_tools(tools: &[ToolDefinition]) -> Vec<GenericToolDefinition> {
    tools
        .iter()
        .map(|tool| GenericToolDefinition {
            kind: "FUNCTION".to_string(),
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters: tool.parameters.clone(),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Cohere format
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CohereHistoryMessage {
    pub role: String,
    pub message: String,
    #[serde(rename = "toolCalls", skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<CohereToolCall>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CohereToolCall {
    pub name: String,
    pub parameters: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CohereToolResult {
    pub call: CohereToolCall,
    pub outputs: Vec<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CohereTool {
    pub name: String,
    pub description: String,
    #[serde(rename = "parameterDefinitions", skip_serializing_if = "Option::is_none")]
    pub parameter_definitions: Option<Map<String, Value>>,
}

/// Cohere-format request body pieces produced from one conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct CohereEncoded {
    /// The standalone request message (empty when tool results are present).
    pub message: String,
    pub chat_history: Vec<CohereHistoryMessage>,
    pub tool_results: Vec<CohereToolResult>,
}

/// Encodes a conversation into the Cohere chat-history shape.
///
/// Assistant tool calls ride on the CHATBOT history entry; tool-result
/// messages are consolidated into one `tool_results` list, correlated to the
/// originating call by its id, falling back to the name for histories that
/// already use name-as-id (see module docs). With no tool results, the
/// trailing message must be user-role and becomes the standalone `message`;
/// a trailing message of any other role is surfaced as an error.
#[inline]
pub fn encode_cohere(messages: &[ChatMessage]) -> Result<CohereEncoded> {
    let mut chat_history = Vec::new();
    let mut tool_results: Vec<CohereToolResult> = Vec::new();
    // Calls seen so far, keyed by originating call id, so results keep the
    // real name and parameters even when ids and names differ.
    let mut known_calls: Vec<(String, CohereToolCall)> = Vec::new();

    for message in messages {
        match message {
            ChatMessage::System { content } => chat_history.push(CohereHistoryMessage {
                role: "SYSTEM".to_string(),
                message: content.clone(),
                tool_calls: None,
            }),
            ChatMessage::Human { content } => chat_history.push(CohereHistoryMessage {
                role: "USER".to_string(),
                message: content.clone(),
                tool_calls: None,
            }),
            ChatMessage::Assistant {
                content,
                tool_calls,
            } => {
                let calls: Vec<CohereToolCall> = tool_calls
                    .iter()
                    .map(|call| CohereToolCall {
                        name: call.name.clone(),
                        parameters: call.arguments.clone(),
                    })
                    .collect();
                for (call, encoded) in tool_calls.iter().zip(calls.iter()) {
                    known_calls.push((call.id.clone(), encoded.clone()));
                }
                chat_history.push(CohereHistoryMessage {
                    role: "CHATBOT".to_string(),
                    message: content.clone(),
                    tool_calls: (!calls.is_empty()).then_some(calls),
                });
            }
            ChatMessage::Tool {
                content,
                tool_call_id,
            } => {
                // Match the originating call by id first; histories that were
                // decoded from the wire carry the name as id instead.
                let call = known_calls
                    .iter()
                    .find(|(id, _)| id == tool_call_id)
                    .or_else(|| known_calls.iter().find(|(_, call)| call.name == *tool_call_id))
                    .map(|(_, call)| call.clone())
                    .unwrap_or_else(|| CohereToolCall {
                        name: tool_call_id.clone(),
                        parameters: Value::Object(Map::new()),
                    });
                let output = serde_json::from_str(content).unwrap_or_else(|_| {
                    let mut wrapped = Map::new();
                    wrapped.insert("output".to_string(), Value::String(content.clone()));
                    Value::Object(wrapped)
                });
                tool_results.push(CohereToolResult {
                    call,
                    outputs: vec![output],
                });
            }
        }
    }

    let message = if tool_results.is_empty() {
        match chat_history.pop() {
            Some(last) if last.role == "USER" => last.message,
            Some(last) => {
                return Err(BridgeError::Protocol(format!(
                    "Conversation must end with a user message, found role {}",
                    last.role
                )));
            }
            None => {
                return Err(BridgeError::Protocol(
                    "Cannot encode an empty conversation".to_string(),
                ));
            }
        }
    } else {
        String::new()
    };

    Ok(CohereEncoded {
        message,
        chat_history,
        tool_results,
    })
}

/// Decodes a Cohere response text + tool calls into the agnostic assistant
/// message. Decoded calls get their id set equal to their name, mirroring the
/// encode-side correlation.
#[inline]
pub fn decode_cohere(text: String, tool_calls: &[CohereToolCall]) -> ChatMessage {
    ChatMessage::Assistant {
        content: text,
        tool_calls: tool_calls
            .iter()
            .map(|call| ToolCall {
                id: call.name.clone(),
                name: call.name.clone(),
                arguments: call.parameters.clone(),
            })
            .collect(),
    }
}

/// Translates tool definitions into Cohere's flat parameter-definition map.
/// JSON Schema property types are narrowed to Cohere's scalar type names.
#[inline]
pub fn cohere_tools(tools: &[ToolDefinition]) -> Vec<CohereTool> {
    tools
        .iter()
        .map(|tool| {
            let required: Vec<&str> = tool
                .parameters
                .get("required")
                .and_then(Value::as_array)
                .map(|names| names.iter().filter_map(Value::as_str).collect())
                .unwrap_or_default();

            let definitions: Option<Map<String, Value>> = tool
                .parameters
                .get("properties")
                .and_then(Value::as_object)
                .map(|properties| {
                    properties
                        .iter()
                        .map(|(name, schema)| {
                            let mut def = Map::new();
                            def.insert(
                                "description".to_string(),
                                schema
                                    .get("description")
                                    .cloned()
                                    .unwrap_or_else(|| Value::String(String::new())),
                            );
                            def.insert(
                                "type".to_string(),
                                Value::String(
                                    cohere_param_type(
                                        schema.get("type").and_then(Value::as_str),
                                    )
                                    .to_string(),
                                ),
                            );
                            def.insert(
                                "isRequired".to_string(),
                                Value::Bool(required.contains(&name.as_str())),
                            );
                            (name.clone(), Value::Object(def))
                        })
                        .collect()
                });

            CohereTool {
                name: tool.name.clone(),
                description: tool.description.clone(),
                parameter_definitions: definitions,
            }
        })
        .collect()
}

fn cohere_param_type(schema_type: Option<&str>) -> &'static str {
    match schema_type {
        Some("integer") => "int",
        Some("number") => "float",
        Some("boolean") => "bool",
        // Strings and anything structured fall back to str.
        _ => "str",
    }
}
