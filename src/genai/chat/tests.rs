use super::*;
use crate::auth::BearerAuthorizer;
use serde_json::{Value, json};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

fn client_for(server_url: &str, model_id: &str) -> ChatClient {
    ChatClient::new(
        reqwest::Client::new(),
        Arc::new(BearerAuthorizer::new("test-token")),
        Url::parse(server_url).expect("bad server url"),
        ServingMode::OnDemand {
            model_id: model_id.to_string(),
        },
        "ocid1.compartment.oc1..test",
        GenerationParams {
            temperature: Some(0.2),
            max_tokens: Some(256),
            ..GenerationParams::default()
        },
    )
}

fn user_turn(text: &str) -> Vec<ChatMessage> {
    vec![ChatMessage::Human {
        content: text.to_string(),
    }]
}

#[test]
fn wire_format_follows_model_family() {
    let generic = client_for("http://localhost", "meta.llama-3.1-70b-instruct");
    assert_eq!(generic.wire_format(), WireFormat::Generic);

    let cohere = client_for("http://localhost", "cohere.command-r-plus");
    assert_eq!(cohere.wire_format(), WireFormat::Cohere);
}

#[test]
fn bind_tools_returns_new_client_and_leaves_original() {
    let client = client_for("http://localhost", "meta.llama-3.1-70b-instruct");
    let tools = vec![ToolDefinition {
        name: "lookup".to_string(),
        description: "Look something up".to_string(),
        parameters: json!({"type": "object", "properties": {}}),
    }];

    let bound = client.bind_tools(&tools);
    assert!(bound.has_tools());
    assert!(!client.has_tools());
}

#[tokio::test]
async fn generic_generate_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/20231130/actions/chat"))
        .and(body_partial_json(json!({
            "compartmentId": "ocid1.compartment.oc1..test",
            "servingMode": {
                "servingType": "ON_DEMAND",
                "modelId": "meta.llama-3.1-70b-instruct"
            },
            "chatRequest": {
                "apiFormat": "GENERIC",
                "temperature": 0.2,
                "maxTokens": 256,
                "messages": [
                    {"role": "USER", "content": [{"type": "TEXT", "text": "hello"}]}
                ]
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "modelId": "meta.llama-3.1-70b-instruct",
            "chatResponse": {
                "apiFormat": "GENERIC",
                "choices": [{
                    "message": {
                        "role": "ASSISTANT",
                        "content": [
                            {"type": "TEXT", "text": "Hi "},
                            {"type": "TEXT", "text": "there"}
                        ]
                    }
                }]
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server.uri(), "meta.llama-3.1-70b-instruct");
    let response = client.generate(&user_turn("hello")).await.expect("generate failed");

    assert_eq!(
        response.message,
        ChatMessage::Assistant {
            content: "Hi there".to_string(),
            tool_calls: vec![],
        }
    );
}

#[tokio::test]
async fn generic_response_tool_calls_are_decoded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/20231130/actions/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "chatResponse": {
                "apiFormat": "GENERIC",
                "choices": [{
                    "message": {
                        "role": "ASSISTANT",
                        "content": [],
                        "toolCalls": [{
                            "id": "call-7",
                            "type": "FUNCTION",
                            "name": "get_weather",
                            "arguments": "{\"city\":\"Oslo\"}"
                        }]
                    }
                }]
            }
        })))
        .mount(&server)
        .await;

    let client = client_for(&server.uri(), "meta.llama-3.1-70b-instruct");
    let response = client.generate(&user_turn("weather?")).await.expect("generate failed");

    let ChatMessage::Assistant { tool_calls, .. } = response.message else {
        panic!("expected assistant message");
    };
    assert_eq!(tool_calls.len(), 1);
    assert_eq!(tool_calls[0].id, "call-7");
    assert_eq!(tool_calls[0].arguments, json!({"city": "Oslo"}));
}

#[tokio::test]
async fn cohere_generate_sends_standalone_message_and_decodes_name_as_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/20231130/actions/chat"))
        .and(body_partial_json(json!({
            "chatRequest": {
                "apiFormat": "COHERE",
                "message": "weather in Oslo?"
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "chatResponse": {
                "apiFormat": "COHERE",
                "text": "Checking.",
                "toolCalls": [{"name": "get_weather", "parameters": {"city": "Oslo"}}]
            }
        })))
        .mount(&server)
        .await;

    let client = client_for(&server.uri(), "cohere.command-r-plus");
    let response = client
        .generate(&user_turn("weather in Oslo?"))
        .await
        .expect("generate failed");

    let ChatMessage::Assistant { content, tool_calls } = response.message else {
        panic!("expected assistant message");
    };
    assert_eq!(content, "Checking.");
    assert_eq!(tool_calls[0].id, "get_weather");
    assert_eq!(tool_calls[0].name, "get_weather");
}

#[tokio::test]
async fn bound_tools_appear_in_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/20231130/actions/chat"))
        .and(body_partial_json(json!({
            "chatRequest": {
                "tools": [{
                    "type": "FUNCTION",
                    "name": "lookup",
                    "description": "Look something up"
                }]
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "chatResponse": {
                "apiFormat": "GENERIC",
                "choices": [{"message": {"role": "ASSISTANT", "content": [{"type": "TEXT", "text": "ok"}]}}]
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server.uri(), "meta.llama-3.1-70b-instruct").bind_tools(&[
        ToolDefinition {
            name: "lookup".to_string(),
            description: "Look something up".to_string(),
            parameters: json!({"type": "object", "properties": {}}),
        },
    ]);
    client.generate(&user_turn("go")).await.expect("generate failed");
}

#[tokio::test]
async fn provider_error_preserves_status_and_request_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/20231130/actions/chat"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("opc-request-id", "req-123")
                .set_body_string("rate limited"),
        )
        .mount(&server)
        .await;

    let client = client_for(&server.uri(), "cohere.command-r-plus");
    let err = client.generate(&user_turn("hi")).await.expect_err("should fail");

    let BridgeError::Provider {
        status,
        request_id,
        message,
    } = err
    else {
        panic!("expected provider error, got {err:?}");
    };
    assert_eq!(status, 429);
    assert_eq!(request_id.as_deref(), Some("req-123"));
    assert!(message.contains("rate limited"));
}

#[tokio::test]
async fn missing_candidates_fail_loudly() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/20231130/actions/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "chatResponse": {"apiFormat": "GENERIC", "choices": []}
        })))
        .mount(&server)
        .await;

    let client = client_for(&server.uri(), "meta.llama-3.1-70b-instruct");
    let err = client.generate(&user_turn("hi")).await.expect_err("should fail");
    assert!(matches!(err, BridgeError::Protocol(_)));
}

#[tokio::test]
async fn malformed_cohere_response_is_a_decode_error() {
    let server = MockServer::start().await;
    // No "text" field: must surface as a protocol error, not empty text.
    Mock::given(method("POST"))
        .and(path("/20231130/actions/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "chatResponse": {"apiFormat": "COHERE"}
        })))
        .mount(&server)
        .await;

    let client = client_for(&server.uri(), "cohere.command-r-plus");
    let err = client.generate(&user_turn("hi")).await.expect_err("should fail");
    assert!(matches!(err, BridgeError::Protocol(_)));
}

#[tokio::test]
async fn authorizer_header_is_attached() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/20231130/actions/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "chatResponse": {
                "apiFormat": "COHERE",
                "text": "hello"
            }
        })))
        .mount(&server)
        .await;

    let client = client_for(&server.uri(), "cohere.command-r-plus");
    client.generate(&user_turn("hi")).await.expect("generate failed");

    let requests = server.received_requests().await.expect("no requests recorded");
    let auth_header = |req: &Request| {
        req.headers
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string)
    };
    assert_eq!(
        auth_header(&requests[0]).as_deref(),
        Some("Bearer test-token")
    );
}

#[test]
fn generation_params_omit_unset_fields() {
    let params = GenerationParams {
        temperature: Some(0.5),
        ..GenerationParams::default()
    };
    let value: Value = serde_json::to_value(&params).expect("serialize failed");
    assert_eq!(value, json!({"temperature": 0.5}));
}
