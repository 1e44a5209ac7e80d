//! Streaming client for Groq's OpenAI-compatible chat completions API.

use reqwest_eventsource::RequestBuilderExt;
use serde::{Deserialize, Serialize};
use tokio_stream::Stream;
use tracing::debug;

use super::{into_text_chunks, EventPayload, MAX_ANSWER_TOKENS, SYSTEM_PROMPT, TEMPERATURE, TOP_P};
use crate::config::LlmConfig;
use crate::error::{Error, Result};

/// Opens a streamed Groq answer for a text prompt.
///
/// Returns an error only when the request cannot be constructed; connection
/// and protocol failures surface as items on the returned stream.
pub fn stream_answer(
    http_client: &reqwest::Client,
    llm: &LlmConfig,
    prompt: &str,
) -> Result<impl Stream<Item = Result<String>>> {
    let url = format!(
        "{}/chat/completions",
        llm.groq_base_url.trim_end_matches('/')
    );
    let request = build_request(&llm.groq_model, prompt);
    let body = serde_json::to_vec(&request)
        .map_err(|e| Error::Upstream(format!("could not encode Groq request: {e}")))?;

    debug!(model = %llm.groq_model, "opening Groq answer stream");
    let source = http_client
        .post(&url)
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .header(
            reqwest::header::AUTHORIZATION,
            format!("Bearer {}", llm.groq_api_key),
        )
        .body(body)
        .eventsource()
        .map_err(|e| Error::Upstream(format!("could not open Groq stream: {e}")))?;

    Ok(into_text_chunks::<ChatEvent>(source))
}

fn build_request(model: &str, prompt: &str) -> ChatRequest {
    ChatRequest {
        model: model.to_string(),
        messages: vec![
            Message {
                role: "system",
                content: SYSTEM_PROMPT.to_string(),
            },
            Message {
                role: "user",
                content: prompt.to_string(),
            },
        ],
        temperature: TEMPERATURE,
        top_p: TOP_P,
        max_tokens: MAX_ANSWER_TOKENS,
        stream: true,
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f32,
    top_p: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ChatEvent {
    Chunk(ChatChunk),
    Error(ApiError),
    Unknown(serde_json::Value),
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: Delta,
}

#[derive(Debug, Deserialize)]
struct Delta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

impl EventPayload for ChatEvent {
    fn into_text(self) -> Result<Option<String>> {
        match self {
            ChatEvent::Chunk(chunk) => Ok(chunk
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.delta.content)
                .filter(|content| !content.is_empty())),
            ChatEvent::Error(err) => Err(Error::Upstream(format!(
                "Groq API error: {}",
                err.error.message
            ))),
            ChatEvent::Unknown(value) => Err(Error::Upstream(format!(
                "unexpected Groq stream event: {value}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio_stream::StreamExt;

    use super::*;

    fn test_config(base_url: &str) -> LlmConfig {
        LlmConfig {
            gemini_api_key: "test-gemini-key".to_string(),
            groq_api_key: "test-groq-key".to_string(),
            gemini_base_url: base_url.to_string(),
            gemini_model: "gemini-2.0-flash".to_string(),
            groq_base_url: base_url.to_string(),
            groq_model: "llama-3.3-70b-versatile".to_string(),
            answer_timeout_secs: 45,
        }
    }

    #[test]
    fn test_request_shape() {
        let request = build_request("llama-3.3-70b-versatile", "Why is the sky blue?");
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(value["model"], "llama-3.3-70b-versatile");
        assert_eq!(value["stream"], true);
        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["messages"][0]["content"], SYSTEM_PROMPT);
        assert_eq!(value["messages"][1]["role"], "user");
        assert_eq!(value["messages"][1]["content"], "Why is the sky blue?");
        assert_eq!(value["max_tokens"], 2048);
    }

    #[test]
    fn test_delta_event_text() {
        let event: ChatEvent = serde_json::from_str(
            r#"{"id":"c-1","object":"chat.completion.chunk","choices":[{"index":0,"delta":{"content":"Because"}}]}"#,
        )
        .unwrap();
        assert_eq!(event.into_text().unwrap(), Some("Because".to_string()));
    }

    #[test]
    fn test_role_only_delta_is_skipped() {
        let event: ChatEvent =
            serde_json::from_str(r#"{"choices":[{"index":0,"delta":{"role":"assistant"}}]}"#)
                .unwrap();
        assert_eq!(event.into_text().unwrap(), None);
    }

    #[test]
    fn test_final_empty_delta_is_skipped() {
        let event: ChatEvent = serde_json::from_str(
            r#"{"choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}"#,
        )
        .unwrap();
        assert_eq!(event.into_text().unwrap(), None);
    }

    #[test]
    fn test_error_event_surfaces_message() {
        let event: ChatEvent = serde_json::from_str(
            r#"{"error":{"message":"model decommissioned","type":"invalid_request_error"}}"#,
        )
        .unwrap();
        let err = event.into_text().unwrap_err();
        assert!(err.to_string().contains("model decommissioned"));
    }

    #[tokio::test]
    async fn test_stream_answer_relays_chunks() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer test-groq-key")
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(concat!(
                "data: {\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\"}}]}\n\n",
                "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Because of \"}}]}\n\n",
                "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Rayleigh scattering.\"}}]}\n\n",
                "data: {\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
                "data: [DONE]\n\n",
            ))
            .create_async()
            .await;

        let config = test_config(&server.url());
        let client = reqwest::Client::new();
        let stream = stream_answer(&client, &config, "Why is the sky blue?").unwrap();
        let chunks: Vec<_> = stream.collect().await;
        mock.assert_async().await;

        let texts: Vec<String> = chunks
            .into_iter()
            .collect::<Result<Vec<String>>>()
            .unwrap();
        assert_eq!(
            texts,
            vec![
                "Because of ".to_string(),
                "Rayleigh scattering.".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn test_stream_answer_surfaces_http_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(429)
            .with_body(r#"{"error":{"message":"rate limit reached","type":"tokens"}}"#)
            .create_async()
            .await;

        let config = test_config(&server.url());
        let client = reqwest::Client::new();
        let stream = stream_answer(&client, &config, "Why is the sky blue?").unwrap();
        tokio::pin!(stream);

        match stream.next().await {
            Some(Err(err)) => assert!(err.to_string().contains("429")),
            other => panic!("expected an upstream error, got {other:?}"),
        }
    }
}
