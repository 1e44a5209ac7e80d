//! Streaming client for the Gemini `streamGenerateContent` API.

use reqwest_eventsource::RequestBuilderExt;
use serde::{Deserialize, Serialize};
use tokio_stream::Stream;
use tracing::debug;

use super::{
    into_text_chunks, EventPayload, MAX_ANSWER_TOKENS, SYSTEM_PROMPT, TEMPERATURE, TOP_K, TOP_P,
};
use crate::config::LlmConfig;
use crate::error::{Error, Result};

/// Base64 image payload attached to a question.
#[derive(Debug, Clone)]
pub struct InlineImage {
    pub mime_type: String,
    pub data: String,
}

/// Opens a streamed Gemini answer for a prompt and optional image.
///
/// Returns an error only when the request cannot be constructed; connection
/// and protocol failures surface as items on the returned stream.
pub fn stream_answer(
    http_client: &reqwest::Client,
    llm: &LlmConfig,
    prompt: &str,
    image: Option<InlineImage>,
) -> Result<impl Stream<Item = Result<String>>> {
    let url = format!(
        "{}/models/{}:streamGenerateContent?alt=sse",
        llm.gemini_base_url.trim_end_matches('/'),
        llm.gemini_model
    );
    let request = build_request(prompt, image);
    let body = serde_json::to_vec(&request)
        .map_err(|e| Error::Upstream(format!("could not encode Gemini request: {e}")))?;

    debug!(model = %llm.gemini_model, "opening Gemini answer stream");
    let source = http_client
        .post(&url)
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .header("x-goog-api-key", &llm.gemini_api_key)
        .body(body)
        .eventsource()
        .map_err(|e| Error::Upstream(format!("could not open Gemini stream: {e}")))?;

    Ok(into_text_chunks::<EventData>(source))
}

fn build_request(prompt: &str, image: Option<InlineImage>) -> GenerateRequest {
    let mut parts = vec![Part::Text {
        text: prompt.to_string(),
    }];
    if let Some(image) = image {
        parts.push(Part::Image {
            inline_data: InlineData {
                mime_type: image.mime_type,
                data: image.data,
            },
        });
    }

    GenerateRequest {
        system_instruction: Content {
            role: None,
            parts: vec![Part::Text {
                text: SYSTEM_PROMPT.to_string(),
            }],
        },
        contents: vec![Content {
            role: Some("user"),
            parts,
        }],
        generation_config: GenerationConfig {
            temperature: TEMPERATURE,
            top_p: TOP_P,
            top_k: TOP_K,
            max_output_tokens: MAX_ANSWER_TOKENS,
        },
    }
}

// ====== request wire types ======

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    system_instruction: Content,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    Image {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: i32,
    max_output_tokens: u32,
}

// ====== response wire types ======

/// Gemini sends chunks directly on `data:` lines without an event wrapper.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EventData {
    Chunk(GenerateResponse),
    Error(ApiError),
    Unknown(serde_json::Value),
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    parts: Option<Vec<CandidatePart>>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: i32,
    message: String,
}

impl GenerateResponse {
    fn text(self) -> Option<String> {
        let parts = self.candidates.into_iter().next()?.content?.parts?;
        let text: String = parts.into_iter().filter_map(|part| part.text).collect();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

impl EventPayload for EventData {
    fn into_text(self) -> Result<Option<String>> {
        match self {
            EventData::Chunk(response) => Ok(response.text()),
            EventData::Error(err) => Err(Error::Upstream(format!(
                "Gemini API error {}: {}",
                err.error.code, err.error.message
            ))),
            EventData::Unknown(value) => Err(Error::Upstream(format!(
                "unexpected Gemini stream event: {value}"
            ))),
        }
    }
}
