//! Streaming LLM proxy: vendor clients plus the SSE relay glue.
//!
//! Answers are relayed to the browser as `text/event-stream` chunks. Once a
//! stream has started, upstream failures are written into the stream as
//! readable text instead of an HTTP error, so the client always receives a
//! closed, well-formed stream.

pub mod gemini;
pub mod groq;
pub mod latex;

use std::convert::Infallible;
use std::time::Duration;

use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use reqwest_eventsource::{Event, EventSource};
use serde::de::DeserializeOwned;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Tutor persona sent as the system message to every vendor.
const SYSTEM_PROMPT: &str = "You are a friendly homework tutor. Work through the problem step \
    by step so a student can follow the reasoning, and write every mathematical expression in \
    LaTeX.";

const TEMPERATURE: f32 = 0.7;
const TOP_P: f32 = 0.95;
const TOP_K: i32 = 40;
const MAX_ANSWER_TOKENS: u32 = 2048;

/// Substituted for the rest of the answer when the wall-clock deadline passes.
pub(crate) const TIMEOUT_MESSAGE: &str =
    "\n\nSorry, the answer took too long to generate. Please try asking again.";

/// Prefix for mid-stream failures surfaced to the reader as answer text.
pub(crate) const FAILURE_PREFIX: &str = "\n\nSorry, something went wrong while answering: ";

/// One decoded `data:` payload from a vendor event stream.
pub(crate) trait EventPayload: DeserializeOwned {
    /// Extracts the answer text carried by this event, if any.
    fn into_text(self) -> Result<Option<String>>;
}

/// Converts a vendor SSE connection into a stream of answer text chunks.
///
/// `[DONE]` markers and empty keep-alive events are dropped; protocol and
/// status failures surface as `Error::Upstream` items. The stream terminates
/// when the vendor closes the connection.
pub(crate) fn into_text_chunks<P>(source: EventSource) -> impl Stream<Item = Result<String>>
where
    P: EventPayload,
{
    source
        .take_while(|event| !matches!(event, Err(reqwest_eventsource::Error::StreamEnded)))
        .then(|event| async {
            match event {
                Ok(Event::Open) => Ok(None),
                Ok(Event::Message(message)) if ["[DONE]", ""].contains(&message.data.as_str()) => {
                    debug!("upstream answer complete");
                    Ok(None)
                }
                Ok(Event::Message(message)) => serde_json::from_str::<P>(&message.data)
                    .map_err(|e| Error::Upstream(format!("unreadable stream event: {e}")))
                    .and_then(P::into_text),
                Err(reqwest_eventsource::Error::InvalidStatusCode(status, response)) => {
                    let body = response.text().await.unwrap_or_default();
                    Err(Error::Upstream(format!("{status}: {body}")))
                }
                Err(error) => Err(Error::Upstream(error.to_string())),
            }
        })
        .filter_map(|item| item.transpose())
}

/// Wraps an answer stream in an SSE response, normalizing math delimiters on
/// the way through.
///
/// When `deadline` is set the whole answer races a wall-clock timer; on
/// expiry the rest of the answer is replaced with [`TIMEOUT_MESSAGE`]. A
/// failed chunk likewise ends the stream with a readable message rather than
/// an HTTP error.
pub fn sse_answer<S>(
    chunks: S,
    deadline: Option<Duration>,
) -> Sse<impl Stream<Item = std::result::Result<SseEvent, Infallible>>>
where
    S: Stream<Item = Result<String>> + Send + 'static,
{
    let events = guarded_chunks(chunks, deadline)
        // SSE fields cannot carry carriage returns.
        .map(|text| Ok::<_, Infallible>(SseEvent::default().data(text.replace('\r', ""))));
    Sse::new(events).keep_alive(KeepAlive::default())
}

fn guarded_chunks<S>(chunks: S, deadline: Option<Duration>) -> impl Stream<Item = String>
where
    S: Stream<Item = Result<String>> + Send + 'static,
{
    async_stream::stream! {
        tokio::pin!(chunks);
        let patience = async move {
            match deadline {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(patience);
        loop {
            tokio::select! {
                _ = &mut patience => {
                    yield TIMEOUT_MESSAGE.to_string();
                    break;
                }
                next = chunks.next() => match next {
                    Some(Ok(chunk)) => yield latex::normalize_math(&chunk),
                    Some(Err(error)) => {
                        warn!(%error, "answer stream failed mid-flight");
                        yield format!("{FAILURE_PREFIX}{error}");
                        break;
                    }
                    None => break,
                },
            }
        }
    }
}
