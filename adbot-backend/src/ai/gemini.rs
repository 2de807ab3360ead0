//! Google Gemini streaming client
//!
//! Talks to `models/{model}:streamGenerateContent?alt=sse`. Each SSE `data:`
//! payload is one `GenerateContentResponse`; the text parts of its first
//! candidate form one fragment.

use super::provider::ChatProvider;
use super::streaming::{create_default_stream_channel, StreamEvent, StreamReceiver, StreamSender};
use super::types::AiError;
use crate::config::{DEFAULT_GEMINI_ENDPOINT, DEFAULT_GEMINI_MODEL};
use crate::models::ChatMessage;
use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use std::fmt;

pub struct GeminiClient {
    client: Client,
    auth_headers: header::HeaderMap,
    endpoint: String,
    model: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StreamGenerateRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
    system_instruction: GeminiContent<'a>,
}

#[derive(Debug, Serialize)]
struct GeminiContent<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Debug, Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
    #[serde(default)]
    error: Option<GeminiError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorResponse {
    error: GeminiError,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    message: String,
}

impl GeminiClient {
    pub fn new(api_key: &str, endpoint: Option<&str>, model: Option<&str>) -> Result<Self, String> {
        let mut auth_headers = header::HeaderMap::new();
        auth_headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let auth_value = header::HeaderValue::from_str(api_key)
            .map_err(|e| format!("Invalid API key format: {}", e))?;
        auth_headers.insert("x-goog-api-key", auth_value);

        Ok(Self {
            client: crate::http::shared_client().clone(),
            auth_headers,
            endpoint: endpoint
                .unwrap_or(DEFAULT_GEMINI_ENDPOINT)
                .trim_end_matches('/')
                .to_string(),
            model: model.unwrap_or(DEFAULT_GEMINI_MODEL).to_string(),
        })
    }

    /// Use a dedicated HTTP client instead of the shared one.
    #[cfg(test)]
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn stream_url(&self) -> String {
        format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.endpoint, self.model
        )
    }

    fn build_request<'a>(
        system_prompt: &'a str,
        prior_turns: &'a [ChatMessage],
        current_message: &'a str,
    ) -> StreamGenerateRequest<'a> {
        let mut contents: Vec<GeminiContent<'a>> = prior_turns
            .iter()
            .map(|turn| GeminiContent {
                role: Some(turn.role.as_str()),
                parts: turn
                    .parts
                    .iter()
                    .map(|p| GeminiPart { text: &p.text })
                    .collect(),
            })
            .collect();

        contents.push(GeminiContent {
            role: Some("user"),
            parts: vec![GeminiPart {
                text: current_message,
            }],
        });

        StreamGenerateRequest {
            contents,
            system_instruction: GeminiContent {
                role: None,
                parts: vec![GeminiPart {
                    text: system_prompt,
                }],
            },
        }
    }
}

#[async_trait]
impl ChatProvider for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn stream_reply(
        &self,
        system_prompt: &str,
        prior_turns: &[ChatMessage],
        current_message: &str,
    ) -> Result<StreamReceiver, AiError> {
        let request = Self::build_request(system_prompt, prior_turns, current_message);

        log::debug!(
            "Gemini request to model {} with {} prior turns",
            self.model,
            prior_turns.len()
        );

        let response = self
            .client
            .post(self.stream_url())
            .headers(self.auth_headers.clone())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<GeminiErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(AiError::with_status(message, status.as_u16()));
        }

        let (tx, rx) = create_default_stream_channel();
        tokio::spawn(pump_sse(response.bytes_stream(), tx));
        Ok(rx)
    }
}

/// Reads an SSE byte stream to the end, forwarding every fragment in order.
///
/// Returns early when the receiver is dropped (client went away) or the
/// provider reports an error.
pub(crate) async fn pump_sse<S, B, E>(byte_stream: S, tx: StreamSender)
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: fmt::Display,
{
    tokio::pin!(byte_stream);

    let mut parser = SseParser::default();
    let mut finish_reason: Option<String> = None;

    while let Some(chunk) = byte_stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                let _ = tx
                    .send(StreamEvent::Error {
                        message: format!("Stream read failed: {}", e),
                    })
                    .await;
                return;
            }
        };

        for data in parser.push(chunk.as_ref()) {
            if !forward_payload(&data, &tx, &mut finish_reason).await {
                return;
            }
        }
    }

    if let Some(data) = parser.finish() {
        if !forward_payload(&data, &tx, &mut finish_reason).await {
            return;
        }
    }

    let _ = tx.send(StreamEvent::Done { finish_reason }).await;
}

async fn forward_payload(
    data: &str,
    tx: &StreamSender,
    finish_reason: &mut Option<String>,
) -> bool {
    match parse_chunk(data) {
        Ok(parsed) => {
            if parsed.finish_reason.is_some() {
                *finish_reason = parsed.finish_reason;
            }
            if parsed.text.is_empty() {
                return true;
            }
            tx.send(StreamEvent::ContentDelta {
                content: parsed.text,
            })
            .await
            .is_ok()
        }
        Err(message) => {
            let _ = tx.send(StreamEvent::Error { message }).await;
            false
        }
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
struct ParsedChunk {
    text: String,
    finish_reason: Option<String>,
}

fn parse_chunk(data: &str) -> Result<ParsedChunk, String> {
    let data = data.trim();
    if data.is_empty() || data == "[DONE]" {
        return Ok(ParsedChunk::default());
    }

    let chunk: StreamChunk =
        serde_json::from_str(data).map_err(|e| format!("Malformed stream chunk: {}", e))?;

    if let Some(error) = chunk.error {
        return Err(error.message);
    }

    let Some(candidate) = chunk.candidates.into_iter().next() else {
        return match chunk.prompt_feedback.and_then(|f| f.block_reason) {
            Some(reason) => Err(format!("Prompt blocked: {}", reason)),
            None => Ok(ParsedChunk::default()),
        };
    };

    let text = candidate
        .content
        .map(|c| {
            c.parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<String>()
        })
        .unwrap_or_default();

    Ok(ParsedChunk {
        text,
        finish_reason: candidate.finish_reason,
    })
}

/// Incremental SSE splitter working on raw bytes, so a multibyte character
/// cut by a network chunk boundary is reassembled before decoding.
#[derive(Debug, Default)]
struct SseParser {
    buffer: Vec<u8>,
}

impl SseParser {
    /// Feeds bytes and returns the `data` of every event completed by them.
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some((pos, delim_len)) = find_event_boundary(&self.buffer) {
            let block: Vec<u8> = self.buffer.drain(..pos + delim_len).take(pos).collect();
            if let Some(data) = event_data(&block) {
                events.push(data);
            }
        }
        events
    }

    /// Flushes a trailing event that was not terminated by a blank line.
    fn finish(self) -> Option<String> {
        if self.buffer.iter().all(|b| b.is_ascii_whitespace()) {
            return None;
        }
        event_data(&self.buffer)
    }
}

fn find_event_boundary(buf: &[u8]) -> Option<(usize, usize)> {
    let lf = find(buf, b"\n\n").map(|p| (p, 2));
    let crlf = find(buf, b"\r\n\r\n").map(|p| (p, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Joins the `data:` lines of one event block. Comments and other fields are
/// ignored.
fn event_data(block: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(block);
    let lines: Vec<&str> = text
        .split('\n')
        .map(|l| l.trim_end_matches('\r'))
        .filter_map(|l| l.strip_prefix("data:"))
        .map(|v| v.strip_prefix(' ').unwrap_or(v))
        .collect();

    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::streaming::create_stream_channel;
    use crate::models::ChatMessage;
    use actix_web::{web, App, HttpResponse, HttpServer};
    use futures_util::stream;
    use std::sync::{Arc, Mutex};

    fn sse_event(text: &str) -> String {
        let payload = serde_json::json!({
            "candidates": [{ "content": { "role": "model", "parts": [{ "text": text }] } }]
        });
        format!("data: {}\r\n\r\n", payload)
    }

    async fn drain(mut rx: StreamReceiver) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_request_shape() {
        let prior = vec![ChatMessage::user("hello"), ChatMessage::model("hi there")];
        let request = GeminiClient::build_request("SYSTEM", &prior, "what's new?");
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "contents": [
                    { "role": "user", "parts": [{ "text": "hello" }] },
                    { "role": "model", "parts": [{ "text": "hi there" }] },
                    { "role": "user", "parts": [{ "text": "what's new?" }] }
                ],
                "systemInstruction": { "parts": [{ "text": "SYSTEM" }] }
            })
        );
    }

    #[test]
    fn test_stream_url() {
        let client =
            GeminiClient::new("key", Some("http://localhost:9/v1beta/"), Some("m1")).unwrap();
        assert_eq!(
            client.stream_url(),
            "http://localhost:9/v1beta/models/m1:streamGenerateContent?alt=sse"
        );
    }

    #[test]
    fn test_invalid_api_key_rejected() {
        assert!(GeminiClient::new("bad\nkey", None, None).is_err());
    }

    #[test]
    fn test_parse_chunk_concatenates_parts() {
        let data = concat!(
            r#"{"candidates":[{"content":{"parts":[{"text":"Hel"},{"text":"lo"}]},"#,
            r#""finishReason":"STOP"}]}"#
        );
        let parsed = parse_chunk(data).unwrap();
        assert_eq!(parsed.text, "Hello");
        assert_eq!(parsed.finish_reason.as_deref(), Some("STOP"));
    }

    #[test]
    fn test_parse_chunk_blocked_prompt() {
        let data = r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#;
        assert_eq!(parse_chunk(data).unwrap_err(), "Prompt blocked: SAFETY");
    }

    #[test]
    fn test_parse_chunk_error_object() {
        let data = r#"{"error":{"code":500,"message":"internal","status":"INTERNAL"}}"#;
        assert_eq!(parse_chunk(data).unwrap_err(), "internal");
    }

    #[test]
    fn test_parse_chunk_usage_only() {
        let data = r#"{"usageMetadata":{"promptTokenCount":10}}"#;
        assert_eq!(parse_chunk(data).unwrap(), ParsedChunk::default());
    }

    #[test]
    fn test_sse_parser_splits_events_across_chunks() {
        let mut parser = SseParser::default();
        assert!(parser.push(b"data: {\"a\"").is_empty());
        assert_eq!(parser.push(b":1}\n\ndata: x\r\n\r\n: comment\n\n"), vec!["{\"a\":1}", "x"]);
        assert!(parser.finish().is_none());
    }

    #[test]
    fn test_sse_parser_multibyte_split() {
        let event = "data: Xin chào\n\n".as_bytes();
        // Split inside the two-byte "à".
        let split = event.iter().position(|&b| b == 0xC3).unwrap() + 1;

        let mut parser = SseParser::default();
        assert!(parser.push(&event[..split]).is_empty());
        assert_eq!(parser.push(&event[split..]), vec!["Xin chào"]);
    }

    #[test]
    fn test_sse_parser_trailing_event() {
        let mut parser = SseParser::default();
        assert!(parser.push(b"data: tail").is_empty());
        assert_eq!(parser.finish().as_deref(), Some("tail"));
    }

    #[tokio::test]
    async fn test_pump_forwards_fragments_in_order() {
        let body = [sse_event("**Hi**"), sse_event(" there,"), sse_event(" friend\n")].concat();
        let bytes = body.into_bytes();
        // Re-chunk at arbitrary 7-byte boundaries.
        let chunks: Vec<Result<Vec<u8>, String>> =
            bytes.chunks(7).map(|c| Ok(c.to_vec())).collect();

        let (tx, rx) = create_stream_channel(4);
        tokio::spawn(pump_sse(stream::iter(chunks), tx));
        let events = drain(rx).await;

        let text: String = events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::ContentDelta { content } => Some(content.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(text, "**Hi** there, friend\n");
        assert_eq!(events.len(), 4);
        assert!(matches!(events.last(), Some(StreamEvent::Done { .. })));
    }

    #[tokio::test]
    async fn test_pump_stops_when_receiver_dropped() {
        let (tx, rx) = create_stream_channel(4);
        drop(rx);

        // The upstream body never ends; only the closed receiver can stop the pump.
        let chunks = stream::iter(vec![Ok::<_, String>(sse_event("hello").into_bytes())])
            .chain(stream::pending());
        let finished =
            tokio::time::timeout(std::time::Duration::from_secs(1), pump_sse(chunks, tx)).await;
        assert!(finished.is_ok());
    }

    #[tokio::test]
    async fn test_pump_stops_on_read_error() {
        let chunks: Vec<Result<Vec<u8>, String>> = vec![
            Ok(sse_event("partial").into_bytes()),
            Err("connection reset".to_string()),
            Ok(sse_event("never").into_bytes()),
        ];

        let (tx, rx) = create_stream_channel(4);
        pump_sse(stream::iter(chunks), tx).await;
        let events = drain(rx).await;

        assert_eq!(
            events,
            vec![
                StreamEvent::ContentDelta {
                    content: "partial".to_string()
                },
                StreamEvent::Error {
                    message: "Stream read failed: connection reset".to_string()
                },
            ]
        );
    }

    #[actix_web::test]
    async fn test_stream_reply_against_local_server() {
        type Captured = Arc<Mutex<Option<(String, String, serde_json::Value)>>>;
        let captured: Captured = Arc::new(Mutex::new(None));
        let sink = captured.clone();

        let server = HttpServer::new(move || {
            let sink = sink.clone();
            let handler = move |req: actix_web::HttpRequest, body: web::Json<serde_json::Value>| {
                let sink = sink.clone();
                async move {
                    let key = req
                        .headers()
                        .get("x-goog-api-key")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_string();
                    *sink.lock().unwrap() =
                        Some((req.uri().to_string(), key, body.into_inner()));
                    HttpResponse::Ok()
                        .content_type("text/event-stream")
                        .body([sse_event("Xin "), sse_event("chào!")].concat())
                }
            };
            App::new().route("/v1beta/models/{model}", web::post().to(handler))
        })
        .workers(1)
        .bind(("127.0.0.1", 0))
        .unwrap();
        let addr = server.addrs()[0];
        let server = server.run();
        let handle = server.handle();
        actix_web::rt::spawn(server);

        let endpoint = format!("http://{}/v1beta", addr);
        let client = GeminiClient::new("test-key", Some(&endpoint), Some("gemini-test"))
            .unwrap()
            .with_client(Client::new());

        let rx = client.stream_reply("SYS", &[], "hi").await.unwrap();
        let events = drain(rx).await;
        handle.stop(true).await;

        let mut acc = crate::ai::streaming::StreamAccumulator::new();
        events.iter().for_each(|e| acc.process_event(e));
        assert_eq!(acc.content, "Xin chào!");

        let (uri, key, body) = captured.lock().unwrap().take().unwrap();
        assert_eq!(uri, "/v1beta/models/gemini-test:streamGenerateContent?alt=sse");
        assert_eq!(key, "test-key");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "hi");
        assert_eq!(body["contents"].as_array().unwrap().len(), 1);
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "SYS");
    }

    #[actix_web::test]
    async fn test_stream_reply_maps_upstream_error() {
        let server = HttpServer::new(|| {
            App::new().default_service(web::to(|| async {
                HttpResponse::Forbidden().json(serde_json::json!({
                    "error": {
                        "code": 403,
                        "message": "API key not valid",
                        "status": "PERMISSION_DENIED"
                    }
                }))
            }))
        })
        .workers(1)
        .bind(("127.0.0.1", 0))
        .unwrap();
        let addr = server.addrs()[0];
        let server = server.run();
        let handle = server.handle();
        actix_web::rt::spawn(server);

        let endpoint = format!("http://{}/v1beta", addr);
        let client = GeminiClient::new("wrong", Some(&endpoint), None)
            .unwrap()
            .with_client(Client::new());

        let err = client.stream_reply("SYS", &[], "hi").await.unwrap_err();
        handle.stop(true).await;

        assert_eq!(err.status_code, Some(403));
        assert_eq!(err.message, "API key not valid");
    }
}
