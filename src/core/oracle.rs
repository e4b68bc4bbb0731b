//! Client for the external captioning service.
//!
//! The service receives a prompt plus one image and answers with free text.
//! [`CaptionOracle`] owns the retry policy; the wire format lives behind
//! [`OracleTransport`] so the policy and the reply parser can be exercised
//! without a network.

use crate::core::item::{split_tags, Caption};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Instruction sent with every screenshot.
pub const CAPTION_PROMPT: &str = "You are an AI that captions screenshots.\n\
Respond EXACTLY as:\n\
Title: <up to 10 words>\n\
Description: <1-3 lines>\n\
Tags: <3-5 comma-separated keywords>\n";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OracleError {
    #[error("Oracle rate limit reached")]
    RateLimited,

    #[error("Oracle transport error: {0}")]
    Transport(String),

    #[error("Oracle server error ({status}): {body}")]
    Server { status: u16, body: String },

    #[error("Oracle rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Oracle response malformed: {0}")]
    Malformed(String),

    #[error("Caption reply missing required fields: {0}")]
    Parse(String),

    #[error("Oracle is not configured: {0}")]
    NotConfigured(String),
}

impl OracleError {
    /// Network failures and 5xx responses; everything else is final for
    /// this run.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Server { .. })
    }
}

/// Connection and retry settings, injected at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct OracleConfig {
    /// Full `generateContent` URL; the key is appended as `key=`.
    pub endpoint: String,
    pub api_key: Option<String>,
    /// Total attempts per call, first one included.
    pub max_attempts: u32,
    /// Fixed pause between attempts.
    pub backoff: Duration,
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: None,
            max_attempts: 3,
            backoff: Duration::from_secs(3),
            timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// One request/response exchange with the service, no retries.
pub trait OracleTransport: Send + Sync {
    fn send(&self, prompt: &str, image: &[u8]) -> Result<String, OracleError>;
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text { text: &'a str },
    Image { inline_data: InlineData },
}

#[derive(Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ReplyPart>,
}

#[derive(Deserialize)]
struct ReplyPart {
    #[serde(default)]
    text: Option<String>,
}

/// Maps a non-success HTTP status onto the failure taxonomy.
pub fn classify_status(status: u16, body: String) -> OracleError {
    match status {
        429 => OracleError::RateLimited,
        500..=599 => OracleError::Server { status, body },
        _ => OracleError::Rejected { status, body },
    }
}

/// Pulls the reply text out of a `generateContent` response body.
pub fn extract_reply(body: &str) -> Result<String, OracleError> {
    let response: GenerateResponse =
        serde_json::from_str(body).map_err(|e| OracleError::Malformed(e.to_string()))?;
    response
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content.parts.into_iter().next())
        .and_then(|part| part.text)
        .ok_or_else(|| OracleError::Malformed("no reply text in first candidate".to_string()))
}

/// MIME type of the image bytes, JPEG when the format cannot be sniffed.
pub fn mime_type_of(image: &[u8]) -> &'static str {
    image::guess_format(image)
        .map(|format| format.to_mime_type())
        .unwrap_or("image/jpeg")
}

/// Blocking HTTP transport speaking the `generateContent` JSON format.
pub struct HttpTransport {
    endpoint: String,
    api_key: String,
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new(config: &OracleConfig) -> Result<Self, OracleError> {
        if config.endpoint.trim().is_empty() {
            return Err(OracleError::NotConfigured("endpoint is empty".to_string()));
        }
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| OracleError::NotConfigured("api key is not set".to_string()))?;

        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| OracleError::NotConfigured(e.to_string()))?;

        Ok(Self {
            endpoint: config.endpoint.clone(),
            api_key,
            client,
        })
    }
}

impl OracleTransport for HttpTransport {
    fn send(&self, prompt: &str, image: &[u8]) -> Result<String, OracleError> {
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![
                    Part::Text { text: prompt },
                    Part::Image {
                        inline_data: InlineData {
                            mime_type: mime_type_of(image).to_string(),
                            data: base64::engine::general_purpose::STANDARD.encode(image),
                        },
                    },
                ],
            }],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .map_err(|e| OracleError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|e| OracleError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(classify_status(status.as_u16(), body));
        }
        extract_reply(&body)
    }
}

/// Captioning client with the fixed retry budget.
pub struct CaptionOracle {
    transport: Box<dyn OracleTransport>,
    max_attempts: u32,
    backoff: Duration,
}

impl CaptionOracle {
    /// Client backed by [`HttpTransport`].
    pub fn new(config: &OracleConfig) -> Result<Self, OracleError> {
        Ok(Self::with_transport(Box::new(HttpTransport::new(config)?), config))
    }

    pub fn with_transport(transport: Box<dyn OracleTransport>, config: &OracleConfig) -> Self {
        Self {
            transport,
            max_attempts: config.max_attempts.max(1),
            backoff: config.backoff,
        }
    }

    /// Sends `prompt` with `image`, retrying transient failures.
    ///
    /// A rate limit ends the call at once; so does any other non-transient
    /// failure. After the last attempt the last transient error is returned.
    pub fn ask(&self, prompt: &str, image: &[u8]) -> Result<String, OracleError> {
        let mut attempt = 1;
        loop {
            match self.transport.send(prompt, image) {
                Ok(reply) => return Ok(reply),
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    tracing::warn!(
                        "Oracle attempt {}/{} failed: {}; retrying in {:?}",
                        attempt,
                        self.max_attempts,
                        e,
                        self.backoff
                    );
                    std::thread::sleep(self.backoff);
                    attempt += 1;
                }
                Err(e) => {
                    if e.is_transient() {
                        tracing::warn!("Oracle failed after {} attempts: {}", attempt, e);
                    }
                    return Err(e);
                }
            }
        }
    }

    /// Captions one screenshot.
    pub fn caption(&self, image: &[u8]) -> Result<Caption, OracleError> {
        let reply = self.ask(CAPTION_PROMPT, image)?;
        parse_caption(&reply)
    }
}

/// Parses a `Title:` / `Description:` / `Tags:` reply.
///
/// `Title:` and `Tags:` must both be present; `Description:` may be missing.
pub fn parse_caption(reply: &str) -> Result<Caption, OracleError> {
    if !reply.contains("Title:") || !reply.contains("Tags:") {
        return Err(OracleError::Parse(
            reply.lines().next().unwrap_or_default().to_string(),
        ));
    }

    let mut caption = Caption::default();
    for line in reply.lines() {
        let line = line.trim_start();
        if let Some(rest) = line.strip_prefix("Title:") {
            caption.title = rest.trim().to_string();
        } else if let Some(rest) = line.strip_prefix("Description:") {
            caption.description = rest.trim().to_string();
        } else if let Some(rest) = line.strip_prefix("Tags:") {
            caption.tags = split_tags(rest);
        }
    }
    Ok(caption)
}
