//! OpenAI-compatible chat completions client
//!
//! Streams the completion over SSE and assembles the final text. The
//! caller only ever sees the assembled string.

use super::{InferenceClient, ERROR_PREFIX};
use crate::config::DEFAULT_SYSTEM_INSTRUCTION;
use crate::Result;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

pub struct OpenAiCompatClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiCompatClient {
    pub fn new(base_url: &str, model: &str, api_key: String) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .build()?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }

    async fn stream_completion(&self, prompt: &str, system_instruction: &str) -> String {
        let url = format!("{}/chat/completions", self.base_url);

        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_instruction,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            enable_thinking: false,
            stream: true,
            stream_options: StreamOptions {
                include_usage: true,
            },
        };

        info!(model = %self.model, "Calling chat completions API");
        let start = Instant::now();

        let response = match self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                error!("Chat completions request failed: {}", e);
                return format!("{} Exception during API call: {}", ERROR_PREFIX, e);
            }
        };

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!(status = %status, "Chat completions error response: {}", error_text);
            return format!(
                "{} API request failed: {} - {}",
                ERROR_PREFIX,
                status.as_u16(),
                error_text
            );
        }

        let mut assembler = StreamAssembler::default();
        let mut body = response.bytes_stream();

        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(bytes) => assembler.push_bytes(&bytes),
                Err(e) => {
                    error!("Chat completions stream interrupted: {}", e);
                    return format!("{} Exception during API call: {}", ERROR_PREFIX, e);
                }
            }
        }
        assembler.finish();

        let elapsed = start.elapsed().as_secs_f64();
        match assembler.usage {
            Some(usage) => {
                let generated = if usage.completion_tokens > 0 {
                    usage.completion_tokens as f64
                } else {
                    assembler.content.chars().count() as f64
                };
                info!(
                    completion_tokens = usage.completion_tokens,
                    total_tokens = usage.total_tokens,
                    elapsed_s = elapsed,
                    tokens_per_s = rate(generated, elapsed),
                    "Stream complete"
                );
            }
            None => {
                let chars = assembler.content.chars().count();
                info!(
                    chars,
                    elapsed_s = elapsed,
                    chars_per_s = rate(chars as f64, elapsed),
                    "Stream complete (no usage reported)"
                );
            }
        }

        assembler.content
    }
}

fn rate(amount: f64, seconds: f64) -> f64 {
    if seconds > 0.0 {
        amount / seconds
    } else {
        0.0
    }
}

#[async_trait]
impl InferenceClient for OpenAiCompatClient {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str, system_instruction: Option<&str>) -> String {
        self.stream_completion(prompt, system_instruction.unwrap_or(DEFAULT_SYSTEM_INSTRUCTION))
            .await
    }
}

//
// ================= SSE handling =================
//

/// One parsed `data:` line
#[derive(Debug, PartialEq)]
enum SseEvent {
    Chunk {
        content: Option<String>,
        usage: Option<Usage>,
    },
    Done,
}

/// Parse a single SSE line. Non-data lines and malformed JSON are skipped.
fn parse_sse_line(line: &str) -> Option<SseEvent> {
    let payload = line.trim().strip_prefix("data:")?.trim();
    if payload == "[DONE]" {
        return Some(SseEvent::Done);
    }

    let chunk: StreamChunk = match serde_json::from_str(payload) {
        Ok(chunk) => chunk,
        Err(e) => {
            debug!("Skipping malformed stream chunk: {}", e);
            return None;
        }
    };

    let content = chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta.content)
        .filter(|s| !s.is_empty());

    Some(SseEvent::Chunk {
        content,
        usage: chunk.usage,
    })
}

/// Reassembles lines across arbitrary byte chunk boundaries
#[derive(Default)]
struct StreamAssembler {
    pending: Vec<u8>,
    content: String,
    usage: Option<Usage>,
    done: bool,
}

impl StreamAssembler {
    fn push_bytes(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            self.handle_line(&String::from_utf8_lossy(&line));
        }
    }

    /// Flush a trailing line without newline
    fn finish(&mut self) {
        if !self.pending.is_empty() {
            let line = std::mem::take(&mut self.pending);
            self.handle_line(&String::from_utf8_lossy(&line));
        }
    }

    fn handle_line(&mut self, line: &str) {
        if self.done {
            return;
        }
        match parse_sse_line(line) {
            Some(SseEvent::Chunk { content, usage }) => {
                if let Some(piece) = content {
                    self.content.push_str(&piece);
                }
                if usage.is_some() {
                    self.usage = usage;
                }
            }
            Some(SseEvent::Done) => self.done = true,
            None => {}
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    enable_thinking: bool,
    stream: bool,
    stream_options: StreamOptions,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
struct Usage {
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}
