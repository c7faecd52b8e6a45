//! Per-request trace
//!
//! Every request carries a request id and a trail of the stages it entered.
//! The built prompt is fingerprinted so a response can be correlated with
//! the exact ground truth it was asked to cite. Nothing here outlives the
//! request.

use crate::error::OrchestrationError;
use crate::models::PipelineStage;
use crate::Result;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::io::Write;
use std::time::Instant;
use tracing::info;
use uuid::Uuid;

pub struct RequestTrace {
    request_id: Uuid,
    stage: PipelineStage,
    trail: Vec<String>,
    started: Instant,
}

impl RequestTrace {
    /// Starts in `Received`
    pub fn new() -> Self {
        let request_id = Uuid::new_v4();
        Self {
            request_id,
            stage: PipelineStage::Received,
            trail: vec![format!("{}: request {}", PipelineStage::Received, request_id)],
            started: Instant::now(),
        }
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn stage(&self) -> PipelineStage {
        self.stage
    }

    /// Move to `next`; only forward edges of the state machine are legal
    pub fn enter(&mut self, next: PipelineStage) -> Result<()> {
        if !self.stage.can_advance_to(next) {
            return Err(OrchestrationError::InvalidTransition(format!(
                "{} -> {}",
                self.stage, next
            )));
        }

        info!(
            request_id = %self.request_id,
            stage = %next,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "Stage entered"
        );

        self.stage = next;
        self.trail.push(next.to_string());
        Ok(())
    }

    /// Append a detail line to the current stage
    pub fn note(&mut self, detail: impl AsRef<str>) {
        self.trail.push(format!("{}: {}", self.stage, detail.as_ref()));
    }

    pub fn into_trail(self) -> Vec<String> {
        self.trail
    }
}

impl Default for RequestTrace {
    fn default() -> Self {
        Self::new()
    }
}

/// SHA-256 hex digest of the prompt text
pub fn compute_prompt_digest(prompt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    hex::encode(hasher.finalize())
}

/// SHA-256 hex digest of any serializable snapshot.
/// Streams JSON directly into the hasher.
pub fn compute_snapshot_hash<T: Serialize + ?Sized>(value: &T) -> String {
    let mut hasher = Sha256::new();

    if serde_json::to_writer(&mut HashWriter(&mut hasher), value).is_err() {
        return String::new();
    }

    hex::encode(hasher.finalize())
}

/// Adapter to allow writing into Sha256 via std::io::Write
struct HashWriter<'a, H: Digest>(&'a mut H);

impl<'a, H: Digest> Write for HashWriter<'a, H> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
