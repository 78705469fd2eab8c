//! HTTP client for the remote extraction service.
//!
//! All calls are synchronous: streaming stages are consumed to completion
//! before the client returns, blocking stages decode a single JSON body.
//! A per-call timeout is treated identically to a transport error.

use std::io::{BufRead, BufReader};
use std::sync::Mutex;

use serde::Deserialize;
use thiserror::Error;

use super::events::{StageEvent, StageOutcome, StageSummary};
use super::kind::StageKind;
use crate::models::InjectionMode;

#[derive(Error, Debug)]
pub enum StageError {
    #[error("Cannot reach extraction service at {0}")]
    Connection(String),

    #[error("Stage call timed out: {0}")]
    Timeout(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Service returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Failed to decode stage payload: {0}")]
    Decode(String),

    #[error("Stage reported an error event: {0}")]
    Stream(String),

    #[error("Event stream ended without a completion marker")]
    MissingCompletion,
}

/// Seam between the pipeline and the remote service. Mocked in tests.
pub trait StageInvoker {
    fn execute(
        &self,
        case_id: &str,
        stage: StageKind,
        injection: InjectionMode,
    ) -> Result<StageOutcome, StageError>;
}

/// Blocking client for the extraction service.
pub struct StageClient {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl StageClient {
    pub fn new(base_url: &str, timeout: std::time::Duration) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    fn classify(&self, e: reqwest::Error) -> StageError {
        if e.is_timeout() {
            StageError::Timeout(e.to_string())
        } else if e.is_connect() {
            StageError::Connection(self.base_url.clone())
        } else {
            StageError::Transport(e.to_string())
        }
    }

    fn request_body(
        case_id: &str,
        stage: StageKind,
        injection: InjectionMode,
    ) -> serde_json::Value {
        let mut body = serde_json::json!({
            "case_id": case_id,
            "injection_mode": injection.as_str(),
        });
        if let Some(section) = stage.section() {
            body["section"] = serde_json::Value::String(section.as_str().to_string());
        }
        if let Some(mode) = stage.reconcile_mode() {
            body["mode"] = serde_json::Value::String(mode.as_str().to_string());
        }
        body
    }

    fn run_streaming(
        &self,
        case_id: &str,
        stage: StageKind,
        injection: InjectionMode,
    ) -> Result<StageOutcome, StageError> {
        let url = format!("{}/stages/{}", self.base_url, stage.name());
        let response = self
            .client
            .post(&url)
            .json(&Self::request_body(case_id, stage, injection))
            .send()
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(StageError::Http { status: status.as_u16(), body });
        }

        let summary = consume_stream(BufReader::new(response))?;
        tracing::debug!(case_id, stage = %stage, items = summary.items_total(), "Stream complete");
        Ok(StageOutcome::Completed(summary))
    }

    fn run_blocking(
        &self,
        case_id: &str,
        stage: StageKind,
        injection: InjectionMode,
    ) -> Result<StageOutcome, StageError> {
        let url = format!("{}/stages/{}", self.base_url, stage.name());
        let response = self
            .client
            .post(&url)
            .json(&Self::request_body(case_id, stage, injection))
            .send()
            .map_err(|e| self.classify(e))?;

        let status = response.status();

        // "Nothing committed" on uncommit is an idempotent no-op, not a failure.
        if status.as_u16() == 404 && stage == StageKind::Uncommit {
            return Ok(StageOutcome::NoOp);
        }

        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(StageError::Http { status: status.as_u16(), body });
        }

        let parsed: BlockingStageBody = response
            .json()
            .map_err(|e| StageError::Decode(e.to_string()))?;

        Ok(StageOutcome::Completed(StageSummary {
            session_id: None,
            counts: Default::default(),
            affected: parsed.affected(),
        }))
    }
}

impl StageInvoker for StageClient {
    fn execute(
        &self,
        case_id: &str,
        stage: StageKind,
        injection: InjectionMode,
    ) -> Result<StageOutcome, StageError> {
        tracing::debug!(case_id, stage = %stage, "Invoking stage");
        if stage.is_streaming() {
            self.run_streaming(case_id, stage, injection)
        } else {
            self.run_blocking(case_id, stage, injection)
        }
    }
}

/// Result body of a blocking stage.
#[derive(Deserialize)]
struct BlockingStageBody {
    #[serde(default)]
    published: u32,
    #[serde(default)]
    merged: u32,
    #[serde(default)]
    unpublished: u32,
}

impl BlockingStageBody {
    fn affected(&self) -> u32 {
        self.published + self.merged + self.unpublished
    }
}

/// Consume every NDJSON event from a streaming stage before returning.
///
/// An error event anywhere marks the stage failed, even if a later event
/// claims completion; a stream without a completion marker is a decode-level
/// failure of its own.
pub fn consume_stream<R: BufRead>(reader: R) -> Result<StageSummary, StageError> {
    let mut first_error: Option<String> = None;
    let mut completion: Option<StageSummary> = None;
    let mut items_seen: u32 = 0;

    for line in reader.lines() {
        let line = line.map_err(|e| StageError::Transport(e.to_string()))?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let event: StageEvent =
            serde_json::from_str(line).map_err(|e| StageError::Decode(e.to_string()))?;

        match event {
            StageEvent::Progress { message } => {
                tracing::debug!(progress = %message, "Stage progress");
            }
            StageEvent::Item { kind } => {
                items_seen += 1;
                tracing::trace!(kind = %kind, "Stage produced item");
            }
            StageEvent::Error { message } => {
                if first_error.is_none() {
                    first_error = Some(message);
                }
            }
            StageEvent::Complete { session_id, counts } => {
                completion = Some(StageSummary {
                    session_id: Some(session_id),
                    counts,
                    affected: 0,
                });
            }
        }
    }

    if let Some(message) = first_error {
        return Err(StageError::Stream(message));
    }

    let mut summary = completion.ok_or(StageError::MissingCompletion)?;
    if summary.counts.is_empty() && items_seen > 0 {
        // Older service builds omit counts on the completion marker.
        tracing::debug!(items_seen, "Completion carried no counts; using item tally");
        summary.affected = items_seen;
    }
    Ok(summary)
}

/// Scripted stage client for tests: returns queued outcomes in order and
/// records every invocation.
pub struct MockStageClient {
    outcomes: Mutex<std::collections::VecDeque<Result<StageOutcome, StageError>>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl MockStageClient {
    pub fn new() -> Self {
        Self {
            outcomes: Mutex::new(Default::default()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn push(self, outcome: Result<StageOutcome, StageError>) -> Self {
        self.outcomes.lock().unwrap().push_back(outcome);
        self
    }

    pub fn push_completed(self) -> Self {
        self.push(Ok(StageOutcome::Completed(StageSummary::default())))
    }

    /// Invocations recorded so far, as (case_id, stage label) pairs.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for MockStageClient {
    fn default() -> Self {
        Self::new()
    }
}

impl StageInvoker for MockStageClient {
    fn execute(
        &self,
        case_id: &str,
        stage: StageKind,
        _injection: InjectionMode,
    ) -> Result<StageOutcome, StageError> {
        self.calls
            .lock()
            .unwrap()
            .push((case_id.to_string(), stage.to_string()));
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            // Unscripted calls succeed with an empty summary.
            .unwrap_or(Ok(StageOutcome::Completed(StageSummary::default())))
    }
}
