use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::PoisonError;

use codescript_core::decoder::decode_plan;
use codescript_core::decoder::extract_json_payload;
use codescript_core::decoder::DecodedPlan;
use serde_json::Value;

use crate::contracts::CompletionRequest;
use crate::contracts::PlanRequest;
use crate::error::AgentError;
use crate::error::ExecError;

pub const EMPTY_REPLY_FALLBACK: &str = "I'm sorry, I couldn't generate a response.";

/// The remote side of chat and agent requests.
///
/// Implementations block; callers that must stay responsive run them on a
/// worker thread and hand the result back as a runtime action.
pub trait ModelClient: Send + Sync {
    fn name(&self) -> &str;

    fn complete(&self, request: &CompletionRequest) -> Result<String, ExecError>;

    /// Returns the raw JSON document the model produced for the instruction.
    fn plan_edits(&self, request: &PlanRequest) -> Result<Value, ExecError>;
}

pub fn complete_or_fallback(
    client: &dyn ModelClient,
    request: &CompletionRequest,
) -> Result<String, ExecError> {
    let reply = client.complete(request)?;
    if reply.trim().is_empty() {
        tracing::debug!(client = client.name(), "empty completion, using fallback reply");
        return Ok(EMPTY_REPLY_FALLBACK.to_string());
    }
    Ok(reply)
}

pub fn request_plan(
    client: &dyn ModelClient,
    request: &PlanRequest,
) -> Result<DecodedPlan, AgentError> {
    let raw = client.plan_edits(request)?;
    let decoded = decode_plan(&raw)?;
    tracing::debug!(
        client = client.name(),
        actions = decoded.plan.actions.len(),
        dropped = decoded.warnings.len(),
        "decoded agent plan"
    );
    Ok(decoded)
}

#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Text(String),
    Plan(Value),
    Fail(String),
}

/// Replays queued replies in order, one per call.
#[derive(Debug, Default)]
pub struct ScriptedModelClient {
    replies: Mutex<VecDeque<ScriptedReply>>,
}

impl ScriptedModelClient {
    pub fn new(replies: impl IntoIterator<Item = ScriptedReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
        }
    }

    pub fn push(&self, reply: ScriptedReply) {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(reply);
    }

    pub fn remaining(&self) -> usize {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn next(&self) -> Result<ScriptedReply, ExecError> {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .ok_or(ExecError::Exhausted)
    }
}

impl ModelClient for ScriptedModelClient {
    fn name(&self) -> &str {
        "scripted"
    }

    fn complete(&self, _request: &CompletionRequest) -> Result<String, ExecError> {
        match self.next()? {
            ScriptedReply::Text(text) => Ok(text),
            ScriptedReply::Plan(value) => Ok(value.to_string()),
            ScriptedReply::Fail(stderr) => Err(ExecError::Provider {
                provider: self.name().to_string(),
                stderr,
            }),
        }
    }

    fn plan_edits(&self, _request: &PlanRequest) -> Result<Value, ExecError> {
        match self.next()? {
            ScriptedReply::Plan(value) => Ok(value),
            ScriptedReply::Text(text) => {
                let payload = extract_json_payload(&text).ok_or(ExecError::NoJson)?;
                Ok(serde_json::from_str(payload)?)
            }
            ScriptedReply::Fail(stderr) => Err(ExecError::Provider {
                provider: self.name().to_string(),
                stderr,
            }),
        }
    }
}
