use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Map;
use serde_json::Value;

use super::actions::AgentPlan;
use super::actions::EditAction;
use super::actions::EditKind;
use super::error::DecodeError;
use super::state::normalize_file_name;

const KIND_KEYS: &[&str] = &["kind", "type"];
const TARGET_KEYS: &[&str] = &["targetName", "fileName", "name", "path"];
const RATIONALE_KEYS: &[&str] = &["rationale", "reason", "description"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    NotAnObject,
    MissingKind,
    UnknownKind(String),
    MissingTargetName,
    NotAFileName(String),
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAnObject => f.write_str("entry is not an object"),
            Self::MissingKind => f.write_str("missing action kind"),
            Self::UnknownKind(kind) => write!(f, "unknown action kind `{kind}`"),
            Self::MissingTargetName => f.write_str("missing target file name"),
            Self::NotAFileName(name) => write!(f, "`{name}` is not a file name"),
        }
    }
}

/// An action entry that was dropped from the batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeWarning {
    pub index: usize,
    pub reason: DropReason,
}

impl fmt::Display for DecodeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "action #{} dropped: {}", self.index, self.reason)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedPlan {
    pub plan: AgentPlan,
    pub warnings: Vec<DecodeWarning>,
}

pub fn decode_plan_str(raw: &str) -> Result<DecodedPlan, DecodeError> {
    let value: Value = serde_json::from_str(raw)?;
    decode_plan(&value)
}

/// Validates an agent response into a typed batch.
///
/// Only a wrong top-level shape is fatal. Individual entries that cannot be
/// typed are dropped and reported in `warnings`, the rest of the batch stays.
pub fn decode_plan(raw: &Value) -> Result<DecodedPlan, DecodeError> {
    let object = raw.as_object().ok_or(DecodeError::NotAnObject)?;
    let entries = object
        .get("actions")
        .ok_or(DecodeError::MissingActions)?
        .as_array()
        .ok_or(DecodeError::ActionsNotArray)?;
    let explanation = object
        .get("explanation")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let mut actions = Vec::with_capacity(entries.len());
    let mut warnings = Vec::new();
    for (index, entry) in entries.iter().enumerate() {
        match decode_action(entry) {
            Ok(action) => actions.push(action),
            Err(reason) => {
                tracing::warn!(index, %reason, "dropping malformed agent action");
                warnings.push(DecodeWarning { index, reason });
            }
        }
    }

    Ok(DecodedPlan {
        plan: AgentPlan {
            explanation,
            actions,
        },
        warnings,
    })
}

fn decode_action(entry: &Value) -> Result<EditAction, DropReason> {
    let fields = entry.as_object().ok_or(DropReason::NotAnObject)?;
    let raw_kind = first_str(fields, KIND_KEYS).ok_or(DropReason::MissingKind)?;
    let kind = EditKind::parse(raw_kind)
        .ok_or_else(|| DropReason::UnknownKind(raw_kind.to_string()))?;
    let raw_name = first_str(fields, TARGET_KEYS).ok_or(DropReason::MissingTargetName)?;
    let name = normalize_file_name(raw_name)
        .ok_or_else(|| DropReason::NotAFileName(raw_name.to_string()))?;
    let rationale = first_str(fields, RATIONALE_KEYS)
        .unwrap_or_default()
        .to_string();
    let content = || {
        fields
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    Ok(match kind {
        EditKind::Create => EditAction::Create {
            name,
            content: content(),
            rationale,
        },
        EditKind::Update => EditAction::Update {
            name,
            content: content(),
            rationale,
        },
        EditKind::Delete => EditAction::Delete { name, rationale },
    })
}

/// First non-blank string among the alias keys.
fn first_str<'a>(fields: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|key| {
        fields
            .get(*key)
            .and_then(Value::as_str)
            .filter(|value| !value.trim().is_empty())
    })
}

fn fenced_json_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```(?:json|JSON)?\s*\n(.*?)```").ok())
        .as_ref()
}

/// Pulls the JSON document out of free-form model output: the first fenced
/// block if there is one, otherwise the outermost `{...}` span.
pub fn extract_json_payload(text: &str) -> Option<&str> {
    if let Some(body) = fenced_json_regex()
        .and_then(|re| re.captures(text))
        .and_then(|caps| caps.get(1))
    {
        let body = body.as_str().trim();
        if body.starts_with('{') {
            return Some(body);
        }
    }
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}
