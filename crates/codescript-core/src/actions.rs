use serde::Deserialize;
use serde::Serialize;

use super::archive::ImportedFile;
use super::decoder::DecodedPlan;
use super::state::AppSettings;
use super::state::ChatSession;
use super::state::FileId;
use super::state::LogEntry;
use super::state::Message;
use super::state::SessionId;
use super::state::View;
use super::state::WorkspaceFile;
use super::workspace::FileChange;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditKind {
    Create,
    Update,
    Delete,
}

impl EditKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "create" => Some(Self::Create),
            "update" => Some(Self::Update),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }
}

/// One agent instruction against a single named file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EditAction {
    Create {
        name: String,
        content: String,
        rationale: String,
    },
    Update {
        name: String,
        content: String,
        rationale: String,
    },
    Delete {
        name: String,
        rationale: String,
    },
}

impl EditAction {
    pub fn create(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self::Create {
            name: name.into(),
            content: content.into(),
            rationale: String::new(),
        }
    }

    pub fn update(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self::Update {
            name: name.into(),
            content: content.into(),
            rationale: String::new(),
        }
    }

    pub fn delete(name: impl Into<String>) -> Self {
        Self::Delete {
            name: name.into(),
            rationale: String::new(),
        }
    }

    pub fn kind(&self) -> EditKind {
        match self {
            Self::Create { .. } => EditKind::Create,
            Self::Update { .. } => EditKind::Update,
            Self::Delete { .. } => EditKind::Delete,
        }
    }

    pub fn target_name(&self) -> &str {
        match self {
            Self::Create { name, .. } | Self::Update { name, .. } | Self::Delete { name, .. } => {
                name
            }
        }
    }

    pub fn content(&self) -> Option<&str> {
        match self {
            Self::Create { content, .. } | Self::Update { content, .. } => Some(content),
            Self::Delete { .. } => None,
        }
    }

    pub fn rationale(&self) -> &str {
        match self {
            Self::Create { rationale, .. }
            | Self::Update { rationale, .. }
            | Self::Delete { rationale, .. } => rationale,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentPlan {
    pub explanation: String,
    pub actions: Vec<EditAction>,
}

#[derive(Debug, Clone)]
pub enum AppAction {
    User(UserAction),
    Runtime(RuntimeAction),
}

#[derive(Debug, Clone)]
pub enum UserAction {
    NewSession,
    SelectSession(SessionId),
    DeleteSession(SessionId),
    SendMessage(String),
    SubmitInstruction(String),
    CreateFile { name: String, content: String },
    EditFile { id: FileId, content: String },
    RenameFile { id: FileId, name: String },
    DeleteFile { id: FileId },
    ImportFiles(Vec<ImportedFile>),
    SelectFile(Option<FileId>),
    SetView(View),
    UpdateSettings(AppSettings),
    ClearLogs,
}

#[derive(Debug, Clone)]
pub enum RuntimeAction {
    HydrateFiles(Vec<WorkspaceFile>),
    HydrateSessions(Vec<ChatSession>),
    HydrateLogs(Vec<LogEntry>),
    HydrateSettings(AppSettings),
    CompletionResolved {
        request_id: u64,
        session_id: SessionId,
        text: String,
    },
    CompletionFailed {
        request_id: u64,
        session_id: SessionId,
        error: String,
    },
    PlanResolved {
        request_id: u64,
        decoded: DecodedPlan,
    },
    PlanFailed {
        request_id: u64,
        error: String,
    },
    AppendLog(LogEntry),
}

/// Work the reducer asks the owner of the state to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkspaceEffect {
    RequestCompletion {
        request_id: u64,
        session_id: SessionId,
        history: Vec<Message>,
        files: Vec<WorkspaceFile>,
        model: String,
    },
    RequestPlan {
        request_id: u64,
        instruction: String,
        files: Vec<WorkspaceFile>,
        model: String,
    },
    SyncFiles(Vec<FileChange>),
    SaveSessions,
    SaveLogs,
    SaveSettings,
}
