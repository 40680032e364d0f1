use codescript_core::state::Message;
use codescript_core::state::Role;
use codescript_core::state::WorkspaceFile;
use serde::Deserialize;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
    pub timestamp_ms: i64,
}

impl From<&Message> for ChatTurn {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role,
            content: message.content.clone(),
            timestamp_ms: message.timestamp_ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSnapshot {
    pub name: String,
    pub language: String,
    pub content: String,
}

impl From<&WorkspaceFile> for FileSnapshot {
    fn from(file: &WorkspaceFile) -> Self {
        Self {
            name: file.name.clone(),
            language: file.language.clone(),
            content: file.content.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub history: Vec<ChatTurn>,
    pub files: Vec<FileSnapshot>,
    pub model: String,
}

impl CompletionRequest {
    pub fn new(history: &[Message], files: &[WorkspaceFile], model: impl Into<String>) -> Self {
        Self {
            history: history.iter().map(ChatTurn::from).collect(),
            files: files.iter().map(FileSnapshot::from).collect(),
            model: model.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanRequest {
    pub instruction: String,
    pub files: Vec<FileSnapshot>,
    pub model: String,
}

impl PlanRequest {
    pub fn new(
        instruction: impl Into<String>,
        files: &[WorkspaceFile],
        model: impl Into<String>,
    ) -> Self {
        Self {
            instruction: instruction.into(),
            files: files.iter().map(FileSnapshot::from).collect(),
            model: model.into(),
        }
    }
}
