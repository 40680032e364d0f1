use thiserror::Error;

/// Fatal failures while turning an agent response into an action batch.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("agent response is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("agent response is not a JSON object")]
    NotAnObject,

    #[error("agent response has no `actions` list")]
    MissingActions,

    #[error("agent response `actions` is not a list")]
    ActionsNotArray,
}

/// Rejections of manual (user-driven) workspace edits.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorkspaceError {
    #[error("a file named `{0}` already exists")]
    NameTaken(String),

    #[error("file name must not be empty")]
    EmptyName,

    #[error("`{0}` names a directory, not a file")]
    NotAFileName(String),

    #[error("no file with id `{0}`")]
    UnknownFile(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("backend rejected `{name}`: {reason}")]
    Rejected { name: String, reason: String },
}

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
}
