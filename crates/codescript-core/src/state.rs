use std::collections::BTreeMap;
use std::collections::VecDeque;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;

pub const DEFAULT_SESSION_TITLE: &str = "New Coding Chat";
pub const SESSION_TITLE_CHARS: usize = 30;
pub const DEFAULT_LOG_CAPACITY: usize = 2_000;
pub const DEFAULT_MODEL: &str = "gemini-2.5-pro";
pub const PLAIN_TEXT_LANGUAGE: &str = "plaintext";

pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(pub String);

impl FileId {
    pub fn generate() -> Self {
        Self(new_id())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn generate() -> Self {
        Self(new_id())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

const LANGUAGE_BY_EXTENSION: &[(&str, &str)] = &[
    ("py", "python"),
    ("rs", "rust"),
    ("ts", "typescript"),
    ("tsx", "typescript"),
    ("js", "javascript"),
    ("jsx", "javascript"),
    ("mjs", "javascript"),
    ("json", "json"),
    ("md", "markdown"),
    ("html", "html"),
    ("htm", "html"),
    ("css", "css"),
    ("go", "go"),
    ("java", "java"),
    ("c", "c"),
    ("h", "c"),
    ("cpp", "cpp"),
    ("cc", "cpp"),
    ("hpp", "cpp"),
    ("sh", "shell"),
    ("toml", "toml"),
    ("yaml", "yaml"),
    ("yml", "yaml"),
    ("sql", "sql"),
    ("txt", PLAIN_TEXT_LANGUAGE),
];

/// Classifies a file by the extension of its final path segment.
///
/// Dotfiles (`.gitignore`), extension-less names (`Makefile`) and unknown
/// extensions all classify as plain text.
pub fn language_for_name(name: &str) -> &'static str {
    let segment = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let Some(dot) = segment.rfind('.') else {
        return PLAIN_TEXT_LANGUAGE;
    };
    if dot == 0 {
        return PLAIN_TEXT_LANGUAGE;
    }
    let extension = segment[dot + 1..].to_ascii_lowercase();
    if extension.is_empty() {
        return PLAIN_TEXT_LANGUAGE;
    }
    LANGUAGE_BY_EXTENSION
        .iter()
        .find(|(ext, _)| *ext == extension)
        .map_or(PLAIN_TEXT_LANGUAGE, |(_, language)| *language)
}

/// Canonical spelling of a workspace file name, used by every path into the
/// store and by archive import. Separators become `/` and leading `./` or
/// `/` segments are stripped. Blank names and directory-like names (trailing
/// `/`, a bare `.`) have no file form and yield `None`.
pub fn normalize_file_name(raw: &str) -> Option<String> {
    let unified = raw.trim().replace('\\', "/");
    let mut name = unified.as_str();
    loop {
        if let Some(rest) = name.strip_prefix("./") {
            name = rest;
        } else if let Some(rest) = name.strip_prefix('/') {
            name = rest;
        } else {
            break;
        }
    }
    if name.is_empty() || name == "." || name.ends_with('/') {
        return None;
    }
    Some(name.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceFile {
    pub id: FileId,
    pub name: String,
    pub content: String,
    pub language: String,
}

impl WorkspaceFile {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        let name = name.into();
        let language = language_for_name(&name).to_string();
        Self {
            id: FileId::generate(),
            name,
            content: content.into(),
            language,
        }
    }

    pub fn line_count(&self) -> usize {
        self.content.split('\n').count()
    }
}

/// Ordered collection of workspace files.
///
/// The store only does identity bookkeeping. Name uniqueness is the caller's
/// job (see `workspace::apply_batch` and the manual edit helpers).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileStore {
    files: Vec<WorkspaceFile>,
}

impl FileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_files(files: Vec<WorkspaceFile>) -> Self {
        Self { files }
    }

    pub fn into_files(self) -> Vec<WorkspaceFile> {
        self.files
    }

    pub fn files(&self) -> &[WorkspaceFile] {
        &self.files
    }

    pub fn iter(&self) -> impl Iterator<Item = &WorkspaceFile> {
        self.files.iter()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.files.iter().map(|file| file.name.as_str()).collect()
    }

    pub fn find_by_name(&self, name: &str) -> Option<&WorkspaceFile> {
        self.files.iter().find(|file| file.name == name)
    }

    pub fn find_by_id(&self, id: &FileId) -> Option<&WorkspaceFile> {
        self.files.iter().find(|file| &file.id == id)
    }

    pub fn insert(&mut self, file: WorkspaceFile) {
        self.files.push(file);
    }

    pub fn replace_content(&mut self, id: &FileId, content: String) -> bool {
        match self.files.iter_mut().find(|file| &file.id == id) {
            Some(file) => {
                file.content = content;
                true
            }
            None => false,
        }
    }

    pub fn rename(&mut self, id: &FileId, name: String) -> bool {
        match self.files.iter_mut().find(|file| &file.id == id) {
            Some(file) => {
                file.language = language_for_name(&name).to_string();
                file.name = name;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<WorkspaceFile> {
        let idx = self.files.iter().position(|file| file.name == name)?;
        Some(self.files.remove(idx))
    }

    pub fn remove_by_id(&mut self, id: &FileId) -> Option<WorkspaceFile> {
        let idx = self.files.iter().position(|file| &file.id == id)?;
        Some(self.files.remove(idx))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn label(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(Self::User),
            "assistant" | "model" => Some(Self::Assistant),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp_ms: i64,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            role,
            content: content.into(),
            timestamp_ms: now_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: SessionId,
    pub title: String,
    pub created_at_ms: i64,
    pub messages: Vec<Message>,
}

impl ChatSession {
    pub fn new() -> Self {
        Self {
            id: SessionId::generate(),
            title: DEFAULT_SESSION_TITLE.to_string(),
            created_at_ms: now_ms(),
            messages: Vec::new(),
        }
    }

    /// The first user message names an untouched session.
    pub fn push_user_message(&mut self, message: Message) {
        if self.messages.is_empty() {
            self.title = message.content.chars().take(SESSION_TITLE_CHARS).collect();
        }
        self.messages.push(message);
    }
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogSource {
    User,
    Agent,
    System,
}

impl LogSource {
    pub fn label(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Agent => "agent",
            Self::System => "system",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionSummary {
    pub kind: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub seq: u64,
    pub level: LogLevel,
    pub ts_ms: i64,
    pub source: LogSource,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<ActionSummary>,
    pub run_id: u64,
}

impl LogEntry {
    pub fn new(level: LogLevel, source: LogSource, message: impl Into<String>) -> Self {
        Self {
            seq: 0,
            level,
            ts_ms: now_ms(),
            source,
            message: message.into(),
            actions: Vec::new(),
            run_id: 0,
        }
    }

    pub fn with_run_id(mut self, run_id: u64) -> Self {
        self.run_id = run_id;
        self
    }

    pub fn with_actions(mut self, actions: Vec<ActionSummary>) -> Self {
        self.actions = actions;
        self
    }
}

#[derive(Debug, Clone)]
pub struct LogBuffer {
    cap: usize,
    next_seq: u64,
    buf: VecDeque<LogEntry>,
}

impl LogBuffer {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            next_seq: 1,
            buf: VecDeque::with_capacity(cap.min(256)),
        }
    }

    pub fn append(&mut self, mut entry: LogEntry) {
        entry.seq = self.next_seq;
        self.next_seq += 1;

        if self.buf.len() == self.cap {
            self.buf.pop_front();
        }
        self.buf.push_back(entry);
    }

    pub fn clear(&mut self) {
        self.buf.clear();
        self.next_seq = 1;
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.buf.iter()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn to_vec(&self) -> Vec<LogEntry> {
        self.buf.iter().cloned().collect()
    }

    /// Plain-text transcript, one `[ts] ROLE: message` line per entry.
    pub fn transcript(&self) -> String {
        self.buf
            .iter()
            .map(|entry| {
                let ts = chrono::DateTime::<chrono::Utc>::from_timestamp_millis(entry.ts_ms)
                    .map(|ts| ts.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
                    .unwrap_or_default();
                format!(
                    "[{ts}] {}: {}",
                    entry.source.label().to_ascii_uppercase(),
                    entry.message
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Theme {
    Dark,
    Oled,
}

impl Theme {
    pub fn label(self) -> &'static str {
        match self {
            Self::Dark => "dark",
            Self::Oled => "oled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "dark" => Some(Self::Dark),
            "oled" => Some(Self::Oled),
            _ => None,
        }
    }
}

pub const MIN_FONT_SIZE: u8 = 10;
pub const MAX_FONT_SIZE: u8 = 24;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub theme: Theme,
    pub font_size: u8,
    pub auto_save: bool,
    pub model: String,
}

impl AppSettings {
    pub fn normalized(mut self) -> Self {
        self.font_size = self.font_size.clamp(MIN_FONT_SIZE, MAX_FONT_SIZE);
        if self.model.trim().is_empty() {
            self.model = DEFAULT_MODEL.to_string();
        }
        self
    }
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            theme: Theme::Dark,
            font_size: 14,
            auto_save: true,
            model: DEFAULT_MODEL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Chat,
    Workspace,
    Dashboard,
    Settings,
}

impl View {
    pub fn label(self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Workspace => "workspace",
            Self::Dashboard => "dashboard",
            Self::Settings => "settings",
        }
    }
}

/// In-flight remote calls. One agent call per workspace, one completion per
/// session; results carrying any other request id are stale.
#[derive(Debug, Clone)]
pub struct PendingRequests {
    pub next_request_id: u64,
    pub agent: Option<u64>,
    pub completions: BTreeMap<SessionId, u64>,
}

impl Default for PendingRequests {
    fn default() -> Self {
        Self {
            next_request_id: 1,
            agent: None,
            completions: BTreeMap::new(),
        }
    }
}

impl PendingRequests {
    pub fn issue(&mut self) -> u64 {
        let id = self.next_request_id;
        self.next_request_id = self.next_request_id.saturating_add(1);
        id
    }

    pub fn is_busy(&self) -> bool {
        self.agent.is_some() || !self.completions.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    pub sessions: Vec<ChatSession>,
    pub current_session: Option<SessionId>,
    pub files: FileStore,
    pub selected_file: Option<FileId>,
    pub logs: LogBuffer,
    pub settings: AppSettings,
    pub view: View,
    pub pending: PendingRequests,
}

impl AppState {
    pub fn new(settings: AppSettings) -> Self {
        Self {
            sessions: Vec::new(),
            current_session: None,
            files: FileStore::new(),
            selected_file: None,
            logs: LogBuffer::default(),
            settings: settings.normalized(),
            view: View::Chat,
            pending: PendingRequests::default(),
        }
    }

    pub fn session(&self, id: &SessionId) -> Option<&ChatSession> {
        self.sessions.iter().find(|session| &session.id == id)
    }

    pub fn session_mut(&mut self, id: &SessionId) -> Option<&mut ChatSession> {
        self.sessions.iter_mut().find(|session| &session.id == id)
    }

    pub fn current_session(&self) -> Option<&ChatSession> {
        self.current_session.as_ref().and_then(|id| self.session(id))
    }

    pub fn selected_file(&self) -> Option<&WorkspaceFile> {
        self.selected_file
            .as_ref()
            .and_then(|id| self.files.find_by_id(id))
    }

    pub fn current_run_id(&self) -> u64 {
        self.pending.agent.unwrap_or(0)
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(AppSettings::default())
    }
}
