use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde::Serialize;

use super::error::StoreError;
use super::state::AppSettings;
use super::state::ChatSession;
use super::state::FileId;
use super::state::FileStore;
use super::state::LogEntry;
use super::state::Message;
use super::state::Role;
use super::state::SessionId;
use super::state::WorkspaceFile;
use super::workspace::FileChange;

pub const SETTINGS_KEY: &str = "settings";
pub const SESSIONS_KEY: &str = "sessions";
pub const FILES_KEY: &str = "files";
pub const LOGS_KEY: &str = "logs";

/// Durable home of a user's workspace files.
pub trait FileBackend {
    fn load_files(&self, user_id: &str) -> Result<Vec<WorkspaceFile>, StoreError>;
    fn upsert_file(&mut self, user_id: &str, file: &WorkspaceFile) -> Result<(), StoreError>;
    fn delete_file(&mut self, user_id: &str, name: &str) -> Result<(), StoreError>;
}

pub trait SessionBackend {
    fn load_sessions(&self, user_id: &str) -> Result<Vec<ChatSession>, StoreError>;
    fn save_sessions(&mut self, user_id: &str, sessions: &[ChatSession])
        -> Result<(), StoreError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub upserted: usize,
    pub removed: usize,
    pub failed: Vec<(String, String)>,
}

impl SyncReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Mirrors `changes` one file at a time. A failing file is logged and
/// skipped; the remaining changes are still attempted.
pub fn sync_changes(
    backend: &mut dyn FileBackend,
    user_id: &str,
    changes: &[FileChange],
) -> SyncReport {
    let mut report = SyncReport::default();
    for change in changes {
        let result = match change {
            FileChange::Upsert(file) => backend.upsert_file(user_id, file),
            FileChange::Remove { name } => backend.delete_file(user_id, name),
        };
        match (result, change) {
            (Ok(()), FileChange::Upsert(_)) => report.upserted += 1,
            (Ok(()), FileChange::Remove { .. }) => report.removed += 1,
            (Err(err), change) => {
                tracing::warn!(file = change.name(), error = %err, "file sync failed");
                report
                    .failed
                    .push((change.name().to_string(), err.to_string()));
            }
        }
    }
    report
}

/// Initial load. A failed fetch yields an empty store.
pub fn hydrate_files(backend: &dyn FileBackend, user_id: &str) -> FileStore {
    let files = match backend.load_files(user_id) {
        Ok(files) => files,
        Err(err) => {
            tracing::warn!(error = %err, "loading workspace files failed, starting empty");
            return FileStore::new();
        }
    };
    let mut store = FileStore::new();
    for file in files {
        if store.find_by_name(&file.name).is_some() {
            tracing::warn!(file = %file.name, "dropping duplicate stored file name");
            continue;
        }
        store.insert(file);
    }
    store
}

/// Directory of JSON blobs under fixed keys. Writes are last-write-wins.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn open(root: impl AsRef<Path>) -> std::io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }

    pub fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        let path = self.key_path(key);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = std::fs::read(&path)?;
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    pub fn write<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let encoded = serde_json::to_vec_pretty(value)?;
        write_atomic(&self.key_path(key), &encoded)?;
        Ok(())
    }

    pub fn load_settings(&self) -> Result<Option<AppSettings>, StoreError> {
        self.read(SETTINGS_KEY)
    }

    pub fn save_settings(&self, settings: &AppSettings) -> Result<(), StoreError> {
        self.write(SETTINGS_KEY, settings)
    }

    pub fn load_logs(&self) -> Result<Vec<LogEntry>, StoreError> {
        Ok(self.read(LOGS_KEY)?.unwrap_or_default())
    }

    pub fn save_logs(&self, logs: &[LogEntry]) -> Result<(), StoreError> {
        self.write(LOGS_KEY, logs)
    }

    pub fn save_files(&self, files: &[WorkspaceFile]) -> Result<(), StoreError> {
        self.write(FILES_KEY, files)
    }
}

impl FileBackend for LocalStore {
    fn load_files(&self, _user_id: &str) -> Result<Vec<WorkspaceFile>, StoreError> {
        Ok(self.read(FILES_KEY)?.unwrap_or_default())
    }

    fn upsert_file(&mut self, user_id: &str, file: &WorkspaceFile) -> Result<(), StoreError> {
        let mut files = self.load_files(user_id)?;
        match files.iter_mut().find(|stored| stored.name == file.name) {
            Some(stored) => *stored = file.clone(),
            None => files.push(file.clone()),
        }
        self.save_files(&files)
    }

    fn delete_file(&mut self, user_id: &str, name: &str) -> Result<(), StoreError> {
        let mut files = self.load_files(user_id)?;
        let before = files.len();
        files.retain(|stored| stored.name != name);
        if files.len() == before {
            return Ok(());
        }
        self.save_files(&files)
    }
}

impl SessionBackend for LocalStore {
    fn load_sessions(&self, _user_id: &str) -> Result<Vec<ChatSession>, StoreError> {
        Ok(self.read(SESSIONS_KEY)?.unwrap_or_default())
    }

    fn save_sessions(
        &mut self,
        _user_id: &str,
        sessions: &[ChatSession],
    ) -> Result<(), StoreError> {
        self.write(SESSIONS_KEY, sessions)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceFileRecord {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub content: String,
    pub language: String,
}

impl WorkspaceFileRecord {
    fn into_file(self) -> WorkspaceFile {
        WorkspaceFile {
            id: FileId(self.id),
            name: self.name,
            content: self.content,
            language: self.language,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: String,
    pub session_id: String,
    pub role: String,
    pub content: String,
    pub timestamp: i64,
}

pub fn session_to_records(
    user_id: &str,
    session: &ChatSession,
) -> (SessionRecord, Vec<MessageRecord>) {
    let record = SessionRecord {
        id: session.id.0.clone(),
        user_id: user_id.to_string(),
        title: session.title.clone(),
        created_at: session.created_at_ms,
    };
    let messages = session
        .messages
        .iter()
        .map(|message| MessageRecord {
            id: message.id.clone(),
            session_id: session.id.0.clone(),
            role: message.role.label().to_string(),
            content: message.content.clone(),
            timestamp: message.timestamp_ms,
        })
        .collect();
    (record, messages)
}

/// Rebuilds sessions from flat records. Messages are ordered by timestamp;
/// messages with an unknown role or an unknown session are skipped.
pub fn sessions_from_records(
    sessions: &[SessionRecord],
    messages: &[MessageRecord],
) -> Vec<ChatSession> {
    sessions
        .iter()
        .map(|record| {
            let mut owned: Vec<&MessageRecord> = messages
                .iter()
                .filter(|message| message.session_id == record.id)
                .collect();
            owned.sort_by_key(|message| message.timestamp);
            ChatSession {
                id: SessionId(record.id.clone()),
                title: record.title.clone(),
                created_at_ms: record.created_at,
                messages: owned
                    .into_iter()
                    .filter_map(|message| {
                        Some(Message {
                            id: message.id.clone(),
                            role: Role::parse(&message.role)?,
                            content: message.content.clone(),
                            timestamp_ms: message.timestamp,
                        })
                    })
                    .collect(),
            }
        })
        .collect()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RecordCollections {
    #[serde(default)]
    workspace_files: Vec<WorkspaceFileRecord>,
    #[serde(default)]
    sessions: Vec<SessionRecord>,
    #[serde(default)]
    messages: Vec<MessageRecord>,
}

/// Record collections shaped like the hosted backend: workspace files unique
/// on `(user_id, name)`, sessions with their messages. Optionally mirrored to
/// a JSON document after every write.
#[derive(Debug, Clone, Default)]
pub struct RecordStore {
    path: Option<PathBuf>,
    collections: RecordCollections,
}

impl RecordStore {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let collections = if path.exists() {
            serde_json::from_slice(&std::fs::read(&path)?)?
        } else {
            RecordCollections::default()
        };
        Ok(Self {
            path: Some(path),
            collections,
        })
    }

    pub fn file_records(&self) -> &[WorkspaceFileRecord] {
        &self.collections.workspace_files
    }

    fn flush(&self) -> Result<(), StoreError> {
        let Some(path) = self.path.as_ref() else {
            return Ok(());
        };
        let encoded = serde_json::to_vec_pretty(&self.collections)?;
        write_atomic(path, &encoded)?;
        Ok(())
    }
}

impl FileBackend for RecordStore {
    fn load_files(&self, user_id: &str) -> Result<Vec<WorkspaceFile>, StoreError> {
        Ok(self
            .collections
            .workspace_files
            .iter()
            .filter(|record| record.user_id == user_id)
            .cloned()
            .map(WorkspaceFileRecord::into_file)
            .collect())
    }

    fn upsert_file(&mut self, user_id: &str, file: &WorkspaceFile) -> Result<(), StoreError> {
        let existing = self
            .collections
            .workspace_files
            .iter_mut()
            .find(|record| record.user_id == user_id && record.name == file.name);
        match existing {
            Some(record) => {
                record.content = file.content.clone();
                record.language = file.language.clone();
            }
            None => self.collections.workspace_files.push(WorkspaceFileRecord {
                id: file.id.0.clone(),
                user_id: user_id.to_string(),
                name: file.name.clone(),
                content: file.content.clone(),
                language: file.language.clone(),
            }),
        }
        self.flush()
    }

    fn delete_file(&mut self, user_id: &str, name: &str) -> Result<(), StoreError> {
        self.collections
            .workspace_files
            .retain(|record| !(record.user_id == user_id && record.name == name));
        self.flush()
    }
}

impl SessionBackend for RecordStore {
    fn load_sessions(&self, user_id: &str) -> Result<Vec<ChatSession>, StoreError> {
        let sessions: Vec<SessionRecord> = self
            .collections
            .sessions
            .iter()
            .filter(|record| record.user_id == user_id)
            .cloned()
            .collect();
        Ok(sessions_from_records(&sessions, &self.collections.messages))
    }

    fn save_sessions(
        &mut self,
        user_id: &str,
        sessions: &[ChatSession],
    ) -> Result<(), StoreError> {
        let dropped: Vec<String> = self
            .collections
            .sessions
            .iter()
            .filter(|record| record.user_id == user_id)
            .map(|record| record.id.clone())
            .collect();
        self.collections
            .sessions
            .retain(|record| record.user_id != user_id);
        self.collections
            .messages
            .retain(|message| !dropped.contains(&message.session_id));
        for session in sessions {
            let (record, messages) = session_to_records(user_id, session);
            self.collections.sessions.push(record);
            self.collections.messages.extend(messages);
        }
        self.flush()
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("json.tmp");
    let mut opts = OpenOptions::new();
    opts.create(true).write(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(0o600);
    }
    let mut file = opts.open(&tmp)?;
    file.write_all(bytes)?;
    file.flush()?;
    drop(file);
    std::fs::rename(&tmp, path)
}
