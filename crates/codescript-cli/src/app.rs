use std::path::Path;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::thread::JoinHandle;
use std::time::Duration;

use codescript_core::actions::AppAction;
use codescript_core::actions::RuntimeAction;
use codescript_core::actions::UserAction;
use codescript_core::actions::WorkspaceEffect;
use codescript_core::config::Config;
use codescript_core::config::StorageBackend;
use codescript_core::persistence::hydrate_files;
use codescript_core::persistence::sync_changes;
use codescript_core::persistence::FileBackend;
use codescript_core::persistence::LocalStore;
use codescript_core::persistence::RecordStore;
use codescript_core::persistence::SessionBackend;
use codescript_core::reducer::reduce;
use codescript_core::state::normalize_file_name;
use codescript_core::state::AppSettings;
use codescript_core::state::AppState;
use codescript_core::state::FileId;
use codescript_core::state::SessionId;
use codescript_core::StoreError;
use codescript_exec::complete_or_fallback;
use codescript_exec::request_plan;
use codescript_exec::CompletionRequest;
use codescript_exec::ModelClient;
use codescript_exec::PlanRequest;

const CURRENT_SESSION_KEY: &str = "current_session";
const RECORDS_FILE: &str = "records/collections.json";
const WORKER_POLL: Duration = Duration::from_millis(50);
const WORKER_PANICKED: &str = "model worker panicked";

/// Where files and chat sessions live. Settings and logs always stay in the
/// local store.
pub enum Backend {
    Local(LocalStore),
    Records(RecordStore),
}

impl Backend {
    pub fn open(kind: StorageBackend, data_dir: &Path) -> Result<Self, StoreError> {
        match kind {
            StorageBackend::Local => Ok(Self::Local(LocalStore::open(data_dir)?)),
            StorageBackend::Records => Ok(Self::Records(RecordStore::open(
                data_dir.join(RECORDS_FILE),
            )?)),
        }
    }

    fn files(&self) -> &dyn FileBackend {
        match self {
            Self::Local(store) => store,
            Self::Records(store) => store,
        }
    }

    fn files_mut(&mut self) -> &mut dyn FileBackend {
        match self {
            Self::Local(store) => store,
            Self::Records(store) => store,
        }
    }

    fn sessions(&self) -> &dyn SessionBackend {
        match self {
            Self::Local(store) => store,
            Self::Records(store) => store,
        }
    }

    fn sessions_mut(&mut self) -> &mut dyn SessionBackend {
        match self {
            Self::Local(store) => store,
            Self::Records(store) => store,
        }
    }
}

/// A model call in flight, with the result to report if its thread dies
/// without sending one.
struct Worker {
    handle: JoinHandle<()>,
    on_panic: RuntimeAction,
}

/// Sole owner of the application state.
///
/// Model calls run on worker threads and come back as runtime actions over a
/// channel; only this type drains the channel and calls `reduce`.
pub struct App {
    state: AppState,
    store: LocalStore,
    backend: Backend,
    client: Arc<dyn ModelClient>,
    user_id: String,
    tx: mpsc::Sender<RuntimeAction>,
    rx: mpsc::Receiver<RuntimeAction>,
    in_flight: usize,
    workers: Vec<Worker>,
}

impl App {
    pub fn new(
        store: LocalStore,
        backend: Backend,
        client: Arc<dyn ModelClient>,
        user_id: impl Into<String>,
    ) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            state: AppState::default(),
            store,
            backend,
            client,
            user_id: user_id.into(),
            tx,
            rx,
            in_flight: 0,
            workers: Vec::new(),
        }
    }

    /// Opens the stores under `data_dir` and hydrates from them.
    pub fn open(
        config: &Config,
        data_dir: &Path,
        client: Arc<dyn ModelClient>,
    ) -> Result<Self, StoreError> {
        let store = LocalStore::open(data_dir)?;
        let backend = Backend::open(config.storage.backend, data_dir)?;
        let mut app = Self::new(store, backend, client, config.storage.user_id.clone());
        app.hydrate(&config.model.default_model);
        Ok(app)
    }

    /// Each source falls back to its empty value when it cannot be read.
    pub fn hydrate(&mut self, default_model: &str) {
        let settings = match self.store.load_settings() {
            Ok(Some(settings)) => settings,
            Ok(None) => AppSettings {
                model: default_model.to_string(),
                ..AppSettings::default()
            },
            Err(err) => {
                tracing::warn!(error = %err, "loading settings failed, using defaults");
                AppSettings::default()
            }
        };
        self.apply(AppAction::Runtime(RuntimeAction::HydrateSettings(settings)));

        let sessions = self
            .backend
            .sessions()
            .load_sessions(&self.user_id)
            .unwrap_or_else(|err| {
                tracing::warn!(error = %err, "loading sessions failed, starting empty");
                Vec::new()
            });
        self.apply(AppAction::Runtime(RuntimeAction::HydrateSessions(sessions)));

        let logs = self.store.load_logs().unwrap_or_else(|err| {
            tracing::warn!(error = %err, "loading logs failed, starting empty");
            Vec::new()
        });
        self.apply(AppAction::Runtime(RuntimeAction::HydrateLogs(logs)));

        let files = hydrate_files(self.backend.files(), &self.user_id).into_files();
        self.apply(AppAction::Runtime(RuntimeAction::HydrateFiles(files)));

        match self.store.read::<SessionId>(CURRENT_SESSION_KEY) {
            Ok(Some(id)) => {
                self.apply(AppAction::User(UserAction::SelectSession(id)));
            }
            Ok(None) => {}
            Err(err) => tracing::warn!(error = %err, "reading current session failed"),
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn file_id(&self, name: &str) -> Option<FileId> {
        let name = normalize_file_name(name)?;
        self.state
            .files
            .find_by_name(&name)
            .map(|file| file.id.clone())
    }

    pub fn dispatch(&mut self, action: UserAction) {
        let before = self.state.current_session.clone();
        self.apply(AppAction::User(action));
        if self.state.current_session != before {
            if let Some(id) = self.state.current_session.clone() {
                if let Err(err) = self.store.write(CURRENT_SESSION_KEY, &id) {
                    tracing::warn!(error = %err, "saving current session failed");
                }
            }
        }
    }

    /// Blocks until every outstanding model call has reported back. A worker
    /// that panics reports as a failed request.
    pub fn wait_idle(&mut self) {
        while self.in_flight > 0 {
            match self.rx.recv_timeout(WORKER_POLL) {
                Ok(action) => {
                    self.in_flight -= 1;
                    self.apply(AppAction::Runtime(action));
                }
                Err(mpsc::RecvTimeoutError::Timeout) => self.reap_workers(),
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
        }
        self.reap_workers();
    }

    fn reap_workers(&mut self) {
        let (finished, running): (Vec<Worker>, Vec<Worker>) = std::mem::take(&mut self.workers)
            .into_iter()
            .partition(|worker| worker.handle.is_finished());
        self.workers = running;
        for worker in finished {
            if worker.handle.join().is_ok() {
                continue;
            }
            tracing::warn!("model worker panicked, failing its request");
            self.in_flight = self.in_flight.saturating_sub(1);
            self.apply(AppAction::Runtime(worker.on_panic));
        }
    }

    fn apply(&mut self, action: AppAction) {
        let effects = reduce(&mut self.state, action);
        for effect in effects {
            self.run_effect(effect);
        }
    }

    fn run_effect(&mut self, effect: WorkspaceEffect) {
        match effect {
            WorkspaceEffect::RequestCompletion {
                request_id,
                session_id,
                history,
                files,
                model,
            } => {
                let request = CompletionRequest::new(&history, &files, model);
                let on_panic = RuntimeAction::CompletionFailed {
                    request_id,
                    session_id: session_id.clone(),
                    error: WORKER_PANICKED.to_string(),
                };
                self.spawn(on_panic, move |client| match complete_or_fallback(client, &request) {
                    Ok(text) => RuntimeAction::CompletionResolved {
                        request_id,
                        session_id,
                        text,
                    },
                    Err(err) => RuntimeAction::CompletionFailed {
                        request_id,
                        session_id,
                        error: err.to_string(),
                    },
                });
            }
            WorkspaceEffect::RequestPlan {
                request_id,
                instruction,
                files,
                model,
            } => {
                let request = PlanRequest::new(instruction, &files, model);
                let on_panic = RuntimeAction::PlanFailed {
                    request_id,
                    error: WORKER_PANICKED.to_string(),
                };
                self.spawn(on_panic, move |client| match request_plan(client, &request) {
                    Ok(decoded) => RuntimeAction::PlanResolved {
                        request_id,
                        decoded,
                    },
                    Err(err) => RuntimeAction::PlanFailed {
                        request_id,
                        error: err.to_string(),
                    },
                });
            }
            WorkspaceEffect::SyncFiles(changes) => {
                let report = sync_changes(self.backend.files_mut(), &self.user_id, &changes);
                if !report.is_clean() {
                    tracing::debug!(
                        saved = report.upserted + report.removed,
                        failed = report.failed.len(),
                        "file sync incomplete"
                    );
                }
            }
            WorkspaceEffect::SaveSessions => {
                if let Err(err) = self
                    .backend
                    .sessions_mut()
                    .save_sessions(&self.user_id, &self.state.sessions)
                {
                    tracing::warn!(error = %err, "saving sessions failed");
                }
            }
            WorkspaceEffect::SaveLogs => {
                if let Err(err) = self.store.save_logs(&self.state.logs.to_vec()) {
                    tracing::warn!(error = %err, "saving logs failed");
                }
            }
            WorkspaceEffect::SaveSettings => {
                if let Err(err) = self.store.save_settings(&self.state.settings) {
                    tracing::warn!(error = %err, "saving settings failed");
                }
            }
        }
    }

    fn spawn<F>(&mut self, on_panic: RuntimeAction, job: F)
    where
        F: FnOnce(&dyn ModelClient) -> RuntimeAction + Send + 'static,
    {
        let client = Arc::clone(&self.client);
        let tx = self.tx.clone();
        self.in_flight += 1;
        let handle = thread::spawn(move || {
            let action = job(client.as_ref());
            if tx.send(action).is_err() {
                tracing::debug!("app dropped before model reply arrived");
            }
        });
        self.workers.push(Worker { handle, on_panic });
    }
}
