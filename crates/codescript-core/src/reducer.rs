use super::actions::AppAction;
use super::actions::RuntimeAction;
use super::actions::UserAction;
use super::actions::WorkspaceEffect;
use super::decoder::DecodedPlan;
use super::error::WorkspaceError;
use super::state::ActionSummary;
use super::state::AppState;
use super::state::ChatSession;
use super::state::FileStore;
use super::state::LogEntry;
use super::state::LogLevel;
use super::state::LogSource;
use super::state::Message;
use super::state::Role;
use super::state::SessionId;
use super::state::View;
use super::workspace;
use super::workspace::changes_from_outcomes;
use super::workspace::FileChange;
use super::workspace::OutcomeEffect;

pub const COMPLETION_FALLBACK: &str =
    "Error communicating with the coding engine. Please check your connection and API key.";

pub fn reduce(state: &mut AppState, action: AppAction) -> Vec<WorkspaceEffect> {
    match action {
        AppAction::User(user) => reduce_user(state, user),
        AppAction::Runtime(runtime) => reduce_runtime(state, runtime),
    }
}

fn reduce_user(state: &mut AppState, action: UserAction) -> Vec<WorkspaceEffect> {
    let mut effects = Vec::new();
    match action {
        UserAction::NewSession => {
            open_new_session(state);
            state.view = View::Chat;
            autosave(state, &mut effects, WorkspaceEffect::SaveSessions);
        }
        UserAction::SelectSession(id) => {
            if state.session(&id).is_some() {
                state.current_session = Some(id);
                state.view = View::Chat;
            }
        }
        UserAction::DeleteSession(id) => {
            let before = state.sessions.len();
            state.sessions.retain(|session| session.id != id);
            if state.sessions.len() == before {
                return effects;
            }
            state.pending.completions.remove(&id);
            if state.current_session.as_ref() == Some(&id) {
                state.current_session = state.sessions.first().map(|session| session.id.clone());
            }
            if state.sessions.is_empty() {
                open_new_session(state);
            }
            autosave(state, &mut effects, WorkspaceEffect::SaveSessions);
        }
        UserAction::SendMessage(text) => {
            if text.trim().is_empty() {
                return effects;
            }
            let session_id = ensure_current_session(state);
            if let Some(pending) = state.pending.completions.get(&session_id).copied() {
                log(
                    state,
                    LogEntry::new(
                        LogLevel::Warn,
                        LogSource::System,
                        format!("A reply is still pending for this chat (request #{pending})"),
                    ),
                );
                autosave(state, &mut effects, WorkspaceEffect::SaveLogs);
                return effects;
            }

            let request_id = state.pending.issue();
            state.pending.completions.insert(session_id.clone(), request_id);
            let Some(session) = state.session_mut(&session_id) else {
                return effects;
            };
            session.push_user_message(Message::new(Role::User, text));
            let history = session.messages.clone();
            effects.push(WorkspaceEffect::RequestCompletion {
                request_id,
                session_id,
                history,
                files: state.files.files().to_vec(),
                model: state.settings.model.clone(),
            });
            autosave(state, &mut effects, WorkspaceEffect::SaveSessions);
        }
        UserAction::SubmitInstruction(text) => {
            let instruction = text.trim();
            if instruction.is_empty() {
                return effects;
            }
            if let Some(pending) = state.pending.agent {
                log(
                    state,
                    LogEntry::new(
                        LogLevel::Warn,
                        LogSource::System,
                        format!("Agent is busy with request #{pending}; instruction ignored"),
                    )
                    .with_run_id(pending),
                );
                autosave(state, &mut effects, WorkspaceEffect::SaveLogs);
                return effects;
            }

            let request_id = state.pending.issue();
            state.pending.agent = Some(request_id);
            log(
                state,
                LogEntry::new(LogLevel::Info, LogSource::User, instruction).with_run_id(request_id),
            );
            effects.push(WorkspaceEffect::RequestPlan {
                request_id,
                instruction: instruction.to_string(),
                files: state.files.files().to_vec(),
                model: state.settings.model.clone(),
            });
            autosave(state, &mut effects, WorkspaceEffect::SaveLogs);
        }
        UserAction::CreateFile { name, content } => {
            match workspace::create_file(&mut state.files, &name, content) {
                Ok(file) => {
                    state.selected_file = Some(file.id.clone());
                    state.view = View::Workspace;
                    sync(state, &mut effects, vec![FileChange::Upsert(file)]);
                }
                Err(err) => report_edit_failure(state, &mut effects, err),
            }
        }
        UserAction::EditFile { id, content } => {
            match workspace::edit_file(&mut state.files, &id, content) {
                Ok(file) => sync(state, &mut effects, vec![FileChange::Upsert(file)]),
                Err(err) => report_edit_failure(state, &mut effects, err),
            }
        }
        UserAction::RenameFile { id, name } => {
            match workspace::rename_file(&mut state.files, &id, &name) {
                Ok((previous, file)) => {
                    let mut changes = Vec::with_capacity(2);
                    if previous != file.name {
                        changes.push(FileChange::Remove { name: previous });
                    }
                    changes.push(FileChange::Upsert(file));
                    sync(state, &mut effects, changes);
                }
                Err(err) => report_edit_failure(state, &mut effects, err),
            }
        }
        UserAction::DeleteFile { id } => match workspace::delete_file(&mut state.files, &id) {
            Ok(file) => {
                if state.selected_file.as_ref() == Some(&file.id) {
                    state.selected_file = None;
                }
                sync(
                    state,
                    &mut effects,
                    vec![FileChange::Remove { name: file.name }],
                );
            }
            Err(err) => report_edit_failure(state, &mut effects, err),
        },
        UserAction::ImportFiles(imported) => {
            let outcomes = workspace::import_files(&mut state.files, &imported);
            if state.selected_file().is_none() {
                state.selected_file = outcomes
                    .iter()
                    .find_map(|outcome| outcome.file.as_ref().map(|file| file.id.clone()));
            }
            state.view = View::Workspace;
            log(
                state,
                LogEntry::new(
                    LogLevel::Info,
                    LogSource::System,
                    format!("Imported {} file(s)", outcomes.len()),
                ),
            );
            sync(state, &mut effects, changes_from_outcomes(&outcomes));
            autosave(state, &mut effects, WorkspaceEffect::SaveLogs);
        }
        UserAction::SelectFile(id) => {
            state.selected_file = id.filter(|id| state.files.find_by_id(id).is_some());
        }
        UserAction::SetView(view) => {
            state.view = view;
        }
        UserAction::UpdateSettings(settings) => {
            state.settings = settings.normalized();
            effects.push(WorkspaceEffect::SaveSettings);
        }
        UserAction::ClearLogs => {
            state.logs.clear();
            autosave(state, &mut effects, WorkspaceEffect::SaveLogs);
        }
    }
    effects
}

fn reduce_runtime(state: &mut AppState, action: RuntimeAction) -> Vec<WorkspaceEffect> {
    let mut effects = Vec::new();
    match action {
        RuntimeAction::HydrateFiles(files) => {
            let mut store = FileStore::new();
            for file in files {
                if store.find_by_name(&file.name).is_none() {
                    store.insert(file);
                }
            }
            state.files = store;
            if state.selected_file().is_none() {
                state.selected_file = state.files.iter().next().map(|file| file.id.clone());
            }
        }
        RuntimeAction::HydrateSessions(sessions) => {
            state.sessions = sessions;
            state.current_session = state.sessions.first().map(|session| session.id.clone());
            if state.sessions.is_empty() {
                open_new_session(state);
                autosave(state, &mut effects, WorkspaceEffect::SaveSessions);
            }
        }
        RuntimeAction::HydrateLogs(entries) => {
            state.logs.clear();
            for entry in entries {
                state.logs.append(entry);
            }
        }
        RuntimeAction::HydrateSettings(settings) => {
            state.settings = settings.normalized();
        }
        RuntimeAction::CompletionResolved {
            request_id,
            session_id,
            text,
        } => {
            if !take_pending_completion(state, &session_id, request_id) {
                return effects;
            }
            if let Some(session) = state.session_mut(&session_id) {
                session.messages.push(Message::new(Role::Assistant, text));
                autosave(state, &mut effects, WorkspaceEffect::SaveSessions);
            }
        }
        RuntimeAction::CompletionFailed {
            request_id,
            session_id,
            error,
        } => {
            if !take_pending_completion(state, &session_id, request_id) {
                return effects;
            }
            if let Some(session) = state.session_mut(&session_id) {
                session
                    .messages
                    .push(Message::new(Role::Assistant, COMPLETION_FALLBACK));
            }
            log(
                state,
                LogEntry::new(
                    LogLevel::Error,
                    LogSource::System,
                    format!("Completion failed: {error}"),
                ),
            );
            autosave(state, &mut effects, WorkspaceEffect::SaveSessions);
            autosave(state, &mut effects, WorkspaceEffect::SaveLogs);
        }
        RuntimeAction::PlanResolved {
            request_id,
            decoded,
        } => {
            if !take_pending_agent(state, request_id) {
                return effects;
            }
            apply_plan(state, &mut effects, request_id, decoded);
        }
        RuntimeAction::PlanFailed { request_id, error } => {
            if !take_pending_agent(state, request_id) {
                return effects;
            }
            log(
                state,
                LogEntry::new(
                    LogLevel::Error,
                    LogSource::System,
                    format!("Agent failed: {error}"),
                )
                .with_run_id(request_id),
            );
            autosave(state, &mut effects, WorkspaceEffect::SaveLogs);
        }
        RuntimeAction::AppendLog(entry) => {
            log(state, entry);
            autosave(state, &mut effects, WorkspaceEffect::SaveLogs);
        }
    }
    effects
}

fn apply_plan(
    state: &mut AppState,
    effects: &mut Vec<WorkspaceEffect>,
    request_id: u64,
    decoded: DecodedPlan,
) {
    let DecodedPlan { plan, warnings } = decoded;
    let outcomes = workspace::apply_batch(&mut state.files, &plan.actions);

    let summaries = plan
        .actions
        .iter()
        .map(|action| ActionSummary {
            kind: action.kind().label().to_string(),
            name: action.target_name().to_string(),
        })
        .collect();
    let message = if plan.explanation.trim().is_empty() {
        format!("Applied {} action(s)", plan.actions.len())
    } else {
        plan.explanation
    };
    log(
        state,
        LogEntry::new(LogLevel::Info, LogSource::Agent, message)
            .with_run_id(request_id)
            .with_actions(summaries),
    );
    for warning in warnings {
        log(
            state,
            LogEntry::new(LogLevel::Warn, LogSource::System, warning.to_string())
                .with_run_id(request_id),
        );
    }

    if let Some(touched) = outcomes.iter().find_map(|outcome| match outcome.effect {
        OutcomeEffect::Created | OutcomeEffect::Updated => outcome.file.as_ref(),
        OutcomeEffect::Deleted | OutcomeEffect::Unchanged => None,
    }) {
        state.selected_file = Some(touched.id.clone());
    } else if state.selected_file().is_none() {
        // selection was deleted by the batch
        state.selected_file = None;
    }

    sync(state, effects, changes_from_outcomes(&outcomes));
    autosave(state, effects, WorkspaceEffect::SaveLogs);
}

fn take_pending_completion(state: &mut AppState, session_id: &SessionId, request_id: u64) -> bool {
    if state.pending.completions.get(session_id) != Some(&request_id) {
        tracing::debug!(request_id, session = %session_id, "discarding stale completion");
        return false;
    }
    state.pending.completions.remove(session_id);
    true
}

fn take_pending_agent(state: &mut AppState, request_id: u64) -> bool {
    if state.pending.agent != Some(request_id) {
        tracing::debug!(request_id, "discarding stale agent result");
        return false;
    }
    state.pending.agent = None;
    true
}

fn open_new_session(state: &mut AppState) -> SessionId {
    let session = ChatSession::new();
    let id = session.id.clone();
    state.sessions.insert(0, session);
    state.current_session = Some(id.clone());
    id
}

fn ensure_current_session(state: &mut AppState) -> SessionId {
    match state.current_session().map(|session| session.id.clone()) {
        Some(id) => id,
        None => open_new_session(state),
    }
}

fn report_edit_failure(
    state: &mut AppState,
    effects: &mut Vec<WorkspaceEffect>,
    err: WorkspaceError,
) {
    log(
        state,
        LogEntry::new(LogLevel::Error, LogSource::System, err.to_string()),
    );
    autosave(state, effects, WorkspaceEffect::SaveLogs);
}

fn log(state: &mut AppState, mut entry: LogEntry) {
    if entry.run_id == 0 {
        entry.run_id = state.current_run_id();
    }
    state.logs.append(entry);
}

fn sync(state: &AppState, effects: &mut Vec<WorkspaceEffect>, changes: Vec<FileChange>) {
    if changes.is_empty() {
        return;
    }
    autosave(state, effects, WorkspaceEffect::SyncFiles(changes));
}

fn autosave(state: &AppState, effects: &mut Vec<WorkspaceEffect>, effect: WorkspaceEffect) {
    if state.settings.auto_save && !effects.contains(&effect) {
        effects.push(effect);
    }
}

#[cfg(test)]
mod tests;
