pub(super) use super::reduce;
pub(super) use super::COMPLETION_FALLBACK;
pub(super) use crate::actions::AppAction;
pub(super) use crate::actions::EditAction;
pub(super) use crate::actions::RuntimeAction;
pub(super) use crate::actions::UserAction;
pub(super) use crate::actions::WorkspaceEffect;
pub(super) use crate::archive::ImportedFile;
pub(super) use crate::decoder::decode_plan;
pub(super) use crate::decoder::DecodedPlan;
pub(super) use crate::state::AppSettings;
pub(super) use crate::state::AppState;
pub(super) use crate::state::LogLevel;
pub(super) use crate::state::LogSource;
pub(super) use crate::state::Role;
pub(super) use crate::state::SessionId;
pub(super) use crate::state::View;
pub(super) use crate::state::WorkspaceFile;
pub(super) use crate::workspace::FileChange;

mod chat_flow;
mod persistence_effects;

fn state() -> AppState {
    AppState::default()
}

fn state_with_files(files: &[(&str, &str)]) -> AppState {
    let mut state = state();
    run_runtime(
        &mut state,
        RuntimeAction::HydrateFiles(
            files
                .iter()
                .map(|(name, content)| WorkspaceFile::new(*name, *content))
                .collect(),
        ),
    );
    state
}

fn run_user(state: &mut AppState, action: UserAction) -> Vec<WorkspaceEffect> {
    reduce(state, AppAction::User(action))
}

fn run_runtime(state: &mut AppState, action: RuntimeAction) -> Vec<WorkspaceEffect> {
    reduce(state, AppAction::Runtime(action))
}

fn plan(actions: Vec<EditAction>) -> DecodedPlan {
    let mut decoded = DecodedPlan::default();
    decoded.plan.actions = actions;
    decoded
}

/// Submits an instruction and returns the request id the reducer issued.
fn submit(state: &mut AppState, instruction: &str) -> u64 {
    let effects = run_user(state, UserAction::SubmitInstruction(instruction.to_string()));
    effects
        .iter()
        .find_map(|effect| match effect {
            WorkspaceEffect::RequestPlan { request_id, .. } => Some(*request_id),
            _ => None,
        })
        .expect("plan requested")
}

/// Sends a chat message and returns `(session, request id)`.
fn send(state: &mut AppState, text: &str) -> (SessionId, u64) {
    let effects = run_user(state, UserAction::SendMessage(text.to_string()));
    effects
        .iter()
        .find_map(|effect| match effect {
            WorkspaceEffect::RequestCompletion {
                request_id,
                session_id,
                ..
            } => Some((session_id.clone(), *request_id)),
            _ => None,
        })
        .expect("completion requested")
}

fn file_contents(state: &AppState) -> Vec<(String, String)> {
    state
        .files
        .iter()
        .map(|file| (file.name.clone(), file.content.clone()))
        .collect()
}

fn synced_changes(effects: &[WorkspaceEffect]) -> Vec<FileChange> {
    effects
        .iter()
        .filter_map(|effect| match effect {
            WorkspaceEffect::SyncFiles(changes) => Some(changes.clone()),
            _ => None,
        })
        .flatten()
        .collect()
}
