use super::*;
use pretty_assertions::assert_eq;

fn manual_save_state() -> AppState {
    AppState::new(AppSettings {
        auto_save: false,
        ..AppSettings::default()
    })
}

#[test]
fn auto_save_off_suppresses_store_effects() {
    let mut state = manual_save_state();
    let effects = run_user(
        &mut state,
        UserAction::CreateFile {
            name: "a.py".to_string(),
            content: String::new(),
        },
    );
    assert!(effects.is_empty());

    let (_, _) = send(&mut state, "hi");
    let effects = run_user(&mut state, UserAction::ClearLogs);
    assert!(effects.is_empty());

    let effects = run_runtime(&mut state, RuntimeAction::HydrateSessions(Vec::new()));
    assert!(effects.is_empty());
    assert_eq!(state.sessions.len(), 1);
}

#[test]
fn settings_are_always_saved_and_clamped() {
    let mut state = manual_save_state();
    let effects = run_user(
        &mut state,
        UserAction::UpdateSettings(AppSettings {
            font_size: 99,
            model: "  ".to_string(),
            ..AppSettings::default()
        }),
    );

    assert_eq!(effects, vec![WorkspaceEffect::SaveSettings]);
    assert_eq!(state.settings.font_size, 24);
    assert_eq!(state.settings.model, AppSettings::default().model);
    assert!(state.settings.auto_save);
}

#[test]
fn persistence_effects_are_not_duplicated() {
    let mut state = state();
    let request_id = submit(&mut state, "go");
    let effects = run_runtime(
        &mut state,
        RuntimeAction::PlanResolved {
            request_id,
            decoded: plan(vec![EditAction::create("a.py", "1")]),
        },
    );

    let save_logs = effects
        .iter()
        .filter(|effect| matches!(effect, WorkspaceEffect::SaveLogs))
        .count();
    assert_eq!(save_logs, 1);
}

#[test]
fn hydrated_logs_are_resequenced() {
    let mut state = state();
    let mut entries = Vec::new();
    for (seq, message) in [(40, "a"), (41, "b")] {
        let mut entry =
            crate::state::LogEntry::new(LogLevel::Info, LogSource::Agent, message);
        entry.seq = seq;
        entries.push(entry);
    }

    run_runtime(&mut state, RuntimeAction::HydrateLogs(entries));

    let seqs: Vec<u64> = state.logs.iter().map(|entry| entry.seq).collect();
    assert_eq!(seqs, vec![1, 2]);
}

#[test]
fn hydrate_files_drops_duplicate_names() {
    let mut state = state();
    run_runtime(
        &mut state,
        RuntimeAction::HydrateFiles(vec![
            WorkspaceFile::new("a.py", "first"),
            WorkspaceFile::new("a.py", "second"),
        ]),
    );
    assert_eq!(
        file_contents(&state),
        vec![("a.py".to_string(), "first".to_string())]
    );
}
