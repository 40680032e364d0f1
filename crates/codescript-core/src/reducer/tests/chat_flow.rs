use super::*;
use pretty_assertions::assert_eq;

#[test]
fn send_message_creates_session_and_requests_completion() {
    let mut state = state_with_files(&[("main.py", "print(1)")]);
    assert!(state.current_session().is_none());

    let effects = run_user(&mut state, UserAction::SendMessage("Explain main.py".to_string()));

    let session = state.current_session().expect("session");
    assert_eq!(session.title, "Explain main.py");
    assert_eq!(session.messages.len(), 1);
    match &effects[0] {
        WorkspaceEffect::RequestCompletion {
            history,
            files,
            model,
            ..
        } => {
            assert_eq!(history.len(), 1);
            assert_eq!(history[0].role, Role::User);
            assert_eq!(files.len(), 1);
            assert_eq!(model, &AppSettings::default().model);
        }
        other => panic!("unexpected effect {other:?}"),
    }
}

#[test]
fn resolved_completion_appends_assistant_reply() {
    let mut state = state();
    let (session_id, request_id) = send(&mut state, "hi");

    run_runtime(
        &mut state,
        RuntimeAction::CompletionResolved {
            request_id,
            session_id: session_id.clone(),
            text: "hello".to_string(),
        },
    );

    let session = state.session(&session_id).expect("session");
    let roles: Vec<Role> = session.messages.iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![Role::User, Role::Assistant]);
    assert_eq!(session.messages[1].content, "hello");
    assert!(state.pending.completions.is_empty());
}

#[test]
fn failed_completion_renders_fallback_message() {
    let mut state = state();
    let (session_id, request_id) = send(&mut state, "hi");

    run_runtime(
        &mut state,
        RuntimeAction::CompletionFailed {
            request_id,
            session_id: session_id.clone(),
            error: "connection refused".to_string(),
        },
    );

    let session = state.session(&session_id).expect("session");
    let reply = session.messages.last().expect("reply");
    assert_eq!(reply.role, Role::Assistant);
    assert_eq!(reply.content, COMPLETION_FALLBACK);
    assert!(state
        .logs
        .iter()
        .any(|entry| entry.level == LogLevel::Error));
}

#[test]
fn duplicate_send_while_pending_is_rejected() {
    let mut state = state();
    let (session_id, request_id) = send(&mut state, "one");

    let effects = run_user(&mut state, UserAction::SendMessage("two".to_string()));

    assert!(!effects
        .iter()
        .any(|effect| matches!(effect, WorkspaceEffect::RequestCompletion { .. })));
    assert_eq!(
        state.pending.completions.get(&session_id).copied(),
        Some(request_id)
    );
    assert_eq!(state.session(&session_id).expect("session").messages.len(), 1);
}

#[test]
fn stale_completion_is_discarded() {
    let mut state = state();
    let (session_id, request_id) = send(&mut state, "one");

    let effects = run_runtime(
        &mut state,
        RuntimeAction::CompletionResolved {
            request_id: request_id + 100,
            session_id: session_id.clone(),
            text: "ghost".to_string(),
        },
    );

    assert!(effects.is_empty());
    assert_eq!(state.session(&session_id).expect("session").messages.len(), 1);
}

#[test]
fn other_sessions_can_chat_while_one_is_pending() {
    let mut state = state();
    let (first, _) = send(&mut state, "one");
    run_user(&mut state, UserAction::NewSession);
    let (second, _) = send(&mut state, "two");

    assert_ne!(first, second);
    assert_eq!(state.pending.completions.len(), 2);
}

#[test]
fn deleting_current_session_selects_next_or_creates_fresh() {
    let mut state = state();
    run_user(&mut state, UserAction::NewSession);
    let older = state.current_session.clone().expect("older");
    run_user(&mut state, UserAction::NewSession);
    let newer = state.current_session.clone().expect("newer");

    run_user(&mut state, UserAction::DeleteSession(newer));
    assert_eq!(state.current_session, Some(older.clone()));

    run_user(&mut state, UserAction::DeleteSession(older.clone()));
    assert_eq!(state.sessions.len(), 1);
    let fresh = state.current_session.clone().expect("fresh");
    assert_ne!(fresh, older);
    assert_eq!(state.view, View::Chat);
}

#[test]
fn hydrating_no_sessions_opens_one() {
    let mut state = state();
    let effects = run_runtime(&mut state, RuntimeAction::HydrateSessions(Vec::new()));
    assert_eq!(effects, vec![WorkspaceEffect::SaveSessions]);
    assert_eq!(state.sessions.len(), 1);
    assert_eq!(
        state.current_session().map(|session| session.title.as_str()),
        Some("New Coding Chat")
    );
}

#[test]
fn hydrating_existing_sessions_saves_nothing() {
    let mut seeded = state();
    run_runtime(&mut seeded, RuntimeAction::HydrateSessions(Vec::new()));
    let sessions = seeded.sessions.clone();

    let mut state = state();
    let effects = run_runtime(&mut state, RuntimeAction::HydrateSessions(sessions.clone()));

    assert!(effects.is_empty());
    assert_eq!(state.current_session, Some(sessions[0].id.clone()));
}
