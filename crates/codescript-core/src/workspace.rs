use serde::Deserialize;
use serde::Serialize;

use super::actions::EditAction;
use super::archive::ImportedFile;
use super::error::WorkspaceError;
use super::state::normalize_file_name;
use super::state::FileId;
use super::state::FileStore;
use super::state::WorkspaceFile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeEffect {
    Created,
    Updated,
    Deleted,
    Unchanged,
}

impl OutcomeEffect {
    pub fn label(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
            Self::Unchanged => "unchanged",
        }
    }
}

/// What one action did. `file` is the resulting file for create/update and
/// the removed file for delete; `None` when the action changed nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionOutcome {
    pub action: EditAction,
    pub effect: OutcomeEffect,
    pub file: Option<WorkspaceFile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum FileChange {
    Upsert(WorkspaceFile),
    Remove { name: String },
}

impl FileChange {
    pub fn name(&self) -> &str {
        match self {
            Self::Upsert(file) => file.name.as_str(),
            Self::Remove { name } => name.as_str(),
        }
    }
}

/// Applies `actions` to `store` strictly in order.
///
/// Create and Update are both upserts keyed by the normalized name. Deleting
/// a name that is not present is a no-op, and so is any action on a name with
/// no file form. Later actions observe earlier ones.
pub fn apply_batch(store: &mut FileStore, actions: &[EditAction]) -> Vec<ActionOutcome> {
    actions
        .iter()
        .map(|action| apply_action(store, action))
        .collect()
}

fn apply_action(store: &mut FileStore, action: &EditAction) -> ActionOutcome {
    let Some(name) = normalize_file_name(action.target_name()) else {
        tracing::warn!(name = action.target_name(), "skipping action on a non-file name");
        return ActionOutcome {
            action: action.clone(),
            effect: OutcomeEffect::Unchanged,
            file: None,
        };
    };
    let name = name.as_str();
    let (effect, file) = match action {
        EditAction::Create { content, .. } | EditAction::Update { content, .. } => {
            match store.find_by_name(name).map(|file| file.id.clone()) {
                Some(id) => {
                    store.replace_content(&id, content.clone());
                    (OutcomeEffect::Updated, store.find_by_id(&id).cloned())
                }
                None => {
                    let file = WorkspaceFile::new(name, content.clone());
                    store.insert(file.clone());
                    (OutcomeEffect::Created, Some(file))
                }
            }
        }
        EditAction::Delete { .. } => match store.remove(name) {
            Some(removed) => (OutcomeEffect::Deleted, Some(removed)),
            None => (OutcomeEffect::Unchanged, None),
        },
    };

    ActionOutcome {
        action: action.clone(),
        effect,
        file,
    }
}

/// Collapses outcomes into one durable change per touched name, in order of
/// first touch. The last outcome for a name decides its change.
pub fn changes_from_outcomes(outcomes: &[ActionOutcome]) -> Vec<FileChange> {
    let mut changes: Vec<FileChange> = Vec::new();
    for outcome in outcomes {
        let change = match (outcome.effect, &outcome.file) {
            (OutcomeEffect::Created | OutcomeEffect::Updated, Some(file)) => {
                FileChange::Upsert(file.clone())
            }
            (OutcomeEffect::Deleted, Some(file)) => FileChange::Remove {
                name: file.name.clone(),
            },
            _ => continue,
        };
        match changes
            .iter_mut()
            .find(|existing| existing.name() == change.name())
        {
            Some(existing) => *existing = change,
            None => changes.push(change),
        }
    }
    changes
}

pub fn create_file(
    store: &mut FileStore,
    name: &str,
    content: String,
) -> Result<WorkspaceFile, WorkspaceError> {
    let name = validate_name(name)?;
    if store.find_by_name(&name).is_some() {
        return Err(WorkspaceError::NameTaken(name));
    }
    let file = WorkspaceFile::new(name, content);
    store.insert(file.clone());
    Ok(file)
}

pub fn edit_file(
    store: &mut FileStore,
    id: &FileId,
    content: String,
) -> Result<WorkspaceFile, WorkspaceError> {
    if !store.replace_content(id, content) {
        return Err(WorkspaceError::UnknownFile(id.to_string()));
    }
    store
        .find_by_id(id)
        .cloned()
        .ok_or_else(|| WorkspaceError::UnknownFile(id.to_string()))
}

/// Renames a file; returns the previous name with the updated file.
pub fn rename_file(
    store: &mut FileStore,
    id: &FileId,
    name: &str,
) -> Result<(String, WorkspaceFile), WorkspaceError> {
    let name = validate_name(name)?;
    let previous = store
        .find_by_id(id)
        .map(|file| file.name.clone())
        .ok_or_else(|| WorkspaceError::UnknownFile(id.to_string()))?;
    if let Some(holder) = store.find_by_name(&name) {
        if &holder.id != id {
            return Err(WorkspaceError::NameTaken(name));
        }
    }
    store.rename(id, name);
    let file = store
        .find_by_id(id)
        .cloned()
        .ok_or_else(|| WorkspaceError::UnknownFile(id.to_string()))?;
    Ok((previous, file))
}

pub fn delete_file(store: &mut FileStore, id: &FileId) -> Result<WorkspaceFile, WorkspaceError> {
    store
        .remove_by_id(id)
        .ok_or_else(|| WorkspaceError::UnknownFile(id.to_string()))
}

/// Imported entries upsert by name, same as agent-created files.
pub fn import_files(store: &mut FileStore, imported: &[ImportedFile]) -> Vec<ActionOutcome> {
    let actions: Vec<EditAction> = imported
        .iter()
        .filter_map(|entry| {
            normalize_file_name(&entry.name).map(|name| EditAction::create(name, entry.content.clone()))
        })
        .collect();
    apply_batch(store, &actions)
}

fn validate_name(name: &str) -> Result<String, WorkspaceError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(WorkspaceError::EmptyName);
    }
    normalize_file_name(trimmed).ok_or_else(|| WorkspaceError::NotAFileName(trimmed.to_string()))
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::apply_batch;
    use super::changes_from_outcomes;
    use super::create_file;
    use super::import_files;
    use super::rename_file;
    use super::FileChange;
    use super::OutcomeEffect;
    use crate::actions::EditAction;
    use crate::archive::ImportedFile;
    use crate::error::WorkspaceError;
    use crate::state::FileStore;
    use crate::state::WorkspaceFile;
    use pretty_assertions::assert_eq;

    fn contents(store: &FileStore) -> Vec<(String, String)> {
        store
            .iter()
            .map(|file| (file.name.clone(), file.content.clone()))
            .collect()
    }

    #[test]
    fn create_on_existing_name_matches_update() {
        let seed = FileStore::from_files(vec![WorkspaceFile::new("a.py", "old")]);

        let mut via_create = seed.clone();
        apply_batch(&mut via_create, &[EditAction::create("a.py", "new")]);
        let mut via_update = seed.clone();
        apply_batch(&mut via_update, &[EditAction::update("a.py", "new")]);

        assert_eq!(via_create, via_update);
        assert_eq!(via_create.len(), 1);
    }

    #[test]
    fn upsert_keeps_id_and_language() {
        let seed = WorkspaceFile::new("a.py", "old");
        let id = seed.id.clone();
        let mut store = FileStore::from_files(vec![seed]);

        let outcomes = apply_batch(&mut store, &[EditAction::create("a.py", "new")]);

        assert_eq!(outcomes[0].effect, OutcomeEffect::Updated);
        let file = store.find_by_name("a.py").expect("file");
        assert_eq!(file.id, id);
        assert_eq!(file.language, "python");
        assert_eq!(file.content, "new");
    }

    #[test]
    fn delete_missing_is_noop() {
        let mut store = FileStore::from_files(vec![WorkspaceFile::new("a.py", "1")]);
        let before = store.clone();

        let outcomes = apply_batch(&mut store, &[EditAction::delete("ghost.py")]);

        assert_eq!(store, before);
        assert_eq!(outcomes[0].effect, OutcomeEffect::Unchanged);
        assert!(outcomes[0].file.is_none());
    }

    #[test]
    fn later_actions_see_earlier_ones() {
        let mut store = FileStore::new();
        apply_batch(
            &mut store,
            &[EditAction::create("a.py", "1"), EditAction::update("a.py", "2")],
        );
        assert_eq!(contents(&store), vec![("a.py".to_string(), "2".to_string())]);
    }

    #[test]
    fn delete_then_create_in_same_batch_gets_fresh_identity() {
        let seed = WorkspaceFile::new("a.py", "1");
        let old_id = seed.id.clone();
        let mut store = FileStore::from_files(vec![seed]);

        let outcomes = apply_batch(
            &mut store,
            &[EditAction::delete("a.py"), EditAction::create("a.py", "2")],
        );

        assert_eq!(outcomes[1].effect, OutcomeEffect::Created);
        let file = store.find_by_name("a.py").expect("file");
        assert_ne!(file.id, old_id);
        assert_eq!(file.content, "2");
    }

    #[test]
    fn names_stay_unique_across_mixed_batch() {
        let mut store = FileStore::new();
        apply_batch(
            &mut store,
            &[
                EditAction::create("a.py", "1"),
                EditAction::create("b.py", "1"),
                EditAction::create("a.py", "2"),
                EditAction::update("b.py", "3"),
                EditAction::delete("a.py"),
                EditAction::update("a.py", "4"),
                EditAction::create("c.py", ""),
                EditAction::create("c.py", "5"),
            ],
        );

        let names: Vec<&str> = store.names();
        let unique: HashSet<&str> = names.iter().copied().collect();
        assert_eq!(names.len(), unique.len());
        assert_eq!(
            contents(&store),
            vec![
                ("b.py".to_string(), "3".to_string()),
                ("a.py".to_string(), "4".to_string()),
                ("c.py".to_string(), "5".to_string()),
            ]
        );
    }

    #[test]
    fn concrete_update_create_delete_missing_scenario() {
        let mut store = FileStore::from_files(vec![WorkspaceFile::new("main.py", "print(1)")]);

        let outcomes = apply_batch(
            &mut store,
            &[
                EditAction::update("main.py", "print(2)"),
                EditAction::create("utils.py", "def f(): pass"),
                EditAction::delete("missing.py"),
            ],
        );

        assert_eq!(
            contents(&store),
            vec![
                ("main.py".to_string(), "print(2)".to_string()),
                ("utils.py".to_string(), "def f(): pass".to_string()),
            ]
        );
        let effects: Vec<OutcomeEffect> = outcomes.iter().map(|o| o.effect).collect();
        assert_eq!(
            effects,
            vec![
                OutcomeEffect::Updated,
                OutcomeEffect::Created,
                OutcomeEffect::Unchanged,
            ]
        );
    }

    #[test]
    fn changes_coalesce_per_name_last_wins() {
        let mut store = FileStore::from_files(vec![WorkspaceFile::new("gone.py", "x")]);
        let outcomes = apply_batch(
            &mut store,
            &[
                EditAction::create("a.py", "1"),
                EditAction::delete("gone.py"),
                EditAction::update("a.py", "2"),
                EditAction::delete("never.py"),
            ],
        );

        let changes = changes_from_outcomes(&outcomes);
        assert_eq!(changes.len(), 2);
        match &changes[0] {
            FileChange::Upsert(file) => {
                assert_eq!(file.name, "a.py");
                assert_eq!(file.content, "2");
            }
            other => panic!("unexpected change {other:?}"),
        }
        assert_eq!(
            changes[1],
            FileChange::Remove {
                name: "gone.py".to_string()
            }
        );
    }

    #[test]
    fn manual_create_rejects_duplicate_name() {
        let mut store = FileStore::new();
        create_file(&mut store, "a.py", "1".to_string()).expect("create");
        assert_eq!(
            create_file(&mut store, "a.py", "2".to_string()),
            Err(WorkspaceError::NameTaken("a.py".to_string()))
        );
        assert_eq!(
            create_file(&mut store, "  ", String::new()),
            Err(WorkspaceError::EmptyName)
        );
    }

    #[test]
    fn rename_onto_other_file_is_rejected() {
        let mut store = FileStore::new();
        let a = create_file(&mut store, "a.py", "1".to_string()).expect("a");
        create_file(&mut store, "b.py", "2".to_string()).expect("b");

        assert_eq!(
            rename_file(&mut store, &a.id, "b.py"),
            Err(WorkspaceError::NameTaken("b.py".to_string()))
        );
        let (previous, renamed) = rename_file(&mut store, &a.id, "a.rs").expect("rename");
        assert_eq!(previous, "a.py");
        assert_eq!(renamed.language, "rust");
    }

    #[test]
    fn batch_names_are_normalized_before_lookup() {
        let mut store = FileStore::from_files(vec![WorkspaceFile::new("main.py", "1")]);

        let outcomes = apply_batch(
            &mut store,
            &[
                EditAction::update("./main.py", "2"),
                EditAction::create("win\\util.py", "3"),
                EditAction::create("notes/", "todo"),
                EditAction::delete("/win/util.py"),
            ],
        );

        let effects: Vec<OutcomeEffect> = outcomes.iter().map(|o| o.effect).collect();
        assert_eq!(
            effects,
            vec![
                OutcomeEffect::Updated,
                OutcomeEffect::Created,
                OutcomeEffect::Unchanged,
                OutcomeEffect::Deleted,
            ]
        );
        assert_eq!(contents(&store), vec![("main.py".to_string(), "2".to_string())]);
    }

    #[test]
    fn manual_names_use_the_stored_spelling() {
        let mut store = FileStore::new();
        let created = create_file(&mut store, "./src\\app.py", String::new()).expect("create");
        assert_eq!(created.name, "src/app.py");
        assert_eq!(
            create_file(&mut store, "src/app.py", String::new()),
            Err(WorkspaceError::NameTaken("src/app.py".to_string()))
        );
        assert_eq!(
            create_file(&mut store, "notes/", String::new()),
            Err(WorkspaceError::NotAFileName("notes/".to_string()))
        );
        assert_eq!(
            rename_file(&mut store, &created.id, "./"),
            Err(WorkspaceError::NotAFileName("./".to_string()))
        );
        let (_, renamed) = rename_file(&mut store, &created.id, "/app.py").expect("rename");
        assert_eq!(renamed.name, "app.py");
    }

    #[test]
    fn import_skips_directory_names() {
        let mut store = FileStore::new();
        let imported = vec![
            ImportedFile {
                name: "./a.py".to_string(),
                content: "1".to_string(),
            },
            ImportedFile {
                name: "docs/".to_string(),
                content: String::new(),
            },
        ];

        let outcomes = import_files(&mut store, &imported);

        assert_eq!(outcomes.len(), 1);
        assert_eq!(contents(&store), vec![("a.py".to_string(), "1".to_string())]);
    }
}
