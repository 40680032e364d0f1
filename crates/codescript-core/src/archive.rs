use std::io::Cursor;
use std::io::Read;
use std::io::Write;

use serde::Deserialize;
use serde::Serialize;
use zip::write::SimpleFileOptions;
use zip::CompressionMethod;
use zip::ZipArchive;
use zip::ZipWriter;

use super::error::ArchiveError;
use super::state::normalize_file_name;
use super::state::WorkspaceFile;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportedFile {
    pub name: String,
    pub content: String,
}

pub fn export_archive(files: &[WorkspaceFile]) -> Result<Vec<u8>, ArchiveError> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for file in files {
        writer.start_file(file.name.as_str(), options)?;
        writer.write_all(file.content.as_bytes())?;
    }
    let cursor = writer.finish()?;
    Ok(cursor.into_inner())
}

/// Reads every file entry of a zip archive. Directory entries are skipped,
/// names take the store's spelling and entry text is decoded lossily.
pub fn import_archive(bytes: &[u8]) -> Result<Vec<ImportedFile>, ArchiveError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut imported = Vec::with_capacity(archive.len());
    for idx in 0..archive.len() {
        let mut entry = archive.by_index(idx)?;
        if entry.is_dir() {
            continue;
        }
        let Some(name) = normalize_file_name(entry.name()) else {
            tracing::warn!(entry = entry.name(), "skipping archive entry without a file name");
            continue;
        };
        let mut raw = Vec::new();
        entry.read_to_end(&mut raw)?;
        imported.push(ImportedFile {
            name,
            content: String::from_utf8_lossy(&raw).into_owned(),
        });
    }
    Ok(imported)
}

#[cfg(test)]
mod tests {
    use super::export_archive;
    use super::import_archive;
    use crate::actions::EditAction;
    use crate::state::FileStore;
    use crate::state::WorkspaceFile;
    use crate::workspace::apply_batch;
    use crate::workspace::import_files;
    use pretty_assertions::assert_eq;

    #[test]
    fn export_then_import_preserves_names_and_contents() {
        let original = vec![
            WorkspaceFile::new("main.py", "print(1)\n"),
            WorkspaceFile::new("src/lib.rs", "pub fn f() {}\n"),
            WorkspaceFile::new("empty.txt", ""),
        ];

        let bytes = export_archive(&original).expect("export");
        let imported = import_archive(&bytes).expect("import");
        let mut store = FileStore::new();
        import_files(&mut store, &imported);

        let restored: Vec<(String, String)> = store
            .iter()
            .map(|file| (file.name.clone(), file.content.clone()))
            .collect();
        let expected: Vec<(String, String)> = original
            .iter()
            .map(|file| (file.name.clone(), file.content.clone()))
            .collect();
        assert_eq!(restored, expected);
        assert!(store
            .iter()
            .zip(original.iter())
            .all(|(restored, original)| restored.id != original.id));
    }

    #[test]
    fn garbage_bytes_fail_to_import() {
        assert!(import_archive(b"definitely not a zip").is_err());
    }

    #[test]
    fn agent_written_names_survive_a_round_trip() {
        let mut store = FileStore::new();
        apply_batch(
            &mut store,
            &[
                EditAction::create("./main.py", "print(1)\n"),
                EditAction::create("win\\util.py", "def f(): pass\n"),
                EditAction::create("notes/", "todo"),
            ],
        );
        let before: Vec<(String, String)> = store
            .iter()
            .map(|file| (file.name.clone(), file.content.clone()))
            .collect();
        assert_eq!(store.names(), vec!["main.py", "win/util.py"]);

        let bytes = export_archive(store.files()).expect("export");
        let mut restored = FileStore::new();
        import_files(&mut restored, &import_archive(&bytes).expect("import"));

        let after: Vec<(String, String)> = restored
            .iter()
            .map(|file| (file.name.clone(), file.content.clone()))
            .collect();
        assert_eq!(after, before);
    }
}
