//! Finds `IPageOrder` implementations and the data model vocabulary in a
//! materialised workspace.

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::Result;
use crate::models::{DataModelVocabulary, LegacyLogicFile};
use crate::workspace::{Workspace, ENTRY_FILE};

/// Marker that identifies a file implementing the legacy ordering contract.
pub const LEGACY_MARKER: &str = "IPageOrder";
/// Directories holding build output; never scanned or rewritten.
pub const BUILD_OUTPUT_DIRS: &[&str] = &["bin", "obj"];

const MODELS_DIR: &str = "models";
const METADATA_SUFFIX: &str = ".metadata.json";

/// Result of scanning one workspace.
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    pub legacy_files: Vec<LegacyLogicFile>,
    pub vocabulary: DataModelVocabulary,
}

impl ScanReport {
    /// No legacy files means the repository needs no migration.
    pub fn is_empty(&self) -> bool {
        self.legacy_files.is_empty()
    }
}

/// Scan the workspace's app project.
pub fn scan(workspace: &Workspace) -> Result<ScanReport> {
    let project = workspace.project_dir();
    if !project.is_dir() {
        tracing::info!(path = %project.display(), "No app project in repository");
        return Ok(ScanReport::default());
    }

    let mut legacy_files = Vec::new();
    for path in find_legacy_files(&project)? {
        let source = String::from_utf8_lossy(&std::fs::read(&path)?).into_owned();
        legacy_files.push(LegacyLogicFile {
            path: workspace.relative(&path).to_path_buf(),
            source,
        });
    }

    let vocabulary = extract_vocabulary(&project);
    tracing::info!(
        legacy_files = legacy_files.len(),
        vocabulary = vocabulary.len(),
        "Scanned workspace"
    );

    Ok(ScanReport {
        legacy_files,
        vocabulary,
    })
}

/// C# files under `root` mentioning [`LEGACY_MARKER`], excluding build output
/// and the composition root. Sorted by path.
pub fn find_legacy_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for path in walk_files(root)? {
        let is_source = path.extension().is_some_and(|ext| ext == "cs");
        let is_entry = path.file_name().is_some_and(|name| name == ENTRY_FILE);
        if !is_source || is_entry {
            continue;
        }
        let content = std::fs::read(&path)?;
        if String::from_utf8_lossy(&content).contains(LEGACY_MARKER) {
            found.push(path);
        }
    }
    found.sort();
    Ok(found)
}

/// Valid `dataModel` paths declared in `<project>/models/*.metadata.json`.
///
/// The first element key of each metadata file names the root type; it is
/// dropped and stripped from the remaining keys. Unreadable or malformed
/// files contribute nothing.
pub fn extract_vocabulary(project: &Path) -> DataModelVocabulary {
    let mut vocabulary = DataModelVocabulary::new();
    let models = project.join(MODELS_DIR);

    let entries = match std::fs::read_dir(&models) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(path = %models.display(), error = %e, "Could not read models directory");
            return vocabulary;
        }
    };

    let mut metadata_files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.ends_with(METADATA_SUFFIX))
        })
        .collect();
    metadata_files.sort();

    for path in metadata_files {
        match read_metadata_paths(&path) {
            Ok(paths) => vocabulary.extend(paths),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable model metadata");
            }
        }
    }
    vocabulary
}

fn read_metadata_paths(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)?;
    let metadata: Value = serde_json::from_str(&content)?;
    Ok(metadata_paths(&metadata))
}

fn metadata_paths(metadata: &Value) -> Vec<String> {
    let Some(elements) = metadata
        .get("Elements")
        .or_else(|| metadata.get("elements"))
        .and_then(Value::as_object)
    else {
        return vec![];
    };

    let mut keys = elements.keys();
    let Some(root) = keys.next() else {
        return vec![];
    };
    let prefix = format!("{}.", root);

    keys.map(|key| key.strip_prefix(&prefix).unwrap_or(key).to_string())
        .collect()
}

/// Every regular file below `root`, skipping `.git` and build output.
pub(crate) fn walk_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                let name = entry.file_name();
                let skip = name == ".git"
                    || BUILD_OUTPUT_DIRS.iter().any(|dir| name == *dir);
                if !skip {
                    pending.push(path);
                }
            } else if file_type.is_file() {
                files.push(path);
            }
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_finds_page_order_implementations_only() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "logic/PageOrder.cs", "class A : IPageOrder {}");
        write(root, "logic/Other.cs", "class B {}");
        write(root, "Program.cs", "services.AddTransient<IPageOrder, A>();");
        write(root, "bin/Debug/PageOrder.cs", "class A : IPageOrder {}");
        write(root, "obj/PageOrder.cs", "class A : IPageOrder {}");
        write(root, "notes.txt", "IPageOrder");

        let found = find_legacy_files(root).unwrap();
        assert_eq!(found, vec![root.join("logic/PageOrder.cs")]);
    }

    #[test]
    fn test_vocabulary_strips_root_type() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "models/model.metadata.json",
            r#"{"Elements": {"Skjema": {}, "Skjema.funeral.isDead": {}, "Skjema.person.age": {}}}"#,
        );

        let vocabulary = extract_vocabulary(dir.path());
        assert_eq!(vocabulary.paths(), &["funeral.isDead", "person.age"]);
    }

    #[test]
    fn test_vocabulary_accepts_lowercase_elements() {
        let metadata: Value =
            serde_json::from_str(r#"{"elements": {"Root": {}, "Root.a.b": {}}}"#).unwrap();
        assert_eq!(metadata_paths(&metadata), vec!["a.b"]);
    }

    #[test]
    fn test_broken_metadata_is_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "models/broken.metadata.json", "{ not json");
        write(
            dir.path(),
            "models/good.metadata.json",
            r#"{"Elements": {"M": {}, "M.x": {}}}"#,
        );

        let vocabulary = extract_vocabulary(dir.path());
        assert_eq!(vocabulary.paths(), &["x"]);
    }

    #[test]
    fn test_missing_models_dir_gives_empty_vocabulary() {
        let dir = tempfile::tempdir().unwrap();
        assert!(extract_vocabulary(dir.path()).is_empty());
    }

    #[test]
    fn test_scan_reports_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "App/logic/Tracks.cs", "IPageOrder");
        let report = scan(&Workspace::new(dir.path())).unwrap();
        assert_eq!(report.legacy_files.len(), 1);
        assert_eq!(report.legacy_files[0].path, PathBuf::from("App/logic/Tracks.cs"));
        assert!(!report.is_empty());
    }
}
