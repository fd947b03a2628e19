//! Applies a [`MigrationPlan`] to a workspace: sets `data.hidden` on page
//! layouts, deletes the legacy files and unregisters them from `Program.cs`.
//! Every touched file is staged.

use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::error::{MigrationError, Result};
use crate::oracle::{MigrationPlan, PageChange};
use crate::scanner::{walk_files, BUILD_OUTPUT_DIRS, LEGACY_MARKER};
use crate::workspace::{Vcs, Workspace};

/// A plan that has been written to the workspace and staged.
#[derive(Debug, Clone)]
pub struct AppliedMigration {
    /// Layout files that gained a hidden expression.
    pub layouts: Vec<PathBuf>,
    /// Legacy files deleted.
    pub retired: Vec<PathBuf>,
    /// Whether the entry file lost any registration lines.
    pub entry_file_changed: bool,
}

pub struct Applier<'a, V: Vcs + ?Sized> {
    workspace: &'a Workspace,
    vcs: &'a V,
}

impl<'a, V: Vcs + ?Sized> Applier<'a, V> {
    pub fn new(workspace: &'a Workspace, vcs: &'a V) -> Self {
        Self { workspace, vcs }
    }

    /// Apply every change in `plan`, then retire its legacy files.
    ///
    /// Stops at the first failure; nothing has been committed at that point.
    pub fn apply_plan(&self, plan: MigrationPlan) -> Result<AppliedMigration> {
        let mut layouts = Vec::with_capacity(plan.changes().len());
        for change in plan.changes() {
            layouts.push(self.apply(change)?);
        }

        let mut retired = Vec::with_capacity(plan.legacy_files().len());
        for file in plan.legacy_files() {
            let path = self.workspace.root().join(file);
            self.retire_legacy_file(&path)?;
            retired.push(file.clone());
        }

        let entry_file_changed = self.strip_registration(&self.workspace.entry_file())?;

        Ok(AppliedMigration {
            layouts,
            retired,
            entry_file_changed,
        })
    }

    /// Merge `change.hidden` into the `data` object of the page's layout.
    /// Returns the layout path relative to the workspace.
    pub fn apply(&self, change: &PageChange) -> Result<PathBuf> {
        let path = self.resolve_page(&change.page)?;
        let absolute = self.workspace.root().join(&path);

        let content = std::fs::read_to_string(&absolute)?;
        let mut layout: Value = serde_json::from_str(&content)?;
        set_hidden(&mut layout, change.hidden.clone())
            .ok_or_else(|| MigrationError::Layout(path.clone()))?;

        let mut rendered = serde_json::to_string_pretty(&layout)?;
        rendered.push('\n');
        std::fs::write(&absolute, rendered)?;
        self.vcs.stage(self.workspace, &path)?;

        tracing::info!(page = %change.page, layout = %path.display(), "Updated hidden expression");
        Ok(path)
    }

    /// The one layout file named `<page>.json` outside build output.
    pub fn resolve_page(&self, page: &str) -> Result<PathBuf> {
        let suffix = format!("/{}.json", page);
        let mut candidates: Vec<PathBuf> = walk_files(self.workspace.root())?
            .into_iter()
            .map(|path| self.workspace.relative(&path).to_path_buf())
            .filter(|relative| {
                let normalized = format!("/{}", relative.to_string_lossy().replace('\\', "/"));
                normalized.ends_with(&suffix) && !is_build_output(relative)
            })
            .collect();
        candidates.sort();

        match candidates.len() {
            0 => Err(MigrationError::Unresolved(page.to_string())),
            1 => Ok(candidates.remove(0)),
            _ => Err(MigrationError::Ambiguous {
                page: page.to_string(),
                candidates,
            }),
        }
    }

    /// Delete `path` and stage the deletion.
    pub fn retire_legacy_file(&self, path: &Path) -> Result<()> {
        std::fs::remove_file(path)?;
        self.vcs.stage(self.workspace, path)?;
        tracing::info!(file = %self.workspace.relative(path).display(), "Deleted legacy file");
        Ok(())
    }

    /// Drop `IPageOrder` registrations from the entry file and stage it.
    /// Returns whether anything was removed; a missing entry file is left alone.
    ///
    /// Fails without writing when the marker survives stripping, since the
    /// implementations it would refer to are already deleted.
    pub fn strip_registration(&self, entry_file: &Path) -> Result<bool> {
        if !entry_file.is_file() {
            tracing::warn!(path = %entry_file.display(), "Entry file not found, no registrations to strip");
            return Ok(false);
        }

        let content = std::fs::read_to_string(entry_file)?;
        let stripped = strip_registration_lines(&content);
        if stripped.contains(LEGACY_MARKER) {
            return Err(MigrationError::LingeringRegistration(
                self.workspace.relative(entry_file).to_path_buf(),
            ));
        }
        let changed = stripped != content;
        if changed {
            std::fs::write(entry_file, &stripped)?;
        }
        self.vcs.stage(self.workspace, entry_file)?;
        Ok(changed)
    }
}

fn is_build_output(relative: &Path) -> bool {
    relative.components().any(|component| match component {
        Component::Normal(name) => BUILD_OUTPUT_DIRS.iter().any(|dir| name == *dir),
        _ => false,
    })
}

/// Set `data.hidden`, creating `data` when absent. `None` when the layout or
/// its `data` is not an object.
fn set_hidden(layout: &mut Value, hidden: Value) -> Option<()> {
    let root = layout.as_object_mut()?;
    let data = root
        .entry("data")
        .or_insert_with(|| Value::Object(Map::new()));
    if data.is_null() {
        *data = Value::Object(Map::new());
    }
    data.as_object_mut()?.insert("hidden".to_string(), hidden);
    Some(())
}

fn registration_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?i)\bservices\s*\.\s*Add(?:Transient|Scoped|Singleton)\s*(?:<\s*IPageOrder\s*[,>]|\(\s*typeof\s*\(\s*IPageOrder\s*\))",
        )
        .expect("registration pattern is valid")
    })
}

/// Remove every line registering an `IPageOrder` implementation, keeping all
/// other lines and their line endings intact.
///
/// Recognised on any `services`/`Services` receiver:
/// `AddX<IPageOrder, Impl>()`, `AddX<IPageOrder>(factory)` and
/// `AddX(typeof(IPageOrder), typeof(Impl))`.
pub fn strip_registration_lines(content: &str) -> String {
    content
        .split_inclusive('\n')
        .filter(|line| !registration_pattern().is_match(line))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::models::Repository;

    #[derive(Default)]
    struct RecordingVcs {
        staged: std::sync::Mutex<Vec<PathBuf>>,
    }

    impl Vcs for RecordingVcs {
        fn ensure_cloned(&self, _: &Repository, _: &Workspace) -> Result<()> {
            Ok(())
        }
        fn checkout(&self, _: &Workspace, _: &str) -> Result<()> {
            Ok(())
        }
        fn create_branch(&self, _: &Workspace, _: &str) -> Result<()> {
            Ok(())
        }
        fn pull(&self, _: &Workspace) -> Result<()> {
            Ok(())
        }
        fn stage(&self, ws: &Workspace, path: &Path) -> Result<()> {
            self.staged
                .lock()
                .unwrap()
                .push(ws.relative(path).to_path_buf());
            Ok(())
        }
        fn commit(&self, _: &Workspace, _: &str) -> Result<()> {
            Ok(())
        }
        fn push(&self, _: &Workspace) -> Result<()> {
            Ok(())
        }
    }

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn change(page: &str, hidden: Value) -> PageChange {
        PageChange {
            page: page.into(),
            hidden,
        }
    }

    #[test]
    fn test_apply_merges_hidden_into_data() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "App/ui/layouts/Page1.json",
            r#"{"$schema": "layout.schema.v1.json", "data": {"layout": []}}"#,
        );
        let ws = Workspace::new(dir.path());
        let vcs = RecordingVcs::default();
        let applier = Applier::new(&ws, &vcs);

        let hidden = serde_json::json!(["equals", ["dataModel", "funeral.isDead"], true]);
        let path = applier.apply(&change("Page1", hidden.clone())).unwrap();

        assert_eq!(path, PathBuf::from("App/ui/layouts/Page1.json"));
        let layout: Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join(&path)).unwrap()).unwrap();
        assert_eq!(layout["data"]["hidden"], hidden);
        assert_eq!(layout["data"]["layout"], serde_json::json!([]));
        assert_eq!(layout["$schema"], "layout.schema.v1.json");
        assert_eq!(*vcs.staged.lock().unwrap(), vec![path]);
    }

    #[test]
    fn test_apply_creates_missing_data() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "App/ui/Page1.json", r#"{}"#);
        let ws = Workspace::new(dir.path());
        let vcs = RecordingVcs::default();

        Applier::new(&ws, &vcs)
            .apply(&change("Page1", Value::Bool(true)))
            .unwrap();

        let layout: Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join("App/ui/Page1.json")).unwrap())
                .unwrap();
        assert_eq!(layout["data"]["hidden"], Value::Bool(true));
    }

    #[test]
    fn test_non_object_data_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "App/ui/Page1.json", r#"{"data": [1]}"#);
        let ws = Workspace::new(dir.path());
        let vcs = RecordingVcs::default();

        let err = Applier::new(&ws, &vcs)
            .apply(&change("Page1", Value::Bool(true)))
            .unwrap_err();
        assert_eq!(err.code(), "layout");
        assert!(vcs.staged.lock().unwrap().is_empty());
    }

    #[test]
    fn test_resolve_ignores_build_output() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "App/ui/layouts/Page1.json", "{}");
        write(dir.path(), "App/bin/Debug/ui/layouts/Page1.json", "{}");
        write(dir.path(), "App/obj/Page1.json", "{}");
        write(dir.path(), "App/ui/layouts/MyPage1.json", "{}");
        let ws = Workspace::new(dir.path());
        let vcs = RecordingVcs::default();

        let path = Applier::new(&ws, &vcs).resolve_page("Page1").unwrap();
        assert_eq!(path, PathBuf::from("App/ui/layouts/Page1.json"));
    }

    #[test]
    fn test_resolve_fails_on_zero_matches() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "App/ui/layouts/Page1.json", "{}");
        let ws = Workspace::new(dir.path());
        let vcs = RecordingVcs::default();

        let err = Applier::new(&ws, &vcs).resolve_page("Page2").unwrap_err();
        assert!(matches!(err, MigrationError::Unresolved(ref page) if page == "Page2"));
    }

    #[test]
    fn test_resolve_fails_on_multiple_matches() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "App/ui/form/layouts/Page1.json", "{}");
        write(dir.path(), "App/ui/receipt/layouts/Page1.json", "{}");
        let ws = Workspace::new(dir.path());
        let vcs = RecordingVcs::default();

        let err = Applier::new(&ws, &vcs).resolve_page("Page1").unwrap_err();
        match err {
            MigrationError::Ambiguous { candidates, .. } => assert_eq!(candidates.len(), 2),
            other => panic!("expected ambiguity, got {:?}", other),
        }
        // Nothing was written or staged.
        assert!(vcs.staged.lock().unwrap().is_empty());
    }

    #[test]
    fn test_strip_registration_lines_keeps_everything_else() {
        let program = "var builder = WebApplication.CreateBuilder(args);\r\n\
                       services.AddTransient<IPageOrder, PageOrder>();\r\n\
                       services.AddTransient<IInstantiationProcessor, Instantiation>();\r\n\
                       \tservices.AddSingleton<IPageOrder,Other>();\n\
                       // end";
        let stripped = strip_registration_lines(program);
        assert_eq!(
            stripped,
            "var builder = WebApplication.CreateBuilder(args);\r\n\
             services.AddTransient<IInstantiationProcessor, Instantiation>();\r\n\
             // end"
        );
    }

    #[test]
    fn test_strips_registration_on_services_property() {
        let program = "var builder = WebApplication.CreateBuilder(args);\n\
                       builder.Services.AddTransient<IPageOrder, PageOrder>();\n\
                       builder.Services.AddScoped<IPageOrderValidator, Validator>();\n";
        assert_eq!(
            strip_registration_lines(program),
            "var builder = WebApplication.CreateBuilder(args);\n\
             builder.Services.AddScoped<IPageOrderValidator, Validator>();\n"
        );
    }

    #[test]
    fn test_strips_factory_registration() {
        let program = "services.AddTransient<IPageOrder>(sp => new PageOrder());\nother();\n";
        assert_eq!(strip_registration_lines(program), "other();\n");
    }

    #[test]
    fn test_strips_typeof_registration() {
        let program = "services.AddTransient(typeof(IPageOrder), typeof(PageOrder));\n\
                       services.AddSingleton( typeof( IPageOrder ), typeof(Other));\n\
                       other();\n";
        assert_eq!(strip_registration_lines(program), "other();\n");
    }

    #[test]
    fn test_lingering_marker_fails_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let program = "services.AddTransient<IPageOrder, P>();\n\
                       services.TryAddTransient<IPageOrder, Q>();\n";
        write(dir.path(), "App/Program.cs", program);
        let ws = Workspace::new(dir.path());
        let vcs = RecordingVcs::default();

        let err = Applier::new(&ws, &vcs)
            .strip_registration(&ws.entry_file())
            .unwrap_err();

        assert!(
            matches!(err, MigrationError::LingeringRegistration(ref path) if path == Path::new("App/Program.cs"))
        );
        assert_eq!(fs::read_to_string(ws.entry_file()).unwrap(), program);
        assert!(vcs.staged.lock().unwrap().is_empty());
    }

    #[test]
    fn test_retire_and_strip_stage_files() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "App/logic/PageOrder.cs", "class P : IPageOrder {}");
        write(
            dir.path(),
            "App/Program.cs",
            "services.AddTransient<IPageOrder, P>();\nother();\n",
        );
        let ws = Workspace::new(dir.path());
        let vcs = RecordingVcs::default();
        let applier = Applier::new(&ws, &vcs);

        applier
            .retire_legacy_file(&dir.path().join("App/logic/PageOrder.cs"))
            .unwrap();
        assert!(applier.strip_registration(&ws.entry_file()).unwrap());

        assert!(!dir.path().join("App/logic/PageOrder.cs").exists());
        assert_eq!(
            fs::read_to_string(ws.entry_file()).unwrap(),
            "other();\n"
        );
        assert_eq!(
            *vcs.staged.lock().unwrap(),
            vec![
                PathBuf::from("App/logic/PageOrder.cs"),
                PathBuf::from("App/Program.cs")
            ]
        );
    }
}
