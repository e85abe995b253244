use quillapp::commands::chapters::ChapterDraft;
use quillapp::commands::notebooks::NotebookDraft;
use quillapp::commands::notes::NoteDraft;
use quillapp::init::{open, QuillPaths};
use quillapp::platform::Platform;
use quillapp::store::{FsBackend, StoreOptions};
use quillapp::QuillApi;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use walkdir::WalkDir;

fn open_at(dir: &Path) -> QuillApi<FsBackend> {
    let options = StoreOptions {
        platform: Platform::Desktop,
        ..StoreOptions::immediate()
    };
    let api = open(&QuillPaths::at(dir), options);
    assert!(api.initialize().success);
    api
}

fn count_named(root: &Path, name: &str) -> usize {
    WalkDir::new(root.join("notebooks"))
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && e.file_name() == name)
        .count()
}

/// 2 notebooks, 3 chapters, 4 live notes, plus one note in the recycle bin.
fn populate(api: &QuillApi<FsBackend>) {
    let bio = api.create_notebook(NotebookDraft::titled("Biology")).id.unwrap();
    let chem = api.create_notebook(NotebookDraft::titled("Chemistry")).id.unwrap();
    let cells = api.create_chapter(&bio, ChapterDraft::titled("Cells")).id.unwrap();
    let genes = api.create_chapter(&bio, ChapterDraft::titled("Genes")).id.unwrap();
    let bonds = api.create_chapter(&chem, ChapterDraft::titled("Bonds")).id.unwrap();

    for (nb, ch, title) in [
        (&bio, &cells, "Mitosis"),
        (&bio, &cells, "Meiosis"),
        (&bio, &genes, "Alleles"),
        (&chem, &bonds, "Covalent"),
        (&chem, &bonds, "Ionic"),
    ] {
        let draft = NoteDraft {
            title: title.into(),
            content: format!("{} notes", title),
            ..Default::default()
        };
        assert!(api.create_note(nb, ch, draft).success);
    }
    let ionic = api
        .get_notes(&chem, &bonds)
        .into_iter()
        .find(|n| n.title == "Ionic")
        .unwrap();
    assert!(api.soft_delete_note(&chem, &bonds, &ionic.id).success);
}

fn export(api: &QuillApi<FsBackend>, dest: &Path) -> PathBuf {
    let result = api.export_data(dest);
    assert!(result.success, "{:?}", result.error);
    PathBuf::from(result.path.unwrap())
}

#[test]
fn test_restore_rebuilds_tree_from_backup() {
    let source_dir = TempDir::new().unwrap();
    let export_dir = TempDir::new().unwrap();
    let target_dir = TempDir::new().unwrap();

    let source = open_at(source_dir.path());
    populate(&source);
    let backup = export(&source, export_dir.path());

    let target = open_at(target_dir.path());
    let outcome = target.restore_from_backup(Some(&backup));
    assert!(outcome.result.success, "{:?}", outcome.result.error);
    let report = outcome.report.unwrap();

    // N + M + K metadata files, K content files
    assert_eq!(count_named(target_dir.path(), "metadata.json"), 2 + 3 + 4);
    assert_eq!(count_named(target_dir.path(), "content.txt"), 4);
    assert_eq!(report.files_created, 2 + 3 + 4 + 4);
    assert_eq!(report.notebooks_restored, 2);

    let doc = target.get_hierarchy().unwrap();
    let chapters: usize = doc.structure.notebooks.values().map(|n| n.chapters.len()).sum();
    let notes: usize = doc
        .structure
        .notebooks
        .values()
        .flat_map(|n| n.chapters.values())
        .map(|c| c.notes.len())
        .sum();
    assert_eq!(doc.structure.notebooks.len(), 2);
    assert_eq!(chapters, 3);
    assert_eq!(notes, 4);

    // The recycle bin travels with the document
    assert_eq!(target.get_deleted_notes().len(), 1);
    let raw = target.get_raw_hierarchy().unwrap();
    assert!(raw.restored);
    assert_eq!(raw.original_platform.as_deref(), Some("desktop"));
}

#[test]
fn test_restore_keeps_safety_backup_of_previous_data() {
    let source_dir = TempDir::new().unwrap();
    let export_dir = TempDir::new().unwrap();
    let target_dir = TempDir::new().unwrap();

    let source = open_at(source_dir.path());
    populate(&source);
    let backup = export(&source, export_dir.path());

    let target = open_at(target_dir.path());
    target.create_notebook(NotebookDraft::titled("Scratch"));
    let report = target.restore_from_backup(Some(&backup)).report.unwrap();

    let safety = target_dir.path().join(report.safety_backup.unwrap());
    let previous: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(safety).unwrap()).unwrap();
    let titles: Vec<&str> = previous["structure"]["notebooks"]
        .as_object()
        .unwrap()
        .values()
        .map(|nb| nb["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, vec!["Scratch"]);
    assert!(target.get_notebooks().iter().all(|nb| nb.title != "Scratch"));
}

#[test]
fn test_restore_rejects_foreign_json() {
    let target_dir = TempDir::new().unwrap();
    let target = open_at(target_dir.path());
    target.create_notebook(NotebookDraft::titled("Keep me"));

    let foreign = target_dir.path().join("foreign.json");
    fs::write(&foreign, r#"{"notebooks": []}"#).unwrap();
    let outcome = target.restore_from_backup(Some(&foreign));
    assert!(!outcome.result.success);
    assert!(outcome.result.error.unwrap().contains("hierarchy.structure"));
    assert_eq!(target.get_notebooks().len(), 1);
}

#[test]
fn test_archive_export_lists_tree() {
    let source_dir = TempDir::new().unwrap();
    let export_dir = TempDir::new().unwrap();
    let source = open_at(source_dir.path());
    populate(&source);

    let result = source.export_archive(export_dir.path());
    assert!(result.success);
    let path = PathBuf::from(result.path.unwrap());
    assert!(path.extension().is_some_and(|e| e == "gz"));
    assert!(fs::metadata(path).unwrap().len() > 0);
}
