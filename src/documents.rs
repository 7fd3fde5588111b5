//! Document reader.
//!
//! Scans one directory (not recursively) for files whose name ends with a
//! suffix, parses each file's front matter, and returns the documents in
//! filename order. Documents are content-addressed, so two files with the
//! same text collapse into one; the first file in filename order wins.

use anyhow::{bail, Context, Result};
use std::collections::HashSet;
use std::path::Path;
use walkdir::WalkDir;

use rag_eval_core::frontmatter::parse_document;
use rag_eval_core::models::Document;

pub fn read_documents(folder: &Path, suffix: &str) -> Result<Vec<Document>> {
    if !folder.is_dir() {
        bail!("Document folder does not exist: {}", folder.display());
    }

    let mut paths = Vec::new();
    for entry in WalkDir::new(folder).min_depth(1).max_depth(1) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if name.ends_with(suffix) {
            paths.push(entry.into_path());
        }
    }

    // Sort for deterministic ordering
    paths.sort();

    let mut seen = HashSet::new();
    let mut docs = Vec::new();
    for path in &paths {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read document: {}", path.display()))?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let doc = parse_document(&raw, &filename)?;

        if seen.insert(doc.id.clone()) {
            docs.push(doc);
        } else {
            tracing::debug!(file = %filename, "skipping duplicate document content");
        }
    }

    tracing::info!(
        folder = %folder.display(),
        files = paths.len(),
        documents = docs.len(),
        "read documents"
    );
    Ok(docs)
}

#[cfg(test)]
mod tests {
    use super::*;

    const POST: &str = "---\ntitle: First\ndate: 2023-07\nurl: https://example.com/first\n---\nBody one.\n";

    fn write(dir: &Path, name: &str, content: &str) {
        std::fs::write(dir.join(name), content).unwrap();
    }

    #[test]
    fn test_reads_matching_files_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "b.md", &POST.replace("Body one.", "Body two."));
        write(dir.path(), "a.md", POST);
        write(dir.path(), "notes.txt", "ignored");
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        write(&dir.path().join("nested"), "c.md", POST);

        let docs = read_documents(dir.path(), ".md").unwrap();
        let names: Vec<&str> = docs.iter().map(|d| d.filename.as_str()).collect();
        assert_eq!(names, ["a.md", "b.md"]);
        assert_eq!(docs[0].metadata.title, "First");
    }

    #[test]
    fn test_duplicate_content_collapses() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.md", POST);
        write(dir.path(), "copy.md", POST);
        let docs = read_documents(dir.path(), ".md").unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].filename, "a.md");
    }

    #[test]
    fn test_bad_date_fails_with_filename() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "bad.md", &POST.replace("2023-07", "July 2023"));
        let err = read_documents(dir.path(), ".md").unwrap_err();
        let msg = format!("{:#}", err);
        assert!(msg.contains("bad.md"), "{}", msg);
        assert!(msg.contains("Date format must be YYYY-MM"), "{}", msg);
    }

    #[test]
    fn test_missing_folder() {
        let err = read_documents(Path::new("/definitely/not/here"), ".md").unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }
}
