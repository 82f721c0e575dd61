//! Knowledge-base directory scanning.

use std::fs;
use std::path::Path;

use walkdir::WalkDir;

use crate::error::{AppError, AppResult};
use crate::splitter::SourceDocument;

/// Default file extensions treated as knowledge-base text.
pub const DEFAULT_EXTENSIONS: &[&str] = &["txt"];

/// Recursively reads every text file under `root`.
///
/// Files that are unreadable, not valid UTF-8, or empty after trimming are
/// logged and skipped. Finding no usable document at all is an error so that
/// callers never build an empty index.
pub fn ingest_directory(root: &Path, extensions: &[String]) -> AppResult<Vec<SourceDocument>> {
    if !root.is_dir() {
        return Err(AppError::Ingestion(format!(
            "knowledge base directory {} does not exist",
            root.display()
        )));
    }

    let mut documents = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!("skipping unreadable entry: {err}");
                continue;
            }
        };
        if !entry.file_type().is_file() || !has_extension(entry.path(), extensions) {
            continue;
        }
        let path = entry.path();
        match fs::read_to_string(path) {
            Ok(raw) => {
                let content = raw.trim();
                if content.is_empty() {
                    tracing::info!(path = %path.display(), "skipped empty document");
                    continue;
                }
                tracing::debug!(path = %path.display(), chars = content.len(), "added document");
                documents.push(SourceDocument::new(content, path.display().to_string()));
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), "error reading document: {err}");
            }
        }
    }

    if documents.is_empty() {
        return Err(AppError::Ingestion(format!(
            "no documents found under {}",
            root.display()
        )));
    }
    tracing::info!(count = documents.len(), "ingested knowledge-base documents");
    Ok(documents)
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            extensions
                .iter()
                .any(|allowed| allowed.trim().trim_start_matches('.').eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn txt() -> Vec<String> {
        DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn reads_nested_text_files_and_skips_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("nested/deeper")).unwrap();
        fs::write(dir.path().join("a.txt"), "  alpha  \n").unwrap();
        fs::write(dir.path().join("nested/deeper/b.TXT"), "beta").unwrap();
        fs::write(dir.path().join("nested/empty.txt"), "   \n\t").unwrap();
        fs::write(dir.path().join("notes.md"), "ignored").unwrap();
        fs::write(dir.path().join("bad.txt"), [0xff, 0xfe, 0xfd]).unwrap();

        let docs = ingest_directory(dir.path(), &txt()).expect("ingest");

        let contents: Vec<_> = docs.iter().map(|d| d.content.as_str()).collect();
        assert_eq!(contents, vec!["alpha", "beta"]);
        assert!(docs[1].source_id.ends_with("b.TXT"));
    }

    #[test]
    fn extension_list_tolerates_spaces_and_dots() {
        let allowed = vec!["txt".to_string(), " .md ".to_string()];
        assert!(has_extension(Path::new("kb/notes.md"), &allowed));
        assert!(has_extension(Path::new("kb/a.TXT"), &allowed));
        assert!(!has_extension(Path::new("kb/slides.pdf"), &allowed));
        assert!(!has_extension(Path::new("kb/README"), &allowed));
    }

    #[test]
    fn empty_directory_is_an_ingestion_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ingest_directory(dir.path(), &txt()).unwrap_err();
        assert_eq!(err.kind(), "ingestion");
    }

    #[test]
    fn missing_directory_is_an_ingestion_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ingest_directory(&dir.path().join("absent"), &txt()).unwrap_err();
        assert!(matches!(err, AppError::Ingestion(_)));
    }
}
