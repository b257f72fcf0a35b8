//! Document discovery and loading.
//!
//! Walks a documents directory, keeps files matching the configured include
//! globs (minus excludes), reads them as UTF-8 text and chunks them into a
//! corpus. Each document's `doc_id` is its path relative to the root.
//!
//! Files are visited in sorted path order so the same directory always yields
//! the same corpus order.

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

use crate::chunk::chunk_text;
use crate::config::ChunkingConfig;
use crate::error::{IoContext, RagError, Result};
use crate::models::Chunk;

/// A source document read from disk.
#[derive(Debug, Clone)]
pub struct Document {
    pub doc_id: String,
    pub path: PathBuf,
    pub body: String,
}

/// Find and read every matching document under `root`.
pub fn scan_documents(root: &Path, config: &ChunkingConfig) -> Result<Vec<Document>> {
    if !root.is_dir() {
        return Err(RagError::validation(format!(
            "documents directory does not exist: {}",
            root.display()
        )));
    }

    let filter = DocumentFilter::new(config)?;
    let mut docs = Vec::new();

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            match e.into_io_error() {
                Some(source) => RagError::Io { path, source },
                None => RagError::validation(format!("filesystem loop at {}", path.display())),
            }
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().replace('\\', "/");

        if !filter.accepts(&rel_str) {
            continue;
        }

        let bytes = std::fs::read(path).at(path)?;
        if let Some(doc) = Document::from_bytes(rel_str, path, bytes) {
            docs.push(doc);
        }
    }

    Ok(docs)
}

/// Include/exclude rules applied to paths relative to a documents root.
///
/// Hidden files and anything under `.git` are always excluded.
pub struct DocumentFilter {
    include: GlobSet,
    exclude: GlobSet,
}

impl DocumentFilter {
    pub fn new(config: &ChunkingConfig) -> Result<Self> {
        let mut excludes = vec!["**/.git/**".to_string(), "**/.*".to_string()];
        excludes.extend(config.exclude_globs.iter().cloned());
        Ok(Self {
            include: build_globset(&config.include_globs)?,
            exclude: build_globset(&excludes)?,
        })
    }

    /// `relative` uses `/` separators.
    pub fn accepts(&self, relative: &str) -> bool {
        !self.exclude.is_match(relative) && self.include.is_match(relative)
    }
}

impl Document {
    /// Wrap file contents; non-UTF-8 content is skipped with a warning.
    pub fn from_bytes(doc_id: String, path: &Path, bytes: Vec<u8>) -> Option<Self> {
        match String::from_utf8(bytes) {
            Ok(body) => Some(Self {
                doc_id,
                path: path.to_path_buf(),
                body,
            }),
            Err(_) => {
                tracing::warn!(path = %path.display(), "skipping non-UTF-8 document");
                None
            }
        }
    }
}

/// Chunk `docs` in order.
pub fn chunk_documents(docs: &[Document], config: &ChunkingConfig) -> Vec<Chunk> {
    let mut corpus = Vec::new();
    for doc in docs {
        let chunks = chunk_text(&doc.doc_id, &doc.body, config.chunk_words, config.overlap_words);
        tracing::debug!(doc_id = %doc.doc_id, chunks = chunks.len(), "chunked document");
        corpus.extend(chunks);
    }
    corpus
}

/// Scan `root` and chunk every document, in document order.
pub fn load_corpus(root: &Path, config: &ChunkingConfig) -> Result<Vec<Chunk>> {
    let docs = scan_documents(root, config)?;
    let corpus = chunk_documents(&docs, config);
    tracing::info!(
        root = %root.display(),
        documents = docs.len(),
        chunks = corpus.len(),
        "loaded corpus"
    );
    Ok(corpus)
}

/// Resolve `filename` inside `dir`, refusing anything that would escape it.
pub fn resolve_in_dir(dir: &Path, filename: &str) -> Result<PathBuf> {
    let rel = Path::new(filename);
    let safe = !filename.is_empty()
        && rel
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if !safe {
        return Err(RagError::validation(format!("invalid filename '{}'", filename)));
    }
    Ok(dir.join(rel))
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| RagError::validation(format!("invalid glob '{}': {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| RagError::validation(format!("invalid glob set: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn setup() -> TempDir {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("hr")).unwrap();
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::write(root.join("b.txt"), "beta document").unwrap();
        fs::write(root.join("a.md"), "alpha document").unwrap();
        fs::write(root.join("hr/leave.txt"), "annual leave policy").unwrap();
        fs::write(root.join("image.png"), [0u8, 159, 146, 150]).unwrap();
        fs::write(root.join(".git/config.txt"), "ignored").unwrap();
        tmp
    }

    #[test]
    fn test_scan_sorted_and_filtered() {
        let tmp = setup();
        let docs = scan_documents(tmp.path(), &ChunkingConfig::default()).unwrap();
        let ids: Vec<&str> = docs.iter().map(|d| d.doc_id.as_str()).collect();
        assert_eq!(ids, vec!["a.md", "b.txt", "hr/leave.txt"]);
    }

    #[test]
    fn test_exclude_globs() {
        let tmp = setup();
        let config = ChunkingConfig {
            exclude_globs: vec!["hr/**".to_string()],
            ..ChunkingConfig::default()
        };
        let docs = scan_documents(tmp.path(), &config).unwrap();
        assert_eq!(docs.len(), 2);
    }

    #[test]
    fn test_load_corpus() {
        let tmp = setup();
        let corpus = load_corpus(tmp.path(), &ChunkingConfig::default()).unwrap();
        assert_eq!(corpus.len(), 3);
        assert_eq!(corpus[2].doc_id, "hr/leave.txt");
        assert_eq!(corpus[2].text, "annual leave policy");
    }

    #[test]
    fn test_resolve_rejects_traversal() {
        let dir = Path::new("/srv/docs");
        assert!(resolve_in_dir(dir, "../etc/passwd").is_err());
        assert!(resolve_in_dir(dir, "/etc/passwd").is_err());
        assert!(resolve_in_dir(dir, "").is_err());
        assert_eq!(
            resolve_in_dir(dir, "hr/policy.txt").unwrap(),
            PathBuf::from("/srv/docs/hr/policy.txt")
        );
    }

    #[test]
    fn test_filter_matches_scan_rules() {
        let filter = DocumentFilter::new(&ChunkingConfig::default()).unwrap();
        assert!(filter.accepts("policy.txt"));
        assert!(filter.accepts("hr/leave.md"));
        assert!(!filter.accepts("image.png"));
        assert!(!filter.accepts(".hidden.txt"));
        assert!(!filter.accepts(".git/notes.txt"));
    }

    #[test]
    fn test_non_utf8_document_is_skipped() {
        let path = Path::new("x.txt");
        assert!(Document::from_bytes("x.txt".into(), path, vec![0xff, 0xfe]).is_none());
        let doc = Document::from_bytes("x.txt".into(), path, b"plain".to_vec()).unwrap();
        assert_eq!(doc.body, "plain");
    }

    #[test]
    fn test_missing_root() {
        let err = scan_documents(Path::new("/no/such/docs"), &ChunkingConfig::default()).unwrap_err();
        assert!(matches!(err, RagError::Validation(_)));
    }
}
