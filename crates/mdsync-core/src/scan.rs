//! Markdown file discovery

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use crate::error::{SyncError, SyncResult};

/// A Markdown file found under the notes directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    /// Path relative to the notes directory, `/`-separated (ledger key)
    pub relative: String,
    pub modified: DateTime<Utc>,
}

impl SourceFile {
    /// Describe a single file under `root`
    pub fn from_path(root: &Path, path: &Path) -> SyncResult<Self> {
        let metadata = std::fs::metadata(path).map_err(|e| SyncError::from_io(e, path))?;
        let modified = metadata
            .modified()
            .map_err(|e| SyncError::from_io(e, path))?;

        Ok(Self {
            path: path.to_path_buf(),
            relative: relative_key(root, path),
            modified: DateTime::<Utc>::from(modified),
        })
    }

    /// File name without extension, used as a fallback title
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Whether a path looks like a Markdown file
pub fn is_markdown(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("md") || ext.eq_ignore_ascii_case("markdown"))
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with('.'))
}

fn relative_key(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// List every Markdown file under `root`, sorted by relative path
///
/// Hidden files and directories are skipped.
pub fn scan_markdown(root: &Path) -> SyncResult<Vec<SourceFile>> {
    if !root.is_dir() {
        return Err(SyncError::Validation(format!(
            "notes directory '{}' does not exist",
            root.display()
        )));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_entry(|e| !is_hidden(e))
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if entry.file_type().is_file() && is_markdown(entry.path()) {
            files.push(SourceFile::from_path(root, entry.path())?);
        }
    }

    files.sort_by(|a, b| a.relative.cmp(&b.relative));
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_scan_finds_markdown_sorted() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("posts")).unwrap();
        fs::create_dir_all(root.join(".obsidian")).unwrap();
        fs::write(root.join("b.md"), "b").unwrap();
        fs::write(root.join("posts/a.markdown"), "a").unwrap();
        fs::write(root.join("notes.txt"), "skip").unwrap();
        fs::write(root.join(".hidden.md"), "skip").unwrap();
        fs::write(root.join(".obsidian/config.md"), "skip").unwrap();

        let files = scan_markdown(root).unwrap();
        let keys: Vec<_> = files.iter().map(|f| f.relative.as_str()).collect();
        assert_eq!(keys, vec!["b.md", "posts/a.markdown"]);
        assert_eq!(files[1].stem(), "a");
    }

    #[test]
    fn test_scan_missing_root() {
        let err = scan_markdown(Path::new("/nonexistent/notes")).unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));
    }

    #[test]
    fn test_is_markdown() {
        assert!(is_markdown(Path::new("a.md")));
        assert!(is_markdown(Path::new("a.MD")));
        assert!(is_markdown(Path::new("a.markdown")));
        assert!(!is_markdown(Path::new("a.txt")));
        assert!(!is_markdown(Path::new("md")));
    }
}
