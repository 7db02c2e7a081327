//! File system watcher feeding the sync queue

use std::path::{Component, Path, PathBuf};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, warn};

use crate::error::{SyncError, SyncResult};
use crate::queue::SyncQueue;
use crate::scan::is_markdown;

/// Keeps the OS watch alive; dropping it stops watching
pub struct MarkdownWatcher {
    _watcher: RecommendedWatcher,
    root: PathBuf,
}

impl MarkdownWatcher {
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Watch `root` recursively, queueing created or modified Markdown files
pub fn watch_markdown(root: &Path, queue: SyncQueue) -> SyncResult<MarkdownWatcher> {
    let watch_error = |e: notify::Error| SyncError::Watch {
        path: root.to_path_buf(),
        details: e.to_string(),
    };

    let event_root = root.to_path_buf();
    let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
        match res {
            Ok(event) => {
                queue_event(&event, &event_root, &queue);
            }
            Err(e) => warn!("Watch error: {}", e),
        }
    })
    .map_err(watch_error)?;

    watcher
        .watch(root, RecursiveMode::Recursive)
        .map_err(watch_error)?;

    Ok(MarkdownWatcher {
        _watcher: watcher,
        root: root.to_path_buf(),
    })
}

/// Queue the Markdown paths of a create/modify event
///
/// Returns how many paths were newly queued.
fn queue_event(event: &Event, root: &Path, queue: &SyncQueue) -> usize {
    if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
        return 0;
    }

    let mut queued = 0;
    for path in &event.paths {
        if !is_markdown(path) || is_hidden(root, path) {
            continue;
        }
        if queue.enqueue(path.clone()) {
            debug!("Queued {}", path.display());
            queued += 1;
        }
    }
    queued
}

/// Whether any component below `root` is a dotfile (editor swap files etc.)
fn is_hidden(root: &Path, path: &Path) -> bool {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .any(|c| matches!(c, Component::Normal(name) if name.to_string_lossy().starts_with('.')))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::sync_queue;
    use notify::event::{CreateKind, ModifyKind, RemoveKind};

    #[tokio::test]
    async fn test_queue_event_filters() {
        let root = Path::new("/notes");
        let (queue, mut rx) = sync_queue(8);

        let create = Event::new(EventKind::Create(CreateKind::File))
            .add_path(root.join("a.md"))
            .add_path(root.join("image.png"))
            .add_path(root.join(".obsidian").join("b.md"));
        assert_eq!(queue_event(&create, root, &queue), 1);

        let modify = Event::new(EventKind::Modify(ModifyKind::Any)).add_path(root.join("a.md"));
        assert_eq!(queue_event(&modify, root, &queue), 0);

        let remove = Event::new(EventKind::Remove(RemoveKind::File)).add_path(root.join("c.md"));
        assert_eq!(queue_event(&remove, root, &queue), 0);

        assert_eq!(rx.recv().await, Some(root.join("a.md")));
    }

    #[test]
    fn test_is_hidden() {
        let root = Path::new("/home/me/.notes");
        assert!(!is_hidden(root, &root.join("post.md")));
        assert!(is_hidden(root, &root.join(".draft.md")));
        assert!(is_hidden(root, &root.join(".trash").join("old.md")));
    }

    #[test]
    fn test_watch_missing_dir_fails() {
        let (queue, _rx) = sync_queue(1);
        let result = watch_markdown(Path::new("/definitely/not/here"), queue);
        assert!(matches!(result, Err(SyncError::Watch { .. })));
    }
}
