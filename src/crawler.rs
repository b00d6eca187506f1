use serde::Deserialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use jwalk::{Parallelism, WalkDir};
use tracing::{debug, info};

use crate::error::ScanError;
use crate::tree::{FileTree, NodeKind, NodeMetadata};

/// Pseudo-filesystems that are never descended into unless chosen as the scan root.
pub const DEFAULT_EXCLUSIONS: [&str; 5] = ["/proc", "/mnt", "/sys", "/dev", "/run"];

const DEFAULT_SNAPSHOT_INTERVAL_MS: u64 = 1000;

/// What to do with a symlink found while listing a directory. Links are never followed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymlinkPolicy {
    /// Record a file leaf sized by the link's own metadata.
    #[default]
    LinkSize,
    /// Record a zero-size file leaf.
    ZeroSize,
    /// Leave the link out of the parent's children.
    Skip,
}

/// Path prefixes the crawler records as empty directories without listing them.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct ExclusionPolicy {
    prefixes: Vec<PathBuf>,
}

impl Default for ExclusionPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_EXCLUSIONS.iter().map(PathBuf::from))
    }
}

impl ExclusionPolicy {
    pub fn new<I: IntoIterator<Item = PathBuf>>(prefixes: I) -> Self {
        Self {
            prefixes: prefixes.into_iter().collect(),
        }
    }

    pub fn none() -> Self {
        Self { prefixes: Vec::new() }
    }

    pub fn prefixes(&self) -> &[PathBuf] {
        &self.prefixes
    }

    /// True if `path` is one of the prefixes or lies below one (component-wise).
    pub fn is_excluded(&self, path: &Path) -> bool {
        self.prefixes.iter().any(|prefix| path.starts_with(prefix))
    }

    /// The policy as it applies to a scan of `root`: a prefix covering the root
    /// itself was chosen explicitly and stops applying.
    pub fn scoped_to(&self, root: &Path) -> Self {
        Self {
            prefixes: self
                .prefixes
                .iter()
                .filter(|prefix| !root.starts_with(prefix))
                .cloned()
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub exclusions: ExclusionPolicy,
    pub symlinks: SymlinkPolicy,
    /// Minimum wall-clock gap between partial-tree snapshots; `None` disables them.
    pub snapshot_interval_ms: Option<u64>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            exclusions: ExclusionPolicy::default(),
            symlinks: SymlinkPolicy::default(),
            snapshot_interval_ms: Some(DEFAULT_SNAPSHOT_INTERVAL_MS),
        }
    }
}

/// Shared cooperative cancellation flag. Cancelling is idempotent.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone)]
pub struct ScanProgress {
    /// Entry currently being visited.
    pub path: PathBuf,
    pub visited_entries: u64,
    /// Copy of the tree built so far, attached at most once per snapshot interval.
    pub snapshot: Option<FileTree>,
}

pub type ProgressReporter = Arc<dyn Fn(ScanProgress) + Send + Sync>;

#[derive(Debug, Clone, Default)]
pub struct ScanStats {
    pub total_files: u64,
    pub total_dirs: u64,
    pub total_size: u64,
    /// Directory listings that failed and were recorded with partial children.
    pub errors: u64,
    pub duration_ms: u128,
}

#[derive(Debug, Clone)]
pub struct ScanOutput {
    pub tree: FileTree,
    pub stats: ScanStats,
}

/// Maps paths under the directory actually walked back onto the requested root.
/// The two differ only when the root is a symlink.
#[derive(Debug, Clone)]
struct PathRebase {
    from: PathBuf,
    to: PathBuf,
}

impl PathRebase {
    fn for_root(root: &Path) -> Self {
        let from = match fs::symlink_metadata(root) {
            Ok(meta) if meta.file_type().is_symlink() => fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf()),
            _ => root.to_path_buf(),
        };
        Self {
            from,
            to: root.to_path_buf(),
        }
    }

    fn apply(&self, path: &Path) -> PathBuf {
        if self.from == self.to {
            return path.to_path_buf();
        }
        match path.strip_prefix(&self.from) {
            Ok(rest) => self.to.join(rest),
            Err(_) => path.to_path_buf(),
        }
    }
}

struct ProgressState {
    reporter: Option<ProgressReporter>,
    snapshot_interval: Option<Duration>,
    last_snapshot: Instant,
    visited: u64,
}

impl ProgressState {
    fn visit(&mut self, path: &Path, tree: &FileTree) {
        self.visited = self.visited.saturating_add(1);
        let Some(cb) = self.reporter.as_ref() else {
            return;
        };

        let snapshot = match self.snapshot_interval {
            Some(interval) if self.last_snapshot.elapsed() >= interval => {
                self.last_snapshot = Instant::now();
                Some(tree.clone())
            }
            _ => None,
        };

        cb(ScanProgress {
            path: path.to_path_buf(),
            visited_entries: self.visited,
            snapshot,
        });
    }
}

/// Depth-first filesystem crawler producing a `FileTree`.
///
/// Listing is done by a serial `jwalk` walk, so entries arrive in visit order.
/// The crawler keeps the chain of open directories by depth and finalises a
/// directory as soon as the walk leaves its subtree, which keeps sizes bottom-up.
pub struct FileCrawler {
    config: ScanConfig,
}

impl FileCrawler {
    pub fn new(config: ScanConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Scan `root` and return the finished tree.
    ///
    /// Cancellation is checked before every entry and before every directory is
    /// listed. A cancelled scan discards the partial tree and returns
    /// `ScanError::Cancelled`.
    pub fn scan<P: AsRef<Path>>(
        &self,
        root: P,
        cancel: &CancelToken,
        reporter: Option<ProgressReporter>,
    ) -> Result<ScanOutput, ScanError> {
        let start = Instant::now();
        let root_path = std::path::absolute(root.as_ref()).unwrap_or_else(|_| root.as_ref().to_path_buf());
        info!(root = %root_path.display(), "scan started");

        let mut progress = ProgressState {
            reporter,
            snapshot_interval: self.config.snapshot_interval_ms.map(Duration::from_millis),
            last_snapshot: start,
            visited: 0,
        };
        let mut stats = ScanStats::default();

        if cancel.is_cancelled() {
            return Err(ScanError::Cancelled);
        }

        // The root is resolved through symlinks; only entries below it are not.
        let root_meta = fs::metadata(&root_path).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => ScanError::NotFound(root_path.clone()),
            _ => ScanError::RootUnreadable {
                path: root_path.clone(),
                source,
            },
        })?;

        if !root_meta.is_dir() {
            let tree = FileTree::new(
                &root_path,
                NodeKind::File,
                root_meta.len(),
                Some(NodeMetadata::from_fs(&root_meta)),
            );
            progress.visit(&root_path, &tree);
            stats.total_files = 1;
            stats.total_size = root_meta.len();
            stats.duration_ms = start.elapsed().as_millis();
            return Ok(ScanOutput { tree, stats });
        }

        let exclusions = self.config.exclusions.scoped_to(&root_path);
        let rebase = PathRebase::for_root(&root_path);
        let mut tree = FileTree::new(
            &root_path,
            NodeKind::Directory,
            0,
            Some(NodeMetadata::from_fs(&root_meta)),
        );
        progress.visit(&root_path, &tree);
        stats.total_dirs = 1;

        let prune_exclusions = exclusions.clone();
        let prune_rebase = rebase.clone();
        let prune_cancel = cancel.clone();
        let walker = WalkDir::new(&rebase.from)
            .skip_hidden(false)
            .follow_links(false)
            .parallelism(Parallelism::Serial)
            .process_read_dir(move |_, _, _, children| {
                if prune_cancel.is_cancelled() {
                    children.clear();
                    return;
                }
                // Excluded directories are still yielded, just never listed.
                for entry in children.iter_mut().flatten() {
                    if entry.file_type().is_dir() && prune_exclusions.is_excluded(&prune_rebase.apply(&entry.path())) {
                        entry.read_children_path = None;
                    }
                }
            });

        // open[d] is the directory whose children are yielded at depth d + 1.
        let mut open = vec![tree.get_root()];

        for item in walker {
            if cancel.is_cancelled() {
                info!(visited = progress.visited, "scan cancelled");
                return Err(ScanError::Cancelled);
            }

            let entry = match item {
                Ok(entry) => entry,
                Err(err) => {
                    stats.errors += 1;
                    debug!(path = ?err.path(), error = %err, "cannot list directory");
                    continue;
                }
            };
            if entry.depth == 0 {
                continue;
            }

            // Leaving a directory's subtree finalises it, deepest first.
            while open.len() > entry.depth {
                if let Some(done) = open.pop() {
                    tree.finish_directory(done);
                }
            }
            if open.len() != entry.depth {
                continue;
            }
            let Some(&parent) = open.last() else {
                continue;
            };

            let path = rebase.apply(&entry.path());
            progress.visit(&path, &tree);

            let meta = match fs::symlink_metadata(&path) {
                Ok(meta) => meta,
                Err(err) => {
                    debug!(path = %path.display(), error = %err, "metadata unavailable");
                    stats.total_files += 1;
                    tree.add_child(parent, path, NodeKind::File, 0, None);
                    continue;
                }
            };
            let file_type = meta.file_type();

            if file_type.is_symlink() {
                let size = match self.config.symlinks {
                    SymlinkPolicy::Skip => continue,
                    SymlinkPolicy::ZeroSize => 0,
                    SymlinkPolicy::LinkSize => meta.len(),
                };
                stats.total_files += 1;
                stats.total_size += size;
                tree.add_child(parent, path, NodeKind::File, size, Some(NodeMetadata::from_fs(&meta)));
                continue;
            }

            if file_type.is_dir() {
                stats.total_dirs += 1;
                let excluded = exclusions.is_excluded(&path);
                if excluded {
                    debug!(path = %path.display(), "excluded, not descending");
                }
                let id = tree.add_child(
                    parent,
                    path,
                    NodeKind::Directory,
                    0,
                    Some(NodeMetadata::from_fs(&meta)),
                );
                if excluded {
                    tree.finish_directory(id);
                } else {
                    open.push(id);
                }
                continue;
            }

            stats.total_files += 1;
            stats.total_size += meta.len();
            tree.add_child(
                parent,
                path,
                NodeKind::File,
                meta.len(),
                Some(NodeMetadata::from_fs(&meta)),
            );
        }

        // A cancel seen while listing empties the listing, so check once more.
        if cancel.is_cancelled() {
            info!(visited = progress.visited, "scan cancelled");
            return Err(ScanError::Cancelled);
        }
        while let Some(done) = open.pop() {
            tree.finish_directory(done);
        }

        stats.duration_ms = start.elapsed().as_millis();
        info!(
            files = stats.total_files,
            dirs = stats.total_dirs,
            size = stats.total_size,
            errors = stats.errors,
            duration_ms = stats.duration_ms as u64,
            "scan finished"
        );

        Ok(ScanOutput { tree, stats })
    }
}

impl Default for FileCrawler {
    fn default() -> Self {
        Self::new(ScanConfig::default())
    }
}
