use indextree::{Arena, NodeId};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    File,
    Directory,
}

/// Snapshot of an entry's metadata taken once at scan time.
///
/// Every field is optional: lookups that fail on a given platform or entry are
/// simply left out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeMetadata {
    pub modified: Option<SystemTime>,
    pub accessed: Option<SystemTime>,
    pub changed: Option<SystemTime>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub mode: Option<u32>,
}

impl NodeMetadata {
    pub fn from_fs(meta: &fs::Metadata) -> Self {
        let mut snapshot = Self {
            modified: meta.modified().ok(),
            accessed: meta.accessed().ok(),
            ..Self::default()
        };

        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            use std::time::Duration;

            let ctime = meta.ctime();
            if ctime >= 0 {
                snapshot.changed = SystemTime::UNIX_EPOCH
                    .checked_add(Duration::new(ctime as u64, meta.ctime_nsec().clamp(0, 999_999_999) as u32));
            }
            snapshot.uid = Some(meta.uid());
            snapshot.gid = Some(meta.gid());
            snapshot.mode = Some(meta.mode());
        }

        snapshot
    }

    /// `ls -l` style rendering of the permission bits, e.g. `drwxr-xr-x`.
    pub fn permissions_string(&self, kind: NodeKind) -> Option<String> {
        let mode = self.mode?;
        let mut out = String::with_capacity(10);
        out.push(match kind {
            NodeKind::Directory => 'd',
            NodeKind::File => '-',
        });
        const FLAGS: [(u32, char); 9] = [
            (0o400, 'r'),
            (0o200, 'w'),
            (0o100, 'x'),
            (0o040, 'r'),
            (0o020, 'w'),
            (0o010, 'x'),
            (0o004, 'r'),
            (0o002, 'w'),
            (0o001, 'x'),
        ];
        for (bit, ch) in FLAGS {
            out.push(if mode & bit != 0 { ch } else { '-' });
        }
        Some(out)
    }
}

/// Represents a node in the directory tree
#[derive(Debug, Clone)]
pub struct TreeNode {
    pub path: PathBuf,
    pub name: String,
    pub kind: NodeKind,
    /// Byte size for files; sum of the children for directories.
    pub size: u64,
    pub metadata: Option<NodeMetadata>,
    /// False while a directory's subtree is still being scanned.
    pub complete: bool,
}

impl TreeNode {
    pub fn is_dir(&self) -> bool {
        self.kind == NodeKind::Directory
    }
}

/// Display name for a path: its basename, or the whole path when there is none (e.g. `/`).
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| path.display().to_string())
}

/// Size tree backed by an arena. Children are owned through the arena and
/// parents are plain `NodeId`s, so there are no reference cycles.
#[derive(Debug, Clone)]
pub struct FileTree {
    arena: Arena<TreeNode>,
    root: NodeId,
    path_to_node: HashMap<PathBuf, NodeId>,
}

impl FileTree {
    /// Create a new tree with a root node
    pub fn new<P: AsRef<Path>>(root_path: P, kind: NodeKind, size: u64, metadata: Option<NodeMetadata>) -> Self {
        let mut arena = Arena::new();
        let root_path_buf = root_path.as_ref().to_path_buf();

        let root_node = TreeNode {
            name: display_name(&root_path_buf),
            path: root_path_buf.clone(),
            kind,
            size,
            metadata,
            complete: kind == NodeKind::File,
        };

        let root = arena.new_node(root_node);
        let mut path_to_node = HashMap::new();
        path_to_node.insert(root_path_buf, root);

        Self {
            arena,
            root,
            path_to_node,
        }
    }

    /// Append a child under `parent`. Files are complete immediately and their
    /// size is added to every ancestor so partial snapshots show running totals.
    pub fn add_child(
        &mut self,
        parent: NodeId,
        path: PathBuf,
        kind: NodeKind,
        size: u64,
        metadata: Option<NodeMetadata>,
    ) -> NodeId {
        let node = TreeNode {
            name: display_name(&path),
            path: path.clone(),
            kind,
            size,
            metadata,
            complete: kind == NodeKind::File,
        };

        let node_id = self.arena.new_node(node);
        parent.append(node_id, &mut self.arena);
        self.path_to_node.insert(path, node_id);

        if size > 0 {
            let ancestors: Vec<NodeId> = parent.ancestors(&self.arena).collect();
            for ancestor in ancestors {
                if let Some(n) = self.arena.get_mut(ancestor) {
                    let data = n.get_mut();
                    data.size = data.size.saturating_add(size);
                }
            }
        }

        node_id
    }

    /// Finalise a directory once all its children are finalised: its size becomes
    /// the exact sum of its children and it is marked complete.
    pub fn finish_directory(&mut self, node_id: NodeId) -> u64 {
        let total: u64 = node_id
            .children(&self.arena)
            .filter_map(|child| self.arena.get(child))
            .map(|child| child.get().size)
            .sum();

        if let Some(node) = self.arena.get_mut(node_id) {
            let data = node.get_mut();
            data.size = total;
            data.complete = true;
        }

        total
    }

    pub fn get_root(&self) -> NodeId {
        self.root
    }

    pub fn get(&self, node_id: NodeId) -> Option<&TreeNode> {
        self.arena.get(node_id).map(|n| n.get())
    }

    pub fn get_node(&self, path: &Path) -> Option<NodeId> {
        self.path_to_node.get(path).copied()
    }

    pub fn root_path(&self) -> &Path {
        self.get(self.root).map(|n| n.path.as_path()).unwrap_or(Path::new(""))
    }

    pub fn children(&self, node_id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        node_id.children(&self.arena)
    }

    pub fn child_count(&self, node_id: NodeId) -> usize {
        node_id.children(&self.arena).count()
    }

    pub fn has_children(&self, node_id: NodeId) -> bool {
        self.arena
            .get(node_id)
            .and_then(|n| n.first_child())
            .is_some()
    }

    pub fn parent(&self, node_id: NodeId) -> Option<NodeId> {
        self.arena.get(node_id).and_then(|n| n.parent())
    }

    /// Number of edges from `ancestor` down to `node_id`, if `ancestor` is on its path.
    pub fn depth_below(&self, ancestor: NodeId, node_id: NodeId) -> Option<usize> {
        node_id.ancestors(&self.arena).position(|id| id == ancestor)
    }

    /// Chain from the root down to `node_id`, both inclusive.
    pub fn path_from_root(&self, node_id: NodeId) -> Vec<NodeId> {
        let mut chain: Vec<NodeId> = node_id.ancestors(&self.arena).collect();
        chain.reverse();
        chain
    }

    pub fn len(&self) -> usize {
        self.path_to_node.len()
    }

    pub fn is_empty(&self) -> bool {
        self.path_to_node.is_empty()
    }

    /// Get total size of the tree
    pub fn total_size(&self) -> u64 {
        self.get(self.root).map(|n| n.size).unwrap_or(0)
    }
}

pub fn format_size(size: u64) -> String {
    const UNITS: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];
    let mut value = size as f64;
    let mut unit_index = 0;
    while value >= 1024.0 && unit_index < UNITS.len() - 1 {
        value /= 1024.0;
        unit_index += 1;
    }
    format!("{:.1} {}", value, UNITS[unit_index])
}
