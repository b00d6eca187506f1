use indextree::NodeId;
use serde::Deserialize;
use tracing::debug;

use crate::error::NavigationError;
use crate::hue::{depth_hue, path_hue, HueCache};
use crate::tree::FileTree;

/// What a rescan of the same root does to the zoom position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReloadPolicy {
    /// Always start again at the top of the new tree.
    #[default]
    ResetToTop,
    /// Zoom back to the node with the same path, if the new tree still has it.
    RelocateCurrent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct NavigationConfig {
    pub reload: ReloadPolicy,
}

/// Zoom position inside one scanned tree.
///
/// `hue_stack` holds one hue for every node from the root down to `current`;
/// its top is the base hue for the current node. It is never empty.
#[derive(Debug)]
pub struct NavigationState {
    root: NodeId,
    current: NodeId,
    hue_stack: Vec<f32>,
    hues: HueCache,
}

impl NavigationState {
    pub fn new(tree: &FileTree) -> Self {
        Self {
            root: tree.get_root(),
            current: tree.get_root(),
            hue_stack: vec![path_hue(tree.root_path())],
            hues: HueCache::new(),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn current(&self) -> NodeId {
        self.current
    }

    pub fn hue_stack(&self) -> &[f32] {
        &self.hue_stack
    }

    /// Base hue of the current zoom level.
    pub fn base_hue(&self) -> f32 {
        self.hue_stack.last().copied().unwrap_or(0.0)
    }

    pub fn hues(&self) -> &HueCache {
        &self.hues
    }

    /// Depth of the current node below the root.
    pub fn zoom_depth(&self) -> usize {
        self.hue_stack.len() - 1
    }

    pub fn is_at_top(&self) -> bool {
        self.current == self.root
    }

    pub fn can_go_up(&self, tree: &FileTree) -> bool {
        tree.parent(self.current).is_some()
    }

    /// Make `target` the layout root. Only non-empty directories can be zoomed into.
    pub fn zoom_into(&mut self, tree: &FileTree, target: NodeId) -> Result<(), NavigationError> {
        let node = tree.get(target).ok_or(NavigationError::UnknownNode)?;
        if !node.is_dir() {
            return Err(NavigationError::NotADirectory(node.path.clone()));
        }
        if !tree.has_children(target) {
            return Err(NavigationError::EmptyDirectory(node.path.clone()));
        }

        // One hue per level between the root and the target, so going up walks
        // back through every level. A target outside the current subtree starts
        // again from the root.
        let chain = tree.path_from_root(target);
        let start = chain.iter().position(|&id| id == self.current).unwrap_or(0);
        let base = self.hue_stack.get(start).copied().unwrap_or_else(|| self.base_hue());
        let levels = chain[start + 1..]
            .iter()
            .enumerate()
            .map(|(i, &id)| {
                let level = tree.get(id).ok_or(NavigationError::UnknownNode)?;
                Ok(self.hues.get_or_assign(&level.path, || depth_hue(base, i + 1)))
            })
            .collect::<Result<Vec<f32>, NavigationError>>()?;

        self.hue_stack.truncate(start + 1);
        self.hue_stack.extend(levels);
        self.current = target;
        debug!(path = %node.path.display(), hue = self.base_hue(), depth = self.zoom_depth(), "zoom in");
        Ok(())
    }

    pub fn go_up(&mut self, tree: &FileTree) -> Result<(), NavigationError> {
        let parent = tree.parent(self.current).ok_or(NavigationError::AtTop)?;
        self.current = parent;
        if self.hue_stack.len() > 1 {
            self.hue_stack.pop();
        }
        debug!(depth = self.zoom_depth(), "zoom out");
        Ok(())
    }

    /// Back to the scanned root with a single hue derived from the root path.
    pub fn go_top(&mut self, tree: &FileTree) {
        self.current = self.root;
        self.hue_stack.clear();
        self.hue_stack.push(path_hue(tree.root_path()));
    }

    /// Navigation for `new_tree`, a fresh scan of the same root as `old_tree`.
    ///
    /// With `RelocateCurrent` the node at the old current path is zoomed into again
    /// and the hue stack is rebuilt level by level from the new root; otherwise, or if
    /// the path no longer exists, navigation starts at the top.
    pub fn after_rescan(&self, old_tree: &FileTree, new_tree: &FileTree, policy: ReloadPolicy) -> Self {
        let mut state = Self::new(new_tree);
        if policy == ReloadPolicy::ResetToTop {
            return state;
        }

        let Some(old_path) = old_tree.get(self.current).map(|n| n.path.as_path()) else {
            return state;
        };
        let Some(relocated) = new_tree.get_node(old_path) else {
            debug!(path = %old_path.display(), "previous view is gone, back to top");
            return state;
        };

        let root_hue = state.base_hue();
        let chain = new_tree.path_from_root(relocated);
        state.hue_stack = (0..chain.len()).map(|depth| depth_hue(root_hue, depth)).collect();
        state.current = relocated;
        debug!(path = %old_path.display(), depth = state.zoom_depth(), "relocated view");
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::NodeKind;
    use std::path::{Path, PathBuf};

    fn tree_with(paths: &[(&str, NodeKind, u64)]) -> FileTree {
        let mut tree = FileTree::new("/r", NodeKind::Directory, 0, None);
        for (path, kind, size) in paths {
            let path = PathBuf::from(path);
            let parent = tree.get_node(path.parent().unwrap()).unwrap();
            tree.add_child(parent, path, *kind, *size, None);
        }
        tree
    }

    fn sample() -> FileTree {
        tree_with(&[
            ("/r/a", NodeKind::Directory, 0),
            ("/r/a/b", NodeKind::Directory, 0),
            ("/r/a/b/f", NodeKind::File, 10),
            ("/r/empty", NodeKind::Directory, 0),
            ("/r/file", NodeKind::File, 5),
        ])
    }

    #[test]
    fn test_zoom_then_up_round_trips() {
        let tree = sample();
        let mut nav = NavigationState::new(&tree);
        let a = tree.get_node(Path::new("/r/a")).unwrap();
        let before_top = nav.base_hue();

        nav.zoom_into(&tree, a).unwrap();
        assert_eq!(nav.current(), a);
        assert_eq!(nav.zoom_depth(), 1);
        assert_eq!(nav.base_hue(), depth_hue(before_top, 1));

        nav.go_up(&tree).unwrap();
        assert_eq!(nav.current(), tree.get_root());
        assert_eq!(nav.base_hue(), before_top);
        assert!(nav.is_at_top());
    }

    #[test]
    fn test_zoom_uses_cached_hue() {
        let tree = sample();
        let mut nav = NavigationState::new(&tree);
        let a = tree.get_node(Path::new("/r/a")).unwrap();
        nav.hues().get_or_assign(Path::new("/r/a"), || 42.0);

        nav.zoom_into(&tree, a).unwrap();
        assert_eq!(nav.base_hue(), 42.0);
    }

    #[test]
    fn test_zoom_to_grandchild_then_up_stops_at_child() {
        let tree = sample();
        let mut nav = NavigationState::new(&tree);
        let a = tree.get_node(Path::new("/r/a")).unwrap();
        let b = tree.get_node(Path::new("/r/a/b")).unwrap();
        let top = nav.base_hue();

        nav.zoom_into(&tree, b).unwrap();
        assert_eq!(nav.zoom_depth(), 2);
        assert_eq!(nav.hue_stack(), &[top, depth_hue(top, 1), depth_hue(top, 2)]);

        nav.go_up(&tree).unwrap();
        assert_eq!(nav.current(), a);
        assert_eq!(nav.zoom_depth(), 1);
        assert_eq!(nav.base_hue(), depth_hue(top, 1));

        nav.go_up(&tree).unwrap();
        assert!(nav.is_at_top());
        assert_eq!(nav.hue_stack(), &[top]);
    }

    #[test]
    fn test_zoom_outside_current_subtree_rebuilds_from_root() {
        let tree = tree_with(&[
            ("/r/a", NodeKind::Directory, 0),
            ("/r/a/f", NodeKind::File, 1),
            ("/r/c", NodeKind::Directory, 0),
            ("/r/c/d", NodeKind::Directory, 0),
            ("/r/c/d/g", NodeKind::File, 2),
        ]);
        let mut nav = NavigationState::new(&tree);
        let top = nav.base_hue();
        nav.zoom_into(&tree, tree.get_node(Path::new("/r/a")).unwrap()).unwrap();

        let d = tree.get_node(Path::new("/r/c/d")).unwrap();
        nav.zoom_into(&tree, d).unwrap();
        assert_eq!(nav.current(), d);
        assert_eq!(nav.zoom_depth(), 2);
        assert_eq!(nav.hue_stack(), &[top, depth_hue(top, 1), depth_hue(top, 2)]);
    }

    #[test]
    fn test_zoom_rejects_files_and_empty_dirs() {
        let tree = sample();
        let mut nav = NavigationState::new(&tree);
        let file = tree.get_node(Path::new("/r/file")).unwrap();
        let empty = tree.get_node(Path::new("/r/empty")).unwrap();

        assert_eq!(
            nav.zoom_into(&tree, file),
            Err(NavigationError::NotADirectory(PathBuf::from("/r/file")))
        );
        assert_eq!(
            nav.zoom_into(&tree, empty),
            Err(NavigationError::EmptyDirectory(PathBuf::from("/r/empty")))
        );
        assert_eq!(nav.hue_stack().len(), 1);
        assert!(nav.is_at_top());
    }

    #[test]
    fn test_go_up_at_root_fails() {
        let tree = sample();
        let mut nav = NavigationState::new(&tree);
        assert!(!nav.can_go_up(&tree));
        assert_eq!(nav.go_up(&tree), Err(NavigationError::AtTop));
        assert_eq!(nav.hue_stack().len(), 1);
    }

    #[test]
    fn test_go_top_is_idempotent() {
        let tree = sample();
        let mut nav = NavigationState::new(&tree);
        let a = tree.get_node(Path::new("/r/a")).unwrap();
        let b = tree.get_node(Path::new("/r/a/b")).unwrap();
        nav.zoom_into(&tree, a).unwrap();
        nav.zoom_into(&tree, b).unwrap();
        assert_eq!(nav.zoom_depth(), 2);

        nav.go_top(&tree);
        let current = nav.current();
        let stack = nav.hue_stack().to_vec();
        nav.go_top(&tree);

        assert_eq!(nav.current(), current);
        assert_eq!(nav.hue_stack(), stack.as_slice());
        assert_eq!(stack, vec![path_hue(Path::new("/r"))]);
    }

    #[test]
    fn test_rescan_resets_to_top_by_default() {
        let old = sample();
        let mut nav = NavigationState::new(&old);
        nav.zoom_into(&old, old.get_node(Path::new("/r/a")).unwrap()).unwrap();

        let new = sample();
        let fresh = nav.after_rescan(&old, &new, ReloadPolicy::ResetToTop);
        assert_eq!(fresh.current(), new.get_root());
        assert_eq!(fresh.hue_stack().len(), 1);
    }

    #[test]
    fn test_rescan_relocates_by_path() {
        let old = sample();
        let mut nav = NavigationState::new(&old);
        nav.zoom_into(&old, old.get_node(Path::new("/r/a")).unwrap()).unwrap();
        nav.zoom_into(&old, old.get_node(Path::new("/r/a/b")).unwrap()).unwrap();

        // Same paths, different arena layout.
        let new = tree_with(&[
            ("/r/new", NodeKind::File, 1),
            ("/r/a", NodeKind::Directory, 0),
            ("/r/a/b", NodeKind::Directory, 0),
            ("/r/a/b/g", NodeKind::File, 3),
        ]);
        let relocated = nav.after_rescan(&old, &new, ReloadPolicy::RelocateCurrent);
        let b = new.get_node(Path::new("/r/a/b")).unwrap();
        assert_eq!(relocated.current(), b);
        assert_eq!(relocated.zoom_depth(), 2);

        let root_hue = path_hue(Path::new("/r"));
        assert_eq!(relocated.hue_stack(), &[root_hue, depth_hue(root_hue, 1), depth_hue(root_hue, 2)]);
    }

    #[test]
    fn test_rescan_relocate_falls_back_to_top() {
        let old = sample();
        let mut nav = NavigationState::new(&old);
        nav.zoom_into(&old, old.get_node(Path::new("/r/a")).unwrap()).unwrap();

        let new = tree_with(&[("/r/other", NodeKind::File, 1)]);
        let relocated = nav.after_rescan(&old, &new, ReloadPolicy::RelocateCurrent);
        assert_eq!(relocated.current(), new.get_root());
        assert!(relocated.is_at_top());
    }
}
