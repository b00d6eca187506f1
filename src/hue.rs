use dashmap::DashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use crate::tree::NodeKind;

/// Hue rotation per nesting level, in degrees.
pub const HUE_STEP: f32 = 30.0;

const DIR_SATURATION: f32 = 150.0 / 255.0;
const FILE_SATURATION: f32 = 100.0 / 255.0;
const BLOCK_VALUE: f32 = 220.0 / 255.0;
const SELECTED_VALUE: f32 = 160.0 / 255.0;

/// Deterministic hue in `[0, 360)` derived from a path.
pub fn path_hue(path: &Path) -> f32 {
    let mut hasher = DefaultHasher::new();
    path.hash(&mut hasher);
    (hasher.finish() % 360) as f32
}

/// Hue for a block `depth` levels below a block colored `base`.
pub fn depth_hue(base: f32, depth: usize) -> f32 {
    (base + depth as f32 * HUE_STEP).rem_euclid(360.0)
}

/// HSV color of a placed block; hue in degrees, saturation and value in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockColor {
    pub hue: f32,
    pub saturation: f32,
    pub value: f32,
}

impl BlockColor {
    pub fn for_node(hue: f32, kind: NodeKind, selected: bool) -> Self {
        Self {
            hue,
            saturation: match kind {
                NodeKind::Directory => DIR_SATURATION,
                NodeKind::File => FILE_SATURATION,
            },
            value: if selected { SELECTED_VALUE } else { BLOCK_VALUE },
        }
    }

    /// Neutral grey used for the aggregated "others" block.
    pub fn others() -> Self {
        Self {
            hue: 0.0,
            saturation: 0.0,
            value: BLOCK_VALUE,
        }
    }

    pub fn to_rgb(&self) -> (u8, u8, u8) {
        let c = self.value * self.saturation;
        let h = self.hue.rem_euclid(360.0) / 60.0;
        let x = c * (1.0 - (h % 2.0 - 1.0).abs());
        let (r, g, b) = match h as u32 {
            0 => (c, x, 0.0),
            1 => (x, c, 0.0),
            2 => (0.0, c, x),
            3 => (0.0, x, c),
            4 => (x, 0.0, c),
            _ => (c, 0.0, x),
        };
        let m = self.value - c;
        let to_byte = |v: f32| ((v + m) * 255.0).round().clamp(0.0, 255.0) as u8;
        (to_byte(r), to_byte(g), to_byte(b))
    }
}

/// Lazily filled hue per node path.
///
/// The first layout pass that sees a node fixes its hue; later passes (resizes,
/// progressive snapshots) reuse it. Kept outside the size tree so the tree itself
/// stays immutable and shareable.
#[derive(Debug, Default)]
pub struct HueCache {
    hues: DashMap<PathBuf, f32>,
}

impl HueCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &Path) -> Option<f32> {
        self.hues.get(path).map(|h| *h)
    }

    pub fn get_or_assign<F: FnOnce() -> f32>(&self, path: &Path, assign: F) -> f32 {
        if let Some(hue) = self.hues.get(path) {
            return *hue;
        }
        *self.hues.entry(path.to_path_buf()).or_insert_with(assign)
    }

    pub fn len(&self) -> usize {
        self.hues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hues.is_empty()
    }

    pub fn clear(&self) {
        self.hues.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_hue_wraps() {
        assert_eq!(depth_hue(200.0, 0), 200.0);
        assert_eq!(depth_hue(200.0, 2), 260.0);
        assert_eq!(depth_hue(350.0, 1), 20.0);
    }

    #[test]
    fn test_path_hue_is_stable() {
        let a = path_hue(Path::new("/home/user"));
        assert_eq!(a, path_hue(Path::new("/home/user")));
        assert!((0.0..360.0).contains(&a));
    }

    #[test]
    fn test_cache_keeps_first_assignment() {
        let cache = HueCache::new();
        let p = Path::new("/a/b");
        assert_eq!(cache.get_or_assign(p, || 90.0), 90.0);
        assert_eq!(cache.get_or_assign(p, || 180.0), 90.0);
        assert_eq!(cache.get(p), Some(90.0));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_selected_is_darker_and_dirs_more_saturated() {
        let dir = BlockColor::for_node(120.0, NodeKind::Directory, false);
        let file = BlockColor::for_node(120.0, NodeKind::File, false);
        let selected = BlockColor::for_node(120.0, NodeKind::File, true);
        assert!(dir.saturation > file.saturation);
        assert!(selected.value < file.value);
        assert_eq!(selected.hue, file.hue);
    }

    #[test]
    fn test_to_rgb() {
        assert_eq!(BlockColor::others().to_rgb(), (220, 220, 220));
        let red = BlockColor { hue: 0.0, saturation: 1.0, value: 1.0 };
        assert_eq!(red.to_rgb(), (255, 0, 0));
        let blue = BlockColor { hue: 240.0, saturation: 1.0, value: 1.0 };
        assert_eq!(blue.to_rgb(), (0, 0, 255));
    }
}
