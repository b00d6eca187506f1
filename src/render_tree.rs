use indextree::NodeId;
use serde::Deserialize;

use crate::hue::{depth_hue, BlockColor};
use crate::navigation::NavigationState;
use crate::tree::{FileTree, NodeKind};
use crate::treemap::{Rect, SquarifiedTreemap};

/// Label of the synthetic block holding children that are not drawn individually.
pub const OTHERS_LABEL: &str = "others";

/// Geometry and visibility knobs for block layout. Lengths are in the same units
/// as the destination rectangle (pixels for a GUI, cells for a terminal).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Outline drawn on every side of a block.
    pub border: f32,
    /// Inset inside the border on every side.
    pub padding: f32,
    /// Natural height of the label strip.
    pub label_height: f32,
    /// Gap between the label strip and the child area.
    pub spacing: f32,
    /// Child areas narrower or shorter than this are treated as absent.
    pub min_child_side: f32,
    /// Hard cap on individually drawn children per directory.
    pub max_children: usize,
    /// Children whose share of the child area is below this go to "others"; 0 disables.
    pub min_visible_area: f32,
    /// Blocks at this depth are placed but never decomposed.
    pub max_depth: u16,
    /// Stand-in size for zero-size children so they still get a sliver.
    pub zero_size_epsilon: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            border: 1.0,
            padding: 2.0,
            label_height: 12.0,
            spacing: 2.0,
            min_child_side: 20.0,
            max_children: 2000,
            min_visible_area: 4.0,
            max_depth: 10,
            zero_size_epsilon: 1e-6,
        }
    }
}

impl LayoutConfig {
    /// Cell-based sizing: a one-cell outline and no separate label strip (the
    /// label is drawn on the top outline row).
    pub fn terminal() -> Self {
        Self {
            border: 1.0,
            padding: 0.0,
            label_height: 0.0,
            spacing: 0.0,
            min_child_side: 3.0,
            min_visible_area: 1.0,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BlockTarget {
    Node(NodeId),
    /// Aggregate of `count` children of `parent` too small or too many to draw.
    Others { parent: NodeId, size: u64, count: usize },
}

/// One laid-out block. Every visited node gets exactly one.
#[derive(Debug, Clone)]
pub struct Placement {
    pub rect: Rect,
    pub target: BlockTarget,
    pub depth: u16,
    pub label: String,
    pub label_rect: Option<Rect>,
    pub kind: NodeKind,
    pub size: u64,
    pub color: BlockColor,
    pub selected: bool,
    /// False while the node's subtree is still being scanned.
    pub complete: bool,
}

impl Placement {
    pub fn node(&self) -> Option<NodeId> {
        match self.target {
            BlockTarget::Node(id) => Some(id),
            BlockTarget::Others { .. } => None,
        }
    }

    pub fn is_others(&self) -> bool {
        matches!(self.target, BlockTarget::Others { .. })
    }
}

/// Block area outside the child area of a decomposed directory; a double click
/// there zooms into `node` instead of one of its children.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoomRegion {
    pub full_rect: Rect,
    pub child_rect: Rect,
    pub node: NodeId,
    pub depth: u16,
}

impl ZoomRegion {
    pub fn contains(&self, x: f32, y: f32) -> bool {
        self.full_rect.contains(x, y) && !self.child_rect.contains(x, y)
    }
}

#[derive(Debug, Clone, Default)]
pub struct BlockLayout {
    pub placements: Vec<Placement>,
    pub zoom_regions: Vec<ZoomRegion>,
}

impl BlockLayout {
    /// Deepest block under the point (the one a tooltip describes).
    pub fn node_at(&self, x: f32, y: f32) -> Option<&Placement> {
        self.placements
            .iter()
            .filter(|p| p.rect.contains(x, y))
            .max_by_key(|p| p.depth)
    }

    /// Deepest directory whose zoomable region holds the point.
    pub fn zoom_target_at(&self, x: f32, y: f32) -> Option<NodeId> {
        self.zoom_regions
            .iter()
            .filter(|r| r.contains(x, y))
            .max_by_key(|r| r.depth)
            .map(|r| r.node)
    }
}

/// Label strip and child area carved out of a block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockChrome {
    pub label_rect: Option<Rect>,
    /// `None` when the block has no children area or it is below the usable minimum.
    pub child_rect: Option<Rect>,
}

pub struct BlockLayoutEngine {
    config: LayoutConfig,
}

struct LayoutPass<'a> {
    config: &'a LayoutConfig,
    tree: &'a FileTree,
    nav: &'a NavigationState,
    selected: Option<NodeId>,
    out: BlockLayout,
}

impl BlockLayoutEngine {
    pub fn new(config: LayoutConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    /// Lay out the navigation's current node over `rect`.
    pub fn layout_view(
        &self,
        tree: &FileTree,
        nav: &NavigationState,
        rect: Rect,
        selected: Option<NodeId>,
    ) -> BlockLayout {
        self.layout(tree, nav.current(), rect, 0, nav, selected)
    }

    /// Lay out `node` and its visible descendants over `rect`, starting at `depth`.
    ///
    /// Reads the tree only; the single side effect is filling the navigation's hue
    /// cache for nodes seen for the first time.
    pub fn layout(
        &self,
        tree: &FileTree,
        node: NodeId,
        rect: Rect,
        depth: u16,
        nav: &NavigationState,
        selected: Option<NodeId>,
    ) -> BlockLayout {
        let mut pass = LayoutPass {
            config: &self.config,
            tree,
            nav,
            selected,
            out: BlockLayout::default(),
        };
        pass.layout_block(node, rect, depth);
        pass.out
    }

    pub fn chrome(&self, rect: Rect, wants_children: bool) -> BlockChrome {
        block_chrome(&self.config, rect, wants_children)
    }
}

impl Default for BlockLayoutEngine {
    fn default() -> Self {
        Self::new(LayoutConfig::default())
    }
}

/// Split a block top to bottom into border, padding, label, spacing and child area.
///
/// When height runs short the child area gives way first, then the spacing, then
/// the label; top and bottom padding go last and always stay equal.
pub fn block_chrome(config: &LayoutConfig, rect: Rect, wants_children: bool) -> BlockChrome {
    let inner = Rect::new(
        rect.x + config.border,
        rect.y + config.border,
        rect.width - 2.0 * config.border,
        rect.height - 2.0 * config.border,
    );
    if inner.is_empty() {
        return BlockChrome {
            label_rect: None,
            child_rect: None,
        };
    }

    let pad_x = config.padding.min(inner.width / 2.0);
    let content_x = inner.x + pad_x;
    let content_width = inner.width - 2.0 * pad_x;

    let mut remaining = inner.height;
    let pads = (2.0 * config.padding).min(remaining);
    remaining -= pads;
    let pad_top = pads / 2.0;
    let label = config.label_height.min(remaining);
    remaining -= label;
    let (spacing, child_height) = if wants_children {
        let spacing = config.spacing.min(remaining);
        (spacing, remaining - spacing)
    } else {
        (0.0, 0.0)
    };

    let label_rect = Rect::new(content_x, inner.y + pad_top, content_width, label);
    let child_rect = Rect::new(
        content_x,
        inner.y + pad_top + label + spacing,
        content_width,
        child_height,
    );
    let usable = wants_children
        && !child_rect.is_empty()
        && child_rect.width >= config.min_child_side
        && child_rect.height >= config.min_child_side;

    BlockChrome {
        label_rect: (!label_rect.is_empty()).then_some(label_rect),
        child_rect: usable.then_some(child_rect),
    }
}

impl LayoutPass<'_> {
    fn layout_block(&mut self, node_id: NodeId, rect: Rect, depth: u16) {
        if rect.is_empty() {
            return;
        }
        let tree = self.tree;
        let Some(node) = tree.get(node_id) else {
            return;
        };

        let base = self.nav.base_hue();
        let hue = self
            .nav
            .hues()
            .get_or_assign(&node.path, || depth_hue(base, depth as usize));

        let decomposable = node.is_dir() && tree.has_children(node_id) && depth < self.config.max_depth;
        let chrome = block_chrome(self.config, rect, decomposable);
        let selected = self.selected == Some(node_id);

        self.out.placements.push(Placement {
            rect,
            target: BlockTarget::Node(node_id),
            depth,
            label: node.name.clone(),
            label_rect: chrome.label_rect,
            kind: node.kind,
            size: node.size,
            color: BlockColor::for_node(hue, node.kind, selected),
            selected,
            complete: node.complete,
        });

        let Some(child_rect) = chrome.child_rect else {
            return;
        };

        self.out.zoom_regions.push(ZoomRegion {
            full_rect: rect,
            child_rect,
            node: node_id,
            depth,
        });
        self.layout_children(node_id, child_rect, depth + 1);
    }

    fn layout_children(&mut self, parent: NodeId, area: Rect, depth: u16) {
        let tree = self.tree;
        let mut children: Vec<(NodeId, u64)> = tree
            .children(parent)
            .filter_map(|id| tree.get(id).map(|n| (id, n.size)))
            .collect();
        if children.is_empty() {
            return;
        }
        // Stable: equal sizes keep scan order.
        children.sort_by(|a, b| b.1.cmp(&a.1));

        let total: u64 = children.iter().map(|(_, size)| size).sum();
        let area_size = area.area() as f64;

        let mut visible_len = children.len().min(self.config.max_children);
        if self.config.min_visible_area > 0.0 && total > 0 {
            let min_area = self.config.min_visible_area as f64;
            visible_len = children[..visible_len]
                .iter()
                .take_while(|(_, size)| *size as f64 / total as f64 * area_size >= min_area)
                .count();
        }

        let (visible, others) = children.split_at(visible_len);
        let visible_total: u64 = visible.iter().map(|(_, size)| size).sum();
        let others_size = total - visible_total;

        // With nothing to weigh by, the split follows the child counts.
        let fraction = if others.is_empty() {
            1.0
        } else if total == 0 {
            visible.len() as f32 / children.len() as f32
        } else {
            (visible_total as f64 / total as f64) as f32
        };

        let (visible_rect, others_rect) = if area.width >= area.height {
            let split = area.height * fraction;
            (
                Rect::new(area.x, area.y, area.width, split),
                Rect::new(area.x, area.y + split, area.width, area.height - split),
            )
        } else {
            let split = area.width * fraction;
            (
                Rect::new(area.x, area.y, split, area.height),
                Rect::new(area.x + split, area.y, area.width - split, area.height),
            )
        };

        if !visible.is_empty() && !visible_rect.is_empty() {
            let visible_area = visible_rect.area() as f64;
            let areas: Vec<f32> = if visible_total == 0 {
                vec![(visible_area / visible.len() as f64) as f32; visible.len()]
            } else {
                visible
                    .iter()
                    .map(|(_, size)| {
                        let size = if *size > 0 {
                            *size as f64
                        } else {
                            self.config.zero_size_epsilon
                        };
                        (size / visible_total as f64 * visible_area) as f32
                    })
                    .collect()
            };

            let rects = SquarifiedTreemap::squarify(&areas, visible_rect);
            for (&(child, _), rect) in visible.iter().zip(rects) {
                self.layout_block(child, rect, depth);
            }
        }

        if !others.is_empty() && !others_rect.is_empty() {
            let chrome = block_chrome(self.config, others_rect, false);
            self.out.placements.push(Placement {
                rect: others_rect,
                target: BlockTarget::Others {
                    parent,
                    size: others_size,
                    count: others.len(),
                },
                depth,
                label: OTHERS_LABEL.to_string(),
                label_rect: chrome.label_rect,
                kind: NodeKind::File,
                size: others_size,
                color: BlockColor::others(),
                selected: false,
                complete: true,
            });
        }
    }
}
