use std::fs;
use std::path::Path;

use spacemap::crawler::ScanConfig;
use spacemap::navigation::{NavigationState, ReloadPolicy};
use spacemap::render_tree::{BlockLayoutEngine, BlockTarget, LayoutConfig};
use spacemap::scan_session::{ScanController, ScanEvent};
use spacemap::treemap::Rect;
use spacemap::ScanOutput;
use tempfile::TempDir;

fn write_file(path: &Path, size: usize) {
    fs::write(path, vec![b'x'; size]).unwrap();
}

fn scan(controller: &mut ScanController, root: &Path) -> ScanOutput {
    controller.start_scan(root);
    let handle = controller.take_active().unwrap();
    match handle.wait() {
        Some(ScanEvent::Finished(output)) => output,
        other => panic!("scan did not finish: {other:?}"),
    }
}

fn sample_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    write_file(&dir.path().join("a"), 100);
    fs::create_dir(dir.path().join("b")).unwrap();
    write_file(&dir.path().join("b/c"), 50);
    write_file(&dir.path().join("b/d"), 50);
    dir
}

#[test]
fn scan_then_layout_covers_every_node() {
    let dir = sample_dir();
    let mut controller = ScanController::new(ScanConfig::default());
    let output = scan(&mut controller, dir.path());
    assert_eq!(output.tree.total_size(), 200);

    let nav = NavigationState::new(&output.tree);
    let engine = BlockLayoutEngine::new(LayoutConfig::default());
    let layout = engine.layout_view(&output.tree, &nav, Rect::new(0.0, 0.0, 800.0, 600.0), None);

    // root, a, b, b/c, b/d
    assert_eq!(layout.placements.len(), 5);
    assert!(layout.placements.iter().all(|p| matches!(p.target, BlockTarget::Node(_))));
    assert!(layout.placements.iter().all(|p| p.complete));

    let b = output.tree.get_node(&dir.path().join("b")).unwrap();
    assert!(layout.zoom_regions.iter().any(|r| r.node == b));
}

#[test]
fn zoom_and_reload_keep_position() {
    let dir = sample_dir();
    let mut controller = ScanController::new(ScanConfig::default());
    let first = scan(&mut controller, dir.path());

    let mut nav = NavigationState::new(&first.tree);
    let b = first.tree.get_node(&dir.path().join("b")).unwrap();
    nav.zoom_into(&first.tree, b).unwrap();

    write_file(&dir.path().join("b/e"), 25);
    let second = scan(&mut controller, dir.path());
    assert_eq!(second.tree.total_size(), 225);

    let reset = nav.after_rescan(&first.tree, &second.tree, ReloadPolicy::ResetToTop);
    assert!(reset.is_at_top());

    let relocated = nav.after_rescan(&first.tree, &second.tree, ReloadPolicy::RelocateCurrent);
    let new_b = second.tree.get_node(&dir.path().join("b")).unwrap();
    assert_eq!(relocated.current(), new_b);

    let engine = BlockLayoutEngine::new(LayoutConfig::terminal());
    let layout = engine.layout_view(&second.tree, &relocated, Rect::new(0.0, 0.0, 80.0, 24.0), None);
    assert_eq!(layout.placements[0].node(), Some(new_b));
    assert_eq!(layout.placements.len(), 4);
}
