use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use clap::Parser;
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyModifiers,
    MouseButton, MouseEvent, MouseEventKind,
};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use indextree::NodeId;
use ratatui::backend::CrosstermBackend;
use ratatui::buffer::Buffer;
use ratatui::layout::{Constraint, Layout, Rect as UiRect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Widget, Wrap};
use ratatui::{Frame, Terminal};
use spacemap::config::{self, Config};
use spacemap::crawler::{ScanOutput, ScanStats};
use spacemap::logging::init_logging;
use spacemap::navigation::{NavigationState, ReloadPolicy};
use spacemap::render_tree::{BlockLayout, BlockLayoutEngine, BlockTarget, LayoutConfig, Placement};
use spacemap::scan_session::{ScanController, ScanEvent};
use spacemap::tree::{format_size, FileTree, NodeKind};
use spacemap::treemap::Rect;
use std::io::{self, stdout};
use std::path::PathBuf;
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, info};

const DOUBLE_CLICK: Duration = Duration::from_millis(400);

/// Disk usage treemap in the terminal.
#[derive(Parser, Debug)]
#[command(name = "spacemap-tui", version, about)]
struct Args {
    /// Directory to scan
    #[arg(default_value = ".")]
    path: PathBuf,

    /// Config file; defaults to $SPACEMAP_CONFIG or the platform config directory
    #[arg(short, long)]
    config: Option<PathBuf>,
}

/// A scanned tree and the zoom position inside it.
struct View {
    tree: FileTree,
    nav: NavigationState,
    /// Snapshot of a scan still in flight.
    partial: bool,
}

struct App {
    path_input: String,
    input_mode: bool,
    status: String,

    controller: ScanController,
    reload_policy: ReloadPolicy,
    engine: BlockLayoutEngine,

    view: Option<View>,
    /// Finished view from before the running scan, put back if that scan does not finish.
    previous: Option<View>,
    last_stats: Option<ScanStats>,

    selected: Option<PathBuf>,
    layout: BlockLayout,
    generation: u64,
    layout_key: Option<(UiRect, u64)>,

    treemap_area: Option<UiRect>,
    path_input_area: Option<UiRect>,
    last_click: Option<(Instant, u16, u16)>,

    should_quit: bool,
}

/// Cell-sized layout that keeps the configured visibility limits.
fn terminal_layout(configured: &LayoutConfig) -> LayoutConfig {
    LayoutConfig {
        max_children: configured.max_children,
        max_depth: configured.max_depth,
        zero_size_epsilon: configured.zero_size_epsilon,
        ..LayoutConfig::terminal()
    }
}

impl App {
    fn new(config: &Config, path: PathBuf) -> Self {
        Self {
            path_input: path.display().to_string(),
            input_mode: false,
            status: String::from("Ready"),
            controller: ScanController::new(config.scan.clone()),
            reload_policy: config.navigation.reload,
            engine: BlockLayoutEngine::new(terminal_layout(&config.layout)),
            view: None,
            previous: None,
            last_stats: None,
            selected: None,
            layout: BlockLayout::default(),
            generation: 0,
            layout_key: None,
            treemap_area: None,
            path_input_area: None,
            last_click: None,
            should_quit: false,
        }
    }

    fn invalidate(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }

    fn start_scan_of(&mut self, path: PathBuf) {
        if let Some(shown) = self.view.take() {
            if !shown.partial {
                self.previous = Some(shown);
            }
        }
        self.status = format!("Scanning {} ...", path.display());
        self.path_input = path.display().to_string();
        self.controller.start_scan(&path);
        self.invalidate();
    }

    fn start_scan(&mut self) {
        let path = match self.path_input.trim() {
            "" => PathBuf::from("."),
            p => PathBuf::from(p),
        };
        self.start_scan_of(path);
    }

    fn reload(&mut self) {
        let root = self
            .view
            .as_ref()
            .or(self.previous.as_ref())
            .map(|v| v.tree.root_path().to_path_buf());
        match root {
            Some(root) => self.start_scan_of(root),
            None => self.start_scan(),
        }
    }

    fn stop_scan(&mut self) {
        if self.controller.is_scanning() {
            self.controller.cancel_scan();
            self.status = "Stopping scan ...".to_string();
        }
    }

    fn poll_scan_updates(&mut self) {
        for event in self.controller.poll() {
            match event {
                ScanEvent::Progress(progress) => {
                    self.status = format!(
                        "Scanning ({} entries): {}",
                        progress.visited_entries,
                        progress.path.display()
                    );
                    if let Some(snapshot) = progress.snapshot {
                        self.show_snapshot(snapshot);
                    }
                }
                ScanEvent::Finished(output) => self.finish_scan(output),
                ScanEvent::Cancelled => {
                    self.status = "Scan stopped".to_string();
                    self.restore_previous();
                }
                ScanEvent::Error(message) => {
                    self.status = format!("Scan failed: {}", message);
                    self.restore_previous();
                }
            }
        }
    }

    fn show_snapshot(&mut self, tree: FileTree) {
        let nav = match self.view.take() {
            Some(shown) if shown.partial => shown.nav.after_rescan(&shown.tree, &tree, ReloadPolicy::RelocateCurrent),
            _ => NavigationState::new(&tree),
        };
        self.view = Some(View { tree, nav, partial: true });
        self.invalidate();
    }

    fn finish_scan(&mut self, output: ScanOutput) {
        let ScanOutput { tree, stats } = output;
        let nav = match self.previous.take() {
            Some(prev) if prev.tree.root_path() == tree.root_path() => {
                prev.nav.after_rescan(&prev.tree, &tree, self.reload_policy)
            }
            _ => NavigationState::new(&tree),
        };

        let mut status = format!(
            "Scan complete: {} files, {} dirs, {} in {} ms",
            stats.total_files,
            stats.total_dirs,
            format_size(stats.total_size),
            stats.duration_ms,
        );
        if stats.errors > 0 {
            status.push_str(&format!(" ({} unreadable directories)", stats.errors));
        }
        info!(files = stats.total_files, dirs = stats.total_dirs, "showing finished scan");

        self.status = status;
        self.last_stats = Some(stats);
        self.view = Some(View { tree, nav, partial: false });
        self.invalidate();
    }

    fn restore_previous(&mut self) {
        match self.previous.take() {
            Some(prev) => self.view = Some(prev),
            None => {
                if self.view.as_ref().is_some_and(|v| v.partial) {
                    self.view = None;
                }
            }
        }
        self.invalidate();
    }

    fn zoom_into(&mut self, target: NodeId) {
        let Some(view) = self.view.as_mut() else {
            return;
        };
        if view.nav.current() == target {
            return;
        }
        match view.nav.zoom_into(&view.tree, target) {
            Ok(()) => self.invalidate(),
            Err(err) => self.status = err.to_string(),
        }
    }

    fn zoom_selected(&mut self) {
        let target = self.view.as_ref().and_then(|view| {
            let path = self.selected.as_deref()?;
            view.tree.get_node(path)
        });
        if let Some(target) = target {
            self.zoom_into(target);
        }
    }

    fn go_up(&mut self) {
        let Some(view) = self.view.as_mut() else {
            return;
        };
        match view.nav.go_up(&view.tree) {
            Ok(()) => self.invalidate(),
            Err(err) => self.status = err.to_string(),
        }
    }

    fn go_top(&mut self) {
        if let Some(view) = self.view.as_mut() {
            view.nav.go_top(&view.tree);
            self.invalidate();
        }
    }

    fn on_key(&mut self, key: KeyEvent) {
        if key.modifiers.contains(KeyModifiers::CONTROL) && matches!(key.code, KeyCode::Char('c')) {
            self.should_quit = true;
            return;
        }

        if self.input_mode {
            match key.code {
                KeyCode::Enter => {
                    self.input_mode = false;
                    self.start_scan();
                }
                KeyCode::Esc => self.input_mode = false,
                KeyCode::Backspace => {
                    self.path_input.pop();
                }
                KeyCode::Char(ch) => self.path_input.push(ch),
                _ => {}
            }
            return;
        }

        match key.code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Char('/') => self.input_mode = true,
            KeyCode::Char('s') | KeyCode::Esc => self.stop_scan(),
            KeyCode::Char('r') => self.reload(),
            KeyCode::Char('u') | KeyCode::Backspace => self.go_up(),
            KeyCode::Char('t') => self.go_top(),
            KeyCode::Char('z') | KeyCode::Enter => self.zoom_selected(),
            _ => {}
        }
    }

    fn on_mouse(&mut self, event: MouseEvent) {
        match event.kind {
            MouseEventKind::Down(MouseButton::Left) => {
                if let Some(area) = self.path_input_area {
                    if point_in_rect(area, event.column, event.row) {
                        self.input_mode = true;
                        return;
                    }
                }
                let Some((x, y)) = self.layout_point(event.column, event.row) else {
                    return;
                };

                let double = self.last_click.is_some_and(|(at, col, row)| {
                    at.elapsed() <= DOUBLE_CLICK && col == event.column && row == event.row
                });
                if double {
                    self.last_click = None;
                    self.zoom_at(x, y);
                } else {
                    self.last_click = Some((Instant::now(), event.column, event.row));
                    self.select_at(x, y);
                }
            }
            MouseEventKind::Down(MouseButton::Right) | MouseEventKind::Down(MouseButton::Middle) => self.go_up(),
            _ => {}
        }
    }

    /// Centre of a terminal cell in layout coordinates.
    fn layout_point(&self, column: u16, row: u16) -> Option<(f32, f32)> {
        let area = self.treemap_area?;
        if !point_in_rect(area, column, row) {
            return None;
        }
        Some(((column - area.x) as f32 + 0.5, (row - area.y) as f32 + 0.5))
    }

    fn select_at(&mut self, x: f32, y: f32) {
        let Some(placement) = self.layout.node_at(x, y) else {
            return;
        };
        match placement.target {
            BlockTarget::Node(id) => {
                let path = self.view.as_ref().and_then(|v| v.tree.get(id)).map(|n| n.path.clone());
                self.status = format!("{} ({})", placement.label, format_size(placement.size));
                self.selected = path;
                self.invalidate();
            }
            BlockTarget::Others { size, count, .. } => {
                self.status = format!("{} smaller items, {}", count, format_size(size));
            }
        }
    }

    /// Zoom into the directory owning the clicked label or outline, else into the
    /// clicked directory or the directory holding the clicked file.
    fn zoom_at(&mut self, x: f32, y: f32) {
        let target = self.layout.zoom_target_at(x, y).or_else(|| {
            let id = self.layout.node_at(x, y)?.node()?;
            let view = self.view.as_ref()?;
            if view.tree.get(id)?.is_dir() {
                Some(id)
            } else {
                view.tree.parent(id)
            }
        });
        if let Some(target) = target {
            debug!(?target, "double click zoom");
            self.zoom_into(target);
        }
    }

    fn refresh_layout(&mut self, area: UiRect) {
        self.treemap_area = Some(area);
        if self.layout_key == Some((area, self.generation)) {
            return;
        }
        self.layout_key = Some((area, self.generation));

        let Some(view) = self.view.as_ref() else {
            self.layout = BlockLayout::default();
            return;
        };
        let selected = self.selected.as_deref().and_then(|p| view.tree.get_node(p));
        let rect = Rect::new(0.0, 0.0, area.width as f32, area.height as f32);
        self.layout = self.engine.layout_view(&view.tree, &view.nav, rect, selected);
    }

    fn detail_lines(&self) -> Vec<Line<'static>> {
        let key = |k: &str| Span::styled(k.to_string(), Style::default().fg(Color::Gray));
        let mut lines = Vec::new();

        let Some(view) = self.view.as_ref() else {
            lines.push(Line::from("No scan loaded"));
            return lines;
        };

        if let Some(current) = view.tree.get(view.nav.current()) {
            lines.push(Line::from(vec![key("View: "), Span::raw(current.path.display().to_string())]));
        }
        lines.push(Line::from(vec![
            key("Zoom: "),
            Span::raw(view.nav.zoom_depth().to_string()),
            Span::raw(if view.nav.can_go_up(&view.tree) { "  (u: up)" } else { "" }),
        ]));

        let selected = self
            .selected
            .as_deref()
            .and_then(|p| view.tree.get_node(p))
            .and_then(|id| view.tree.get(id));
        match selected {
            Some(node) => {
                lines.push(Line::from(vec![key("Selected: "), Span::raw(node.path.display().to_string())]));
                lines.push(Line::from(vec![
                    key("Type: "),
                    Span::raw(match node.kind {
                        NodeKind::Directory => "directory",
                        NodeKind::File => "file",
                    }),
                    Span::raw("  "),
                    key("Size: "),
                    Span::raw(format_size(node.size)),
                ]));
                if let Some(meta) = node.metadata.as_ref() {
                    if let Some(perms) = meta.permissions_string(node.kind) {
                        let owner = match (meta.uid, meta.gid) {
                            (Some(uid), Some(gid)) => format!("  {}:{}", uid, gid),
                            _ => String::new(),
                        };
                        lines.push(Line::from(vec![key("Mode: "), Span::raw(perms), Span::raw(owner)]));
                    }
                    if let Some(modified) = meta.modified {
                        lines.push(Line::from(vec![key("Modified: "), Span::raw(format_time(modified))]));
                    }
                }
                if !node.complete {
                    lines.push(Line::from(Span::styled("still scanning", Style::default().fg(Color::Yellow))));
                }
            }
            None => lines.push(Line::from("Selected: (none)")),
        }

        if let Some(stats) = self.last_stats.as_ref() {
            lines.push(Line::from(format!(
                "Last scan: {} files, {} dirs, {}",
                stats.total_files,
                stats.total_dirs,
                format_size(stats.total_size)
            )));
        }
        lines
    }
}

fn format_time(time: SystemTime) -> String {
    DateTime::<Local>::from(time).format("%Y-%m-%d %H:%M:%S").to_string()
}

fn point_in_rect(rect: UiRect, x: u16, y: u16) -> bool {
    x >= rect.x && x < rect.x.saturating_add(rect.width) && y >= rect.y && y < rect.y.saturating_add(rect.height)
}

/// Inclusive cell bounds of a layout rectangle inside `area`.
fn cell_bounds(rect: &Rect, area: UiRect) -> Option<(u16, u16, u16, u16)> {
    if area.width == 0 || area.height == 0 || rect.is_empty() {
        return None;
    }

    let max_x = area.x.saturating_add(area.width.saturating_sub(1));
    let max_y = area.y.saturating_add(area.height.saturating_sub(1));

    let x0 = area.x.saturating_add(rect.x.round().max(0.0) as u16).clamp(area.x, max_x);
    let y0 = area.y.saturating_add(rect.y.round().max(0.0) as u16).clamp(area.y, max_y);
    let x1 = area
        .x
        .saturating_add((rect.right().round().max(1.0) as u16).saturating_sub(1))
        .clamp(area.x, max_x);
    let y1 = area
        .y
        .saturating_add((rect.bottom().round().max(1.0) as u16).saturating_sub(1))
        .clamp(area.y, max_y);

    if x1 < x0 || y1 < y0 {
        return None;
    }
    Some((x0, y0, x1, y1))
}

fn block_label(placement: &Placement) -> String {
    match placement.target {
        BlockTarget::Others { count, .. } => format!("{} ({})", placement.label, count),
        BlockTarget::Node(_) => format!("{} {}", placement.label, format_size(placement.size)),
    }
}

struct TreemapWidget<'a> {
    placements: &'a [Placement],
}

impl Widget for TreemapWidget<'_> {
    fn render(self, area: UiRect, buf: &mut Buffer) {
        if area.width == 0 || area.height == 0 {
            return;
        }

        for y in area.y..area.y.saturating_add(area.height) {
            for x in area.x..area.x.saturating_add(area.width) {
                buf[(x, y)].set_char(' ').set_style(Style::default().bg(Color::Rgb(18, 18, 20)));
            }
        }

        // Parents come before their children, so drawing in order nests correctly.
        for placement in self.placements {
            let Some((x0, y0, x1, y1)) = cell_bounds(&placement.rect, area) else {
                continue;
            };

            let (r, g, b) = placement.color.to_rgb();
            let bg = Color::Rgb(r, g, b);
            let fg = Color::Rgb(20, 20, 24);
            let outline = if placement.selected {
                Style::default().fg(Color::Rgb(246, 211, 101)).bg(bg)
            } else {
                Style::default().fg(fg).bg(bg)
            };

            for y in y0..=y1 {
                for x in x0..=x1 {
                    buf[(x, y)].set_char(' ').set_style(Style::default().bg(bg));
                }
            }

            if x1 > x0 && y1 > y0 {
                for x in x0..=x1 {
                    buf[(x, y0)].set_char('─').set_style(outline);
                    buf[(x, y1)].set_char('─').set_style(outline);
                }
                for y in y0..=y1 {
                    buf[(x0, y)].set_char('│').set_style(outline);
                    buf[(x1, y)].set_char('│').set_style(outline);
                }
                buf[(x0, y0)].set_char('┌').set_style(outline);
                buf[(x1, y0)].set_char('┐').set_style(outline);
                buf[(x0, y1)].set_char('└').set_style(outline);
                buf[(x1, y1)].set_char('┘').set_style(outline);
            }

            let label_width = x1.saturating_sub(x0).saturating_sub(1) as usize;
            if label_width < 4 {
                continue;
            }
            let label = block_label(placement);
            let label: String = if label.chars().count() > label_width {
                label.chars().take(label_width - 1).chain(std::iter::once('…')).collect()
            } else {
                label
            };

            let mut style = Style::default().fg(fg).bg(bg).add_modifier(Modifier::BOLD);
            if !placement.complete {
                style = style.add_modifier(Modifier::ITALIC);
            }
            for (i, ch) in label.chars().enumerate() {
                let x = x0.saturating_add(1).saturating_add(i as u16);
                if x >= x1 {
                    break;
                }
                buf[(x, y0)].set_char(ch).set_style(style);
            }
        }
    }
}

fn draw_ui(frame: &mut Frame, app: &mut App) {
    let root = frame.area();
    let split = Layout::horizontal([Constraint::Length(44), Constraint::Min(30)]).split(root);
    let left = split[0];
    let right = split[1];

    let left_block = Block::default().title(" spacemap ").borders(Borders::ALL);
    let left_inner = left_block.inner(left);
    frame.render_widget(left_block, left);

    let left_rows = Layout::vertical([
        Constraint::Length(3),
        Constraint::Length(5),
        Constraint::Min(8),
        Constraint::Length(6),
    ])
    .split(left_inner);

    let input_title = if app.input_mode { " Path (typing) " } else { " Path " };
    let path_block = Block::default().title(input_title).borders(Borders::ALL);
    let path_inner = path_block.inner(left_rows[0]);
    frame.render_widget(path_block, left_rows[0]);
    let path_style = if app.input_mode {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default().fg(Color::White)
    };
    frame.render_widget(Paragraph::new(app.path_input.as_str()).style(path_style), path_inner);
    app.path_input_area = Some(path_inner);

    frame.render_widget(
        Paragraph::new(app.status.as_str())
            .wrap(Wrap { trim: true })
            .block(Block::default().title(" Status ").borders(Borders::ALL)),
        left_rows[1],
    );

    frame.render_widget(
        Paragraph::new(app.detail_lines())
            .wrap(Wrap { trim: false })
            .block(Block::default().title(" Details ").borders(Borders::ALL)),
        left_rows[2],
    );

    let help_lines = vec![
        Line::from("Enter: scan path   /: edit path"),
        Line::from("click: select   double click: zoom"),
        Line::from("z: zoom selected   u: up   t: top"),
        Line::from("s/Esc: stop   r: reload   q: quit"),
    ];
    frame.render_widget(
        Paragraph::new(help_lines).block(Block::default().title(" Controls ").borders(Borders::ALL)),
        left_rows[3],
    );

    let title = match app.view.as_ref() {
        Some(view) if view.partial => " Treemap (scanning) ",
        _ => " Treemap ",
    };
    let treemap_block = Block::default().title(title).borders(Borders::ALL);
    let treemap_inner = treemap_block.inner(right);
    frame.render_widget(treemap_block, right);

    app.refresh_layout(treemap_inner);
    if app.layout.placements.is_empty() {
        frame.render_widget(
            Paragraph::new("Nothing to show yet. Press / to enter a path.").style(Style::default().fg(Color::Gray)),
            treemap_inner,
        );
    } else {
        frame.render_widget(
            TreemapWidget {
                placements: &app.layout.placements,
            },
            treemap_inner,
        );
    }
}

fn run_app(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, app: &mut App) -> io::Result<()> {
    loop {
        app.poll_scan_updates();

        terminal.draw(|frame| draw_ui(frame, app))?;

        if app.should_quit {
            break;
        }

        if event::poll(Duration::from_millis(50))? {
            match event::read()? {
                Event::Key(key) => app.on_key(key),
                Event::Mouse(mouse) => app.on_mouse(mouse),
                Event::Resize(_, _) | Event::FocusGained | Event::FocusLost | Event::Paste(_) => {}
            }
        }
    }

    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = config::load(args.config.as_deref()).context("Failed to load configuration")?;
    init_logging(&config.logging).context("Failed to initialise logging")?;
    if let Some(path) = config::resolve_config_path(args.config.as_deref()) {
        info!(path = %path.display(), "configuration loaded");
    }

    let mut app = App::new(&config, args.path.clone());
    app.start_scan_of(args.path);

    enable_raw_mode()?;
    crossterm::execute!(stdout(), EnterAlternateScreen, EnableMouseCapture)?;

    let backend = CrosstermBackend::new(stdout());
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;

    let app_result = run_app(&mut terminal, &mut app);

    disable_raw_mode()?;
    crossterm::execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;

    app_result.context("Terminal UI failed")
}
