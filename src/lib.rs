pub mod config;
pub mod crawler;
pub mod error;
pub mod hue;
pub mod logging;
pub mod navigation;
pub mod render_tree;
pub mod scan_session;
pub mod tree;
pub mod treemap;

pub use config::Config;
pub use crawler::{CancelToken, FileCrawler, ScanConfig, ScanOutput, ScanProgress, ScanStats};
pub use error::{ConfigError, NavigationError, ScanError};
pub use navigation::NavigationState;
pub use render_tree::{BlockLayout, BlockLayoutEngine, LayoutConfig, Placement};
pub use scan_session::{ScanController, ScanEvent, ScanHandle};
pub use tree::FileTree;
