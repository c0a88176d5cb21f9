pub mod tree_scanner;

pub use tree_scanner::{ScanConfig, TreeScanner};
