pub mod cli;
pub mod config;
pub mod context;
pub mod exporter;
pub mod logging;
pub mod models;
pub mod parser;
pub mod scraper;
pub mod stats;
pub mod utils;

// Re-export commonly used types
pub use config::ScrapeConfig;
pub use utils::error::{AppError, Result};
