use clap::Parser;
use std::path::PathBuf;

use crate::config::{parse_collections, parse_statuses, OutputFormat, Preset, ScrapeConfig};
use crate::utils::error::{AppError, Result};

/// Scrape the Chiikawa Market storefront and export the product list.
#[derive(Debug, Parser)]
#[command(name = "chiikawa-scraper")]
#[command(version, about)]
pub struct Args {
    /// Output format
    #[arg(short, long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Output file; its extension is replaced per format
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Comma separated collection slugs, or "all"
    #[arg(short, long)]
    pub collections: Option<String>,

    /// Comma separated statuses (in_stock, sold_out, new_item, preorder), or "all"
    #[arg(short, long)]
    pub status: Option<String>,

    /// Stop after this many products
    #[arg(short, long)]
    pub max_products: Option<usize>,

    /// Seconds to wait between requests
    #[arg(short, long)]
    pub delay: Option<f64>,

    /// Debug logging on console and in the log file
    #[arg(short, long)]
    pub verbose: bool,

    /// Named starting values for pacing and retries
    #[arg(long, value_enum)]
    pub preset: Option<Preset>,

    /// Fetch each product page to refine status and price
    #[arg(long)]
    pub details: bool,

    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Per-request timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    #[arg(long)]
    pub base_url: Option<String>,

    /// Settings file (toml, yaml or json)
    #[arg(long = "config", value_name = "FILE")]
    pub config_file: Option<PathBuf>,
}

impl Args {
    /// Layer the preset and then every explicit flag over `config`.
    pub fn apply_to(&self, config: &mut ScrapeConfig) -> Result<()> {
        if let Some(preset) = self.preset {
            preset.apply(config);
        }

        if let Some(format) = self.format {
            config.output_format = format;
        }
        if let Some(output) = &self.output {
            if output.as_os_str().is_empty() {
                return Err(AppError::config("output path must not be empty"));
            }
            config.output = Some(output.clone());
        }
        if let Some(list) = &self.collections {
            config.collections = parse_collections(list)?;
        }
        if let Some(list) = &self.status {
            config.statuses = parse_statuses(list)?;
        }
        if let Some(max) = self.max_products {
            config.max_products = Some(max);
        }
        if let Some(delay) = self.delay {
            config.delay_secs = delay;
        }
        if self.details {
            config.fetch_details = true;
        }
        if let Some(retries) = self.max_retries {
            config.max_retries = retries;
        }
        if let Some(timeout) = self.timeout {
            config.timeout_secs = timeout;
        }
        if let Some(base_url) = &self.base_url {
            config.base_url = base_url.clone();
        }

        Ok(())
    }
}
