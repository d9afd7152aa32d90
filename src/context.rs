use chrono::{DateTime, Local};
use std::time::Instant;
use tracing::{info_span, Span};
use uuid::Uuid;

use crate::config::ScrapeConfig;

/// Per-run state handed to the scraper and the exporter.
///
/// Built once in `main` from a validated [`ScrapeConfig`]; nothing in here
/// outlives the process.
#[derive(Debug)]
pub struct RunContext {
    pub config: ScrapeConfig,
    pub run_id: Uuid,
    pub started_at: DateTime<Local>,
    started: Instant,
    span: Span,
}

impl RunContext {
    pub fn new(config: ScrapeConfig) -> Self {
        let run_id = Uuid::new_v4();
        let span = info_span!("run", run_id = %run_id.simple());

        Self {
            config,
            run_id,
            started_at: Local::now(),
            started: Instant::now(),
            span,
        }
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.started.elapsed()
    }
}
