use anyhow::{Context, Result};
use chiikawa_scraper::cli::Args;
use chiikawa_scraper::context::RunContext;
use chiikawa_scraper::logging::{self, LOG_DIR};
use chiikawa_scraper::scraper::Scraper;
use chiikawa_scraper::{exporter, ScrapeConfig};
use chrono::Local;
use clap::Parser;
use std::path::Path;
use std::process::ExitCode;
use tracing::{error, info, Instrument};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let (_guard, log_file) = match logging::init(args.verbose, Path::new(LOG_DIR), Local::now()) {
        Ok(installed) => installed,
        Err(err) => {
            eprintln!("{err:#}");
            return ExitCode::FAILURE;
        }
    };
    info!("Logging to {}", log_file.display());

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let mut config = ScrapeConfig::load(args.config_file.as_deref())
        .context("failed to load configuration")?;
    args.apply_to(&mut config)?;
    config.validate().context("invalid configuration")?;

    let ctx = RunContext::new(config);

    async {
        info!("Starting Chiikawa Market scraper against {}", ctx.config.base_url);
        info!(
            "format={:?} collections={:?} statuses={:?} max_products={:?} delay={}s details={}",
            ctx.config.output_format,
            ctx.config.collections,
            ctx.config.statuses,
            ctx.config.max_products,
            ctx.config.delay_secs,
            ctx.config.fetch_details
        );

        let mut scraper = Scraper::new(&ctx)?;
        let outcome = scraper.scrape().await?;

        let exported = exporter::export(&outcome.records, &ctx).context("export failed")?;
        for file in &exported.files {
            info!("Output file: {}", file.display());
        }

        println!("{}", exported.summary.report(ctx.elapsed()));

        Ok::<(), anyhow::Error>(())
    }
    .instrument(ctx.span().clone())
    .await
}
