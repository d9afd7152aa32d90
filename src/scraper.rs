use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::Client;
use std::collections::{BTreeSet, HashSet};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::ScrapeConfig;
use crate::context::RunContext;
use crate::models::ProductRecord;
use crate::parser::{discover_collections, parse_listing, parse_product_details};
use crate::utils::error::{AppError, Result};
use crate::utils::retry::{retry, RetryPolicy};

/// Collections always scraped when none are requested, on top of the ones
/// discovered from the storefront navigation.
pub const KNOWN_COLLECTIONS: [&str; 13] = [
    "newitems",
    "chiikawarestaurant",
    "tokyomiyage",
    "ramenbuta",
    "tenshitoakuma",
    "rakko20250718",
    "chiikawa-sushi",
    "chiikawabakery",
    "magicalchiikawa",
    "shisamatsuri",
    "smartphonesticker",
    "parallelworld",
    "oshikatsu",
];

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScrapeStats {
    pub pages_fetched: usize,
    pub pages_failed: usize,
    pub nodes_skipped: usize,
    pub duplicates: usize,
    pub filtered_out: usize,
    pub details_fetched: usize,
    pub details_failed: usize,
}

#[derive(Debug, Default)]
pub struct ScrapeOutcome {
    pub records: Vec<ProductRecord>,
    pub stats: ScrapeStats,
}

impl ScrapeOutcome {
    fn is_full(&self, max_products: Option<usize>) -> bool {
        max_products.is_some_and(|max| self.records.len() >= max)
    }
}

/// Sequential listing scraper. Owns the HTTP session for the whole run.
pub struct Scraper<'a> {
    ctx: &'a RunContext,
    client: Client,
    base_url: Url,
    policy: RetryPolicy,
    requests_sent: usize,
}

impl<'a> Scraper<'a> {
    pub fn new(ctx: &'a RunContext) -> Result<Self> {
        let config = &ctx.config;
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| AppError::config(format!("invalid base URL '{}': {}", config.base_url, e)))?;

        Ok(Self {
            ctx,
            client: build_client(config)?,
            base_url,
            policy: config.retry_policy(),
            requests_sent: 0,
        })
    }

    fn config(&self) -> &ScrapeConfig {
        &self.ctx.config
    }

    /// Walk every target collection and return the filtered, de-duplicated
    /// and capped record list.
    pub async fn scrape(&mut self) -> Result<ScrapeOutcome> {
        let collections = self.target_collections().await;
        info!("Target collections ({}): {:?}", collections.len(), collections);

        let mut outcome = ScrapeOutcome::default();
        let mut seen = HashSet::new();

        for collection in &collections {
            if outcome.is_full(self.config().max_products) {
                break;
            }

            info!("Processing collection '{}'", collection);
            let added = self.scrape_collection(collection, &mut outcome, &mut seen).await?;
            info!("Collection '{}': {} products", collection, added);

            if added == 0 && self.config().collections.contains(collection) {
                warn!("Requested collection '{}' yielded no matching products", collection);
            }
        }

        let stats = &outcome.stats;
        info!(
            "Scrape finished: {} records, {} pages ({} failed), {} nodes skipped, {} duplicates, {} filtered out",
            outcome.records.len(),
            stats.pages_fetched,
            stats.pages_failed,
            stats.nodes_skipped,
            stats.duplicates,
            stats.filtered_out
        );
        if self.config().fetch_details {
            info!(
                "Product details: {} fetched, {} failed",
                stats.details_fetched, stats.details_failed
            );
        }

        Ok(outcome)
    }

    async fn target_collections(&mut self) -> Vec<String> {
        if !self.config().collections.is_empty() {
            return self.config().collections.iter().cloned().collect();
        }

        let mut collections: BTreeSet<String> =
            KNOWN_COLLECTIONS.iter().map(|c| c.to_string()).collect();

        let home = self.base_url.clone();
        match self.fetch(&home).await {
            Ok(html) => {
                let discovered = discover_collections(&html);
                debug!("Discovered collections: {:?}", discovered);
                collections.extend(discovered);
                info!("Found {} collections", collections.len());
            }
            Err(err) => {
                warn!("Collection discovery failed, using the built-in list: {}", err);
            }
        }

        collections.into_iter().collect()
    }

    async fn scrape_collection(
        &mut self,
        collection: &str,
        outcome: &mut ScrapeOutcome,
        seen: &mut HashSet<String>,
    ) -> Result<usize> {
        let before = outcome.records.len();
        let max_pages = self.config().max_pages_per_collection;

        for page in 1..=max_pages {
            let url = self.listing_url(collection, page)?;
            let html = match self.fetch(&url).await {
                Ok(html) => html,
                Err(err) => {
                    outcome.stats.pages_failed += 1;
                    warn!("Skipping {} after failed fetch: {}", url, err);
                    break;
                }
            };
            outcome.stats.pages_fetched += 1;

            let listing = parse_listing(&html, &url, collection);
            outcome.stats.nodes_skipped += listing.skipped;
            if listing.products.is_empty() {
                debug!(
                    "No products on {} ({} nodes), ending pagination",
                    url, listing.node_count
                );
                break;
            }
            debug!("Collection '{}' page {}: {} products", collection, page, listing.products.len());

            for mut record in listing.products {
                if seen.contains(&record.id) {
                    outcome.stats.duplicates += 1;
                    continue;
                }

                if self.config().fetch_details {
                    self.apply_details(&mut record, &mut outcome.stats).await;
                }

                // Only kept records claim their id; a product filtered out here
                // may still match under another collection.
                let statuses = &self.config().statuses;
                if !statuses.is_empty() && !statuses.contains(&record.status) {
                    outcome.stats.filtered_out += 1;
                    continue;
                }

                seen.insert(record.id.clone());
                outcome.records.push(record);
                if outcome.is_full(self.config().max_products) {
                    info!("Reached max products ({})", outcome.records.len());
                    return Ok(outcome.records.len() - before);
                }
            }
        }

        Ok(outcome.records.len() - before)
    }

    async fn apply_details(&mut self, record: &mut ProductRecord, stats: &mut ScrapeStats) {
        let url = match Url::parse(&record.url) {
            Ok(url) => url,
            Err(err) => {
                stats.details_failed += 1;
                debug!("Not fetching details for {}: {}", record.url, err);
                return;
            }
        };

        match self.fetch(&url).await {
            Ok(html) => {
                let details = parse_product_details(&html);
                if let Some(status) = details.status {
                    record.status = status;
                }
                if let Some(price) = details.price {
                    record.price = price;
                }
                stats.details_fetched += 1;
            }
            Err(err) => {
                stats.details_failed += 1;
                warn!("Keeping listing values for {}: {}", url, err);
            }
        }
    }

    pub fn listing_url(&self, collection: &str, page: u32) -> Result<Url> {
        let mut url = self
            .base_url
            .join(&format!("/collections/{}", collection))
            .map_err(|e| AppError::parse(format!("bad collection URL for '{}': {}", collection, e)))?;
        url.query_pairs_mut().append_pair("page", &page.to_string());
        Ok(url)
    }

    /// GET `url` through the retry helper, sleeping the pacing delay first
    /// unless this is the first request of the run.
    async fn fetch(&mut self, url: &Url) -> Result<String> {
        if self.requests_sent > 0 {
            let delay = self.config().delay();
            if delay > Duration::ZERO {
                tokio::time::sleep(delay).await;
            }
        }
        self.requests_sent += 1;

        let client = &self.client;
        retry(&self.policy, url.as_str(), || async move {
            debug!("GET {}", url);
            let response = client.get(url.clone()).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(AppError::Status {
                    url: url.to_string(),
                    status,
                });
            }
            Ok::<_, AppError>(response.text().await?)
        })
        .await
    }
}

fn build_client(config: &ScrapeConfig) -> Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8"),
    );
    headers.insert(
        header::ACCEPT_LANGUAGE,
        HeaderValue::from_static("ja,en-US;q=0.7,en;q=0.3"),
    );
    headers.insert(
        header::UPGRADE_INSECURE_REQUESTS,
        HeaderValue::from_static("1"),
    );

    let client = Client::builder()
        .user_agent(config.user_agent.clone())
        .default_headers(headers)
        .timeout(config.timeout())
        .build()?;
    Ok(client)
}
