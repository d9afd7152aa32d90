use chrono::{DateTime, Local};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crate::models::{ProductRecord, StockStatus};
use crate::utils::text::{format_elapsed, format_yen};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PriceRange {
    Under500,
    From500To1000,
    From1000To2000,
    From2000To5000,
    From5000To10000,
    Over10000,
}

impl PriceRange {
    pub const ALL: [PriceRange; 6] = [
        PriceRange::Under500,
        PriceRange::From500To1000,
        PriceRange::From1000To2000,
        PriceRange::From2000To5000,
        PriceRange::From5000To10000,
        PriceRange::Over10000,
    ];

    /// Lower bounds are inclusive.
    pub fn of(price: Decimal) -> Self {
        let thresholds = [500, 1_000, 2_000, 5_000, 10_000];
        let index = thresholds
            .iter()
            .position(|limit| price < Decimal::from(*limit))
            .unwrap_or(thresholds.len());
        Self::ALL[index]
    }

    pub fn label(&self) -> &'static str {
        match self {
            PriceRange::Under500 => "<500",
            PriceRange::From500To1000 => "500-1000",
            PriceRange::From1000To2000 => "1000-2000",
            PriceRange::From2000To5000 => "2000-5000",
            PriceRange::From5000To10000 => "5000-10000",
            PriceRange::Over10000 => ">=10000",
        }
    }
}

/// Product-name keyword groups and the substrings that count toward each.
const KEYWORD_GROUPS: [(&str, &[&str]); 7] = [
    ("ぬいぐるみ", &["ぬいぐるみ"]),
    ("マスコット", &["マスコット"]),
    ("フィギュア", &["フィギュア"]),
    ("グッズ", &["グッズ"]),
    ("ステッカー・シール", &["ステッカー", "シール"]),
    ("バッグ", &["バッグ"]),
    ("アパレル", &["Tシャツ", "シャツ"]),
];

const TOP_KEYWORDS: usize = 10;
const REPORTED_KEYWORDS: usize = 5;

/// Keyword groups a product name falls into, each at most once.
pub fn keywords_in(name: &str) -> Vec<&'static str> {
    KEYWORD_GROUPS
        .iter()
        .filter(|(_, needles)| needles.iter().any(|needle| name.contains(needle)))
        .map(|(label, _)| *label)
        .collect()
}

/// Most common keyword groups, highest count first. Ties keep group order.
fn top_keywords(records: &[ProductRecord]) -> Vec<(&'static str, usize)> {
    let mut counts: Vec<(&'static str, usize)> =
        KEYWORD_GROUPS.iter().map(|(label, _)| (*label, 0)).collect();

    for record in records {
        for keyword in keywords_in(&record.name) {
            if let Some(entry) = counts.iter_mut().find(|(label, _)| *label == keyword) {
                entry.1 += 1;
            }
        }
    }

    counts.retain(|(_, count)| *count > 0);
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts.truncate(TOP_KEYWORDS);
    counts
}

#[derive(Debug, Clone, PartialEq)]
pub struct PriceStats {
    pub min: Decimal,
    pub max: Decimal,
    pub mean: Decimal,
    pub median: Decimal,
}

impl PriceStats {
    fn from_prices(mut prices: Vec<Decimal>) -> Option<Self> {
        if prices.is_empty() {
            return None;
        }
        prices.sort();

        let count = Decimal::from(prices.len());
        let sum: Decimal = prices.iter().sum();
        let mid = prices.len() / 2;
        let median = if prices.len() % 2 == 0 {
            (prices[mid - 1] + prices[mid]) / Decimal::TWO
        } else {
            prices[mid]
        };

        Some(Self {
            min: prices[0],
            max: prices[prices.len() - 1],
            mean: sum / count,
            median,
        })
    }
}

/// Derived counts over one record sequence.
#[derive(Debug, Clone)]
pub struct Summary {
    pub total: usize,
    /// Every status is present, zero counts included.
    pub by_status: BTreeMap<StockStatus, usize>,
    pub by_collection: BTreeMap<String, usize>,
    pub price: Option<PriceStats>,
    pub price_ranges: BTreeMap<PriceRange, usize>,
    /// Non-zero keyword groups found in product names, most common first.
    pub keywords: Vec<(&'static str, usize)>,
    pub generated_at: DateTime<Local>,
}

/// A single line of the statistics sheet.
#[derive(Debug, Clone, PartialEq)]
pub enum StatValue {
    Count(usize),
    Amount(Decimal),
    Text(String),
}

impl fmt::Display for StatValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatValue::Count(n) => write!(f, "{}", n),
            StatValue::Amount(amount) => write!(f, "{}", amount.round_dp(2).normalize()),
            StatValue::Text(text) => f.write_str(text),
        }
    }
}

impl Summary {
    pub fn from_records(records: &[ProductRecord]) -> Self {
        let mut by_status: BTreeMap<StockStatus, usize> =
            StockStatus::ALL.iter().map(|s| (*s, 0)).collect();
        let mut by_collection = BTreeMap::new();
        let mut price_ranges: BTreeMap<PriceRange, usize> =
            PriceRange::ALL.iter().map(|r| (*r, 0)).collect();

        for record in records {
            *by_status.entry(record.status).or_default() += 1;
            *by_collection.entry(record.collection.clone()).or_default() += 1;
            *price_ranges.entry(PriceRange::of(record.price)).or_default() += 1;
        }

        Self {
            total: records.len(),
            by_status,
            by_collection,
            price: PriceStats::from_prices(records.iter().map(|r| r.price).collect()),
            price_ranges,
            keywords: top_keywords(records),
            generated_at: Local::now(),
        }
    }

    /// Metric/value pairs in the order they appear on the statistics sheet.
    pub fn rows(&self) -> Vec<(String, StatValue)> {
        let mut rows = vec![
            ("total_products".to_string(), StatValue::Count(self.total)),
            (
                "collections".to_string(),
                StatValue::Count(self.by_collection.len()),
            ),
            (
                "generated_at".to_string(),
                StatValue::Text(self.generated_at.format("%Y-%m-%d %H:%M:%S").to_string()),
            ),
        ];

        for (status, count) in &self.by_status {
            rows.push((format!("status:{}", status), StatValue::Count(*count)));
        }
        for (collection, count) in &self.by_collection {
            rows.push((format!("collection:{}", collection), StatValue::Count(*count)));
        }

        if let Some(price) = &self.price {
            rows.push(("price_min".to_string(), StatValue::Amount(price.min)));
            rows.push(("price_max".to_string(), StatValue::Amount(price.max)));
            rows.push(("price_mean".to_string(), StatValue::Amount(price.mean)));
            rows.push(("price_median".to_string(), StatValue::Amount(price.median)));
        }

        for (range, count) in &self.price_ranges {
            rows.push((format!("price_range:{}", range.label()), StatValue::Count(*count)));
        }
        for (keyword, count) in &self.keywords {
            rows.push((format!("keyword:{}", keyword), StatValue::Count(*count)));
        }

        rows
    }

    /// Console report printed at the end of a run.
    pub fn report(&self, elapsed: Duration) -> String {
        let rule = "=".repeat(50);
        let mut out = format!("\n{rule}\nScrape summary\n{rule}\n");
        out.push_str(&format!("Total products: {}\n", self.total));
        out.push_str(&format!("Collections:    {}\n", self.by_collection.len()));
        out.push_str(&format!(
            "Generated at:   {}\n",
            self.generated_at.format("%Y-%m-%d %H:%M:%S")
        ));
        out.push_str(&format!("Elapsed:        {}\n", format_elapsed(elapsed)));

        if self.total > 0 {
            out.push_str("\nStock status:\n");
            for (status, count) in &self.by_status {
                let share = *count as f64 / self.total as f64 * 100.0;
                out.push_str(&format!("  {:<10} {:>6} ({:.1}%)\n", status.as_str(), count, share));
            }
        }

        if let Some(price) = &self.price {
            out.push_str("\nPrices:\n");
            out.push_str(&format!("  mean   {}\n", format_yen(price.mean)));
            out.push_str(&format!("  median {}\n", format_yen(price.median)));
            out.push_str(&format!("  max    {}\n", format_yen(price.max)));
            out.push_str(&format!("  min    {}\n", format_yen(price.min)));
        }

        if !self.keywords.is_empty() {
            out.push_str("\nTop keywords:\n");
            for (keyword, count) in self.keywords.iter().take(REPORTED_KEYWORDS) {
                out.push_str(&format!("  {} {}\n", keyword, count));
            }
        }

        out.push_str(&rule);
        out.push('\n');
        out
    }
}

/// Records plus their summary, assembled right before writing files.
#[derive(Debug)]
pub struct ExportBundle<'a> {
    pub records: &'a [ProductRecord],
    pub summary: Summary,
}

impl<'a> ExportBundle<'a> {
    pub fn new(records: &'a [ProductRecord]) -> Self {
        Self {
            records,
            summary: Summary::from_records(records),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records_in<'b>(&'b self, collection: &'b str) -> impl Iterator<Item = &'a ProductRecord> + 'b {
        self.records.iter().filter(move |r| r.collection == collection)
    }
}
