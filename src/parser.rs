use regex::Regex;
use rust_decimal::Decimal;
use scraper::{ElementRef, Html, Selector};
use std::collections::{BTreeSet, HashSet};
use std::str::FromStr;
use std::sync::LazyLock;
use tracing::debug;
use url::Url;

use crate::models::{ProductRecord, StockStatus};
use crate::utils::price::{detect_currency, parse_price};
use crate::utils::text::clean_text;

/// Collection whose members are always reported as new arrivals.
pub const NEW_ITEMS_COLLECTION: &str = "newitems";

// Tried in order; the first selector with any match defines the product nodes.
static PRODUCT_NODE_SELECTORS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    [
        "div.card-wrapper",
        "li.grid__item",
        "div.product-card",
        r#"div[class*="card"]"#,
    ]
    .iter()
    .map(|s| Selector::parse(s).unwrap())
    .collect()
});
static PRODUCT_LINK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"a[href*="/products/"]"#).unwrap());
static TITLE: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(
        r#".card__heading, .product-card__title, [class*="title"], [class*="name"], [class*="heading"]"#,
    )
    .unwrap()
});
static PRICE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"[class*="price"], [class*="cost"]"#).unwrap());
static COLLECTION_LINK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"a[href*="/collections/"]"#).unwrap());
static JSON_LD: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"script[type="application/ld+json"]"#).unwrap());
static NEW_BADGE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bnew\b").unwrap());
// A yen amount as printed on a card: `¥3,300`, `￥880`, `2,200円`, optional `(税込)`.
static PRICE_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[¥￥]\s*[0-9０-９][0-9０-９,，]*(?:\.[0-9]+)?|[0-9０-９][0-9０-９,，]*(?:\.[0-9]+)?\s*円|[(（]税込[)）]").unwrap()
});

const SOLD_OUT_MARKERS: [&str; 5] = ["売り切れ", "sold out", "soldout", "完売", "在庫なし"];
const PREORDER_MARKERS: [&str; 4] = ["予約", "pre-order", "preorder", "pre order"];
const NEW_MARKERS: [&str; 2] = ["新着", "新商品"];

// Shopify pseudo collections that either repeat every product or are not
// product listings at all.
const IGNORED_COLLECTIONS: [&str; 3] = ["all", "vendors", "types"];

/// Records extracted from one listing page.
#[derive(Debug, Default)]
pub struct ListingPage {
    pub products: Vec<ProductRecord>,
    /// Product nodes found on the page, including skipped ones.
    pub node_count: usize,
    pub skipped: usize,
}

/// Values read from a product page's JSON-LD block.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ProductDetails {
    pub status: Option<StockStatus>,
    pub price: Option<Decimal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MissingField {
    Link,
    Name,
    Price,
}

pub fn parse_listing(html: &str, page_url: &Url, collection: &str) -> ListingPage {
    let document = Html::parse_document(html);
    let nodes = find_product_nodes(&document, collection);

    let mut page = ListingPage {
        node_count: nodes.len(),
        ..Default::default()
    };

    for (index, node) in nodes.into_iter().enumerate() {
        match extract_product(node, page_url, collection) {
            Ok(record) => page.products.push(record),
            Err(missing) => {
                page.skipped += 1;
                debug!(
                    "Skipping node {} on {}: missing {:?}",
                    index, page_url, missing
                );
            }
        }
    }

    page
}

fn find_product_nodes<'a>(document: &'a Html, collection: &str) -> Vec<ElementRef<'a>> {
    for selector in PRODUCT_NODE_SELECTORS.iter() {
        let nodes = outermost(document.select(selector).collect());
        if !nodes.is_empty() {
            return nodes;
        }
    }

    // No card markup: fall back to bare product links, preferring the ones
    // scoped to the collection being listed.
    let scoped = format!(r#"a[href*="/collections/{}/products/"]"#, collection);
    if let Ok(selector) = Selector::parse(&scoped) {
        let links: Vec<_> = document.select(&selector).collect();
        if !links.is_empty() {
            return links;
        }
    }

    document.select(&PRODUCT_LINK).collect()
}

/// Drop nodes nested inside another matched node.
fn outermost(nodes: Vec<ElementRef<'_>>) -> Vec<ElementRef<'_>> {
    let ids: HashSet<_> = nodes.iter().map(|n| n.id()).collect();
    nodes
        .into_iter()
        .filter(|node| !node.ancestors().any(|ancestor| ids.contains(&ancestor.id())))
        .collect()
}

fn extract_product(
    node: ElementRef<'_>,
    page_url: &Url,
    collection: &str,
) -> Result<ProductRecord, MissingField> {
    let link = product_link(node).ok_or(MissingField::Link)?;
    let href = link.value().attr("href").ok_or(MissingField::Link)?;
    let url = page_url.join(href).map_err(|_| MissingField::Link)?;
    let id = product_id(&url).ok_or(MissingField::Link)?;

    let price = extract_price(node).ok_or(MissingField::Price)?;

    let name = match node.select(&TITLE).map(element_text).find(|text| !text.is_empty()) {
        Some(title) => title,
        // Bare link text usually carries the price as well.
        None => clean_text(&PRICE_TOKEN.replace_all(&element_text(link), " ")),
    };
    if name.is_empty() {
        return Err(MissingField::Name);
    }

    let status = detect_status(&element_text(node), collection);

    Ok(ProductRecord::new(
        id,
        name,
        url.to_string(),
        price,
        collection,
        status,
    ))
}

fn product_link(node: ElementRef<'_>) -> Option<ElementRef<'_>> {
    let is_product_link = node.value().name() == "a"
        && node
            .value()
            .attr("href")
            .is_some_and(|href| href.contains("/products/"));

    if is_product_link {
        Some(node)
    } else {
        node.select(&PRODUCT_LINK).next()
    }
}

/// Last non-empty path segment, e.g. `4582662956152` for
/// `/collections/newitems/products/4582662956152?variant=1`.
pub fn product_id(url: &Url) -> Option<String> {
    url.path_segments()?
        .filter(|segment| !segment.is_empty())
        .last()
        .map(str::to_string)
}

fn element_text(element: ElementRef<'_>) -> String {
    clean_text(&element.text().collect::<Vec<_>>().join(" "))
}

fn extract_price(node: ElementRef<'_>) -> Option<Decimal> {
    let labelled = node
        .select(&PRICE)
        .map(element_text)
        .find_map(|text| parse_price(&text).map(|price| (price, text)));

    let (price, label) = labelled.or_else(|| {
        node.text()
            .filter(|text| text.contains(['¥', '￥', '円']))
            .find_map(|text| parse_price(text).map(|price| (price, text.to_string())))
    })?;

    if let Some(currency) = detect_currency(&label) {
        if currency != "JPY" {
            debug!("Price label '{}' is in {}, keeping the raw amount", label, currency);
        }
    }

    Some(price)
}

/// Classify a product from the visible label text of its card.
pub fn detect_status(text: &str, collection: &str) -> StockStatus {
    let lowered = text.to_lowercase();

    if SOLD_OUT_MARKERS.iter().any(|m| lowered.contains(m)) {
        StockStatus::SoldOut
    } else if PREORDER_MARKERS.iter().any(|m| lowered.contains(m)) {
        StockStatus::Preorder
    } else if collection == NEW_ITEMS_COLLECTION
        || NEW_BADGE.is_match(&lowered)
        || NEW_MARKERS.iter().any(|m| lowered.contains(m))
    {
        StockStatus::NewItem
    } else {
        StockStatus::InStock
    }
}

/// Collection slugs linked from a storefront page.
pub fn discover_collections(html: &str) -> BTreeSet<String> {
    let document = Html::parse_document(html);

    document
        .select(&COLLECTION_LINK)
        .filter_map(|link| link.value().attr("href"))
        .filter_map(collection_slug)
        .filter(|slug| !IGNORED_COLLECTIONS.contains(&slug.as_str()))
        .collect()
}

fn collection_slug(href: &str) -> Option<String> {
    let (_, rest) = href.split_once("/collections/")?;
    let slug = rest.split(['/', '?', '#']).next()?;
    let valid = !slug.is_empty()
        && slug
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    valid.then(|| slug.to_string())
}

/// Read availability and price from the first JSON-LD block with `offers`.
pub fn parse_product_details(html: &str) -> ProductDetails {
    let document = Html::parse_document(html);

    for script in document.select(&JSON_LD) {
        let raw = script.text().collect::<String>();
        let value: serde_json::Value = match serde_json::from_str(raw.trim()) {
            Ok(value) => value,
            Err(err) => {
                debug!("Ignoring malformed JSON-LD block: {}", err);
                continue;
            }
        };

        if let Some(offer) = find_offer(&value) {
            return ProductDetails {
                status: offer
                    .get("availability")
                    .and_then(|v| v.as_str())
                    .and_then(availability_status),
                price: offer.get("price").and_then(json_price),
            };
        }
    }

    ProductDetails::default()
}

fn find_offer(value: &serde_json::Value) -> Option<&serde_json::Value> {
    match value {
        serde_json::Value::Array(items) => items.iter().find_map(find_offer),
        serde_json::Value::Object(map) => {
            if let Some(offers) = map.get("offers") {
                return match offers {
                    serde_json::Value::Array(list) => list.first(),
                    other => Some(other),
                };
            }
            map.get("@graph").and_then(find_offer)
        }
        _ => None,
    }
}

fn availability_status(availability: &str) -> Option<StockStatus> {
    // schema.org values arrive either bare or as full URLs.
    let name = availability.rsplit('/').next().unwrap_or(availability);
    match name {
        "InStock" | "LimitedAvailability" | "OnlineOnly" | "InStoreOnly" => {
            Some(StockStatus::InStock)
        }
        "OutOfStock" | "SoldOut" | "Discontinued" => Some(StockStatus::SoldOut),
        "PreOrder" | "PreSale" | "BackOrder" => Some(StockStatus::Preorder),
        _ => None,
    }
}

fn json_price(value: &serde_json::Value) -> Option<Decimal> {
    match value {
        serde_json::Value::String(s) => parse_price(s),
        serde_json::Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        _ => None,
    }
}
