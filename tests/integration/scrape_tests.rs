use super::*;
use chiikawa_scraper::context::RunContext;
use chiikawa_scraper::models::StockStatus;
use chiikawa_scraper::scraper::Scraper;
use rust_decimal::Decimal;
use std::time::{Duration, Instant};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn cards(prefix: &str, count: usize) -> Vec<Card> {
    (1..=count)
        .map(|i| Card::new(format!("{prefix}{i:03}"), format!("ぬいぐるみ {i}"), format!("¥{},200", i)))
        .collect()
}

#[tokio::test]
async fn test_max_products_caps_newitems() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    mount_listing(&server, "newitems", 1, listing_html("newitems", &cards("n", 15))).await;

    let mut config = test_config(&server.uri());
    config.collections = collections(&["newitems"]);
    config.max_products = Some(10);
    let ctx = RunContext::new(config);

    let outcome = Scraper::new(&ctx)?.scrape().await?;

    assert_eq!(outcome.records.len(), 10);
    assert!(outcome.records.iter().all(|r| r.collection == "newitems"));
    assert!(outcome.records.iter().all(|r| r.status == StockStatus::NewItem));
    assert_eq!(outcome.records[0].id, "n001");
    assert_eq!(outcome.records[0].price, Decimal::new(1200, 0));
    Ok(())
}

#[tokio::test]
async fn test_pagination_stops_at_empty_page() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    mount_listing(&server, "tokyomiyage", 1, listing_html("tokyomiyage", &cards("a", 3))).await;
    mount_listing(&server, "tokyomiyage", 2, listing_html("tokyomiyage", &cards("b", 2))).await;
    mount_listing(&server, "tokyomiyage", 3, empty_listing_html()).await;

    let mut config = test_config(&server.uri());
    config.collections = collections(&["tokyomiyage"]);
    let ctx = RunContext::new(config);

    let outcome = Scraper::new(&ctx)?.scrape().await?;

    assert_eq!(outcome.records.len(), 5);
    assert_eq!(outcome.stats.pages_fetched, 3);
    assert_eq!(outcome.stats.pages_failed, 0);
    Ok(())
}

#[tokio::test]
async fn test_status_filter() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let page = vec![
        Card::new("s1", "マスコット", "¥1,000").badge("売り切れ"),
        Card::new("s2", "ポーチ", "¥2,000"),
        Card::new("s3", "キーホルダー", "¥800").badge("Sold out"),
        Card::new("s4", "巾着", "¥1,500").badge("予約商品"),
    ];
    mount_listing(&server, "ramenbuta", 1, listing_html("ramenbuta", &page)).await;
    mount_listing(&server, "ramenbuta", 2, empty_listing_html()).await;

    let mut config = test_config(&server.uri());
    config.collections = collections(&["ramenbuta"]);
    config.statuses = [StockStatus::SoldOut].into();
    let ctx = RunContext::new(config);

    let outcome = Scraper::new(&ctx)?.scrape().await?;

    let ids: Vec<_> = outcome.records.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["s1", "s3"]);
    assert_eq!(outcome.stats.filtered_out, 2);
    Ok(())
}

#[tokio::test]
async fn test_duplicate_ids_across_collections() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let shared = Card::new("shared", "コラボ商品", "¥3,300");
    mount_listing(
        &server,
        "chiikawabakery",
        1,
        listing_html("chiikawabakery", &[shared.clone(), Card::new("bread", "パン", "¥990")]),
    )
    .await;
    mount_listing(&server, "chiikawabakery", 2, empty_listing_html()).await;
    mount_listing(&server, "tokyomiyage", 1, listing_html("tokyomiyage", &[shared])).await;
    mount_listing(&server, "tokyomiyage", 2, empty_listing_html()).await;

    let mut config = test_config(&server.uri());
    config.collections = collections(&["chiikawabakery", "tokyomiyage"]);
    let ctx = RunContext::new(config);

    let outcome = Scraper::new(&ctx)?.scrape().await?;

    assert_eq!(outcome.records.len(), 2);
    assert_eq!(outcome.stats.duplicates, 1);
    let shared = outcome.records.iter().find(|r| r.id == "shared").unwrap();
    assert_eq!(shared.collection, "chiikawabakery");
    Ok(())
}

#[tokio::test]
async fn test_transient_error_is_retried() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/collections/newitems"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    mount_listing(&server, "newitems", 1, listing_html("newitems", &cards("r", 2))).await;
    mount_listing(&server, "newitems", 2, empty_listing_html()).await;

    let mut config = test_config(&server.uri());
    config.collections = collections(&["newitems"]);
    let ctx = RunContext::new(config);

    let outcome = Scraper::new(&ctx)?.scrape().await?;

    assert_eq!(outcome.records.len(), 2);
    assert_eq!(outcome.stats.pages_failed, 0);
    Ok(())
}

#[tokio::test]
async fn test_missing_collection_is_skipped() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/collections/gone"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    mount_listing(&server, "oshikatsu", 1, listing_html("oshikatsu", &cards("o", 1))).await;
    mount_listing(&server, "oshikatsu", 2, empty_listing_html()).await;

    let mut config = test_config(&server.uri());
    config.collections = collections(&["gone", "oshikatsu"]);
    let ctx = RunContext::new(config);

    let outcome = Scraper::new(&ctx)?.scrape().await?;

    assert_eq!(outcome.records.len(), 1);
    assert_eq!(outcome.records[0].collection, "oshikatsu");
    assert_eq!(outcome.stats.pages_failed, 1);
    Ok(())
}

#[tokio::test]
async fn test_exhausted_retries_skip_collection() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/collections/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let mut config = test_config(&server.uri());
    config.collections = collections(&["flaky"]);
    let ctx = RunContext::new(config);

    let outcome = Scraper::new(&ctx)?.scrape().await?;

    assert!(outcome.records.is_empty());
    assert_eq!(outcome.stats.pages_failed, 1);
    Ok(())
}

#[tokio::test]
async fn test_malformed_cards_are_skipped() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let html = r#"<html><body>
        <div class="card-wrapper"><a href="/products/ok1">まとも</a><span class="price">¥500</span></div>
        <div class="card-wrapper"><a href="/products/noprice">値段なし</a></div>
        <div class="card-wrapper"><span class="price">¥700</span></div>
    </body></html>"#;
    mount_listing(&server, "parallelworld", 1, html.to_string()).await;
    mount_listing(&server, "parallelworld", 2, empty_listing_html()).await;

    let mut config = test_config(&server.uri());
    config.collections = collections(&["parallelworld"]);
    let ctx = RunContext::new(config);

    let outcome = Scraper::new(&ctx)?.scrape().await?;

    assert_eq!(outcome.records.len(), 1);
    assert_eq!(outcome.records[0].id, "ok1");
    assert_eq!(outcome.stats.nodes_skipped, 2);
    Ok(())
}

#[tokio::test]
async fn test_collections_discovered_from_home_page() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(home_html(&["all", "limited-2026", "newitems"])),
        )
        .expect(1)
        .mount(&server)
        .await;
    mount_listing(&server, "limited-2026", 1, listing_html("limited-2026", &cards("l", 2))).await;
    mount_listing(&server, "limited-2026", 2, empty_listing_html()).await;
    // Every other collection answers 404 and is skipped.

    let ctx = RunContext::new(test_config(&server.uri()));

    let outcome = Scraper::new(&ctx)?.scrape().await?;

    assert_eq!(outcome.records.len(), 2);
    assert!(outcome.records.iter().all(|r| r.collection == "limited-2026"));
    Ok(())
}

#[tokio::test]
async fn test_details_refine_status_and_price() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let page = vec![
        Card::new("d1", "ぬいぐるみS", "¥1,000"),
        Card::new("d2", "ぬいぐるみM", "¥2,000"),
    ];
    mount_listing(&server, "magicalchiikawa", 1, listing_html("magicalchiikawa", &page)).await;
    mount_listing(&server, "magicalchiikawa", 2, empty_listing_html()).await;
    Mock::given(method("GET"))
        .and(path("/collections/magicalchiikawa/products/d1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(product_page_html("OutOfStock", "1,100")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/collections/magicalchiikawa/products/d2"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let mut config = test_config(&server.uri());
    config.collections = collections(&["magicalchiikawa"]);
    config.fetch_details = true;
    let ctx = RunContext::new(config);

    let outcome = Scraper::new(&ctx)?.scrape().await?;

    assert_eq!(outcome.records.len(), 2);
    let d1 = &outcome.records[0];
    assert_eq!(d1.status, StockStatus::SoldOut);
    assert_eq!(d1.price, Decimal::new(1100, 0));

    let d2 = &outcome.records[1];
    assert_eq!(d2.status, StockStatus::InStock);
    assert_eq!(d2.price, Decimal::new(2000, 0));

    assert_eq!(outcome.stats.details_fetched, 1);
    assert_eq!(outcome.stats.details_failed, 1);
    Ok(())
}

#[tokio::test]
async fn test_filtered_product_can_match_in_later_collection() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let shared = Card::new("shared", "コラボ マスコット", "¥1,320");
    // Everything listed under newitems is a new arrival and fails the filter.
    mount_listing(&server, "newitems", 1, listing_html("newitems", &[shared.clone()])).await;
    mount_listing(&server, "newitems", 2, empty_listing_html()).await;
    mount_listing(&server, "tokyomiyage", 1, listing_html("tokyomiyage", &[shared])).await;
    mount_listing(&server, "tokyomiyage", 2, empty_listing_html()).await;

    let mut config = test_config(&server.uri());
    config.collections = collections(&["newitems", "tokyomiyage"]);
    config.statuses = [StockStatus::InStock].into();
    let ctx = RunContext::new(config);

    let outcome = Scraper::new(&ctx)?.scrape().await?;

    assert_eq!(outcome.records.len(), 1);
    assert_eq!(outcome.records[0].id, "shared");
    assert_eq!(outcome.records[0].collection, "tokyomiyage");
    assert_eq!(outcome.records[0].status, StockStatus::InStock);
    assert_eq!(outcome.stats.filtered_out, 1);
    assert_eq!(outcome.stats.duplicates, 0);
    Ok(())
}

#[tokio::test]
async fn test_requests_are_paced_after_the_first() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    mount_listing(&server, "chiikawa-sushi", 1, listing_html("chiikawa-sushi", &cards("p", 1))).await;
    mount_listing(&server, "chiikawa-sushi", 2, listing_html("chiikawa-sushi", &cards("q", 1))).await;
    mount_listing(&server, "chiikawa-sushi", 3, empty_listing_html()).await;

    let delay = Duration::from_millis(200);
    let mut config = test_config(&server.uri());
    config.collections = collections(&["chiikawa-sushi"]);
    config.delay_secs = delay.as_secs_f64();
    let ctx = RunContext::new(config);
    let mut scraper = Scraper::new(&ctx)?;

    let started = Instant::now();
    let outcome = scraper.scrape().await?;
    let elapsed = started.elapsed();

    assert_eq!(outcome.stats.pages_fetched, 3);
    // Two sleeps for three requests; none before the first.
    assert!(elapsed >= delay * 2, "elapsed {:?}", elapsed);
    assert!(elapsed < delay * 3, "elapsed {:?}", elapsed);
    Ok(())
}
