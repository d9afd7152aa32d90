use super::*;
use calamine::{open_workbook, Data, Reader, Xlsx};
use chiikawa_scraper::config::OutputFormat;
use chiikawa_scraper::context::RunContext;
use chiikawa_scraper::exporter::export;
use chiikawa_scraper::models::{COLUMNS, StockStatus};
use chiikawa_scraper::utils::price::parse_price;
use rust_decimal::Decimal;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn sample_records() -> Vec<ProductRecord> {
    vec![
        record("p1", Decimal::new(1000, 0), "newitems", StockStatus::NewItem),
        record("p2", parse_price("¥2,000").unwrap(), "tokyomiyage", StockStatus::InStock),
        record("p3", Decimal::new(1500, 0), "tokyomiyage", StockStatus::SoldOut),
    ]
}

fn context(dir: &Path, format: OutputFormat, wanted: &[&str]) -> RunContext {
    let mut config = ScrapeConfig::default();
    config.output_format = format;
    config.output = Some(dir.join("nested").join("products.csv"));
    config.collections = collections(wanted);
    RunContext::new(config)
}

fn read_csv(path: &Path) -> anyhow::Result<(Vec<String>, Vec<Vec<String>>)> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.iter().map(str::to_string).collect();
    let rows = reader
        .records()
        .map(|r| r.map(|r| r.iter().map(str::to_string).collect()))
        .collect::<Result<Vec<Vec<String>>, _>>()?;
    Ok((headers, rows))
}

fn stat(workbook: &mut Xlsx<std::io::BufReader<std::fs::File>>, metric: &str) -> Option<Data> {
    let range = workbook.worksheet_range("Statistics").ok()?;
    range
        .rows()
        .find(|row| row.first() == Some(&Data::String(metric.to_string())))
        .and_then(|row| row.get(1).cloned())
}

#[test]
fn test_csv_export_round_trip() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let ctx = context(dir.path(), OutputFormat::Csv, &[]);

    let files = export(&sample_records(), &ctx)?.files;

    assert_eq!(files, vec![dir.path().join("nested").join("products.csv")]);
    let (headers, rows) = read_csv(&files[0])?;
    assert_eq!(headers, COLUMNS.to_vec());
    assert_eq!(rows.len(), 3);

    let prices: Vec<_> = rows.iter().map(|row| row[3].as_str()).collect();
    assert_eq!(prices, vec!["1000.0", "2000.0", "1500.0"]);
    assert_eq!(rows[0][1], "ちいかわ p1");
    assert_eq!(rows[1][5], "in_stock");
    assert!(rows[2][6].ends_with('Z'));
    Ok(())
}

#[test]
fn test_excel_export_sheets() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let ctx = context(dir.path(), OutputFormat::Excel, &[]);
    let exported = export(&sample_records(), &ctx)?;
    let files = &exported.files;
    assert_eq!(files, &vec![dir.path().join("nested").join("products.xlsx")]);

    let mut workbook: Xlsx<_> = open_workbook(&files[0])?;
    assert_eq!(
        workbook.sheet_names(),
        vec!["Products", "Statistics", "newitems", "tokyomiyage"]
    );

    let products = workbook.worksheet_range("Products")?;
    assert_eq!(products.get_size(), (4, 7));
    assert_eq!(products.get_value((0, 3)), Some(&Data::String("price".to_string())));
    assert_eq!(products.get_value((2, 3)), Some(&Data::Float(2000.0)));

    let tokyo = workbook.worksheet_range("tokyomiyage")?;
    assert_eq!(tokyo.get_size(), (3, 7));

    assert_eq!(stat(&mut workbook, "total_products"), Some(Data::Float(3.0)));
    assert_eq!(stat(&mut workbook, "status:sold_out"), Some(Data::Float(1.0)));
    assert_eq!(stat(&mut workbook, "status:preorder"), Some(Data::Float(0.0)));
    assert_eq!(stat(&mut workbook, "price_mean"), Some(Data::Float(1500.0)));

    // The sheet shows the same summary the caller reports on the console.
    let generated_at = exported.summary.generated_at.format("%Y-%m-%d %H:%M:%S").to_string();
    assert_eq!(stat(&mut workbook, "generated_at"), Some(Data::String(generated_at)));
    Ok(())
}

#[test]
fn test_requested_collection_without_records_gets_empty_sheet() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let ctx = context(dir.path(), OutputFormat::Both, &["newitems", "oshikatsu"]);

    let files = export(&sample_records()[..1], &ctx)?.files;
    assert_eq!(files.len(), 2);
    assert_eq!(files[0].extension().and_then(|e| e.to_str()), Some("csv"));

    let mut workbook: Xlsx<_> = open_workbook(&files[1])?;
    assert_eq!(
        workbook.sheet_names(),
        vec!["Products", "Statistics", "newitems", "oshikatsu"]
    );
    let empty = workbook.worksheet_range("oshikatsu")?;
    assert_eq!(empty.get_size(), (1, 7));
    Ok(())
}

#[test]
fn test_empty_export_writes_headers_only() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let ctx = context(dir.path(), OutputFormat::Both, &[]);

    let exported = export(&[], &ctx)?;
    assert_eq!(exported.summary.total, 0);
    let files: Vec<PathBuf> = exported.files;
    assert_eq!(files.len(), 2);

    let (headers, rows) = read_csv(&files[0])?;
    assert_eq!(headers.len(), 7);
    assert!(rows.is_empty());

    let mut workbook: Xlsx<_> = open_workbook(&files[1])?;
    assert_eq!(workbook.sheet_names(), vec!["Products", "Statistics"]);
    assert_eq!(stat(&mut workbook, "total_products"), Some(Data::Float(0.0)));
    assert_eq!(stat(&mut workbook, "price_mean"), None);
    Ok(())
}
