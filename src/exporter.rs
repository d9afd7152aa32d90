use chrono::{DateTime, Local};
use rust_decimal::prelude::ToPrimitive;
use rust_xlsxwriter::{Format, Workbook, Worksheet};
use std::collections::{BTreeSet, HashSet};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::context::RunContext;
use crate::models::{ProductRecord, COLUMNS};
use crate::stats::{ExportBundle, StatValue, Summary};
use crate::utils::error::{AppError, Result};
use crate::utils::text::sanitize_filename;

pub const FILE_PREFIX: &str = "chiikawa_products";
pub const PRODUCTS_SHEET: &str = "Products";
pub const STATISTICS_SHEET: &str = "Statistics";

const MAX_COLLECTION_SHEETS: usize = 10;
const MAX_SHEET_NAME_LEN: usize = 31;
const INVALID_SHEET_CHARS: [char; 7] = ['[', ']', ':', '*', '?', '/', '\\'];

/// Files written by [`export`] and the summary that went into them.
#[derive(Debug)]
pub struct Exported {
    /// CSV first, then the workbook.
    pub files: Vec<PathBuf>,
    pub summary: Summary,
}

/// Write `records` in every format the run asked for.
///
/// An empty record list is not an error: the CSV gets its header row and the
/// workbook a statistics sheet with zero counts.
pub fn export(records: &[ProductRecord], ctx: &RunContext) -> Result<Exported> {
    let config = &ctx.config;
    let bundle = ExportBundle::new(records);

    if bundle.is_empty() {
        warn!("{}; writing headers and zero-count statistics only", AppError::NoData);
    }

    let base = output_base(config.output.as_deref(), &config.collections, ctx.started_at);
    ensure_parent_dir(&base)?;

    let mut written = Vec::new();

    if config.output_format.writes_csv() {
        let path = with_extension(&base, "csv");
        write_csv(&bundle, &path)?;
        info!("Wrote {} records to {}", bundle.records.len(), path.display());
        written.push(path);
    }

    if config.output_format.writes_excel() {
        let path = with_extension(&base, "xlsx");
        let collections = sheet_collections(&config.collections, &bundle.summary);
        write_xlsx(&bundle, &collections, &path)?;
        info!("Wrote workbook {}", path.display());
        written.push(path);
    }

    Ok(Exported {
        files: written,
        summary: bundle.summary,
    })
}

/// Output path without extension.
///
/// An explicit `--output` keeps its stem (a `.csv`/`.xlsx` extension is
/// dropped so each format gets its own); otherwise the name is built from
/// the requested collections and the run start time.
pub fn output_base(
    output: Option<&Path>,
    collections: &BTreeSet<String>,
    started_at: DateTime<Local>,
) -> PathBuf {
    if let Some(path) = output {
        let known_ext = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("csv") || e.eq_ignore_ascii_case("xlsx"));
        return if known_ext {
            path.with_extension("")
        } else {
            path.to_path_buf()
        };
    }

    let scope = if collections.is_empty() {
        "all".to_string()
    } else {
        collections.iter().cloned().collect::<Vec<_>>().join("_")
    };
    let name = format!(
        "{}_{}_{}",
        FILE_PREFIX,
        scope,
        started_at.format("%Y%m%d_%H%M%S")
    );
    PathBuf::from(sanitize_filename(&name))
}

fn with_extension(base: &Path, ext: &str) -> PathBuf {
    let mut name = OsString::from(base.as_os_str());
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
            debug!("Created output directory {}", parent.display());
        }
    }
    Ok(())
}

pub fn write_csv(bundle: &ExportBundle<'_>, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(COLUMNS)?;
    for record in bundle.records {
        writer.write_record(record.to_row())?;
    }
    writer.flush()?;
    Ok(())
}

/// Requested collections, or the ones present in the data when none were
/// requested (capped).
fn sheet_collections(requested: &BTreeSet<String>, summary: &Summary) -> Vec<String> {
    if !requested.is_empty() {
        return requested.iter().cloned().collect();
    }

    if summary.by_collection.len() > MAX_COLLECTION_SHEETS {
        debug!(
            "{} collections present, writing sheets for the first {}",
            summary.by_collection.len(),
            MAX_COLLECTION_SHEETS
        );
    }
    summary
        .by_collection
        .keys()
        .take(MAX_COLLECTION_SHEETS)
        .cloned()
        .collect()
}

pub fn write_xlsx(bundle: &ExportBundle<'_>, collections: &[String], path: &Path) -> Result<()> {
    let mut workbook = Workbook::new();
    let header = Format::new().set_bold();

    let sheet = workbook.add_worksheet();
    sheet.set_name(PRODUCTS_SHEET)?;
    write_record_sheet(sheet, bundle.records.iter(), &header)?;

    let sheet = workbook.add_worksheet();
    sheet.set_name(STATISTICS_SHEET)?;
    write_statistics_sheet(sheet, &bundle.summary, &header)?;

    let mut used: HashSet<String> = [PRODUCTS_SHEET, STATISTICS_SHEET]
        .iter()
        .map(|name| name.to_lowercase())
        .collect();

    for collection in collections {
        let records: Vec<_> = bundle.records_in(collection).collect();
        if records.is_empty() {
            warn!("Collection '{}' has no records; its sheet will be empty", collection);
        }

        let name = unique_sheet_name(collection, &mut used);
        let sheet = workbook.add_worksheet();
        sheet.set_name(&name)?;
        write_record_sheet(sheet, records.into_iter(), &header)?;
    }

    workbook.save(path)?;
    Ok(())
}

fn write_record_sheet<'r>(
    sheet: &mut Worksheet,
    records: impl Iterator<Item = &'r ProductRecord>,
    header: &Format,
) -> Result<()> {
    for (col, name) in COLUMNS.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *name, header)?;
    }

    for (index, record) in records.enumerate() {
        let row = index as u32 + 1;
        sheet.write_string(row, 0, record.id.as_str())?;
        sheet.write_string(row, 1, record.name.as_str())?;
        sheet.write_string(row, 2, record.url.as_str())?;
        sheet.write_number(row, 3, record.price.to_f64().unwrap_or_default())?;
        sheet.write_string(row, 4, record.collection.as_str())?;
        sheet.write_string(row, 5, record.status.as_str())?;
        sheet.write_string(row, 6, record.timestamp())?;
    }

    sheet.set_column_width(1, 40)?;
    sheet.set_column_width(2, 60)?;
    Ok(())
}

fn write_statistics_sheet(sheet: &mut Worksheet, summary: &Summary, header: &Format) -> Result<()> {
    sheet.write_string_with_format(0, 0, "metric", header)?;
    sheet.write_string_with_format(0, 1, "value", header)?;

    for (index, (metric, value)) in summary.rows().into_iter().enumerate() {
        let row = index as u32 + 1;
        sheet.write_string(row, 0, metric)?;
        match value {
            StatValue::Count(count) => sheet.write_number(row, 1, count as f64)?,
            StatValue::Amount(amount) => {
                sheet.write_number(row, 1, amount.round_dp(2).to_f64().unwrap_or_default())?
            }
            StatValue::Text(text) => sheet.write_string(row, 1, text)?,
        };
    }

    sheet.set_column_width(0, 32)?;
    Ok(())
}

/// Excel sheet names: at most 31 characters, none of `[]:*?/\`, no leading
/// or trailing apostrophe, unique ignoring case.
pub fn unique_sheet_name(raw: &str, used: &mut HashSet<String>) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| if INVALID_SHEET_CHARS.contains(&c) { '_' } else { c })
        .collect();
    let cleaned = cleaned.trim_matches('\'').trim();
    let base: String = if cleaned.is_empty() {
        "Sheet".to_string()
    } else {
        cleaned.chars().take(MAX_SHEET_NAME_LEN).collect()
    };

    let mut candidate = base.clone();
    let mut n = 2;
    while used.contains(&candidate.to_lowercase()) {
        let suffix = format!("_{}", n);
        let keep = MAX_SHEET_NAME_LEN - suffix.chars().count();
        candidate = format!("{}{}", base.chars().take(keep).collect::<String>(), suffix);
        n += 1;
    }

    used.insert(candidate.to_lowercase());
    candidate
}
