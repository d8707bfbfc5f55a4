// src/scrape/store.rs
// =============================================================================
// Daily snapshot store for crawled deals and options.
//
// How it works:
//   1. `open` creates the snapshot directory if needed.
//   2. Each record is appended as one JSON line to the current day's file,
//      `deals_<YYYY-MM-DD>.jsonl` or `options_<YYYY-MM-DD>.jsonl`. A deal
//      crawled twice on the same day is simply appended twice.
//   3. Readers collapse a day's file to the last record per key, so the
//      newest crawl of an id wins. Bad lines are logged and skipped.
//   4. `export_csv` turns one day's snapshot into a pair of spreadsheets,
//      gzipped when asked.
//
// Rust concepts:
//   - tokio::fs for async file IO, so a slow disk never stalls the runtime
//   - a generic line reader over `DeserializeOwned`
//   - HashMap insert as "last wins" deduplication
// =============================================================================

use std::collections::HashMap;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::warn;

use crate::scrape::{Deal, DealOption};

/// Append-only store of one JSONL file per day per record kind.
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("could not create snapshot directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    /// Appends the deal to today's snapshot file.
    pub async fn store_deal(&self, deal: &Deal) -> Result<()> {
        let line = serde_json::to_string(deal)?;
        self.append_line(&self.deals_path(today()), &line).await
    }

    /// Appends the option to today's snapshot file.
    pub async fn store_option(&self, option: &DealOption) -> Result<()> {
        let line = serde_json::to_string(option)?;
        self.append_line(&self.options_path(today()), &line).await
    }

    /// Reads a day's deals, keeping the last record per (site, deal id).
    pub async fn deals_for_day(&self, day: NaiveDate) -> Result<Vec<Deal>> {
        let mut latest = HashMap::new();
        for deal in read_jsonl::<Deal>(&self.deals_path(day)).await? {
            latest.insert((deal.site.clone(), deal.deal_id), deal);
        }
        let mut deals: Vec<Deal> = latest.into_values().collect();
        deals.sort_by(|a, b| a.site.cmp(&b.site).then(a.deal_id.cmp(&b.deal_id)));
        Ok(deals)
    }

    /// Reads a day's options, keeping the last record per
    /// (site, deal id, option id).
    pub async fn options_for_day(&self, day: NaiveDate) -> Result<Vec<DealOption>> {
        let mut latest = HashMap::new();
        for option in read_jsonl::<DealOption>(&self.options_path(day)).await? {
            latest.insert((option.site.clone(), option.deal_id, option.option_id), option);
        }
        let mut options: Vec<DealOption> = latest.into_values().collect();
        options.sort_by(|a, b| {
            a.site
                .cmp(&b.site)
                .then(a.deal_id.cmp(&b.deal_id))
                .then(a.option_id.cmp(&b.option_id))
        });
        Ok(options)
    }

    /// Writes `<day>_deals.csv` and `<day>_options.csv` under `out_dir` and
    /// returns both paths. With `compress` the files gain a `.gz` suffix and
    /// gzipped contents.
    pub async fn export_csv(
        &self,
        day: NaiveDate,
        out_dir: &Path,
        compress: bool,
    ) -> Result<(PathBuf, PathBuf)> {
        fs::create_dir_all(out_dir)
            .await
            .with_context(|| format!("could not create output directory {}", out_dir.display()))?;

        let deals = self.deals_for_day(day).await?;
        let mut sheet = String::from(
            "Site,DealID,Day,Description,Category,Subcategory,Locale,\
             OriginalPrice,DiscountPrice,NumSold,IsExpired,IsAdult\n",
        );
        for deal in &deals {
            let row = [
                csv_field(&deal.site),
                deal.deal_id.to_string(),
                day.to_string(),
                csv_field(deal.description.as_deref().unwrap_or("")),
                csv_field(deal.category.as_deref().unwrap_or("")),
                csv_field(deal.subcategory.as_deref().unwrap_or("")),
                csv_field(&deal.locale.join(",")),
                optional_number(deal.original_price),
                optional_number(deal.discount_price),
                optional_number(deal.num_sold),
                deal.expired.to_string(),
                deal.adult.to_string(),
            ];
            sheet.push_str(&row.join(","));
            sheet.push('\n');
        }
        let deals_csv = write_sheet(out_dir, &format!("{day}_deals.csv"), sheet, compress).await?;

        let options = self.options_for_day(day).await?;
        let mut sheet =
            String::from("Site,DealID,OptionID,Day,Description,Price,NumAvailable,NumSold\n");
        for option in &options {
            let row = [
                csv_field(&option.site),
                option.deal_id.to_string(),
                option.option_id.to_string(),
                day.to_string(),
                csv_field(&option.description),
                option.price.to_string(),
                option.num_available.to_string(),
                option.num_sold.to_string(),
            ];
            sheet.push_str(&row.join(","));
            sheet.push('\n');
        }
        let options_csv =
            write_sheet(out_dir, &format!("{day}_options.csv"), sheet, compress).await?;

        Ok((deals_csv, options_csv))
    }

    fn deals_path(&self, day: NaiveDate) -> PathBuf {
        self.dir.join(format!("deals_{day}.jsonl"))
    }

    fn options_path(&self, day: NaiveDate) -> PathBuf {
        self.dir.join(format!("options_{day}.jsonl"))
    }

    async fn append_line(&self, path: &Path, line: &str) -> Result<()> {
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .with_context(|| format!("could not open {}", path.display()))?;
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
        Ok(())
    }
}

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

/// Reads a JSONL file into records. A missing file is an empty day, not an
/// error; unreadable lines are skipped with a warning.
async fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let contents = match fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(error) if error.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(error) => {
            return Err(error).with_context(|| format!("could not read {}", path.display()))
        }
    };
    let mut records = Vec::new();
    for line in contents.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(line) {
            Ok(record) => records.push(record),
            Err(error) => warn!("skipping unreadable line in {}: {error}", path.display()),
        }
    }
    Ok(records)
}

/// Writes one finished sheet, gzipping it when asked, and returns the path
/// it landed at.
async fn write_sheet(out_dir: &Path, name: &str, sheet: String, compress: bool) -> Result<PathBuf> {
    let (path, payload) = if compress {
        (out_dir.join(format!("{name}.gz")), gzip(sheet.as_bytes())?)
    } else {
        (out_dir.join(name), sheet.into_bytes())
    };
    fs::write(&path, payload)
        .await
        .with_context(|| format!("could not write {}", path.display()))?;
    Ok(path)
}

// A day's spreadsheet is small enough to pack in memory in one go
fn gzip(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(bytes)?;
    Ok(encoder.finish()?)
}

const QUOTE_TRIGGERS: &[char] = &[',', '"', '\n'];

// Minimal RFC 4180 quoting: quote only when the field needs it
fn csv_field(value: &str) -> String {
    if value.contains(QUOTE_TRIGGERS) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn optional_number(value: Option<i64>) -> String {
    value.map(|n| n.to_string()).unwrap_or_default()
}
