//! CSV and JSON archives of a crawl run.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::models::ProductRecord;

/// Excel only reads the file as UTF-8 when this prefix is present.
const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    Ok(())
}

/// Writes the records as a BOM-prefixed CSV, header row first.
pub fn write_csv(path: &Path, records: &[ProductRecord]) -> Result<()> {
    ensure_parent(path)?;

    let mut file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    file.write_all(UTF8_BOM)?;

    let mut writer = csv::Writer::from_writer(file);
    if records.is_empty() {
        // serialize() emits the header row itself, so only the empty
        // case needs one spelled out.
        writer.write_record(ProductRecord::FIELDS)?;
    }
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;

    info!("wrote {} records to {}", records.len(), path.display());
    Ok(())
}

/// Pretty-printed JSON dump of the same records, for eyeballing a
/// single source without a spreadsheet.
pub fn write_json(path: &Path, records: &[ProductRecord]) -> Result<()> {
    ensure_parent(path)?;

    let json = serde_json::to_string_pretty(records)?;
    let mut file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    file.write_all(json.as_bytes())?;

    info!("wrote {} records to {}", records.len(), path.display());
    Ok(())
}
