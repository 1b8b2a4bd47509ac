use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::error::Result;

/// Write a JSON report with a companion Markdown rendering.
///
/// Produces a stable `<stem>-latest.json` / `<stem>-latest.md` pair plus a
/// timestamped archival copy of the JSON. Returns the path of the stable
/// JSON file.
pub fn write_report_pair(
    dir: &Path,
    stem: &str,
    report: &serde_json::Value,
    markdown: &str,
) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;

    let json = serde_json::to_string_pretty(report)?;

    let latest_json = dir.join(format!("{stem}-latest.json"));
    fs::write(&latest_json, &json)?;

    let latest_md = dir.join(format!("{stem}-latest.md"));
    fs::write(&latest_md, markdown)?;

    let timestamp = Utc::now().format("%Y%m%dT%H%M%S%3f");
    let archive = dir.join(format!("{stem}-{timestamp}.json"));
    fs::write(&archive, &json)?;

    Ok(latest_json)
}
