//! JSON and CSV exports of record sequences.

use crate::error::Result;
use crate::models::ProcessedVulnerability;
use std::path::Path;
use tokio::fs;
use tracing::info;

/// Column headers of the CSV export, in order.
pub const CSV_HEADERS: [&str; 14] = [
    "CVE",
    "Severity",
    "CVSS",
    "Status",
    "KaiStatus",
    "Package Name",
    "Package Version",
    "Package Type",
    "Group",
    "Repository",
    "Image Version",
    "Published",
    "Fix Date",
    "Description",
];

/// Pretty-printed JSON array of the records.
pub fn to_json(records: &[ProcessedVulnerability]) -> Result<String> {
    Ok(serde_json::to_string_pretty(records)?)
}

/// CSV with the fixed [`CSV_HEADERS`]; only the description column is quoted.
///
/// An empty record set produces an empty string.
pub fn to_csv(records: &[ProcessedVulnerability]) -> String {
    if records.is_empty() {
        return String::new();
    }

    let mut lines = Vec::with_capacity(records.len() + 1);
    lines.push(CSV_HEADERS.join(","));

    for record in records {
        let vuln = &record.vuln;
        let row = [
            vuln.cve.clone(),
            vuln.severity.clone(),
            vuln.cvss.to_string(),
            vuln.status.clone(),
            vuln.kai_status.clone().unwrap_or_default(),
            vuln.package_name.clone(),
            vuln.package_version.clone(),
            vuln.package_type.clone(),
            record.group_name.clone(),
            record.repo_name.clone(),
            record.image_version.clone(),
            vuln.published.clone(),
            vuln.fix_date.clone().unwrap_or_default(),
            format!("\"{}\"", vuln.description.replace('"', "\"\"")),
        ];
        lines.push(row.join(","));
    }

    lines.join("\n")
}

pub async fn write_json(records: &[ProcessedVulnerability], path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    fs::write(path, to_json(records)?).await?;
    info!("Exported {} records to {:?}", records.len(), path);
    Ok(())
}

pub async fn write_csv(records: &[ProcessedVulnerability], path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    fs::write(path, to_csv(records)).await?;
    info!("Exported {} records to {:?}", records.len(), path);
    Ok(())
}
