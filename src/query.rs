//! Sorting, grouping, relevance search and top-N views over records.

use crate::models::{ProcessedVulnerability, Severity};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Record fields that can drive a sort or a grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    Id,
    Cve,
    Severity,
    Cvss,
    Status,
    KaiStatus,
    PackageName,
    PackageVersion,
    PackageType,
    Published,
    FixDate,
    Description,
    GroupName,
    RepoName,
    ImageName,
    ImageVersion,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// A field value as seen by the comparator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue<'a> {
    Text(&'a str),
    Number(f64),
    Missing,
}

impl FieldValue<'_> {
    /// String form used for grouping keys and mixed-type comparisons.
    pub fn to_key(&self) -> String {
        match self {
            Self::Text(text) => text.to_string(),
            Self::Number(n) => n.to_string(),
            Self::Missing => String::new(),
        }
    }
}

impl SortField {
    pub fn value<'a>(&self, record: &'a ProcessedVulnerability) -> FieldValue<'a> {
        let vuln = &record.vuln;
        match self {
            Self::Id => FieldValue::Text(&record.id),
            Self::Cve => FieldValue::Text(&vuln.cve),
            Self::Severity => FieldValue::Text(&vuln.severity),
            Self::Cvss => FieldValue::Number(vuln.cvss),
            Self::Status => FieldValue::Text(&vuln.status),
            Self::KaiStatus => vuln
                .kai_status
                .as_deref()
                .map_or(FieldValue::Missing, FieldValue::Text),
            Self::PackageName => FieldValue::Text(&vuln.package_name),
            Self::PackageVersion => FieldValue::Text(&vuln.package_version),
            Self::PackageType => FieldValue::Text(&vuln.package_type),
            Self::Published => FieldValue::Text(&vuln.published),
            Self::FixDate => vuln
                .fix_date
                .as_deref()
                .map_or(FieldValue::Missing, FieldValue::Text),
            Self::Description => FieldValue::Text(&vuln.description),
            Self::GroupName => FieldValue::Text(&record.group_name),
            Self::RepoName => FieldValue::Text(&record.repo_name),
            Self::ImageName => FieldValue::Text(&record.image_name),
            Self::ImageVersion => FieldValue::Text(&record.image_version),
        }
    }
}

/// Human-oriented string ordering: case-insensitive first, lowercase before
/// uppercase when the strings differ only in case.
pub fn locale_compare(a: &str, b: &str) -> Ordering {
    a.chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase))
        .then_with(|| {
            a.chars()
                .map(char::is_uppercase)
                .cmp(b.chars().map(char::is_uppercase))
        })
        .then_with(|| a.cmp(b))
}

fn compare_values(a: FieldValue<'_>, b: FieldValue<'_>) -> Ordering {
    match (a, b) {
        (FieldValue::Text(a), FieldValue::Text(b)) => locale_compare(a, b),
        (FieldValue::Number(a), FieldValue::Number(b)) => {
            a.partial_cmp(&b).unwrap_or(Ordering::Equal)
        }
        (a, b) => locale_compare(&a.to_key(), &b.to_key()),
    }
}

/// Return a copy of `records` sorted by `field`.
pub fn sort(
    records: &[ProcessedVulnerability],
    field: SortField,
    order: SortOrder,
) -> Vec<ProcessedVulnerability> {
    let mut sorted = records.to_vec();
    sorted.sort_by(|a, b| {
        let ordering = compare_values(field.value(a), field.value(b));
        match order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    });
    sorted
}

/// Partition records by the string form of `field`.
///
/// Groups appear in the order their key was first seen; records keep their
/// relative order inside each group.
pub fn group_by(
    records: &[ProcessedVulnerability],
    field: SortField,
) -> Vec<(String, Vec<ProcessedVulnerability>)> {
    let mut groups: Vec<(String, Vec<ProcessedVulnerability>)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for record in records {
        let key = field.value(record).to_key();
        match index.get(&key) {
            Some(&position) => groups[position].1.push(record.clone()),
            None => {
                index.insert(key.clone(), groups.len());
                groups.push((key, vec![record.clone()]));
            }
        }
    }

    groups
}

/// Sort rank of a severity string: critical 5 down to negligible 1, unknown 0.
pub fn severity_order(severity: &str) -> u8 {
    Severity::parse(severity).map_or(0, |s| s.rank())
}

/// Relevance of a record for an already lower-cased query.
///
/// +1 per whitespace token found in the record's searchable text, +5 when the
/// whole query is found, +10 when the CVE id equals the query.
pub fn relevance_score(record: &ProcessedVulnerability, lower_query: &str) -> u32 {
    let vuln = &record.vuln;
    let text = [
        vuln.cve.as_str(),
        vuln.package_name.as_str(),
        vuln.description.as_str(),
        vuln.severity.as_str(),
        record.group_name.as_str(),
        record.repo_name.as_str(),
    ]
    .join(" ")
    .to_lowercase();

    let mut score = lower_query
        .split_whitespace()
        .filter(|token| text.contains(token))
        .count() as u32;

    if text.contains(lower_query) {
        score += 5;
    }

    if vuln.cve.to_lowercase() == lower_query {
        score += 10;
    }

    score
}

/// Rank records by relevance to `query`, dropping those that do not match at all.
///
/// An empty query returns the records unchanged.
pub fn fuzzy_search(records: &[ProcessedVulnerability], query: &str) -> Vec<ProcessedVulnerability> {
    if query.is_empty() {
        return records.to_vec();
    }

    let lower_query = query.to_lowercase();
    let mut scored: Vec<(u32, &ProcessedVulnerability)> = records
        .iter()
        .filter_map(|record| {
            let score = relevance_score(record, &lower_query);
            (score > 0).then_some((score, record))
        })
        .collect();

    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored.into_iter().map(|(_, record)| record.clone()).collect()
}

/// The `limit` highest-CVSS records among critical and high findings.
pub fn critical_vulnerabilities(
    records: &[ProcessedVulnerability],
    limit: usize,
) -> Vec<ProcessedVulnerability> {
    let mut critical: Vec<ProcessedVulnerability> = records
        .iter()
        .filter(|r| r.vuln.severity == "critical" || r.vuln.severity == "high")
        .cloned()
        .collect();
    critical.sort_by(|a, b| b.vuln.cvss.total_cmp(&a.vuln.cvss));
    critical.truncate(limit);
    critical
}

/// The `limit` most recently published records. Unparseable dates sort last.
pub fn trending_vulnerabilities(
    records: &[ProcessedVulnerability],
    limit: usize,
) -> Vec<ProcessedVulnerability> {
    let mut dated: Vec<_> = records.iter().map(|r| (r.published_at(), r)).collect();
    dated.sort_by(|a, b| b.0.cmp(&a.0));
    dated
        .into_iter()
        .take(limit)
        .map(|(_, record)| record.clone())
        .collect()
}
