//! Record filtering for the dashboard views.
//!
//! A [`FilterState`] collects independent filter dimensions. An empty
//! dimension places no constraint; a record must satisfy every active
//! dimension to survive. Filtering never reorders records.

use crate::models::{
    KAI_AI_INVALID_NORISK, KAI_INVALID_NORISK, ProcessedVulnerability, StatusBucket,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Inclusive published-date range; a missing bound is unbounded on that side.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    fn contains(&self, date: DateTime<Utc>) -> bool {
        self.start.is_none_or(|start| date >= start) && self.end.is_none_or(|end| date <= end)
    }
}

/// The active filter selection of the dashboard.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterState {
    /// Case-insensitive substring searched in the main text fields.
    pub search_query: String,
    pub severity: Vec<String>,
    /// Allowed analysis statuses; an absent status matches `""`.
    pub kai_status: Vec<String>,
    pub package_type: Vec<String>,
    /// A record passes when it has at least one of these risk factors.
    pub risk_factors: Vec<String>,
    pub status: Vec<StatusBucket>,
    pub date_range: DateRange,
}

impl FilterState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_search(mut self, query: impl Into<String>) -> Self {
        self.search_query = query.into();
        self
    }

    pub fn with_severities<I, S>(mut self, severities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.severity = severities.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_kai_statuses<I, S>(mut self, statuses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.kai_status = statuses.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_package_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.package_type = types.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_risk_factors<I, S>(mut self, factors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.risk_factors = factors.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_statuses(mut self, buckets: impl IntoIterator<Item = StatusBucket>) -> Self {
        self.status = buckets.into_iter().collect();
        self
    }

    pub fn with_date_range(
        mut self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Self {
        self.date_range = DateRange { start, end };
        self
    }

    /// True when no dimension is active.
    pub fn is_empty(&self) -> bool {
        self.search_query.is_empty()
            && self.severity.is_empty()
            && self.kai_status.is_empty()
            && self.package_type.is_empty()
            && self.risk_factors.is_empty()
            && self.status.is_empty()
            && self.date_range.is_unbounded()
    }

    /// Check a single record against every active dimension.
    pub fn matches(&self, record: &ProcessedVulnerability) -> bool {
        let vuln = &record.vuln;

        if !self.search_query.is_empty() {
            let query = self.search_query.to_lowercase();
            let fields = [
                vuln.cve.as_str(),
                vuln.package_name.as_str(),
                vuln.description.as_str(),
                vuln.severity.as_str(),
                vuln.package_type.as_str(),
                record.group_name.as_str(),
                record.repo_name.as_str(),
            ];
            if !fields.iter().any(|field| field.to_lowercase().contains(&query)) {
                return false;
            }
        }

        if !self.severity.is_empty() && !self.severity.contains(&vuln.severity) {
            return false;
        }

        if !self.kai_status.is_empty()
            && !self.kai_status.iter().any(|s| s == record.kai_status())
        {
            return false;
        }

        if !self.package_type.is_empty() && !self.package_type.contains(&vuln.package_type) {
            return false;
        }

        if !self.risk_factors.is_empty()
            && !self
                .risk_factors
                .iter()
                .any(|factor| record.has_risk_factor(factor))
        {
            return false;
        }

        if !self.status.is_empty() && !self.status.contains(&record.status_bucket()) {
            return false;
        }

        // an unparseable published date is never excluded by the range
        if !self.date_range.is_unbounded()
            && let Some(published) = record.published_at()
            && !self.date_range.contains(published)
        {
            return false;
        }

        true
    }
}

/// Apply all active filters, keeping the relative order of surviving records.
pub fn apply_filters(
    records: &[ProcessedVulnerability],
    filters: &FilterState,
) -> Vec<ProcessedVulnerability> {
    records
        .iter()
        .filter(|record| filters.matches(record))
        .cloned()
        .collect()
}

/// Preset analysis views over the `kaiStatus` field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnalysisMode {
    /// Every finding.
    #[default]
    All,
    /// Only findings manually marked as invalid / no risk.
    Analysis,
    /// Only findings an AI review marked as invalid / no risk.
    AiAnalysis,
}

impl AnalysisMode {
    pub fn label(&self) -> &'static str {
        match self {
            Self::All => "All Vulnerabilities",
            Self::Analysis => "Analysis",
            Self::AiAnalysis => "AI Analysis",
        }
    }

    /// The analysis statuses this mode restricts to, `None` for no restriction.
    pub fn kai_statuses(&self) -> Option<&'static [&'static str]> {
        match self {
            Self::All => None,
            Self::Analysis => Some(&[KAI_INVALID_NORISK]),
            Self::AiAnalysis => Some(&[KAI_AI_INVALID_NORISK]),
        }
    }

    pub fn apply(&self, records: &[ProcessedVulnerability]) -> Vec<ProcessedVulnerability> {
        filter_by_kai_status(records, self.kai_statuses())
    }
}

/// Keep only records whose analysis status is listed.
///
/// `None` or an empty list keeps everything. An absent status matches `""`.
pub fn filter_by_kai_status<S: AsRef<str>>(
    records: &[ProcessedVulnerability],
    include: Option<&[S]>,
) -> Vec<ProcessedVulnerability> {
    match include {
        Some(statuses) if !statuses.is_empty() => records
            .iter()
            .filter(|record| statuses.iter().any(|s| s.as_ref() == record.kai_status()))
            .cloned()
            .collect(),
        _ => records.to_vec(),
    }
}

/// Distinct values available to the filter widgets, each sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterOptions {
    pub package_types: Vec<String>,
    pub risk_factors: Vec<String>,
    pub severities: Vec<String>,
}

pub fn unique_filter_values(records: &[ProcessedVulnerability]) -> FilterOptions {
    let mut package_types = BTreeSet::new();
    let mut risk_factors = BTreeSet::new();
    let mut severities = BTreeSet::new();

    for record in records {
        let vuln = &record.vuln;
        if !vuln.package_type.is_empty() {
            package_types.insert(vuln.package_type.clone());
        }
        if !vuln.severity.is_empty() {
            severities.insert(vuln.severity.clone());
        }
        if let Some(factors) = &vuln.risk_factors {
            risk_factors.extend(factors.keys().cloned());
        }
    }

    FilterOptions {
        package_types: package_types.into_iter().collect(),
        risk_factors: risk_factors.into_iter().collect(),
        severities: severities.into_iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::tests::record;
    use chrono::TimeZone;
    use serde_json::{Map, Value};

    fn with_risks(mut r: ProcessedVulnerability, factors: &[&str]) -> ProcessedVulnerability {
        let map: Map<String, Value> = factors
            .iter()
            .map(|f| (f.to_string(), Value::Null))
            .collect();
        r.vuln.risk_factors = Some(map);
        r
    }

    fn published(mut r: ProcessedVulnerability, date: &str) -> ProcessedVulnerability {
        r.vuln.published = date.to_string();
        r
    }

    fn sample() -> Vec<ProcessedVulnerability> {
        let mut a = record("CVE-2021-1111", "critical", "Fixed");
        a.vuln.description = "Heap overflow in libfoo".to_string();
        a.vuln.package_name = "libfoo".to_string();
        a.vuln.kai_status = Some(KAI_AI_INVALID_NORISK.to_string());

        let mut b = record("CVE-2022-2222", "low", "Affected");
        b.vuln.package_type = "python".to_string();
        b.vuln.kai_status = Some(KAI_INVALID_NORISK.to_string());

        let mut c = record("CVE-2023-3333", "high", "");
        c.repo_name = "billing".to_string();

        vec![
            published(with_risks(a, &["Has fix", "Remote execution"]), "2021-05-01"),
            published(with_risks(b, &["Has fix"]), "2022-06-15"),
            published(c, "2023-07-30"),
        ]
    }

    fn cves(records: &[ProcessedVulnerability]) -> Vec<&str> {
        records.iter().map(|r| r.vuln.cve.as_str()).collect()
    }

    #[test]
    fn test_empty_filter_is_identity() {
        let records = sample();
        assert!(FilterState::new().is_empty());
        assert_eq!(apply_filters(&records, &FilterState::new()), records);
    }

    #[test]
    fn test_search_across_fields() {
        let records = sample();
        let by_desc = apply_filters(&records, &FilterState::new().with_search("HEAP"));
        assert_eq!(cves(&by_desc), vec!["CVE-2021-1111"]);

        let by_repo = apply_filters(&records, &FilterState::new().with_search("bill"));
        assert_eq!(cves(&by_repo), vec!["CVE-2023-3333"]);

        let by_type = apply_filters(&records, &FilterState::new().with_search("python"));
        assert_eq!(cves(&by_type), vec!["CVE-2022-2222"]);

        let none = apply_filters(&records, &FilterState::new().with_search("nothing-here"));
        assert!(none.is_empty());
    }

    #[test]
    fn test_severity_membership() {
        let records = sample();
        let filtered =
            apply_filters(&records, &FilterState::new().with_severities(["critical", "high"]));
        assert_eq!(cves(&filtered), vec!["CVE-2021-1111", "CVE-2023-3333"]);
    }

    #[test]
    fn test_kai_status_membership_with_absent_as_empty() {
        let records = sample();
        let filtered = apply_filters(&records, &FilterState::new().with_kai_statuses([""]));
        assert_eq!(cves(&filtered), vec!["CVE-2023-3333"]);

        let filtered =
            apply_filters(&records, &FilterState::new().with_kai_statuses([KAI_INVALID_NORISK]));
        assert_eq!(cves(&filtered), vec!["CVE-2022-2222"]);
    }

    #[test]
    fn test_package_type_membership() {
        let records = sample();
        let filtered = apply_filters(&records, &FilterState::new().with_package_types(["os"]));
        assert_eq!(cves(&filtered), vec!["CVE-2021-1111", "CVE-2023-3333"]);
    }

    #[test]
    fn test_risk_factors_are_or_combined() {
        let records = sample();
        let filtered = apply_filters(
            &records,
            &FilterState::new().with_risk_factors(["Remote execution", "Exploit exists"]),
        );
        assert_eq!(cves(&filtered), vec!["CVE-2021-1111"]);

        let filtered = apply_filters(&records, &FilterState::new().with_risk_factors(["Has fix"]));
        assert_eq!(cves(&filtered), vec!["CVE-2021-1111", "CVE-2022-2222"]);
    }

    #[test]
    fn test_status_filter_agrees_with_classifier() {
        let mut records = sample();
        records.push(record("CVE-2024-4444", "low", "wontfix - fixed upstream"));

        let fixed = apply_filters(&records, &FilterState::new().with_statuses([StatusBucket::Fixed]));
        assert_eq!(cves(&fixed), vec!["CVE-2021-1111"]);

        let no_status =
            apply_filters(&records, &FilterState::new().with_statuses([StatusBucket::NoStatus]));
        assert_eq!(cves(&no_status), vec!["CVE-2023-3333"]);

        for bucket in StatusBucket::ALL {
            let filtered = apply_filters(&records, &FilterState::new().with_statuses([bucket]));
            assert!(filtered.iter().all(|r| r.status_bucket() == bucket));
        }
    }

    #[test]
    fn test_date_range_is_inclusive() {
        let records = sample();
        let start = Utc.with_ymd_and_hms(2021, 5, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2022, 6, 15, 0, 0, 0).unwrap();

        let filtered =
            apply_filters(&records, &FilterState::new().with_date_range(Some(start), Some(end)));
        assert_eq!(cves(&filtered), vec!["CVE-2021-1111", "CVE-2022-2222"]);

        let open_ended =
            apply_filters(&records, &FilterState::new().with_date_range(Some(end), None));
        assert_eq!(cves(&open_ended), vec!["CVE-2022-2222", "CVE-2023-3333"]);
    }

    #[test]
    fn test_unparseable_date_passes_range() {
        let records = vec![published(record("CVE-1", "low", ""), "unknown")];
        let start = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let filtered = apply_filters(&records, &FilterState::new().with_date_range(Some(start), None));
        assert_eq!(filtered.len(), 1);
    }

    #[test]
    fn test_dimensions_are_and_combined_and_idempotent() {
        let records = sample();
        let filters = FilterState::new()
            .with_severities(["critical", "low"])
            .with_risk_factors(["Has fix"])
            .with_package_types(["os"]);

        let once = apply_filters(&records, &filters);
        assert_eq!(cves(&once), vec!["CVE-2021-1111"]);
        assert_eq!(apply_filters(&once, &filters), once);
    }

    #[test]
    fn test_filter_state_deserializes_from_dashboard_json() {
        let filters: FilterState = serde_json::from_str(
            r#"{"searchQuery": "libfoo", "severity": ["critical"], "status": ["Will Not Fix", "No Status"],
                "dateRange": {"start": "2021-01-01T00:00:00Z"}}"#,
        )
        .unwrap();

        assert_eq!(filters.search_query, "libfoo");
        assert_eq!(filters.status, vec![StatusBucket::WillNotFix, StatusBucket::NoStatus]);
        assert!(filters.date_range.start.is_some());
        assert!(filters.date_range.end.is_none());
        assert!(filters.kai_status.is_empty());
    }

    #[test]
    fn test_analysis_modes() {
        let records = sample();
        assert_eq!(AnalysisMode::All.apply(&records), records);
        assert_eq!(cves(&AnalysisMode::Analysis.apply(&records)), vec!["CVE-2022-2222"]);
        assert_eq!(cves(&AnalysisMode::AiAnalysis.apply(&records)), vec!["CVE-2021-1111"]);
    }

    #[test]
    fn test_filter_by_kai_status_empty_list_keeps_all() {
        let records = sample();
        let empty: &[String] = &[];
        assert_eq!(filter_by_kai_status(&records, Some(empty)).len(), 3);
        assert_eq!(filter_by_kai_status::<String>(&records, None).len(), 3);
    }

    #[test]
    fn test_unique_filter_values_sorted() {
        let options = unique_filter_values(&sample());
        assert_eq!(options.package_types, vec!["os", "python"]);
        assert_eq!(options.risk_factors, vec!["Has fix", "Remote execution"]);
        assert_eq!(options.severities, vec!["critical", "high", "low"]);
    }
}
