//! Dashboard statistics aggregation.
//!
//! This module computes the summary figures shown on the dashboard from any
//! record sequence in a single pass, the month-by-month publication trend and
//! the side-by-side summary of a hand-picked selection.

use crate::models::{
    KAI_AI_INVALID_NORISK, KAI_INVALID_NORISK, ProcessedVulnerability, Severity, StatusBucket,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Number of most recent months kept by [`StatsAggregator::monthly_trend`].
pub const TREND_MONTHS: usize = 12;

/// Summary counts over a record sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_vulnerabilities: usize,
    pub critical_count: usize,
    pub high_count: usize,
    pub medium_count: usize,
    pub low_count: usize,
    pub negligible_count: usize,
    pub with_fix: usize,
    pub without_fix: usize,
    pub ai_invalid_norisk: usize,
    pub invalid_norisk: usize,
    /// Distinct `packageName@packageVersion` pairs.
    pub unique_packages: usize,
    #[serde(rename = "uniqueCVEs")]
    pub unique_cves: usize,
    pub status_fixed: usize,
    pub status_affected: usize,
    pub status_open: usize,
    pub status_under_investigation: usize,
    pub status_no_status: usize,
    pub status_will_not_fix: usize,
    pub status_needed: usize,
    pub status_deferred: usize,
}

impl DashboardStats {
    /// Count for a single severity level.
    pub fn severity_count(&self, severity: Severity) -> usize {
        match severity {
            Severity::Critical => self.critical_count,
            Severity::High => self.high_count,
            Severity::Medium => self.medium_count,
            Severity::Low => self.low_count,
            Severity::Negligible => self.negligible_count,
        }
    }

    /// Count for a single status bucket.
    pub fn status_count(&self, bucket: StatusBucket) -> usize {
        match bucket {
            StatusBucket::Fixed => self.status_fixed,
            StatusBucket::Affected => self.status_affected,
            StatusBucket::Open => self.status_open,
            StatusBucket::UnderInvestigation => self.status_under_investigation,
            StatusBucket::NoStatus => self.status_no_status,
            StatusBucket::WillNotFix => self.status_will_not_fix,
            StatusBucket::Needed => self.status_needed,
            StatusBucket::Deferred => self.status_deferred,
        }
    }

    fn status_count_mut(&mut self, bucket: StatusBucket) -> &mut usize {
        match bucket {
            StatusBucket::Fixed => &mut self.status_fixed,
            StatusBucket::Affected => &mut self.status_affected,
            StatusBucket::Open => &mut self.status_open,
            StatusBucket::UnderInvestigation => &mut self.status_under_investigation,
            StatusBucket::NoStatus => &mut self.status_no_status,
            StatusBucket::WillNotFix => &mut self.status_will_not_fix,
            StatusBucket::Needed => &mut self.status_needed,
            StatusBucket::Deferred => &mut self.status_deferred,
        }
    }
}

/// Findings published in one calendar month (`YYYY-MM`, UTC).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyCount {
    pub month: String,
    pub count: usize,
}

/// Summary of a selection of records being compared.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonSummary {
    pub selected: usize,
    /// `None` when nothing is selected.
    pub highest_cvss: Option<f64>,
    pub lowest_cvss: Option<f64>,
    pub with_fix: usize,
    /// Distinct package names, versions ignored.
    pub unique_packages: usize,
    /// Risk factors present on more than one selected record, most shared first.
    pub common_risk_factors: Vec<(String, usize)>,
}

/// Aggregator producing [`DashboardStats`].
pub struct StatsAggregator;

impl StatsAggregator {
    /// Compute statistics for the given records.
    ///
    /// Pure function of its input; the unique-value sets are rebuilt on every call.
    pub fn aggregate(records: &[ProcessedVulnerability]) -> DashboardStats {
        let mut stats = DashboardStats {
            total_vulnerabilities: records.len(),
            ..Default::default()
        };

        let mut packages: HashSet<String> = HashSet::new();
        let mut cves: HashSet<&str> = HashSet::new();

        for record in records {
            match record.severity() {
                Some(Severity::Critical) => stats.critical_count += 1,
                Some(Severity::High) => stats.high_count += 1,
                Some(Severity::Medium) => stats.medium_count += 1,
                Some(Severity::Low) => stats.low_count += 1,
                Some(Severity::Negligible) => stats.negligible_count += 1,
                None => {}
            }

            if record.has_fix() {
                stats.with_fix += 1;
            } else {
                stats.without_fix += 1;
            }

            *stats.status_count_mut(record.status_bucket()) += 1;

            match record.vuln.kai_status.as_deref() {
                Some(KAI_AI_INVALID_NORISK) => stats.ai_invalid_norisk += 1,
                Some(KAI_INVALID_NORISK) => stats.invalid_norisk += 1,
                _ => {}
            }

            packages.insert(format!(
                "{}@{}",
                record.vuln.package_name, record.vuln.package_version
            ));
            cves.insert(&record.vuln.cve);
        }

        stats.unique_packages = packages.len();
        stats.unique_cves = cves.len();
        stats
    }

    /// Count records per publication month, oldest first, keeping only the
    /// last [`TREND_MONTHS`] months that have any findings.
    ///
    /// Records whose published date cannot be parsed are left out.
    pub fn monthly_trend(records: &[ProcessedVulnerability]) -> Vec<MonthlyCount> {
        let mut months: BTreeMap<String, usize> = BTreeMap::new();
        for published in records.iter().filter_map(|r| r.published_at()) {
            *months.entry(published.format("%Y-%m").to_string()).or_default() += 1;
        }

        let skip = months.len().saturating_sub(TREND_MONTHS);
        months
            .into_iter()
            .skip(skip)
            .map(|(month, count)| MonthlyCount { month, count })
            .collect()
    }

    /// Summarize the records whose id is in `ids`.
    pub fn compare<S: AsRef<str>>(
        records: &[ProcessedVulnerability],
        ids: &[S],
    ) -> ComparisonSummary {
        let wanted: HashSet<&str> = ids.iter().map(|id| id.as_ref()).collect();
        let selected: Vec<&ProcessedVulnerability> = records
            .iter()
            .filter(|r| wanted.contains(r.id.as_str()))
            .collect();

        let mut summary = ComparisonSummary {
            selected: selected.len(),
            ..Default::default()
        };

        let mut packages: HashSet<&str> = HashSet::new();
        let mut factor_counts: Vec<(String, usize)> = Vec::new();
        let mut factor_index: HashMap<&str, usize> = HashMap::new();

        for &record in &selected {
            let cvss = record.vuln.cvss;
            summary.highest_cvss = Some(summary.highest_cvss.map_or(cvss, |h| h.max(cvss)));
            summary.lowest_cvss = Some(summary.lowest_cvss.map_or(cvss, |l| l.min(cvss)));

            if record.has_fix() {
                summary.with_fix += 1;
            }
            packages.insert(record.vuln.package_name.as_str());

            for factor in record.vuln.risk_factors.iter().flat_map(|f| f.keys()) {
                match factor_index.get(factor.as_str()) {
                    Some(&i) => factor_counts[i].1 += 1,
                    None => {
                        factor_index.insert(factor.as_str(), factor_counts.len());
                        factor_counts.push((factor.clone(), 1));
                    }
                }
            }
        }

        summary.unique_packages = packages.len();
        factor_counts.retain(|(_, count)| *count > 1);
        // stable: ties keep first-seen order
        factor_counts.sort_by(|a, b| b.1.cmp(&a.1));
        summary.common_risk_factors = factor_counts;
        summary
    }
}
