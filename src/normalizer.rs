//! Flattening of the nested scan export into dashboard records.

use crate::models::{ProcessedVulnerability, VulnerabilityData};
use tracing::debug;

/// Flatten a scan export into one record per vulnerability entry.
///
/// Records come out in document order (group → repo → image version → entry).
/// Each gets an id built from its context, CVE and a per-run counter, so two
/// identical entries in the same image still get distinct ids.
pub fn normalize(data: &VulnerabilityData) -> Vec<ProcessedVulnerability> {
    let mut records = Vec::with_capacity(data.vulnerability_count());
    let mut counter: u64 = 0;

    for (group_name, group) in data.groups.iter() {
        for (repo_name, repo) in group.repos.iter() {
            for (version, image) in repo.images.iter() {
                for vuln in &image.vulnerabilities {
                    records.push(ProcessedVulnerability {
                        id: format!(
                            "{}-{}-{}-{}-{}",
                            group_name, repo_name, version, vuln.cve, counter
                        ),
                        vuln: vuln.clone(),
                        group_name: group_name.to_string(),
                        repo_name: repo_name.to_string(),
                        image_name: image.name.clone(),
                        image_version: version.to_string(),
                    });
                    counter += 1;
                }
            }
        }
    }

    debug!(
        "Normalized {} records from {} groups",
        records.len(),
        data.groups.len()
    );
    records
}
