//! Example loading the dashboard dataset and printing a summary.
//!
//! Run with:
//! ```bash
//! VULNERA_DASHBOARD__DATA_SOURCE_URL=https://example.com/export.json cargo run --example load
//! ```

use std::time::Instant;

use vulnera_dashboard::filter::{FilterState, unique_filter_values};
use vulnera_dashboard::models::StatusBucket;
use vulnera_dashboard::query::{critical_vulnerabilities, fuzzy_search, trending_vulnerabilities};
use vulnera_dashboard::{AnalysisMode, Config, DashboardManager, StatsAggregator, apply_filters};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    // Initialize logging (hold the guard until the end of main!)
    let _guard = vulnera_dashboard::logging::init_logging(&config);

    println!("=== Vulnera Dashboard Load ===\n");
    println!("Source: {}", config.data_source_url);
    println!("Cache:  {}", config.cache_dir.display());

    let manager = DashboardManager::from_config(&config);
    let info = manager.cache_info().await;
    match info.age {
        Some(age) if info.present => println!(
            "Cached export present ({:.1}h old, ~{} KB)",
            age.as_secs_f64() / 3600.0,
            info.approximate_size_bytes.unwrap_or(0) / 1024
        ),
        _ => println!("No cached export"),
    }

    let start = Instant::now();
    let mut last_decile = 0;
    let dataset = manager
        .load(&mut |percent: f64| {
            let decile = (percent / 10.0) as u32;
            if decile > last_decile {
                last_decile = decile;
                println!("  {:>5.1}%", percent);
            }
        })
        .await?;

    println!(
        "\n✓ Loaded {} records from {:?} in {:.1}s",
        dataset.records.len(),
        dataset.origin,
        start.elapsed().as_secs_f64()
    );

    let stats = &dataset.stats;
    println!("\n=== Statistics ===");
    println!(
        "  Critical: {}  High: {}  Medium: {}  Low: {}  Negligible: {}",
        stats.critical_count, stats.high_count, stats.medium_count, stats.low_count, stats.negligible_count
    );
    println!("  With fix: {}  Without fix: {}", stats.with_fix, stats.without_fix);
    for bucket in StatusBucket::ALL {
        println!("  {:<20} {}", bucket.label(), stats.status_count(bucket));
    }
    println!(
        "  Unique packages: {}  Unique CVEs: {}",
        stats.unique_packages, stats.unique_cves
    );

    let options = unique_filter_values(&dataset.records);
    println!("\nPackage types: {}", options.package_types.join(", "));

    println!("\n=== Top critical ===");
    for record in critical_vulnerabilities(&dataset.records, 5) {
        println!("  {} ({}) {} in {}/{}", record.vuln.cve, record.vuln.cvss, record.vuln.package_name, record.group_name, record.repo_name);
    }

    println!("\n=== Most recent ===");
    for record in trending_vulnerabilities(&dataset.records, 5) {
        println!("  {} published {}", record.vuln.cve, record.vuln.published);
    }

    println!("\n=== Monthly trend ===");
    for month in StatsAggregator::monthly_trend(&dataset.records) {
        println!("  {} {:>6}", month.month, month.count);
    }

    let top = critical_vulnerabilities(&dataset.records, 3);
    let top_ids: Vec<&str> = top.iter().map(|r| r.id.as_str()).collect();
    let comparison = StatsAggregator::compare(&dataset.records, &top_ids);
    for (factor, count) in &comparison.common_risk_factors {
        println!("  shared by top findings: {} ({}/{})", factor, count, comparison.selected);
    }

    let ai_reviewed = AnalysisMode::AiAnalysis.apply(&dataset.records);
    println!("\nAI-marked invalid/no-risk: {}", ai_reviewed.len());

    let open_critical = apply_filters(
        &dataset.records,
        &FilterState::new()
            .with_severities(["critical"])
            .with_statuses([StatusBucket::Open, StatusBucket::Affected]),
    );
    println!("Open/affected critical findings: {}", open_critical.len());

    if let Some(first) = dataset.records.first() {
        let hits = fuzzy_search(&dataset.records, &first.vuln.cve);
        println!("Search for {}: {} hits", first.vuln.cve, hits.len());
    }

    Ok(())
}
