//! Core data models for vulnerability-scan exports.
//!
//! This module defines the nested source document ([`VulnerabilityData`]) as it is
//! published by the scanner, and the flat [`ProcessedVulnerability`] record that
//! every other part of the pipeline works on.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::de::{IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;
use std::marker::PhantomData;

/// `kaiStatus` value for findings an AI review marked as invalid / no risk.
pub const KAI_AI_INVALID_NORISK: &str = "ai-invalid-norisk";
/// `kaiStatus` value for findings manually marked as invalid / no risk.
pub const KAI_INVALID_NORISK: &str = "invalid - norisk";

/// The complete scan export: group → repository → image version → vulnerabilities.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VulnerabilityData {
    #[serde(default)]
    pub groups: Entries<Group>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Group {
    #[serde(default)]
    pub repos: Entries<Repo>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Repo {
    /// Images keyed by version string.
    #[serde(default)]
    pub images: Entries<Image>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Image {
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub vulnerabilities: Vec<RawVulnerability>,
}

impl VulnerabilityData {
    /// Total number of vulnerability entries across every image.
    pub fn vulnerability_count(&self) -> usize {
        self.groups
            .values()
            .flat_map(|group| group.repos.values())
            .flat_map(|repo| repo.images.values())
            .map(|image| image.vulnerabilities.len())
            .sum()
    }
}

/// A single finding as it appears inside an image in the export.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawVulnerability {
    #[serde(default, deserialize_with = "null_as_default")]
    pub cve: String,
    /// One of critical/high/medium/low/negligible, kept verbatim.
    #[serde(default, deserialize_with = "null_as_default")]
    pub severity: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub cvss: f64,
    /// Free-form fix status reported by the scanner.
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: String,
    /// Analysis status, see [`KAI_AI_INVALID_NORISK`] and [`KAI_INVALID_NORISK`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kai_status: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub package_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub package_version: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub package_type: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub published: String,
    #[serde(default)]
    pub fix_date: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    /// Risk factor name → scanner detail. Only the names matter to filters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_factors: Option<Map<String, Value>>,
    /// Fields the pipeline does not interpret, carried through to exports.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A flattened finding with its group/repository/image context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedVulnerability {
    #[serde(flatten)]
    pub vuln: RawVulnerability,
    /// Unique within one normalization run.
    pub id: String,
    pub group_name: String,
    pub repo_name: String,
    pub image_name: String,
    pub image_version: String,
}

impl ProcessedVulnerability {
    pub fn severity(&self) -> Option<Severity> {
        Severity::parse(&self.vuln.severity)
    }

    pub fn status_bucket(&self) -> StatusBucket {
        StatusBucket::classify(&self.vuln.status)
    }

    /// A finding has a fix when its status mentions "fixed" in any case.
    pub fn has_fix(&self) -> bool {
        self.vuln.status.to_lowercase().contains("fixed")
    }

    /// The analysis status, with an absent value read as the empty string.
    pub fn kai_status(&self) -> &str {
        self.vuln.kai_status.as_deref().unwrap_or("")
    }

    pub fn has_risk_factor(&self, name: &str) -> bool {
        self.vuln
            .risk_factors
            .as_ref()
            .is_some_and(|factors| factors.contains_key(name))
    }

    pub fn published_at(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.vuln.published)
    }
}

/// Known severity levels, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Negligible,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 5] = [
        Self::Critical,
        Self::High,
        Self::Medium,
        Self::Low,
        Self::Negligible,
    ];

    /// Case-insensitive exact match against the five known levels.
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|severity| value.eq_ignore_ascii_case(severity.as_str()))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Negligible => "negligible",
        }
    }

    /// Sort rank: critical 5 down to negligible 1.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Critical => 5,
            Self::High => 4,
            Self::Medium => 3,
            Self::Low => 2,
            Self::Negligible => 1,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutually exclusive fix-status buckets shown on the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusBucket {
    Fixed,
    Affected,
    Open,
    #[serde(rename = "Under Investigation")]
    UnderInvestigation,
    #[serde(rename = "No Status")]
    NoStatus,
    #[serde(rename = "Will Not Fix")]
    WillNotFix,
    Needed,
    Deferred,
}

impl StatusBucket {
    pub const ALL: [StatusBucket; 8] = [
        Self::Fixed,
        Self::Affected,
        Self::Open,
        Self::UnderInvestigation,
        Self::NoStatus,
        Self::WillNotFix,
        Self::Needed,
        Self::Deferred,
    ];

    /// Classify a raw status string.
    ///
    /// Rules are checked in order on the trimmed, lower-cased value; anything
    /// unrecognized lands in [`StatusBucket::NoStatus`].
    pub fn classify(status: &str) -> Self {
        let status = status.trim().to_lowercase();
        match status.as_str() {
            "" => Self::NoStatus,
            "deferred" => Self::Deferred,
            "affected" => Self::Affected,
            "needed" => Self::Needed,
            "open" => Self::Open,
            "under investigation" => Self::UnderInvestigation,
            s if s.contains("will not fix") || s.contains("wontfix") => Self::WillNotFix,
            s if s.contains("fixed") => Self::Fixed,
            _ => Self::NoStatus,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Fixed => "Fixed",
            Self::Affected => "Affected",
            Self::Open => "Open",
            Self::UnderInvestigation => "Under Investigation",
            Self::NoStatus => "No Status",
            Self::WillNotFix => "Will Not Fix",
            Self::Needed => "Needed",
            Self::Deferred => "Deferred",
        }
    }

    /// Resolve a human-readable label back to its bucket.
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|bucket| bucket.label() == label)
    }
}

impl fmt::Display for StatusBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Parse the date formats seen in scanner exports into a UTC timestamp.
///
/// Accepts RFC 3339, naive date-times (read as UTC) and plain `YYYY-MM-DD` dates
/// (midnight UTC).
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Deserialize `null` the same way as a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Ordered `name → value` entries of a JSON object.
///
/// Keeps the document's key order, which determines record order and ids.
/// `null` (and, leniently, arrays) deserialize as no entries.
#[derive(Debug, Clone, PartialEq)]
pub struct Entries<T>(Vec<(String, T)>);

impl<T> Entries<T> {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.0.iter().map(|(_, value)| value)
    }

    pub fn get(&self, key: &str) -> Option<&T> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, value)| value)
    }

    pub fn push(&mut self, key: impl Into<String>, value: T) {
        self.0.push((key.into(), value));
    }
}

impl<T> Default for Entries<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Into<String>, T> FromIterator<(K, T)> for Entries<T> {
    fn from_iter<I: IntoIterator<Item = (K, T)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl<T: Serialize> Serialize for Entries<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in &self.0 {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Entries<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct EntriesVisitor<T>(PhantomData<T>);

        impl<'de, T: Deserialize<'de>> Visitor<'de> for EntriesVisitor<T> {
            type Value = Entries<T>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a JSON object or null")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((key, value)) = map.next_entry::<String, T>()? {
                    entries.push((key, value));
                }
                Ok(Entries(entries))
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<Self::Value, A::Error> {
                while seq.next_element::<IgnoredAny>()?.is_some() {}
                Ok(Entries::new())
            }

            fn visit_unit<E: serde::de::Error>(self) -> std::result::Result<Self::Value, E> {
                Ok(Entries::new())
            }

            fn visit_none<E: serde::de::Error>(self) -> std::result::Result<Self::Value, E> {
                Ok(Entries::new())
            }
        }

        deserializer.deserialize_any(EntriesVisitor(PhantomData))
    }
}
