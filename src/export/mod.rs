//! Report export: HTML rendering plus artifact naming and expiry. The
//! actual HTML-to-PDF rasterization (a headless-browser render upstream)
//! stays behind [`PdfRasterizer`]; this engine produces the document and
//! the metadata around it.

pub mod html;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::analytics::types::{FacilityReport, GlobalReport, MemberReport};
use crate::error::Result;
use crate::query::ReportRange;

/// How long a generated artifact stays downloadable before cleanup.
pub const ARTIFACT_TTL_HOURS: i64 = 24;

/// Converts a rendered HTML document into PDF bytes. Implemented by the
/// host; rendering engines are deliberately out of scope here.
pub trait PdfRasterizer {
    fn rasterize(&self, html: &str) -> Result<Vec<u8>>;
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportArtifact {
    pub filename: String,
    pub html: String,
    pub generated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ExportArtifact {
    fn new(scope: &str, name: &str, range: ReportRange, html: String, generated_at: DateTime<Utc>) -> Self {
        Self {
            filename: artifact_filename(scope, name, range, generated_at),
            html,
            generated_at,
            expires_at: generated_at + Duration::hours(ARTIFACT_TTL_HOURS),
        }
    }
}

/// Lowercase, collapse anything non-alphanumeric to single dashes, trim
/// dashes at the ends. Empty input becomes `report`.
pub fn sanitize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_dash = true;
    for c in name.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c);
            last_dash = false;
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }
    let trimmed = out.trim_matches('-');
    if trimmed.is_empty() {
        "report".to_string()
    } else {
        trimmed.to_string()
    }
}

pub fn artifact_filename(
    scope: &str,
    name: &str,
    range: ReportRange,
    generated_at: DateTime<Utc>,
) -> String {
    format!(
        "nexora-analytics-{scope}-{}-{}-{}.pdf",
        sanitize_name(name),
        range.to_key(),
        generated_at.format("%Y-%m-%d")
    )
}

pub fn global_artifact(report: &GlobalReport, range: ReportRange) -> ExportArtifact {
    ExportArtifact::new(
        "global",
        "all-facilities",
        range,
        html::render_global(report),
        report.meta.generated_at,
    )
}

pub fn facility_artifact(report: &FacilityReport, range: ReportRange) -> ExportArtifact {
    ExportArtifact::new(
        "facility",
        &report.facility.name,
        range,
        html::render_facility(report),
        report.meta.generated_at,
    )
}

pub fn member_artifact(report: &MemberReport, range: ReportRange) -> ExportArtifact {
    ExportArtifact::new(
        "member",
        &report.member.name,
        range,
        html::render_member(report),
        report.meta.generated_at,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("North Facility"), "north-facility");
        assert_eq!(sanitize_name("Ada Lovelace"), "ada-lovelace");
        assert_eq!(sanitize_name("  --Weird__name!!  "), "weird-name");
        assert_eq!(sanitize_name("日本語"), "report");
        assert_eq!(sanitize_name(""), "report");
    }

    #[test]
    fn test_artifact_filename_shape() {
        let generated = Utc.with_ymd_and_hms(2025, 6, 15, 9, 30, 0).unwrap();
        let name = artifact_filename(
            "facility",
            "North Facility",
            ReportRange::default(),
            generated,
        );
        assert_eq!(name, "nexora-analytics-facility-north-facility-4w-2025-06-15.pdf");
    }

    #[test]
    fn test_artifact_expiry_is_24h() {
        let generated = Utc.with_ymd_and_hms(2025, 6, 15, 9, 30, 0).unwrap();
        let artifact = ExportArtifact::new(
            "global",
            "all-facilities",
            ReportRange::default(),
            "<html></html>".into(),
            generated,
        );
        assert_eq!(artifact.expires_at - generated, Duration::hours(24));
    }
}
