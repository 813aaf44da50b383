// 🏷️ Report-Type Filter
// Keyword substring rules deciding whether a filing is an audit report

use crate::disclosure::DisclosureRecord;

pub const DEFAULT_KEYWORDS: &[&str] = &["감사보고서"];

#[derive(Debug, Clone)]
pub struct ReportFilter {
    /// Stored lower-cased
    keywords: Vec<String>,
}

impl ReportFilter {
    /// Empty and whitespace-only keywords are dropped; an empty set falls back to the defaults.
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut keywords: Vec<String> = keywords
            .into_iter()
            .map(|k| k.as_ref().trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();

        if keywords.is_empty() {
            keywords = DEFAULT_KEYWORDS.iter().map(|k| k.to_lowercase()).collect();
        }

        ReportFilter { keywords }
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    /// Case-insensitive substring match against any keyword
    pub fn is_audit_report(&self, title: &str) -> bool {
        let title_lower = title.to_lowercase();
        self.keywords.iter().any(|k| title_lower.contains(k.as_str()))
    }

    /// Keeps audit reports, preserving order
    pub fn retain_audit_reports(&self, records: Vec<DisclosureRecord>) -> Vec<DisclosureRecord> {
        records
            .into_iter()
            .filter(|r| self.is_audit_report(&r.report_title))
            .collect()
    }
}

impl Default for ReportFilter {
    fn default() -> Self {
        ReportFilter::new(DEFAULT_KEYWORDS)
    }
}
