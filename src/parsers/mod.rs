pub mod lcov;

use crate::model::CoverageReport;

/// Every coverage text parser implements this trait.
pub trait ReportParser {
    /// Parse one artifact's text into coverage entries. Unparsable or empty
    /// input yields an empty list rather than an error.
    fn parse(&self, text: &str) -> Vec<CoverageReport>;
}
