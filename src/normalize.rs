//! Turn raw artifact text into annotated coverage entries.

use log::debug;

use crate::detect::LanguageDetector;
use crate::model::CoverageReport;
use crate::parsers::ReportParser;

/// Parse one artifact and annotate its entries.
///
/// Language is detected once for the artifact's whole entry set. LCOV has no
/// path-coverage metric, so branch coverage stands in for it.
pub fn normalize_artifact(
    text: &str,
    parser: &dyn ReportParser,
    detector: &dyn LanguageDetector,
) -> Vec<CoverageReport> {
    let mut reports = parser.parse(text);
    if reports.is_empty() {
        return reports;
    }
    let language = detector.detect(&reports);
    debug!("Detected language '{}' for {} entries", language, reports.len());
    for report in &mut reports {
        report.language = language.clone();
        report.path_coverage = report.branch_coverage;
    }
    reports
}

/// Normalize every artifact of a run into one list, in artifact order.
/// An empty result means no usable coverage was found (not zero coverage).
pub fn normalize_artifacts<I, S>(
    artifacts: I,
    parser: &dyn ReportParser,
    detector: &dyn LanguageDetector,
) -> Vec<CoverageReport>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut all = Vec::new();
    for text in artifacts {
        all.extend(normalize_artifact(text.as_ref(), parser, detector));
    }
    all
}
