/// Language detection for a parsed coverage report set.
///
/// Strategy:
///   1. Map each file-level entry's extension to a language tag
///   2. Pick the most frequent tag (ties go to the first seen)
///   3. Fall back to "unknown" when no file-level entry has a known extension
use std::collections::HashMap;

use crate::model::{CoverageReport, Level, UNKNOWN_LANGUAGE};

/// Decides which language a set of coverage entries belongs to.
pub trait LanguageDetector {
    fn detect(&self, reports: &[CoverageReport]) -> String;
}

/// Extension-frequency detector.
pub struct ExtensionLanguageDetector;

impl LanguageDetector for ExtensionLanguageDetector {
    fn detect(&self, reports: &[CoverageReport]) -> String {
        detect_language(reports)
    }
}

/// Language tag for a file extension, if known.
pub fn language_for_extension(ext: &str) -> Option<&'static str> {
    let lang = match ext.to_lowercase().as_str() {
        "py" => "python",
        "js" | "jsx" | "ts" | "tsx" | "mjs" | "cjs" => "javascript",
        "dart" => "dart",
        "go" => "go",
        "rs" => "rust",
        "java" => "java",
        "kt" | "kts" => "kotlin",
        "rb" => "ruby",
        "php" => "php",
        "cs" => "csharp",
        "swift" => "swift",
        "c" | "h" => "c",
        "cpp" | "cc" | "cxx" | "hpp" => "cpp",
        "scala" => "scala",
        _ => return None,
    };
    Some(lang)
}

fn extension(path: &str) -> Option<&str> {
    let name = path.rsplit('/').next()?;
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() {
        return None;
    }
    Some(ext)
}

/// Detect the dominant language of the file-level entries.
pub fn detect_language(reports: &[CoverageReport]) -> String {
    let mut counts: HashMap<&'static str, (usize, usize)> = HashMap::new();
    for (order, report) in reports.iter().enumerate() {
        if report.level != Level::File {
            continue;
        }
        if let Some(lang) = extension(&report.full_path).and_then(language_for_extension) {
            let entry = counts.entry(lang).or_insert((0, order));
            entry.0 += 1;
        }
    }

    counts
        .into_iter()
        .max_by(|(_, (count_a, first_a)), (_, (count_b, first_b))| {
            count_a.cmp(count_b).then(first_b.cmp(first_a))
        })
        .map(|(lang, _)| lang.to_string())
        .unwrap_or_else(|| UNKNOWN_LANGUAGE.to_string())
}
