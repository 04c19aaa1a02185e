//! Completeness: every source file in the repository gets an entry, and
//! each path appears once.

use std::collections::{HashMap, HashSet};

use log::warn;

use crate::files::is_source_file;
use crate::model::{CoverageReport, Level};

/// Append a zero-coverage entry for each source file in `tree` that has no
/// file-level entry yet. Returns how many entries were synthesized.
pub fn add_uncovered_source_files(reports: &mut Vec<CoverageReport>, tree: &[String]) -> usize {
    let covered: HashSet<String> = reports
        .iter()
        .filter(|r| r.level == Level::File)
        .map(|r| r.full_path.clone())
        .collect();

    let mut added = 0;
    let mut seen = HashSet::new();
    for path in tree {
        if !is_source_file(path) || covered.contains(path) || !seen.insert(path.as_str()) {
            continue;
        }
        reports.push(CoverageReport::zero_coverage(path.clone()));
        added += 1;
    }
    added
}

/// Collapse entries sharing a `full_path`: the last occurrence's data wins,
/// kept at the position where the path first appeared. Duplicates are logged,
/// never fatal. `repo` only labels the warning.
pub fn dedupe_by_path(reports: Vec<CoverageReport>, repo: &str) -> Vec<CoverageReport> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut unique: Vec<CoverageReport> = Vec::with_capacity(reports.len());

    for report in reports {
        match index.get(&report.full_path) {
            Some(&idx) => {
                warn!(
                    "Duplicate coverage for `{}`, full_path=`{}`",
                    repo, report.full_path
                );
                unique[idx] = report;
            }
            None => {
                index.insert(report.full_path.clone(), unique.len());
                unique.push(report);
            }
        }
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;

    fn covered(path: &str, line: f64) -> CoverageReport {
        let mut r = CoverageReport::zero_coverage(path);
        r.line_coverage = line;
        r.language = "python".to_string();
        r
    }

    fn tree(paths: &[&str]) -> Vec<String> {
        paths.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_adds_missing_source_files() {
        let mut reports = vec![covered("src/a.py", 80.0)];
        let added = add_uncovered_source_files(
            &mut reports,
            &tree(&["src/a.py", "src/b.py", "src/c.py", "README.md", "tests/test_a.py", "src/types/t.py"]),
        );
        assert_eq!(added, 2);
        let paths: Vec<_> = reports.iter().map(|r| r.full_path.as_str()).collect();
        assert_eq!(paths, vec!["src/a.py", "src/b.py", "src/c.py"]);
        assert_eq!(reports[1].line_coverage, 0.0);
        assert_eq!(reports[1].language, "unknown");
    }

    #[test]
    fn test_directory_entry_does_not_count_as_covered() {
        let mut dir = covered("src/a.py", 50.0);
        dir.level = Level::Directory;
        let mut reports = vec![dir];
        assert_eq!(add_uncovered_source_files(&mut reports, &tree(&["src/a.py"])), 1);
    }

    #[test]
    fn test_repeated_tree_entries_synthesize_once() {
        let mut reports = Vec::new();
        add_uncovered_source_files(&mut reports, &tree(&["src/a.py", "src/a.py"]));
        assert_eq!(reports.len(), 1);
    }

    #[test]
    fn test_dedupe_last_wins_at_first_position() {
        let reports = vec![
            covered("src/a.py", 10.0),
            covered("src/b.py", 20.0),
            covered("src/a.py", 30.0),
        ];
        let unique = dedupe_by_path(reports, "o/r");
        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0].full_path, "src/a.py");
        assert_eq!(unique[0].line_coverage, 30.0);
        assert_eq!(unique[1].full_path, "src/b.py");
    }
}
