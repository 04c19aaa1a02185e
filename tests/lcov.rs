mod common;

use covsync::detect::ExtensionLanguageDetector;
use covsync::model::Level;
use covsync::normalize::normalize_artifact;
use covsync::parsers::lcov::LcovParser;
use covsync::parsers::ReportParser;
use pretty_assertions::assert_eq;

const JEST: &str = "\
TN:
SF:src/components/Button.tsx
FN:3,Button
FN:12,handleClick
FNDA:4,Button
FNDA:0,handleClick
FNF:2
FNH:1
DA:3,4
DA:4,4
DA:12,0
DA:13,0
LF:4
LH:2
BRDA:4,0,0,4
BRDA:4,0,1,0
BRF:2
BRH:1
end_of_record
SF:src/index.ts
FN:1,main
FNDA:1,main
DA:1,1
DA:2,1
LF:2
LH:2
end_of_record
";

#[test]
fn jest_report_parses_into_all_levels() {
    let reports = LcovParser.parse(JEST);
    let levels: Vec<(Level, &str)> = reports
        .iter()
        .map(|r| (r.level, r.full_path.as_str()))
        .collect();
    assert_eq!(
        levels,
        vec![
            (Level::File, "src/components/Button.tsx"),
            (Level::File, "src/index.ts"),
            (Level::Directory, "src/components"),
            (Level::Directory, "src"),
            (Level::Repository, "All"),
        ]
    );

    let button = &reports[0];
    assert_eq!(button.line_coverage, 50.0);
    assert_eq!(button.statement_coverage, 50.0);
    assert_eq!(button.function_coverage, 50.0);
    assert_eq!(button.branch_coverage, 50.0);
    assert_eq!(button.uncovered_lines, "12, 13");
    assert_eq!(button.uncovered_functions, "L12:handleClick");
    assert_eq!(button.uncovered_branches, "line 4, block 0, branch 1");

    let repo = &reports[4];
    assert_eq!(repo.line_coverage, 66.67);
    assert_eq!(repo.function_coverage, 66.67);
}

#[test]
fn normalized_jest_report_is_javascript_with_path_proxy() {
    let reports = normalize_artifact(JEST, &LcovParser, &ExtensionLanguageDetector);
    assert!(reports.iter().all(|r| r.language == "javascript"));
    assert!(reports.iter().all(|r| r.path_coverage == r.branch_coverage));
}

#[test]
fn garbage_input_yields_nothing() {
    assert!(LcovParser.parse("this is not lcov\n\0\u{1}").is_empty());
    assert!(LcovParser.parse("").is_empty());
}

#[test]
fn parsed_report_persists_to_sqlite() {
    use covsync::batch::BatchLimits;
    use covsync::pipeline::Pipeline;

    let (mut conn, _dir, _) = common::setup_db();
    let reports = normalize_artifact(JEST, &LcovParser, &ExtensionLanguageDetector);
    let outcome = Pipeline {
        store: &mut conn,
        parser: &LcovParser,
        detector: &ExtensionLanguageDetector,
        limits: BatchLimits::default(),
    }
    .persist(reports, &[], &common::run_context())
    .unwrap()
    .unwrap();
    assert_eq!(outcome.written.len(), 5);

    let stored = covsync::db::list_coverages(&conn, 42, Some(Level::File), false).unwrap();
    assert_eq!(stored.len(), 2);
    let index = stored.iter().find(|r| r.full_path == "src/index.ts").unwrap();
    assert_eq!(index.uncovered_lines, None);
    assert_eq!(index.uncovered_functions, None);
}

#[test]
fn summary_hits_above_totals_are_capped() {
    let lcov = "SF:src/app.py\nDA:1,1\nDA:2,1\nLF:2\nLH:3\nFNF:1\nFNH:2\nBRF:2\nBRH:5\nend_of_record\n";
    let reports = LcovParser.parse(lcov);
    for r in &reports {
        assert_eq!(r.line_coverage, 100.0, "{}", r.full_path);
        assert_eq!(r.function_coverage, 100.0, "{}", r.full_path);
        assert_eq!(r.branch_coverage, 100.0, "{}", r.full_path);
    }
}
