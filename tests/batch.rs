mod common;

use common::MemoryStore;
use covsync::batch::{fetch_existing, plan_batches, BatchLimits, MAX_BATCH_CHARS, PER_REQUEST_OVERHEAD};
use covsync::model::{CoverageRecord, Level};

fn record(path: &str) -> CoverageRecord {
    CoverageRecord {
        id: Some(1),
        owner_id: 11,
        repo_id: 42,
        branch_name: "main".to_string(),
        level: Level::File,
        full_path: path.to_string(),
        language: "python".to_string(),
        statement_coverage: 40.0,
        function_coverage: 40.0,
        branch_coverage: 40.0,
        line_coverage: 40.0,
        path_coverage: 40.0,
        uncovered_lines: Some("1".to_string()),
        uncovered_functions: None,
        uncovered_branches: None,
        created_by: Some("alice".to_string()),
        updated_by: Some("alice".to_string()),
        created_at: None,
        updated_at: None,
        github_issue_url: None,
        file_size: None,
        is_excluded_from_testing: Some(false),
    }
}

fn long_paths(n: usize) -> Vec<String> {
    (0..n)
        .map(|i| format!("src/{}/file_{:04}.py", "deep".repeat(20), i))
        .collect()
}

#[test]
fn empty_input_makes_no_calls() {
    let mut store = MemoryStore::default();
    let existing = fetch_existing(&mut store, 42, &[], BatchLimits::default());
    assert!(existing.is_empty());
    assert!(store.fetch_calls.is_empty());
}

#[test]
fn results_from_all_batches_are_unioned() {
    let paths = long_paths(400);
    let mut store = MemoryStore::default();
    for p in &paths {
        store.seed(record(p));
    }

    let existing = fetch_existing(&mut store, 42, &paths, BatchLimits::default());
    assert_eq!(existing.len(), 400);
    assert!(store.fetch_calls.len() > 1);
    for call in &store.fetch_calls {
        let cost: usize = PER_REQUEST_OVERHEAD + call.iter().map(|p| p.len() + 3).sum::<usize>();
        assert!(cost <= MAX_BATCH_CHARS);
    }
    let flattened: Vec<String> = store.fetch_calls.concat();
    assert_eq!(flattened, paths);
}

#[test]
fn failure_on_second_batch_returns_nothing() {
    let paths = long_paths(400);
    let mut store = MemoryStore {
        fail_fetch_call: Some(1),
        ..MemoryStore::default()
    };
    for p in &paths {
        store.seed(record(p));
    }

    let existing = fetch_existing(&mut store, 42, &paths, BatchLimits::default());
    assert!(existing.is_empty());
    assert_eq!(store.fetch_calls.len(), 2);
}

#[test]
fn oversized_path_is_fetched_alone() {
    let huge = format!("src/{}.py", "x".repeat(MAX_BATCH_CHARS + 10));
    let paths = vec!["src/a.py".to_string(), huge.clone(), "src/b.py".to_string()];
    let mut store = MemoryStore::default();
    store.seed(record(&huge));

    let existing = fetch_existing(&mut store, 42, &paths, BatchLimits::default());
    assert_eq!(store.fetch_calls.len(), 3);
    assert_eq!(store.fetch_calls[1], vec![huge.clone()]);
    assert!(existing.contains_key(&huge));
}

#[test]
fn rows_for_other_repos_are_not_returned() {
    let mut store = MemoryStore::default();
    let mut foreign = record("src/a.py");
    foreign.repo_id = 7;
    store.seed(foreign);

    let existing = fetch_existing(&mut store, 42, &["src/a.py".to_string()], BatchLimits::default());
    assert!(existing.is_empty());
}

#[test]
fn plan_matches_fetch_calls() {
    let paths = long_paths(1000);
    let planned = plan_batches(&paths, BatchLimits::default()).len();
    let mut store = MemoryStore::default();
    fetch_existing(&mut store, 42, &paths, BatchLimits::default());
    assert_eq!(store.fetch_calls.len(), planned);
}
