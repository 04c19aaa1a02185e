//! Size-bounded batched reads of existing coverage rows.
//!
//! The REST backend rejects filter strings much beyond ~25,000 characters, so a
//! large `full_path IN (...)` lookup is split into consecutive batches whose
//! encoded size stays under `BatchLimits::max_chars`. Paths are never split;
//! a single path longer than the budget travels alone in its own batch.

use std::collections::HashMap;

use log::{debug, warn};

use crate::model::CoverageRecord;
use crate::store::CoverageStore;

/// Encoded-character budget per request, with headroom below the backend's
/// observed hard limit of roughly 25,000.
pub const MAX_BATCH_CHARS: usize = 20_000;

/// Per-path encoding cost on top of the path itself: two quotes and a comma.
pub const PER_PATH_OVERHEAD: usize = 3;

/// Fixed cost of one request: table, select list and the `repo_id` filter.
pub const PER_REQUEST_OVERHEAD: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimits {
    pub max_chars: usize,
    pub per_path_overhead: usize,
    pub per_request_overhead: usize,
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self {
            max_chars: MAX_BATCH_CHARS,
            per_path_overhead: PER_PATH_OVERHEAD,
            per_request_overhead: PER_REQUEST_OVERHEAD,
        }
    }
}

impl BatchLimits {
    /// Encoded cost of one path in a request.
    pub fn cost(&self, path: &str) -> usize {
        path.len() + self.per_path_overhead
    }
}

/// Split `paths` into consecutive, order-preserving batches.
///
/// Every input path lands in exactly one batch. A batch's total cost, the
/// per-request overhead included, never exceeds `limits.max_chars` unless it
/// holds a single oversized path.
pub fn plan_batches(paths: &[String], limits: BatchLimits) -> Vec<&[String]> {
    let mut batches = Vec::new();
    let mut start = 0;
    let mut running = limits.per_request_overhead;

    for (i, path) in paths.iter().enumerate() {
        let cost = limits.cost(path);
        if i > start && running + cost > limits.max_chars {
            batches.push(&paths[start..i]);
            start = i;
            running = limits.per_request_overhead;
        }
        running += cost;
    }
    if start < paths.len() {
        batches.push(&paths[start..]);
    }
    batches
}

/// Fetch existing rows for `paths`, keyed by `full_path`.
///
/// Fail-closed: if any batch request errors, everything fetched so far is
/// discarded and an empty map is returned. Callers must read "no existing
/// record" as "unknown prior state", never as "previously zero coverage".
pub fn fetch_existing(
    store: &mut dyn CoverageStore,
    repo_id: i64,
    paths: &[String],
    limits: BatchLimits,
) -> HashMap<String, CoverageRecord> {
    if paths.is_empty() {
        return HashMap::new();
    }

    let batches = plan_batches(paths, limits);
    let mut existing = HashMap::new();
    for (n, batch) in batches.iter().enumerate() {
        debug!(
            "Fetching existing coverage for repo {} (batch {}/{}, {} paths)",
            repo_id,
            n + 1,
            batches.len(),
            batch.len()
        );
        match store.fetch_by_paths(repo_id, batch) {
            Ok(rows) => {
                for row in rows {
                    existing.insert(row.full_path.clone(), row);
                }
            }
            Err(e) => {
                warn!(
                    "Failed to fetch existing coverage for repo {} (batch {}/{}): {}",
                    repo_id,
                    n + 1,
                    batches.len(),
                    e
                );
                return HashMap::new();
            }
        }
    }
    existing
}
