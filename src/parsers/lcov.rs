/// Parser for the LCOV `.info` format.
///
/// Reference: https://ltp.sourceforge.net/coverage/lcov/geninfo.1.php
///
/// Key records:
///   TN:<test name>
///   SF:<path to source file>
///   FN:<line>,<function name>            (Jest/Vitest, Flutter)
///   FN:<start>,<end>,<function name>     (coverage.py)
///   FNDA:<execution count>,<function name>
///   FNF:<number of functions found>
///   FNH:<number of functions hit>
///   DA:<line number>,<execution count>[,<checksum>]
///   BRDA:<line>,<block>,<branch>,<taken>   ("-" means 0)
///   BRF:<branches found>
///   BRH:<branches hit>
///   LF:<lines found>
///   LH:<lines hit>
///   end_of_record
///
/// Each record becomes a `file` entry; records are also rolled up into one
/// `directory` entry per parent directory and a single `repository` entry.
use std::collections::{BTreeSet, HashMap};
use std::io::BufRead;

use log::{debug, warn};

use super::ReportParser;
use crate::error::{CovsyncError, Result};
use crate::model::{percent, CoverageReport, Level, UNKNOWN_LANGUAGE};

/// `full_path` of the repository-level entry.
pub const REPOSITORY_PATH: &str = "All";

/// LCOV format parser.
pub struct LcovParser;

impl ReportParser for LcovParser {
    fn parse(&self, text: &str) -> Vec<CoverageReport> {
        match parse(text) {
            Ok(reports) => reports,
            Err(e) => {
                warn!("Discarding unparsable LCOV data: {}", e);
                Vec::new()
            }
        }
    }
}

/// A function definition that has not (yet) been seen executing.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct UncoveredFunction {
    start_line: u32,
    end_line: Option<u32>,
    name: String,
}

impl UncoveredFunction {
    fn describe(&self) -> String {
        match self.end_line {
            Some(end) => format!("L{}-{}:{}", self.start_line, end, self.name),
            None => format!("L{}:{}", self.start_line, self.name),
        }
    }
}

/// Hit/total counters plus the uncovered detail for one scope.
#[derive(Debug, Clone, Default)]
struct Stats {
    lines_total: u64,
    lines_covered: u64,
    functions_total: u64,
    functions_covered: u64,
    branches_total: u64,
    branches_covered: u64,
    uncovered_lines: BTreeSet<u32>,
    uncovered_functions: BTreeSet<UncoveredFunction>,
    uncovered_branches: BTreeSet<String>,
}

impl Stats {
    fn absorb(&mut self, other: &Stats) {
        self.lines_total += other.lines_total;
        self.lines_covered += other.lines_covered;
        self.functions_total += other.functions_total;
        self.functions_covered += other.functions_covered;
        self.branches_total += other.branches_total;
        self.branches_covered += other.branches_covered;
        self.uncovered_lines.extend(other.uncovered_lines.iter().copied());
        self.uncovered_functions
            .extend(other.uncovered_functions.iter().cloned());
        self.uncovered_branches
            .extend(other.uncovered_branches.iter().cloned());
    }

    fn into_report(self, full_path: String, level: Level) -> CoverageReport {
        let line_coverage = percent(self.lines_covered, self.lines_total);
        let uncovered_lines = if level == Level::File && line_coverage > 0.0 {
            join(self.uncovered_lines.iter().map(u32::to_string))
        } else {
            String::new()
        };
        CoverageReport {
            level,
            full_path,
            language: UNKNOWN_LANGUAGE.to_string(),
            statement_coverage: line_coverage,
            function_coverage: percent(self.functions_covered, self.functions_total),
            branch_coverage: percent(self.branches_covered, self.branches_total),
            line_coverage,
            path_coverage: 0.0,
            uncovered_lines,
            uncovered_functions: join(self.uncovered_functions.iter().map(|f| f.describe())),
            uncovered_branches: join(self.uncovered_branches.into_iter()),
        }
    }
}

fn join(items: impl Iterator<Item = String>) -> String {
    items.collect::<Vec<_>>().join(", ")
}

/// Insertion-ordered accumulator; re-inserting a key keeps its first position.
#[derive(Default)]
struct OrderedStats {
    index: HashMap<String, usize>,
    entries: Vec<(String, Stats)>,
}

impl OrderedStats {
    fn slot(&mut self, key: &str) -> &mut Stats {
        let idx = match self.index.get(key) {
            Some(&idx) => idx,
            None => {
                self.entries.push((key.to_string(), Stats::default()));
                self.index.insert(key.to_string(), self.entries.len() - 1);
                self.entries.len() - 1
            }
        };
        &mut self.entries[idx].1
    }

    fn replace(&mut self, key: &str, stats: Stats) {
        *self.slot(key) = stats;
    }
}

/// Parent directory of a repo-relative path (`""` for top-level files).
fn parent_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    }
}

/// Test sources that coverage tools sometimes instrument; never reported.
fn is_instrumented_test(path: &str) -> bool {
    let dir = parent_dir(path);
    let name = path.rsplit('/').next().unwrap_or(path);
    dir.contains("tests") || name.starts_with("test_") || name.ends_with("_test.py")
}

/// Parse LCOV text into file, directory and repository entries.
/// Input with no source-file records produces an empty list.
pub fn parse(input: &str) -> Result<Vec<CoverageReport>> {
    let mut files = OrderedStats::default();
    parse_streaming_reader(&mut input.as_bytes(), &mut |path, stats| {
        files.replace(&path, stats);
        Ok(())
    })?;

    if files.entries.is_empty() {
        return Ok(Vec::new());
    }

    let mut dirs = OrderedStats::default();
    let mut repo = Stats::default();
    for (path, stats) in &files.entries {
        dirs.slot(parent_dir(path)).absorb(stats);
        repo.absorb(stats);
    }

    let mut reports = Vec::with_capacity(files.entries.len() + dirs.entries.len() + 1);
    for (path, stats) in files.entries {
        reports.push(stats.into_report(path, Level::File));
    }
    for (path, stats) in dirs.entries {
        let path = if path.is_empty() { ".".to_string() } else { path };
        reports.push(stats.into_report(path, Level::Directory));
    }
    reports.push(repo.into_report(REPOSITORY_PATH.to_string(), Level::Repository));
    Ok(reports)
}

/// Describe a BRDA branch, understanding coverage.py's textual descriptors.
fn describe_branch(line: u32, block: u32, desc: &str) -> Option<String> {
    if let Some(target) = desc.strip_prefix("jump to line ") {
        return Some(format!(
            "line {}, block {}, if branch: {} -> {}",
            line, block, line, target
        ));
    }
    if desc == "jump to the function exit" {
        return Some(format!("line {}, block {}, function exit", line, block));
    }
    if let Some(rest) = desc.strip_prefix("return from function ") {
        let name = rest.trim_start_matches('\'').trim_end_matches('\'');
        return Some(format!("line {}, block {}, return from: {}", line, block, name));
    }
    if desc == "exit the module" {
        return Some(format!("line {}, block {}, module exit", line, block));
    }
    let branch: u32 = desc.parse().ok()?;
    Some(format!("line {}, block {}, branch {}", line, block, branch))
}

/// Streaming LCOV parser: calls `emit` once per completed record.
/// Records for instrumented test files are dropped.
fn parse_streaming_reader(
    reader: &mut dyn BufRead,
    emit: &mut dyn FnMut(String, Stats) -> Result<()>,
) -> Result<()> {
    let mut current: Option<(String, Stats)> = None;
    let mut skipping = false;

    let mut raw_line = String::new();
    loop {
        raw_line.clear();
        let n = reader
            .read_line(&mut raw_line)
            .map_err(|e| CovsyncError::Parse(format!("Invalid LCOV data: {}", e)))?;
        if n == 0 {
            break;
        }

        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }

        if line == "end_of_record" {
            if let Some((path, stats)) = current.take() {
                emit(path, stats)?;
            }
            skipping = false;
            continue;
        }

        if skipping {
            continue;
        }

        let (tag, value) = match line.split_once(':') {
            Some(pair) => pair,
            None => continue,
        };

        if tag == "SF" {
            if is_instrumented_test(value) {
                debug!("Skipping coverage for test file {}", value);
                current = None;
                skipping = true;
            } else {
                current = Some((value.to_string(), Stats::default()));
            }
            continue;
        }

        let stats = match current.as_mut() {
            Some((_, stats)) => stats,
            None => continue,
        };

        match tag {
            "FN" => {
                let parts: Vec<&str> = value.split(',').map(str::trim).collect();
                let func = match parts.as_slice() {
                    [start, name] => start.parse().ok().map(|start_line| UncoveredFunction {
                        start_line,
                        end_line: None,
                        name: name.to_string(),
                    }),
                    [start, end, name] => match (start.parse(), end.parse()) {
                        (Ok(start_line), Ok(end_line)) => Some(UncoveredFunction {
                            start_line,
                            end_line: Some(end_line),
                            name: name.to_string(),
                        }),
                        _ => None,
                    },
                    _ => None,
                };
                if let Some(func) = func {
                    stats.uncovered_functions.insert(func);
                }
            }
            "FNDA" => {
                if let Some((count_str, name)) = value.split_once(',') {
                    let count = count_str.trim().parse::<i64>().unwrap_or(0);
                    if count > 0 {
                        stats.functions_covered += 1;
                        stats.uncovered_functions.retain(|f| f.name != name);
                    }
                    stats.functions_total += 1;
                }
            }
            "FNF" => {
                if let Ok(n) = value.parse() {
                    stats.functions_total = n;
                }
            }
            "FNH" => {
                if let Ok(n) = value.parse() {
                    stats.functions_covered = n;
                }
            }
            "DA" => {
                // Negative counts mark non-instrumentable lines; skip them.
                let parts: Vec<&str> = value.splitn(3, ',').collect();
                if parts.len() >= 2 {
                    if let (Ok(line_number), Ok(count)) =
                        (parts[0].parse::<u32>(), parts[1].parse::<i64>())
                    {
                        if count >= 0 {
                            stats.lines_total += 1;
                            if count > 0 {
                                stats.lines_covered += 1;
                            } else {
                                stats.uncovered_lines.insert(line_number);
                            }
                        }
                    }
                }
            }
            "LF" => {
                if let Ok(n) = value.parse() {
                    stats.lines_total = n;
                }
            }
            "LH" => {
                if let Ok(n) = value.parse() {
                    stats.lines_covered = n;
                }
            }
            "BRDA" => {
                let parts: Vec<&str> = value.split(',').collect();
                if parts.len() != 4 {
                    debug!("Skipping malformed branch line: {}", line);
                    continue;
                }
                let (line_num, block) = match (parts[0].parse::<u32>(), parts[1].parse::<u32>()) {
                    (Ok(l), Ok(b)) => (l, b),
                    _ => continue,
                };
                let taken = if parts[3] == "-" {
                    0
                } else {
                    match parts[3].parse::<u64>() {
                        Ok(t) => t,
                        Err(_) => continue,
                    }
                };
                let branch = match describe_branch(line_num, block, parts[2]) {
                    Some(b) => b,
                    None => continue,
                };
                if taken > 0 {
                    stats.branches_covered += 1;
                    stats.uncovered_branches.remove(&branch);
                } else {
                    stats.uncovered_branches.insert(branch);
                }
                stats.branches_total += 1;
            }
            "BRF" => {
                if let Ok(n) = value.parse() {
                    stats.branches_total = n;
                }
            }
            "BRH" => {
                if let Ok(n) = value.parse() {
                    stats.branches_covered = n;
                }
            }
            // TN and anything unknown
            _ => {}
        }
    }

    // Handle case where file ends without end_of_record
    if let Some((path, stats)) = current.take() {
        emit(path, stats)?;
    }

    Ok(())
}
