//! GitHub REST client: Actions artifacts, repository trees, and the check
//! runs that link a check suite to its CircleCI workflows.

use std::io::{Cursor, Read};

use log::{debug, info};
use serde::Deserialize;

use crate::error::{CovsyncError, Result};
use crate::sources::{is_coverage_artifact, ArtifactRef, ArtifactSource, FileTreeProvider};

const API_BASE: &str = "https://api.github.com";
const PER_PAGE: usize = 100;

pub struct GitHubClient {
    token: String,
    api_base: String,
}

#[derive(Deserialize)]
struct ArtifactPage {
    total_count: usize,
    artifacts: Vec<ArtifactItem>,
}

#[derive(Deserialize)]
struct ArtifactItem {
    id: u64,
    name: String,
}

#[derive(Deserialize)]
struct Tree {
    tree: Vec<TreeItem>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Deserialize)]
struct TreeItem {
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Deserialize)]
struct CheckRunPage {
    total_count: usize,
    check_runs: Vec<CheckRun>,
}

#[derive(Deserialize)]
struct CheckRun {
    external_id: Option<String>,
}

impl GitHubClient {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            api_base: API_BASE.to_string(),
        }
    }

    /// Point the client at a GitHub Enterprise API root.
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    fn get(&self, url: &str) -> ureq::Request {
        ureq::get(url)
            .set("Authorization", &format!("Bearer {}", self.token))
            .set("Accept", "application/vnd.github+json")
            .set("User-Agent", "covsync")
            .set("X-GitHub-Api-Version", "2022-11-28")
    }

    /// Every artifact of a workflow run, following pagination.
    pub fn list_run_artifacts(&self, owner: &str, repo: &str, run_id: i64) -> Result<Vec<ArtifactRef>> {
        let mut artifacts = Vec::new();
        let mut page = 1u32;
        loop {
            let url = format!(
                "{}/repos/{}/{}/actions/runs/{}/artifacts?per_page={}&page={}",
                self.api_base, owner, repo, run_id, PER_PAGE, page
            );
            let body: ArtifactPage = self.get(&url).call()?.into_json()?;
            let fetched = body.artifacts.len();
            artifacts.extend(
                body.artifacts
                    .into_iter()
                    .map(|a| ArtifactRef::new(a.id.to_string(), a.name)),
            );
            if fetched < PER_PAGE || artifacts.len() >= body.total_count {
                break;
            }
            page += 1;
        }
        debug!("Run {} in {}/{} has {} artifacts", run_id, owner, repo, artifacts.len());
        Ok(artifacts)
    }

    /// Raw zip archive of one Actions artifact.
    pub fn download_artifact_zip(&self, owner: &str, repo: &str, artifact_id: &str) -> Result<Vec<u8>> {
        let url = format!(
            "{}/repos/{}/{}/actions/artifacts/{}/zip",
            self.api_base, owner, repo, artifact_id
        );
        let resp = self.get(&url).call()?;
        let mut bytes = Vec::new();
        resp.into_reader().read_to_end(&mut bytes)?;
        Ok(bytes)
    }

    /// Blob paths of the repository tree at `branch`. A missing branch (404)
    /// or an empty repository (409) yields an empty list.
    pub fn list_tree(&self, owner: &str, repo: &str, branch: &str) -> Result<Vec<String>> {
        let url = format!(
            "{}/repos/{}/{}/git/trees/{}?recursive=1",
            self.api_base, owner, repo, branch
        );
        let tree: Tree = match self.get(&url).call() {
            Ok(resp) => resp.into_json()?,
            Err(ureq::Error::Status(code @ (404 | 409), _)) => {
                info!("No file tree for {}/{}@{} (HTTP {})", owner, repo, branch, code);
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };
        if tree.truncated {
            info!("File tree for {}/{}@{} was truncated by GitHub", owner, repo, branch);
        }
        Ok(tree
            .tree
            .into_iter()
            .filter(|item| item.kind == "blob")
            .map(|item| item.path)
            .collect())
    }

    /// CircleCI workflow ids referenced by the check runs of a check suite.
    pub fn circleci_workflow_ids(&self, owner: &str, repo: &str, check_suite_id: i64) -> Result<Vec<String>> {
        let mut external_ids = Vec::new();
        let mut page = 1u32;
        loop {
            let url = format!(
                "{}/repos/{}/{}/check-suites/{}/check-runs?per_page={}&page={}",
                self.api_base, owner, repo, check_suite_id, PER_PAGE, page
            );
            let body: CheckRunPage = self.get(&url).call()?.into_json()?;
            let fetched = body.check_runs.len();
            external_ids.extend(body.check_runs.into_iter().filter_map(|r| r.external_id));
            if fetched < PER_PAGE || page as usize * PER_PAGE >= body.total_count {
                break;
            }
            page += 1;
        }
        Ok(workflow_ids_from_external_ids(&external_ids))
    }
}

/// Pull `workflow-id` out of each check run's `external_id` JSON, keeping
/// first-seen order and dropping repeats. Unparseable or empty values are
/// skipped.
pub fn workflow_ids_from_external_ids(external_ids: &[String]) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for raw in external_ids {
        let Ok(value) = serde_json::from_str::<serde_json::Value>(raw) else {
            continue;
        };
        let Some(id) = value.get("workflow-id").and_then(|v| v.as_str()) else {
            continue;
        };
        if !id.is_empty() && !ids.iter().any(|seen| seen == id) {
            ids.push(id.to_string());
        }
    }
    ids
}

/// Text of the first `*lcov.info` entry in an artifact zip. `None` when no
/// such entry exists or it is empty.
pub fn extract_lcov(zip_bytes: &[u8]) -> Result<Option<String>> {
    let mut archive = zip::ZipArchive::new(Cursor::new(zip_bytes))?;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if !is_coverage_artifact(entry.name()) {
            continue;
        }
        let mut text = String::new();
        entry
            .read_to_string(&mut text)
            .map_err(|e| CovsyncError::Download(format!("{}: {}", entry.name(), e)))?;
        return Ok(if text.trim().is_empty() { None } else { Some(text) });
    }
    Ok(None)
}

/// Artifacts of one GitHub Actions workflow run.
pub struct GitHubActionsSource<'a> {
    client: &'a GitHubClient,
    owner: String,
    repo: String,
    run_id: i64,
}

impl<'a> GitHubActionsSource<'a> {
    pub fn new(client: &'a GitHubClient, owner: &str, repo: &str, run_id: i64) -> Self {
        Self {
            client,
            owner: owner.to_string(),
            repo: repo.to_string(),
            run_id,
        }
    }
}

impl ArtifactSource for GitHubActionsSource<'_> {
    fn list_artifacts(&mut self) -> Result<Vec<ArtifactRef>> {
        self.client.list_run_artifacts(&self.owner, &self.repo, self.run_id)
    }

    fn download(&mut self, artifact: &ArtifactRef) -> Result<Option<String>> {
        let bytes = self
            .client
            .download_artifact_zip(&self.owner, &self.repo, &artifact.id)
            .map_err(|e| CovsyncError::Download(format!("artifact {}: {}", artifact.name, e)))?;
        extract_lcov(&bytes)
    }
}

impl FileTreeProvider for GitHubClient {
    fn list_files(&self, owner: &str, repo: &str, branch: &str) -> Result<Vec<String>> {
        self.list_tree(owner, repo, branch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn zip_of(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, body) in entries {
            writer
                .start_file(*name, zip::write::SimpleFileOptions::default())
                .unwrap();
            writer.write_all(body.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_extract_lcov_entry() {
        let bytes = zip_of(&[
            ("other_file.txt", "noise"),
            ("lcov.info", "TN:\nSF:test.py\nLF:10\nLH:8\nend_of_record"),
        ]);
        let text = extract_lcov(&bytes).unwrap();
        assert_eq!(text.as_deref(), Some("TN:\nSF:test.py\nLF:10\nLH:8\nend_of_record"));
    }

    #[test]
    fn test_extract_lcov_missing_or_empty() {
        assert_eq!(extract_lcov(&zip_of(&[("readme.md", "hi")])).unwrap(), None);
        assert_eq!(extract_lcov(&zip_of(&[])).unwrap(), None);
        assert_eq!(extract_lcov(&zip_of(&[("lcov.info", "")])).unwrap(), None);
    }

    #[test]
    fn test_extract_lcov_rejects_garbage() {
        assert!(extract_lcov(b"mock_zip_content").is_err());
    }

    #[test]
    fn test_workflow_ids_dedupe_in_order() {
        let raw = vec![
            r#"{"workflow-id":"wf-2"}"#.to_string(),
            r#"{"workflow-id":"wf-1"}"#.to_string(),
            r#"{"workflow-id":"wf-2"}"#.to_string(),
        ];
        assert_eq!(workflow_ids_from_external_ids(&raw), vec!["wf-2", "wf-1"]);
    }

    #[test]
    fn test_workflow_ids_skip_unusable_values() {
        let raw = vec![
            "invalid-json".to_string(),
            String::new(),
            r#"{"actor-id":"someone"}"#.to_string(),
            r#"{"workflow-id":null}"#.to_string(),
            r#"{"workflow-id":""}"#.to_string(),
            r#"{"workflow-id":"valid-id"}"#.to_string(),
        ];
        assert_eq!(workflow_ids_from_external_ids(&raw), vec!["valid-id"]);
    }

    #[test]
    fn test_tree_blob_filter() {
        let tree: Tree = serde_json::from_str(
            r#"{"sha":"x","tree":[
                {"path":"src","type":"tree"},
                {"path":"src/a.py","type":"blob"},
                {"path":"vendor/lib","type":"commit"}
            ],"truncated":false}"#,
        )
        .unwrap();
        let blobs: Vec<_> = tree
            .tree
            .into_iter()
            .filter(|i| i.kind == "blob")
            .map(|i| i.path)
            .collect();
        assert_eq!(blobs, vec!["src/a.py"]);
    }
}
