//! CircleCI v2 API: artifacts of the successful jobs in a set of workflows.

use log::{debug, info};
use serde::Deserialize;

use crate::error::{CovsyncError, Result};
use crate::sources::{ArtifactRef, ArtifactSource};

const API_BASE: &str = "https://circleci.com/api/v2";

#[derive(Deserialize)]
struct Page<T> {
    items: Vec<T>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Job {
    job_number: Option<u64>,
    name: String,
    status: String,
    project_slug: String,
}

#[derive(Deserialize)]
struct Artifact {
    path: String,
    url: String,
}

pub struct CircleCiSource {
    token: String,
    workflow_ids: Vec<String>,
}

impl CircleCiSource {
    /// Fails with `SourceConfig` when there is no token or nothing to look at.
    pub fn new(token: Option<String>, workflow_ids: Vec<String>) -> Result<Self> {
        let token = token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| CovsyncError::SourceConfig("no CircleCI token configured".to_string()))?;
        if workflow_ids.is_empty() {
            return Err(CovsyncError::SourceConfig(
                "no CircleCI workflow ids found for this check suite".to_string(),
            ));
        }
        Ok(Self {
            token,
            workflow_ids,
        })
    }

    fn get(&self, url: &str) -> ureq::Request {
        ureq::get(url)
            .set("Circle-Token", &self.token)
            .set("Accept", "application/json")
            .set("User-Agent", "covsync")
    }

    /// Follow `next_page_token` until the listing is exhausted.
    fn get_all<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let mut req = self.get(url);
            if let Some(t) = &token {
                req = req.query("page-token", t);
            }
            let page: Page<T> = req.call()?.into_json()?;
            items.extend(page.items);
            match page.next_page_token {
                Some(t) if !t.is_empty() => token = Some(t),
                _ => break,
            }
        }
        Ok(items)
    }

    fn workflow_jobs(&self, workflow_id: &str) -> Result<Vec<Job>> {
        self.get_all(&format!("{}/workflow/{}/job", API_BASE, workflow_id))
    }

    fn job_artifacts(&self, project_slug: &str, job_number: u64) -> Result<Vec<Artifact>> {
        self.get_all(&format!(
            "{}/project/{}/{}/artifacts",
            API_BASE, project_slug, job_number
        ))
    }
}

impl ArtifactSource for CircleCiSource {
    fn list_artifacts(&mut self) -> Result<Vec<ArtifactRef>> {
        let mut artifacts = Vec::new();
        for workflow_id in &self.workflow_ids {
            for job in successful_jobs(self.workflow_jobs(workflow_id)?) {
                let Some(number) = job.job_number else {
                    continue;
                };
                debug!("Listing artifacts of CircleCI job {} ({})", number, job.name);
                artifacts.extend(
                    self.job_artifacts(&job.project_slug, number)?
                        .into_iter()
                        .map(|a| ArtifactRef::new(a.url, a.path)),
                );
            }
        }
        info!(
            "Found {} CircleCI artifacts across {} workflows",
            artifacts.len(),
            self.workflow_ids.len()
        );
        Ok(artifacts)
    }

    fn download(&mut self, artifact: &ArtifactRef) -> Result<Option<String>> {
        let resp = self
            .get(&artifact.id)
            .call()
            .map_err(|e| CovsyncError::Download(format!("{}: {}", artifact.name, e)))?;
        let text = resp
            .into_string()
            .map_err(|e| CovsyncError::Download(format!("{}: {}", artifact.name, e)))?;
        Ok(if text.trim().is_empty() { None } else { Some(text) })
    }
}

/// Failed and running jobs have no trustworthy coverage.
fn successful_jobs(jobs: Vec<Job>) -> impl Iterator<Item = Job> {
    jobs.into_iter().filter(|j| j.status == "success")
}
