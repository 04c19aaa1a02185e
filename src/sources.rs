//! Where artifacts and file trees come from.

use crate::error::Result;

/// Suffix that marks an artifact as an LCOV coverage candidate.
pub const LCOV_SUFFIX: &str = "lcov.info";

/// Handle to one downloadable CI artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRef {
    /// Provider-specific locator: a GitHub artifact id, or a CircleCI download URL.
    pub id: String,
    /// Artifact name (GitHub) or path (CircleCI).
    pub name: String,
}

impl ArtifactRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

pub fn is_coverage_artifact(name: &str) -> bool {
    name.ends_with(LCOV_SUFFIX)
}

/// A CI provider's artifacts for one run.
pub trait ArtifactSource {
    /// Every artifact of the run; callers filter for coverage candidates.
    fn list_artifacts(&mut self) -> Result<Vec<ArtifactRef>>;

    /// Artifact text, or `None` when the artifact holds nothing usable.
    fn download(&mut self, artifact: &ArtifactRef) -> Result<Option<String>>;
}

/// Lists every file of a repository at a branch.
pub trait FileTreeProvider {
    fn list_files(&self, owner: &str, repo: &str, branch: &str) -> Result<Vec<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coverage_artifact_names() {
        assert!(is_coverage_artifact("coverage-report.lcov.info"));
        assert!(is_coverage_artifact("lcov.info"));
        assert!(is_coverage_artifact("coverage/frontend/lcov.info"));
        assert!(!is_coverage_artifact("lcov.info.zip"));
        assert!(!is_coverage_artifact("coverage.xml"));
    }
}
