//! Ambient pipeline context
//!
//! Repository details that are not part of the step telemetry but are
//! attached to it before sending. Reading them is best effort: whatever
//! cannot be read is reported as [`NOT_AVAILABLE`] and the send goes on.

use std::path::PathBuf;
use telemeter_core::domain::telemetry::NOT_AVAILABLE;
use tracing::warn;

/// Default location of the pipeline environment written by earlier steps
pub const DEFAULT_PIPELINE_ENV_DIR: &str = ".pipeline/commonPipelineEnvironment";

const HEAD_COMMIT_FILE: &str = "git/headCommitId";
const BRANCH_FILE: &str = "git/branch";
const OWNER_FILE: &str = "github/owner";
const REPOSITORY_FILE: &str = "github/repository";

/// Repository details attached to the telemetry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmbientInfo {
    pub commit_hash: String,
    pub branch: String,
    pub git_owner: String,
    pub git_repository: String,
}

impl AmbientInfo {
    /// Every field set to the sentinel value
    pub fn unavailable() -> Self {
        Self {
            commit_hash: NOT_AVAILABLE.to_string(),
            branch: NOT_AVAILABLE.to_string(),
            git_owner: NOT_AVAILABLE.to_string(),
            git_repository: NOT_AVAILABLE.to_string(),
        }
    }
}

/// Source of ambient repository details
///
/// Implementations never fail; missing values come back as the sentinel.
pub trait AmbientContext: Send + Sync {
    fn fetch(&self) -> AmbientInfo;
}

/// Reads ambient details from the pipeline environment directory
#[derive(Debug, Clone)]
pub struct PipelineEnvironment {
    root: PathBuf,
}

impl PipelineEnvironment {
    /// Creates a reader rooted at `root`
    ///
    /// # Arguments
    /// * `root` - Directory containing `git/` and `github/` (e.g., ".pipeline/commonPipelineEnvironment")
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn read(&self, relative: &str) -> String {
        let path = self.root.join(relative);
        match std::fs::read_to_string(&path) {
            Ok(content) => content.trim_end_matches(['\r', '\n']).to_string(),
            Err(e) => {
                warn!("Could not read {} file. {}", relative, e);
                NOT_AVAILABLE.to_string()
            }
        }
    }
}

impl Default for PipelineEnvironment {
    fn default() -> Self {
        Self::new(DEFAULT_PIPELINE_ENV_DIR)
    }
}

impl AmbientContext for PipelineEnvironment {
    fn fetch(&self) -> AmbientInfo {
        AmbientInfo {
            commit_hash: self.read(HEAD_COMMIT_FILE),
            branch: self.read(BRANCH_FILE),
            git_owner: self.read(OWNER_FILE),
            git_repository: self.read(REPOSITORY_FILE),
        }
    }
}

/// Fixed ambient details, for callers that already know them
#[derive(Debug, Clone)]
pub struct StaticAmbientContext(pub AmbientInfo);

impl AmbientContext for StaticAmbientContext {
    fn fetch(&self) -> AmbientInfo {
        self.0.clone()
    }
}
