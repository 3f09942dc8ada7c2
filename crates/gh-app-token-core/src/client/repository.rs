//! Repository-level request and response types: check runs, deployments and
//! file contents.
//!
//! These are sent with an installation token by
//! [`crate::AuthEngine::installation_request`] and its typed wrappers.

use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

#[cfg(test)]
#[path = "repository_tests.rs"]
mod tests;

// ============================================================================
// Check Runs
// ============================================================================

/// Check run lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckRunStatus {
    Queued,
    InProgress,
    Completed,
    Waiting,
    Requested,
    Pending,
    #[serde(other)]
    Unknown,
}

/// Final outcome of a completed check run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckRunConclusion {
    Success,
    Failure,
    Neutral,
    Cancelled,
    Skipped,
    TimedOut,
    ActionRequired,
    Stale,
    #[serde(other)]
    Unknown,
}

/// Summary shown on the check run page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckRunOutput {
    pub title: String,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Body of `POST /repos/{owner}/{repo}/check-runs`.
///
/// # Examples
///
/// ```
/// use gh_app_token_core::client::{CheckRunStatus, CreateCheckRunRequest};
///
/// let request = CreateCheckRunRequest::new("build", "abc123");
/// assert_eq!(request.status, Some(CheckRunStatus::Queued));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateCheckRunRequest {
    pub name: String,
    pub head_sha: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<CheckRunStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conclusion: Option<CheckRunConclusion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<CheckRunOutput>,
}

impl CreateCheckRunRequest {
    /// A queued check run for `head_sha`.
    pub fn new(name: impl Into<String>, head_sha: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            head_sha: head_sha.into(),
            status: Some(CheckRunStatus::Queued),
            conclusion: None,
            details_url: None,
            external_id: None,
            started_at: None,
            completed_at: None,
            output: None,
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: CheckRunStatus) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn with_details_url(mut self, url: impl Into<String>) -> Self {
        self.details_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_output(mut self, output: CheckRunOutput) -> Self {
        self.output = Some(output);
        self
    }
}

/// Body of `PATCH /repos/{owner}/{repo}/check-runs/{id}`. Unset fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UpdateCheckRunRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<CheckRunStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conclusion: Option<CheckRunConclusion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<CheckRunOutput>,
}

impl UpdateCheckRunRequest {
    /// Mark the check run completed with `conclusion`.
    pub fn completed(conclusion: CheckRunConclusion) -> Self {
        Self {
            status: Some(CheckRunStatus::Completed),
            conclusion: Some(conclusion),
            ..Self::default()
        }
    }
}

/// A check run as returned by GitHub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckRun {
    pub id: u64,
    pub name: String,
    pub head_sha: String,
    pub status: CheckRunStatus,
    #[serde(default)]
    pub conclusion: Option<CheckRunConclusion>,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub details_url: Option<String>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Deployments
// ============================================================================

/// Body of `POST /repos/{owner}/{repo}/deployments`.
///
/// # Examples
///
/// ```
/// use gh_app_token_core::client::CreateDeploymentRequest;
///
/// let request = CreateDeploymentRequest::new("main");
/// assert_eq!(request.environment, "production");
/// assert!(!request.auto_merge);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateDeploymentRequest {
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub environment: String,
    pub auto_merge: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_contexts: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transient_environment: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub production_environment: Option<bool>,
}

impl CreateDeploymentRequest {
    /// Deployment of `git_ref` to `production` with auto-merge disabled.
    pub fn new(git_ref: impl Into<String>) -> Self {
        Self {
            git_ref: git_ref.into(),
            environment: "production".to_string(),
            auto_merge: false,
            description: None,
            task: None,
            payload: None,
            required_contexts: None,
            transient_environment: None,
            production_environment: None,
        }
    }

    #[must_use]
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

/// A deployment as returned by GitHub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deployment {
    pub id: u64,
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub sha: String,
    pub environment: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Deployment status state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentState {
    Error,
    Failure,
    Inactive,
    InProgress,
    Queued,
    Pending,
    Success,
    #[serde(other)]
    Unknown,
}

/// Body of `POST /repos/{owner}/{repo}/deployments/{id}/statuses`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateDeploymentStatusRequest {
    pub state: DeploymentState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_inactive: Option<bool>,
}

impl CreateDeploymentStatusRequest {
    /// Status update with only the state set.
    pub fn new(state: DeploymentState) -> Self {
        Self {
            state,
            log_url: None,
            environment_url: None,
            description: None,
            environment: None,
            auto_inactive: None,
        }
    }

    #[must_use]
    pub fn with_log_url(mut self, url: impl Into<String>) -> Self {
        self.log_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_environment_url(mut self, url: impl Into<String>) -> Self {
        self.environment_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A deployment status as returned by GitHub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentStatus {
    pub id: u64,
    pub state: DeploymentState,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default)]
    pub log_url: Option<String>,
    #[serde(default)]
    pub environment_url: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Contents
// ============================================================================

/// Kind of entry in a repository tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    File,
    Dir,
    Symlink,
    Submodule,
    #[serde(other)]
    Unknown,
}

/// A file or directory entry from `GET /repos/{owner}/{repo}/contents/{path}`.
///
/// Only single-file responses carry `content`; directory listings leave it out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentEntry {
    pub name: String,
    pub path: String,
    pub sha: String,
    #[serde(default)]
    pub size: u64,
    #[serde(rename = "type")]
    pub kind: ContentKind,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub encoding: Option<String>,
    #[serde(default)]
    pub download_url: Option<String>,
}

impl ContentEntry {
    /// The file bytes, if the entry carries base64 content.
    ///
    /// GitHub wraps the encoded text every 60 characters; line breaks are
    /// ignored.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` if the content is not valid base64.
    pub fn decoded_content(&self) -> Result<Option<Vec<u8>>, ValidationError> {
        let Some(content) = &self.content else {
            return Ok(None);
        };
        if self.encoding.as_deref().is_some_and(|e| e != "base64") {
            return Ok(None);
        }

        let compact: String = content.chars().filter(|c| !c.is_whitespace()).collect();
        general_purpose::STANDARD
            .decode(compact)
            .map(Some)
            .map_err(|e| ValidationError::InvalidFormat {
                field: "content".to_string(),
                message: e.to_string(),
            })
    }
}

/// Response of the contents endpoint: one file, or the entries of a directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RepositoryContent {
    Directory(Vec<ContentEntry>),
    File(ContentEntry),
}

/// Body of `PUT /repos/{owner}/{repo}/contents/{path}`.
///
/// # Examples
///
/// ```
/// use gh_app_token_core::client::PutFileRequest;
///
/// let request = PutFileRequest::new("Update notes", "hello").with_sha("abc123");
/// assert_eq!(request.content, "aGVsbG8=");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PutFileRequest {
    pub message: String,
    /// File contents, base64 encoded.
    pub content: String,
    /// Blob sha of the file being replaced; required for updates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

impl PutFileRequest {
    /// Create a file with `content` on the default branch.
    pub fn new(message: impl Into<String>, content: impl AsRef<[u8]>) -> Self {
        Self {
            message: message.into(),
            content: general_purpose::STANDARD.encode(content),
            sha: None,
            branch: None,
        }
    }

    #[must_use]
    pub fn with_sha(mut self, sha: impl Into<String>) -> Self {
        self.sha = Some(sha.into());
        self
    }

    #[must_use]
    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }
}

/// The commit a file write produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitRef {
    pub sha: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
}

/// Response of a file create or update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileCommit {
    #[serde(default)]
    pub content: Option<ContentEntry>,
    pub commit: CommitRef,
}
