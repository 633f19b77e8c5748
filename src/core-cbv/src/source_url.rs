//! Validation of submitted repository locations.
//!
//! A source URL is accepted only when it has exactly the shape
//! `https://<allowed host>/<owner>/<repo>[.git]`. Everything is checked on the string itself,
//! before the fetcher touches the network or the disk.

use regex::Regex;
use std::sync::LazyLock;
use url::Url;

/// Hosts accepted when `ALLOWED_SOURCE_HOSTS` is not configured.
pub const DEFAULT_ALLOWED_HOSTS: &[&str] = &["github.com"];

/// Owner and repository path segments.
static SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._-]+$").expect("segment pattern is a valid regex"));

/// Branch names safe to hand to `git clone --branch`.
static BRANCH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._/-]+$").expect("branch pattern is a valid regex"));

const MAX_BRANCH_LEN: usize = 255;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("'{0}' is required")]
    MissingField(&'static str),
    #[error("'{input}' is not a URL: {reason}")]
    NotAUrl { input: String, reason: String },
    #[error("Only https source URLs are accepted, got scheme '{0}'")]
    Scheme(String),
    #[error("Host '{0}' is not an accepted source host")]
    HostNotAllowed(String),
    #[error("Source URL must look like https://<host>/<owner>/<repo>[.git]: {0}")]
    Shape(String),
    #[error("Invalid branch name '{0}'")]
    Branch(String),
}

/// A source URL that passed validation.
///
/// Holds the canonical form produced by the URL parser, so `https://GitHub.com/o/r` and
/// `https://github.com/o/r` are the same repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoUrl {
    url: Url,
    owner: String,
    repo: String,
}

impl RepoUrl {
    /// Validates `input` against the accepted pattern with a host from `allowed_hosts`.
    pub fn parse<S: AsRef<str>>(input: &str, allowed_hosts: &[S]) -> Result<Self, ValidationError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ValidationError::MissingField("source_url"));
        }

        let url = Url::parse(input).map_err(|e| ValidationError::NotAUrl {
            input: input.to_string(),
            reason: e.to_string(),
        })?;

        if url.scheme() != "https" {
            return Err(ValidationError::Scheme(url.scheme().to_string()));
        }

        let host = url
            .host_str()
            .ok_or_else(|| ValidationError::Shape("missing host".to_string()))?;
        if !allowed_hosts.iter().any(|allowed| allowed.as_ref().eq_ignore_ascii_case(host)) {
            return Err(ValidationError::HostNotAllowed(host.to_string()));
        }

        if url.port().is_some() {
            return Err(ValidationError::Shape("explicit ports are not accepted".to_string()));
        }
        if !url.username().is_empty() || url.password().is_some() {
            return Err(ValidationError::Shape("credentials are not accepted".to_string()));
        }
        if url.query().is_some() || url.fragment().is_some() {
            return Err(ValidationError::Shape("query strings and fragments are not accepted".to_string()));
        }

        let segments: Vec<&str> = url.path_segments().map(|s| s.collect()).unwrap_or_default();
        let [owner, repo_segment] = segments.as_slice() else {
            return Err(ValidationError::Shape(format!(
                "expected exactly two path segments, found {}",
                segments.len()
            )));
        };

        let repo = repo_segment.strip_suffix(".git").unwrap_or(*repo_segment);
        for segment in [*owner, repo] {
            if !is_valid_segment(segment) {
                return Err(ValidationError::Shape(format!("invalid path segment '{}'", segment)));
            }
        }

        Ok(RepoUrl {
            owner: owner.to_string(),
            repo: repo.to_string(),
            url,
        })
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Last path segment without a trailing `.git`.
    pub fn repo_name(&self) -> &str {
        &self.repo
    }
}

impl std::fmt::Display for RepoUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.url)
    }
}

fn is_valid_segment(segment: &str) -> bool {
    SEGMENT.is_match(segment) && segment != "." && segment != ".."
}

/// Checks an optional branch name, returning it trimmed.
///
/// Rejects anything git could read as an option or a revision range.
pub fn validate_branch(branch: &str) -> Result<String, ValidationError> {
    let branch = branch.trim();
    let invalid = branch.is_empty()
        || branch.len() > MAX_BRANCH_LEN
        || !BRANCH.is_match(branch)
        || branch.starts_with('-')
        || branch.starts_with('/')
        || branch.ends_with('/')
        || branch.ends_with(".lock")
        || branch.contains("..")
        || branch.contains("//");

    if invalid {
        Err(ValidationError::Branch(branch.to_string()))
    } else {
        Ok(branch.to_string())
    }
}
