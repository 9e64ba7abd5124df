//! GitHub connector.
//!
//! Lists a repository with the git trees API (`?recursive=1`) and downloads
//! each wanted blob through the contents API with the raw media type. Blobs
//! whose listed size is over the limit are skipped without a download.
//!
//! Accepted locators:
//!
//! ```text
//! https://github.com/<owner>/<repo>
//! https://github.com/<owner>/<repo>/tree/<ref>
//! https://github.com/<owner>/<repo>/tree/<ref>/<subdir>
//! ```

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::acquire::{AcquisitionFilter, Collector};
use crate::error::AcquisitionError;
use crate::models::Acquisition;
use crate::traits::Connector;

const USER_AGENT: &str = concat!("tutorial-harness/", env!("CARGO_PKG_VERSION"));

/// A parsed `github.com` repository locator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoLocator {
    pub owner: String,
    pub repo: String,
    pub git_ref: Option<String>,
    pub subdir: Option<String>,
}

impl RepoLocator {
    pub fn parse(url: &str) -> Result<Self, AcquisitionError> {
        let invalid = || AcquisitionError::InvalidLocator(url.to_string());

        let rest = url
            .trim()
            .strip_prefix("https://github.com/")
            .or_else(|| url.trim().strip_prefix("http://github.com/"))
            .or_else(|| url.trim().strip_prefix("github.com/"))
            .ok_or_else(invalid)?;
        let rest = rest.split(['?', '#']).next().unwrap_or_default();
        let mut parts = rest.split('/').filter(|s| !s.is_empty());

        let owner = parts.next().ok_or_else(invalid)?.to_string();
        let repo = parts.next().ok_or_else(invalid)?;
        let repo = repo.strip_suffix(".git").unwrap_or(repo).to_string();
        if repo.is_empty() {
            return Err(invalid());
        }

        let (git_ref, subdir) = match parts.next() {
            None => (None, None),
            Some("tree") | Some("blob") => {
                let git_ref = parts.next().ok_or_else(invalid)?.to_string();
                let subdir: Vec<&str> = parts.collect();
                let subdir = (!subdir.is_empty()).then(|| subdir.join("/"));
                (Some(git_ref), subdir)
            }
            Some(_) => return Err(invalid()),
        };

        Ok(Self {
            owner,
            repo,
            git_ref,
            subdir,
        })
    }

    pub fn web_url(&self) -> String {
        format!("https://github.com/{}/{}", self.owner, self.repo)
    }
}

#[derive(Debug, Deserialize)]
struct RepoInfo {
    default_branch: String,
}

#[derive(Debug, Deserialize)]
struct TreeResponse {
    #[serde(default)]
    tree: Vec<TreeEntry>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Debug, Deserialize)]
struct TreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    size: Option<u64>,
}

/// Fetches a repository (or a subdirectory of it) over the GitHub REST API.
pub struct GitHubConnector {
    locator: RepoLocator,
    api_url: String,
    token: Option<String>,
    client: Client,
}

impl GitHubConnector {
    pub fn new(url: &str, api_url: &str, token: Option<String>) -> Result<Self> {
        let locator = RepoLocator::parse(url)?;
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            locator,
            api_url: api_url.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.trim().is_empty()),
            client,
        })
    }

    fn request(&self, url: &str, accept: &str) -> RequestBuilder {
        let mut req = self
            .client
            .get(url)
            .header("Accept", accept)
            .header("X-GitHub-Api-Version", "2022-11-28");
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        req
    }

    async fn send(&self, url: &str, accept: &str) -> Result<Response> {
        let resp = self
            .request(url, accept)
            .send()
            .await
            .with_context(|| format!("GitHub request failed: {}", url))?;
        check_status(resp, url).await
    }

    fn repo_api(&self) -> String {
        format!(
            "{}/repos/{}/{}",
            self.api_url, self.locator.owner, self.locator.repo
        )
    }

    async fn resolve_ref(&self) -> Result<String> {
        if let Some(r) = &self.locator.git_ref {
            return Ok(r.clone());
        }
        let info: RepoInfo = self
            .send(&self.repo_api(), "application/vnd.github+json")
            .await?
            .json()
            .await
            .context("Failed to parse repository metadata")?;
        Ok(info.default_branch)
    }

    async fn list_blobs(&self, git_ref: &str) -> Result<Vec<TreeEntry>> {
        let url = format!("{}/git/trees/{}?recursive=1", self.repo_api(), git_ref);
        let tree: TreeResponse = self
            .send(&url, "application/vnd.github+json")
            .await?
            .json()
            .await
            .context("Failed to parse repository tree")?;
        if tree.truncated {
            warn!(
                repo = %self.locator.web_url(),
                "GitHub truncated the tree listing; some files are missing"
            );
        }
        Ok(tree.tree.into_iter().filter(|e| e.kind == "blob").collect())
    }

    /// Contents URL with every path segment percent-encoded, so names
    /// containing `#`, `?` or spaces survive.
    fn contents_url(&self, path: &str, git_ref: &str) -> Result<Url> {
        let mut url = Url::parse(&format!("{}/contents", self.repo_api()))
            .with_context(|| format!("Invalid GitHub API url: {}", self.api_url))?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("GitHub API url cannot have a path: {}", self.api_url))?
            .extend(path.split('/'));
        url.query_pairs_mut().append_pair("ref", git_ref);
        Ok(url)
    }

    async fn download(&self, path: &str, git_ref: &str) -> Result<Vec<u8>> {
        let url = self.contents_url(path, git_ref)?;
        let bytes = self
            .send(url.as_str(), "application/vnd.github.raw")
            .await?
            .bytes()
            .await
            .with_context(|| format!("Failed to read {}", path))?;
        Ok(bytes.to_vec())
    }
}

/// Map GitHub's error statuses onto [`AcquisitionError`].
async fn check_status(resp: Response, url: &str) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let exhausted = resp
        .headers()
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim() == "0");
    let body = resp.text().await.unwrap_or_default();

    match status {
        StatusCode::NOT_FOUND => Err(AcquisitionError::NotFound(url.to_string()).into()),
        StatusCode::TOO_MANY_REQUESTS => {
            Err(AcquisitionError::RateLimited(url.to_string()).into())
        }
        StatusCode::FORBIDDEN if exhausted || body.contains("rate limit") => {
            Err(AcquisitionError::RateLimited(url.to_string()).into())
        }
        _ => bail!("GitHub API error ({}) for {}: {}", status, url, body),
    }
}

#[async_trait]
impl Connector for GitHubConnector {
    fn name(&self) -> &str {
        &self.locator.repo
    }

    fn connector_type(&self) -> &str {
        "github"
    }

    fn source_url(&self) -> Option<String> {
        Some(self.locator.web_url())
    }

    async fn acquire(&self, filter: &AcquisitionFilter) -> Result<Acquisition> {
        let git_ref = self.resolve_ref().await?;
        let blobs = self.list_blobs(&git_ref).await?;
        let prefix = self
            .locator
            .subdir
            .as_deref()
            .map(|s| format!("{}/", s.trim_matches('/')));

        let mut collector = Collector::new(filter);
        let mut downloaded = 0usize;

        for blob in &blobs {
            let relative = match &prefix {
                Some(p) => match blob.path.strip_prefix(p.as_str()) {
                    Some(rel) => rel,
                    None => continue,
                },
                None => blob.path.as_str(),
            };
            if !filter.matches(relative) {
                continue;
            }
            if let Some(reason) = blob.size.and_then(|s| filter.size_rejection(s)) {
                collector.skip(relative, reason);
                continue;
            }

            debug!(path = %blob.path, "downloading blob");
            let bytes = self.download(&blob.path, &git_ref).await?;
            downloaded += 1;
            collector.offer(relative, bytes);
        }

        info!(
            repo = %self.locator.web_url(),
            git_ref = %git_ref,
            listed = blobs.len(),
            downloaded,
            "fetched repository"
        );
        collector.finish(&self.locator.repo)
    }
}
