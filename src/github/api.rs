use std::time::Duration;

use regex::Regex;
use serde::Deserialize;

use crate::error::{Error, Result};

const GITHUB_API: &str = "https://api.github.com";
const GITHUB_RAW: &str = "https://raw.githubusercontent.com";
const USER_AGENT: &str = "repograph";

/// Extract `(owner, repo)` from a GitHub URL. Accepts `https://github.com/o/r`,
/// `github.com/o/r.git`, and trailing path segments.
pub fn parse_github_url(github_url: &str) -> Result<(String, String)> {
    let pattern = Regex::new(r"github\.com/([^/\s]+)/([^/\s]+)").expect("valid regex");
    let captures = pattern
        .captures(github_url)
        .ok_or_else(|| Error::InvalidInput(format!("invalid GitHub URL: {github_url}")))?;

    let owner = captures[1].to_string();
    let mut repo = captures[2].to_string();
    if let Some(stripped) = repo.strip_suffix(".git") {
        repo = stripped.to_string();
    }
    Ok((owner, repo))
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepoMetadata {
    pub owner: String,
    pub repo_name: String,
    pub full_name: String,
    pub description: Option<String>,
    pub default_branch: String,
    pub language: Option<String>,
    pub stars: i64,
    pub forks: i64,
}

#[derive(Deserialize)]
struct ApiRepo {
    name: String,
    full_name: String,
    owner: ApiOwner,
    description: Option<String>,
    default_branch: Option<String>,
    language: Option<String>,
    #[serde(default)]
    stargazers_count: i64,
    #[serde(default)]
    forks_count: i64,
}

#[derive(Deserialize)]
struct ApiOwner {
    login: String,
}

#[derive(Deserialize)]
pub struct ApiTree {
    pub tree: Vec<ApiTreeItem>,
}

#[derive(Deserialize)]
pub struct ApiTreeItem {
    pub path: String,
    #[serde(rename = "type")]
    pub item_type: String,
    pub size: Option<u64>,
    #[serde(default)]
    pub url: Option<String>,
}

/// Thin client over the GitHub REST surface the pipeline needs.
#[derive(Clone)]
pub struct GitHubClient {
    client: reqwest::Client,
}

impl GitHubClient {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client }
    }

    pub async fn get_repository_metadata(&self, owner: &str, repo: &str) -> Result<RepoMetadata> {
        let url = format!("{GITHUB_API}/repos/{owner}/{repo}");
        let response = self
            .client
            .get(&url)
            .header("User-Agent", USER_AGENT)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::not_found("repository", format!("{owner}/{repo}")));
        }
        let response = response
            .error_for_status()
            .map_err(|e| Error::Upstream(e.to_string()))?;
        let api: ApiRepo = response.json().await?;

        Ok(RepoMetadata {
            owner: api.owner.login,
            repo_name: api.name,
            full_name: api.full_name,
            description: api.description,
            default_branch: api.default_branch.unwrap_or_else(|| "main".to_string()),
            language: api.language,
            stars: api.stargazers_count,
            forks: api.forks_count,
        })
    }

    /// Recursive tree for `branch`. A 404 on `main` is retried against
    /// `master`; anything else is surfaced.
    pub async fn get_repository_tree(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
    ) -> Result<ApiTree> {
        let mut response = self.fetch_tree(owner, repo, branch).await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND && branch == "main" {
            response = self.fetch_tree(owner, repo, "master").await?;
        }

        let response = response
            .error_for_status()
            .map_err(|e| Error::Upstream(e.to_string()))?;
        Ok(response.json().await?)
    }

    async fn fetch_tree(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
    ) -> Result<reqwest::Response> {
        let url = format!("{GITHUB_API}/repos/{owner}/{repo}/git/trees/{branch}?recursive=1");
        Ok(self
            .client
            .get(&url)
            .header("User-Agent", USER_AGENT)
            .send()
            .await?)
    }

    /// Raw file content from the raw host. Returns `None` when the fetch
    /// fails or the body is not valid UTF-8; callers skip such files.
    pub async fn fetch_file_content(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
        path: &str,
    ) -> Option<String> {
        let url = format!("{GITHUB_RAW}/{owner}/{repo}/{branch}/{path}");

        let response = match self
            .client
            .get(&url)
            .header("User-Agent", USER_AGENT)
            .timeout(Duration::from_secs(30))
            .send()
            .await
        {
            Ok(r) => r,
            Err(err) => {
                tracing::warn!(path, %err, "failed to fetch file content");
                return None;
            }
        };

        if !response.status().is_success() {
            tracing::warn!(path, status = %response.status(), "content fetch rejected");
            return None;
        }

        let bytes = match response.bytes().await {
            Ok(b) => b,
            Err(err) => {
                tracing::warn!(path, %err, "failed to read content body");
                return None;
            }
        };

        match String::from_utf8(bytes.to_vec()) {
            Ok(text) => Some(text),
            // Binary file that slipped through the extension filter.
            Err(_) => None,
        }
    }
}

impl Default for GitHubClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_and_git_urls() {
        assert_eq!(
            parse_github_url("https://github.com/redis/redis").unwrap(),
            ("redis".to_string(), "redis".to_string())
        );
        assert_eq!(
            parse_github_url("github.com/rust-lang/cargo.git").unwrap(),
            ("rust-lang".to_string(), "cargo".to_string())
        );
        assert_eq!(
            parse_github_url("https://github.com/a/b/tree/main/src").unwrap(),
            ("a".to_string(), "b".to_string())
        );
    }

    #[test]
    fn rejects_non_github_urls() {
        assert!(parse_github_url("https://gitlab.com/a/b").is_err());
        assert!(parse_github_url("not a url").is_err());
    }
}
