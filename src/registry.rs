//! HTTP client for the repository registry (a Gitea-compatible API).
//!
//! The registry is both where the fleet is discovered and where the
//! resulting pull requests are opened.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::RegistryConfig;
use crate::models::Repository;

/// Registry HTTP errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: token missing or invalid")]
    Unauthorized,

    #[error("Server error: {0}")]
    Server(String),
}

/// Outcome of opening a pull request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProposalStatus {
    pub number: i64,
    pub url: String,
}

/// Everything the fleet needs from the registry.
#[async_trait]
pub trait Registry: Send + Sync {
    /// One page of repositories visible to the token. Pages start at 1; an
    /// empty page means the listing is exhausted.
    async fn list_repositories(&self, page: u32, limit: u32)
        -> Result<Vec<Repository>, RegistryError>;

    /// Usernames of the authors of all the repository's open pull requests,
    /// across every page.
    async fn list_proposers(&self, repo: &Repository) -> Result<Vec<String>, RegistryError>;

    async fn open_proposal(
        &self,
        repo: &Repository,
        branch: &str,
        title: &str,
        body: &str,
    ) -> Result<ProposalStatus, RegistryError>;
}

/// Page through [`Registry::list_repositories`] until an empty page.
pub async fn list_all_repositories<R>(
    registry: &R,
    page_size: u32,
) -> Result<Vec<Repository>, RegistryError>
where
    R: Registry + ?Sized,
{
    let mut repos = Vec::new();
    let mut page = 1;
    loop {
        let batch = registry.list_repositories(page, page_size).await?;
        if batch.is_empty() {
            break;
        }
        tracing::debug!(page, count = batch.len(), "Fetched repository page");
        repos.extend(batch);
        page += 1;
    }
    Ok(repos)
}

// ============================================================
// Wire types
// ============================================================

#[derive(Debug, Deserialize)]
struct GiteaUser {
    username: String,
}

#[derive(Debug, Deserialize)]
struct GiteaRepository {
    id: i64,
    name: String,
    owner: GiteaUser,
    clone_url: String,
}

impl From<GiteaRepository> for Repository {
    fn from(r: GiteaRepository) -> Self {
        Repository {
            id: r.id,
            name: r.name,
            owner: r.owner.username,
            clone_url: r.clone_url,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GiteaPullRequest {
    user: GiteaUser,
}

#[derive(Debug, Deserialize)]
struct GiteaCreatedPullRequest {
    number: i64,
    #[serde(default)]
    html_url: String,
}

#[derive(Debug, Serialize)]
struct CreatePullRequest<'a> {
    base: &'a str,
    head: &'a str,
    title: &'a str,
    body: &'a str,
}

// ============================================================
// Gitea client
// ============================================================

/// Registry backed by the Gitea REST API.
#[derive(Debug, Clone)]
pub struct GiteaClient {
    base_url: String,
    token: String,
    base_branch: String,
    page_size: u32,
    client: Client,
}

impl GiteaClient {
    pub fn new(config: &RegistryConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            token: config.token.clone(),
            base_branch: config.base_branch.clone(),
            page_size: config.page_size,
            client: Client::new(),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        self.client
            .request(method, &url)
            .header(reqwest::header::AUTHORIZATION, format!("token {}", self.token))
            .header(reqwest::header::ACCEPT, "application/json")
    }

    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, RegistryError> {
        let status = response.status();
        if status.is_success() {
            Ok(response.json().await?)
        } else {
            let body = response.text().await.unwrap_or_default();
            match status {
                StatusCode::NOT_FOUND => Err(RegistryError::NotFound(body)),
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    Err(RegistryError::Unauthorized)
                }
                _ => Err(RegistryError::Server(format!("{}: {}", status, body))),
            }
        }
    }
}

#[async_trait]
impl Registry for GiteaClient {
    async fn list_repositories(
        &self,
        page: u32,
        limit: u32,
    ) -> Result<Vec<Repository>, RegistryError> {
        let response = self
            .request(reqwest::Method::GET, "/user/repos")
            .query(&[("page", page), ("limit", limit)])
            .send()
            .await?;
        let repos: Vec<GiteaRepository> = self.handle_response(response).await?;
        Ok(repos.into_iter().map(Repository::from).collect())
    }

    async fn list_proposers(&self, repo: &Repository) -> Result<Vec<String>, RegistryError> {
        let path = format!("/repos/{}/{}/pulls", repo.owner, repo.name);
        let mut proposers = Vec::new();
        let mut page = 1u32;
        loop {
            let response = self
                .request(reqwest::Method::GET, &path)
                .query(&[("state", "open")])
                .query(&[("page", page), ("limit", self.page_size)])
                .send()
                .await?;
            let pulls: Vec<GiteaPullRequest> = self.handle_response(response).await?;
            if pulls.is_empty() {
                break;
            }
            proposers.extend(pulls.into_iter().map(|p| p.user.username));
            page += 1;
        }
        Ok(proposers)
    }

    async fn open_proposal(
        &self,
        repo: &Repository,
        branch: &str,
        title: &str,
        body: &str,
    ) -> Result<ProposalStatus, RegistryError> {
        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/repos/{}/{}/pulls", repo.owner, repo.name),
            )
            .json(&CreatePullRequest {
                base: &self.base_branch,
                head: branch,
                title,
                body,
            })
            .send()
            .await?;
        let created: GiteaCreatedPullRequest = self.handle_response(response).await?;
        Ok(ProposalStatus {
            number: created.number,
            url: created.html_url,
        })
    }
}
