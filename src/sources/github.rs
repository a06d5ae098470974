//! GitHub REST sources
//!
//! Issues, pull requests and commits follow the `Link` header. Issues
//! listings also contain pull requests; those are filtered out.

use super::{http_client, limit_overrides, BuildFuture, BuiltSource};
use crate::auth::AuthConfig;
use crate::config::PipelineConfig;
use crate::decode::JsonDecoder;
use crate::error::{Error, Result};
use crate::extract::{AuthRequirement, Endpoint, PageFetcher, PageLimits, PaginationDriver};
use crate::http::HttpClient;
use crate::package::normalize_identifier;
use crate::pagination::LinkHeaderPaginator;
use crate::resource::{Resource, Source};
use crate::types::WriteMode;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

pub const GITHUB_API_URL: &str = "https://api.github.com";

/// Items requested per page
pub const PER_PAGE: u32 = 100;

/// Default page cap for commit listings
pub const COMMITS_MAX_PAGES: u32 = 10;

/// Kinds of per-repository resources
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GithubResource {
    Issues,
    PullRequests,
    Commits,
}

impl GithubResource {
    /// Selected when `resources` is not configured
    pub const DEFAULT: [GithubResource; 2] = [GithubResource::Issues, GithubResource::PullRequests];

    fn as_str(self) -> &'static str {
        match self {
            GithubResource::Issues => "issues",
            GithubResource::PullRequests => "pull_requests",
            GithubResource::Commits => "commits",
        }
    }
}

impl fmt::Display for GithubResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GithubResource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "issues" => Ok(GithubResource::Issues),
            "pull_requests" => Ok(GithubResource::PullRequests),
            "commits" => Ok(GithubResource::Commits),
            other => Err(Error::invalid_value(
                "resources",
                format!("unknown GitHub resource '{other}' (expected issues, pull_requests or commits)"),
            )),
        }
    }
}

// ============================================================================
// Sources
// ============================================================================

/// `<repo>_issues`, `<repo>_pull_requests` and `<repo>_commits` per repository
pub fn issues_source(
    client: Arc<HttpClient>,
    base_url: &str,
    repos: &[String],
    kinds: &[GithubResource],
    overrides: PageLimits,
) -> Result<Source> {
    let mut resources = Vec::new();

    for repo in repos {
        let (owner, name) = split_repo(repo)?;
        for kind in kinds {
            let table = format!("{name}_{kind}");
            let resource = match kind {
                GithubResource::Issues => {
                    issues(client.clone(), base_url, owner, name, &table, overrides)?
                        .with_write_mode(WriteMode::Merge)
                }
                GithubResource::PullRequests => {
                    pull_requests(client.clone(), base_url, owner, name, &table, overrides)?
                        .with_write_mode(WriteMode::Merge)
                }
                GithubResource::Commits => {
                    let endpoint = repo_endpoint(base_url, owner, name, "commits")
                        .with_param("per_page", PER_PAGE);
                    let limits = PageLimits::none()
                        .with_max_pages(Some(COMMITS_MAX_PAGES))
                        .overridden_by(overrides);
                    Resource::new(&table, link_driver(client.clone(), &table, endpoint, limits)?)
                        .with_write_mode(WriteMode::Append)
                        .with_primary_key("sha")
                }
            };
            resources.push(resource);
        }
    }

    Ok(Source::new("github", resources))
}

/// `issues` and `pull_requests` of one repository, appended
pub fn reactions_source(
    client: Arc<HttpClient>,
    base_url: &str,
    owner: &str,
    name: &str,
    overrides: PageLimits,
) -> Result<Source> {
    Ok(Source::new(
        "github_reactions",
        vec![
            issues(client.clone(), base_url, owner, name, "issues", overrides)?,
            pull_requests(client, base_url, owner, name, "pull_requests", overrides)?,
        ],
    ))
}

fn issues(
    client: Arc<HttpClient>,
    base_url: &str,
    owner: &str,
    repo: &str,
    table: &str,
    limits: PageLimits,
) -> Result<Resource> {
    let endpoint = repo_endpoint(base_url, owner, repo, "issues")
        .with_param("state", "all")
        .with_param("per_page", PER_PAGE);
    Ok(Resource::new(table, link_driver(client, table, endpoint, limits)?)
        .with_primary_key("id")
        .with_filter(|record| !record.contains_key("pull_request")))
}

fn pull_requests(
    client: Arc<HttpClient>,
    base_url: &str,
    owner: &str,
    repo: &str,
    table: &str,
    limits: PageLimits,
) -> Result<Resource> {
    let endpoint = repo_endpoint(base_url, owner, repo, "pulls")
        .with_param("state", "all")
        .with_param("per_page", PER_PAGE);
    Ok(Resource::new(table, link_driver(client, table, endpoint, limits)?).with_primary_key("id"))
}

fn repo_endpoint(base_url: &str, owner: &str, repo: &str, listing: &str) -> Endpoint {
    Endpoint::new(base_url, format!("/repos/{owner}/{repo}/{listing}"))
        .with_auth(AuthRequirement::Optional)
}

fn link_driver(
    client: Arc<HttpClient>,
    name: &str,
    endpoint: Endpoint,
    limits: PageLimits,
) -> Result<PaginationDriver> {
    let fetcher = PageFetcher::new(
        client,
        endpoint,
        Box::new(LinkHeaderPaginator::default()),
        Box::new(JsonDecoder::new()),
    )?;
    Ok(PaginationDriver::new(name, fetcher, limits))
}

/// Split `owner/name`
fn split_repo(repo: &str) -> Result<(&str, &str)> {
    match repo.trim().split_once('/') {
        Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
            Ok((owner, name))
        }
        _ => Err(Error::invalid_value(
            "repos",
            format!("'{repo}' is not in owner/name form"),
        )),
    }
}

// ============================================================================
// Builders
// ============================================================================

pub(super) fn build_issues(config: &PipelineConfig) -> BuildFuture<'_> {
    Box::pin(async move {
        let kinds = match &config.resources {
            Some(names) => names
                .iter()
                .map(|name| name.parse())
                .collect::<Result<Vec<GithubResource>>>()?,
            None => GithubResource::DEFAULT.to_vec(),
        };
        let client = http_client(config, AuthConfig::bearer(config.token()))?;
        let source = issues_source(
            client,
            GITHUB_API_URL,
            &config.repos,
            &kinds,
            limit_overrides(config),
        )?;
        Ok(BuiltSource::new("github_data", source).selection_applied())
    })
}

pub(super) fn build_reactions(config: &PipelineConfig) -> BuildFuture<'_> {
    Box::pin(async move {
        let owner = config
            .github_owner
            .as_deref()
            .ok_or_else(|| Error::missing_field("github_owner"))?;
        let name = config
            .github_repo_name
            .as_deref()
            .ok_or_else(|| Error::missing_field("github_repo_name"))?;

        let client = http_client(config, AuthConfig::bearer(config.token()))?;
        let source = reactions_source(client, GITHUB_API_URL, owner, name, limit_overrides(config))?
            .with_write_mode(WriteMode::Append)?;
        Ok(BuiltSource::new(
            normalize_identifier(&format!("github_{owner}_{name}")),
            source,
        ))
    })
}
