//! GitHub commit statuses API client.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::auth::TokenProvider;
use crate::domain::{CommitStatus, KontinuumError, Result};
use crate::status::CommitStatusSink;

/// Public GitHub API root.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// GitHub rejects longer status descriptions.
pub const MAX_DESCRIPTION_CHARS: usize = 140;

/// GitHub client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubConfig {
    /// API root, without trailing slash
    pub api_url: String,
    /// User agent sent with every request
    pub user_agent: String,
}

impl Default for GithubConfig {
    fn default() -> Self {
        GithubConfig {
            api_url: DEFAULT_API_URL.to_string(),
            user_agent: format!("kontinuum/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Posts commit statuses to `POST /repos/{project}/statuses/{sha}`.
pub struct GithubStatusSink {
    config: GithubConfig,
    tokens: Arc<dyn TokenProvider>,
    http_client: reqwest::Client,
}

impl GithubStatusSink {
    pub fn new(config: GithubConfig, tokens: Arc<dyn TokenProvider>) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(GithubStatusSink {
            config,
            tokens,
            http_client,
        })
    }

    pub fn statuses_url(&self, project: &str, commit_hash: &str) -> String {
        format!(
            "{}/repos/{}/statuses/{}",
            self.config.api_url.trim_end_matches('/'),
            project,
            commit_hash
        )
    }
}

/// Cut `description` to GitHub's limit on a char boundary.
pub fn truncate_description(description: &str) -> String {
    if description.chars().count() <= MAX_DESCRIPTION_CHARS {
        return description.to_string();
    }
    let mut cut: String = description.chars().take(MAX_DESCRIPTION_CHARS - 1).collect();
    cut.push('…');
    cut
}

#[async_trait]
impl CommitStatusSink for GithubStatusSink {
    async fn set_status(
        &self,
        project: &str,
        commit_hash: &str,
        status: &CommitStatus,
        installation_id: u64,
    ) -> Result<()> {
        let token = self.tokens.token(installation_id).await?;
        let url = self.statuses_url(project, commit_hash);
        let body = CommitStatus {
            description: truncate_description(&status.description),
            ..status.clone()
        };

        debug!(url = %url, context = %body.context, state = %body.state, "posting commit status");

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(token)
            .header("Accept", "application/vnd.github+json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let code = response.status();
            let text = response.text().await.unwrap_or_default();
            warn!(url = %url, status = %code, "commit status rejected");
            return Err(KontinuumError::Status(format!("{code}: {text}")));
        }
        Ok(())
    }
}
