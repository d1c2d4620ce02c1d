//! Kan API client and wire types.
//!
//! The scheduler only consumes the read side of the API: workspace
//! metadata (slug, members) and the full board -> list -> card graph.
//! `BoardSource` is the seam the detectors and tests depend on; the
//! `KanClient` implementation talks to the real REST API.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{KanbotError, Result};

/// Default request timeout for Kan API calls.
const KAN_TIMEOUT: Duration = Duration::from_secs(30);

/// A workspace member's lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    Invited,
    Active,
    Removed,
    Paused,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceMember {
    pub public_id: String,
    pub email: String,
    pub status: MemberStatus,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workspace {
    pub public_id: String,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub members: Vec<WorkspaceMember>,
}

/// Card assignee as returned inside a board graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardMember {
    pub public_id: String,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub public_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub members: Vec<CardMember>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct List {
    pub public_id: String,
    pub name: String,
    #[serde(default)]
    pub cards: Vec<Card>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Board {
    pub public_id: String,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub lists: Vec<List>,
}

/// Read-only view of the task board, as the detectors consume it.
///
/// Every detector fetches the graph independently; implementations must
/// tolerate concurrent calls for the same workspace.
#[async_trait]
pub trait BoardSource: Send + Sync {
    /// Workspace metadata including its member roster.
    async fn get_workspace(&self, workspace_public_id: &str) -> Result<Workspace>;

    /// All boards of a workspace with their full list/card graphs.
    async fn get_boards_with_cards(&self, workspace_public_id: &str) -> Result<Vec<Board>>;
}

/// HTTP client for the Kan REST API.
pub struct KanClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl KanClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(KAN_TIMEOUT)
            .build()
            .map_err(|e| KanbotError::Source(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}/api/v1{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .header("x-api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| KanbotError::Source(format!("Request to {path} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(KanbotError::Source(format!(
                "Kan API error {status} on {path}: {body}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| KanbotError::Source(format!("Failed to parse {path} response: {e}")))
    }

    /// Board summaries for a workspace (no card graphs).
    async fn get_boards(&self, workspace_public_id: &str) -> Result<Vec<Board>> {
        self.get_json(&format!("/workspaces/{workspace_public_id}/boards"))
            .await
    }

    /// A single board with its full list/card graph.
    async fn get_board(&self, board_public_id: &str) -> Result<Board> {
        self.get_json(&format!("/boards/{board_public_id}")).await
    }
}

#[async_trait]
impl BoardSource for KanClient {
    async fn get_workspace(&self, workspace_public_id: &str) -> Result<Workspace> {
        self.get_json(&format!("/workspaces/{workspace_public_id}"))
            .await
    }

    async fn get_boards_with_cards(&self, workspace_public_id: &str) -> Result<Vec<Board>> {
        let boards = self.get_boards(workspace_public_id).await?;
        let mut full = Vec::with_capacity(boards.len());
        for board in boards {
            full.push(self.get_board(&board.public_id).await?);
        }
        Ok(full)
    }
}

impl std::fmt::Debug for KanClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KanClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}
