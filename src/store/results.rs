//! REST client for the external results/accounts service

use reqwest::Client;
use serde::Serialize;
use uuid::Uuid;

use crate::config::Config;
use crate::ws::protocol::MatchMode;

/// Finished match record posted to the collaborator
#[derive(Debug, Clone, Serialize)]
pub struct MatchResultRecord {
    pub player1_id: Option<i64>,
    pub player2_id: Option<i64>,
    pub score1: u32,
    pub score2: u32,
    pub mode: MatchMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tournament_id: Option<Uuid>,
    pub finished_at: chrono::DateTime<chrono::Utc>,
}

/// Client for the results API. Uses a server-only service key.
#[derive(Clone)]
pub struct ResultsClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl ResultsClient {
    pub fn new(config: &Config) -> Self {
        Self {
            client: Client::new(),
            base_url: config.results_api_url.trim_end_matches('/').to_string(),
            api_key: config.results_api_key.clone(),
        }
    }

    /// Persist one finished match. Called exactly once per match; the caller
    /// logs failures and keeps the in-memory result regardless.
    pub async fn save_match_result(
        &self,
        player1_id: Option<i64>,
        player2_id: Option<i64>,
        score1: u32,
        score2: u32,
        mode: MatchMode,
        tournament_id: Option<Uuid>,
    ) -> Result<(), StoreError> {
        let record = MatchResultRecord {
            player1_id,
            player2_id,
            score1,
            score2,
            mode,
            tournament_id,
            finished_at: chrono::Utc::now(),
        };

        let url = format!("{}/match-results", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&record)
            .send()
            .await
            .map_err(StoreError::Request)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Api { status, body });
        }

        Ok(())
    }
}

/// Results API errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error (status {status}): {body}")]
    Api { status: u16, body: String },
}
