//! X (Twitter) publishing via the v2 API

use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use async_trait::async_trait;

use super::{Attempt, PlatformPublisher};
use crate::types::{Note, XCredentials};

pub const X_API_BASE_URL: &str = "https://api.x.com";

/// Publishes notes as tweets using an OAuth2 user-context bearer token
pub struct XPublisher {
    client: Client,
    access_token: SecretString,
    base_url: String,
}

impl XPublisher {
    pub fn new(access_token: SecretString) -> Self {
        Self::with_base_url(access_token, X_API_BASE_URL.to_string())
    }

    pub fn with_base_url(access_token: SecretString, base_url: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            access_token,
            base_url,
        }
    }

    pub fn from_credentials(credentials: &XCredentials, base_url: &str) -> Self {
        Self::with_base_url(
            SecretString::from(credentials.access_token.clone()),
            base_url.to_string(),
        )
    }
}

#[derive(Serialize)]
struct CreateTweetRequest {
    text: String,
}

#[derive(Deserialize)]
struct CreateTweetResponse {
    data: TweetData,
}

#[derive(Deserialize)]
struct TweetData {
    id: String,
}

#[async_trait]
impl PlatformPublisher for XPublisher {
    fn name(&self) -> &'static str {
        "x"
    }

    fn label(&self) -> &'static str {
        "Twitter"
    }

    async fn attempt(&self, note: &Note) -> Attempt {
        // Already on the platform, nothing to do
        if !note.tweet_id.is_empty() {
            return Attempt::Success(note.tweet_id.clone());
        }

        let request = CreateTweetRequest {
            text: note.content.clone(),
        };

        let url = format!("{}/2/tweets", self.base_url);

        let response = match self
            .client
            .post(&url)
            .header(
                "Authorization",
                format!("Bearer {}", self.access_token.expose_secret()),
            )
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return Attempt::Recoverable(format!("request failed: {}", e)),
        };

        let status = response.status();

        if status == 429 {
            return Attempt::Recoverable("rate limited".to_string());
        }

        if status.is_server_error() {
            return Attempt::Recoverable(format!("server error: {}", status));
        }

        if status == 401 || status == 403 {
            let body = response.text().await.unwrap_or_default();
            return Attempt::Fatal(format!("authentication rejected ({}): {}", status, body));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Attempt::Fatal(format!("tweet rejected ({}): {}", status, body));
        }

        match response.json::<CreateTweetResponse>().await {
            Ok(tweet) => Attempt::Success(tweet.data.id),
            Err(e) => Attempt::Fatal(format!("unexpected response body: {}", e)),
        }
    }
}
