use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::Config;

pub const DEFAULT_CATEGORY: &str = "Uncategorized";

#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error("classification service timed out")]
    Timeout,
    #[error("classification service unavailable")]
    Unavailable,
    #[error("classification service returned {0}")]
    Status(u16),
    #[error("invalid response from classification service")]
    InvalidResponse,
    #[error(transparent)]
    Request(reqwest::Error),
}

impl From<reqwest::Error> for ClassifyError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else if error.is_connect() {
            Self::Unavailable
        } else if error.is_decode() {
            Self::InvalidResponse
        } else {
            Self::Request(error)
        }
    }
}

impl ClassifyError {
    /// Message reported to the browser alongside the fallback category.
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::Timeout => "Classification service timed out",
            Self::Unavailable => "Classification service unavailable",
            _ => "Classification failed, using default category",
        }
    }
}

#[derive(Serialize)]
struct ClassifyRequest<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct ClassifyResponse {
    category: Option<String>,
}

/// Client of the external text classification service.
#[derive(Clone, Debug)]
pub struct Classifier {
    client: reqwest::Client,
    base_url: String,
}

impl Classifier {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &Config) -> reqwest::Result<Self> {
        Self::new(
            config.classifier_url.clone(),
            Duration::from_secs(config.classifier_timeout_secs),
        )
    }

    pub async fn classify(&self, text: &str) -> Result<String, ClassifyError> {
        let response = self
            .client
            .post(format!("{}/classify", self.base_url))
            .json(&ClassifyRequest { text })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClassifyError::Status(status.as_u16()));
        }

        let body = response.json::<ClassifyResponse>().await?;
        match body.category {
            Some(category) if !category.trim().is_empty() => Ok(category),
            _ => Err(ClassifyError::InvalidResponse),
        }
    }

    /// Category for `text`, or the default category when the service fails.
    pub async fn category_for(&self, text: &str) -> String {
        match self.classify(text).await {
            Ok(category) => category,
            Err(err) => {
                tracing::warn!("classification failed, using {DEFAULT_CATEGORY}: {err}");
                DEFAULT_CATEGORY.to_string()
            }
        }
    }
}
