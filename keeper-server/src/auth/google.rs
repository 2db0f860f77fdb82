use oauth2::{
    basic::{BasicClient, BasicErrorResponseType},
    reqwest::async_http_client,
    url::Url,
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, RedirectUrl, Scope, TokenResponse, TokenUrl,
};
use reqwest::header::{ACCEPT, USER_AGENT};
use serde::Deserialize;

use crate::{config::Config, users::GoogleProfile, Error, Result};

const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v3/userinfo";

#[derive(Debug, Deserialize)]
pub struct GoogleOAuthResponse {
    pub code: Option<String>,
    pub state: Option<CsrfToken>,
    pub error: Option<String>,
}

#[derive(Clone)]
pub struct GoogleOAuth {
    client: BasicClient,
    http_client: reqwest::Client,
}

impl GoogleOAuth {
    pub fn new(client_id: String, client_secret: String, redirect_url: String) -> anyhow::Result<Self> {
        let client = BasicClient::new(
            ClientId::new(client_id),
            Some(ClientSecret::new(client_secret)),
            AuthUrl::new(AUTH_URL.into())?,
            Some(TokenUrl::new(TOKEN_URL.into())?),
        )
        .set_redirect_uri(RedirectUrl::new(redirect_url)?);

        let http_client = {
            let mut headers = reqwest::header::HeaderMap::new();
            headers.insert(ACCEPT, "application/json".parse()?);
            headers.insert(USER_AGENT, "keeper-server".parse()?);

            reqwest::Client::builder().default_headers(headers).build()?
        };

        Ok(Self { client, http_client })
    }

    /// `None` when the Google credentials are not configured.
    pub fn from_config(config: &Config) -> anyhow::Result<Option<Self>> {
        match (
            &config.google_client_id,
            &config.google_client_secret,
            &config.google_redirect_url,
        ) {
            (Some(id), Some(secret), Some(redirect)) => {
                Ok(Some(Self::new(id.clone(), secret.clone(), redirect.clone())?))
            }
            _ => {
                tracing::warn!("Google OAuth is not configured, /auth/google is disabled");
                Ok(None)
            }
        }
    }

    pub fn authorize_url(&self) -> (Url, CsrfToken) {
        self.client
            .authorize_url(CsrfToken::new_random)
            .add_scope(Scope::new("openid".to_string()))
            .add_scope(Scope::new("email".to_string()))
            .add_scope(Scope::new("profile".to_string()))
            .url()
    }

    /// Trades the authorization code for an access token and fetches the profile with it.
    pub async fn fetch_profile(&self, code: String) -> Result<GoogleProfile> {
        let token = self
            .client
            .exchange_code(AuthorizationCode::new(code))
            .request_async(async_http_client)
            .await
            .map_err(|err| match err {
                oauth2::RequestTokenError::ServerResponse(res) => Error::OAuth(token_error_message(res.error())),
                err => Error::Unexpected(err.into()),
            })?;

        let profile = self
            .http_client
            .get(USERINFO_URL)
            .bearer_auth(token.access_token().secret())
            .send()
            .await?
            .error_for_status()?
            .json::<GoogleProfile>()
            .await?;

        Ok(profile)
    }
}

fn token_error_message(error: &BasicErrorResponseType) -> String {
    format!("Google rejected the authorization code: {}", error.as_ref())
}
