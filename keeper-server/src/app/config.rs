use std::sync::OnceLock;

use serde::Deserialize;

use crate::auth::password::MIN_BCRYPT_COST;

#[derive(Deserialize, Debug)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_environment")]
    pub environment: String,
    #[serde(default)]
    pub log_json: bool,

    // http
    #[serde(default = "default_frontend_url")]
    pub frontend_url: String,
    /// Comma separated list, falls back to `frontend_url`.
    pub allowed_origins: Option<String>,

    // session
    #[serde(default)]
    pub cookie_secure: bool,
    #[serde(default = "default_session_days")]
    pub session_days: i64,
    #[serde(default = "default_bcrypt_cost")]
    pub bcrypt_cost: u32,

    // classification service
    #[serde(default = "default_classifier_url")]
    pub classifier_url: String,
    #[serde(default = "default_classifier_timeout_secs")]
    pub classifier_timeout_secs: u64,

    // google oauth
    pub google_client_id: Option<String>,
    pub google_client_secret: Option<String>,
    #[serde(rename = "google_callback_url")]
    pub google_redirect_url: Option<String>,

    // mail
    pub smtp_host: Option<String>,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub mail_from: Option<String>,

    // build
    #[serde(default = "default_local")]
    pub source: String,
    #[serde(default = "default_local")]
    pub git_commit: String,
    #[serde(default = "default_local")]
    pub pipeline_id: String,
    #[serde(default = "default_local")]
    pub version: String,
}

fn default_port() -> u16 {
    10000
}

fn default_database_url() -> String {
    "keeper.db".into()
}

fn default_environment() -> String {
    "development".into()
}

fn default_frontend_url() -> String {
    "http://localhost:5173".into()
}

fn default_session_days() -> i64 {
    30
}

fn default_bcrypt_cost() -> u32 {
    if cfg!(test) {
        MIN_BCRYPT_COST
    } else {
        10
    }
}

fn default_classifier_url() -> String {
    "https://keeper-model.onrender.com".into()
}

fn default_classifier_timeout_secs() -> u64 {
    5
}

fn default_local() -> String {
    "local".into()
}

impl Config {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env::<Self>()
    }

    pub fn allowed_origins(&self) -> Vec<String> {
        match &self.allowed_origins {
            Some(origins) => origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            None => vec![self.frontend_url.trim_end_matches('/').to_string()],
        }
    }

    /// Frontend location of the password reset form for `token`.
    pub fn reset_password_url(&self, token: &str) -> String {
        format!("{}/reset-password/{token}", self.frontend_url.trim_end_matches('/'))
    }

    /// Frontend location the OAuth callback sends the browser to.
    pub fn frontend_redirect(&self, path: Option<&str>) -> String {
        let base = self.frontend_url.trim_end_matches('/');
        match path {
            Some(path) if path.starts_with('/') && !path.starts_with("//") => format!("{base}{path}"),
            _ => format!("{base}/"),
        }
    }
}

static CONFIG: OnceLock<Config> = OnceLock::new();

pub fn config() -> &'static Config {
    CONFIG.get_or_init(|| Config::from_env().expect("invalid configuration in environment"))
}
