mod backend;
mod google;
pub mod password;
mod routes;
pub mod tokens;

use axum::Router;
use axum_login::AuthManagerLayerBuilder;
use tower_sessions::{
    cookie::{time::Duration, SameSite},
    Expiry, SessionManagerLayer, SessionStore,
};

pub use backend::{AuthBackend, AuthSession, Credentials, GoogleCredentials, PasswordCredentials};
pub use google::{GoogleOAuth, GoogleOAuthResponse};
pub use routes::router;

use crate::config::Config;

pub const SESSION_COOKIE: &str = "keeper.sid";

pub fn session_layer<Store>(store: Store, config: &Config) -> SessionManagerLayer<Store>
where
    Store: SessionStore + Clone,
{
    let same_site = if config.cookie_secure {
        SameSite::None
    } else {
        SameSite::Lax
    };

    SessionManagerLayer::new(store)
        .with_name(SESSION_COOKIE)
        .with_http_only(true)
        .with_secure(config.cookie_secure)
        .with_same_site(same_site)
        .with_expiry(Expiry::OnInactivity(Duration::days(config.session_days)))
}

pub fn add_auth_layer(
    app: Router,
    session_layer: SessionManagerLayer<impl SessionStore + Clone>,
    backend: AuthBackend,
) -> Router {
    let auth_layer = AuthManagerLayerBuilder::new(backend, session_layer).build();

    app.layer(auth_layer)
}

pub mod middleware {
    use axum::{extract::Request, middleware::Next, response::Response};

    use crate::{Error, Result};

    use super::*;

    pub async fn protected(auth_session: AuthSession, request: Request, next: Next) -> Result<Response> {
        auth_session.user.ok_or(Error::Unauthorized)?;
        Ok(next.run(request).await)
    }
}
