use std::sync::Arc;

use axum::{
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware,
    response::IntoResponse,
    routing::get,
    Extension, Json, Router,
};
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_sessions_rusqlite_store::RusqliteStore;

use crate::{
    auth::{self, AuthBackend, GoogleOAuth},
    classifier::{self, Classifier},
    config::{config, Config},
    db::{self, DB},
    mailer::Mailer,
    notes,
};

use super::{
    errors::{self, on_error},
    state::AppState,
};

pub struct AppParams {
    pub db: DB,
    pub mailer: Arc<dyn Mailer>,
    pub classifier: Classifier,
    pub google: Option<GoogleOAuth>,
}

pub async fn create_app(
    AppParams {
        db,
        mailer,
        classifier,
        google,
    }: AppParams,
) -> errors::Result<Router> {
    let config = config();

    let session_store = RusqliteStore::new(db.clone());
    session_store.migrate().await.map_err(db::Error::from)?;
    let session_layer = auth::session_layer(session_store, config);

    let state = AppState {
        conn: db.clone(),
        mailer,
        classifier,
    };

    let app = Router::new()
        .route("/__version__", get(version))
        .route("/__heartbeat__", get(heartbeat))
        .route("/__lbheartbeat__", get(lbheartbeat))
        .merge(auth::router(state.clone()))
        .merge(notes::router(state.clone()))
        .merge(classifier::router(state.clone()))
        .layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn(on_error))
                .layer(Extension(db.clone())),
        );

    let app = auth::add_auth_layer(app, session_layer, AuthBackend::new(db, google));

    Ok(app.layer(cors_layer(config)?))
}

fn cors_layer(config: &Config) -> errors::Result<CorsLayer> {
    let origins = config
        .allowed_origins()
        .iter()
        .map(|origin| origin.parse::<HeaderValue>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| anyhow::anyhow!("invalid allowed origin: {e}"))?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_credentials(true))
}

async fn version() -> impl IntoResponse {
    let config = &config();
    Json(json!({
        "source" : config.source,
        "version": config.version,
        "commit" : config.git_commit,
        "build"  : config.pipeline_id
    }))
}

async fn heartbeat() -> impl IntoResponse {
    Json(json!({
        "status" : "ok",
    }))
}

async fn lbheartbeat() -> impl IntoResponse {
    ""
}
