mod app;
mod auth;
mod classifier;
mod db;
mod mailer;
mod notes;
mod shared;
mod users;

use std::time::Duration;

pub use app::{
    config, create_app, ctx,
    errors::{self, Error, Result},
    state, AppParams,
};

use auth::GoogleOAuth;
use classifier::Classifier;
use db::init_db;
use tokio::net::TcpListener;
use tower_sessions::ExpiredDeletion;
use tower_sessions_rusqlite_store::RusqliteStore;

const SESSION_SWEEP_PERIOD: Duration = Duration::from_secs(15 * 60);

#[tokio::main]
async fn main() -> errors::Result<()> {
    let config = config::config();

    shared::tracing::setup_tracing(config.log_json);

    let db = init_db().await?;

    let app = create_app(AppParams {
        db: db.clone(),
        mailer: mailer::from_config(config)?,
        classifier: Classifier::from_config(config)?,
        google: GoogleOAuth::from_config(config)?,
    })
    .await?;

    tokio::spawn(RusqliteStore::new(db).continuously_delete_expired(SESSION_SWEEP_PERIOD));

    let app = shared::tracing::add_tracing_layer(app);

    let listener = TcpListener::bind(("0.0.0.0", config.port))
        .await
        .map_err(|e| Error::Unexpected(e.into()))?;

    tracing::info!(
        environment = %config.environment,
        "listening on http://{}",
        listener.local_addr().map_err(|e| Error::Unexpected(e.into()))?
    );

    axum::serve(listener, app)
        .await
        .map_err(|e| Error::Unexpected(e.into()))?;

    Ok(())
}
