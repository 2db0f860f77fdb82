use std::sync::Arc;

use axum::extract::FromRef;

use crate::{classifier::Classifier, db::DB, mailer::Mailer};

#[derive(FromRef, Clone)]
pub struct AppState {
    pub conn: DB,
    pub mailer: Arc<dyn Mailer>,
    pub classifier: Classifier,
}
