use axum::{extract::State, http::StatusCode, middleware, routing::post, Router};
use serde::{Deserialize, Serialize};

use crate::{auth, shared::extract::Json, state::AppState};

use super::DEFAULT_CATEGORY;

#[derive(Debug, Deserialize)]
pub struct ClassifyText {
    pub title: Option<String>,
    pub content: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClassifyTextResponse {
    pub category: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/classify-text", post(classify_text))
        .route_layer(middleware::from_fn(auth::middleware::protected))
        .with_state(state)
}

async fn classify_text(
    State(state): State<AppState>,
    Json(ClassifyText { title, content }): Json<ClassifyText>,
) -> (StatusCode, Json<ClassifyTextResponse>) {
    let title = title.unwrap_or_default();
    let content = content.unwrap_or_default();
    let text = format!("{} {}", title.trim(), content.trim()).trim().to_string();

    if text.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ClassifyTextResponse {
                category: DEFAULT_CATEGORY.into(),
                success: false,
                error: Some("No text provided".into()),
            }),
        );
    }

    let response = match state.classifier.classify(&text).await {
        Ok(category) => ClassifyTextResponse {
            category,
            success: true,
            error: None,
        },
        Err(err) => {
            tracing::warn!("classification failed: {err}");
            ClassifyTextResponse {
                category: DEFAULT_CATEGORY.into(),
                success: false,
                error: Some(err.public_message().into()),
            }
        }
    };

    (StatusCode::OK, Json(response))
}
