use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    routing::{get, post, put},
    Router,
};

use crate::{
    auth,
    ctx::BaseParams,
    shared::extract::{Json, Path},
    state::AppState,
    Result,
};

use super::{handlers, CreateNote, DeleteNoteResponse, NoteId, UpdateCategory, UpdateNote};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/notes", get(find_notes))
        .route("/add", post(create_note))
        .route("/notes/:note_id", put(update_note).delete(delete_note))
        .route("/notes/:note_id/category", put(update_category))
        .route("/categories", get(find_categories))
        .route_layer(middleware::from_fn(auth::middleware::protected))
        .with_state(state)
}

async fn find_notes(base: BaseParams) -> Result<Json<Vec<super::Note>>> {
    handlers::find_notes(base).await.map(Json)
}

async fn create_note(
    State(state): State<AppState>,
    base: BaseParams,
    Json(args): Json<CreateNote>,
) -> Result<(StatusCode, Json<super::Note>)> {
    let note = handlers::create_note(args, &state.classifier, base).await?;
    tracing::debug!(note_id = note.id, category = %note.category, "note created");

    Ok((StatusCode::CREATED, Json(note)))
}

async fn update_note(
    Path(note_id): Path<NoteId>,
    base: BaseParams,
    Json(args): Json<UpdateNote>,
) -> Result<Json<super::Note>> {
    handlers::update_note(note_id, args, base).await.map(Json)
}

async fn update_category(
    Path(note_id): Path<NoteId>,
    base: BaseParams,
    Json(args): Json<UpdateCategory>,
) -> Result<Json<super::Note>> {
    handlers::update_category(note_id, args, base).await.map(Json)
}

async fn delete_note(Path(note_id): Path<NoteId>, base: BaseParams) -> Result<Json<DeleteNoteResponse>> {
    let note = handlers::delete_note(note_id, base).await?;

    Ok(Json(DeleteNoteResponse {
        message: format!("Note with ID {} was deleted.", note.id),
    }))
}

async fn find_categories(base: BaseParams) -> Result<Json<Vec<super::Category>>> {
    handlers::find_categories(base).await.map(Json)
}
