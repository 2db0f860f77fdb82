use rusqlite::params;

use crate::{classifier::Classifier, ctx::BaseParams, db, Error, Result};

use super::{Category, CreateNote, Note, NoteId, UpdateCategory, UpdateNote, NOTE_COLUMNS};

const NOTE_NOT_FOUND: &str = "Note not found or you don't have permission to access it";

fn required(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

pub async fn find_notes(BaseParams { db, ctx }: BaseParams) -> Result<Vec<Note>> {
    let user_id = ctx.require_user_id()?;
    db.call(move |conn| {
        let notes = conn
            .prepare(&format!("SELECT {NOTE_COLUMNS} FROM notes WHERE user_id = ? ORDER BY id"))?
            .query_map([user_id], |row| Note::try_from(row))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(notes)
    })
    .await
    .map_err(db::Error::from)
    .map_err(Error::from)
}

/// Stores a new note. A blank category is filled in by the classifier.
pub async fn create_note(args: CreateNote, classifier: &Classifier, BaseParams { db, ctx }: BaseParams) -> Result<Note> {
    let user_id = ctx.require_user_id()?;
    let title = required(args.title).ok_or_else(|| Error::bad_request("Title is required"))?;
    let content = args.content.unwrap_or_default();

    let category = match required(args.category) {
        Some(category) => category.trim().to_string(),
        None => classifier.category_for(&format!("{title} {content}")).await,
    };

    db.call(move |conn| {
        let note = conn.query_row(
            &format!(
                r#"INSERT INTO notes (title, content, category, user_id) VALUES (?, ?, ?, ?)
                    RETURNING {NOTE_COLUMNS}"#
            ),
            params![title, content, category, user_id],
            |row| Note::try_from(row),
        )?;
        Ok(note)
    })
    .await
    .map_err(db::Error::from)
    .map_err(Error::from)
}

pub async fn update_note(note_id: NoteId, args: UpdateNote, BaseParams { db, ctx }: BaseParams) -> Result<Note> {
    let user_id = ctx.require_user_id()?;
    let (Some(title), Some(content)) = (required(args.title), required(args.content)) else {
        return Err(Error::bad_request("Title and content are required"));
    };

    db.call(move |conn| {
        conn.query_row(
            &format!(
                r#"UPDATE notes SET title = ?, content = ?, updated_at = CURRENT_TIMESTAMP
                    WHERE id = ? AND user_id = ?
                    RETURNING {NOTE_COLUMNS}"#
            ),
            params![title, content, note_id, user_id],
            |row| Note::try_from(row),
        )
        .map_err(|e| e.into())
    })
    .await
    .map_err(db::Error::from)
    .map_err(|e| e.not_found_message(NOTE_NOT_FOUND))
    .map_err(Error::from)
}

pub async fn update_category(note_id: NoteId, args: UpdateCategory, BaseParams { db, ctx }: BaseParams) -> Result<Note> {
    let user_id = ctx.require_user_id()?;
    let category = required(args.category)
        .map(|c| c.trim().to_string())
        .ok_or_else(|| Error::bad_request("Category is required"))?;

    db.call(move |conn| {
        conn.query_row(
            &format!(
                r#"UPDATE notes SET category = ?, updated_at = CURRENT_TIMESTAMP
                    WHERE id = ? AND user_id = ?
                    RETURNING {NOTE_COLUMNS}"#
            ),
            params![category, note_id, user_id],
            |row| Note::try_from(row),
        )
        .map_err(|e| e.into())
    })
    .await
    .map_err(db::Error::from)
    .map_err(|e| e.not_found_message(NOTE_NOT_FOUND))
    .map_err(Error::from)
}

pub async fn delete_note(note_id: NoteId, BaseParams { db, ctx }: BaseParams) -> Result<Note> {
    let user_id = ctx.require_user_id()?;
    db.call(move |conn| {
        conn.query_row(
            &format!(
                r#"DELETE FROM notes
                    WHERE id = ? AND user_id = ?
                    RETURNING {NOTE_COLUMNS}"#
            ),
            params![note_id, user_id],
            |row| Note::try_from(row),
        )
        .map_err(|e| e.into())
    })
    .await
    .map_err(db::Error::from)
    .map_err(|e| e.not_found_message(NOTE_NOT_FOUND))
    .map_err(Error::from)
}

pub async fn find_categories(BaseParams { db, .. }: BaseParams) -> Result<Vec<Category>> {
    db.call(|conn| {
        let categories = conn
            .prepare("SELECT id, name FROM categories ORDER BY name")?
            .query_map([], |row| {
                Ok(Category {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(categories)
    })
    .await
    .map_err(db::Error::from)
    .map_err(Error::from)
}
