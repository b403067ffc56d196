//! History note and attachment persistence

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use uuid::Uuid;

use super::Repository;
use crate::{
    error::AppResult,
    models::{
        history::{HistoryNoteRow, HistoryQuery},
        HistoryAttachment, HistoryNote, Regime, UserClaims,
    },
};

const NOTE_COLUMNS: &str = "id, regime, equipment_serial, author_id, author_name, note_text, \
     created_at, updated_at, last_modified_by, last_modified_by_name";

const ATTACHMENT_COLUMNS: &str = "id, note_id, original_filename, stored_filename, file_path, \
     mime_type, size_bytes, upload_date";

/// Fields of a note about to be written
pub struct NewNote<'a> {
    pub id: Uuid,
    pub regime: Regime,
    pub equipment_serial: &'a str,
    pub author_id: i64,
    pub author_name: &'a str,
    pub note_text: &'a str,
    pub created_at: DateTime<Utc>,
    /// Set only for notes carried over already edited
    pub edited: Option<NoteEdit<'a>>,
}

pub struct NoteEdit<'a> {
    pub updated_at: DateTime<Utc>,
    pub by_id: Option<i64>,
    pub by_name: &'a str,
}

impl<'a> NewNote<'a> {
    pub fn by(
        author: &'a UserClaims,
        id: Uuid,
        regime: Regime,
        equipment_serial: &'a str,
        note_text: &'a str,
    ) -> Self {
        Self {
            id,
            regime,
            equipment_serial,
            author_id: author.user_id,
            author_name: &author.username,
            note_text,
            created_at: Utc::now(),
            edited: None,
        }
    }
}

impl Repository {
    async fn history_attach(
        &self,
        conn: &mut SqliteConnection,
        rows: Vec<HistoryNoteRow>,
    ) -> AppResult<Vec<HistoryNote>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT {} FROM history_attachments WHERE note_id IN (",
            ATTACHMENT_COLUMNS
        ));
        let mut separated = builder.separated(", ");
        for row in &rows {
            separated.push_bind(row.id);
        }
        separated.push_unseparated(") ORDER BY position, upload_date");

        let attachments: Vec<HistoryAttachment> =
            builder.build_query_as().fetch_all(&mut *conn).await?;

        let mut by_note: HashMap<Uuid, Vec<HistoryAttachment>> = HashMap::new();
        for attachment in attachments {
            by_note.entry(attachment.note_id).or_default().push(attachment);
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let attachments = by_note.remove(&row.id).unwrap_or_default();
                row.into_note(attachments)
            })
            .collect())
    }

    pub async fn history_insert_note(
        &self,
        conn: &mut SqliteConnection,
        note: &NewNote<'_>,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO history_notes
                (id, regime, equipment_serial, author_id, author_name, note_text, created_at,
                 updated_at, last_modified_by, last_modified_by_name)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(note.id)
        .bind(note.regime.as_str())
        .bind(note.equipment_serial)
        .bind(note.author_id)
        .bind(note.author_name)
        .bind(note.note_text)
        .bind(note.created_at)
        .bind(note.edited.as_ref().map(|e| e.updated_at))
        .bind(note.edited.as_ref().and_then(|e| e.by_id))
        .bind(note.edited.as_ref().map(|e| e.by_name))
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    pub async fn history_count(&self) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM history_notes")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn history_get_note(
        &self,
        conn: &mut SqliteConnection,
        id: Uuid,
    ) -> AppResult<Option<HistoryNote>> {
        let row = sqlx::query_as::<_, HistoryNoteRow>(&format!(
            "SELECT {} FROM history_notes WHERE id = ?",
            NOTE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        match row {
            Some(row) => Ok(self.history_attach(conn, vec![row]).await?.into_iter().next()),
            None => Ok(None),
        }
    }

    /// Notes of one record, newest first
    pub async fn history_for_equipment(
        &self,
        regime: Regime,
        serial: &str,
    ) -> AppResult<Vec<HistoryNote>> {
        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query_as::<_, HistoryNoteRow>(&format!(
            "SELECT {} FROM history_notes WHERE regime = ? AND equipment_serial = ? \
             ORDER BY created_at DESC",
            NOTE_COLUMNS
        ))
        .bind(regime.as_str())
        .bind(serial)
        .fetch_all(&mut *conn)
        .await?;
        self.history_attach(&mut conn, rows).await
    }

    pub async fn history_update_note(
        &self,
        conn: &mut SqliteConnection,
        id: Uuid,
        note_text: &str,
        editor: &UserClaims,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE history_notes
            SET note_text = ?, updated_at = ?, last_modified_by = ?, last_modified_by_name = ?
            WHERE id = ?
            "#,
        )
        .bind(note_text)
        .bind(Utc::now())
        .bind(editor.user_id)
        .bind(&editor.username)
        .bind(id)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Delete a note with its attachment rows; returns the removed attachments.
    pub async fn history_delete_note(
        &self,
        conn: &mut SqliteConnection,
        id: Uuid,
    ) -> AppResult<Vec<HistoryAttachment>> {
        let attachments = sqlx::query_as::<_, HistoryAttachment>(&format!(
            "SELECT {} FROM history_attachments WHERE note_id = ?",
            ATTACHMENT_COLUMNS
        ))
        .bind(id)
        .fetch_all(&mut *conn)
        .await?;

        sqlx::query("DELETE FROM history_attachments WHERE note_id = ?")
            .bind(id)
            .execute(&mut *conn)
            .await?;
        sqlx::query("DELETE FROM history_notes WHERE id = ?")
            .bind(id)
            .execute(&mut *conn)
            .await?;
        Ok(attachments)
    }

    /// Delete every note of a record; returns the removed attachments.
    pub async fn history_delete_for_equipment(
        &self,
        conn: &mut SqliteConnection,
        regime: Regime,
        serial: &str,
    ) -> AppResult<Vec<HistoryAttachment>> {
        let attachments = sqlx::query_as::<_, HistoryAttachment>(
            r#"
            SELECT a.id, a.note_id, a.original_filename, a.stored_filename, a.file_path,
                   a.mime_type, a.size_bytes, a.upload_date
            FROM history_attachments a
            JOIN history_notes n ON n.id = a.note_id
            WHERE n.regime = ? AND n.equipment_serial = ?
            "#,
        )
        .bind(regime.as_str())
        .bind(serial)
        .fetch_all(&mut *conn)
        .await?;

        sqlx::query(
            r#"
            DELETE FROM history_attachments
            WHERE note_id IN (SELECT id FROM history_notes WHERE regime = ? AND equipment_serial = ?)
            "#,
        )
        .bind(regime.as_str())
        .bind(serial)
        .execute(&mut *conn)
        .await?;
        sqlx::query("DELETE FROM history_notes WHERE regime = ? AND equipment_serial = ?")
            .bind(regime.as_str())
            .bind(serial)
            .execute(&mut *conn)
            .await?;
        Ok(attachments)
    }

    /// Point notes at a record's new serial after a rename.
    pub async fn history_repoint(
        &self,
        conn: &mut SqliteConnection,
        regime: Regime,
        old_serial: &str,
        new_serial: &str,
    ) -> AppResult<u64> {
        let result = sqlx::query(
            "UPDATE history_notes SET equipment_serial = ? WHERE regime = ? AND equipment_serial = ?",
        )
        .bind(new_serial)
        .bind(regime.as_str())
        .bind(old_serial)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn history_insert_attachment(
        &self,
        conn: &mut SqliteConnection,
        attachment: &HistoryAttachment,
    ) -> AppResult<()> {
        let position: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(position), 0) + 1 FROM history_attachments WHERE note_id = ?",
        )
        .bind(attachment.note_id)
        .fetch_one(&mut *conn)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO history_attachments
                (id, note_id, original_filename, stored_filename, file_path, mime_type, size_bytes, upload_date, position)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(attachment.id)
        .bind(attachment.note_id)
        .bind(&attachment.original_filename)
        .bind(&attachment.stored_filename)
        .bind(&attachment.file_path)
        .bind(&attachment.mime_type)
        .bind(attachment.size_bytes)
        .bind(attachment.upload_date)
        .bind(position)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    pub async fn history_get_attachment(
        &self,
        note_id: Uuid,
        attachment_id: Uuid,
    ) -> AppResult<Option<HistoryAttachment>> {
        let attachment = sqlx::query_as::<_, HistoryAttachment>(&format!(
            "SELECT {} FROM history_attachments WHERE id = ? AND note_id = ?",
            ATTACHMENT_COLUMNS
        ))
        .bind(attachment_id)
        .bind(note_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(attachment)
    }

    pub async fn history_delete_attachment(
        &self,
        conn: &mut SqliteConnection,
        attachment_id: Uuid,
    ) -> AppResult<()> {
        sqlx::query("DELETE FROM history_attachments WHERE id = ?")
            .bind(attachment_id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// Filtered search across all notes, newest first. `serial` is the
    /// already-resolved canonical serial.
    pub async fn history_search(
        &self,
        query: &HistoryQuery,
        serial: Option<&str>,
    ) -> AppResult<Vec<HistoryNote>> {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT {} FROM history_notes WHERE 1 = 1",
            NOTE_COLUMNS
        ));

        if let Some(regime) = query.regime {
            builder.push(" AND regime = ").push_bind(regime.as_str());
        }
        if let Some(serial) = serial {
            builder.push(" AND equipment_serial = ").push_bind(serial.to_string());
        }
        if let Some(author_id) = query.author_id {
            builder.push(" AND author_id = ").push_bind(author_id);
        }
        if let Some(from) = query.from.and_then(|d| d.and_hms_opt(0, 0, 0)) {
            builder.push(" AND created_at >= ").push_bind(from.and_utc());
        }
        if let Some(to) = query
            .to
            .and_then(|d| d.succ_opt())
            .and_then(|d| d.and_hms_opt(0, 0, 0))
        {
            builder.push(" AND created_at < ").push_bind(to.and_utc());
        }
        if let Some(text) = query.q.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            let pattern = format!("%{}%", text.to_lowercase());
            builder
                .push(" AND (LOWER(note_text) LIKE ")
                .push_bind(pattern.clone())
                .push(" OR LOWER(author_name) LIKE ")
                .push_bind(pattern)
                .push(")");
        }

        let limit = query.limit.unwrap_or(100).clamp(1, 1000);
        builder.push(" ORDER BY created_at DESC LIMIT ").push_bind(limit);

        let mut conn = self.pool.acquire().await?;
        let rows: Vec<HistoryNoteRow> = builder.build_query_as().fetch_all(&mut *conn).await?;
        self.history_attach(&mut conn, rows).await
    }

    /// Stored filenames of every attachment row
    pub async fn history_stored_filenames(&self) -> AppResult<HashSet<String>> {
        let names: Vec<String> = sqlx::query_scalar("SELECT stored_filename FROM history_attachments")
            .fetch_all(&self.pool)
            .await?;
        Ok(names.into_iter().collect())
    }
}
