//! Maintenance history notes and attachments
//!
//! Note and attachment mutations are audited under the acting user.

use std::collections::HashSet;
use std::sync::Arc;

use uuid::Uuid;

use crate::{
    cache::{CacheCoordinator, Scope},
    error::{AppError, AppResult},
    identifier,
    models::{
        audit::{Actor, AuditEvent, AuditEventType},
        history::{normalize_note_text, CleanupReport, HistoryQuery},
        HistoryAttachment, HistoryNote, Regime, UserClaims,
    },
    repository::{history::NewNote, Repository},
};

use super::{
    audit::AuditService,
    commit_invalidated,
    uploads::{UploadStore, UploadedFile},
};

#[derive(Clone)]
pub struct HistoryService {
    repository: Repository,
    cache: Arc<CacheCoordinator>,
    uploads: UploadStore,
    audit: AuditService,
}

impl HistoryService {
    pub fn new(
        repository: Repository,
        cache: Arc<CacheCoordinator>,
        uploads: UploadStore,
        audit: AuditService,
    ) -> Self {
        Self {
            repository,
            cache,
            uploads,
            audit,
        }
    }

    /// Notes of the record `identifier` resolves to, newest first
    pub async fn list_for(&self, regime: Regime, identifier: &str) -> AppResult<Vec<HistoryNote>> {
        let listing = self.cache.listing(regime).await?;
        let serial = identifier::find(identifier, &listing.rows)?
            .record
            .record
            .serial
            .clone();
        self.repository.history_for_equipment(regime, &serial).await
    }

    /// Attach a note to a record. The note is stored under the canonical
    /// serial, whatever form `identifier` took.
    pub async fn add_note(
        &self,
        regime: Regime,
        identifier: &str,
        note_text: &str,
        author: &UserClaims,
        files: &[UploadedFile],
    ) -> AppResult<HistoryNote> {
        let result = self
            .insert_note(regime, identifier, note_text, author, files)
            .await;
        let mut event = AuditEvent::new(
            AuditEventType::HistoryAdded,
            &Actor::from(author),
            format!("Added history note to {} equipment {}", regime.label(), identifier),
        )
        .detail("regime", regime)
        .detail("identifier", identifier)
        .detail("attachments", files.len());
        if let Ok(note) = &result {
            event = event
                .detail("note_id", note.id)
                .detail("serial", &note.equipment_serial);
        }
        self.audit.record(event.outcome(&result)).await;
        result
    }

    async fn insert_note(
        &self,
        regime: Regime,
        identifier: &str,
        note_text: &str,
        author: &UserClaims,
        files: &[UploadedFile],
    ) -> AppResult<HistoryNote> {
        author.require_write()?;
        let note_text = normalize_note_text(note_text)?;
        self.uploads.check_all(files)?;

        let gate = self.cache.begin_write().await;
        let mut tx = self.repository.begin().await?;
        let records = self.repository.equipment_load(&mut tx, regime).await?;
        let serial = identifier::find(identifier, &records)?.record.serial.clone();

        let note_id = Uuid::new_v4();
        self.repository
            .history_insert_note(
                &mut tx,
                &NewNote::by(author, note_id, regime, &serial, &note_text),
            )
            .await?;

        let mut written = Vec::new();
        let result = async {
            for file in files {
                let attachment = self.uploads.store(note_id, file).await?;
                written.push(attachment.clone());
                self.repository
                    .history_insert_attachment(&mut tx, &attachment)
                    .await?;
            }
            commit_invalidated(&gate, tx, Scope::Regime(regime)).await
        }
        .await;
        drop(gate);

        if let Err(e) = result {
            self.uploads.remove(&written).await;
            return Err(e);
        }

        tracing::info!(
            "Note {} added to {} {:?} by {} with {} attachment(s)",
            note_id,
            regime.label(),
            serial,
            author.username,
            written.len()
        );
        self.get_note(note_id).await
    }

    pub async fn get_note(&self, note_id: Uuid) -> AppResult<HistoryNote> {
        let mut conn = self.repository.pool.acquire().await?;
        self.repository
            .history_get_note(&mut conn, note_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("History note {} not found", note_id)))
    }

    pub async fn update_note(
        &self,
        note_id: Uuid,
        note_text: &str,
        editor: &UserClaims,
    ) -> AppResult<HistoryNote> {
        let result = self.edit_note(note_id, note_text, editor).await;
        self.audit
            .record(
                AuditEvent::new(
                    AuditEventType::HistoryUpdated,
                    &Actor::from(editor),
                    format!("Edited history note {}", note_id),
                )
                .detail("note_id", note_id)
                .outcome(&result),
            )
            .await;
        result
    }

    async fn edit_note(
        &self,
        note_id: Uuid,
        note_text: &str,
        editor: &UserClaims,
    ) -> AppResult<HistoryNote> {
        let note_text = normalize_note_text(note_text)?;

        let mut tx = self.repository.begin().await?;
        let note = self
            .repository
            .history_get_note(&mut tx, note_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("History note {} not found", note_id)))?;
        note.require_modify(editor)?;
        self.repository
            .history_update_note(&mut tx, note_id, &note_text, editor)
            .await?;
        tx.commit().await?;

        tracing::info!("Note {} edited by {}", note_id, editor.username);
        self.get_note(note_id).await
    }

    /// Delete a note, its attachment rows, then its files.
    pub async fn delete_note(&self, note_id: Uuid, claims: &UserClaims) -> AppResult<()> {
        let result = self.remove_note(note_id, claims).await;
        let mut event = AuditEvent::new(
            AuditEventType::HistoryDeleted,
            &Actor::from(claims),
            format!("Deleted history note {}", note_id),
        )
        .detail("note_id", note_id);
        if let Ok(removed) = &result {
            event = event.detail("attachments_removed", removed);
        }
        self.audit.record(event.outcome(&result)).await;
        result.map(|_| ())
    }

    /// Returns how many attachment files went with the note.
    async fn remove_note(&self, note_id: Uuid, claims: &UserClaims) -> AppResult<usize> {
        let gate = self.cache.begin_write().await;
        let mut tx = self.repository.begin().await?;
        let note = self
            .repository
            .history_get_note(&mut tx, note_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("History note {} not found", note_id)))?;
        note.require_modify(claims)?;

        let attachments = self.repository.history_delete_note(&mut tx, note_id).await?;
        commit_invalidated(&gate, tx, Scope::Regime(note.regime)).await?;
        drop(gate);

        self.uploads.remove(&attachments).await;
        tracing::info!("Note {} deleted by {}", note_id, claims.username);
        Ok(attachments.len())
    }

    /// Add files to an existing note.
    pub async fn add_attachments(
        &self,
        note_id: Uuid,
        files: &[UploadedFile],
        claims: &UserClaims,
    ) -> AppResult<HistoryNote> {
        let result = self.attach(note_id, files, claims).await;
        let names: Vec<&str> = files.iter().map(|f| f.original_filename.as_str()).collect();
        self.audit
            .record(
                AuditEvent::new(
                    AuditEventType::HistoryAttachmentAdded,
                    &Actor::from(claims),
                    format!("Added {} attachment(s) to history note {}", files.len(), note_id),
                )
                .detail("note_id", note_id)
                .detail("files", names)
                .outcome(&result),
            )
            .await;
        result
    }

    async fn attach(
        &self,
        note_id: Uuid,
        files: &[UploadedFile],
        claims: &UserClaims,
    ) -> AppResult<HistoryNote> {
        if files.is_empty() {
            return Err(AppError::BadRequest("No files were uploaded".to_string()));
        }
        self.uploads.check_all(files)?;

        let mut tx = self.repository.begin().await?;
        let note = self
            .repository
            .history_get_note(&mut tx, note_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("History note {} not found", note_id)))?;
        note.require_modify(claims)?;

        let mut written = Vec::new();
        let result = async {
            for file in files {
                let attachment = self.uploads.store(note_id, file).await?;
                written.push(attachment.clone());
                self.repository
                    .history_insert_attachment(&mut tx, &attachment)
                    .await?;
            }
            tx.commit().await?;
            Ok::<_, AppError>(())
        }
        .await;

        if let Err(e) = result {
            self.uploads.remove(&written).await;
            return Err(e);
        }
        self.get_note(note_id).await
    }

    /// Attachment metadata and file content
    pub async fn get_attachment(
        &self,
        note_id: Uuid,
        attachment_id: Uuid,
    ) -> AppResult<(HistoryAttachment, Vec<u8>)> {
        let attachment = self
            .repository
            .history_get_attachment(note_id, attachment_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Attachment {} not found", attachment_id)))?;
        let bytes = self.uploads.read(&attachment).await?;
        Ok((attachment, bytes))
    }

    pub async fn delete_attachment(
        &self,
        note_id: Uuid,
        attachment_id: Uuid,
        claims: &UserClaims,
    ) -> AppResult<()> {
        let result = self.detach(note_id, attachment_id, claims).await;
        let mut event = AuditEvent::new(
            AuditEventType::HistoryAttachmentDeleted,
            &Actor::from(claims),
            format!("Deleted attachment {} from history note {}", attachment_id, note_id),
        )
        .detail("note_id", note_id)
        .detail("attachment_id", attachment_id);
        if let Ok(filename) = &result {
            event = event.detail("filename", filename);
        }
        self.audit.record(event.outcome(&result)).await;
        result.map(|_| ())
    }

    /// Returns the original filename of the removed attachment.
    async fn detach(
        &self,
        note_id: Uuid,
        attachment_id: Uuid,
        claims: &UserClaims,
    ) -> AppResult<String> {
        let mut tx = self.repository.begin().await?;
        let note = self
            .repository
            .history_get_note(&mut tx, note_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("History note {} not found", note_id)))?;
        note.require_modify(claims)?;

        let attachment = note
            .attachments
            .into_iter()
            .find(|a| a.id == attachment_id)
            .ok_or_else(|| AppError::NotFound(format!("Attachment {} not found", attachment_id)))?;
        self.repository
            .history_delete_attachment(&mut tx, attachment_id)
            .await?;
        tx.commit().await?;

        self.uploads.remove(std::slice::from_ref(&attachment)).await;
        Ok(attachment.original_filename)
    }

    /// Search notes. With a regime, the serial filter goes through the
    /// record locator; a serial that resolves to nothing is matched raw.
    pub async fn search(&self, query: &HistoryQuery) -> AppResult<Vec<HistoryNote>> {
        let serial = match (query.regime, query.serial.as_deref().map(str::trim)) {
            (_, None) | (_, Some("")) => None,
            (Some(regime), Some(raw)) => {
                let listing = self.cache.listing(regime).await?;
                Some(
                    identifier::locate(raw, &listing.rows)
                        .map(|located| located.record.record.serial.clone())
                        .unwrap_or_else(|| raw.to_string()),
                )
            }
            (None, Some(raw)) => Some(raw.to_string()),
        };
        self.repository.history_search(query, serial.as_deref()).await
    }

    /// Delete files in the upload directory that no attachment row references.
    pub async fn cleanup_orphans(&self) -> AppResult<CleanupReport> {
        let referenced: HashSet<String> = self.repository.history_stored_filenames().await?;
        let stored = self.uploads.list_stored().await?;

        let mut report = CleanupReport {
            scanned: stored.len(),
            ..Default::default()
        };
        for name in stored {
            if referenced.contains(&name) {
                continue;
            }
            if self.uploads.remove_stored(&name).await {
                report.removed.push(name);
            } else {
                report.failed.push(name);
            }
        }
        tracing::info!(
            "Orphan cleanup scanned {} file(s), removed {}, failed {}",
            report.scanned,
            report.removed.len(),
            report.failed.len()
        );
        Ok(report)
    }
}
