//! Attachment file storage on local disk

use std::path::{Path, PathBuf};

use chrono::Utc;
use uuid::Uuid;

use crate::{
    config::UploadsConfig,
    error::{AppError, AppResult},
    models::HistoryAttachment,
};

/// Accepted extensions and the MIME types each may be declared as
const ALLOWED_TYPES: &[(&str, &[&str])] = &[
    ("jpg", &["image/jpeg", "image/jpg"]),
    ("jpeg", &["image/jpeg", "image/jpg"]),
    ("png", &["image/png"]),
    ("gif", &["image/gif"]),
    ("webp", &["image/webp"]),
    ("pdf", &["application/pdf"]),
    ("doc", &["application/msword"]),
    (
        "docx",
        &["application/vnd.openxmlformats-officedocument.wordprocessingml.document"],
    ),
    ("txt", &["text/plain"]),
    ("rtf", &["application/rtf", "text/rtf"]),
];

/// A file received from a client, not yet stored
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub original_filename: String,
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// A file that passed the allow-list
#[derive(Debug, Clone)]
struct Accepted {
    original_filename: String,
    extension: String,
    mime_type: String,
}

#[derive(Clone)]
pub struct UploadStore {
    directory: PathBuf,
    max_file_size_bytes: u64,
}

impl UploadStore {
    pub fn new(config: &UploadsConfig) -> Self {
        Self {
            directory: config.directory.join("history"),
            max_file_size_bytes: config.max_file_size_bytes,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn accept(&self, file: &UploadedFile) -> AppResult<Accepted> {
        let original_filename = Path::new(&file.original_filename)
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| AppError::FileRejected("File name is missing".to_string()))?
            .to_string();

        if file.bytes.is_empty() {
            return Err(AppError::FileRejected(format!("{} is empty", original_filename)));
        }
        if file.bytes.len() as u64 > self.max_file_size_bytes {
            return Err(AppError::FileRejected(format!(
                "{} exceeds the {} MB limit",
                original_filename,
                self.max_file_size_bytes / (1024 * 1024)
            )));
        }

        let extension = Path::new(&original_filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();
        let (_, mime_types) = ALLOWED_TYPES
            .iter()
            .find(|(ext, _)| *ext == extension)
            .ok_or_else(|| {
                AppError::FileRejected(format!("File type of {} is not allowed", original_filename))
            })?;

        let declared = file
            .mime_type
            .as_deref()
            .map(|m| m.split(';').next().unwrap_or(m).trim().to_lowercase())
            .filter(|m| !m.is_empty() && m != "application/octet-stream");
        let mime_type = match declared {
            Some(declared) if mime_types.contains(&declared.as_str()) => declared,
            Some(declared) => {
                return Err(AppError::FileRejected(format!(
                    "{} is declared as {} which does not match its extension",
                    original_filename, declared
                )))
            }
            None => mime_types[0].to_string(),
        };

        Ok(Accepted {
            original_filename,
            extension,
            mime_type,
        })
    }

    /// Validate every file before any is written.
    pub fn check_all(&self, files: &[UploadedFile]) -> AppResult<()> {
        for file in files {
            self.accept(file)?;
        }
        Ok(())
    }

    /// Write a file under a fresh UUID name and describe it as an attachment of `note_id`.
    pub async fn store(&self, note_id: Uuid, file: &UploadedFile) -> AppResult<HistoryAttachment> {
        let accepted = self.accept(file)?;
        tokio::fs::create_dir_all(&self.directory).await?;

        let id = Uuid::new_v4();
        let stored_filename = format!("{}.{}", Uuid::new_v4().simple(), accepted.extension);
        let path = self.directory.join(&stored_filename);
        tokio::fs::write(&path, &file.bytes).await?;
        tracing::debug!("Stored attachment {} as {}", accepted.original_filename, path.display());

        Ok(HistoryAttachment {
            id,
            note_id,
            original_filename: accepted.original_filename,
            stored_filename,
            file_path: path.to_string_lossy().to_string(),
            mime_type: accepted.mime_type,
            size_bytes: file.bytes.len() as i64,
            upload_date: Utc::now(),
        })
    }

    pub async fn read(&self, attachment: &HistoryAttachment) -> AppResult<Vec<u8>> {
        let path = self.directory.join(&attachment.stored_filename);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(AppError::NotFound(format!(
                "Attachment file {} is missing",
                attachment.original_filename
            ))),
            Err(e) => Err(e.into()),
        }
    }

    /// Best-effort removal after the owning rows are gone; failures are logged.
    pub async fn remove(&self, attachments: &[HistoryAttachment]) {
        for attachment in attachments {
            self.remove_stored(&attachment.stored_filename).await;
        }
    }

    pub async fn remove_stored(&self, stored_filename: &str) -> bool {
        let path = self.directory.join(stored_filename);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
            Err(e) => {
                tracing::warn!("Failed to remove attachment file {}: {}", path.display(), e);
                false
            }
        }
    }

    /// Names of every regular file in the upload directory
    pub async fn list_stored(&self) -> AppResult<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.directory).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        Ok(names)
    }
}
