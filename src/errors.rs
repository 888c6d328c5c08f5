use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::broadcast;

use crate::uploader::file_queue::{FileQueue, UploadStatus};
use crate::uploader::QueueEvent;

/// Message recorded on an entry when a transport failure carries no text of its own.
pub const GENERIC_UPLOAD_FAILURE: &str = "Upload failed";

#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("File rejected: {name} ({media_type}) is not an accepted document type")]
    RejectedByValidation { name: String, media_type: String },

    #[error("Upload failed: {}", status_line(*status, status_text))]
    HttpStatus { status: u16, status_text: String },

    #[error("{message}")]
    Transport { message: String },

    #[error("Invalid endpoint URL: {url}")]
    InvalidEndpoint { url: String },

    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Entry not found: {id}")]
    EntryNotFound { id: String },

    #[error("Invalid status transition for {id}: {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: UploadStatus,
        to: UploadStatus,
    },
}

/// Convert to string for display in front ends
impl From<AppError> for String {
    fn from(error: AppError) -> Self {
        error.to_string()
    }
}

/// Custom result type
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn validation(field: &str, message: &str) -> Self {
        Self::Validation {
            field: field.to_string(),
            message: message.to_string(),
        }
    }

    pub fn rejected(name: &str, media_type: &str) -> Self {
        Self::RejectedByValidation {
            name: name.to_string(),
            media_type: media_type.to_string(),
        }
    }

    pub fn http_status(status: u16, status_text: &str) -> Self {
        Self::HttpStatus {
            status,
            status_text: status_text.to_string(),
        }
    }

    pub fn invalid_endpoint(url: &str) -> Self {
        Self::InvalidEndpoint {
            url: url.to_string(),
        }
    }

    pub fn entry_not_found(id: &str) -> Self {
        Self::EntryNotFound { id: id.to_string() }
    }

    /// Wrap a failed request or body read. Falls back to a generic message
    /// when the underlying error renders as nothing.
    pub fn transport(error: impl std::fmt::Display) -> Self {
        let message = error.to_string();
        let message = if message.trim().is_empty() {
            GENERIC_UPLOAD_FAILURE.to_string()
        } else {
            message
        };
        Self::Transport { message }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            AppError::Transport { .. } | AppError::Network(_) | AppError::Io(_) => true,
            _ => false,
        }
    }
}

/// `500 Internal Server Error`, or just the code when the server sent no reason
fn status_line(status: u16, status_text: &str) -> String {
    let status_text = status_text.trim();
    if status_text.is_empty() {
        status.to_string()
    } else {
        format!("{} {}", status, status_text)
    }
}

/// Queue state shared between the action surface and upload tasks
pub type SharedQueue = Arc<Mutex<FileQueue>>;

/// Sender half of the queue change feed
pub type EventSink = broadcast::Sender<QueueEvent>;

/// Mutate the shared queue. The lock is held only for the duration of `f`,
/// which must not await.
pub fn safe_queue_update<F, R>(queue: &SharedQueue, operation: &str, f: F) -> Option<R>
where
    F: FnOnce(&mut FileQueue) -> R,
{
    match queue.lock() {
        Ok(mut queue) => Some(f(&mut queue)),
        Err(e) => {
            log::error!(
                "Failed to acquire queue lock for {} (non-critical): {}",
                operation,
                e
            );
            None
        }
    }
}

pub fn safe_queue_read<F, R>(queue: &SharedQueue, operation: &str, f: F) -> Option<R>
where
    F: FnOnce(&FileQueue) -> R,
{
    match queue.lock() {
        Ok(queue) => Some(f(&queue)),
        Err(e) => {
            log::error!(
                "Failed to acquire queue lock for {} (non-critical): {}",
                operation,
                e
            );
            None
        }
    }
}

/// Publish a queue event. Having no subscribers is normal for headless use.
pub fn safe_emit_event(events: &EventSink, event: QueueEvent) -> bool {
    let name = event.name();
    match events.send(event) {
        Ok(receivers) => {
            log::debug!("Emitted event '{}' to {} subscriber(s)", name, receivers);
            true
        }
        Err(_) => {
            log::trace!("No subscribers for event '{}'", name);
            false
        }
    }
}
