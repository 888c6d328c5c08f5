// Uploader module - file queue plus the driver that forwards each entry
//
// Entries move pending -> uploading -> success | error, and error -> uploading on retry.

use serde::Serialize;

pub mod endpoint_client;
pub mod file_queue;
pub mod progress_tracker;
pub mod retry;
pub mod upload_queue;

pub use file_queue::{Admission, FileEntry, FileQueue, QueueSummary, StatusUpdate, UploadStatus};
pub use retry::{retry_failed_uploads, retry_single_upload};
pub use upload_queue::UploadDriver;

/// Change notifications for whatever renders the queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum QueueEvent {
    Admitted { ids: Vec<String> },
    StatusChanged { id: String, status: UploadStatus },
    Removed { id: String },
}

impl QueueEvent {
    pub fn name(&self) -> &'static str {
        match self {
            QueueEvent::Admitted { .. } => "queue-admitted",
            QueueEvent::StatusChanged { .. } => "upload-status",
            QueueEvent::Removed { .. } => "queue-removed",
        }
    }
}
