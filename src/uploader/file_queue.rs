use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::{AppError, AppResult};
use crate::source::RawHandle;
use crate::validation::InputValidator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Pending,
    Uploading,
    Success,
    Error,
}

impl UploadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::Pending => "pending",
            UploadStatus::Uploading => "uploading",
            UploadStatus::Success => "success",
            UploadStatus::Error => "error",
        }
    }

    /// `success` is terminal; every upload passes through `uploading`.
    pub fn can_transition_to(self, next: UploadStatus) -> bool {
        matches!(
            (self, next),
            (UploadStatus::Pending, UploadStatus::Uploading)
                | (UploadStatus::Uploading, UploadStatus::Success)
                | (UploadStatus::Uploading, UploadStatus::Error)
                | (UploadStatus::Error, UploadStatus::Uploading)
        )
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// A requested transition. Progress and error message follow from the variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusUpdate {
    Uploading,
    Succeeded,
    Failed(String),
}

impl StatusUpdate {
    pub fn target(&self) -> UploadStatus {
        match self {
            StatusUpdate::Uploading => UploadStatus::Uploading,
            StatusUpdate::Succeeded => UploadStatus::Success,
            StatusUpdate::Failed(_) => UploadStatus::Error,
        }
    }
}

/// One admitted file and its upload state
#[derive(Debug, Clone, Serialize)]
pub struct FileEntry {
    id: String,
    #[serde(skip)]
    raw_file: RawHandle,
    file_name: String,
    file_size: u64,
    media_type: String,
    status: UploadStatus,
    progress: u8,
    error_message: Option<String>,
    added_at: DateTime<Utc>,
}

impl FileEntry {
    fn admit(raw_file: RawHandle) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            file_name: raw_file.name().to_string(),
            file_size: raw_file.size(),
            media_type: raw_file.media_type().to_string(),
            raw_file,
            status: UploadStatus::Pending,
            progress: 0,
            error_message: None,
            added_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn raw_file(&self) -> &RawHandle {
        &self.raw_file
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn status(&self) -> UploadStatus {
        self.status
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn added_at(&self) -> DateTime<Utc> {
        self.added_at
    }

    fn apply(&mut self, update: StatusUpdate) -> AppResult<()> {
        let target = update.target();
        if !self.status.can_transition_to(target) {
            return Err(AppError::InvalidTransition {
                id: self.id.clone(),
                from: self.status,
                to: target,
            });
        }

        self.status = target;
        match update {
            StatusUpdate::Uploading => {
                self.progress = 0;
                self.error_message = None;
            }
            StatusUpdate::Succeeded => {
                self.progress = 100;
                self.error_message = None;
            }
            StatusUpdate::Failed(message) => {
                self.progress = 0;
                self.error_message = Some(message);
            }
        }
        Ok(())
    }
}

/// Outcome of an admission, including the names that failed validation
#[derive(Debug, Clone, Default)]
pub struct Admission {
    pub admitted: Vec<FileEntry>,
    pub rejected: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueSummary {
    pub succeeded: usize,
    pub total: usize,
    /// `None` for an empty queue
    pub percent_complete: Option<u8>,
}

/// Ordered collection of admitted files
#[derive(Debug, Default)]
pub struct FileQueue {
    entries: Vec<FileEntry>,
}

impl FileQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and enqueue handles, returning only the new entries.
    /// Rejected handles are dropped without an entry.
    pub fn admit(&mut self, raw_files: Vec<RawHandle>) -> Vec<FileEntry> {
        self.admit_reporting(raw_files).admitted
    }

    pub fn admit_reporting(&mut self, raw_files: Vec<RawHandle>) -> Admission {
        let mut admission = Admission::default();

        for raw_file in raw_files {
            if let Err(e) = InputValidator::validate_file(raw_file.as_ref()) {
                log::info!("{}", e);
                admission.rejected.push(raw_file.name().to_string());
                continue;
            }

            let entry = FileEntry::admit(raw_file);
            log::debug!("Admitted {} as {}", entry.file_name, entry.id);
            self.entries.push(entry.clone());
            admission.admitted.push(entry);
        }

        admission
    }

    /// Returns whether an entry was removed. Unknown ids are ignored.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.id != id);
        before != self.entries.len()
    }

    /// Apply a transition. `Ok(false)` means the id is no longer queued,
    /// which happens when a response arrives after removal.
    pub fn update_status(&mut self, id: &str, update: StatusUpdate) -> AppResult<bool> {
        match self.entries.iter_mut().find(|entry| entry.id == id) {
            Some(entry) => entry.apply(update).map(|_| true),
            None => {
                log::debug!("Ignoring status update for removed entry {}", id);
                Ok(false)
            }
        }
    }

    pub fn summary(&self) -> QueueSummary {
        let total = self.entries.len();
        let succeeded = self
            .entries
            .iter()
            .filter(|entry| entry.status == UploadStatus::Success)
            .count();
        let percent_complete = if total > 0 {
            Some(((succeeded as f64 / total as f64) * 100.0).round() as u8)
        } else {
            None
        };

        QueueSummary {
            succeeded,
            total,
            percent_complete,
        }
    }

    pub fn get(&self, id: &str) -> Option<&FileEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    pub fn entries(&self) -> &[FileEntry] {
        &self.entries
    }

    pub fn ids_with_status(&self, status: UploadStatus) -> Vec<String> {
        self.entries
            .iter()
            .filter(|entry| entry.status == status)
            .map(|entry| entry.id.clone())
            .collect()
    }

    /// Drop every successfully uploaded entry
    pub fn clear_completed(&mut self) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|entry| entry.status != UploadStatus::Success);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::InMemoryFile;
    use std::collections::HashSet;

    fn handle(name: &str, media_type: &str) -> RawHandle {
        InMemoryFile::new(name, media_type, b"content".to_vec()).handle()
    }

    fn assert_invariants(queue: &FileQueue) {
        for entry in queue.entries() {
            assert_eq!(
                entry.status() == UploadStatus::Success,
                entry.progress() == 100,
                "progress/status mismatch for {}",
                entry.file_name()
            );
            assert_eq!(
                entry.status() == UploadStatus::Error,
                entry.error_message().is_some(),
                "error message/status mismatch for {}",
                entry.file_name()
            );
        }
        let summary = queue.summary();
        assert_eq!(summary.total, queue.len());
        assert_eq!(
            summary.succeeded,
            queue.ids_with_status(UploadStatus::Success).len()
        );
    }

    #[test]
    fn test_admit_csv_and_exe_keeps_only_csv() {
        let mut queue = FileQueue::new();
        let admitted = queue.admit(vec![
            handle("figures.csv", "text/csv"),
            handle("setup.exe", "application/x-msdownload"),
        ]);

        assert_eq!(admitted.len(), 1);
        assert_eq!(admitted[0].file_name(), "figures.csv");
        assert_eq!(admitted[0].status(), UploadStatus::Pending);
        assert_eq!(queue.summary().total, 1);
        assert_invariants(&queue);
    }

    #[test]
    fn test_admit_preserves_input_order_and_unique_ids() {
        let mut queue = FileQueue::new();
        queue.admit(vec![handle("a.txt", ""), handle("b.pdf", "")]);
        queue.admit(vec![handle("c.csv", ""), handle("a.txt", "")]);

        let names: Vec<_> = queue.entries().iter().map(|e| e.file_name()).collect();
        assert_eq!(names, vec!["a.txt", "b.pdf", "c.csv", "a.txt"]);

        let ids: HashSet<_> = queue.entries().iter().map(|e| e.id()).collect();
        assert_eq!(ids.len(), 4);
    }

    #[test]
    fn test_admit_reporting_lists_rejected_names() {
        let mut queue = FileQueue::new();
        let admission = queue.admit_reporting(vec![
            handle("virus.exe", ""),
            handle("notes.txt", ""),
            handle("image.png", "image/png"),
        ]);

        assert_eq!(admission.admitted.len(), 1);
        assert_eq!(admission.rejected, vec!["virus.exe", "image.png"]);
    }

    #[test]
    fn test_full_lifecycle_with_retry() {
        let mut queue = FileQueue::new();
        let id = queue.admit(vec![handle("report.pdf", "application/pdf")])[0]
            .id()
            .to_string();

        assert!(queue.update_status(&id, StatusUpdate::Uploading).unwrap());
        assert_eq!(queue.get(&id).unwrap().progress(), 0);
        assert_invariants(&queue);

        queue
            .update_status(&id, StatusUpdate::Failed("Upload failed: 500".into()))
            .unwrap();
        let entry = queue.get(&id).unwrap();
        assert_eq!(entry.status(), UploadStatus::Error);
        assert_eq!(entry.error_message(), Some("Upload failed: 500"));
        assert_invariants(&queue);

        queue.update_status(&id, StatusUpdate::Uploading).unwrap();
        queue.update_status(&id, StatusUpdate::Succeeded).unwrap();
        let entry = queue.get(&id).unwrap();
        assert_eq!(entry.status(), UploadStatus::Success);
        assert_eq!(entry.progress(), 100);
        assert_eq!(entry.error_message(), None);
        assert_invariants(&queue);
    }

    #[test]
    fn test_illegal_transitions_are_refused() {
        let mut queue = FileQueue::new();
        let id = queue.admit(vec![handle("a.txt", "")])[0].id().to_string();

        // pending cannot skip uploading
        assert!(queue.update_status(&id, StatusUpdate::Succeeded).is_err());
        assert!(queue
            .update_status(&id, StatusUpdate::Failed("x".into()))
            .is_err());
        assert_eq!(queue.get(&id).unwrap().status(), UploadStatus::Pending);

        queue.update_status(&id, StatusUpdate::Uploading).unwrap();
        // no re-entry while in flight
        assert!(queue.update_status(&id, StatusUpdate::Uploading).is_err());
        queue.update_status(&id, StatusUpdate::Succeeded).unwrap();

        // success is terminal
        let err = queue
            .update_status(&id, StatusUpdate::Uploading)
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::InvalidTransition {
                from: UploadStatus::Success,
                to: UploadStatus::Uploading,
                ..
            }
        ));
        assert_eq!(queue.get(&id).unwrap().progress(), 100);
    }

    #[test]
    fn test_remove_is_idempotent_and_late_update_is_ignored() {
        let mut queue = FileQueue::new();
        let id = queue.admit(vec![handle("a.csv", "")])[0].id().to_string();
        queue.update_status(&id, StatusUpdate::Uploading).unwrap();

        assert!(queue.remove(&id));
        assert!(!queue.remove(&id));

        assert!(!queue.update_status(&id, StatusUpdate::Succeeded).unwrap());
        assert!(queue.get(&id).is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_summary_two_of_three() {
        let mut queue = FileQueue::new();
        let ids: Vec<String> = queue
            .admit(vec![
                handle("a.txt", ""),
                handle("b.txt", ""),
                handle("c.txt", ""),
            ])
            .iter()
            .map(|e| e.id().to_string())
            .collect();

        for id in &ids {
            queue.update_status(id, StatusUpdate::Uploading).unwrap();
        }
        queue.update_status(&ids[0], StatusUpdate::Succeeded).unwrap();
        queue
            .update_status(&ids[1], StatusUpdate::Failed("boom".into()))
            .unwrap();
        queue.update_status(&ids[2], StatusUpdate::Succeeded).unwrap();

        assert_eq!(
            queue.summary(),
            QueueSummary {
                succeeded: 2,
                total: 3,
                percent_complete: Some(67),
            }
        );
        assert_invariants(&queue);
    }

    #[test]
    fn test_summary_of_empty_queue_has_no_percentage() {
        let summary = FileQueue::new().summary();
        assert_eq!(summary.total, 0);
        assert_eq!(summary.percent_complete, None);
    }

    #[test]
    fn test_clear_completed_keeps_order_of_the_rest() {
        let mut queue = FileQueue::new();
        let ids: Vec<String> = queue
            .admit(vec![
                handle("a.txt", ""),
                handle("b.txt", ""),
                handle("c.txt", ""),
            ])
            .iter()
            .map(|e| e.id().to_string())
            .collect();
        queue.update_status(&ids[1], StatusUpdate::Uploading).unwrap();
        queue.update_status(&ids[1], StatusUpdate::Succeeded).unwrap();

        assert_eq!(queue.clear_completed(), 1);
        let names: Vec<_> = queue.entries().iter().map(|e| e.file_name()).collect();
        assert_eq!(names, vec!["a.txt", "c.txt"]);
    }

    #[test]
    fn test_entry_serializes_without_raw_handle() {
        let mut queue = FileQueue::new();
        let entry = queue.admit(vec![handle("a.txt", "text/plain")]).remove(0);
        let json = serde_json::to_value(&entry).unwrap();

        assert_eq!(json["status"], "pending");
        assert_eq!(json["file_name"], "a.txt");
        assert_eq!(json["progress"], 0);
        assert!(json.get("raw_file").is_none());
    }
}
