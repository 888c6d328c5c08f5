// User-triggerable actions over an explicitly owned queue. A front end holds
// one `AppState` and calls these; nothing here is a global.

use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::errors::{
    safe_emit_event, safe_queue_read, safe_queue_update, AppResult, EventSink, SharedQueue,
};
use crate::source::RawHandle;
use crate::uploader::endpoint_client::{EndpointClient, UploadTransport};
use crate::uploader::{self, FileEntry, FileQueue, QueueEvent, QueueSummary, UploadDriver};

const EVENT_CHANNEL_CAPACITY: usize = 256;

pub struct AppState {
    queue: SharedQueue,
    driver: Arc<UploadDriver>,
    events: EventSink,
}

impl AppState {
    /// Wire the queue to the configured endpoint
    pub fn new(config: &Config) -> AppResult<Self> {
        let client = EndpointClient::new(config)?;
        log::info!("Uploads go to {}", client.endpoint());
        Ok(Self::with_transport(
            Arc::new(client),
            config.max_concurrent_uploads,
        ))
    }

    pub fn with_transport(
        transport: Arc<dyn UploadTransport>,
        max_concurrent_uploads: Option<usize>,
    ) -> Self {
        let queue: SharedQueue = Arc::new(Mutex::new(FileQueue::new()));
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let driver = Arc::new(UploadDriver::new(
            transport,
            queue.clone(),
            events.clone(),
            max_concurrent_uploads,
        ));

        Self {
            queue,
            driver,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.events.subscribe()
    }
}

/// Result of handing a batch of files to the queue
#[derive(Debug)]
pub struct AddedFiles {
    pub entries: Vec<FileEntry>,
    pub rejected: Vec<String>,
    /// Upload tasks, one per entry. Dropping them does not cancel anything.
    pub uploads: Vec<JoinHandle<()>>,
}

/// Admit a batch and start one upload per accepted file
///
/// # Panics
///
/// Panics when called outside a Tokio runtime, since each upload is spawned as a task.
pub fn add_files(state: &AppState, raw_files: Vec<RawHandle>) -> AddedFiles {
    let admission = safe_queue_update(&state.queue, "admit", |queue| {
        queue.admit_reporting(raw_files)
    })
    .unwrap_or_default();

    if !admission.rejected.is_empty() {
        log::info!(
            "Rejected {} file(s) that are not text, PDF, CSV or Excel: {}",
            admission.rejected.len(),
            admission.rejected.join(", ")
        );
    }

    if !admission.admitted.is_empty() {
        safe_emit_event(
            &state.events,
            QueueEvent::Admitted {
                ids: admission
                    .admitted
                    .iter()
                    .map(|entry| entry.id().to_string())
                    .collect(),
            },
        );
    }

    let uploads = state.driver.spawn_uploads(admission.admitted.clone());

    AddedFiles {
        entries: admission.admitted,
        rejected: admission.rejected,
        uploads,
    }
}

/// Remove an entry. An in-flight request keeps running; its outcome is discarded.
pub fn remove_file(state: &AppState, id: &str) -> bool {
    let removed = safe_queue_update(&state.queue, "remove", |queue| queue.remove(id))
        .unwrap_or(false);

    if removed {
        log::debug!("Removed entry {}", id);
        safe_emit_event(&state.events, QueueEvent::Removed { id: id.to_string() });
    }
    removed
}

/// Re-send an entry in `error`. Like [`add_files`], this spawns onto the current Tokio runtime.
pub fn retry_upload(state: &AppState, id: &str) -> AppResult<Option<JoinHandle<()>>> {
    uploader::retry_single_upload(&state.driver, id)
}

/// Re-send every entry in `error`. Must be called inside a Tokio runtime.
pub fn retry_failed_uploads(state: &AppState) -> Vec<JoinHandle<()>> {
    uploader::retry_failed_uploads(&state.driver)
}

/// Remove every successfully uploaded entry
pub fn clear_completed(state: &AppState) -> usize {
    let removed_ids = safe_queue_update(&state.queue, "clear completed", |queue| {
        let ids = queue.ids_with_status(uploader::UploadStatus::Success);
        queue.clear_completed();
        ids
    })
    .unwrap_or_default();

    for id in &removed_ids {
        safe_emit_event(&state.events, QueueEvent::Removed { id: id.clone() });
    }
    removed_ids.len()
}

pub fn get_queue(state: &AppState) -> Vec<FileEntry> {
    safe_queue_read(&state.queue, "queue snapshot", |queue| queue.entries().to_vec())
        .unwrap_or_default()
}

pub fn get_entry(state: &AppState, id: &str) -> Option<FileEntry> {
    safe_queue_read(&state.queue, "entry lookup", |queue| queue.get(id).cloned()).flatten()
}

pub fn get_summary(state: &AppState) -> QueueSummary {
    safe_queue_read(&state.queue, "summary", |queue| queue.summary()).unwrap_or(QueueSummary {
        succeeded: 0,
        total: 0,
        percent_complete: None,
    })
}
