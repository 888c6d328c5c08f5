use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::errors::{AppError, EventSink, SharedQueue};

use super::endpoint_client::{UploadPayload, UploadTransport};
use super::file_queue::FileEntry;
use super::progress_tracker::{
    update_progress_failure, update_progress_success, update_progress_uploading,
};

/// Performs one request per entry and writes the outcome back into the queue
pub struct UploadDriver {
    transport: Arc<dyn UploadTransport>,
    queue: SharedQueue,
    events: EventSink,
    limiter: Option<Arc<Semaphore>>,
}

impl UploadDriver {
    /// `max_concurrent` of `None` leaves uploads uncapped.
    pub fn new(
        transport: Arc<dyn UploadTransport>,
        queue: SharedQueue,
        events: EventSink,
        max_concurrent: Option<usize>,
    ) -> Self {
        Self {
            transport,
            queue,
            events,
            limiter: max_concurrent.map(|permits| Arc::new(Semaphore::new(permits.max(1)))),
        }
    }

    /// Upload one entry. Every outcome is recorded on the queue; nothing is returned.
    pub async fn upload(&self, entry: &FileEntry) {
        let _permit = match &self.limiter {
            Some(limiter) => match limiter.clone().acquire_owned().await {
                Ok(permit) => Some(permit),
                Err(e) => {
                    log::error!("Upload limiter closed: {}", e);
                    return;
                }
            },
            None => None,
        };

        let id = entry.id();
        if !update_progress_uploading(&self.queue, &self.events, id) {
            return;
        }

        log::info!("Uploading {} ({})", entry.file_name(), id);

        let result = match UploadPayload::from_file(entry.raw_file().as_ref()).await {
            Ok(payload) => self.transport.send(payload).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(response) if response.is_success() => {
                log::debug!(
                    "Upload of {} accepted with {} ({} byte response)",
                    entry.file_name(),
                    response.status,
                    response.body.len()
                );
                update_progress_success(&self.queue, &self.events, id);
            }
            Ok(response) => {
                let error = AppError::http_status(response.status, &response.status_text);
                update_progress_failure(&self.queue, &self.events, id, &error);
            }
            Err(e) => {
                let error = match e {
                    AppError::Transport { message } => AppError::transport(message),
                    other => AppError::transport(other),
                };
                update_progress_failure(&self.queue, &self.events, id, &error);
            }
        }
    }

    /// Start an upload as an independent task
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn spawn_upload(self: &Arc<Self>, entry: FileEntry) -> JoinHandle<()> {
        let driver = Arc::clone(self);
        tokio::spawn(async move {
            driver.upload(&entry).await;
        })
    }

    /// One task per entry, no batching. Must run inside a Tokio runtime, like
    /// [`UploadDriver::spawn_upload`].
    pub fn spawn_uploads(self: &Arc<Self>, entries: Vec<FileEntry>) -> Vec<JoinHandle<()>> {
        entries
            .into_iter()
            .map(|entry| self.spawn_upload(entry))
            .collect()
    }

    pub fn queue(&self) -> &SharedQueue {
        &self.queue
    }
}

/// Wait for spawned uploads to settle
pub async fn wait_for_uploads(handles: Vec<JoinHandle<()>>) {
    for handle in handles {
        if let Err(e) = handle.await {
            log::error!("Upload task ended abnormally: {}", e);
        }
    }
}
