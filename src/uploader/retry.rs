use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::errors::{safe_queue_read, AppError, AppResult};

use super::file_queue::UploadStatus;
use super::upload_queue::UploadDriver;

/// Retry a failed upload. Entries that are not in `error` are left alone
/// and `Ok(None)` is returned.
pub fn retry_single_upload(
    driver: &Arc<UploadDriver>,
    id: &str,
) -> AppResult<Option<JoinHandle<()>>> {
    let entry = safe_queue_read(driver.queue(), "retry lookup", |queue| queue.get(id).cloned())
        .flatten()
        .ok_or_else(|| AppError::entry_not_found(id))?;

    if entry.status() != UploadStatus::Error {
        log::debug!(
            "Not retrying {} ({}): status is {}",
            entry.file_name(),
            id,
            entry.status()
        );
        return Ok(None);
    }

    log::info!("Retrying upload of {} ({})", entry.file_name(), id);
    Ok(Some(driver.spawn_upload(entry)))
}

/// Retry every entry currently in `error`
pub fn retry_failed_uploads(driver: &Arc<UploadDriver>) -> Vec<JoinHandle<()>> {
    let failed = safe_queue_read(driver.queue(), "failed lookup", |queue| {
        queue
            .entries()
            .iter()
            .filter(|entry| entry.status() == UploadStatus::Error)
            .cloned()
            .collect::<Vec<_>>()
    })
    .unwrap_or_default();

    if !failed.is_empty() {
        log::info!("Retrying {} failed upload(s)", failed.len());
    }
    driver.spawn_uploads(failed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AppResult;
    use crate::source::InMemoryFile;
    use crate::uploader::endpoint_client::{TransportResponse, UploadPayload, UploadTransport};
    use crate::uploader::file_queue::FileQueue;
    use crate::uploader::upload_queue::wait_for_uploads;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::broadcast;

    /// Fails the first `failures` requests, then succeeds
    struct FlakyTransport {
        failures: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl UploadTransport for FlakyTransport {
        async fn send(&self, _payload: UploadPayload) -> AppResult<TransportResponse> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let (status, status_text) = if call < self.failures {
                (500, "Internal Server Error")
            } else {
                (200, "OK")
            };
            Ok(TransportResponse {
                status,
                status_text: status_text.to_string(),
                body: String::new(),
            })
        }
    }

    fn setup(failures: usize, files: usize) -> (Arc<UploadDriver>, Vec<String>) {
        let mut queue = FileQueue::new();
        let ids = queue
            .admit(
                (0..files)
                    .map(|i| InMemoryFile::new(format!("f{}.txt", i), "", Vec::new()).handle())
                    .collect(),
            )
            .iter()
            .map(|e| e.id().to_string())
            .collect();
        let (events, _) = broadcast::channel(16);
        let transport = Arc::new(FlakyTransport {
            failures,
            calls: AtomicUsize::new(0),
        });
        let driver = UploadDriver::new(transport, Arc::new(Mutex::new(queue)), events, None);
        (Arc::new(driver), ids)
    }

    fn status_of(driver: &UploadDriver, id: &str) -> UploadStatus {
        driver.queue().lock().unwrap().get(id).unwrap().status()
    }

    #[tokio::test]
    async fn test_retry_recovers_failed_entry() {
        let (driver, ids) = setup(1, 1);
        let entry = driver.queue().lock().unwrap().get(&ids[0]).cloned().unwrap();

        driver.upload(&entry).await;
        assert_eq!(status_of(&driver, &ids[0]), UploadStatus::Error);

        let handle = retry_single_upload(&driver, &ids[0]).unwrap().unwrap();
        handle.await.unwrap();

        let queue = driver.queue().lock().unwrap();
        let entry = queue.get(&ids[0]).unwrap();
        assert_eq!(entry.status(), UploadStatus::Success);
        assert_eq!(entry.progress(), 100);
        assert!(entry.error_message().is_none());
    }

    #[tokio::test]
    async fn test_retry_is_safe_to_repeat() {
        let (driver, ids) = setup(2, 1);
        let entry = driver.queue().lock().unwrap().get(&ids[0]).cloned().unwrap();
        driver.upload(&entry).await;

        // Second failure, then success; same entry throughout
        retry_single_upload(&driver, &ids[0]).unwrap().unwrap().await.unwrap();
        assert_eq!(status_of(&driver, &ids[0]), UploadStatus::Error);
        retry_single_upload(&driver, &ids[0]).unwrap().unwrap().await.unwrap();
        assert_eq!(status_of(&driver, &ids[0]), UploadStatus::Success);

        // Nothing left to retry
        assert!(retry_single_upload(&driver, &ids[0]).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_retry_unknown_entry_is_an_error() {
        let (driver, _) = setup(0, 0);
        let err = retry_single_upload(&driver, "missing").unwrap_err();
        assert!(matches!(err, AppError::EntryNotFound { .. }));
    }

    #[tokio::test]
    async fn test_pending_entry_is_not_retried() {
        let (driver, ids) = setup(0, 1);
        assert!(retry_single_upload(&driver, &ids[0]).unwrap().is_none());
        assert_eq!(status_of(&driver, &ids[0]), UploadStatus::Pending);
    }

    #[tokio::test]
    async fn test_retry_failed_uploads_only_touches_errors() {
        let (driver, ids) = setup(2, 3);
        let entries: Vec<_> = driver.queue().lock().unwrap().entries().to_vec();
        for entry in &entries {
            driver.upload(entry).await;
        }
        assert_eq!(status_of(&driver, &ids[2]), UploadStatus::Success);

        let handles = retry_failed_uploads(&driver);
        assert_eq!(handles.len(), 2);
        wait_for_uploads(handles).await;

        assert_eq!(driver.queue().lock().unwrap().summary().succeeded, 3);
    }
}
