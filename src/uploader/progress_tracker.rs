use crate::errors::{safe_emit_event, safe_queue_update, AppError, EventSink, SharedQueue};

use super::file_queue::StatusUpdate;
use super::QueueEvent;

/// Apply a transition and announce it. Returns true only if the entry changed.
fn apply_update(
    queue: &SharedQueue,
    events: &EventSink,
    id: &str,
    update: StatusUpdate,
    operation: &str,
) -> bool {
    let status = update.target();
    let applied = safe_queue_update(queue, operation, |queue| queue.update_status(id, update));

    match applied {
        Some(Ok(true)) => {
            safe_emit_event(
                events,
                QueueEvent::StatusChanged {
                    id: id.to_string(),
                    status,
                },
            );
            true
        }
        Some(Ok(false)) => {
            log::debug!("Entry {} was removed before {}", id, operation);
            false
        }
        Some(Err(e)) => {
            log::warn!("Refused {}: {}", operation, e);
            false
        }
        None => false,
    }
}

/// Move an entry into `uploading`. False means the caller must not send anything.
pub fn update_progress_uploading(queue: &SharedQueue, events: &EventSink, id: &str) -> bool {
    let started = apply_update(queue, events, id, StatusUpdate::Uploading, "upload start");
    if started {
        log::debug!("Progress: Currently uploading {}", id);
    }
    started
}

/// Mark a file upload as successful
pub fn update_progress_success(queue: &SharedQueue, events: &EventSink, id: &str) -> bool {
    let applied = apply_update(queue, events, id, StatusUpdate::Succeeded, "success update");
    if applied {
        log::info!("Progress: Successfully uploaded {}", id);
    }
    applied
}

/// Mark a file upload as failed
pub fn update_progress_failure(
    queue: &SharedQueue,
    events: &EventSink,
    id: &str,
    error: &AppError,
) -> bool {
    let applied = apply_update(
        queue,
        events,
        id,
        StatusUpdate::Failed(error.to_string()),
        "failure update",
    );
    if applied {
        log::warn!(
            "Progress: Failed to upload {} - {} (retryable: {})",
            id,
            error,
            error.is_retryable()
        );
    }
    applied
}
