// src/notification.rs
//
// Alert dispatch for accepted evidence captures. Emitted as structured
// events on the `notifications` tracing target so a subscriber layer can
// route them (file, chat webhook, pager) without touching the pipeline.

use crate::pipeline::event::{Event, Severity};
use tracing::{info, warn};

pub fn dispatch(event: &Event, frame_number: u64) {
    match event.severity {
        Severity::Critical => warn!(
            target: "notifications",
            event_type = %event.event_type,
            entity = %event.entity_id,
            frame = frame_number,
            "CRITICAL: {}",
            event.details
        ),
        Severity::Warning | Severity::Info => info!(
            target: "notifications",
            event_type = %event.event_type,
            entity = %event.entity_id,
            severity = event.severity.as_str(),
            frame = frame_number,
            "{}",
            event.details
        ),
    }
}
