//! JSON-lines event output for `--json`

use log::warn;
use parafetch::{DiscoveredSize, DownloadEvent, EventBus};
use serde::Serialize;

/// Serializable form of a [`DownloadEvent`], tagged with the event name
#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventRecord {
    DownloadStart {
        size: DiscoveredSize,
        chunk_count: usize,
    },
    DownloadComplete,
    ChunkDownloadProgress {
        start: u64,
        end: Option<u64>,
        bytes: u64,
    },
    ChunkDownloaded {
        start: u64,
        end: Option<u64>,
    },
    ChunkDownloadFailed {
        start: u64,
        end: Option<u64>,
        error: String,
    },
    DownloadFailed {
        error: String,
    },
}

impl From<&DownloadEvent<'_>> for EventRecord {
    fn from(event: &DownloadEvent<'_>) -> Self {
        match *event {
            DownloadEvent::DownloadStart { size, chunk_count } => {
                EventRecord::DownloadStart { size, chunk_count }
            }
            DownloadEvent::DownloadComplete => EventRecord::DownloadComplete,
            DownloadEvent::ChunkDownloadProgress { start, end, bytes } => {
                EventRecord::ChunkDownloadProgress { start, end, bytes }
            }
            DownloadEvent::ChunkDownloaded { start, end } => EventRecord::ChunkDownloaded { start, end },
            DownloadEvent::ChunkDownloadFailed { start, end, error } => EventRecord::ChunkDownloadFailed {
                start,
                end,
                error: error.to_string(),
            },
            DownloadEvent::DownloadFailed { error } => EventRecord::DownloadFailed {
                error: error.to_string(),
            },
        }
    }
}

/// Print every event on `events` as one JSON object per stdout line
pub fn attach_json_lines(events: &EventBus) {
    events.on_any(|event| match serde_json::to_string(&EventRecord::from(event)) {
        Ok(line) => println!("{line}"),
        Err(e) => warn!("Could not serialize {:?}: {e}", event.kind()),
    });
}
