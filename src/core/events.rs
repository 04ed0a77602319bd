//! Lifecycle notifications for download runs
//!
//! A small publish/subscribe bus keyed by [`EventKind`]. Events are delivered
//! synchronously, in emission order, to every listener registered at the time
//! of emission, in registration order.

use std::sync::{Arc, PoisonError, RwLock};

use crate::core::discovery::DiscoveredSize;
use crate::core::error::Error;

/// Event names a listener can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    DownloadStart,
    DownloadComplete,
    ChunkDownloadProgress,
    ChunkDownloaded,
    ChunkDownloadFailed,
    DownloadFailed,
}

impl EventKind {
    /// Wire name of the event
    pub const fn name(self) -> &'static str {
        match self {
            EventKind::DownloadStart => "DOWNLOAD_START",
            EventKind::DownloadComplete => "DOWNLOAD_COMPLETE",
            EventKind::ChunkDownloadProgress => "CHUNK_DOWNLOAD_PROGRESS",
            EventKind::ChunkDownloaded => "CHUNK_DOWNLOADED",
            EventKind::ChunkDownloadFailed => "CHUNK_DOWNLOAD_FAILED",
            EventKind::DownloadFailed => "DOWNLOAD_FAILED",
        }
    }
}

/// A notification emitted during a download run
///
/// `end` is `None` for whole-file fetches, whose extent is not known up front.
#[derive(Debug)]
pub enum DownloadEvent<'a> {
    /// First event of every run, before any chunk activity
    DownloadStart {
        size: DiscoveredSize,
        chunk_count: usize,
    },
    /// Emitted once, after every chunk completed
    DownloadComplete,
    /// A buffer of body bytes arrived for a chunk
    ChunkDownloadProgress {
        start: u64,
        end: Option<u64>,
        bytes: u64,
    },
    /// A chunk's stream ended cleanly and its bytes are written
    ChunkDownloaded { start: u64, end: Option<u64> },
    /// A chunk failed; the error is propagated right after
    ChunkDownloadFailed {
        start: u64,
        end: Option<u64>,
        error: &'a Error,
    },
    /// The run failed
    DownloadFailed { error: &'a Error },
}

impl DownloadEvent<'_> {
    pub fn kind(&self) -> EventKind {
        match self {
            DownloadEvent::DownloadStart { .. } => EventKind::DownloadStart,
            DownloadEvent::DownloadComplete => EventKind::DownloadComplete,
            DownloadEvent::ChunkDownloadProgress { .. } => EventKind::ChunkDownloadProgress,
            DownloadEvent::ChunkDownloaded { .. } => EventKind::ChunkDownloaded,
            DownloadEvent::ChunkDownloadFailed { .. } => EventKind::ChunkDownloadFailed,
            DownloadEvent::DownloadFailed { .. } => EventKind::DownloadFailed,
        }
    }
}

/// Listener callback type
pub type Listener = Arc<dyn Fn(&DownloadEvent<'_>) + Send + Sync>;

/// Publish/subscribe channel for [`DownloadEvent`]s
#[derive(Default)]
pub struct EventBus {
    listeners: RwLock<Vec<(Option<EventKind>, Listener)>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for one kind of event
    pub fn on<F>(&self, kind: EventKind, listener: F)
    where
        F: Fn(&DownloadEvent<'_>) + Send + Sync + 'static,
    {
        self.register(Some(kind), Arc::new(listener));
    }

    /// Register a callback for every event
    pub fn on_any<F>(&self, listener: F)
    where
        F: Fn(&DownloadEvent<'_>) + Send + Sync + 'static,
    {
        self.register(None, Arc::new(listener));
    }

    fn register(&self, kind: Option<EventKind>, listener: Listener) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((kind, listener));
    }

    /// Deliver an event to all matching listeners
    pub fn emit(&self, event: &DownloadEvent<'_>) {
        let kind = event.kind();

        // Snapshot so listeners may register further listeners without deadlocking
        let targets: Vec<Listener> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(filter, _)| filter.map_or(true, |k| k == kind))
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in targets {
            listener(event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listener_count())
            .finish()
    }
}
