// Copyright 2026 flipbook-dl contributors
// SPDX-License-Identifier: Apache-2.0

//! Progress event types and broadcast channel for pipeline telemetry.
//!
//! Phases emit `ProgressEvent`s through a `tokio::sync::broadcast` channel to
//! any subscriber (the CLI progress bars, tests). When no subscriber exists,
//! events are silently dropped. Telemetry never feeds back into control flow.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Instant;

/// A progress event emitted during a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// The run this event belongs to (the publication identifier).
    pub request_id: String,
    /// Monotonically increasing sequence number.
    pub seq: u64,
    /// The kind of progress event.
    pub event: ProgressEventKind,
}

/// The specific kind of progress event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProgressEventKind {
    /// A phase has started with `total` units of work.
    PhaseStarted {
        phase: Phase,
        total: u32,
        message: String,
    },
    /// A phase finished.
    PhaseCompleted {
        phase: Phase,
        message: String,
        duration_ms: u64,
    },
    /// A batch within a phase has started.
    BatchStarted {
        phase: Phase,
        batch: u32,
        batches: u32,
        size: u32,
    },
    /// One unit of work finished (successfully or not).
    ItemCompleted {
        phase: Phase,
        completed: u32,
        total: u32,
        items_per_sec: f64,
    },
    /// A unit of work was satisfied from disk without any network or browser work.
    ItemSkipped { phase: Phase, key: u32 },
    /// A page render failed; it may still succeed in the serial retry pass.
    PageCaptureFailed { page: u32, message: String },
    /// The final document was written.
    ArtifactWritten { path: PathBuf, pages: u32 },
    /// A non-fatal warning occurred.
    Warning { message: String },
}

/// Identifies which pipeline phase is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Manifest,
    Download,
    Capture,
    /// The serial pass over pages that failed during `Capture`.
    CaptureRetry,
    Assemble,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Manifest => write!(f, "Manifest"),
            Self::Download => write!(f, "Download"),
            Self::Capture => write!(f, "Capture"),
            Self::CaptureRetry => write!(f, "Capture retry"),
            Self::Assemble => write!(f, "Assemble"),
        }
    }
}

/// Sender handle for emitting progress events.
pub type ProgressSender = tokio::sync::broadcast::Sender<ProgressEvent>;

/// Receiver handle for consuming progress events.
pub type ProgressReceiver = tokio::sync::broadcast::Receiver<ProgressEvent>;

/// Create a new progress broadcast channel with a bounded buffer.
pub fn channel() -> (ProgressSender, ProgressReceiver) {
    tokio::sync::broadcast::channel(256)
}

/// Per-run emitter shared by reference with every phase's workers.
#[derive(Debug)]
pub struct ProgressReporter {
    tx: Option<ProgressSender>,
    request_id: String,
    seq: AtomicU64,
}

impl ProgressReporter {
    pub fn new(tx: Option<ProgressSender>, request_id: impl Into<String>) -> Self {
        Self {
            tx,
            request_id: request_id.into(),
            seq: AtomicU64::new(0),
        }
    }

    /// A reporter that drops everything.
    pub fn disabled() -> Self {
        Self::new(None, "")
    }

    /// Emit an event, silently ignoring send errors (no receivers).
    pub fn emit(&self, event: ProgressEventKind) {
        if let Some(ref sender) = self.tx {
            let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
            let _ = sender.send(ProgressEvent {
                request_id: self.request_id.clone(),
                seq,
                event,
            });
        }
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.emit(ProgressEventKind::Warning {
            message: message.into(),
        });
    }
}

/// Completion counter for one phase, owned by the phase's orchestrating call.
#[derive(Debug)]
pub struct PhaseCounter {
    phase: Phase,
    total: u32,
    completed: AtomicU32,
    started: Instant,
}

impl PhaseCounter {
    pub fn new(phase: Phase, total: u32) -> Self {
        Self {
            phase,
            total,
            completed: AtomicU32::new(0),
            started: Instant::now(),
        }
    }

    /// Count one finished unit and report the running rate.
    pub fn tick(&self, progress: &ProgressReporter) -> u32 {
        let completed = self.completed.fetch_add(1, Ordering::Relaxed) + 1;
        let elapsed = self.started.elapsed().as_secs_f64();
        let items_per_sec = if elapsed > 0.0 {
            completed as f64 / elapsed
        } else {
            0.0
        };
        progress.emit(ProgressEventKind::ItemCompleted {
            phase: self.phase,
            completed,
            total: self.total,
            items_per_sec,
        });
        completed
    }

    pub fn completed(&self) -> u32 {
        self.completed.load(Ordering::Relaxed)
    }
}
