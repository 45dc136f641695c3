//! Terminal progress bars fed by the pipeline's progress channel.

use crate::progress::{Phase, ProgressEventKind, ProgressReceiver};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

const TEMPLATE: &str = "{prefix:>14.bold} [{bar:32.cyan/blue}] {pos}/{len} {msg}";

/// Render events from `rx` until the sending side goes away.
pub fn spawn(mut rx: ProgressReceiver) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut display = Display::new();
        loop {
            match rx.recv().await {
                Ok(event) => display.handle(event.event),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
        display.finish();
    })
}

struct Display {
    multi: MultiProgress,
    bars: HashMap<Phase, ProgressBar>,
    style: ProgressStyle,
}

impl Display {
    fn new() -> Self {
        let style = ProgressStyle::with_template(TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        Self {
            multi: MultiProgress::new(),
            bars: HashMap::new(),
            style,
        }
    }

    fn handle(&mut self, event: ProgressEventKind) {
        match event {
            ProgressEventKind::PhaseStarted {
                phase,
                total,
                message,
            } => {
                let bar = self.multi.add(ProgressBar::new(total as u64));
                bar.set_style(self.style.clone());
                bar.set_prefix(phase.to_string());
                bar.set_message(message);
                if let Some(previous) = self.bars.insert(phase, bar) {
                    previous.finish_and_clear();
                }
            }
            ProgressEventKind::BatchStarted {
                phase,
                batch,
                batches,
                ..
            } => {
                if let Some(bar) = self.bars.get(&phase) {
                    bar.set_message(format!("batch {batch}/{batches}"));
                }
            }
            ProgressEventKind::ItemCompleted {
                phase,
                completed,
                items_per_sec,
                ..
            } => {
                if let Some(bar) = self.bars.get(&phase) {
                    bar.set_position(completed as u64);
                    bar.set_message(format!("{items_per_sec:.1}/s"));
                }
            }
            ProgressEventKind::PhaseCompleted { phase, message, .. } => {
                if let Some(bar) = self.bars.get(&phase) {
                    bar.set_position(bar.length().unwrap_or(0));
                    bar.finish_with_message(message);
                }
            }
            ProgressEventKind::PageCaptureFailed { page, message } => {
                let _ = self
                    .multi
                    .println(format!("  ! page {page} not captured: {message}"));
            }
            ProgressEventKind::Warning { message } => {
                let _ = self.multi.println(format!("  ! {message}"));
            }
            ProgressEventKind::ItemSkipped { .. } | ProgressEventKind::ArtifactWritten { .. } => {}
        }
    }

    fn finish(self) {
        for bar in self.bars.values() {
            if !bar.is_finished() {
                bar.abandon();
            }
        }
    }
}
