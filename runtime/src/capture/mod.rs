//! Interactive page capture through a scriptable browser.
//!
//! Only page 1 and the even pages are rendered: the viewer shows pages as
//! left/right spreads, so the render of an even page also stands in for the
//! odd page that follows it. Renders run in batches, each batch in its own
//! browser session, followed by one serial pass over whatever failed.

pub mod scripts;

use crate::config::CaptureTiming;
use crate::download::write_file;
use crate::error::{Error, Result};
use crate::manifest::{CapturedAsset, Publication};
use crate::progress::{Phase, PhaseCounter, ProgressEventKind, ProgressReporter};
use crate::renderer::{BrowserLauncher, RenderContext, Renderer};
use anyhow::{anyhow, bail};
use futures::stream::{self, StreamExt};
use scripts::{isolate_page_script, IsolationOutcome, REVEAL_SCRIPT};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Pages that need a browser render: page 1 plus every even page.
pub fn select_pages_to_capture(page_count: u32) -> Vec<u32> {
    if page_count == 0 {
        return Vec::new();
    }
    std::iter::once(1)
        .chain((2..=page_count).step_by(2))
        .collect()
}

/// Logical pages satisfied by rendering `page`: an even page also covers
/// its successor when that page exists.
pub fn covered_pages(page: u32, page_count: u32) -> Vec<u32> {
    if page % 2 == 0 && page < page_count {
        vec![page, page + 1]
    } else {
        vec![page]
    }
}

/// File name of the screenshot for a rendered page.
pub fn capture_file_name(page: u32) -> String {
    format!("interactive-{page}.png")
}

/// Knobs for one capture phase.
#[derive(Debug, Clone)]
pub struct CaptureOptions {
    pub concurrency: usize,
    pub batch_size: usize,
    pub output_dir: PathBuf,
    pub timing: CaptureTiming,
}

/// What a capture phase produced.
#[derive(Debug, Clone, Default)]
pub struct CaptureReport {
    /// One entry per logical page, sorted by page.
    pub captured: Vec<CapturedAsset>,
    /// Rendered pages that still failed after the serial pass, sorted.
    pub failed_pages: Vec<u32>,
}

/// Results collected by the workers of one `capture_all` call.
struct CaptureState {
    captured: Mutex<Vec<CapturedAsset>>,
    failed: Mutex<Vec<u32>>,
    counter: PhaseCounter,
}

impl CaptureState {
    fn new(total: u32) -> Self {
        Self {
            captured: Mutex::new(Vec::new()),
            failed: Mutex::new(Vec::new()),
            counter: PhaseCounter::new(Phase::Capture, total),
        }
    }

    fn record_captured(&self, assets: Vec<CapturedAsset>) {
        if let Ok(mut captured) = self.captured.lock() {
            captured.extend(assets);
        }
    }

    fn record_failed(&self, page: u32) {
        if let Ok(mut failed) = self.failed.lock() {
            failed.push(page);
        }
    }

    fn take_failed(&self) -> Vec<u32> {
        self.failed
            .lock()
            .map(|mut failed| std::mem::take(&mut *failed))
            .unwrap_or_default()
    }

    fn into_report(self) -> CaptureReport {
        let mut captured = self.captured.into_inner().unwrap_or_default();
        captured.sort_by_key(|asset| asset.page);
        captured.dedup_by_key(|asset| asset.page);
        let mut failed_pages = self.failed.into_inner().unwrap_or_default();
        failed_pages.sort_unstable();
        failed_pages.dedup();
        CaptureReport {
            captured,
            failed_pages,
        }
    }
}

/// Drives browser sessions to screenshot interactive pages.
pub struct CaptureOrchestrator {
    launcher: Arc<dyn BrowserLauncher>,
    options: CaptureOptions,
}

impl CaptureOrchestrator {
    pub fn new(launcher: Arc<dyn BrowserLauncher>, options: CaptureOptions) -> Self {
        Self { launcher, options }
    }

    /// Render `pages` of `publication`, tolerating per-page failures.
    ///
    /// Fails with [`Error::NoCapturesProduced`] only when nothing at all was
    /// captured.
    pub async fn capture_all(
        &self,
        publication: &Publication,
        pages: &[u32],
        progress: &ProgressReporter,
    ) -> Result<CaptureReport> {
        if pages.is_empty() {
            return Err(Error::NoCapturesProduced {
                failed_pages: Vec::new(),
            });
        }

        tokio::fs::create_dir_all(&self.options.output_dir).await?;

        let started = Instant::now();
        let timing = self.options.timing;
        let batch_size = self.options.batch_size.max(1);
        let batches = pages.len().div_ceil(batch_size);
        let state = CaptureState::new(pages.len() as u32);

        info!(
            pages = pages.len(),
            batches,
            concurrency = self.options.concurrency,
            "capturing interactive pages"
        );
        progress.emit(ProgressEventKind::PhaseStarted {
            phase: Phase::Capture,
            total: pages.len() as u32,
            message: format!(
                "Capturing {} interactive pages in {} batches",
                pages.len(),
                batches
            ),
        });

        for (i, batch) in pages.chunks(batch_size).enumerate() {
            if i > 0 && !timing.batch_pause.is_zero() {
                tokio::time::sleep(timing.batch_pause).await;
            }
            progress.emit(ProgressEventKind::BatchStarted {
                phase: Phase::Capture,
                batch: i as u32 + 1,
                batches: batches as u32,
                size: batch.len() as u32,
            });
            self.capture_batch(publication, batch, &state, progress)
                .await;
        }

        let failed = state.take_failed();
        if !failed.is_empty() && failed.len() < pages.len() {
            self.serial_retry(publication, &failed, &state, progress)
                .await;
        } else {
            for page in failed {
                state.record_failed(page);
            }
        }

        let report = state.into_report();
        let elapsed = started.elapsed();
        progress.emit(ProgressEventKind::PhaseCompleted {
            phase: Phase::Capture,
            message: format!(
                "Captured {} pages, {} failed",
                report.captured.len(),
                report.failed_pages.len()
            ),
            duration_ms: elapsed.as_millis() as u64,
        });

        if report.captured.is_empty() {
            return Err(Error::NoCapturesProduced {
                failed_pages: report.failed_pages,
            });
        }

        if report.failed_pages.is_empty() {
            info!(captured = report.captured.len(), "interactive capture complete");
        } else {
            warn!(
                captured = report.captured.len(),
                failed = ?report.failed_pages,
                "interactive capture finished with failures"
            );
        }

        Ok(report)
    }

    /// One batch: pick up existing screenshots, then render the rest in a
    /// fresh browser session that is torn down before returning.
    async fn capture_batch(
        &self,
        publication: &Publication,
        batch: &[u32],
        state: &CaptureState,
        progress: &ProgressReporter,
    ) {
        let mut pending = Vec::with_capacity(batch.len());
        for &page in batch {
            let path = self.capture_path(page);
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                debug!(page, "screenshot already on disk");
                state.record_captured(self.assets_for(publication, page, &path));
                progress.emit(ProgressEventKind::ItemSkipped {
                    phase: Phase::Capture,
                    key: page,
                });
                state.counter.tick(progress);
            } else {
                pending.push(page);
            }
        }
        if pending.is_empty() {
            return;
        }

        let renderer = match self.launcher.launch().await {
            Ok(renderer) => renderer,
            Err(e) => {
                warn!("failed to start browser session: {e:#}");
                for page in pending {
                    self.report_failure(page, &format!("browser launch failed: {e:#}"), progress);
                    state.record_failed(page);
                    state.counter.tick(progress);
                }
                return;
            }
        };

        let concurrency = self.options.concurrency.max(1);
        let renderer_ref = renderer.as_ref();

        stream::iter(pending.into_iter().enumerate())
            .map(|(slot, page)| {
                self.capture_slot(renderer_ref, publication, page, slot, state, progress)
            })
            .buffer_unordered(concurrency)
            .collect::<Vec<()>>()
            .await;

        let open_tabs = renderer.active_contexts();
        if open_tabs > 0 {
            warn!(open_tabs, "tabs still open at end of batch");
        }
        if let Err(e) = renderer.shutdown().await {
            warn!("browser session did not shut down cleanly: {e:#}");
        }
    }

    /// One worker slot of the concurrent pass. Early slots are staggered so
    /// tabs do not all open at once.
    async fn capture_slot(
        &self,
        renderer: &dyn Renderer,
        publication: &Publication,
        page: u32,
        slot: usize,
        state: &CaptureState,
        progress: &ProgressReporter,
    ) {
        let timing = self.options.timing;
        if slot < self.options.concurrency && !timing.stagger.is_zero() {
            tokio::time::sleep(timing.stagger * slot as u32).await;
        }
        match self
            .capture_page(renderer, publication, page, timing.retry_pause)
            .await
        {
            Ok(assets) => state.record_captured(assets),
            Err(e) => {
                self.report_failure(page, &e.to_string(), progress);
                state.record_failed(page);
            }
        }
        state.counter.tick(progress);
    }

    /// Re-render failed pages one at a time, each in its own session, with
    /// longer pauses.
    async fn serial_retry(
        &self,
        publication: &Publication,
        failed: &[u32],
        state: &CaptureState,
        progress: &ProgressReporter,
    ) {
        let timing = self.options.timing;
        info!(pages = ?failed, "retrying failed pages serially");
        progress.emit(ProgressEventKind::PhaseStarted {
            phase: Phase::CaptureRetry,
            total: failed.len() as u32,
            message: format!("Retrying {} failed pages", failed.len()),
        });
        let counter = PhaseCounter::new(Phase::CaptureRetry, failed.len() as u32);

        for &page in failed {
            if !timing.serial_pause.is_zero() {
                tokio::time::sleep(timing.serial_pause).await;
            }

            let outcome = match self.launcher.launch().await {
                Ok(renderer) => {
                    let result = self
                        .capture_page(
                            renderer.as_ref(),
                            publication,
                            page,
                            timing.serial_retry_pause,
                        )
                        .await;
                    if let Err(e) = renderer.shutdown().await {
                        warn!("browser session did not shut down cleanly: {e:#}");
                    }
                    result
                }
                Err(e) => Err(Error::PageCaptureFailed {
                    page,
                    attempts: 0,
                    cause: format!("browser launch failed: {e:#}"),
                }),
            };

            match outcome {
                Ok(assets) => {
                    info!(page, "page recovered in serial retry");
                    state.record_captured(assets);
                }
                Err(e) => {
                    self.report_failure(page, &e.to_string(), progress);
                    state.record_failed(page);
                }
            }
            counter.tick(progress);
        }
    }

    /// Render one page with the configured number of attempts.
    async fn capture_page(
        &self,
        renderer: &dyn Renderer,
        publication: &Publication,
        page: u32,
        retry_pause: Duration,
    ) -> Result<Vec<CapturedAsset>> {
        let timing = self.options.timing;
        let attempts = timing.attempts.max(1);
        let path = self.capture_path(page);
        let url = publication.page_url(page);
        let mut cause = String::new();

        for attempt in 1..=attempts {
            if attempt > 1 && !retry_pause.is_zero() {
                tokio::time::sleep(retry_pause).await;
            }

            match self.render_once(renderer, &url, page, &path).await {
                Ok(outcome) => {
                    debug!(page, attempt, ?outcome, "page captured");
                    return Ok(self.assets_for(publication, page, &path));
                }
                Err(e) => cause = format!("{e:#}"),
            }
            warn!(page, attempt, attempts, error = %cause, "page capture attempt failed");
        }

        Err(Error::PageCaptureFailed {
            page,
            attempts,
            cause,
        })
    }

    /// A single render in a fresh tab: navigate, reveal, isolate, screenshot.
    ///
    /// The whole attempt is bounded by `attempt_timeout`; the tab is closed
    /// whether or not the render finished in time.
    async fn render_once(
        &self,
        renderer: &dyn Renderer,
        url: &str,
        page: u32,
        path: &Path,
    ) -> anyhow::Result<IsolationOutcome> {
        let limit = self.options.timing.attempt_timeout;
        let deadline = tokio::time::Instant::now() + limit;
        let timed_out = || anyhow!("render timed out after {}ms", limit.as_millis());

        let mut ctx = tokio::time::timeout_at(deadline, renderer.new_context())
            .await
            .map_err(|_| timed_out())??;
        let result = tokio::time::timeout_at(deadline, self.drive(ctx.as_mut(), url, page, path))
            .await
            .unwrap_or_else(|_| Err(timed_out()));

        match tokio::time::timeout(limit, ctx.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(page, "failed to close tab: {e:#}"),
            Err(_) => debug!(page, "tab close timed out"),
        }
        result
    }

    async fn drive(
        &self,
        ctx: &mut dyn RenderContext,
        url: &str,
        page: u32,
        path: &Path,
    ) -> anyhow::Result<IsolationOutcome> {
        let timing = self.options.timing;

        let nav = ctx.navigate(url, timing.attempt_timeout).await?;
        debug!(page, load_time_ms = nav.load_time_ms, "viewer loaded");
        tokio::time::sleep(timing.load_wait).await;

        let revealed = ctx.execute_js(REVEAL_SCRIPT).await?;
        debug!(page, %revealed, "hidden elements revealed");
        tokio::time::sleep(timing.reveal_wait).await;

        let outcome =
            IsolationOutcome::from_value(&ctx.execute_js(&isolate_page_script(page)).await?);
        if outcome == IsolationOutcome::NoPage {
            debug!(page, "no page element isolated, capturing viewer as is");
        }
        tokio::time::sleep(timing.isolate_wait).await;

        let png = ctx.screenshot().await?;
        if png.is_empty() {
            bail!("browser returned an empty screenshot");
        }
        write_file(path, &png).await?;
        Ok(outcome)
    }

    fn capture_path(&self, page: u32) -> PathBuf {
        self.options.output_dir.join(capture_file_name(page))
    }

    fn assets_for(&self, publication: &Publication, page: u32, path: &Path) -> Vec<CapturedAsset> {
        let url = publication.page_url(page);
        covered_pages(page, publication.page_count())
            .into_iter()
            .map(|covered| CapturedAsset {
                page: covered,
                sequence: covered,
                url: url.clone(),
                path: path.to_path_buf(),
            })
            .collect()
    }

    fn report_failure(&self, page: u32, message: &str, progress: &ProgressReporter) {
        progress.emit(ProgressEventKind::PageCaptureFailed {
            page,
            message: message.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{Page, PublicationId};
    use crate::renderer::NavigationResult;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Shared bookkeeping for the fake browser.
    #[derive(Default)]
    struct FakeBrowser {
        launches: AtomicUsize,
        renders: AtomicUsize,
        fail_launch: bool,
        /// Page whose screenshot never completes.
        hang: Option<u32>,
        opened: AtomicUsize,
        closed: AtomicUsize,
        /// Remaining failures per page; `u32::MAX` fails forever.
        failures: Mutex<HashMap<u32, u32>>,
    }

    impl FakeBrowser {
        fn failing(pages: &[(u32, u32)]) -> Self {
            Self {
                failures: Mutex::new(pages.iter().copied().collect()),
                ..Default::default()
            }
        }

        fn should_fail(&self, page: u32) -> bool {
            let mut failures = self.failures.lock().unwrap();
            match failures.get_mut(&page) {
                Some(0) | None => false,
                Some(remaining) => {
                    if *remaining != u32::MAX {
                        *remaining -= 1;
                    }
                    true
                }
            }
        }
    }

    struct FakeLauncher(Arc<FakeBrowser>);

    #[async_trait]
    impl BrowserLauncher for FakeLauncher {
        async fn launch(&self) -> anyhow::Result<Box<dyn Renderer>> {
            self.0.launches.fetch_add(1, Ordering::SeqCst);
            if self.0.fail_launch {
                bail!("no browser");
            }
            Ok(Box::new(FakeRenderer(Arc::clone(&self.0))))
        }
    }

    struct FakeRenderer(Arc<FakeBrowser>);

    #[async_trait]
    impl Renderer for FakeRenderer {
        async fn new_context(&self) -> anyhow::Result<Box<dyn RenderContext>> {
            self.0.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeContext {
                browser: Arc::clone(&self.0),
                page: 0,
            }))
        }
        async fn shutdown(self: Box<Self>) -> anyhow::Result<()> {
            Ok(())
        }
        fn active_contexts(&self) -> usize {
            self.0.opened.load(Ordering::SeqCst) - self.0.closed.load(Ordering::SeqCst)
        }
    }

    struct FakeContext {
        browser: Arc<FakeBrowser>,
        page: u32,
    }

    #[async_trait]
    impl RenderContext for FakeContext {
        async fn navigate(
            &mut self,
            url: &str,
            _timeout: Duration,
        ) -> anyhow::Result<NavigationResult> {
            self.page = url
                .rsplit("#p=")
                .next()
                .and_then(|p| p.parse().ok())
                .unwrap_or(0);
            Ok(NavigationResult {
                final_url: url.to_string(),
                load_time_ms: 1,
            })
        }
        async fn execute_js(&self, _script: &str) -> anyhow::Result<serde_json::Value> {
            Ok(serde_json::json!("spread"))
        }
        async fn screenshot(&self) -> anyhow::Result<Vec<u8>> {
            self.browser.renders.fetch_add(1, Ordering::SeqCst);
            if self.browser.hang == Some(self.page) {
                futures::future::pending::<()>().await;
            }
            if self.browser.should_fail(self.page) {
                bail!("renderer crashed on page {}", self.page);
            }
            Ok(format!("png-{}", self.page).into_bytes())
        }
        async fn close(self: Box<Self>) -> anyhow::Result<()> {
            self.browser.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn publication(page_count: u32) -> Publication {
        Publication {
            id: PublicationId::new("abcde/fg123"),
            url: "https://viewer.test/abcde/fg123/".to_string(),
            title: "Test".to_string(),
            pages: (1..=page_count)
                .map(|number| Page {
                    number,
                    thumbnail_url: String::new(),
                    image_urls: Vec::new(),
                })
                .collect(),
        }
    }

    fn orchestrator(
        browser: &Arc<FakeBrowser>,
        dir: &Path,
        concurrency: usize,
        batch_size: usize,
    ) -> CaptureOrchestrator {
        CaptureOrchestrator::new(
            Arc::new(FakeLauncher(Arc::clone(browser))),
            CaptureOptions {
                concurrency,
                batch_size,
                output_dir: dir.to_path_buf(),
                timing: CaptureTiming::immediate(),
            },
        )
    }

    #[test]
    fn test_select_pages_to_capture() {
        assert_eq!(select_pages_to_capture(7), vec![1, 2, 4, 6]);
        assert_eq!(select_pages_to_capture(8), vec![1, 2, 4, 6, 8]);
        assert_eq!(select_pages_to_capture(1), vec![1]);
        assert_eq!(select_pages_to_capture(2), vec![1, 2]);
        assert!(select_pages_to_capture(0).is_empty());
    }

    #[test]
    fn test_covered_pages() {
        assert_eq!(covered_pages(1, 7), vec![1]);
        assert_eq!(covered_pages(4, 7), vec![4, 5]);
        assert_eq!(covered_pages(6, 7), vec![6, 7]);
        assert_eq!(covered_pages(6, 6), vec![6]);
    }

    #[tokio::test]
    async fn test_spread_render_covers_odd_neighbor() {
        let browser = Arc::new(FakeBrowser::default());
        let dir = TempDir::new().unwrap();
        let report = orchestrator(&browser, dir.path(), 4, 8)
            .capture_all(&publication(7), &[1, 2, 4, 6], &ProgressReporter::disabled())
            .await
            .unwrap();

        let pages: Vec<u32> = report.captured.iter().map(|a| a.page).collect();
        assert_eq!(pages, vec![1, 2, 3, 4, 5, 6, 7]);
        assert!(report.failed_pages.is_empty());

        let path_of = |p: u32| &report.captured[(p - 1) as usize].path;
        assert_eq!(path_of(4), path_of(5));
        assert_eq!(path_of(6), path_of(7));
        assert_ne!(path_of(2), path_of(4));
        assert!(path_of(4).ends_with("interactive-4.png"));
        assert_eq!(std::fs::read(path_of(5)).unwrap(), b"png-4");
        assert_eq!(browser.renders.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_stuck_render_times_out_and_closes_tab() {
        let browser = Arc::new(FakeBrowser {
            hang: Some(4),
            ..Default::default()
        });
        let dir = TempDir::new().unwrap();
        let mut capture = orchestrator(&browser, dir.path(), 4, 8);
        capture.options.timing.attempt_timeout = Duration::from_millis(50);

        let started = Instant::now();
        let report = capture
            .capture_all(&publication(6), &[1, 2, 4, 6], &ProgressReporter::disabled())
            .await
            .unwrap();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(report.failed_pages, vec![4]);
        let pages: Vec<u32> = report.captured.iter().map(|a| a.page).collect();
        assert_eq!(pages, vec![1, 2, 3, 6]);
        assert_eq!(
            browser.opened.load(Ordering::SeqCst),
            browser.closed.load(Ordering::SeqCst)
        );
    }

    #[tokio::test]
    async fn test_one_session_per_batch() {
        let browser = Arc::new(FakeBrowser::default());
        let dir = TempDir::new().unwrap();
        orchestrator(&browser, dir.path(), 2, 2)
            .capture_all(
                &publication(9),
                &select_pages_to_capture(9),
                &ProgressReporter::disabled(),
            )
            .await
            .unwrap();
        // Five pages in batches of two.
        assert_eq!(browser.launches.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_existing_screenshots_skip_the_browser() {
        let browser = Arc::new(FakeBrowser::default());
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("interactive-1.png"), b"old").unwrap();
        std::fs::write(dir.path().join("interactive-2.png"), b"old").unwrap();

        let report = orchestrator(&browser, dir.path(), 2, 8)
            .capture_all(&publication(3), &[1, 2], &ProgressReporter::disabled())
            .await
            .unwrap();

        assert_eq!(report.captured.len(), 3);
        assert_eq!(browser.launches.load(Ordering::SeqCst), 0);
        assert_eq!(
            std::fs::read(dir.path().join("interactive-2.png")).unwrap(),
            b"old"
        );
    }

    #[tokio::test]
    async fn test_serial_pass_recovers_flaky_page() {
        // Page 4 fails both primary attempts, then renders.
        let browser = Arc::new(FakeBrowser::failing(&[(4, 2)]));
        let dir = TempDir::new().unwrap();
        let report = orchestrator(&browser, dir.path(), 4, 8)
            .capture_all(&publication(6), &[1, 2, 4, 6], &ProgressReporter::disabled())
            .await
            .unwrap();

        assert!(report.failed_pages.is_empty());
        let pages: Vec<u32> = report.captured.iter().map(|a| a.page).collect();
        assert_eq!(pages, vec![1, 2, 3, 4, 5, 6]);
        // One batch session plus one serial-retry session.
        assert_eq!(browser.launches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_persistent_failure_is_reported_not_fatal() {
        let browser = Arc::new(FakeBrowser::failing(&[(4, u32::MAX)]));
        let dir = TempDir::new().unwrap();
        let (tx, mut rx) = crate::progress::channel();
        let progress = ProgressReporter::new(Some(tx), "abcde/fg123");

        let report = orchestrator(&browser, dir.path(), 2, 8)
            .capture_all(&publication(6), &[1, 2, 4, 6], &progress)
            .await
            .unwrap();

        assert_eq!(report.failed_pages, vec![4]);
        let pages: Vec<u32> = report.captured.iter().map(|a| a.page).collect();
        assert_eq!(pages, vec![1, 2, 3, 6]);
        assert!(!dir.path().join("interactive-4.png").exists());

        let mut failure_events = 0;
        while let Ok(event) = rx.try_recv() {
            if let ProgressEventKind::PageCaptureFailed { page, .. } = event.event {
                assert_eq!(page, 4);
                failure_events += 1;
            }
        }
        // Primary pass and serial pass.
        assert_eq!(failure_events, 2);
    }

    #[tokio::test]
    async fn test_total_failure_skips_serial_pass() {
        let browser = Arc::new(FakeBrowser::failing(&[
            (1, u32::MAX),
            (2, u32::MAX),
            (4, u32::MAX),
        ]));
        let dir = TempDir::new().unwrap();
        let err = orchestrator(&browser, dir.path(), 2, 8)
            .capture_all(&publication(5), &[1, 2, 4], &ProgressReporter::disabled())
            .await
            .unwrap_err();

        match err {
            Error::NoCapturesProduced { failed_pages } => {
                assert_eq!(failed_pages, vec![1, 2, 4]);
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(browser.launches.load(Ordering::SeqCst), 1);
        // Two attempts per page, no serial pass.
        assert_eq!(browser.renders.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn test_launch_failure_fails_batch_pages() {
        let browser = Arc::new(FakeBrowser {
            fail_launch: true,
            ..Default::default()
        });
        let dir = TempDir::new().unwrap();
        let err = orchestrator(&browser, dir.path(), 2, 8)
            .capture_all(&publication(3), &[1, 2], &ProgressReporter::disabled())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoCapturesProduced { .. }));
    }

    #[tokio::test]
    async fn test_no_pages_requested() {
        let browser = Arc::new(FakeBrowser::default());
        let dir = TempDir::new().unwrap();
        let err = orchestrator(&browser, dir.path(), 2, 8)
            .capture_all(&publication(0), &[], &ProgressReporter::disabled())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoCapturesProduced { .. }));
        assert_eq!(browser.launches.load(Ordering::SeqCst), 0);
    }
}
