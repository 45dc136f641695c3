//! End-to-end run: resolve the manifest, download images, optionally capture
//! interactive pages, and write the PDF.
//!
//! Data only flows forward. Each phase owns its own worker state and hands
//! plain records to the next one.

use crate::acquisition::http_client::HttpClient;
use crate::assemble::{self, DocumentEncoder, PdfEncoder};
use crate::capture::{select_pages_to_capture, CaptureOptions, CaptureOrchestrator};
use crate::config::PipelineConfig;
use crate::download::{AssetDownloader, DownloadOptions};
use crate::error::{Error, Result};
use crate::manifest::{resolve_identifier, ManifestResolver, Publication};
use crate::progress::{Phase, ProgressEventKind, ProgressReporter, ProgressSender};
use crate::renderer::chromium::ChromiumLauncher;
use crate::renderer::BrowserLauncher;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Characters that may not appear in the artifact file name.
const FORBIDDEN_FILENAME_CHARS: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// How a run ended.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PipelineOutcome {
    /// A new PDF was written.
    Written(RunSummary),
    /// The PDF already existed and overwriting was not requested.
    Skipped { id: String, path: PathBuf },
}

/// What a successful run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub id: String,
    pub title: String,
    pub path: PathBuf,
    /// Pages in the written document.
    pub pages: u32,
    pub images: u32,
    /// Logical pages replaced by interactive captures.
    pub captured_pages: u32,
    /// Rendered pages that still failed; their downloaded images were used.
    pub failed_captures: Vec<u32>,
    pub timings: PhaseTimings,
}

/// Wall-clock time per phase, in milliseconds.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PhaseTimings {
    pub manifest_ms: u64,
    pub download_ms: u64,
    pub capture_ms: Option<u64>,
    pub assemble_ms: u64,
    pub total_ms: u64,
}

/// One configured downloader run.
pub struct Pipeline {
    config: PipelineConfig,
    client: HttpClient,
    launcher: Option<Arc<dyn BrowserLauncher>>,
    encoder: Arc<dyn DocumentEncoder>,
    progress: Option<ProgressSender>,
}

impl Pipeline {
    /// Validate `config` and build the shared HTTP client.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let config = config.validate()?;
        let client = HttpClient::new(config.request_timeout).map_err(|e| Error::InvalidConfig {
            key: "request_timeout".to_string(),
            message: format!("{e:#}"),
        })?;
        Ok(Self {
            config,
            client,
            launcher: None,
            encoder: Arc::new(PdfEncoder),
            progress: None,
        })
    }

    /// Use `launcher` instead of discovering a local Chromium.
    pub fn with_launcher(mut self, launcher: Arc<dyn BrowserLauncher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    pub fn with_encoder(mut self, encoder: Arc<dyn DocumentEncoder>) -> Self {
        self.encoder = encoder;
        self
    }

    /// Publish progress events on `tx`.
    pub fn with_progress(mut self, tx: ProgressSender) -> Self {
        self.progress = Some(tx);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Download `input` (an identifier or viewer URL) into a PDF.
    pub async fn run(&self, input: &str) -> Result<PipelineOutcome> {
        let started = Instant::now();
        let id = resolve_identifier(input)?;
        let progress = ProgressReporter::new(self.progress.clone(), id.as_str());
        let mut timings = PhaseTimings::default();

        let launcher = if self.config.interactive {
            Some(self.launcher()?)
        } else {
            None
        };

        // ── Manifest ──
        let phase_start = Instant::now();
        progress.emit(ProgressEventKind::PhaseStarted {
            phase: Phase::Manifest,
            total: 1,
            message: format!("Resolving {id}"),
        });
        let resolver = ManifestResolver::new(self.client.clone(), &self.config.viewer_base_url);
        let publication = resolver.fetch_manifest(&id).await?;
        timings.manifest_ms = elapsed_ms(phase_start);
        progress.emit(ProgressEventKind::PhaseCompleted {
            phase: Phase::Manifest,
            message: format!(
                "\"{}\": {} pages",
                publication.title,
                publication.page_count()
            ),
            duration_ms: timings.manifest_ms,
        });

        let output = artifact_path(&self.config.output_dir, &publication);
        if !self.config.force && output.exists() {
            info!(path = %output.display(), "already downloaded, skipping");
            return Ok(PipelineOutcome::Skipped {
                id: id.to_string(),
                path: output,
            });
        }

        tokio::fs::create_dir_all(&self.config.output_dir).await?;
        let image_dir = self.config.image_dir(&id.as_slug());
        tokio::fs::create_dir_all(&image_dir).await?;

        // ── Download ──
        let descriptors = self.capped_descriptors(&publication, &progress);
        let phase_start = Instant::now();
        let downloader = AssetDownloader::new(
            self.client.clone(),
            DownloadOptions {
                concurrency: self.config.concurrency,
                batch_size: self.config.download_batch_size,
                output_dir: image_dir,
                retry: self.config.retry,
            },
        );
        let downloaded = downloader.download_all(&descriptors, &progress).await?;
        timings.download_ms = elapsed_ms(phase_start);

        // ── Capture ──
        let mut captured = Vec::new();
        let mut failed_captures = Vec::new();
        if let Some(launcher) = launcher {
            let pages = select_pages_to_capture(publication.page_count());
            if pages.is_empty() {
                warn!("publication has no pages, skipping interactive capture");
            } else {
                let phase_start = Instant::now();
                let orchestrator = CaptureOrchestrator::new(
                    launcher,
                    CaptureOptions {
                        concurrency: self.config.capture_concurrency,
                        batch_size: self.config.capture_batch_size,
                        output_dir: self.config.capture_dir(&id.as_slug()),
                        timing: self.config.capture_timing,
                    },
                );
                let report = orchestrator
                    .capture_all(&publication, &pages, &progress)
                    .await?;
                timings.capture_ms = Some(elapsed_ms(phase_start));
                if !report.failed_pages.is_empty() {
                    progress.warn(format!(
                        "{} pages could not be captured, using downloaded images: {:?}",
                        report.failed_pages.len(),
                        report.failed_pages
                    ));
                }
                captured = report.captured;
                failed_captures = report.failed_pages;
            }
        }

        // ── Assemble ──
        let phase_start = Instant::now();
        let paths = assemble::assemble(&downloaded, &captured);
        progress.emit(ProgressEventKind::PhaseStarted {
            phase: Phase::Assemble,
            total: paths.len() as u32,
            message: format!("Writing {} pages", paths.len()),
        });
        let page_total = paths.len() as u32;
        self.encode(paths, output.clone()).await?;
        timings.assemble_ms = elapsed_ms(phase_start);
        timings.total_ms = elapsed_ms(started);

        progress.emit(ProgressEventKind::PhaseCompleted {
            phase: Phase::Assemble,
            message: format!("Wrote {}", output.display()),
            duration_ms: timings.assemble_ms,
        });
        progress.emit(ProgressEventKind::ArtifactWritten {
            path: output.clone(),
            pages: page_total,
        });

        info!(
            path = %output.display(),
            pages = page_total,
            manifest = %format_duration(Duration::from_millis(timings.manifest_ms)),
            download = %format_duration(Duration::from_millis(timings.download_ms)),
            capture = %format_duration(Duration::from_millis(timings.capture_ms.unwrap_or(0))),
            assemble = %format_duration(Duration::from_millis(timings.assemble_ms)),
            total = %format_duration(Duration::from_millis(timings.total_ms)),
            "PDF written"
        );

        Ok(PipelineOutcome::Written(RunSummary {
            id: id.to_string(),
            title: publication.title.clone(),
            path: output,
            pages: page_total,
            images: downloaded.len() as u32,
            captured_pages: captured.len() as u32,
            failed_captures,
            timings,
        }))
    }

    fn launcher(&self) -> Result<Arc<dyn BrowserLauncher>> {
        if let Some(launcher) = &self.launcher {
            return Ok(Arc::clone(launcher));
        }
        let launcher = ChromiumLauncher::discover(self.config.chromium_path.as_deref())?;
        info!(browser = %launcher.executable().display(), "using browser");
        Ok(Arc::new(launcher))
    }

    /// Flattened descriptors, truncated to `max_images` if configured.
    fn capped_descriptors(
        &self,
        publication: &Publication,
        progress: &ProgressReporter,
    ) -> Vec<crate::manifest::ImageDescriptor> {
        let mut descriptors = publication.image_descriptors();
        if let Some(max) = self.config.max_images {
            if descriptors.len() > max {
                let message = format!(
                    "publication lists {} images, only the first {max} will be downloaded",
                    descriptors.len()
                );
                warn!("{message}");
                progress.warn(message);
                descriptors.truncate(max);
            }
        }
        descriptors
    }

    async fn encode(&self, paths: Vec<PathBuf>, output: PathBuf) -> Result<()> {
        let encoder = Arc::clone(&self.encoder);
        let overwrite = self.config.force;
        let target = output.clone();
        tokio::task::spawn_blocking(move || {
            assemble::encode(&paths, &target, overwrite, encoder.as_ref())
        })
        .await
        .map_err(|e| Error::EncodingFailed {
            path: output,
            reason: format!("encoder task failed: {e}"),
        })?
    }
}

/// Strip characters that are not allowed in file names.
pub fn sanitize_filename(title: &str) -> String {
    title
        .chars()
        .filter(|c| !FORBIDDEN_FILENAME_CHARS.contains(c))
        .collect::<String>()
        .trim()
        .to_string()
}

/// `{output_dir}/{title}.pdf`, falling back to the identifier slug when the
/// title sanitizes to nothing.
pub fn artifact_path(output_dir: &Path, publication: &Publication) -> PathBuf {
    let mut name = sanitize_filename(&publication.title);
    if name.is_empty() {
        name = publication.id.as_slug();
    }
    output_dir.join(format!("{name}.pdf"))
}

/// `HH:MM:SS`.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CaptureTiming, RetryPolicy};
    use crate::manifest::{Page, PublicationId};
    use crate::renderer::{NavigationResult, RenderContext, Renderer};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Default)]
    struct RecordingEncoder {
        calls: Mutex<Vec<Vec<PathBuf>>>,
    }

    impl DocumentEncoder for RecordingEncoder {
        fn encode(&self, images: &[PathBuf], output: &Path) -> Result<()> {
            self.calls.lock().unwrap().push(images.to_vec());
            std::fs::write(output, b"%PDF-1.5")?;
            Ok(())
        }
    }

    struct StaticLauncher;

    #[async_trait]
    impl BrowserLauncher for StaticLauncher {
        async fn launch(&self) -> anyhow::Result<Box<dyn Renderer>> {
            Ok(Box::new(StaticRenderer))
        }
    }

    struct StaticRenderer;

    #[async_trait]
    impl Renderer for StaticRenderer {
        async fn new_context(&self) -> anyhow::Result<Box<dyn RenderContext>> {
            Ok(Box::new(StaticContext))
        }
        async fn shutdown(self: Box<Self>) -> anyhow::Result<()> {
            Ok(())
        }
        fn active_contexts(&self) -> usize {
            0
        }
    }

    struct StaticContext;

    #[async_trait]
    impl RenderContext for StaticContext {
        async fn navigate(
            &mut self,
            url: &str,
            _timeout: Duration,
        ) -> anyhow::Result<NavigationResult> {
            Ok(NavigationResult {
                final_url: url.to_string(),
                load_time_ms: 0,
            })
        }
        async fn execute_js(&self, _script: &str) -> anyhow::Result<serde_json::Value> {
            Ok(serde_json::json!("single-page"))
        }
        async fn screenshot(&self) -> anyhow::Result<Vec<u8>> {
            Ok(b"png".to_vec())
        }
        async fn close(self: Box<Self>) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn publication(title: &str) -> Publication {
        Publication {
            id: PublicationId::new("abcde/fg123"),
            url: "https://viewer.test/abcde/fg123/".to_string(),
            title: title.to_string(),
            pages: vec![Page {
                number: 1,
                thumbnail_url: String::new(),
                image_urls: vec!["https://viewer.test/1.jpg".to_string()],
            }],
        }
    }

    async fn mock_viewer(pages: usize) -> MockServer {
        let server = MockServer::start().await;
        let entries: Vec<String> = (1..=pages)
            .map(|n| format!(r#"{{"n":["{n}.jpg"],"t":"./files/thumb/{n}.jpg"}}"#))
            .collect();
        let body = format!(
            r#"var htmlConfig = {{"meta":{{"title":"My Book: Vol 1"}},"fliphtml5_pages":[{}]}};"#,
            entries.join(",")
        );
        Mock::given(method("GET"))
            .and(path("/abcde/fg123/javascript/config.js"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/abcde/fg123/files/large/\d+\.jpg$"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"jpeg".to_vec()))
            .mount(&server)
            .await;
        server
    }

    fn config(server: &MockServer, dir: &Path) -> PipelineConfig {
        PipelineConfig {
            viewer_base_url: server.uri(),
            concurrency: 2,
            download_batch_size: 2,
            output_dir: dir.join("out"),
            image_output_dir: Some(dir.join("images")),
            retry: RetryPolicy::immediate(1),
            capture_timing: CaptureTiming::immediate(),
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("A/B: C*D?"), "AB CD");
        assert_eq!(sanitize_filename(r#"<"x"|\y>"#), "xy");
        assert_eq!(sanitize_filename("  padded  "), "padded");
    }

    #[test]
    fn test_artifact_path_falls_back_to_slug() {
        let dir = Path::new("/out");
        assert_eq!(
            artifact_path(dir, &publication("Annual Report")),
            PathBuf::from("/out/Annual Report.pdf")
        );
        assert_eq!(
            artifact_path(dir, &publication("???")),
            PathBuf::from("/out/abcde-fg123.pdf")
        );
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(0)), "00:00:00");
        assert_eq!(format_duration(Duration::from_secs(3_725)), "01:02:05");
        assert_eq!(format_duration(Duration::from_millis(59_999)), "00:00:59");
    }

    #[tokio::test]
    async fn test_existing_artifact_skips_all_downloads() {
        let server = mock_viewer(2).await;
        let dir = TempDir::new().unwrap();
        let cfg = config(&server, dir.path());
        std::fs::create_dir_all(&cfg.output_dir).unwrap();
        std::fs::write(cfg.output_dir.join("My Book Vol 1.pdf"), b"%PDF").unwrap();

        let encoder = Arc::new(RecordingEncoder::default());
        let outcome = Pipeline::new(cfg)
            .unwrap()
            .with_encoder(encoder.clone())
            .run("abcde/fg123")
            .await
            .unwrap();

        assert!(matches!(outcome, PipelineOutcome::Skipped { .. }));
        assert!(encoder.calls.lock().unwrap().is_empty());
        assert!(!dir.path().join("images").exists());
    }

    #[tokio::test]
    async fn test_image_cap_truncates_and_warns() {
        let server = mock_viewer(5).await;
        let dir = TempDir::new().unwrap();
        let cfg = PipelineConfig {
            max_images: Some(3),
            ..config(&server, dir.path())
        };
        let (tx, mut rx) = crate::progress::channel();

        let encoder = Arc::new(RecordingEncoder::default());
        let outcome = Pipeline::new(cfg)
            .unwrap()
            .with_encoder(encoder.clone())
            .with_progress(tx)
            .run("https://host/abcde/fg123/")
            .await
            .unwrap();

        match outcome {
            PipelineOutcome::Written(summary) => {
                assert_eq!(summary.images, 3);
                assert_eq!(summary.pages, 3);
            }
            other => panic!("unexpected outcome {other:?}"),
        }

        let mut warned = false;
        while let Ok(event) = rx.try_recv() {
            if let ProgressEventKind::Warning { message } = event.event {
                warned |= message.contains("only the first 3");
            }
        }
        assert!(warned);
    }

    #[tokio::test]
    async fn test_interactive_run_prefers_captures() {
        let server = mock_viewer(3).await;
        let dir = TempDir::new().unwrap();
        let cfg = PipelineConfig {
            interactive: true,
            ..config(&server, dir.path())
        };

        let encoder = Arc::new(RecordingEncoder::default());
        let outcome = Pipeline::new(cfg)
            .unwrap()
            .with_launcher(Arc::new(StaticLauncher))
            .with_encoder(encoder.clone())
            .run("abcde/fg123")
            .await
            .unwrap();

        let summary = match outcome {
            PipelineOutcome::Written(summary) => summary,
            other => panic!("unexpected outcome {other:?}"),
        };
        assert_eq!(summary.captured_pages, 3);
        assert!(summary.failed_captures.is_empty());
        assert!(summary.timings.capture_ms.is_some());

        let calls = encoder.calls.lock().unwrap();
        let names: Vec<String> = calls[0]
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec!["interactive-1.png", "interactive-2.png", "interactive-2.png"]
        );
    }

    #[tokio::test]
    async fn test_invalid_identifier_fails_before_network() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        let err = Pipeline::new(config(&server, dir.path()))
            .unwrap()
            .run("not-an-id")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidIdentifier(_)));
    }
}
