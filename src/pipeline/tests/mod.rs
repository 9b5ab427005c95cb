use crate::archive::ArchiveBackend;
use crate::config::Config;
use crate::error::{ArchiveError, DeliveryError, Error, Result};
use crate::pipeline::*;
use crate::retry::RetryPolicy;
use crate::types::{Area, ArchiveFormat, RunMode};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Archive backend that concatenates members into a plain file
#[derive(Clone, Default)]
struct FakeBackend {
    calls: Arc<Mutex<Vec<Vec<String>>>>,
    fail_create: bool,
    fail_integrity: bool,
}

#[async_trait]
impl ArchiveBackend for FakeBackend {
    async fn create(&self, archive: &Path, source_dir: &Path, members: &[String]) -> Result<()> {
        self.calls.lock().unwrap().push(members.to_vec());

        let mut content = Vec::new();
        for member in members {
            content.extend(std::fs::read(source_dir.join(member))?);
        }
        std::fs::write(archive, &content)?;

        if self.fail_create {
            return Err(ArchiveError::CreationFailed {
                archive: archive.to_path_buf(),
                reason: "disk full".to_string(),
            }
            .into());
        }
        Ok(())
    }

    async fn test_integrity(&self, archive: &Path) -> Result<()> {
        if self.fail_integrity {
            return Err(ArchiveError::IntegrityFailed {
                archive: archive.to_path_buf(),
                reason: "bad CRC".to_string(),
            }
            .into());
        }
        Ok(())
    }

    fn format(&self) -> ArchiveFormat {
        ArchiveFormat::Zip { compressed: true }
    }
}

struct Fixture {
    root: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let root = TempDir::new().unwrap();
        std::fs::create_dir_all(root.path().join("data")).unwrap();
        Self { root }
    }

    fn camera(&self) -> PathBuf {
        self.root.path().join("data")
    }

    fn processed(&self) -> PathBuf {
        self.root.path().join("processed")
    }

    fn scratch(&self) -> PathBuf {
        self.root.path().join("temp")
    }

    fn config(&self, server: &str) -> Config {
        let mut config = Config::with_base_dir(self.root.path());
        config.server = server.to_string();
        config.batch_size = 3;
        config
    }

    fn frame(&self, name: &str) -> PathBuf {
        let path = self.camera().join(name);
        std::fs::write(&path, name.as_bytes()).unwrap();
        path
    }

    fn names_in(&self, dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    async fn pipeline(
        &self,
        server: &str,
        areas: &[&str],
        backend: FakeBackend,
        mode: RunMode,
    ) -> Pipeline {
        self.pipeline_with(server, areas, backend, mode, quick_options())
            .await
    }

    async fn pipeline_with(
        &self,
        server: &str,
        areas: &[&str],
        backend: FakeBackend,
        mode: RunMode,
        options: PipelineOptions,
    ) -> Pipeline {
        Pipeline::new(
            &self.config(server),
            areas.iter().map(|a| Area::from(*a)).collect(),
            &self.scratch(),
            Box::new(backend),
            mode,
            options,
        )
        .await
        .unwrap()
    }
}

fn quick_options() -> PipelineOptions {
    PipelineOptions {
        settle_delay: Duration::ZERO,
        idle_timeout: Duration::from_secs(120),
        upload_interval: Duration::ZERO,
        relocation: RetryPolicy::fixed(2, Duration::ZERO),
    }
}

async fn server_responding(status: u16) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(status))
        .mount(&server)
        .await;
    server
}

/// File names of the archives the server received, in arrival order
async fn uploaded_names(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter_map(|request| {
            let body = String::from_utf8_lossy(&request.body);
            let start = body.find("filename=\"")? + "filename=\"".len();
            let end = body[start..].find('"')?;
            Some(body[start..start + end].to_string())
        })
        .collect()
}

const FRAMES: [&str; 3] = [
    "064_2025-01-01_10-00-05.fts",
    "064_2025-01-01_09-59-55.fts",
    "064_2025-01-01_10-00-00.fts",
];

// ---------------------------------------------------------------------------
// Pack and deliver
// ---------------------------------------------------------------------------

#[tokio::test]
async fn full_batch_is_archived_relocated_and_delivered() {
    let fx = Fixture::new();
    let server = server_responding(200).await;
    let backend = FakeBackend::default();
    let calls = backend.calls.clone();
    for name in FRAMES {
        fx.frame(name);
    }

    let mut pipeline = fx
        .pipeline(&server.uri(), &["064"], backend, RunMode::Normal)
        .await;
    let summary = pipeline.run_iteration().await.unwrap();

    assert_eq!(
        summary,
        IterationSummary {
            redelivered: 0,
            archived: 1,
            uploaded: 1
        }
    );
    assert_eq!(
        calls.lock().unwrap()[0],
        vec![
            "064_2025-01-01_09-59-55.fts",
            "064_2025-01-01_10-00-00.fts",
            "064_2025-01-01_10-00-05.fts",
        ]
    );
    assert!(fx.names_in(&fx.camera()).is_empty());
    assert_eq!(fx.names_in(&fx.processed()).len(), 3);
    assert!(fx.names_in(&fx.scratch()).is_empty(), "delivered archive is deleted");

    let uploaded = uploaded_names(&server).await;
    assert_eq!(uploaded.len(), 1);
    assert!(uploaded[0].contains("_064_") && uploaded[0].ends_with(".zip"));
}

#[tokio::test]
async fn partial_batch_is_left_alone() {
    let fx = Fixture::new();
    let server = server_responding(200).await;
    fx.frame("064_2025-01-01_10-00-00.fts");
    fx.frame("064_2025-01-01_10-00-05.fts");
    fx.frame("065_2025-01-01_10-00-00.fts");

    let mut pipeline = fx
        .pipeline(&server.uri(), &["064", "065"], FakeBackend::default(), RunMode::Normal)
        .await;
    let summary = pipeline.run_iteration().await.unwrap();

    assert_eq!(summary, IterationSummary::default());
    assert_eq!(fx.names_in(&fx.camera()).len(), 3);
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn each_area_gets_its_own_archive() {
    let fx = Fixture::new();
    let server = server_responding(200).await;
    let backend = FakeBackend::default();
    let calls = backend.calls.clone();
    for i in 0..3 {
        fx.frame(&format!("064_2025-01-01_10-00-0{i}.fts"));
        fx.frame(&format!("M31-SF_2025-01-01_10-00-0{i}.fts"));
    }
    // Another area's file and a foreign extension never join a batch
    fx.frame("0645_2025-01-01_10-00-00.fts");
    fx.frame("064_2025-01-01_10-00-09.fits");

    let mut pipeline = fx
        .pipeline(&server.uri(), &["064", "M31"], backend, RunMode::Normal)
        .await;
    let summary = pipeline.run_iteration().await.unwrap();

    assert_eq!(summary.archived, 2);
    assert_eq!(summary.uploaded, 2);
    let calls = calls.lock().unwrap();
    assert!(calls[0].iter().all(|m| m.starts_with("064_")));
    assert!(calls[1].iter().all(|m| m.starts_with("M31-SF_")));
    assert_eq!(
        fx.names_in(&fx.camera()),
        vec!["0645_2025-01-01_10-00-00.fts", "064_2025-01-01_10-00-09.fits"]
    );
}

#[tokio::test]
async fn missing_camera_dir_skips_areas() {
    let fx = Fixture::new();
    let server = server_responding(200).await;
    let mut pipeline = fx
        .pipeline(&server.uri(), &["064"], FakeBackend::default(), RunMode::Test)
        .await;
    std::fs::remove_dir_all(fx.camera()).unwrap();

    let summary = pipeline.run_iteration().await.unwrap();
    assert_eq!(summary, IterationSummary::default());
}

// ---------------------------------------------------------------------------
// Failure policy
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_upload_keeps_archive_for_redelivery() {
    let fx = Fixture::new();
    let server = server_responding(500).await;
    for name in FRAMES {
        fx.frame(name);
    }

    let mut pipeline = fx
        .pipeline(&server.uri(), &["064"], FakeBackend::default(), RunMode::Normal)
        .await;
    let summary = pipeline.run_iteration().await.unwrap();

    assert_eq!(summary.archived, 1);
    assert_eq!(summary.uploaded, 0);
    let leftover = fx.names_in(&fx.scratch());
    assert_eq!(leftover.len(), 1);
    assert_eq!(fx.names_in(&fx.processed()).len(), 3, "sources relocated anyway");

    // Server recovers; the next scan delivers the same archive
    server.reset().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let summary = pipeline.run_iteration().await.unwrap();
    assert_eq!(summary.redelivered, 1);
    assert_eq!(uploaded_names(&server).await, leftover);
    assert!(fx.names_in(&fx.scratch()).is_empty());
}

#[tokio::test]
async fn failed_upload_is_fatal_in_test_mode() {
    let fx = Fixture::new();
    let server = server_responding(503).await;
    for name in FRAMES {
        fx.frame(name);
    }

    let mut pipeline = fx
        .pipeline(&server.uri(), &["064"], FakeBackend::default(), RunMode::Test)
        .await;
    let err = pipeline.run_iteration().await.unwrap_err();

    assert!(matches!(
        err,
        Error::Delivery(DeliveryError::Rejected { status: 503, .. })
    ));
}

#[tokio::test]
async fn creation_failure_abandons_archive_and_keeps_sources() {
    let fx = Fixture::new();
    let server = server_responding(200).await;
    for name in FRAMES {
        fx.frame(name);
    }
    let backend = FakeBackend {
        fail_create: true,
        ..Default::default()
    };

    let mut pipeline = fx
        .pipeline(&server.uri(), &["064"], backend, RunMode::Normal)
        .await;
    let summary = pipeline.run_iteration().await.unwrap();

    assert_eq!(summary, IterationSummary::default());
    assert_eq!(fx.names_in(&fx.camera()).len(), 3);
    let scratch = fx.names_in(&fx.scratch());
    assert_eq!(scratch.len(), 1);
    assert!(scratch[0].ends_with(".zip.failed"), "{scratch:?}");
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn creation_failure_is_fatal_in_test_mode() {
    let fx = Fixture::new();
    let server = server_responding(200).await;
    for name in FRAMES {
        fx.frame(name);
    }
    let backend = FakeBackend {
        fail_create: true,
        ..Default::default()
    };

    let mut pipeline = fx
        .pipeline(&server.uri(), &["064"], backend, RunMode::Test)
        .await;
    let err = pipeline.run_iteration().await.unwrap_err();

    assert!(matches!(
        err,
        Error::Archive(ArchiveError::CreationFailed { .. })
    ));
}

#[tokio::test]
async fn integrity_failure_is_never_uploaded_or_redelivered() {
    let fx = Fixture::new();
    let server = server_responding(200).await;
    for name in FRAMES {
        fx.frame(name);
    }
    let backend = FakeBackend {
        fail_integrity: true,
        ..Default::default()
    };

    let mut pipeline = fx
        .pipeline(&server.uri(), &["064"], backend, RunMode::Normal)
        .await;
    pipeline.run_iteration().await.unwrap();
    let summary = pipeline.run_iteration().await.unwrap();

    assert_eq!(summary.redelivered, 0);
    assert!(server.received_requests().await.unwrap().is_empty());
    assert_eq!(fx.names_in(&fx.camera()).len(), 3, "sources not relocated");
}

#[tokio::test]
async fn relocation_failure_warns_and_still_delivers() {
    let fx = Fixture::new();
    let server = server_responding(200).await;
    for name in FRAMES {
        fx.frame(name);
    }

    let mut pipeline = fx
        .pipeline(&server.uri(), &["064"], FakeBackend::default(), RunMode::Normal)
        .await;
    std::fs::remove_dir_all(fx.processed()).unwrap();

    let summary = pipeline.run_iteration().await.unwrap();
    assert_eq!(summary.uploaded, 1);
    assert_eq!(fx.names_in(&fx.camera()).len(), 3);
}

#[tokio::test]
async fn relocation_failure_is_fatal_in_test_mode() {
    let fx = Fixture::new();
    let server = server_responding(200).await;
    for name in FRAMES {
        fx.frame(name);
    }

    let mut pipeline = fx
        .pipeline(&server.uri(), &["064"], FakeBackend::default(), RunMode::Test)
        .await;
    std::fs::remove_dir_all(fx.processed()).unwrap();

    let err = pipeline.run_iteration().await.unwrap_err();
    match err {
        Error::Relocation { failed, attempts } => {
            assert_eq!(failed.len(), 3);
            assert_eq!(attempts, 2);
        }
        other => panic!("expected Relocation, got {other:?}"),
    }
    assert!(server.received_requests().await.unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Re-delivery
// ---------------------------------------------------------------------------

#[tokio::test]
async fn leftovers_are_redelivered_oldest_first() {
    let fx = Fixture::new();
    let server = server_responding(200).await;
    let mut pipeline = fx
        .pipeline(&server.uri(), &["064"], FakeBackend::default(), RunMode::Normal)
        .await;

    for name in [
        "2025-01-02_064_000001.zip",
        "2024-12-31_M31_235959.zip",
        "2025-01-01_065_120000.zip",
        "notes.txt",
        "2023-01-01_064_000000.rar",
        "2020-01-01_064_000000.zip.failed",
    ] {
        std::fs::write(fx.scratch().join(name), b"archive").unwrap();
    }

    let summary = pipeline.run_iteration().await.unwrap();

    assert_eq!(summary.redelivered, 3);
    assert_eq!(
        uploaded_names(&server).await,
        vec![
            "2024-12-31_M31_235959.zip",
            "2025-01-01_065_120000.zip",
            "2025-01-02_064_000001.zip",
        ]
    );
    assert_eq!(
        fx.names_in(&fx.scratch()),
        vec![
            "2020-01-01_064_000000.zip.failed",
            "2023-01-01_064_000000.rar",
            "notes.txt",
        ]
    );
}

#[tokio::test]
async fn pending_archives_empty_scratch() {
    let fx = Fixture::new();
    let pipeline = fx
        .pipeline("http://127.0.0.1:9/upload", &["064"], FakeBackend::default(), RunMode::Normal)
        .await;
    assert!(pipeline.pending_archives().await.unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Control loop
// ---------------------------------------------------------------------------

#[tokio::test]
async fn shutdown_wins_over_first_tick() {
    let fx = Fixture::new();
    let server = server_responding(200).await;
    let mut pipeline = fx
        .pipeline(&server.uri(), &["064"], FakeBackend::default(), RunMode::Normal)
        .await;
    std::fs::write(fx.scratch().join("2025-01-01_064_100000.zip"), b"x").unwrap();

    let outcome = pipeline.run(std::future::ready(())).await.unwrap();

    assert_eq!(outcome, RunOutcome::Shutdown);
    assert!(
        server.received_requests().await.unwrap().is_empty(),
        "no scan after shutdown"
    );
}

#[tokio::test(start_paused = true)]
async fn test_mode_stops_after_idle_timeout() {
    let fx = Fixture::new();
    let mut pipeline = fx
        .pipeline("http://127.0.0.1:9/upload", &["064"], FakeBackend::default(), RunMode::Test)
        .await;

    let start = tokio::time::Instant::now();
    let outcome = pipeline.run(std::future::pending()).await.unwrap();

    assert_eq!(outcome, RunOutcome::IdleTimeout);
    assert!(start.elapsed() > Duration::from_secs(120));
}

#[tokio::test]
async fn normal_mode_never_idles_out() {
    let fx = Fixture::new();
    let mut pipeline = fx
        .pipeline("http://127.0.0.1:9/upload", &["064"], FakeBackend::default(), RunMode::Normal)
        .await;
    pipeline.options.idle_timeout = Duration::ZERO;
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(!pipeline.idle_timed_out());
}

#[tokio::test]
async fn finding_a_batch_restarts_idle_period() {
    let fx = Fixture::new();
    let server = server_responding(200).await;
    for name in FRAMES {
        fx.frame(name);
    }
    let mut pipeline = fx
        .pipeline(&server.uri(), &["064"], FakeBackend::default(), RunMode::Test)
        .await;
    pipeline.options.idle_timeout = Duration::from_secs(1);
    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert!(pipeline.idle_timed_out());

    pipeline.run_iteration().await.unwrap();
    assert!(!pipeline.idle_timed_out());
}

#[tokio::test]
async fn slow_deliveries_within_a_scan_do_not_count_as_idle() {
    let fx = Fixture::new();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;
    for name in FRAMES {
        fx.frame(name);
    }

    let options = PipelineOptions {
        idle_timeout: Duration::from_secs(2),
        upload_interval: Duration::from_secs(2),
        ..quick_options()
    };
    let mut pipeline = fx
        .pipeline_with(&server.uri(), &["064"], FakeBackend::default(), RunMode::Test, options)
        .await;
    // Scratch exists only once the pipeline is built
    std::fs::write(fx.scratch().join("2025-01-01_064_090000.zip"), b"leftover").unwrap();

    let start = std::time::Instant::now();
    let summary = pipeline.run_iteration().await.unwrap();

    assert_eq!(
        summary,
        IterationSummary {
            redelivered: 1,
            archived: 1,
            uploaded: 1
        }
    );
    // Leftover, throttle wait, then the fresh archive
    assert!(start.elapsed() > pipeline.options.idle_timeout);
    assert!(pipeline.state.idle_for() < Duration::from_secs(1));
    assert!(!pipeline.idle_timed_out());
}

#[tokio::test]
async fn abandoned_batch_still_restarts_idle_period() {
    let fx = Fixture::new();
    let server = server_responding(200).await;
    for name in FRAMES {
        fx.frame(name);
    }
    let backend = FakeBackend {
        fail_integrity: true,
        ..Default::default()
    };
    let mut pipeline = fx
        .pipeline(&server.uri(), &["064"], backend, RunMode::Normal)
        .await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(pipeline.state.idle_for() >= Duration::from_millis(300));

    pipeline.run_iteration().await.unwrap();
    assert!(pipeline.state.idle_for() < Duration::from_millis(300));
}

#[test]
fn failed_path_appends_suffix() {
    let archive = Path::new("/data/temp/2025-01-01_064_100000.zip");
    assert_eq!(
        super::pack::failed_path(archive),
        PathBuf::from("/data/temp/2025-01-01_064_100000.zip.failed")
    );
}

#[test]
fn default_options_match_operating_values() {
    let options = PipelineOptions::default();
    assert_eq!(options.settle_delay, Duration::from_secs(5));
    assert_eq!(options.idle_timeout, Duration::from_secs(120));
    assert_eq!(options.upload_interval, Duration::from_secs(120));
    assert_eq!(options.relocation, RetryPolicy::default());
}
