// tests/rescan_debounce.rs

use std::error::Error;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use buildrelay::engine::RuntimeEvent;
use buildrelay::fs::mock::MockFileSystem;
use buildrelay::rescan::{RescanTiming, Rescanner, ScanFailure, SourceScanner};
use buildrelay_test_utils::init_tracing;
use tokio::sync::mpsc;
use tokio::time::timeout;

type TestResult = Result<(), Box<dyn Error>>;

/// Records every source it is asked to scan; optionally stalls.
#[derive(Debug, Default)]
struct CountingScanner {
    seen: Mutex<Vec<String>>,
    stall: Option<Duration>,
}

impl CountingScanner {
    fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

impl SourceScanner for CountingScanner {
    fn extract_imports(&self, _path: &str, source: &str) -> Vec<String> {
        if let Some(stall) = self.stall {
            std::thread::sleep(stall);
        }
        self.seen.lock().unwrap().push(source.to_string());
        source.lines().map(str::to_string).collect()
    }
}

fn timing(debounce_ms: u64, timeout_ms: u64) -> RescanTiming {
    RescanTiming {
        debounce: Duration::from_millis(debounce_ms),
        scan_timeout: Duration::from_millis(timeout_ms),
    }
}

#[tokio::test]
async fn rapid_edits_collapse_into_one_scan_of_the_final_content() -> TestResult {
    init_tracing();
    let fs = MockFileSystem::new();
    let path = PathBuf::from("/proj/app.js");
    let scanner = Arc::new(CountingScanner::default());
    let (tx, mut rx) = mpsc::channel(16);

    let mut rescanner = Rescanner::new(scanner.clone(), Arc::new(fs.clone()), tx, timing(60, 1000));

    for i in 0..5 {
        fs.add_file(&path, format!("./dep{i}"));
        rescanner.schedule("app.js".to_string(), path.clone());
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(rescanner.pending(), 1);

    let event = timeout(Duration::from_secs(2), rx.recv())
        .await?
        .ok_or("channel closed")?;
    match event {
        RuntimeEvent::FileScanned { name, result } => {
            assert_eq!(name, "app.js");
            assert_eq!(result.imports, vec!["./dep4".to_string()]);
        }
        other => panic!("unexpected event: {other:?}"),
    }

    assert!(timeout(Duration::from_millis(200), rx.recv()).await.is_err());
    assert_eq!(scanner.seen(), vec!["./dep4".to_string()]);
    Ok(())
}

#[tokio::test]
async fn different_files_are_scanned_independently() -> TestResult {
    let fs = MockFileSystem::new();
    fs.add_file("/proj/a.js", "a");
    fs.add_file("/proj/b.js", "b");
    let scanner = Arc::new(CountingScanner::default());
    let (tx, mut rx) = mpsc::channel(16);

    let mut rescanner = Rescanner::new(scanner.clone(), Arc::new(fs), tx, timing(30, 1000));
    rescanner.schedule("a.js".into(), "/proj/a.js".into());
    rescanner.schedule("b.js".into(), "/proj/b.js".into());

    let mut names = Vec::new();
    for _ in 0..2 {
        match timeout(Duration::from_secs(2), rx.recv()).await? {
            Some(RuntimeEvent::FileScanned { name, .. }) => names.push(name),
            other => panic!("unexpected event: {other:?}"),
        }
    }
    names.sort();
    assert_eq!(names, vec!["a.js".to_string(), "b.js".to_string()]);
    Ok(())
}

#[tokio::test]
async fn cancelled_scan_never_runs() -> TestResult {
    let fs = MockFileSystem::new();
    fs.add_file("/proj/gone.js", "x");
    let scanner = Arc::new(CountingScanner::default());
    let (tx, mut rx) = mpsc::channel(16);

    let mut rescanner = Rescanner::new(scanner.clone(), Arc::new(fs), tx, timing(40, 1000));
    rescanner.schedule("gone.js".into(), "/proj/gone.js".into());

    assert!(rescanner.cancel("gone.js"));
    assert!(!rescanner.cancel("gone.js"));
    assert_eq!(rescanner.pending(), 0);

    assert!(timeout(Duration::from_millis(150), rx.recv()).await.is_err());
    assert!(scanner.seen().is_empty());
    Ok(())
}

#[tokio::test]
async fn unreadable_file_reports_scan_failure() -> TestResult {
    init_tracing();
    let fs = MockFileSystem::new();
    let scanner = Arc::new(CountingScanner::default());
    let (tx, mut rx) = mpsc::channel(16);

    let mut rescanner = Rescanner::new(scanner, Arc::new(fs), tx, timing(10, 1000));
    rescanner.schedule("missing.js".into(), "/proj/missing.js".into());

    match timeout(Duration::from_secs(2), rx.recv()).await? {
        Some(RuntimeEvent::ScanFailed { name, path, failure }) => {
            assert_eq!(name, "missing.js");
            assert_eq!(path, PathBuf::from("/proj/missing.js"));
            assert!(matches!(failure, ScanFailure::Unreadable(_)));
        }
        other => panic!("unexpected event: {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn slow_scanner_times_out() -> TestResult {
    init_tracing();
    let fs = MockFileSystem::new();
    fs.add_file("/proj/slow.js", "import 'x'");
    let scanner = Arc::new(CountingScanner {
        seen: Mutex::new(Vec::new()),
        stall: Some(Duration::from_millis(300)),
    });
    let (tx, mut rx) = mpsc::channel(16);

    let mut rescanner = Rescanner::new(scanner, Arc::new(fs), tx, timing(10, 50));
    rescanner.schedule("slow.js".into(), "/proj/slow.js".into());

    match timeout(Duration::from_secs(2), rx.recv()).await? {
        Some(RuntimeEvent::ScanFailed { failure, .. }) => {
            assert_eq!(failure, ScanFailure::TimedOut(Duration::from_millis(50)));
            assert_eq!(failure.to_string(), "import scan did not finish within 50ms");
        }
        other => panic!("unexpected event: {other:?}"),
    }
    Ok(())
}
