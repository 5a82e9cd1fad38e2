// tests/core_runtime.rs

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use buildrelay::bridge::message::{COMPILE_ERROR, COMPILE_SUCCESS, SCRIPT_ADD, VIEW_LOCATIONS};
use buildrelay::bridge::NotificationBridge;
use buildrelay::cache::{CacheStore, CompileError, MemorySnapshotStore};
use buildrelay::engine::{
    BuildGate, BuildJob, BuildOutcome, CoreCommand, CoreRuntime, CoreStep, GatePhase,
    RuntimeEvent, RuntimeOptions,
};
use buildrelay::paths::{CanonicalName, PathNormalizer};
use buildrelay::rescan::{ScanFailure, ScanResult};
use buildrelay::types::FileEventKind;
use buildrelay_test_utils::{init_tracing, memory_cache, RecordingClient};

type TestResult = Result<(), Box<dyn Error>>;

const BASE: &str = "/proj";

fn core_with(cache: CacheStore, options: RuntimeOptions) -> CoreRuntime {
    CoreRuntime::new(
        cache,
        NotificationBridge::new(PathNormalizer::new(BASE)),
        BuildGate::new(),
        options,
    )
}

fn core() -> (CoreRuntime, MemorySnapshotStore) {
    let (cache, snapshots) = memory_cache(BASE);
    (core_with(cache, RuntimeOptions::default()), snapshots)
}

fn changed(name: &str, kind: FileEventKind, hash: Option<&str>) -> RuntimeEvent {
    RuntimeEvent::FileChanged {
        path: PathBuf::from(BASE).join(name),
        kind,
        content_hash: hash.map(str::to_string),
    }
}

fn jobs(step: &CoreStep) -> Vec<BuildJob> {
    step.commands
        .iter()
        .filter_map(|c| match c {
            CoreCommand::DispatchBuilds(jobs) => Some(jobs.clone()),
            _ => None,
        })
        .flatten()
        .collect()
}

fn finished(job: &BuildJob, outcome: BuildOutcome) -> RuntimeEvent {
    RuntimeEvent::BuildFinished {
        name: job.name.clone(),
        job: job.job,
        outcome,
    }
}

fn failure(message: &str) -> BuildOutcome {
    BuildOutcome::Failed(CompileError {
        message: message.to_string(),
        stack: None,
        file: format!("{BASE}/a.js"),
        timestamp: 1,
    })
}

/// Connect a recording client and complete the gate with an empty batch.
fn settle_empty(core: &mut CoreRuntime) -> RecordingClient {
    let client = RecordingClient::new(1);
    core.step(RuntimeEvent::ClientConnected {
        client: Arc::new(client.clone()),
    });
    core.step(RuntimeEvent::InitialScanComplete { files: 0 });
    core.step(RuntimeEvent::SettleElapsed);
    assert!(core.gate().is_complete());
    client
}

#[test]
fn added_file_is_built_and_rescanned() {
    init_tracing();
    let (mut core, _) = core();

    let step = core.step(changed("a.js", FileEventKind::Add, Some("h1")));

    assert!(step.keep_running);
    assert_eq!(
        step.commands[0],
        CoreCommand::ScheduleRescan {
            name: "a.js".to_string(),
            path: PathBuf::from("/proj/a.js"),
        }
    );
    let jobs = jobs(&step);
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].name, "a.js");
    assert_eq!(jobs[0].content_hash.as_deref(), Some("h1"));
    assert_eq!(step.commands.last(), Some(&CoreCommand::ArmSettleTimer));

    assert!(core.cache().contains("a.js"));
    assert_eq!(core.gate().phase(), GatePhase::Building);
    assert_eq!(core.builds_in_flight(), 1);
}

#[test]
fn stale_build_results_are_ignored() {
    init_tracing();
    let (mut core, _) = core();

    let first = jobs(&core.step(changed("a.js", FileEventKind::Add, Some("h1"))));
    let second = jobs(&core.step(changed("a.js", FileEventKind::Change, Some("h2"))));
    assert!(second[0].job > first[0].job);

    core.step(finished(&first[0], failure("old failure")));
    let record = core.cache().get("a.js").expect("tracked");
    assert!(record.last_error.is_none());
    assert!(record.written_at.is_none());
    assert_eq!(core.builds_in_flight(), 1);

    core.step(finished(&second[0], BuildOutcome::Success));
    let record = core.cache().get("a.js").expect("tracked");
    assert!(record.written_at.is_some());
    assert_eq!(record.content_hash.as_deref(), Some("h2"));
    assert_eq!(core.builds_in_flight(), 0);
}

#[test]
fn unchanged_file_reuses_previous_record_on_restart() -> TestResult {
    init_tracing();
    let (cache, snapshots) = memory_cache(BASE);
    let mut first = core_with(cache, RuntimeOptions::default());

    let job = jobs(&first.step(changed("a.js", FileEventKind::Add, Some("h1"))));
    first.step(finished(&job[0], BuildOutcome::Success));
    first.cache_mut().set_file_imports("a.js", ["./b", "react"]);
    first.persist();
    let persisted = first.cache().get("a.js").cloned().ok_or("missing")?;

    let mut cache = CacheStore::new(PathNormalizer::new(BASE), Box::new(snapshots));
    cache.init(false);
    let mut second = core_with(cache, RuntimeOptions::default());

    let step = second.step(changed("a.js", FileEventKind::Add, Some("h1")));
    assert!(jobs(&step).is_empty(), "unchanged file must not rebuild");
    assert_eq!(step.commands, vec![CoreCommand::ArmSettleTimer]);
    assert_eq!(second.cache().get("a.js"), Some(&persisted));

    let step = second.step(changed("b.js", FileEventKind::Add, Some("h9")));
    assert_eq!(jobs(&step).len(), 1, "new file is built");
    Ok(())
}

#[test]
fn changed_or_failing_file_is_rebuilt_on_restart() {
    let (cache, snapshots) = memory_cache(BASE);
    let mut first = core_with(cache, RuntimeOptions::default());

    let a = jobs(&first.step(changed("a.js", FileEventKind::Add, Some("h1"))));
    let b = jobs(&first.step(changed("b.js", FileEventKind::Add, Some("hb"))));
    first.step(finished(&a[0], BuildOutcome::Success));
    first.step(finished(&b[0], failure("broken")));
    first.persist();

    let mut cache = CacheStore::new(PathNormalizer::new(BASE), Box::new(snapshots));
    cache.init(false);
    let mut second = core_with(cache, RuntimeOptions::default());

    assert_eq!(jobs(&second.step(changed("a.js", FileEventKind::Add, Some("h2")))).len(), 1);
    assert_eq!(jobs(&second.step(changed("b.js", FileEventKind::Add, Some("hb")))).len(), 1);
    assert_eq!(jobs(&second.step(changed("c.js", FileEventKind::Add, None))).len(), 1);
}

#[test]
fn settle_waits_for_builds_in_flight() {
    init_tracing();
    let (mut core, _) = core();

    let job = jobs(&core.step(changed("a.js", FileEventKind::Add, None)));

    let step = core.step(RuntimeEvent::SettleElapsed);
    assert!(step.commands.is_empty());
    assert!(!core.gate().is_complete());

    let step = core.step(finished(&job[0], BuildOutcome::Success));
    assert_eq!(step.commands, vec![CoreCommand::ArmSettleTimer]);

    let step = core.step(RuntimeEvent::SettleElapsed);
    assert_eq!(step.commands, vec![CoreCommand::PersistSnapshot]);
    assert!(step.keep_running);
    assert!(core.gate().is_complete());

    // Later settle events change nothing.
    assert!(core.step(RuntimeEvent::SettleElapsed).commands.is_empty());
}

#[test]
fn removing_a_file_mid_build_still_lets_the_gate_settle() {
    init_tracing();
    let (mut core, _) = core();

    let job = jobs(&core.step(changed("a.js", FileEventKind::Add, None)));
    assert!(core.step(RuntimeEvent::SettleElapsed).commands.is_empty());

    let step = core.step(changed("a.js", FileEventKind::Unlink, None));
    assert_eq!(
        step.commands,
        vec![
            CoreCommand::CancelRescan {
                name: "a.js".to_string()
            },
            CoreCommand::ArmSettleTimer,
        ]
    );
    assert_eq!(core.builds_in_flight(), 0);

    // The orphaned build reports back late and is ignored.
    assert!(core.step(finished(&job[0], BuildOutcome::Success)).commands.is_empty());
    assert_eq!(core.gate().phase(), GatePhase::Building);

    let step = core.step(RuntimeEvent::SettleElapsed);
    assert_eq!(step.commands, vec![CoreCommand::PersistSnapshot]);
    assert!(core.gate().is_complete());
}

#[test]
fn stripped_prefixes_keep_one_record_per_file() {
    init_tracing();
    let normalizer = PathNormalizer::new(BASE).with_strip_prefixes(vec!["out/".to_string()]);
    let mut cache = CacheStore::new(normalizer, Box::new(MemorySnapshotStore::new()));
    cache.init(false);
    let mut core = core_with(cache, RuntimeOptions::default());

    // Only the first "out/" is stripped, so the canonical name still starts
    // with the prefix.
    let job = jobs(&core.step(changed("out/out/a.js", FileEventKind::Add, Some("h1"))));
    assert_eq!(job[0].name, "out/a.js");

    core.step(RuntimeEvent::FileScanned {
        name: "out/a.js".to_string(),
        result: ScanResult {
            imports: vec!["./b".to_string(), "lodash".to_string()],
            views: Some(vec!["Main".to_string()]),
            is_internal: Some(true),
        },
    });
    core.step(finished(&job[0], BuildOutcome::Success));

    let cache = core.cache();
    assert_eq!(cache.len(), 1);
    let record = cache.get(CanonicalName("out/a.js")).expect("record tracked");
    assert!(record.written_at.is_some());
    assert_eq!(record.content_hash.as_deref(), Some("h1"));
    assert_eq!(record.views, vec!["Main".to_string()]);
    assert!(record.is_internal);
    assert!(record.internal_imports.contains("./b"));

    let job = jobs(&core.step(changed("out/out/a.js", FileEventKind::Change, None)));
    core.step(finished(&job[0], failure("bad")));
    assert_eq!(core.cache().len(), 1);
    assert!(core.cache().get(CanonicalName("out/a.js")).is_some_and(|r| r.last_error.is_some()));
}

#[test]
fn empty_project_settles_and_exits_in_once_mode() {
    let (cache, _) = memory_cache(BASE);
    let mut core = core_with(
        cache,
        RuntimeOptions {
            exit_after_first_build: true,
        },
    );

    let step = core.step(RuntimeEvent::InitialScanComplete { files: 0 });
    assert_eq!(step.commands, vec![CoreCommand::ArmSettleTimer]);
    assert_eq!(core.gate().phase(), GatePhase::Building);

    let step = core.step(RuntimeEvent::SettleElapsed);
    assert_eq!(
        step.commands,
        vec![CoreCommand::PersistSnapshot, CoreCommand::RequestExit]
    );
    assert!(!step.keep_running);
}

#[test]
fn successes_are_silent_until_the_first_build_completes() {
    init_tracing();
    let (mut core, _) = core();
    let client = RecordingClient::new(1);
    core.step(RuntimeEvent::ClientConnected {
        client: Arc::new(client.clone()),
    });

    let job = jobs(&core.step(changed("a.js", FileEventKind::Add, None)));
    core.step(finished(&job[0], BuildOutcome::Success));
    assert!(client.frames().is_empty());

    let job = jobs(&core.step(changed("b.js", FileEventKind::Add, None)));
    core.step(finished(&job[0], failure("bad")));
    assert_eq!(client.kinds(), vec![COMPILE_ERROR]);
}

#[test]
fn successes_after_the_first_build_announce_the_script() {
    init_tracing();
    let (mut core, _) = core();
    let client = settle_empty(&mut core);

    let step = core.step(changed("a.js", FileEventKind::Change, None));
    assert!(!step.commands.contains(&CoreCommand::ArmSettleTimer));
    let job = jobs(&step);
    core.step(finished(&job[0], BuildOutcome::Success));

    let messages = client.messages();
    assert_eq!(client.kinds(), vec![SCRIPT_ADD, COMPILE_SUCCESS]);
    for message in &messages {
        assert_eq!(message["name"], "a.js");
        assert_eq!(message["compiledAt"], job[0].started_at);
    }
}

#[test]
fn failed_build_records_error_and_broadcasts_relative_file() {
    let (mut core, _) = core();
    let client = settle_empty(&mut core);

    let job = jobs(&core.step(changed("a.js", FileEventKind::Change, None)));
    core.step(finished(&job[0], failure("Unexpected token")));

    let error = core.cache().last_error().expect("error recorded");
    assert_eq!(error.message, "Unexpected token");

    let messages = client.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["type"], COMPILE_ERROR);
    assert_eq!(messages[0]["error"]["file"], "a.js");
}

#[test]
fn unlink_removes_record_and_cancels_rescan() -> TestResult {
    init_tracing();
    let (mut core, _) = core();
    let client = settle_empty(&mut core);

    let job = jobs(&core.step(changed("v.js", FileEventKind::Add, None)));
    core.step(RuntimeEvent::FileScanned {
        name: "v.js".to_string(),
        result: ScanResult {
            imports: vec![],
            views: Some(vec!["Main".to_string()]),
            is_internal: None,
        },
    });

    let step = core.step(changed("v.js", FileEventKind::Unlink, None));
    assert_eq!(
        step.commands,
        vec![CoreCommand::CancelRescan {
            name: "v.js".to_string()
        }]
    );
    assert!(!core.cache().contains("v.js"));
    assert_eq!(core.builds_in_flight(), 0);

    // A build result arriving after the unlink is stale.
    core.step(finished(&job[0], BuildOutcome::Success));
    assert!(!core.cache().contains("v.js"));

    let views: Vec<_> = client
        .messages()
        .into_iter()
        .filter(|m| m["type"] == VIEW_LOCATIONS)
        .map(|m| m["views"].clone())
        .collect();
    assert_eq!(views.len(), 2);
    assert_eq!(views[0]["Main"], "v.js");
    assert!(views[1].as_object().ok_or("views is an object")?.is_empty());
    Ok(())
}

#[test]
fn scan_results_update_the_cache() {
    let (mut core, _) = core();
    core.step(changed("a.js", FileEventKind::Add, None));

    core.step(RuntimeEvent::FileScanned {
        name: "a.js".to_string(),
        result: ScanResult {
            imports: vec!["./b".into(), "react".into()],
            views: None,
            is_internal: Some(true),
        },
    });

    let record = core.cache().get("a.js").expect("tracked");
    assert!(record.internal_imports.contains("./b"));
    assert!(record.external_imports.contains("react"));
    assert!(record.is_internal);

    core.step(RuntimeEvent::FileScanned {
        name: "gone.js".to_string(),
        result: ScanResult::default(),
    });
    assert!(!core.cache().contains("gone.js"));
}

#[test]
fn scan_timeout_becomes_a_compile_error() {
    init_tracing();
    let (mut core, _) = core();
    core.step(changed("slow.js", FileEventKind::Add, None));

    core.step(RuntimeEvent::ScanFailed {
        name: "slow.js".to_string(),
        path: PathBuf::from("/proj/slow.js"),
        failure: ScanFailure::TimedOut(Duration::from_millis(50)),
    });
    let error = core.cache().last_error().expect("timeout recorded");
    assert!(error.message.contains("50ms"));

    core.step(RuntimeEvent::ScanFailed {
        name: "gone.js".to_string(),
        path: PathBuf::from("/proj/gone.js"),
        failure: ScanFailure::Unreadable("no such file".into()),
    });
    assert!(!core.cache().contains("gone.js"));
}

#[test]
fn shutdown_persists_and_stops() {
    let (mut core, _) = core();

    let step = core.step(RuntimeEvent::ShutdownRequested);
    assert_eq!(step.commands, vec![CoreCommand::PersistSnapshot]);
    assert!(!step.keep_running);
}
