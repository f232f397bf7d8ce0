use icount::domain::{Address, ProfilerError, ReplayError};
use icount::profiling::{Session, SessionConfig};
use icount::replay::{replay, ReplayMode, Trace};
use icount::snapshot::DumpOutcome;
use std::path::Path;
use tempfile::NamedTempFile;

fn load(name: &str) -> Trace {
    Trace::load(&Path::new("tests/fixtures").join(name)).unwrap()
}

#[test]
fn test_load_trace_fixture() {
    let trace = load("loop.trace");

    assert_eq!(trace.name, "loop.trace");
    assert_eq!(trace.regions.len(), 3);
    assert_eq!(trace.event_count(), 5);
    assert_eq!(trace.regions[2], vec![(Address(0x1008), 1)]);
}

#[test]
fn test_load_missing_trace_fails() {
    let result = Trace::load(Path::new("tests/fixtures/nonexistent.trace"));
    assert!(matches!(result, Err(ReplayError::Read { .. })));
}

#[test]
fn test_replay_writes_snapshot() {
    let out = NamedTempFile::new().unwrap();
    let config = SessionConfig {
        output_path: Some(out.path().to_path_buf()),
        ..SessionConfig::default()
    };
    let session = Session::init(config).unwrap();

    let traces = [load("loop.trace"), load("exit.trace")];
    let stats = replay(&session, &traces, ReplayMode::Events).unwrap();
    assert_eq!(stats.traces, 2);
    assert_eq!(stats.events, 8);

    let report = session.shutdown().unwrap();
    assert_eq!(report.threads, 2);
    assert_eq!(report.drained_events, 8);
    assert!(matches!(report.output, DumpOutcome::Written { records: 5, .. }));

    let snapshot = std::fs::read_to_string(out.path()).unwrap();
    assert_eq!(snapshot, "0x1000:4:2\n0x1004:2:2\n0x1008:1:2\n0x3000:3:1\n0x3003:5:1\n");
}

#[test]
fn test_replay_accumulates_prior_snapshot() {
    let config = SessionConfig {
        merge_input_path: Some("tests/fixtures/prior.txt".into()),
        ..SessionConfig::default()
    };
    let session = Session::init(config).unwrap();
    replay(&session, &[load("loop.trace")], ReplayMode::Regions).unwrap();

    let (report, records) = session.shutdown_with_records().unwrap();
    let merge = report.merge.unwrap();
    assert_eq!(merge.merged, 3);
    assert_eq!(merge.skipped, 1);

    let counts: Vec<(u64, u64)> = records.iter().map(|r| (r.address.0, r.exec_count)).collect();
    assert_eq!(counts, vec![(0x1000, 5), (0x1004, 3), (0x1008, 1), (0x2000, 7)]);
}

#[test]
fn test_replay_modes_agree() {
    let traces = [load("loop.trace"), load("exit.trace")];

    let events = Session::init(SessionConfig::default()).unwrap();
    replay(&events, &traces, ReplayMode::Events).unwrap();
    let (_, event_records) = events.shutdown_with_records().unwrap();

    // One thread at a time, so no group increment can be lost
    let regions = Session::init(SessionConfig::default()).unwrap();
    for trace in &traces {
        replay(&regions, std::slice::from_ref(trace), ReplayMode::Regions).unwrap();
    }
    let (_, region_records) = regions.shutdown_with_records().unwrap();

    assert_eq!(event_records, region_records);
}

#[test]
fn test_conflicting_sizes_abort_without_snapshot() {
    let out = tempfile::tempdir().unwrap();
    let output = out.path().join("counts.txt");
    let config = SessionConfig { output_path: Some(output.clone()), ..SessionConfig::default() };
    let session = Session::init(config).unwrap();

    let result = replay(&session, &[load("conflict.trace")], ReplayMode::Regions);
    assert!(matches!(result, Err(ReplayError::Profiler(ProfilerError::SizeMismatch { .. }))));

    assert!(matches!(session.shutdown(), Err(ProfilerError::SessionFaulted(_))));
    assert!(!output.exists());
}
