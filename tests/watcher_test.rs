mod common;

use common::TestEnvironment;
use pretty_assertions::assert_eq;
use std::time::{Duration, Instant};

use poreflow::pipeline::FileOutcome;
use poreflow::watcher::Scheduler;

#[test]
fn test_settled_files_flow_through_once() {
    let env = TestEnvironment::new();
    let config = env.config();
    let first = env.write_read("SAMPLE_X1_Y2_ch5_read3_strand.fast5", "ACGT");
    env.write_file("watch/downloads/SAMPLE_muxscan_X1_ch5_read3_strand.fast5", "{}");
    env.write_file("watch/other/SAMPLE_X1_Y2_ch5_read8_strand.fast5", "{}");

    let mut scheduler = Scheduler::new(&config.watch).unwrap();
    let mut pipeline = env.pipeline(config, None);
    let t0 = Instant::now();

    assert_eq!(scheduler.poll(t0), 1);
    assert!(scheduler.ready(t0).is_empty());
    scheduler.poll(t0 + Duration::from_secs(5));

    let ready = scheduler.ready(t0 + Duration::from_secs(5));
    assert_eq!(ready, vec![first.clone()]);
    for path in &ready {
        scheduler.take(path);
        assert!(matches!(pipeline.process_file(path).unwrap(), FileOutcome::Stored { .. }));
    }

    // A new file arrives; the processed one is never queued again
    let second = env.write_read("SAMPLE_X1_Y2_ch5_read4_strand.fast5", "ACGTT");
    assert_eq!(scheduler.poll(t0 + Duration::from_secs(10)), 1);
    scheduler.poll(t0 + Duration::from_secs(15));
    assert_eq!(scheduler.ready(t0 + Duration::from_secs(15)), vec![second]);
    assert_eq!(scheduler.processed_count(), 1);
    assert!(!scheduler.is_pending(&first));
}

#[test]
fn test_missing_watch_dir_is_rejected() {
    let env = TestEnvironment::new();
    let mut config = env.config();
    config.watch.watch_dir = Some(env.path("nowhere"));
    assert!(Scheduler::new(&config.watch).is_err());
}
