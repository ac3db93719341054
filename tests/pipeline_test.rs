mod common;

use common::{seqid, TestEnvironment};
use pretty_assertions::assert_eq;
use std::sync::atomic::Ordering;

use poreflow::pipeline::FileOutcome;
use poreflow::storage::value::{Row, Value};
use poreflow::storage::{StorageGateway, StoreConnection};
use poreflow::tools::{MockAligner, OutputProtocol};
use poreflow::PoreflowError;

fn rows(env: &TestEnvironment, run: &str, table: &str) -> Vec<Row> {
    let mut conn = env.gateway().connect(run).unwrap();
    conn.select(table, &Row::new()).unwrap()
}

#[test]
fn test_files_of_one_run_share_a_store() {
    let env = TestEnvironment::new();
    let mut pipeline = env.pipeline(env.config(), None);

    let first = env.write_read("SAMPLE_X1_Y2_ch5_read3_strand.fast5", "ACGTACGT");
    let second = env.write_read("SAMPLE_X1_Y2_ch7_read9_strand.fast5", "TTGACCA");

    for path in [&first, &second] {
        let outcome = pipeline.process_file(path).unwrap();
        assert!(
            matches!(&outcome, FileOutcome::Stored { run, .. } if run == "alice_SAMPLE"),
            "unexpected outcome {:?}",
            outcome
        );
    }

    assert_eq!(pipeline.registry().len(), 1);
    assert_eq!(pipeline.registry().active(), Some("alice_SAMPLE"));

    let tracking = rows(&env, "alice_SAMPLE", "tracking_id");
    assert_eq!(tracking.len(), 2);
    assert_eq!(tracking[0]["basename"], Value::from("SAMPLE_X1_Y2_ch5_read3_strand"));
    assert_eq!(tracking[0]["pass"], Value::Integer(1));

    let reads = rows(&env, "alice_SAMPLE", "basecalled_template");
    assert_eq!(reads.len(), 2);
    assert_eq!(reads[1]["seqlen"], Value::Integer(7));
    assert_eq!(reads[1]["align"], Value::Integer(0));

    let runs = pipeline
        .registry_mut()
        .catalogue()
        .find_runs("alice_SAMPLE")
        .unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0]["activeflag"], Value::Integer(1));
}

#[test]
fn test_new_prefix_switches_the_active_run() {
    let env = TestEnvironment::new();
    let mut pipeline = env.pipeline(env.config(), None);

    let a = env.write_read("SAMPLE_X1_Y2_ch5_read3_strand.fast5", "ACGT");
    let b = env.write_read("OTHER_X1_Y2_ch5_read3_strand.fast5", "ACGT");
    let a2 = env.write_read("SAMPLE_X1_Y2_ch6_read4_strand.fast5", "ACGT");

    pipeline.process_file(&a).unwrap();
    pipeline.process_file(&b).unwrap();
    assert_eq!(pipeline.registry().active(), Some("alice_OTHER"));
    pipeline.process_file(&a2).unwrap();
    assert_eq!(pipeline.registry().active(), Some("alice_SAMPLE"));

    let catalogue = pipeline.registry_mut().catalogue();
    let flag = |runs: Vec<Row>| runs[0]["activeflag"].clone();
    assert_eq!(flag(catalogue.find_runs("alice_SAMPLE").unwrap()), Value::Integer(1));
    assert_eq!(flag(catalogue.find_runs("alice_OTHER").unwrap()), Value::Integer(0));

    let runindex = pipeline.registry().get("alice_SAMPLE").unwrap().runindex;
    let comments = pipeline.registry_mut().catalogue().comments_for(runindex).unwrap();
    assert!(comments.iter().any(|c| c.contains("switched runname")));

    assert_eq!(pipeline.finish(), 2);
    let catalogue = pipeline.registry_mut().catalogue();
    assert_eq!(flag(catalogue.find_runs("alice_SAMPLE").unwrap()), Value::Integer(0));
}

#[test]
fn test_tabular_hit_records_both_extremities() {
    let env = TestEnvironment::new();
    let path = env.write_read("SAMPLE_X1_Y2_ch5_read3_strand.fast5", "TTACGTAC");
    let id = seqid(&path);
    let sam = format!(
        "@SQ\tSN:lambda\tLN:28\n\
{}\t0\tlambda\t5\t60\t2S6M\t*\t0\t0\tTTACGTAC\tIIIIIIII\tNM:i:1\tMD:Z:3A2\tAS:i:5\n",
        id
    );
    let aligner = MockAligner::new(OutputProtocol::Tabular).with_output(&id, &sam);
    let mut pipeline = env.pipeline(env.aligning_config(), Some(Box::new(aligner)));

    let outcome = pipeline.process_file(&path).unwrap();
    assert!(matches!(outcome, FileOutcome::Stored { .. }));

    let read = rows(&env, "alice_SAMPLE", "basecalled_template");
    assert_eq!(read[0]["align"], Value::Integer(1));

    let five = rows(&env, "alice_SAMPLE", "last_align_basecalled_template_5prime");
    let three = rows(&env, "alice_SAMPLE", "last_align_basecalled_template_3prime");
    assert_eq!((five.len(), three.len()), (1, 1));
    assert_eq!(five[0]["seqpos"], Value::Integer(3));
    assert_eq!(five[0]["refpos"], Value::Integer(5));
    assert_eq!(three[0]["seqpos"], Value::Integer(8));
    assert_eq!(three[0]["refpos"], Value::Integer(10));

    let sam_rows = rows(&env, "alice_SAMPLE", "align_sam_basecalled_template");
    assert_eq!(sam_rows.len(), 1);

    let info = rows(&env, "alice_SAMPLE", "reference_seq_info");
    assert_eq!(info[0]["refname"], Value::from("lambda"));
    assert_eq!(info[0]["reflen"], Value::Integer(28));
}

#[test]
fn test_aligner_failure_keeps_the_read() {
    let env = TestEnvironment::new();
    let path = env.write_read("SAMPLE_X1_Y2_ch5_read3_strand.fast5", "TTACGTAC");
    let aligner = MockAligner::new(OutputProtocol::Tabular).with_failure(&seqid(&path));
    let mut pipeline = env.pipeline(env.aligning_config(), Some(Box::new(aligner)));

    let outcome = pipeline.process_file(&path).unwrap();
    assert!(matches!(outcome, FileOutcome::Stored { .. }));
    let read = rows(&env, "alice_SAMPLE", "basecalled_template");
    assert_eq!(read[0]["align"], Value::Integer(0));

    let log = std::fs::read_to_string(env.path("logs/alice_SAMPLE.poreflow.log")).unwrap();
    assert!(log.contains("failed"));
}

#[test]
fn test_existing_store_needs_drop_or_resume() {
    let env = TestEnvironment::new();
    let path = env.write_read("SAMPLE_X1_Y2_ch5_read3_strand.fast5", "ACGT");
    {
        let mut pipeline = env.pipeline(env.config(), None);
        pipeline.process_file(&path).unwrap();
        pipeline.finish();
    }

    let mut fresh = env.pipeline(env.config(), None);
    let err = fresh.process_file(&path).unwrap_err();
    assert!(matches!(err, PoreflowError::RunExists(ref name) if name == "alice_SAMPLE"));

    let mut config = env.config();
    config.run.resume = true;
    let mut resumed = env.pipeline(config, None);
    assert_eq!(
        resumed.process_file(&path).unwrap(),
        FileOutcome::Skipped {
            run: "alice_SAMPLE".to_string()
        }
    );
    let next = env.write_read("SAMPLE_X1_Y2_ch5_read4_strand.fast5", "ACGTT");
    assert!(matches!(resumed.process_file(&next).unwrap(), FileOutcome::Stored { .. }));
    assert_eq!(rows(&env, "alice_SAMPLE", "tracking_id").len(), 2);
    resumed.finish();
    drop(resumed);
    drop(fresh);

    let mut config = env.config();
    config.run.drop_existing = true;
    let mut replaced = env.pipeline(config, None);
    replaced.process_file(&path).unwrap();
    assert_eq!(rows(&env, "alice_SAMPLE", "tracking_id").len(), 1);
    let runs = replaced
        .registry_mut()
        .catalogue()
        .find_runs("alice_SAMPLE")
        .unwrap();
    assert_eq!(runs.len(), 1);
}

#[test]
fn test_broken_file_is_logged_and_skipped() {
    let env = TestEnvironment::new();
    let mut pipeline = env.pipeline(env.config(), None);

    let good = env.write_read("SAMPLE_X1_Y2_ch5_read3_strand.fast5", "ACGT");
    pipeline.process_file(&good).unwrap();

    let broken = env.write_file(
        "watch/downloads/pass/SAMPLE_X1_Y2_ch9_read1_strand.fast5",
        r#"{"attributes": {}}"#,
    );
    let outcome = pipeline.process_file(&broken).unwrap();
    assert!(matches!(outcome, FileOutcome::Failed { .. }));

    let log = std::fs::read_to_string(env.path("logs/alice_SAMPLE.poreflow.log")).unwrap();
    assert!(log.contains("SAMPLE_X1_Y2_ch9_read1_strand.fast5"));
    assert_eq!(rows(&env, "alice_SAMPLE", "tracking_id").len(), 1);
}

#[test]
fn test_custom_name_is_part_of_the_run() {
    let env = TestEnvironment::new();
    let mut config = env.config();
    config.run.custom_name = Some("lib1".to_string());
    let mut pipeline = env.pipeline(config, None);

    let path = env.write_read("SAMPLE_X1_Y2_ch5_read3_strand.fast5", "ACGT");
    let outcome = pipeline.process_file(&path).unwrap();
    assert!(matches!(outcome, FileOutcome::Stored { ref run, .. } if run == "alice_lib1_SAMPLE"));

    let summary = rows(&env, "alice_lib1_SAMPLE", "basecall_summary");
    assert_eq!(summary[0]["mean_qscoreT"], Value::Real(9.1));
}

#[test]
fn test_failed_store_leaves_no_partial_rows() {
    let env = TestEnvironment::new();
    let mut pipeline = env.pipeline(env.config(), None);
    let first = env.write_read("SAMPLE_X1_Y2_ch5_read3_strand.fast5", "ACGT");
    pipeline.process_file(&first).unwrap();

    rusqlite::Connection::open(env.path("store/alice_SAMPLE.sqlite"))
        .unwrap()
        .execute_batch("DROP TABLE config_general")
        .unwrap();

    let second = env.write_read("SAMPLE_X1_Y2_ch5_read4_strand.fast5", "ACGTT");
    let outcome = pipeline.process_file(&second).unwrap();
    assert!(matches!(outcome, FileOutcome::Failed { .. }));

    assert_eq!(rows(&env, "alice_SAMPLE", "tracking_id").len(), 1);
    assert_eq!(rows(&env, "alice_SAMPLE", "basecalled_template").len(), 1);
    let session = pipeline.registry().get("alice_SAMPLE").unwrap();
    assert!(!session.is_stored("SAMPLE_X1_Y2_ch5_read4_strand"));
}

#[test]
fn test_store_error_on_a_known_run_fails_only_that_file() {
    let env = TestEnvironment::new();
    let (mut pipeline, fail_updates) = env.flaky_pipeline(env.config());

    let a = env.write_read("SAMPLE_X1_Y2_ch5_read3_strand.fast5", "ACGT");
    let b = env.write_read("OTHER_X1_Y2_ch5_read3_strand.fast5", "ACGT");
    pipeline.process_file(&a).unwrap();
    pipeline.process_file(&b).unwrap();

    // Switching back to a known run needs a catalogue update
    fail_updates.store(true, Ordering::SeqCst);
    let a2 = env.write_read("SAMPLE_X1_Y2_ch6_read4_strand.fast5", "ACGT");
    let outcome = pipeline.process_file(&a2).unwrap();
    assert!(matches!(outcome, FileOutcome::Failed { .. }));
    let log = std::fs::read_to_string(env.path("logs/alice_SAMPLE.poreflow.log")).unwrap();
    assert!(log.contains("SAMPLE_X1_Y2_ch6_read4_strand.fast5"));

    fail_updates.store(false, Ordering::SeqCst);
    let a3 = env.write_read("SAMPLE_X1_Y2_ch7_read5_strand.fast5", "ACGT");
    assert!(matches!(
        pipeline.process_file(&a3).unwrap(),
        FileOutcome::Stored { ref run, .. } if run == "alice_SAMPLE"
    ));

    // A run that cannot be provisioned still stops the watch
    fail_updates.store(true, Ordering::SeqCst);
    let c = env.write_read("THIRD_X1_Y2_ch5_read3_strand.fast5", "ACGT");
    assert!(pipeline.process_file(&c).is_err());
}
