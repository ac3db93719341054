mod common;

use common::TestEnvironment;
use pretty_assertions::assert_eq;

use poreflow::reference::{ReferenceManager, ReferenceSource};
use poreflow::tools::{MockAligner, OutputProtocol};
use poreflow::PoreflowError;

fn manager(env: &TestEnvironment, files: Vec<std::path::PathBuf>, kmers: bool) -> ReferenceManager {
    ReferenceManager::new(
        env.path("valid_refs"),
        env.path("index"),
        kmers.then_some(5),
        ReferenceSource::Fixed(files),
    )
}

#[test]
fn test_twenty_bases_give_thirty_two_kmers() {
    let env = TestEnvironment::new();
    let fasta = env.write_file("refs/short.fasta", ">short\nACGTACGTACGTACGTACGT\n");
    let mut refs = manager(&env, vec![fasta], true);

    let set = refs.prepare_all(None).unwrap().remove(0);
    assert_eq!(set.total_len, 20);
    assert_eq!(set.kmers["short"].total(), 32);
}

#[test]
fn test_merged_set_is_validated_and_indexed_once() {
    let env = TestEnvironment::new();
    let a = env.write_file("refs/lambda.fasta", ">lambda\nacgtacgt\n");
    let b = env.write_file("refs/phix.fa", ">phix\nTTTT\n>phix2\nGG\n");
    let aligner = MockAligner::new(OutputProtocol::Tabular);

    let mut refs = manager(&env, vec![a.clone(), b.clone()], false);
    let set = refs.prepare_all(Some(&aligner)).unwrap().remove(0);
    assert_eq!(set.basename, "lambda_plus_1_more_seqs");
    assert_eq!(set.total_len, 14);
    assert_eq!(set.file_len["phix.fa"], 6);
    assert!(set.index_prefix.is_some());

    let validated = std::fs::read_to_string(env.path("valid_refs/lambda_plus_1_more_seqs_valid.fasta")).unwrap();
    assert!(validated.contains("ACGTACGT"));

    // A second manager finds the index already built
    let mut again = manager(&env, vec![a, b], false);
    again.prepare_all(Some(&aligner)).unwrap();
    assert_eq!(aligner.index_builds(), 1);
}

#[test]
fn test_empty_reference_is_fatal() {
    let env = TestEnvironment::new();
    let empty = env.write_file("refs/empty.fasta", "");
    let mut refs = manager(&env, vec![empty], false);

    let err = refs.prepare_all(None).unwrap_err();
    assert!(matches!(err, PoreflowError::Reference { ref file, .. } if file.contains("empty.fasta")));
    assert!(!env.path("valid_refs/empty_valid.fasta").exists());
}

#[test]
fn test_alignment_without_reference_is_a_config_error() {
    let env = TestEnvironment::new();
    let mut config = env.config();
    config.alignment.mode = poreflow::core::AlignMode::Last;
    let result = poreflow::Pipeline::with_parts(
        config,
        env.gateway(),
        Box::new(poreflow::container::JsonSource),
        None,
    );
    assert!(matches!(result, Err(PoreflowError::Config(_))));
}
