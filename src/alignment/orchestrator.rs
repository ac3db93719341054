//! Per-read alignment and upload of the hits.
//!
//! Every basecalled read of a file becomes one task on the run's worker
//! pool. A task feeds the read to the aligner, stores the raw hits, flags
//! the read as aligned and keeps the furthest 5' and 3' extremities.

use indexmap::IndexMap;
use std::path::Path;

use crate::alignment::cigar::{from_gapped, parse_cigar, parse_md, query_length, CigarOp};
use crate::alignment::coordinates::{translate, Translation, GAP, UNKNOWN_BASE};
use crate::alignment::extremity::{AlignStrand, Extremity, ExtremityTracker};
use crate::alignment::pool::{fan_out, Task, TaskFailure};
use crate::extract::SequenceRecord;
use crate::session::RunSession;
use crate::storage::schema::{maf_table_name, sam_table_name};
use crate::storage::traits::StoreConnection;
use crate::storage::value::row;
use crate::tools::maf::{parse_maf, AlignmentBlock};
use crate::tools::sam::{parse_sam, SamRecord};
use crate::tools::traits::{Aligner, OutputProtocol};
use crate::{PoreflowError, Result};

/// Read-only state shared by the tasks of one file
pub struct RunContext<'a> {
    pub aligner: &'a dyn Aligner,
    pub index_prefix: &'a Path,
    pub reference_ids: &'a IndexMap<String, i64>,
    pub basename_id: i64,
}

/// What one read's alignment produced
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AlignOutcome {
    pub hits: usize,
    pub extremities: usize,
}

impl RunContext<'_> {
    fn refid(&self, name: &str) -> Option<i64> {
        self.reference_ids.get(name).copied()
    }
}

/// Align every read of a stored file on the run's pool and wait for all of
/// them. Runs without a reference are left alone.
pub fn align_reads(
    session: &mut RunSession,
    aligner: &dyn Aligner,
    basename_id: i64,
    sequences: &[SequenceRecord],
) -> Result<Vec<TaskFailure>> {
    let RunSession {
        reference,
        reference_ids,
        pool,
        ..
    } = session;
    let Some(reference) = reference.as_ref() else {
        return Ok(Vec::new());
    };
    let index_prefix = reference.index_prefix.as_deref().ok_or_else(|| {
        PoreflowError::Alignment(format!("reference {} has no {} index", reference.basename, aligner.name()))
    })?;

    let ctx = RunContext {
        aligner,
        index_prefix,
        reference_ids,
        basename_id,
    };
    let ctx = &ctx;
    let tasks = sequences
        .iter()
        .filter(|seq| !seq.is_empty())
        .map(|seq| {
            Task::new(seq.seqid.clone(), move |conn: &mut dyn StoreConnection| {
                align_sequence(ctx, seq, conn).map(|outcome| {
                    tracing::debug!(
                        "{}: {} hits, {} extremities",
                        seq.seqid,
                        outcome.hits,
                        outcome.extremities
                    );
                })
            })
        })
        .collect();

    Ok(fan_out(pool, tasks))
}

/// Align one read and store what the aligner reports
pub fn align_sequence(
    ctx: &RunContext<'_>,
    seq: &SequenceRecord,
    conn: &mut dyn StoreConnection,
) -> Result<AlignOutcome> {
    let output = ctx
        .aligner
        .align(ctx.index_prefix, &seq.fasta())
        .map_err(|e| PoreflowError::Alignment(format!("{} failed on {}: {:#}", ctx.aligner.name(), seq.seqid, e)))?;

    let mut tracker = ExtremityTracker::new();
    let hits = match ctx.aligner.protocol() {
        OutputProtocol::Tabular => store_sam(ctx, seq, &output, conn, &mut tracker)?,
        OutputProtocol::Block => store_maf(ctx, seq, &output, conn, &mut tracker)?,
    };

    if hits > 0 {
        conn.update(
            seq.strand.table(),
            &row([("align", 1.into())]),
            &row([("basename_id", ctx.basename_id.into())]),
        )?;
    }
    let extremities = tracker.persist(conn, ctx.basename_id)?;
    Ok(AlignOutcome { hits, extremities })
}

fn store_sam(
    ctx: &RunContext<'_>,
    seq: &SequenceRecord,
    output: &str,
    conn: &mut dyn StoreConnection,
    tracker: &mut ExtremityTracker,
) -> Result<usize> {
    let table = seq.strand.table();
    let mut hits = 0;
    for (n, record) in parse_sam(output)?.iter().enumerate() {
        let Some(refid) = ctx.refid(&record.rname) else {
            tracing::warn!("{} aligned to unknown reference {}", seq.seqid, record.rname);
            continue;
        };
        conn.insert(&sam_table_name(table), &record.to_row(ctx.basename_id))?;
        hits += 1;

        if record.is_primary() {
            let translation = translate_record(record)?;
            let (five, three) = sam_extremities(record, &translation, refid, n as i64 + 1, seq);
            tracker.offer(table, five, three);
        }
    }
    Ok(hits)
}

fn translate_record(record: &SamRecord) -> Result<Translation> {
    if record.seq == "*" {
        return Err(PoreflowError::Alignment(format!(
            "primary alignment of {} carries no sequence",
            record.qname
        )));
    }
    let cigar = parse_cigar(&record.cigar)?;
    if query_length(&cigar) != record.seq.len() {
        return Err(PoreflowError::Alignment(format!(
            "CIGAR {} of {} does not match its {} bases",
            record.cigar,
            record.qname,
            record.seq.len()
        )));
    }
    let md = match record.tag_value("MD") {
        Some(md) => parse_md(md)?,
        None => Vec::new(),
    };
    translate(&cigar, &md, record.pos, record.seq.as_bytes())
}

/// Lay a block out as a SAM-style alignment of the whole read, with the
/// unaligned read bases on either side as hard clips
fn translate_block(block: &AlignmentBlock) -> Result<Translation> {
    let q = &block.query;
    let r = &block.reference;
    let (aligned, md) = from_gapped(r.text.as_bytes(), q.text.as_bytes())?;
    let read: Vec<u8> = q.text.bytes().filter(|&b| b != GAP).collect();

    let clip = |n: u64| {
        u32::try_from(n)
            .map_err(|_| PoreflowError::Alignment(format!("read {} is too long to clip", q.name)))
    };
    let leading = clip(q.start)?;
    let trailing = clip(q.src_size.saturating_sub(q.start + read.len() as u64))?;

    let mut cigar = Vec::with_capacity(aligned.len() + 2);
    if leading > 0 {
        cigar.push((CigarOp::H, leading));
    }
    cigar.extend(aligned);
    if trailing > 0 {
        cigar.push((CigarOp::H, trailing));
    }
    translate(&cigar, &md, r.start + 1, &read)
}

fn read_base(seq: &SequenceRecord, seqpos: u64) -> (u8, u8) {
    let at = (seqpos as usize).saturating_sub(1);
    let base = seq.sequence.as_bytes().get(at).copied().unwrap_or(UNKNOWN_BASE);
    let qual = seq.quality.get(at).copied().unwrap_or(0);
    (base, qual)
}

/// 5' and 3' ends of a translated hit, in read coordinates. The reference
/// ends swap on the reverse strand.
fn hit_extremities(
    translation: &Translation,
    strand: AlignStrand,
    score: i64,
    refid: i64,
    alignnum: i64,
    seq: &SequenceRecord,
) -> (Extremity, Extremity) {
    let (five_pos, three_pos) = translation.read_positions(strand);
    let first = (translation.r_start, translation.first_ref_base);
    let last = (translation.r_stop, translation.last_ref_base);
    let (five_ref, three_ref) = match strand {
        AlignStrand::Forward => (first, last),
        AlignStrand::Reverse => (last, first),
    };

    let end = |seqpos: u64, (refpos, refbase): (u64, u8)| {
        let (seqbase, seqbasequal) = read_base(seq, seqpos);
        Extremity {
            refid,
            alignnum,
            strand,
            score,
            seqpos,
            refpos,
            seqbase,
            refbase,
            seqbasequal,
        }
    };
    (end(five_pos, five_ref), end(three_pos, three_ref))
}

pub fn sam_extremities(
    record: &SamRecord,
    translation: &Translation,
    refid: i64,
    alignnum: i64,
    seq: &SequenceRecord,
) -> (Extremity, Extremity) {
    let score = record
        .tag_value("AS")
        .and_then(|s| s.parse().ok())
        .unwrap_or(record.mapq);
    hit_extremities(translation, record.strand(), score, refid, alignnum, seq)
}

fn store_maf(
    ctx: &RunContext<'_>,
    seq: &SequenceRecord,
    output: &str,
    conn: &mut dyn StoreConnection,
    tracker: &mut ExtremityTracker,
) -> Result<usize> {
    let table = seq.strand.table();
    let mut hits = 0;
    for (n, block) in parse_maf(output)?.iter().enumerate() {
        let Some(refid) = ctx.refid(&block.reference.name) else {
            tracing::warn!("{} aligned to unknown reference {}", seq.seqid, block.reference.name);
            continue;
        };
        let alignnum = n as i64 + 1;
        conn.insert(&maf_table_name(table), &block.to_row(ctx.basename_id, refid, alignnum))?;
        hits += 1;

        let (five, three) = maf_extremities(block, refid, alignnum, seq)?;
        tracker.offer(table, five, three);
    }
    Ok(hits)
}

/// 5' and 3' ends of a MAF block. Reverse-strand query coordinates are
/// counted on the reverse complement and are mapped back onto the read.
pub fn maf_extremities(
    block: &AlignmentBlock,
    refid: i64,
    alignnum: i64,
    seq: &SequenceRecord,
) -> Result<(Extremity, Extremity)> {
    let translation = translate_block(block)?;
    Ok(hit_extremities(&translation, block.strand(), block.score, refid, alignnum, seq))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::AlignMode;
    use crate::extract::Strand;
    use crate::storage::schema::{run_tables, TableOptions};
    use crate::storage::sqlite::SqliteConnection;
    use crate::storage::value::{Row, Value};
    use crate::tools::mock::MockAligner;
    use pretty_assertions::assert_eq;

    fn template(sequence: &str) -> SequenceRecord {
        SequenceRecord {
            strand: Strand::Template,
            seqid: "r1.basecalled_template".to_string(),
            sequence: sequence.to_string(),
            quality: (0..sequence.len() as u8).collect(),
            start_time: 0.0,
            attributes: Row::new(),
        }
    }

    fn store(protocol: AlignMode) -> SqliteConnection {
        let mut conn = SqliteConnection::open_in_memory().unwrap();
        for table in run_tables(TableOptions {
            telemetry: false,
            reference: true,
            protocol,
        }) {
            conn.create_table(&table).unwrap();
        }
        conn.insert(
            "basecalled_template",
            &row([
                ("basename_id", 1.into()),
                ("seqid", "r1.basecalled_template".into()),
                ("seqlen", 8.into()),
                ("pass", 1.into()),
            ]),
        )
        .unwrap();
        conn
    }

    fn ids() -> IndexMap<String, i64> {
        [("lambda".to_string(), 1)].into_iter().collect()
    }

    #[test]
    fn test_sam_hit_sets_align_and_extremities() {
        let sam = "@SQ\tSN:lambda\tLN:48502\n\
r1.basecalled_template\t0\tlambda\t100\t60\t2S6M\t*\t0\t0\tTTACGTAC\tIIIIIIII\tNM:i:1\tMD:Z:3A2\tAS:i:5\n";
        let aligner = MockAligner::new(OutputProtocol::Tabular).with_output("r1.basecalled_template", sam);
        let reference_ids = ids();
        let ctx = RunContext {
            aligner: &aligner,
            index_prefix: Path::new("/idx/lambda"),
            reference_ids: &reference_ids,
            basename_id: 1,
        };
        let mut conn = store(AlignMode::Bwa);

        let outcome = align_sequence(&ctx, &template("TTACGTAC"), &mut conn).unwrap();
        assert_eq!(outcome, AlignOutcome { hits: 1, extremities: 2 });

        let read = conn.select("basecalled_template", &Row::new()).unwrap();
        assert_eq!(read[0]["align"], Value::Integer(1));

        let five = conn.select("last_align_basecalled_template_5prime", &Row::new()).unwrap();
        let three = conn.select("last_align_basecalled_template_3prime", &Row::new()).unwrap();
        assert_eq!(five.len(), 1);
        assert_eq!(three.len(), 1);
        assert_eq!(five[0]["seqpos"], Value::Integer(3));
        assert_eq!(five[0]["refpos"], Value::Integer(100));
        assert_eq!(three[0]["seqpos"], Value::Integer(8));
        assert_eq!(three[0]["refpos"], Value::Integer(105));
        assert_eq!(five[0]["score"], Value::Integer(5));
        assert_eq!(conn.select("align_sam_basecalled_template", &Row::new()).unwrap().len(), 1);
    }

    #[test]
    fn test_reverse_sam_hit_is_reported_on_the_read() {
        // SEQ is the reverse complement of AAAACCCGGT; the clipped bases are the read's 3' end
        let sam = "r1.basecalled_template\t16\tlambda\t100\t60\t3S7M\t*\t0\t0\tACCGGGTTTT\tIIIIIIIIII\tMD:Z:7\n";
        let aligner = MockAligner::new(OutputProtocol::Tabular).with_output("r1.basecalled_template", sam);
        let reference_ids = ids();
        let ctx = RunContext {
            aligner: &aligner,
            index_prefix: Path::new("/idx/lambda"),
            reference_ids: &reference_ids,
            basename_id: 1,
        };
        let mut conn = store(AlignMode::Bwa);

        align_sequence(&ctx, &template("AAAACCCGGT"), &mut conn).unwrap();

        let five = conn.select("last_align_basecalled_template_5prime", &Row::new()).unwrap();
        let three = conn.select("last_align_basecalled_template_3prime", &Row::new()).unwrap();
        assert_eq!(five[0]["seqpos"], Value::Integer(1));
        assert_eq!(five[0]["seqbase"], Value::from("A"));
        assert_eq!(five[0]["seqbasequal"], Value::Integer(0));
        assert_eq!(five[0]["refpos"], Value::Integer(106));
        assert_eq!(three[0]["seqpos"], Value::Integer(7));
        assert_eq!(three[0]["seqbase"], Value::from("C"));
        assert_eq!(three[0]["seqbasequal"], Value::Integer(6));
        assert_eq!(three[0]["refpos"], Value::Integer(100));
        assert_eq!(three[0]["alignstrand"], Value::from("R"));
    }

    #[test]
    fn test_sam_hit_with_wrong_sequence_length_is_an_error() {
        let sam = "r1.basecalled_template\t0\tlambda\t100\t60\t8M\t*\t0\t0\tACGT\tIIII\n";
        let aligner = MockAligner::new(OutputProtocol::Tabular).with_output("r1.basecalled_template", sam);
        let reference_ids = ids();
        let ctx = RunContext {
            aligner: &aligner,
            index_prefix: Path::new("/idx/lambda"),
            reference_ids: &reference_ids,
            basename_id: 1,
        };
        let mut conn = store(AlignMode::Bwa);
        let err = align_sequence(&ctx, &template("ACGT"), &mut conn).unwrap_err();
        assert!(matches!(err, PoreflowError::Alignment(_)));
    }

    #[test]
    fn test_maf_block_with_edge_indels() {
        // Leading read insertion and trailing reference deletion
        let maf = "a score=12\n\
s lambda                 199 6 + 48502 -ACGTAC\n\
s r1.basecalled_template   2 6 + 20    TACGTA-\n";
        let block = &parse_maf(maf).unwrap()[0];
        let read = template("GGTACGTAGGGGGGGGGGGG");

        let (five, three) = maf_extremities(block, 1, 1, &read).unwrap();
        assert_eq!((five.seqpos, five.refpos, five.refbase), (3, 200, b'A'));
        assert_eq!((three.seqpos, three.refpos, three.refbase), (8, 205, b'C'));
        assert_eq!((five.seqbase, three.seqbase), (b'T', b'A'));

        let reverse = maf.replace("2 6 + 20", "2 6 - 20");
        let block = &parse_maf(&reverse).unwrap()[0];
        let (five, three) = maf_extremities(block, 1, 1, &read).unwrap();
        assert_eq!((five.seqpos, five.refpos, five.refbase), (13, 205, b'C'));
        assert_eq!((three.seqpos, three.refpos, three.refbase), (18, 200, b'A'));
    }

    #[test]
    fn test_no_hits_leaves_read_unaligned() {
        let aligner = MockAligner::new(OutputProtocol::Tabular).with_output(
            "r1.basecalled_template",
            "r1.basecalled_template\t4\t*\t0\t0\t*\t*\t0\t0\tACGT\tIIII\n",
        );
        let reference_ids = ids();
        let ctx = RunContext {
            aligner: &aligner,
            index_prefix: Path::new("/idx/lambda"),
            reference_ids: &reference_ids,
            basename_id: 1,
        };
        let mut conn = store(AlignMode::Bwa);

        let outcome = align_sequence(&ctx, &template("ACGT"), &mut conn).unwrap();
        assert_eq!(outcome, AlignOutcome::default());
        let read = conn.select("basecalled_template", &Row::new()).unwrap();
        assert_eq!(read[0]["align"], Value::Integer(0));
    }

    #[test]
    fn test_aligner_failure_is_an_error() {
        let aligner = MockAligner::new(OutputProtocol::Tabular).with_failure("r1.basecalled_template");
        let reference_ids = ids();
        let ctx = RunContext {
            aligner: &aligner,
            index_prefix: Path::new("/idx/lambda"),
            reference_ids: &reference_ids,
            basename_id: 1,
        };
        let mut conn = store(AlignMode::Bwa);
        let err = align_sequence(&ctx, &template("ACGT"), &mut conn).unwrap_err();
        assert!(matches!(err, PoreflowError::Alignment(_)));
    }

    #[test]
    fn test_maf_blocks_and_reverse_strand() {
        let maf = "a score=27\n\
s lambda                 100 10 + 48502 ACGTAC-GTAC\n\
s r1.basecalled_template   2 11 + 20    ACGTACTGTAC\n\
\n\
a score=15\n\
s lambda       300 5 + 48502 TTGCA\n\
s r1.basecalled_template   4 5 - 20    TTGGA\n";
        let aligner = MockAligner::new(OutputProtocol::Block).with_output("r1.basecalled_template", maf);
        let reference_ids = ids();
        let ctx = RunContext {
            aligner: &aligner,
            index_prefix: Path::new("/idx/lambda"),
            reference_ids: &reference_ids,
            basename_id: 1,
        };
        let mut conn = store(AlignMode::Last);

        let outcome = align_sequence(&ctx, &template("ACGTACGTACGTACGTACGT"), &mut conn).unwrap();
        assert_eq!(outcome.hits, 2);
        assert_eq!(
            conn.select("last_align_maf_basecalled_template", &Row::new()).unwrap().len(),
            2
        );

        let blocks = parse_maf(maf).unwrap();
        let (five, three) = maf_extremities(&blocks[1], 1, 2, &template("ACGTACGTACGTACGTACGT")).unwrap();
        assert_eq!((five.seqpos, three.seqpos), (12, 16));
        assert_eq!((five.refpos, five.refbase), (305, b'A'));
        assert_eq!((three.refpos, three.refbase), (301, b'T'));

        // Forward block reaches further 5', the reverse one further 3'
        let five_row = conn.select("last_align_basecalled_template_5prime", &Row::new()).unwrap();
        assert_eq!(five_row[0]["seqpos"], Value::Integer(3));
        let three_row = conn.select("last_align_basecalled_template_3prime", &Row::new()).unwrap();
        assert_eq!(three_row[0]["seqpos"], Value::Integer(16));
    }
}
