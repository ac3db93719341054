//! Table catalogue for run schemas and the run catalogue.
//!
//! Only the tables the pipeline writes to are described here. Table specs
//! render to portable `CREATE TABLE IF NOT EXISTS` statements.

use crate::core::config::AlignMode;

pub const TRACKING_ID: &str = "tracking_id";
pub const CONFIG_GENERAL: &str = "config_general";
pub const BASECALL_SUMMARY: &str = "basecall_summary";
pub const BARCODE_ASSIGNMENT: &str = "barcode_assignment";
pub const REFERENCE_SEQ_INFO: &str = "reference_seq_info";
pub const REF_SEQUENCE_KMER: &str = "ref_sequence_kmer";
pub const MODEL_LIST: &str = "model_list";
pub const MODEL_DATA: &str = "model_data";

/// Read tables, one per basecalled strand
pub const STRAND_TABLES: [&str; 3] = [
    "basecalled_template",
    "basecalled_complement",
    "basecalled_2d",
];

pub const MINION_RUNS: &str = "minion_runs";
pub const COMMENTS: &str = "comments";
pub const USERS: &str = "users";
pub const USERRUN: &str = "userrun";

/// Number of telemetry shards, keyed by the last digit of the channel
pub const CHANNEL_SHARDS: usize = 10;

/// Time bucket widths in minutes
pub const WINDOW_MINUTES: [u32; 4] = [1, 5, 10, 15];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// Auto-incrementing integer primary key
    Serial,
    Integer,
    Real,
    Text,
}

impl ColumnType {
    fn sql(&self) -> &'static str {
        match self {
            ColumnType::Serial => "INTEGER PRIMARY KEY AUTOINCREMENT",
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Text => "TEXT",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ColumnSpec {
    pub name: String,
    pub ty: ColumnType,
    pub not_null: bool,
    pub primary_key: bool,
    pub unique: bool,
    pub default: Option<&'static str>,
}

#[derive(Debug, Clone)]
pub struct TableSpec {
    pub name: String,
    pub columns: Vec<ColumnSpec>,
    pub indexes: Vec<Vec<String>>,
}

/// Quote an identifier for use in a statement
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

impl TableSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            indexes: Vec::new(),
        }
    }

    fn push(mut self, name: &str, ty: ColumnType) -> Self {
        self.columns.push(ColumnSpec {
            name: name.to_string(),
            ty,
            not_null: false,
            primary_key: false,
            unique: false,
            default: None,
        });
        self
    }

    fn last_mut(&mut self) -> Option<&mut ColumnSpec> {
        self.columns.last_mut()
    }

    pub fn serial(self, name: &str) -> Self {
        self.push(name, ColumnType::Serial)
    }

    pub fn key(mut self, name: &str, ty: ColumnType) -> Self {
        self = self.push(name, ty);
        if let Some(col) = self.last_mut() {
            col.primary_key = true;
        }
        self
    }

    pub fn column(self, name: &str, ty: ColumnType) -> Self {
        self.push(name, ty)
    }

    pub fn columns(mut self, names: &[&str], ty: ColumnType) -> Self {
        for name in names {
            self = self.push(name, ty);
        }
        self
    }

    pub fn required(mut self, name: &str, ty: ColumnType) -> Self {
        self = self.push(name, ty);
        if let Some(col) = self.last_mut() {
            col.not_null = true;
        }
        self
    }

    pub fn unique(mut self, name: &str, ty: ColumnType) -> Self {
        self = self.push(name, ty);
        if let Some(col) = self.last_mut() {
            col.unique = true;
        }
        self
    }

    /// Integer flag defaulting to zero
    pub fn flag(mut self, name: &str) -> Self {
        self = self.push(name, ColumnType::Integer);
        if let Some(col) = self.last_mut() {
            col.default = Some("0");
        }
        self
    }

    pub fn index(mut self, columns: &[&str]) -> Self {
        self.indexes
            .push(columns.iter().map(|c| c.to_string()).collect());
        self
    }

    /// The four time bucket columns, each indexed
    fn windows(mut self) -> Self {
        for minutes in WINDOW_MINUTES {
            let name = window_column(minutes);
            self = self
                .required(&name, ColumnType::Integer)
                .index(&[name.as_str()]);
        }
        self
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// DDL for the table followed by one statement per index
    pub fn create_statements(&self) -> Vec<String> {
        let cols: Vec<String> = self
            .columns
            .iter()
            .map(|c| {
                let mut def = format!("{} {}", quote_ident(&c.name), c.ty.sql());
                if c.primary_key {
                    def.push_str(" PRIMARY KEY");
                }
                if c.not_null {
                    def.push_str(" NOT NULL");
                }
                if c.unique {
                    def.push_str(" UNIQUE");
                }
                if let Some(d) = c.default {
                    def.push_str(" DEFAULT ");
                    def.push_str(d);
                }
                def
            })
            .collect();

        let mut statements = vec![format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quote_ident(&self.name),
            cols.join(", ")
        )];

        for index in &self.indexes {
            let index_name = format!("idx_{}_{}", self.name, index.join("_"));
            let cols: Vec<String> = index.iter().map(|c| quote_ident(c)).collect();
            statements.push(format!(
                "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
                quote_ident(&index_name),
                quote_ident(&self.name),
                cols.join(", ")
            ));
        }
        statements
    }
}

/// Column name of the time bucket for a window width
pub fn window_column(minutes: u32) -> String {
    format!("{}minwin", minutes)
}

pub fn tracking_id() -> TableSpec {
    use ColumnType::*;
    TableSpec::new(TRACKING_ID)
        .serial("basename_id")
        .required("basename", Text)
        .columns(&["asic_id", "asic_id_17", "asic_id_eeprom"], Text)
        .column("asic_temp", Real)
        .column("device_id", Text)
        .columns(&["exp_script_purpose", "exp_script_name"], Text)
        .column("exp_start_time", Integer)
        .column("flow_cell_id", Text)
        .column("heatsink_temp", Real)
        .columns(&["hostname", "run_id", "version_name"], Text)
        .required("file_path", Text)
        .column("channel_number", Integer)
        .columns(&["digitisation", "offset", "range_val", "sampling_rate"], Real)
        .required("pass", Integer)
        .required("md5sum", Text)
        .index(&["basename"])
}

pub fn config_general() -> TableSpec {
    use ColumnType::*;
    TableSpec::new(CONFIG_GENERAL)
        .key("basename_id", Integer)
        .unique("basename", Text)
        .columns(&["local_folder", "workflow_script", "workflow_name"], Text)
        .column("read_id", Integer)
        .columns(
            &[
                "use_local",
                "tag",
                "model_path",
                "complement_model",
            ],
            Text,
        )
        .column("max_events", Integer)
        .column("input", Text)
        .column("min_events", Integer)
        .columns(&["config", "template_model", "channel"], Text)
        .columns(&["metrichor_version", "metrichor_time_stamp"], Text)
        .columns(&["abasic_event_index", "abasic_found"], Integer)
        .column("abasic_peak_height", Real)
        .column("duration", Integer)
        .columns(&["hairpin_event_index", "hairpin_found"], Integer)
        .columns(
            &["hairpin_peak_height", "hairpin_polyt_level", "median_before"],
            Real,
        )
        .column("read_name", Text)
        .columns(
            &["read_number", "scaling_used", "start_mux", "start_time", "end_mux"],
            Integer,
        )
        .column("exp_start_time", Integer)
        .windows()
        .flag("align")
        .index(&["align"])
        .required("pass", Integer)
}

pub fn basecall_summary() -> TableSpec {
    use ColumnType::*;
    let mut spec = TableSpec::new(BASECALL_SUMMARY)
        .serial("id")
        .required("basename_id", Integer)
        .index(&["basename_id"])
        .column("abasic_dur", Real)
        .column("abasic_index", Integer)
        .column("abasic_peak", Real)
        .columns(&["duration_comp", "duration_temp"], Real)
        .columns(&["end_index_comp", "end_index_temp", "hairpin_abasics"], Integer)
        .column("hairpin_dur", Real)
        .column("hairpin_events", Integer)
        .column("hairpin_peak", Real)
        .columns(
            &[
                "median_level_comp",
                "median_level_temp",
                "median_sd_comp",
                "median_sd_temp",
            ],
            Real,
        )
        .columns(&["num_comp", "num_events", "num_temp"], Integer)
        .columns(&["pt_level", "range_comp", "range_temp"], Real)
        .columns(
            &["split_index", "start_index_comp", "start_index_temp"],
            Integer,
        );

    for suffix in ["C", "T"] {
        for (field, ty) in STRAND_SUMMARY_FIELDS {
            spec = spec.column(&format!("{}{}", field, suffix), ty);
        }
    }
    spec.column("mean_qscore2", Real)
        .column("sequence_length2", Integer)
        .column("exp_start_time", Integer)
        .windows()
        .flag("align")
        .required("pass", Integer)
}

/// Per-strand basecall statistics merged into the summary row
pub const STRAND_SUMMARY_FIELDS: [(&str, ColumnType); 11] = [
    ("drift", ColumnType::Real),
    ("mean_qscore", ColumnType::Real),
    ("num_skips", ColumnType::Integer),
    ("num_stays", ColumnType::Integer),
    ("scale", ColumnType::Real),
    ("scale_sd", ColumnType::Real),
    ("sequence_length", ColumnType::Integer),
    ("shift", ColumnType::Real),
    ("strand_score", ColumnType::Real),
    ("var", ColumnType::Real),
    ("var_sd", ColumnType::Real),
];

/// Template or complement read table carrying the event model attributes
pub fn basecalled_strand(table: &str) -> TableSpec {
    use ColumnType::*;
    TableSpec::new(table)
        .key("basename_id", Integer)
        .unique("seqid", Text)
        .columns(
            &[
                "duration",
                "start_time",
                "scale",
                "shift",
                "gross_shift",
                "drift",
                "scale_sd",
                "var_sd",
                "var",
            ],
            Real,
        )
        .required("seqlen", Integer)
        .windows()
        .flag("align")
        .index(&["align"])
        .required("pass", Integer)
        .column("exp_start_time", Integer)
        .columns(&["sequence", "qual"], Text)
}

pub fn basecalled_2d() -> TableSpec {
    use ColumnType::*;
    TableSpec::new(STRAND_TABLES[2])
        .key("basename_id", Integer)
        .unique("seqid", Text)
        .required("seqlen", Integer)
        .column("sequence", Text)
        .column("start_time", Real)
        .flag("align")
        .index(&["align"])
        .windows()
        .column("exp_start_time", Integer)
        .column("qual", Text)
        .required("pass", Integer)
}

pub fn barcode_assignment() -> TableSpec {
    use ColumnType::*;
    TableSpec::new(BARCODE_ASSIGNMENT)
        .key("basename_id", Integer)
        .columns(&["pos0_start", "score"], Integer)
        .column("design", Text)
        .columns(&["pos1_end", "pos0_end", "pos1_start"], Integer)
        .columns(&["variant", "barcode_arrangement"], Text)
}

pub fn reference_seq_info() -> TableSpec {
    use ColumnType::*;
    TableSpec::new(REFERENCE_SEQ_INFO)
        .serial("refid")
        .unique("refname", Text)
        .column("reflen", Integer)
        .column("reffile", Text)
        .column("ref_total_len", Integer)
}

/// Base name of the extremity table pair for a read table
pub fn extremity_base(strand_table: &str) -> String {
    format!("last_align_{}", strand_table)
}

/// The 5' and 3' extremity tables, one row per read
pub fn extremity_tables(strand_table: &str) -> [TableSpec; 2] {
    let base = extremity_base(strand_table);
    [
        extremity_table(&format!("{}_5prime", base)),
        extremity_table(&format!("{}_3prime", base)),
    ]
}

fn extremity_table(name: &str) -> TableSpec {
    use ColumnType::*;
    TableSpec::new(name)
        .serial("id")
        .unique("basename_id", Integer)
        .columns(&["refid", "alignnum", "covcount"], Integer)
        .column("alignstrand", Text)
        .columns(&["score", "seqpos", "refpos"], Integer)
        .columns(&["seqbase", "refbase"], Text)
        .column("seqbasequal", Integer)
        .column("cigarclass", Text)
        .index(&["refid", "refpos", "cigarclass"])
}

pub fn maf_table_name(strand_table: &str) -> String {
    format!("last_align_maf_{}", strand_table)
}

pub fn align_maf(strand_table: &str) -> TableSpec {
    use ColumnType::*;
    TableSpec::new(maf_table_name(strand_table))
        .serial("id")
        .column("basename_id", Integer)
        .index(&["basename_id"])
        .columns(&["refid", "alignnum"], Integer)
        .column("alignstrand", Text)
        .columns(
            &["score", "r_start", "q_start", "r_align_len", "q_align_len"],
            Integer,
        )
        .columns(&["r_align_string", "q_align_string"], Text)
}

pub fn sam_table_name(strand_table: &str) -> String {
    format!("align_sam_{}", strand_table)
}

pub fn align_sam(strand_table: &str) -> TableSpec {
    use ColumnType::*;
    TableSpec::new(sam_table_name(strand_table))
        .serial("id")
        .required("basename_id", Integer)
        .index(&["basename_id"])
        .column("qname", Text)
        .column("flag", Integer)
        .column("rname", Text)
        .columns(&["pos", "mapq"], Integer)
        .columns(&["cigar", "rnext"], Text)
        .columns(&["pnext", "tlen"], Integer)
        .columns(&["seq", "qual", "n_m", "m_d", "a_s", "x_s"], Text)
}

/// Columns of a raw basecaller event row
pub const EVENT_COLUMNS: [&str; 15] = [
    "mean",
    "start",
    "stdv",
    "length",
    "model_state",
    "model_level",
    "move",
    "p_model_state",
    "mp_state",
    "p_mp_state",
    "p_A",
    "p_C",
    "p_G",
    "p_T",
    "raw_index",
];

pub fn caller_table_name(strand_table: &str, shard: usize) -> String {
    format!("caller_{}_{}", strand_table, shard)
}

pub fn caller_table(name: &str) -> TableSpec {
    use ColumnType::*;
    TableSpec::new(name)
        .serial("id")
        .required("basename_id", Integer)
        .columns(&["mean", "start", "stdv", "length"], Real)
        .column("model_state", Text)
        .column("model_level", Real)
        .column("move", Integer)
        .column("p_model_state", Real)
        .column("mp_state", Text)
        .columns(&["p_mp_state", "p_A", "p_C", "p_G", "p_T"], Real)
        .column("raw_index", Integer)
}

pub fn twod_alignment_table_name(shard: usize) -> String {
    format!("caller_basecalled_2d_alignment_{}", shard)
}

pub fn twod_alignment_table(name: &str) -> TableSpec {
    use ColumnType::*;
    TableSpec::new(name)
        .serial("id")
        .required("basename_id", Integer)
        .index(&["basename_id"])
        .columns(&["template", "complement"], Integer)
        .column("kmer", Text)
}

pub fn ref_sequence_kmer() -> TableSpec {
    use ColumnType::*;
    TableSpec::new(REF_SEQUENCE_KMER)
        .serial("id")
        .required("kmer", Text)
        .index(&["kmer"])
        .required("refid", Integer)
        .index(&["refid"])
        .required("count", Integer)
        .required("total", Integer)
        .required("freq", Real)
}

pub fn model_list() -> TableSpec {
    use ColumnType::*;
    TableSpec::new(MODEL_LIST)
        .key("basename_id", Integer)
        .columns(&["template_model", "complement_model"], Text)
}

pub fn model_data() -> TableSpec {
    use ColumnType::*;
    TableSpec::new(MODEL_DATA)
        .serial("id")
        .required("model", Text)
        .index(&["model"])
        .required("kmer", Text)
        .column("variant", Integer)
        .columns(
            &["level_mean", "level_stdv", "sd_mean", "sd_stdv", "weight"],
            Real,
        )
}

/// Which optional table groups a run schema carries
#[derive(Debug, Clone, Copy, Default)]
pub struct TableOptions {
    pub telemetry: bool,
    pub reference: bool,
    pub protocol: AlignMode,
}

/// Every table a run schema needs, fixed tables first
pub fn run_tables(options: TableOptions) -> Vec<TableSpec> {
    let mut tables = vec![
        config_general(),
        tracking_id(),
        basecall_summary(),
        basecalled_strand(STRAND_TABLES[0]),
        basecalled_strand(STRAND_TABLES[1]),
        basecalled_2d(),
    ];

    if options.telemetry {
        for shard in 0..CHANNEL_SHARDS {
            for strand in &STRAND_TABLES[..2] {
                tables.push(caller_table(&caller_table_name(strand, shard)));
            }
            tables.push(twod_alignment_table(&twod_alignment_table_name(shard)));
        }
        tables.push(model_list());
        tables.push(model_data());
    }

    if options.reference {
        tables.push(reference_seq_info());
        for strand in STRAND_TABLES {
            tables.extend(extremity_tables(strand));
        }
        for strand in STRAND_TABLES {
            match options.protocol {
                AlignMode::Last => tables.push(align_maf(strand)),
                AlignMode::Bwa => tables.push(align_sam(strand)),
                AlignMode::None => {}
            }
        }
        if options.telemetry {
            tables.push(ref_sequence_kmer());
        }
    }

    tables
}

pub fn minion_runs() -> TableSpec {
    use ColumnType::*;
    TableSpec::new(MINION_RUNS)
        .serial("runindex")
        .column("date", Text)
        .column("user_name", Text)
        .column("flowcellid", Text)
        .required("runname", Text)
        .index(&["runname"])
        .column("activeflag", Integer)
        .column("comment", Text)
        .column("flowcell_owner", Text)
        .column("run_number", Text)
        .column("reference", Text)
        .column("reflength", Integer)
        .columns(&["basecalleralg", "version", "poreflow_version", "process"], Text)
        .columns(&["watch_dir", "host_ip"], Text)
}

pub fn comments() -> TableSpec {
    use ColumnType::*;
    TableSpec::new(COMMENTS)
        .serial("comment_id")
        .required("runindex", Integer)
        .required("runname", Text)
        .required("user_name", Text)
        .required("date", Text)
        .required("comment", Text)
        .required("name", Text)
}

pub fn users() -> TableSpec {
    use ColumnType::*;
    TableSpec::new(USERS)
        .serial("user_id")
        .unique("user_name", Text)
}

pub fn userrun() -> TableSpec {
    use ColumnType::*;
    TableSpec::new(USERRUN)
        .serial("id")
        .required("user_id", Integer)
        .required("runindex", Integer)
        .index(&["runindex"])
}

pub fn catalogue_tables() -> Vec<TableSpec> {
    vec![minion_runs(), comments(), users(), userrun()]
}
