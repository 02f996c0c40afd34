//! Command-line surface, spec §6. A flat `clap`-derive struct in the
//! teacher's style (long flags, defaulted where the tool has a sane
//! default) rather than a subcommand tree, since this tool does one thing.

use clap::{Parser, ValueEnum};

/// `--size-check` tri-state, spec §6/§7: `on` runs the preflight estimate
/// and aborts if a limit is exceeded; `off` skips it; `only` runs it and
/// then stops the whole run (successful or not) without doing any work.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeCheckArg {
    On,
    Off,
    Only,
}

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about = "Reconstruct FASTA/FASTQ reads from an aligned-sequencing archive", long_about = None)]
pub struct Cli {
    /// Accession or path to the archive to read.
    pub accession: String,

    /// Force FASTA output (FASTQ is the default).
    #[clap(long)]
    pub fasta: bool,

    /// Bypass the sorted join entirely and stream FASTA in arrival order.
    #[clap(long)]
    pub fasta_unsorted: bool,

    /// One record per read instead of one per spot.
    #[clap(long)]
    pub split_spot: bool,

    /// Read 1 to `<out>_1`, read 2 to `<out>_2`, ...
    #[clap(long)]
    pub split_files: bool,

    /// Like `--split-files`, but single-read spots land in `<out>` unsplit.
    #[clap(long)]
    pub split_3: bool,

    /// Output file path. Mutually exclusive with `--stdout`.
    #[clap(long)]
    pub outfile: Option<String>,

    /// Write to standard output instead of a file.
    #[clap(long)]
    pub stdout: bool,

    /// Overwrite an existing output file.
    #[clap(long)]
    pub force: bool,

    /// Append to an existing output file.
    #[clap(long)]
    pub append: bool,

    /// Worker thread count. Defaults to the `DLFT_THREAD_COUNT` env var,
    /// or 6, clamped to at least 2.
    #[clap(long)]
    pub threads: Option<usize>,

    /// Per-worker memory budget for the lookup build, in MiB.
    #[clap(long)]
    pub mem: Option<usize>,

    /// Root directory for scratch files; the system temp dir if unset.
    #[clap(long)]
    pub temp: Option<String>,

    /// Keep scratch files around after the run for inspection.
    #[clap(long)]
    pub keep_tmp_files: bool,

    /// Include technical reads (excluded by default).
    #[clap(long)]
    pub include_technical: bool,

    /// Drop reads shorter than this many bases.
    #[clap(long)]
    pub min_read_len: Option<u32>,

    /// Keep only reads containing one of these substrings. Repeatable.
    #[clap(long)]
    pub bases: Vec<String>,

    /// Keep only aligned reads.
    #[clap(long)]
    pub only_aligned: bool,

    /// Keep only unaligned reads.
    #[clap(long)]
    pub only_unaligned: bool,

    /// Sequence defline template; see the `$ac`/`$si`/`$ri`/`$sn`/`$sg`/`$rl` tokens.
    #[clap(long)]
    pub seq_defline: Option<String>,

    /// Quality defline template (FASTQ only).
    #[clap(long)]
    pub qual_defline: Option<String>,

    /// Abort if the estimated output size exceeds this many bytes.
    #[clap(long)]
    pub disk_limit: Option<u64>,

    /// Abort if the estimated scratch-space usage exceeds this many bytes.
    #[clap(long)]
    pub disk_limit_tmp: Option<u64>,

    /// Preflight disk-space estimate: run it and enforce the limits (`on`,
    /// the default), skip it (`off`), or run it and stop before any work
    /// begins regardless of outcome (`only`).
    #[clap(long, value_enum, default_value_t = SizeCheckArg::On)]
    pub size_check: SizeCheckArg,
}
