//! `RunConfig`, spec §4.9/§6: resolves the CLI surface plus environment
//! fallbacks into the fully-settled knobs the controller drives the
//! pipeline with.

use std::path::PathBuf;

use crate::cli::{Cli, SizeCheckArg};
use crate::error::{FqError, FqResult};
use crate::join::{Format, JoinOptions, OutputPolicy};
use crate::printer::Template;

/// Resolved form of `--size-check`, spec §6/§7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeCheck {
    On,
    Off,
    Only,
}

impl From<SizeCheckArg> for SizeCheck {
    fn from(arg: SizeCheckArg) -> Self {
        match arg {
            SizeCheckArg::On => SizeCheck::On,
            SizeCheckArg::Off => SizeCheck::Off,
            SizeCheckArg::Only => SizeCheck::Only,
        }
    }
}

/// Default thread count, and the minimum it's clamped to, per spec §5
/// ("The default worker count is 6; it is clamped to at least 2").
const DEFAULT_THREADS: usize = 6;
const MIN_THREADS: usize = 2;

/// Env var carrying a thread-count override, preserved verbatim from the
/// original tool (including its own typo) per spec §6.
const THREAD_COUNT_ENV: &str = "DLFT_THREAD_COUNT";

/// Default defline templates, per `dflt_defline.c`.
pub const DEFAULT_FASTQ_DEFLINE: &str = "@$ac.$si/$ri $sn length=$rl";
pub const DEFAULT_QUAL_DEFLINE: &str = "+$ac.$si/$ri length=$rl";
pub const DEFAULT_FASTA_DEFLINE: &str = ">$ac.$si/$ri $sn length=$rl";

pub struct RunConfig {
    pub accession: PathBuf,
    pub threads: usize,
    pub mem_limit_bytes: usize,
    pub policy: OutputPolicy,
    pub format: Format,
    pub defline: Template,
    pub qual_defline: Option<Template>,
    pub join_options: JoinOptions,
    pub outfile: Option<PathBuf>,
    pub stdout: bool,
    pub force: bool,
    pub append: bool,
    pub temp_root: Option<PathBuf>,
    pub keep_tmp_files: bool,
    pub disk_limit: Option<u64>,
    pub disk_limit_tmp: Option<u64>,
    pub size_check: SizeCheck,
}

impl RunConfig {
    pub fn from_cli(cli: Cli) -> FqResult<Self> {
        let threads = resolve_threads(cli.threads)?;

        let (policy, format) = resolve_policy(&cli)?;

        if cli.stdout && matches!(policy, OutputPolicy::SplitFile | OutputPolicy::Split3) {
            return Err(FqError::InvalidArg(
                "--stdout cannot be combined with --split-files/--split-3; write to a file instead".to_string(),
            ));
        }

        let mut join_options = JoinOptions {
            skip_technical: !cli.include_technical,
            min_read_len: cli.min_read_len.unwrap_or(0),
            filter_bases: cli.bases.clone(),
            rowid_as_name: false,
            print_spotgroup: false,
            only_aligned: cli.only_aligned,
            only_unaligned: cli.only_unaligned,
        };
        if join_options.only_aligned && join_options.only_unaligned {
            log::warn!("--only-aligned and --only-unaligned both set; applying neither");
            join_options.only_aligned = false;
            join_options.only_unaligned = false;
        }

        let defline_str = cli.seq_defline.clone().unwrap_or_else(|| match format {
            Format::Fasta => DEFAULT_FASTA_DEFLINE.to_string(),
            Format::Fastq => DEFAULT_FASTQ_DEFLINE.to_string(),
        });
        let required_first = if format == Format::Fasta { '>' } else { '@' };
        let defline = Template::parse(&defline_str, required_first)?;
        join_options.print_spotgroup = defline.uses_spotgroup();

        let qual_defline = if format == Format::Fastq {
            let qual_str = cli.qual_defline.clone().unwrap_or_else(|| DEFAULT_QUAL_DEFLINE.to_string());
            Some(Template::parse(&qual_str, '+')?)
        } else {
            None
        };

        Ok(RunConfig {
            accession: PathBuf::from(&cli.accession),
            threads,
            mem_limit_bytes: cli.mem.unwrap_or(100) * 1024 * 1024,
            policy,
            format,
            defline,
            qual_defline,
            join_options,
            outfile: cli.outfile.clone().map(PathBuf::from),
            stdout: cli.stdout,
            force: cli.force,
            append: cli.append,
            temp_root: cli.temp.clone().map(PathBuf::from),
            keep_tmp_files: cli.keep_tmp_files,
            disk_limit: cli.disk_limit,
            disk_limit_tmp: cli.disk_limit_tmp,
            size_check: cli.size_check.into(),
        })
    }
}

fn resolve_threads(flag: Option<usize>) -> FqResult<usize> {
    let n = if let Some(n) = flag {
        n
    } else if let Ok(s) = std::env::var(THREAD_COUNT_ENV) {
        s.parse()
            .map_err(|_| FqError::InvalidArg(format!("{THREAD_COUNT_ENV}={s} is not a valid thread count")))?
    } else {
        DEFAULT_THREADS
    };
    Ok(n.max(MIN_THREADS))
}

fn resolve_policy(cli: &Cli) -> FqResult<(OutputPolicy, Format)> {
    let selected = [cli.split_spot, cli.split_files, cli.split_3, cli.fasta_unsorted]
        .iter()
        .filter(|b| **b)
        .count();
    if selected > 1 {
        return Err(FqError::InvalidArg(
            "only one of --split-spot/--split-files/--split-3/--fasta-unsorted may be given".to_string(),
        ));
    }

    let format = if cli.fasta || cli.fasta_unsorted {
        Format::Fasta
    } else {
        Format::Fastq
    };

    let policy = if cli.fasta_unsorted {
        OutputPolicy::UnsortedFasta
    } else if cli.split_3 {
        OutputPolicy::Split3
    } else if cli.split_files {
        OutputPolicy::SplitFile
    } else if cli.split_spot {
        OutputPolicy::SplitSpot
    } else {
        OutputPolicy::WholeSpot
    };

    Ok((policy, format))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_count_falls_back_to_default_and_clamps() {
        assert_eq!(resolve_threads(Some(1)).unwrap(), 2);
        assert_eq!(resolve_threads(Some(8)).unwrap(), 8);
    }
}
