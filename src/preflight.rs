//! Preflight disk-space estimate, spec §4.6/§7: before any work begins,
//! sample a handful of SEQ rows to approximate the average record size,
//! and use it to estimate total output and scratch-space usage against
//! `--disk-limit`/`--disk-limit-tmp`, per `--size-check`'s three states.

use log::info;

use crate::archive::ArchiveReader;
use crate::config::{RunConfig, SizeCheck};
use crate::error::{FqError, FqResult};
use crate::join::{Format, OutputPolicy};

/// How many SEQ rows to sample for the average-read-length estimate.
/// Matches the scale of typical runs this check needs to be cheap for.
const SAMPLE_ROWS: u64 = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Proceed,
    /// `--size-check only`: stop the run right here, regardless of whether
    /// the estimate was within limits.
    StopRequested,
}

/// Runs the estimate (unless `--size-check off`) and enforces
/// `disk_limit`/`disk_limit_tmp`, per spec §7 ("Disk-limit exceeded before
/// work begins aborts with a dedicated message").
pub fn check(config: &RunConfig, archive: &ArchiveReader) -> FqResult<Outcome> {
    if config.size_check == SizeCheck::Off {
        return Ok(Outcome::Proceed);
    }

    if config.policy == OutputPolicy::UnsortedFasta {
        let (avg_read_len, avg_reads_per_row) = sample_align_table(archive)?;
        let estimated_output = estimate_output_bytes(config, archive.align.row_count(), avg_read_len, avg_reads_per_row);
        enforce_output_limit(config, estimated_output)?;
        info!("preflight: ~{estimated_output} bytes of output estimated (--fasta-unsorted bypasses the lookup build, no scratch-space estimate)");
    } else {
        let (avg_read_len, avg_reads_per_spot) = sample_seq_table(archive)?;
        let estimated_output = estimate_output_bytes(config, archive.seq.row_count(), avg_read_len, avg_reads_per_spot);
        enforce_output_limit(config, estimated_output)?;

        let estimated_tmp = estimate_tmp_bytes(archive, avg_read_len);
        if let Some(limit) = config.disk_limit_tmp {
            if estimated_tmp > limit {
                return Err(FqError::Resource(format!(
                    "estimated scratch usage {estimated_tmp} bytes exceeds --disk-limit-tmp {limit} bytes"
                )));
            }
        }

        info!(
            "preflight: ~{estimated_output} bytes of output, ~{estimated_tmp} bytes of scratch space estimated"
        );
    }

    if config.size_check == SizeCheck::Only {
        return Ok(Outcome::StopRequested);
    }
    Ok(Outcome::Proceed)
}

fn enforce_output_limit(config: &RunConfig, estimated_output: u64) -> FqResult<()> {
    if let Some(limit) = config.disk_limit {
        if estimated_output > limit {
            return Err(FqError::Resource(format!(
                "estimated output size {estimated_output} bytes exceeds --disk-limit {limit} bytes"
            )));
        }
    }
    Ok(())
}

/// Samples up to `SAMPLE_ROWS` ALIGN rows (one rendered record per row in
/// `unsorted_fasta` mode) and returns `(avg_read_len, 1.0)`.
fn sample_align_table(archive: &ArchiveReader) -> FqResult<(u32, f64)> {
    let row_count = archive.align.row_count();
    let sample_n = row_count.min(SAMPLE_ROWS);
    if sample_n == 0 {
        return Ok((0, 0.0));
    }
    let mut total_bases: u64 = 0;
    for row_id in 0..sample_n {
        let row = archive.align.row(row_id)?;
        total_bases += row.raw_read.len() as u64;
    }
    Ok(((total_bases / sample_n) as u32, 1.0))
}

/// Samples up to `SAMPLE_ROWS` SEQ rows and returns `(avg_read_len,
/// avg_reads_per_spot)`. Both are 0 if the table is empty.
fn sample_seq_table(archive: &ArchiveReader) -> FqResult<(u32, f64)> {
    let row_count = archive.seq.row_count();
    let sample_n = row_count.min(SAMPLE_ROWS);
    if sample_n == 0 {
        return Ok((0, 0.0));
    }

    let mut total_bases: u64 = 0;
    let mut total_reads: u64 = 0;
    for row_id in 0..sample_n {
        let row = archive.seq.row(row_id)?;
        total_reads += row.read_count() as u64;
        total_bases += row.read_len.iter().map(|&l| l as u64).sum::<u64>();
    }

    let avg_read_len = if total_reads > 0 { (total_bases / total_reads) as u32 } else { 0 };
    let avg_reads_per_spot = total_reads as f64 / sample_n as f64;
    Ok((avg_read_len, avg_reads_per_spot))
}

fn estimate_output_bytes(config: &RunConfig, seq_row_count: u64, avg_read_len: u32, avg_reads_per_spot: f64) -> u64 {
    let defline_len = config.defline.estimate_len(avg_read_len);
    let qual_overhead = config
        .qual_defline
        .as_ref()
        .map(|t| t.estimate_len(avg_read_len) + avg_read_len as usize + 2)
        .unwrap_or(0);
    // bases line + its newline, defline + its newline, and (FASTQ only) the
    // quality-defline/quality-ascii lines.
    let per_read_bytes = defline_len + 2 + avg_read_len as usize + qual_overhead;

    let estimated_reads = (seq_row_count as f64 * avg_reads_per_spot).round() as u64;
    estimated_reads * per_read_bytes as u64
}

/// Estimates `lookup.bin` size: one record per ALIGN row, each `8 + 2 +
/// ceil(avg_read_len/2)` bytes, per spec §3/§6's `LookupRecord` layout.
/// Sub-file churn during the merge roughly doubles peak scratch usage, so
/// this is a conservative factor-of-two over the final file's size.
fn estimate_tmp_bytes(archive: &ArchiveReader, avg_read_len: u32) -> u64 {
    let per_record = 8 + 2 + (avg_read_len as u64 + 1) / 2;
    archive.align.row_count() * per_record * 2
}
