//! `SpotJoiner`, spec §4.5: the per-spot decision table that turns SEQ rows
//! plus lookup fetches into rendered FASTA/FASTQ records.

pub mod options;
pub mod policy;

use std::fs::File;
use std::io::BufWriter;

use crate::archive::{SeqRow, SeqTable};
use crate::error::{FqError, FqResult};
use crate::lookup::LookupReader;
use crate::printer::{Fields, FlexPrinter};
use crate::progress::RowCounter;
use crate::quit::QuitFlag;
use crate::stats::JoinStats;

pub use options::JoinOptions;
pub use policy::{Format, OutputPolicy};

/// Resolves the bases for one read of a spot, per spec §4.5's decision
/// table. `spot_id` is the 1-based row-id used as the lookup key and as
/// the `$si` defline field.
fn read_bases(seq: &SeqRow, read_idx: usize, lookup: &mut LookupReader, spot_id: u64) -> FqResult<Vec<u8>> {
    if seq.is_aligned(read_idx) {
        return lookup.fetch(spot_id, read_idx as u32 + 1, seq.is_reverse(read_idx));
    }
    unaligned_bases(seq, read_idx, spot_id)
}

/// The non-lookup half of spec §4.5's decision table: bases for a read
/// already known to be unaligned, sourced from `READ` (both reads
/// unaligned) or `CMP_READ` (this read unaligned, its sibling aligned, or
/// a single-read spot). Shared by `SpotJoiner` and the `unsorted_fasta`
/// bypass (spec §2 item 9), neither of which needs a `LookupReader` for
/// this branch.
pub(crate) fn unaligned_bases(seq: &SeqRow, read_idx: usize, spot_id: u64) -> FqResult<Vec<u8>> {
    let read_count = seq.read_count();
    if read_count == 2 {
        let other_idx = 1 - read_idx;
        if !seq.is_aligned(other_idx) {
            // both reads unaligned: bases live directly in the READ array.
            return Ok(seq.read[seq.read_slice_range(read_idx)].to_vec());
        }
    }

    // this read is unaligned, and either the spot has one read or its
    // sibling is aligned: bases live in CMP_READ.
    let cmp = seq
        .cmp_read
        .as_ref()
        .ok_or_else(|| FqError::Integrity(format!("spot {spot_id} read {} missing CMP_READ", read_idx + 1)))?;
    let total_len: usize = seq.read_len.iter().map(|&l| l as usize).sum();
    if cmp.len() == total_len {
        // CMP_READ unexpectedly holds the full spot; slice it like READ.
        Ok(cmp[seq.read_slice_range(read_idx)].to_vec())
    } else {
        Ok(cmp.clone())
    }
}

struct RenderedRead {
    read_id: u32,
    bases: Vec<u8>,
    quality: Vec<u8>,
}

/// Produces rendered records for a contiguous row-id range of SEQ,
/// dispatching to a `LookupReader` only for aligned halves.
pub struct SpotJoiner<'a> {
    pub accession: &'a str,
    pub policy: OutputPolicy,
    pub format: Format,
    pub options: &'a JoinOptions,
    pub printer: &'a FlexPrinter,
}

impl<'a> SpotJoiner<'a> {
    /// Processes SEQ rows `[start, end)` (0-based), fetching aligned bases
    /// from `lookup` and writing rendered records into `writers`, one
    /// per `self.policy.stream_count()` destination stream. Polls `quit`
    /// once per spot; increments `counter` once per row across all
    /// workers, per spec §4.9's progress discipline.
    pub fn run_worker(
        &self,
        seq: &dyn SeqTable,
        start: u64,
        end: u64,
        lookup: &mut LookupReader,
        writers: &mut [BufWriter<File>],
        quit: &QuitFlag,
        counter: &RowCounter,
    ) -> FqResult<JoinStats> {
        let mut stats = JoinStats::default();

        'spot: for row_id in start..end {
            if quit.is_set() {
                break;
            }
            counter.increment();
            let spot_id = row_id + 1;
            let spot = seq.row(row_id)?;
            stats.spots_read += 1;

            let read_count = spot.read_count();
            let mut survives = vec![false; read_count];
            for read_idx in 0..read_count {
                stats.reads_read += 1;
                if self.options.skip_technical && !spot.is_biological(read_idx) {
                    stats.reads_technical += 1;
                    continue;
                }
                if spot.read_len[read_idx] < self.options.min_read_len {
                    stats.reads_too_short += 1;
                    continue;
                }
                if self.options.only_aligned && !spot.is_aligned(read_idx) {
                    continue;
                }
                if self.options.only_unaligned && spot.is_aligned(read_idx) {
                    continue;
                }
                survives[read_idx] = true;
            }

            let mut rendered = Vec::with_capacity(read_count);
            for read_idx in 0..read_count {
                if !survives[read_idx] {
                    continue;
                }

                let bases = match read_bases(&spot, read_idx, lookup, spot_id) {
                    Ok(b) => b,
                    Err(_) => {
                        stats.reads_invalid += 1;
                        continue 'spot;
                    }
                };
                if spot.read_len[read_idx] == 0 {
                    stats.reads_zero_length += 1;
                }

                let quality = spot.quality[spot.read_slice_range(read_idx)].to_vec();
                if self.format == Format::Fastq && quality.len() != bases.len() {
                    stats.reads_invalid += 1;
                    continue 'spot;
                }

                if !self.options.passes_base_filter(&bases) {
                    continue;
                }

                rendered.push(RenderedRead { read_id: read_idx as u32 + 1, bases, quality });
            }

            if rendered.is_empty() {
                continue;
            }
            stats.reads_written += rendered.len() as u64;

            let spot_name: String = match (&spot.name, self.options.rowid_as_name) {
                (Some(name), false) => name.clone(),
                _ => spot_id.to_string(),
            };
            let spot_group = spot.spot_group.as_deref();

            if self.policy.concatenates_reads() {
                let total_len: u32 = rendered.iter().map(|r| r.bases.len() as u32).sum();
                let fields = Fields {
                    accession: self.accession,
                    spot_id,
                    read_id: rendered[0].read_id,
                    spot_name: &spot_name,
                    spot_group,
                    read_len: total_len,
                };
                let bases: Vec<u8> = rendered.iter().flat_map(|r| r.bases.iter().copied()).collect();
                let quality: Vec<u8> = rendered.iter().flat_map(|r| r.quality.iter().copied()).collect();
                let writer = &mut writers[self.policy.dst_id(1, false)];
                self.write_record(writer, &fields, &bases, &quality)?;
            } else {
                let both_pass = read_count == 2 && rendered.len() == 2;
                for read in &rendered {
                    let fields = Fields {
                        accession: self.accession,
                        spot_id,
                        read_id: read.read_id,
                        spot_name: &spot_name,
                        spot_group,
                        read_len: read.bases.len() as u32,
                    };
                    let dst = self.policy.dst_id(read.read_id, both_pass);
                    let writer = &mut writers[dst];
                    self.write_record(writer, &fields, &read.bases, &read.quality)?;
                }
            }
        }

        Ok(stats)
    }

    fn write_record(&self, writer: &mut BufWriter<File>, fields: &Fields, bases: &[u8], quality: &[u8]) -> FqResult<()> {
        match self.format {
            Format::Fasta => self.printer.print_fasta(writer, fields, bases),
            Format::Fastq => self.printer.print_fastq(writer, fields, bases, quality),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::FixtureBuilder;
    use crate::archive::SeqRow;
    use crate::lookup::build_lookup;
    use crate::printer::Template;
    use crate::temp_registry::TempRegistry;

    fn whole_spot_joiner<'a>(options: &'a JoinOptions, printer: &'a FlexPrinter) -> SpotJoiner<'a> {
        SpotJoiner {
            accession: "ACC",
            policy: OutputPolicy::WholeSpot,
            format: Format::Fastq,
            options,
            printer,
        }
    }

    fn fastq_printer() -> FlexPrinter {
        let defline = Template::parse("@$ac.$si/$ri length=$rl", '@').unwrap();
        let qdefline = Template::parse("+", '+').unwrap();
        FlexPrinter::new_fastq(defline, qdefline)
    }

    #[test]
    fn whole_spot_both_unaligned_reads_from_read_array() {
        let seq_row = SeqRow {
            name: Some("spot1".to_string()),
            spot_group: None,
            read: b"ACGTACGTAC".to_vec(),
            quality: vec![30; 10],
            cmp_read: None,
            read_len: vec![10],
            read_type: vec![0x1],
            prim_align_id: vec![0],
        };
        let fixture = FixtureBuilder::new().with_seq_row(seq_row).build();
        let temp = TempRegistry::new(None, false).unwrap();
        let quit = QuitFlag::new();
        let (mut lookup, lookup_path) = build_lookup(&fixture.align, 1, 4096, &temp, &quit).unwrap();

        let options = JoinOptions::default();
        let printer = fastq_printer();
        let joiner = whole_spot_joiner(&options, &printer);

        let out_path = temp.new_path("shard0.fastq");
        let mut writer = BufWriter::new(File::create(&out_path).unwrap());
        let stats = joiner
            .run_worker(&fixture.seq, 0, 1, &mut lookup, std::slice::from_mut(&mut writer), &quit, &RowCounter::new())
            .unwrap();
        drop(writer);

        assert_eq!(stats.spots_read, 1);
        assert_eq!(stats.reads_written, 1);
        let text = std::fs::read_to_string(&out_path).unwrap();
        let expected = format!("@ACC.1/1 length=10\nACGTACGTAC\n+\n{}\n", "?".repeat(10));
        assert_eq!(text, expected);

        drop(lookup);
        temp.remove_now(&lookup_path).unwrap();
        temp.remove_now(&out_path).unwrap();
        temp.cleanup();
    }

    #[test]
    fn whole_spot_half_aligned_sources_from_lookup_and_cmp_read() {
        let seq_row = SeqRow {
            name: Some("spot1".to_string()),
            spot_group: None,
            read: Vec::new(),
            quality: vec![30; 20],
            cmp_read: Some(b"TTTTTTTTTT".to_vec()),
            read_len: vec![10, 10],
            read_type: vec![0x1, 0x1],
            prim_align_id: vec![5, 0],
        };
        let fixture = FixtureBuilder::new()
            .with_align_row(1, 1, b"ACGTACGTAC")
            .with_seq_row(seq_row)
            .build();

        let temp = TempRegistry::new(None, false).unwrap();
        let quit = QuitFlag::new();
        let (mut lookup, lookup_path) = build_lookup(&fixture.align, 1, 4096, &temp, &quit).unwrap();

        let options = JoinOptions::default();
        let printer = fastq_printer();
        let joiner = whole_spot_joiner(&options, &printer);

        let out_path = temp.new_path("shard0.fastq");
        let mut writer = BufWriter::new(File::create(&out_path).unwrap());
        let stats = joiner
            .run_worker(&fixture.seq, 0, 1, &mut lookup, std::slice::from_mut(&mut writer), &quit, &RowCounter::new())
            .unwrap();
        drop(writer);

        assert_eq!(stats.reads_written, 2);
        let text = std::fs::read_to_string(&out_path).unwrap();
        assert!(text.contains("ACGTACGTACTTTTTTTTTT"));

        drop(lookup);
        temp.remove_now(&lookup_path).unwrap();
        temp.remove_now(&out_path).unwrap();
        temp.cleanup();
    }

    #[test]
    fn min_read_len_filter_drops_short_reads_and_counts_them() {
        let seq_row = SeqRow {
            name: Some("spot1".to_string()),
            spot_group: None,
            read: b"ACGT".to_vec(),
            quality: vec![30; 4],
            cmp_read: None,
            read_len: vec![4],
            read_type: vec![0x1],
            prim_align_id: vec![0],
        };
        let fixture = FixtureBuilder::new().with_seq_row(seq_row).build();
        let temp = TempRegistry::new(None, false).unwrap();
        let quit = QuitFlag::new();
        let (mut lookup, lookup_path) = build_lookup(&fixture.align, 1, 4096, &temp, &quit).unwrap();

        let options = JoinOptions { min_read_len: 20, ..Default::default() };
        let printer = fastq_printer();
        let joiner = whole_spot_joiner(&options, &printer);

        let out_path = temp.new_path("shard0.fastq");
        let mut writer = BufWriter::new(File::create(&out_path).unwrap());
        let stats = joiner
            .run_worker(&fixture.seq, 0, 1, &mut lookup, std::slice::from_mut(&mut writer), &quit, &RowCounter::new())
            .unwrap();
        drop(writer);

        assert_eq!(stats.reads_too_short, 1);
        assert_eq!(stats.reads_written, 0);

        drop(lookup);
        temp.remove_now(&lookup_path).unwrap();
        temp.remove_now(&out_path).unwrap();
        temp.cleanup();
    }
}
