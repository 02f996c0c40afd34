//! `OutputPolicy`, spec §3/§4.5: the five output shapes a run may select,
//! plus the `dst_id` rule that routes each read to the right shard stream.

/// Text format a policy renders into — every `OutputPolicy` except
/// `UnsortedFasta` can run in either.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Fasta,
    Fastq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputPolicy {
    WholeSpot,
    SplitSpot,
    SplitFile,
    Split3,
    /// FASTA only, per spec §3; bypasses the lookup build entirely (spec §2
    /// item 9's MultiWriter bypass path) and is not handled by SpotJoiner.
    UnsortedFasta,
}

impl OutputPolicy {
    /// How many on-disk streams this policy fans a shard out into, so the
    /// controller knows how many shard files (and later, Concatenator
    /// streams) to keep per worker. `unsorted_fasta` has none — it writes
    /// straight to the MultiWriter instead.
    pub fn stream_count(self) -> usize {
        match self {
            OutputPolicy::WholeSpot | OutputPolicy::SplitSpot => 1,
            // split_file has two streams, read1 and read2 (array indices
            // 0 and 1). split_3 has three: index 0 for single-end spots,
            // 1 and 2 for the two reads of a passing pair.
            OutputPolicy::SplitFile => 2,
            OutputPolicy::Split3 => 3,
            OutputPolicy::UnsortedFasta => 0,
        }
    }

    /// Spec §4.5's `dst_id` table, returning a 0-based index into the
    /// policy's `stream_count()` streams. `read_id` is 1-based; `both_pass`
    /// tells `split_3` whether the spot's other read also survived
    /// filtering.
    pub fn dst_id(self, read_id: u32, both_pass: bool) -> usize {
        match self {
            OutputPolicy::WholeSpot | OutputPolicy::SplitSpot => 0,
            OutputPolicy::SplitFile => (read_id - 1) as usize,
            OutputPolicy::Split3 => {
                if both_pass {
                    read_id as usize
                } else {
                    0
                }
            }
            OutputPolicy::UnsortedFasta => 0,
        }
    }

    /// File-suffix number for the stream at `stream_index` (its position in
    /// the shard-stream array), used when naming split output files, per
    /// spec §3 ("two-read spots split to files 1,2; one-read spots to file
    /// 0") and §4.8 (`out.fastq` → `out_1.fastq`, `out_2.fastq`). `split_3`'s
    /// stream array is already laid out 0/1/2 to match its file numbering
    /// directly; `split_file`'s is laid out 0/1 and shifted by one to avoid
    /// a spurious, always-empty file 0.
    pub fn file_suffix(self, stream_index: usize) -> usize {
        match self {
            OutputPolicy::SplitFile => stream_index + 1,
            OutputPolicy::Split3 => stream_index,
            OutputPolicy::WholeSpot | OutputPolicy::SplitSpot | OutputPolicy::UnsortedFasta => stream_index,
        }
    }

    /// Whether this policy renders one record per spot (concatenating all
    /// surviving reads) or one record per surviving read.
    pub fn concatenates_reads(self) -> bool {
        matches!(self, OutputPolicy::WholeSpot)
    }
}
