//! `Controller`, spec §4.9: wires the lookup-build chain, the join, the
//! concatenation, and cleanup into one run, and owns the process-wide
//! `QuitFlag` and `TempRegistry`.

use std::fs::{File, OpenOptions};
use std::io::BufWriter;
use std::path::PathBuf;

use crate::archive::ArchiveReader;
use crate::concat::{Concatenator, Destination};
use crate::config::RunConfig;
use crate::error::{FqError, FqResult};
use crate::join::policy::OutputPolicy;
use crate::join::{unaligned_bases, Format, SpotJoiner};
use crate::lookup::build_lookup;
use crate::printer::FlexPrinter;
use crate::progress::{ProgressReporter, RowCounter};
use crate::quit::QuitFlag;
use crate::stats::JoinStats;
use crate::temp_registry::TempRegistry;

/// Diagnostic hook, spec §4.9 ("it may `stop_after_step` for test/diagnostic
/// purposes"): lets tests and `--keep-tmp-files` debugging runs halt the
/// chain early without tearing everything down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Step {
    LookupBuilt,
    JoinDone,
    Concatenated,
}

pub struct Controller {
    config: RunConfig,
    quit: QuitFlag,
}

impl Controller {
    pub fn new(config: RunConfig, quit: QuitFlag) -> Self {
        Controller { config, quit }
    }

    /// Turns an externally-requested stop (Ctrl-C) into an error so a
    /// cooperatively-stopped run reports a nonzero exit code instead of
    /// looking like a clean completion, per spec §8.
    fn check_cancelled(&self) -> FqResult<()> {
        if self.quit.is_set() {
            Err(FqError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Runs the full chain for `archive`. Returns the summed stats from
    /// every SpotJoiner worker (empty/zero for `unsorted_fasta`, which has
    /// no per-spot stats to report).
    pub fn run(&self, archive: &ArchiveReader) -> FqResult<JoinStats> {
        self.run_until(archive, Step::Concatenated)
    }

    pub fn run_until(&self, archive: &ArchiveReader, stop_after: Step) -> FqResult<JoinStats> {
        if crate::preflight::check(&self.config, archive)? == crate::preflight::Outcome::StopRequested {
            return Ok(JoinStats::default());
        }

        let temp = TempRegistry::new(self.config.temp_root.as_deref(), self.config.keep_tmp_files)?;

        if self.config.policy == OutputPolicy::UnsortedFasta {
            let stats = self.run_unsorted_fasta(archive, &temp)?;
            temp.cleanup();
            return Ok(stats);
        }

        let (lookup, lookup_path) =
            build_lookup(archive.align.as_ref(), self.config.threads, self.config.mem_limit_bytes, &temp, &self.quit)?;
        self.check_cancelled()?;
        if stop_after == Step::LookupBuilt {
            temp.cleanup();
            return Ok(JoinStats::default());
        }

        let stream_count = self.config.policy.stream_count().max(1);
        let row_count = archive.seq.row_count();
        let slice = row_count.div_ceil(self.config.threads.max(1) as u64);

        let printer = self.build_printer();
        let counter = RowCounter::new();
        let progress = ProgressReporter::start(counter.clone(), row_count);

        let mut shard_streams: Vec<Vec<PathBuf>> = vec![Vec::new(); stream_count];
        let mut stats = JoinStats::default();
        let lookup_ref = &lookup;

        std::thread::scope(|scope| -> FqResult<()> {
            let mut handles = Vec::new();
            for worker in 0..self.config.threads.max(1) {
                let start = worker as u64 * slice;
                if start >= row_count {
                    break;
                }
                let end = (start + slice).min(row_count);

                let shard_paths: Vec<PathBuf> =
                    (0..stream_count).map(|s| temp.new_subfile_path(&format!("join-{worker}-{s}"))).collect();

                let joiner = SpotJoiner {
                    accession: &archive.accession,
                    policy: self.config.policy,
                    format: self.config.format,
                    options: &self.config.join_options,
                    printer: &printer,
                };
                let quit = self.quit.clone();
                let seq = archive.seq.as_ref();
                let shard_paths_clone = shard_paths.clone();
                let counter = counter.clone();

                handles.push((
                    shard_paths,
                    scope.spawn(move || -> FqResult<JoinStats> {
                        let mut writers: Vec<BufWriter<File>> = shard_paths_clone
                            .iter()
                            .map(|p| File::create(p).map(BufWriter::new).map_err(FqError::Downstream))
                            .collect::<FqResult<_>>()?;
                        let mut lookup = lookup_ref.try_clone()?;
                        let result = joiner.run_worker(seq, start, end, &mut lookup, &mut writers, &quit, &counter);
                        for w in &mut writers {
                            std::io::Write::flush(w).map_err(FqError::Downstream)?;
                        }
                        result
                    }),
                ));
            }

            for (shard_paths, handle) in handles {
                match handle.join().expect("spot joiner worker panicked") {
                    Ok(worker_stats) => {
                        stats += worker_stats;
                        for (stream, path) in shard_paths.into_iter().enumerate() {
                            shard_streams[stream].push(path);
                        }
                    }
                    Err(e) => {
                        self.quit.set();
                        return Err(e);
                    }
                }
            }
            Ok(())
        })?;
        self.check_cancelled()?;

        progress.finish();
        temp.remove_now(&lookup_path)?;

        if stop_after == Step::JoinDone {
            temp.cleanup();
            return Ok(stats);
        }

        self.concatenate(&shard_streams, &temp)?;
        temp.cleanup();
        Ok(stats)
    }

    /// FASTA-only bypass, spec §2 item 9/§3: no lookup build, no SEQ/ALIGN
    /// join — two independent worker pools each iterate a disjoint
    /// row-range of their own table (ALIGN for aligned reads' `RAW_READ`,
    /// SEQ for unaligned reads' `READ`/`CMP_READ`), render records locally,
    /// and push finished blocks into a single `MultiWriter` consumer. Mirrors
    /// `dbj_create_unsorted_fasta_from_align`/`_from_seq` in the reference
    /// `db_join.c`, including the asymmetry that ALIGN rows carry no
    /// spot name/group while SEQ rows do. `--only-aligned`/`--only-unaligned`
    /// disable one pool outright rather than filtering rows within it.
    fn run_unsorted_fasta(&self, archive: &ArchiveReader, temp: &TempRegistry) -> FqResult<JoinStats> {
        let printer = self.build_printer();
        let dest = self.destination()?;

        let out_path = match &dest {
            Destination::Path(p) => Some(p.clone()),
            Destination::Stdout => None,
        };
        let sink: Box<dyn std::io::Write + Send> = match &out_path {
            Some(p) => Box::new(BufWriter::new(
                OpenOptions::new().write(true).create(true).truncate(true).open(p).map_err(FqError::Downstream)?,
            )),
            None => Box::new(std::io::stdout()),
        };

        let options = &self.config.join_options;
        let run_aligned = !options.only_unaligned;
        let run_unaligned = !options.only_aligned;

        let align_row_count = if run_aligned { archive.align.row_count() } else { 0 };
        let seq_row_count = if run_unaligned { archive.seq.row_count() } else { 0 };

        let num_threads = self.config.threads.max(1);
        let (align_threads, seq_threads) = match (run_aligned, run_unaligned) {
            (true, true) => {
                let half = (num_threads / 2).max(1);
                (half, (num_threads - half).max(1))
            }
            (true, false) => (num_threads, 0),
            (false, true) => (0, num_threads),
            (false, false) => (0, 0),
        };
        let queue_capacity = num_threads + 2;

        let (handle, join_writer) = crate::multi_writer::spawn(sink, queue_capacity);

        let counter = RowCounter::new();
        let progress = ProgressReporter::start(counter.clone(), align_row_count + seq_row_count);

        let mut stats = JoinStats::default();
        std::thread::scope(|scope| -> FqResult<()> {
            let mut handles = Vec::new();

            if align_threads > 0 {
                let slice = align_row_count.div_ceil(align_threads as u64);
                for worker in 0..align_threads {
                    let start = worker as u64 * slice;
                    if start >= align_row_count {
                        break;
                    }
                    let end = (start + slice).min(align_row_count);
                    let quit = self.quit.clone();
                    let writer_handle = handle.clone();
                    let printer = &printer;
                    let accession = &archive.accession;
                    let align = archive.align.as_ref();
                    let counter = counter.clone();

                    handles.push(scope.spawn(move || -> FqResult<JoinStats> {
                        let mut worker_stats = JoinStats::default();
                        let mut block = Vec::new();
                        for row_id in start..end {
                            if quit.is_set() {
                                break;
                            }
                            counter.increment();
                            let row = align.row(row_id)?;
                            worker_stats.reads_read += 1;
                            worker_stats.reads_written += 1;
                            let fields = crate::printer::Fields {
                                accession,
                                spot_id: row.seq_spot_id,
                                read_id: row.seq_read_id,
                                spot_name: "",
                                spot_group: None,
                                read_len: row.raw_read.len() as u32,
                            };
                            printer.print_fasta(&mut block, &fields, &row.raw_read)?;
                        }
                        writer_handle.send(block);
                        Ok(worker_stats)
                    }));
                }
            }

            if seq_threads > 0 {
                let slice = seq_row_count.div_ceil(seq_threads as u64);
                for worker in 0..seq_threads {
                    let start = worker as u64 * slice;
                    if start >= seq_row_count {
                        break;
                    }
                    let end = (start + slice).min(seq_row_count);
                    let quit = self.quit.clone();
                    let writer_handle = handle.clone();
                    let printer = &printer;
                    let accession = &archive.accession;
                    let seq = archive.seq.as_ref();
                    let counter = counter.clone();
                    let options = &self.config.join_options;

                    handles.push(scope.spawn(move || -> FqResult<JoinStats> {
                        let mut worker_stats = JoinStats::default();
                        let mut block = Vec::new();
                        for row_id in start..end {
                            if quit.is_set() {
                                break;
                            }
                            counter.increment();
                            let spot_id = row_id + 1;
                            let spot = seq.row(row_id)?;
                            worker_stats.spots_read += 1;

                            let spot_name: String = match (&spot.name, options.rowid_as_name) {
                                (Some(name), false) => name.clone(),
                                _ => spot_id.to_string(),
                            };
                            let spot_group = spot.spot_group.as_deref();

                            for read_idx in 0..spot.read_count() {
                                worker_stats.reads_read += 1;
                                if spot.is_aligned(read_idx) {
                                    // aligned halves come from the ALIGN pass.
                                    continue;
                                }
                                if options.skip_technical && !spot.is_biological(read_idx) {
                                    worker_stats.reads_technical += 1;
                                    continue;
                                }
                                if spot.read_len[read_idx] < options.min_read_len {
                                    worker_stats.reads_too_short += 1;
                                    continue;
                                }
                                let bases = match unaligned_bases(&spot, read_idx, spot_id) {
                                    Ok(b) => b,
                                    Err(_) => {
                                        worker_stats.reads_invalid += 1;
                                        continue;
                                    }
                                };
                                if !options.passes_base_filter(&bases) {
                                    continue;
                                }
                                if spot.read_len[read_idx] == 0 {
                                    worker_stats.reads_zero_length += 1;
                                }
                                worker_stats.reads_written += 1;
                                let fields = crate::printer::Fields {
                                    accession,
                                    spot_id,
                                    read_id: read_idx as u32 + 1,
                                    spot_name: &spot_name,
                                    spot_group,
                                    read_len: bases.len() as u32,
                                };
                                printer.print_fasta(&mut block, &fields, &bases)?;
                            }
                        }
                        writer_handle.send(block);
                        Ok(worker_stats)
                    }));
                }
            }

            drop(handle);

            for h in handles {
                match h.join().expect("unsorted-fasta worker panicked") {
                    Ok(worker_stats) => stats += worker_stats,
                    Err(e) => {
                        self.quit.set();
                        return Err(e);
                    }
                }
            }
            Ok(())
        })?;

        join_writer()?;
        progress.finish();
        let _ = temp;
        self.check_cancelled()?;
        Ok(stats)
    }

    fn build_printer(&self) -> FlexPrinter {
        match self.config.format {
            Format::Fasta => FlexPrinter::new_fasta(self.config.defline.clone()),
            Format::Fastq => FlexPrinter::new_fastq(
                self.config.defline.clone(),
                self.config.qual_defline.clone().expect("FASTQ run requires a quality defline"),
            ),
        }
    }

    fn destination(&self) -> FqResult<Destination> {
        if self.config.stdout {
            return Ok(Destination::Stdout);
        }
        match &self.config.outfile {
            Some(path) => Ok(Destination::Path(path.clone())),
            None => Err(FqError::InvalidArg("either --outfile or --stdout must be given".to_string())),
        }
    }

    fn concatenate(&self, shard_streams: &[Vec<PathBuf>], temp: &TempRegistry) -> FqResult<()> {
        let concatenator = Concatenator::new(self.config.force, self.config.append);

        if shard_streams.len() == 1 {
            let dest = self.destination()?;
            concatenator.concatenate_single(&shard_streams[0], &dest, temp)
        } else {
            let base = self
                .config
                .outfile
                .clone()
                .ok_or_else(|| FqError::InvalidArg("split output modes require --outfile".to_string()))?;
            let suffixes: Vec<usize> =
                (0..shard_streams.len()).map(|idx| self.config.policy.file_suffix(idx)).collect();
            concatenator.concatenate_split(shard_streams, &suffixes, &base, temp).map(|_| ())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{ArchiveReader, FixtureBuilder, SeqRow, READ_TYPE_BIOLOGICAL};
    use crate::config::{SizeCheck, DEFAULT_FASTA_DEFLINE};
    use crate::join::{Format, JoinOptions, OutputPolicy};
    use crate::printer::Template;

    fn unsorted_fasta_config(outfile: PathBuf, options: JoinOptions) -> RunConfig {
        RunConfig {
            accession: PathBuf::from("TEST"),
            threads: 4,
            mem_limit_bytes: 100 * 1024 * 1024,
            policy: OutputPolicy::UnsortedFasta,
            format: Format::Fasta,
            defline: Template::parse(DEFAULT_FASTA_DEFLINE, '>').unwrap(),
            qual_defline: None,
            join_options: options,
            outfile: Some(outfile),
            stdout: false,
            force: true,
            append: false,
            temp_root: None,
            keep_tmp_files: false,
            disk_limit: None,
            disk_limit_tmp: None,
            size_check: SizeCheck::Off,
        }
    }

    /// One spot whose sole read is aligned (so it only shows up via ALIGN),
    /// one whose sole read is unaligned (so it only shows up via SEQ).
    fn mixed_archive() -> ArchiveReader {
        let aligned_spot = SeqRow {
            name: Some("aligned-spot".to_string()),
            spot_group: None,
            read: vec![b'A'; 4],
            quality: vec![b'I'; 4],
            cmp_read: None,
            read_len: vec![4],
            read_type: vec![READ_TYPE_BIOLOGICAL],
            prim_align_id: vec![1],
        };
        let unaligned_spot = SeqRow {
            name: Some("unaligned-spot".to_string()),
            spot_group: None,
            read: b"CCCC".to_vec(),
            quality: vec![b'I'; 4],
            // single-read spot: bases are fetched from CMP_READ, not READ.
            cmp_read: Some(b"CCCC".to_vec()),
            read_len: vec![4],
            read_type: vec![READ_TYPE_BIOLOGICAL],
            prim_align_id: vec![0],
        };
        let fixture = FixtureBuilder::new()
            .with_align_row(1, 1, b"AAAA")
            .with_seq_row(aligned_spot)
            .with_seq_row(unaligned_spot)
            .build();
        ArchiveReader::open_fixture("TEST", fixture)
    }

    #[test]
    fn unsorted_fasta_emits_both_aligned_and_unaligned_reads() {
        let temp_dir = tempfile::tempdir().unwrap();
        let outfile = temp_dir.path().join("out.fasta");
        let config = unsorted_fasta_config(outfile.clone(), JoinOptions::default());
        let controller = Controller::new(config, QuitFlag::new());

        controller.run(&mixed_archive()).unwrap();

        let contents = std::fs::read_to_string(&outfile).unwrap();
        assert!(contents.contains("AAAA"), "missing the ALIGN-table read: {contents}");
        assert!(contents.contains("CCCC"), "missing the SEQ-table read: {contents}");
        assert!(contents.contains("unaligned-spot"), "SEQ-table record should carry its spot name: {contents}");
        assert_eq!(contents.matches('>').count(), 2);
    }

    #[test]
    fn only_aligned_disables_the_seq_worker_pool() {
        let temp_dir = tempfile::tempdir().unwrap();
        let outfile = temp_dir.path().join("out.fasta");
        let options = JoinOptions { only_aligned: true, ..Default::default() };
        let config = unsorted_fasta_config(outfile.clone(), options);
        let controller = Controller::new(config, QuitFlag::new());

        controller.run(&mixed_archive()).unwrap();

        let contents = std::fs::read_to_string(&outfile).unwrap();
        assert!(contents.contains("AAAA"));
        assert!(!contents.contains("CCCC"));
        assert_eq!(contents.matches('>').count(), 1);
    }

    #[test]
    fn only_unaligned_disables_the_align_worker_pool() {
        let temp_dir = tempfile::tempdir().unwrap();
        let outfile = temp_dir.path().join("out.fasta");
        let options = JoinOptions { only_unaligned: true, ..Default::default() };
        let config = unsorted_fasta_config(outfile.clone(), options);
        let controller = Controller::new(config, QuitFlag::new());

        controller.run(&mixed_archive()).unwrap();

        let contents = std::fs::read_to_string(&outfile).unwrap();
        assert!(!contents.contains("AAAA"));
        assert!(contents.contains("CCCC"));
        assert_eq!(contents.matches('>').count(), 1);
    }
}
