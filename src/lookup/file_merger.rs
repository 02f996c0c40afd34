//! `FileMerger`, spec §4.3: single background consumer that reduces N
//! sorted sub-files to one final lookup file plus its index.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use log::debug;

use crate::error::FqResult;
use crate::lookup::index::LookupIndex;
use crate::lookup::merge::k_way_merge;
use crate::lookup::record::LookupRecord;
use crate::quit::QuitFlag;
use crate::temp_registry::TempRegistry;

pub struct FileMerger;

impl FileMerger {
    /// Buffers incoming sub-file paths until `batch_size` are held, then
    /// K-way-merges them into a new sub-file and deletes the inputs,
    /// repeating until the producer side disconnects. At that point it
    /// performs one last merge of everything remaining (even a single
    /// file) into `final_lookup_path`, building `final_index_path`
    /// alongside it, per spec §4.3.
    pub fn run(
        paths_rx: Receiver<PathBuf>,
        batch_size: usize,
        temp: &TempRegistry,
        quit: &QuitFlag,
        queue_timeout: Duration,
        final_lookup_path: &Path,
    ) -> FqResult<LookupIndex> {
        let mut pending: Vec<PathBuf> = Vec::new();

        loop {
            match paths_rx.recv_timeout(queue_timeout) {
                Ok(path) => {
                    pending.push(path);
                    if pending.len() >= batch_size {
                        let merged = merge_batch(&pending, temp, "filemerge", false)?.0;
                        for old in pending.drain(..) {
                            temp.remove_now(&old)?;
                        }
                        pending.push(merged);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    if quit.is_set() {
                        break;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        let (merged_path, index) = finalize(&pending, temp, final_lookup_path)?;
        debug_assert_eq!(merged_path, final_lookup_path);
        for old in &pending {
            if old != final_lookup_path {
                temp.remove_now(old)?;
            }
        }
        Ok(index.expect("finalize always builds an index"))
    }
}

fn finalize(pending: &[PathBuf], temp: &TempRegistry, final_path: &Path) -> FqResult<(PathBuf, Option<LookupIndex>)> {
    if pending.is_empty() {
        // No alignments at all: an empty lookup file is still valid, it
        // simply answers every fetch with NotFound.
        File::create(final_path)?;
        temp.register(final_path.to_path_buf());
        return Ok((final_path.to_path_buf(), Some(LookupIndex::new())));
    }
    merge_into(pending, temp, final_path, true)
}

fn merge_batch(paths: &[PathBuf], temp: &TempRegistry, stage: &str, build_index: bool) -> FqResult<(PathBuf, Option<LookupIndex>)> {
    let output_path = temp.new_subfile_path(stage);
    merge_into(paths, temp, &output_path, build_index)
}

fn merge_into(
    paths: &[PathBuf],
    temp: &TempRegistry,
    output_path: &Path,
    build_index: bool,
) -> FqResult<(PathBuf, Option<LookupIndex>)> {
    let sources: Vec<Box<dyn Iterator<Item = FqResult<LookupRecord>> + Send>> =
        paths.iter().map(|p| file_record_source(p)).collect::<FqResult<Vec<_>>>()?;

    let mut writer = BufWriter::new(File::create(output_path)?);
    let index = k_way_merge(sources, &mut writer, build_index)?;
    drop(writer);

    temp.register(output_path.to_path_buf());
    debug!("file merger wrote {}", output_path.display());
    Ok((output_path.to_path_buf(), index))
}

fn file_record_source(path: &Path) -> FqResult<Box<dyn Iterator<Item = FqResult<LookupRecord>> + Send>> {
    let reader = BufReader::new(File::open(path)?);
    Ok(Box::new(RecordFileIter { reader }))
}

struct RecordFileIter<R> {
    reader: R,
}

impl<R: std::io::Read + Send> Iterator for RecordFileIter<R> {
    type Item = FqResult<LookupRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        match LookupRecord::read_from(&mut self.reader) {
            Ok(Some(rec)) => Some(Ok(rec)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::record::LookupKey;
    use crossbeam_channel::unbounded;

    fn write_subfile(temp: &TempRegistry, records: &[(u64, &str)]) -> PathBuf {
        let path = temp.new_subfile_path("test");
        let mut writer = BufWriter::new(File::create(&path).unwrap());
        for (spot, bases) in records {
            let rec = LookupRecord { key: LookupKey::new(*spot, 1), bases: bases.as_bytes().to_vec() };
            rec.write_to(&mut writer).unwrap();
        }
        path
    }

    #[test]
    fn reduces_to_single_final_file_with_index() {
        let temp = TempRegistry::new(None, false).unwrap();
        let (tx, rx) = unbounded();
        tx.send(write_subfile(&temp, &[(3, "AAAA"), (5, "CCCC")])).unwrap();
        tx.send(write_subfile(&temp, &[(1, "GGGG"), (4, "TTTT")])).unwrap();
        drop(tx);

        let final_path = temp.new_path("lookup.bin");
        let quit = QuitFlag::new();
        let index = FileMerger::run(rx, 10, &temp, &quit, Duration::from_millis(20), &final_path).unwrap();

        assert!(final_path.exists());
        let mut file = File::open(&final_path).unwrap();
        let mut keys = Vec::new();
        while let Some(rec) = LookupRecord::read_from(&mut file).unwrap() {
            keys.push(rec.key);
        }
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
        assert_eq!(index.floor_offset(LookupKey::new(1, 1)), Some(0));
        temp.cleanup();
    }

    #[test]
    fn empty_input_yields_empty_lookup_file() {
        let temp = TempRegistry::new(None, false).unwrap();
        let (_tx, rx) = unbounded::<PathBuf>();
        let final_path = temp.new_path("lookup.bin");
        let quit = QuitFlag::new();
        let index = FileMerger::run(rx, 10, &temp, &quit, Duration::from_millis(10), &final_path).unwrap();
        assert!(index.floor_offset(LookupKey::new(0, 1)).is_none());
        assert_eq!(std::fs::metadata(&final_path).unwrap().len(), 0);
        temp.cleanup();
    }
}
