//! `VectorMerger`, spec §4.2: single background consumer that coalesces
//! produced in-memory maps into sorted on-disk sub-files.

use std::fs::File;
use std::io::BufWriter;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use log::debug;

use crate::error::FqResult;
use crate::lookup::merge::k_way_merge;
use crate::lookup::producer::SortedMap;
use crate::lookup::record::LookupRecord;
use crate::quit::QuitFlag;
use crate::temp_registry::TempRegistry;

pub struct VectorMerger;

impl VectorMerger {
    /// Buffers incoming maps until `batch_size` (= num_threads, per spec
    /// §4.2) are held, then heap-merges them into one sub-file and enqueues
    /// its path to `subfiles_tx`. On shutdown (sender side disconnected)
    /// flushes whatever remains, if non-empty.
    pub fn run(
        maps_rx: Receiver<SortedMap>,
        subfiles_tx: Sender<std::path::PathBuf>,
        batch_size: usize,
        temp: &TempRegistry,
        quit: &QuitFlag,
        queue_timeout: Duration,
    ) -> FqResult<()> {
        let mut pending: Vec<SortedMap> = Vec::new();

        loop {
            match maps_rx.recv_timeout(queue_timeout) {
                Ok(map) => {
                    pending.push(map);
                    if pending.len() >= batch_size {
                        flush(&mut pending, temp, &subfiles_tx)?;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    if quit.is_set() {
                        return Ok(());
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        if !pending.is_empty() {
            flush(&mut pending, temp, &subfiles_tx)?;
        }
        Ok(())
    }
}

fn flush(
    pending: &mut Vec<SortedMap>,
    temp: &TempRegistry,
    subfiles_tx: &Sender<std::path::PathBuf>,
) -> FqResult<()> {
    let maps = std::mem::take(pending);
    let sources: Vec<Box<dyn Iterator<Item = FqResult<LookupRecord>> + Send>> = maps
        .into_iter()
        .map(|map| {
            let iter = map
                .into_iter()
                .map(|(key, bases)| Ok(LookupRecord { key, bases }));
            Box::new(iter) as Box<dyn Iterator<Item = FqResult<LookupRecord>> + Send>
        })
        .collect();

    let output_path = temp.new_subfile_path("vecmerge");
    let mut writer = BufWriter::new(File::create(&output_path)?);
    k_way_merge(sources, &mut writer, false)?;
    drop(writer);

    debug!("vector merger wrote sub-file {}", output_path.display());
    if subfiles_tx.send(output_path).is_err() {
        // FileMerger side has gone away (e.g. cancellation); nothing more
        // to do, the temp file stays registered for cleanup.
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::record::LookupKey;
    use crossbeam_channel::unbounded;
    use std::collections::BTreeMap;

    fn map_of(pairs: &[(u64, &str)]) -> SortedMap {
        let mut m = BTreeMap::new();
        for (spot, bases) in pairs {
            m.insert(LookupKey::new(*spot, 1), bases.as_bytes().to_vec());
        }
        m
    }

    #[test]
    fn flushes_on_shutdown_with_leftover_maps() {
        let temp = TempRegistry::new(None, false).unwrap();
        let (maps_tx, maps_rx) = unbounded();
        let (sub_tx, sub_rx) = unbounded();

        maps_tx.send(map_of(&[(2, "CCCC")])).unwrap();
        maps_tx.send(map_of(&[(1, "AAAA")])).unwrap();
        drop(maps_tx);

        let quit = QuitFlag::new();
        VectorMerger::run(maps_rx, sub_tx, 10, &temp, &quit, Duration::from_millis(20)).unwrap();

        let paths: Vec<_> = sub_rx.try_iter().collect();
        assert_eq!(paths.len(), 1);

        let mut file = std::fs::File::open(&paths[0]).unwrap();
        let first = LookupRecord::read_from(&mut file).unwrap().unwrap();
        assert_eq!(first.key, LookupKey::new(1, 1));
        temp.cleanup();
    }

    #[test]
    fn flushes_when_batch_size_reached() {
        let temp = TempRegistry::new(None, false).unwrap();
        let (maps_tx, maps_rx) = unbounded();
        let (sub_tx, sub_rx) = unbounded();

        for i in 0..3u64 {
            maps_tx.send(map_of(&[(i, "ACGT")])).unwrap();
        }

        let quit = QuitFlag::new();
        let handle = std::thread::spawn(move || {
            VectorMerger::run(maps_rx, sub_tx, 3, &temp, &quit, Duration::from_millis(20)).unwrap();
            temp
        });

        let first_path = sub_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(first_path.exists());
        let temp = handle.join().unwrap();
        temp.cleanup();
    }
}
