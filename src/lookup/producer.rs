//! `LookupProducer`, spec §4.1: turns the ALIGN table into unsorted chunks
//! of `(key, bases)` pairs, each chunk internally key-sorted.

use std::collections::BTreeMap;
use std::thread;

use crossbeam_channel::Sender;

use crate::archive::AlignTable;
use crate::error::FqResult;
use crate::lookup::record::LookupKey;
use crate::quit::QuitFlag;

pub type SortedMap = BTreeMap<LookupKey, Vec<u8>>;

pub struct LookupProducer;

impl LookupProducer {
    /// Spawns `num_threads` workers, each over a disjoint contiguous
    /// row-id slice of `align` (`ceil(row_count / num_threads)` rows per
    /// worker, per spec §4.1), handing off maps to `maps_tx` whenever a
    /// worker's estimated memory usage crosses `mem_limit`, and again on
    /// exit for any non-empty leftover map.
    pub fn run(
        align: &dyn AlignTable,
        num_threads: usize,
        mem_limit: usize,
        quit: &QuitFlag,
        maps_tx: Sender<SortedMap>,
    ) -> FqResult<()> {
        let row_count = align.row_count();
        if row_count == 0 || num_threads == 0 {
            return Ok(());
        }
        let slice = row_count.div_ceil(num_threads as u64);

        thread::scope(|scope| {
            let mut handles = Vec::new();
            for worker in 0..num_threads {
                let start = worker as u64 * slice;
                if start >= row_count {
                    break;
                }
                let end = (start + slice).min(row_count);
                let tx = maps_tx.clone();
                let quit = quit.clone();

                handles.push(scope.spawn(move || -> FqResult<()> {
                    run_worker(align, start, end, mem_limit, &quit, &tx)
                }));
            }
            drop(maps_tx);

            let mut first_err = None;
            for handle in handles {
                if let Err(e) = handle.join().expect("lookup producer worker panicked") {
                    quit.set();
                    if first_err.is_none() {
                        first_err = Some(e);
                    }
                }
            }
            match first_err {
                Some(e) => Err(e),
                None => Ok(()),
            }
        })
    }
}

fn run_worker(
    align: &dyn AlignTable,
    start: u64,
    end: u64,
    mem_limit: usize,
    quit: &QuitFlag,
    tx: &Sender<SortedMap>,
) -> FqResult<()> {
    let mut map: SortedMap = BTreeMap::new();
    let mut estimated_bytes = 0usize;

    for row_id in start..end {
        if quit.is_set() {
            return Ok(());
        }

        let row = align.row(row_id)?;
        let key = LookupKey::new(row.seq_spot_id, row.seq_read_id);
        estimated_bytes += std::mem::size_of::<LookupKey>() + row.raw_read.len();
        map.insert(key, row.raw_read);

        if estimated_bytes >= mem_limit {
            let full = std::mem::take(&mut map);
            if tx.send(full).is_err() {
                return Ok(());
            }
            estimated_bytes = 0;
        }
    }

    if !map.is_empty() {
        let _ = tx.send(map);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::FixtureBuilder;
    use crossbeam_channel::unbounded;

    #[test]
    fn splits_rows_across_workers_and_preserves_ascending_order_per_map() {
        let fixture = FixtureBuilder::new()
            .with_align_row(1, 1, b"AAAA")
            .with_align_row(2, 1, b"CCCC")
            .with_align_row(3, 1, b"GGGG")
            .with_align_row(4, 1, b"TTTT")
            .build();

        let (tx, rx) = unbounded();
        let quit = QuitFlag::new();
        LookupProducer::run(&fixture.align, 2, usize::MAX, &quit, tx).unwrap();

        let maps: Vec<SortedMap> = rx.try_iter().collect();
        assert!(!maps.is_empty());
        for map in &maps {
            let keys: Vec<_> = map.keys().copied().collect();
            let mut sorted = keys.clone();
            sorted.sort();
            assert_eq!(keys, sorted);
        }
        let total: usize = maps.iter().map(|m| m.len()).sum();
        assert_eq!(total, 4);
    }

    #[test]
    fn mem_limit_triggers_multiple_handoffs() {
        let fixture = FixtureBuilder::new()
            .with_align_row(1, 1, b"AAAAAAAAAA")
            .with_align_row(2, 1, b"CCCCCCCCCC")
            .with_align_row(3, 1, b"GGGGGGGGGG")
            .build();

        let (tx, rx) = unbounded();
        let quit = QuitFlag::new();
        LookupProducer::run(&fixture.align, 1, 1, &quit, tx).unwrap();

        let maps: Vec<SortedMap> = rx.try_iter().collect();
        assert_eq!(maps.len(), 3);
    }
}
