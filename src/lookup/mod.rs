//! The lookup-path pipeline of spec §2/§4.1-§4.4: scan ALIGN, merge into a
//! single sorted `lookup.bin` + `lookup.idx`, then serve random-access
//! fetches during the join.

pub mod file_merger;
pub mod index;
pub mod merge;
pub mod pack;
pub mod producer;
pub mod reader;
pub mod record;
pub mod vector_merger;

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use crossbeam_channel::bounded;
use log::info;

use crate::archive::AlignTable;
use crate::error::FqResult;
use crate::quit::QuitFlag;
use crate::temp_registry::TempRegistry;

pub use index::LookupIndex;
pub use reader::LookupReader;
pub use record::LookupKey;

/// Queue receive timeout used by the VectorMerger/FileMerger to poll the
/// quit flag, per spec §5 ("The timeout exists to poll the quit flag,
/// nothing more" — spec §9 design note).
const QUEUE_TIMEOUT: Duration = Duration::from_millis(250);

/// Runs the full lookup-build chain (spec §2 items 2-4): LookupProducer
/// feeds VectorMerger feeds FileMerger, and returns an opened `LookupReader`
/// plus the path to `lookup.bin` (the caller deletes it once every join
/// worker has finished, per spec §3 lifecycle).
pub fn build_lookup(
    align: &dyn AlignTable,
    num_threads: usize,
    mem_limit: usize,
    temp: &TempRegistry,
    quit: &QuitFlag,
) -> FqResult<(LookupReader, PathBuf)> {
    let batch_size = num_threads.max(1);
    // a small slack over num_threads, per spec §4.2's queue capacity note.
    let maps_capacity = num_threads + 2;
    let (maps_tx, maps_rx) = bounded(maps_capacity);
    let (subfiles_tx, subfiles_rx) = bounded(maps_capacity);

    let final_lookup_path = temp.new_path("lookup.bin");

    let producer_quit = quit.clone();
    let merger_quit = quit.clone();

    let result: FqResult<LookupIndex> = thread::scope(|scope| {
        let merger_handle = scope.spawn(|| {
            vector_merger::VectorMerger::run(maps_rx, subfiles_tx, batch_size, temp, &merger_quit, QUEUE_TIMEOUT)
        });

        let file_merger_quit = quit.clone();
        let file_merger_handle = scope.spawn(|| {
            file_merger::FileMerger::run(
                subfiles_rx,
                batch_size,
                temp,
                &file_merger_quit,
                QUEUE_TIMEOUT,
                &final_lookup_path,
            )
        });

        let producer_result = producer::LookupProducer::run(align, num_threads, mem_limit, &producer_quit, maps_tx);

        let merger_result = merger_handle.join().expect("vector merger panicked");
        let file_merger_result = file_merger_handle.join().expect("file merger panicked");

        producer_result?;
        merger_result?;
        file_merger_result
    });

    let index = result?;
    info!("lookup built: {}", final_lookup_path.display());
    let reader = LookupReader::open(&final_lookup_path, index)?;
    Ok((reader, final_lookup_path))
}
