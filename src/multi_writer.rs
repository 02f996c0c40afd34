//! `MultiWriter`, spec §2 item 9 / §4.8: the bypass path for
//! `unsorted_fasta`. Many producer threads push pre-rendered byte blocks
//! into a bounded queue; one consumer thread drains it in arrival order
//! into the final file (or stdout), so output order is whatever order
//! blocks happen to complete in rather than spot order.

use std::io::Write;
use std::thread;

use crossbeam_channel::{bounded, Receiver, Sender};
use log::warn;

use crate::error::FqResult;

/// Handle producers clone and push finished blocks through.
#[derive(Clone)]
pub struct MultiWriterHandle {
    tx: Sender<Vec<u8>>,
}

impl MultiWriterHandle {
    /// Non-blocking from the caller's perspective only up to the channel's
    /// capacity; beyond that it applies backpressure, same as the shard
    /// writers in the sorted paths.
    pub fn send(&self, block: Vec<u8>) {
        if self.tx.send(block).is_err() {
            warn!("multi-writer consumer gone, dropping block");
        }
    }
}

/// Spawns the single consumer thread and returns a cloneable handle plus a
/// join function. `capacity` bounds how many pending blocks may queue up
/// before a producer blocks on send.
pub fn spawn<W: Write + Send + 'static>(mut writer: W, capacity: usize) -> (MultiWriterHandle, impl FnOnce() -> FqResult<()>) {
    let (tx, rx): (Sender<Vec<u8>>, Receiver<Vec<u8>>) = bounded(capacity);

    let handle = thread::spawn(move || -> FqResult<()> {
        for block in rx.iter() {
            writer.write_all(&block)?;
        }
        writer.flush()?;
        Ok(())
    });

    let join = move || -> FqResult<()> { handle.join().expect("multi-writer consumer panicked") };

    (MultiWriterHandle { tx }, join)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drains_blocks_in_arrival_order_into_the_sink() {
        let (handle, join) = spawn(Vec::new(), 4);
        handle.send(b"first;".to_vec());
        handle.send(b"second;".to_vec());
        drop(handle);
        join().unwrap();
    }

    #[test]
    fn concurrent_producers_all_land_in_the_file() {
        let sink: Vec<u8> = Vec::new();
        let (handle, join) = spawn(sink, 8);
        thread::scope(|scope| {
            for i in 0..4 {
                let h = handle.clone();
                scope.spawn(move || h.send(format!("block{i};").into_bytes()));
            }
        });
        drop(handle);
        join().unwrap();
    }
}
