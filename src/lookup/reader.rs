//! `LookupReader`, spec §4.4: random access into `lookup.bin` by
//! `(spot_id, read_id)`, fatal `NotFound` on a miss.

use std::fs::File;
use std::io::{BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::error::{FqError, FqResult};
use crate::lookup::index::LookupIndex;
use crate::lookup::pack;
use crate::lookup::record::{LookupKey, LookupRecord};

/// Thread-local: each instance owns its own file handle and read buffer, so
/// no locking is needed across the SpotJoiner's worker threads. Construct
/// one per worker thread via `try_clone`, which reopens the same file with
/// an independent handle and shares the (cheaply cloned) index.
pub struct LookupReader {
    file: BufReader<File>,
    index: LookupIndex,
    path: PathBuf,
}

impl LookupReader {
    pub fn open(lookup_path: &Path, index: LookupIndex) -> FqResult<Self> {
        let file = BufReader::new(File::open(lookup_path)?);
        Ok(LookupReader { file, index, path: lookup_path.to_path_buf() })
    }

    /// Opens a fresh, independent file handle onto the same `lookup.bin`,
    /// sharing this reader's index. Used to give each SpotJoiner worker
    /// its own handle without re-reading the index from disk.
    pub fn try_clone(&self) -> FqResult<Self> {
        Self::open(&self.path, self.index.clone())
    }

    /// Binary-searches the index for the greatest `key' <= key`, seeks
    /// there, then linearly scans forward until a record's key is `>=`
    /// the target, per spec §4.4.
    pub fn fetch(&mut self, spot_id: u64, read_id: u32, reverse: bool) -> FqResult<Vec<u8>> {
        let key = LookupKey::new(spot_id, read_id);
        let start_offset = self.index.floor_offset(key).unwrap_or(0);
        self.file
            .seek(SeekFrom::Start(start_offset))
            .map_err(FqError::Downstream)?;

        loop {
            match LookupRecord::read_from(&mut self.file)? {
                None => return Err(FqError::Integrity(format!("lookup miss for key {}", key.0))),
                Some(rec) if rec.key == key => {
                    return Ok(if reverse {
                        pack::reverse_complement(&rec.bases)
                    } else {
                        rec.bases
                    });
                }
                Some(rec) if rec.key > key => {
                    return Err(FqError::Integrity(format!("lookup miss for key {}", key.0)));
                }
                Some(_) => continue,
            }
        }
    }
}
