//! `LookupIndex`: one `(first_key_in_block, byte_offset)` tuple every 1024
//! lookup records, per spec §3/§6. Binary-search target for `LookupReader`.

use std::io::{Read, Write};

use crate::error::{FqError, FqResult};
use crate::lookup::record::LookupKey;

pub const INDEX_BLOCK_SIZE: u64 = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    pub first_key: LookupKey,
    pub byte_offset: u64,
}

#[derive(Debug, Default, Clone)]
pub struct LookupIndex {
    entries: Vec<IndexEntry>,
}

impl LookupIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, first_key: LookupKey, byte_offset: u64) {
        self.entries.push(IndexEntry { first_key, byte_offset });
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> FqResult<()> {
        for e in &self.entries {
            w.write_all(&e.first_key.0.to_le_bytes())?;
            w.write_all(&e.byte_offset.to_le_bytes())?;
        }
        Ok(())
    }

    pub fn read_from<R: Read>(r: &mut R) -> FqResult<Self> {
        let mut entries = Vec::new();
        loop {
            let mut key_buf = [0u8; 8];
            let n = read_all_or_zero(r, &mut key_buf)?;
            if n == 0 {
                break;
            }
            let mut off_buf = [0u8; 8];
            r.read_exact(&mut off_buf)
                .map_err(|e| FqError::Integrity(format!("truncated index entry: {e}")))?;
            entries.push(IndexEntry {
                first_key: LookupKey(u64::from_le_bytes(key_buf)),
                byte_offset: u64::from_le_bytes(off_buf),
            });
        }
        Ok(LookupIndex { entries })
    }

    /// Greatest entry with `first_key <= key`, per spec §4.4. Returns byte
    /// offset 0 (start of file) if `key` precedes every indexed key, or
    /// `None` if the index is empty.
    pub fn floor_offset(&self, key: LookupKey) -> Option<u64> {
        if self.entries.is_empty() {
            return None;
        }
        match self.entries.binary_search_by_key(&key, |e| e.first_key) {
            Ok(idx) => Some(self.entries[idx].byte_offset),
            Err(0) => Some(self.entries[0].byte_offset),
            Err(idx) => Some(self.entries[idx - 1].byte_offset),
        }
    }
}

fn read_all_or_zero<R: Read>(r: &mut R, buf: &mut [u8]) -> FqResult<usize> {
    let mut read = 0;
    while read < buf.len() {
        match r.read(&mut buf[read..]) {
            Ok(0) => {
                if read == 0 {
                    return Ok(0);
                }
                return Err(FqError::Integrity("truncated index key".to_string()));
            }
            Ok(n) => read += n,
            Err(e) => return Err(FqError::Downstream(e)),
        }
    }
    Ok(read)
}
