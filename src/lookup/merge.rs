//! Shared K-way heap-merge used by both the VectorMerger (merging in-memory
//! maps) and the FileMerger (merging on-disk sub-files), per spec §4.2-§4.3.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::io::Write;

use crate::error::FqResult;
use crate::lookup::index::{LookupIndex, INDEX_BLOCK_SIZE};
use crate::lookup::record::{LookupKey, LookupRecord};

/// Drains `sources` (each already sorted ascending by key) into `writer` in
/// global sorted order, breaking ties on equal keys by source index
/// ascending ("preserving first-seen", spec §4.3 Determinism). Optionally
/// builds a `LookupIndex` with one entry every `INDEX_BLOCK_SIZE` records
/// and one at offset 0, per spec §4.3.
pub fn k_way_merge<W: Write>(
    mut sources: Vec<Box<dyn Iterator<Item = FqResult<LookupRecord>> + Send>>,
    writer: &mut W,
    build_index: bool,
) -> FqResult<Option<LookupIndex>> {
    let mut heads: Vec<Option<LookupRecord>> = Vec::with_capacity(sources.len());
    let mut heap: BinaryHeap<Reverse<(LookupKey, usize)>> = BinaryHeap::new();

    for (id, source) in sources.iter_mut().enumerate() {
        let head = source.next().transpose()?;
        if let Some(ref rec) = head {
            heap.push(Reverse((rec.key, id)));
        }
        heads.push(head);
    }

    let mut index = if build_index { Some(LookupIndex::new()) } else { None };
    let mut byte_offset: u64 = 0;
    let mut record_count: u64 = 0;

    while let Some(Reverse((_, id))) = heap.pop() {
        let record = heads[id].take().expect("heap entry without a head record");

        if let Some(idx) = index.as_mut() {
            if record_count % INDEX_BLOCK_SIZE == 0 {
                idx.push(record.key, byte_offset);
            }
        }

        record.write_to(writer)?;
        byte_offset += record.encoded_len();
        record_count += 1;

        let next = sources[id].next().transpose()?;
        if let Some(ref rec) = next {
            heap.push(Reverse((rec.key, id)));
        }
        heads[id] = next;
    }

    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn src(records: Vec<LookupRecord>) -> Box<dyn Iterator<Item = FqResult<LookupRecord>> + Send> {
        Box::new(records.into_iter().map(Ok))
    }

    fn rec(spot: u64, read: u32, bases: &str) -> LookupRecord {
        LookupRecord { key: LookupKey::new(spot, read), bases: bases.as_bytes().to_vec() }
    }

    #[test]
    fn merges_multiple_sorted_sources_into_one_order() {
        let a = src(vec![rec(1, 1, "AAAA"), rec(3, 1, "CCCC")]);
        let b = src(vec![rec(2, 1, "GGGG"), rec(4, 1, "TTTT")]);

        let mut out = Vec::new();
        k_way_merge(vec![a, b], &mut out, false).unwrap();

        let mut cursor = &out[..];
        let mut keys = Vec::new();
        while let Some(rec) = LookupRecord::read_from(&mut cursor).unwrap() {
            keys.push(rec.key);
        }
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
        assert_eq!(keys.len(), 4);
    }

    #[test]
    fn equal_keys_break_ties_by_source_order() {
        let a = src(vec![rec(1, 1, "AAAA")]);
        let b = src(vec![rec(1, 1, "TTTT")]);

        let mut out = Vec::new();
        k_way_merge(vec![a, b], &mut out, false).unwrap();
        let mut cursor = &out[..];
        let first = LookupRecord::read_from(&mut cursor).unwrap().unwrap();
        assert_eq!(first.bases, b"AAAA");
    }

    #[test]
    fn index_has_entry_every_block_and_at_start() {
        let records: Vec<LookupRecord> = (0..2500u64).map(|i| rec(i, 1, "ACGT")).collect();
        let source = src(records);

        let mut out = Vec::new();
        let index = k_way_merge(vec![source], &mut out, true).unwrap().unwrap();
        assert_eq!(index.floor_offset(LookupKey::new(0, 1)), Some(0));
        assert!(index.floor_offset(LookupKey::new(2499, 1)).is_some());
    }
}
