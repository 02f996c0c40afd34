//! `LookupKey` and `LookupRecord` wire format, per spec §3/§6.

use std::io::{self, Read, Write};

use crate::error::{FqError, FqResult};
use crate::lookup::pack;

/// `(spot_id << 1) | (read_id - 1)`, supporting `read_id in {1, 2}`.
/// Total order inherited from unsigned 64-bit compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LookupKey(pub u64);

impl LookupKey {
    pub fn new(spot_id: u64, read_id: u32) -> Self {
        debug_assert!(read_id == 1 || read_id == 2);
        LookupKey((spot_id << 1) | (read_id as u64 - 1))
    }

    pub fn spot_id(self) -> u64 {
        self.0 >> 1
    }

    pub fn read_id(self) -> u32 {
        (self.0 & 1) as u32 + 1
    }
}

/// One on-disk lookup record: `key_le64 | len_le16 | packed_bases`.
#[derive(Debug, Clone)]
pub struct LookupRecord {
    pub key: LookupKey,
    pub bases: Vec<u8>, // unpacked ASCII, for in-memory use
}

impl LookupRecord {
    pub fn write_to<W: Write>(&self, w: &mut W) -> FqResult<()> {
        let packed = pack::pack(&self.bases)?;
        w.write_all(&self.key.0.to_le_bytes())?;
        let len: u16 = self
            .bases
            .len()
            .try_into()
            .map_err(|_| FqError::Integrity("read length exceeds u16".to_string()))?;
        w.write_all(&len.to_le_bytes())?;
        w.write_all(&packed)?;
        Ok(())
    }

    /// Reads one record, or `Ok(None)` at a clean EOF (no bytes read at all).
    pub fn read_from<R: Read>(r: &mut R) -> FqResult<Option<Self>> {
        let mut key_buf = [0u8; 8];
        match read_exact_or_eof(r, &mut key_buf)? {
            false => return Ok(None),
            true => {}
        }
        let key = LookupKey(u64::from_le_bytes(key_buf));

        let mut len_buf = [0u8; 2];
        r.read_exact(&mut len_buf)
            .map_err(|e| FqError::Integrity(format!("truncated lookup record length: {e}")))?;
        let len = u16::from_le_bytes(len_buf) as usize;

        let packed_len = (len + 1) / 2;
        let mut packed = vec![0u8; packed_len];
        r.read_exact(&mut packed)
            .map_err(|e| FqError::Integrity(format!("truncated lookup record bases: {e}")))?;

        let bases = pack::unpack(&packed, len)?;
        Ok(Some(LookupRecord { key, bases }))
    }

    /// Byte length this record occupies on disk.
    pub fn encoded_len(&self) -> u64 {
        8 + 2 + ((self.bases.len() as u64 + 1) / 2)
    }
}

/// Like `Read::read_exact` but returns `Ok(false)` instead of erroring when
/// zero bytes could be read before EOF (a clean record boundary), and
/// errors as usual on a short read mid-record.
fn read_exact_or_eof<R: Read>(r: &mut R, buf: &mut [u8]) -> FqResult<bool> {
    let mut read = 0;
    while read < buf.len() {
        match r.read(&mut buf[read..]) {
            Ok(0) => {
                if read == 0 {
                    return Ok(false);
                }
                return Err(FqError::Integrity("truncated lookup record key".to_string()));
            }
            Ok(n) => read += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(FqError::Downstream(e)),
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_round_trips_spot_and_read_id() {
        let k = LookupKey::new(42, 2);
        assert_eq!(k.spot_id(), 42);
        assert_eq!(k.read_id(), 2);
        let k1 = LookupKey::new(42, 1);
        assert!(k1 < k);
    }

    #[test]
    fn record_round_trips_through_bytes() {
        let rec = LookupRecord { key: LookupKey::new(7, 1), bases: b"ACGTACGTAC".to_vec() };
        let mut buf = Vec::new();
        rec.write_to(&mut buf).unwrap();
        assert_eq!(buf.len() as u64, rec.encoded_len());
        let mut cursor = &buf[..];
        let read_back = LookupRecord::read_from(&mut cursor).unwrap().unwrap();
        assert_eq!(read_back.key, rec.key);
        assert_eq!(read_back.bases, rec.bases);
    }

    #[test]
    fn read_from_empty_stream_is_clean_eof() {
        let mut cursor: &[u8] = &[];
        assert!(LookupRecord::read_from(&mut cursor).unwrap().is_none());
    }
}
