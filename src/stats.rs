use std::fmt;
use std::ops::AddAssign;

/// Per-worker counters, summed by the controller after all join workers
/// have been joined. Each worker owns a private copy; no locking needed.
#[derive(Debug, Default, Clone, Copy)]
pub struct JoinStats {
    pub spots_read: u64,
    pub reads_read: u64,
    pub reads_written: u64,
    pub reads_technical: u64,
    pub reads_too_short: u64,
    pub reads_invalid: u64,
    pub reads_zero_length: u64,
}

impl AddAssign for JoinStats {
    fn add_assign(&mut self, rhs: Self) {
        self.spots_read += rhs.spots_read;
        self.reads_read += rhs.reads_read;
        self.reads_written += rhs.reads_written;
        self.reads_technical += rhs.reads_technical;
        self.reads_too_short += rhs.reads_too_short;
        self.reads_invalid += rhs.reads_invalid;
        self.reads_zero_length += rhs.reads_zero_length;
    }
}

impl fmt::Display for JoinStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "spots read      : {}", self.spots_read)?;
        writeln!(f, "reads read      : {}", self.reads_read)?;
        writeln!(f, "reads written   : {}", self.reads_written)?;
        writeln!(f, "reads technical : {}", self.reads_technical)?;
        writeln!(f, "reads too short : {}", self.reads_too_short)?;
        writeln!(f, "reads invalid   : {}", self.reads_invalid)?;
        write!(f, "reads 0-length  : {}", self.reads_zero_length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_is_commutative_sum() {
        let mut a = JoinStats { spots_read: 3, reads_written: 5, ..Default::default() };
        let b = JoinStats { spots_read: 2, reads_written: 1, reads_invalid: 1, ..Default::default() };
        a += b;
        assert_eq!(a.spots_read, 5);
        assert_eq!(a.reads_written, 6);
        assert_eq!(a.reads_invalid, 1);
    }
}
