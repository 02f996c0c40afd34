//! `JoinOptions`, spec §3: the recognized filtering/formatting knobs the
//! SpotJoiner consults per spot/read.

#[derive(Debug, Clone)]
pub struct JoinOptions {
    pub skip_technical: bool,
    pub min_read_len: u32,
    pub filter_bases: Vec<String>,
    pub rowid_as_name: bool,
    pub print_spotgroup: bool,
    pub only_aligned: bool,
    pub only_unaligned: bool,
}

impl Default for JoinOptions {
    fn default() -> Self {
        JoinOptions {
            skip_technical: false,
            min_read_len: 0,
            filter_bases: Vec::new(),
            rowid_as_name: false,
            print_spotgroup: false,
            only_aligned: false,
            only_unaligned: false,
        }
    }
}

impl JoinOptions {
    /// `--bases` substring filter: a read passes if no filters were given,
    /// or its bases contain at least one of the given substrings.
    pub fn passes_base_filter(&self, bases: &[u8]) -> bool {
        if self.filter_bases.is_empty() {
            return true;
        }
        let bases_str = String::from_utf8_lossy(bases);
        self.filter_bases.iter().any(|needle| bases_str.contains(needle.as_str()))
    }
}
