//! `Concatenator`, spec §4.8: reassembles per-shard files into the final
//! output(s), preserving shard order, then deletes each shard as it drains.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{FqError, FqResult};
use crate::temp_registry::TempRegistry;

/// Where final output goes. `Stdout` is rejected by the controller before
/// any work begins when the selected `OutputPolicy` needs more than one
/// stream (spec §4.8 "forbidden for split-file / split-3 modes").
pub enum Destination {
    Path(PathBuf),
    Stdout,
}

pub struct Concatenator {
    force: bool,
    append: bool,
}

impl Concatenator {
    pub fn new(force: bool, append: bool) -> Self {
        Concatenator { force, append }
    }

    /// Single-stream output: drains `shards` in order into `dest`.
    pub fn concatenate_single(&self, shards: &[PathBuf], dest: &Destination, temp: &TempRegistry) -> FqResult<()> {
        match dest {
            Destination::Stdout => {
                let stdout = io::stdout();
                let mut out = stdout.lock();
                self.drain_shards(shards, &mut out, temp)
            }
            Destination::Path(path) => {
                let mut out = BufWriter::new(self.open_output(path)?);
                self.drain_shards(shards, &mut out, temp)
            }
        }
    }

    /// Split-file output: `shard_streams[n]` holds the shard paths for
    /// destination stream `n`; `suffixes[n]` gives the file-numbering
    /// suffix for that stream (per `OutputPolicy::file_suffix`, spec §3/
    /// §4.8) inserted before `base_path`'s extension (`out.fastq` →
    /// `out_1.fastq`, ...).
    pub fn concatenate_split(
        &self,
        shard_streams: &[Vec<PathBuf>],
        suffixes: &[usize],
        base_path: &Path,
        temp: &TempRegistry,
    ) -> FqResult<Vec<PathBuf>> {
        assert_eq!(shard_streams.len(), suffixes.len());
        let mut outputs = Vec::with_capacity(shard_streams.len());
        for (shards, suffix) in shard_streams.iter().zip(suffixes) {
            let path = split_path(base_path, *suffix);
            let mut out = BufWriter::new(self.open_output(&path)?);
            self.drain_shards(shards, &mut out, temp)?;
            outputs.push(path);
        }
        Ok(outputs)
    }

    fn open_output(&self, path: &Path) -> FqResult<File> {
        let mut opts = OpenOptions::new();
        opts.write(true);
        if self.append {
            opts.append(true).create(true);
        } else if self.force {
            opts.create(true).truncate(true);
        } else {
            opts.create_new(true);
        }
        opts.open(path).map_err(|e| match e.kind() {
            io::ErrorKind::AlreadyExists => {
                FqError::InvalidArg(format!("{} already exists; pass --force or --append", path.display()))
            }
            _ => FqError::Downstream(e),
        })
    }

    fn drain_shards<W: Write>(&self, shards: &[PathBuf], out: &mut W, temp: &TempRegistry) -> FqResult<()> {
        for shard in shards {
            let mut reader = File::open(shard)?;
            io::copy(&mut reader, out)?;
            drop(reader);
            temp.remove_now(shard)?;
        }
        out.flush()?;
        Ok(())
    }
}

/// Inserts `_<index>` before the final extension, or appends it if the
/// path has none.
fn split_path(base: &Path, index: usize) -> PathBuf {
    let stem = base.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let mut name = format!("{stem}_{index}");
    if let Some(ext) = base.extension() {
        name.push('.');
        name.push_str(&ext.to_string_lossy());
    }
    match base.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.join(name),
        _ => PathBuf::from(name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn write_shard(temp: &TempRegistry, name: &str, content: &[u8]) -> PathBuf {
        let path = temp.new_path(name);
        let mut f = File::create(&path).unwrap();
        f.write_all(content).unwrap();
        path
    }

    #[test]
    fn split_path_inserts_index_before_extension() {
        assert_eq!(split_path(Path::new("out.fastq"), 1), PathBuf::from("out_1.fastq"));
        assert_eq!(split_path(Path::new("/tmp/x/out.fastq"), 2), PathBuf::from("/tmp/x/out_2.fastq"));
        assert_eq!(split_path(Path::new("out"), 1), PathBuf::from("out_1"));
    }

    #[test]
    fn concatenate_single_preserves_shard_order_and_deletes_shards() {
        let temp = TempRegistry::new(None, false).unwrap();
        let s0 = write_shard(&temp, "shard0", b"AAA");
        let s1 = write_shard(&temp, "shard1", b"BBB");
        let out_path = temp.dir_path().join("final.fastq");

        let concat = Concatenator::new(true, false);
        concat
            .concatenate_single(&[s0.clone(), s1.clone()], &Destination::Path(out_path.clone()), &temp)
            .unwrap();

        assert_eq!(std::fs::read_to_string(&out_path).unwrap(), "AAABBB");
        assert!(!s0.exists());
        assert!(!s1.exists());

        temp.remove_now(&out_path).unwrap();
        temp.cleanup();
    }

    #[test]
    fn refuses_to_overwrite_without_force_or_append() {
        let temp = TempRegistry::new(None, false).unwrap();
        let out_path = temp.dir_path().join("final.fastq");
        File::create(&out_path).unwrap();
        let s0 = write_shard(&temp, "shard0", b"AAA");

        let concat = Concatenator::new(false, false);
        let err = concat
            .concatenate_single(&[s0], &Destination::Path(out_path.clone()), &temp)
            .unwrap_err();
        assert!(matches!(err, FqError::InvalidArg(_)));

        temp.remove_now(&out_path).unwrap();
        temp.cleanup();
    }
}
