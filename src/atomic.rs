//! Temp-file + rename writes.
//!
//! A [`Staged`] file is fully written and synced in the destination's
//! directory before [`Staged::commit`] renames it over the target, so readers
//! only ever see the old or the new content. Dropping a `Staged` without
//! committing deletes the temp file.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::{IoContext, Result};

pub struct Staged {
    tmp: NamedTempFile,
    target: PathBuf,
}

impl Staged {
    /// Write `bytes` to a temp file next to `target`.
    pub fn write(target: &Path, bytes: &[u8]) -> Result<Self> {
        let dir = target.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir).at(dir)?;

        let mut tmp = tempfile::Builder::new()
            .prefix(".staged-")
            .tempfile_in(dir)
            .at(dir)?;
        tmp.write_all(bytes).at(tmp.path())?;
        tmp.as_file().sync_all().at(tmp.path())?;

        Ok(Self {
            tmp,
            target: target.to_path_buf(),
        })
    }

    /// Atomically replace the target with the staged content.
    pub fn commit(self) -> Result<()> {
        let target = self.target;
        self.tmp
            .persist(&target)
            .map_err(|e| e.error)
            .at(&target)?;
        Ok(())
    }
}

/// Replace `path` with `bytes` in one step.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    Staged::write(path, bytes)?.commit()
}
