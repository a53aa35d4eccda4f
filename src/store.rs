//! Block store (module B).
//!
//! Opens the backing file on demand and keeps a nesting counter so that a
//! mutating operation which calls into several helpers that each touch the
//! file does not repeatedly open/close the descriptor — only the outermost
//! call pays for it. All reads and writes are an absolute seek followed by
//! one fixed-size transfer, mirroring the original's `map`/`unmap` and the
//! teacher's single-fd-per-table style in `storage/table.rs`.

use std::cell::{Cell, RefCell};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::trace;

use crate::error::Error;

pub struct Store {
    path: PathBuf,
    file: RefCell<Option<File>>,
    depth: Cell<u32>,
}

impl Store {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Store {
            path: path.as_ref().to_path_buf(),
            file: RefCell::new(None),
            depth: Cell::new(0),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True if the backing file exists and is non-empty.
    pub fn exists_nonempty(&self) -> bool {
        std::fs::metadata(&self.path)
            .map(|m| m.len() > 0)
            .unwrap_or(false)
    }

    fn open(&self) -> Result<(), Error> {
        if self.file.borrow().is_none() {
            let f = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .open(&self.path)?;
            *self.file.borrow_mut() = Some(f);
        }
        self.depth.set(self.depth.get() + 1);
        Ok(())
    }

    fn close(&self) {
        let d = self.depth.get().saturating_sub(1);
        self.depth.set(d);
        // The descriptor is kept open until the outermost caller returns;
        // nested calls only decrement the counter.
    }

    /// Reads exactly `buf.len()` bytes starting at `offset`.
    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), Error> {
        self.open()?;
        let result = (|| -> Result<(), Error> {
            let mut guard = self.file.borrow_mut();
            let file = guard.as_mut().expect("opened above");
            file.seek(SeekFrom::Start(offset))?;
            file.read_exact(buf)?;
            Ok(())
        })();
        self.close();
        trace!(offset, len = buf.len(), "read block");
        result
    }

    /// Writes `buf` at `offset`.
    pub fn write_at(&self, offset: u64, buf: &[u8]) -> Result<(), Error> {
        self.open()?;
        let result = (|| -> Result<(), Error> {
            let mut guard = self.file.borrow_mut();
            let file = guard.as_mut().expect("opened above");
            file.seek(SeekFrom::Start(offset))?;
            file.write_all(buf)?;
            Ok(())
        })();
        self.close();
        trace!(offset, len = buf.len(), "wrote block");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("data.bin"));
        store.write_at(0, b"hello").unwrap();
        store.write_at(10, b"world").unwrap();

        let mut buf = [0u8; 5];
        store.read_at(0, &mut buf).unwrap();
        assert_eq!(&buf, b"hello");
        store.read_at(10, &mut buf).unwrap();
        assert_eq!(&buf, b"world");
    }

    #[test]
    fn read_past_eof_errors() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("data.bin"));
        let mut buf = [0u8; 8];
        assert!(store.read_at(0, &mut buf).is_err());
    }
}
