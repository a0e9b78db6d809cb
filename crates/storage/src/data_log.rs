//! Append-only Data Log: a flat file of framed records, written and read at
//! caller-supplied offsets.
//!
//! Built directly on `std::fs::File` with `Seek`/`read_exact`/`write_all`: the
//! engine is the file's sole accessor, so seek-then-read/write is race-free
//! without needing platform `pread`/`pwrite`.

use haven_core::Error;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Append-only, random-access-read file of serialized records.
pub struct DataLog {
    path: PathBuf,
    file: File,
    /// Next offset a caller should append at; tracked as a cursor
    /// synchronized with the file length at open time.
    next_offset: u64,
}

impl DataLog {
    /// Open (creating if absent) the Data Log at `path`.
    pub fn open(path: impl AsRef<Path>) -> haven_core::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;
        let next_offset = file.metadata()?.len();
        Ok(DataLog {
            path,
            file,
            next_offset,
        })
    }

    /// The offset the next `append` should be given.
    pub fn next_offset(&self) -> u64 {
        self.next_offset
    }

    /// Write `bytes` at `offset`, which must be `>= next_offset` at the time
    /// of the call (never into the middle of a live record). Returns `offset`
    /// on success and advances the cursor past the written bytes.
    pub fn append(&mut self, bytes: &[u8], offset: u64) -> haven_core::Result<u64> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(bytes)?;
        let end = offset + bytes.len() as u64;
        if end > self.next_offset {
            self.next_offset = end;
        }
        Ok(offset)
    }

    /// Read exactly `size` bytes starting at `offset`.
    pub fn read_exact(&mut self, offset: u64, size: u32) -> haven_core::Result<Vec<u8>> {
        self.file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; size as usize];
        self.file.read_exact(&mut buf).map_err(|e| {
            Error::Corruption(format!(
                "short read at offset {offset} for {size} bytes: {e}"
            ))
        })?;
        Ok(buf)
    }

    /// Force durable persistence of all writes so far.
    pub fn fsync(&self) -> haven_core::Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    /// Empty the file and reset the write cursor. Only used by `clear`.
    pub fn truncate(&mut self) -> haven_core::Result<()> {
        self.file.set_len(0)?;
        self.file.seek(SeekFrom::Start(0))?;
        self.next_offset = 0;
        Ok(())
    }

    /// Current on-disk length of the Data Log.
    pub fn len(&self) -> haven_core::Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    /// True if the Data Log is empty.
    pub fn is_empty(&self) -> haven_core::Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Replace the underlying file descriptor with a fresh handle on the same
    /// path, re-synchronizing the write cursor with the file's new length.
    /// Used after compaction renames a temp file over `path`.
    pub fn reopen(&mut self) -> haven_core::Result<()> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&self.path)?;
        self.next_offset = file.metadata()?.len();
        self.file = file;
        Ok(())
    }

    /// Path this Data Log is backed by.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn append_and_read_round_trip() {
        let dir = tempdir().unwrap();
        let mut log = DataLog::open(dir.path().join("data.log")).unwrap();

        let offset = log.append(b"hello", log.next_offset()).unwrap();
        assert_eq!(offset, 0);
        assert_eq!(log.next_offset(), 5);

        let back = log.read_exact(0, 5).unwrap();
        assert_eq!(back, b"hello");
    }

    #[test]
    fn sequential_appends_advance_cursor() {
        let dir = tempdir().unwrap();
        let mut log = DataLog::open(dir.path().join("data.log")).unwrap();

        log.append(b"aaa", log.next_offset()).unwrap();
        let second = log.append(b"bb", log.next_offset()).unwrap();
        assert_eq!(second, 3);
        assert_eq!(log.next_offset(), 5);
    }

    #[test]
    fn read_exact_fails_on_short_file() {
        let dir = tempdir().unwrap();
        let mut log = DataLog::open(dir.path().join("data.log")).unwrap();
        log.append(b"hi", 0).unwrap();
        assert!(log.read_exact(0, 10).is_err());
    }

    #[test]
    fn truncate_resets_cursor_and_length() {
        let dir = tempdir().unwrap();
        let mut log = DataLog::open(dir.path().join("data.log")).unwrap();
        log.append(b"hello world", 0).unwrap();
        log.truncate().unwrap();
        assert_eq!(log.next_offset(), 0);
        assert_eq!(log.len().unwrap(), 0);
    }

    #[test]
    fn reopen_resyncs_cursor_with_file_length() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.log");
        {
            let mut log = DataLog::open(&path).unwrap();
            log.append(b"persisted", 0).unwrap();
            log.fsync().unwrap();
        }
        let mut log = DataLog::open(&path).unwrap();
        assert_eq!(log.next_offset(), 9);
        log.reopen().unwrap();
        assert_eq!(log.next_offset(), 9);
    }

    #[test]
    fn overwriting_within_bounds_does_not_move_cursor_backward() {
        let dir = tempdir().unwrap();
        let mut log = DataLog::open(dir.path().join("data.log")).unwrap();
        log.append(b"0123456789", 0).unwrap();
        log.append(b"xx", 2).unwrap();
        assert_eq!(log.next_offset(), 10);
        assert_eq!(log.read_exact(0, 10).unwrap(), b"01xx456789");
    }
}
