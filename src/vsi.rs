//! Storage handles block codecs read and write through.
//!
//! A [`Storage`] is a byte-addressable handle with positioned reads and
//! writes. Reads are whole-range: a short read is reported as
//! [`RasterError::IoError`] and never retried here.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::errors::{RasterError, Result};

pub trait Storage: Send {
    /// Fill `buf` from `offset`, failing on a short read.
    fn read_exact_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()>;

    /// Write all of `data` at `offset`, growing the storage if needed.
    fn write_all_at(&mut self, offset: u64, data: &[u8]) -> Result<()>;

    fn len(&mut self) -> Result<u64>;

    fn is_empty(&mut self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Truncate or extend the storage to exactly `len` bytes.
    fn set_len(&mut self, len: u64) -> Result<()>;

    /// Push buffered writes down to the operating system.
    fn flush(&mut self) -> Result<()>;

    fn is_writable(&self) -> bool;
}

/// File backed storage.
#[derive(Debug)]
pub struct FileStorage {
    file: File,
    path: PathBuf,
    writable: bool,
}

impl FileStorage {
    /// Opens an existing file, for update if `update` is set.
    pub fn open<P: AsRef<Path>>(path: P, update: bool) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(update)
            .open(path)
            .map_err(|e| RasterError::OpenFailed {
                path: path.to_path_buf(),
                msg: e.to_string(),
            })?;
        Ok(FileStorage {
            file,
            path: path.to_path_buf(),
            writable: update,
        })
    }

    /// Creates (or truncates) a file for update.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|e| RasterError::OpenFailed {
                path: path.to_path_buf(),
                msg: e.to_string(),
            })?;
        Ok(FileStorage {
            file,
            path: path.to_path_buf(),
            writable: true,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Storage for FileStorage {
    fn read_exact_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    fn write_all_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        if !self.writable {
            return Err(RasterError::NoWriteAccess {
                method_name: "FileStorage::write_all_at",
            });
        }
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(data)?;
        Ok(())
    }

    fn len(&mut self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    fn set_len(&mut self, len: u64) -> Result<()> {
        self.file.set_len(len)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.file.flush()?;
        if self.writable {
            self.file.sync_data()?;
        }
        Ok(())
    }

    fn is_writable(&self) -> bool {
        self.writable
    }
}

/// In-memory storage, used by tests and for scratch datasets.
#[derive(Debug, Default, Clone)]
pub struct MemStorage {
    data: Vec<u8>,
    writable: bool,
}

impl MemStorage {
    pub fn new() -> Self {
        MemStorage {
            data: Vec::new(),
            writable: true,
        }
    }

    pub fn from_vec(data: Vec<u8>, writable: bool) -> Self {
        MemStorage { data, writable }
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl Storage for MemStorage {
    fn read_exact_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let start = offset as usize;
        let end = start.checked_add(buf.len()).filter(|e| *e <= self.data.len());
        match end {
            Some(end) => {
                buf.copy_from_slice(&self.data[start..end]);
                Ok(())
            }
            None => Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!(
                    "short read of {} bytes at offset {offset} (length {})",
                    buf.len(),
                    self.data.len()
                ),
            )
            .into()),
        }
    }

    fn write_all_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        if !self.writable {
            return Err(RasterError::NoWriteAccess {
                method_name: "MemStorage::write_all_at",
            });
        }
        let start = offset as usize;
        let end = start + data.len();
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[start..end].copy_from_slice(data);
        Ok(())
    }

    fn len(&mut self) -> Result<u64> {
        Ok(self.data.len() as u64)
    }

    fn set_len(&mut self, len: u64) -> Result<()> {
        self.data.resize(len as usize, 0);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn is_writable(&self) -> bool {
        self.writable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TempFixture;

    #[test]
    fn mem_storage_short_read() {
        let mut storage = MemStorage::from_vec(vec![1, 2, 3], false);
        let mut buf = [0u8; 2];
        storage.read_exact_at(1, &mut buf).unwrap();
        assert_eq!(buf, [2, 3]);
        let err = storage.read_exact_at(2, &mut buf).unwrap_err();
        assert!(matches!(err, RasterError::IoError { .. }));
        assert!(matches!(
            storage.write_all_at(0, &[9]),
            Err(RasterError::NoWriteAccess { .. })
        ));
    }

    #[test]
    fn mem_storage_grows_on_write() {
        let mut storage = MemStorage::new();
        storage.write_all_at(4, &[7, 8]).unwrap();
        assert_eq!(storage.as_bytes(), &[0, 0, 0, 0, 7, 8]);
        storage.set_len(2).unwrap();
        assert_eq!(storage.len().unwrap(), 2);
    }

    #[test]
    fn file_storage_round_trip() {
        let fixture = TempFixture::empty("storage.bin");
        {
            let mut storage = FileStorage::create(&fixture).unwrap();
            storage.write_all_at(3, &[1, 2, 3]).unwrap();
            storage.flush().unwrap();
            assert_eq!(storage.len().unwrap(), 6);
        }
        let mut storage = FileStorage::open(&fixture, false).unwrap();
        let mut buf = [0u8; 3];
        storage.read_exact_at(3, &mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3]);
        assert!(storage.read_exact_at(5, &mut buf).is_err());
        assert!(storage.write_all_at(0, &[1]).is_err());
    }

    #[test]
    fn file_storage_missing_file() {
        let fixture = TempFixture::empty("missing.bin");
        assert!(matches!(
            FileStorage::open(&fixture, false),
            Err(RasterError::OpenFailed { .. })
        ));
    }
}
