//! 临时文件流
//!
//! A fetched object is copied into a disposable local file so callers get plain
//! `Read + Seek` plus positional reads. The file is deleted exactly once, on `close`
//! or on drop.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tempfile::{NamedTempFile, TempPath};

use crate::storage::Stream;

pub const TEMP_PREFIX: &str = "storage-s3-";

/// Stream backed by a temporary file / 临时文件流
#[derive(Debug)]
pub struct TempStream {
    file: Option<File>,
    path: Option<TempPath>,
}

fn closed() -> io::Error {
    io::Error::new(io::ErrorKind::Other, "stream closed")
}

impl TempStream {
    /// Create an empty temp file in `dir`, or the system temp dir / 创建临时文件
    pub fn create(dir: Option<&Path>) -> io::Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(TEMP_PREFIX);
        let tmp: NamedTempFile = match dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        let (file, path) = tmp.into_parts();
        Ok(Self {
            file: Some(file),
            path: Some(path),
        })
    }

    /// Backing path, `None` once closed
    pub fn path(&self) -> Option<PathBuf> {
        self.path.as_ref().map(|p| p.to_path_buf())
    }

    pub(crate) fn file_mut(&mut self) -> io::Result<&mut File> {
        self.file.as_mut().ok_or_else(closed)
    }

    fn file(&self) -> io::Result<&File> {
        self.file.as_ref().ok_or_else(closed)
    }
}

impl Read for TempStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file_mut()?.read(buf)
    }
}

impl Seek for TempStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file_mut()?.seek(pos)
    }
}

impl Stream for TempStream {
    #[cfg(unix)]
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        use std::os::unix::fs::FileExt;
        self.file()?.read_at(buf, offset)
    }

    #[cfg(windows)]
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        // seek_read moves the cursor on windows, put it back
        use std::os::windows::fs::FileExt;
        let mut file = self.file()?;
        let pos = file.stream_position()?;
        let n = file.seek_read(buf, offset)?;
        file.seek(SeekFrom::Start(pos))?;
        Ok(n)
    }

    fn close(&mut self) -> io::Result<()> {
        drop(self.file.take());
        match self.path.take() {
            Some(path) => match path.close() {
                Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
                _ => Ok(()),
            },
            None => Ok(()),
        }
    }
}
