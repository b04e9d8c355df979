use dircmp_common::{Vfs, VfsError};
use std::io::{ErrorKind, Read};
use std::path::Path;
use tracing::debug;

/// Read size used for each side of a content comparison
pub const CHUNK_SIZE: usize = 256 * 1024;

/// Chunked, short-circuiting byte-equality check between two files
pub struct ContentComparator<'a> {
    vfs: &'a dyn Vfs,
    chunk_size: usize,
}

impl<'a> ContentComparator<'a> {
    pub fn new(vfs: &'a dyn Vfs) -> Self {
        Self {
            vfs,
            chunk_size: CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Returns `Ok(true)` when both files hold exactly the same bytes.
    ///
    /// Reading stops at the first chunk that differs or when one side ends
    /// before the other.
    pub fn files_equal(&self, left: &Path, right: &Path) -> Result<bool, VfsError> {
        let mut left_reader = self.vfs.open_file(left)?;
        let mut right_reader = self.vfs.open_file(right)?;

        let mut left_buf = vec![0u8; self.chunk_size];
        let mut right_buf = vec![0u8; self.chunk_size];
        let mut offset = 0u64;

        loop {
            let left_len = fill_chunk(left_reader.as_mut(), &mut left_buf)?;
            let right_len = fill_chunk(right_reader.as_mut(), &mut right_buf)?;

            if left_len != right_len {
                debug!(
                    "Length mismatch at offset {} comparing {} and {}",
                    offset,
                    left.display(),
                    right.display()
                );
                return Ok(false);
            }
            if left_len == 0 {
                return Ok(true);
            }
            if left_buf[..left_len] != right_buf[..right_len] {
                debug!(
                    "Content mismatch in chunk at offset {} comparing {} and {}",
                    offset,
                    left.display(),
                    right.display()
                );
                return Ok(false);
            }
            offset += left_len as u64;
        }
    }
}

/// Read until the buffer is full or the reader is exhausted
fn fill_chunk(reader: &mut dyn Read, buf: &mut [u8]) -> Result<usize, VfsError> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(VfsError::Io(e)),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::LocalVfs;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_identical_files_are_equal() {
        let temp = TempDir::new().unwrap();
        let data = vec![7u8; CHUNK_SIZE * 2 + 17];
        fs::write(temp.path().join("a"), &data).unwrap();
        fs::write(temp.path().join("b"), &data).unwrap();

        let vfs = LocalVfs::new();
        let comparator = ContentComparator::new(&vfs);
        assert!(comparator
            .files_equal(&temp.path().join("a"), &temp.path().join("b"))
            .unwrap());
    }

    #[test]
    fn test_difference_in_last_chunk() {
        let temp = TempDir::new().unwrap();
        let left = vec![1u8; 40];
        let mut right = left.clone();
        right[39] = 2;
        fs::write(temp.path().join("a"), &left).unwrap();
        fs::write(temp.path().join("b"), &right).unwrap();

        let vfs = LocalVfs::new();
        let comparator = ContentComparator::new(&vfs).with_chunk_size(16);
        assert!(!comparator
            .files_equal(&temp.path().join("a"), &temp.path().join("b"))
            .unwrap());
    }

    #[test]
    fn test_truncated_side_is_different() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a"), b"abcdefgh").unwrap();
        fs::write(temp.path().join("b"), b"abcdefghij").unwrap();

        let vfs = LocalVfs::new();
        let comparator = ContentComparator::new(&vfs).with_chunk_size(4);
        assert!(!comparator
            .files_equal(&temp.path().join("a"), &temp.path().join("b"))
            .unwrap());
    }

    #[test]
    fn test_empty_files_are_equal() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a"), b"").unwrap();
        fs::write(temp.path().join("b"), b"").unwrap();

        let vfs = LocalVfs::new();
        assert!(ContentComparator::new(&vfs)
            .files_equal(&temp.path().join("a"), &temp.path().join("b"))
            .unwrap());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a"), b"x").unwrap();

        let vfs = LocalVfs::new();
        assert!(ContentComparator::new(&vfs)
            .files_equal(&temp.path().join("a"), &temp.path().join("missing"))
            .is_err());
    }
}
