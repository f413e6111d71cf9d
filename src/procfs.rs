// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Bounded reads of small kernel-provided text files.
// Author: Lukas Bower

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::BootError;

/// Largest read taken from a proc file; one page less the terminator.
pub const PROC_READ_LIMIT: usize = 4095;

/// Fixed-capacity working buffer reserved up front.
///
/// procfs files report a zero size and do not seek, so the only way to
/// learn their contents is to read into a buffer of documented size.
#[derive(Debug)]
pub struct ProcBuffer {
    bytes: Vec<u8>,
}

impl ProcBuffer {
    /// Reserve a buffer without aborting the process on allocation failure.
    pub fn reserve() -> Result<Self, BootError> {
        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(PROC_READ_LIMIT + 1)
            .map_err(|_| BootError::OutOfMemory)?;
        Ok(Self { bytes })
    }

    /// Fill from `path`, keeping at most [`PROC_READ_LIMIT`] bytes.
    pub fn fill_from(&mut self, path: &Path) -> Result<&str, BootError> {
        let read_err = |source| BootError::Read {
            path: path.to_path_buf(),
            source,
        };
        self.bytes.clear();
        let file = File::open(path).map_err(read_err)?;
        file.take(PROC_READ_LIMIT as u64)
            .read_to_end(&mut self.bytes)
            .map_err(read_err)?;
        Ok(self.as_str())
    }

    /// Fill from text already in memory, under the same bound as a file read.
    pub fn fill_with(&mut self, text: &str) -> &str {
        let bytes = text.as_bytes();
        self.bytes.clear();
        self.bytes
            .extend_from_slice(&bytes[..bytes.len().min(PROC_READ_LIMIT)]);
        self.as_str()
    }

    /// Contents decoded as UTF-8; the kernel passes the cmdline through
    /// untouched, so a bad byte ends the usable text.
    pub fn as_str(&self) -> &str {
        match std::str::from_utf8(&self.bytes) {
            Ok(text) => text,
            Err(err) => {
                let valid = err.valid_up_to();
                std::str::from_utf8(&self.bytes[..valid]).unwrap_or_default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn reads_are_capped() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&vec![b'a'; PROC_READ_LIMIT + 100]).unwrap();
        let mut buf = ProcBuffer::reserve().unwrap();
        assert_eq!(buf.fill_from(file.path()).unwrap().len(), PROC_READ_LIMIT);
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let mut buf = ProcBuffer::reserve().unwrap();
        let err = buf.fill_from(Path::new("/nonexistent/cmdline")).unwrap_err();
        assert!(matches!(err, BootError::Read { .. }));
    }

    #[test]
    fn in_memory_text_is_capped_like_a_read() {
        let mut buf = ProcBuffer::reserve().unwrap();
        assert_eq!(buf.fill_with("root=/dev/sda1\n"), "root=/dev/sda1\n");
        let long = "x".repeat(PROC_READ_LIMIT + 10);
        assert_eq!(buf.fill_with(&long).len(), PROC_READ_LIMIT);
        // A multi-byte char cut at the limit is dropped.
        let cut = format!("{}é", "a".repeat(PROC_READ_LIMIT - 1));
        assert_eq!(buf.fill_with(&cut).len(), PROC_READ_LIMIT - 1);
    }

    #[test]
    fn invalid_utf8_is_truncated() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"root=/dev/sda1 \xff rest").unwrap();
        let mut buf = ProcBuffer::reserve().unwrap();
        assert_eq!(buf.fill_from(file.path()).unwrap(), "root=/dev/sda1 ");
    }
}
