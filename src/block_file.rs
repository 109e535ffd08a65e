// Copyright (c) 2025-present, rowstore contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use std::{fs::File, path::Path};

/// Default block (and heap page) size
pub const DEFAULT_BLOCK_SIZE: usize = 1 << 16;

/// Marker for "no block", e.g. the ends of the B+ tree leaf list
pub const INVALID_BLOCK_ID: i32 = -1;

/// A file of fixed-size blocks, numbered densely from 0
///
/// Heap files, B+ trees and their scans are built on top of this. Not
/// internally synchronized; a block file has a single owner, and
/// dropping it closes the underlying file.
pub struct BlockFile {
    file: File,
    block_size: usize,
    num_blocks: i32,
}

impl BlockFile {
    /// Opens (or creates) the block file at `path`.
    ///
    /// The block count is derived from the current file size.
    pub fn open(path: impl AsRef<Path>, block_size: usize) -> crate::Result<Self> {
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let len = file.metadata()?.len();

        #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
        let num_blocks = (len / block_size as u64) as i32;

        Ok(Self {
            file,
            block_size,
            num_blocks,
        })
    }

    /// Returns the block size in bytes.
    #[must_use]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Returns the number of allocated blocks.
    #[must_use]
    pub fn num_blocks(&self) -> i32 {
        self.num_blocks
    }

    /// Allocates a new zero-filled block at the end of the file.
    ///
    /// The returned block ID is the previous block count, so IDs are
    /// contiguous and monotonically increasing.
    pub fn allocate_block(&mut self) -> crate::Result<i32> {
        let block_id = self.num_blocks;
        self.num_blocks += 1;
        self.file
            .set_len(u64::from(self.num_blocks.unsigned_abs()) * self.block_size as u64)?;
        Ok(block_id)
    }

    fn check_access(&self, buf_len: usize, block_id: i32) -> crate::Result<u64> {
        if block_id < 0 || block_id >= self.num_blocks {
            return Err(crate::Error::InvalidArgument(format!(
                "block ID must be in [0, {}); got {block_id}",
                self.num_blocks,
            )));
        }
        if buf_len != self.block_size {
            return Err(crate::Error::InvalidArgument(format!(
                "buffer must be {} bytes; got {buf_len}",
                self.block_size,
            )));
        }
        Ok(u64::from(block_id.unsigned_abs()) * self.block_size as u64)
    }

    /// Reads the block with the given ID into `buf`.
    ///
    /// `buf` must be exactly one block long and the ID must be in
    /// range.
    pub fn read_block(&self, buf: &mut [u8], block_id: i32) -> crate::Result<()> {
        let offset = self.check_access(buf.len(), block_id)?;
        read_exact_at(&self.file, buf, offset)?;
        Ok(())
    }

    /// Writes `buf` to the block with the given ID.
    ///
    /// `buf` must be exactly one block long and the ID must be in
    /// range.
    pub fn write_block(&mut self, buf: &[u8], block_id: i32) -> crate::Result<()> {
        let offset = self.check_access(buf.len(), block_id)?;
        write_all_at(&self.file, buf, offset)?;
        Ok(())
    }
}

#[cfg(unix)]
fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> std::io::Result<()> {
    std::os::unix::fs::FileExt::read_exact_at(file, buf, offset)
}

#[cfg(unix)]
fn write_all_at(file: &File, buf: &[u8], offset: u64) -> std::io::Result<()> {
    std::os::unix::fs::FileExt::write_all_at(file, buf, offset)
}

#[cfg(windows)]
fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> std::io::Result<()> {
    use std::os::windows::fs::FileExt;

    while !buf.is_empty() {
        match file.seek_read(buf, offset)? {
            0 => return Err(std::io::ErrorKind::UnexpectedEof.into()),
            n => {
                buf = &mut buf[n..];
                offset += n as u64;
            }
        }
    }
    Ok(())
}

#[cfg(windows)]
fn write_all_at(file: &File, mut buf: &[u8], mut offset: u64) -> std::io::Result<()> {
    use std::os::windows::fs::FileExt;

    while !buf.is_empty() {
        match file.seek_write(buf, offset)? {
            0 => return Err(std::io::ErrorKind::WriteZero.into()),
            n => {
                buf = &buf[n..];
                offset += n as u64;
            }
        }
    }
    Ok(())
}
