// Copyright (c) 2025-present, rowstore contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    block_file::BlockFile,
    coding::{Decode, DecodeError, Encode},
    value::{Record, TableHeader},
};
use byteorder::LittleEndian;
use std::io::Cursor;

/// Footer: u16 next-slot offset + u16 slot count.
const FOOTER_SIZE: usize = 4;

/// Each slot directory entry is a u16 byte offset into the page.
const DIRECTORY_ENTRY_SIZE: usize = 2;

const TOMBSTONE_LIVE: u8 = 0;
const TOMBSTONE_DELETED: u8 = 1;

/// A slotted heap page.
///
/// Layout: the serialized table header, then records growing upward
/// (each prefixed by a tombstone byte), free space, the slot directory
/// growing downward, and the footer. Every page carries its own header
/// so pages are self-describing.
pub(crate) struct HeapPage {
    pub page_id: i32,
    pub header: TableHeader,
    data: Vec<u8>,
}

// Offsets are derived from the footer fields and bounded by the page
// itself.
#[allow(clippy::indexing_slicing)]
impl HeapPage {
    /// Allocates a fresh block and formats it as an empty page.
    pub fn create(bf: &mut BlockFile, header: &TableHeader) -> crate::Result<Self> {
        let page_id = bf.allocate_block()?;
        log::trace!("formatting heap page at block {page_id}");

        let header_bytes = header.encode_into_vec().map_err(crate::Error::Encode)?;
        let page_size = bf.block_size();
        if header_bytes.len() + FOOTER_SIZE > page_size {
            return Err(crate::Error::InvalidArgument(format!(
                "table header ({} bytes) does not fit a {page_size}-byte page",
                header_bytes.len(),
            )));
        }

        let mut data = vec![0; page_size];
        data[..header_bytes.len()].copy_from_slice(&header_bytes);

        let mut page = Self {
            page_id,
            header: header.clone(),
            data,
        };

        #[allow(clippy::cast_possible_truncation)]
        page.set_next_slot_offset(header_bytes.len() as u16);

        page.set_num_slots(0);
        Ok(page)
    }

    /// Reads and decodes the page stored at `page_id`.
    pub fn load(bf: &BlockFile, page_id: i32) -> crate::Result<Self> {
        let mut data = vec![0; bf.block_size()];
        bf.read_block(&mut data, page_id)?;

        let mut cursor = Cursor::new(&data[..]);
        let header = TableHeader::decode_from(&mut cursor).map_err(crate::Error::Decode)?;

        Ok(Self {
            page_id,
            header,
            data,
        })
    }

    /// Writes the page back to its block.
    pub fn flush(&self, bf: &mut BlockFile) -> crate::Result<()> {
        bf.write_block(&self.data, self.page_id)
    }

    fn get_u16(&self, offset: usize) -> u16 {
        <LittleEndian as byteorder::ByteOrder>::read_u16(&self.data[offset..offset + 2])
    }

    fn set_u16(&mut self, offset: usize, value: u16) {
        <LittleEndian as byteorder::ByteOrder>::write_u16(
            &mut self.data[offset..offset + 2],
            value,
        );
    }

    pub fn next_slot_offset(&self) -> u16 {
        self.get_u16(self.data.len() - 4)
    }

    fn set_next_slot_offset(&mut self, offset: u16) {
        let i = self.data.len() - 4;
        self.set_u16(i, offset);
    }

    pub fn num_slots(&self) -> u16 {
        self.get_u16(self.data.len() - 2)
    }

    fn set_num_slots(&mut self, num_slots: u16) {
        let i = self.data.len() - 2;
        self.set_u16(i, num_slots);
    }

    /// Offset of the lowest slot directory entry, i.e. the exclusive
    /// upper bound of the record area.
    fn directory_start(&self) -> usize {
        self.data.len() - FOOTER_SIZE - usize::from(self.num_slots()) * DIRECTORY_ENTRY_SIZE
    }

    /// Byte offset of the record stored in the given slot.
    ///
    /// Precondition: `slot_id < num_slots`. The directory grows
    /// downward, so slot 0 sits just below the footer.
    fn record_offset(&self, slot_id: u16) -> usize {
        let i = self.data.len() - FOOTER_SIZE - (usize::from(slot_id) + 1) * DIRECTORY_ENTRY_SIZE;
        usize::from(self.get_u16(i))
    }

    fn free_space(&self) -> usize {
        self.directory_start() - usize::from(self.next_slot_offset())
    }

    fn check_slot(&self, slot_id: u16) -> crate::Result<()> {
        if slot_id >= self.num_slots() {
            return Err(crate::Error::InvalidArgument(format!(
                "expected slot ID in [0, {}); got {slot_id}",
                self.num_slots(),
            )));
        }
        Ok(())
    }

    /// Tries to place a record on this page.
    ///
    /// Returns `Ok(false)` when there is no room for the record plus
    /// its directory entry. Deleted slots do not return their space.
    pub fn insert(&mut self, record: &Record) -> crate::Result<bool> {
        let mut bytes = vec![TOMBSTONE_LIVE];
        self.header.write_record(&mut bytes, record)?;

        if self.free_space() < bytes.len() + DIRECTORY_ENTRY_SIZE {
            return Ok(false);
        }

        let start = usize::from(self.next_slot_offset());
        self.data[start..start + bytes.len()].copy_from_slice(&bytes);

        let entry_offset = self.directory_start() - DIRECTORY_ENTRY_SIZE;

        #[allow(clippy::cast_possible_truncation)]
        self.set_u16(entry_offset, start as u16);

        self.set_num_slots(self.num_slots() + 1);

        #[allow(clippy::cast_possible_truncation)]
        self.set_next_slot_offset((start + bytes.len()) as u16);

        Ok(true)
    }

    /// Reads the record in the given slot; `None` if it is tombstoned.
    ///
    /// The record's end is the next slot's start offset, or the free
    /// space boundary for the newest slot.
    pub fn get(&self, slot_id: u16) -> crate::Result<Option<Record>> {
        self.check_slot(slot_id)?;

        let start = self.record_offset(slot_id);
        let end = if slot_id + 1 < self.num_slots() {
            self.record_offset(slot_id + 1)
        } else {
            usize::from(self.next_slot_offset())
        };
        if start >= end || end > self.data.len() {
            return Err(crate::Error::InvalidArgument(format!(
                "corrupt page {}: slot {slot_id} spans {start}..{end}",
                self.page_id,
            )));
        }

        match self.data[start] {
            TOMBSTONE_LIVE => {}
            TOMBSTONE_DELETED => return Ok(None),
            tag => {
                return Err(crate::Error::Decode(DecodeError::InvalidTag((
                    "tombstone",
                    tag,
                ))))
            }
        }

        let record = self
            .header
            .read_record(&mut &self.data[start + 1..end])
            .map_err(crate::Error::Decode)?;
        Ok(Some(record))
    }

    /// Sets the slot's tombstone. Re-deleting is a no-op.
    pub fn delete(&mut self, slot_id: u16) -> crate::Result<()> {
        self.check_slot(slot_id)?;
        let start = self.record_offset(slot_id);
        if start >= self.data.len() {
            return Err(crate::Error::InvalidArgument(format!(
                "corrupt page {}: slot {slot_id} starts at {start}",
                self.page_id,
            )));
        }
        self.data[start] = TOMBSTONE_DELETED;
        Ok(())
    }
}
