// Copyright (c) 2025-present, rowstore contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::page::HeapPage;
use crate::{
    block_file::BlockFile,
    exec::RecordSource,
    stop_signal::StopSignal,
    value::{Record, RecordId, TableHeader},
};
use std::{
    path::Path,
    sync::mpsc::{Receiver, SyncSender},
    thread::JoinHandle,
};

type ScanResult = crate::Result<(Record, RecordId)>;

/// Full scan over a heap file, in (page, slot) ascending order
///
/// A producer thread walks the pages and pushes live records through a
/// bounded handoff channel of capacity 1; the caller pulls them via
/// [`RecordSource::next`] or [`HeapFileScan::next_with_id`]. Closing
/// the scan cancels the producer at its next send point.
pub struct HeapFileScan {
    header: TableHeader,
    rx: Option<Receiver<ScanResult>>,
    stop: StopSignal,
    handle: Option<JoinHandle<()>>,
    closed: bool,
}

impl HeapFileScan {
    /// Opens a scan over the heap file at `path`.
    pub fn open(path: impl AsRef<Path>) -> crate::Result<Self> {
        Self::open_with_page_size(path, crate::block_file::DEFAULT_BLOCK_SIZE)
    }

    /// Opens a scan over a heap file written with a non-default page
    /// size.
    pub fn open_with_page_size(path: impl AsRef<Path>, page_size: usize) -> crate::Result<Self> {
        super::check_page_size(page_size)?;
        let bf = BlockFile::open(&path, page_size)?;
        if bf.num_blocks() == 0 {
            return Err(crate::Error::InvalidArgument(format!(
                "{} is not a valid heap file",
                path.as_ref().display(),
            )));
        }
        let header = HeapPage::load(&bf, 0)?.header;

        let (tx, rx) = std::sync::mpsc::sync_channel(1);
        let stop = StopSignal::default();
        let producer_stop = stop.clone();
        let handle = std::thread::spawn(move || produce(&bf, &tx, &producer_stop));

        Ok(Self {
            header,
            rx: Some(rx),
            stop,
            handle: Some(handle),
            closed: false,
        })
    }

    /// Pulls the next live record together with its address.
    pub fn next_with_id(&mut self) -> crate::Result<Option<(Record, RecordId)>> {
        let Some(rx) = &self.rx else {
            return Err(crate::Error::InvalidArgument(
                "heap file scan is closed".to_string(),
            ));
        };
        match rx.recv() {
            Ok(result) => result.map(Some),
            // The producer hung up: the scan is drained.
            Err(_) => Ok(None),
        }
    }
}

fn produce(bf: &BlockFile, tx: &SyncSender<ScanResult>, stop: &StopSignal) {
    let send = |result: ScanResult| -> bool {
        if stop.is_stopped() {
            return false;
        }
        tx.send(result).is_ok()
    };

    for page_id in 0..bf.num_blocks() {
        let page = match HeapPage::load(bf, page_id) {
            Ok(page) => page,
            Err(e) => {
                send(Err(e));
                return;
            }
        };
        for slot_id in 0..page.num_slots() {
            let record = match page.get(slot_id) {
                Ok(Some(record)) => record,
                // Tombstoned records are skipped.
                Ok(None) => continue,
                Err(e) => {
                    send(Err(e));
                    return;
                }
            };
            let rid = RecordId { page_id, slot_id };
            if !send(Ok((record, rid))) {
                return;
            }
        }
    }
}

impl RecordSource for HeapFileScan {
    fn header(&self) -> &TableHeader {
        &self.header
    }

    fn next(&mut self) -> crate::Result<Option<Record>> {
        Ok(self.next_with_id()?.map(|(record, _)| record))
    }

    fn close(&mut self) -> crate::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stop.send();

        // Dropping the receiver unblocks a producer mid-send.
        self.rx = None;

        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                return Err(crate::Error::InvalidArgument(
                    "heap file scan producer panicked".to_string(),
                ));
            }
        }
        Ok(())
    }
}
