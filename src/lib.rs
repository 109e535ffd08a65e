// Copyright (c) 2025-present, rowstore contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! An embeddable relational storage and query execution core.
//!
//! ##### NOTE
//!
//! > This crate is the storage and execution core of a small
//! > relational engine, not a full database. There is no SQL parser,
//! > planner, catalog, transaction log, or network protocol: callers
//! > assemble operator trees by hand and choose join and sort
//! > strategies themselves.
//!
//! ##### About
//!
//! Tables live in [heap files](HeapFile): slotted pages of records on
//! a fixed-size block device, addressed by stable [`RecordId`]s and
//! deleted via tombstones. A persistent [B+ tree](BPlusTree) maps
//! 32-bit keys to record addresses and supports point and range
//! lookups, in-order insertion, and bulk load.
//!
//! Queries are pull-based operator trees over the
//! [`RecordSource`](exec::RecordSource) trait: scans (in-memory, CSV,
//! heap file, stream file, index), selection, projection, limit,
//! distinct, grouped average, k-way merge, in-memory and external
//! merge sort, and classic and hybrid hash joins. Sort and join
//! operators spill to self-describing scratch [stream files](stream)
//! in private temp directories.
//!
//! A [lock manager](lock::LockManager) coordinates shared/exclusive
//! locks on opaque lock IDs with FIFO fairness, lock upgrade, and
//! cycle-based deadlock detection.
//!
//! # Example usage
//!
//! ```
//! use rowstore::{
//!     exec::{InMemoryScan, RecordSource, SortInMemory},
//!     Field, TableHeader, Type, Value,
//! };
//!
//! let header = TableHeader::new(
//!     "movies",
//!     vec![
//!         Field::new("title", Type::Str),
//!         Field::new("rating", Type::Float64),
//!     ],
//! );
//! let records = vec![
//!     vec![Value::Str("Gattaca".into()), Value::Float64(4.5)],
//!     vec![Value::Str("Hackers".into()), Value::Float64(3.7)],
//! ];
//!
//! // Operator trees are built bottom-up and pulled from the root.
//! let scan = InMemoryScan::new(header, records);
//! let mut sorted = SortInMemory::new(Box::new(scan), "rating", false)?;
//!
//! while let Some(record) = sorted.next()? {
//!     // ...
//! }
//! sorted.close()?;
//! #
//! # Ok::<(), rowstore::Error>(())
//! ```

#![forbid(unsafe_code)]
#![deny(clippy::all, missing_docs, clippy::cargo)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::indexing_slicing)]
#![warn(clippy::pedantic, clippy::nursery)]
#![warn(clippy::expect_used)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::option_if_let_else)]

mod block_file;
mod coding;
mod error;
mod stop_signal;
mod value;

#[doc(hidden)]
pub mod bloom;

pub mod exec;
pub mod heap;
pub mod index;
pub mod lock;
pub mod stream;

pub use {
    block_file::{BlockFile, DEFAULT_BLOCK_SIZE, INVALID_BLOCK_ID},
    coding::{Decode, DecodeError, Encode, EncodeError},
    error::{Error, Result},
    exec::{BoxedSource, RecordSource},
    heap::{HeapFile, HeapFileScan},
    index::{BPlusTree, Entry},
    value::{Field, Record, RecordId, TableHeader, Type, Value, MAX_FIELDS, MAX_STRING_LEN},
};
