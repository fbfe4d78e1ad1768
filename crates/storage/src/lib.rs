//! Local persistent store for notesync
//!
//! This crate provides the embedded database the sync layer reads from when
//! the network is unavailable:
//! - ShardedTables: one shard per collection with secondary indices
//! - Transaction: staged, all-or-nothing writes to one collection
//! - Wal: append-only, checksummed log of committed transactions
//! - LocalStore: the store facade (reads, transactions, scalars, change feed)
//! - Table: typed view over one collection

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod sharded;
pub mod store;
pub mod subscription;
pub mod table;
pub mod txn;
pub mod wal;

pub use sharded::{Shard, ShardedTables, WriteOp};
pub use store::{LocalStore, DEFAULT_COMPACT_AFTER};
pub use subscription::{ChangeEvent, Subscription};
pub use table::Table;
pub use txn::Transaction;
pub use wal::{Wal, WalRecord, FORMAT_VERSION};
