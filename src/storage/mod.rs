//! Storage layer for the ceremony coordinator.
//!
//! Uses ReDB for embedded key-value storage with ACID transactions.
//! Without a configured path the ledger lives in an in-memory ReDB backend.

pub mod redb;

pub use self::redb::Storage;
