//! Dedup store
//!
//! The store is the only durable home of ingested records and the only
//! resource shared between collectors. Its single write path is
//! [`records::insert_if_absent`].

pub mod init;
pub mod records;

pub use init::*;
pub use records::*;
