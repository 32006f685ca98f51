//! # reposync-ledger
//!
//! The persisted set of repository names already mirrored on the destination.
//!
//! [`Ledger`] holds the set in memory and rewrites the whole JSON document
//! after every mutation. It performs no locking of its own; callers share it
//! behind a single mutex so that read, mutate and persist form one critical
//! section.

pub mod error;
pub mod ledger;

pub use error::LedgerError;
pub use ledger::{Ledger, MirrorRecord};
