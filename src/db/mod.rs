//! Database module: SQL repositories over the archive store.
//!
//! Domain entities live in `crate::model`; this module owns pool setup,
//! migrations, and the SQL-only repository functions that map rows into
//! those entities. External modules should import from `klaviyo_archiver::db`.

pub mod repo;

pub use repo::*;
