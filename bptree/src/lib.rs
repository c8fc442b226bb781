//! Fixed-size B+Tree nodes over caller-owned byte buffers.
//!
//! Components:
//!  - Node header codec (`storage::btree::NodeMeta`)
//!  - Internal and leaf nodes with a shared split algorithm
//!  - Overflow value stores for leaf values too large to inline
//!  - Block buffers and a pool to lease them from
//!  - Environment-driven layout configuration

pub mod config;
pub mod storage;

#[cfg(test)]
mod testing;

pub use config::{ConfigError, NodeConfig};
