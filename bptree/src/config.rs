//! Node layout configuration.
//!
//! Configuration is loaded from environment variables, all optional:
//!
//! - `BPTREE_BLOCK_SIZE`: bytes per node block (default: `4096`)
//! - `BPTREE_KEY_SIZE`: fixed key width (default: `8`)
//! - `BPTREE_VALUE_SIZE`: inline leaf value width (default: `8`)
//! - `BPTREE_POOL_CAPACITY`: blocks pre-allocated by the buffer pool (default: `1024`)
//!
//! # Invariants
//!
//! - A validated config fits at least one entry in both a leaf and an
//!   internal node of `block_size` bytes

use std::sync::Arc;

use crate::storage::BufferPool;
use crate::storage::btree::{MAX_VALUE_SIZE, NodeError, NodeKind, NodeMeta, PTR_SIZE};
use crate::storage::page::BLOCK_SIZE;
use crate::storage::varchar::VARCHAR_REF_SIZE;

/// Fixed widths shared by every node of one tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    /// Bytes per node block.
    pub block_size: usize,
    /// Width of every key.
    pub key_size: usize,
    /// Width of the inline value slot in leaves.
    pub value_size: usize,
    /// Number of blocks the buffer pool pre-allocates.
    pub pool_capacity: usize,
}

/// Error returned when loading configuration fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A variable has an invalid value.
    InvalidValue { name: String, message: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidValue { name, message } => {
                write!(f, "invalid value for {name}: {message}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            block_size: BLOCK_SIZE,
            key_size: Self::DEFAULT_KEY_SIZE,
            value_size: Self::DEFAULT_VALUE_SIZE,
            pool_capacity: Self::DEFAULT_POOL_CAPACITY,
        }
    }
}

impl NodeConfig {
    pub const DEFAULT_KEY_SIZE: usize = 8;
    pub const DEFAULT_VALUE_SIZE: usize = 8;
    pub const DEFAULT_POOL_CAPACITY: usize = 1024;

    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to
    /// its value. Missing variables take their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is not a positive integer or the
    /// resulting widths cannot hold one entry per block.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let config = Self {
            block_size: load_usize(&lookup, "BPTREE_BLOCK_SIZE", defaults.block_size)?,
            key_size: load_usize(&lookup, "BPTREE_KEY_SIZE", defaults.key_size)?,
            value_size: load_usize(&lookup, "BPTREE_VALUE_SIZE", defaults.value_size)?,
            pool_capacity: load_usize(&lookup, "BPTREE_POOL_CAPACITY", defaults.pool_capacity)?,
        };
        config.validate()?;

        tracing::debug!(
            block_size = config.block_size,
            key_size = config.key_size,
            value_size = config.value_size,
            pool_capacity = config.pool_capacity,
            "loaded node configuration"
        );
        Ok(config)
    }

    /// Check that both node kinds fit at least one entry per block.
    ///
    /// Errors name the variable at fault: widths the header or the leaf
    /// slot cannot encode are reported against the width variable, and only
    /// a block too small for one entry against `BPTREE_BLOCK_SIZE`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if u16::try_from(self.key_size).is_err() {
            return Err(invalid_value(
                "BPTREE_KEY_SIZE",
                format!("must be at most {}", u16::MAX),
            ));
        }
        if !(VARCHAR_REF_SIZE..=MAX_VALUE_SIZE).contains(&self.value_size) {
            return Err(invalid_value(
                "BPTREE_VALUE_SIZE",
                format!("must be between {VARCHAR_REF_SIZE} and {MAX_VALUE_SIZE}"),
            ));
        }

        let attribute = |e: NodeError| {
            let name = match &e {
                NodeError::TooSmall { .. } => "BPTREE_BLOCK_SIZE",
                _ => "BPTREE_VALUE_SIZE",
            };
            invalid_value(name, e.to_string())
        };
        NodeMeta::compute(NodeKind::Leaf, self.block_size, self.key_size, self.value_size)
            .map_err(attribute)?;
        NodeMeta::compute(NodeKind::Internal, self.block_size, self.key_size, PTR_SIZE)
            .map_err(attribute)?;
        Ok(())
    }

    /// Build the buffer pool that supplies node blocks.
    #[must_use]
    pub fn buffer_pool(&self) -> Arc<BufferPool> {
        BufferPool::new(self.pool_capacity, self.block_size)
    }
}

fn invalid_value(name: &str, message: String) -> ConfigError {
    ConfigError::InvalidValue {
        name: name.to_string(),
        message,
    }
}

fn load_usize<F>(lookup: &F, name: &str, default: usize) -> Result<usize, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(value) => match value.trim().parse::<usize>() {
            Ok(n) if n > 0 => Ok(n),
            _ => Err(invalid_value(
                name,
                format!("'{value}' is not a positive integer"),
            )),
        },
        None => Ok(default),
    }
}
