//! Deterministic source-to-node labelling.
//!
//! The label is metadata only: nothing is dispatched to another process based
//! on it. The hash is FNV-1a (32 bit) over the UTF-8 bytes of the source id, so
//! a given id maps to the same label across restarts and implementations.

use crate::{Error, Result};

pub const DEFAULT_NODE_COUNT: u32 = 2;

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

pub fn stable_hash(input: &str) -> u32 {
    input.bytes().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ byte as u32).wrapping_mul(FNV_PRIME)
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeAssigner {
    node_count: u32,
}

impl NodeAssigner {
    pub fn new(node_count: u32) -> Result<Self> {
        if node_count == 0 {
            return Err(Error::Config("node_count must be at least 1".to_string()));
        }
        Ok(Self { node_count })
    }

    pub fn node_count(&self) -> u32 {
        self.node_count
    }

    pub fn assign(&self, source_id: &str) -> String {
        format!("node_{}", stable_hash(source_id) % self.node_count)
    }
}

impl Default for NodeAssigner {
    fn default() -> Self {
        Self {
            node_count: DEFAULT_NODE_COUNT,
        }
    }
}
