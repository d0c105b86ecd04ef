use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

const SEQ_BITS: u32 = 40;
const SEQ_MASK: u64 = (1 << SEQ_BITS) - 1;

static NEXT_SEED: AtomicU32 = AtomicU32::new(1);

/// Identity of a document node.
///
/// Assigned once when the node is allocated and never derived from its tree
/// position, so it survives moves, edits and undo. The high bits carry the seed
/// of the generator that issued it, which keeps ids from different documents
/// in the same process apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(u64);

impl NodeId {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }

    pub fn seed(self) -> u32 {
        (self.0 >> SEQ_BITS) as u32
    }

    pub fn sequence(self) -> u64 {
        self.0 & SEQ_MASK
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}-{}", self.seed(), self.sequence())
    }
}

/// Sequential id generator owned by an arena
#[derive(Debug, Clone)]
pub struct IdGenerator {
    seed: u32,
    count: u64,
}

impl IdGenerator {
    /// Generator with a seed no other generator in this process has used.
    pub fn new() -> Self {
        Self::from_seed(NEXT_SEED.fetch_add(1, Ordering::Relaxed))
    }

    pub fn from_seed(seed: u32) -> Self {
        Self { seed, count: 0 }
    }

    /// Generate next sequential id
    pub fn next_id(&mut self) -> NodeId {
        self.count += 1;
        NodeId(((self.seed as u64) << SEQ_BITS) | (self.count & SEQ_MASK))
    }

    pub fn seed(&self) -> u32 {
        self.seed
    }

    /// Number of ids handed out so far
    pub fn issued(&self) -> u64 {
        self.count
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}
