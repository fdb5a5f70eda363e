//! Node identity and id generation.
//!
//! Ids are stable for a node's lifetime and never reused. Generated ids have
//! the shape of an RFC 4122 version-4 UUID and come from a seedable PRNG, so
//! tests can replay a command sequence and get identical trees.

use std::fmt;
use std::sync::Arc;

use rand::{RngCore, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;
use serde::{Deserialize, Serialize};

use crate::tree::Tree;

// Using a concrete, seedable PRNG for determinism.
type IdRng = Xoshiro256StarStar;

/// Globally unique node id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(Arc<str>);

impl NodeId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for NodeId {
    fn from(value: String) -> Self {
        Self(Arc::from(value))
    }
}

/// Source of fresh node ids.
#[derive(Clone, Debug)]
pub struct IdGenerator {
    rng: IdRng,
}

impl IdGenerator {
    pub fn from_entropy() -> Self {
        Self {
            rng: IdRng::from_entropy(),
        }
    }

    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: IdRng::seed_from_u64(seed),
        }
    }

    /// Returns a new v4-shaped id.
    pub fn next_id(&mut self) -> NodeId {
        let mut bytes = [0u8; 16];
        self.rng.fill_bytes(&mut bytes);
        bytes[6] = (bytes[6] & 0x0f) | 0x40;
        bytes[8] = (bytes[8] & 0x3f) | 0x80;

        let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
        NodeId::from(format!(
            "{}-{}-{}-{}-{}",
            &hex[0..8],
            &hex[8..12],
            &hex[12..16],
            &hex[16..20],
            &hex[20..32]
        ))
    }

    /// Returns an id not yet present in `tree`.
    pub fn fresh_for(&mut self, tree: &Tree) -> NodeId {
        loop {
            let id = self.next_id();
            if !tree.contains(&id) {
                return id;
            }
        }
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::from_entropy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_generators_agree() {
        let mut a = IdGenerator::from_seed(7);
        let mut b = IdGenerator::from_seed(7);
        assert_eq!(a.next_id(), b.next_id());
        assert_ne!(a.next_id(), IdGenerator::from_seed(8).next_id());
    }

    #[test]
    fn ids_look_like_v4_uuids() {
        let id = IdGenerator::from_seed(1).next_id();
        let parts: Vec<&str> = id.as_str().split('-').collect();
        assert_eq!(
            parts.iter().map(|p| p.len()).collect::<Vec<_>>(),
            vec![8, 4, 4, 4, 12]
        );
        assert!(parts[2].starts_with('4'));
        assert!(matches!(&parts[3][..1], "8" | "9" | "a" | "b"));
    }
}
