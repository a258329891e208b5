//! Circuit selection.
//!
//! A circuit is an ordered path of distinct relays (entry first, exit last),
//! sampled uniformly without replacement from a directory snapshot. A fresh
//! circuit is built for every message and never reused.

use std::collections::HashSet;

use onion_crypto::RelayPublicKey;
use rand::seq::SliceRandom;
use rand::Rng;
use thiserror::Error;

use crate::NodeId;

/// Hops per circuit: entry, middle, exit.
pub const DEFAULT_CIRCUIT_LENGTH: usize = 3;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CircuitError {
    #[error("insufficient nodes: {available} available, {required} required")]
    InsufficientNodes { available: usize, required: usize },

    #[error("relay {0} appears more than once in the circuit")]
    DuplicateHop(NodeId),

    #[error("circuit must contain at least one hop")]
    Empty,
}

/// A relay as seen in a directory snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayDescriptor {
    pub node_id: NodeId,
    pub public_key: RelayPublicKey,
}

/// Ordered sequence of distinct relays.
#[derive(Debug, Clone)]
pub struct Circuit {
    hops: Vec<RelayDescriptor>,
}

impl Circuit {
    /// Create a circuit from an explicit path.
    pub fn new(hops: Vec<RelayDescriptor>) -> Result<Self, CircuitError> {
        if hops.is_empty() {
            return Err(CircuitError::Empty);
        }

        let mut seen = HashSet::with_capacity(hops.len());
        for hop in &hops {
            if !seen.insert(hop.node_id) {
                return Err(CircuitError::DuplicateHop(hop.node_id));
            }
        }

        Ok(Self { hops })
    }

    /// Hops in traversal order.
    pub fn hops(&self) -> &[RelayDescriptor] {
        &self.hops
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.hops.iter().map(|h| h.node_id).collect()
    }

    pub fn entry(&self) -> &RelayDescriptor {
        &self.hops[0]
    }

    pub fn exit(&self) -> &RelayDescriptor {
        &self.hops[self.hops.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.hops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hops.is_empty()
    }
}

/// Sample a circuit of `length` distinct relays with the thread RNG.
pub fn build_circuit(directory: &[RelayDescriptor], length: usize) -> Result<Circuit, CircuitError> {
    build_circuit_with(&mut rand::thread_rng(), directory, length)
}

/// Sample a circuit of `length` distinct relays.
///
/// Entries sharing a node id count once.
pub fn build_circuit_with<R: Rng + ?Sized>(
    rng: &mut R,
    directory: &[RelayDescriptor],
    length: usize,
) -> Result<Circuit, CircuitError> {
    if length == 0 {
        return Err(CircuitError::Empty);
    }

    let mut seen = HashSet::with_capacity(directory.len());
    let candidates: Vec<&RelayDescriptor> = directory
        .iter()
        .filter(|d| seen.insert(d.node_id))
        .collect();

    if candidates.len() < length {
        return Err(CircuitError::InsufficientNodes {
            available: candidates.len(),
            required: length,
        });
    }

    // choose_multiple yields distinct positions in random order
    let hops = candidates
        .choose_multiple(rng, length)
        .map(|d| (*d).clone())
        .collect();

    Circuit::new(hops)
}

#[cfg(test)]
mod tests {
    use super::*;
    use onion_crypto::RelayKeypair;

    fn directory(ids: &[u32]) -> Vec<RelayDescriptor> {
        // One key is enough; selection only looks at ids
        let keypair = RelayKeypair::generate().unwrap();
        ids.iter()
            .map(|id| RelayDescriptor {
                node_id: NodeId(*id),
                public_key: keypair.public_key().clone(),
            })
            .collect()
    }

    #[test]
    fn test_too_few_nodes() {
        for size in 0..DEFAULT_CIRCUIT_LENGTH {
            let ids: Vec<u32> = (0..size as u32).collect();
            let err = build_circuit(&directory(&ids), DEFAULT_CIRCUIT_LENGTH).unwrap_err();
            assert_eq!(
                err,
                CircuitError::InsufficientNodes {
                    available: size,
                    required: 3
                }
            );
        }
    }

    #[test]
    fn test_circuit_has_distinct_directory_members() {
        let dir = directory(&[1, 2, 3, 4, 5, 6]);
        let known: HashSet<NodeId> = dir.iter().map(|d| d.node_id).collect();

        for _ in 0..200 {
            let circuit = build_circuit(&dir, DEFAULT_CIRCUIT_LENGTH).unwrap();
            let ids = circuit.node_ids();

            assert_eq!(ids.len(), 3);
            assert_eq!(ids.iter().collect::<HashSet<_>>().len(), 3);
            assert!(ids.iter().all(|id| known.contains(id)));
        }
    }

    #[test]
    fn test_exactly_three_nodes_uses_all() {
        let dir = directory(&[1, 2, 3]);
        let mut ids = build_circuit(&dir, 3).unwrap().node_ids();
        ids.sort();
        assert_eq!(ids, vec![NodeId(1), NodeId(2), NodeId(3)]);
    }

    #[test]
    fn test_every_relay_gets_picked_as_entry() {
        let dir = directory(&[1, 2, 3, 4]);
        let mut entries = HashSet::new();
        for _ in 0..500 {
            entries.insert(build_circuit(&dir, 3).unwrap().entry().node_id);
        }
        assert_eq!(entries.len(), 4);
    }

    #[test]
    fn test_duplicate_directory_entries_count_once() {
        let dir = directory(&[1, 1, 2]);
        assert!(matches!(
            build_circuit(&dir, 3),
            Err(CircuitError::InsufficientNodes { available: 2, .. })
        ));
    }

    #[test]
    fn test_explicit_path_validation() {
        let dir = directory(&[1, 3]);
        let path = vec![dir[0].clone(), dir[1].clone(), dir[0].clone()];
        assert_eq!(
            Circuit::new(path).unwrap_err(),
            CircuitError::DuplicateHop(NodeId(1))
        );
        assert_eq!(Circuit::new(vec![]).unwrap_err(), CircuitError::Empty);

        let circuit = Circuit::new(dir.clone()).unwrap();
        assert_eq!(circuit.entry().node_id, NodeId(1));
        assert_eq!(circuit.exit().node_id, NodeId(3));
    }
}
